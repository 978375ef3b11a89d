//! Shared fixtures for the node integration tests
pub mod object_dict1;
pub mod sim_bus;
