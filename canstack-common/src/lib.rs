//! Common functionality shared among canstack crates.
//!
//! Most users will have no reason to depend on this crate directly, as it is re-exported by
//! `canstack-node`.
#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs, missing_copy_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod atomic_cell;
pub use atomic_cell::AtomicCell;
pub mod bus;
pub mod config;
pub mod constants;
#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
pub mod device_config;
pub mod messages;
pub mod node_id;
pub mod objects;
pub mod pdo;
pub mod sdo;
pub mod traits;

pub use node_id::NodeId;

pub use messages::{CanFrame, CanId, MessageError};
