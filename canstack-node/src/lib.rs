//! A library to implement a CANopen node in Rust
//!
//! Canstack-node turns a raw CAN controller into a CANopen speaking device. It is primarily
//! intended to run on microcontrollers, so it is no_std compatible and performs no heap
//! allocation. It provides the following features:
//!
//! * An *object dictionary* of typed scalar and array objects, declared statically by the
//!   application ([`object_dict`]).
//! * An expedited *SDO* server, giving remote clients read and write access to the dictionary.
//! * Transmit and receive *PDOs*, packing mapped objects into frames ([`pdo`]).
//! * The *NMT* state machine, with boot-up and heartbeat production ([`nmt`]).
//! * Persistent storage of selected objects on command ([`persist`], [`storage`]).
//!
//! # Getting Started
//!
//! ## The driver
//!
//! The application implements [`CanDriver`](common::traits::CanDriver) for its controller. The
//! controller is assumed to offer 32 message-object slots; the node binds its messages to slots
//! following [`transport::slots`].
//!
//! ## Instantiating the [`Node`] object
//!
//! ```ignore
//! static DRIVER: MyCanDriver = MyCanDriver::new();
//! static ERROR_LOG: ErrorLog<8> = ErrorLog::new();
//!
//! let node = init_node(7, &OD, &DRIVER, NodeConfig::new())?;
//! node.register_error_log(&ERROR_LOG);
//! node.register_parameter_storage(&FLASH_STORAGE).ok();
//! ```
//!
//! With the `std` feature, a [`NodeConfig`](common::config::NodeConfig) can be read from a TOML
//! file using [`DeviceConfig`](common::device_config::DeviceConfig).
//!
//! ## Handling CAN events
//!
//! The controller's interrupt handler forwards events to the node:
//!
//! ```ignore
//! fn can_irq() {
//!     match controller.event() {
//!         Event::Rx(slot) => { NODE.on_rx_interrupt(slot); }
//!         Event::TxDone(slot) => NODE.on_tx_complete(slot),
//!         Event::Error(flags) => { NODE.on_error(flags); }
//!     }
//! }
//! ```
//!
//! and the main loop calls [`Node::step`] with the time elapsed since the previous call:
//!
//! ```ignore
//! loop {
//!     let now = clock.millis();
//!     NODE.step(now - last);
//!     last = now;
//! }
//! ```
#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
#![warn(missing_docs, missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod dispatch;
mod error;
pub mod hooks;
pub mod nmt;
mod node;
pub mod object_dict;
pub mod pdo;
pub mod persist;
mod sdo_server;
pub mod storage;
pub mod transport;

// Re-export types used by applications
pub use canstack_common as common;
pub use critical_section;

pub use error::{InitError, PdoKind};
pub use hooks::{BusErrorHook, NmtStateHook, PdoReceiveHook, SdoWriteHook};
pub use node::{init_node, Node, SDO_RESPONSE_QUEUE_DEPTH};
pub use storage::ParameterStorage;
