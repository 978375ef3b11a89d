//! Common traits

use crate::messages::{CanFrame, CanId};

/// The hardware driver a node transmits and receives through
///
/// The controller exposes a fixed pool of message-object slots. A node binds each logical message
/// to one slot at init and never moves it. All methods take `&self`, since the driver is shared
/// between the main loop and the CAN interrupt handler.
pub trait CanDriver: Sync {
    /// Load `frame` into `slot` and request transmission
    ///
    /// Completion is reported back to the node through `on_tx_complete(slot)`.
    fn transmit(&self, slot: u8, frame: &CanFrame);

    /// Read the frame last latched in `slot`, if any
    fn receive(&self, slot: u8) -> Option<CanFrame>;

    /// Configure `slot` to accept frames matching `id` under `mask`
    fn configure_rx_slot(&self, slot: u8, id: CanId, mask: u32);

    /// Re-arm the controller after a bus-off condition
    fn recover_bus_off(&self);
}
