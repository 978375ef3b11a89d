//! Raw frame transport over the controller's message-object slots
//!
//! Every logical message a node sends or receives is bound to one of [`NUM_SLOTS`] hardware
//! slots by the fixed plan in [`slots`]. A transmit slot is *pending* from the moment a frame is
//! handed to the driver until the driver reports completion, or until it has been pending longer
//! than the configured timeout.
use canstack_common::{
    bus::{BusState, ErrorMask},
    messages::CanFrame,
    traits::CanDriver,
    AtomicCell,
};
use defmt_or_log::{debug, error, warn};

/// Number of message-object slots on the controller
pub const NUM_SLOTS: usize = 32;

/// The fixed slot plan
pub mod slots {
    /// NMT command reception
    pub const NMT_RX: u8 = 0;
    /// SDO request reception
    pub const SDO_RX: u8 = 1;
    /// SDO response transmission
    pub const SDO_TX: u8 = 2;
    /// Heartbeat and boot-up transmission
    pub const HEARTBEAT_TX: u8 = 3;
    /// First TPDO slot; TPDO n (0 based) uses `TPDO_TX + n`
    pub const TPDO_TX: u8 = 4;
    /// First RPDO slot; RPDO n (0 based) uses `RPDO_RX + n`
    pub const RPDO_RX: u8 = 8;
}

/// Send/receive bookkeeping on top of a [`CanDriver`]
#[allow(missing_debug_implementations)]
pub struct CanTransport<'a> {
    driver: &'a dyn CanDriver,
    /// `Some(elapsed_ms)` while a slot is pending
    slots: [AtomicCell<Option<u32>>; NUM_SLOTS],
    rx_buffer: AtomicCell<Option<CanFrame>>,
    pending_timeout_ms: u32,
    bus_state: AtomicCell<BusState>,
}

impl<'a> CanTransport<'a> {
    /// Create a transport with every slot idle
    pub const fn new(driver: &'a dyn CanDriver, pending_timeout_ms: u32) -> Self {
        Self {
            driver,
            slots: [const { AtomicCell::new(None) }; NUM_SLOTS],
            rx_buffer: AtomicCell::new(None),
            pending_timeout_ms,
            bus_state: AtomicCell::new(BusState::ErrorActive),
        }
    }

    /// The underlying driver
    pub fn driver(&self) -> &'a dyn CanDriver {
        self.driver
    }

    /// Transmit `frame` on its slot
    ///
    /// Returns false without blocking if the slot is still pending, or does not exist.
    pub fn send(&self, frame: &CanFrame) -> bool {
        let Some(slot) = self.slots.get(frame.slot() as usize) else {
            warn!("Attempt to send on invalid slot {}", frame.slot());
            return false;
        };
        // Claim the slot and zero its timer in one critical section
        let claimed = slot
            .fetch_update(|state| match state {
                None => Some(Some(0)),
                Some(_) => None,
            })
            .is_ok();
        if claimed {
            self.driver.transmit(frame.slot(), frame);
        }
        claimed
    }

    /// Transmit `frame`, spinning until its slot is free
    ///
    /// Must not be called at the priority of the transmit completion interrupt, or it will never
    /// return. Returns false only for an invalid slot.
    pub fn force_send(&self, frame: &CanFrame) -> bool {
        if frame.slot() as usize >= NUM_SLOTS {
            return self.send(frame);
        }
        while !self.send(frame) {
            core::hint::spin_loop();
        }
        true
    }

    /// Latch a received frame into the receive buffer, returning the buffered copy
    pub fn on_receive(&self, frame: &CanFrame) -> CanFrame {
        self.rx_buffer.store(Some(*frame));
        *frame
    }

    /// The last frame passed to [`CanTransport::on_receive`]
    pub fn last_received(&self) -> Option<CanFrame> {
        self.rx_buffer.load()
    }

    /// Mark `slot` as free after the driver finished transmitting
    pub fn on_tx_complete(&self, slot: u8) {
        if let Some(slot) = self.slots.get(slot as usize) {
            slot.store(None);
        }
    }

    /// Returns true while `slot` is pending
    pub fn is_pending(&self, slot: u8) -> bool {
        self.slots
            .get(slot as usize)
            .is_some_and(|s| s.load().is_some())
    }

    /// Forget every pending transmission
    pub fn reset(&self) {
        for slot in &self.slots {
            slot.store(None);
        }
        self.rx_buffer.store(None);
    }

    /// The bus state reported by the last call to [`CanTransport::on_error`]
    pub fn bus_state(&self) -> BusState {
        self.bus_state.load()
    }

    /// Classify an error report from the controller
    ///
    /// On bus-off the controller is re-armed through the driver before returning.
    pub fn on_error(&self, mask: ErrorMask) -> BusState {
        let state = mask.classify();
        let prev = self.bus_state.swap(state);
        if state != prev {
            warn!("CAN bus state {:?} -> {:?}", prev, state);
        }
        if mask.has_frame_error() {
            debug!("CAN frame error, flags {:x}", mask.0);
        }
        if state == BusState::BusOff {
            error!("CAN bus-off, recovering");
            self.driver.recover_bus_off();
        }
        state
    }

    /// Advance the pending timers of every slot by `elapsed_ms`
    ///
    /// A slot pending for the full timeout is released. Returns the number of slots released.
    pub fn step(&self, elapsed_ms: u32) -> usize {
        let limit = self.pending_timeout_ms;
        let mut expired = 0;
        for (i, slot) in self.slots.iter().enumerate() {
            let res = slot.fetch_update(|state| {
                let elapsed = state?.saturating_add(elapsed_ms);
                if elapsed >= limit {
                    Some(None)
                } else {
                    Some(Some(elapsed))
                }
            });
            if let Ok(Some(elapsed)) = res {
                if elapsed.saturating_add(elapsed_ms) >= limit {
                    warn!("Slot {} timed out without completion", i);
                    expired += 1;
                }
            }
        }
        expired
    }
}
