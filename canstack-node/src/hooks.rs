//! Application hooks
//!
//! Hooks are trait objects lent to a [`Node`](crate::Node) for its lifetime. They are called from
//! whichever context drives the node: `on_receive` driven hooks may run in the CAN interrupt, so
//! implementations should be short. Closures of the right shape implement each trait.
use canstack_common::{
    bus::{BusState, ErrorMask},
    messages::NmtState,
};

/// Notified after an SDO write to the dictionary succeeds
pub trait SdoWriteHook: Sync {
    /// `index`/`sub` were written by a remote client
    fn on_sdo_write(&self, index: u16, sub: u8);
}

impl<F: Fn(u16, u8) + Sync> SdoWriteHook for F {
    fn on_sdo_write(&self, index: u16, sub: u8) {
        self(index, sub)
    }
}

/// Notified after an RPDO has been unpacked into the dictionary
pub trait PdoReceiveHook: Sync {
    /// RPDO `pdo` (0 based) was received
    fn on_pdo_received(&self, pdo: usize);
}

impl<F: Fn(usize) + Sync> PdoReceiveHook for F {
    fn on_pdo_received(&self, pdo: usize) {
        self(pdo)
    }
}

/// Notified on every NMT state change
pub trait NmtStateHook: Sync {
    /// The node moved from `old` to `new`
    fn on_state_change(&self, old: NmtState, new: NmtState);
}

impl<F: Fn(NmtState, NmtState) + Sync> NmtStateHook for F {
    fn on_state_change(&self, old: NmtState, new: NmtState) {
        self(old, new)
    }
}

/// Notified of every error report from the controller
pub trait BusErrorHook: Sync {
    /// The controller reported `mask`, classified as `state`
    fn on_bus_error(&self, mask: ErrorMask, state: BusState);
}

impl<F: Fn(ErrorMask, BusState) + Sync> BusErrorHook for F {
    fn on_bus_error(&self, mask: ErrorMask, state: BusState) {
        self(mask, state)
    }
}
