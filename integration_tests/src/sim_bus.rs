//! A simulated CAN controller
//!
//! [`SimDriver`] records every transmission and keeps the receive filters the node configures, so
//! tests can play the part of both the controller and the rest of the bus.
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use canstack_common::{
    messages::{CanFrame, CanId},
    sdo::{SdoRequest, SdoResponse},
    traits::CanDriver,
};
use canstack_node::{transport::slots, Node};

#[derive(Debug, Default)]
pub struct SimDriver {
    sent: Mutex<Vec<(u8, CanFrame)>>,
    filters: Mutex<HashMap<u8, (CanId, u32)>>,
    latched: Mutex<HashMap<u8, CanFrame>>,
    recoveries: AtomicUsize,
}

impl SimDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything transmitted so far, without completing it
    pub fn take_sent(&self) -> Vec<(u8, CanFrame)> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    /// Remove and return everything transmitted so far, reporting each transmission complete
    pub fn flush(&self, node: &Node) -> Vec<CanFrame> {
        let sent = self.take_sent();
        for (slot, _) in &sent {
            node.on_tx_complete(*slot);
        }
        sent.into_iter().map(|(_, frame)| frame).collect()
    }

    /// The filter configured on `slot`
    pub fn filter(&self, slot: u8) -> Option<(CanId, u32)> {
        self.filters.lock().unwrap().get(&slot).copied()
    }

    /// Number of bus-off recoveries requested
    pub fn recoveries(&self) -> usize {
        self.recoveries.load(Ordering::Relaxed)
    }

    /// Latch `frame` into the first receive slot whose filter accepts it, as the controller would,
    /// and raise the receive interrupt on `node`
    ///
    /// Returns false if no slot accepted the frame, or the node did not consume it.
    pub fn deliver(&self, node: &Node, frame: CanFrame) -> bool {
        let slot = {
            let filters = self.filters.lock().unwrap();
            let mut slots: Vec<_> = filters
                .iter()
                .filter(|(_, (id, mask))| {
                    let mut filter = CanFrame::new(*id, &[]);
                    filter.mask = *mask;
                    filter.accepts(frame.id())
                })
                .map(|(slot, _)| *slot)
                .collect();
            slots.sort();
            slots.first().copied()
        };
        match slot {
            Some(slot) => {
                self.latched.lock().unwrap().insert(slot, frame);
                node.on_rx_interrupt(slot)
            }
            None => false,
        }
    }

    /// Send an SDO request to `node` and collect its response
    ///
    /// All pending transmissions are completed. Returns `None` if the node did not answer.
    pub fn sdo_exchange(&self, node: &Node, req: SdoRequest) -> Option<SdoResponse> {
        self.deliver(node, req.to_frame(node.node_id().raw()));
        let sent = self.take_sent();
        for (slot, _) in &sent {
            node.on_tx_complete(*slot);
        }
        sent.iter()
            .find(|(slot, _)| *slot == slots::SDO_TX)
            .and_then(|(_, frame)| SdoResponse::try_from(frame).ok())
    }
}

impl CanDriver for SimDriver {
    fn transmit(&self, slot: u8, frame: &CanFrame) {
        self.sent.lock().unwrap().push((slot, *frame));
    }

    fn receive(&self, slot: u8) -> Option<CanFrame> {
        self.latched.lock().unwrap().remove(&slot)
    }

    fn configure_rx_slot(&self, slot: u8, id: CanId, mask: u32) {
        self.filters.lock().unwrap().insert(slot, (id, mask));
    }

    fn recover_bus_off(&self) {
        self.recoveries.fetch_add(1, Ordering::Relaxed);
    }
}
