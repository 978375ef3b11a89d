//! The node: ties the transport, dictionary and protocol handlers together
use canstack_common::{
    bus::{BusState, ErrorMask, ERR_OVERRUN},
    config::NodeConfig,
    constants::{emcy, object_ids},
    messages::{CanFrame, Heartbeat, NmtCommand, NmtState, NMT_CMD_ID},
    sdo::SdoRequest,
    traits::CanDriver,
    AtomicCell, NodeId,
};
use core::cell::RefCell;
use critical_section::Mutex;
use defmt_or_log::{debug, info, warn};
use heapless::Deque;
use snafu::ResultExt as _;

use crate::dispatch::{self, Route};
use crate::error::{DuplicateEntrySnafu, InitError, InvalidNodeIdSnafu, PdoKind};
use crate::hooks::{BusErrorHook, NmtStateHook, PdoReceiveHook, SdoWriteHook};
use crate::nmt::{command_action, NmtAction, NmtStateMachine};
use crate::object_dict::{self, find, FaultLog, ODEntry};
use crate::pdo::{self, PdoEngine};
use crate::persist::{self, PersistError};
use crate::sdo_server::{self, SdoContext};
use crate::storage::ParameterStorage;
use crate::transport::{slots, CanTransport};

/// Number of SDO responses which can wait for a busy SDO transmit slot
pub const SDO_RESPONSE_QUEUE_DEPTH: usize = 4;

/// Create a node; see [`Node::new`]
pub fn init_node<'a>(
    node_id: u8,
    od: &'a [ODEntry<'a>],
    driver: &'a dyn CanDriver,
    config: NodeConfig,
) -> Result<Node<'a>, InitError> {
    Node::new(node_id, od, driver, config)
}

/// A CANopen node
///
/// Every method takes `&self`, so one node may be shared between the CAN interrupt handler, which
/// calls [`Node::on_rx_interrupt`] (or [`Node::on_receive`]), [`Node::on_tx_complete`] and
/// [`Node::on_error`], and the main loop, which calls [`Node::step`] periodically.
#[allow(missing_debug_implementations)]
pub struct Node<'a> {
    node_id: NodeId,
    od: &'a [ODEntry<'a>],
    transport: CanTransport<'a>,
    nmt: NmtStateMachine,
    pdo: PdoEngine,
    heartbeat_period_ms: u16,
    heartbeat_elapsed: AtomicCell<u32>,
    /// Responses waiting for the SDO transmit slot, oldest first
    deferred_sdo: Mutex<RefCell<Deque<CanFrame, SDO_RESPONSE_QUEUE_DEPTH>>>,
    deferred_bootup: AtomicCell<Option<CanFrame>>,
    sdo_write_hook: AtomicCell<Option<&'a dyn SdoWriteHook>>,
    pdo_receive_hook: AtomicCell<Option<&'a dyn PdoReceiveHook>>,
    nmt_state_hook: AtomicCell<Option<&'a dyn NmtStateHook>>,
    bus_error_hook: AtomicCell<Option<&'a dyn BusErrorHook>>,
    storage: AtomicCell<Option<&'a dyn ParameterStorage>>,
    fault_log: AtomicCell<Option<&'a dyn FaultLog>>,
}

impl<'a> Node<'a> {
    /// Initialize a node
    ///
    /// The dictionary and PDO configuration are checked here; any inconsistency is returned as
    /// an [`InitError`]. Receive slots are configured on the driver. The node starts in Boot-up
    /// and sends its boot-up frame on the first call to [`Node::step`].
    pub fn new(
        node_id: u8,
        od: &'a [ODEntry<'a>],
        driver: &'a dyn CanDriver,
        config: NodeConfig,
    ) -> Result<Self, InitError> {
        let node_id = NodeId::new(node_id).context(InvalidNodeIdSnafu)?;
        if let Some((index, sub)) = object_dict::find_duplicate(od) {
            return DuplicateEntrySnafu { index, sub }.fail();
        }
        pdo::validate(od, PdoKind::Tpdo, &config.tpdos)?;
        pdo::validate(od, PdoKind::Rpdo, &config.rpdos)?;

        let NodeConfig {
            pending_timeout_ms,
            heartbeat_period_ms,
            tpdos,
            rpdos,
        } = config;

        let node = Self {
            node_id,
            od,
            transport: CanTransport::new(driver, pending_timeout_ms),
            nmt: NmtStateMachine::new(),
            pdo: PdoEngine::new(tpdos, rpdos),
            heartbeat_period_ms,
            heartbeat_elapsed: AtomicCell::new(0),
            deferred_sdo: Mutex::new(RefCell::new(Deque::new())),
            deferred_bootup: AtomicCell::new(None),
            sdo_write_hook: AtomicCell::new(None),
            pdo_receive_hook: AtomicCell::new(None),
            nmt_state_hook: AtomicCell::new(None),
            bus_error_hook: AtomicCell::new(None),
            storage: AtomicCell::new(None),
            fault_log: AtomicCell::new(None),
        };
        node.init_communication();
        info!(
            "Node {} initialized with {} objects",
            node_id.raw(),
            od.len()
        );
        Ok(node)
    }

    /// The node ID
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// The object dictionary
    pub fn od(&self) -> &'a [ODEntry<'a>] {
        self.od
    }

    /// The transport, for inspecting slot and bus state
    pub fn transport(&self) -> &CanTransport<'a> {
        &self.transport
    }

    /// The bus state last reported through [`Node::on_error`]
    pub fn bus_state(&self) -> BusState {
        self.transport.bus_state()
    }

    /// The current NMT state
    pub fn get_state(&self) -> NmtState {
        self.nmt.state()
    }

    /// Force the NMT state
    ///
    /// Setting Boot-up makes the next [`Node::step`] send a boot-up frame, as after a reset.
    pub fn set_state(&self, state: NmtState) {
        if let Some(old) = self.nmt.transition(state) {
            self.state_changed(old, state);
        }
    }

    /// Register a hook called after every successful SDO write
    pub fn register_sdo_write_hook(&self, hook: &'a dyn SdoWriteHook) {
        self.sdo_write_hook.store(Some(hook));
    }

    /// Register a hook called after every RPDO reception
    pub fn register_pdo_receive_hook(&self, hook: &'a dyn PdoReceiveHook) {
        self.pdo_receive_hook.store(Some(hook));
    }

    /// Register a hook called on every NMT state change
    pub fn register_nmt_state_hook(&self, hook: &'a dyn NmtStateHook) {
        self.nmt_state_hook.store(Some(hook));
    }

    /// Register a hook called on every bus error report
    pub fn register_bus_error_hook(&self, hook: &'a dyn BusErrorHook) {
        self.bus_error_hook.store(Some(hook));
    }

    /// Register the log bus faults are recorded in
    ///
    /// Usually this is the [`ErrorLog`](crate::object_dict::ErrorLog) mapped at 0x1003.
    pub fn register_error_log(&self, log: &'a dyn FaultLog) {
        self.fault_log.store(Some(log));
    }

    /// Register parameter storage and restore the image it holds
    ///
    /// The image is restored again on every reset-node command. A corrupt image is reported
    /// and left unapplied; the storage stays registered either way. Returns the number of values
    /// restored.
    pub fn register_parameter_storage(
        &self,
        storage: &'a dyn ParameterStorage,
    ) -> Result<usize, PersistError> {
        self.storage.store(Some(storage));
        self.restore_parameters()
    }

    /// Advance time by `elapsed_ms`
    ///
    /// Drives pending slot timeouts, deferred transmissions, boot-up, heartbeat production and,
    /// in Operational, TPDO transmission.
    pub fn step(&self, elapsed_ms: u32) {
        self.transport.step(elapsed_ms);
        self.flush_deferred();

        if self.nmt.complete_boot() {
            self.state_changed(NmtState::Bootup, NmtState::PreOperational);
            let frame = CanFrame::from(Heartbeat {
                node: self.node_id.raw(),
                state: NmtState::Bootup,
            })
            .with_slot(slots::HEARTBEAT_TX);
            self.send_or_defer(&self.deferred_bootup, frame);
            self.heartbeat_elapsed.store(0);
            return;
        }

        self.produce_heartbeat(elapsed_ms);

        if self.nmt.state() == NmtState::Operational {
            self.pdo.transmit(self.od, &self.transport, elapsed_ms);
        }
    }

    /// Process a received frame
    ///
    /// Returns true if the frame was addressed to this node.
    pub fn on_receive(&self, frame: &CanFrame) -> bool {
        let frame = self.transport.on_receive(frame);
        let state = self.nmt.state();
        match dispatch::route(frame.id(), self.node_id, &self.pdo) {
            Route::Nmt => self.handle_nmt(&frame),
            Route::Sdo if state != NmtState::Stopped => self.handle_sdo(&frame, state),
            Route::Rpdo(n) if state == NmtState::Operational => self.handle_rpdo(n, &frame),
            Route::Sdo | Route::Rpdo(_) => debug!("Frame dropped in state {:?}", state),
            Route::Unhandled => return false,
        }
        true
    }

    /// Read the frame latched in `slot` from the driver and process it
    ///
    /// Returns false if the slot held no frame, or the frame was not for this node.
    pub fn on_rx_interrupt(&self, slot: u8) -> bool {
        match self.transport.driver().receive(slot) {
            Some(frame) => self.on_receive(&frame.with_slot(slot)),
            None => false,
        }
    }

    /// Release `slot` after the driver completed a transmission
    pub fn on_tx_complete(&self, slot: u8) {
        self.transport.on_tx_complete(slot);
    }

    /// Handle an error report from the controller
    ///
    /// Faults are recorded in the registered error log: overruns, every entry into error-passive
    /// and every bus-off recovery.
    pub fn on_error(&self, mask: impl Into<ErrorMask>) -> BusState {
        let mask = mask.into();
        let prev = self.transport.bus_state();
        let state = self.transport.on_error(mask);

        if mask.contains(ERR_OVERRUN) {
            self.record_fault(emcy::CAN_OVERRUN);
        }
        match state {
            BusState::ErrorPassive if prev != BusState::ErrorPassive => {
                self.record_fault(emcy::CAN_PASSIVE)
            }
            BusState::BusOff => self.record_fault(emcy::CAN_BUS_OFF_RECOVERED),
            _ => (),
        }
        if let Some(hook) = self.bus_error_hook.load() {
            hook.on_bus_error(mask, state);
        }
        state
    }

    fn init_communication(&self) {
        let driver = self.transport.driver();
        self.transport.reset();
        driver.configure_rx_slot(slots::NMT_RX, NMT_CMD_ID, NMT_CMD_ID.exact_mask());
        let sdo_id = dispatch::sdo_request_id(self.node_id);
        driver.configure_rx_slot(slots::SDO_RX, sdo_id, sdo_id.exact_mask());
        for (n, id) in self.pdo.rpdo_ids() {
            driver.configure_rx_slot(slots::RPDO_RX + n as u8, id, id.exact_mask());
        }
        self.pdo.reset_timers();
        self.heartbeat_elapsed.store(0);
        critical_section::with(|cs| self.deferred_sdo.borrow_ref_mut(cs).clear());
        self.deferred_bootup.store(None);
    }

    fn restore_parameters(&self) -> Result<usize, PersistError> {
        let Some(storage) = self.storage.load() else {
            return Ok(0);
        };
        persist::load(self.od, storage).inspect_err(|e| {
            warn!("Stored parameters not restored: {:?}", e);
        })
    }

    fn reset(&self, reset_application: bool) {
        info!(
            "Node {} reset ({})",
            self.node_id.raw(),
            if reset_application { "node" } else { "communication" }
        );
        if reset_application {
            // A bad image has already been logged; boot continues on current values
            self.restore_parameters().ok();
        }
        self.init_communication();
        self.set_state(NmtState::Bootup);
    }

    fn state_changed(&self, old: NmtState, new: NmtState) {
        info!("NMT state {:?} -> {:?}", old, new);
        if let Some(hook) = self.nmt_state_hook.load() {
            hook.on_state_change(old, new);
        }
    }

    fn handle_nmt(&self, frame: &CanFrame) {
        let cmd = match NmtCommand::try_from(frame) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!("Bad NMT command: {:?}", e);
                return;
            }
        };
        if !cmd.addresses(self.node_id.raw()) {
            return;
        }
        match command_action(self.nmt.state(), cmd.cs) {
            NmtAction::Enter(state) => self.set_state(state),
            NmtAction::ResetNode => self.reset(true),
            NmtAction::ResetComm => self.reset(false),
            NmtAction::Ignore => debug!("NMT {:?} ignored during boot-up", cmd.cs),
        }
    }

    fn handle_sdo(&self, frame: &CanFrame, state: NmtState) {
        let req = SdoRequest::from_payload(frame.data());
        let ctx = SdoContext {
            state,
            storage: self.storage.load(),
            write_hook: self.sdo_write_hook.load(),
        };
        let resp = sdo_server::handle_request(self.od, &req, &ctx);
        let frame = resp.to_frame(self.node_id.raw()).with_slot(slots::SDO_TX);
        self.queue_sdo_response(frame);
    }

    fn handle_rpdo(&self, n: usize, frame: &CanFrame) {
        if self.pdo.receive(self.od, n, frame) {
            if let Some(hook) = self.pdo_receive_hook.load() {
                hook.on_pdo_received(n);
            }
        } else {
            warn!("RPDO{} frame shorter than its mapping", n + 1);
            self.record_fault(emcy::PDO_NOT_PROCESSED);
        }
    }

    fn produce_heartbeat(&self, elapsed_ms: u32) {
        let period = find(self.od, object_ids::HEARTBEAT_PRODUCER_TIME, 0)
            .and_then(|e| e.read_scalar())
            .unwrap_or(self.heartbeat_period_ms as u32);
        if period == 0 {
            return;
        }
        let elapsed = self.heartbeat_elapsed.load().saturating_add(elapsed_ms);
        if elapsed >= period {
            let frame = CanFrame::from(Heartbeat {
                node: self.node_id.raw(),
                state: self.nmt.state(),
            })
            .with_slot(slots::HEARTBEAT_TX);
            if self.transport.send(&frame) {
                self.heartbeat_elapsed.store(0);
                return;
            }
        }
        self.heartbeat_elapsed.store(elapsed);
    }

    /// Send `frame`, or park it in `deferred` to be retried on the next step
    fn send_or_defer(&self, deferred: &AtomicCell<Option<CanFrame>>, frame: CanFrame) {
        if self.transport.send(&frame) {
            return;
        }
        debug!("Slot {} busy, deferring", frame.slot());
        if deferred.swap(Some(frame)).is_some() {
            warn!("Deferred frame on slot {} replaced", frame.slot());
        }
    }

    /// Queue an SDO response behind any still waiting, then send what the slot allows
    ///
    /// Responses leave in the order their requests arrived.
    fn queue_sdo_response(&self, frame: CanFrame) {
        let queued =
            critical_section::with(|cs| self.deferred_sdo.borrow_ref_mut(cs).push_back(frame));
        if queued.is_err() {
            warn!(
                "SDO response queue full, response to 0x{:x} dropped",
                frame.id().raw()
            );
        }
        self.flush_sdo_responses();
    }

    fn flush_sdo_responses(&self) {
        // Peek, send and pop in one critical section so a frame is never sent twice
        critical_section::with(|cs| {
            let mut queue = self.deferred_sdo.borrow_ref_mut(cs);
            while let Some(frame) = queue.front() {
                if !self.transport.send(frame) {
                    debug!("SDO slot busy, {} responses waiting", queue.len());
                    break;
                }
                queue.pop_front();
            }
        })
    }

    fn flush_deferred(&self) {
        if let Some(frame) = self.deferred_bootup.load() {
            if self.transport.send(&frame) {
                // Leave a frame parked since the load in place
                self.deferred_bootup
                    .fetch_update(|f| (f == Some(frame)).then_some(None))
                    .ok();
            }
        }
        self.flush_sdo_responses();
    }

    fn record_fault(&self, code: u32) {
        if let Some(log) = self.fault_log.load() {
            log.record(code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_dict::{ErrorLog, ScalarField};
    use canstack_common::{messages::CanId, objects::AccessType};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Driver {
        sent: Mutex<Vec<(u8, CanFrame)>>,
        rx: Mutex<Vec<(u8, CanId)>>,
    }

    impl CanDriver for Driver {
        fn transmit(&self, slot: u8, frame: &CanFrame) {
            self.sent.lock().unwrap().push((slot, *frame));
        }

        fn receive(&self, _slot: u8) -> Option<CanFrame> {
            None
        }

        fn configure_rx_slot(&self, slot: u8, id: CanId, _mask: u32) {
            self.rx.lock().unwrap().push((slot, id));
        }

        fn recover_bus_off(&self) {}
    }

    #[test]
    fn test_rx_slots_configured() {
        let driver = Driver::default();
        let od: [ODEntry; 0] = [];
        let _node = Node::new(5, &od, &driver, NodeConfig::new()).unwrap();
        assert_eq!(
            vec![(0, CanId::Std(0)), (1, CanId::Std(0x605))],
            *driver.rx.lock().unwrap()
        );
    }

    #[test]
    fn test_invalid_node_id() {
        let driver = Driver::default();
        assert!(matches!(
            Node::new(0, &[], &driver, NodeConfig::new()),
            Err(InitError::InvalidNodeId { .. })
        ));
    }

    #[test]
    fn test_boot_up_deferred_while_slot_busy() {
        let driver = Driver::default();
        let od: [ODEntry; 0] = [];
        let node = Node::new(5, &od, &driver, NodeConfig::new()).unwrap();
        // Occupy the heartbeat slot
        assert!(node
            .transport()
            .send(&CanFrame::new(CanId::std(0x705), &[]).with_slot(slots::HEARTBEAT_TX)));
        node.step(1);
        assert_eq!(NmtState::PreOperational, node.get_state());
        assert_eq!(1, driver.sent.lock().unwrap().len());

        node.on_tx_complete(slots::HEARTBEAT_TX);
        node.step(1);
        let sent = driver.sent.lock().unwrap();
        assert_eq!(2, sent.len());
        assert_eq!(&[0], sent[1].1.data());
    }

    #[test]
    fn test_fault_recording() {
        let driver = Driver::default();
        let log = ErrorLog::<4>::new();
        let reg = ScalarField::<u8>::new(0);
        let od = [ODEntry::scalar(0x1001, 0, AccessType::Rw, &reg)];
        let node = Node::new(5, &od, &driver, NodeConfig::new()).unwrap();
        node.register_error_log(&log);

        use canstack_common::bus::{ERR_BUS_OFF, ERR_PASSIVE};
        assert_eq!(BusState::ErrorPassive, node.on_error(ERR_PASSIVE));
        assert_eq!(BusState::ErrorPassive, node.on_error(ERR_PASSIVE));
        assert_eq!(BusState::BusOff, node.on_error(ERR_BUS_OFF | ERR_OVERRUN));
        assert_eq!(3, log.len());
        assert_eq!(Some(emcy::CAN_BUS_OFF_RECOVERED), log.recent(1));
        assert_eq!(Some(emcy::CAN_OVERRUN), log.recent(2));
        assert_eq!(Some(emcy::CAN_PASSIVE), log.recent(3));
        // The error register is left to the application
        assert_eq!(0, reg.load());
    }
}
