use std::{sync::Mutex, thread, time::Duration};

use canstack_common::{
    bus::{BusState, ErrorMask, ERR_BUS_OFF, ERR_CRC, ERR_WARNING},
    config::NodeConfig,
    constants::emcy,
    messages::{CanFrame, CanId, NmtCommandSpecifier},
    sdo::SdoRequest,
};
use canstack_node::{init_node, transport::slots};
use integration_tests::{object_dict1::TestObjects, sim_bus::SimDriver};

mod utils;
use utils::{boot, sdo_read, send_nmt};

#[test]
fn test_receive_slot_plan() {
    let objects = TestObjects::new();
    let od = objects.table();
    let driver = SimDriver::new();
    let _node = init_node(7, &od, &driver, NodeConfig::new()).unwrap();

    assert_eq!(Some((CanId::std(0), 0x7FF)), driver.filter(slots::NMT_RX));
    assert_eq!(Some((CanId::std(0x607), 0x7FF)), driver.filter(slots::SDO_RX));
    assert_eq!(None, driver.filter(slots::RPDO_RX));
}

#[test]
fn test_rx_interrupt() {
    let objects = TestObjects::new();
    let od = objects.table();
    let driver = SimDriver::new();
    let node = init_node(7, &od, &driver, NodeConfig::new()).unwrap();
    boot(&node, &driver);

    // Nothing latched
    assert!(!node.on_rx_interrupt(slots::SDO_RX));

    let frame = SdoRequest::read(0x2000, 0).to_frame(7);
    assert!(driver.deliver(&node, frame));
    assert_eq!(
        Some(frame.with_slot(slots::SDO_RX)),
        node.transport().last_received()
    );
}

#[test]
fn test_pending_slot_times_out() {
    let objects = TestObjects::new();
    let od = objects.table();
    let driver = SimDriver::new();
    let config = NodeConfig::new().with_pending_timeout(50);
    let node = init_node(7, &od, &driver, config).unwrap();
    boot(&node, &driver);

    // The response is never completed
    driver.deliver(&node, SdoRequest::read(0x2000, 0).to_frame(7));
    assert_eq!(1, driver.take_sent().len());
    node.step(49);
    assert!(node.transport().is_pending(slots::SDO_TX));
    node.step(1);
    assert!(!node.transport().is_pending(slots::SDO_TX));

    assert_eq!(Ok([0x11, 0, 0, 0]), sdo_read(&node, &driver, 0x2000, 0));
}

#[test]
fn test_slot_free_after_one_timeout_step() {
    let objects = TestObjects::new();
    let od = objects.table();
    let driver = SimDriver::new();
    let node = init_node(7, &od, &driver, NodeConfig::new()).unwrap();
    boot(&node, &driver);

    driver.deliver(&node, SdoRequest::read(0x2000, 0).to_frame(7));
    assert_eq!(1, driver.take_sent().len());
    node.step(50);
    assert!(!node.transport().is_pending(slots::SDO_TX));
    let frame = CanFrame::new(CanId::std(0x587), &[0; 8]).with_slot(slots::SDO_TX);
    assert!(node.transport().send(&frame));
}

#[test]
fn test_reset_releases_pending_slots() {
    let objects = TestObjects::new();
    let od = objects.table();
    let driver = SimDriver::new();
    let node = init_node(7, &od, &driver, NodeConfig::new()).unwrap();
    boot(&node, &driver);

    driver.deliver(&node, SdoRequest::read(0x2000, 0).to_frame(7));
    assert!(node.transport().is_pending(slots::SDO_TX));
    send_nmt(&node, &driver, NmtCommandSpecifier::ResetComm, 7);
    assert!(!node.transport().is_pending(slots::SDO_TX));
}

#[test]
fn test_force_send_waits_for_completion() {
    let objects = TestObjects::new();
    let od = objects.table();
    let driver = SimDriver::new();
    let node = init_node(7, &od, &driver, NodeConfig::new()).unwrap();
    boot(&node, &driver);

    let frame = CanFrame::new(CanId::std(0x587), &[0; 8]).with_slot(slots::SDO_TX);
    assert!(node.transport().send(&frame));
    assert!(!node.transport().send(&frame));

    thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(20));
            node.on_tx_complete(slots::SDO_TX);
        });
        assert!(node.transport().force_send(&frame));
    });
    assert_eq!(2, driver.take_sent().len());
    assert!(node.transport().is_pending(slots::SDO_TX));
}

#[test]
fn test_invalid_slot_rejected() {
    let objects = TestObjects::new();
    let od = objects.table();
    let driver = SimDriver::new();
    let node = init_node(7, &od, &driver, NodeConfig::new()).unwrap();

    let frame = CanFrame::new(CanId::std(0x123), &[1]).with_slot(32);
    assert!(!node.transport().send(&frame));
    assert!(!node.transport().force_send(&frame));
    assert!(driver.take_sent().is_empty());
}

#[test]
fn test_bus_errors() {
    let objects = TestObjects::new();
    let od = objects.table();
    let driver = SimDriver::new();
    let reports = Mutex::new(Vec::new());
    let hook = |mask: ErrorMask, state: BusState| reports.lock().unwrap().push((mask, state));
    let node = init_node(7, &od, &driver, NodeConfig::new()).unwrap();
    node.register_bus_error_hook(&hook);
    node.register_error_log(&objects.error_log);

    assert_eq!(BusState::ErrorWarning, node.on_error(ERR_WARNING | ERR_CRC));
    assert_eq!(0, driver.recoveries());
    assert_eq!(BusState::BusOff, node.on_error(ERR_BUS_OFF));
    assert_eq!(1, driver.recoveries());
    assert_eq!(BusState::BusOff, node.bus_state());
    assert_eq!(BusState::ErrorActive, node.on_error(0u32));

    assert_eq!(
        vec![
            (ErrorMask(ERR_WARNING | ERR_CRC), BusState::ErrorWarning),
            (ErrorMask(ERR_BUS_OFF), BusState::BusOff),
            (ErrorMask(0), BusState::ErrorActive),
        ],
        *reports.lock().unwrap()
    );
    assert_eq!(1, objects.error_log.len());
    assert_eq!(Some(emcy::CAN_BUS_OFF_RECOVERED), objects.error_log.recent(1));
}
