use std::sync::Mutex;

use canstack_common::{
    config::NodeConfig,
    messages::{CanFrame, CanId, Heartbeat, NmtCommandSpecifier, NmtState},
};
use canstack_node::{init_node, object_dict::ODEntry, transport::slots};
use integration_tests::{object_dict1::TestObjects, sim_bus::SimDriver};

mod utils;
use utils::{boot, sdo_write, send_nmt};

#[test]
fn test_boot_up() {
    let objects = TestObjects::new();
    let od = objects.table();
    let driver = SimDriver::new();
    let node = init_node(7, &od, &driver, NodeConfig::new()).unwrap();
    assert_eq!(NmtState::Bootup, node.get_state());

    let sent = boot(&node, &driver);
    assert_eq!(1, sent.len());
    assert_eq!(CanId::std(0x707), sent[0].id());
    assert_eq!(&[0], sent[0].data());
    assert_eq!(NmtState::PreOperational, node.get_state());

    // Heartbeat is disabled, nothing further is sent
    node.step(1000);
    assert!(driver.take_sent().is_empty());
}

#[test]
fn test_state_commands() {
    let objects = TestObjects::new();
    let od = objects.table();
    let driver = SimDriver::new();
    let node = init_node(7, &od, &driver, NodeConfig::new()).unwrap();
    boot(&node, &driver);

    assert!(send_nmt(&node, &driver, NmtCommandSpecifier::Start, 7));
    assert_eq!(NmtState::Operational, node.get_state());

    send_nmt(&node, &driver, NmtCommandSpecifier::Stop, 0);
    assert_eq!(NmtState::Stopped, node.get_state());

    // Addressed to another node
    send_nmt(&node, &driver, NmtCommandSpecifier::EnterPreOp, 8);
    assert_eq!(NmtState::Stopped, node.get_state());

    send_nmt(&node, &driver, NmtCommandSpecifier::EnterPreOp, 7);
    assert_eq!(NmtState::PreOperational, node.get_state());

    send_nmt(&node, &driver, NmtCommandSpecifier::Start, 0);
    assert_eq!(NmtState::Operational, node.get_state());
}

#[test]
fn test_commands_ignored_during_boot_up() {
    let objects = TestObjects::new();
    let od = objects.table();
    let driver = SimDriver::new();
    let node = init_node(7, &od, &driver, NodeConfig::new()).unwrap();

    send_nmt(&node, &driver, NmtCommandSpecifier::Start, 7);
    assert_eq!(NmtState::Bootup, node.get_state());
    boot(&node, &driver);
    assert_eq!(NmtState::PreOperational, node.get_state());
}

#[test]
fn test_unknown_command_ignored_in_every_state() {
    let objects = TestObjects::new();
    let od = objects.table();
    let driver = SimDriver::new();
    let node = init_node(7, &od, &driver, NodeConfig::new()).unwrap();
    let unknown = CanFrame::new(CanId::std(0), &[0x05, 7]);

    driver.deliver(&node, unknown);
    assert_eq!(NmtState::Bootup, node.get_state());
    assert!(driver.take_sent().is_empty());
    boot(&node, &driver);

    for (cs, state) in [
        (NmtCommandSpecifier::EnterPreOp, NmtState::PreOperational),
        (NmtCommandSpecifier::Start, NmtState::Operational),
        (NmtCommandSpecifier::Stop, NmtState::Stopped),
    ] {
        send_nmt(&node, &driver, cs, 7);
        assert_eq!(state, node.get_state());
        driver.deliver(&node, unknown);
        node.step(0);
        assert_eq!(state, node.get_state());
        assert!(driver.take_sent().is_empty());
    }
}

#[test]
fn test_reset_communication() {
    let objects = TestObjects::new();
    let od = objects.table();
    let driver = SimDriver::new();
    let node = init_node(7, &od, &driver, NodeConfig::new()).unwrap();
    boot(&node, &driver);
    sdo_write(&node, &driver, 0x2000, 0, &[0x99]).unwrap();
    send_nmt(&node, &driver, NmtCommandSpecifier::Start, 7);

    send_nmt(&node, &driver, NmtCommandSpecifier::ResetComm, 7);
    assert_eq!(NmtState::Bootup, node.get_state());
    let sent = boot(&node, &driver);
    assert_eq!(1, sent.len());
    assert_eq!(&[0], sent[0].data());
    assert_eq!(NmtState::PreOperational, node.get_state());
    // Application values survive a communication reset
    assert_eq!(0x99, objects.u8_rw.load());
}

#[test]
fn test_reset_node_without_storage() {
    let objects = TestObjects::new();
    let od = objects.table();
    let driver = SimDriver::new();
    let node = init_node(7, &od, &driver, NodeConfig::new()).unwrap();
    boot(&node, &driver);
    sdo_write(&node, &driver, 0x2000, 0, &[0x99]).unwrap();

    send_nmt(&node, &driver, NmtCommandSpecifier::ResetNode, 0);
    assert_eq!(NmtState::Bootup, node.get_state());
    assert_eq!(1, boot(&node, &driver).len());
    assert_eq!(0x99, objects.u8_rw.load());
}

#[test]
fn test_state_hook() {
    let objects = TestObjects::new();
    let od = objects.table();
    let driver = SimDriver::new();
    let changes = Mutex::new(Vec::new());
    let hook = |old: NmtState, new: NmtState| changes.lock().unwrap().push((old, new));
    let node = init_node(7, &od, &driver, NodeConfig::new()).unwrap();
    node.register_nmt_state_hook(&hook);

    boot(&node, &driver);
    send_nmt(&node, &driver, NmtCommandSpecifier::Start, 7);
    // Already operational, no change
    send_nmt(&node, &driver, NmtCommandSpecifier::Start, 7);
    send_nmt(&node, &driver, NmtCommandSpecifier::ResetComm, 7);

    use NmtState::*;
    assert_eq!(
        vec![
            (Bootup, PreOperational),
            (PreOperational, Operational),
            (Operational, Bootup)
        ],
        *changes.lock().unwrap()
    );
}

#[test]
fn test_heartbeat_period_from_dictionary() {
    let objects = TestObjects::new();
    let od = objects.table();
    let driver = SimDriver::new();
    let node = init_node(7, &od, &driver, NodeConfig::new()).unwrap();
    boot(&node, &driver);
    sdo_write(&node, &driver, 0x1017, 0, &100u16.to_le_bytes()).unwrap();

    node.step(50);
    assert!(driver.flush(&node).is_empty());
    node.step(50);
    let sent = driver.flush(&node);
    assert_eq!(1, sent.len());
    assert_eq!(
        Ok(Heartbeat {
            node: 7,
            state: NmtState::PreOperational
        }),
        Heartbeat::try_from(&sent[0])
    );

    send_nmt(&node, &driver, NmtCommandSpecifier::Start, 7);
    node.step(100);
    assert_eq!(&[5], driver.flush(&node)[0].data());

    send_nmt(&node, &driver, NmtCommandSpecifier::Stop, 7);
    node.step(100);
    assert_eq!(&[4], driver.flush(&node)[0].data());
}

#[test]
fn test_heartbeat_period_from_config() {
    let od: [ODEntry; 0] = [];
    let driver = SimDriver::new();
    let config = NodeConfig::new().with_heartbeat_period(20);
    let node = init_node(9, &od, &driver, config).unwrap();
    boot(&node, &driver);

    node.step(10);
    assert!(driver.flush(&node).is_empty());
    node.step(10);
    let sent = driver.flush(&node);
    assert_eq!(1, sent.len());
    assert_eq!(CanId::std(0x709), sent[0].id());
    assert_eq!(&[127], sent[0].data());
}

#[test]
fn test_heartbeat_waits_for_busy_slot() {
    let od: [ODEntry; 0] = [];
    let driver = SimDriver::new();
    let config = NodeConfig::new().with_heartbeat_period(10);
    let node = init_node(9, &od, &driver, config).unwrap();
    boot(&node, &driver);

    node.step(10);
    assert_eq!(1, driver.take_sent().len());
    // Not yet completed
    node.step(10);
    assert!(driver.take_sent().is_empty());

    node.on_tx_complete(slots::HEARTBEAT_TX);
    node.step(0);
    assert_eq!(1, driver.take_sent().len());
}
