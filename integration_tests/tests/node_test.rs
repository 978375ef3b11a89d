use std::thread;

use canstack_common::{
    config::NodeConfig,
    messages::{CanFrame, CanId, NmtState},
    objects::AccessType,
    sdo::SdoRequest,
};
use canstack_node::{
    init_node,
    object_dict::{ODEntry, ScalarField},
    InitError,
};
use integration_tests::{object_dict1::TestObjects, sim_bus::SimDriver};

mod utils;
use utils::{boot, sdo_read};

#[test]
fn test_invalid_node_ids() {
    let objects = TestObjects::new();
    let od = objects.table();
    let driver = SimDriver::new();
    for id in [0, 128, 255] {
        assert!(matches!(
            init_node(id, &od, &driver, NodeConfig::new()),
            Err(InitError::InvalidNodeId { .. })
        ));
    }
    assert!(init_node(127, &od, &driver, NodeConfig::new()).is_ok());
}

#[test]
fn test_duplicate_entries_rejected() {
    let a = ScalarField::<u8>::new(0);
    let b = ScalarField::<u16>::new(0);
    let od = [
        ODEntry::scalar(0x2000, 1, AccessType::Rw, &a),
        ODEntry::scalar(0x2000, 2, AccessType::Rw, &a),
        ODEntry::scalar(0x2000, 1, AccessType::Ro, &b),
    ];
    let driver = SimDriver::new();
    assert_eq!(
        Some(InitError::DuplicateEntry {
            index: 0x2000,
            sub: 1
        }),
        init_node(3, &od, &driver, NodeConfig::new()).err()
    );
    // Distinct sub-indices of one index are fine
    assert!(init_node(3, &od[..2], &driver, NodeConfig::new()).is_ok());
}

#[test]
fn test_unrelated_frames_not_consumed() {
    let objects = TestObjects::new();
    let od = objects.table();
    let driver = SimDriver::new();
    let node = init_node(7, &od, &driver, NodeConfig::new()).unwrap();
    boot(&node, &driver);

    assert!(!node.on_receive(&CanFrame::new(CanId::std(0x123), &[1, 2])));
    assert!(!node.on_receive(&CanFrame::new(CanId::extended(0x607), &[0x40, 0, 0x20, 0])));
    assert!(driver.take_sent().is_empty());
}

#[test]
fn test_set_state() {
    let objects = TestObjects::new();
    let od = objects.table();
    let driver = SimDriver::new();
    let node = init_node(7, &od, &driver, NodeConfig::new()).unwrap();
    boot(&node, &driver);

    node.set_state(NmtState::Operational);
    assert_eq!(NmtState::Operational, node.get_state());

    // Forcing boot-up repeats the boot-up frame
    node.set_state(NmtState::Bootup);
    let sent = boot(&node, &driver);
    assert_eq!(1, sent.len());
    assert_eq!(&[0], sent[0].data());
}

#[test]
fn test_concurrent_receive_and_step() {
    let objects = TestObjects::new();
    let od = objects.table();
    let driver = SimDriver::new();
    let node = init_node(7, &od, &driver, NodeConfig::new()).unwrap();
    boot(&node, &driver);

    thread::scope(|s| {
        s.spawn(|| {
            for i in 0..100u16 {
                let req = SdoRequest::write(0x2001, 0, &i.to_le_bytes());
                driver.deliver(&node, req.to_frame(7));
            }
        });
        for _ in 0..100 {
            node.step(1);
            driver.flush(&node);
        }
    });
    driver.flush(&node);

    assert_eq!(99, objects.u16_rw.load());
    assert_eq!(NmtState::PreOperational, node.get_state());
    assert_eq!(Ok([99, 0, 0, 0]), sdo_read(&node, &driver, 0x2001, 0));
}
