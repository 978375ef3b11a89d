#![allow(dead_code)]
use canstack_common::{
    messages::{CanFrame, NmtCommand, NmtCommandSpecifier},
    sdo::{SdoRequest, SdoResponse},
};
use canstack_node::Node;
use integration_tests::sim_bus::SimDriver;

/// Run the first step, and return the frames it produced
pub fn boot(node: &Node, driver: &SimDriver) -> Vec<CanFrame> {
    node.step(0);
    driver.flush(node)
}

pub fn sdo_read(node: &Node, driver: &SimDriver, index: u16, sub: u8) -> Result<[u8; 4], u32> {
    match driver.sdo_exchange(node, SdoRequest::read(index, sub)) {
        Some(SdoResponse::ReadOk { data, .. }) => Ok(data),
        Some(SdoResponse::Abort { abort_code, .. }) => Err(abort_code),
        other => panic!("Unexpected response to read: {other:?}"),
    }
}

pub fn sdo_write(
    node: &Node,
    driver: &SimDriver,
    index: u16,
    sub: u8,
    value: &[u8],
) -> Result<(), u32> {
    match driver.sdo_exchange(node, SdoRequest::write(index, sub, value)) {
        Some(SdoResponse::WriteOk { .. }) => Ok(()),
        Some(SdoResponse::Abort { abort_code, .. }) => Err(abort_code),
        other => panic!("Unexpected response to write: {other:?}"),
    }
}

pub fn send_nmt(node: &Node, driver: &SimDriver, cs: NmtCommandSpecifier, target: u8) -> bool {
    driver.deliver(node, NmtCommand { cs, node: target }.into())
}
