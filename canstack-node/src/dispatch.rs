//! Routing of received frames by identifier
use canstack_common::{
    messages::{CanId, NMT_CMD_ID, SDO_REQ_BASE},
    NodeId,
};

use crate::pdo::PdoEngine;

/// The service a received frame belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    Nmt,
    Sdo,
    /// RPDO number, 0 based
    Rpdo(usize),
    Unhandled,
}

/// Pick the service for a frame with identifier `id`
///
/// NMT wins over SDO, and SDO over any RPDO configured on a clashing identifier.
pub(crate) fn route(id: CanId, node_id: NodeId, pdo: &PdoEngine) -> Route {
    if id == NMT_CMD_ID {
        Route::Nmt
    } else if id == sdo_request_id(node_id) {
        Route::Sdo
    } else if let Some(n) = pdo.rpdo_for(id) {
        Route::Rpdo(n)
    } else {
        Route::Unhandled
    }
}

/// The identifier SDO requests to `node_id` arrive on
pub(crate) fn sdo_request_id(node_id: NodeId) -> CanId {
    CanId::std(SDO_REQ_BASE + node_id.raw() as u16)
}
