//! A node with a static object dictionary, driven by a driver which prints every frame
//!
//! Run with `cargo run --example loopback_node`.
use std::sync::Mutex;

use canstack_node::{
    common::{
        config::NodeConfig,
        messages::{CanFrame, CanId, NmtCommand, NmtCommandSpecifier},
        objects::AccessType,
        pdo::{PdoCommParam, PdoConfig, PdoMappingEntry},
        sdo::SdoRequest,
        traits::CanDriver,
    },
    init_node,
    object_dict::{ErrorLog, ODEntry, ScalarField},
};

static ERROR_REGISTER: ScalarField<u8> = ScalarField::<u8>::new(0);
static ERROR_LOG: ErrorLog<8> = ErrorLog::new();
static HEARTBEAT_TIME: ScalarField<u16> = ScalarField::<u16>::new(200);
static COUNTER: ScalarField<u32> = ScalarField::<u32>::new(0);

static OD: [ODEntry<'static>; 4] = [
    ODEntry::scalar(0x1001, 0, AccessType::Rw, &ERROR_REGISTER),
    ODEntry::array(0x1003, AccessType::Rw, &ERROR_LOG),
    ODEntry::scalar(0x1017, 0, AccessType::Rw, &HEARTBEAT_TIME).persisted(),
    ODEntry::scalar(0x2000, 0, AccessType::Ro, &COUNTER),
];

/// Prints transmitted frames, and remembers their slots so the main loop can complete them
#[derive(Default)]
struct PrintDriver {
    in_flight: Mutex<Vec<u8>>,
}

impl CanDriver for PrintDriver {
    fn transmit(&self, slot: u8, frame: &CanFrame) {
        println!("TX slot {slot:2} id {:03x} {:02x?}", frame.id().raw(), frame.data());
        self.in_flight.lock().unwrap().push(slot);
    }

    fn receive(&self, _slot: u8) -> Option<CanFrame> {
        None
    }

    fn configure_rx_slot(&self, slot: u8, id: CanId, mask: u32) {
        println!("RX slot {slot:2} accepts {:03x} mask {mask:03x}", id.raw());
    }

    fn recover_bus_off(&self) {
        println!("Bus-off recovery");
    }
}

fn main() {
    let driver = PrintDriver::default();
    let tpdo = PdoConfig::new(PdoCommParam {
        event_time_ms: 100,
        ..PdoCommParam::new(0x185)
    })
    .with_mapping(PdoMappingEntry::new(0x2000, 0, 32))
    .unwrap();
    let config = NodeConfig::new().with_tpdo(0, tpdo).unwrap();
    let node = init_node(5, &OD, &driver, config).unwrap();
    node.register_error_log(&ERROR_LOG);

    for tick in 0..20u32 {
        COUNTER.store(tick);
        match tick {
            2 => {
                node.on_receive(&SdoRequest::read(0x1017, 0).to_frame(5));
            }
            4 => {
                node.on_receive(
                    &NmtCommand {
                        cs: NmtCommandSpecifier::Start,
                        node: 0,
                    }
                    .into(),
                );
            }
            _ => (),
        }
        node.step(50);
        for slot in driver.in_flight.lock().unwrap().drain(..) {
            node.on_tx_complete(slot);
        }
    }
}
