//! A dictionary covering every entry kind and access type
use canstack_common::objects::AccessType;
use canstack_node::object_dict::{ArrayField, ErrorLog, ODEntry, ScalarField};

pub struct TestObjects {
    pub error_register: ScalarField<u8>,
    pub error_log: ErrorLog<4>,
    pub store_parameters: ScalarField<u32>,
    pub restore_parameters: ScalarField<u32>,
    pub heartbeat_time: ScalarField<u16>,
    pub u8_rw: ScalarField<u8>,
    pub u16_rw: ScalarField<u16>,
    pub u32_rw: ScalarField<u32>,
    pub u32_ro: ScalarField<u32>,
    pub u32_wo: ScalarField<u32>,
    pub u16_array: ArrayField<u16, 4>,
    pub u8_array_ro: ArrayField<u8, 2>,
    pub u32_array: ArrayField<u32, 2>,
}

impl Default for TestObjects {
    fn default() -> Self {
        Self::new()
    }
}

impl TestObjects {
    pub fn new() -> Self {
        Self {
            error_register: ScalarField::<u8>::new(0),
            error_log: ErrorLog::new(),
            store_parameters: ScalarField::<u32>::new(1),
            restore_parameters: ScalarField::<u32>::new(1),
            heartbeat_time: ScalarField::<u16>::new(0),
            u8_rw: ScalarField::<u8>::new(0x11),
            u16_rw: ScalarField::<u16>::new(0x2222),
            u32_rw: ScalarField::<u32>::new(0x3333_3333),
            u32_ro: ScalarField::<u32>::new(0xDEAD_BEEF),
            u32_wo: ScalarField::<u32>::new(0),
            u16_array: ArrayField::new([1, 2, 3, 4]),
            u8_array_ro: ArrayField::new([0xA, 0xB]),
            u32_array: ArrayField::new([0; 2]),
        }
    }

    pub fn table(&self) -> Vec<ODEntry<'_>> {
        use AccessType::*;
        vec![
            ODEntry::scalar(0x1001, 0, Rw, &self.error_register),
            ODEntry::array(0x1003, Rw, &self.error_log),
            ODEntry::scalar(0x1010, 1, Rw, &self.store_parameters),
            ODEntry::scalar(0x1011, 1, Rw, &self.restore_parameters),
            ODEntry::scalar(0x1017, 0, Rw, &self.heartbeat_time).persisted(),
            ODEntry::scalar(0x2000, 0, Rw, &self.u8_rw).persisted(),
            ODEntry::scalar(0x2001, 0, Rw, &self.u16_rw).persisted(),
            ODEntry::scalar(0x2002, 0, Rw, &self.u32_rw).persisted(),
            ODEntry::scalar(0x2003, 0, Ro, &self.u32_ro),
            ODEntry::scalar(0x2004, 0, Wo, &self.u32_wo),
            ODEntry::array(0x2100, Rw, &self.u16_array).persisted(),
            ODEntry::array(0x2101, Ro, &self.u8_array_ro),
            ODEntry::array(0x2102, Rw, &self.u32_array),
        ]
    }
}
