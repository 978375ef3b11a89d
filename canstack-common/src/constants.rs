//! Constants defining standard objects, special values and emergency codes

/// Object indices for standard objects
pub mod object_ids {
    /// The error register object index
    pub const ERROR_REGISTER: u16 = 0x1001;
    /// The pre-defined error field (error log) object index
    pub const ERROR_LOG: u16 = 0x1003;
    /// Store parameters command object index
    pub const STORE_PARAMETERS: u16 = 0x1010;
    /// Restore default parameters command object index
    pub const RESTORE_DEFAULT_PARAMETERS: u16 = 0x1011;
    /// The heartbeat producer time object index
    pub const HEARTBEAT_PRODUCER_TIME: u16 = 0x1017;
}

/// Special values used to access standard objects
pub mod values {
    /// Payload which triggers parameter storage when written to object 0x1010
    pub const SAVE_CMD: [u8; 4] = *b"save";
    /// Payload which clears stored parameters when written to object 0x1011
    pub const LOAD_CMD: [u8; 4] = *b"load";
}

/// Emergency error codes recorded in the error log
pub mod emcy {
    /// CAN overrun (objects lost)
    pub const CAN_OVERRUN: u32 = 0x8110;
    /// CAN in error passive mode
    pub const CAN_PASSIVE: u32 = 0x8120;
    /// Recovered from bus-off
    pub const CAN_BUS_OFF_RECOVERED: u32 = 0x8140;
    /// PDO not processed due to length error
    pub const PDO_NOT_PROCESSED: u32 = 0x8210;
}
