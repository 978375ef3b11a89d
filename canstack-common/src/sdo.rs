//! Expedited SDO request and response messages
//!
//! Every SDO frame carries eight bytes: the command byte, the little-endian object index, the
//! sub-index, and four bytes of data (or a little-endian abort code).
use crate::messages::{CanFrame, CanId, MessageError, SDO_REQ_BASE, SDO_RESP_BASE};

/// Command byte of an upload (read) request
pub const CMD_READ: u8 = 0x40;
/// Command byte of every successful read response
///
/// The size bits are not filled in; the client knows the width of the object it asked for.
pub const CMD_READ_RESPONSE: u8 = 0x4F;
/// Command byte of a one byte expedited write
pub const CMD_WRITE_1: u8 = 0x2F;
/// Command byte of a two byte expedited write
pub const CMD_WRITE_2: u8 = 0x2B;
/// Command byte of a four byte expedited write
pub const CMD_WRITE_4: u8 = 0x23;
/// Command byte of an expedited write with unspecified size
pub const CMD_WRITE_N: u8 = 0x22;
/// Command byte of a write acknowledgement
pub const CMD_WRITE_RESPONSE: u8 = 0x60;
/// Command byte of an abort
pub const CMD_ABORT: u8 = 0x80;

/// SDO abort codes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum AbortCode {
    /// SDO protocol timed out
    SdoTimeout = 0x0504_0000,
    /// Client/server command specifier not valid or unknown
    InvalidCommandSpecifier = 0x0504_0001,
    /// Out of memory
    OutOfMemory = 0x0504_0005,
    /// Unsupported access to an object
    UnsupportedAccess = 0x0601_0000,
    /// Attempt to read a write only object
    WriteOnly = 0x0601_0001,
    /// Attempt to write a read only object
    ReadOnly = 0x0601_0002,
    /// Object does not exist in the dictionary
    NoSuchObject = 0x0602_0000,
    /// Object cannot be mapped to a PDO
    UnallowedPdo = 0x0604_0041,
    /// The mapped objects would exceed the PDO length
    PdoTooLong = 0x0604_0042,
    /// General parameter incompatibility
    IncompatibleParameter = 0x0604_0043,
    /// Access failed due to a hardware error
    HardwareError = 0x0606_0000,
    /// Length of service parameter does not match
    DataTypeMismatch = 0x0607_0010,
    /// Sub-index does not exist
    NoSuchSubIndex = 0x0609_0011,
    /// Invalid value for parameter
    InvalidValue = 0x0609_0030,
    /// General error
    GeneralError = 0x0800_0000,
    /// Data cannot be transferred or stored to the application
    CantStore = 0x0800_0020,
    /// Data cannot be stored because of local control
    CantStoreLocalControl = 0x0800_0021,
    /// Data cannot be stored because of the present device state
    CantStoreDeviceState = 0x0800_0022,
    /// No data available
    NoData = 0x0800_0024,
}

impl AbortCode {
    /// The 32-bit value carried on the wire
    pub const fn raw(self) -> u32 {
        self as u32
    }
}

impl From<AbortCode> for u32 {
    fn from(code: AbortCode) -> Self {
        code as u32
    }
}

/// An expedited SDO request, as received by a server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdoRequest {
    /// Read an object
    Read {
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
    },
    /// Write up to four bytes to an object
    Write {
        /// Number of valid bytes in `data`, 0 when the command did not specify a size
        len: u8,
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
        /// Value bytes, little endian
        data: [u8; 4],
    },
    /// A request with a command byte this server does not handle
    Unknown {
        /// The command byte found
        command: u8,
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
    },
}

impl SdoRequest {
    /// Decode a request payload
    ///
    /// Payloads shorter than eight bytes are zero padded, so decoding cannot fail; anything that
    /// is not a recognized command comes back as [`SdoRequest::Unknown`].
    pub fn from_payload(payload: &[u8]) -> Self {
        let mut buf = [0u8; 8];
        let n = payload.len().min(8);
        buf[..n].copy_from_slice(&payload[..n]);

        let command = buf[0];
        let index = u16::from_le_bytes([buf[1], buf[2]]);
        let sub = buf[3];
        let data = [buf[4], buf[5], buf[6], buf[7]];

        match command {
            CMD_READ => SdoRequest::Read { index, sub },
            CMD_WRITE_1 | CMD_WRITE_2 | CMD_WRITE_4 | CMD_WRITE_N => {
                let len = match command {
                    CMD_WRITE_1 => 1,
                    CMD_WRITE_2 => 2,
                    CMD_WRITE_4 => 4,
                    _ => 0,
                };
                SdoRequest::Write {
                    len,
                    index,
                    sub,
                    data,
                }
            }
            _ => SdoRequest::Unknown {
                command,
                index,
                sub,
            },
        }
    }

    /// Create a read request
    pub fn read(index: u16, sub: u8) -> Self {
        SdoRequest::Read { index, sub }
    }

    /// Create a write request carrying `value`
    ///
    /// The command byte is chosen from the value length: 1, 2 and 4 bytes get their sized
    /// command, any other length is sent as "size not indicated". At most four bytes are kept.
    pub fn write(index: u16, sub: u8, value: &[u8]) -> Self {
        let n = value.len().min(4);
        let mut data = [0u8; 4];
        data[..n].copy_from_slice(&value[..n]);
        let len = match n {
            1 | 2 | 4 => n as u8,
            _ => 0,
        };
        SdoRequest::Write {
            len,
            index,
            sub,
            data,
        }
    }

    /// The object index addressed by the request
    pub fn index(&self) -> u16 {
        match self {
            SdoRequest::Read { index, .. }
            | SdoRequest::Write { index, .. }
            | SdoRequest::Unknown { index, .. } => *index,
        }
    }

    /// The sub-index addressed by the request
    pub fn sub(&self) -> u8 {
        match self {
            SdoRequest::Read { sub, .. }
            | SdoRequest::Write { sub, .. }
            | SdoRequest::Unknown { sub, .. } => *sub,
        }
    }

    /// Encode the eight byte payload
    pub fn to_bytes(&self) -> [u8; 8] {
        let (command, data) = match self {
            SdoRequest::Read { .. } => (CMD_READ, [0; 4]),
            SdoRequest::Write { len, data, .. } => {
                let command = match len {
                    1 => CMD_WRITE_1,
                    2 => CMD_WRITE_2,
                    4 => CMD_WRITE_4,
                    _ => CMD_WRITE_N,
                };
                (command, *data)
            }
            SdoRequest::Unknown { command, .. } => (*command, [0; 4]),
        };
        let index = self.index().to_le_bytes();
        [
            command,
            index[0],
            index[1],
            self.sub(),
            data[0],
            data[1],
            data[2],
            data[3],
        ]
    }

    /// Build the request frame addressed to the server on `node_id`
    pub fn to_frame(&self, node_id: u8) -> CanFrame {
        CanFrame::new(CanId::std(SDO_REQ_BASE + node_id as u16), &self.to_bytes())
    }
}

/// An expedited SDO response, as sent by a server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdoResponse {
    /// A successful read, carrying the value
    ReadOk {
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
        /// Value bytes, little endian, zero padded
        data: [u8; 4],
    },
    /// Acknowledgement of a write
    WriteOk {
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
    },
    /// The request was refused
    Abort {
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
        /// Raw abort code
        abort_code: u32,
    },
}

impl SdoResponse {
    /// Create a read response carrying up to four value bytes
    pub fn read_ok(index: u16, sub: u8, value: &[u8]) -> Self {
        let n = value.len().min(4);
        let mut data = [0u8; 4];
        data[..n].copy_from_slice(&value[..n]);
        SdoResponse::ReadOk { index, sub, data }
    }

    /// Create an abort response
    pub fn abort(index: u16, sub: u8, code: AbortCode) -> Self {
        SdoResponse::Abort {
            index,
            sub,
            abort_code: code.raw(),
        }
    }

    /// Encode the eight byte payload
    pub fn to_bytes(&self) -> [u8; 8] {
        let (command, index, sub, data) = match *self {
            SdoResponse::ReadOk { index, sub, data } => (CMD_READ_RESPONSE, index, sub, data),
            SdoResponse::WriteOk { index, sub } => (CMD_WRITE_RESPONSE, index, sub, [0; 4]),
            SdoResponse::Abort {
                index,
                sub,
                abort_code,
            } => (CMD_ABORT, index, sub, abort_code.to_le_bytes()),
        };
        let index = index.to_le_bytes();
        [
            command, index[0], index[1], sub, data[0], data[1], data[2], data[3],
        ]
    }

    /// Build the response frame sent by the server on `node_id`
    pub fn to_frame(&self, node_id: u8) -> CanFrame {
        CanFrame::new(CanId::std(SDO_RESP_BASE + node_id as u16), &self.to_bytes())
    }
}

impl TryFrom<&CanFrame> for SdoResponse {
    type Error = MessageError;

    fn try_from(frame: &CanFrame) -> Result<Self, Self::Error> {
        let payload = frame.data();
        if payload.len() < 8 {
            return Err(MessageError::MessageTooShort);
        }
        let index = u16::from_le_bytes([payload[1], payload[2]]);
        let sub = payload[3];
        let data = [payload[4], payload[5], payload[6], payload[7]];
        match payload[0] {
            CMD_READ_RESPONSE => Ok(SdoResponse::ReadOk { index, sub, data }),
            CMD_WRITE_RESPONSE => Ok(SdoResponse::WriteOk { index, sub }),
            CMD_ABORT => Ok(SdoResponse::Abort {
                index,
                sub,
                abort_code: u32::from_le_bytes(data),
            }),
            value => Err(MessageError::InvalidSdoCommand { value }),
        }
    }
}
