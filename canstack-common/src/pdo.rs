//! PDO communication and mapping parameters
use crate::messages::{CanId, RPDO_BASES, TPDO_BASES};
use snafu::Snafu;

/// Maximum number of objects mapped into one PDO
pub const MAX_MAPPINGS: usize = 8;
/// Number of TPDOs, and of RPDOs, a node supports
pub const MAX_PDOS: usize = 4;
/// Bit 31 of a COB-ID: the PDO is disabled when set
pub const COB_ID_DISABLED: u32 = 1 << 31;
/// Bit 29 of a COB-ID: the PDO uses an extended identifier when set
pub const COB_ID_EXTENDED: u32 = 1 << 29;
/// Asynchronous, manufacturer specific transmission type
pub const TRANSMISSION_ASYNC_MANUFACTURER: u8 = 0xFE;
/// Asynchronous, device profile transmission type
pub const TRANSMISSION_ASYNC_PROFILE: u8 = 0xFF;

/// One entry in a PDO mapping table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PdoMappingEntry {
    /// Index of the mapped object
    pub index: u16,
    /// Sub-index of the mapped object
    pub sub: u8,
    /// Number of bits of the object carried in the PDO
    pub bits: u8,
}

impl PdoMappingEntry {
    /// Create a mapping entry
    pub const fn new(index: u16, sub: u8, bits: u8) -> Self {
        Self { index, sub, bits }
    }

    /// Decode the 32-bit value used in mapping parameter objects
    pub const fn from_raw(raw: u32) -> Self {
        Self {
            index: (raw >> 16) as u16,
            sub: (raw >> 8) as u8,
            bits: raw as u8,
        }
    }

    /// Encode as the 32-bit value used in mapping parameter objects
    pub const fn raw(&self) -> u32 {
        ((self.index as u32) << 16) | ((self.sub as u32) << 8) | self.bits as u32
    }

    /// Number of payload bytes this entry occupies
    pub const fn bytes(&self) -> usize {
        self.bits as usize / 8
    }
}

/// Communication parameters of one PDO
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PdoCommParam {
    /// COB-ID, including the disable and extended flags
    pub cob_id: u32,
    /// Transmission type
    pub transmission_type: u8,
    /// Event timer for TPDOs in ms. 0 sends on every step
    pub event_time_ms: u16,
}

impl PdoCommParam {
    /// Create enabled asynchronous parameters on `cob_id`
    pub const fn new(cob_id: u32) -> Self {
        Self {
            cob_id,
            transmission_type: TRANSMISSION_ASYNC_MANUFACTURER,
            event_time_ms: 0,
        }
    }

    /// The pre-defined connection set parameters of TPDO `n` (0 based) on `node_id`
    pub fn default_tpdo(n: usize, node_id: u8) -> Option<Self> {
        TPDO_BASES
            .get(n)
            .map(|base| Self::new(*base as u32 + node_id as u32))
    }

    /// The pre-defined connection set parameters of RPDO `n` (0 based) on `node_id`
    pub fn default_rpdo(n: usize, node_id: u8) -> Option<Self> {
        RPDO_BASES
            .get(n)
            .map(|base| Self::new(*base as u32 + node_id as u32))
    }

    /// Returns true unless the disable bit is set
    pub const fn enabled(&self) -> bool {
        self.cob_id & COB_ID_DISABLED == 0
    }

    /// Returns true for the asynchronous transmission types
    pub const fn is_async(&self) -> bool {
        matches!(
            self.transmission_type,
            TRANSMISSION_ASYNC_MANUFACTURER | TRANSMISSION_ASYNC_PROFILE
        )
    }

    /// The CAN identifier the PDO is sent or received on
    pub const fn can_id(&self) -> CanId {
        if self.cob_id & COB_ID_EXTENDED != 0 {
            CanId::extended(self.cob_id)
        } else {
            CanId::std(self.cob_id as u16)
        }
    }
}

/// Full configuration of one PDO
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PdoConfig {
    /// Communication parameters
    pub comm: PdoCommParam,
    /// Mapped objects, in payload order
    pub mapping: heapless::Vec<PdoMappingEntry, MAX_MAPPINGS>,
}

impl PdoConfig {
    /// Create a PDO with no mapped objects
    pub const fn new(comm: PdoCommParam) -> Self {
        Self {
            comm,
            mapping: heapless::Vec::new(),
        }
    }

    /// Append a mapping entry
    pub fn push_mapping(&mut self, entry: PdoMappingEntry) -> Result<(), PdoConfigError> {
        self.mapping
            .push(entry)
            .map_err(|_| PdoConfigError::TooManyMappings)
    }

    /// Builder-style variant of [`PdoConfig::push_mapping`]
    pub fn with_mapping(mut self, entry: PdoMappingEntry) -> Result<Self, PdoConfigError> {
        self.push_mapping(entry)?;
        Ok(self)
    }

    /// Sum of the mapped bit lengths
    pub fn total_bits(&self) -> usize {
        self.mapping.iter().map(|m| m.bits as usize).sum()
    }
}

/// Errors building a PDO configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Snafu)]
pub enum PdoConfigError {
    /// More than [`MAX_MAPPINGS`] objects were mapped
    #[snafu(display("A PDO holds at most {MAX_MAPPINGS} mappings"))]
    TooManyMappings,
    /// The PDO number is out of range
    #[snafu(display("PDO number {number} out of range"))]
    InvalidNumber {
        /// The rejected PDO number
        number: usize,
    },
}
