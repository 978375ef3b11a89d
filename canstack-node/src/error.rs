use canstack_common::node_id::InvalidNodeIdError;
use snafu::Snafu;

/// Direction of a PDO named in an [`InitError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PdoKind {
    /// Transmit PDO
    Tpdo,
    /// Receive PDO
    Rpdo,
}

/// Configuration errors detected when a node is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum InitError {
    /// The node ID is out of range
    #[snafu(display("{source}"))]
    InvalidNodeId {
        /// The underlying error
        source: InvalidNodeIdError,
    },
    /// Two dictionary entries claim the same address
    #[snafu(display("Object 0x{index:04x}sub{sub} is declared more than once"))]
    DuplicateEntry {
        /// Object index
        index: u16,
        /// Sub index
        sub: u8,
    },
    /// A PDO maps an object missing from the dictionary
    #[snafu(display("{kind:?}{number} maps missing object 0x{index:04x}sub{sub}"))]
    UnknownMappedObject {
        /// PDO direction
        kind: PdoKind,
        /// PDO number, 1 based
        number: usize,
        /// Mapped index
        index: u16,
        /// Mapped sub index
        sub: u8,
    },
    /// A mapping length is zero or not a whole number of bytes
    #[snafu(display("{kind:?}{number} maps 0x{index:04x}sub{sub} with {bits} bits"))]
    UnalignedMapping {
        /// PDO direction
        kind: PdoKind,
        /// PDO number, 1 based
        number: usize,
        /// Mapped index
        index: u16,
        /// Mapped sub index
        sub: u8,
        /// Mapped length
        bits: u8,
    },
    /// A mapping is longer than the object it maps
    #[snafu(display("{kind:?}{number} maps {bits} bits of the narrower object 0x{index:04x}sub{sub}"))]
    MappingWiderThanObject {
        /// PDO direction
        kind: PdoKind,
        /// PDO number, 1 based
        number: usize,
        /// Mapped index
        index: u16,
        /// Mapped sub index
        sub: u8,
        /// Mapped length
        bits: u8,
    },
    /// The mapped objects do not fit in one frame
    #[snafu(display("{kind:?}{number} maps {bits} bits, more than 64"))]
    MappingTooLong {
        /// PDO direction
        kind: PdoKind,
        /// PDO number, 1 based
        number: usize,
        /// Total mapped length
        bits: usize,
    },
    /// Only the asynchronous transmission types are supported
    #[snafu(display("{kind:?}{number} uses unsupported transmission type {value}"))]
    UnsupportedTransmissionType {
        /// PDO direction
        kind: PdoKind,
        /// PDO number, 1 based
        number: usize,
        /// Configured transmission type
        value: u8,
    },
}
