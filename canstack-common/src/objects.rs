//! Object dictionary definitions shared by nodes and configuration

/// A container for the address of a sub object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ObjectId {
    /// Object index
    pub index: u16,
    /// Sub index
    pub sub: u8,
}

/// Access type enum
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AccessType {
    /// Read-only
    #[default]
    Ro,
    /// Write-only
    Wo,
    /// Read-write
    Rw,
}

impl AccessType {
    /// Returns true if an object with this access type can be read
    pub fn is_readable(&self) -> bool {
        matches!(self, AccessType::Ro | AccessType::Rw)
    }

    /// Returns true if an object with this access type can be written
    pub fn is_writable(&self) -> bool {
        matches!(self, AccessType::Rw | AccessType::Wo)
    }
}

/// Width of a scalar object, or of each element of an array object
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataWidth {
    /// 8 bit unsigned
    U8,
    /// 16 bit unsigned
    U16,
    /// 32 bit unsigned
    U32,
}

impl DataWidth {
    /// Size in bytes
    pub const fn size(&self) -> usize {
        match self {
            DataWidth::U8 => 1,
            DataWidth::U16 => 2,
            DataWidth::U32 => 4,
        }
    }

    /// Mask of the bits a value of this width can hold
    pub const fn mask(&self) -> u32 {
        match self {
            DataWidth::U8 => 0xFF,
            DataWidth::U16 => 0xFFFF,
            DataWidth::U32 => 0xFFFF_FFFF,
        }
    }
}
