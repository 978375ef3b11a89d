//! Object Dictionary
//!
//! # Objects Overview
//!
//! The object dictionary is a table of [`ODEntry`], each binding an address to a typed storage
//! location. Entries come in two kinds:
//!
//! - Scalar: a single u8, u16 or u32 value, addressed by (index, sub).
//! - Array: N elements of one width, addressed by index alone. Sub 1..=N select an element; sub 0
//!   reads back N.
//!
//! The table itself is immutable and borrowed by the node for its whole life. Only the values
//! behind it change, and every value lives in a `critical_section` protected cell, so the table
//! can be shared between the CAN interrupt and the main loop.
//!
//! # Declaring a dictionary
//!
//! ```rust
//! use canstack_node::object_dict::{ArrayField, ODEntry, ScalarField};
//! use canstack_node::common::objects::AccessType;
//!
//! static ERROR_REGISTER: ScalarField<u8> = ScalarField::<u8>::new(0);
//! static HEARTBEAT_TIME: ScalarField<u16> = ScalarField::<u16>::new(1000);
//! static ANALOG_IN: ArrayField<u16, 4> = ArrayField::new([0; 4]);
//!
//! static OD: [ODEntry<'static>; 3] = [
//!     ODEntry::scalar(0x1001, 0, AccessType::Ro, &ERROR_REGISTER),
//!     ODEntry::scalar(0x1017, 0, AccessType::Rw, &HEARTBEAT_TIME).persisted(),
//!     ODEntry::array(0x2000, AccessType::Ro, &ANALOG_IN),
//! ];
//! ```
//!
//! Custom storage can be provided by implementing [`ScalarAccess`] or [`ArrayAccess`].

mod fields;

pub use fields::*;

use canstack_common::{
    objects::{AccessType, DataWidth},
    sdo::AbortCode,
};

/// The storage behind an entry
#[derive(Clone, Copy)]
pub enum ObjectKind<'a> {
    /// A single value
    Scalar(&'a dyn ScalarAccess),
    /// An array of values, addressed by sub-index
    Array(&'a dyn ArrayAccess),
}

impl core::fmt::Debug for ObjectKind<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ObjectKind::Scalar(field) => write!(f, "Scalar({:?})", field.width()),
            ObjectKind::Array(field) => {
                write!(f, "Array({:?}; {})", field.width(), field.max_len())
            }
        }
    }
}

/// One object in the dictionary
#[derive(Clone, Copy, Debug)]
pub struct ODEntry<'a> {
    /// Object index
    pub index: u16,
    /// Sub index; ignored for arrays
    pub sub: u8,
    /// Access permitted over SDO
    pub access: AccessType,
    /// Included in stored parameter images
    pub persist: bool,
    /// Storage
    pub kind: ObjectKind<'a>,
}

impl<'a> ODEntry<'a> {
    /// Declare a scalar entry
    pub const fn scalar(
        index: u16,
        sub: u8,
        access: AccessType,
        field: &'a dyn ScalarAccess,
    ) -> Self {
        Self {
            index,
            sub,
            access,
            persist: false,
            kind: ObjectKind::Scalar(field),
        }
    }

    /// Declare an array entry
    pub const fn array(index: u16, access: AccessType, field: &'a dyn ArrayAccess) -> Self {
        Self {
            index,
            sub: 0,
            access,
            persist: false,
            kind: ObjectKind::Array(field),
        }
    }

    /// Mark the entry for inclusion in stored parameter images
    pub const fn persisted(mut self) -> Self {
        self.persist = true;
        self
    }

    /// Returns true for array entries
    pub fn is_array(&self) -> bool {
        matches!(self.kind, ObjectKind::Array(_))
    }

    /// Width of the value, or of each element for arrays
    pub fn width(&self) -> DataWidth {
        match self.kind {
            ObjectKind::Scalar(field) => field.width(),
            ObjectKind::Array(field) => field.width(),
        }
    }

    /// Read a scalar entry
    ///
    /// Returns `None` for arrays.
    pub fn read_scalar(&self) -> Option<u32> {
        match self.kind {
            ObjectKind::Scalar(field) => Some(field.load_u32()),
            ObjectKind::Array(_) => None,
        }
    }

    /// Write a scalar entry from little endian bytes
    ///
    /// Exactly the object width is taken from `bytes`; missing bytes read as zero and extra bytes
    /// are ignored.
    pub fn write_scalar(&self, bytes: &[u8]) -> Result<(), AbortCode> {
        match self.kind {
            ObjectKind::Scalar(field) => {
                let mut buf = [0u8; 4];
                let n = bytes.len().min(field.width().size());
                buf[..n].copy_from_slice(&bytes[..n]);
                field.store_u32(u32::from_le_bytes(buf));
                Ok(())
            }
            ObjectKind::Array(_) => Err(AbortCode::UnsupportedAccess),
        }
    }

    /// Read array element `i`
    ///
    /// Returns `None` for scalars and for elements out of range.
    pub fn array_get(&self, i: u8) -> Option<u32> {
        match self.kind {
            ObjectKind::Array(field) => field.get(i),
            ObjectKind::Scalar(_) => None,
        }
    }

    /// Write array element `i`
    pub fn array_set(&self, i: u8, value: u32) -> Result<(), AbortCode> {
        match self.kind {
            ObjectKind::Array(field) => field.set(i, value),
            ObjectKind::Scalar(_) => Err(AbortCode::UnsupportedAccess),
        }
    }

    /// Read the value at `sub`
    ///
    /// For arrays, sub 0 gives the element count. Access permissions are not checked.
    pub fn read_sub(&self, sub: u8) -> Result<u32, AbortCode> {
        match self.kind {
            ObjectKind::Scalar(field) => Ok(field.load_u32()),
            ObjectKind::Array(field) if sub == 0 => Ok(field.max_len() as u32),
            ObjectKind::Array(field) => field.get(sub).ok_or(AbortCode::NoSuchObject),
        }
    }

    /// Write the value at `sub`
    ///
    /// Access permissions are not checked.
    pub fn write_sub(&self, sub: u8, value: u32) -> Result<(), AbortCode> {
        match self.kind {
            ObjectKind::Scalar(field) => {
                field.store_u32(value);
                Ok(())
            }
            ObjectKind::Array(field) => field.set(sub, value),
        }
    }

    /// Size in bytes of the value at `sub`
    pub fn sub_size(&self, sub: u8) -> usize {
        match self.kind {
            ObjectKind::Array(_) if sub == 0 => 1,
            _ => self.width().size(),
        }
    }

    /// Returns true if `sub` addresses a value held by this entry
    pub fn has_sub(&self, sub: u8) -> bool {
        match self.kind {
            ObjectKind::Scalar(_) => sub == self.sub,
            ObjectKind::Array(field) => sub <= field.max_len(),
        }
    }
}

/// Find the entry for (index, sub)
///
/// Array entries match on index alone; bounds checks on the sub-index are left to the caller.
pub fn find<'e, 'a>(od: &'e [ODEntry<'a>], index: u16, sub: u8) -> Option<&'e ODEntry<'a>> {
    od.iter().find(|entry| match entry.kind {
        ObjectKind::Scalar(_) => entry.index == index && entry.sub == sub,
        ObjectKind::Array(_) => entry.index == index,
    })
}

/// Find the first address declared twice in `od`
///
/// An array claims every sub-index of its index.
pub(crate) fn find_duplicate(od: &[ODEntry]) -> Option<(u16, u8)> {
    for (i, a) in od.iter().enumerate() {
        for b in &od[i + 1..] {
            if a.index == b.index && (a.is_array() || b.is_array() || a.sub == b.sub) {
                return Some((b.index, b.sub));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find() {
        let scalar0 = ScalarField::<u8>::new(1);
        let scalar1 = ScalarField::<u32>::new(2);
        let array = ArrayField::<u16, 2>::new([3, 4]);
        let od = [
            ODEntry::scalar(0x2000, 0, AccessType::Rw, &scalar0),
            ODEntry::scalar(0x2000, 1, AccessType::Ro, &scalar1),
            ODEntry::array(0x2100, AccessType::Rw, &array),
        ];

        assert_eq!(Some(1), find(&od, 0x2000, 0).and_then(|e| e.read_scalar()));
        assert_eq!(Some(2), find(&od, 0x2000, 1).and_then(|e| e.read_scalar()));
        assert!(find(&od, 0x2000, 2).is_none());
        let entry = find(&od, 0x2100, 9).unwrap();
        assert!(entry.is_array());
        assert!(!entry.has_sub(9));
        assert_eq!(Ok(2), entry.read_sub(0));
        assert_eq!(Ok(4), entry.read_sub(2));
        assert_eq!(Err(AbortCode::NoSuchObject), entry.read_sub(3));
        assert_eq!(None, entry.read_scalar());
    }

    #[test]
    fn test_write_scalar_takes_object_width() {
        let field = ScalarField::<u16>::new(0);
        let entry = ODEntry::scalar(0x2000, 0, AccessType::Rw, &field);
        entry.write_scalar(&[0x34, 0x12, 0xFF, 0xFF]).unwrap();
        assert_eq!(0x1234, field.load());
        entry.write_scalar(&[0x05]).unwrap();
        assert_eq!(5, field.load());
        assert_eq!(Err(AbortCode::UnsupportedAccess), entry.array_set(1, 0));
    }

    #[test]
    fn test_duplicates() {
        let a = ScalarField::<u8>::new(0);
        let array = ArrayField::<u8, 2>::new([0; 2]);
        let ok = [
            ODEntry::scalar(0x2000, 0, AccessType::Rw, &a),
            ODEntry::scalar(0x2000, 1, AccessType::Rw, &a),
        ];
        assert_eq!(None, find_duplicate(&ok));
        let clash = [
            ODEntry::array(0x2000, AccessType::Rw, &array),
            ODEntry::scalar(0x2000, 3, AccessType::Rw, &a),
        ];
        assert_eq!(Some((0x2000, 3)), find_duplicate(&clash));
    }
}
