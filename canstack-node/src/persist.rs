//! Serialization of persisted dictionary values
//!
//! An image is a sequence of records, one per persisted value, followed by a CRC-16 (XMODEM) of
//! all record bytes:
//!
//! | bytes | content                          |
//! |-------|----------------------------------|
//! | 0-1   | object index, little endian      |
//! | 2     | sub-index                        |
//! | 3     | value length in bytes (1, 2, 4)  |
//! | 4..   | value, little endian             |
//!
//! Array entries contribute one record per element. Records for objects no longer present in the
//! dictionary are skipped on restore.
use crc16::{State, XMODEM};
use defmt_or_log::{debug, info, warn};
use snafu::Snafu;

use crate::object_dict::{find, ODEntry, ObjectKind};
use crate::storage::ParameterStorage;

/// Largest image [`save`] and [`load`] can handle
pub const MAX_IMAGE_SIZE: usize = 512;

const RECORD_HEADER_SIZE: usize = 4;
const CRC_SIZE: usize = 2;

/// Error which can be returned while writing or reading an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PersistError {
    /// The image does not fit the buffer
    #[snafu(display("Image needs {needed} bytes, buffer holds {available}"))]
    BufferTooSmall {
        /// Bytes required
        needed: usize,
        /// Bytes available
        available: usize,
    },
    /// The image ends in the middle of a record, or has no checksum
    #[snafu(display("Truncated parameter image"))]
    Truncated,
    /// The checksum does not match the records
    #[snafu(display("Image checksum {found:#06x} does not match computed {expected:#06x}"))]
    BadChecksum {
        /// Checksum computed over the records
        expected: u16,
        /// Checksum stored in the image
        found: u16,
    },
}

fn for_each_persisted(od: &[ODEntry], mut f: impl FnMut(&ODEntry, u8)) {
    for entry in od.iter().filter(|e| e.persist) {
        match entry.kind {
            ObjectKind::Scalar(_) => f(entry, entry.sub),
            ObjectKind::Array(field) => {
                for sub in 1..=field.max_len() {
                    f(entry, sub)
                }
            }
        }
    }
}

/// Size of the image [`serialize`] produces for `od`
pub fn serialized_size(od: &[ODEntry]) -> usize {
    let mut size = CRC_SIZE;
    for_each_persisted(od, |entry, sub| size += RECORD_HEADER_SIZE + entry.sub_size(sub));
    size
}

/// Write the image of `od` into `buf`, returning its length
pub fn serialize(od: &[ODEntry], buf: &mut [u8]) -> Result<usize, PersistError> {
    let needed = serialized_size(od);
    if needed > buf.len() {
        return BufferTooSmallSnafu {
            needed,
            available: buf.len(),
        }
        .fail();
    }

    let mut pos = 0;
    for_each_persisted(od, |entry, sub| {
        let size = entry.sub_size(sub);
        // Sub was produced from the entry's own range, so the read cannot fail
        let value = entry.read_sub(sub).unwrap_or(0);
        buf[pos..pos + 2].copy_from_slice(&entry.index.to_le_bytes());
        buf[pos + 2] = sub;
        buf[pos + 3] = size as u8;
        buf[pos + 4..pos + 4 + size].copy_from_slice(&value.to_le_bytes()[..size]);
        pos += RECORD_HEADER_SIZE + size;
    });
    let crc = State::<XMODEM>::calculate(&buf[..pos]);
    buf[pos..pos + CRC_SIZE].copy_from_slice(&crc.to_le_bytes());
    Ok(pos + CRC_SIZE)
}

/// Apply a previously serialized image to `od`
///
/// The checksum is verified before any value is touched. Returns the number of values restored.
pub fn restore(od: &[ODEntry], image: &[u8]) -> Result<usize, PersistError> {
    if image.len() < CRC_SIZE {
        return TruncatedSnafu.fail();
    }
    let (records, crc) = image.split_at(image.len() - CRC_SIZE);
    let found = u16::from_le_bytes([crc[0], crc[1]]);
    let expected = State::<XMODEM>::calculate(records);
    if found != expected {
        return BadChecksumSnafu { expected, found }.fail();
    }

    let mut restored = 0;
    let mut pos = 0;
    while pos < records.len() {
        let header = records
            .get(pos..pos + RECORD_HEADER_SIZE)
            .ok_or(PersistError::Truncated)?;
        let index = u16::from_le_bytes([header[0], header[1]]);
        let sub = header[2];
        let len = header[3] as usize;
        let start = pos + RECORD_HEADER_SIZE;
        let data = records
            .get(start..start + len)
            .ok_or(PersistError::Truncated)?;
        pos = start + len;

        let Some(entry) = find(od, index, sub).filter(|e| e.persist && e.has_sub(sub)) else {
            warn!("Saved object 0x{:x}sub{} not found in OD", index, sub);
            continue;
        };
        let mut value = [0u8; 4];
        let n = len.min(4);
        value[..n].copy_from_slice(&data[..n]);
        match entry.write_sub(sub, u32::from_le_bytes(value)) {
            Ok(()) => {
                debug!("Restored 0x{:x}sub{}", index, sub);
                restored += 1;
            }
            Err(code) => warn!(
                "Error restoring object 0x{:x}sub{}: {:x}",
                index,
                sub,
                code.raw()
            ),
        }
    }
    Ok(restored)
}

/// Serialize `od` and hand the image to `storage`
pub fn save(od: &[ODEntry], storage: &dyn ParameterStorage) -> Result<usize, PersistError> {
    let mut buf = [0u8; MAX_IMAGE_SIZE];
    let len = serialize(od, &mut buf)?;
    storage.store(&buf[..len]);
    info!("Stored {} byte parameter image", len);
    Ok(len)
}

/// Restore `od` from the image held by `storage`
///
/// Returns `Ok(0)` when nothing is stored.
pub fn load(od: &[ODEntry], storage: &dyn ParameterStorage) -> Result<usize, PersistError> {
    let mut buf = [0u8; MAX_IMAGE_SIZE];
    match storage.load(&mut buf) {
        Some(len) => {
            let restored = restore(od, &buf[..len.min(MAX_IMAGE_SIZE)])?;
            info!("Restored {} values from parameter image", restored);
            Ok(restored)
        }
        None => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_dict::{ArrayField, ScalarField};
    use canstack_common::objects::AccessType;

    #[test]
    fn test_serialize_restore() {
        let a = ScalarField::<u32>::new(42);
        let b = ScalarField::<u16>::new(7);
        let array = ArrayField::<u8, 2>::new([3, 4]);
        let od = [
            ODEntry::scalar(0x2000, 1, AccessType::Rw, &a).persisted(),
            ODEntry::scalar(0x2001, 0, AccessType::Rw, &b),
            ODEntry::array(0x2100, AccessType::Rw, &array).persisted(),
        ];

        let mut buf = [0u8; 64];
        let len = serialize(&od, &mut buf).unwrap();
        assert_eq!(serialized_size(&od), len);
        assert_eq!(8 + 5 + 5 + 2, len);
        assert_eq!([0x00, 0x20, 1, 4, 42, 0, 0, 0], buf[..8]);

        a.store(0);
        b.store(0);
        array.store([0, 0]);
        assert_eq!(Ok(3), restore(&od, &buf[..len]));
        assert_eq!(42, a.load());
        assert_eq!(0, b.load());
        assert_eq!([3, 4], array.load());
    }

    #[test]
    fn test_corrupt_image_is_rejected() {
        let a = ScalarField::<u8>::new(9);
        let od = [ODEntry::scalar(0x2000, 0, AccessType::Rw, &a).persisted()];
        let mut buf = [0u8; 16];
        let len = serialize(&od, &mut buf).unwrap();
        buf[4] = 10;
        a.store(1);
        assert!(matches!(
            restore(&od, &buf[..len]),
            Err(PersistError::BadChecksum { .. })
        ));
        assert_eq!(1, a.load());
        assert_eq!(Err(PersistError::Truncated), restore(&od, &buf[..1]));
    }

    #[test]
    fn test_buffer_too_small() {
        let a = ScalarField::<u32>::new(0);
        let od = [ODEntry::scalar(0x2000, 0, AccessType::Rw, &a).persisted()];
        let mut buf = [0u8; 4];
        assert_eq!(
            Err(PersistError::BufferTooSmall {
                needed: 10,
                available: 4
            }),
            serialize(&od, &mut buf)
        );
    }
}
