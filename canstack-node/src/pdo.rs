//! PDO transmission and reception
//!
//! PDO layouts come from the [`NodeConfig`](canstack_common::config::NodeConfig) and are fixed for
//! the life of a node. They are checked against the dictionary once, by [`validate`], so packing
//! and unpacking never have to fail at run time.
use canstack_common::{
    messages::{CanFrame, CanId},
    pdo::{PdoConfig, MAX_PDOS},
    AtomicCell,
};
use defmt_or_log::{debug, warn};

use crate::error::{
    InitError, MappingTooLongSnafu, MappingWiderThanObjectSnafu, PdoKind, UnalignedMappingSnafu,
    UnknownMappedObjectSnafu, UnsupportedTransmissionTypeSnafu,
};
use crate::object_dict::{find, ODEntry};
use crate::transport::{slots, CanTransport};

const MAX_PDO_BITS: usize = 64;

/// Check every configured PDO against the dictionary
pub fn validate(od: &[ODEntry], kind: PdoKind, pdos: &[Option<PdoConfig>]) -> Result<(), InitError> {
    for (i, pdo) in pdos.iter().enumerate() {
        let Some(pdo) = pdo else { continue };
        let number = i + 1;
        if !pdo.comm.is_async() {
            return UnsupportedTransmissionTypeSnafu {
                kind,
                number,
                value: pdo.comm.transmission_type,
            }
            .fail();
        }
        for m in &pdo.mapping {
            let (index, sub, bits) = (m.index, m.sub, m.bits);
            let entry = find(od, index, sub)
                .filter(|e| e.has_sub(sub))
                .ok_or(InitError::UnknownMappedObject {
                    kind,
                    number,
                    index,
                    sub,
                })?;
            if bits == 0 || bits % 8 != 0 {
                return UnalignedMappingSnafu {
                    kind,
                    number,
                    index,
                    sub,
                    bits,
                }
                .fail();
            }
            if m.bytes() > entry.sub_size(sub) {
                return MappingWiderThanObjectSnafu {
                    kind,
                    number,
                    index,
                    sub,
                    bits,
                }
                .fail();
            }
        }
        let bits = pdo.total_bits();
        if bits > MAX_PDO_BITS {
            return MappingTooLongSnafu { kind, number, bits }.fail();
        }
    }
    Ok(())
}

/// Pack the mapped values of `pdo` into a payload
///
/// Returns the buffer and the number of bytes used.
pub fn pack(od: &[ODEntry], pdo: &PdoConfig) -> ([u8; 8], usize) {
    let mut data = [0u8; 8];
    let mut pos = 0;
    for m in &pdo.mapping {
        let n = m.bytes();
        let value = find(od, m.index, m.sub)
            .and_then(|e| e.read_sub(m.sub).ok())
            .unwrap_or(0);
        if pos + n > data.len() {
            break;
        }
        data[pos..pos + n].copy_from_slice(&value.to_le_bytes()[..n]);
        pos += n;
    }
    (data, pos)
}

/// Copy the fields of a received payload into the mapped objects
///
/// No access check is made. Returns false, writing nothing, when `data` is shorter than the
/// mapping.
pub fn unpack(od: &[ODEntry], pdo: &PdoConfig, data: &[u8]) -> bool {
    if data.len() < pdo.total_bits() / 8 {
        return false;
    }
    let mut pos = 0;
    for m in &pdo.mapping {
        let n = m.bytes();
        let mut value = [0u8; 4];
        value[..n].copy_from_slice(&data[pos..pos + n]);
        pos += n;
        if let Some(entry) = find(od, m.index, m.sub) {
            if let Err(code) = entry.write_sub(m.sub, u32::from_le_bytes(value)) {
                warn!("RPDO write to 0x{:x}sub{} failed: {:x}", m.index, m.sub, code.raw());
            }
        }
    }
    true
}

/// Run-time state of the configured PDOs
#[allow(missing_debug_implementations)]
pub(crate) struct PdoEngine {
    tpdos: [Option<PdoConfig>; MAX_PDOS],
    rpdos: [Option<PdoConfig>; MAX_PDOS],
    /// Time accumulated towards each TPDO's event timer
    tpdo_elapsed: [AtomicCell<u32>; MAX_PDOS],
}

impl PdoEngine {
    pub fn new(tpdos: [Option<PdoConfig>; MAX_PDOS], rpdos: [Option<PdoConfig>; MAX_PDOS]) -> Self {
        Self {
            tpdos,
            rpdos,
            tpdo_elapsed: [const { AtomicCell::new(0) }; MAX_PDOS],
        }
    }

    pub fn reset_timers(&self) {
        for t in &self.tpdo_elapsed {
            t.store(0);
        }
    }

    /// Enabled RPDOs as (number, CAN ID)
    pub fn rpdo_ids(&self) -> impl Iterator<Item = (usize, CanId)> + '_ {
        self.rpdos.iter().enumerate().filter_map(|(i, pdo)| {
            pdo.as_ref()
                .filter(|p| p.comm.enabled())
                .map(|p| (i, p.comm.can_id()))
        })
    }

    /// The RPDO number listening on `id`, if any
    pub fn rpdo_for(&self, id: CanId) -> Option<usize> {
        self.rpdo_ids().find(|(_, rpdo_id)| *rpdo_id == id).map(|(i, _)| i)
    }

    /// Advance the event timers and send every TPDO that is due
    ///
    /// A TPDO whose slot is busy keeps its accumulated time and is tried again next step.
    pub fn transmit(&self, od: &[ODEntry], transport: &CanTransport, elapsed_ms: u32) {
        for (i, pdo) in self.tpdos.iter().enumerate() {
            let Some(pdo) = pdo.as_ref().filter(|p| p.comm.enabled()) else {
                continue;
            };
            let elapsed = self.tpdo_elapsed[i].load().saturating_add(elapsed_ms);
            let event_time = pdo.comm.event_time_ms as u32;
            if event_time != 0 && elapsed < event_time {
                self.tpdo_elapsed[i].store(elapsed);
                continue;
            }
            let (data, len) = pack(od, pdo);
            let frame = CanFrame::new(pdo.comm.can_id(), &data[..len]).with_slot(slots::TPDO_TX + i as u8);
            if transport.send(&frame) {
                self.tpdo_elapsed[i].store(0);
            } else {
                debug!("TPDO{} slot busy", i + 1);
                self.tpdo_elapsed[i].store(elapsed);
            }
        }
    }

    /// Unpack a frame for RPDO `n`
    pub fn receive(&self, od: &[ODEntry], n: usize, frame: &CanFrame) -> bool {
        match self.rpdos.get(n).and_then(|p| p.as_ref()) {
            Some(pdo) => unpack(od, pdo, frame.data()),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_dict::{ArrayField, ScalarField};
    use canstack_common::{
        objects::AccessType,
        pdo::{PdoCommParam, PdoMappingEntry},
    };

    fn pdo(mappings: &[(u16, u8, u8)]) -> PdoConfig {
        let mut pdo = PdoConfig::new(PdoCommParam::new(0x181));
        for (index, sub, bits) in mappings {
            pdo.push_mapping(PdoMappingEntry::new(*index, *sub, *bits))
                .unwrap();
        }
        pdo
    }

    #[test]
    fn test_pack_unpack() {
        let a = ScalarField::<u16>::new(0x1234);
        let b = ScalarField::<u32>::new(0xAABBCCDD);
        let arr = ArrayField::<u8, 2>::new([5, 6]);
        let od = [
            ODEntry::scalar(0x2000, 0, AccessType::Ro, &a),
            ODEntry::scalar(0x2001, 0, AccessType::Ro, &b),
            ODEntry::array(0x2002, AccessType::Ro, &arr),
        ];
        let pdo = pdo(&[(0x2000, 0, 16), (0x2002, 2, 8), (0x2001, 0, 16)]);
        let (data, len) = pack(&od, &pdo);
        assert_eq!(5, len);
        assert_eq!([0x34, 0x12, 6, 0xDD, 0xCC], data[..5]);

        assert!(unpack(&od, &pdo, &[1, 0, 9, 2, 0]));
        assert_eq!(1, a.load());
        assert_eq!([5, 9], arr.load());
        assert_eq!(2, b.load());
        assert!(!unpack(&od, &pdo, &[1, 0]));
    }

    #[test]
    fn test_validate() {
        let a = ScalarField::<u16>::new(0);
        let od = [ODEntry::scalar(0x2000, 0, AccessType::Rw, &a)];
        let ok = [Some(pdo(&[(0x2000, 0, 16)])), None];
        assert_eq!(Ok(()), validate(&od, PdoKind::Tpdo, &ok));

        let missing = [Some(pdo(&[(0x2001, 0, 8)]))];
        assert!(matches!(
            validate(&od, PdoKind::Tpdo, &missing),
            Err(InitError::UnknownMappedObject { number: 1, .. })
        ));
        let unaligned = [None, Some(pdo(&[(0x2000, 0, 12)]))];
        assert!(matches!(
            validate(&od, PdoKind::Rpdo, &unaligned),
            Err(InitError::UnalignedMapping { number: 2, bits: 12, .. })
        ));
        let wide = [Some(pdo(&[(0x2000, 0, 32)]))];
        assert!(matches!(
            validate(&od, PdoKind::Rpdo, &wide),
            Err(InitError::MappingWiderThanObject { .. })
        ));
        let mut sync = pdo(&[(0x2000, 0, 16)]);
        sync.comm.transmission_type = 1;
        assert!(matches!(
            validate(&od, PdoKind::Tpdo, &[Some(sync)]),
            Err(InitError::UnsupportedTransmissionType { value: 1, .. })
        ));
    }
}
