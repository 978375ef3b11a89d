//! Bus error flags and their classification
//!
//! The controller reports errors as a bit mask. The node stack reduces it to one of the four
//! fault confinement states.

/// Bit stuffing error
pub const ERR_STUFF: u32 = 1 << 0;
/// Form error
pub const ERR_FORM: u32 = 1 << 1;
/// No acknowledgement received
pub const ERR_ACK: u32 = 1 << 2;
/// Sent recessive, read dominant
pub const ERR_BIT1: u32 = 1 << 3;
/// Sent dominant, read recessive
pub const ERR_BIT0: u32 = 1 << 4;
/// CRC mismatch
pub const ERR_CRC: u32 = 1 << 5;
/// Error counter passed the passive threshold
pub const ERR_PASSIVE: u32 = 1 << 6;
/// Error counter passed the warning threshold
pub const ERR_WARNING: u32 = 1 << 7;
/// Controller entered bus-off
pub const ERR_BUS_OFF: u32 = 1 << 8;
/// A received frame was overwritten before it was read
pub const ERR_OVERRUN: u32 = 1 << 9;

/// A set of error flags reported by the controller
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorMask(pub u32);

impl ErrorMask {
    /// Returns true if every bit of `flag` is set
    pub fn contains(&self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    /// Returns true if any protocol-level frame error is present
    pub fn has_frame_error(&self) -> bool {
        self.0 & (ERR_STUFF | ERR_FORM | ERR_ACK | ERR_BIT0 | ERR_BIT1 | ERR_CRC) != 0
    }

    /// Reduce the mask to a bus state
    ///
    /// The most severe flag wins.
    pub fn classify(&self) -> BusState {
        if self.contains(ERR_BUS_OFF) {
            BusState::BusOff
        } else if self.contains(ERR_PASSIVE) {
            BusState::ErrorPassive
        } else if self.contains(ERR_WARNING) {
            BusState::ErrorWarning
        } else {
            BusState::ErrorActive
        }
    }
}

impl From<u32> for ErrorMask {
    fn from(value: u32) -> Self {
        ErrorMask(value)
    }
}

/// Fault confinement state of the controller
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusState {
    /// Normal operation
    #[default]
    ErrorActive,
    /// Error counters above the warning limit
    ErrorWarning,
    /// Error counters above the passive limit; the node no longer sends active error flags
    ErrorPassive,
    /// The controller disconnected itself from the bus
    BusOff,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(BusState::ErrorActive, ErrorMask(ERR_CRC).classify());
        assert!(ErrorMask(ERR_CRC).has_frame_error());
        assert_eq!(BusState::ErrorWarning, ErrorMask(ERR_WARNING | ERR_ACK).classify());
        assert_eq!(BusState::ErrorPassive, ErrorMask(ERR_WARNING | ERR_PASSIVE).classify());
        assert_eq!(
            BusState::BusOff,
            ErrorMask(ERR_BUS_OFF | ERR_PASSIVE | ERR_WARNING).classify()
        );
    }
}
