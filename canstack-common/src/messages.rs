//! CAN frames and the fixed-layout messages built on them (NMT commands, heartbeats)
use snafu::Snafu;

/// Mask of the 11 significant bits of a standard identifier
pub const STD_ID_MASK: u16 = 0x7FF;
/// Mask of the 29 significant bits of an extended identifier
pub const EXTENDED_ID_MASK: u32 = 0x1FFF_FFFF;

/// A CAN identifier, either standard (11-bit) or extended (29-bit)
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CanId {
    /// An extended 29-bit identifier
    Extended(u32),
    /// A standard 11-bit identifier
    Std(u16),
}

impl CanId {
    /// Create an extended ID. Bits above bit 28 are dropped.
    pub const fn extended(id: u32) -> CanId {
        CanId::Extended(id & EXTENDED_ID_MASK)
    }

    /// Create a standard ID. Bits above bit 10 are dropped.
    pub const fn std(id: u16) -> CanId {
        CanId::Std(id & STD_ID_MASK)
    }

    /// Get the raw identifier value
    pub fn raw(&self) -> u32 {
        match self {
            CanId::Extended(id) => *id,
            CanId::Std(id) => *id as u32,
        }
    }

    /// Returns true for extended identifiers
    pub fn is_extended(&self) -> bool {
        match self {
            CanId::Extended(_) => true,
            CanId::Std(_) => false,
        }
    }

    /// The acceptance mask which matches exactly this identifier
    pub fn exact_mask(&self) -> u32 {
        match self {
            CanId::Extended(_) => EXTENDED_ID_MASK,
            CanId::Std(_) => STD_ID_MASK as u32,
        }
    }
}

/// Maximum payload of a classic CAN frame
pub const MAX_DATA_LENGTH: usize = 8;

/// A single CAN frame, as exchanged with the driver
///
/// Besides the identifier and payload, a frame records the acceptance mask it was received with
/// and the message-object slot it is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CanFrame {
    /// Frame identifier
    pub id: CanId,
    /// Remote transmission request flag
    pub rtr: bool,
    /// Acceptance mask
    pub mask: u32,
    /// Payload buffer; only the first `dlc` bytes are valid
    pub data: [u8; MAX_DATA_LENGTH],
    /// Payload length
    pub dlc: u8,
    /// Message-object slot the frame is bound to
    pub slot: u8,
}

impl Default for CanFrame {
    fn default() -> Self {
        Self {
            id: CanId::Std(0),
            rtr: false,
            mask: STD_ID_MASK as u32,
            data: [0; MAX_DATA_LENGTH],
            dlc: 0,
            slot: 0,
        }
    }
}

impl CanFrame {
    /// Create a data frame
    ///
    /// Payload bytes beyond [`MAX_DATA_LENGTH`] are dropped.
    pub fn new(id: CanId, data: &[u8]) -> Self {
        let dlc = data.len().min(MAX_DATA_LENGTH);
        let mut buf = [0u8; MAX_DATA_LENGTH];
        buf[..dlc].copy_from_slice(&data[..dlc]);
        Self {
            id,
            rtr: false,
            mask: id.exact_mask(),
            data: buf,
            dlc: dlc as u8,
            slot: 0,
        }
    }

    /// Create a remote frame requesting `dlc` bytes
    pub fn new_remote(id: CanId, dlc: u8) -> Self {
        Self {
            id,
            rtr: true,
            mask: id.exact_mask(),
            dlc: dlc.min(MAX_DATA_LENGTH as u8),
            ..Default::default()
        }
    }

    /// Bind the frame to a message-object slot
    pub fn with_slot(mut self, slot: u8) -> Self {
        self.slot = slot;
        self
    }

    /// Get the frame identifier
    pub fn id(&self) -> CanId {
        self.id
    }

    /// Get the valid part of the payload
    ///
    /// A `dlc` set past [`MAX_DATA_LENGTH`] through the public field is clamped.
    pub fn data(&self) -> &[u8] {
        &self.data[0..(self.dlc as usize).min(MAX_DATA_LENGTH)]
    }

    /// Get the slot this frame is bound to
    pub fn slot(&self) -> u8 {
        self.slot
    }

    /// Check whether `id` passes this frame's acceptance filter
    pub fn accepts(&self, id: CanId) -> bool {
        id.is_extended() == self.id.is_extended() && (id.raw() ^ self.id.raw()) & self.mask == 0
    }
}

/// Identifier of NMT command frames
pub const NMT_CMD_ID: CanId = CanId::Std(0);
/// Base identifier of heartbeat and boot-up frames (node ID is added)
pub const HEARTBEAT_BASE: u16 = 0x700;
/// The base ID for SDO requests (server node ID is added)
pub const SDO_REQ_BASE: u16 = 0x600;
/// The base ID for SDO responses (server node ID is added)
pub const SDO_RESP_BASE: u16 = 0x580;
/// Base identifiers of TPDO1..4 (node ID is added)
pub const TPDO_BASES: [u16; 4] = [0x180, 0x280, 0x380, 0x480];
/// Base identifiers of RPDO1..4 (node ID is added)
pub const RPDO_BASES: [u16; 4] = [0x200, 0x300, 0x400, 0x500];

/// The command specifier byte of an NMT command
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum NmtCommandSpecifier {
    /// Enter Operational
    Start = 0x01,
    /// Enter Stopped
    Stop = 0x02,
    /// Enter Pre-operational
    EnterPreOp = 0x80,
    /// Reset the whole node
    ResetNode = 0x81,
    /// Reset communication parameters
    ResetComm = 0x82,
}

impl NmtCommandSpecifier {
    /// Decode a command byte
    pub fn from_byte(b: u8) -> Result<Self, MessageError> {
        match b {
            0x01 => Ok(Self::Start),
            0x02 => Ok(Self::Stop),
            0x80 => Ok(Self::EnterPreOp),
            0x81 => Ok(Self::ResetNode),
            0x82 => Ok(Self::ResetComm),
            _ => InvalidNmtCommandSnafu { value: b }.fail(),
        }
    }
}

/// An NMT command addressed to a node, or to all nodes when `node` is 0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NmtCommand {
    /// The requested transition
    pub cs: NmtCommandSpecifier,
    /// Target node, 0 for broadcast
    pub node: u8,
}

impl NmtCommand {
    /// Returns true if the command targets `node_id`, directly or by broadcast
    pub fn addresses(&self, node_id: u8) -> bool {
        self.node == 0 || self.node == node_id
    }
}

impl TryFrom<&CanFrame> for NmtCommand {
    type Error = MessageError;

    fn try_from(frame: &CanFrame) -> Result<Self, Self::Error> {
        let payload = frame.data();
        if frame.id() != NMT_CMD_ID {
            UnexpectedIdSnafu {
                cob_id: frame.id(),
                expected: NMT_CMD_ID,
            }
            .fail()
        } else if payload.len() >= 2 {
            let cs = NmtCommandSpecifier::from_byte(payload[0])?;
            Ok(NmtCommand {
                cs,
                node: payload[1],
            })
        } else {
            MessageTooShortSnafu.fail()
        }
    }
}

impl From<NmtCommand> for CanFrame {
    fn from(cmd: NmtCommand) -> Self {
        CanFrame::new(NMT_CMD_ID, &[cmd.cs as u8, cmd.node])
    }
}

/// The NMT state of a node, with the value it carries in heartbeat frames
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum NmtState {
    /// Initializing; left automatically once initialization completes
    #[default]
    Bootup = 0,
    /// Only NMT frames are processed
    Stopped = 4,
    /// SDO and PDO are active
    Operational = 5,
    /// SDO is active, PDO is not
    PreOperational = 127,
}

impl TryFrom<u8> for NmtState {
    type Error = MessageError;

    /// Attempt to convert a heartbeat state code to an NmtState
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use NmtState::*;
        match value {
            x if x == Bootup as u8 => Ok(Bootup),
            x if x == Stopped as u8 => Ok(Stopped),
            x if x == Operational as u8 => Ok(Operational),
            x if x == PreOperational as u8 => Ok(PreOperational),
            _ => InvalidNmtStateSnafu { value }.fail(),
        }
    }
}

/// A heartbeat (or boot-up, when `state` is [`NmtState::Bootup`]) message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    /// The producing node
    pub node: u8,
    /// State of the producing node
    pub state: NmtState,
}

impl From<Heartbeat> for CanFrame {
    fn from(value: Heartbeat) -> Self {
        CanFrame::new(
            CanId::std(HEARTBEAT_BASE | value.node as u16),
            &[value.state as u8],
        )
    }
}

impl TryFrom<&CanFrame> for Heartbeat {
    type Error = MessageError;

    fn try_from(frame: &CanFrame) -> Result<Self, Self::Error> {
        let raw = frame.id().raw();
        if frame.id().is_extended() || raw & !0x7F != HEARTBEAT_BASE as u32 {
            return UnrecognizedIdSnafu { cob_id: frame.id() }.fail();
        }
        let state = *frame.data().first().ok_or(MessageError::MessageTooShort)?;
        Ok(Heartbeat {
            node: (raw & 0x7F) as u8,
            state: (state & 0x7F).try_into()?,
        })
    }
}

/// Errors raised when decoding a frame into a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MessageError {
    /// The payload is shorter than the message requires
    MessageTooShort,
    /// The message ID was not the expected value
    #[snafu(display("Unexpected message ID found: {cob_id:?}, expected: {expected:?}"))]
    UnexpectedId {
        /// The ID found
        cob_id: CanId,
        /// The ID expected
        expected: CanId,
    },
    /// The ID does not belong to the decoded message type
    #[snafu(display("Unrecognized message ID: {cob_id:?}"))]
    UnrecognizedId {
        /// The ID found
        cob_id: CanId,
    },
    /// The NMT command byte is not a known command
    #[snafu(display("Invalid NMT command: {value:#x}"))]
    InvalidNmtCommand {
        /// The byte found
        value: u8,
    },
    /// The NMT state integer in the message is not a valid NMT state
    #[snafu(display("Invalid NMT state: {value}"))]
    InvalidNmtState {
        /// The byte found
        value: u8,
    },
    /// The SDO command byte is not a known server response
    #[snafu(display("Invalid SDO response command: {value:#x}"))]
    InvalidSdoCommand {
        /// The byte found
        value: u8,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oversized_dlc_clamped() {
        let mut frame = CanFrame::new(CanId::std(0x607), &[1, 2, 3, 4, 5, 6, 7, 8]);
        frame.dlc = 15;
        assert_eq!(&[1, 2, 3, 4, 5, 6, 7, 8], frame.data());
        assert_eq!(&[9; 8], CanFrame::new(CanId::std(1), &[9; 12]).data());
    }

    #[test]
    fn test_nmt_command_decode() {
        let frame = CanFrame::new(NMT_CMD_ID, &[0x81, 7]);
        let cmd = NmtCommand::try_from(&frame).unwrap();
        assert_eq!(NmtCommandSpecifier::ResetNode, cmd.cs);
        assert!(cmd.addresses(7));
        assert!(!cmd.addresses(8));

        let broadcast = NmtCommand::try_from(&CanFrame::new(NMT_CMD_ID, &[0x01, 0])).unwrap();
        assert!(broadcast.addresses(42));
    }

    #[test]
    fn test_nmt_command_rejects_unknown_byte() {
        let frame = CanFrame::new(NMT_CMD_ID, &[0x05, 0]);
        assert_eq!(
            Err(MessageError::InvalidNmtCommand { value: 5 }),
            NmtCommand::try_from(&frame)
        );
        let short = CanFrame::new(NMT_CMD_ID, &[0x01]);
        assert_eq!(Err(MessageError::MessageTooShort), NmtCommand::try_from(&short));
    }

    #[test]
    fn test_heartbeat_frame() {
        let frame: CanFrame = Heartbeat {
            node: 7,
            state: NmtState::PreOperational,
        }
        .into();
        assert_eq!(CanId::Std(0x707), frame.id());
        assert_eq!(&[127], frame.data());
        let hb = Heartbeat::try_from(&frame).unwrap();
        assert_eq!(7, hb.node);
        assert_eq!(NmtState::PreOperational, hb.state);
    }

    #[test]
    fn test_acceptance_filter() {
        let mut filter = CanFrame::new(CanId::std(0x200), &[]);
        filter.mask = 0x780;
        assert!(filter.accepts(CanId::std(0x205)));
        assert!(!filter.accepts(CanId::std(0x305)));
        assert!(!filter.accepts(CanId::extended(0x205)));
    }

    #[test]
    fn test_long_payload_is_truncated() {
        let frame = CanFrame::new(CanId::std(1), &[1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(8, frame.dlc);
        assert_eq!(&[1, 2, 3, 4, 5, 6, 7, 8], frame.data());
    }
}
