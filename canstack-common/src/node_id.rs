//! Node ID type
use snafu::Snafu;

/// The ID of a configured node, in the range 1..=127
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NodeId(u8);

impl NodeId {
    /// Create a node ID, failing for 0 and values above 127
    pub const fn new(value: u8) -> Result<Self, InvalidNodeIdError> {
        if value > 0 && value < 128 {
            Ok(NodeId(value))
        } else {
            Err(InvalidNodeIdError { value })
        }
    }

    /// Get the ID as a u8
    pub const fn raw(&self) -> u8 {
        self.0
    }
}

/// Error returned when constructing a NodeId from an out-of-range value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
#[snafu(display("Invalid node ID {value}, must be 1..=127"))]
pub struct InvalidNodeIdError {
    /// The rejected value
    pub value: u8,
}

impl TryFrom<u8> for NodeId {
    type Error = InvalidNodeIdError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        NodeId::new(value)
    }
}

impl From<NodeId> for u8 {
    fn from(value: NodeId) -> Self {
        value.raw()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_range() {
        assert!(NodeId::new(0).is_err());
        assert_eq!(1, NodeId::new(1).unwrap().raw());
        assert_eq!(127, NodeId::new(127).unwrap().raw());
        assert_eq!(Err(InvalidNodeIdError { value: 128 }), NodeId::try_from(128));
    }
}
