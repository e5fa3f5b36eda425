//! Node identifier type

use snafu::Snafu;

/// A CANopen node ID
///
/// Valid node IDs are 1..=127; ID 0 addresses the network and is not a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(u8);

impl NodeId {
    /// Create a node ID, validating the range
    pub const fn new(value: u8) -> Result<Self, InvalidNodeIdError> {
        if value > 0 && value < 128 {
            Ok(NodeId(value))
        } else {
            Err(InvalidNodeIdError)
        }
    }

    /// The raw node number
    pub fn raw(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for NodeId {
    type Error = InvalidNodeIdError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NodeId> for u8 {
    fn from(value: NodeId) -> Self {
        value.raw()
    }
}

/// Error returned for node numbers outside 1..=127
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
#[snafu(display("node ID must be in range 1..=127"))]
pub struct InvalidNodeIdError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_is_enforced() {
        assert!(NodeId::new(0).is_err());
        assert!(NodeId::new(128).is_err());
        assert_eq!(5, NodeId::new(5).unwrap().raw());
        assert_eq!(127, NodeId::new(127).unwrap().raw());
    }
}
