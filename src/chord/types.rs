use std::collections::HashMap;
use std::fmt;

use crate::chord::finger::FingerEntry;
use crate::chord::id::{Identifier, IdentifierSpace};
use crate::error::ChordError;

/// A peer as known to some node: its ring position and where to reach it.
///
/// Every node owns its own copies; there is no central registry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeDescriptor {
    pub id: Identifier,
    pub address: String,
}

impl NodeDescriptor {
    pub fn new(id: Identifier, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
        }
    }

    /// Builds the descriptor a node at `address` would announce for itself.
    pub fn from_address(space: &IdentifierSpace, address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            id: space.node_id(&address),
            address,
        }
    }
}

impl fmt::Display for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.address)
    }
}

/// Key type for storing data in the DHT
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Key(pub Vec<u8>);

impl From<&str> for Key {
    fn from(key: &str) -> Self {
        Key(key.as_bytes().to_vec())
    }
}

/// Value type for storing data in the DHT
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Value(pub Vec<u8>);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value(value.as_bytes().to_vec())
    }
}

/// Address to identifier mappings for every peer this node has heard of.
///
/// Hashing the address is the only way to check a caller-asserted identifier,
/// so results are memoised here.
#[derive(Debug, Default)]
pub struct PeerDirectory {
    peers: HashMap<String, Identifier>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &str) -> Option<Identifier> {
        self.peers.get(address).copied()
    }

    pub fn record(&mut self, node: &NodeDescriptor) {
        self.peers.insert(node.address.clone(), node.id);
    }

    /// Checks `node.id == hash(node.address) mod 2^m` and records the peer on success.
    pub fn verify(
        &mut self,
        space: &IdentifierSpace,
        node: &NodeDescriptor,
    ) -> Result<(), ChordError> {
        let expected = self
            .get(&node.address)
            .unwrap_or_else(|| space.node_id(&node.address));
        if expected != node.id {
            return Err(ChordError::IdentifierMismatch {
                address: node.address.clone(),
                claimed: node.id,
            });
        }
        self.peers.insert(node.address.clone(), expected);
        Ok(())
    }
}

/// Outcome of an UpdateFingerTable call: whether the entry moved, and where to propagate next.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FingerUpdate {
    pub updated: bool,
    pub predecessor: Option<NodeDescriptor>,
}

/// Point-in-time copy of a node's routing state.
#[derive(Clone, Debug)]
pub struct NodeSnapshot {
    pub node: NodeDescriptor,
    pub predecessor: Option<NodeDescriptor>,
    pub successor: NodeDescriptor,
    pub fingers: Vec<FingerEntry>,
    pub keys: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_rejects_forged_identifiers() {
        let space = IdentifierSpace::new(6).unwrap();
        let mut directory = PeerDirectory::new();

        let honest = NodeDescriptor::from_address(&space, "127.0.0.1:5000");
        assert!(directory.verify(&space, &honest).is_ok());
        assert_eq!(directory.get("127.0.0.1:5000"), Some(honest.id));

        let forged = NodeDescriptor::new(space.identifier(1), "127.0.0.1:5001");
        assert!(matches!(
            directory.verify(&space, &forged),
            Err(ChordError::IdentifierMismatch { .. })
        ));
        assert_eq!(directory.get("127.0.0.1:5001"), None);
    }
}
