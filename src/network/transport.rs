use async_trait::async_trait;

use crate::chord::id::Identifier;
use crate::chord::types::{FingerUpdate, Key, NodeDescriptor, Value};
use crate::error::ChordError;

/// Client side of the per-node RPC surface.
///
/// Every call targets a peer by its opaque `host:port` address. Implementations
/// bound each call in time and report failures as [`crate::error::NetworkError`].
#[async_trait]
pub trait ChordTransport: Send + Sync + 'static {
    async fn get_node_id(&self, addr: &str) -> Result<Identifier, ChordError>;

    async fn get_successor(&self, addr: &str) -> Result<NodeDescriptor, ChordError>;

    async fn get_predecessor(&self, addr: &str) -> Result<Option<NodeDescriptor>, ChordError>;

    async fn find_successor(&self, addr: &str, id: Identifier)
        -> Result<NodeDescriptor, ChordError>;

    async fn find_predecessor(
        &self,
        addr: &str,
        id: Identifier,
    ) -> Result<NodeDescriptor, ChordError>;

    async fn closest_preceding_finger(
        &self,
        addr: &str,
        id: Identifier,
    ) -> Result<NodeDescriptor, ChordError>;

    /// Returns whether the peer adopted `candidate` as its predecessor.
    async fn notify(&self, addr: &str, candidate: &NodeDescriptor) -> Result<bool, ChordError>;

    async fn update_finger_table(
        &self,
        addr: &str,
        candidate: &NodeDescriptor,
        index: usize,
    ) -> Result<FingerUpdate, ChordError>;

    /// `Ok(None)` when the peer does not hold the key.
    async fn get_key(&self, addr: &str, key: &Key) -> Result<Option<Value>, ChordError>;

    async fn put_key(&self, addr: &str, key: Key, value: Value) -> Result<(), ChordError>;

    /// Asks the successor of `node` to hand over keys in `(predecessor, node]`.
    async fn transfer_keys(
        &self,
        addr: &str,
        node: &NodeDescriptor,
        predecessor: Option<&NodeDescriptor>,
    ) -> Result<Vec<(Key, Value)>, ChordError>;
}
