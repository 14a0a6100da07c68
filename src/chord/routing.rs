use log::{debug, warn};

use crate::chord::id::{in_circular_interval, Identifier};
use crate::chord::node::ChordNode;
use crate::chord::types::NodeDescriptor;
use crate::error::ChordError;

impl ChordNode {
    /// The node responsible for `id`: the successor of `id`'s predecessor.
    pub async fn find_successor(&self, id: Identifier) -> Result<NodeDescriptor, ChordError> {
        let (_, successor) = self.walk_to_predecessor(id).await?;
        Ok(successor)
    }

    /// The node `n` with `id ∈ (n, n.successor]`.
    pub async fn find_predecessor(&self, id: Identifier) -> Result<NodeDescriptor, ChordError> {
        let (predecessor, _) = self.walk_to_predecessor(id).await?;
        Ok(predecessor)
    }

    pub async fn closest_preceding_finger(&self, id: Identifier) -> NodeDescriptor {
        self.ring.lock().await.fingers.closest_preceding_finger(&id)
    }

    /// Iterative predecessor search starting at this node.
    ///
    /// Each hop asks the current node for its closest preceding finger, which always
    /// moves strictly towards `id`. The hop cap bounds the walk when finger tables
    /// are stale or the ring is still converging.
    async fn walk_to_predecessor(
        &self,
        id: Identifier,
    ) -> Result<(NodeDescriptor, NodeDescriptor), ChordError> {
        let limit = self.config.lookup_hop_limit();
        let mut current = self.local.clone();
        let mut successor = self.successor().await;
        let mut hops = 0;

        loop {
            if in_circular_interval(&id, &current.id, &successor.id) {
                debug!("Predecessor of {} is {} ({} hops)", id, current, hops);
                return Ok((current, successor));
            }
            if hops == limit {
                warn!("Lookup for {} gave up at {} after {} hops", id, current, hops);
                return Err(ChordError::RoutingFailure { target: id, hops });
            }
            let next = self.closest_preceding_finger_of(&current, id).await?;
            successor = self.successor_of(&next).await?;
            current = next;
            hops += 1;
        }
    }

    // Operations on a node that may or may not be this one

    pub(crate) async fn successor_of(
        &self,
        node: &NodeDescriptor,
    ) -> Result<NodeDescriptor, ChordError> {
        if self.is_local(node) {
            return Ok(self.successor().await);
        }
        self.transport.get_successor(&node.address).await
    }

    pub(crate) async fn predecessor_of(
        &self,
        node: &NodeDescriptor,
    ) -> Result<Option<NodeDescriptor>, ChordError> {
        if self.is_local(node) {
            return Ok(self.predecessor().await);
        }
        self.transport.get_predecessor(&node.address).await
    }

    pub(crate) async fn closest_preceding_finger_of(
        &self,
        node: &NodeDescriptor,
        id: Identifier,
    ) -> Result<NodeDescriptor, ChordError> {
        if self.is_local(node) {
            return Ok(self.closest_preceding_finger(id).await);
        }
        self.transport.closest_preceding_finger(&node.address, id).await
    }
}
