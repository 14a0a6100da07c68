use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;

use crate::chord::id::Identifier;
use crate::chord::node::{ChordNode, Membership};
use crate::chord::types::{FingerUpdate, Key, NodeDescriptor, Value};
use crate::chord::ChordConfig;
use crate::error::{ChordError, NetworkError};
use crate::network::transport::ChordTransport;

/// An in-process network: every call is a direct method call on the target node.
///
/// Nodes are held weakly, so dropping the last handle to a node takes it off the
/// network. Addresses can also be cut off explicitly to simulate an unreachable peer.
#[derive(Default)]
pub struct MemoryNetwork {
    nodes: RwLock<HashMap<String, Weak<ChordNode>>>,
    unreachable: RwLock<HashSet<String>>,
}

impl MemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates a node on this network, registers it, then joins it if asked to.
    pub async fn spawn_node(
        self: &Arc<Self>,
        address: &str,
        config: ChordConfig,
        membership: Membership,
    ) -> Result<Arc<ChordNode>, ChordError> {
        let transport: Arc<dyn ChordTransport> = self.clone();
        let node = ChordNode::bootstrap(address, config, transport)?;
        self.register(&node).await;
        if let Membership::Join { via } = membership {
            node.join(&via).await?;
        }
        Ok(node)
    }

    pub async fn register(&self, node: &Arc<ChordNode>) {
        self.nodes
            .write()
            .await
            .insert(node.address().to_string(), Arc::downgrade(node));
    }

    pub async fn set_reachable(&self, addr: &str, reachable: bool) {
        let mut unreachable = self.unreachable.write().await;
        if reachable {
            unreachable.remove(addr);
        } else {
            unreachable.insert(addr.to_string());
        }
    }

    async fn node(&self, addr: &str) -> Result<Arc<ChordNode>, ChordError> {
        if self.unreachable.read().await.contains(addr) {
            return Err(NetworkError::PeerUnreachable(addr.to_string()).into());
        }
        self.nodes
            .read()
            .await
            .get(addr)
            .and_then(Weak::upgrade)
            .ok_or_else(|| NetworkError::ConnectionFailed(format!("no node at {}", addr)).into())
    }
}

#[async_trait]
impl ChordTransport for MemoryNetwork {
    async fn get_node_id(&self, addr: &str) -> Result<Identifier, ChordError> {
        Ok(self.node(addr).await?.id())
    }

    async fn get_successor(&self, addr: &str) -> Result<NodeDescriptor, ChordError> {
        Ok(self.node(addr).await?.successor().await)
    }

    async fn get_predecessor(&self, addr: &str) -> Result<Option<NodeDescriptor>, ChordError> {
        Ok(self.node(addr).await?.predecessor().await)
    }

    async fn find_successor(
        &self,
        addr: &str,
        id: Identifier,
    ) -> Result<NodeDescriptor, ChordError> {
        self.node(addr).await?.find_successor(id).await
    }

    async fn find_predecessor(
        &self,
        addr: &str,
        id: Identifier,
    ) -> Result<NodeDescriptor, ChordError> {
        self.node(addr).await?.find_predecessor(id).await
    }

    async fn closest_preceding_finger(
        &self,
        addr: &str,
        id: Identifier,
    ) -> Result<NodeDescriptor, ChordError> {
        Ok(self.node(addr).await?.closest_preceding_finger(id).await)
    }

    async fn notify(&self, addr: &str, candidate: &NodeDescriptor) -> Result<bool, ChordError> {
        self.node(addr).await?.notify(candidate.clone()).await
    }

    async fn update_finger_table(
        &self,
        addr: &str,
        candidate: &NodeDescriptor,
        index: usize,
    ) -> Result<FingerUpdate, ChordError> {
        self.node(addr)
            .await?
            .update_finger_table(candidate.clone(), index)
            .await
    }

    async fn get_key(&self, addr: &str, key: &Key) -> Result<Option<Value>, ChordError> {
        self.node(addr).await?.get_key(key).await
    }

    async fn put_key(&self, addr: &str, key: Key, value: Value) -> Result<(), ChordError> {
        self.node(addr).await?.put_key(key, value).await
    }

    async fn transfer_keys(
        &self,
        addr: &str,
        node: &NodeDescriptor,
        predecessor: Option<&NodeDescriptor>,
    ) -> Result<Vec<(Key, Value)>, ChordError> {
        self.node(addr)
            .await?
            .transfer_keys(node.clone(), predecessor.cloned())
            .await
    }
}
