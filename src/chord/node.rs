use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::chord::finger::FingerTable;
use crate::chord::id::{in_circular_interval, in_open_interval, Identifier, IdentifierSpace};
use crate::chord::storage::KeyStore;
use crate::chord::types::{FingerUpdate, Key, NodeDescriptor, NodeSnapshot, PeerDirectory, Value};
use crate::chord::ChordConfig;
use crate::error::ChordError;
use crate::network::transport::ChordTransport;

/// How a node enters the ring. Only initialisation differs between the two.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Membership {
    /// First node: forms a ring of one.
    Bootstrap,
    /// Join an existing ring through any live member.
    Join { via: String },
}

/// Membership pointers and routing table, guarded together by one lock.
///
/// The successor is finger 1.
#[derive(Debug)]
pub struct RingState {
    pub predecessor: Option<NodeDescriptor>,
    pub fingers: FingerTable,
}

/// A single Chord node: its ring state, its slice of the key space, and the
/// transport it uses to reach peers.
///
/// Locks are only held for local reads and compare-and-update steps, never
/// across an RPC.
pub struct ChordNode {
    pub(crate) local: NodeDescriptor,
    pub(crate) space: IdentifierSpace,
    pub(crate) config: ChordConfig,
    pub(crate) ring: Mutex<RingState>,
    pub(crate) storage: Mutex<KeyStore>,
    pub(crate) directory: Mutex<PeerDirectory>,
    pub(crate) transport: Arc<dyn ChordTransport>,
}

impl ChordNode {
    /// Creates a node that forms a singleton ring: predecessor, successor and
    /// every finger are the node itself.
    pub fn bootstrap(
        address: impl Into<String>,
        config: ChordConfig,
        transport: Arc<dyn ChordTransport>,
    ) -> Result<Arc<Self>, ChordError> {
        let space = config.space()?;
        let local = NodeDescriptor::from_address(&space, address);
        let mut directory = PeerDirectory::new();
        directory.record(&local);

        info!("Node {} initialised on a {}-bit ring", local, space.bits());

        Ok(Arc::new(Self {
            ring: Mutex::new(RingState {
                predecessor: Some(local.clone()),
                fingers: FingerTable::new(&space, local.clone()),
            }),
            storage: Mutex::new(KeyStore::new()),
            directory: Mutex::new(directory),
            local,
            space,
            config,
            transport,
        }))
    }

    pub fn descriptor(&self) -> &NodeDescriptor {
        &self.local
    }

    pub fn id(&self) -> Identifier {
        self.local.id
    }

    pub fn address(&self) -> &str {
        &self.local.address
    }

    pub fn space(&self) -> &IdentifierSpace {
        &self.space
    }

    pub fn config(&self) -> &ChordConfig {
        &self.config
    }

    pub(crate) fn is_local(&self, node: &NodeDescriptor) -> bool {
        node.address == self.local.address
    }

    pub async fn successor(&self) -> NodeDescriptor {
        self.ring.lock().await.fingers.successor().clone()
    }

    pub async fn predecessor(&self) -> Option<NodeDescriptor> {
        self.ring.lock().await.predecessor.clone()
    }

    pub async fn snapshot(&self) -> NodeSnapshot {
        let (predecessor, successor, fingers) = {
            let ring = self.ring.lock().await;
            (
                ring.predecessor.clone(),
                ring.fingers.successor().clone(),
                ring.fingers.entries().to_vec(),
            )
        };
        NodeSnapshot {
            node: self.local.clone(),
            predecessor,
            successor,
            fingers,
            keys: self.storage.lock().await.len(),
        }
    }

    /// True if `id` falls in `(predecessor, self]`, or no predecessor is known.
    pub async fn owns(&self, id: &Identifier) -> bool {
        match &self.ring.lock().await.predecessor {
            Some(predecessor) => in_circular_interval(id, &predecessor.id, &self.local.id),
            None => true,
        }
    }

    /// Rejects descriptors from outside the ring and, unless disabled, descriptors
    /// whose identifier is not the hash of their address.
    pub(crate) async fn check_descriptor(&self, node: &NodeDescriptor) -> Result<(), ChordError> {
        if !self.space.contains(&node.id) {
            return Err(ChordError::InvalidRequest(format!(
                "identifier {} is outside the {}-bit ring",
                node.id,
                self.space.bits()
            )));
        }
        let mut directory = self.directory.lock().await;
        if self.config.verify_identifiers {
            directory.verify(&self.space, node)
        } else {
            directory.record(node);
            Ok(())
        }
    }

    // Joining

    pub async fn join(&self, known: &str) -> Result<(), ChordError> {
        if known == self.local.address {
            return Err(ChordError::JoinFailed(format!(
                "Node {} cannot join through itself",
                self.local
            )));
        }
        info!("Node {} joining through {}", self.local, known);

        let successor = self
            .transport
            .find_successor(known, self.local.id)
            .await
            .map_err(|e| ChordError::JoinFailed(format!("Could not find successor: {}", e)))?;
        if self.is_local(&successor) {
            return Err(ChordError::JoinFailed(format!(
                "Node {} is already part of the ring",
                self.local
            )));
        }
        if successor.id == self.local.id {
            return Err(ChordError::JoinFailed(format!(
                "Identifier {} is already taken by {}",
                self.local.id, successor.address
            )));
        }
        let predecessor = self
            .transport
            .find_predecessor(known, self.local.id)
            .await
            .map_err(|e| ChordError::JoinFailed(format!("Could not find predecessor: {}", e)))?;
        self.check_descriptor(&successor).await?;
        self.check_descriptor(&predecessor).await?;

        let fingers = self.init_finger_table(known, &successor, &predecessor).await;
        {
            let mut ring = self.ring.lock().await;
            ring.predecessor = Some(predecessor.clone());
            ring.fingers = fingers;
        }
        info!(
            "Node {} placed between {} and {}",
            self.local, predecessor, successor
        );

        self.update_others(known).await;
        self.take_keys(&successor, &predecessor).await;

        // Close the ring now rather than on the successor's next stabilization
        match self.transport.notify(&successor.address, &self.local).await {
            Ok(accepted) => debug!("Successor {} accepted us: {}", successor, accepted),
            Err(e) => warn!("Failed to notify successor {}: {}", successor, e),
        }

        Ok(())
    }

    async fn init_finger_table(
        &self,
        known: &str,
        successor: &NodeDescriptor,
        predecessor: &NodeDescriptor,
    ) -> FingerTable {
        let mut table = FingerTable::new(&self.space, self.local.clone());
        table.set_successor(successor.clone());

        for i in 2..=self.space.bits() as usize {
            let start = self.space.finger_start(&self.local.id, i);
            let previous = table
                .entry(i - 1)
                .map(|e| e.node.clone())
                .unwrap_or_else(|| successor.clone());

            let owner = if in_circular_interval(&start, &predecessor.id, &self.local.id) {
                self.local.clone()
            } else if !self.is_local(&previous)
                && in_circular_interval(&start, &self.local.id, &previous.id)
            {
                // No node can sit between the previous finger's start and this one
                previous
            } else {
                match self.transport.find_successor(known, start).await {
                    Ok(owner) => owner,
                    Err(e) => {
                        warn!("Could not resolve finger {} (start {}): {}", i, start, e);
                        successor.clone()
                    }
                }
            };
            table.set(i, owner);
        }
        table
    }

    /// Tells every node whose i-th finger should now be this node.
    ///
    /// Those are the predecessors of `self - 2^(i-1) + 1`; the `+ 1` keeps a node
    /// sitting exactly at `self - 2^(i-1)` from being skipped.
    async fn update_others(&self, known: &str) {
        for i in 1..=self.space.bits() as usize {
            let target = self
                .space
                .successor_id(&self.space.sub_power_of_two(&self.local.id, i as u32 - 1));
            let first = match self.transport.find_predecessor(known, target).await {
                Ok(node) => node,
                Err(e) => {
                    warn!("Skipping finger {} update: no predecessor for {}: {}", i, target, e);
                    continue;
                }
            };
            if let Err(e) = self.propagate_finger(first, i).await {
                warn!("Finger {} update stopped early: {}", i, e);
            }
        }
    }

    /// Walks backwards from `current` while peers keep adopting this node as finger `i`.
    async fn propagate_finger(&self, mut current: NodeDescriptor, i: usize) -> Result<(), ChordError> {
        let limit = self.config.update_hop_limit();
        for _ in 0..=limit {
            if self.is_local(&current) {
                return Ok(());
            }
            let update = self
                .transport
                .update_finger_table(&current.address, &self.local, i)
                .await?;
            if !update.updated {
                return Ok(());
            }
            debug!("{} now uses {} as finger {}", current, self.local, i);
            match update.predecessor {
                Some(previous) if previous != current => current = previous,
                _ => return Ok(()),
            }
        }
        debug!("Stopped propagating finger {} after {} hops", i, limit);
        Ok(())
    }

    async fn take_keys(&self, successor: &NodeDescriptor, predecessor: &NodeDescriptor) {
        match self
            .transport
            .transfer_keys(&successor.address, &self.local, Some(predecessor))
            .await
        {
            Ok(pairs) => {
                let count = pairs.len();
                let mut storage = self.storage.lock().await;
                for (key, value) in pairs {
                    storage.put(key, value);
                }
                if count > 0 {
                    info!("Took over {} keys from {}", count, successor);
                }
            }
            Err(e) => warn!("Key transfer from {} failed: {}", successor, e),
        }
    }

    // Inbound operations

    /// Accepts `candidate` as predecessor if none is known or it lies in
    /// `(predecessor, self)`. Repeating a notify never changes the outcome.
    pub async fn notify(&self, candidate: NodeDescriptor) -> Result<bool, ChordError> {
        self.check_descriptor(&candidate).await?;
        let mut ring = self.ring.lock().await;
        let accept = match &ring.predecessor {
            None => true,
            Some(current) => in_open_interval(&candidate.id, &current.id, &self.local.id),
        };
        if accept {
            info!("Node {} has new predecessor {}", self.local, candidate);
            ring.predecessor = Some(candidate);
        }
        Ok(accept)
    }

    /// Considers `candidate` for finger `index` and reports where to propagate next.
    pub async fn update_finger_table(
        &self,
        candidate: NodeDescriptor,
        index: usize,
    ) -> Result<FingerUpdate, ChordError> {
        if index == 0 || index > self.space.bits() as usize {
            return Err(ChordError::InvalidRequest(format!(
                "finger index {} outside 1..={}",
                index,
                self.space.bits()
            )));
        }
        self.check_descriptor(&candidate).await?;

        let mut ring = self.ring.lock().await;
        let updated = !self.is_local(&candidate) && ring.fingers.update_if_closer(&candidate, index);
        if updated {
            debug!("Node {} finger {} -> {}", self.local, index, candidate);
        }
        Ok(FingerUpdate {
            updated,
            predecessor: ring.predecessor.clone(),
        })
    }

    async fn check_ownership(&self, key: &Key) -> Result<(), ChordError> {
        if !self.config.strict_ownership {
            return Ok(());
        }
        let id = self.space.hash(&key.0);
        if self.owns(&id).await {
            Ok(())
        } else {
            Err(ChordError::NotOwner { key: id })
        }
    }

    /// Reads the local store only. `Ok(None)` means not found.
    pub async fn get_key(&self, key: &Key) -> Result<Option<Value>, ChordError> {
        self.check_ownership(key).await?;
        Ok(self.storage.lock().await.get(key).cloned())
    }

    pub async fn put_key(&self, key: Key, value: Value) -> Result<(), ChordError> {
        self.check_ownership(&key).await?;
        self.storage.lock().await.put(key, value);
        Ok(())
    }

    /// Hands the keys in `(predecessor, node]` to a node that has just joined in
    /// front of us. Requests from nodes that do not precede us get nothing.
    pub async fn transfer_keys(
        &self,
        node: NodeDescriptor,
        predecessor: Option<NodeDescriptor>,
    ) -> Result<Vec<(Key, Value)>, ChordError> {
        self.check_descriptor(&node).await?;
        if let Some(predecessor) = &predecessor {
            self.check_descriptor(predecessor).await?;
        }
        if self.is_local(&node) {
            return Err(ChordError::InvalidRequest(
                "a node cannot transfer keys to itself".into(),
            ));
        }

        let precedes_us = match &self.ring.lock().await.predecessor {
            Some(current) => {
                current.address == node.address
                    || in_open_interval(&node.id, &current.id, &self.local.id)
            }
            None => true,
        };
        if !precedes_us {
            debug!("Refusing key transfer to {}: not our predecessor", node);
            return Ok(Vec::new());
        }

        let start = predecessor.map(|p| p.id).unwrap_or(self.local.id);
        let pairs = self
            .storage
            .lock()
            .await
            .drain_range(&self.space, &start, &node.id);
        if !pairs.is_empty() {
            info!("Handing {} keys to {}", pairs.len(), node);
        }
        Ok(pairs)
    }

    // Routed client operations

    /// The node responsible for `key`.
    pub async fn lookup(&self, key: &Key) -> Result<NodeDescriptor, ChordError> {
        self.find_successor(self.space.hash(&key.0)).await
    }

    pub async fn get(&self, key: &Key) -> Result<Option<Value>, ChordError> {
        let owner = self.lookup(key).await?;
        if self.is_local(&owner) {
            self.get_key(key).await
        } else {
            self.transport.get_key(&owner.address, key).await
        }
    }

    /// Stores the pair at its owner and returns that owner.
    pub async fn put(&self, key: Key, value: Value) -> Result<NodeDescriptor, ChordError> {
        let owner = self.lookup(&key).await?;
        if self.is_local(&owner) {
            self.put_key(key, value).await?;
        } else {
            self.transport.put_key(&owner.address, key, value).await?;
        }
        Ok(owner)
    }
}
