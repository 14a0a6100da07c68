use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

use crate::chord::id::in_open_interval;
use crate::chord::node::ChordNode;
use crate::chord::types::NodeDescriptor;
use crate::error::ChordError;

impl ChordNode {
    /// Adopts the successor's predecessor if it sits between us and the
    /// successor, then notifies whichever node is now the successor.
    pub async fn stabilize(&self) -> Result<(), ChordError> {
        let successor = self.successor().await;
        if let Some(candidate) = self.predecessor_of(&successor).await? {
            if in_open_interval(&candidate.id, &self.local.id, &successor.id) {
                match self.check_descriptor(&candidate).await {
                    Ok(()) => {
                        let mut ring = self.ring.lock().await;
                        // Only replace the successor we actually asked about
                        if ring.fingers.successor() == &successor {
                            info!("Node {} has new successor {}", self.local, candidate);
                            ring.fingers.set_successor(candidate);
                        }
                    }
                    Err(e) => warn!("Ignoring successor candidate {}: {}", candidate, e),
                }
            }
        }
        self.notify_successor().await?;
        Ok(())
    }

    /// Sends our descriptor to the current successor.
    pub async fn notify_successor(&self) -> Result<bool, ChordError> {
        let successor = self.successor().await;
        if self.is_local(&successor) {
            return self.notify(self.local.clone()).await;
        }
        self.transport.notify(&successor.address, &self.local).await
    }

    /// Re-resolves finger `i` through this node's own routing.
    pub async fn refresh_finger(&self, i: usize) -> Result<NodeDescriptor, ChordError> {
        if i == 0 || i > self.space.bits() as usize {
            return Err(ChordError::InvalidRequest(format!(
                "finger index {} outside 1..={}",
                i,
                self.space.bits()
            )));
        }
        let start = self.space.finger_start(&self.local.id, i);
        let owner = self.find_successor(start).await?;
        self.ring.lock().await.fingers.set(i, owner.clone());
        Ok(owner)
    }

    /// Refreshes every finger, skipping the ones whose lookup fails.
    /// Returns how many entries were refreshed.
    pub async fn fix_fingers(&self) -> usize {
        let mut refreshed = 0;
        for i in 1..=self.space.bits() as usize {
            match self.refresh_finger(i).await {
                Ok(owner) => {
                    debug!("Finger {} of {} -> {}", i, self.local, owner);
                    refreshed += 1;
                }
                Err(e) => warn!("Failed to fix finger {} of {}: {}", i, self.local, e),
            }
        }
        refreshed
    }

    /// One stabilization cycle. Failures only skip the rest of the step they hit.
    pub async fn maintain(&self) {
        if let Err(e) = self.stabilize().await {
            if e.is_transient() {
                warn!("Stabilize skipped this cycle: {}", e);
            } else {
                warn!("Stabilize failed: {}", e);
            }
        }
        self.fix_fingers().await;
    }
}

/// Runs [`ChordNode::maintain`] forever on the configured interval.
pub async fn run_stabilize_worker(node: Arc<ChordNode>) {
    // tokio rejects a zero period
    let period = node.config().stabilize_interval().max(Duration::from_millis(1));
    info!("Starting stabilize worker for {} every {:?}", node.descriptor(), period);

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        debug!("Running stabilize");
        node.maintain().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chord::node::Membership;
    use crate::chord::ChordConfig;
    use crate::network::memory::MemoryNetwork;

    #[tokio::test]
    async fn refresh_rejects_indices_outside_the_table() {
        let network = MemoryNetwork::new();
        let node = network
            .spawn_node("127.0.0.1:5000", ChordConfig::default(), Membership::Bootstrap)
            .await
            .unwrap();

        for i in [0, 7] {
            assert!(matches!(
                node.refresh_finger(i).await,
                Err(ChordError::InvalidRequest(_))
            ));
        }
        assert_eq!(node.refresh_finger(6).await.unwrap(), *node.descriptor());
    }

    #[tokio::test]
    async fn stabilize_still_notifies_after_rejecting_a_candidate() {
        let network = MemoryNetwork::new();
        let lenient = ChordConfig {
            verify_identifiers: false,
            ..ChordConfig::default()
        };
        let a = network
            .spawn_node("127.0.0.1:5000", ChordConfig::default(), Membership::Bootstrap)
            .await
            .unwrap();
        let b = network
            .spawn_node(
                "127.0.0.1:5001",
                lenient,
                Membership::Join {
                    via: "127.0.0.1:5000".to_string(),
                },
            )
            .await
            .unwrap();

        // 10.0.0.9:1 hashes to 24, so a refuses to adopt it as successor
        let forged = NodeDescriptor::new(a.space().identifier(30), "10.0.0.9:1");
        assert!(b.notify(forged.clone()).await.unwrap());

        a.stabilize().await.unwrap();
        assert_eq!(&a.successor().await, b.descriptor());

        // With no predecessor recorded, b accepts the notify sent by stabilize
        b.ring.lock().await.predecessor = None;
        a.stabilize().await.unwrap();
        assert_eq!(b.predecessor().await.as_ref(), Some(a.descriptor()));
    }
}
