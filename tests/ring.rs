use chordring::chord::node::{ChordNode, Membership};
use chordring::chord::types::{Key, NodeDescriptor, Value};
use chordring::chord::ChordConfig;
use chordring::error::ChordError;
use chordring::network::memory::MemoryNetwork;
use std::sync::Arc;

// Identifiers at m = 6
const N27: &str = "127.0.0.1:5000";
const N33: &str = "127.0.0.1:5001";
const N22: &str = "127.0.0.1:5002";
const N27_CLASH: &str = "127.0.0.1:5003";
const N3: &str = "127.0.0.1:5004";
const N40: &str = "127.0.0.1:5006";

async fn bootstrap(
    network: &Arc<MemoryNetwork>,
    addr: &str,
    config: &ChordConfig,
) -> Arc<ChordNode> {
    network
        .spawn_node(addr, config.clone(), Membership::Bootstrap)
        .await
        .unwrap()
}

async fn join(
    network: &Arc<MemoryNetwork>,
    addr: &str,
    via: &str,
    config: &ChordConfig,
) -> Arc<ChordNode> {
    network
        .spawn_node(
            addr,
            config.clone(),
            Membership::Join {
                via: via.to_string(),
            },
        )
        .await
        .unwrap()
}

async fn settle(nodes: &[Arc<ChordNode>], rounds: usize) {
    for _ in 0..rounds {
        for node in nodes {
            node.maintain().await;
        }
    }
}

/// Five nodes joined one by one through the first, ordered by identifier.
async fn five_node_ring(config: &ChordConfig) -> Vec<Arc<ChordNode>> {
    let network = MemoryNetwork::new();
    let n27 = bootstrap(&network, N27, config).await;
    let n33 = join(&network, N33, N27, config).await;
    let n22 = join(&network, N22, N27, config).await;
    let n3 = join(&network, N3, N27, config).await;
    let n40 = join(&network, N40, N27, config).await;
    vec![n3, n22, n27, n33, n40]
}

fn ids(nodes: &[Arc<ChordNode>]) -> Vec<u64> {
    nodes.iter().map(|n| n.id().low_u64()).collect()
}

#[tokio::test]
async fn bootstrap_node_is_a_ring_of_one() {
    let network = MemoryNetwork::new();
    let node = bootstrap(&network, N27, &ChordConfig::default()).await;
    let snapshot = node.snapshot().await;

    assert_eq!(node.id().low_u64(), 27);
    assert_eq!(snapshot.predecessor.as_ref(), Some(node.descriptor()));
    assert_eq!(&snapshot.successor, node.descriptor());
    assert_eq!(snapshot.fingers.len(), 6);
    let starts: Vec<u64> = snapshot.fingers.iter().map(|f| f.start.low_u64()).collect();
    assert_eq!(starts, vec![28, 29, 31, 35, 43, 59]);
    assert!(snapshot.fingers.iter().all(|f| &f.node == node.descriptor()));
}

#[tokio::test]
async fn second_node_closes_the_ring_during_join() {
    let config = ChordConfig::default();
    let network = MemoryNetwork::new();
    let a = bootstrap(&network, N27, &config).await;
    let b = join(&network, N33, N27, &config).await;

    assert_eq!(&a.successor().await, b.descriptor());
    assert_eq!(a.predecessor().await.as_ref(), Some(b.descriptor()));
    assert_eq!(&b.successor().await, a.descriptor());
    assert_eq!(b.predecessor().await.as_ref(), Some(a.descriptor()));

    // 27's fingers start at 28, 29, 31, 35, 43, 59
    let a_fingers: Vec<u64> = a
        .snapshot()
        .await
        .fingers
        .iter()
        .map(|f| f.node.id.low_u64())
        .collect();
    assert_eq!(a_fingers, vec![33, 33, 33, 27, 27, 27]);
    let b_snapshot = b.snapshot().await;
    assert!(b_snapshot.fingers.iter().all(|f| &f.node == a.descriptor()));
}

#[tokio::test]
async fn five_node_ring_agrees_on_every_owner() {
    let config = ChordConfig::default();
    let nodes = five_node_ring(&config).await;
    assert_eq!(ids(&nodes), vec![3, 22, 27, 33, 40]);

    // Joins alone keep successor and predecessor pointers exact
    for (i, node) in nodes.iter().enumerate() {
        let next = &nodes[(i + 1) % nodes.len()];
        let prev = &nodes[(i + nodes.len() - 1) % nodes.len()];
        assert_eq!(&node.successor().await, next.descriptor());
        assert_eq!(node.predecessor().await.as_ref(), Some(prev.descriptor()));
    }

    settle(&nodes, 3).await;

    let expected = |id: u64| -> u64 {
        [3, 22, 27, 33, 40]
            .into_iter()
            .find(|n| *n >= id)
            .unwrap_or(3)
    };
    for node in &nodes {
        for id in 0..64 {
            let owner = node
                .find_successor(node.space().identifier(id))
                .await
                .unwrap();
            assert_eq!(
                owner.id.low_u64(),
                expected(id),
                "lookup of {} from {}",
                id,
                node.descriptor()
            );
        }
    }

    // After fix_fingers every finger is the successor of its start
    for node in &nodes {
        for finger in node.snapshot().await.fingers {
            assert_eq!(finger.node.id.low_u64(), expected(finger.start.low_u64()));
        }
    }
}

#[tokio::test]
async fn stabilization_is_stable_on_a_converged_ring() {
    let nodes = five_node_ring(&ChordConfig::default()).await;
    settle(&nodes, 2).await;

    let before: Vec<_> = futures::future::join_all(nodes.iter().map(|n| n.snapshot())).await;
    settle(&nodes, 2).await;
    let after: Vec<_> = futures::future::join_all(nodes.iter().map(|n| n.snapshot())).await;

    for (b, a) in before.iter().zip(&after) {
        assert_eq!(b.successor, a.successor);
        assert_eq!(b.predecessor, a.predecessor);
        assert_eq!(b.fingers, a.fingers);
    }
}

#[tokio::test]
async fn notify_is_idempotent() {
    let config = ChordConfig::default();
    let network = MemoryNetwork::new();
    let a = bootstrap(&network, N27, &config).await;
    let b = join(&network, N33, N27, &config).await;

    // b is already a's predecessor
    assert!(!a.notify(b.descriptor().clone()).await.unwrap());
    assert!(!a.notify(b.descriptor().clone()).await.unwrap());
    assert_eq!(a.predecessor().await.as_ref(), Some(b.descriptor()));

    // A node between the predecessor and a is accepted once
    let c = network
        .spawn_node(N22, config.clone(), Membership::Bootstrap)
        .await
        .unwrap();
    assert!(a.notify(c.descriptor().clone()).await.unwrap());
    assert!(!a.notify(c.descriptor().clone()).await.unwrap());
    assert_eq!(a.predecessor().await.as_ref(), Some(c.descriptor()));
}

#[tokio::test]
async fn forged_descriptors_are_rejected() {
    let config = ChordConfig::default();
    let network = MemoryNetwork::new();
    let a = bootstrap(&network, N27, &config).await;

    let space = *a.space();
    let forged = NodeDescriptor::new(space.identifier(30), N33);
    assert!(matches!(
        a.notify(forged).await,
        Err(ChordError::IdentifierMismatch { .. })
    ));

    let outside = NodeDescriptor::new(chordring::chord::id::Identifier::from_u64(100), N33);
    assert!(matches!(
        a.notify(outside).await,
        Err(ChordError::InvalidRequest(_))
    ));
    assert_eq!(a.predecessor().await.as_ref(), Some(a.descriptor()));

    match a
        .update_finger_table(NodeDescriptor::from_address(&space, N33), 7)
        .await
    {
        Err(ChordError::InvalidRequest(msg)) => assert!(msg.contains("index")),
        other => panic!("expected an invalid request, got {:?}", other),
    }
}

#[tokio::test]
async fn identifier_checks_can_be_turned_off() {
    let config = ChordConfig {
        verify_identifiers: false,
        ..ChordConfig::default()
    };
    let network = MemoryNetwork::new();
    let a = bootstrap(&network, N27, &config).await;
    let claimed = NodeDescriptor::new(a.space().identifier(30), "10.0.0.1:1");
    assert!(a.notify(claimed).await.unwrap());
}

#[tokio::test]
async fn values_are_stored_at_their_owner() {
    let nodes = five_node_ring(&ChordConfig::default()).await;
    settle(&nodes, 2).await;

    // apple -> 27, banana -> 14, cherry -> 46
    let owner = nodes[0]
        .put(Key::from("apple"), Value::from("red"))
        .await
        .unwrap();
    assert_eq!(owner.id.low_u64(), 27);
    let owner = nodes[4]
        .put(Key::from("banana"), Value::from("yellow"))
        .await
        .unwrap();
    assert_eq!(owner.id.low_u64(), 22);
    let owner = nodes[2]
        .put(Key::from("cherry"), Value::from("dark"))
        .await
        .unwrap();
    assert_eq!(owner.id.low_u64(), 3);

    for node in &nodes {
        assert_eq!(
            node.get(&Key::from("apple")).await.unwrap(),
            Some(Value::from("red"))
        );
        assert_eq!(
            node.get(&Key::from("cherry")).await.unwrap(),
            Some(Value::from("dark"))
        );
        assert_eq!(node.get(&Key::from("durian")).await.unwrap(), None);
    }
    assert_eq!(nodes[2].snapshot().await.keys, 1);
    assert_eq!(nodes[1].get_key(&Key::from("banana")).await.unwrap(), Some(Value::from("yellow")));
    assert_eq!(nodes[2].get_key(&Key::from("banana")).await.unwrap(), None);
}

#[tokio::test]
async fn joining_node_takes_over_its_keys() {
    let config = ChordConfig::default();
    let network = MemoryNetwork::new();
    let a = bootstrap(&network, N27, &config).await;
    for (key, value) in [("apple", "red"), ("banana", "yellow"), ("cherry", "dark")] {
        a.put(Key::from(key), Value::from(value)).await.unwrap();
    }
    assert_eq!(a.snapshot().await.keys, 3);

    // 22 now owns (27, 22], which holds banana (14) and cherry (46)
    let b = join(&network, N22, N27, &config).await;
    assert_eq!(a.snapshot().await.keys, 1);
    assert_eq!(b.snapshot().await.keys, 2);
    assert_eq!(
        b.get_key(&Key::from("cherry")).await.unwrap(),
        Some(Value::from("dark"))
    );
    assert_eq!(
        a.get(&Key::from("banana")).await.unwrap(),
        Some(Value::from("yellow"))
    );
    assert_eq!(
        b.get(&Key::from("apple")).await.unwrap(),
        Some(Value::from("red"))
    );
}

#[tokio::test]
async fn strict_ownership_rejects_foreign_keys() {
    let config = ChordConfig {
        strict_ownership: true,
        ..ChordConfig::default()
    };
    let network = MemoryNetwork::new();
    let a = bootstrap(&network, N27, &config).await;
    let b = join(&network, N33, N27, &config).await;

    // apple hashes to 27, which b (owning (27, 33]) does not hold
    match b.put_key(Key::from("apple"), Value::from("red")).await {
        Err(ChordError::NotOwner { key }) => assert_eq!(key.low_u64(), 27),
        other => panic!("expected NotOwner, got {:?}", other),
    }
    assert!(matches!(
        b.get_key(&Key::from("apple")).await,
        Err(ChordError::NotOwner { .. })
    ));

    // Routed operations still land on the owner
    let owner = b.put(Key::from("apple"), Value::from("red")).await.unwrap();
    assert_eq!(&owner, a.descriptor());
    assert_eq!(
        b.get(&Key::from("apple")).await.unwrap(),
        Some(Value::from("red"))
    );
}

#[tokio::test]
async fn colliding_identifier_cannot_join() {
    let config = ChordConfig::default();
    let network = MemoryNetwork::new();
    let a = bootstrap(&network, N27, &config).await;

    let result = network
        .spawn_node(
            N27_CLASH,
            config.clone(),
            Membership::Join {
                via: N27.to_string(),
            },
        )
        .await;
    match result {
        Err(ChordError::JoinFailed(msg)) => assert!(msg.contains("already taken")),
        Err(other) => panic!("expected JoinFailed, got {:?}", other),
        Ok(node) => panic!("{} joined despite the collision", node.descriptor()),
    }
    assert_eq!(&a.successor().await, a.descriptor());
}

#[tokio::test]
async fn join_fails_without_a_reachable_peer() {
    let config = ChordConfig::default();
    let network = MemoryNetwork::new();
    let a = bootstrap(&network, N27, &config).await;

    assert!(matches!(
        a.join(N27).await,
        Err(ChordError::JoinFailed(_))
    ));
    assert!(matches!(
        a.join("127.0.0.1:9999").await,
        Err(ChordError::JoinFailed(_))
    ));
}

#[tokio::test]
async fn unreachable_successor_only_skips_the_cycle() {
    let config = ChordConfig::default();
    let network = MemoryNetwork::new();
    let a = bootstrap(&network, N27, &config).await;
    let b = join(&network, N33, N27, &config).await;

    network.set_reachable(N33, false).await;
    let err = a.stabilize().await.unwrap_err();
    assert!(err.is_transient());

    // Fingers 1-3 resolve locally; the rest need b
    assert_eq!(a.fix_fingers().await, 3);
    a.maintain().await;
    assert_eq!(&a.successor().await, b.descriptor());

    network.set_reachable(N33, true).await;
    a.stabilize().await.unwrap();
    assert_eq!(a.fix_fingers().await, 6);
}

#[tokio::test]
async fn concurrent_joins_converge_after_stabilization() {
    let config = ChordConfig {
        id_bits: 16,
        ..ChordConfig::default()
    };
    let network = MemoryNetwork::new();
    let first = bootstrap(&network, N27, &config).await;

    let addrs: Vec<String> = (6000..6010).map(|port| format!("127.0.0.1:{}", port)).collect();
    let joined = futures::future::join_all(addrs.iter().map(|addr| {
        network.spawn_node(
            addr,
            config.clone(),
            Membership::Join {
                via: N27.to_string(),
            },
        )
    }))
    .await;

    let mut nodes = vec![first];
    for node in joined {
        nodes.push(node.unwrap());
    }
    nodes.sort_by_key(|n| n.id());
    settle(&nodes, 20).await;

    for (i, node) in nodes.iter().enumerate() {
        let next = &nodes[(i + 1) % nodes.len()];
        let prev = &nodes[(i + nodes.len() - 1) % nodes.len()];
        assert_eq!(&node.successor().await, next.descriptor());
        assert_eq!(node.predecessor().await.as_ref(), Some(prev.descriptor()));
    }

    let ring_ids = ids(&nodes);
    let expected = |id: u64| -> u64 {
        ring_ids
            .iter()
            .copied()
            .find(|n| *n >= id)
            .unwrap_or(ring_ids[0])
    };
    for node in &nodes {
        for id in (0..65_536).step_by(997) {
            let owner = node
                .find_successor(node.space().identifier(id))
                .await
                .unwrap();
            assert_eq!(owner.id.low_u64(), expected(id));
        }
    }
}
