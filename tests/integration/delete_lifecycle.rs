//! Integration test: delete lifecycle.
//!
//! Tombstones written through one coordinator are honored by every node
//! and cover every part of split objects.

use std::collections::BTreeSet;

use kelp_engine::{CoordinatorConfig, HeadOutcome, ObjectEngine, ObjectError};
use kelp_integration_tests::{IntegrationCluster, START_EPOCH, test_data_seeded};
use kelp_types::{Address, CommonParams, PlacementPolicy, SearchFilter, TombstoneBody};

#[tokio::test]
async fn test_delete_then_head_everywhere() -> anyhow::Result<()> {
    let c = IntegrationCluster::new(3, PlacementPolicy::rep(3)).await;
    let obj = c.object("gone", test_data_seeded(100, 1));
    let address = obj.address()?;
    c.node(0).put(obj, CommonParams::default()).await?;

    let outcome = c.node(1).delete(address, CommonParams::default()).await?;
    assert_eq!(outcome.members, vec![address]);

    for i in 0..c.len() {
        let head = c.node(i).head(address, CommonParams::default()).await?;
        assert_eq!(
            head,
            HeadOutcome::Removed {
                tombstone: Some(outcome.tombstone)
            }
        );
    }
    Ok(())
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_delete_split_object_removes_every_part() -> anyhow::Result<()> {
    let mut config = CoordinatorConfig::default();
    config.split.max_object_size = 1000;
    let c = IntegrationCluster::with_config(3, PlacementPolicy::rep(3), config).await;

    let obj = c.object("split", test_data_seeded(3500, 2));
    let address = obj.address()?;
    c.node(0).put(obj, CommonParams::default()).await?;

    // Parts as stored, found by parent.
    let parts = c
        .node(0)
        .search(
            c.container(),
            vec![SearchFilter::Parent(address.object)],
            CommonParams::default(),
        )
        .await?;
    assert!(!parts.is_empty());

    let outcome = c.node(2).delete(address, CommonParams::default()).await?;
    let members: BTreeSet<Address> = outcome.members.iter().copied().collect();

    // Target, link and four chunks.
    assert_eq!(members.len(), 6);
    assert!(members.contains(&address));
    for part in &parts {
        assert!(members.contains(&Address::new(c.container(), *part)));
    }
    for member in &members {
        assert_eq!(c.removed_on(member), 3, "{member} not removed everywhere");
    }

    let remaining = c
        .node(1)
        .search(c.container(), Vec::new(), CommonParams::default())
        .await?;
    assert_eq!(remaining, BTreeSet::from([outcome.tombstone.object]));

    let err = c
        .node(1)
        .get(address, CommonParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ObjectError::AlreadyRemoved { .. }));
    Ok(())
}

#[tokio::test]
async fn test_tombstone_carries_expiration() -> anyhow::Result<()> {
    let c = IntegrationCluster::new(2, PlacementPolicy::rep(2)).await;
    c.epochs().set(START_EPOCH + 7);
    let obj = c.object("exp", test_data_seeded(10, 3));
    let address = c.seed(0, &obj)?;
    c.seed(1, &obj)?;

    let outcome = c.node(0).delete(address, CommonParams::default()).await?;
    let stored = c
        .network()
        .object(&c.node_id(0), &outcome.tombstone)
        .expect("tombstone stored");
    let body = TombstoneBody::decode(&stored.payload)?;

    let lifetime = CoordinatorConfig::default().tombstone.lifetime_epochs;
    assert_eq!(body.expiration_epoch, START_EPOCH + 7 + lifetime);
    assert_eq!(stored.header.created_epoch, START_EPOCH + 7);
    Ok(())
}

#[tokio::test]
async fn test_repeated_delete_is_accepted() -> anyhow::Result<()> {
    let c = IntegrationCluster::new(3, PlacementPolicy::rep(3)).await;
    let obj = c.object("twice", test_data_seeded(10, 4));
    let address = obj.address()?;
    c.node(0).put(obj, CommonParams::default()).await?;

    let first = c.node(0).delete(address, CommonParams::default()).await?;
    let second = c.node(1).delete(address, CommonParams::default()).await?;
    assert_eq!(first.members, second.members);
    assert_eq!(second.broadcast.stored_on.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_put_after_delete_is_refused() -> anyhow::Result<()> {
    let c = IntegrationCluster::new(3, PlacementPolicy::rep(3)).await;
    let obj = c.object("again", test_data_seeded(10, 5));
    let address = obj.address()?;
    c.node(0).put(obj.clone(), CommonParams::default()).await?;
    c.node(0).delete(address, CommonParams::default()).await?;

    let err = c.node(0).put(obj, CommonParams::default()).await.unwrap_err();
    assert!(matches!(err, ObjectError::QuorumUnreachable { .. }));
    Ok(())
}
