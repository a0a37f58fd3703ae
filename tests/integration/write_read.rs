//! Integration test: write / read across coordinators.
//!
//! Objects written through one node are readable, headable and searchable
//! through every other node.

use kelp_engine::{CoordinatorConfig, HeadOutcome, ObjectEngine};
use kelp_integration_tests::{IntegrationCluster, test_data_seeded};
use kelp_types::{CommonParams, ObjectType, PlacementPolicy, SearchFilter};

#[tokio::test]
async fn test_put_on_one_node_get_from_all() -> anyhow::Result<()> {
    let c = IntegrationCluster::new(5, PlacementPolicy::rep(3)).await;
    let obj = c.object("a", test_data_seeded(10_000, 1));
    let address = obj.address()?;

    let outcome = c.node(0).put(obj.clone(), CommonParams::default()).await?;
    assert_eq!(outcome.stored_on.len(), 3);
    assert_eq!(c.copies(&address), 3);

    for i in 0..c.len() {
        let got = c.node(i).get(address, CommonParams::default()).await?;
        assert_eq!(got, obj, "read through node {i}");
    }
    Ok(())
}

#[tokio::test]
async fn test_head_through_other_node() -> anyhow::Result<()> {
    let c = IntegrationCluster::new(4, PlacementPolicy::rep(2)).await;
    let obj = c.object("h", test_data_seeded(100, 2));
    c.node(1).put(obj.clone(), CommonParams::default()).await?;

    let head = c
        .node(3)
        .head(obj.address()?, CommonParams::default())
        .await?;
    assert_eq!(head, HeadOutcome::Found(obj.header.clone()));
    Ok(())
}

#[tokio::test]
async fn test_search_by_attribute() -> anyhow::Result<()> {
    let c = IntegrationCluster::new(3, PlacementPolicy::rep(3)).await;
    let mut ids = Vec::new();
    for i in 0..10u32 {
        let obj = c.object(&format!("obj-{i}"), test_data_seeded(50, i));
        ids.push(c.node(i as usize % 3).put(obj, CommonParams::default()).await?.object_id);
    }

    let found = c
        .node(2)
        .search(
            c.container(),
            vec![SearchFilter::Attribute {
                key: "name".into(),
                value: "obj-7".into(),
            }],
            CommonParams::default(),
        )
        .await?;
    assert_eq!(found.into_iter().collect::<Vec<_>>(), vec![ids[7]]);

    let all = c
        .node(0)
        .search(c.container(), vec![SearchFilter::RootOnly], CommonParams::default())
        .await?;
    assert_eq!(all.len(), 10);
    Ok(())
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_large_object_split_round_trip() -> anyhow::Result<()> {
    let mut config = CoordinatorConfig::default();
    config.split.max_object_size = 4096;
    config.split.payload_chunk_size = 1024;
    let c = IntegrationCluster::with_config(4, PlacementPolicy::rep(3), config).await;

    let obj = c.object("big", test_data_seeded(20_000, 3));
    let address = obj.address()?;
    let outcome = c.node(0).put(obj.clone(), CommonParams::default()).await?;
    assert_eq!(outcome.object_id, address.object);

    // The virtual object itself is stored nowhere.
    assert_eq!(c.copies(&address), 0);

    let head = c.node(2).head(address, CommonParams::default()).await?;
    let HeadOutcome::Split(info) = head else {
        panic!("expected split info, got {head:?}");
    };
    assert!(info.link.is_some() || info.last_part.is_some());

    let got = c.node(3).get(address, CommonParams::default()).await?;
    assert_eq!(got, obj);

    let links = c
        .node(1)
        .search(
            c.container(),
            vec![SearchFilter::Type(ObjectType::Link), SearchFilter::Parent(address.object)],
            CommonParams::default(),
        )
        .await?;
    assert_eq!(links.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_local_only_reads_own_storage() -> anyhow::Result<()> {
    let c = IntegrationCluster::new(3, PlacementPolicy::rep(3)).await;
    let obj = c.object("local", test_data_seeded(64, 4));
    let address = c.seed(1, &obj)?;

    let missing = c.node(0).get(address, CommonParams::local()).await;
    assert!(missing.is_err());

    let got = c.node(1).get(address, CommonParams::local()).await?;
    assert_eq!(got, obj);
    Ok(())
}
