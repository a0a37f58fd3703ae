//! ObjectReader: plain reads and split reassembly.

use kelp_types::{Object, PlacementPolicy, TombstoneBody};

use super::helpers::*;
use crate::error::ObjectError;

#[tokio::test]
async fn test_get_plain_object() {
    let cluster = TestCluster::new(3, PlacementPolicy::rep(3)).await;
    let obj = object(test_data(4096));
    let address = cluster.seed_everywhere(&obj);

    let ctx = cluster.ctx(Some(address.object));
    let fetched = cluster.reader().get(&ctx, address).await.unwrap();
    assert_eq!(fetched, obj);
}

#[tokio::test]
async fn test_get_not_found() {
    let cluster = TestCluster::new(3, PlacementPolicy::rep(3)).await;
    let address = addr(object(test_data(10)).id().unwrap());

    let ctx = cluster.ctx(Some(address.object));
    let err = cluster.reader().get(&ctx, address).await.unwrap_err();
    assert!(matches!(err, ObjectError::NotFound(a) if a == address));
}

#[tokio::test]
async fn test_get_removed() {
    let cluster = TestCluster::new(3, PlacementPolicy::rep(3)).await;
    let obj = object(test_data(10));
    let address = obj.address().unwrap();
    let tombstone = TombstoneBody::new([address], 20, None)
        .into_object(container(), owner(), 10)
        .unwrap();
    let ts_address = cluster.seed_everywhere(&tombstone);

    let ctx = cluster.ctx(Some(address.object));
    let err = cluster.reader().get(&ctx, address).await.unwrap_err();
    assert!(
        matches!(err, ObjectError::AlreadyRemoved { tombstone: Some(t), .. } if t == ts_address),
        "got {err:?}"
    );
}

#[tokio::test]
async fn test_get_skips_tampered_copy() {
    let cluster = TestCluster::new(3, PlacementPolicy::rep(3)).await;
    let obj = object(test_data(256));
    let address = obj.address().unwrap();

    // Node 1 holds a copy whose payload no longer matches its checksum.
    let mut bad = obj.clone();
    bad.payload = bytes::Bytes::from(test_data(255));
    cluster.network.seed(&node(1), &bad).unwrap();
    cluster.network.seed(&node(2), &obj).unwrap();
    cluster.network.seed(&node(3), &obj).unwrap();

    let ctx = cluster.ctx(Some(address.object));
    let fetched = cluster.reader().get(&ctx, address).await.unwrap();
    assert_eq!(fetched, obj);
}

#[tokio::test]
async fn test_get_reassembles_split_from_link() {
    let cluster = TestCluster::new(3, PlacementPolicy::rep(3)).await;
    let parent = object(test_data(3500));
    let layout = split(&parent, 1000);
    assert_eq!(layout.chunks.len(), 4);
    cluster.seed_layout(&layout);

    let address = addr(layout.parent_id);
    let ctx = cluster.ctx(Some(address.object));
    let fetched = cluster.reader().get(&ctx, address).await.unwrap();

    assert_eq!(fetched, parent);
    assert!(ctx.split_info().is_some());
}

#[tokio::test]
async fn test_get_reassembles_split_from_chain() {
    let cluster = TestCluster::new(3, PlacementPolicy::rep(3)).await;
    let parent = object(test_data(2500));
    let layout = split(&parent, 1000);

    // No link anywhere: only the previous-link chain is available.
    for chunk in &layout.chunks {
        cluster.seed_everywhere(chunk);
    }

    let address = addr(layout.parent_id);
    let ctx = cluster.ctx(Some(address.object));
    let fetched = cluster.reader().get(&ctx, address).await.unwrap();
    assert_eq!(fetched, parent);
}

#[tokio::test]
async fn test_get_split_with_missing_chunk() {
    let cluster = TestCluster::new(3, PlacementPolicy::rep(3)).await;
    let layout = split(&object(test_data(3000)), 1000);

    // First chunk lost on every node.
    for part in layout.chunks.iter().skip(1) {
        cluster.seed_everywhere(part);
    }

    let address = addr(layout.parent_id);
    let ctx = cluster.ctx(Some(address.object));
    let err = cluster.reader().get(&ctx, address).await.unwrap_err();
    assert!(matches!(err, ObjectError::MalformedChain(_)), "got {err:?}");
}

#[tokio::test]
async fn test_get_split_single_node_knows_link_only() {
    let cluster = TestCluster::new(3, PlacementPolicy::rep(3)).await;
    let parent = object(test_data(2000));
    let layout = split(&parent, 1000);

    // Link on node 1, chunks spread over nodes 2 and 3.
    cluster.network.seed(&node(1), &layout.link).unwrap();
    cluster.network.seed(&node(2), &layout.chunks[0]).unwrap();
    cluster.network.seed(&node(3), &layout.chunks[1]).unwrap();

    let address = addr(layout.parent_id);
    let ctx = cluster.ctx(Some(address.object));
    let fetched: Object = cluster.reader().get(&ctx, address).await.unwrap();
    assert_eq!(fetched.payload, parent.payload);
    assert_eq!(fetched.id().unwrap(), layout.parent_id);
}
