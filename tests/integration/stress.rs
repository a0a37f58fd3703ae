//! Integration test: stress.
//!
//! Concurrent writers, readers and deleters across every coordinator.
//! Verifies no corruption and no lost tombstones under load.

use std::sync::Arc;

use kelp_engine::ObjectEngine;
use kelp_integration_tests::{IntegrationCluster, test_data_seeded};
use kelp_types::{CommonParams, PlacementPolicy};
use tokio::sync::Barrier;

/// 8 concurrent writers, 25 objects each, then every object read back
/// through a different node than the one that wrote it.
#[tokio::test]
#[ntest::timeout(60000)]
async fn test_concurrent_writers() {
    let c = Arc::new(IntegrationCluster::new(5, PlacementPolicy::rep(3)).await);
    let barrier = Arc::new(Barrier::new(8));

    let mut handles = Vec::new();
    for writer in 0..8usize {
        let c = c.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let mut written = Vec::new();
            for j in 0..25usize {
                let seed = (writer * 1000 + j) as u32;
                let obj = c.object(&format!("w{writer}-{j:02}"), test_data_seeded(500 + j * 10, seed));
                c.node(writer % 5)
                    .put(obj.clone(), CommonParams::default())
                    .await
                    .unwrap();
                written.push(obj);
            }
            written
        }));
    }

    let mut all = Vec::new();
    for h in handles {
        all.extend(h.await.unwrap());
    }
    assert_eq!(all.len(), 200);

    for (i, obj) in all.iter().enumerate() {
        let reader = (i + 1) % 5;
        let got = c
            .node(reader)
            .get(obj.address().unwrap(), CommonParams::default())
            .await
            .unwrap();
        assert_eq!(&got, obj, "corruption on reader {reader}");
    }
}

/// Writers and deleters racing on disjoint objects.
#[tokio::test]
#[ntest::timeout(60000)]
async fn test_concurrent_put_and_delete() {
    let c = Arc::new(IntegrationCluster::new(4, PlacementPolicy::rep(2)).await);

    let mut victims = Vec::new();
    for i in 0..40u32 {
        let obj = c.object(&format!("victim-{i}"), test_data_seeded(200, i));
        c.node(0).put(obj.clone(), CommonParams::default()).await.unwrap();
        victims.push(obj.address().unwrap());
    }

    let deleter = {
        let c = c.clone();
        let victims = victims.clone();
        tokio::spawn(async move {
            for (i, address) in victims.into_iter().enumerate() {
                c.node(i % 4)
                    .delete(address, CommonParams::default())
                    .await
                    .unwrap();
            }
        })
    };
    let writer = {
        let c = c.clone();
        tokio::spawn(async move {
            for i in 0..40u32 {
                let obj = c.object(&format!("keeper-{i}"), test_data_seeded(200, 1000 + i));
                c.node(3).put(obj, CommonParams::default()).await.unwrap();
            }
        })
    };
    deleter.await.unwrap();
    writer.await.unwrap();

    for address in &victims {
        assert!(c.removed_on(address) >= 2, "{address} survived");
    }
    let left = c
        .node(1)
        .search(
            c.container(),
            vec![kelp_types::SearchFilter::Type(kelp_types::ObjectType::Regular)],
            CommonParams::default(),
        )
        .await
        .unwrap();
    assert_eq!(left.len(), 40);
}
