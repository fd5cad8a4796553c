//! Acceptance tests against a running Aerospike cluster with security enabled.
//!
//! Connection settings come from AEROSPIKE_HOST, AEROSPIKE_PORT,
//! AEROSPIKE_USER and AEROSPIKE_PASSWORD. Run with
//! `cargo test --test live_cluster -- --ignored`.

use aerospike_provider::domain::capability::server_major_version;
use aerospike_provider::{ClusterClient, PlanAction, Provider, ProviderConfig};
use serde_json::json;
use std::time::Duration;

async fn provider() -> Provider {
    Provider::configure(&ProviderConfig::default())
        .await
        .expect("cluster reachable with the AEROSPIKE_* settings")
}

#[tokio::test]
#[ignore]
async fn test_live_build_is_reported() {
    let provider = provider().await;
    let major = server_major_version(provider.client().as_ref()).await.unwrap();
    assert!(major >= 4);
}

#[tokio::test]
#[ignore]
async fn test_live_cancelled_command_leaves_no_stale_reply() {
    let provider = provider().await;
    let client = provider.client();

    for _ in 0..5 {
        let _ = tokio::time::timeout(
            Duration::from_micros(1),
            client.request_info("statistics"),
        )
        .await;
        let reply = client.request_info("build").await.unwrap();
        assert_eq!(reply.len(), 1);
        assert!(reply.contains_key("build"));
    }
}

#[tokio::test]
#[ignore]
async fn test_live_role_lifecycle() {
    let provider = provider().await;
    let handler = provider.resource("aerospike_role").unwrap();
    let config = json!({
        "role_name": "acc_test_role",
        "privileges": [{"privilege": "read", "namespace": "test"}],
        "white_list": ["10.0.0.1"],
    });

    let planned = handler.plan(None, config.clone()).unwrap();
    let state = handler.create(planned.planned_state).await.unwrap();

    let refreshed = handler.read(state).await.unwrap().unwrap();
    let replan = handler.plan(Some(&refreshed), config).unwrap();
    assert_eq!(replan.action, PlanAction::NoOp);

    let changed = json!({
        "role_name": "acc_test_role",
        "privileges": [{"privilege": "write", "namespace": "test"}],
    });
    let planned = handler.plan(Some(&refreshed), changed).unwrap();
    let updated = handler
        .update(refreshed, planned.planned_state)
        .await
        .unwrap();
    let read = handler.read(updated.clone()).await.unwrap().unwrap();
    assert_eq!(read["privileges"], json!([{"privilege": "write", "namespace": "test"}]));
    assert_eq!(read["white_list"], json!([]));

    handler.delete(updated.clone()).await.unwrap();
    assert!(handler.read(updated).await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn test_live_user_lifecycle() {
    let provider = provider().await;
    let handler = provider.resource("aerospike_user").unwrap();
    let state = handler
        .create(json!({"user_name": "acc_test_user", "password": "first", "roles": ["read"]}))
        .await
        .unwrap();

    let planned = handler
        .plan(
            Some(&state),
            json!({"user_name": "acc_test_user", "password": "second", "roles": ["read-write"]}),
        )
        .unwrap();
    assert_eq!(planned.action, PlanAction::Update);
    let updated = handler
        .update(state, planned.planned_state)
        .await
        .unwrap();

    let read = handler.read(updated.clone()).await.unwrap().unwrap();
    assert_eq!(read["roles"], json!(["read-write"]));

    handler.delete(updated.clone()).await.unwrap();
    handler.delete(updated).await.unwrap();
}
