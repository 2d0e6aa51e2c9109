use std::time::Duration;

use order_events::store::InMemoryStore;
use serde_json::{json, Value};

use crate::support::start_server;

#[tokio::test]
async fn healthy_when_no_dependency_is_degraded() {
    let server = start_server(InMemoryStore::new(), Duration::from_secs(5)).await;
    let created = reqwest::Client::new()
        .post(format!("{}/orders", server.base))
        .json(&json!({ "user_id": "u1", "product": "p1", "quantity": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 201);

    let resp = reqwest::get(format!("{}/health", server.base)).await.unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["dependencies"][0]["name"], "store");
    assert_eq!(body["dependencies"][0]["state"], "connected");
}

#[tokio::test]
async fn reports_degraded_dependency() {
    let store = InMemoryStore::new();
    let server = start_server(store.clone(), Duration::from_secs(5)).await;
    store.set_available(false);
    assert!(server.store_supervisor.ensure_connected().await.is_err());

    let resp = reqwest::get(format!("{}/health", server.base)).await.unwrap();
    assert_eq!(resp.status(), 503);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["dependencies"][0]["state"], "degraded");
}
