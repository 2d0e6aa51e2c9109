use std::time::Duration;

use order_events::store::{InMemoryStore, OrderStore};
use serde_json::{json, Value};

use crate::support::start_server;

#[tokio::test]
async fn create_order_returns_201() {
    let server = start_server(InMemoryStore::new(), Duration::from_secs(5)).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/orders", server.base))
        .json(&json!({ "user_id": "u1", "product": "p1", "quantity": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["user_id"], "u1");
    assert_eq!(body["product"], "p1");
    assert_eq!(body["quantity"], 2);
    let id = body["id"].as_str().unwrap();
    assert!(server.store.get_order(id).await.unwrap().is_some());
    assert_eq!(server.store.outbox_count(), 1);
}

#[tokio::test]
async fn legacy_path_is_accepted() {
    let server = start_server(InMemoryStore::new(), Duration::from_secs(5)).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/order", server.base))
        .json(&json!({ "user_id": "u1", "product": "p1", "quantity": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
}

#[tokio::test]
async fn invalid_order_returns_400() {
    let server = start_server(InMemoryStore::new(), Duration::from_secs(5)).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/orders", server.base))
        .json(&json!({ "user_id": " ", "product": "p1", "quantity": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["kind"], "VALIDATION");
    assert!(body["error"].as_str().unwrap().contains("quantity"));
    assert_eq!(server.store.order_count(), 0);
}

#[tokio::test]
async fn malformed_json_returns_400() {
    let server = start_server(InMemoryStore::new(), Duration::from_secs(5)).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/orders", server.base))
        .header("content-type", "application/json")
        .body("{\"user_id\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{}/orders", server.base))
        .json(&json!({ "user_id": "u1", "product": "p1", "quantity": "two" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["kind"], "VALIDATION");
}

#[tokio::test]
async fn storage_failure_returns_500() {
    let store = InMemoryStore::new();
    let server = start_server(store.clone(), Duration::from_secs(5)).await;
    store.fail_next_commit();

    let resp = reqwest::Client::new()
        .post(format!("{}/orders", server.base))
        .json(&json!({ "user_id": "u1", "product": "p1", "quantity": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["kind"], "STORAGE");
    assert_eq!(store.order_count(), 0);
    assert_eq!(store.outbox_count(), 0);
}

#[tokio::test]
async fn store_outage_degrades_intake() {
    let store = InMemoryStore::new();
    let server = start_server(store.clone(), Duration::from_secs(5)).await;
    let client = reqwest::Client::new();
    let post = || {
        client
            .post(format!("{}/orders", server.base))
            .json(&json!({ "user_id": "u1", "product": "p1", "quantity": 1 }))
            .send()
    };

    assert_eq!(post().await.unwrap().status(), 201);

    store.set_available(false);
    let resp = post().await.unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["kind"], "STORAGE");

    // The failed commit reconnects on the next request, which outlasts the
    // retry window.
    let resp = post().await.unwrap();
    assert_eq!(resp.status(), 503);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["kind"], "DEGRADED");

    let resp = reqwest::get(format!("{}/health", server.base)).await.unwrap();
    assert_eq!(resp.status(), 503);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["dependencies"][0]["state"], "degraded");
    assert_eq!(store.order_count(), 1);
}

#[tokio::test]
async fn expired_deadline_returns_504_and_writes_nothing() {
    let store = InMemoryStore::new();
    let server = start_server(store.clone(), Duration::from_secs(5)).await;
    store.set_latency(Duration::from_millis(500));

    let resp = reqwest::Client::new()
        .post(format!("{}/orders", server.base))
        .header("x-request-timeout-ms", "50")
        .json(&json!({ "user_id": "u1", "product": "p1", "quantity": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 504);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["kind"], "TIMEOUT");

    tokio::time::sleep(Duration::from_millis(600)).await;
    store.set_latency(Duration::ZERO);
    assert_eq!(store.order_count(), 0);
    assert_eq!(store.outbox_count(), 0);
}
