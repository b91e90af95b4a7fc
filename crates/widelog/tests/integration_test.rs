// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! End-to-end tests: a real axum server behind the wide-event layer.

use std::{sync::Arc, time::Duration};

use axum::{Extension, Json, Router, routing::get};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use widelog::{
    Category, EventStore, MemorySink, MemoryStore, RequestLog, SamplingConfig, WideEventConfig,
    WideEventLayer,
};

fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .try_init();
}

async fn show_user(
    Extension(log): Extension<RequestLog>,
    axum::extract::Path(id): axum::extract::Path<String>,
) -> Json<Value> {
    log.add_context(Category::User, json!({ "id": id, "tier": "standard" }));
    log.add_context(Category::Service, json!({ "version": env!("CARGO_PKG_VERSION") }));
    // Echo the resolved request id back in the body, via the snapshot view.
    Json(json!({ "request_id": log.snapshot().request_id }))
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_millis(50)).await;
    "done"
}

fn app(config: WideEventConfig) -> Router {
    Router::new()
        .route("/users/{id}", get(show_user))
        .route("/slow", get(slow))
        .layer(WideEventLayer::new(config).unwrap())
}

async fn spawn_app(config: WideEventConfig) -> (String, JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app(config);
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{addr}"), handle)
}

fn emitted(sink: &MemorySink) -> Vec<Value> {
    sink.lines()
        .iter()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn request_id_flows_from_header_to_event_body_and_echo() {
    init_test_logging();

    let sink = Arc::new(MemorySink::new());
    let config = WideEventConfig::builder()
        .sink(sink.clone())
        .sampling(SamplingConfig::builder().sample_rate(1.0).build())
        .build();
    let (base, server) = spawn_app(config).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("{base}/users/42?active=true"))
        .header("x-request-id", "abc")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers().get("x-request-id").unwrap(), "abc");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["request_id"], json!("abc"));

    let events = emitted(&sink);
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event["request_id"], json!("abc"));
    assert_eq!(event["method"], json!("GET"));
    assert_eq!(event["path"], json!("/users/42"));
    assert_eq!(event["query_params"], json!({ "active": "true" }));
    assert_eq!(event["status_code"], json!(200));
    assert_eq!(event["user"]["id"], json!("42"));
    assert_eq!(event["service"]["version"], json!(env!("CARGO_PKG_VERSION")));
    assert!(event["duration_ms"].as_u64().is_some());

    server.abort();
}

#[tokio::test]
async fn generated_id_is_consistent_and_slow_requests_measure_their_delay() {
    init_test_logging();

    let sink = Arc::new(MemorySink::new());
    let config = WideEventConfig::builder()
        .sink(sink.clone())
        .sampling(SamplingConfig::builder().sample_rate(1.0).build())
        .build();
    let (base, server) = spawn_app(config).await;

    let response = reqwest::get(format!("{base}/slow")).await.unwrap();
    let echoed = response
        .headers()
        .get("x-request-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(!echoed.is_empty());

    let events = emitted(&sink);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["request_id"], json!(echoed));
    assert!(events[0]["duration_ms"].as_u64().unwrap() >= 50);

    server.abort();
}

#[tokio::test]
async fn unsampled_requests_leave_no_trace() {
    init_test_logging();

    let sink = Arc::new(MemorySink::new());
    let store = Arc::new(MemoryStore::new());
    let config = WideEventConfig::builder()
        .sink(sink.clone())
        .store(store.clone())
        .sampling(SamplingConfig::builder().sample_rate(0.0).build())
        .build();
    let (base, server) = spawn_app(config).await;

    for _ in 0..20 {
        let response = reqwest::get(format!("{base}/users/7")).await.unwrap();
        assert_eq!(response.status(), 200);
    }

    assert!(sink.lines().is_empty());
    assert!(store.is_empty());

    server.abort();
}

#[tokio::test]
async fn retained_events_are_persisted_with_full_context() {
    init_test_logging();

    let sink = Arc::new(MemorySink::new());
    let store = Arc::new(MemoryStore::new());
    let config = WideEventConfig::builder()
        .sink(sink.clone())
        .store(store.clone())
        .sampling(SamplingConfig::builder().sample_rate(1.0).build())
        .build();
    let (base, server) = spawn_app(config).await;

    let client = reqwest::Client::new();
    client
        .get(format!("{base}/users/9"))
        .header("x-request-id", "req-e2e")
        .send()
        .await
        .unwrap();

    let stored = store.get("req-e2e").await.unwrap().unwrap();
    assert_eq!(stored["path"], json!("/users/9"));
    assert_eq!(stored["user"]["id"], json!("9"));

    server.abort();
}
