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

//! Minimal wired-up server. Run with `cargo run --example demo`, then:
//!
//! ```text
//! curl -i 'http://127.0.0.1:3000/users/42?active=true'
//! ```
//!
//! Every error and slow request is emitted as a JSON line; routine requests
//! are sampled at 10%.

use axum::{Extension, Json, Router, routing::get};
use serde_json::{Value, json};
use widelog::{Category, RequestLog, SamplingConfig, WideEventConfig, WideEventLayer};

async fn show_user(
    Extension(log): Extension<RequestLog>,
    axum::extract::Path(id): axum::extract::Path<String>,
) -> Json<Value> {
    log.add_context(Category::User, json!({ "id": id }));
    log.add_context(Category::Business, json!({ "plan": "free" }));
    Json(json!({ "id": id, "request_id": log.snapshot().request_id }))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    let config = WideEventConfig::builder()
        .sampling(SamplingConfig::builder().sample_rate(0.1).build())
        .build();
    let router = Router::new()
        .route("/users/{id}", get(show_user))
        .layer(WideEventLayer::new(config).expect("valid default header"));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000")
        .await
        .unwrap();
    println!("demo server listening on http://127.0.0.1:3000");
    axum::serve(listener, router).await.unwrap();
}
