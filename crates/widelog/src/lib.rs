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

//! Wide-event request logging with tail sampling, as a tower layer for axum.
//!
//! Instead of scattering log lines across a request's lifetime, widelog
//! assembles one comprehensive JSON record per request — method, path,
//! timing, status, handler-added business context, error details — and
//! decides *after* the outcome is known whether the record is worth keeping.
//! Failed, slow, and otherwise interesting requests are always retained;
//! routine ones are sampled down to a configurable rate.
//!
//! ```ignore
//! use axum::{Extension, Router, routing::get};
//! use serde_json::json;
//! use widelog::{Category, RequestLog, WideEventConfig, WideEventLayer};
//!
//! async fn show_user(Extension(log): Extension<RequestLog>) -> &'static str {
//!     log.add_context(Category::User, json!({ "id": "u-42", "tier": "vip" }));
//!     "hello"
//! }
//!
//! let router: Router = Router::new()
//!     .route("/users/{id}", get(show_user))
//!     .layer(WideEventLayer::new(WideEventConfig::default()).unwrap());
//! ```

mod capture;

pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod layer;
pub mod sampling;
pub mod sink;
pub mod store;

pub use config::{
    DEFAULT_REQUEST_ID_HEADER, DrawFn, IdGenerator, SamplerOverride, WideEventConfig,
};
pub use context::RequestLog;
pub use error::{Error, Result};
pub use event::{Category, ErrorDetails, Reportable, UNKNOWN_ERROR_CODE, WideEvent};
pub use layer::{WideEventLayer, WideEventService};
pub use sampling::{SamplingConfig, Xorshift64, default_policy};
pub use sink::{EventSink, MemorySink, TracingSink};
pub use store::{EventStore, MemoryStore};
