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

//! The per-request handle handlers use to enrich the wide event.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use crate::event::{Category, ErrorDetails, Reportable, WideEvent};

/// Handle to the request's wide event, valid for the lifetime of one request.
///
/// The layer inserts a clone into the request's extensions, so axum handlers
/// receive it through the standard extension extractor:
///
/// ```ignore
/// async fn checkout(Extension(log): Extension<RequestLog>) -> impl IntoResponse {
///     log.add_context(Category::Business, json!({ "cart_total": 99.95 }));
///     // ...
/// }
/// ```
///
/// Clones share the same event; no two concurrent requests ever share one.
#[derive(Clone)]
pub struct RequestLog {
    event:         Arc<Mutex<WideEvent>>,
    capture_stack: bool,
}

impl RequestLog {
    pub(crate) fn new(event: WideEvent, capture_stack: bool) -> Self {
        Self {
            event: Arc::new(Mutex::new(event)),
            capture_stack,
        }
    }

    /// Merges a JSON object into one of the four context buckets.
    ///
    /// Never fails: a non-object value is logged at warn and ignored, and
    /// repeat merges follow the shallow last-wins rule of
    /// [`WideEvent::merge_category`].
    pub fn add_context(&self, category: Category, data: Value) {
        match data {
            Value::Object(map) => self.with_event(|event| event.merge_category(category, map)),
            other => {
                tracing::warn!(
                    %category,
                    value_kind = value_kind(&other),
                    "context data must be a JSON object, ignoring"
                );
            }
        }
    }

    /// Records an error on the event without touching status or control flow.
    pub fn add_error<E>(&self, error: &E)
    where
        E: Reportable + ?Sized,
    {
        let details = ErrorDetails::derive(error, self.capture_stack);
        self.with_event(|event| event.record_error(details, None));
    }

    /// Like [`RequestLog::add_error`], with extra metadata merged into the
    /// error substructure. Metadata wins over derived fields on collision; a
    /// non-object metadata value is logged at warn and dropped.
    pub fn add_error_with<E>(&self, error: &E, metadata: Value)
    where
        E: Reportable + ?Sized,
    {
        let details = ErrorDetails::derive(error, self.capture_stack);
        let metadata = match metadata {
            Value::Object(map) => Some(map),
            other => {
                tracing::warn!(
                    value_kind = value_kind(&other),
                    "error metadata must be a JSON object, dropping"
                );
                None
            }
        };
        self.with_event(|event| event.record_error(details, metadata));
    }

    /// Deep copy of the event's current state, the same view the sampling
    /// policy sees once the event is finalized.
    #[must_use]
    pub fn snapshot(&self) -> WideEvent { self.with_event(|event| event.clone()) }

    /// The resolved request id, also echoed on the response header.
    #[must_use]
    pub fn request_id(&self) -> String {
        self.with_event(|event| event.request_id.clone())
    }

    /// Failure-path error capture, derived from an opaque service error.
    pub(crate) fn record_failure(&self, kind: &str, message: String) {
        let details = ErrorDetails::from_message(kind, message, self.capture_stack);
        self.with_event(|event| event.record_error(details, None));
    }

    /// Finalization point: status and duration are set here, exactly once.
    pub(crate) fn finalize(&self, status_code: u16, duration_ms: u64, response_size: Option<u64>) {
        self.with_event(|event| {
            event.status_code = Some(status_code);
            event.duration_ms = Some(duration_ms);
            event.response_size_bytes = response_size;
        });
    }

    fn with_event<T>(&self, f: impl FnOnce(&mut WideEvent) -> T) -> T {
        // A poisoned lock only means a panic mid-mutation elsewhere; the
        // event is still the best record we have.
        let mut guard = self.event.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

const fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
