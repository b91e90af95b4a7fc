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

//! The wide event: one structured record aggregating everything known about a
//! single request.
//!
//! The record starts out with the identity fields captured from the inbound
//! request, accumulates categorized context while the handler runs, and is
//! finalized exactly once with status and duration before the sampling
//! decision. See [Stripe's "canonical log lines"](https://stripe.com/blog/canonical-log-lines)
//! for the pattern this implements.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

/// Fallback error code when the reported error carries none.
pub const UNKNOWN_ERROR_CODE: &str = "UNKNOWN";

/// One of the four fixed context buckets attachable to an event.
///
/// The buckets are intentionally schema-free: each holds an open JSON object
/// that callers merge into at will. The fixed set of names is enforced by the
/// type system, so the "invalid category" failure mode of stringly-typed
/// implementations cannot occur here.
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Category {
    /// Who is making the request: ids, tiers, auth scopes.
    User,
    /// Domain-level facts: order ids, cart totals, feature decisions.
    Business,
    /// Platform facts: region, instance, upstream dependency timings.
    Infra,
    /// Facts about this service itself: version, deploy, code path taken.
    Service,
}

/// Structured description of an error attached to an event.
///
/// At most one of these exists per event. A second report overwrites the
/// derived fields (`kind`/`code`/`message`/`retriable`/`stack`) with the newer
/// error's values while previously attached metadata survives in `extra`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ErrorDetails {
    /// The error's type name, without its module path.
    #[serde(rename = "type")]
    pub kind:      String,
    /// Machine-readable code, [`UNKNOWN_ERROR_CODE`] when the error has none.
    pub code:      String,
    pub message:   String,
    pub retriable: bool,
    /// Captured backtrace, present only when backtrace capture is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack:     Option<String>,
    /// Caller-supplied metadata, serialized at the top level of the error
    /// substructure.
    #[serde(flatten)]
    pub extra:     Map<String, Value>,
}

/// Errors that know how to describe themselves on a wide event.
///
/// Both accessors have permissive defaults, so adopting the trait is a
/// one-liner for error types without codes or retry semantics:
///
/// ```
/// #[derive(Debug, snafu::Snafu)]
/// #[snafu(display("upstream timed out"))]
/// struct UpstreamTimeout;
///
/// impl widelog::Reportable for UpstreamTimeout {
///     fn code(&self) -> Option<&str> { Some("UPSTREAM_TIMEOUT") }
///     fn retriable(&self) -> bool { true }
/// }
/// ```
pub trait Reportable: std::error::Error {
    /// Machine-readable error code, if the error carries one.
    fn code(&self) -> Option<&str> { None }

    /// Whether the caller may retry the failed operation.
    fn retriable(&self) -> bool { false }
}

impl ErrorDetails {
    /// Derives details from a [`Reportable`] error.
    pub fn derive<E>(error: &E, capture_stack: bool) -> Self
    where
        E: Reportable + ?Sized,
    {
        Self {
            kind:      short_type_name::<E>().to_string(),
            code:      error
                .code()
                .unwrap_or(UNKNOWN_ERROR_CODE)
                .to_string(),
            message:   error.to_string(),
            retriable: error.retriable(),
            stack:     capture_stack.then(current_backtrace),
            extra:     Map::new(),
        }
    }

    /// Details for an error only known through its `Display` output, as on the
    /// automatic failure path where the inner service's error type is opaque.
    pub(crate) fn from_message(kind: &str, message: String, capture_stack: bool) -> Self {
        Self {
            kind: kind.to_string(),
            code: UNKNOWN_ERROR_CODE.to_string(),
            message,
            retriable: false,
            stack: capture_stack.then(current_backtrace),
            extra: Map::new(),
        }
    }

    /// Merges caller metadata on top of the derived fields. Metadata wins on
    /// key collision; keys that do not name a derived field land in `extra`.
    fn apply_metadata(&mut self, metadata: Map<String, Value>) {
        for (key, value) in metadata {
            if let Some(value) = self.apply_known(&key, value) {
                self.extra.insert(key, value);
            }
        }
    }

    // Returns the value back when `key` does not match a derived field of the
    // expected type.
    fn apply_known(&mut self, key: &str, value: Value) -> Option<Value> {
        match (key, value) {
            ("type", Value::String(s)) => self.kind = s,
            ("code", Value::String(s)) => self.code = s,
            ("message", Value::String(s)) => self.message = s,
            ("retriable", Value::Bool(b)) => self.retriable = b,
            ("stack", Value::String(s)) => self.stack = Some(s),
            (_, value) => return Some(value),
        }
        None
    }
}

/// The per-request record.
///
/// Identity fields (`request_id`, `timestamp`, `method`, `path`) are set once
/// at capture and never mutated afterward. `status_code` and `duration_ms` are
/// set exactly once at finalization. Absent optional fields are omitted from
/// the serialized line entirely.
#[derive(Clone, Debug, Serialize)]
pub struct WideEvent {
    pub request_id: String,
    /// Capture-time wall clock, RFC 3339 with millisecond precision.
    pub timestamp:  String,
    pub method:     String,
    pub path:       String,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub query_params: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_size_bytes: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infra: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<Map<String, Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
}

impl WideEvent {
    /// Shallow-merges `data` into the given category slot, creating the slot
    /// on first use. Later keys overwrite earlier ones; nothing is ever
    /// deleted, and other slots are never touched.
    pub fn merge_category(&mut self, category: Category, data: Map<String, Value>) {
        let slot = self.slot_mut(category);
        match slot {
            Some(existing) => existing.extend(data),
            None => *slot = Some(data),
        }
    }

    /// Read access to a category slot, `None` until something was merged in.
    #[must_use]
    pub fn category(&self, category: Category) -> Option<&Map<String, Value>> {
        match category {
            Category::User => self.user.as_ref(),
            Category::Business => self.business.as_ref(),
            Category::Infra => self.infra.as_ref(),
            Category::Service => self.service.as_ref(),
        }
    }

    /// Records error details on the event.
    ///
    /// A repeat report is a merge: derived fields take the newest error's
    /// values, metadata already attached by earlier reports survives, and the
    /// metadata passed alongside this report is applied last so it wins any
    /// collision.
    pub fn record_error(&mut self, details: ErrorDetails, metadata: Option<Map<String, Value>>) {
        let mut next = details;
        if let Some(previous) = self.error.take() {
            next.extra = previous.extra;
        }
        if let Some(metadata) = metadata {
            next.apply_metadata(metadata);
        }
        self.error = Some(next);
    }

    fn slot_mut(&mut self, category: Category) -> &mut Option<Map<String, Value>> {
        match category {
            Category::User => &mut self.user,
            Category::Business => &mut self.business,
            Category::Infra => &mut self.infra,
            Category::Service => &mut self.service,
        }
    }
}

#[cfg(test)]
impl WideEvent {
    /// Bare captured event, shared by tests across modules.
    pub(crate) fn blank(method: &str, path: &str) -> Self {
        Self {
            request_id: "req-1".to_string(),
            timestamp: "2025-01-01T00:00:00.000Z".to_string(),
            method: method.to_string(),
            path: path.to_string(),
            query_params: BTreeMap::new(),
            status_code: None,
            duration_ms: None,
            client_ip: None,
            user_agent: None,
            content_type: None,
            request_size_bytes: None,
            response_size_bytes: None,
            user: None,
            business: None,
            infra: None,
            service: None,
            error: None,
        }
    }
}

/// Type name without its module path, e.g. `Error` for `std::io::Error`.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    // Strip the module path but keep generic arguments readable.
    let head_end = full.find('<').unwrap_or(full.len());
    let start = full[..head_end].rfind("::").map_or(0, |idx| idx + 2);
    &full[start..]
}

fn current_backtrace() -> String {
    std::backtrace::Backtrace::force_capture().to_string()
}
