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

//! The tower layer orchestrating the event lifecycle around each request:
//! capture, handler enrichment, finalization, sampling, disposition.

use std::{
    panic::AssertUnwindSafe,
    sync::Arc,
    task::{Context, Poll},
    time::Instant,
};

use futures::future::BoxFuture;
use http::{HeaderName, HeaderValue, Request, Response};
use snafu::ResultExt;
use tower::{Layer, Service};

use crate::{
    capture,
    config::WideEventConfig,
    context::RequestLog,
    error::{InvalidHeaderNameSnafu, Result},
    event::{WideEvent, short_type_name},
    sampling::default_policy,
};

/// Emits one wide event per request flowing through the wrapped service.
///
/// Layer it onto an `axum::Router` like any other tower layer:
///
/// ```ignore
/// let router = Router::new()
///     .route("/users/{id}", get(show_user))
///     .layer(WideEventLayer::new(WideEventConfig::default())?);
/// ```
///
/// Handlers reach the event through [`RequestLog`] in the request extensions.
/// Disposition (sample, emit, persist) runs exactly once per completed
/// request, on the success and failure paths alike. If the connection is
/// aborted mid-flight the in-flight future is dropped and no event is
/// emitted for that request.
#[derive(Clone)]
pub struct WideEventLayer {
    shared: Arc<Shared>,
}

struct Shared {
    config: WideEventConfig,
    header: HeaderName,
}

impl WideEventLayer {
    /// Fails when the configured request id header name is not a legal HTTP
    /// header name.
    pub fn new(config: WideEventConfig) -> Result<Self> {
        let header = HeaderName::from_bytes(config.header_name.as_bytes()).context(
            InvalidHeaderNameSnafu {
                name: config.header_name.clone(),
            },
        )?;
        Ok(Self {
            shared: Arc::new(Shared { config, header }),
        })
    }
}

impl Default for WideEventLayer {
    fn default() -> Self {
        Self::new(WideEventConfig::default()).expect("default header name is valid")
    }
}

impl<S> Layer<S> for WideEventLayer {
    type Service = WideEventService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        WideEventService {
            inner,
            shared: self.shared.clone(),
        }
    }
}

/// Service produced by [`WideEventLayer`].
#[derive(Clone)]
pub struct WideEventService<S> {
    inner:  S,
    shared: Arc<Shared>,
}

impl<S, ReqB, ResB> Service<Request<ReqB>> for WideEventService<S>
where
    S: Service<Request<ReqB>, Response = Response<ResB>> + Clone + Send + 'static,
    S::Error: std::fmt::Display + Send + 'static,
    S::Future: Send + 'static,
    ReqB: Send + 'static,
    ResB: Send + 'static,
{
    type Error = S::Error;
    type Future = BoxFuture<'static, std::result::Result<Self::Response, Self::Error>>;
    type Response = Response<ResB>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqB>) -> Self::Future {
        let shared = self.shared.clone();
        // Take the service that was driven to readiness, leave the clone.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let started = Instant::now();
            let event = capture::capture(&req, &shared.config);
            let log = RequestLog::new(event, shared.config.capture_backtraces);
            let request_id = log.request_id();
            req.extensions_mut().insert(log.clone());

            let result = match inner.call(req).await {
                Ok(mut response) => {
                    log.finalize(
                        response.status().as_u16(),
                        elapsed_ms(started),
                        capture::content_length(response.headers()),
                    );
                    echo_request_id(&mut response, &shared.header, &request_id);
                    Ok(response)
                }
                Err(error) => {
                    // Status is a fixed 500 here: the error never produced a
                    // response, whatever it would have mapped to upstream.
                    log.finalize(500, elapsed_ms(started), None);
                    log.record_failure(short_type_name::<S::Error>(), error.to_string());
                    Err(error)
                }
            };

            dispose(&shared, &log).await;
            result
        })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn echo_request_id<B>(response: &mut Response<B>, header: &HeaderName, request_id: &str) {
    match HeaderValue::from_str(request_id) {
        Ok(value) => {
            response.headers_mut().insert(header.clone(), value);
        }
        Err(error) => {
            tracing::warn!(%error, request_id, "request id is not a valid header value");
        }
    }
}

/// The guaranteed final step: sample the finalized event and, when kept, emit
/// one JSON line and persist it. Sink serialization problems and store
/// failures are logged and suppressed so they can never alter the response or
/// mask a handler error.
async fn dispose(shared: &Shared, log: &RequestLog) {
    let event = log.snapshot();
    if !keep(shared, &event) {
        return;
    }

    let value = match serde_json::to_value(&event) {
        Ok(value) => value,
        Err(error) => {
            tracing::warn!(%error, request_id = %event.request_id, "failed to serialize wide event");
            return;
        }
    };
    shared.config.sink.info(&value.to_string());

    if let Some(store) = &shared.config.store {
        if let Err(error) = store.set(&event.request_id, value).await {
            tracing::warn!(%error, request_id = %event.request_id, "failed to persist wide event");
        }
    }
}

fn keep(shared: &Shared, event: &WideEvent) -> bool {
    if let Some(custom) = &shared.config.sampler_override {
        match std::panic::catch_unwind(AssertUnwindSafe(|| custom(event))) {
            Ok(decision) => return decision,
            Err(_) => {
                tracing::warn!(
                    request_id = %event.request_id,
                    "sampler override panicked, falling back to the default policy"
                );
            }
        }
    }
    default_policy(event, &shared.config.sampling, &*shared.config.draw)
}
