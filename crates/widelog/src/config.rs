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

use std::sync::Arc;

use bon::Builder;

use crate::{
    event::WideEvent,
    sampling::{SamplingConfig, Xorshift64},
    sink::{EventSink, TracingSink},
    store::EventStore,
};

/// Header used to read and echo the request id unless configured otherwise.
pub const DEFAULT_REQUEST_ID_HEADER: &str = "x-request-id";

/// Produces a request id when the inbound request carries none.
pub type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Uniform [0, 1) draw consumed by the probabilistic sampling branch.
pub type DrawFn = Arc<dyn Fn() -> f64 + Send + Sync>;

/// Full replacement for the built-in sampling policy. Receives only the
/// finalized event; any configuration it needs must be captured in the
/// closure.
pub type SamplerOverride = Arc<dyn Fn(&WideEvent) -> bool + Send + Sync>;

/// Configuration for [`WideEventLayer`](crate::WideEventLayer).
///
/// Everything has a default: `WideEventConfig::default()` emits through
/// `tracing`, samples at the built-in policy's defaults, persists nothing, and
/// generates UUID v4 request ids.
#[derive(Clone, Builder)]
pub struct WideEventConfig {
    /// Request id header name, read from the request and echoed on the
    /// response.
    #[builder(default = DEFAULT_REQUEST_ID_HEADER.to_string(), into)]
    pub header_name: String,

    /// Knobs of the built-in sampling policy.
    #[builder(default)]
    pub sampling: SamplingConfig,

    /// Capture a backtrace into `error.stack` when recording errors. Meant
    /// for non-production setups; off by default.
    #[builder(default = false)]
    pub capture_backtraces: bool,

    /// Where retained events are emitted.
    #[builder(default = default_sink())]
    pub sink: Arc<dyn EventSink>,

    /// Optional persistence for retained events, keyed by request id.
    pub store: Option<Arc<dyn EventStore>>,

    /// Replaces the built-in sampling policy entirely when set.
    pub sampler_override: Option<SamplerOverride>,

    /// Request id generator used when the header is absent.
    #[builder(default = default_id_generator())]
    pub id_generator: IdGenerator,

    /// Random source for the probabilistic sampling branch. Substitute a
    /// deterministic closure in tests.
    #[builder(default = default_draw())]
    pub draw: DrawFn,
}

impl Default for WideEventConfig {
    fn default() -> Self { Self::builder().build() }
}

fn default_sink() -> Arc<dyn EventSink> { Arc::new(TracingSink) }

fn default_id_generator() -> IdGenerator {
    Arc::new(|| uuid::Uuid::new_v4().to_string())
}

fn default_draw() -> DrawFn {
    let rng = Xorshift64::new();
    Arc::new(move || rng.next_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let config = WideEventConfig::default();
        assert_eq!(config.header_name, DEFAULT_REQUEST_ID_HEADER);
        assert_eq!(config.sampling, SamplingConfig::default());
        assert!(!config.capture_backtraces);
        assert!(config.store.is_none());
        assert!(config.sampler_override.is_none());
    }

    #[test]
    fn default_generator_yields_unique_non_empty_ids() {
        let config = WideEventConfig::default();
        let a = (config.id_generator)();
        let b = (config.id_generator)();
        assert!(!a.is_empty());
        assert_ne!(a, b);
    }

    #[test]
    fn default_draw_stays_in_unit_interval() {
        let config = WideEventConfig::default();
        for _ in 0..1000 {
            let v = (config.draw)();
            assert!((0.0..1.0).contains(&v));
        }
    }
}
