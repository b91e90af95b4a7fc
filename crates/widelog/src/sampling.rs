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

//! Tail-sampling policy: decide the disposition of a finalized event.
//!
//! "Tail" because the decision runs after the full outcome (status, duration,
//! error) is known. Interesting requests are always kept; boring ones survive
//! with a small configurable probability.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smart_default::SmartDefault;

use crate::event::{Category, WideEvent};

/// The `user.tier` value granted unconditional retention when
/// [`SamplingConfig::retain_vip_tier`] is on.
pub const VIP_TIER: &str = "vip";

/// Knobs of the built-in policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, SmartDefault, bon::Builder)]
#[serde(default)]
pub struct SamplingConfig {
    /// Requests slower than this are always kept.
    #[default = 2000]
    #[builder(default = 2000)]
    pub slow_threshold_ms: u64,
    /// Keep probability for requests no other rule matched, in [0, 1].
    #[default = 0.05]
    #[builder(default = 0.05)]
    pub sample_rate: f64,
    /// Status codes at or above this are always kept.
    #[default = 500]
    #[builder(default = 500)]
    pub error_status_threshold: u16,
    /// Always keep events whose `user.tier` context equals [`VIP_TIER`].
    #[default = false]
    #[builder(default = false)]
    pub retain_vip_tier: bool,
}

/// The built-in decision over a finalized event. First match wins:
///
/// 1. `status_code >= error_status_threshold` — keep;
/// 2. an error substructure is present — keep, regardless of status;
/// 3. `user.tier == "vip"` — keep, only when `retain_vip_tier` is on;
/// 4. `duration_ms > slow_threshold_ms` — keep;
/// 5. otherwise keep iff `draw() < sample_rate`.
///
/// `draw` must produce uniform values in [0, 1); a rate of 0 never keeps the
/// probabilistic branch, a rate of 1 always does.
pub fn default_policy(event: &WideEvent, config: &SamplingConfig, draw: &dyn Fn() -> f64) -> bool {
    if event
        .status_code
        .is_some_and(|status| status >= config.error_status_threshold)
    {
        return true;
    }
    if event.error.is_some() {
        return true;
    }
    if config.retain_vip_tier && is_vip(event) {
        return true;
    }
    if event
        .duration_ms
        .is_some_and(|duration| duration > config.slow_threshold_ms)
    {
        return true;
    }
    draw() < config.sample_rate
}

fn is_vip(event: &WideEvent) -> bool {
    event
        .category(Category::User)
        .and_then(|user| user.get("tier"))
        .and_then(Value::as_str)
        == Some(VIP_TIER)
}

/// Lock-free xorshift64 generator backing the default probability draw.
///
/// A full PRNG crate would be overkill for one uniform draw per unsampled
/// request; an atomic xorshift is cheap, allocation-free, and seedable for
/// deterministic tests.
#[derive(Debug)]
pub struct Xorshift64 {
    state: AtomicU64,
}

impl Xorshift64 {
    /// Seeds from the wall clock. Falls back to a fixed seed when the clock
    /// reads before the epoch.
    #[must_use]
    pub fn new() -> Self {
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0xDEAD_BEEF);
        Self::with_seed(seed)
    }

    /// Explicit seed, for deterministic tests.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            // Xorshift state must be non-zero.
            state: AtomicU64::new(seed | 1),
        }
    }

    /// Next value, uniform over [0, 1).
    pub fn next_f64(&self) -> f64 {
        // 53 high-quality bits into the f64 mantissa.
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    // CAS loop; under contention threads retry but progress is always made.
    fn next_u64(&self) -> u64 {
        loop {
            let old = self.state.load(Ordering::Acquire);

            let mut x = old;
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;

            if self
                .state
                .compare_exchange_weak(old, x, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return x;
            }
        }
    }
}

impl Default for Xorshift64 {
    fn default() -> Self { Self::new() }
}
