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

use std::sync::Mutex;

/// Destination for retained events.
///
/// The layer calls [`EventSink::info`] with exactly one pre-serialized JSON
/// line per retained event; the sink decides where that line goes.
pub trait EventSink: Send + Sync {
    fn info(&self, line: &str);
}

/// Default sink: emits the line through `tracing` at info level, under the
/// `widelog::event` target so subscribers can route or filter it.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn info(&self, line: &str) {
        tracing::info!(target: "widelog::event", "{line}");
    }
}

/// In-memory sink that collects emitted lines, for tests and demos.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Lines emitted so far, in emission order.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl EventSink for MemorySink {
    fn info(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(line.to_string());
    }
}
