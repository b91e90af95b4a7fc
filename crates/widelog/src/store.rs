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

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Optional persistence collaborator, keyed by request id.
///
/// The layer only ever calls [`EventStore::set`]; `get` and `delete` exist so
/// operators can build query/cleanup tooling against the same store. A `set`
/// failure is logged at warn by the layer and never surfaces to the request.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Reference [`EventStore`] backed by a process-local map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Number of events currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn set_get_delete_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store.set("req-1", json!({"path": "/"})).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get("req-1").await.unwrap(),
            Some(json!({"path": "/"}))
        );

        store.delete("req-1").await.unwrap();
        assert_eq!(store.get("req-1").await.unwrap(), None);
    }
}
