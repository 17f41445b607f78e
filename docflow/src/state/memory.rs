// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # In-Memory State Store
//!
//! TTL-aware map implementing the domain's [`StateStore`] port. This is
//! the engine's default checkpoint store; embedders that need durability
//! across process restarts inject their own implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use docflow_domain::{Clock, PipelineError, StateStore, SystemClock};

struct Entry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

/// Process-local key/value store with per-entry TTL
pub struct InMemoryStateStore {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live entries, counting expired ones not yet collected
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, PipelineError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) => {
                if let Some(expires_at) = entry.expires_at {
                    if self.clock.now() > expires_at {
                        entries.remove(key);
                        return Ok(None);
                    }
                }
                Ok(Some(entries[key].value.clone()))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value, ttl_secs: Option<u64>) -> Result<(), PipelineError> {
        let expires_at = ttl_secs.map(|ttl| self.clock.now() + chrono::Duration::seconds(ttl as i64));
        self.entries
            .lock()
            .await
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), PipelineError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), PipelineError> {
        self.entries.lock().await.clear();
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as SyncMutex;
    use serde_json::json;

    struct ManualClock {
        now: SyncMutex<DateTime<Utc>>,
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock()
        }
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = InMemoryStateStore::new();
        store.set("k", json!({"a": 1}), None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!({"a": 1})));

        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        // Deleting again is fine
        store.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let clock = Arc::new(ManualClock {
            now: SyncMutex::new(Utc::now()),
        });
        let store = InMemoryStateStore::with_clock(clock.clone());
        store.set("k", json!(1), Some(60)).await.unwrap();
        assert!(store.get("k").await.unwrap().is_some());

        *clock.now.lock() += chrono::Duration::seconds(61);
        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_clear_and_health() {
        let store = InMemoryStateStore::new();
        store.set("a", json!(1), None).await.unwrap();
        store.set("b", json!(2), None).await.unwrap();
        assert_eq!(store.len().await, 2);

        store.clear().await.unwrap();
        assert!(store.is_empty().await);
        assert!(store.is_healthy().await);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value_and_ttl() {
        let store = InMemoryStateStore::new();
        store.set("k", json!(1), Some(1)).await.unwrap();
        store.set("k", json!(2), None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!(2)));
    }
}
