// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Processor Registry
//!
//! Name-to-factory table with instance caching. The pipeline resolves
//! stage processors through [`ProcessorRegistry::get`], which caches
//! instances by `(name, stable hash of config)` and initializes each
//! instance exactly once, on first resolution. Two stages using the same
//! processor with the same configuration share one instance.
//!
//! Registration is a static table of factories; no dynamic discovery.
//! `shutdown` cleans up every cached instance.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use docflow_domain::{PipelineError, Processor, ProcessorMetadata};

/// Builds a processor instance from its stage configuration
pub type ProcessorFactory = Arc<dyn Fn(&HashMap<String, Value>) -> Arc<dyn Processor> + Send + Sync>;

/// Registry owning processor factories and cached instances
pub struct ProcessorRegistry {
    factories: RwLock<HashMap<String, ProcessorFactory>>,
    instances: tokio::sync::Mutex<HashMap<String, Arc<dyn Processor>>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
            instances: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Registers a factory under a name, replacing any previous one
    pub fn register(&self, name: impl Into<String>, factory: ProcessorFactory) {
        let name = name.into();
        if self.factories.write().insert(name.clone(), factory).is_some() {
            warn!(processor = %name, "overwriting existing processor registration");
        } else {
            info!(processor = %name, "registered processor");
        }
    }

    /// Whether a factory is registered under the name
    pub fn contains(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    /// Registered processor names, sorted
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolves an initialized processor instance.
    ///
    /// The cache key is the processor name plus a stable hash of the
    /// configuration, so the same `(name, config)` pair always yields the
    /// same instance. Initialization runs once per instance; an
    /// initialization failure is returned and nothing is cached.
    pub async fn get(
        &self,
        name: &str,
        config: &HashMap<String, Value>,
    ) -> Result<Arc<dyn Processor>, PipelineError> {
        let key = format!("{}:{:016x}", name, stable_config_hash(config));

        let mut instances = self.instances.lock().await;
        if let Some(existing) = instances.get(&key) {
            return Ok(Arc::clone(existing));
        }

        let factory = self
            .factories
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::ProcessorNotFound(name.to_string()))?;

        let instance = factory(config);
        instance.initialize().await?;
        debug!(processor = name, key = %key, "initialized processor instance");
        instances.insert(key, Arc::clone(&instance));
        Ok(instance)
    }

    /// Metadata of a cached or freshly built instance, without caching it
    pub fn metadata(&self, name: &str) -> Result<ProcessorMetadata, PipelineError> {
        let factory = self
            .factories
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::ProcessorNotFound(name.to_string()))?;
        Ok(factory(&HashMap::new()).metadata())
    }

    /// Cleans up every cached instance and clears the cache
    pub async fn shutdown(&self) {
        info!("shutting down processor registry");
        let mut instances = self.instances.lock().await;
        for (key, instance) in instances.drain() {
            if let Err(err) = instance.cleanup().await {
                error!(instance = %key, error = %err, "processor cleanup failed");
            }
        }
    }

    /// Number of live cached instances
    pub async fn instance_count(&self) -> usize {
        self.instances.lock().await.len()
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash of a configuration mapping, independent of key iteration order
fn stable_config_hash(config: &HashMap<String, Value>) -> u64 {
    let mut keys: Vec<&String> = config.keys().collect();
    keys.sort();
    let mut hasher = DefaultHasher::new();
    for key in keys {
        key.hash(&mut hasher);
        canonical_value_hash(&config[key], &mut hasher);
    }
    hasher.finish()
}

fn canonical_value_hash(value: &Value, hasher: &mut DefaultHasher) {
    match value {
        Value::Null => 0u8.hash(hasher),
        Value::Bool(b) => (1u8, b).hash(hasher),
        Value::Number(n) => (2u8, n.to_string()).hash(hasher),
        Value::String(s) => (3u8, s).hash(hasher),
        Value::Array(items) => {
            4u8.hash(hasher);
            items.len().hash(hasher);
            for item in items {
                canonical_value_hash(item, hasher);
            }
        }
        Value::Object(map) => {
            5u8.hash(hasher);
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            keys.len().hash(hasher);
            for key in keys {
                key.hash(hasher);
                canonical_value_hash(&map[key], hasher);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docflow_domain::{ProcessorContext, ProcessorResult};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProcessor {
        initializations: Arc<AtomicUsize>,
        cleanups: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Processor for CountingProcessor {
        fn metadata(&self) -> ProcessorMetadata {
            ProcessorMetadata::new("counting", "1.0.0")
        }

        async fn initialize(&self) -> Result<(), PipelineError> {
            self.initializations.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        async fn validate(&self, _context: &ProcessorContext) -> Vec<String> {
            Vec::new()
        }

        async fn process(&self, _context: &ProcessorContext) -> Result<ProcessorResult, PipelineError> {
            let now = chrono::Utc::now();
            Ok(ProcessorResult::completed("counting", now, now, HashMap::new()))
        }

        async fn cleanup(&self) -> Result<(), PipelineError> {
            self.cleanups.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    fn registry_with_counting(
        initializations: Arc<AtomicUsize>,
        cleanups: Arc<AtomicUsize>,
    ) -> ProcessorRegistry {
        let registry = ProcessorRegistry::new();
        registry.register(
            "counting",
            Arc::new(move |_config| {
                Arc::new(CountingProcessor {
                    initializations: Arc::clone(&initializations),
                    cleanups: Arc::clone(&cleanups),
                }) as Arc<dyn Processor>
            }),
        );
        registry
    }

    #[tokio::test]
    async fn test_same_config_shares_instance() {
        let inits = Arc::new(AtomicUsize::new(0));
        let registry = registry_with_counting(Arc::clone(&inits), Arc::new(AtomicUsize::new(0)));

        let mut config = HashMap::new();
        config.insert("lang".to_string(), json!("en"));

        let a = registry.get("counting", &config).await.unwrap();
        let b = registry.get("counting", &config).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(inits.load(Ordering::Relaxed), 1);
        assert_eq!(registry.instance_count().await, 1);
    }

    #[tokio::test]
    async fn test_different_config_gets_fresh_instance() {
        let inits = Arc::new(AtomicUsize::new(0));
        let registry = registry_with_counting(Arc::clone(&inits), Arc::new(AtomicUsize::new(0)));

        let mut config_a = HashMap::new();
        config_a.insert("lang".to_string(), json!("en"));
        let mut config_b = HashMap::new();
        config_b.insert("lang".to_string(), json!("de"));

        let a = registry.get("counting", &config_a).await.unwrap();
        let b = registry.get("counting", &config_b).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(inits.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_unknown_processor() {
        let registry = ProcessorRegistry::new();
        match registry.get("ghost", &HashMap::new()).await {
            Err(err) => assert!(matches!(err, PipelineError::ProcessorNotFound(_))),
            Ok(_) => panic!("expected ProcessorNotFound error"),
        }
    }

    #[tokio::test]
    async fn test_shutdown_cleans_all_instances() {
        let cleanups = Arc::new(AtomicUsize::new(0));
        let registry = registry_with_counting(Arc::new(AtomicUsize::new(0)), Arc::clone(&cleanups));

        registry.get("counting", &HashMap::new()).await.unwrap();
        let mut other = HashMap::new();
        other.insert("mode".to_string(), json!("fast"));
        registry.get("counting", &other).await.unwrap();

        registry.shutdown().await;
        assert_eq!(cleanups.load(Ordering::Relaxed), 2);
        assert_eq!(registry.instance_count().await, 0);
    }

    #[test]
    fn test_stable_hash_ignores_key_order() {
        let mut a = HashMap::new();
        a.insert("x".to_string(), json!(1));
        a.insert("y".to_string(), json!({"b": 2, "a": [1, 2, 3]}));
        let mut b = HashMap::new();
        b.insert("y".to_string(), json!({"a": [1, 2, 3], "b": 2}));
        b.insert("x".to_string(), json!(1));
        assert_eq!(stable_config_hash(&a), stable_config_hash(&b));

        let mut c = a.clone();
        c.insert("x".to_string(), json!(2));
        assert_ne!(stable_config_hash(&a), stable_config_hash(&c));
    }
}
