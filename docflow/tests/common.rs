// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Shared helpers for the end-to-end test suites.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use docflow::events::{event_handler, EventBus};
use docflow::processors::ProcessorRegistry;
use docflow_domain::{
    Event, PipelineError, Processor, ProcessorContext, ProcessorHealth, ProcessorMetadata,
    ProcessorResult, StageConfig, StageType,
};

/// Call counters for one registered test processor
#[derive(Clone, Default)]
pub struct Calls {
    pub process: Arc<AtomicUsize>,
    pub in_flight: Arc<AtomicUsize>,
    pub max_in_flight: Arc<AtomicUsize>,
}

impl Calls {
    pub fn process_count(&self) -> usize {
        self.process.load(Ordering::Relaxed)
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::Relaxed)
    }
}

/// Configurable processor for exercising the engine end to end
pub struct TestProcessor {
    pub name: String,
    pub delay: Option<Duration>,
    /// Fails the first N process calls, then succeeds
    pub fail_first: usize,
    pub calls: Calls,
}

#[async_trait]
impl Processor for TestProcessor {
    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata::new(&self.name, "1.0.0")
    }

    async fn initialize(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    async fn validate(&self, _context: &ProcessorContext) -> Vec<String> {
        Vec::new()
    }

    async fn process(&self, context: &ProcessorContext) -> Result<ProcessorResult, PipelineError> {
        let current = self.calls.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.calls.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let call = self.calls.process.fetch_add(1, Ordering::SeqCst);
        self.calls.in_flight.fetch_sub(1, Ordering::SeqCst);

        if call < self.fail_first {
            return Err(PipelineError::processor_execution(format!(
                "{} failed on call {}",
                self.name,
                call + 1
            )));
        }

        let now = chrono::Utc::now();
        let mut data = HashMap::new();
        data.insert("n".to_string(), json!(1));
        data.insert("document".to_string(), json!(context.document_id));
        Ok(ProcessorResult::completed(&self.name, now, now, data))
    }

    async fn cleanup(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    async fn health_check(&self) -> ProcessorHealth {
        ProcessorHealth::healthy()
    }
}

/// Registers a test processor and returns its call counters
pub fn register_processor(
    registry: &ProcessorRegistry,
    name: &str,
    delay: Option<Duration>,
    fail_first: usize,
) -> Calls {
    let calls = Calls::default();
    let calls_clone = calls.clone();
    let name_owned = name.to_string();
    registry.register(
        name,
        Arc::new(move |_config| {
            Arc::new(TestProcessor {
                name: name_owned.clone(),
                delay,
                fail_first,
                calls: calls_clone.clone(),
            }) as Arc<dyn Processor>
        }),
    );
    calls
}

/// Subscribes a collector for the given event types
pub fn collect_events(bus: &EventBus, event_types: &[&str]) -> Arc<Mutex<Vec<Event>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for event_type in event_types {
        let sink = Arc::clone(&seen);
        bus.subscribe_named(
            *event_type,
            format!("collector-{}", event_type),
            event_handler(move |event| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().push(event);
                    Ok(())
                }
            }),
        );
    }
    seen
}

/// Counts collected events of one type
pub fn count_events(seen: &Arc<Mutex<Vec<Event>>>, event_type: &str) -> usize {
    seen.lock()
        .iter()
        .filter(|e| e.event_type == event_type)
        .count()
}

/// Stage with a short timeout suitable for tests
pub fn quick_stage(name: &str, processor: &str, deps: &[&str]) -> StageConfig {
    StageConfig::new(
        name,
        StageType::Processor,
        processor,
        deps.iter().map(|d| d.to_string()).collect(),
    )
    .unwrap()
    .with_timeout_secs(5)
    .unwrap()
}

/// Lets queued bus deliveries drain before asserting
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

/// Installs a test-writer subscriber; repeat calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
