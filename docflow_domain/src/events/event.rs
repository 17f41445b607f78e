// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bus Events
//!
//! The [`Event`] envelope carried by the event bus and the stable
//! catalogue of event type identifiers the engine emits. Event types are
//! plain strings on the wire; the [`types`] constants are the published
//! contract and must not change between releases.
//!
//! ## Emission points
//!
//! | Source          | Types                                                 |
//! |-----------------|-------------------------------------------------------|
//! | Pipeline manager| `pipeline.started`, `pipeline.completed`, `pipeline.failed`, `stage.*` |
//! | Worker pool     | `task.*`, `worker_pool.*`                             |
//! | System facade   | `system.started`                                      |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::services::datetime_serde;

/// Stable event type identifiers emitted by the engine
pub mod types {
    pub const PIPELINE_STARTED: &str = "pipeline.started";
    pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
    pub const PIPELINE_FAILED: &str = "pipeline.failed";

    pub const STAGE_STARTED: &str = "stage.started";
    pub const STAGE_COMPLETED: &str = "stage.completed";
    pub const STAGE_FAILED: &str = "stage.failed";
    pub const STAGE_SKIPPED: &str = "stage.skipped";

    pub const TASK_SUBMITTED: &str = "task.submitted";
    pub const TASK_COMPLETED: &str = "task.completed";
    pub const TASK_FAILED: &str = "task.failed";

    pub const WORKER_POOL_STARTED: &str = "worker_pool.started";
    pub const WORKER_POOL_STOPPED: &str = "worker_pool.stopped";
    pub const WORKER_POOL_HEARTBEAT: &str = "worker_pool.heartbeat";

    pub const SYSTEM_STARTED: &str = "system.started";
}

/// Delivery priority of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPriority {
    Immediate,
    Normal,
    Deferred,
}

impl Default for EventPriority {
    fn default() -> Self {
        EventPriority::Normal
    }
}

/// An event published on the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    pub payload: HashMap<String, Value>,
    #[serde(with = "datetime_serde")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub priority: EventPriority,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    #[serde(default)]
    pub trace_ids: Vec<String>,
}

impl Event {
    /// Creates an event stamped with the current wall clock
    pub fn new(event_type: impl Into<String>, payload: HashMap<String, Value>) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            timestamp: Utc::now(),
            priority: EventPriority::Normal,
            source: None,
            id: Some(Uuid::new_v4()),
            correlation_id: None,
            metadata: HashMap::new(),
            trace_ids: Vec::new(),
        }
    }

    /// Convenience constructor from `(key, value)` payload pairs
    pub fn with_payload<I>(event_type: impl Into<String>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, Value)>,
    {
        let payload = pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Self::new(event_type, payload)
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Payload field accessor
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_construction() {
        let event = Event::with_payload(types::STAGE_STARTED, [
            ("pipeline_id", json!("run-1")),
            ("stage", json!("extract")),
        ]);
        assert_eq!(event.event_type, "stage.started");
        assert_eq!(event.payload_str("stage"), Some("extract"));
        assert_eq!(event.priority, EventPriority::Normal);
        assert!(event.id.is_some());
    }

    #[test]
    fn test_builder_fields() {
        let event = Event::new(types::SYSTEM_STARTED, HashMap::new())
            .with_source("system")
            .with_priority(EventPriority::Immediate)
            .with_correlation_id("corr-7");
        assert_eq!(event.source.as_deref(), Some("system"));
        assert_eq!(event.priority, EventPriority::Immediate);
        assert_eq!(event.correlation_id.as_deref(), Some("corr-7"));
    }

    #[test]
    fn test_serde_round_trip() {
        let event = Event::with_payload(types::TASK_COMPLETED, [("task_id", json!("t-1"))]);
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type, event.event_type);
        assert_eq!(back.timestamp, event.timestamp);
        assert_eq!(back.payload, event.payload);
    }
}
