// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Event Bus Performance Metrics
//!
//! Per-event-type, per-handler, and aggregate counters maintained by the
//! event bus. Publishing records one event-type entry per publish (against
//! the original type, even when middleware drops the event); handler
//! invocations record one handler entry each. A background task captures a
//! queue-depth snapshot each minute and retains one hour of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

use docflow_domain::services::datetime_serde;

/// Counters for one event type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTypeMetrics {
    pub event_type: String,
    pub count: u64,
    pub total_processing_time_secs: f64,
    pub max_processing_time_secs: f64,
    pub error_count: u64,
    #[serde(with = "datetime_serde::optional")]
    pub last_occurrence: Option<DateTime<Utc>>,
}

impl EventTypeMetrics {
    fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            count: 0,
            total_processing_time_secs: 0.0,
            max_processing_time_secs: 0.0,
            error_count: 0,
            last_occurrence: None,
        }
    }

    pub fn average_processing_time_secs(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_processing_time_secs / self.count as f64
        }
    }
}

/// Counters for one subscribed handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerMetrics {
    pub handler_name: String,
    pub success_count: u64,
    pub error_count: u64,
    pub total_execution_time_secs: f64,
    pub max_execution_time_secs: f64,
}

impl HandlerMetrics {
    fn new(handler_name: impl Into<String>) -> Self {
        Self {
            handler_name: handler_name.into(),
            success_count: 0,
            error_count: 0,
            total_execution_time_secs: 0.0,
            max_execution_time_secs: 0.0,
        }
    }

    pub fn average_execution_time_secs(&self) -> f64 {
        let total = self.success_count + self.error_count;
        if total == 0 {
            0.0
        } else {
            self.total_execution_time_secs / total as f64
        }
    }
}

/// Aggregate counters across all event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalMetrics {
    pub total_events: u64,
    pub total_errors: u64,
    pub total_processing_time_secs: f64,
    pub events_per_second: f64,
    pub error_rate: f64,
    pub average_processing_time_secs: f64,
}

/// Periodic queue-depth snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    #[serde(with = "datetime_serde")]
    pub timestamp: DateTime<Utc>,
    pub events_processed: u64,
    pub total_processing_time_secs: f64,
    pub error_count: u64,
    pub queue_size: usize,
}

/// Assembled view returned by `EventBus::metrics`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusMetrics {
    pub events: HashMap<String, EventTypeMetrics>,
    pub handlers: HashMap<String, HandlerMetrics>,
    pub totals: TotalMetrics,
    pub queue_size: usize,
}

/// Mutable metrics state owned by the bus, updated under its lock
#[derive(Debug)]
pub struct PerformanceMonitor {
    event_metrics: HashMap<String, EventTypeMetrics>,
    handler_metrics: HashMap<String, HandlerMetrics>,
    snapshots: Vec<PerformanceSnapshot>,
    snapshot_capacity: usize,
    started_at: Instant,
}

impl PerformanceMonitor {
    /// Snapshot retention: one hour at the given collection interval
    pub fn new(snapshot_interval_secs: u64) -> Self {
        Self {
            event_metrics: HashMap::new(),
            handler_metrics: HashMap::new(),
            snapshots: Vec::new(),
            snapshot_capacity: (3600 / snapshot_interval_secs.max(1)) as usize,
            started_at: Instant::now(),
        }
    }

    /// Records one publish against the given event type
    pub fn record_event_processing(
        &mut self,
        event_type: &str,
        processing_time_secs: f64,
        success: bool,
        occurred_at: DateTime<Utc>,
    ) {
        let metrics = self
            .event_metrics
            .entry(event_type.to_string())
            .or_insert_with(|| EventTypeMetrics::new(event_type));
        metrics.count += 1;
        metrics.total_processing_time_secs += processing_time_secs;
        if processing_time_secs > metrics.max_processing_time_secs {
            metrics.max_processing_time_secs = processing_time_secs;
        }
        if !success {
            metrics.error_count += 1;
        }
        metrics.last_occurrence = Some(occurred_at);
    }

    /// Records one handler invocation
    pub fn record_handler_execution(
        &mut self,
        handler_name: &str,
        execution_time_secs: f64,
        success: bool,
    ) {
        let metrics = self
            .handler_metrics
            .entry(handler_name.to_string())
            .or_insert_with(|| HandlerMetrics::new(handler_name));
        if success {
            metrics.success_count += 1;
        } else {
            metrics.error_count += 1;
        }
        metrics.total_execution_time_secs += execution_time_secs;
        if execution_time_secs > metrics.max_execution_time_secs {
            metrics.max_execution_time_secs = execution_time_secs;
        }
    }

    /// Records a periodic queue-depth snapshot, trimming to one hour
    pub fn record_snapshot(&mut self, queue_size: usize, at: DateTime<Utc>) {
        let snapshot = PerformanceSnapshot {
            timestamp: at,
            events_processed: self.event_metrics.values().map(|m| m.count).sum(),
            total_processing_time_secs: self
                .event_metrics
                .values()
                .map(|m| m.total_processing_time_secs)
                .sum(),
            error_count: self.event_metrics.values().map(|m| m.error_count).sum(),
            queue_size,
        };
        self.snapshots.push(snapshot);
        if self.snapshots.len() > self.snapshot_capacity {
            let excess = self.snapshots.len() - self.snapshot_capacity;
            self.snapshots.drain(..excess);
        }
    }

    pub fn event_metrics(&self) -> HashMap<String, EventTypeMetrics> {
        self.event_metrics.clone()
    }

    pub fn handler_metrics(&self) -> HashMap<String, HandlerMetrics> {
        self.handler_metrics.clone()
    }

    pub fn snapshots(&self) -> &[PerformanceSnapshot] {
        &self.snapshots
    }

    pub fn total_metrics(&self) -> TotalMetrics {
        let total_events: u64 = self.event_metrics.values().map(|m| m.count).sum();
        let total_errors: u64 = self.event_metrics.values().map(|m| m.error_count).sum();
        let total_processing_time_secs: f64 = self
            .event_metrics
            .values()
            .map(|m| m.total_processing_time_secs)
            .sum();
        let elapsed = self.started_at.elapsed().as_secs_f64().max(f64::EPSILON);

        TotalMetrics {
            total_events,
            total_errors,
            total_processing_time_secs,
            events_per_second: total_events as f64 / elapsed,
            error_rate: if total_events == 0 {
                0.0
            } else {
                total_errors as f64 / total_events as f64
            },
            average_processing_time_secs: if total_events == 0 {
                0.0
            } else {
                total_processing_time_secs / total_events as f64
            },
        }
    }
}
