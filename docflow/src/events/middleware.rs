// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Event Middleware
//!
//! The ordered chain every publish passes through before queueing. Each
//! middleware may return the event (possibly transformed), return `None`
//! to drop it, or fail; a failure is logged by the bus and counted as a
//! drop. The built-ins cover validation, logging, metrics counting, and
//! type filtering.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, info, trace, warn};

use docflow_domain::{Event, PipelineError};

/// One element of the publish-side middleware chain
#[async_trait]
pub trait EventMiddleware: Send + Sync {
    /// Name used in bus logs when this middleware fails
    fn name(&self) -> &'static str;

    /// Inspects or transforms an event; `Ok(None)` drops it
    async fn process(&self, event: Event) -> Result<Option<Event>, PipelineError>;
}

/// Drops events with an empty type
#[derive(Debug, Default)]
pub struct ValidationMiddleware;

#[async_trait]
impl EventMiddleware for ValidationMiddleware {
    fn name(&self) -> &'static str {
        "validation"
    }

    async fn process(&self, event: Event) -> Result<Option<Event>, PipelineError> {
        if event.event_type.is_empty() {
            error!("dropping event with empty event type");
            return Ok(None);
        }
        Ok(Some(event))
    }
}

/// Logs every event passing the chain at a configurable level
#[derive(Debug)]
pub struct LoggingMiddleware {
    level: tracing::Level,
}

impl LoggingMiddleware {
    pub fn new(level: tracing::Level) -> Self {
        Self { level }
    }
}

impl Default for LoggingMiddleware {
    fn default() -> Self {
        Self::new(tracing::Level::DEBUG)
    }
}

#[async_trait]
impl EventMiddleware for LoggingMiddleware {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn process(&self, event: Event) -> Result<Option<Event>, PipelineError> {
        match self.level {
            tracing::Level::ERROR => error!(event_type = %event.event_type, "processing event"),
            tracing::Level::WARN => warn!(event_type = %event.event_type, "processing event"),
            tracing::Level::INFO => info!(event_type = %event.event_type, "processing event"),
            tracing::Level::DEBUG => debug!(event_type = %event.event_type, "processing event"),
            tracing::Level::TRACE => trace!(event_type = %event.event_type, "processing event"),
        }
        Ok(Some(event))
    }
}

/// Counts events per type and failures per error type
#[derive(Debug, Default)]
pub struct MetricsMiddleware {
    event_counts: Mutex<HashMap<String, u64>>,
    error_counts: Mutex<HashMap<String, u64>>,
}

/// Snapshot of the counters kept by [`MetricsMiddleware`]
#[derive(Debug, Clone, PartialEq)]
pub struct MiddlewareMetrics {
    pub event_counts: HashMap<String, u64>,
    pub error_counts: HashMap<String, u64>,
    pub total_events: u64,
    pub total_errors: u64,
}

impl MetricsMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> MiddlewareMetrics {
        let event_counts = self.event_counts.lock().clone();
        let error_counts = self.error_counts.lock().clone();
        MiddlewareMetrics {
            total_events: event_counts.values().sum(),
            total_errors: error_counts.values().sum(),
            event_counts,
            error_counts,
        }
    }
}

#[async_trait]
impl EventMiddleware for MetricsMiddleware {
    fn name(&self) -> &'static str {
        "metrics"
    }

    async fn process(&self, event: Event) -> Result<Option<Event>, PipelineError> {
        *self
            .event_counts
            .lock()
            .entry(event.event_type.clone())
            .or_insert(0) += 1;

        if event.event_type.ends_with(".failed") {
            let error_type = event
                .payload_str("error_type")
                .unwrap_or("unknown")
                .to_string();
            *self.error_counts.lock().entry(error_type).or_insert(0) += 1;
        }
        Ok(Some(event))
    }
}

/// Passes only allow-listed event types; an empty filter passes everything
#[derive(Debug, Default)]
pub struct FilterMiddleware {
    allowed: Option<HashSet<String>>,
}

impl FilterMiddleware {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: Some(allowed.into_iter().map(Into::into).collect()),
        }
    }

    /// A filter that passes every event
    pub fn allow_all() -> Self {
        Self { allowed: None }
    }
}

#[async_trait]
impl EventMiddleware for FilterMiddleware {
    fn name(&self) -> &'static str {
        "filter"
    }

    async fn process(&self, event: Event) -> Result<Option<Event>, PipelineError> {
        match &self.allowed {
            Some(allowed) if !allowed.contains(&event.event_type) => Ok(None),
            _ => Ok(Some(event)),
        }
    }
}
