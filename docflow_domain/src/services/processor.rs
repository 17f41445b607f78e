// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Processor Contract
//!
//! The contract every document processor presents to the engine. The
//! pipeline treats processors opaquely: it resolves them by name through
//! the registry, hands them a [`ProcessorContext`], and records the
//! [`ProcessorResult`] they return. Extraction engines, format handlers,
//! and quality scorers all live behind this trait.
//!
//! ## Lifecycle
//!
//! 1. `initialize`: one-shot and idempotent; called on first resolution
//! 2. `validate`: pure input checking; the dry-run entry point
//! 3. `process`: the work
//! 4. `cleanup`: idempotent release, called at registry shutdown
//!
//! `health_check` may be called at any point between initialization and
//! cleanup.
//!
//! ## Implementing
//!
//! Implementations must be `Send + Sync`; the worker pool may invoke the
//! same instance concurrently up to the advertised `concurrency_limit`.
//! Idempotence of `initialize`/`cleanup` is the implementation's
//! responsibility (an `AtomicBool` guard is the usual shape).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::entities::stage::{StageResult, StageStatus};
use crate::error::PipelineError;
use crate::services::datetime_serde;

/// Capabilities a processor can advertise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorCapability {
    TextExtraction,
    MetadataExtraction,
    TableExtraction,
    ImageExtraction,
    Ocr,
    LanguageDetection,
    Validation,
    Transformation,
    Classification,
}

/// Static description of a processor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorMetadata {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub capabilities: Vec<ProcessorCapability>,
    /// File formats the processor accepts, by extension or MIME fragment
    #[serde(default)]
    pub supported_formats: Vec<String>,
    #[serde(default)]
    pub max_file_size_mb: Option<u64>,
    pub default_timeout_secs: u64,
    pub concurrency_limit: usize,
    #[serde(default)]
    pub is_cpu_intensive: bool,
    #[serde(default)]
    pub is_memory_intensive: bool,
    #[serde(default)]
    pub requires_gpu: bool,
}

impl ProcessorMetadata {
    /// Minimal metadata with engine defaults
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: String::new(),
            capabilities: Vec::new(),
            supported_formats: Vec::new(),
            max_file_size_mb: None,
            default_timeout_secs: 300,
            concurrency_limit: 10,
            is_cpu_intensive: false,
            is_memory_intensive: false,
            requires_gpu: false,
        }
    }
}

/// Context handed to a processor for one invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorContext {
    pub document_id: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    /// Data of completed upstream stages, keyed by stage name
    #[serde(default)]
    pub previous_results: HashMap<String, HashMap<String, Value>>,
    #[serde(default)]
    pub is_dry_run: bool,
    /// Deadline hint in seconds; enforcement happens in the caller
    #[serde(default)]
    pub timeout_secs: Option<f64>,
}

impl ProcessorContext {
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            file_path: String::new(),
            mime_type: String::new(),
            metadata: HashMap::new(),
            previous_results: HashMap::new(),
            is_dry_run: false,
            timeout_secs: None,
        }
    }

    /// Data produced by a named upstream stage
    pub fn previous_result(&self, stage_name: &str) -> Option<&HashMap<String, Value>> {
        self.previous_results.get(stage_name)
    }
}

/// Result of one processor invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorResult {
    pub processor_name: String,
    pub status: StageStatus,
    #[serde(with = "datetime_serde")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "datetime_serde")]
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub extracted_data: HashMap<String, Value>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub metrics: HashMap<String, f64>,
}

impl ProcessorResult {
    /// A completed result with the given extracted data
    pub fn completed(
        processor_name: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        extracted_data: HashMap<String, Value>,
    ) -> Self {
        Self {
            processor_name: processor_name.into(),
            status: StageStatus::Completed,
            start_time,
            end_time,
            extracted_data,
            metadata: HashMap::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            metrics: HashMap::new(),
        }
    }

    /// A failed result carrying the collected errors
    pub fn failed(
        processor_name: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        errors: Vec<String>,
    ) -> Self {
        Self {
            processor_name: processor_name.into(),
            status: StageStatus::Failed,
            start_time,
            end_time,
            extracted_data: HashMap::new(),
            metadata: HashMap::new(),
            errors,
            warnings: Vec::new(),
            metrics: HashMap::new(),
        }
    }

    /// Processing duration in seconds
    pub fn duration_secs(&self) -> f64 {
        (self.end_time - self.start_time).num_milliseconds() as f64 / 1000.0
    }

    /// Converts this result into the stage record stored in the run context
    pub fn into_stage_result(self, stage_name: impl Into<String>) -> StageResult {
        let error = if self.errors.is_empty() {
            None
        } else {
            Some(self.errors.join("; "))
        };
        StageResult {
            stage_name: stage_name.into(),
            status: self.status,
            start_time: self.start_time,
            end_time: Some(self.end_time),
            data: self.extracted_data,
            error,
            metrics: self.metrics,
        }
    }
}

/// Health report returned by `Processor::health_check`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorHealth {
    pub healthy: bool,
    #[serde(default)]
    pub metrics: HashMap<String, f64>,
}

impl ProcessorHealth {
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            metrics: HashMap::new(),
        }
    }

    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            metrics: HashMap::new(),
        }
    }
}

/// The opaque unit of work the pipeline invokes per stage
#[async_trait]
pub trait Processor: Send + Sync {
    /// Static description of this processor
    fn metadata(&self) -> ProcessorMetadata;

    /// One-shot initialization; calling again after success is a no-op
    async fn initialize(&self) -> Result<(), PipelineError>;

    /// Pure input validation; returns the list of problems found.
    ///
    /// Dry runs call this instead of `process`.
    async fn validate(&self, context: &ProcessorContext) -> Vec<String>;

    /// Processes a document
    async fn process(&self, context: &ProcessorContext) -> Result<ProcessorResult, PipelineError>;

    /// Idempotent resource release
    async fn cleanup(&self) -> Result<(), PipelineError>;

    /// Health probe
    async fn health_check(&self) -> ProcessorHealth {
        ProcessorHealth::healthy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_result_conversion_to_stage_result() {
        let start = Utc::now();
        let end = start + Duration::seconds(2);
        let mut data = HashMap::new();
        data.insert("text".to_string(), json!("hello"));

        let result = ProcessorResult::completed("extract", start, end, data);
        assert_eq!(result.duration_secs(), 2.0);

        let stage_result = result.into_stage_result("extract_stage");
        assert_eq!(stage_result.stage_name, "extract_stage");
        assert_eq!(stage_result.status, StageStatus::Completed);
        assert_eq!(stage_result.end_time, Some(end));
        assert!(stage_result.error.is_none());
    }

    #[test]
    fn test_failed_result_joins_errors() {
        let now = Utc::now();
        let result = ProcessorResult::failed("ocr", now, now, vec!["bad page".into(), "no text".into()]);
        let stage_result = result.into_stage_result("ocr");
        assert_eq!(stage_result.error.as_deref(), Some("bad page; no text"));
        assert_eq!(stage_result.status, StageStatus::Failed);
    }

    #[test]
    fn test_context_previous_result_lookup() {
        let mut ctx = ProcessorContext::new("doc-1");
        let mut upstream = HashMap::new();
        upstream.insert("pages".to_string(), json!(3));
        ctx.previous_results.insert("extract".to_string(), upstream);

        assert!(ctx.previous_result("extract").is_some());
        assert!(ctx.previous_result("missing").is_none());
    }

    #[test]
    fn test_metadata_defaults() {
        let meta = ProcessorMetadata::new("noop", "1.0.0");
        assert_eq!(meta.default_timeout_secs, 300);
        assert_eq!(meta.concurrency_limit, 10);
        assert!(!meta.requires_gpu);
    }
}
