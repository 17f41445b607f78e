// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Run Context
//!
//! The per-run state of a pipeline execution. One [`PipelineContext`]
//! exists per run; the pipeline manager owns it exclusively and stages
//! touch it only through the defined mutation points: `stage_results`
//! (records written as stages finish) and `user_data` (values passed
//! between stages).
//!
//! ## Lifecycle
//!
//! [`PipelineStatus`] tracks the run-level state machine:
//!
//! ```text
//! Idle ── execute ──► Running ──► Completed
//!                       │  ▲         Failed
//!              pause ───┘  └─ resume  Cancelled
//! ```
//!
//! Terminal status resolution: `Cancelled` when cancellation was observed
//! during the run, `Failed` when any stage result is failed, `Completed`
//! otherwise.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::entities::stage::{StageResult, StageStatus};
use crate::services::datetime_serde;
use crate::value_objects::ids::RunId;

/// Run-level execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Idle,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl PipelineStatus {
    /// Whether the run has reached a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStatus::Completed | PipelineStatus::Failed | PipelineStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Idle => "idle",
            PipelineStatus::Running => "running",
            PipelineStatus::Paused => "paused",
            PipelineStatus::Completed => "completed",
            PipelineStatus::Failed => "failed",
            PipelineStatus::Cancelled => "cancelled",
        }
    }
}

/// Context for one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineContext {
    pub run_id: RunId,
    pub document_id: String,
    /// Caller-supplied metadata about the document
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    /// Mutable values stages pass to each other
    #[serde(default)]
    pub user_data: HashMap<String, Value>,
    /// Results of stages that have executed or been skipped
    #[serde(default)]
    pub stage_results: HashMap<String, StageResult>,
    #[serde(with = "datetime_serde")]
    pub created_at: DateTime<Utc>,
    pub checkpoint_enabled: bool,
    pub dry_run: bool,
}

impl PipelineContext {
    /// Creates a fresh run context
    pub fn new(
        document_id: impl Into<String>,
        metadata: HashMap<String, Value>,
        checkpoint_enabled: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id: RunId::new(),
            document_id: document_id.into(),
            metadata,
            user_data: HashMap::new(),
            stage_results: HashMap::new(),
            created_at,
            checkpoint_enabled,
            dry_run: false,
        }
    }

    /// Records a stage result, replacing any earlier record for that stage
    pub fn record_stage_result(&mut self, result: StageResult) {
        self.stage_results.insert(result.stage_name.clone(), result);
    }

    /// Whether the named stage already completed (checkpoint restore path)
    pub fn stage_completed(&self, stage_name: &str) -> bool {
        self.stage_results
            .get(stage_name)
            .map(|r| r.status == StageStatus::Completed)
            .unwrap_or(false)
    }

    /// Whether any recorded stage result is failed
    pub fn any_stage_failed(&self) -> bool {
        self.stage_results.values().any(|r| r.status == StageStatus::Failed)
    }

    /// Completed-or-skipped stage count, the numerator of progress
    pub fn settled_stage_count(&self) -> usize {
        self.stage_results
            .values()
            .filter(|r| matches!(r.status, StageStatus::Completed | StageStatus::Skipped))
            .count()
    }

    /// Data from completed predecessor stages, keyed by stage name
    pub fn completed_stage_data(&self) -> HashMap<String, HashMap<String, Value>> {
        self.stage_results
            .iter()
            .filter(|(_, r)| r.status == StageStatus::Completed)
            .map(|(name, r)| (name.clone(), r.data.clone()))
            .collect()
    }
}
