// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Execution Records
//!
//! The per-stage state machine ([`StageStatus`]) and the record a stage
//! execution leaves behind ([`StageResult`]). Stage results are the unit
//! of checkpointing: the serde representation here is the on-store
//! checkpoint format, with timestamps written as ISO-8601 UTC strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::services::datetime_serde;

/// Status of a single stage within a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StageStatus {
    /// Whether the stage has reached a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Failed | StageStatus::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
        }
    }
}

/// Result of one stage execution (or the record of a skip)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage_name: String,
    pub status: StageStatus,
    #[serde(with = "datetime_serde")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "datetime_serde::optional")]
    pub end_time: Option<DateTime<Utc>>,
    /// Data the stage produced for downstream stages
    #[serde(default)]
    pub data: HashMap<String, Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub metrics: HashMap<String, f64>,
}

impl StageResult {
    /// A completed result carrying the stage's output data
    pub fn completed(
        stage_name: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        data: HashMap<String, Value>,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: StageStatus::Completed,
            start_time,
            end_time: Some(end_time),
            data,
            error: None,
            metrics: HashMap::new(),
        }
    }

    /// A failed result carrying the error description
    pub fn failed(
        stage_name: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: StageStatus::Failed,
            start_time,
            end_time: Some(end_time),
            data: HashMap::new(),
            error: Some(error.into()),
            metrics: HashMap::new(),
        }
    }

    /// A skipped result with zero duration
    pub fn skipped(stage_name: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: StageStatus::Skipped,
            start_time: at,
            end_time: Some(at),
            data: HashMap::new(),
            error: None,
            metrics: HashMap::new(),
        }
    }

    /// Execution duration in seconds, when the stage has ended
    pub fn duration_secs(&self) -> Option<f64> {
        self.end_time.map(|end| {
            (end - self.start_time).num_milliseconds() as f64 / 1000.0
        })
    }
}
