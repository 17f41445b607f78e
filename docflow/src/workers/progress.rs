// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Progress Tracking
//!
//! In-memory progress state for tasks and for the documents they belong
//! to. The worker pool reports task starts and completions here; embedders
//! read per-task fractions or a per-document roll-up without touching pool
//! internals.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use docflow_domain::services::datetime_serde;
use docflow_domain::{Clock, SystemClock, TaskId};

/// Lifecycle phase of a tracked task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

/// Progress information for a single task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub task_id: TaskId,
    pub processor_name: String,
    pub document_id: String,
    pub status: ProgressStatus,
    /// Completion fraction, 0.0 to 1.0
    pub progress: f64,
    pub message: String,
    #[serde(with = "datetime_serde::optional")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(with = "datetime_serde::optional")]
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl TaskProgress {
    /// Elapsed seconds since the task started, up to completion
    pub fn duration_secs(&self, now: DateTime<Utc>) -> Option<f64> {
        self.started_at.map(|started| {
            let end = self.completed_at.unwrap_or(now);
            (end - started).num_milliseconds() as f64 / 1000.0
        })
    }

    /// Linear estimate of remaining seconds based on progress so far
    pub fn estimated_remaining_secs(&self, now: DateTime<Utc>) -> Option<f64> {
        let started = self.started_at?;
        if self.progress <= 0.0 {
            return None;
        }
        if self.progress >= 1.0 {
            return Some(0.0);
        }
        let elapsed = (now - started).num_milliseconds() as f64 / 1000.0;
        let total = elapsed / self.progress;
        Some((total - elapsed).max(0.0))
    }
}

/// Roll-up of task progress for one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineProgress {
    pub document_id: String,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    /// Sum of completed tasks plus in-flight fractions over the total
    pub overall_progress: f64,
    pub current_tasks: Vec<String>,
}

/// Tracks progress of tasks and documents flowing through the pool
pub struct ProgressTracker {
    clock: Arc<dyn Clock>,
    tasks: RwLock<HashMap<TaskId, TaskProgress>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a newly submitted task
    pub fn start_task(
        &self,
        task_id: TaskId,
        processor_name: impl Into<String>,
        document_id: impl Into<String>,
    ) {
        self.tasks.write().insert(
            task_id,
            TaskProgress {
                task_id,
                processor_name: processor_name.into(),
                document_id: document_id.into(),
                status: ProgressStatus::Queued,
                progress: 0.0,
                message: String::new(),
                started_at: None,
                completed_at: None,
                error: None,
            },
        );
    }

    /// Marks a task claimed by a worker
    pub fn mark_started(&self, task_id: TaskId) {
        let now = self.clock.now();
        if let Some(task) = self.tasks.write().get_mut(&task_id) {
            task.status = ProgressStatus::Processing;
            task.started_at = Some(now);
        }
    }

    /// Updates a task's completion fraction and message
    pub fn update_task(&self, task_id: TaskId, progress: f64, message: impl Into<String>) {
        if let Some(task) = self.tasks.write().get_mut(&task_id) {
            task.progress = progress.clamp(0.0, 1.0);
            task.message = message.into();
        }
    }

    /// Records the task's terminal state
    pub fn complete_task(&self, task_id: TaskId, success: bool, error: Option<String>) {
        let now = self.clock.now();
        if let Some(task) = self.tasks.write().get_mut(&task_id) {
            task.status = if success {
                ProgressStatus::Completed
            } else {
                ProgressStatus::Failed
            };
            task.progress = if success { 1.0 } else { task.progress };
            task.completed_at = Some(now);
            task.error = error;
        }
    }

    pub fn task_progress(&self, task_id: TaskId) -> Option<TaskProgress> {
        self.tasks.read().get(&task_id).cloned()
    }

    /// Progress roll-up across all tasks of one document
    pub fn pipeline_progress(&self, document_id: &str) -> PipelineProgress {
        let tasks = self.tasks.read();
        let doc_tasks: Vec<&TaskProgress> = tasks
            .values()
            .filter(|t| t.document_id == document_id)
            .collect();

        let total = doc_tasks.len();
        let completed = doc_tasks
            .iter()
            .filter(|t| t.status == ProgressStatus::Completed)
            .count();
        let failed = doc_tasks
            .iter()
            .filter(|t| t.status == ProgressStatus::Failed)
            .count();
        let in_flight: f64 = doc_tasks
            .iter()
            .filter(|t| t.status == ProgressStatus::Processing)
            .map(|t| t.progress)
            .sum();

        let mut current_tasks: Vec<String> = doc_tasks
            .iter()
            .filter(|t| t.status == ProgressStatus::Processing)
            .map(|t| t.processor_name.clone())
            .collect();
        current_tasks.sort();

        PipelineProgress {
            document_id: document_id.to_string(),
            total_tasks: total,
            completed_tasks: completed,
            failed_tasks: failed,
            overall_progress: if total == 0 {
                0.0
            } else {
                (completed as f64 + in_flight) / total as f64
            },
            current_tasks,
        }
    }

    /// Drops records of finished tasks, keeping in-flight ones
    pub fn prune_finished(&self) {
        self.tasks.write().retain(|_, t| {
            !matches!(t.status, ProgressStatus::Completed | ProgressStatus::Failed)
        });
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}
