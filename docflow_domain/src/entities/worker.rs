// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Worker Pool Records
//!
//! Task and worker bookkeeping types for the worker pool: the
//! [`WorkerTask`] record that tracks a submission through its lifetime,
//! per-worker [`WorkerState`] counters, and the [`TaskPriority`] ladder
//! used for queue admission.
//!
//! Once submitted, a task is owned by the pool; the submitter keeps only
//! the task id and polls for the result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::datetime_serde;
use crate::services::processor::ProcessorResult;
use crate::value_objects::ids::TaskId;

/// Worker families supported by the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerType {
    /// Cooperative worker on the shared runtime, for I/O-bound processors
    Async,
    /// OS-thread-backed worker for blocking, CPU-light processors
    Thread,
    /// Isolated process worker for CPU-heavy or memory-risky processors
    Process,
}

/// Worker lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Busy,
    Stopping,
    Stopped,
    Error,
}

/// Task priority ladder; `Critical` routes through the dedicated queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Critical = 0,
    High = 1,
    Normal = 2,
    Low = 3,
    Background = 4,
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Normal
    }
}

/// Bookkeeping record for a task submitted to the worker pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerTask {
    pub task_id: TaskId,
    pub processor_name: String,
    pub priority: TaskPriority,
    /// Task deadline in seconds
    pub timeout_secs: f64,
    #[serde(with = "datetime_serde")]
    pub submitted_at: DateTime<Utc>,
    #[serde(with = "datetime_serde::optional")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(with = "datetime_serde::optional")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Worker that claimed the task
    pub worker_id: Option<String>,
    pub result: Option<ProcessorResult>,
    pub error: Option<String>,
}

impl WorkerTask {
    pub fn new(
        task_id: TaskId,
        processor_name: impl Into<String>,
        priority: TaskPriority,
        timeout_secs: f64,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            processor_name: processor_name.into(),
            priority,
            timeout_secs,
            submitted_at,
            started_at: None,
            completed_at: None,
            worker_id: None,
            result: None,
            error: None,
        }
    }

    /// Time the task waited in queue before a worker claimed it
    pub fn wait_time_secs(&self) -> Option<f64> {
        self.started_at
            .map(|started| (started - self.submitted_at).num_milliseconds() as f64 / 1000.0)
    }

    /// Time between claim and completion, when both are recorded
    pub fn processing_time_secs(&self) -> Option<f64> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => {
                Some((completed - started).num_milliseconds() as f64 / 1000.0)
            }
            _ => None,
        }
    }

    /// Whether the task finished, successfully or not
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Per-worker statistics; each worker owns its own record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerState {
    pub worker_id: String,
    pub worker_type: WorkerType,
    pub status: WorkerStatus,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    /// Cumulative processing time in seconds
    pub total_processing_time_secs: f64,
    pub current_task: Option<TaskId>,
    #[serde(with = "datetime_serde")]
    pub last_heartbeat: DateTime<Utc>,
}

impl WorkerState {
    pub fn new(worker_id: impl Into<String>, worker_type: WorkerType, now: DateTime<Utc>) -> Self {
        Self {
            worker_id: worker_id.into(),
            worker_type,
            status: WorkerStatus::Idle,
            tasks_completed: 0,
            tasks_failed: 0,
            total_processing_time_secs: 0.0,
            current_task: None,
            last_heartbeat: now,
        }
    }

    /// Average processing time across completed tasks
    pub fn average_processing_time_secs(&self) -> f64 {
        if self.tasks_completed == 0 {
            0.0
        } else {
            self.total_processing_time_secs / self.tasks_completed as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::Critical < TaskPriority::High);
        assert!(TaskPriority::High < TaskPriority::Normal);
        assert!(TaskPriority::Normal < TaskPriority::Background);
        assert_eq!(TaskPriority::default(), TaskPriority::Normal);
    }

    #[test]
    fn test_wait_and_processing_times() {
        let submitted = Utc::now();
        let mut task = WorkerTask::new(TaskId::new(), "ocr", TaskPriority::Normal, 30.0, submitted);
        assert_eq!(task.wait_time_secs(), None);
        assert_eq!(task.processing_time_secs(), None);

        task.started_at = Some(submitted + Duration::seconds(2));
        task.completed_at = Some(submitted + Duration::seconds(7));
        assert_eq!(task.wait_time_secs(), Some(2.0));
        assert_eq!(task.processing_time_secs(), Some(5.0));
        assert!(task.is_completed());
    }

    #[test]
    fn test_worker_state_average() {
        let mut state = WorkerState::new("async-0", WorkerType::Async, Utc::now());
        assert_eq!(state.average_processing_time_secs(), 0.0);
        state.tasks_completed = 4;
        state.total_processing_time_secs = 10.0;
        assert_eq!(state.average_processing_time_secs(), 2.5);
    }
}
