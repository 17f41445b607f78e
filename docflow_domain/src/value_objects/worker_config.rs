// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Worker Pool Configuration
//!
//! Sizing and timing knobs for the worker pool: how many workers of each
//! family to run, how deep the two submission queues are, and the default
//! task timeout and heartbeat cadence. Validated at construction.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::PipelineError;

/// Configuration for the worker pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Cooperative workers sharing the runtime, at least 1
    pub async_workers: usize,
    /// Concurrency budget for blocking (synchronous) processors
    pub thread_workers: usize,
    /// Isolated process workers; the in-process engine treats these as
    /// additional blocking budget
    pub process_workers: usize,

    /// Capacity of the default submission queue, at least 10
    pub max_queue_size: usize,
    /// Capacity of the critical-priority queue, at least 10
    pub priority_queue_size: usize,

    /// Task timeout applied when the submitter does not set one
    pub default_timeout_secs: u64,
    /// Interval between worker health checks and heartbeat events
    pub worker_heartbeat_interval_secs: u64,

    /// Upper bound on tasks in flight across the pool
    pub max_concurrent_tasks: usize,
}

impl WorkerConfig {
    pub const MIN_QUEUE_SIZE: usize = 10;

    /// Creates a validated worker configuration
    pub fn new(async_workers: usize, thread_workers: usize) -> Result<Self, PipelineError> {
        let config = Self {
            async_workers,
            thread_workers,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Returns a copy with the given queue capacities, re-validated
    pub fn with_queue_sizes(
        mut self,
        max_queue_size: usize,
        priority_queue_size: usize,
    ) -> Result<Self, PipelineError> {
        self.max_queue_size = max_queue_size;
        self.priority_queue_size = priority_queue_size;
        self.validate()?;
        Ok(self)
    }

    /// Default task timeout as a `Duration`
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    /// Heartbeat interval as a `Duration`
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.worker_heartbeat_interval_secs)
    }

    /// Re-validates all fields
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.async_workers == 0 {
            return Err(PipelineError::invalid_config("async_workers must be at least 1"));
        }
        if self.max_queue_size < Self::MIN_QUEUE_SIZE {
            return Err(PipelineError::invalid_config(format!(
                "max_queue_size {} below minimum {}",
                self.max_queue_size,
                Self::MIN_QUEUE_SIZE
            )));
        }
        if self.priority_queue_size < Self::MIN_QUEUE_SIZE {
            return Err(PipelineError::invalid_config(format!(
                "priority_queue_size {} below minimum {}",
                self.priority_queue_size,
                Self::MIN_QUEUE_SIZE
            )));
        }
        if self.default_timeout_secs == 0 {
            return Err(PipelineError::invalid_config("default_timeout_secs must be positive"));
        }
        if self.worker_heartbeat_interval_secs == 0 {
            return Err(PipelineError::invalid_config(
                "worker_heartbeat_interval_secs must be positive",
            ));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(PipelineError::invalid_config("max_concurrent_tasks must be at least 1"));
        }
        Ok(())
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            async_workers: 4,
            thread_workers: 2,
            process_workers: 0,
            max_queue_size: 1000,
            priority_queue_size: 100,
            default_timeout_secs: 300,
            worker_heartbeat_interval_secs: 10,
            max_concurrent_tasks: 50,
        }
    }
}
