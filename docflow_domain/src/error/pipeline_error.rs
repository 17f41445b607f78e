// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! This module provides the hierarchical error system for the docflow
//! processing domain. Every fallible operation in the engine reports a
//! `PipelineError`, so callers can branch on the failure kind rather than
//! on message text.
//!
//! ## Error Categories
//!
//! ### Configuration Errors
//! - **InvalidConfiguration**: Malformed or out-of-range configuration
//! - **CyclicDependency**: The stage graph contains one or more cycles
//!
//! ### Execution Errors
//! - **DependencyNotMet**: A predecessor stage did not complete
//! - **StageTimeout**: A processor exceeded its computed deadline
//! - **ProcessorExecution**: A processor reported a failure
//! - **Cancelled**: Cooperative cancellation was observed
//!
//! ### Capacity Errors
//! - **ResourceExhausted**: Admission control rejected the work
//! - **QueueFull**: The worker pool queues did not accept a task in time
//!
//! ### Task Errors
//! - **TaskFailed / TaskTimeout / TaskNotFound**: Worker pool result
//!   retrieval failures
//!
//! ### Infrastructure Errors
//! - **CheckpointError**: State-store failure during save or restore
//! - **SerializationError / IoError / InternalError**: Plumbing failures
//!
//! ## Recovery
//!
//! `is_recoverable` marks the transient conditions (timeouts, capacity,
//! I/O) that a caller may retry; configuration and cancellation errors are
//! permanent for a given input.

use thiserror::Error;

/// Domain-specific errors for the document processing engine.
///
/// Each variant carries a descriptive message. Variants are grouped by the
/// failure taxonomy above so that handlers can match on kind.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Cyclic dependency: {0}")]
    CyclicDependency(String),

    #[error("Dependency not met: {0}")]
    DependencyNotMet(String),

    #[error("Stage timed out: {0}")]
    StageTimeout(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Processor execution failed: {0}")]
    ProcessorExecution(String),

    #[error("Processor not found: {0}")]
    ProcessorNotFound(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Checkpoint error: {0}")]
    CheckpointError(String),

    #[error("Queue full: {0}")]
    QueueFull(String),

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Task timed out: {0}")]
    TaskTimeout(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl PipelineError {
    /// Creates a new configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Creates a new dependency error
    pub fn dependency_not_met(msg: impl Into<String>) -> Self {
        Self::DependencyNotMet(msg.into())
    }

    /// Creates a new stage timeout error
    pub fn stage_timeout(msg: impl Into<String>) -> Self {
        Self::StageTimeout(msg.into())
    }

    /// Creates a new resource exhaustion error
    pub fn resource_exhausted(msg: impl Into<String>) -> Self {
        Self::ResourceExhausted(msg.into())
    }

    /// Creates a new processor execution error
    pub fn processor_execution(msg: impl Into<String>) -> Self {
        Self::ProcessorExecution(msg.into())
    }

    /// Creates a new cancellation error
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Creates a new checkpoint error
    pub fn checkpoint(msg: impl Into<String>) -> Self {
        Self::CheckpointError(msg.into())
    }

    /// Creates a new queue-full error
    pub fn queue_full(msg: impl Into<String>) -> Self {
        Self::QueueFull(msg.into())
    }

    /// Creates a new invalid-state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Creates a new internal error
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Checks if the error represents a transient condition worth retrying
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::StageTimeout(_)
                | PipelineError::TaskTimeout(_)
                | PipelineError::ResourceExhausted(_)
                | PipelineError::QueueFull(_)
                | PipelineError::IoError(_)
        )
    }

    /// Checks if the error was raised during pipeline configuration
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            PipelineError::InvalidConfiguration(_) | PipelineError::CyclicDependency(_)
        )
    }

    /// Gets the error category
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::InvalidConfiguration(_) => "configuration",
            PipelineError::CyclicDependency(_) => "configuration",
            PipelineError::DependencyNotMet(_) => "dependency",
            PipelineError::StageTimeout(_) => "timeout",
            PipelineError::ResourceExhausted(_) => "resource",
            PipelineError::ProcessorExecution(_) => "processor",
            PipelineError::ProcessorNotFound(_) => "processor",
            PipelineError::Cancelled(_) => "cancellation",
            PipelineError::CheckpointError(_) => "checkpoint",
            PipelineError::QueueFull(_) => "queue",
            PipelineError::TaskFailed(_) => "task",
            PipelineError::TaskTimeout(_) => "task",
            PipelineError::TaskNotFound(_) => "task",
            PipelineError::InvalidState(_) => "state",
            PipelineError::SerializationError(_) => "serialization",
            PipelineError::IoError(_) => "io",
            PipelineError::InternalError(_) => "internal",
        }
    }
}

// Conversions from standard library and serde errors
impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(PipelineError::invalid_config("bad").category(), "configuration");
        assert_eq!(PipelineError::CyclicDependency("a -> b -> a".into()).category(), "configuration");
        assert_eq!(PipelineError::stage_timeout("x").category(), "timeout");
        assert_eq!(PipelineError::queue_full("x").category(), "queue");
        assert_eq!(PipelineError::cancelled("x").category(), "cancellation");
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(PipelineError::stage_timeout("x").is_recoverable());
        assert!(PipelineError::resource_exhausted("x").is_recoverable());
        assert!(PipelineError::queue_full("x").is_recoverable());
        assert!(!PipelineError::invalid_config("x").is_recoverable());
        assert!(!PipelineError::cancelled("x").is_recoverable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: PipelineError = io_err.into();
        assert!(matches!(err, PipelineError::IoError(_)));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_configuration_error_classification() {
        assert!(PipelineError::invalid_config("x").is_configuration_error());
        assert!(!PipelineError::stage_timeout("x").is_configuration_error());
    }
}
