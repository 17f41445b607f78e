// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Identifier Value Objects
//!
//! ULID-backed identifiers for pipeline runs and worker tasks. ULIDs are
//! lexicographically sortable by creation time, which keeps run and task
//! listings in chronological order without a separate sort key.
//!
//! Both identifiers serialize as their canonical 26-character string form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

use crate::error::PipelineError;

/// Unique identifier for one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Ulid);

impl RunId {
    /// Generates a new run identifier
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parses a run identifier from its canonical string form
    pub fn parse(s: &str) -> Result<Self, PipelineError> {
        Ulid::from_str(s)
            .map(Self)
            .map_err(|e| PipelineError::invalid_config(format!("invalid run id '{}': {}", s, e)))
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for one worker pool task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Ulid);

impl TaskId {
    /// Generates a new task identifier
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parses a task identifier from its canonical string form
    pub fn parse(s: &str) -> Result<Self, PipelineError> {
        Ulid::from_str(s)
            .map(Self)
            .map_err(|e| PipelineError::invalid_config(format!("invalid task id '{}': {}", s, e)))
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_uniqueness() {
        let a = RunId::new();
        let b = RunId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_run_id_parse_round_trip() {
        let id = RunId::new();
        let parsed = RunId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_task_id_serde_is_transparent() {
        let id = TaskId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let back: TaskId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn test_invalid_id_rejected() {
        assert!(RunId::parse("not-a-ulid").is_err());
        assert!(TaskId::parse("").is_err());
    }
}
