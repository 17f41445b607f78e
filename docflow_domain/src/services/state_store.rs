// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # State Store Port
//!
//! Key/value interface the engine uses for checkpoint persistence. The
//! engine never assumes a storage technology; embedders inject whatever
//! implementation suits them and the engine ships an in-memory default.
//!
//! Values are opaque JSON mappings. TTL is expressed in seconds and is
//! optional; an expired entry behaves as absent.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::PipelineError;

/// Injected key/value store for checkpoints
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fetches a value; `None` when absent or expired
    async fn get(&self, key: &str) -> Result<Option<Value>, PipelineError>;

    /// Stores a value, replacing any previous one, with an optional TTL
    async fn set(&self, key: &str, value: Value, ttl_secs: Option<u64>) -> Result<(), PipelineError>;

    /// Removes a value; removing an absent key is not an error
    async fn delete(&self, key: &str) -> Result<(), PipelineError>;

    /// Removes all values
    async fn clear(&self) -> Result<(), PipelineError>;

    /// Whether the store is reachable and usable
    async fn is_healthy(&self) -> bool;
}
