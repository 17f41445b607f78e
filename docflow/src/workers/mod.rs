// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Worker pool and progress tracking.

pub mod pool;
pub mod progress;

pub use pool::{PoolStats, TaskCallable, WorkerPool, WorkerPoolBuilder};
pub use progress::{PipelineProgress, ProgressStatus, ProgressTracker, TaskProgress};
