// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Docflow Domain
//!
//! Domain layer for the docflow document processing engine: pure,
//! reusable business types with no runtime dependencies. The engine crate
//! (`docflow`) provides the executable machinery around these types.
//!
//! ## Contents
//!
//! - **Entities**: pipeline run contexts, stage execution records, worker
//!   and task bookkeeping
//! - **Value objects**: validated pipeline/stage/worker configuration,
//!   resource requirements and limits, ULID identifiers
//! - **Events**: the bus event envelope and the stable event type
//!   catalogue
//! - **Errors**: the `PipelineError` taxonomy shared by every subsystem
//! - **Services**: the processor contract and the injected ports (state
//!   store, clock, system metrics) that keep the engine testable
//!
//! ## Design Notes
//!
//! Configuration objects validate at construction and stay immutable
//! afterwards; an accepted `PipelineConfig` already satisfies every
//! numeric range and referential rule except cross-stage cycle detection,
//! which the engine's DAG builder performs. Timestamps serialize as
//! ISO-8601 UTC strings everywhere so checkpoints round-trip losslessly.

pub mod entities;
pub mod error;
pub mod events;
pub mod services;
pub mod value_objects;

// Re-export commonly used types for convenient access
pub use entities::{
    PipelineContext, PipelineStatus, StageResult, StageStatus, TaskPriority, WorkerState,
    WorkerStatus, WorkerTask, WorkerType,
};
pub use error::PipelineError;
pub use events::{types as event_types, Event, EventPriority};
pub use services::{
    Clock, NullMetricsProvider, Processor, ProcessorCapability, ProcessorContext, ProcessorHealth,
    ProcessorMetadata, ProcessorResult, StateStore, SystemClock, SystemMetricsProvider,
    SystemSample,
};
pub use value_objects::{
    PipelineConfig, ResourceLimits, ResourceRequirements, ResourceSnapshot, ResourceType, RunId,
    StageConfig, StageType, TaskId, WorkerConfig,
};
