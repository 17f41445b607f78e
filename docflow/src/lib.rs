// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Docflow
//!
//! A document processing pipeline engine: a reusable runtime that
//! executes a declared DAG of processing stages against a stream of
//! documents, with concurrency control, resource accounting,
//! checkpoint/resume, and fine-grained progress and failure reporting.
//!
//! ## Subsystems
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    ProcessingSystem (facade)                 │
//! └──────────────────────────────────────────────────────────────┘
//!          │               │                │             │
//! ┌────────────────┐ ┌───────────┐ ┌────────────────┐ ┌─────────┐
//! │ PipelineManager│ │ WorkerPool│ │ ResourceMonitor│ │ EventBus│
//! │  (DAG executor)│ │           │ │                │ │         │
//! └────────────────┘ └───────────┘ └────────────────┘ └─────────┘
//!          │               │
//! ┌────────────────┐ ┌───────────────┐
//! │ProcessorRegistry│ │ProgressTracker│
//! └────────────────┘ └───────────────┘
//! ```
//!
//! - **Pipeline manager** (`pipeline`): validates the stage graph,
//!   computes the parallel execution layers, and drives stage execution
//!   with checkpointing, pause/resume, and cooperative cancellation.
//! - **Worker pool** (`workers`): multi-queue task dispatcher with
//!   priority admission, per-task timeouts, and graceful drain.
//! - **Resource monitor** (`resources`): samples process CPU/memory/IO
//!   and admission-controls tasks against limits plus prior reservations.
//! - **Event bus** (`events`): in-process publish/subscribe with a
//!   middleware chain, priority-ordered delivery, and per-event metrics.
//! - **Processor registry & resilience** (`processors`): name-to-factory
//!   resolution with instance caching; retry/circuit-breaker/fallback
//!   wrappers.
//!
//! Document parsing, OCR, and format handling are not part of the
//! engine; they live behind the `Processor` contract defined in
//! `docflow-domain` and are injected by the embedder.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use docflow::system::{ProcessingSystem, ProcessingSystemConfig};
//!
//! let system = ProcessingSystem::new(ProcessingSystemConfig {
//!     pipeline_config: docflow::pipeline::standard_document_pipeline(),
//!     worker_config: Default::default(),
//!     resource_limits: Default::default(),
//! })?;
//! system.registry().register("document_extractor", my_factory);
//! system.initialize().await?;
//! let context = system.process_document("doc-1", Default::default()).await?;
//! ```

pub mod events;
pub mod pipeline;
pub mod processors;
pub mod resources;
pub mod state;
pub mod system;
pub mod workers;

// Re-export commonly used types for convenient access
pub use docflow_domain as domain;
pub use events::{EventBus, EventMiddleware};
pub use pipeline::{ExecuteOptions, PipelineManager, PipelineRunStatus};
pub use processors::{ProcessorRegistry, ResilientProcessor};
pub use resources::ResourceMonitor;
pub use state::InMemoryStateStore;
pub use system::{ProcessingSystem, ProcessingSystemConfig};
pub use workers::{ProgressTracker, TaskCallable, WorkerPool};
