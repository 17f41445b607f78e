// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Value objects for the docflow domain: identifiers, validated
//! configuration structures, and resource descriptions.

pub mod ids;
pub mod pipeline_config;
pub mod resource;
pub mod worker_config;

pub use ids::{RunId, TaskId};
pub use pipeline_config::{PipelineConfig, StageConfig, StageType};
pub use resource::{ResourceLimits, ResourceRequirements, ResourceSnapshot, ResourceType};
pub use worker_config::WorkerConfig;
