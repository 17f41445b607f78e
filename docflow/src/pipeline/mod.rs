// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Pipeline execution: DAG construction, the layered executor with
//! checkpointing and cancellation, per-kind stage behavior, and canned
//! pipeline templates.

pub mod dag;
pub mod manager;
pub mod stages;
pub mod templates;

pub use dag::{build_dag, DagEdge, DagNode, DagVisualization, StageDag};
pub use manager::{ExecuteOptions, PipelineManager, PipelineRunStatus, StageStatusReport};
pub use templates::{
    config_from_file, config_from_json, config_from_yaml, standard_document_pipeline,
    validation_only_pipeline,
};
