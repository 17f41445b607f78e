// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Configuration
//!
//! Immutable, validated configuration value objects describing a pipeline:
//! the pipeline itself ([`PipelineConfig`]) and its stages
//! ([`StageConfig`]). Invalid values are rejected at construction, so an
//! accepted configuration is structurally sound by the time the DAG
//! builder sees it:
//!
//! - every numeric field is inside its documented range
//! - stage names are unique within the pipeline
//! - every declared dependency names an existing stage
//! - no stage depends on itself
//!
//! Cycle detection spans multiple stages and lives in the engine's DAG
//! builder, which reports every simple cycle it finds.
//!
//! ## Construction
//!
//! Configurations are built with the fallible `new` constructors or
//! deserialized from YAML/JSON by the engine's loaders, which re-run
//! `validate` after parsing. Fields are public for read access; mutation
//! after construction is not part of the contract.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::error::PipelineError;
use crate::value_objects::resource::ResourceRequirements;

/// Kinds of pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageType {
    /// Invokes a registered processor
    Processor,
    /// Checks the context and records validation findings
    Validator,
    /// Invokes a registered processor that rewrites extracted data
    Transformer,
    /// Chooses a route label and records it for downstream conditionals
    Router,
    /// Merges the data of its completed dependencies
    Aggregator,
}

impl StageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageType::Processor => "processor",
            StageType::Validator => "validator",
            StageType::Transformer => "transformer",
            StageType::Router => "router",
            StageType::Aggregator => "aggregator",
        }
    }
}

/// Configuration for a single pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Stage name, unique within the pipeline, 1-64 characters
    pub name: String,
    pub stage_type: StageType,
    /// Name of the processor to resolve through the registry
    pub processor: String,
    /// Names of stages that must complete before this one starts
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Opaque processor configuration
    #[serde(default)]
    pub config: HashMap<String, Value>,
    /// Stage timeout in seconds, between 1 and 3600
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retry attempts for the stage processor, between 0 and 10
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// When set, a failure of this stage aborts the whole run
    #[serde(default = "default_critical")]
    pub critical: bool,
    /// Optional condition expression; a false evaluation skips the stage
    #[serde(default)]
    pub conditional: Option<String>,
    #[serde(default)]
    pub resources: ResourceRequirements,
    /// Upper bound on concurrent invocations of this stage, 1-100
    #[serde(default = "default_max_parallel")]
    pub max_parallel: u32,
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_retries() -> u32 {
    3
}

fn default_critical() -> bool {
    true
}

fn default_max_parallel() -> u32 {
    1
}

impl StageConfig {
    pub const MIN_TIMEOUT_SECS: u64 = 1;
    pub const MAX_TIMEOUT_SECS: u64 = 3600;
    pub const MAX_RETRIES: u32 = 10;
    pub const MAX_PARALLEL: u32 = 100;
    pub const MAX_NAME_LEN: usize = 64;

    /// Creates a validated stage configuration with defaults for the
    /// execution knobs
    pub fn new(
        name: impl Into<String>,
        stage_type: StageType,
        processor: impl Into<String>,
        dependencies: Vec<String>,
    ) -> Result<Self, PipelineError> {
        let stage = Self {
            name: name.into(),
            stage_type,
            processor: processor.into(),
            dependencies,
            config: HashMap::new(),
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
            critical: default_critical(),
            conditional: None,
            resources: ResourceRequirements::default(),
            max_parallel: default_max_parallel(),
        };
        stage.validate()?;
        Ok(stage)
    }

    /// Returns a copy with the given timeout, re-validated
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Result<Self, PipelineError> {
        self.timeout_secs = timeout_secs;
        self.validate()?;
        Ok(self)
    }

    /// Returns a copy with the given criticality
    pub fn with_critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    /// Returns a copy with the given resource requirements, re-validated
    pub fn with_resources(mut self, resources: ResourceRequirements) -> Result<Self, PipelineError> {
        self.resources = resources;
        self.validate()?;
        Ok(self)
    }

    /// Returns a copy with the given condition expression
    pub fn with_conditional(mut self, expression: impl Into<String>) -> Self {
        self.conditional = Some(expression.into());
        self
    }

    /// Stage timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Re-validates all fields of this stage
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.name.is_empty() || self.name.len() > Self::MAX_NAME_LEN {
            return Err(PipelineError::invalid_config(format!(
                "stage name '{}' must be 1-{} characters",
                self.name,
                Self::MAX_NAME_LEN
            )));
        }
        if self.processor.is_empty() {
            return Err(PipelineError::invalid_config(format!(
                "stage '{}' has an empty processor name",
                self.name
            )));
        }
        if !(Self::MIN_TIMEOUT_SECS..=Self::MAX_TIMEOUT_SECS).contains(&self.timeout_secs) {
            return Err(PipelineError::invalid_config(format!(
                "stage '{}' timeout {}s outside [{}, {}]",
                self.name,
                self.timeout_secs,
                Self::MIN_TIMEOUT_SECS,
                Self::MAX_TIMEOUT_SECS
            )));
        }
        if self.retries > Self::MAX_RETRIES {
            return Err(PipelineError::invalid_config(format!(
                "stage '{}' retries {} above maximum {}",
                self.name,
                self.retries,
                Self::MAX_RETRIES
            )));
        }
        if !(1..=Self::MAX_PARALLEL).contains(&self.max_parallel) {
            return Err(PipelineError::invalid_config(format!(
                "stage '{}' max_parallel {} outside [1, {}]",
                self.name,
                self.max_parallel,
                Self::MAX_PARALLEL
            )));
        }
        if self.dependencies.iter().any(|d| d == &self.name) {
            return Err(PipelineError::invalid_config(format!(
                "stage '{}' depends on itself",
                self.name
            )));
        }
        self.resources.validate()
    }
}

/// Configuration for a whole processing pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name, 1-128 characters
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    pub stages: Vec<StageConfig>,
    /// Concurrent stages within one layer, between 1 and 20
    #[serde(default = "default_max_parallel_stages")]
    pub max_parallel_stages: u32,
    #[serde(default = "default_checkpoint_enabled")]
    pub checkpoint_enabled: bool,
    /// Checkpoint time-to-live in seconds
    #[serde(default = "default_checkpoint_ttl_secs")]
    pub checkpoint_ttl_secs: u64,
    /// Multiplier applied to every stage timeout, between 0.1 and 10.0
    #[serde(default = "default_stage_timeout_multiplier")]
    pub stage_timeout_multiplier: f64,
    /// Whole-run timeout in seconds, at least 60
    #[serde(default = "default_global_timeout_secs")]
    pub global_timeout_secs: u64,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_max_parallel_stages() -> u32 {
    4
}

fn default_checkpoint_enabled() -> bool {
    true
}

fn default_checkpoint_ttl_secs() -> u64 {
    86_400
}

fn default_stage_timeout_multiplier() -> f64 {
    1.0
}

fn default_global_timeout_secs() -> u64 {
    3600
}

impl PipelineConfig {
    pub const MAX_NAME_LEN: usize = 128;
    pub const MAX_PARALLEL_STAGES: u32 = 20;
    pub const MIN_GLOBAL_TIMEOUT_SECS: u64 = 60;
    pub const MIN_TIMEOUT_MULTIPLIER: f64 = 0.1;
    pub const MAX_TIMEOUT_MULTIPLIER: f64 = 10.0;

    /// Creates a validated pipeline configuration with default settings
    pub fn new(name: impl Into<String>, stages: Vec<StageConfig>) -> Result<Self, PipelineError> {
        let config = Self {
            name: name.into(),
            version: default_version(),
            description: None,
            stages,
            max_parallel_stages: default_max_parallel_stages(),
            checkpoint_enabled: default_checkpoint_enabled(),
            checkpoint_ttl_secs: default_checkpoint_ttl_secs(),
            stage_timeout_multiplier: default_stage_timeout_multiplier(),
            global_timeout_secs: default_global_timeout_secs(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Returns a copy with the given layer parallelism, re-validated
    pub fn with_max_parallel_stages(mut self, max_parallel_stages: u32) -> Result<Self, PipelineError> {
        self.max_parallel_stages = max_parallel_stages;
        self.validate()?;
        Ok(self)
    }

    /// Returns a copy with checkpointing toggled
    pub fn with_checkpointing(mut self, enabled: bool) -> Self {
        self.checkpoint_enabled = enabled;
        self
    }

    /// Returns a copy with the given timeout multiplier, re-validated
    pub fn with_stage_timeout_multiplier(mut self, multiplier: f64) -> Result<Self, PipelineError> {
        self.stage_timeout_multiplier = multiplier;
        self.validate()?;
        Ok(self)
    }

    /// Looks up a stage configuration by name
    pub fn stage(&self, name: &str) -> Option<&StageConfig> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Effective deadline for one stage: `timeout * stage_timeout_multiplier`
    pub fn stage_deadline(&self, stage: &StageConfig) -> Duration {
        Duration::from_secs_f64(stage.timeout_secs as f64 * self.stage_timeout_multiplier)
    }

    /// Re-validates the pipeline and all of its stages.
    ///
    /// Checks ranges, stage name uniqueness, and that every dependency
    /// names a stage of this pipeline. Cross-stage cycle detection is the
    /// DAG builder's job.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.name.is_empty() || self.name.len() > Self::MAX_NAME_LEN {
            return Err(PipelineError::invalid_config(format!(
                "pipeline name '{}' must be 1-{} characters",
                self.name,
                Self::MAX_NAME_LEN
            )));
        }
        if self.stages.is_empty() {
            return Err(PipelineError::invalid_config(format!(
                "pipeline '{}' has no stages",
                self.name
            )));
        }
        if !(1..=Self::MAX_PARALLEL_STAGES).contains(&self.max_parallel_stages) {
            return Err(PipelineError::invalid_config(format!(
                "max_parallel_stages {} outside [1, {}]",
                self.max_parallel_stages,
                Self::MAX_PARALLEL_STAGES
            )));
        }
        if !(Self::MIN_TIMEOUT_MULTIPLIER..=Self::MAX_TIMEOUT_MULTIPLIER)
            .contains(&self.stage_timeout_multiplier)
        {
            return Err(PipelineError::invalid_config(format!(
                "stage_timeout_multiplier {} outside [{}, {}]",
                self.stage_timeout_multiplier,
                Self::MIN_TIMEOUT_MULTIPLIER,
                Self::MAX_TIMEOUT_MULTIPLIER
            )));
        }
        if self.global_timeout_secs < Self::MIN_GLOBAL_TIMEOUT_SECS {
            return Err(PipelineError::invalid_config(format!(
                "global_timeout_secs {} below minimum {}",
                self.global_timeout_secs,
                Self::MIN_GLOBAL_TIMEOUT_SECS
            )));
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            stage.validate()?;
            if !seen.insert(stage.name.as_str()) {
                return Err(PipelineError::invalid_config(format!(
                    "duplicate stage name '{}'",
                    stage.name
                )));
            }
        }

        let names: HashSet<&str> = self.stages.iter().map(|s| s.name.as_str()).collect();
        for stage in &self.stages {
            for dep in &stage.dependencies {
                if !names.contains(dep.as_str()) {
                    return Err(PipelineError::invalid_config(format!(
                        "stage '{}' has unknown dependency '{}'",
                        stage.name, dep
                    )));
                }
            }
        }

        Ok(())
    }
}
