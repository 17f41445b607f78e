// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Templates & Config Loading
//!
//! Canned pipeline configurations for the common document flows, plus
//! YAML/JSON loaders. Loaded configurations are re-validated after
//! parsing, so a config file that deserializes but violates a range or
//! referential rule is rejected the same way a programmatic one is.

use std::path::Path;

use docflow_domain::{PipelineConfig, PipelineError, StageConfig, StageType};
use tracing::info;

/// Parses a pipeline configuration from a YAML string
pub fn config_from_yaml(yaml: &str) -> Result<PipelineConfig, PipelineError> {
    let config: PipelineConfig = serde_yaml::from_str(yaml)
        .map_err(|err| PipelineError::SerializationError(err.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Parses a pipeline configuration from a JSON string
pub fn config_from_json(json: &str) -> Result<PipelineConfig, PipelineError> {
    let config: PipelineConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
}

/// Loads a pipeline configuration from a `.yaml`/`.yml` or `.json` file
pub fn config_from_file(path: impl AsRef<Path>) -> Result<PipelineConfig, PipelineError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)?;
    let config = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => config_from_yaml(&raw)?,
        Some("json") => config_from_json(&raw)?,
        other => {
            return Err(PipelineError::invalid_config(format!(
                "unsupported config extension {:?} for {}",
                other,
                path.display()
            )));
        }
    };
    info!(path = %path.display(), pipeline = %config.name, "loaded pipeline configuration");
    Ok(config)
}

/// Standard document flow: extract, validate, transform, then aggregate
pub fn standard_document_pipeline() -> PipelineConfig {
    let stages = vec![
        StageConfig::new("extract", StageType::Processor, "document_extractor", vec![])
            .expect("template stage is valid"),
        StageConfig::new(
            "validate",
            StageType::Validator,
            "document_validator",
            vec!["extract".to_string()],
        )
        .expect("template stage is valid")
        .with_critical(false),
        StageConfig::new(
            "transform",
            StageType::Transformer,
            "document_transformer",
            vec!["validate".to_string()],
        )
        .expect("template stage is valid"),
        StageConfig::new(
            "aggregate",
            StageType::Aggregator,
            "result_aggregator",
            vec!["extract".to_string(), "transform".to_string()],
        )
        .expect("template stage is valid"),
    ];
    PipelineConfig::new("standard_document", stages).expect("template pipeline is valid")
}

/// Minimal flow running only validation
pub fn validation_only_pipeline() -> PipelineConfig {
    let stages = vec![StageConfig::new(
        "validate",
        StageType::Validator,
        "document_validator",
        vec![],
    )
    .expect("template stage is valid")];
    PipelineConfig::new("validation_only", stages)
        .expect("template pipeline is valid")
        .with_checkpointing(false)
}
