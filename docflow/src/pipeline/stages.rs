// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Execution
//!
//! Per-kind stage behavior and conditional evaluation. Processor and
//! transformer stages invoke their registered processor; validator stages
//! run the processor's validation entry point; router stages pick a route
//! label from their configuration; aggregator stages merge the data of
//! their completed dependencies. Every kind produces a
//! [`ProcessorResult`], so the executor and the worker pool treat stages
//! uniformly.
//!
//! ## Conditional expressions
//!
//! A stage's `conditional` is a small path expression evaluated against
//! the run context:
//!
//! ```text
//! expr     := ["!"] path [("==" | "!=") literal]
//! path     := ("user_data" | "metadata" | "stages") "." segment ("." segment)*
//! literal  := quoted string | number | true | false
//! ```
//!
//! `stages.<name>.<key>` reads the data of an already-executed stage.
//! A bare path is truthy when the value exists and is not `false`,
//! `null`, `0`, or an empty string. Evaluation failures skip the stage
//! and are logged, never fatal.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use docflow_domain::{
    Clock, PipelineContext, PipelineError, ProcessorContext, ProcessorResult, StageConfig,
    StageType,
};

use crate::processors::ProcessorRegistry;

/// Builds the processor-facing context snapshot for one stage invocation
pub fn build_processor_context(
    stage: &StageConfig,
    context: &PipelineContext,
    deadline_secs: f64,
    dry_run: bool,
) -> ProcessorContext {
    let file_path = context
        .metadata
        .get("file_path")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let mime_type = context
        .metadata
        .get("mime_type")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let mut metadata = context.metadata.clone();
    metadata.insert("stage_name".to_string(), json!(stage.name));
    for (key, value) in &stage.config {
        metadata
            .entry(format!("config_{}", key))
            .or_insert_with(|| value.clone());
    }

    ProcessorContext {
        document_id: context.document_id.clone(),
        file_path,
        mime_type,
        metadata,
        previous_results: context.completed_stage_data(),
        is_dry_run: dry_run,
        timeout_secs: Some(deadline_secs),
    }
}

/// Executes one stage according to its kind
pub async fn execute_stage(
    stage: StageConfig,
    registry: Arc<ProcessorRegistry>,
    context: ProcessorContext,
    clock: Arc<dyn Clock>,
) -> Result<ProcessorResult, PipelineError> {
    match stage.stage_type {
        StageType::Processor | StageType::Transformer => {
            let processor = registry.get(&stage.processor, &stage.config).await?;
            processor.process(&context).await
        }
        StageType::Validator => run_validator(&stage, &registry, &context, &clock).await,
        StageType::Router => run_router(&stage, &context, &clock),
        StageType::Aggregator => run_aggregator(&stage, &context, &clock),
    }
}

/// Dry-run entry point: validates without side effects
pub async fn validate_stage(
    stage: StageConfig,
    registry: Arc<ProcessorRegistry>,
    context: ProcessorContext,
    clock: Arc<dyn Clock>,
) -> Result<ProcessorResult, PipelineError> {
    let start = clock.now();
    let errors = match stage.stage_type {
        StageType::Processor | StageType::Transformer | StageType::Validator => {
            let processor = registry.get(&stage.processor, &stage.config).await?;
            processor.validate(&context).await
        }
        // Routers and aggregators have no external inputs to validate
        StageType::Router | StageType::Aggregator => Vec::new(),
    };
    let end = clock.now();

    if errors.is_empty() {
        let mut data = HashMap::new();
        data.insert("dry_run".to_string(), json!(true));
        Ok(ProcessorResult::completed(&stage.processor, start, end, data))
    } else {
        Ok(ProcessorResult::failed(&stage.processor, start, end, errors))
    }
}

async fn run_validator(
    stage: &StageConfig,
    registry: &Arc<ProcessorRegistry>,
    context: &ProcessorContext,
    clock: &Arc<dyn Clock>,
) -> Result<ProcessorResult, PipelineError> {
    let start = clock.now();
    let processor = registry.get(&stage.processor, &stage.config).await?;
    let errors = processor.validate(context).await;
    let end = clock.now();

    let mut data = HashMap::new();
    data.insert("validation_passed".to_string(), json!(errors.is_empty()));
    data.insert("errors".to_string(), json!(errors.clone()));

    if errors.is_empty() {
        Ok(ProcessorResult::completed(&stage.processor, start, end, data))
    } else {
        let mut result = ProcessorResult::failed(&stage.processor, start, end, errors);
        result.extracted_data = data;
        Ok(result)
    }
}

fn run_router(
    stage: &StageConfig,
    context: &ProcessorContext,
    clock: &Arc<dyn Clock>,
) -> Result<ProcessorResult, PipelineError> {
    let start = clock.now();

    // routes: [{"condition": "<expr>", "route": "<label>"}, ...]
    let mut decision = stage
        .config
        .get("default_route")
        .and_then(|v| v.as_str())
        .unwrap_or("default")
        .to_string();

    if let Some(routes) = stage.config.get("routes").and_then(|v| v.as_array()) {
        for rule in routes {
            let (Some(condition), Some(route)) = (
                rule.get("condition").and_then(|v| v.as_str()),
                rule.get("route").and_then(|v| v.as_str()),
            ) else {
                warn!(stage = %stage.name, "router rule missing condition or route");
                continue;
            };
            if evaluate_path_expression(condition, &context.metadata, &context.previous_results) {
                decision = route.to_string();
                break;
            }
        }
    }

    debug!(stage = %stage.name, route = %decision, "routing decision");
    let mut data = HashMap::new();
    data.insert("routing_decision".to_string(), json!(decision));
    Ok(ProcessorResult::completed(&stage.processor, start, clock.now(), data))
}

fn run_aggregator(
    stage: &StageConfig,
    context: &ProcessorContext,
    clock: &Arc<dyn Clock>,
) -> Result<ProcessorResult, PipelineError> {
    let start = clock.now();

    let mut aggregated = serde_json::Map::new();
    for dep in &stage.dependencies {
        if let Some(result) = context.previous_result(dep) {
            aggregated.insert(dep.clone(), json!(result));
        }
    }

    let mut data = HashMap::new();
    data.insert("source_count".to_string(), json!(aggregated.len()));
    data.insert("aggregated".to_string(), Value::Object(aggregated));
    Ok(ProcessorResult::completed(&stage.processor, start, clock.now(), data))
}

/// Evaluates a stage conditional against the run context.
///
/// Returns `true` when the stage should execute. Unparseable expressions
/// evaluate to `false` (the stage is skipped) with a warning.
pub fn should_execute(stage: &StageConfig, context: &PipelineContext) -> bool {
    let Some(expression) = &stage.conditional else {
        return true;
    };
    let previous = context.completed_stage_data();
    // user_data shadows metadata when both carry a key
    let mut scalars = context.metadata.clone();
    scalars.extend(context.user_data.clone());
    let result = evaluate_path_expression(expression, &scalars, &previous);
    if !result {
        debug!(stage = %stage.name, expression = %expression, "conditional evaluated false");
    }
    result
}

fn evaluate_path_expression(
    expression: &str,
    scalars: &HashMap<String, Value>,
    stages: &HashMap<String, HashMap<String, Value>>,
) -> bool {
    let trimmed = expression.trim();
    let (negated, rest) = match trimmed.strip_prefix('!') {
        Some(rest) => (true, rest.trim()),
        None => (false, trimmed),
    };

    let outcome = if let Some((path, literal)) = split_comparison(rest, "==") {
        lookup(path, scalars, stages).map(|v| value_equals(&v, literal))
    } else if let Some((path, literal)) = split_comparison(rest, "!=") {
        lookup(path, scalars, stages).map(|v| !value_equals(&v, literal))
    } else {
        lookup(rest, scalars, stages).map(|v| is_truthy(&v))
    };

    match outcome {
        Some(result) => result != negated,
        None => {
            warn!(expression = %expression, "conditional path not found, treating as false");
            negated
        }
    }
}

fn split_comparison<'a>(expression: &'a str, operator: &str) -> Option<(&'a str, &'a str)> {
    expression
        .split_once(operator)
        .map(|(path, literal)| (path.trim(), literal.trim()))
}

fn lookup(
    path: &str,
    scalars: &HashMap<String, Value>,
    stages: &HashMap<String, HashMap<String, Value>>,
) -> Option<Value> {
    let mut segments = path.split('.');
    let root = segments.next()?;
    let rest: Vec<&str> = segments.collect();

    match root {
        "user_data" | "metadata" => {
            let first = rest.first()?;
            descend(scalars.get(*first)?.clone(), &rest[1..])
        }
        "stages" => {
            let stage_name = rest.first()?;
            let data_key = rest.get(1)?;
            descend(stages.get(*stage_name)?.get(*data_key)?.clone(), &rest[2..])
        }
        _ => None,
    }
}

fn descend(mut value: Value, segments: &[&str]) -> Option<Value> {
    for segment in segments {
        value = value.get(segment)?.clone();
    }
    Some(value)
}

fn value_equals(value: &Value, literal: &str) -> bool {
    let literal = literal.trim();
    if let Some(stripped) = literal
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| literal.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
    {
        return value.as_str() == Some(stripped);
    }
    match literal {
        "true" => value == &Value::Bool(true),
        "false" => value == &Value::Bool(false),
        "null" => value.is_null(),
        _ => literal
            .parse::<f64>()
            .ok()
            .and_then(|n| value.as_f64().map(|v| (v - n).abs() < f64::EPSILON))
            .unwrap_or_else(|| value.as_str() == Some(literal)),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
