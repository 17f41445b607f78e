// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! E2E tests for the assembled processing system: pipeline manager,
//! worker pool, resource monitor, and event bus wired together.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use docflow::processors::ProcessorRegistry;
use docflow::state::InMemoryStateStore;
use docflow::system::{ProcessingSystem, ProcessingSystemConfig};
use docflow_domain::{
    event_types, NullMetricsProvider, PipelineConfig, PipelineError, ResourceLimits, StageStatus,
    StateStore, WorkerConfig,
};

use crate::common::{collect_events, count_events, init_tracing, quick_stage, register_processor, settle};

fn system_with(
    config: PipelineConfig,
    registry: Arc<ProcessorRegistry>,
) -> ProcessingSystem {
    init_tracing();
    ProcessingSystem::with_collaborators(
        ProcessingSystemConfig {
            pipeline_config: config,
            worker_config: WorkerConfig {
                async_workers: 2,
                thread_workers: 1,
                ..WorkerConfig::default()
            },
            resource_limits: ResourceLimits::default(),
        },
        Arc::new(InMemoryStateStore::new()) as Arc<dyn StateStore>,
        Arc::new(NullMetricsProvider),
        registry,
    )
    .unwrap()
}

#[tokio::test]
async fn test_document_flows_through_assembled_system() {
    let registry = Arc::new(ProcessorRegistry::new());
    let extract = register_processor(&registry, "extractor", None, 0);
    let classify = register_processor(&registry, "classifier", None, 0);

    let config = PipelineConfig::new(
        "assembled",
        vec![
            quick_stage("extract", "extractor", &[]),
            quick_stage("classify", "classifier", &["extract"]),
        ],
    )
    .unwrap()
    .with_checkpointing(false);

    let system = system_with(config, registry);
    let seen = collect_events(
        system.event_bus(),
        &[
            event_types::SYSTEM_STARTED,
            event_types::PIPELINE_COMPLETED,
            event_types::TASK_COMPLETED,
            event_types::STAGE_COMPLETED,
        ],
    );
    system.initialize().await.unwrap();

    let mut metadata = HashMap::new();
    metadata.insert("mime_type".to_string(), serde_json::json!("application/pdf"));
    let context = system
        .process_document("doc-assembled", metadata)
        .await
        .unwrap();

    assert_eq!(extract.process_count(), 1);
    assert_eq!(classify.process_count(), 1);
    assert_eq!(context.stage_results["extract"].status, StageStatus::Completed);
    assert_eq!(context.stage_results["classify"].status, StageStatus::Completed);

    settle().await;
    assert_eq!(count_events(&seen, event_types::SYSTEM_STARTED), 1);
    assert_eq!(count_events(&seen, event_types::PIPELINE_COMPLETED), 1);
    // Stage invocations went through the worker pool
    assert_eq!(count_events(&seen, event_types::TASK_COMPLETED), 2);
    assert_eq!(count_events(&seen, event_types::STAGE_COMPLETED), 2);

    let status = system.status().await;
    assert!(status.running);
    assert!(status.store_healthy);
    assert_eq!(status.pool.completed_tasks, 2);
    assert_eq!(status.active_allocations, 0);

    system.shutdown(Duration::from_secs(5)).await;
    assert!(!system.status().await.running);
}

#[tokio::test]
async fn test_process_before_initialize_rejected() {
    let registry = Arc::new(ProcessorRegistry::new());
    register_processor(&registry, "extractor", None, 0);
    let config = PipelineConfig::new("lazy", vec![quick_stage("a", "extractor", &[])])
        .unwrap()
        .with_checkpointing(false);

    let system = system_with(config, registry);
    let err = system
        .process_document("doc-early", HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidState(_)));
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let registry = Arc::new(ProcessorRegistry::new());
    register_processor(&registry, "extractor", None, 0);
    let config = PipelineConfig::new("idem", vec![quick_stage("a", "extractor", &[])])
        .unwrap()
        .with_checkpointing(false);

    let system = system_with(config, registry);
    system.initialize().await.unwrap();
    system.shutdown(Duration::from_secs(2)).await;
    // A second shutdown is a no-op
    system.shutdown(Duration::from_secs(2)).await;
}

#[tokio::test]
async fn test_unregistered_processor_fails_stage() {
    let registry = Arc::new(ProcessorRegistry::new());
    let config = PipelineConfig::new("missing", vec![quick_stage("a", "ghost", &[])])
        .unwrap()
        .with_checkpointing(false);

    let system = system_with(config, registry);
    system.initialize().await.unwrap();

    let err = system
        .process_document("doc-ghost", HashMap::new())
        .await
        .unwrap_err();
    // The critical stage failed because its processor cannot be resolved
    assert!(err.to_string().contains("ghost") || matches!(err, PipelineError::ProcessorExecution(_)));

    system.shutdown(Duration::from_secs(2)).await;
}
