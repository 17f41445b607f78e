// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! E2E tests for checkpoint persistence and resume-after-interruption.

use std::sync::Arc;

use docflow::events::EventBus;
use docflow::pipeline::{ExecuteOptions, PipelineManager};
use docflow::processors::ProcessorRegistry;
use docflow::state::InMemoryStateStore;
use docflow_domain::{PipelineConfig, StageStatus, StateStore};

use crate::common::{quick_stage, register_processor};

fn three_stage_config(name: &str) -> PipelineConfig {
    PipelineConfig::new(
        name,
        vec![
            quick_stage("a", "step_a", &[]),
            quick_stage("b", "step_b", &["a"]),
            quick_stage("c", "step_c", &["b"]),
        ],
    )
    .unwrap()
}

#[tokio::test]
async fn test_resume_runs_only_missing_stage() {
    let bus = Arc::new(EventBus::new());
    bus.start().await.unwrap();
    let store = Arc::new(InMemoryStateStore::new());

    // First attempt: a and b succeed, c fails and aborts the run
    let registry = Arc::new(ProcessorRegistry::new());
    let a_calls = register_processor(&registry, "step_a", None, 0);
    let b_calls = register_processor(&registry, "step_b", None, 0);
    register_processor(&registry, "step_c", None, usize::MAX);

    let manager = PipelineManager::new(
        three_stage_config("resumable"),
        Arc::clone(&bus),
        Arc::clone(&store) as Arc<dyn StateStore>,
        registry,
    )
    .unwrap();
    assert!(manager
        .execute(ExecuteOptions::for_document("doc-resume"))
        .await
        .is_err());
    assert_eq!(a_calls.process_count(), 1);
    assert_eq!(b_calls.process_count(), 1);

    // The interruption left a checkpoint with a and b completed
    let checkpoint = store
        .get("pipeline_checkpoint:doc-resume")
        .await
        .unwrap()
        .expect("checkpoint written after completed layers");
    let results = checkpoint.get("stage_results").unwrap();
    assert!(results.get("a").is_some());
    assert!(results.get("b").is_some());

    // A fresh manager with a now-working step_c resumes from that state
    let registry = Arc::new(ProcessorRegistry::new());
    let a_again = register_processor(&registry, "step_a", None, 0);
    let b_again = register_processor(&registry, "step_b", None, 0);
    let c_again = register_processor(&registry, "step_c", None, 0);

    let manager = PipelineManager::new(
        three_stage_config("resumable"),
        Arc::clone(&bus),
        Arc::clone(&store) as Arc<dyn StateStore>,
        registry,
    )
    .unwrap();
    let context = manager
        .execute(ExecuteOptions::for_document("doc-resume"))
        .await
        .unwrap();

    // Only c ran on resume
    assert_eq!(a_again.process_count(), 0);
    assert_eq!(b_again.process_count(), 0);
    assert_eq!(c_again.process_count(), 1);
    for name in ["a", "b", "c"] {
        assert_eq!(context.stage_results[name].status, StageStatus::Completed);
    }
    bus.stop().await;
}

#[tokio::test]
async fn test_restored_results_preserve_original_timestamps() {
    let bus = Arc::new(EventBus::new());
    bus.start().await.unwrap();
    let store = Arc::new(InMemoryStateStore::new());

    let registry = Arc::new(ProcessorRegistry::new());
    register_processor(&registry, "step_a", None, 0);
    register_processor(&registry, "step_b", None, 0);
    register_processor(&registry, "step_c", None, 0);

    let manager = PipelineManager::new(
        three_stage_config("stamped"),
        Arc::clone(&bus),
        Arc::clone(&store) as Arc<dyn StateStore>,
        Arc::clone(&registry),
    )
    .unwrap();
    let first = manager
        .execute(ExecuteOptions::for_document("doc-stamped"))
        .await
        .unwrap();

    let manager = PipelineManager::new(
        three_stage_config("stamped"),
        Arc::clone(&bus),
        Arc::clone(&store) as Arc<dyn StateStore>,
        registry,
    )
    .unwrap();
    let second = manager
        .execute(ExecuteOptions::for_document("doc-stamped"))
        .await
        .unwrap();

    // Completed results compare equal after the store round-trip
    for name in ["a", "b", "c"] {
        assert_eq!(first.stage_results[name], second.stage_results[name]);
    }
    bus.stop().await;
}

#[tokio::test]
async fn test_checkpoint_disabled_runs_everything_again() {
    let bus = Arc::new(EventBus::new());
    bus.start().await.unwrap();
    let store = Arc::new(InMemoryStateStore::new());

    let registry = Arc::new(ProcessorRegistry::new());
    let calls = register_processor(&registry, "step_a", None, 0);
    register_processor(&registry, "step_b", None, 0);
    register_processor(&registry, "step_c", None, 0);

    let config = three_stage_config("no_ckpt").with_checkpointing(false);
    let manager = PipelineManager::new(
        config,
        Arc::clone(&bus),
        Arc::clone(&store) as Arc<dyn StateStore>,
        registry,
    )
    .unwrap();

    manager
        .execute(ExecuteOptions::for_document("doc-nc"))
        .await
        .unwrap();
    assert!(store
        .get("pipeline_checkpoint:doc-nc")
        .await
        .unwrap()
        .is_none());

    manager
        .execute(ExecuteOptions::for_document("doc-nc"))
        .await
        .unwrap();
    assert_eq!(calls.process_count(), 2);
    bus.stop().await;
}

#[tokio::test]
async fn test_corrupt_checkpoint_starts_from_scratch() {
    let bus = Arc::new(EventBus::new());
    bus.start().await.unwrap();
    let store = Arc::new(InMemoryStateStore::new());
    store
        .set(
            "pipeline_checkpoint:doc-corrupt",
            serde_json::json!({"not": "a checkpoint"}),
            None,
        )
        .await
        .unwrap();

    let registry = Arc::new(ProcessorRegistry::new());
    let calls = register_processor(&registry, "step_a", None, 0);
    register_processor(&registry, "step_b", None, 0);
    register_processor(&registry, "step_c", None, 0);

    let manager = PipelineManager::new(
        three_stage_config("tolerates_corruption"),
        Arc::clone(&bus),
        Arc::clone(&store) as Arc<dyn StateStore>,
        registry,
    )
    .unwrap();
    let context = manager
        .execute(ExecuteOptions::for_document("doc-corrupt"))
        .await
        .unwrap();

    assert_eq!(calls.process_count(), 1);
    assert_eq!(context.stage_results.len(), 3);
    bus.stop().await;
}

#[tokio::test]
async fn test_dry_run_writes_no_checkpoint() {
    let bus = Arc::new(EventBus::new());
    bus.start().await.unwrap();
    let store = Arc::new(InMemoryStateStore::new());

    let registry = Arc::new(ProcessorRegistry::new());
    register_processor(&registry, "step_a", None, 0);
    register_processor(&registry, "step_b", None, 0);
    register_processor(&registry, "step_c", None, 0);

    let manager = PipelineManager::new(
        three_stage_config("dry"),
        Arc::clone(&bus),
        Arc::clone(&store) as Arc<dyn StateStore>,
        registry,
    )
    .unwrap();

    let mut options = ExecuteOptions::for_document("doc-dry");
    options.dry_run = true;
    manager.execute(options).await.unwrap();

    assert!(store
        .get("pipeline_checkpoint:doc-dry")
        .await
        .unwrap()
        .is_none());
    bus.stop().await;
}
