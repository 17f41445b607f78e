// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! E2E tests for pipeline execution: layer ordering, parallelism,
//! failure propagation, timeouts, and cooperative control.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use docflow::events::EventBus;
use docflow::pipeline::{ExecuteOptions, PipelineManager};
use docflow::processors::ProcessorRegistry;
use docflow::resources::ResourceMonitor;
use docflow::state::InMemoryStateStore;
use docflow_domain::{
    event_types, NullMetricsProvider, PipelineConfig, PipelineError, PipelineStatus,
    ResourceLimits, StageStatus, StateStore,
};

use crate::common::{collect_events, count_events, init_tracing, quick_stage, register_processor, settle};

async fn started_bus() -> Arc<EventBus> {
    init_tracing();
    let bus = Arc::new(EventBus::new());
    bus.start().await.unwrap();
    bus
}

fn manager(
    config: PipelineConfig,
    bus: &Arc<EventBus>,
    registry: Arc<ProcessorRegistry>,
) -> PipelineManager {
    let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
    PipelineManager::new(config, Arc::clone(bus), store, registry).unwrap()
}

#[tokio::test]
async fn test_linear_pipeline_all_succeed() {
    let bus = started_bus().await;
    let registry = Arc::new(ProcessorRegistry::new());
    let calls = register_processor(&registry, "noop", None, 0);
    let seen = collect_events(&bus, &[event_types::STAGE_COMPLETED, event_types::PIPELINE_COMPLETED]);

    let config = PipelineConfig::new(
        "linear",
        vec![
            quick_stage("a", "noop", &[]),
            quick_stage("b", "noop", &["a"]),
            quick_stage("c", "noop", &["b"]),
        ],
    )
    .unwrap()
    .with_checkpointing(false);

    let manager = manager(config, &bus, registry);
    let context = manager
        .execute(ExecuteOptions::for_document("doc-linear"))
        .await
        .unwrap();

    assert_eq!(calls.process_count(), 3);
    for name in ["a", "b", "c"] {
        assert_eq!(context.stage_results[name].status, StageStatus::Completed);
        assert_eq!(context.stage_results[name].data["n"], serde_json::json!(1));
    }

    // end_time is monotonically non-decreasing along the chain
    let ends: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|n| context.stage_results[*n].end_time.unwrap())
        .collect();
    assert!(ends[0] <= ends[1] && ends[1] <= ends[2]);

    settle().await;
    assert_eq!(count_events(&seen, event_types::STAGE_COMPLETED), 3);
    assert_eq!(count_events(&seen, event_types::PIPELINE_COMPLETED), 1);
    bus.stop().await;
}

#[tokio::test]
async fn test_diamond_runs_middle_layer_concurrently() {
    let bus = started_bus().await;
    let registry = Arc::new(ProcessorRegistry::new());
    let calls = register_processor(&registry, "noop", Some(Duration::from_millis(150)), 0);

    let config = PipelineConfig::new(
        "diamond",
        vec![
            quick_stage("a", "noop", &[]),
            quick_stage("b", "noop", &["a"]),
            quick_stage("c", "noop", &["a"]),
            quick_stage("d", "noop", &["b", "c"]),
        ],
    )
    .unwrap()
    .with_checkpointing(false)
    .with_max_parallel_stages(2)
    .unwrap();

    let manager = manager(config, &bus, registry);
    let context = manager
        .execute(ExecuteOptions::for_document("doc-diamond"))
        .await
        .unwrap();

    assert_eq!(calls.process_count(), 4);
    // b and c overlapped in the middle layer
    assert!(calls.max_concurrency() >= 2, "max concurrency was {}", calls.max_concurrency());

    // d started only after both b and c finished
    let b_end = context.stage_results["b"].end_time.unwrap();
    let c_end = context.stage_results["c"].end_time.unwrap();
    let d_start = context.stage_results["d"].start_time;
    assert!(d_start >= b_end.max(c_end));
    bus.stop().await;
}

#[tokio::test]
async fn test_non_critical_failure_marks_run_failed() {
    let bus = started_bus().await;
    let registry = Arc::new(ProcessorRegistry::new());
    register_processor(&registry, "ok", None, 0);
    register_processor(&registry, "bad", None, usize::MAX);
    let seen = collect_events(&bus, &[event_types::STAGE_FAILED, event_types::STAGE_SKIPPED]);

    let mut failing = quick_stage("b", "bad", &["a"]);
    failing.critical = false;
    let config = PipelineConfig::new(
        "faulty",
        vec![
            quick_stage("a", "ok", &[]),
            failing,
            quick_stage("c", "ok", &["b"]),
        ],
    )
    .unwrap()
    .with_checkpointing(false);

    let manager = manager(config, &bus, registry);
    let run_id = manager.create_run("doc-faulty", HashMap::new());
    let context = manager
        .execute(ExecuteOptions::for_run(run_id))
        .await
        .unwrap();

    assert_eq!(context.stage_results["a"].status, StageStatus::Completed);
    assert_eq!(context.stage_results["b"].status, StageStatus::Failed);
    assert_eq!(context.stage_results["c"].status, StageStatus::Skipped);

    let status = manager.status(run_id).await.unwrap();
    assert_eq!(status.status, PipelineStatus::Failed);

    settle().await;
    assert_eq!(count_events(&seen, event_types::STAGE_FAILED), 1);
    assert_eq!(count_events(&seen, event_types::STAGE_SKIPPED), 1);
    bus.stop().await;
}

#[tokio::test]
async fn test_single_critical_stage_fails_run() {
    let bus = started_bus().await;
    let registry = Arc::new(ProcessorRegistry::new());
    register_processor(&registry, "bad", None, usize::MAX);

    let config = PipelineConfig::new("crit", vec![quick_stage("only", "bad", &[])])
        .unwrap()
        .with_checkpointing(false);
    let manager = manager(config, &bus, registry);

    let err = manager
        .execute(ExecuteOptions::for_document("doc-crit"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::ProcessorExecution(_)));
    bus.stop().await;
}

#[tokio::test]
async fn test_same_stage_non_critical_completes_run_with_failure_recorded() {
    let bus = started_bus().await;
    let registry = Arc::new(ProcessorRegistry::new());
    register_processor(&registry, "bad", None, usize::MAX);

    let mut failing = quick_stage("only", "bad", &[]);
    failing.critical = false;
    let config = PipelineConfig::new("tolerant", vec![failing])
        .unwrap()
        .with_checkpointing(false);
    let manager = manager(config, &bus, registry);
    let run_id = manager.create_run("doc-tolerant", HashMap::new());

    // Execution itself succeeds; the run's terminal status reflects the
    // recorded stage failure
    let context = manager
        .execute(ExecuteOptions::for_run(run_id))
        .await
        .unwrap();
    assert_eq!(context.stage_results["only"].status, StageStatus::Failed);
    assert_eq!(
        manager.status(run_id).await.unwrap().status,
        PipelineStatus::Failed
    );
    bus.stop().await;
}

#[tokio::test]
async fn test_timeout_stage_releases_resources() {
    let bus = started_bus().await;
    let registry = Arc::new(ProcessorRegistry::new());
    register_processor(&registry, "sleepy", Some(Duration::from_secs(5)), 0);

    let monitor = Arc::new(ResourceMonitor::new(
        ResourceLimits::default(),
        Arc::new(NullMetricsProvider),
    ));

    let mut slow = quick_stage("x", "sleepy", &[]);
    slow.timeout_secs = 1;
    slow.critical = false;
    let config = PipelineConfig::new("slow", vec![slow])
        .unwrap()
        .with_checkpointing(false);

    let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
    let manager = PipelineManager::new(config, Arc::clone(&bus), store, registry)
        .unwrap()
        .with_resource_monitor(Arc::clone(&monitor));

    let started = std::time::Instant::now();
    let context = manager
        .execute(ExecuteOptions::for_document("doc-slow"))
        .await
        .unwrap();
    let elapsed = started.elapsed();

    let result = &context.stage_results["x"];
    assert_eq!(result.status, StageStatus::Failed);
    assert!(result.error.as_ref().unwrap().contains("timeout"));
    // Deadline was 1s; the run must not have waited for the 5s sleep
    assert!(elapsed >= Duration::from_millis(900));
    assert!(elapsed < Duration::from_secs(3));
    // The stage's reservation was released on the failure path
    assert!(monitor.allocations().is_empty());
    bus.stop().await;
}

#[tokio::test]
async fn test_cancel_while_paused_terminates_cancelled() {
    let bus = started_bus().await;
    let registry = Arc::new(ProcessorRegistry::new());
    let calls = register_processor(&registry, "noop", None, 0);

    let config = PipelineConfig::new(
        "pausable",
        vec![quick_stage("a", "noop", &[]), quick_stage("b", "noop", &["a"])],
    )
    .unwrap()
    .with_checkpointing(false);

    let manager = Arc::new(manager(config, &bus, registry));
    let run_id = manager.create_run("doc-paused", HashMap::new());

    manager.pause();
    let executing = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.execute(ExecuteOptions::for_run(run_id)).await })
    };

    // The run is parked at the first layer boundary
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(calls.process_count(), 0);

    manager.cancel();
    manager.resume();

    let outcome = executing.await.unwrap();
    assert!(matches!(outcome, Err(PipelineError::Cancelled(_))));
    assert_eq!(
        manager.status(run_id).await.unwrap().status,
        PipelineStatus::Cancelled
    );
    assert_eq!(calls.process_count(), 0);
    bus.stop().await;
}

#[tokio::test]
async fn test_concurrent_execute_rejected() {
    let bus = started_bus().await;
    let registry = Arc::new(ProcessorRegistry::new());
    register_processor(&registry, "slowish", Some(Duration::from_millis(300)), 0);

    let config = PipelineConfig::new("busy", vec![quick_stage("a", "slowish", &[])])
        .unwrap()
        .with_checkpointing(false);
    let manager = Arc::new(manager(config, &bus, registry));

    let first = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .execute(ExecuteOptions::for_document("doc-one"))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = manager
        .execute(ExecuteOptions::for_document("doc-two"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidState(_)));

    first.await.unwrap().unwrap();
    bus.stop().await;
}
