// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! E2E tests for worker pool backpressure, drain, and event emission.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use docflow::events::EventBus;
use docflow::resources::ResourceMonitor;
use docflow::workers::{ProgressTracker, TaskCallable, WorkerPool};
use docflow_domain::{
    event_types, NullMetricsProvider, PipelineError, ProcessorContext, ProcessorResult,
    ResourceLimits, ResourceRequirements, TaskPriority, WorkerConfig,
};

use crate::common::{collect_events, count_events, settle};

fn tiny_config() -> WorkerConfig {
    WorkerConfig {
        async_workers: 1,
        thread_workers: 1,
        max_queue_size: 10,
        priority_queue_size: 10,
        default_timeout_secs: 30,
        ..WorkerConfig::default()
    }
}

fn sleeping_callable(duration: Duration) -> TaskCallable {
    TaskCallable::async_fn(move |_ctx| async move {
        tokio::time::sleep(duration).await;
        let now = chrono::Utc::now();
        Ok(ProcessorResult::completed("sleeper", now, now, HashMap::new()))
    })
}

fn quick_callable() -> TaskCallable {
    TaskCallable::async_fn(|_ctx| async {
        let now = chrono::Utc::now();
        Ok(ProcessorResult::completed("quick", now, now, HashMap::new()))
    })
}

fn small_requirements() -> ResourceRequirements {
    ResourceRequirements {
        cpu_cores: 0.1,
        memory_mb: 128,
        ..ResourceRequirements::default()
    }
}

#[tokio::test]
async fn test_backpressure_returns_queue_full_without_leaking() {
    let monitor = Arc::new(ResourceMonitor::new(
        ResourceLimits {
            max_cpu_cores: 16.0,
            max_memory_mb: 65_536,
            ..ResourceLimits::default()
        },
        Arc::new(NullMetricsProvider),
    ));
    let pool = WorkerPool::builder(tiny_config())
        .resource_monitor(Arc::clone(&monitor))
        .build();
    pool.start().await;

    // Occupy the single worker so the queue cannot drain
    pool.submit(
        "sleeper",
        ProcessorContext::new("doc-busy"),
        sleeping_callable(Duration::from_secs(20)),
        TaskPriority::Normal,
        None,
        Some(&small_requirements()),
    )
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Fill the default queue to capacity
    let mut accepted = 1;
    let mut queue_full = None;
    for i in 0..=tiny_config().max_queue_size {
        let outcome = pool
            .submit(
                "filler",
                ProcessorContext::new(format!("doc-{}", i)),
                quick_callable(),
                TaskPriority::Normal,
                None,
                Some(&small_requirements()),
            )
            .await;
        match outcome {
            Ok(_) => accepted += 1,
            Err(err) => {
                queue_full = Some(err);
                break;
            }
        }
    }

    let err = queue_full.expect("default queue should have filled");
    assert!(matches!(err, PipelineError::QueueFull(_)));
    // Every accepted task holds its reservation; the rejected one does not
    assert_eq!(monitor.allocations().len(), accepted);

    pool.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_stop_drains_and_blocks_new_submissions() {
    let bus = Arc::new(EventBus::new());
    bus.start().await.unwrap();
    let seen = collect_events(
        &bus,
        &[event_types::WORKER_POOL_STARTED, event_types::WORKER_POOL_STOPPED],
    );

    let pool = WorkerPool::builder(WorkerConfig {
        async_workers: 2,
        ..tiny_config()
    })
    .event_bus(Arc::clone(&bus))
    .build();
    pool.start().await;

    let mut task_ids = Vec::new();
    for _ in 0..4 {
        task_ids.push(
            pool.submit(
                "quick",
                ProcessorContext::new("doc"),
                quick_callable(),
                TaskPriority::Normal,
                None,
                None,
            )
            .await
            .unwrap(),
        );
    }

    pool.stop(Duration::from_secs(5)).await;

    // Every accepted task completed before shutdown
    for task_id in task_ids {
        assert!(pool.result(task_id, Duration::from_millis(100)).await.is_ok());
    }

    // No further admissions after stop
    let err = pool
        .submit(
            "late",
            ProcessorContext::new("doc"),
            quick_callable(),
            TaskPriority::Normal,
            None,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidState(_)));

    settle().await;
    assert_eq!(count_events(&seen, event_types::WORKER_POOL_STARTED), 1);
    assert_eq!(count_events(&seen, event_types::WORKER_POOL_STOPPED), 1);
    bus.stop().await;
}

#[tokio::test]
async fn test_task_events_emitted() {
    let bus = Arc::new(EventBus::new());
    bus.start().await.unwrap();
    let seen = collect_events(
        &bus,
        &[
            event_types::TASK_SUBMITTED,
            event_types::TASK_COMPLETED,
            event_types::TASK_FAILED,
        ],
    );

    let pool = WorkerPool::builder(tiny_config())
        .event_bus(Arc::clone(&bus))
        .build();
    pool.start().await;

    let ok = pool
        .submit(
            "quick",
            ProcessorContext::new("doc"),
            quick_callable(),
            TaskPriority::Normal,
            None,
            None,
        )
        .await
        .unwrap();
    let bad = pool
        .submit(
            "broken",
            ProcessorContext::new("doc"),
            TaskCallable::async_fn(|_ctx| async {
                Err(PipelineError::processor_execution("broken processor"))
            }),
            TaskPriority::Normal,
            None,
            None,
        )
        .await
        .unwrap();

    pool.result(ok, Duration::from_secs(5)).await.unwrap();
    assert!(pool.result(bad, Duration::from_secs(5)).await.is_err());

    settle().await;
    assert_eq!(count_events(&seen, event_types::TASK_SUBMITTED), 2);
    assert_eq!(count_events(&seen, event_types::TASK_COMPLETED), 1);
    assert_eq!(count_events(&seen, event_types::TASK_FAILED), 1);

    let stats = pool.stats();
    assert_eq!(stats.completed_tasks, 1);
    assert_eq!(stats.failed_tasks, 1);
    assert_eq!(stats.total_submitted, 2);

    pool.stop(Duration::from_secs(1)).await;
    bus.stop().await;
}

#[tokio::test]
async fn test_progress_tracker_follows_task() {
    let tracker = Arc::new(ProgressTracker::new());
    let pool = WorkerPool::builder(tiny_config())
        .progress_tracker(Arc::clone(&tracker))
        .build();
    pool.start().await;

    let task_id = pool
        .submit(
            "quick",
            ProcessorContext::new("doc-progress"),
            quick_callable(),
            TaskPriority::Normal,
            None,
            None,
        )
        .await
        .unwrap();
    pool.result(task_id, Duration::from_secs(5)).await.unwrap();

    let progress = tracker.task_progress(task_id).unwrap();
    assert_eq!(progress.document_id, "doc-progress");
    assert_eq!(progress.progress, 1.0);
    assert!(progress.completed_at.is_some());

    let rollup = tracker.pipeline_progress("doc-progress");
    assert_eq!(rollup.completed_tasks, 1);
    assert_eq!(rollup.overall_progress, 1.0);

    pool.stop(Duration::from_secs(1)).await;
}
