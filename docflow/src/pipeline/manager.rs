// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Manager
//!
//! Drives pipeline runs over the stage DAG: walks the topological layers
//! in order, runs the stages of one layer concurrently up to
//! `max_parallel_stages`, checkpoints after each completed layer, and
//! emits the run and stage lifecycle events.
//!
//! ## Per-stage protocol
//!
//! For every stage of the current layer, in order:
//!
//! 1. cancellation raises `Cancelled`; a pause blocks until resumed
//! 2. stages already completed (restored from a checkpoint) are skipped
//! 3. a non-completed predecessor records `skipped` and emits
//!    `stage.skipped`
//! 4. a false conditional records `skipped`
//! 5. resources are polled at 1 Hz for up to 60 s, then reserved against
//!    a task id; exhaustion of the budget fails the stage
//! 6. the processor runs (through the worker pool when one is wired,
//!    inline otherwise) under the deadline
//!    `stage.timeout * stage_timeout_multiplier`
//! 7. the result is recorded and `stage.completed` / `stage.failed`
//!    emitted; the reservation is released on every path
//! 8. a failed `critical` stage aborts the run
//!
//! Failures of non-critical stages are recorded and execution continues;
//! downstream stages whose dependencies no longer hold are skipped.
//!
//! ## Control
//!
//! `pause` / `resume` gate the run at layer and stage boundaries;
//! `cancel` is cooperative and observed at the same points; an in-flight
//! stage runs to its own deadline. Terminal status is `cancelled` when
//! cancellation was observed, `failed` when any stage failed, else
//! `completed`.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

use docflow_domain::services::datetime_serde;
use docflow_domain::{
    event_types, Clock, Event, PipelineConfig, PipelineContext, PipelineError, PipelineStatus,
    ProcessorResult, RunId, StageConfig, StageResult, StageStatus, StateStore, SystemClock, TaskId,
    TaskPriority,
};

use crate::events::EventBus;
use crate::pipeline::dag::{build_dag, DagVisualization, StageDag};
use crate::pipeline::stages;
use crate::processors::ProcessorRegistry;
use crate::resources::ResourceMonitor;
use crate::workers::{TaskCallable, WorkerPool};

const RESOURCE_POLL: Duration = Duration::from_secs(1);
const RESOURCE_BUDGET: Duration = Duration::from_secs(60);
const RESULT_GRACE: Duration = Duration::from_secs(5);

/// Options for one `execute` call
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Existing run to execute; mutually exclusive with `document_id`
    pub run_id: Option<RunId>,
    /// Document to create a fresh run for
    pub document_id: Option<String>,
    pub metadata: HashMap<String, Value>,
    /// Overrides the configured checkpoint toggle for this run
    pub checkpoint: Option<bool>,
    pub dry_run: bool,
}

impl ExecuteOptions {
    pub fn for_document(document_id: impl Into<String>) -> Self {
        Self {
            document_id: Some(document_id.into()),
            ..Self::default()
        }
    }

    pub fn for_run(run_id: RunId) -> Self {
        Self {
            run_id: Some(run_id),
            ..Self::default()
        }
    }
}

/// Per-stage slice of a run status report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageStatusReport {
    pub status: StageStatus,
    pub duration_secs: Option<f64>,
    pub error: Option<String>,
}

/// Run status returned by `PipelineManager::status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRunStatus {
    pub run_id: RunId,
    pub document_id: String,
    pub status: PipelineStatus,
    /// Settled stages over total stages, 0.0 to 1.0
    pub progress: f64,
    pub completed_stages: usize,
    pub total_stages: usize,
    pub stage_results: HashMap<String, StageStatusReport>,
    #[serde(with = "datetime_serde")]
    pub created_at: DateTime<Utc>,
    pub duration_secs: f64,
}

/// Checkpoint payload persisted after each completed layer
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CheckpointData {
    pipeline_id: String,
    document_id: String,
    metadata: HashMap<String, Value>,
    user_data: HashMap<String, Value>,
    stage_results: HashMap<String, StageResult>,
    #[serde(with = "datetime_serde")]
    timestamp: DateTime<Utc>,
}

type ContextHandle = Arc<tokio::sync::Mutex<PipelineContext>>;

/// Executes a pipeline configuration against documents
pub struct PipelineManager {
    config: PipelineConfig,
    dag: StageDag,
    event_bus: Arc<EventBus>,
    state_store: Arc<dyn StateStore>,
    resource_monitor: Option<Arc<ResourceMonitor>>,
    worker_pool: Option<Arc<WorkerPool>>,
    registry: Arc<ProcessorRegistry>,
    clock: Arc<dyn Clock>,
    status: Mutex<PipelineStatus>,
    active_contexts: Mutex<HashMap<RunId, ContextHandle>>,
    run_states: Mutex<HashMap<RunId, PipelineStatus>>,
    pause_tx: watch::Sender<bool>,
    pause_rx: watch::Receiver<bool>,
    cancelled: AtomicBool,
}

impl PipelineManager {
    /// Builds the manager, validating the configuration and its DAG
    pub fn new(
        config: PipelineConfig,
        event_bus: Arc<EventBus>,
        state_store: Arc<dyn StateStore>,
        registry: Arc<ProcessorRegistry>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let dag = build_dag(&config.stages)?;
        info!(pipeline = %config.name, stages = config.stages.len(), "built pipeline");
        let (pause_tx, pause_rx) = watch::channel(false);
        Ok(Self {
            config,
            dag,
            event_bus,
            state_store,
            resource_monitor: None,
            worker_pool: None,
            registry,
            clock: Arc::new(SystemClock),
            status: Mutex::new(PipelineStatus::Idle),
            active_contexts: Mutex::new(HashMap::new()),
            run_states: Mutex::new(HashMap::new()),
            pause_tx,
            pause_rx,
            cancelled: AtomicBool::new(false),
        })
    }

    pub fn with_resource_monitor(mut self, monitor: Arc<ResourceMonitor>) -> Self {
        self.resource_monitor = Some(monitor);
        self
    }

    pub fn with_worker_pool(mut self, pool: Arc<WorkerPool>) -> Self {
        self.worker_pool = Some(pool);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Manager-level status (the currently executing run's state)
    pub fn current_status(&self) -> PipelineStatus {
        *self.status.lock()
    }

    /// Creates a run context for a document and returns its id
    pub fn create_run(
        &self,
        document_id: impl Into<String>,
        metadata: HashMap<String, Value>,
    ) -> RunId {
        let context = PipelineContext::new(
            document_id,
            metadata,
            self.config.checkpoint_enabled,
            self.clock.now(),
        );
        let run_id = context.run_id;
        self.active_contexts
            .lock()
            .insert(run_id, Arc::new(tokio::sync::Mutex::new(context)));
        self.run_states.lock().insert(run_id, PipelineStatus::Idle);
        debug!(run_id = %run_id, "created pipeline run");
        run_id
    }

    /// Executes the pipeline for an existing run or a new document.
    ///
    /// Restores a checkpoint when one exists, walks the layers, and
    /// returns the final run context. Only one run may execute on a
    /// manager at a time.
    pub async fn execute(&self, options: ExecuteOptions) -> Result<PipelineContext, PipelineError> {
        let run_id = match (options.run_id, &options.document_id) {
            (Some(run_id), _) => {
                if !self.active_contexts.lock().contains_key(&run_id) {
                    return Err(PipelineError::invalid_state(format!(
                        "unknown run id {}",
                        run_id
                    )));
                }
                run_id
            }
            (None, Some(document_id)) => self.create_run(document_id.clone(), options.metadata.clone()),
            (None, None) => {
                return Err(PipelineError::invalid_config(
                    "execute requires a run_id or a document_id",
                ));
            }
        };
        let handle = self
            .active_contexts
            .lock()
            .get(&run_id)
            .cloned()
            .ok_or_else(|| PipelineError::invalid_state(format!("unknown run id {}", run_id)))?;

        {
            let mut status = self.status.lock();
            if *status == PipelineStatus::Running || *status == PipelineStatus::Paused {
                return Err(PipelineError::invalid_state("pipeline is already running"));
            }
            *status = PipelineStatus::Running;
        }
        self.cancelled.store(false, Ordering::Release);
        self.run_states.lock().insert(run_id, PipelineStatus::Running);

        let document_id = {
            let mut context = handle.lock().await;
            if let Some(checkpoint) = options.checkpoint {
                context.checkpoint_enabled = checkpoint;
            }
            context.dry_run = options.dry_run;
            context.document_id.clone()
        };

        self.publish(Event::with_payload(event_types::PIPELINE_STARTED, [
            ("pipeline_id", json!(run_id.to_string())),
            ("document_id", json!(document_id.clone())),
        ]))
        .await;

        if handle.lock().await.checkpoint_enabled {
            self.restore_checkpoint(&handle).await;
        }

        let global_timeout = Duration::from_secs(self.config.global_timeout_secs);
        let outcome = match tokio::time::timeout(global_timeout, self.run_layers(&handle)).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::stage_timeout(format!(
                "pipeline '{}' exceeded global timeout of {}s",
                self.config.name, self.config.global_timeout_secs
            ))),
        };

        let context = handle.lock().await.clone();
        let duration_secs =
            (self.clock.now() - context.created_at).num_milliseconds() as f64 / 1000.0;

        let terminal = if let Err(err) = &outcome {
            if matches!(err, PipelineError::Cancelled(_)) {
                PipelineStatus::Cancelled
            } else {
                PipelineStatus::Failed
            }
        } else if self.cancelled.load(Ordering::Acquire) {
            PipelineStatus::Cancelled
        } else if context.any_stage_failed() {
            PipelineStatus::Failed
        } else {
            PipelineStatus::Completed
        };
        self.run_states.lock().insert(run_id, terminal);

        match &outcome {
            Ok(()) => {
                self.publish(Event::with_payload(event_types::PIPELINE_COMPLETED, [
                    ("pipeline_id", json!(run_id.to_string())),
                    ("status", json!(terminal.as_str())),
                    ("duration", json!(duration_secs)),
                ]))
                .await;
            }
            Err(err) => {
                error!(run_id = %run_id, error = %err, "pipeline run failed");
                self.publish(Event::with_payload(event_types::PIPELINE_FAILED, [
                    ("pipeline_id", json!(run_id.to_string())),
                    ("error", json!(err.to_string())),
                ]))
                .await;
            }
        }

        // Manager becomes idle for the next run; control flags reset
        self.cancelled.store(false, Ordering::Release);
        let _ = self.pause_tx.send(false);
        *self.status.lock() = PipelineStatus::Idle;

        outcome?;
        Ok(context)
    }

    async fn run_layers(&self, handle: &ContextHandle) -> Result<(), PipelineError> {
        for layer in self.dag.parallel_groups() {
            if self.cancelled.load(Ordering::Acquire) {
                return Err(PipelineError::cancelled("pipeline execution cancelled"));
            }
            self.wait_if_paused().await;

            let mut to_run = Vec::new();
            {
                let mut context = handle.lock().await;
                for stage_name in &layer {
                    if context.stage_completed(stage_name) {
                        continue;
                    }
                    let stage = self
                        .config
                        .stage(stage_name)
                        .ok_or_else(|| {
                            PipelineError::internal_error(format!("stage '{}' missing", stage_name))
                        })?
                        .clone();

                    let deps_ok = self
                        .dag
                        .predecessors(stage_name)
                        .iter()
                        .all(|dep| context.stage_completed(dep));
                    if !deps_ok {
                        warn!(stage = %stage_name, "skipping stage, dependencies did not complete");
                        context.record_stage_result(StageResult::skipped(stage_name, self.clock.now()));
                        self.publish(Event::with_payload(event_types::STAGE_SKIPPED, [
                            ("pipeline_id", json!(context.run_id.to_string())),
                            ("stage", json!(stage_name.clone())),
                            ("reason", json!("dependencies")),
                        ]))
                        .await;
                        continue;
                    }

                    if !stages::should_execute(&stage, &context) {
                        info!(stage = %stage_name, "skipping stage, conditional evaluated false");
                        context.record_stage_result(StageResult::skipped(stage_name, self.clock.now()));
                        continue;
                    }

                    to_run.push(stage);
                }
            }

            if !to_run.is_empty() {
                self.execute_layer(to_run, handle).await?;
            }

            let context = handle.lock().await;
            if context.checkpoint_enabled && !context.dry_run {
                self.save_checkpoint(&context).await;
            }
        }
        Ok(())
    }

    async fn execute_layer(
        &self,
        layer: Vec<StageConfig>,
        handle: &ContextHandle,
    ) -> Result<(), PipelineError> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_stages as usize));
        let tasks = layer.into_iter().map(|stage| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire().await.map_err(|_| {
                    PipelineError::internal_error("stage semaphore closed unexpectedly")
                })?;
                self.execute_stage(stage, handle).await
            }
        });

        let results = futures::future::join_all(tasks).await;
        for result in results {
            result?;
        }
        Ok(())
    }

    async fn execute_stage(
        &self,
        stage: StageConfig,
        handle: &ContextHandle,
    ) -> Result<(), PipelineError> {
        if self.cancelled.load(Ordering::Acquire) {
            return Err(PipelineError::cancelled("pipeline execution cancelled"));
        }

        let (run_id, dry_run) = {
            let context = handle.lock().await;
            (context.run_id, context.dry_run)
        };

        // Reserve resources under the per-stage admission budget
        let reservation = TaskId::new();
        if let Some(monitor) = &self.resource_monitor {
            if let Err(err) = self
                .acquire_resources(monitor, reservation, &stage)
                .await
            {
                let now = self.clock.now();
                let mut context = handle.lock().await;
                context.record_stage_result(StageResult::failed(&stage.name, now, now, err.to_string()));
                drop(context);
                self.publish(Event::with_payload(event_types::STAGE_FAILED, [
                    ("pipeline_id", json!(run_id.to_string())),
                    ("stage", json!(stage.name.clone())),
                    ("error", json!(err.to_string())),
                ]))
                .await;
                if stage.critical {
                    return Err(err);
                }
                return Ok(());
            }
        }

        let deadline = self.config.stage_deadline(&stage);
        let start_time = self.clock.now();
        info!(stage = %stage.name, "executing stage");
        self.publish(Event::with_payload(event_types::STAGE_STARTED, [
            ("pipeline_id", json!(run_id.to_string())),
            ("stage", json!(stage.name.clone())),
        ]))
        .await;

        let processor_context = {
            let context = handle.lock().await;
            stages::build_processor_context(&stage, &context, deadline.as_secs_f64(), dry_run)
        };

        let invocation = self
            .invoke_stage(&stage, processor_context, deadline, dry_run)
            .await;

        if let Some(monitor) = &self.resource_monitor {
            monitor.release(reservation);
        }

        let end_time = self.clock.now();
        let stage_result = match invocation {
            Ok(result) => {
                let mut stage_result = result.into_stage_result(&stage.name);
                // Timestamps from the engine clock keep dependency
                // ordering checks consistent across processors
                stage_result.start_time = start_time;
                stage_result.end_time = Some(end_time);
                stage_result
            }
            Err(StageInvocationError::Timeout) => StageResult::failed(
                &stage.name,
                start_time,
                end_time,
                format!(
                    "stage '{}' timeout after {:.1}s",
                    stage.name,
                    deadline.as_secs_f64()
                ),
            ),
            Err(StageInvocationError::Fatal(err)) => {
                // Submission-side failures abort the run outright
                let mut context = handle.lock().await;
                context.record_stage_result(StageResult::failed(
                    &stage.name,
                    start_time,
                    end_time,
                    err.to_string(),
                ));
                drop(context);
                self.publish(Event::with_payload(event_types::STAGE_FAILED, [
                    ("pipeline_id", json!(run_id.to_string())),
                    ("stage", json!(stage.name.clone())),
                    ("error", json!(err.to_string())),
                ]))
                .await;
                return Err(err);
            }
            Err(StageInvocationError::Execution(message)) => {
                StageResult::failed(&stage.name, start_time, end_time, message)
            }
        };

        let failed = stage_result.status == StageStatus::Failed;
        let error_text = stage_result.error.clone();
        let duration = stage_result.duration_secs();
        {
            let mut context = handle.lock().await;
            // Merge processor-provided user data at the defined point
            if let Some(Value::Object(user_data)) = stage_result.data.get("user_data") {
                for (key, value) in user_data {
                    context.user_data.insert(key.clone(), value.clone());
                }
            }
            context.record_stage_result(stage_result);
        }

        if failed {
            self.publish(Event::with_payload(event_types::STAGE_FAILED, [
                ("pipeline_id", json!(run_id.to_string())),
                ("stage", json!(stage.name.clone())),
                ("error", json!(error_text.clone())),
            ]))
            .await;
            if stage.critical {
                let message = error_text.unwrap_or_else(|| "stage failed".to_string());
                return Err(if message.contains("timeout") {
                    PipelineError::StageTimeout(message)
                } else {
                    PipelineError::ProcessorExecution(message)
                });
            }
        } else {
            self.publish(Event::with_payload(event_types::STAGE_COMPLETED, [
                ("pipeline_id", json!(run_id.to_string())),
                ("stage", json!(stage.name.clone())),
                ("duration", json!(duration)),
                ("status", json!("completed")),
            ]))
            .await;
        }
        Ok(())
    }

    async fn invoke_stage(
        &self,
        stage: &StageConfig,
        processor_context: docflow_domain::ProcessorContext,
        deadline: Duration,
        dry_run: bool,
    ) -> Result<ProcessorResult, StageInvocationError> {
        let registry = Arc::clone(&self.registry);
        let clock = Arc::clone(&self.clock);
        let stage_for_task = stage.clone();

        if let Some(pool) = &self.worker_pool {
            let callable = if dry_run {
                TaskCallable::async_fn(move |ctx| {
                    stages::validate_stage(stage_for_task, registry, ctx, clock)
                })
            } else {
                TaskCallable::async_fn(move |ctx| {
                    stages::execute_stage(stage_for_task, registry, ctx, clock)
                })
            };
            let priority = if stage.critical {
                TaskPriority::High
            } else {
                TaskPriority::Normal
            };
            // Resources were already reserved by the executor
            let task_id = pool
                .submit(&stage.processor, processor_context, callable, priority, Some(deadline), None)
                .await
                .map_err(StageInvocationError::Fatal)?;

            match pool.result(task_id, deadline + RESULT_GRACE).await {
                Ok(result) => Ok(result),
                Err(PipelineError::TaskFailed(message)) if message.contains("timed out") => {
                    Err(StageInvocationError::Timeout)
                }
                Err(PipelineError::TaskFailed(message)) => {
                    Err(StageInvocationError::Execution(message))
                }
                Err(PipelineError::TaskTimeout(_)) => Err(StageInvocationError::Timeout),
                Err(err) => Err(StageInvocationError::Fatal(err)),
            }
        } else {
            let invocation = if dry_run {
                tokio::time::timeout(
                    deadline,
                    stages::validate_stage(stage_for_task, registry, processor_context, clock),
                )
                .await
            } else {
                tokio::time::timeout(
                    deadline,
                    stages::execute_stage(stage_for_task, registry, processor_context, clock),
                )
                .await
            };
            match invocation {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(err)) => Err(StageInvocationError::Execution(err.to_string())),
                Err(_) => Err(StageInvocationError::Timeout),
            }
        }
    }

    async fn acquire_resources(
        &self,
        monitor: &Arc<ResourceMonitor>,
        reservation: TaskId,
        stage: &StageConfig,
    ) -> Result<(), PipelineError> {
        let deadline = tokio::time::Instant::now() + RESOURCE_BUDGET;
        loop {
            match monitor.allocate(reservation, &stage.resources) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(PipelineError::resource_exhausted(format!(
                            "resources not available for stage '{}' after {:.0}s: {}",
                            stage.name,
                            RESOURCE_BUDGET.as_secs_f64(),
                            err
                        )));
                    }
                    debug!(stage = %stage.name, "waiting for resources");
                    tokio::time::sleep(RESOURCE_POLL).await;
                }
            }
        }
    }

    async fn wait_if_paused(&self) {
        let mut receiver = self.pause_rx.clone();
        while *receiver.borrow() {
            if receiver.changed().await.is_err() {
                return;
            }
        }
    }

    /// Pauses execution at the next layer or stage boundary
    pub fn pause(&self) {
        let _ = self.pause_tx.send(true);
        let mut status = self.status.lock();
        if *status == PipelineStatus::Running {
            *status = PipelineStatus::Paused;
        }
        info!("pipeline paused");
    }

    /// Resumes a paused execution
    pub fn resume(&self) {
        let _ = self.pause_tx.send(false);
        let mut status = self.status.lock();
        if *status == PipelineStatus::Paused {
            *status = PipelineStatus::Running;
        }
        info!("pipeline resumed");
    }

    /// Requests cooperative cancellation; in-flight stages finish or time
    /// out on their own
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        info!("pipeline cancellation requested");
    }

    /// Status report for a run
    pub async fn status(&self, run_id: RunId) -> Result<PipelineRunStatus, PipelineError> {
        let handle = self
            .active_contexts
            .lock()
            .get(&run_id)
            .cloned()
            .ok_or_else(|| PipelineError::invalid_state(format!("unknown run id {}", run_id)))?;
        let context = handle.lock().await;

        let total_stages = self.config.stages.len();
        let settled = context.settled_stage_count();
        let stage_results = context
            .stage_results
            .iter()
            .map(|(name, result)| {
                (
                    name.clone(),
                    StageStatusReport {
                        status: result.status,
                        duration_secs: result.duration_secs(),
                        error: result.error.clone(),
                    },
                )
            })
            .collect();

        Ok(PipelineRunStatus {
            run_id,
            document_id: context.document_id.clone(),
            status: self
                .run_states
                .lock()
                .get(&run_id)
                .copied()
                .unwrap_or(PipelineStatus::Idle),
            progress: if total_stages == 0 {
                0.0
            } else {
                settled as f64 / total_stages as f64
            },
            completed_stages: settled,
            total_stages,
            stage_results,
            created_at: context.created_at,
            duration_secs: (self.clock.now() - context.created_at).num_milliseconds() as f64
                / 1000.0,
        })
    }

    /// Serializable rendering of the stage graph
    pub fn visualize(&self) -> DagVisualization {
        self.dag.visualize()
    }

    /// Topological order of all stages
    pub fn execution_order(&self) -> Vec<String> {
        self.dag.execution_order()
    }

    /// Drops run contexts and shuts down cached processors
    pub async fn cleanup(&self) {
        self.active_contexts.lock().clear();
        self.run_states.lock().clear();
        self.registry.shutdown().await;
        info!("pipeline manager cleaned up");
    }

    fn checkpoint_key(document_id: &str) -> String {
        format!("pipeline_checkpoint:{}", document_id)
    }

    async fn save_checkpoint(&self, context: &PipelineContext) {
        let data = CheckpointData {
            pipeline_id: context.run_id.to_string(),
            document_id: context.document_id.clone(),
            metadata: context.metadata.clone(),
            user_data: context.user_data.clone(),
            stage_results: context.stage_results.clone(),
            timestamp: self.clock.now(),
        };
        let value = match serde_json::to_value(&data) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "could not serialize checkpoint");
                return;
            }
        };
        if let Err(err) = self
            .state_store
            .set(
                &Self::checkpoint_key(&context.document_id),
                value,
                Some(self.config.checkpoint_ttl_secs),
            )
            .await
        {
            // Checkpoint failures never abort the run
            warn!(error = %err, document_id = %context.document_id, "checkpoint save failed");
        } else {
            debug!(document_id = %context.document_id, "checkpoint saved");
        }
    }

    async fn restore_checkpoint(&self, handle: &ContextHandle) {
        let document_id = handle.lock().await.document_id.clone();
        let stored = match self.state_store.get(&Self::checkpoint_key(&document_id)).await {
            Ok(Some(value)) => value,
            Ok(None) => return,
            Err(err) => {
                warn!(error = %err, "checkpoint restore failed, starting from scratch");
                return;
            }
        };
        let data: CheckpointData = match serde_json::from_value(stored) {
            Ok(data) => data,
            Err(err) => {
                warn!(error = %err, "checkpoint could not be decoded, starting from scratch");
                return;
            }
        };

        info!(document_id = %document_id, stages = data.stage_results.len(), "restoring checkpoint");
        let mut context = handle.lock().await;
        for (name, result) in data.stage_results {
            context.stage_results.insert(name, result);
        }
        context.metadata.extend(data.metadata);
        context.user_data.extend(data.user_data);
    }

    async fn publish(&self, event: Event) {
        self.event_bus.publish(event).await;
    }
}

enum StageInvocationError {
    Timeout,
    Execution(String),
    Fatal(PipelineError),
}
