// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Worker Pool
//!
//! Multi-queue task dispatcher decoupling stage invocation from the
//! pipeline executor. Submissions land in one of two bounded queues,
//! a dedicated queue for `Critical` tasks and a default queue for
//! everything else, and a fixed set of cooperative workers drains them,
//! priority queue first. Blocking (synchronous) callables run on the
//! blocking thread pool behind a semaphore sized by `thread_workers`
//! (plus `process_workers`; the engine is in-process, so process isolation
//! degrades to the same blocking budget and is logged as such).
//!
//! ## Task lifetime
//!
//! Once `submit` returns a task id the pool owns the task: the record
//! moves from the active table to a bounded completed list, resources
//! reserved at submission are released on every outcome, and the
//! submitter polls `result` to retrieve it. A full queue fails the
//! submission after a one-second put deadline and releases the
//! reservation.
//!
//! ## Health
//!
//! A monitor loop runs at the heartbeat interval, marks workers silent
//! for three intervals as errored, and emits `worker_pool.heartbeat`
//! with aggregate statistics.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use docflow_domain::{
    event_types, Clock, Event, PipelineError, ProcessorContext, ProcessorResult,
    ResourceRequirements, SystemClock, TaskId, TaskPriority, WorkerConfig, WorkerState,
    WorkerStatus, WorkerTask, WorkerType,
};

use crate::events::EventBus;
use crate::resources::ResourceMonitor;
use crate::workers::progress::ProgressTracker;

const PRIORITY_POLL: Duration = Duration::from_millis(100);
const DEFAULT_POLL: Duration = Duration::from_secs(1);
const SUBMIT_DEADLINE: Duration = Duration::from_secs(1);
const RESULT_POLL: Duration = Duration::from_millis(100);
const COMPLETED_CAP: usize = 1000;
const COMPLETED_TRIM: usize = 500;

type CallableFuture = Pin<Box<dyn Future<Output = Result<ProcessorResult, PipelineError>> + Send>>;

/// The work a task carries: an async closure awaited on a cooperative
/// worker, or a blocking closure dispatched to the blocking pool
pub enum TaskCallable {
    Async(Box<dyn FnOnce(ProcessorContext) -> CallableFuture + Send>),
    Blocking(Box<dyn FnOnce(ProcessorContext) -> Result<ProcessorResult, PipelineError> + Send>),
}

impl TaskCallable {
    /// Wraps an async closure
    pub fn async_fn<F, Fut>(f: F) -> Self
    where
        F: FnOnce(ProcessorContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<ProcessorResult, PipelineError>> + Send + 'static,
    {
        TaskCallable::Async(Box::new(move |ctx| Box::pin(f(ctx))))
    }

    /// Wraps a blocking closure
    pub fn blocking<F>(f: F) -> Self
    where
        F: FnOnce(ProcessorContext) -> Result<ProcessorResult, PipelineError> + Send + 'static,
    {
        TaskCallable::Blocking(Box::new(f))
    }
}

struct QueuedTask {
    task_id: TaskId,
    context: ProcessorContext,
    callable: TaskCallable,
    timeout: Duration,
}

struct CompletedTasks {
    map: HashMap<TaskId, WorkerTask>,
    order: VecDeque<TaskId>,
}

impl CompletedTasks {
    fn insert(&mut self, task: WorkerTask) {
        self.order.push_back(task.task_id);
        self.map.insert(task.task_id, task);
        if self.map.len() > COMPLETED_CAP {
            while self.map.len() > COMPLETED_TRIM {
                if let Some(oldest) = self.order.pop_front() {
                    self.map.remove(&oldest);
                } else {
                    break;
                }
            }
        }
    }
}

struct PoolState {
    running: AtomicBool,
    started_at: Mutex<Option<DateTime<Utc>>>,
    active_tasks: RwLock<HashMap<TaskId, WorkerTask>>,
    completed: RwLock<CompletedTasks>,
    worker_stats: RwLock<HashMap<String, WorkerState>>,
    queued_count: AtomicUsize,
    total_submitted: AtomicU64,
    total_completed: AtomicU64,
    total_failed: AtomicU64,
}

/// Aggregate pool statistics from `WorkerPool::stats`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolStats {
    pub total_workers: usize,
    pub active_workers: usize,
    pub idle_workers: usize,
    pub queued_tasks: usize,
    pub active_tasks: usize,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub total_submitted: u64,
    pub average_wait_time_secs: f64,
    pub average_processing_time_secs: f64,
    pub uptime_secs: f64,
}

/// Multi-queue task dispatcher over a fixed worker set
pub struct WorkerPool {
    config: WorkerConfig,
    event_bus: Option<Arc<EventBus>>,
    resource_monitor: Option<Arc<ResourceMonitor>>,
    progress_tracker: Option<Arc<ProgressTracker>>,
    clock: Arc<dyn Clock>,
    priority_tx: mpsc::Sender<QueuedTask>,
    priority_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<QueuedTask>>>,
    default_tx: mpsc::Sender<QueuedTask>,
    default_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<QueuedTask>>>,
    blocking_permits: Arc<Semaphore>,
    state: Arc<PoolState>,
    worker_handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    monitor_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(config: WorkerConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: WorkerConfig) -> WorkerPoolBuilder {
        WorkerPoolBuilder {
            config,
            event_bus: None,
            resource_monitor: None,
            progress_tracker: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Starts workers and the health monitor; calling again is a no-op
    pub async fn start(&self) {
        if self.state.running.swap(true, Ordering::AcqRel) {
            warn!("worker pool is already running");
            return;
        }
        *self.state.started_at.lock() = Some(self.clock.now());

        if self.config.process_workers > 0 {
            info!(
                process_workers = self.config.process_workers,
                "process workers requested; running them as blocking workers in-process"
            );
        }

        let mut handles = self.worker_handles.lock().await;
        for index in 0..self.config.async_workers {
            let worker_id = format!("async-{}", index);
            self.state.worker_stats.write().insert(
                worker_id.clone(),
                WorkerState::new(&worker_id, WorkerType::Async, self.clock.now()),
            );
            handles.push(tokio::spawn(Self::worker_loop(
                worker_id,
                Arc::clone(&self.state),
                Arc::clone(&self.priority_rx),
                Arc::clone(&self.default_rx),
                Arc::clone(&self.blocking_permits),
                self.event_bus.clone(),
                self.resource_monitor.clone(),
                self.progress_tracker.clone(),
                Arc::clone(&self.clock),
            )));
        }
        info!(async_workers = self.config.async_workers, "started async workers");

        let monitor = tokio::spawn(Self::monitor_loop(
            Arc::clone(&self.state),
            self.event_bus.clone(),
            self.resource_monitor.clone(),
            Arc::clone(&self.clock),
            self.config.heartbeat_interval(),
        ));
        *self.monitor_handle.lock().await = Some(monitor);

        self.publish(Event::with_payload(event_types::WORKER_POOL_STARTED, [
            ("async_workers", json!(self.config.async_workers)),
            ("thread_workers", json!(self.config.thread_workers)),
        ]))
        .await;
        info!("worker pool started");
    }

    /// Submits a task for execution and returns its id.
    ///
    /// When resource requirements are given and a monitor is wired,
    /// admission and reservation happen before queueing; a failed
    /// enqueue (one-second deadline on a full queue) releases the
    /// reservation and returns `QueueFull`.
    pub async fn submit(
        &self,
        processor_name: impl Into<String>,
        context: ProcessorContext,
        callable: TaskCallable,
        priority: TaskPriority,
        timeout: Option<Duration>,
        required_resources: Option<&ResourceRequirements>,
    ) -> Result<TaskId, PipelineError> {
        if !self.state.running.load(Ordering::Acquire) {
            return Err(PipelineError::invalid_state("worker pool is not running"));
        }

        let processor_name = processor_name.into();
        let task_id = TaskId::new();
        let timeout = timeout.unwrap_or_else(|| self.config.default_timeout());

        if let (Some(required), Some(monitor)) = (required_resources, &self.resource_monitor) {
            monitor.allocate(task_id, required)?;
        }

        let record = WorkerTask::new(
            task_id,
            &processor_name,
            priority,
            timeout.as_secs_f64(),
            self.clock.now(),
        );
        self.state.active_tasks.write().insert(task_id, record);

        let queued = QueuedTask {
            task_id,
            context: context.clone(),
            callable,
            timeout,
        };
        let queue = if priority == TaskPriority::Critical {
            &self.priority_tx
        } else {
            &self.default_tx
        };

        let enqueued = tokio::time::timeout(SUBMIT_DEADLINE, queue.send(queued)).await;
        let enqueue_failed = !matches!(enqueued, Ok(Ok(())));
        if enqueue_failed {
            self.state.active_tasks.write().remove(&task_id);
            if required_resources.is_some() {
                if let Some(monitor) = &self.resource_monitor {
                    monitor.release(task_id);
                }
            }
            return Err(PipelineError::queue_full(format!(
                "could not enqueue task for processor '{}' within {:.0}s",
                processor_name,
                SUBMIT_DEADLINE.as_secs_f64()
            )));
        }

        self.state.queued_count.fetch_add(1, Ordering::Relaxed);
        self.state.total_submitted.fetch_add(1, Ordering::Relaxed);

        if let Some(tracker) = &self.progress_tracker {
            tracker.start_task(task_id, &processor_name, &context.document_id);
        }
        self.publish(Event::with_payload(event_types::TASK_SUBMITTED, [
            ("task_id", json!(task_id.to_string())),
            ("processor", json!(processor_name.clone())),
            ("priority", json!(format!("{:?}", priority).to_lowercase())),
        ]))
        .await;

        debug!(task_id = %task_id, processor = %processor_name, "submitted task");
        Ok(task_id)
    }

    /// Polls for a task result until the wait deadline.
    ///
    /// # Errors
    ///
    /// - `TaskFailed` when the task finished with an error
    /// - `TaskTimeout` when the deadline passes while the task is active
    /// - `TaskNotFound` for ids the pool does not know
    pub async fn result(
        &self,
        task_id: TaskId,
        wait: Duration,
    ) -> Result<ProcessorResult, PipelineError> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if let Some(task) = self.state.completed.read().map.get(&task_id) {
                return match (&task.error, &task.result) {
                    (Some(err), _) => Err(PipelineError::TaskFailed(err.clone())),
                    (None, Some(result)) => Ok(result.clone()),
                    (None, None) => Err(PipelineError::internal_error(format!(
                        "task {} completed without a result",
                        task_id
                    ))),
                };
            }
            if !self.state.active_tasks.read().contains_key(&task_id) {
                return Err(PipelineError::TaskNotFound(task_id.to_string()));
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(PipelineError::TaskTimeout(format!(
                    "task {} not finished after {:.1}s",
                    task_id,
                    wait.as_secs_f64()
                )));
            }
            tokio::time::sleep(RESULT_POLL).await;
        }
    }

    /// Waits for all active tasks to finish; `true` when they did
    pub async fn wait_for_completion(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.state.active_tasks.read().is_empty() {
                return true;
            }
            tokio::time::sleep(RESULT_POLL).await;
        }
        let remaining = self.state.active_tasks.read().len();
        if remaining > 0 {
            warn!(remaining, "tasks still active after wait deadline");
        }
        remaining == 0
    }

    /// Drains and stops the pool.
    ///
    /// New submissions are rejected immediately; active tasks get half
    /// the timeout to drain, then workers are cancelled with the rest.
    pub async fn stop(&self, timeout: Duration) {
        if !self.state.running.swap(false, Ordering::AcqRel) {
            return;
        }
        info!("stopping worker pool");

        let half = timeout / 2;
        if !self.state.active_tasks.read().is_empty() {
            self.wait_for_completion(half).await;
        }

        let drained: Vec<JoinHandle<()>> = self.worker_handles.lock().await.drain(..).collect();
        let deadline = tokio::time::Instant::now() + half;
        for mut handle in drained {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if tokio::time::timeout(remaining, &mut handle).await.is_err() {
                handle.abort();
                warn!("worker did not stop gracefully, aborted");
            }
        }

        if let Some(monitor) = self.monitor_handle.lock().await.take() {
            monitor.abort();
        }

        let uptime = self.uptime_secs();
        self.publish(Event::with_payload(event_types::WORKER_POOL_STOPPED, [
            ("uptime_seconds", json!(uptime)),
        ]))
        .await;
        info!("worker pool stopped");
    }

    /// Current pool statistics
    pub fn stats(&self) -> PoolStats {
        let worker_stats = self.state.worker_stats.read();
        let active_workers = worker_stats
            .values()
            .filter(|w| w.status == WorkerStatus::Busy)
            .count();
        let idle_workers = worker_stats
            .values()
            .filter(|w| w.status == WorkerStatus::Idle)
            .count();

        let completed = self.state.completed.read();
        let wait_times: Vec<f64> = completed
            .map
            .values()
            .filter_map(|t| t.wait_time_secs())
            .collect();
        let processing_times: Vec<f64> = completed
            .map
            .values()
            .filter_map(|t| t.processing_time_secs())
            .collect();
        let avg = |values: &[f64]| {
            if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            }
        };

        PoolStats {
            total_workers: worker_stats.len(),
            active_workers,
            idle_workers,
            queued_tasks: self.state.queued_count.load(Ordering::Relaxed),
            active_tasks: self.state.active_tasks.read().len(),
            completed_tasks: self.state.total_completed.load(Ordering::Relaxed),
            failed_tasks: self.state.total_failed.load(Ordering::Relaxed),
            total_submitted: self.state.total_submitted.load(Ordering::Relaxed),
            average_wait_time_secs: avg(&wait_times),
            average_processing_time_secs: avg(&processing_times),
            uptime_secs: self.uptime_secs(),
        }
    }

    /// Per-worker statistics snapshot
    pub fn worker_stats(&self) -> HashMap<String, WorkerState> {
        self.state.worker_stats.read().clone()
    }

    fn uptime_secs(&self) -> f64 {
        self.state
            .started_at
            .lock()
            .map(|started| (self.clock.now() - started).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0)
    }

    async fn publish(&self, event: Event) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event).await;
        }
    }

    async fn poll_queue(
        queue: &tokio::sync::Mutex<mpsc::Receiver<QueuedTask>>,
        wait: Duration,
    ) -> Option<QueuedTask> {
        let mut receiver = queue.lock().await;
        tokio::time::timeout(wait, receiver.recv()).await.ok().flatten()
    }

    #[allow(clippy::too_many_arguments)]
    async fn worker_loop(
        worker_id: String,
        state: Arc<PoolState>,
        priority_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<QueuedTask>>>,
        default_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<QueuedTask>>>,
        blocking_permits: Arc<Semaphore>,
        event_bus: Option<Arc<EventBus>>,
        resource_monitor: Option<Arc<ResourceMonitor>>,
        progress_tracker: Option<Arc<ProgressTracker>>,
        clock: Arc<dyn Clock>,
    ) {
        info!(worker = %worker_id, "worker started");
        while state.running.load(Ordering::Acquire) {
            Self::set_worker_status(&state, &worker_id, WorkerStatus::Idle, None, clock.now());

            let task = match Self::poll_queue(&priority_rx, PRIORITY_POLL).await {
                Some(task) => Some(task),
                None => Self::poll_queue(&default_rx, DEFAULT_POLL).await,
            };

            let Some(task) = task else { continue };
            Self::process_task(
                &worker_id,
                task,
                &state,
                &blocking_permits,
                &event_bus,
                &resource_monitor,
                &progress_tracker,
                &clock,
            )
            .await;
        }
        Self::set_worker_status(&state, &worker_id, WorkerStatus::Stopped, None, clock.now());
        info!(worker = %worker_id, "worker stopped");
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_task(
        worker_id: &str,
        queued: QueuedTask,
        state: &Arc<PoolState>,
        blocking_permits: &Arc<Semaphore>,
        event_bus: &Option<Arc<EventBus>>,
        resource_monitor: &Option<Arc<ResourceMonitor>>,
        progress_tracker: &Option<Arc<ProgressTracker>>,
        clock: &Arc<dyn Clock>,
    ) {
        let task_id = queued.task_id;
        state.queued_count.fetch_sub(1, Ordering::Relaxed);

        let started_at = clock.now();
        let processor_name = {
            let mut active = state.active_tasks.write();
            match active.get_mut(&task_id) {
                Some(record) => {
                    record.started_at = Some(started_at);
                    record.worker_id = Some(worker_id.to_string());
                    record.processor_name.clone()
                }
                None => {
                    // Submission was rolled back after enqueue; nothing to run
                    warn!(task_id = %task_id, "dequeued task without an active record");
                    return;
                }
            }
        };
        Self::set_worker_status(state, worker_id, WorkerStatus::Busy, Some(task_id), started_at);
        if let Some(tracker) = progress_tracker {
            tracker.mark_started(task_id);
        }
        debug!(worker = worker_id, task_id = %task_id, "processing task");

        let outcome = match queued.callable {
            TaskCallable::Async(callable) => {
                tokio::time::timeout(queued.timeout, callable(queued.context))
                    .await
                    .map_err(|_| ())
            }
            TaskCallable::Blocking(callable) => match blocking_permits.clone().acquire_owned().await {
                Ok(permit) => {
                    let context = queued.context;
                    let join = tokio::task::spawn_blocking(move || {
                        let _permit = permit;
                        callable(context)
                    });
                    match tokio::time::timeout(queued.timeout, join).await {
                        Ok(Ok(result)) => Ok(result),
                        Ok(Err(join_err)) => Ok(Err(PipelineError::internal_error(format!(
                            "blocking task panicked: {}",
                            join_err
                        )))),
                        Err(_) => Err(()),
                    }
                }
                Err(_) => Ok(Err(PipelineError::invalid_state(
                    "blocking worker budget is closed",
                ))),
            },
        };

        let completed_at = clock.now();
        let (result, error) = match outcome {
            Ok(Ok(result)) => (Some(result), None),
            Ok(Err(err)) => (None, Some(err.to_string())),
            Err(()) => (
                None,
                Some(format!(
                    "task timed out after {:.1}s",
                    queued.timeout.as_secs_f64()
                )),
            ),
        };
        let success = error.is_none();

        if let Some(monitor) = resource_monitor {
            monitor.release(task_id);
        }

        let record = {
            let mut active = state.active_tasks.write();
            let mut record = active.remove(&task_id).unwrap_or_else(|| {
                WorkerTask::new(task_id, &processor_name, TaskPriority::Normal, 0.0, started_at)
            });
            record.completed_at = Some(completed_at);
            record.result = result;
            record.error = error.clone();
            record
        };
        let processing_time = record.processing_time_secs().unwrap_or(0.0);
        state.completed.write().insert(record);

        {
            let mut workers = state.worker_stats.write();
            if let Some(stats) = workers.get_mut(worker_id) {
                if success {
                    stats.tasks_completed += 1;
                } else {
                    stats.tasks_failed += 1;
                }
                stats.total_processing_time_secs += processing_time;
                stats.current_task = None;
                stats.status = WorkerStatus::Idle;
                stats.last_heartbeat = completed_at;
            }
        }
        if success {
            state.total_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            state.total_failed.fetch_add(1, Ordering::Relaxed);
            warn!(worker = worker_id, task_id = %task_id, error = error.as_deref().unwrap_or(""), "task failed");
        }

        if let Some(tracker) = progress_tracker {
            tracker.complete_task(task_id, success, error.clone());
        }
        if let Some(bus) = event_bus {
            let event_type = if success {
                event_types::TASK_COMPLETED
            } else {
                event_types::TASK_FAILED
            };
            bus.publish(Event::with_payload(event_type, [
                ("task_id", json!(task_id.to_string())),
                ("processor", json!(processor_name)),
                ("duration", json!(processing_time)),
                ("error", json!(error)),
            ]))
            .await;
        }
    }

    fn set_worker_status(
        state: &Arc<PoolState>,
        worker_id: &str,
        status: WorkerStatus,
        current_task: Option<TaskId>,
        now: DateTime<Utc>,
    ) {
        let mut workers = state.worker_stats.write();
        if let Some(stats) = workers.get_mut(worker_id) {
            stats.status = status;
            stats.current_task = current_task;
            stats.last_heartbeat = now;
        }
    }

    async fn monitor_loop(
        state: Arc<PoolState>,
        event_bus: Option<Arc<EventBus>>,
        resource_monitor: Option<Arc<ResourceMonitor>>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) {
        let stale_after = interval * 3;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        while state.running.load(Ordering::Acquire) {
            ticker.tick().await;
            let now = clock.now();

            let mut stale = Vec::new();
            {
                let mut workers = state.worker_stats.write();
                for stats in workers.values_mut() {
                    let silent = (now - stats.last_heartbeat).num_milliseconds();
                    if silent > stale_after.as_millis() as i64
                        && !matches!(stats.status, WorkerStatus::Stopped | WorkerStatus::Error)
                    {
                        stats.status = WorkerStatus::Error;
                        stale.push(stats.worker_id.clone());
                    }
                }
            }
            for worker_id in stale {
                warn!(worker = %worker_id, "worker appears stale, marking errored");
            }

            let queued = state.queued_count.load(Ordering::Relaxed);
            if let Some(monitor) = &resource_monitor {
                monitor.set_queued_tasks(queued);
            }

            if let Some(bus) = &event_bus {
                let worker_payload: HashMap<String, serde_json::Value> = {
                    let workers = state.worker_stats.read();
                    workers
                        .values()
                        .map(|w| {
                            (
                                w.worker_id.clone(),
                                json!({
                                    "status": w.status,
                                    "tasks_completed": w.tasks_completed,
                                    "tasks_failed": w.tasks_failed,
                                }),
                            )
                        })
                        .collect()
                };
                let active_tasks = state.active_tasks.read().len();
                bus.publish(Event::with_payload(event_types::WORKER_POOL_HEARTBEAT, [
                    ("queued_tasks", json!(queued)),
                    ("active_tasks", json!(active_tasks)),
                    ("completed_tasks", json!(state.total_completed.load(Ordering::Relaxed))),
                    ("failed_tasks", json!(state.total_failed.load(Ordering::Relaxed))),
                    ("workers", json!(worker_payload)),
                ]))
                .await;
            }
        }
    }
}

/// Builder wiring optional collaborators into the pool
pub struct WorkerPoolBuilder {
    config: WorkerConfig,
    event_bus: Option<Arc<EventBus>>,
    resource_monitor: Option<Arc<ResourceMonitor>>,
    progress_tracker: Option<Arc<ProgressTracker>>,
    clock: Arc<dyn Clock>,
}

impl WorkerPoolBuilder {
    pub fn event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn resource_monitor(mut self, monitor: Arc<ResourceMonitor>) -> Self {
        self.resource_monitor = Some(monitor);
        self
    }

    pub fn progress_tracker(mut self, tracker: Arc<ProgressTracker>) -> Self {
        self.progress_tracker = Some(tracker);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> WorkerPool {
        let (priority_tx, priority_rx) = mpsc::channel(self.config.priority_queue_size);
        let (default_tx, default_rx) = mpsc::channel(self.config.max_queue_size);
        let blocking_budget = (self.config.thread_workers + self.config.process_workers).max(1);

        WorkerPool {
            blocking_permits: Arc::new(Semaphore::new(blocking_budget)),
            priority_tx,
            priority_rx: Arc::new(tokio::sync::Mutex::new(priority_rx)),
            default_tx,
            default_rx: Arc::new(tokio::sync::Mutex::new(default_rx)),
            state: Arc::new(PoolState {
                running: AtomicBool::new(false),
                started_at: Mutex::new(None),
                active_tasks: RwLock::new(HashMap::new()),
                completed: RwLock::new(CompletedTasks {
                    map: HashMap::new(),
                    order: VecDeque::new(),
                }),
                worker_stats: RwLock::new(HashMap::new()),
                queued_count: AtomicUsize::new(0),
                total_submitted: AtomicU64::new(0),
                total_completed: AtomicU64::new(0),
                total_failed: AtomicU64::new(0),
            }),
            worker_handles: tokio::sync::Mutex::new(Vec::new()),
            monitor_handle: tokio::sync::Mutex::new(None),
            config: self.config,
            event_bus: self.event_bus,
            resource_monitor: self.resource_monitor,
            progress_tracker: self.progress_tracker,
            clock: self.clock,
        }
    }
}
