// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Event Bus
//!
//! In-process publish/subscribe with a middleware chain, a single
//! draining task, and per-event metrics.
//!
//! ## Delivery model
//!
//! `publish` runs the middleware chain inline, then enqueues the event.
//! One background task drains the queue; for each event it snapshots the
//! current handler set for the event type and invokes every handler in
//! turn. A handler failure is logged and counted but never stops delivery
//! to the remaining handlers. Delivery to all handlers completes before
//! the next event is taken, which gives FIFO ordering per event type.
//!
//! Subscribe and unsubscribe are safe during publishing; a handler-set
//! change takes effect no later than the next drain step.
//!
//! ## Shutdown
//!
//! `stop` enqueues a sentinel, waits for the drainer to observe it, then
//! cancels the metrics snapshot task. Publishes already queued are
//! delivered; publishes after stop are no-ops with a logged error.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use chrono::Utc;
use docflow_domain::{Event, PipelineError};

use crate::events::metrics::{EventBusMetrics, PerformanceMonitor};
use crate::events::middleware::EventMiddleware;

/// Identifier returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), PipelineError>> + Send>>;

/// A subscribed handler; may be synchronous by returning a ready future
pub type EventHandler = Arc<dyn Fn(Event) -> HandlerFuture + Send + Sync>;

/// Wraps an async closure into an [`EventHandler`]
pub fn event_handler<F, Fut>(f: F) -> EventHandler
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), PipelineError>> + Send + 'static,
{
    Arc::new(move |event| Box::pin(f(event)))
}

struct HandlerEntry {
    id: SubscriptionId,
    name: String,
    handler: EventHandler,
}

enum QueueItem {
    Event(Event),
    Shutdown,
}

/// In-process publish/subscribe bus
pub struct EventBus {
    handlers: Arc<RwLock<HashMap<String, Vec<HandlerEntry>>>>,
    middlewares: RwLock<Vec<Arc<dyn EventMiddleware>>>,
    sender: mpsc::UnboundedSender<QueueItem>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<QueueItem>>>,
    queue_depth: Arc<AtomicUsize>,
    monitor: Arc<Mutex<PerformanceMonitor>>,
    running: AtomicBool,
    stopped: AtomicBool,
    next_subscription: AtomicU64,
    drain_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    snapshot_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    snapshot_interval: Duration,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_snapshot_interval(Duration::from_secs(60))
    }

    /// Bus with a custom metrics snapshot cadence (tests use short ones)
    pub fn with_snapshot_interval(snapshot_interval: Duration) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
            middlewares: RwLock::new(Vec::new()),
            sender,
            receiver: Mutex::new(Some(receiver)),
            queue_depth: Arc::new(AtomicUsize::new(0)),
            monitor: Arc::new(Mutex::new(PerformanceMonitor::new(
                snapshot_interval.as_secs().max(1),
            ))),
            running: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            next_subscription: AtomicU64::new(0),
            drain_handle: tokio::sync::Mutex::new(None),
            snapshot_handle: tokio::sync::Mutex::new(None),
            snapshot_interval,
        }
    }

    /// Registers a handler for an event type with a generated name
    pub fn subscribe(&self, event_type: impl Into<String>, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscribe_entry(event_type.into(), format!("handler-{}", id.0), handler, id)
    }

    /// Registers a named handler; the name keys its metrics
    pub fn subscribe_named(
        &self,
        event_type: impl Into<String>,
        name: impl Into<String>,
        handler: EventHandler,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscribe_entry(event_type.into(), name.into(), handler, id)
    }

    fn subscribe_entry(
        &self,
        event_type: String,
        name: String,
        handler: EventHandler,
        id: SubscriptionId,
    ) -> SubscriptionId {
        self.handlers
            .write()
            .entry(event_type)
            .or_default()
            .push(HandlerEntry { id, name, handler });
        id
    }

    /// Removes a handler; unknown ids are ignored
    pub fn unsubscribe(&self, event_type: &str, id: SubscriptionId) {
        let mut handlers = self.handlers.write();
        if let Some(entries) = handlers.get_mut(event_type) {
            entries.retain(|e| e.id != id);
            if entries.is_empty() {
                handlers.remove(event_type);
            }
        }
    }

    /// Appends a middleware to the publish-side chain
    pub fn add_middleware(&self, middleware: Arc<dyn EventMiddleware>) {
        self.middlewares.write().push(middleware);
    }

    /// Runs the middleware chain and enqueues the event.
    ///
    /// A middleware returning `None` drops the event silently; a
    /// middleware error drops it and counts a failure. Both are recorded
    /// against the original event type. Publishing after `stop` is a
    /// no-op with a logged error.
    pub async fn publish(&self, event: Event) {
        if self.stopped.load(Ordering::Acquire) {
            error!(event_type = %event.event_type, "publish after stop ignored");
            return;
        }

        let started = Instant::now();
        let original_type = event.event_type.clone();
        let occurred_at = Utc::now();

        let chain: Vec<Arc<dyn EventMiddleware>> = self.middlewares.read().clone();
        let mut current = event;
        for middleware in chain {
            match middleware.process(current).await {
                Ok(Some(next)) => current = next,
                Ok(None) => {
                    debug!(event_type = %original_type, "event dropped by middleware");
                    self.monitor.lock().record_event_processing(
                        &original_type,
                        started.elapsed().as_secs_f64(),
                        true,
                        occurred_at,
                    );
                    return;
                }
                Err(err) => {
                    error!(
                        middleware = middleware.name(),
                        event_type = %original_type,
                        error = %err,
                        "middleware failed, dropping event"
                    );
                    self.monitor.lock().record_event_processing(
                        &original_type,
                        started.elapsed().as_secs_f64(),
                        false,
                        occurred_at,
                    );
                    return;
                }
            }
        }

        self.queue_depth.fetch_add(1, Ordering::Relaxed);
        if self.sender.send(QueueItem::Event(current)).is_err() {
            self.queue_depth.fetch_sub(1, Ordering::Relaxed);
            error!(event_type = %original_type, "event queue closed, dropping event");
            self.monitor.lock().record_event_processing(
                &original_type,
                started.elapsed().as_secs_f64(),
                false,
                occurred_at,
            );
            return;
        }

        self.monitor.lock().record_event_processing(
            &original_type,
            started.elapsed().as_secs_f64(),
            true,
            occurred_at,
        );
    }

    /// Starts the drain and snapshot tasks; calling again is a no-op
    pub async fn start(&self) -> Result<(), PipelineError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let receiver = self
            .receiver
            .lock()
            .take()
            .ok_or_else(|| PipelineError::invalid_state("event bus was already stopped"))?;

        let handlers = Arc::clone(&self.handlers);
        let monitor = Arc::clone(&self.monitor);
        let queue_depth = Arc::clone(&self.queue_depth);
        let drain = tokio::spawn(Self::drain_loop(receiver, handlers, monitor, queue_depth));
        *self.drain_handle.lock().await = Some(drain);

        let monitor = Arc::clone(&self.monitor);
        let queue_depth = Arc::clone(&self.queue_depth);
        let interval = self.snapshot_interval;
        let snapshot = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                monitor
                    .lock()
                    .record_snapshot(queue_depth.load(Ordering::Relaxed), Utc::now());
            }
        });
        *self.snapshot_handle.lock().await = Some(snapshot);

        info!("event bus started");
        Ok(())
    }

    async fn drain_loop(
        mut receiver: mpsc::UnboundedReceiver<QueueItem>,
        handlers: Arc<RwLock<HashMap<String, Vec<HandlerEntry>>>>,
        monitor: Arc<Mutex<PerformanceMonitor>>,
        queue_depth: Arc<AtomicUsize>,
    ) {
        while let Some(item) = receiver.recv().await {
            let event = match item {
                QueueItem::Shutdown => break,
                QueueItem::Event(event) => event,
            };
            queue_depth.fetch_sub(1, Ordering::Relaxed);

            let snapshot: Vec<(String, EventHandler)> = handlers
                .read()
                .get(&event.event_type)
                .map(|entries| {
                    entries
                        .iter()
                        .map(|e| (e.name.clone(), Arc::clone(&e.handler)))
                        .collect()
                })
                .unwrap_or_default();

            if snapshot.is_empty() {
                warn!(event_type = %event.event_type, "no handlers for event type");
                continue;
            }

            for (name, handler) in snapshot {
                let started = Instant::now();
                let result = handler(event.clone()).await;
                let elapsed = started.elapsed().as_secs_f64();
                if let Err(err) = &result {
                    error!(handler = %name, event_type = %event.event_type, error = %err, "event handler failed");
                }
                monitor
                    .lock()
                    .record_handler_execution(&name, elapsed, result.is_ok());
            }
        }
        debug!("event bus drain loop exited");
    }

    /// Drains in-flight events, then shuts the bus down
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.stopped.store(true, Ordering::Release);

        let _ = self.sender.send(QueueItem::Shutdown);
        if let Some(handle) = self.drain_handle.lock().await.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "event bus drain task ended abnormally");
            }
        }
        if let Some(handle) = self.snapshot_handle.lock().await.take() {
            handle.abort();
        }
        info!("event bus stopped");
    }

    /// Assembled per-type, per-handler, and aggregate metrics
    pub fn metrics(&self) -> EventBusMetrics {
        let monitor = self.monitor.lock();
        EventBusMetrics {
            events: monitor.event_metrics(),
            handlers: monitor.handler_metrics(),
            totals: monitor.total_metrics(),
            queue_size: self.queue_depth.load(Ordering::Relaxed),
        }
    }

    /// Number of handler registrations for an event type
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.handlers
            .read()
            .get(event_type)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
