// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Processing System Facade
//!
//! Wires the engine's subsystems into one embeddable unit: event bus,
//! state store, resource monitor, processor registry, progress tracker,
//! worker pool, and pipeline manager. Embedders that want the pieces
//! individually can skip this facade and construct them directly.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{info, warn};

use docflow_domain::{
    event_types, Event, PipelineConfig, PipelineContext, PipelineError, ResourceLimits, RunId,
    StateStore, SystemMetricsProvider, WorkerConfig,
};

use crate::events::EventBus;
use crate::pipeline::{ExecuteOptions, PipelineManager, PipelineRunStatus};
use crate::processors::ProcessorRegistry;
use crate::resources::{ResourceMonitor, SysinfoMetricsProvider};
use crate::state::InMemoryStateStore;
use crate::workers::{PoolStats, ProgressTracker, WorkerPool};

/// Configuration for the whole processing system
#[derive(Debug, Clone)]
pub struct ProcessingSystemConfig {
    pub pipeline_config: PipelineConfig,
    pub worker_config: WorkerConfig,
    pub resource_limits: ResourceLimits,
}

/// Aggregate health view from `ProcessingSystem::status`
#[derive(Debug, Clone)]
pub struct SystemStatus {
    pub running: bool,
    pub store_healthy: bool,
    pub pool: PoolStats,
    pub active_allocations: usize,
}

/// One-stop integration of the docflow subsystems
pub struct ProcessingSystem {
    event_bus: Arc<EventBus>,
    state_store: Arc<dyn StateStore>,
    resource_monitor: Arc<ResourceMonitor>,
    registry: Arc<ProcessorRegistry>,
    progress_tracker: Arc<ProgressTracker>,
    worker_pool: Arc<WorkerPool>,
    pipeline_manager: Arc<PipelineManager>,
    running: AtomicBool,
}

impl ProcessingSystem {
    /// Builds the system with the default in-memory store and the
    /// `sysinfo` metrics provider
    pub fn new(config: ProcessingSystemConfig) -> Result<Self, PipelineError> {
        Self::with_collaborators(
            config,
            Arc::new(InMemoryStateStore::new()),
            Arc::new(SysinfoMetricsProvider::new()),
            Arc::new(ProcessorRegistry::new()),
        )
    }

    /// Builds the system with injected collaborators
    pub fn with_collaborators(
        config: ProcessingSystemConfig,
        state_store: Arc<dyn StateStore>,
        metrics_provider: Arc<dyn SystemMetricsProvider>,
        registry: Arc<ProcessorRegistry>,
    ) -> Result<Self, PipelineError> {
        config.worker_config.validate()?;

        let event_bus = Arc::new(EventBus::new());
        let resource_monitor = Arc::new(ResourceMonitor::new(
            config.resource_limits.clone(),
            metrics_provider,
        ));
        let progress_tracker = Arc::new(ProgressTracker::new());

        let worker_pool = Arc::new(
            WorkerPool::builder(config.worker_config.clone())
                .event_bus(Arc::clone(&event_bus))
                .resource_monitor(Arc::clone(&resource_monitor))
                .progress_tracker(Arc::clone(&progress_tracker))
                .build(),
        );

        let pipeline_manager = Arc::new(
            PipelineManager::new(
                config.pipeline_config,
                Arc::clone(&event_bus),
                Arc::clone(&state_store),
                Arc::clone(&registry),
            )?
            .with_resource_monitor(Arc::clone(&resource_monitor))
            .with_worker_pool(Arc::clone(&worker_pool)),
        );

        Ok(Self {
            event_bus,
            state_store,
            resource_monitor,
            registry,
            progress_tracker,
            worker_pool,
            pipeline_manager,
            running: AtomicBool::new(false),
        })
    }

    /// Starts bus, monitor, and pool, then emits `system.started`
    pub async fn initialize(&self) -> Result<(), PipelineError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("initializing processing system");

        self.event_bus.start().await?;
        self.resource_monitor.start().await;
        self.worker_pool.start().await;

        self.event_bus
            .publish(Event::with_payload(event_types::SYSTEM_STARTED, [
                ("store_healthy", json!(self.state_store.is_healthy().await)),
            ]))
            .await;
        info!("processing system initialized");
        Ok(())
    }

    /// Runs the configured pipeline for one document
    pub async fn process_document(
        &self,
        document_id: impl Into<String>,
        metadata: HashMap<String, Value>,
    ) -> Result<PipelineContext, PipelineError> {
        if !self.running.load(Ordering::Acquire) {
            return Err(PipelineError::invalid_state(
                "processing system is not initialized",
            ));
        }
        let mut options = ExecuteOptions::for_document(document_id);
        options.metadata = metadata;
        self.pipeline_manager.execute(options).await
    }

    /// Status of one pipeline run
    pub async fn run_status(&self, run_id: RunId) -> Result<PipelineRunStatus, PipelineError> {
        self.pipeline_manager.status(run_id).await
    }

    /// Aggregate health of the system
    pub async fn status(&self) -> SystemStatus {
        SystemStatus {
            running: self.running.load(Ordering::Acquire),
            store_healthy: self.state_store.is_healthy().await,
            pool: self.worker_pool.stats(),
            active_allocations: self.resource_monitor.stats().active_allocations,
        }
    }

    /// Stops components in reverse start order
    pub async fn shutdown(&self, timeout: Duration) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        info!("shutting down processing system");

        if !self.worker_pool.wait_for_completion(timeout / 2).await {
            warn!("shutting down with tasks still active");
        }
        self.worker_pool.stop(timeout / 2).await;
        self.pipeline_manager.cleanup().await;
        self.resource_monitor.stop().await;
        self.event_bus.stop().await;
        info!("processing system shut down");
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn registry(&self) -> &Arc<ProcessorRegistry> {
        &self.registry
    }

    pub fn worker_pool(&self) -> &Arc<WorkerPool> {
        &self.worker_pool
    }

    pub fn resource_monitor(&self) -> &Arc<ResourceMonitor> {
        &self.resource_monitor
    }

    pub fn progress_tracker(&self) -> &Arc<ProgressTracker> {
        &self.progress_tracker
    }

    pub fn pipeline_manager(&self) -> &Arc<PipelineManager> {
        &self.pipeline_manager
    }
}
