// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Resource Monitor
//!
//! Admission control against current system load plus outstanding
//! reservations. A sampling loop records a [`ResourceSnapshot`] every
//! `check_interval` (default one second) into a bounded ring buffer;
//! admission answers from the latest sample and the allocation table.
//!
//! ## Admission rule
//!
//! A requirement is admitted when, for every resource it declares,
//!
//! ```text
//! current_usage + sum(allocations) + required <= configured_limit
//! ```
//!
//! CPU is accounted in fractional cores (sampled percent / 100), memory
//! in megabytes. GPU is symbolic: a GPU-requiring stage is rejected
//! outright when the limits declare no GPU. Warning thresholds are logged
//! by the sampling loop and never block admission.
//!
//! `check_availability` and `allocate` evaluate under the same lock, so a
//! passing check cannot be invalidated by a concurrent allocation.
//! Allocations are in-memory only; they do not survive a process restart,
//! which is acceptable because interrupted pipelines resume from their
//! last checkpoint.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use docflow_domain::{
    Clock, PipelineError, ResourceLimits, ResourceRequirements, ResourceSnapshot, ResourceType,
    SystemClock, SystemMetricsProvider, SystemSample, TaskId,
};

const DEFAULT_HISTORY_SIZE: usize = 300;
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Averaged usage over a trailing window, from `ResourceMonitor::average`
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceAverage {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_mb: f64,
    pub disk_io_mbps: f64,
    pub network_io_mbps: f64,
    pub samples: usize,
}

/// Aggregate view returned by `ResourceMonitor::stats`
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceMonitorStats {
    pub current_usage: HashMap<ResourceType, f64>,
    pub active_allocations: usize,
    pub allocated_cpu_cores: f64,
    pub allocated_memory_mb: u64,
    pub history_len: usize,
}

struct MonitorState {
    /// Cpu in fractional cores, Memory in MB, Disk/Network in MB/s
    current_usage: HashMap<ResourceType, f64>,
    allocations: HashMap<TaskId, ResourceRequirements>,
    history: VecDeque<ResourceSnapshot>,
    last_sample: Option<SystemSample>,
}

impl MonitorState {
    fn allocated_total(&self, resource: ResourceType) -> f64 {
        self.allocations
            .values()
            .map(|req| match resource {
                ResourceType::Cpu => req.cpu_cores,
                ResourceType::Memory => req.memory_mb as f64,
                ResourceType::Gpu => req.gpu_memory_mb.unwrap_or(0) as f64,
                _ => 0.0,
            })
            .sum()
    }

    fn admission_check(
        &self,
        required: &ResourceRequirements,
        limits: &ResourceLimits,
    ) -> Result<(), String> {
        let cpu_in_use =
            self.current_usage.get(&ResourceType::Cpu).copied().unwrap_or(0.0)
                + self.allocated_total(ResourceType::Cpu);
        if cpu_in_use + required.cpu_cores > limits.max_cpu_cores {
            return Err(format!(
                "insufficient cpu: {:.2} + {:.2} cores > {:.2}",
                cpu_in_use, required.cpu_cores, limits.max_cpu_cores
            ));
        }

        let memory_in_use =
            self.current_usage.get(&ResourceType::Memory).copied().unwrap_or(0.0)
                + self.allocated_total(ResourceType::Memory);
        if memory_in_use + required.memory_mb as f64 > limits.max_memory_mb as f64 {
            return Err(format!(
                "insufficient memory: {:.0} + {} MB > {} MB",
                memory_in_use, required.memory_mb, limits.max_memory_mb
            ));
        }

        if required.gpu_required {
            let gpu_limit = match limits.gpu_memory_mb {
                Some(limit) => limit as f64,
                None => return Err("gpu required but no gpu is accessible".to_string()),
            };
            let gpu_in_use = self.allocated_total(ResourceType::Gpu);
            let gpu_needed = required.gpu_memory_mb.unwrap_or(0) as f64;
            if gpu_in_use + gpu_needed > gpu_limit {
                return Err(format!(
                    "insufficient gpu memory: {:.0} + {:.0} MB > {:.0} MB",
                    gpu_in_use, gpu_needed, gpu_limit
                ));
            }
        }

        Ok(())
    }
}

/// Samples system resources and admission-controls task reservations
pub struct ResourceMonitor {
    limits: ResourceLimits,
    provider: Arc<dyn SystemMetricsProvider>,
    clock: Arc<dyn Clock>,
    check_interval: Duration,
    history_size: usize,
    state: Arc<Mutex<MonitorState>>,
    queued_tasks: Arc<AtomicUsize>,
    running: Arc<AtomicBool>,
    monitor_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ResourceMonitor {
    pub fn new(limits: ResourceLimits, provider: Arc<dyn SystemMetricsProvider>) -> Self {
        Self::with_clock(limits, provider, Arc::new(SystemClock), Duration::from_secs(1))
    }

    pub fn with_clock(
        limits: ResourceLimits,
        provider: Arc<dyn SystemMetricsProvider>,
        clock: Arc<dyn Clock>,
        check_interval: Duration,
    ) -> Self {
        Self {
            limits,
            provider,
            clock,
            check_interval,
            history_size: DEFAULT_HISTORY_SIZE,
            state: Arc::new(Mutex::new(MonitorState {
                current_usage: HashMap::new(),
                allocations: HashMap::new(),
                history: VecDeque::new(),
                last_sample: None,
            })),
            queued_tasks: Arc::new(AtomicUsize::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            monitor_handle: tokio::sync::Mutex::new(None),
        }
    }

    /// Starts the sampling loop; calling again is a no-op
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let state = Arc::clone(&self.state);
        let provider = Arc::clone(&self.provider);
        let clock = Arc::clone(&self.clock);
        let running = Arc::clone(&self.running);
        let queued_tasks = Arc::clone(&self.queued_tasks);
        let limits = self.limits.clone();
        let interval = self.check_interval;
        let history_size = self.history_size;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            while running.load(Ordering::Acquire) {
                ticker.tick().await;
                let sample = provider.sample();
                let queued = queued_tasks.load(Ordering::Relaxed);
                let snapshot = {
                    let mut state = state.lock();
                    let snapshot = Self::build_snapshot(
                        &mut state,
                        sample,
                        clock.now(),
                        interval.as_secs_f64(),
                        queued,
                    );
                    state.history.push_back(snapshot.clone());
                    while state.history.len() > history_size {
                        state.history.pop_front();
                    }
                    snapshot
                };
                Self::log_warnings(&snapshot, &limits);
            }
            debug!("resource monitor loop exited");
        });
        *self.monitor_handle.lock().await = Some(handle);
        info!(interval_secs = self.check_interval.as_secs_f64(), "resource monitoring started");
    }

    /// Stops the sampling loop, aborting it after a short grace period
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(mut handle) = self.monitor_handle.lock().await.take() {
            if tokio::time::timeout(STOP_GRACE, &mut handle).await.is_err() {
                handle.abort();
                warn!("resource monitor loop did not stop in time");
            }
        }
        info!("resource monitoring stopped");
    }

    fn build_snapshot(
        state: &mut MonitorState,
        sample: SystemSample,
        now: chrono::DateTime<chrono::Utc>,
        interval_secs: f64,
        queued_tasks: usize,
    ) -> ResourceSnapshot {
        const MB: f64 = 1024.0 * 1024.0;
        let rate = |current: u64, previous: u64| {
            if interval_secs <= 0.0 {
                0.0
            } else {
                current.saturating_sub(previous) as f64 / MB / interval_secs
            }
        };

        let (read_rate, write_rate, sent_rate, recv_rate) = match &state.last_sample {
            Some(last) => (
                rate(sample.disk_read_bytes, last.disk_read_bytes),
                rate(sample.disk_write_bytes, last.disk_write_bytes),
                rate(sample.net_sent_bytes, last.net_sent_bytes),
                rate(sample.net_recv_bytes, last.net_recv_bytes),
            ),
            None => (0.0, 0.0, 0.0, 0.0),
        };

        state.current_usage.insert(ResourceType::Cpu, sample.cpu_percent / 100.0);
        state.current_usage.insert(ResourceType::Memory, sample.memory_mb);
        state.current_usage.insert(ResourceType::DiskIo, read_rate + write_rate);
        state
            .current_usage
            .insert(ResourceType::NetworkIo, sent_rate + recv_rate);

        let active_tasks = state.allocations.len();
        state.last_sample = Some(sample);

        ResourceSnapshot {
            timestamp: now,
            cpu_percent: sample.cpu_percent,
            memory_percent: sample.memory_percent,
            memory_mb: sample.memory_mb,
            disk_io_read_mb: read_rate,
            disk_io_write_mb: write_rate,
            network_io_sent_mb: sent_rate,
            network_io_recv_mb: recv_rate,
            active_tasks,
            queued_tasks,
        }
    }

    fn log_warnings(snapshot: &ResourceSnapshot, limits: &ResourceLimits) {
        if snapshot.cpu_percent > limits.warning_threshold_for(ResourceType::Cpu) {
            warn!(
                cpu_percent = snapshot.cpu_percent,
                threshold = limits.warning_cpu_percent,
                "cpu usage high"
            );
        }
        if snapshot.memory_percent > limits.warning_threshold_for(ResourceType::Memory) {
            warn!(
                memory_percent = snapshot.memory_percent,
                threshold = limits.warning_memory_percent,
                "memory usage high"
            );
        }
        let disk_total = snapshot.disk_io_read_mb + snapshot.disk_io_write_mb;
        if disk_total > limits.warning_threshold_for(ResourceType::DiskIo) {
            warn!(disk_io_mbps = disk_total, "disk io high");
        }
        let net_total = snapshot.network_io_sent_mb + snapshot.network_io_recv_mb;
        if net_total > limits.warning_threshold_for(ResourceType::NetworkIo) {
            warn!(network_io_mbps = net_total, "network io high");
        }
    }

    /// Checks whether the requirement fits within limits right now.
    ///
    /// Returns `(true, None)` when admissible, `(false, reason)` otherwise.
    pub fn check_availability(&self, required: &ResourceRequirements) -> (bool, Option<String>) {
        match self.state.lock().admission_check(required, &self.limits) {
            Ok(()) => (true, None),
            Err(reason) => (false, Some(reason)),
        }
    }

    /// Atomically re-checks availability and records the reservation
    pub fn allocate(
        &self,
        task_id: TaskId,
        required: &ResourceRequirements,
    ) -> Result<(), PipelineError> {
        let mut state = self.state.lock();
        state
            .admission_check(required, &self.limits)
            .map_err(PipelineError::resource_exhausted)?;
        state.allocations.insert(task_id, required.clone());
        debug!(task_id = %task_id, cpu = required.cpu_cores, memory_mb = required.memory_mb, "allocated resources");
        Ok(())
    }

    /// Removes a reservation; releasing twice has the same effect as once
    pub fn release(&self, task_id: TaskId) {
        if self.state.lock().allocations.remove(&task_id).is_some() {
            debug!(task_id = %task_id, "released resources");
        }
    }

    /// Latest sampled usage per resource type
    pub fn current_usage(&self) -> HashMap<ResourceType, f64> {
        self.state.lock().current_usage.clone()
    }

    /// Task ids currently holding reservations
    pub fn allocations(&self) -> HashMap<TaskId, ResourceRequirements> {
        self.state.lock().allocations.clone()
    }

    /// Lets the worker pool feed its queue depth into snapshots
    pub fn set_queued_tasks(&self, queued: usize) {
        self.queued_tasks.store(queued, Ordering::Relaxed);
    }

    /// Snapshots from the trailing window of the given length
    pub fn history(&self, minutes: i64) -> Vec<ResourceSnapshot> {
        let cutoff = self.clock.now() - chrono::Duration::minutes(minutes);
        self.state
            .lock()
            .history
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    /// Average usage over the trailing window; `None` without samples
    pub fn average(&self, minutes: i64) -> Option<ResourceAverage> {
        let window = self.history(minutes);
        if window.is_empty() {
            return None;
        }
        let n = window.len() as f64;
        Some(ResourceAverage {
            cpu_percent: window.iter().map(|s| s.cpu_percent).sum::<f64>() / n,
            memory_percent: window.iter().map(|s| s.memory_percent).sum::<f64>() / n,
            memory_mb: window.iter().map(|s| s.memory_mb).sum::<f64>() / n,
            disk_io_mbps: window
                .iter()
                .map(|s| s.disk_io_read_mb + s.disk_io_write_mb)
                .sum::<f64>()
                / n,
            network_io_mbps: window
                .iter()
                .map(|s| s.network_io_sent_mb + s.network_io_recv_mb)
                .sum::<f64>()
                / n,
            samples: window.len(),
        })
    }

    /// Aggregate monitor statistics
    pub fn stats(&self) -> ResourceMonitorStats {
        let state = self.state.lock();
        ResourceMonitorStats {
            current_usage: state.current_usage.clone(),
            active_allocations: state.allocations.len(),
            allocated_cpu_cores: state.allocated_total(ResourceType::Cpu),
            allocated_memory_mb: state.allocated_total(ResourceType::Memory) as u64,
            history_len: state.history.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_domain::NullMetricsProvider;

    fn monitor() -> ResourceMonitor {
        let limits = ResourceLimits {
            max_cpu_cores: 4.0,
            max_memory_mb: 2048,
            ..ResourceLimits::default()
        };
        ResourceMonitor::new(limits, Arc::new(NullMetricsProvider))
    }

    fn requirements(cpu: f64, memory: u64) -> ResourceRequirements {
        ResourceRequirements::new(cpu, memory, false, None).unwrap()
    }

    #[test]
    fn test_admission_within_limits() {
        let monitor = monitor();
        let (ok, reason) = monitor.check_availability(&requirements(2.0, 1024));
        assert!(ok, "{:?}", reason);
    }

    #[test]
    fn test_allocations_count_against_limits() {
        let monitor = monitor();
        monitor.allocate(TaskId::new(), &requirements(2.0, 1024)).unwrap();
        monitor.allocate(TaskId::new(), &requirements(1.5, 512)).unwrap();

        // 3.5 cores reserved out of 4; one more core does not fit
        let (ok, reason) = monitor.check_availability(&requirements(1.0, 128));
        assert!(!ok);
        assert!(reason.unwrap().contains("cpu"));
    }

    #[test]
    fn test_memory_admission_boundary() {
        let monitor = monitor();
        monitor.allocate(TaskId::new(), &requirements(0.5, 1024)).unwrap();
        assert!(monitor.check_availability(&requirements(0.5, 1024)).0);
        assert!(!monitor.check_availability(&requirements(0.5, 1025)).0);
    }

    #[test]
    fn test_allocate_then_release_restores_capacity() {
        let monitor = monitor();
        let task = TaskId::new();
        monitor.allocate(task, &requirements(4.0, 2048)).unwrap();
        assert!(!monitor.check_availability(&requirements(0.5, 128)).0);

        monitor.release(task);
        assert!(monitor.check_availability(&requirements(0.5, 128)).0);
        assert_eq!(monitor.stats().active_allocations, 0);
    }

    #[test]
    fn test_release_is_idempotent() {
        let monitor = monitor();
        let task = TaskId::new();
        monitor.allocate(task, &requirements(1.0, 512)).unwrap();
        monitor.release(task);
        monitor.release(task);
        assert_eq!(monitor.stats().active_allocations, 0);
        assert!(monitor.check_availability(&requirements(4.0, 2048)).0);
    }

    #[test]
    fn test_gpu_rejected_without_gpu() {
        let monitor = monitor();
        let gpu_req = ResourceRequirements::new(1.0, 512, true, Some(2048)).unwrap();
        let (ok, reason) = monitor.check_availability(&gpu_req);
        assert!(!ok);
        assert!(reason.unwrap().contains("gpu"));
    }

    #[test]
    fn test_gpu_memory_accounted_when_available() {
        let limits = ResourceLimits {
            max_cpu_cores: 4.0,
            max_memory_mb: 2048,
            gpu_memory_mb: Some(4096),
            ..ResourceLimits::default()
        };
        let monitor = ResourceMonitor::new(limits, Arc::new(NullMetricsProvider));
        let gpu_req = ResourceRequirements::new(1.0, 512, true, Some(3072)).unwrap();
        monitor.allocate(TaskId::new(), &gpu_req).unwrap();

        let second = ResourceRequirements::new(1.0, 512, true, Some(2048)).unwrap();
        assert!(!monitor.check_availability(&second).0);
    }

    #[tokio::test]
    async fn test_sampling_loop_records_history() {
        let limits = ResourceLimits::default();
        let monitor = ResourceMonitor::with_clock(
            limits,
            Arc::new(NullMetricsProvider),
            Arc::new(SystemClock),
            Duration::from_millis(10),
        );
        monitor.start().await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        monitor.stop().await;

        let history = monitor.history(1);
        assert!(!history.is_empty());
        assert!(monitor.average(1).is_some());
        // The null provider reports zeros straight through
        assert_eq!(history[0].cpu_percent, 0.0);
    }
}
