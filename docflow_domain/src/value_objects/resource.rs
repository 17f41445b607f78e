// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Resource Value Objects
//!
//! Types describing what a stage needs and what the host is allowed to
//! spend: per-stage [`ResourceRequirements`], system-wide
//! [`ResourceLimits`], and the point-in-time [`ResourceSnapshot`] produced
//! by the sampling loop.
//!
//! ## Units
//!
//! Admission control works in requirement units: CPU in fractional cores
//! against `max_cpu_cores`, memory in megabytes against `max_memory_mb`.
//! The percentage fields (`max_cpu_percent`, `warning_*`) drive warning
//! logging in the sampling loop and never block admission. GPU is handled
//! symbolically: a stage that requires a GPU is only admitted when the
//! limits declare one accessible.
//!
//! All numeric fields are validated at construction; a rejected value
//! never enters the system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::services::datetime_serde;

/// Kinds of system resources tracked by the resource monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Cpu,
    Memory,
    DiskIo,
    NetworkIo,
    Gpu,
}

impl ResourceType {
    /// Stable lowercase name, used in log and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Cpu => "cpu",
            ResourceType::Memory => "memory",
            ResourceType::DiskIo => "disk_io",
            ResourceType::NetworkIo => "network_io",
            ResourceType::Gpu => "gpu",
        }
    }
}

/// Resource requirements declared by a pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    /// Fractional CPU cores, between 0.1 and 16.0
    pub cpu_cores: f64,
    /// Resident memory in megabytes, between 128 and 65536
    pub memory_mb: u64,
    /// Whether the stage needs GPU access
    pub gpu_required: bool,
    /// GPU memory in megabytes, required when `gpu_required` is set
    pub gpu_memory_mb: Option<u64>,
}

impl ResourceRequirements {
    pub const MIN_CPU_CORES: f64 = 0.1;
    pub const MAX_CPU_CORES: f64 = 16.0;
    pub const MIN_MEMORY_MB: u64 = 128;
    pub const MAX_MEMORY_MB: u64 = 65_536;
    pub const MIN_GPU_MEMORY_MB: u64 = 512;

    /// Creates validated resource requirements.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` when a value falls outside its range
    /// or when GPU memory is missing while `gpu_required` is set.
    pub fn new(
        cpu_cores: f64,
        memory_mb: u64,
        gpu_required: bool,
        gpu_memory_mb: Option<u64>,
    ) -> Result<Self, PipelineError> {
        let requirements = Self {
            cpu_cores,
            memory_mb,
            gpu_required,
            gpu_memory_mb,
        };
        requirements.validate()?;
        Ok(requirements)
    }

    /// Re-validates all fields, used after deserializing external input
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(Self::MIN_CPU_CORES..=Self::MAX_CPU_CORES).contains(&self.cpu_cores) {
            return Err(PipelineError::invalid_config(format!(
                "cpu_cores {} outside [{}, {}]",
                self.cpu_cores,
                Self::MIN_CPU_CORES,
                Self::MAX_CPU_CORES
            )));
        }
        if !(Self::MIN_MEMORY_MB..=Self::MAX_MEMORY_MB).contains(&self.memory_mb) {
            return Err(PipelineError::invalid_config(format!(
                "memory_mb {} outside [{}, {}]",
                self.memory_mb,
                Self::MIN_MEMORY_MB,
                Self::MAX_MEMORY_MB
            )));
        }
        match (self.gpu_required, self.gpu_memory_mb) {
            (true, None) => {
                return Err(PipelineError::invalid_config(
                    "gpu_memory_mb must be specified when gpu_required is set",
                ));
            }
            (_, Some(gpu_mb)) if gpu_mb < Self::MIN_GPU_MEMORY_MB => {
                return Err(PipelineError::invalid_config(format!(
                    "gpu_memory_mb {} below minimum {}",
                    gpu_mb,
                    Self::MIN_GPU_MEMORY_MB
                )));
            }
            _ => {}
        }
        Ok(())
    }
}

impl Default for ResourceRequirements {
    fn default() -> Self {
        Self {
            cpu_cores: 1.0,
            memory_mb: 512,
            gpu_required: false,
            gpu_memory_mb: None,
        }
    }
}

/// System-wide resource limits for admission control and warning logging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Total CPU cores the engine may reserve across all tasks
    pub max_cpu_cores: f64,
    /// Total memory in megabytes the engine may reserve
    pub max_memory_mb: u64,

    /// Sampled CPU percentage above which a warning is logged
    pub warning_cpu_percent: f64,
    /// Sampled memory percentage above which a warning is logged
    pub warning_memory_percent: f64,

    /// Optional disk throughput warning threshold in MB/s
    pub warning_disk_io_mbps: Option<f64>,
    /// Optional network throughput warning threshold in MB/s
    pub warning_network_io_mbps: Option<f64>,

    /// Total GPU memory in megabytes, `None` when no GPU is accessible
    pub gpu_memory_mb: Option<u64>,
}

impl ResourceLimits {
    /// Creates validated resource limits
    pub fn new(max_cpu_cores: f64, max_memory_mb: u64) -> Result<Self, PipelineError> {
        if max_cpu_cores < 1.0 {
            return Err(PipelineError::invalid_config(format!(
                "max_cpu_cores {} must be at least 1.0",
                max_cpu_cores
            )));
        }
        if max_memory_mb < 512 {
            return Err(PipelineError::invalid_config(format!(
                "max_memory_mb {} must be at least 512",
                max_memory_mb
            )));
        }
        Ok(Self {
            max_cpu_cores,
            max_memory_mb,
            ..Self::default()
        })
    }

    /// Whether a GPU is accessible to the engine
    pub fn gpu_available(&self) -> bool {
        self.gpu_memory_mb.is_some()
    }

    /// Warning threshold for a sampled resource percentage.
    ///
    /// Disk and network thresholds are absolute MB/s values; unset
    /// thresholds report `f64::INFINITY` so comparisons never fire.
    pub fn warning_threshold_for(&self, resource: ResourceType) -> f64 {
        match resource {
            ResourceType::Cpu => self.warning_cpu_percent,
            ResourceType::Memory => self.warning_memory_percent,
            ResourceType::DiskIo => self.warning_disk_io_mbps.unwrap_or(f64::INFINITY),
            ResourceType::NetworkIo => self.warning_network_io_mbps.unwrap_or(f64::INFINITY),
            ResourceType::Gpu => f64::INFINITY,
        }
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_cpu_cores: 8.0,
            max_memory_mb: 8192,
            warning_cpu_percent: 70.0,
            warning_memory_percent: 65.0,
            warning_disk_io_mbps: None,
            warning_network_io_mbps: None,
            gpu_memory_mb: None,
        }
    }
}

/// Point-in-time resource usage snapshot from the sampling loop
///
/// Metrics unavailable on the host are reported as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    #[serde(with = "datetime_serde")]
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_mb: f64,
    /// Disk read rate in MB/s since the previous sample
    pub disk_io_read_mb: f64,
    /// Disk write rate in MB/s since the previous sample
    pub disk_io_write_mb: f64,
    /// Network send rate in MB/s since the previous sample
    pub network_io_sent_mb: f64,
    /// Network receive rate in MB/s since the previous sample
    pub network_io_recv_mb: f64,
    pub active_tasks: usize,
    pub queued_tasks: usize,
}

impl ResourceSnapshot {
    /// An all-zero snapshot at the given instant
    pub fn zero(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            cpu_percent: 0.0,
            memory_percent: 0.0,
            memory_mb: 0.0,
            disk_io_read_mb: 0.0,
            disk_io_write_mb: 0.0,
            network_io_sent_mb: 0.0,
            network_io_recv_mb: 0.0,
            active_tasks: 0,
            queued_tasks: 0,
        }
    }
}
