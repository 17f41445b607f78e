// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # System Metrics Port
//!
//! Injected source of raw host metrics for the resource monitor. Providers
//! return cumulative byte counters; the monitor turns them into per-second
//! rates between samples. A metric the host cannot report is zero, never
//! an error.

/// Raw sample of process and host counters
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SystemSample {
    /// Process CPU usage as a percentage of one core times core count
    pub cpu_percent: f64,
    /// Process resident memory as a percentage of total host memory
    pub memory_percent: f64,
    /// Process resident memory in megabytes
    pub memory_mb: f64,
    /// Cumulative bytes read from disk by the process
    pub disk_read_bytes: u64,
    /// Cumulative bytes written to disk by the process
    pub disk_write_bytes: u64,
    /// Cumulative bytes sent on all host interfaces
    pub net_sent_bytes: u64,
    /// Cumulative bytes received on all host interfaces
    pub net_recv_bytes: u64,
}

/// Injected provider of raw system metrics
pub trait SystemMetricsProvider: Send + Sync {
    /// Takes one sample; unsupported metrics are zero
    fn sample(&self) -> SystemSample;
}

/// Provider that always reports zeros, for tests and unsupported hosts
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMetricsProvider;

impl SystemMetricsProvider for NullMetricsProvider {
    fn sample(&self) -> SystemSample {
        SystemSample::default()
    }
}
