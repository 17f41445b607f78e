// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # System Metrics Sampler
//!
//! `sysinfo`-backed implementation of the domain's
//! [`SystemMetricsProvider`] port. Reports the current process's CPU and
//! resident memory plus cumulative disk and network byte counters; the
//! resource monitor converts the counters into per-second rates between
//! samples. Hosts that cannot report a metric get zeros, never errors.

use parking_lot::Mutex;
use sysinfo::{Networks, Pid, System};
use tracing::warn;

use docflow_domain::{SystemMetricsProvider, SystemSample};

struct SamplerState {
    system: System,
    networks: Networks,
    pid: Pid,
}

/// Process metrics provider backed by the `sysinfo` crate
pub struct SysinfoMetricsProvider {
    state: Mutex<SamplerState>,
}

impl SysinfoMetricsProvider {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid().unwrap_or_else(|err| {
            warn!(error = err, "could not resolve current pid, using raw process id");
            Pid::from_u32(std::process::id())
        });
        Self {
            state: Mutex::new(SamplerState {
                system: System::new(),
                networks: Networks::new_with_refreshed_list(),
                pid,
            }),
        }
    }
}

impl Default for SysinfoMetricsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemMetricsProvider for SysinfoMetricsProvider {
    fn sample(&self) -> SystemSample {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.system.refresh_memory();
        state.system.refresh_process(state.pid);
        state.networks.refresh();

        let total_memory_mb = state.system.total_memory() as f64 / (1024.0 * 1024.0);
        let (net_sent_bytes, net_recv_bytes) = state
            .networks
            .iter()
            .fold((0u64, 0u64), |(sent, recv), (_, data)| {
                (sent + data.total_transmitted(), recv + data.total_received())
            });

        match state.system.process(state.pid) {
            Some(process) => {
                let memory_mb = process.memory() as f64 / (1024.0 * 1024.0);
                let disk = process.disk_usage();
                SystemSample {
                    cpu_percent: process.cpu_usage() as f64,
                    memory_percent: if total_memory_mb > 0.0 {
                        memory_mb / total_memory_mb * 100.0
                    } else {
                        0.0
                    },
                    memory_mb,
                    disk_read_bytes: disk.total_read_bytes,
                    disk_write_bytes: disk.total_written_bytes,
                    net_sent_bytes,
                    net_recv_bytes,
                }
            }
            None => SystemSample {
                net_sent_bytes,
                net_recv_bytes,
                ..SystemSample::default()
            },
        }
    }
}
