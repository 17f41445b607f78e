// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Resource sampling and admission control.

pub mod monitor;
pub mod sampler;

pub use monitor::{ResourceAverage, ResourceMonitor, ResourceMonitorStats};
pub use sampler::SysinfoMetricsProvider;
