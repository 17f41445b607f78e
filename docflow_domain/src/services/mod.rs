// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Domain services and infrastructure ports: the processor contract, the
//! injected state store / clock / metrics collaborators, and datetime
//! serialization helpers.

pub mod clock;
pub mod datetime_serde;
pub mod processor;
pub mod state_store;
pub mod system_metrics;

pub use clock::{Clock, SystemClock};
pub use processor::{
    Processor, ProcessorCapability, ProcessorContext, ProcessorHealth, ProcessorMetadata,
    ProcessorResult,
};
pub use state_store::StateStore;
pub use system_metrics::{NullMetricsProvider, SystemMetricsProvider, SystemSample};
