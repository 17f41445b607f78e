// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! In-process event bus: publish/subscribe with middleware and metrics.

pub mod bus;
pub mod metrics;
pub mod middleware;

pub use bus::{event_handler, EventBus, EventHandler, SubscriptionId};
pub use metrics::{EventBusMetrics, EventTypeMetrics, HandlerMetrics, TotalMetrics};
pub use middleware::{
    EventMiddleware, FilterMiddleware, LoggingMiddleware, MetricsMiddleware, ValidationMiddleware,
};
