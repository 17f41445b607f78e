// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Processor Resilience
//!
//! Composable fault tolerance around any processor: bounded retries with
//! exponential backoff, a per-attempt timeout, a three-state circuit
//! breaker, and an optional fallback processor. The wrapper exposes the
//! same [`Processor`] contract, so a resilient processor drops into any
//! stage unchanged.
//!
//! ## Circuit breaker
//!
//! ```text
//!          N consecutive failures
//! Closed ─────────────────────────► Open
//!   ▲                                 │ recovery timeout elapsed
//!   │  M probe successes              ▼
//!   └───────────────────────────── HalfOpen ──► Open (any probe fails)
//! ```
//!
//! An open breaker short-circuits to the fallback when one is configured,
//! otherwise the call reports failure without touching the wrapped
//! processor.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use docflow_domain::{
    Clock, PipelineError, Processor, ProcessorContext, ProcessorHealth, ProcessorMetadata,
    ProcessorResult, SystemClock,
};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation
    Closed,
    /// Failing; calls are rejected until the recovery timeout elapses
    Open,
    /// Probing whether the processor recovered
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Tuning knobs for the circuit breaker
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open before probing
    pub recovery_timeout: Duration,
    /// Probe successes required to close again
    pub half_open_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            half_open_requests: 3,
        }
    }
}

/// Snapshot of breaker state for metrics
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerInfo {
    pub state: &'static str,
    pub failure_count: u32,
}

struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<chrono::DateTime<chrono::Utc>>,
    half_open_successes: u32,
}

/// Three-state breaker that temporarily disables a failing processor
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                half_open_successes: 0,
            }),
        }
    }

    /// Whether a call may proceed; transitions Open to HalfOpen when the
    /// recovery timeout has elapsed
    pub fn can_execute(&self) -> bool {
        let mut state = self.state.lock();
        match state.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let recovered = state.last_failure.map(|last| {
                    let elapsed = self.clock.now() - last;
                    elapsed.num_milliseconds() as u128 >= self.config.recovery_timeout.as_millis()
                });
                if recovered.unwrap_or(false) {
                    Self::transition(&mut state, CircuitState::HalfOpen);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records a successful call
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        match state.state {
            CircuitState::HalfOpen => {
                state.half_open_successes += 1;
                if state.half_open_successes >= self.config.half_open_requests {
                    Self::transition(&mut state, CircuitState::Closed);
                }
            }
            CircuitState::Closed => state.failure_count = 0,
            CircuitState::Open => {}
        }
    }

    /// Records a failed call
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        state.failure_count += 1;
        state.last_failure = Some(self.clock.now());
        match state.state {
            CircuitState::Closed => {
                if state.failure_count >= self.config.failure_threshold {
                    Self::transition(&mut state, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => Self::transition(&mut state, CircuitState::Open),
            CircuitState::Open => {}
        }
    }

    fn transition(state: &mut BreakerState, next: CircuitState) {
        if state.state == next {
            return;
        }
        info!(from = state.state.as_str(), to = next.as_str(), "circuit breaker transition");
        state.state = next;
        match next {
            CircuitState::Closed => state.failure_count = 0,
            CircuitState::HalfOpen => state.half_open_successes = 0,
            CircuitState::Open => {}
        }
    }

    pub fn current_state(&self) -> CircuitState {
        self.state.lock().state
    }

    pub fn info(&self) -> CircuitBreakerInfo {
        let state = self.state.lock();
        CircuitBreakerInfo {
            state: state.state.as_str(),
            failure_count: state.failure_count,
        }
    }
}

/// Retry behavior for the resilient wrapper
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `base * 2^n`, capped
    pub base_delay: Duration,
    /// Upper bound on the backoff delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Resilience counters exposed by the wrapper
#[derive(Debug, Clone, PartialEq)]
pub struct ResilienceMetrics {
    pub circuit: CircuitBreakerInfo,
    pub total_retries: u64,
    pub total_timeouts: u64,
}

/// Wraps a processor with retries, per-attempt timeout, a circuit
/// breaker, and an optional fallback
pub struct ResilientProcessor {
    inner: Arc<dyn Processor>,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    attempt_timeout: Duration,
    fallback: Option<Arc<dyn Processor>>,
    clock: Arc<dyn Clock>,
    total_retries: AtomicU64,
    total_timeouts: AtomicU64,
}

impl ResilientProcessor {
    pub fn new(inner: Arc<dyn Processor>) -> Self {
        let attempt_timeout = Duration::from_secs(inner.metadata().default_timeout_secs);
        Self {
            inner,
            breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
            retry: RetryPolicy::default(),
            attempt_timeout,
            fallback: None,
            clock: Arc::new(SystemClock),
            total_retries: AtomicU64::new(0),
            total_timeouts: AtomicU64::new(0),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    pub fn with_circuit_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn Processor>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn resilience_metrics(&self) -> ResilienceMetrics {
        ResilienceMetrics {
            circuit: self.breaker.info(),
            total_retries: self.total_retries.load(Ordering::Relaxed),
            total_timeouts: self.total_timeouts.load(Ordering::Relaxed),
        }
    }

    async fn try_fallback(
        &self,
        context: &ProcessorContext,
        errors: Vec<String>,
    ) -> Result<ProcessorResult, PipelineError> {
        if let Some(fallback) = &self.fallback {
            info!(
                processor = %self.inner.metadata().name,
                fallback = %fallback.metadata().name,
                "using fallback processor"
            );
            match fallback.process(context).await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    warn!(error = %err, "fallback processor also failed");
                }
            }
        }
        let now = self.clock.now();
        Ok(ProcessorResult::failed(
            self.inner.metadata().name,
            now,
            now,
            errors,
        ))
    }
}

#[async_trait]
impl Processor for ResilientProcessor {
    fn metadata(&self) -> ProcessorMetadata {
        self.inner.metadata()
    }

    async fn initialize(&self) -> Result<(), PipelineError> {
        self.inner.initialize().await?;
        if let Some(fallback) = &self.fallback {
            fallback.initialize().await?;
        }
        Ok(())
    }

    async fn validate(&self, context: &ProcessorContext) -> Vec<String> {
        self.inner.validate(context).await
    }

    async fn process(&self, context: &ProcessorContext) -> Result<ProcessorResult, PipelineError> {
        if !self.breaker.can_execute() {
            warn!(processor = %self.inner.metadata().name, "circuit breaker is open");
            return self
                .try_fallback(context, vec!["circuit breaker is open".to_string()])
                .await;
        }

        let mut last_error = String::new();
        for attempt in 0..=self.retry.max_retries {
            match tokio::time::timeout(self.attempt_timeout, self.inner.process(context)).await {
                Ok(Ok(result)) => {
                    self.breaker.record_success();
                    return Ok(result);
                }
                Ok(Err(err)) => {
                    warn!(attempt = attempt + 1, error = %err, "processor attempt failed");
                    last_error = err.to_string();
                }
                Err(_) => {
                    self.total_timeouts.fetch_add(1, Ordering::Relaxed);
                    last_error = format!(
                        "processor timed out after {:.1}s",
                        self.attempt_timeout.as_secs_f64()
                    );
                    warn!(attempt = attempt + 1, "processor attempt timed out");
                }
            }

            if attempt < self.retry.max_retries {
                let delay = self.retry.delay_for_attempt(attempt);
                debug!(delay_ms = delay.as_millis() as u64, "backing off before retry");
                tokio::time::sleep(delay).await;
                self.total_retries.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.breaker.record_failure();
        self.try_fallback(context, vec![last_error]).await
    }

    async fn cleanup(&self) -> Result<(), PipelineError> {
        self.inner.cleanup().await?;
        if let Some(fallback) = &self.fallback {
            fallback.cleanup().await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> ProcessorHealth {
        self.inner.health_check().await
    }
}

/// Ordered fallback chain: tries processors until one completes
pub struct ProcessorChain {
    processors: Vec<Arc<dyn Processor>>,
}

impl ProcessorChain {
    pub fn new(processors: Vec<Arc<dyn Processor>>) -> Result<Self, PipelineError> {
        if processors.is_empty() {
            return Err(PipelineError::invalid_config(
                "processor chain requires at least one processor",
            ));
        }
        Ok(Self { processors })
    }
}

#[async_trait]
impl Processor for ProcessorChain {
    fn metadata(&self) -> ProcessorMetadata {
        let primary = self.processors[0].metadata();
        ProcessorMetadata {
            name: format!("chain_{}", primary.name),
            description: format!("chain of {} processors", self.processors.len()),
            ..primary
        }
    }

    async fn initialize(&self) -> Result<(), PipelineError> {
        for processor in &self.processors {
            processor.initialize().await?;
        }
        Ok(())
    }

    async fn validate(&self, context: &ProcessorContext) -> Vec<String> {
        self.processors[0].validate(context).await
    }

    async fn process(&self, context: &ProcessorContext) -> Result<ProcessorResult, PipelineError> {
        let mut errors = Vec::new();
        for (index, processor) in self.processors.iter().enumerate() {
            let name = processor.metadata().name;
            debug!(position = index + 1, total = self.processors.len(), processor = %name, "trying chain processor");
            match processor.process(context).await {
                Ok(result) if result.status == docflow_domain::StageStatus::Completed => {
                    return Ok(result);
                }
                Ok(result) => errors.extend(result.errors),
                Err(err) => errors.push(format!("{}: {}", name, err)),
            }
        }
        let now = chrono::Utc::now();
        Ok(ProcessorResult::failed("processor_chain", now, now, errors))
    }

    async fn cleanup(&self) -> Result<(), PipelineError> {
        for processor in &self.processors {
            processor.cleanup().await?;
        }
        Ok(())
    }
}
