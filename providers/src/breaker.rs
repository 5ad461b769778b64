//! Circuit breaker for completion providers.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: provider assumed down, calls rejected without touching it
//! - Half-open: probing whether the provider recovered
//!
//! # State transitions
//! ```text
//! Closed → Open:      failure_threshold consecutive failures
//! Open → Half-open:   first call after recovery_timeout elapsed
//! Half-open → Closed: success_threshold consecutive successes
//! Half-open → Open:   any failure
//! ```
//!
//! The recovery timer is evaluated lazily: an idle open circuit flips to
//! half-open on the next call attempt, not from a background task. Every
//! check-then-mutate sequence runs under one lock, so concurrent callers
//! racing on an expired open circuit cannot both perform the flip.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

/// Current breaker state. Exactly one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Breaker tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long an open circuit waits before admitting a probe.
    pub recovery_timeout: Duration,
    /// Consecutive half-open successes before the circuit closes.
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}

/// Call rejected or failed through the breaker.
#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// The circuit is open; the operation was never invoked.
    #[error("circuit open for {name}")]
    Open { name: String },
    /// The operation ran and failed; the failure has been recorded.
    #[error("{0}")]
    Operation(E),
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    /// Consecutive failures, meaningful while Closed.
    failures: u32,
    /// Consecutive successes, meaningful while HalfOpen.
    successes: u32,
    last_failure: Option<Instant>,
}

/// Per-provider failure-detection state machine.
///
/// Created once per provider at startup and mutated only through
/// [`call`](Self::call) and [`reset`](Self::reset). Shared freely across
/// concurrent message units; all state handling is internally locked.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                last_failure: None,
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Whether a call would currently be admitted.
    ///
    /// Read-only: an expired open circuit reports available here but only
    /// flips to half-open on the next actual call.
    #[must_use]
    pub fn is_available(&self) -> bool {
        let inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => Self::recovery_elapsed(&inner, self.config.recovery_timeout),
        }
    }

    /// Execute `op` through the breaker.
    ///
    /// Fails fast with [`CircuitError::Open`] when the state forbids the
    /// call; otherwise runs the operation (outside the lock) and records
    /// the outcome.
    pub async fn call<T, E, Fut>(&self, op: impl FnOnce() -> Fut) -> Result<T, CircuitError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.admit()?;

        match op().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(error) => {
                self.on_failure(&error);
                Err(CircuitError::Operation(error))
            }
        }
    }

    /// Force the circuit closed with all counters cleared.
    ///
    /// Operational override; no transition events are derived from it.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.successes = 0;
        inner.last_failure = None;
        tracing::info!(provider = %self.name, "circuit reset");
    }

    fn admit<E>(&self) -> Result<(), CircuitError<E>> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                if Self::recovery_elapsed(&inner, self.config.recovery_timeout) {
                    inner.state = CircuitState::HalfOpen;
                    inner.successes = 0;
                    tracing::info!(provider = %self.name, "circuit half-open");
                    Ok(())
                } else {
                    Err(CircuitError::Open {
                        name: self.name.clone(),
                    })
                }
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.successes += 1;
            if inner.successes >= self.config.success_threshold {
                inner.state = CircuitState::Closed;
                inner.failures = 0;
                inner.successes = 0;
                tracing::info!(provider = %self.name, "circuit closed");
            }
        } else {
            inner.failures = 0;
        }
    }

    fn on_failure(&self, error: &impl std::fmt::Display) {
        let mut inner = self.lock();
        inner.failures += 1;
        inner.last_failure = Some(Instant::now());

        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Open;
            inner.successes = 0;
            tracing::warn!(provider = %self.name, error = %error, "circuit reopened");
        } else if inner.state == CircuitState::Closed && inner.failures >= self.config.failure_threshold
        {
            inner.state = CircuitState::Open;
            tracing::warn!(
                provider = %self.name,
                failures = inner.failures,
                error = %error,
                "circuit opened"
            );
        }
    }

    fn recovery_elapsed(inner: &Inner, timeout: Duration) -> bool {
        inner
            .last_failure
            .is_none_or(|at| at.elapsed() >= timeout)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
