//! Failure-counting circuit breaker.
//!
//! Guards one named operation. Consecutive failures open the circuit; once
//! the reset timeout has elapsed a single trial call is let through.
//!
//! # State Machine
//!
//! ```text
//! Closed --[failure_count >= failure_threshold]--> Open
//! Open --[reset_timeout elapsed, next call]--> HalfOpen (one trial in flight)
//! HalfOpen --[trial succeeds]--> Closed (failure_count = 0)
//! HalfOpen --[trial fails]--> Open (timer restarts)
//! ```
//!
//! While the trial is in flight every other caller is rejected as if the
//! circuit were still open.
//!
//! # Timeouts
//!
//! `timeout` never cancels the wrapped operation. A call that succeeds but
//! takes longer than `timeout` is counted as a failure; its value is still
//! returned to the caller.

use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::error::ResilienceError;

/// Configuration for a circuit breaker.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit (default: 3).
    pub failure_threshold: u32,
    /// Calls slower than this count as failures (default: 5s).
    pub timeout: Duration,
    /// Time the circuit stays open before a trial call (default: 10s).
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            timeout: Duration::from_millis(5000),
            reset_timeout: Duration::from_millis(10000),
        }
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected without running.
    Open,
    /// A single trial call decides whether to close again.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerStats {
    pub state: CircuitState,
    pub failure_count: u32,
    /// Time since the last recorded failure.
    pub since_last_failure: Option<Duration>,
}

#[derive(Debug)]
struct CircuitBreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    trial_in_flight: bool,
}

impl CircuitBreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure: None,
            trial_in_flight: false,
        }
    }
}

/// What an admitted call is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Trial,
}

/// Returns the breaker to `Open` when a trial call is dropped before it
/// settles.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = self.breaker.inner.lock();
            inner.trial_in_flight = false;
            inner.state = CircuitState::Open;
            inner.last_failure = Some(Instant::now());
        }
    }
}

/// Circuit breaker for one named operation.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<CircuitBreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(CircuitBreakerInner::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Run `operation` through the breaker.
    ///
    /// Returns [`ResilienceError::CircuitOpen`] without invoking the
    /// operation when the circuit is open or a half-open trial is already
    /// running.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, ResilienceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let admission = self.admit()?;
        let mut guard = TrialGuard {
            breaker: self,
            armed: admission == Admission::Trial,
        };
        let started = Instant::now();
        let outcome = operation().await;
        let elapsed = started.elapsed();
        guard.armed = false;

        match outcome {
            Ok(value) if elapsed <= self.config.timeout => {
                self.record_success(admission);
                Ok(value)
            }
            Ok(value) => {
                tracing::warn!(
                    operation = %self.name,
                    elapsed_ms = elapsed.as_millis() as u64,
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "Operation exceeded timeout, counting as failure"
                );
                self.record_failure(admission);
                Ok(value)
            }
            Err(e) => {
                self.record_failure(admission);
                Err(ResilienceError::OperationFailed {
                    operation: self.name.clone(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Decide whether a call may run now.
    fn admit(&self) -> Result<Admission, ResilienceError> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::Open => {
                let cooled_down = inner
                    .last_failure
                    .map(|t| t.elapsed() >= self.config.reset_timeout)
                    .unwrap_or(true);
                if cooled_down {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    tracing::info!(operation = %self.name, "Circuit breaker half-open, allowing trial call");
                    Ok(Admission::Trial)
                } else {
                    Err(self.rejection())
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    Err(self.rejection())
                } else {
                    inner.trial_in_flight = true;
                    Ok(Admission::Trial)
                }
            }
        }
    }

    fn rejection(&self) -> ResilienceError {
        tracing::debug!(operation = %self.name, "Circuit breaker rejected call");
        ResilienceError::CircuitOpen {
            operation: self.name.clone(),
        }
    }

    fn record_success(&self, admission: Admission) {
        let mut inner = self.inner.lock();
        if admission == Admission::Trial {
            inner.trial_in_flight = false;
        }
        if inner.state != CircuitState::Closed {
            tracing::info!(operation = %self.name, "Circuit breaker CLOSED");
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
    }

    fn record_failure(&self, admission: Admission) {
        let mut inner = self.inner.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure = Some(Instant::now());

        if admission == Admission::Trial {
            inner.trial_in_flight = false;
            inner.state = CircuitState::Open;
            tracing::info!(operation = %self.name, "Trial call failed, circuit breaker re-opened");
        } else if inner.state == CircuitState::Closed
            && inner.failure_count >= self.config.failure_threshold
        {
            inner.state = CircuitState::Open;
            tracing::info!(
                operation = %self.name,
                failures = inner.failure_count,
                reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
                "Circuit breaker OPENED"
            );
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().state == CircuitState::Open
    }

    pub fn stats(&self) -> BreakerStats {
        let inner = self.inner.lock();
        BreakerStats {
            state: inner.state,
            failure_count: inner.failure_count,
            since_last_failure: inner.last_failure.map(|t| t.elapsed()),
        }
    }

    /// Force the breaker back to `Closed` with a clean failure count.
    pub fn reset(&self) {
        *self.inner.lock() = CircuitBreakerInner::new();
        tracing::debug!(operation = %self.name, "Circuit breaker reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn create_test_breaker(threshold: u32, reset_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "test.op",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                timeout: Duration::from_secs(5),
                reset_timeout: Duration::from_millis(reset_ms),
            },
        )
    }

    async fn fail(breaker: &CircuitBreaker, calls: &AtomicUsize) -> Result<(), ResilienceError> {
        breaker
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("boom")
            })
            .await
    }

    async fn succeed(breaker: &CircuitBreaker, calls: &AtomicUsize) -> Result<u32, ResilienceError> {
        breaker
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(7)
            })
            .await
    }

    #[test]
    fn test_default_config() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.timeout, Duration::from_millis(5000));
        assert_eq!(config.reset_timeout, Duration::from_millis(10000));
    }

    #[tokio::test]
    async fn test_initial_state_closed() {
        let breaker = create_test_breaker(3, 100);
        assert_eq!(breaker.state(), CircuitState::Closed);
        let calls = AtomicUsize::new(0);
        assert_eq!(succeed(&breaker, &calls).await.unwrap(), 7);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_opens_after_threshold_and_rejects_without_running() {
        let breaker = create_test_breaker(3, 10_000);
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            assert!(matches!(
                fail(&breaker, &calls).await,
                Err(ResilienceError::OperationFailed { .. })
            ));
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let result = succeed(&breaker, &calls).await;
        assert!(matches!(result, Err(ResilienceError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3, "operation must not run while open");
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let breaker = create_test_breaker(3, 10_000);
        let calls = AtomicUsize::new(0);
        let _ = fail(&breaker, &calls).await;
        let _ = fail(&breaker, &calls).await;
        assert_eq!(breaker.failure_count(), 2);
        succeed(&breaker, &calls).await.unwrap();
        assert_eq!(breaker.failure_count(), 0);
        let _ = fail(&breaker, &calls).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_trial_success_closes() {
        let breaker = create_test_breaker(1, 30);
        let calls = AtomicUsize::new(0);
        let _ = fail(&breaker, &calls).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(succeed(&breaker, &calls).await.unwrap(), 7);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_half_open_trial_failure_reopens() {
        let breaker = create_test_breaker(1, 30);
        let calls = AtomicUsize::new(0);
        let _ = fail(&breaker, &calls).await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        let _ = fail(&breaker, &calls).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Timer restarted by the failed trial
        assert!(matches!(
            succeed(&breaker, &calls).await,
            Err(ResilienceError::CircuitOpen { .. })
        ));
    }

    #[tokio::test]
    async fn test_exactly_one_half_open_trial() {
        let breaker = Arc::new(create_test_breaker(1, 20));
        let calls = Arc::new(AtomicUsize::new(0));
        let _ = fail(&breaker, &calls).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let trial = {
            let breaker = breaker.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                breaker
                    .execute(|| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        let _ = release_rx.await;
                        Ok::<_, String>(())
                    })
                    .await
            })
        };

        // Let the trial start and park on the channel
        while breaker.state() != CircuitState::HalfOpen {
            tokio::task::yield_now().await;
        }

        let concurrent = succeed(&breaker, &calls).await;
        assert!(matches!(concurrent, Err(ResilienceError::CircuitOpen { .. })));

        release_tx.send(()).unwrap();
        trial.await.unwrap().unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slow_success_counts_as_failure_but_returns_value() {
        let breaker = CircuitBreaker::new(
            "slow.op",
            CircuitBreakerConfig {
                failure_threshold: 1,
                timeout: Duration::from_millis(5),
                reset_timeout: Duration::from_secs(10),
            },
        );
        let result = breaker
            .execute(|| async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok::<_, String>("late")
            })
            .await;
        assert_eq!(result.unwrap(), "late");
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_reset_closes() {
        let breaker = create_test_breaker(1, 10_000);
        let calls = AtomicUsize::new(0);
        let _ = fail(&breaker, &calls).await;
        assert!(breaker.is_open());
        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.stats().since_last_failure.is_none());
    }

    #[test]
    fn test_circuit_state_display() {
        assert_eq!(CircuitState::Open.to_string(), "open");
        assert_eq!(CircuitState::HalfOpen.to_string(), "half-open");
    }
}
