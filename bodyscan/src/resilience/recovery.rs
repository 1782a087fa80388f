//! Named-operation breaker registry and primary/fallback executor.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;

use super::circuit_breaker::{BreakerStats, CircuitBreaker, CircuitBreakerConfig};
use super::error::ResilienceError;

/// Circuit breakers keyed by operation name, created lazily.
///
/// # Example
///
/// ```ignore
/// let resilience = ResilienceLayer::new(CircuitBreakerConfig::default());
///
/// let landmarks = resilience
///     .execute_with_recovery(
///         "tracking.session",
///         || native_backend.track(&frame),
///         || pose_model.track(&frame),
///     )
///     .await?;
/// ```
#[derive(Debug)]
pub struct ResilienceLayer {
    default_config: CircuitBreakerConfig,
    overrides: DashMap<String, CircuitBreakerConfig>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl Default for ResilienceLayer {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl ResilienceLayer {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            default_config,
            overrides: DashMap::new(),
            breakers: DashMap::new(),
        }
    }

    /// Use a specific configuration for one operation.
    ///
    /// Takes effect for breakers created after the call; an existing breaker
    /// is replaced.
    pub fn with_operation_config(self, operation: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let operation = operation.into();
        self.breakers.remove(&operation);
        self.overrides.insert(operation, config);
        self
    }

    /// Breaker for `operation`, creating it on first use.
    pub fn breaker(&self, operation: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(operation) {
            return Arc::clone(existing.value());
        }

        let config = self
            .overrides
            .get(operation)
            .map(|c| c.value().clone())
            .unwrap_or_else(|| self.default_config.clone());
        let entry = self
            .breakers
            .entry(operation.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(operation, config)));
        Arc::clone(entry.value())
    }

    /// Run `primary` through the operation's breaker.
    pub async fn execute<T, E, F, Fut>(&self, operation: &str, primary: F) -> Result<T, ResilienceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let breaker = self.breaker(operation);
        breaker.execute(primary).await
    }

    /// Run `primary` through the breaker, falling back on any failure.
    ///
    /// The fallback runs when the primary fails or is rejected by an open
    /// breaker. It is not itself guarded. When both fail the error names the
    /// operation and carries both messages.
    pub async fn execute_with_recovery<T, E1, E2, F1, Fut1, F2, Fut2>(
        &self,
        operation: &str,
        primary: F1,
        fallback: F2,
    ) -> Result<T, ResilienceError>
    where
        F1: FnOnce() -> Fut1,
        Fut1: Future<Output = Result<T, E1>>,
        E1: std::fmt::Display,
        F2: FnOnce() -> Fut2,
        Fut2: Future<Output = Result<T, E2>>,
        E2: std::fmt::Display,
    {
        let primary_error = match self.execute(operation, primary).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        tracing::warn!(operation, error = %primary_error, "Primary operation failed, trying fallback");

        match fallback().await {
            Ok(value) => {
                tracing::info!(operation, "Fallback operation succeeded");
                Ok(value)
            }
            Err(fallback_error) => {
                tracing::error!(operation, error = %fallback_error, "Fallback operation failed");
                Err(ResilienceError::BothOperationsFailed {
                    operation: operation.to_string(),
                    primary: primary_error.to_string(),
                    fallback: fallback_error.to_string(),
                })
            }
        }
    }

    /// State and failure count for every known operation.
    pub fn stats(&self) -> BTreeMap<String, BreakerStats> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stats()))
            .collect()
    }

    /// Whether any breaker is currently open.
    pub fn has_open_circuit(&self) -> bool {
        self.breakers.iter().any(|entry| entry.value().is_open())
    }

    pub fn reset(&self, operation: &str) {
        if let Some(breaker) = self.breakers.get(operation) {
            breaker.reset();
        }
    }

    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::CircuitState;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_breakers_are_per_operation() {
        let layer = ResilienceLayer::new(CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        });

        let _ = layer.execute("a", || async { Err::<(), _>("down") }).await;
        assert_eq!(layer.breaker("a").state(), CircuitState::Open);

        let ok = layer.execute("b", || async { Ok::<_, String>(1) }).await;
        assert_eq!(ok.unwrap(), 1);
        assert!(layer.has_open_circuit());

        let stats = layer.stats();
        assert_eq!(stats["a"].failure_count, 1);
        assert_eq!(stats["b"].state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_scenario_three_failures_then_reject() {
        let layer = ResilienceLayer::default();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let _ = layer
                .execute("ar.session", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>("crash")
                })
                .await;
        }
        assert_eq!(layer.breaker("ar.session").state(), CircuitState::Open);

        let fourth = layer
            .execute("ar.session", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(())
            })
            .await;
        assert!(fourth.unwrap_err().is_circuit_open());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_recovery_uses_fallback() {
        let layer = ResilienceLayer::default();
        let value = layer
            .execute_with_recovery(
                "pose",
                || async { Err::<u32, _>("primary down") },
                || async { Ok::<_, String>(42) },
            )
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_recovery_runs_fallback_when_open() {
        let layer = ResilienceLayer::new(CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        });
        let _ = layer.execute("pose", || async { Err::<u32, _>("down") }).await;

        let primary_calls = AtomicUsize::new(0);
        let value = layer
            .execute_with_recovery(
                "pose",
                || async {
                    primary_calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<u32, String>(1)
                },
                || async { Ok::<_, String>(2) },
            )
            .await
            .unwrap();
        assert_eq!(value, 2);
        assert_eq!(primary_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_both_failed_error() {
        let layer = ResilienceLayer::default();
        let err = layer
            .execute_with_recovery(
                "pose",
                || async { Err::<u32, _>("primary down") },
                || async { Err::<u32, _>("fallback down") },
            )
            .await
            .unwrap_err();
        match err {
            ResilienceError::BothOperationsFailed {
                operation,
                primary,
                fallback,
            } => {
                assert_eq!(operation, "pose");
                assert!(primary.contains("primary down"));
                assert_eq!(fallback, "fallback down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_operation_override_and_reset() {
        let layer = ResilienceLayer::default().with_operation_config(
            "fragile",
            CircuitBreakerConfig {
                failure_threshold: 1,
                timeout: Duration::from_secs(1),
                reset_timeout: Duration::from_secs(60),
            },
        );
        let _ = layer.execute("fragile", || async { Err::<(), _>("x") }).await;
        assert!(layer.breaker("fragile").is_open());

        layer.reset("fragile");
        assert_eq!(layer.breaker("fragile").state(), CircuitState::Closed);
        assert_eq!(layer.breaker("other").config().failure_threshold, 3);
    }
}
