//! Failure isolation for calls that can fail.
//!
//! Each named operation gets its own [`CircuitBreaker`]. The
//! [`ResilienceLayer`] creates breakers on demand and offers a
//! primary/fallback executor on top of them.
//!
//! | Setting             | Default |
//! |---------------------|---------|
//! | `failure_threshold` | 3       |
//! | `timeout`           | 5000ms  |
//! | `reset_timeout`     | 10000ms |

mod circuit_breaker;
mod error;
mod recovery;

pub use circuit_breaker::{BreakerStats, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::ResilienceError;
pub use recovery::ResilienceLayer;
