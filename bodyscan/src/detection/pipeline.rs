//! Ordered detection fallback chain.
//!
//! Strategies are tried in order and the first result that is `detected`
//! with `confidence >= threshold` wins; later strategies are not run. A
//! strategy error, or a breaker rejection when a [`ResilienceLayer`] is
//! attached, counts as "no result".
//!
//! ```text
//! frame ──► strategy[0] ──(below threshold / error)──► strategy[1] ──► ... ──► strategy[n]
//!               │                                          │                      │
//!            accepted                                   accepted           (none accepted)
//!               ▼                                          ▼                      ▼
//!            result                                     result         last-resort, exhausted
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::strategy::{CenteredFallbackStrategy, DetectionStrategy};
use super::types::{DetectionResult, Frame};
use crate::history::BoundedHistory;
use crate::measurement::Quality;
use crate::performance::{ProcessingQuality, TuningState};
use crate::resilience::ResilienceLayer;

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionConfig {
    /// Minimum confidence for a strategy result to be accepted.
    pub confidence_threshold: f64,
    /// Results retained for statistics.
    pub history_size: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            history_size: 10,
        }
    }
}

/// Aggregate statistics over the retained results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionStats {
    pub total_detections: usize,
    pub method_counts: BTreeMap<String, usize>,
    pub average_confidence: f64,
    pub quality_distribution: BTreeMap<Quality, usize>,
    pub exhausted_count: usize,
}

/// Multi-strategy body detector.
///
/// # Example
///
/// ```ignore
/// let pipeline = DetectionPipeline::builder(DetectionConfig::default())
///     .with_strategy(Arc::new(ArTrackingStrategy::new("arcore", backend)))
///     .with_strategy(Arc::new(ContourStrategy::default()))
///     .build();
///
/// let result = pipeline.detect(&frame).await;
/// if result.exhausted {
///     // low-confidence placeholder, warn before using it
/// }
/// ```
pub struct DetectionPipeline {
    config: DetectionConfig,
    strategies: Vec<Arc<dyn DetectionStrategy>>,
    last_resort: Arc<dyn DetectionStrategy>,
    resilience: Option<Arc<ResilienceLayer>>,
    tuning: Option<Arc<TuningState>>,
    history: Mutex<BoundedHistory<DetectionResult>>,
}

/// Builder for [`DetectionPipeline`].
pub struct DetectionPipelineBuilder {
    config: DetectionConfig,
    strategies: Vec<Arc<dyn DetectionStrategy>>,
    last_resort: Arc<dyn DetectionStrategy>,
    resilience: Option<Arc<ResilienceLayer>>,
    tuning: Option<Arc<TuningState>>,
}

impl DetectionPipelineBuilder {
    /// Append a strategy to the end of the chain.
    pub fn with_strategy(mut self, strategy: Arc<dyn DetectionStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Replace the default centred-template last resort.
    pub fn with_last_resort(mut self, strategy: Arc<dyn DetectionStrategy>) -> Self {
        self.last_resort = strategy;
        self
    }

    /// Run every strategy through per-strategy circuit breakers.
    pub fn with_resilience(mut self, resilience: Arc<ResilienceLayer>) -> Self {
        self.resilience = Some(resilience);
        self
    }

    /// Follow the optimizer's processing quality.
    pub fn with_tuning(mut self, tuning: Arc<TuningState>) -> Self {
        self.tuning = Some(tuning);
        self
    }

    pub fn build(self) -> DetectionPipeline {
        let history_size = self.config.history_size;
        DetectionPipeline {
            config: self.config,
            strategies: self.strategies,
            last_resort: self.last_resort,
            resilience: self.resilience,
            tuning: self.tuning,
            history: Mutex::new(BoundedHistory::new(history_size)),
        }
    }
}

impl DetectionPipeline {
    pub fn builder(config: DetectionConfig) -> DetectionPipelineBuilder {
        DetectionPipelineBuilder {
            config,
            strategies: Vec::new(),
            last_resort: Arc::new(CenteredFallbackStrategy::default()),
            resilience: None,
            tuning: None,
        }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Names of the chained strategies, in order, followed by the last resort.
    pub fn strategy_names(&self) -> Vec<String> {
        self.strategies
            .iter()
            .chain(std::iter::once(&self.last_resort))
            .map(|s| s.name().to_string())
            .collect()
    }

    /// Detect a body in the frame.
    ///
    /// Never fails: when nothing clears the threshold the last-resort result
    /// comes back with `quality = Poor` and `exhausted = true`.
    pub async fn detect(&self, frame: &Frame) -> DetectionResult {
        let skip_expensive = self
            .tuning
            .as_ref()
            .map(|t| t.quality() == ProcessingQuality::Low)
            .unwrap_or(false);

        for strategy in &self.strategies {
            if skip_expensive && strategy.is_expensive() {
                tracing::debug!(strategy = strategy.name(), "Skipping expensive strategy at low quality");
                continue;
            }

            let Some(result) = self.run_strategy(strategy.as_ref(), frame).await else {
                continue;
            };

            if result.detected && result.confidence >= self.config.confidence_threshold {
                tracing::debug!(
                    strategy = strategy.name(),
                    confidence = format!("{:.2}", result.confidence),
                    frame = frame.sequence,
                    "Detection accepted"
                );
                self.record(&result);
                return result;
            }

            tracing::debug!(
                strategy = strategy.name(),
                confidence = format!("{:.2}", result.confidence),
                threshold = self.config.confidence_threshold,
                "Detection below threshold"
            );
        }

        let result = self.exhausted_result(frame).await;
        tracing::warn!(
            frame = frame.sequence,
            method = %result.method,
            "All detection strategies below threshold, using last resort"
        );
        self.record(&result);
        result
    }

    async fn run_strategy(
        &self,
        strategy: &dyn DetectionStrategy,
        frame: &Frame,
    ) -> Option<DetectionResult> {
        let outcome = match &self.resilience {
            Some(resilience) => {
                let operation = format!("detect.{}", strategy.name());
                resilience
                    .execute(&operation, || strategy.detect(frame))
                    .await
                    .map_err(|e| e.to_string())
            }
            None => strategy.detect(frame).await.map_err(|e| e.to_string()),
        };

        match outcome {
            Ok(result) => Some(result),
            Err(error) => {
                tracing::debug!(strategy = strategy.name(), %error, "Strategy produced no result");
                None
            }
        }
    }

    async fn exhausted_result(&self, frame: &Frame) -> DetectionResult {
        let mut result = match self.last_resort.detect(frame).await {
            Ok(result) => result,
            Err(error) => {
                tracing::warn!(%error, "Last-resort strategy failed");
                DetectionResult::not_detected(self.last_resort.name())
            }
        };
        result.quality = Quality::Poor;
        result.exhausted = true;
        result
    }

    fn record(&self, result: &DetectionResult) {
        self.history.lock().push(result.clone());
    }

    /// Point-in-time copy of the retained results.
    pub fn history(&self) -> Vec<DetectionResult> {
        self.history.lock().snapshot()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    pub fn stats(&self) -> DetectionStats {
        let history = self.history.lock();
        let mut stats = DetectionStats {
            total_detections: history.len(),
            ..Default::default()
        };
        if history.is_empty() {
            return stats;
        }

        let mut confidence_sum = 0.0;
        for result in history.iter() {
            *stats.method_counts.entry(result.method.clone()).or_default() += 1;
            *stats.quality_distribution.entry(result.quality).or_default() += 1;
            if result.exhausted {
                stats.exhausted_count += 1;
            }
            confidence_sum += result.confidence;
        }
        stats.average_confidence = confidence_sum / history.len() as f64;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::landmarks::{BodyLandmarks, BoundingBox};
    use crate::detection::types::DetectionError;
    use crate::resilience::{CircuitBreakerConfig, ResilienceLayer};
    use crate::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Strategy returning a fixed confidence and counting invocations.
    struct ScriptedStrategy {
        name: String,
        confidence: Option<f64>,
        expensive: bool,
        calls: AtomicUsize,
    }

    impl ScriptedStrategy {
        fn new(name: &str, confidence: Option<f64>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                confidence,
                expensive: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn expensive(name: &str, confidence: f64) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                confidence: Some(confidence),
                expensive: true,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl DetectionStrategy for ScriptedStrategy {
        fn name(&self) -> &str {
            &self.name
        }

        fn is_expensive(&self) -> bool {
            self.expensive
        }

        fn detect<'a>(
            &'a self,
            frame: &'a Frame,
        ) -> BoxFuture<'a, Result<DetectionResult, DetectionError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                match self.confidence {
                    Some(c) => {
                        let bbox = BoundingBox::centered(frame.width(), frame.height());
                        let landmarks = BodyLandmarks::from_template(&bbox, 0.01, c, c);
                        Ok(DetectionResult::detected(self.name.clone(), landmarks, Quality::Good)
                            .with_confidence(c))
                    }
                    None => Err(DetectionError::BackendFailed {
                        backend: self.name.clone(),
                        message: "crashed".to_string(),
                    }),
                }
            })
        }
    }

    fn frame() -> Frame {
        Frame::blank(64, 64)
    }

    #[tokio::test]
    async fn test_first_result_above_threshold_wins() {
        let s1 = ScriptedStrategy::new("a", Some(0.4));
        let s2 = ScriptedStrategy::new("b", Some(0.3));
        let s3 = ScriptedStrategy::new("c", Some(0.85));
        let s4 = ScriptedStrategy::new("d", Some(0.95));
        let pipeline = DetectionPipeline::builder(DetectionConfig::default())
            .with_strategy(s1.clone())
            .with_strategy(s2.clone())
            .with_strategy(s3.clone())
            .with_strategy(s4.clone())
            .build();

        let result = pipeline.detect(&frame()).await;
        assert_eq!(result.method, "c");
        assert!((result.confidence - 0.85).abs() < 1e-9);
        assert!(!result.exhausted);
        assert_eq!((s1.calls(), s2.calls(), s3.calls(), s4.calls()), (1, 1, 1, 0));
    }

    #[tokio::test]
    async fn test_failing_strategy_is_skipped() {
        let broken = ScriptedStrategy::new("broken", None);
        let good = ScriptedStrategy::new("good", Some(0.9));
        let pipeline = DetectionPipeline::builder(DetectionConfig::default())
            .with_strategy(broken.clone())
            .with_strategy(good)
            .build();

        let result = pipeline.detect(&frame()).await;
        assert_eq!(result.method, "good");
        assert_eq!(broken.calls(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_chain_returns_last_resort() {
        let pipeline = DetectionPipeline::builder(DetectionConfig::default())
            .with_strategy(ScriptedStrategy::new("weak", Some(0.5)))
            .build();

        let result = pipeline.detect(&frame()).await;
        assert!(result.exhausted);
        assert!(result.detected);
        assert_eq!(result.method, "fallback");
        assert_eq!(result.quality, Quality::Poor);
        assert!(result.confidence < 0.7);
    }

    #[tokio::test]
    async fn test_stats_aggregate_history() {
        let pipeline = DetectionPipeline::builder(DetectionConfig {
            confidence_threshold: 0.7,
            history_size: 3,
        })
        .with_strategy(ScriptedStrategy::new("good", Some(0.9)))
        .build();

        for _ in 0..5 {
            pipeline.detect(&frame()).await;
        }
        let stats = pipeline.stats();
        assert_eq!(stats.total_detections, 3);
        assert_eq!(stats.method_counts.get("good"), Some(&3));
        assert!((stats.average_confidence - 0.9).abs() < 1e-9);
        assert_eq!(stats.quality_distribution.get(&Quality::Good), Some(&3));
        assert_eq!(stats.exhausted_count, 0);
    }

    #[tokio::test]
    async fn test_open_breaker_skips_strategy() {
        let resilience = Arc::new(ResilienceLayer::new(CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        }));
        let broken = ScriptedStrategy::new("broken", None);
        let pipeline = DetectionPipeline::builder(DetectionConfig::default())
            .with_strategy(broken.clone())
            .with_strategy(ScriptedStrategy::new("good", Some(0.9)))
            .with_resilience(resilience.clone())
            .build();

        pipeline.detect(&frame()).await;
        let result = pipeline.detect(&frame()).await;
        assert_eq!(result.method, "good");
        // Breaker opened after the first failure, so the second frame never reached it
        assert_eq!(broken.calls(), 1);
        assert!(resilience.stats().contains_key("detect.broken"));
    }

    #[tokio::test]
    async fn test_low_quality_skips_expensive_strategies() {
        let tuning = Arc::new(TuningState::default());
        tuning.set_quality(ProcessingQuality::Low);
        let heavy = ScriptedStrategy::expensive("heavy", 0.9);
        let pipeline = DetectionPipeline::builder(DetectionConfig::default())
            .with_strategy(heavy.clone())
            .with_strategy(ScriptedStrategy::new("light", Some(0.8)))
            .with_tuning(tuning.clone())
            .build();

        assert_eq!(pipeline.detect(&frame()).await.method, "light");
        assert_eq!(heavy.calls(), 0);

        tuning.set_quality(ProcessingQuality::High);
        assert_eq!(pipeline.detect(&frame()).await.method, "heavy");
    }

    #[test]
    fn test_strategy_names_include_last_resort() {
        let pipeline = DetectionPipeline::builder(DetectionConfig::default())
            .with_strategy(ScriptedStrategy::new("a", Some(0.1)))
            .build();
        assert_eq!(pipeline.strategy_names(), vec!["a", "fallback"]);
    }
}
