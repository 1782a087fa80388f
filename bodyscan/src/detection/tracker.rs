//! Continuous tracking loop.
//!
//! Pulls frames from a [`FrameSource`] at the interval set in the shared
//! [`TuningState`], runs them through the [`DetectionPipeline`] and
//! broadcasts every result.
//!
//! ```text
//! start() ──► spawn ──► [wait frame interval] ──► next_frame ──► detect ──► broadcast
//!                              ▲                                              │
//!                              └──────────────────────────────────────────────┘
//! stop()  ──► active = false, cancel token, abort task (returns immediately)
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::pipeline::DetectionPipeline;
use super::types::{DetectionError, DetectionResult, Frame};
use crate::performance::TuningState;
use crate::BoxFuture;

/// Results buffered per subscriber before lagging receivers drop entries.
const RESULT_CHANNEL_CAPACITY: usize = 64;

/// Supplier of camera frames.
pub trait FrameSource: Send + Sync {
    /// Next frame. [`DetectionError::SourceExhausted`] ends tracking.
    fn next_frame(&self) -> BoxFuture<'_, Result<Frame, DetectionError>>;
}

#[derive(Default)]
struct TrackerTask {
    token: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

/// Handle for the background tracking loop.
pub struct ContinuousTracker {
    pipeline: Arc<DetectionPipeline>,
    source: Arc<dyn FrameSource>,
    tuning: Arc<TuningState>,
    active: Arc<AtomicBool>,
    frames_processed: Arc<AtomicU64>,
    results: broadcast::Sender<DetectionResult>,
    task: Mutex<TrackerTask>,
}

impl ContinuousTracker {
    pub fn new(
        pipeline: Arc<DetectionPipeline>,
        source: Arc<dyn FrameSource>,
        tuning: Arc<TuningState>,
    ) -> Self {
        let (results, _) = broadcast::channel(RESULT_CHANNEL_CAPACITY);
        Self {
            pipeline,
            source,
            tuning,
            active: Arc::new(AtomicBool::new(false)),
            frames_processed: Arc::new(AtomicU64::new(0)),
            results,
            task: Mutex::new(TrackerTask::default()),
        }
    }

    /// Receive every detection result produced from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DetectionResult> {
        self.results.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    /// Start tracking. Returns `false` if already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> bool {
        let mut task = self.task.lock();
        if self.active.swap(true, Ordering::SeqCst) {
            return false;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(tracking_loop(
            Arc::clone(&self.pipeline),
            Arc::clone(&self.source),
            Arc::clone(&self.tuning),
            Arc::clone(&self.active),
            Arc::clone(&self.frames_processed),
            self.results.clone(),
            token.clone(),
        ));

        task.token = Some(token);
        task.handle = Some(handle);
        tracing::info!("Continuous tracking started");
        true
    }

    /// Stop tracking immediately.
    ///
    /// `is_active()` is `false` when this returns; an in-flight detection is
    /// abandoned.
    pub fn stop(&self) {
        let mut task = self.task.lock();
        let was_active = self.active.swap(false, Ordering::SeqCst);
        if let Some(token) = task.token.take() {
            token.cancel();
        }
        if let Some(handle) = task.handle.take() {
            handle.abort();
        }
        if was_active {
            tracing::info!(frames = self.frames_processed(), "Continuous tracking stopped");
        }
    }
}

impl Drop for ContinuousTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn tracking_loop(
    pipeline: Arc<DetectionPipeline>,
    source: Arc<dyn FrameSource>,
    tuning: Arc<TuningState>,
    active: Arc<AtomicBool>,
    frames_processed: Arc<AtomicU64>,
    results: broadcast::Sender<DetectionResult>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(tuning.frame_interval()) => {}
        }

        let frame = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            frame = source.next_frame() => frame,
        };

        let frame = match frame {
            Ok(frame) => frame,
            Err(DetectionError::SourceExhausted) => {
                tracing::info!("Frame source exhausted, tracking ends");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Frame acquisition failed");
                continue;
            }
        };

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            result = pipeline.detect(&frame) => result,
        };

        frames_processed.fetch_add(1, Ordering::Relaxed);
        // No subscribers is fine
        let _ = results.send(result);
    }

    // A cancelled loop was already marked inactive by stop()
    if !token.is_cancelled() {
        active.store(false, Ordering::SeqCst);
    }
}
