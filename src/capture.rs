//! The driving capture loop.
//!
//! One cycle walks the states Capturing -> Inferring -> Publishing ->
//! Delegating -> Pacing and back to idle. Every per-cycle failure (no frame,
//! inference error, telemetry error) degrades gracefully: it is logged and
//! the loop moves on. The loop only stops when shutdown is requested or the
//! queue closes underneath it.
//!
//! Inference runs on a borrowed, read-only view of the frame *before*
//! ownership moves into the queue, so the buffer is never visible to two
//! owners at once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::classify::{ClassifierRunner, InferenceEngine};
use crate::frame::FrameSource;
use crate::queue::FramePublisher;
use crate::telemetry::{TelemetryConsumer, TelemetrySink};

/// What one pass through the cycle did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Full cycle: captured, inferred, published, delegated.
    Completed,
    /// No frame was available; everything downstream was skipped.
    SkippedCapture,
    /// The queue closed; the pipeline is tearing down.
    Stopped,
}

/// The capture/inference/telemetry driver.
///
/// All collaborators and policies arrive at construction; the loop keeps no
/// ambient state.
pub struct CaptureLoop<E, S> {
    source: Arc<dyn FrameSource>,
    publisher: FramePublisher,
    runner: ClassifierRunner<E>,
    telemetry: TelemetryConsumer<S>,
    pace: Duration,
    shutdown: Arc<AtomicBool>,
}

impl<E: InferenceEngine, S: TelemetrySink> CaptureLoop<E, S> {
    pub fn new(
        source: Arc<dyn FrameSource>,
        publisher: FramePublisher,
        runner: ClassifierRunner<E>,
        telemetry: TelemetryConsumer<S>,
        pace: Duration,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            publisher,
            runner,
            telemetry,
            pace,
            shutdown,
        }
    }

    /// Run cycles until shutdown is requested or the queue closes.
    pub fn run(&mut self) {
        log::info!(
            "capture loop running (pace {} ms, engine expects {} elements)",
            self.pace.as_millis(),
            self.runner.expected_len()
        );
        while !self.shutdown.load(Ordering::SeqCst) {
            if self.run_cycle() == CycleOutcome::Stopped {
                break;
            }
            // Pacing: coarse duty-cycle limiter, not a real-time guarantee.
            std::thread::sleep(self.pace);
        }
        log::info!("capture loop stopped");
    }

    /// One pass through the state machine.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        // Capturing
        let frame = match self.source.capture() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                log::info!("no frame available this cycle");
                return CycleOutcome::SkippedCapture;
            }
            Err(e) => {
                log::warn!("capture failed: {}", e);
                return CycleOutcome::SkippedCapture;
            }
        };

        // Inferring: borrow the frame while this loop still owns it.
        match self.runner.run(Some(frame.data())) {
            Ok(result) => result.log_report(),
            Err(e) => log::warn!("inference failed: {}", e),
        }

        // Publishing: ownership moves to whichever consumer wins the take.
        if self.publisher.publish(frame).is_err() {
            log::warn!("frame queue closed; stopping capture");
            return CycleOutcome::Stopped;
        }

        // Delegating: telemetry competes for a queued frame and fails closed
        // when it loses the race.
        if let Err(e) = self.telemetry.handle() {
            log::warn!("telemetry cycle failed: {}", e);
        }

        CycleOutcome::Completed
    }
}
