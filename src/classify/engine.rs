//! Classification engine seam.
//!
//! The engine's internal math is an external collaborator; the pipeline only
//! depends on this trait. An engine declares the fixed input length its
//! model was compiled for and classifies a pull-based signal.

use std::fmt;
use std::time::Instant;

use crate::classify::result::{ClassificationResult, Detection, Timing};
use crate::signal::SignalSource;

/// Status code reported by an engine. Zero is success; anything else is a
/// failure whose code is carried for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineStatus(pub i32);

impl EngineStatus {
    pub const OK: EngineStatus = EngineStatus(0);
    /// The engine could not read from the signal it was handed.
    pub const SIGNAL_READ_FAILED: EngineStatus = EngineStatus(-5);

    pub fn code(self) -> i32 {
        self.0
    }

    pub fn is_ok(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine status {}", self.0)
    }
}

/// A classification engine behind a pull-based signal interface.
pub trait InferenceEngine: Send {
    /// Fixed input length the model's DSP front end expects. A property of
    /// the compiled model, not of any particular buffer.
    fn input_len(&self) -> usize;

    /// Run the model over `signal`. The engine pulls the windows it needs;
    /// it never receives the whole buffer at once.
    fn classify(&mut self, signal: &dyn SignalSource)
        -> Result<ClassificationResult, EngineStatus>;
}

/// Window size the stub's fake DSP front end stages per pull.
const STUB_WINDOW: usize = 256;

/// Stub engine for tests and demo runs.
///
/// Pulls the signal window by window the way a real DSP front end stages
/// blocks, then reports one synthetic detection derived from mean intensity
/// (plus a zero-confidence background entry that reporting filters out).
pub struct StubEngine {
    input_len: usize,
    fail_status: Option<EngineStatus>,
    invocations: u64,
}

impl StubEngine {
    pub fn new(input_len: usize) -> Self {
        Self {
            input_len,
            fail_status: None,
            invocations: 0,
        }
    }

    /// Make every `classify` call fail with `status`.
    pub fn failing_with(input_len: usize, status: EngineStatus) -> Self {
        Self {
            input_len,
            fail_status: Some(status),
            invocations: 0,
        }
    }

    /// How many times `classify` has been invoked.
    pub fn invocations(&self) -> u64 {
        self.invocations
    }
}

impl InferenceEngine for StubEngine {
    fn input_len(&self) -> usize {
        self.input_len
    }

    fn classify(
        &mut self,
        signal: &dyn SignalSource,
    ) -> Result<ClassificationResult, EngineStatus> {
        self.invocations += 1;
        if let Some(status) = self.fail_status {
            return Err(status);
        }

        let dsp_started = Instant::now();
        let total = signal.total_len();
        let mut window = [0u8; STUB_WINDOW];
        let mut sum: u64 = 0;
        let mut offset = 0;
        while offset < total {
            let len = STUB_WINDOW.min(total - offset);
            signal
                .fetch(offset, &mut window[..len])
                .map_err(|_| EngineStatus::SIGNAL_READ_FAILED)?;
            sum += window[..len].iter().map(|&b| b as u64).sum::<u64>();
            offset += len;
        }
        let dsp_ms = dsp_started.elapsed().as_millis() as u32;

        let classify_started = Instant::now();
        let mean = if total > 0 { sum as f32 / total as f32 } else { 0.0 };
        let mut detections = Vec::new();
        if mean > 0.0 {
            let side = (total as f32).sqrt() as u32;
            detections.push(Detection {
                label: "object".to_string(),
                value: (mean / 255.0).clamp(0.01, 1.0),
                x: side / 4,
                y: side / 4,
                width: side / 2,
                height: side / 2,
            });
        }
        detections.push(Detection {
            label: "background".to_string(),
            value: 0.0,
            x: 0,
            y: 0,
            width: 0,
            height: 0,
        });
        let classification_ms = classify_started.elapsed().as_millis() as u32;

        Ok(ClassificationResult {
            timing: Timing {
                dsp_ms,
                classification_ms,
                anomaly_ms: 0,
            },
            detections,
        })
    }
}
