//! Inference orchestration.
//!
//! The runner validates the captured buffer against the engine's fixed
//! input size, bridges it through a fresh [`LazySignalAdapter`], invokes the
//! engine, and hands the result back. It never retries and never takes
//! buffer ownership; the caller keeps the frame and releases it later.

use std::fmt;

use crate::classify::engine::{EngineStatus, InferenceEngine};
use crate::classify::result::ClassificationResult;
use crate::signal::LazySignalAdapter;

/// Inference-stage errors. All are reported and the capture cycle continues.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InferenceError {
    /// No buffer was supplied.
    NullInput,
    /// Buffer length differs from the model's fixed expected input size.
    SizeMismatch { expected: usize, actual: usize },
    /// The engine ran and reported a non-success status.
    EngineFailure(EngineStatus),
}

impl fmt::Display for InferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferenceError::NullInput => write!(f, "no input buffer"),
            InferenceError::SizeMismatch { expected, actual } => write!(
                f,
                "input size mismatch: expected {} elements, had {}",
                expected, actual
            ),
            InferenceError::EngineFailure(status) => {
                write!(f, "classifier failed ({})", status.code())
            }
        }
    }
}

impl std::error::Error for InferenceError {}

/// Runs the classification engine over captured buffers.
pub struct ClassifierRunner<E> {
    engine: E,
}

impl<E: InferenceEngine> ClassifierRunner<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Expected input length of the underlying engine.
    pub fn expected_len(&self) -> usize {
        self.engine.input_len()
    }

    /// Classify one captured buffer.
    ///
    /// Validation happens before the engine is touched: an absent buffer or
    /// a length that differs from the model's expected input size never
    /// reaches the engine.
    pub fn run(&mut self, data: Option<&[u8]>) -> Result<ClassificationResult, InferenceError> {
        let Some(data) = data else {
            return Err(InferenceError::NullInput);
        };

        let expected = self.engine.input_len();
        if data.len() != expected {
            return Err(InferenceError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }

        let signal = LazySignalAdapter::over(data);
        match self.engine.classify(&signal) {
            Ok(result) => Ok(result),
            Err(status) => Err(InferenceError::EngineFailure(status)),
        }
    }
}
