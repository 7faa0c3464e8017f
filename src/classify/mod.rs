mod engine;
mod result;
mod runner;

pub use engine::{EngineStatus, InferenceEngine, StubEngine};
pub use result::{ClassificationResult, Detection, Timing, MIN_REPORTED_CONFIDENCE};
pub use runner::{ClassifierRunner, InferenceError};
