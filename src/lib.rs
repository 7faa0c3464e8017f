//! AutoEye edge vision pipeline.
//!
//! AutoEye repeatedly captures a camera frame, makes it available to several
//! competing consumers without duplicating the buffer, and classifies the
//! captured data through a pull-based signal adapter.
//!
//! # Architecture
//!
//! ```text
//! FrameSource -> CaptureLoop -> ClassifierRunner (borrowed view, synchronous)
//!                     |
//!                     v
//!                FrameQueue (depth 2, ownership transfer)
//!                   /    \
//!       TelemetryConsumer  StreamConsumer   (each frame goes to exactly one)
//! ```
//!
//! Invariants the design leans on:
//!
//! 1. A `FrameBuffer` has exactly one owner at any time; it moves through
//!    the pipeline and is released (pool return or free) exactly once.
//! 2. The queue never drops and never duplicates: publish blocks on a full
//!    queue, take blocks on an empty one, and each frame reaches exactly
//!    one taker.
//! 3. The classifier only ever sees a borrowed, read-only view of a frame
//!    the loop still owns, pulled window-by-window through the signal
//!    adapter.
//! 4. Per-cycle failures (capture, inference, compression, transport) are
//!    logged and the loop continues; only startup failures are fatal.
//!
//! # Module Structure
//!
//! - `frame`: frame buffers, pool lease tracking, capture sources
//! - `queue`: the bounded frame relay
//! - `signal`: pull-based feature signals for the engine
//! - `classify`: engine seam, results, and the runner
//! - `telemetry`: MQTT sink and the telemetry consumer
//! - `stream`: the competing stream consumer
//! - `capture`: the driving loop
//! - `config`: file + env configuration

pub mod capture;
pub mod classify;
pub mod config;
pub mod frame;
pub mod queue;
pub mod signal;
pub mod stream;
pub mod telemetry;

pub use capture::{CaptureLoop, CycleOutcome};
pub use classify::{
    ClassificationResult, ClassifierRunner, Detection, EngineStatus, InferenceEngine,
    InferenceError, StubEngine, Timing,
};
pub use config::{AppConfig, CaptureSettings, MqttSettings, TelemetrySettings};
pub use frame::{
    BufferOrigin, FrameBuffer, FramePool, FrameSource, PixelFormat, PoolError, StubFrameConfig,
    StubFrameSource, DEFAULT_POOL_SLOTS,
};
pub use queue::{FramePublisher, FrameQueue, FrameTaker, QueueError, QUEUE_DEPTH};
pub use signal::{LazySignalAdapter, SignalError, SignalSource};
pub use stream::StreamConsumer;
pub use telemetry::{MqttRuntime, MqttSink, TelemetryConsumer, TelemetryError, TelemetrySink};
