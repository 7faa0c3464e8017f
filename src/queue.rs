//! Bounded frame relay between the capture loop and its consumers.
//!
//! The queue carries `FrameBuffer` handles, never copies. Publishing blocks
//! while the queue is full (backpressure, no drop); taking blocks while it
//! is empty. Two consumers competing on `take` each receive a disjoint
//! subset of the published frames: there is no broadcast, each frame is
//! delivered to exactly one taker.
//!
//! The blocking calls are the primary contract. The `_timeout` variants and
//! the disconnect-based close (`QueueError::Closed` once the other side is
//! gone) exist so the daemon can shut down without abandoning a blocked
//! thread.

use std::fmt;
use std::time::Duration;

use crate::frame::FrameBuffer;

/// Queue capacity in frame handles, matching the driver's two in-flight
/// capture buffers.
pub const QUEUE_DEPTH: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueError {
    /// The other side of the queue has been dropped; no more traffic.
    Closed,
    /// A bounded wait elapsed without a slot (publish) or a frame (take).
    Timeout,
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::Closed => write!(f, "frame queue closed"),
            QueueError::Timeout => write!(f, "frame queue wait timed out"),
        }
    }
}

impl std::error::Error for QueueError {}

/// The frame queue; construct one with [`FrameQueue::bounded`].
pub struct FrameQueue;

impl FrameQueue {
    /// Create a bounded queue of `depth` frame handles and return the two
    /// ends. Both ends clone; clones share the same channel.
    pub fn bounded(depth: usize) -> (FramePublisher, FrameTaker) {
        let (tx, rx) = flume::bounded(depth);
        (FramePublisher { tx }, FrameTaker { rx })
    }
}

/// Producer end. Dropping every clone closes the queue for takers once the
/// remaining frames drain.
#[derive(Clone)]
pub struct FramePublisher {
    tx: flume::Sender<FrameBuffer>,
}

impl FramePublisher {
    /// Publish one frame, blocking until a slot frees. The frame is moved
    /// into the queue; a frame published into a closed queue is dropped with
    /// the error, which only happens while the pipeline is tearing down.
    pub fn publish(&self, frame: FrameBuffer) -> Result<(), QueueError> {
        self.tx.send(frame).map_err(|_| QueueError::Closed)
    }

    /// Publish with a bounded wait.
    pub fn publish_timeout(&self, frame: FrameBuffer, wait: Duration) -> Result<(), QueueError> {
        self.tx.send_timeout(frame, wait).map_err(|e| match e {
            flume::SendTimeoutError::Timeout(_) => QueueError::Timeout,
            flume::SendTimeoutError::Disconnected(_) => QueueError::Closed,
        })
    }
}

/// Consumer end. Clone it to add a competing consumer.
#[derive(Clone)]
pub struct FrameTaker {
    rx: flume::Receiver<FrameBuffer>,
}

impl FrameTaker {
    /// Take ownership of exactly one frame, blocking until one is available.
    pub fn take(&self) -> Result<FrameBuffer, QueueError> {
        self.rx.recv().map_err(|_| QueueError::Closed)
    }

    /// Take with a bounded wait.
    pub fn take_timeout(&self, wait: Duration) -> Result<FrameBuffer, QueueError> {
        self.rx.recv_timeout(wait).map_err(|e| match e {
            flume::RecvTimeoutError::Timeout => QueueError::Timeout,
            flume::RecvTimeoutError::Disconnected => QueueError::Closed,
        })
    }
}
