//! Streaming consumer.
//!
//! The live-stream stage is a second, independently scheduled consumer of
//! the shared frame queue: it competes with telemetry for every published
//! frame. Its transport (HTTP/MJPEG serving) is opaque here; the consumer
//! hands each frame it wins to a caller-supplied handler and releases it.

use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::Result;

use crate::frame::{FrameBuffer, FrameSource};
use crate::queue::FrameTaker;

/// Handle to a running stream consumer thread.
pub struct StreamConsumer {
    handle: JoinHandle<u64>,
}

impl StreamConsumer {
    /// Spawn the consumer thread. It loops on `take()` until the queue
    /// closes (all publishers dropped), passing each frame to `handler` and
    /// releasing it afterwards. Handler errors are logged, never fatal.
    pub fn spawn<H>(
        taker: FrameTaker,
        source: Arc<dyn FrameSource>,
        return_to_pool: bool,
        mut handler: H,
    ) -> Self
    where
        H: FnMut(&FrameBuffer) -> Result<()> + Send + 'static,
    {
        let handle = std::thread::spawn(move || {
            let mut streamed = 0u64;
            while let Ok(frame) = taker.take() {
                match handler(&frame) {
                    Ok(()) => streamed += 1,
                    Err(e) => log::warn!("stream handler failed: {}", e),
                }
                if let Err(e) = source.release(frame, return_to_pool) {
                    log::warn!("stream frame release failed: {}", e);
                }
            }
            log::info!("stream consumer stopped after {} frames", streamed);
            streamed
        });
        Self { handle }
    }

    /// Wait for the thread to finish; returns how many frames it streamed.
    pub fn join(self) -> u64 {
        self.handle.join().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{StubFrameConfig, StubFrameSource};
    use crate::queue::{FrameQueue, QUEUE_DEPTH};
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn streams_frames_until_the_queue_closes() {
        let source = Arc::new(StubFrameSource::new(StubFrameConfig {
            pool_slots: 4,
            ..StubFrameConfig::default()
        }));
        let (publisher, taker) = FrameQueue::bounded(QUEUE_DEPTH);

        let seen = Arc::new(AtomicU64::new(0));
        let seen_in_handler = seen.clone();
        let consumer = StreamConsumer::spawn(taker, source.clone(), true, move |frame| {
            assert!(!frame.is_empty());
            seen_in_handler.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        for _ in 0..4 {
            let frame = source.capture().unwrap().expect("frame");
            publisher.publish(frame).unwrap();
        }
        drop(publisher);

        assert_eq!(consumer.join(), 4);
        assert_eq!(seen.load(Ordering::SeqCst), 4);
        assert_eq!(source.leased_count(), 0);
    }

    #[test]
    fn handler_errors_do_not_stop_the_stream() {
        let source = Arc::new(StubFrameSource::new(StubFrameConfig {
            pool_slots: 4,
            ..StubFrameConfig::default()
        }));
        let (publisher, taker) = FrameQueue::bounded(QUEUE_DEPTH);

        let mut failed_once = false;
        let consumer = StreamConsumer::spawn(taker, source.clone(), true, move |_| {
            if !failed_once {
                failed_once = true;
                anyhow::bail!("transport hiccup");
            }
            Ok(())
        });

        for _ in 0..3 {
            let frame = source.capture().unwrap().expect("frame");
            publisher.publish(frame).unwrap();
        }
        drop(publisher);

        // First frame fails in the handler but is still released.
        assert_eq!(consumer.join(), 2);
        assert_eq!(source.leased_count(), 0);
    }
}
