//! Frame buffers and capture sources.
//!
//! A `FrameBuffer` is one captured image plus format/origin metadata. It has
//! exactly one owner at any time: ownership moves producer -> queue ->
//! consumer, and the buffer is destroyed (returned to the pool or freed) by
//! whichever stage holds it last. There is deliberately no `Clone` impl.
//!
//! Sources implement `FrameSource`:
//! - `capture` leases a buffer, or reports that none is available this cycle
//! - `release` returns or frees it; releasing the same buffer twice is
//!   rejected (statically by move semantics, and by the pool for any slot
//!   that is not currently leased)

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::Result;

/// Number of reusable buffers a pool-backed source holds by default.
pub const DEFAULT_POOL_SLOTS: usize = 2;

/// Pixel format tag carried by every frame.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Grayscale,
    Rgb565,
    Yuv422,
    /// Already in the wire-compatible compressed form; telemetry transmits
    /// it without re-encoding.
    Jpeg,
}

/// Where the frame memory came from, and therefore how it must die.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferOrigin {
    /// Belongs to the source's reusable pool; must be returned, not freed.
    Pool { slot: usize },
    /// One-off heap allocation; freed when the buffer drops.
    Heap,
}

/// One captured image: pixel data, dimensions, format and origin tags.
///
/// The pixel data is private; stages read it through [`FrameBuffer::data`]
/// and never mutate it.
#[derive(PartialEq, Eq)]
pub struct FrameBuffer {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub origin: BufferOrigin,
}

// Explicitly NOT implementing Clone: a FrameBuffer moves through the
// pipeline, it is never duplicated.

impl FrameBuffer {
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        origin: BufferOrigin,
    ) -> Self {
        Self {
            data,
            width,
            height,
            format,
            origin,
        }
    }

    /// Byte length of the pixel data.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read-only view of the pixel data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("len", &self.data.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("origin", &self.origin)
            .finish()
    }
}

/// Errors raised by the buffer pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolError {
    /// Every slot is currently leased; no buffer available this cycle.
    Exhausted,
    /// The slot exists but is not leased; returning it again is rejected.
    NotLeased { slot: usize },
    /// The slot index does not belong to this pool.
    BadSlot { slot: usize },
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Exhausted => write!(f, "frame pool exhausted"),
            PoolError::NotLeased { slot } => {
                write!(f, "frame pool slot {} is not leased", slot)
            }
            PoolError::BadSlot { slot } => {
                write!(f, "frame pool has no slot {}", slot)
            }
        }
    }
}

impl std::error::Error for PoolError {}

/// Fixed-size lease tracker for pool-owned frame memory.
///
/// The pool does not hold the bytes themselves (the driver does); it tracks
/// which slots are out, so that a slot can never be returned twice and a
/// source can never hand out more buffers than it owns.
pub struct FramePool {
    leased: Mutex<Vec<bool>>,
}

impl FramePool {
    pub fn new(slots: usize) -> Self {
        Self {
            leased: Mutex::new(vec![false; slots]),
        }
    }

    /// Lease a free slot, or report exhaustion.
    pub fn lease(&self) -> Result<usize, PoolError> {
        let mut leased = self.leased.lock().unwrap_or_else(|e| e.into_inner());
        match leased.iter().position(|taken| !taken) {
            Some(slot) => {
                leased[slot] = true;
                Ok(slot)
            }
            None => Err(PoolError::Exhausted),
        }
    }

    /// Return a leased slot. Rejects slots that are unknown or already free.
    pub fn give_back(&self, slot: usize) -> Result<(), PoolError> {
        let mut leased = self.leased.lock().unwrap_or_else(|e| e.into_inner());
        match leased.get_mut(slot) {
            Some(taken) if *taken => {
                *taken = false;
                Ok(())
            }
            Some(_) => Err(PoolError::NotLeased { slot }),
            None => Err(PoolError::BadSlot { slot }),
        }
    }

    /// Number of slots currently out.
    pub fn leased_count(&self) -> usize {
        let leased = self.leased.lock().unwrap_or_else(|e| e.into_inner());
        leased.iter().filter(|taken| **taken).count()
    }
}

/// A producer of frames.
///
/// The real sensor driver is an external collaborator; anything that can
/// lease a buffer per capture and take it back afterwards can stand behind
/// this trait.
pub trait FrameSource: Send + Sync {
    /// Capture one frame. `Ok(None)` means no buffer was available this
    /// cycle; the caller retries next cycle.
    fn capture(&self) -> Result<Option<FrameBuffer>>;

    /// Release a frame this source produced. Pool-owned buffers go back to
    /// the pool when `return_to_pool` is set; heap buffers are freed by the
    /// drop at the end of this call.
    fn release(&self, frame: FrameBuffer, return_to_pool: bool) -> Result<()>;
}

/// Configuration for the synthetic stub source.
#[derive(Clone, Debug)]
pub struct StubFrameConfig {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pool_slots: usize,
}

impl Default for StubFrameConfig {
    fn default() -> Self {
        Self {
            width: 96,
            height: 96,
            format: PixelFormat::Grayscale,
            pool_slots: DEFAULT_POOL_SLOTS,
        }
    }
}

/// Synthetic frame source backed by a [`FramePool`].
///
/// Generates deterministic non-zero pixel patterns so downstream stages have
/// something to chew on. Stands in for the camera driver in tests and demo
/// runs.
pub struct StubFrameSource {
    config: StubFrameConfig,
    pool: FramePool,
    counter: AtomicU64,
}

impl StubFrameSource {
    pub fn new(config: StubFrameConfig) -> Self {
        let pool = FramePool::new(config.pool_slots);
        Self {
            config,
            pool,
            counter: AtomicU64::new(0),
        }
    }

    /// Number of pool buffers currently out.
    pub fn leased_count(&self) -> usize {
        self.pool.leased_count()
    }

    fn frame_len(&self) -> usize {
        let pixels = (self.config.width * self.config.height) as usize;
        match self.config.format {
            PixelFormat::Grayscale => pixels,
            PixelFormat::Rgb565 | PixelFormat::Yuv422 => pixels * 2,
            // The stub only synthesizes raw formats; a Jpeg-configured stub
            // still emits one byte per pixel.
            PixelFormat::Jpeg => pixels,
        }
    }
}

impl FrameSource for StubFrameSource {
    fn capture(&self) -> Result<Option<FrameBuffer>> {
        let slot = match self.pool.lease() {
            Ok(slot) => slot,
            Err(PoolError::Exhausted) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let seed = self.counter.fetch_add(1, Ordering::Relaxed);
        let len = self.frame_len();
        let mut data = vec![0u8; len];
        for (i, byte) in data.iter_mut().enumerate() {
            // Values stay in 1..=255 so every frame has non-zero content.
            *byte = ((seed as usize + i) % 255) as u8 + 1;
        }

        Ok(Some(FrameBuffer::new(
            data,
            self.config.width,
            self.config.height,
            self.config.format,
            BufferOrigin::Pool { slot },
        )))
    }

    fn release(&self, frame: FrameBuffer, _return_to_pool: bool) -> Result<()> {
        match frame.origin {
            // Heap buffers are freed by the drop below.
            BufferOrigin::Heap => Ok(()),
            // The stub's pool memory is synthetic, so returning and freeing
            // are indistinguishable; the slot is recycled either way. A real
            // driver honors the flag.
            BufferOrigin::Pool { slot } => Ok(self.pool.give_back(slot)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_leases_until_exhausted() {
        let pool = FramePool::new(2);
        let a = pool.lease().unwrap();
        let b = pool.lease().unwrap();
        assert_ne!(a, b);
        assert_eq!(pool.lease(), Err(PoolError::Exhausted));

        pool.give_back(a).unwrap();
        assert_eq!(pool.lease().unwrap(), a);
    }

    #[test]
    fn pool_rejects_double_return() {
        let pool = FramePool::new(1);
        let slot = pool.lease().unwrap();
        pool.give_back(slot).unwrap();
        assert_eq!(pool.give_back(slot), Err(PoolError::NotLeased { slot }));
    }

    #[test]
    fn pool_rejects_unknown_slot() {
        let pool = FramePool::new(1);
        assert_eq!(pool.give_back(7), Err(PoolError::BadSlot { slot: 7 }));
    }

    #[test]
    fn stub_capture_produces_pool_frames() {
        let source = StubFrameSource::new(StubFrameConfig::default());
        let frame = source.capture().unwrap().expect("frame");

        assert_eq!(frame.len(), 96 * 96);
        assert_eq!(frame.format, PixelFormat::Grayscale);
        assert!(matches!(frame.origin, BufferOrigin::Pool { .. }));
        assert!(frame.data().iter().all(|&b| b > 0));
        assert_eq!(source.leased_count(), 1);

        source.release(frame, true).unwrap();
        assert_eq!(source.leased_count(), 0);
    }

    #[test]
    fn stub_capture_returns_none_when_pool_is_dry() {
        let source = StubFrameSource::new(StubFrameConfig {
            pool_slots: 2,
            ..StubFrameConfig::default()
        });
        let first = source.capture().unwrap().expect("frame");
        let _second = source.capture().unwrap().expect("frame");
        assert!(source.capture().unwrap().is_none());

        source.release(first, true).unwrap();
        assert!(source.capture().unwrap().is_some());
    }

    #[test]
    fn heap_frames_release_without_touching_the_pool() {
        let source = StubFrameSource::new(StubFrameConfig::default());
        let frame = FrameBuffer::new(
            vec![1, 2, 3],
            3,
            1,
            PixelFormat::Grayscale,
            BufferOrigin::Heap,
        );
        source.release(frame, false).unwrap();
        assert_eq!(source.leased_count(), 0);
    }
}
