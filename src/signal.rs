//! Pull-based feature signals.
//!
//! The classification engine never sees the whole feature buffer; it pulls
//! sub-ranges on demand through [`SignalSource`]. On the target hardware the
//! feature buffer may live in memory too slow (or too large) to stage in RAM
//! at once, so the adapter hands out only the window the engine currently
//! needs.

use std::fmt;

/// Errors raised by signal adapters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalError {
    /// The requested range falls outside `[0, total_len)`.
    OutOfRange {
        offset: usize,
        len: usize,
        total: usize,
    },
}

impl fmt::Display for SignalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalError::OutOfRange { offset, len, total } => write!(
                f,
                "signal range {}..{} exceeds total length {}",
                offset,
                offset + len,
                total
            ),
        }
    }
}

impl std::error::Error for SignalError {}

/// A virtual, read-only numeric view the engine pulls windows from.
///
/// Implementations must fill exactly `out.len()` elements from
/// `[offset, offset + out.len())` and must never mutate the underlying
/// buffer. Requests outside `[0, total_len)` are reported, never silently
/// truncated.
pub trait SignalSource {
    /// Total element count of the logical signal.
    fn total_len(&self) -> usize;

    /// Copy `out.len()` elements starting at `offset` into `out`.
    fn fetch(&self, offset: usize, out: &mut [u8]) -> Result<(), SignalError>;
}

/// Windowed adapter over a captured buffer.
///
/// Constructed fresh for each inference call and discarded right after; it
/// borrows the buffer and cannot outlive it.
pub struct LazySignalAdapter<'a> {
    source: &'a [u8],
    total_len: usize,
}

impl<'a> LazySignalAdapter<'a> {
    /// Adapter over the full buffer.
    pub fn over(source: &'a [u8]) -> Self {
        Self {
            source,
            total_len: source.len(),
        }
    }

    /// Adapter exposing only the first `total_len` elements of `source`.
    pub fn with_total(source: &'a [u8], total_len: usize) -> Result<Self, SignalError> {
        if total_len > source.len() {
            return Err(SignalError::OutOfRange {
                offset: 0,
                len: total_len,
                total: source.len(),
            });
        }
        Ok(Self { source, total_len })
    }
}

impl SignalSource for LazySignalAdapter<'_> {
    fn total_len(&self) -> usize {
        self.total_len
    }

    fn fetch(&self, offset: usize, out: &mut [u8]) -> Result<(), SignalError> {
        let len = out.len();
        let end = offset.checked_add(len).filter(|end| *end <= self.total_len);
        let Some(end) = end else {
            return Err(SignalError::OutOfRange {
                offset,
                len,
                total: self.total_len,
            });
        };
        out.copy_from_slice(&self.source[offset..end]);
        Ok(())
    }
}
