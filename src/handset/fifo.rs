//! Outbound frame FIFO.
//!
//! Frames are stored as `[len][len bytes]`. Every push and pop is a single
//! critical section so the RF timer context and the polling loop never see
//! half a record; no I/O happens while the lock is held.

use std::sync::{Mutex, MutexGuard};

use bytes::{Buf, BufMut, BytesMut};
use tracing::trace;

use crate::crsf::protocol::CRSF_MAX_PACKET_LEN;
use crate::error::FrameError;

/// Default capacity in bytes
pub const SERIAL_OUT_FIFO_SIZE: usize = 256;

/// Bounded, locked queue of length-prefixed frames
#[derive(Debug)]
pub struct OutputFifo {
    inner: Mutex<BytesMut>,
    capacity: usize,
}

impl Default for OutputFifo {
    fn default() -> Self {
        Self::new(SERIAL_OUT_FIFO_SIZE)
    }
}

impl OutputFifo {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(BytesMut::with_capacity(capacity)),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BytesMut> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append one frame, all or nothing
    ///
    /// # Errors
    ///
    /// [`FrameError::Framing`] for frames longer than [`CRSF_MAX_PACKET_LEN`],
    /// [`FrameError::QueueFull`] when `1 + frame.len()` bytes do not fit.
    /// Nothing is written in either case.
    pub fn push_frame(&self, frame: &[u8]) -> Result<(), FrameError> {
        if frame.len() > CRSF_MAX_PACKET_LEN {
            return Err(FrameError::Framing { len: frame.len() });
        }
        let mut buf = self.lock();
        let needed = frame.len() + 1;
        let free = self.capacity - buf.len();
        if needed > free {
            return Err(FrameError::QueueFull { needed, free });
        }
        buf.put_u8(frame.len() as u8);
        buf.put_slice(frame);
        trace!("queued {} byte frame, {} bytes in fifo", frame.len(), buf.len());
        Ok(())
    }

    /// Pop the oldest frame into `out`, returning its length
    ///
    /// Bytes beyond `out.len()` are dropped with the record.
    pub fn pop_frame(&self, out: &mut [u8]) -> Option<usize> {
        let mut buf = self.lock();
        if !buf.has_remaining() {
            return None;
        }
        let len = (buf.get_u8() as usize).min(buf.len());
        let take = len.min(out.len());
        buf.copy_to_slice(&mut out[..take]);
        buf.advance(len - take);
        Some(take)
    }

    /// Drop everything queued
    pub fn flush(&self) {
        self.lock().clear();
    }

    /// Bytes currently queued, including length prefixes
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_preserves_order() {
        let fifo = OutputFifo::default();
        fifo.push_frame(&[1, 2, 3]).unwrap();
        fifo.push_frame(&[4, 5]).unwrap();
        assert_eq!(fifo.len(), 7);

        let mut out = [0u8; 64];
        assert_eq!(fifo.pop_frame(&mut out), Some(3));
        assert_eq!(&out[..3], &[1, 2, 3]);
        assert_eq!(fifo.pop_frame(&mut out), Some(2));
        assert_eq!(&out[..2], &[4, 5]);
        assert_eq!(fifo.pop_frame(&mut out), None);
        assert!(fifo.is_empty());
    }

    #[test]
    fn test_full_queue_drops_whole_frame() {
        let fifo = OutputFifo::new(10);
        fifo.push_frame(&[0xAA; 6]).unwrap();

        let err = fifo.push_frame(&[0xBB; 3]).unwrap_err();
        assert_eq!(err, FrameError::QueueFull { needed: 4, free: 3 });
        assert_eq!(fifo.len(), 7, "no partial write");

        fifo.push_frame(&[0xCC; 2]).unwrap();
        assert_eq!(fifo.len(), 10);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let fifo = OutputFifo::default();
        let err = fifo.push_frame(&[0x55; CRSF_MAX_PACKET_LEN + 1]).unwrap_err();
        assert_eq!(err, FrameError::Framing { len: CRSF_MAX_PACKET_LEN + 1 });
        assert!(fifo.is_empty());

        fifo.push_frame(&[0x55; CRSF_MAX_PACKET_LEN]).unwrap();
        let mut out = [0u8; CRSF_MAX_PACKET_LEN];
        assert_eq!(fifo.pop_frame(&mut out), Some(CRSF_MAX_PACKET_LEN));
    }

    #[test]
    fn test_flush_empties() {
        let fifo = OutputFifo::default();
        fifo.push_frame(&[1; 20]).unwrap();
        fifo.flush();
        assert!(fifo.is_empty());
        assert_eq!(fifo.capacity(), SERIAL_OUT_FIFO_SIZE);
    }

    #[test]
    fn test_pop_into_short_buffer_discards_excess() {
        let fifo = OutputFifo::default();
        fifo.push_frame(&[9; 8]).unwrap();
        fifo.push_frame(&[7]).unwrap();

        let mut out = [0u8; 4];
        assert_eq!(fifo.pop_frame(&mut out), Some(4));
        assert_eq!(fifo.pop_frame(&mut out), Some(1));
        assert_eq!(out[0], 7);
    }
}
