//! Inbound frame assembly and resynchronisation.
//!
//! Bytes are appended to a fixed 64-byte buffer and the buffer is compacted
//! so that it always starts at a frame marker (the transmitter address or the
//! sync byte). At most one frame is extracted per poll.

use std::io;

use tracing::trace;

use crate::crsf::decoder::validate_frame;
use crate::crsf::protocol::{
    CRSF_ADDRESS_CRSF_TRANSMITTER, CRSF_FRAME_NOT_COUNTED_BYTES, CRSF_HEADER_LEN, CRSF_MAX_PACKET_LEN,
    CRSF_MIN_PACKET_LEN, CRSF_SYNC_BYTE,
};
use crate::error::FrameError;
use crate::serial::HandsetPort;

/// Outcome of one extraction attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assembled {
    /// Not enough bytes buffered yet
    Incomplete,
    /// Declared length out of range; the marker was skipped
    Rejected(FrameError),
    /// A complete frame of `len` bytes sits at the front of the buffer
    Frame { len: usize, check: Result<(), FrameError> },
}

/// Fixed-capacity assembly buffer with a write cursor
#[derive(Debug)]
pub struct AssemblyBuffer {
    buf: [u8; CRSF_MAX_PACKET_LEN],
    len: usize,
}

impl Default for AssemblyBuffer {
    fn default() -> Self {
        Self::new()
    }
}

fn is_marker(byte: u8) -> bool {
    byte == CRSF_ADDRESS_CRSF_TRANSMITTER || byte == CRSF_SYNC_BYTE
}

impl AssemblyBuffer {
    pub fn new() -> Self {
        Self {
            buf: [0u8; CRSF_MAX_PACKET_LEN],
            len: 0,
        }
    }

    /// Bytes currently buffered
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Drop everything buffered
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Append received bytes, never more than the free space
    pub fn extend_from(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(CRSF_MAX_PACKET_LEN - self.len);
        self.buf[self.len..self.len + n].copy_from_slice(&data[..n]);
        self.len += n;
        n
    }

    /// Read what the port has buffered into the free space, then realign
    pub fn fill_from<P: HandsetPort>(&mut self, port: &mut P) -> io::Result<usize> {
        let available = port.bytes_available()?;
        let to_read = available.min(CRSF_MAX_PACKET_LEN - self.len);
        let read = if to_read > 0 {
            port.read(&mut self.buf[self.len..self.len + to_read])?
        } else {
            0
        };
        self.len += read;
        self.align_to_sync(0);
        Ok(read)
    }

    /// Shift the first marker at or after `start` to the front
    ///
    /// With no marker in range the whole buffer is noise and is discarded.
    /// Returns `true` if a marker was found.
    pub fn align_to_sync(&mut self, start: usize) -> bool {
        match self.buf[..self.len].iter().skip(start).position(|&b| is_marker(b)) {
            Some(found) => {
                let index = start + found;
                if index > 0 {
                    trace!("skipping {} bytes before frame marker", index);
                    self.consume(index);
                }
                true
            }
            None => {
                if self.len > 0 {
                    trace!("no frame marker in {} bytes, discarding", self.len);
                }
                self.len = 0;
                false
            }
        }
    }

    /// Try to frame the front of the buffer
    ///
    /// A rejected length realigns from the byte after the current marker; a
    /// complete frame stays buffered until [`consume`](Self::consume).
    pub fn extract(&mut self) -> Assembled {
        if self.len < CRSF_HEADER_LEN {
            return Assembled::Incomplete;
        }

        let total_len = self.buf[1] as usize + CRSF_FRAME_NOT_COUNTED_BYTES;
        if !(CRSF_MIN_PACKET_LEN..=CRSF_MAX_PACKET_LEN).contains(&total_len) {
            self.align_to_sync(1);
            return Assembled::Rejected(FrameError::Framing { len: total_len });
        }

        if self.len < total_len {
            return Assembled::Incomplete;
        }

        Assembled::Frame {
            len: total_len,
            check: validate_frame(&self.buf, total_len),
        }
    }

    /// Remove `n` bytes from the front, shifting the rest down
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.len);
        self.buf.copy_within(n..self.len, 0);
        self.len -= n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crsf::encoder::{encode_frame, encode_rc_channels_frame};
    use crate::crsf::protocol::{CRSF_ADDRESS_FLIGHT_CONTROLLER, CRSF_FRAMETYPE_LINK_STATISTICS};
    use crate::serial::port_trait::mocks::MockSerialPort;

    fn rc_frame() -> Vec<u8> {
        encode_rc_channels_frame(&[992u16; 16])
    }

    #[test]
    fn test_garbage_then_frame() {
        let frame = rc_frame();
        let garbage = [0x01, 0x55, 0x7F, 0x00, 0x13];
        let mut port = MockSerialPort::new();
        port.feed(&garbage);
        port.feed(&frame);

        let mut assembler = AssemblyBuffer::new();
        let read = assembler.fill_from(&mut port).unwrap();
        assert_eq!(read, garbage.len() + frame.len());
        assert_eq!(assembler.len(), frame.len(), "garbage prefix dropped");

        match assembler.extract() {
            Assembled::Frame { len, check } => {
                assert_eq!(len, frame.len());
                assert!(check.is_ok());
                assembler.consume(len);
            }
            other => panic!("expected frame, got {:?}", other),
        }
        assert!(assembler.is_empty());
        assert_eq!(assembler.extract(), Assembled::Incomplete);
    }

    #[test]
    fn test_no_marker_discards_everything() {
        let mut port = MockSerialPort::new();
        port.feed(&[0x01, 0x02, 0x03, 0x04]);

        let mut assembler = AssemblyBuffer::new();
        assembler.fill_from(&mut port).unwrap();
        assert!(assembler.is_empty());
    }

    #[test]
    fn test_out_of_range_length_realigns_past_marker() {
        let mut assembler = AssemblyBuffer::new();
        let frame = rc_frame();
        // Marker with a bogus length, then a real frame
        assembler.extend_from(&[CRSF_SYNC_BYTE, 0x70, 0x16]);
        assembler.extend_from(&frame);

        assert_eq!(assembler.extract(), Assembled::Rejected(FrameError::Framing { len: 0x72 }));
        assert_eq!(assembler.as_slice(), frame.as_slice());
        assert!(matches!(assembler.extract(), Assembled::Frame { check: Ok(()), .. }));
    }

    #[test]
    fn test_too_short_length_rejected() {
        let mut assembler = AssemblyBuffer::new();
        assembler.extend_from(&[CRSF_ADDRESS_CRSF_TRANSMITTER, 0x01, 0x00]);
        assert_eq!(assembler.extract(), Assembled::Rejected(FrameError::Framing { len: 3 }));
        assert!(assembler.is_empty());
    }

    #[test]
    fn test_waits_for_full_frame() {
        let frame = rc_frame();
        let mut assembler = AssemblyBuffer::new();
        assembler.extend_from(&frame[..10]);
        assert_eq!(assembler.extract(), Assembled::Incomplete);
        assert_eq!(assembler.len(), 10, "partial frame retained");

        assembler.extend_from(&frame[10..]);
        assert!(matches!(assembler.extract(), Assembled::Frame { check: Ok(()), .. }));
    }

    #[test]
    fn test_corrupt_frame_reported_with_length() {
        let mut frame = encode_frame(
            CRSF_ADDRESS_FLIGHT_CONTROLLER,
            CRSF_FRAMETYPE_LINK_STATISTICS,
            &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10],
        );
        frame[5] ^= 0x40;

        let mut assembler = AssemblyBuffer::new();
        assembler.extend_from(&frame);
        match assembler.extract() {
            Assembled::Frame { len, check } => {
                assert_eq!(len, frame.len());
                assert!(matches!(check, Err(FrameError::Crc { .. })));
            }
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn test_fill_respects_capacity() {
        let mut port = MockSerialPort::new();
        port.feed(&[CRSF_SYNC_BYTE; 100]);

        let mut assembler = AssemblyBuffer::new();
        assert_eq!(assembler.fill_from(&mut port).unwrap(), CRSF_MAX_PACKET_LEN);
        assert_eq!(port.pending_rx(), 100 - CRSF_MAX_PACKET_LEN);
        assert_eq!(assembler.fill_from(&mut port).unwrap(), 0);
    }

    #[test]
    fn test_consume_shifts_remainder() {
        let mut assembler = AssemblyBuffer::new();
        assembler.extend_from(&[CRSF_SYNC_BYTE, 1, 2, CRSF_SYNC_BYTE, 9]);
        assembler.consume(3);
        assert_eq!(assembler.as_slice(), &[CRSF_SYNC_BYTE, 9]);
    }
}
