//! Windowed output towards the handset.
//!
//! On a half-duplex line we may only talk in the gap after each handset
//! frame, so output is metered per RC period and long frames are split
//! across successive windows. On a full-duplex line the limit is the
//! handset's telemetry FIFO.

use tracing::{trace, warn};

use super::duplex::{DuplexController, LinePins};
use super::fifo::OutputFifo;
use crate::crsf::protocol::CRSF_MAX_PACKET_LEN;
use crate::serial::HandsetPort;

/// Smallest telemetry FIFO of an EdgeTX handset with CRSF
pub const HANDSET_TELEMETRY_FIFO_SIZE: usize = 128;

/// Size of a Lua parameter chunk query from the handset
pub const LUA_CHUNK_QUERY_SIZE: usize = 26;

/// Lower bound of a half-duplex window, enough for link stats or a sync frame
pub const MIN_WINDOW_BYTES: usize = 10;

/// Byte budgets derived from the line speed and RC rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowBudget {
    /// Bytes that fit in one RC period
    pub max_period_bytes: usize,
    /// Bytes we may send in one window
    pub max_packet_bytes: usize,
}

impl Default for WindowBudget {
    fn default() -> Self {
        Self {
            max_period_bytes: CRSF_MAX_PACKET_LEN,
            max_packet_bytes: CRSF_MAX_PACKET_LEN,
        }
    }
}

impl WindowBudget {
    /// Budget for `baud` at one RC frame every `packet_interval_us`
    ///
    /// A period holds `baud / 10 / rate * 87%` bytes (the rest is turnaround
    /// and processing), capped at the handset FIFO. A single window gets what
    /// is left after the handset's own traffic, at most one full frame.
    ///
    /// # Examples
    ///
    /// ```
    /// use crsf_handset::handset::scheduler::WindowBudget;
    ///
    /// let budget = WindowBudget::compute(115_200, 4_000);
    /// assert_eq!(budget.max_period_bytes, 40);
    /// assert_eq!(budget.max_packet_bytes, 14);
    /// ```
    pub fn compute(baud: u32, packet_interval_us: u32) -> Self {
        let packets_per_second = (1_000_000 / packet_interval_us.max(1)).max(1) as usize;
        let max_period_bytes =
            (baud as usize / 10 / packets_per_second * 87 / 100).min(HANDSET_TELEMETRY_FIFO_SIZE);
        let reserved = (max_period_bytes / 2).max(LUA_CHUNK_QUERY_SIZE);
        let max_packet_bytes = max_period_bytes.saturating_sub(reserved).min(CRSF_MAX_PACKET_LEN);

        Self {
            max_period_bytes,
            max_packet_bytes,
        }
    }
}

/// Drains the output FIFO within per-window budgets
#[derive(Debug)]
pub struct OutputScheduler {
    half_duplex: bool,
    budget: WindowBudget,
    out_buffer: [u8; CRSF_MAX_PACKET_LEN],
    remaining: usize,
    offset: usize,
    transmitting: bool,
}

impl OutputScheduler {
    pub fn new(half_duplex: bool) -> Self {
        Self {
            half_duplex,
            budget: WindowBudget::default(),
            out_buffer: [0u8; CRSF_MAX_PACKET_LEN],
            remaining: 0,
            offset: 0,
            transmitting: false,
        }
    }

    pub fn set_budget(&mut self, budget: WindowBudget) {
        self.budget = budget;
    }

    pub fn budget(&self) -> WindowBudget {
        self.budget
    }

    /// No frame partly sent
    pub fn is_idle(&self) -> bool {
        self.remaining == 0
    }

    /// A half-duplex burst is in progress
    pub fn is_transmitting(&self) -> bool {
        self.transmitting
    }

    /// Mark the burst finished; the caller turns the line around
    pub fn end_transmit(&mut self) {
        self.transmitting = false;
    }

    /// Forget any partly sent frame
    pub fn reset(&mut self) {
        self.remaining = 0;
        self.offset = 0;
    }

    /// Bytes allowed in this window, given how many the handset just sent
    pub fn window_budget(&self, received_bytes: usize) -> usize {
        if !self.half_duplex {
            return HANDSET_TELEMETRY_FIFO_SIZE;
        }
        let period = self.budget.max_period_bytes.max(1);
        let left_in_period = period - received_bytes % period;
        left_in_period.min(self.budget.max_packet_bytes).max(MIN_WINDOW_BYTES)
    }

    /// Write up to one window's worth of queued output
    ///
    /// Continues a partly sent frame first, then pops whole frames until the
    /// window or the queue is exhausted. Returns the number of bytes written.
    pub fn service<P: HandsetPort, L: LinePins>(
        &mut self,
        received_bytes: usize,
        fifo: &OutputFifo,
        port: &mut P,
        duplex: &mut DuplexController<L>,
        inverted: bool,
    ) -> usize {
        if self.remaining == 0 && fifo.is_empty() {
            return 0;
        }

        let mut window = self.window_budget(received_bytes);
        if self.half_duplex && !self.transmitting {
            self.transmitting = true;
            duplex.set_transmit_mode(inverted);
        }

        let mut written = 0;
        loop {
            if self.remaining == 0 {
                match fifo.pop_frame(&mut self.out_buffer) {
                    Some(len) => {
                        self.remaining = len;
                        self.offset = 0;
                    }
                    None => break,
                }
            }

            let chunk = self.remaining.min(window);
            if let Err(e) = port.write_all(&self.out_buffer[self.offset..self.offset + chunk]) {
                warn!("Failed to write {} bytes to handset: {}", chunk, e);
            }
            self.offset += chunk;
            self.remaining -= chunk;
            window -= chunk;
            written += chunk;

            if window == 0 || fifo.is_empty() {
                break;
            }
        }

        trace!(written, remaining = self.remaining, "output window serviced");
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handset::duplex::mocks::{LineOp, RecordingPins};
    use crate::serial::port_trait::mocks::MockSerialPort;

    fn frame(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| seed.wrapping_add(i as u8)).collect()
    }

    #[test]
    fn test_budget_compute() {
        assert_eq!(
            WindowBudget::compute(400_000, 4_000),
            WindowBudget { max_period_bytes: 128, max_packet_bytes: 64 }
        );
        assert_eq!(
            WindowBudget::compute(115_200, 4_000),
            WindowBudget { max_period_bytes: 40, max_packet_bytes: 14 }
        );
        // 50Hz at 400k: plenty of room, still one frame per window
        assert_eq!(WindowBudget::compute(400_000, 20_000).max_packet_bytes, 64);
        // Too slow to leave any room
        assert_eq!(WindowBudget::compute(115_200, 1_000).max_packet_bytes, 0);
        // Interval longer than a second does not divide by zero
        assert_eq!(WindowBudget::compute(115_200, 2_000_000).max_period_bytes, 128);
    }

    #[test]
    fn test_window_budget_full_duplex_is_fifo_size() {
        let scheduler = OutputScheduler::new(false);
        assert_eq!(scheduler.window_budget(0), HANDSET_TELEMETRY_FIFO_SIZE);
        assert_eq!(scheduler.window_budget(26), HANDSET_TELEMETRY_FIFO_SIZE);
    }

    #[test]
    fn test_window_budget_half_duplex_clamps() {
        let mut scheduler = OutputScheduler::new(true);
        scheduler.set_budget(WindowBudget { max_period_bytes: 40, max_packet_bytes: 14 });
        assert_eq!(scheduler.window_budget(0), 14);
        assert_eq!(scheduler.window_budget(35), 10, "never below the minimum");
        assert_eq!(scheduler.window_budget(26), 14);
    }

    #[test]
    fn test_large_frame_split_across_windows() {
        let fifo = OutputFifo::default();
        let mut port = MockSerialPort::new();
        let pins = RecordingPins::default();
        let mut duplex = DuplexController::new(pins.clone());
        let mut scheduler = OutputScheduler::new(true);
        scheduler.set_budget(WindowBudget { max_period_bytes: 40, max_packet_bytes: 14 });

        let data = frame(64, 0x30);
        fifo.push_frame(&data).unwrap();

        let mut calls = 0;
        loop {
            let written = scheduler.service(0, &fifo, &mut port, &mut duplex, false);
            assert!(written > 0);
            calls += 1;
            if scheduler.is_idle() && fifo.is_empty() {
                break;
            }
        }

        assert_eq!(calls, 64usize.div_ceil(14));
        assert_eq!(port.written_bytes(), data, "bytes in order, none lost or repeated");

        let transmit_switches = pins.take().iter().filter(|op| matches!(op, LineOp::ConnectTx(_))).count();
        assert_eq!(transmit_switches, 1, "transmit mode engaged once per burst");
    }

    #[test]
    fn test_multiple_frames_share_window() {
        let fifo = OutputFifo::default();
        let mut port = MockSerialPort::new();
        let mut duplex = DuplexController::new(RecordingPins::default());
        let mut scheduler = OutputScheduler::new(false);

        fifo.push_frame(&frame(14, 1)).unwrap();
        fifo.push_frame(&frame(13, 2)).unwrap();

        assert_eq!(scheduler.service(0, &fifo, &mut port, &mut duplex, false), 27);
        assert!(fifo.is_empty());
        assert!(scheduler.is_idle());
        assert!(!scheduler.is_transmitting(), "full duplex never switches direction");
        assert_eq!(port.get_written_data().len(), 2);
    }

    #[test]
    fn test_partial_frame_finished_before_next() {
        let fifo = OutputFifo::default();
        let mut port = MockSerialPort::new();
        let mut duplex = DuplexController::new(RecordingPins::default());
        let mut scheduler = OutputScheduler::new(true);
        scheduler.set_budget(WindowBudget { max_period_bytes: 40, max_packet_bytes: 14 });

        let first = frame(20, 0x10);
        let second = frame(8, 0x80);
        fifo.push_frame(&first).unwrap();
        fifo.push_frame(&second).unwrap();

        assert_eq!(scheduler.service(0, &fifo, &mut port, &mut duplex, true), 14);
        assert!(!scheduler.is_idle());
        // 6 bytes finish the first frame, 8 more fit in the same window
        assert_eq!(scheduler.service(0, &fifo, &mut port, &mut duplex, true), 14);
        assert!(scheduler.is_idle());

        let mut expected = first.clone();
        expected.extend_from_slice(&second);
        assert_eq!(port.written_bytes(), expected);
    }

    #[test]
    fn test_failed_write_drops_chunk_and_moves_on() {
        let fifo = OutputFifo::default();
        let mut port = MockSerialPort::new();
        let mut duplex = DuplexController::new(RecordingPins::default());
        let mut scheduler = OutputScheduler::new(true);
        scheduler.set_budget(WindowBudget { max_period_bytes: 40, max_packet_bytes: 14 });

        fifo.push_frame(&frame(20, 0x10)).unwrap();
        port.set_write_error(std::io::ErrorKind::BrokenPipe);

        assert_eq!(scheduler.service(0, &fifo, &mut port, &mut duplex, false), 14);
        assert!(port.get_written_data().is_empty());
        assert!(!scheduler.is_idle(), "rest of the frame still pending");
        assert!(scheduler.is_transmitting(), "line stays in transmit until turned around");
        assert!(fifo.is_empty());

        assert_eq!(scheduler.service(0, &fifo, &mut port, &mut duplex, false), 6);
        assert!(scheduler.is_idle());
        assert_eq!(scheduler.service(0, &fifo, &mut port, &mut duplex, false), 0);
    }

    #[test]
    fn test_idle_service_writes_nothing() {
        let fifo = OutputFifo::default();
        let mut port = MockSerialPort::new();
        let pins = RecordingPins::default();
        let mut duplex = DuplexController::new(pins.clone());
        let mut scheduler = OutputScheduler::new(true);

        assert_eq!(scheduler.service(0, &fifo, &mut port, &mut duplex, false), 0);
        assert!(!scheduler.is_transmitting());
        assert!(pins.take().is_empty());
    }
}
