//! EdgeTX mixer synchronisation.
//!
//! Each time the RF side transmits, the gap since the last handset frame is
//! folded into a running average. The handset is periodically told the RC
//! packet rate and this offset so it can shift its mixer to finish just
//! before our transmit slot. All values sent are in 100ns units.

use tracing::trace;

use crate::crsf::encoder::encode_timing_payload;

/// Minimum spacing between timing corrections
pub const SYNC_PACKET_INTERVAL_MS: u64 = 200;

/// Headroom subtracted from the offset (100µs)
pub const SYNC_OFFSET_SAFE_MARGIN: i32 = 1000;

/// Longest RC packet interval the estimator accepts
pub const MAX_PACKET_INTERVAL_US: u32 = 1_000_000;

/// Averaging window spans this much time
const SYNC_WINDOW_US: u32 = 20_000;

/// Phase estimator state
#[derive(Debug, Clone)]
pub struct MixerSync {
    packet_interval_us: u32,
    offset_100ns: i32,
    window: i32,
    window_size: i32,
    last_sent_ms: u64,
}

impl MixerSync {
    pub fn new(packet_interval_us: u32) -> Self {
        let mut sync = Self {
            packet_interval_us,
            offset_100ns: 0,
            window: 0,
            window_size: 1,
            last_sent_ms: 0,
        };
        sync.set_packet_interval_us(packet_interval_us);
        sync
    }

    /// Change the RC packet interval and restart estimation
    ///
    /// The window holds as many packets as fit in 20ms, at least one. The
    /// interval is clamped to `1..=MAX_PACKET_INTERVAL_US`.
    pub fn set_packet_interval_us(&mut self, packet_interval_us: u32) {
        let packet_interval_us = packet_interval_us.clamp(1, MAX_PACKET_INTERVAL_US);
        self.packet_interval_us = packet_interval_us;
        self.offset_100ns = 0;
        self.window = 0;
        self.window_size = (SYNC_WINDOW_US / packet_interval_us).max(1) as i32;
        self.last_sent_ms = 0;
    }

    pub fn packet_interval_us(&self) -> u32 {
        self.packet_interval_us
    }

    pub fn offset_100ns(&self) -> i32 {
        self.offset_100ns
    }

    pub fn window(&self) -> i32 {
        self.window
    }

    pub fn window_size(&self) -> i32 {
        self.window_size
    }

    /// Fold in one transmission that happened `delta_us` after the last
    /// handset frame arrived
    pub fn on_transmit(&mut self, delta_us: u64) {
        let interval = self.packet_interval_us as u64;
        if delta_us >= interval {
            // Missing or late handset frame: restart from the misalignment
            self.offset_100ns = to_100ns(delta_us % interval).saturating_neg();
            self.window = 0;
            self.last_sent_ms = self.last_sent_ms.saturating_sub(SYNC_PACKET_INTERVAL_MS);
            trace!(delta_us, offset = self.offset_100ns, "mixer sync: resync");
        } else {
            self.window = (self.window + 1).min(self.window_size);
            let sum = self.offset_100ns as i64 * (self.window - 1) as i64 + to_100ns(delta_us) as i64;
            self.offset_100ns = (sum / self.window as i64) as i32;
        }
    }

    /// Timing payload if a correction is due, marking it sent
    pub fn take_sync_payload(&mut self, now_ms: u64, connected: bool) -> Option<[u8; 9]> {
        if !connected || now_ms.saturating_sub(self.last_sent_ms) < SYNC_PACKET_INTERVAL_MS {
            return None;
        }

        let packet_rate = to_100ns(self.packet_interval_us as u64);
        let offset = self.offset_100ns.saturating_sub(SYNC_OFFSET_SAFE_MARGIN);
        self.last_sent_ms = now_ms;
        Some(encode_timing_payload(packet_rate, offset))
    }
}

fn to_100ns(us: u64) -> i32 {
    i32::try_from(us.saturating_mul(10)).unwrap_or(i32::MAX)
}
