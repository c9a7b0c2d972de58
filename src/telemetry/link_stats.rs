//! Link statistics towards the handset.

use tracing::trace;

use crate::crsf::encoder::make_link_statistics_frame;
use crate::crsf::protocol::LinkStatistics;
use crate::handset::HandsetHandle;

/// Default spacing between link statistics frames
pub const DEFAULT_LINK_STATS_INTERVAL_MS: u64 = 240;

/// Sends the latest link statistics at a fixed rate
///
/// Nothing is sent until the radio side reports a link, and the handle drops
/// frames while the handset is disconnected.
pub struct LinkStatsReporter {
    handle: HandsetHandle,
    interval_ms: u64,
    last_sent_ms: Option<u64>,
    stats: LinkStatistics,
    link_up: bool,
}

impl LinkStatsReporter {
    pub fn new(handle: HandsetHandle, interval_ms: u64) -> Self {
        Self {
            handle,
            interval_ms,
            last_sent_ms: None,
            stats: LinkStatistics::default(),
            link_up: false,
        }
    }

    /// Fresh statistics from the radio side; implies the link is up
    pub fn update(&mut self, stats: LinkStatistics) {
        self.stats = stats;
        self.link_up = true;
    }

    pub fn set_link_up(&mut self, link_up: bool) {
        self.link_up = link_up;
    }

    pub fn stats(&self) -> &LinkStatistics {
        &self.stats
    }

    /// Send if due; returns `true` when a frame was handed to the engine
    pub fn poll(&mut self, now_ms: u64) -> bool {
        if !self.link_up || !self.handle.is_connected() {
            return false;
        }
        if let Some(last) = self.last_sent_ms {
            if now_ms.saturating_sub(last) < self.interval_ms {
                return false;
            }
        }

        let frame = make_link_statistics_frame(&self.stats);
        self.handle.send_telemetry(&frame);
        self.last_sent_ms = Some(now_ms);
        trace!(lq = self.stats.uplink_lq, "link statistics sent");
        true
    }
}
