//! Baud rate and polarity recovery.
//!
//! A pulse-width measurement cannot tell a normal line from an inverted one,
//! so after measuring a rate the estimator tries it with the polarity flipped
//! before settling back:
//!
//! ```text
//! Init ──(≥300 edges captured, rate measured)──▶ Measured
//! Measured ──(flip polarity, same baud)──▶ Inverted
//! Inverted ──(flip polarity back)──▶ Init
//! ```

use tracing::debug;

/// Baud rates an EdgeTX handset may use, in preference order
pub const TX_TO_HANDSET_BAUDS: [u32; 7] = [400_000, 115_200, 5_250_000, 3_750_000, 1_870_000, 921_600, 2_250_000];

/// Baud used while the pulse meter is collecting edges
pub const AUTOBAUD_PROBE_BAUD: u32 = 400_000;

/// Edges required before a measurement is trusted
pub const AUTOBAUD_MIN_EDGES: u32 = 300;

/// Glitch filter setting for the pulse meter
pub const AUTOBAUD_GLITCH_FILTER: u8 = 4;

/// Pulse meter clock in Hz
const PULSE_CLOCK_HZ: i64 = 80_000_000;

/// UART pulse-width measurement unit
pub trait PulseMeter: Send {
    fn is_enabled(&self) -> bool;
    fn enable(&mut self, glitch_filter: u8);
    fn disable(&mut self);
    /// Edges captured since enabling
    fn edge_count(&self) -> u32;
    /// Shortest low pulse seen, in pulse clock ticks
    fn low_pulse(&self) -> u32;
    /// Shortest high pulse seen, in pulse clock ticks
    fn high_pulse(&self) -> u32;
}

/// Pulse meter for ports without measurement hardware
///
/// Never captures an edge, so the estimator keeps returning the probe baud.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPulseMeter;

impl PulseMeter for NoPulseMeter {
    fn is_enabled(&self) -> bool {
        false
    }
    fn enable(&mut self, _glitch_filter: u8) {}
    fn disable(&mut self) {}
    fn edge_count(&self) -> u32 {
        0
    }
    fn low_pulse(&self) -> u32 {
        0
    }
    fn high_pulse(&self) -> u32 {
        0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutobaudPhase {
    Init,
    Measured,
    Inverted,
}

/// Nearest supported baud by absolute difference; ties keep the earlier entry
pub fn snap_to_supported(calculated: i64) -> u32 {
    let mut best = TX_TO_HANDSET_BAUDS[0];
    for &candidate in &TX_TO_HANDSET_BAUDS {
        if (calculated - best as i64).abs() > (calculated - candidate as i64).abs() {
            best = candidate;
        }
    }
    best
}

/// Baud rate from measured pulse widths
pub fn baud_from_pulses(low: u32, high: u32) -> i64 {
    PULSE_CLOCK_HZ / (low.max(high) as i64 + 3)
}

/// Requested baud, polarity guess and recovery phase
#[derive(Debug)]
pub struct Autobaud<M> {
    meter: M,
    enabled: bool,
    phase: AutobaudPhase,
    requested_baud: u32,
    inverted: bool,
}

impl<M: PulseMeter> Autobaud<M> {
    /// `enabled = false` keeps the requested baud across recoveries
    pub fn new(meter: M, requested_baud: u32, inverted: bool, enabled: bool) -> Self {
        Self {
            meter,
            enabled,
            phase: AutobaudPhase::Init,
            requested_baud,
            inverted,
        }
    }

    pub fn requested_baud(&self) -> u32 {
        self.requested_baud
    }

    pub fn inverted(&self) -> bool {
        self.inverted
    }

    pub fn phase(&self) -> AutobaudPhase {
        self.phase
    }

    /// Advance the estimator and return the baud to try next
    ///
    /// The result also becomes the new requested baud.
    pub fn next_baud(&mut self) -> u32 {
        if self.enabled {
            self.requested_baud = self.estimate();
        }
        self.requested_baud
    }

    fn estimate(&mut self) -> u32 {
        match self.phase {
            AutobaudPhase::Measured => {
                self.inverted = !self.inverted;
                self.phase = AutobaudPhase::Inverted;
                debug!(baud = self.requested_baud, inverted = self.inverted, "autobaud: retry with flipped polarity");
                return self.requested_baud;
            }
            AutobaudPhase::Inverted => {
                self.inverted = !self.inverted;
                self.phase = AutobaudPhase::Init;
            }
            AutobaudPhase::Init => {}
        }

        if !self.meter.is_enabled() {
            self.meter.enable(AUTOBAUD_GLITCH_FILTER);
            return AUTOBAUD_PROBE_BAUD;
        }
        if self.meter.edge_count() < AUTOBAUD_MIN_EDGES {
            return AUTOBAUD_PROBE_BAUD;
        }

        self.phase = AutobaudPhase::Measured;

        let low = self.meter.low_pulse();
        let high = self.meter.high_pulse();
        self.meter.disable();

        let calculated = baud_from_pulses(low, high);
        let best = snap_to_supported(calculated);
        debug!(low, high, calculated, best, "autobaud: measured line rate");
        best
    }
}


#[cfg(test)]
mod tests {
    use super::mocks::MockPulseMeter;
    use super::*;

    #[test]
    fn test_snap_to_supported() {
        assert_eq!(snap_to_supported(400_000), 400_000);
        assert_eq!(snap_to_supported(118_000), 115_200);
        assert_eq!(snap_to_supported(1_860_465), 1_870_000);
        assert_eq!(snap_to_supported(6_000_000), 5_250_000);
        assert_eq!(snap_to_supported(0), 115_200);
    }

    #[test]
    fn test_snap_tie_keeps_first_match() {
        // Exactly between 400_000 and 115_200: first table entry wins
        assert_eq!(snap_to_supported(257_600), 400_000);
    }

    #[test]
    fn test_baud_from_pulses_uses_longer_pulse() {
        assert_eq!(baud_from_pulses(197, 150), 400_000);
        assert_eq!(baud_from_pulses(10, 197), 400_000);
    }

    #[test]
    fn test_init_enables_meter_and_probes() {
        let mut autobaud = Autobaud::new(MockPulseMeter::default(), 5_250_000, false, true);
        assert_eq!(autobaud.next_baud(), AUTOBAUD_PROBE_BAUD);
        assert_eq!(autobaud.phase(), AutobaudPhase::Init);
        assert_eq!(autobaud.meter.enable_calls, 1);

        // Not enough edges yet: keep probing without re-enabling
        assert_eq!(autobaud.next_baud(), AUTOBAUD_PROBE_BAUD);
        assert_eq!(autobaud.meter.enable_calls, 1);
    }

    #[test]
    fn test_full_cycle_flips_polarity_twice() {
        let mut meter = MockPulseMeter::measuring(1_870_000);
        meter.enabled = true;
        let mut autobaud = Autobaud::new(meter, 400_000, false, true);

        assert_eq!(autobaud.next_baud(), 1_870_000);
        assert_eq!(autobaud.phase(), AutobaudPhase::Measured);
        assert!(!autobaud.inverted());
        assert!(!autobaud.meter.is_enabled(), "measurement disables the meter");

        assert_eq!(autobaud.next_baud(), 1_870_000);
        assert_eq!(autobaud.phase(), AutobaudPhase::Inverted);
        assert!(autobaud.inverted());

        assert_eq!(autobaud.next_baud(), AUTOBAUD_PROBE_BAUD);
        assert_eq!(autobaud.phase(), AutobaudPhase::Init);
        assert!(!autobaud.inverted());
        assert_eq!(autobaud.requested_baud(), AUTOBAUD_PROBE_BAUD);
    }

    #[test]
    fn test_disabled_keeps_requested_baud() {
        let mut autobaud = Autobaud::new(MockPulseMeter::measuring(115_200), 420_000, true, false);
        assert_eq!(autobaud.next_baud(), 420_000);
        assert_eq!(autobaud.next_baud(), 420_000);
        assert!(autobaud.inverted());
        assert_eq!(autobaud.phase(), AutobaudPhase::Init);
    }

    #[test]
    fn test_no_pulse_meter_always_probes() {
        let mut autobaud = Autobaud::new(NoPulseMeter, 5_250_000, false, true);
        for _ in 0..3 {
            assert_eq!(autobaud.next_baud(), AUTOBAUD_PROBE_BAUD);
        }
    }
}
