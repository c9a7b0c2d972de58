//! # Monotonic Clock
//!
//! All timing decisions in the engine read an explicit clock instead of
//! relying on port timeouts. [`MonotonicClock`] is used on real hardware,
//! [`ManualClock`] lets tests and simulations step time by hand.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Monotonic time source shared by the polling loop and the RF timer
pub trait Clock: Send + Sync {
    /// Microseconds since an arbitrary fixed origin
    fn micros(&self) -> u64;

    /// Milliseconds since the same origin
    fn millis(&self) -> u64 {
        self.micros() / 1000
    }
}

/// Wall clock backed by [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn micros(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// Hand-driven clock; clones share the same time
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_us: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_us: u64) -> Self {
        Self { now_us: Arc::new(AtomicU64::new(start_us)) }
    }

    pub fn set_micros(&self, us: u64) {
        self.now_us.store(us, Ordering::SeqCst);
    }

    pub fn advance_micros(&self, us: u64) {
        self.now_us.fetch_add(us, Ordering::SeqCst);
    }

    pub fn advance_millis(&self, ms: u64) {
        self.advance_micros(ms * 1000);
    }
}

impl Clock for ManualClock {
    fn micros(&self) -> u64 {
        self.now_us.load(Ordering::SeqCst)
    }
}
