//! Channel vector shared between the polling loop and the RF scheduler.
//!
//! Each channel is an independent atomic. A reader may observe a frame that
//! is only partly applied across channels; every individual value is always
//! a complete 11-bit sample.

use std::sync::atomic::{AtomicU16, Ordering};

use crate::crsf::protocol::{CRSF_CHANNEL_VALUE_MID, CRSF_MAX_CHANNELS};

/// Latest RC channel values, in CRSF units
#[derive(Debug)]
pub struct ChannelData {
    values: Box<[AtomicU16]>,
}

impl ChannelData {
    /// `count` channels initialised to mid-stick; at most 32
    pub fn new(count: usize) -> Self {
        let count = count.min(CRSF_MAX_CHANNELS);
        Self {
            values: (0..count).map(|_| AtomicU16::new(CRSF_CHANNEL_VALUE_MID)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Overwrite channels from the start of `values`
    pub fn store(&self, values: &[u16]) {
        for (slot, &value) in self.values.iter().zip(values) {
            slot.store(value, Ordering::Relaxed);
        }
    }

    pub fn get(&self, index: usize) -> Option<u16> {
        self.values.get(index).map(|v| v.load(Ordering::Relaxed))
    }

    /// Copy of all channels; not transactionally consistent
    pub fn snapshot(&self) -> Vec<u16> {
        self.values.iter().map(|v| v.load(Ordering::Relaxed)).collect()
    }
}
