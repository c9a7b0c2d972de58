//! # CRSF Handset Library
//!
//! The handset-facing serial link of an RC transmitter module.
//!
//! This library speaks CRSF to an EdgeTX/OpenTX handset over a full- or
//! half-duplex serial line: it assembles and validates incoming frames,
//! unpacks RC channels for the radio side, answers device pings, keeps the
//! handset's mixer in phase with the radio schedule and recovers the line
//! speed and polarity when the link is lost.

pub mod clock;
pub mod config;
pub mod crsf;
pub mod error;
pub mod handset;
pub mod serial;
pub mod telemetry;
