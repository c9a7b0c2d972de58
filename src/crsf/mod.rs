//! # CRSF Protocol Module
//!
//! Wire format of the handset link (the Crossfire protocol as spoken by
//! EdgeTX to an external RF module).
//!
//! This module handles:
//! - Frame layout constants and typed payloads
//! - CRC8-DVB-S2 and parametric N-bit checksums
//! - Encoding of frames sent to the handset (device info, link statistics,
//!   mixer timing)
//! - Decoding and validation of frames received from the handset, including
//!   11-bit channel unpacking

pub mod protocol;
pub mod encoder;
pub mod decoder;
pub mod crc;
