//! # CRSF Frame Decoder
//!
//! Pure parsing helpers for frames arriving from the handset. None of these
//! allocate; they work on the engine's assembly buffer in place.

use super::crc::CRSF_CRC;
use super::protocol::*;
use crate::error::FrameError;

/// Parse the three header bytes without any validation
///
/// Returns `None` if fewer than three bytes are available.
pub fn decode_header(buffer: &[u8]) -> Option<FrameHeader> {
    match buffer {
        [address, size, frame_type, ..] => Some(FrameHeader {
            address: *address,
            size: *size,
            frame_type: *frame_type,
        }),
        _ => None,
    }
}

/// Destination/origin bytes of an extended frame
pub fn decode_extended_address(buffer: &[u8]) -> Option<ExtendedAddress> {
    match buffer {
        [_, _, _, dest, origin, ..] => Some(ExtendedAddress {
            dest: *dest,
            origin: *origin,
        }),
        _ => None,
    }
}

/// CRC over `type..end-of-payload` of a frame `total_len` bytes long
///
/// Excludes the address byte, the size byte and the trailing CRC byte.
pub fn compute_crc(buffer: &[u8], total_len: usize) -> u8 {
    CRSF_CRC.calc(&buffer[2..total_len - 1], 0)
}

/// Check a complete frame's CRC
///
/// # Errors
///
/// Returns [`FrameError::Framing`] if `total_len` is outside `[4, 64]` or
/// exceeds the buffer, and [`FrameError::Crc`] on checksum mismatch.
pub fn validate_frame(buffer: &[u8], total_len: usize) -> Result<(), FrameError> {
    if !(CRSF_MIN_PACKET_LEN..=CRSF_MAX_PACKET_LEN).contains(&total_len) || total_len > buffer.len() {
        return Err(FrameError::Framing { len: total_len });
    }

    let expected = compute_crc(buffer, total_len);
    let actual = buffer[total_len - 1];
    if expected != actual {
        return Err(FrameError::Crc { expected, actual });
    }
    Ok(())
}

/// `true` if the frame's CRC byte matches
pub fn is_valid(buffer: &[u8], total_len: usize) -> bool {
    validate_frame(buffer, total_len).is_ok()
}

/// Unpack 11-bit LSB-first channel values
///
/// Fills `channels` in order, stopping early if the payload runs out of
/// bits. Returns the number of channels written.
///
/// # Examples
///
/// ```
/// use crsf_handset::crsf::decoder::unpack_channels;
/// use crsf_handset::crsf::encoder::pack_channels;
///
/// let payload = pack_channels(&[172, 992, 1811]);
/// let mut channels = [0u16; 3];
/// assert_eq!(unpack_channels(&payload, &mut channels), 3);
/// assert_eq!(channels, [172, 992, 1811]);
/// ```
pub fn unpack_channels(payload: &[u8], channels: &mut [u16]) -> usize {
    const MASK: u32 = (1 << CRSF_CHANNEL_BITS) - 1;

    let mut bytes = payload.iter();
    let mut read_value: u32 = 0;
    let mut bits_merged: u32 = 0;

    for (written, channel) in channels.iter_mut().enumerate() {
        while bits_merged < CRSF_CHANNEL_BITS {
            match bytes.next() {
                Some(&byte) => {
                    read_value |= (byte as u32) << bits_merged;
                    bits_merged += 8;
                }
                None => return written,
            }
        }
        *channel = (read_value & MASK) as u16;
        read_value >>= CRSF_CHANNEL_BITS;
        bits_merged -= CRSF_CHANNEL_BITS;
    }

    channels.len()
}

/// Decode a Link Statistics payload
///
/// Returns `None` if the payload is shorter than 10 bytes.
pub fn decode_link_statistics(payload: &[u8]) -> Option<LinkStatistics> {
    if payload.len() < CRSF_LINK_STATS_PAYLOAD_SIZE {
        return None;
    }

    Some(LinkStatistics {
        uplink_rssi_1: payload[0],
        uplink_rssi_2: payload[1],
        uplink_lq: payload[2],
        uplink_snr: payload[3] as i8,
        active_antenna: payload[4],
        rf_mode: payload[5],
        uplink_tx_power: payload[6],
        downlink_rssi: payload[7],
        downlink_lq: payload[8],
        downlink_snr: payload[9] as i8,
    })
}
