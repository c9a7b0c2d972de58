//! # CRSF Frame Encoder
//!
//! Builds the frames this module sends towards the handset, plus the RC
//! channel packer used to produce channel frames.

use super::crc::CRSF_CRC;
use super::protocol::*;

/// Encode a standard (non-extended) frame
///
/// Layout: `[address][size][type][payload][crc]`, CRC over type + payload.
pub fn encode_frame(address: u8, frame_type: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(CRSF_HEADER_LEN + payload.len() + 1);
    frame.push(address);
    frame.push(frame_size(payload.len()) as u8);
    frame.push(frame_type);
    frame.extend_from_slice(payload);

    let crc = CRSF_CRC.calc(&frame[2..], 0);
    frame.push(crc);
    frame
}

/// Encode an extended frame addressed to the handset
///
/// Layout: `[address][size][type][dest][origin][payload][crc]`; the result is
/// always `payload.len() + 6` bytes long.
///
/// # Examples
///
/// ```
/// use crsf_handset::crsf::encoder::encode_extended_frame;
/// use crsf_handset::crsf::protocol::*;
///
/// let frame = encode_extended_frame(
///     CRSF_FRAMETYPE_HANDSET,
///     CRSF_ADDRESS_RADIO_TRANSMITTER,
///     CRSF_ADDRESS_CRSF_TRANSMITTER,
///     &[CRSF_HANDSET_SUBCMD_TIMING],
/// );
/// assert_eq!(frame.len(), 7);
/// assert_eq!(frame[1], 5);
/// ```
pub fn encode_extended_frame(frame_type: u8, dest: u8, origin: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(CRSF_EXT_HEADER_LEN + payload.len() + 1);
    frame.push(CRSF_ADDRESS_RADIO_TRANSMITTER);
    frame.push(ext_frame_size(payload.len()) as u8);
    frame.push(frame_type);
    frame.push(dest);
    frame.push(origin);
    frame.extend_from_slice(payload);

    // CRC starts at type, ends before CRC
    let crc = CRSF_CRC.calc(&frame[2..], 0);
    frame.push(crc);
    frame
}

/// Convert a version string to a packed integer
///
/// `"2.2.15 ISM24G"` becomes `0x0002020F`. Each dot-separated field is folded
/// into 8 bits, parsing stops at the first character that is neither a digit
/// nor a dot, and anything below 1.0.0 is reported as 1.0.0 so the result is
/// never the all-zero sentinel.
///
/// # Examples
///
/// ```
/// use crsf_handset::crsf::encoder::version_str_to_u32;
///
/// assert_eq!(version_str_to_u32("3.4.1"), 0x030401);
/// assert_eq!(version_str_to_u32("garbage"), 0x010000);
/// ```
pub fn version_str_to_u32(version: &str) -> u32 {
    let mut value: u32 = 0;
    let mut accumulator: u8 = 0;
    let mut trailing_data = false;

    for c in version.chars() {
        match c {
            '.' => {
                value = (value << 8) | accumulator as u32;
                accumulator = 0;
                trailing_data = false;
            }
            '0'..='9' => {
                let digit = c as u8 - b'0';
                accumulator = accumulator.wrapping_mul(10).wrapping_add(digit);
                trailing_data = true;
            }
            _ => break,
        }
    }

    if trailing_data {
        value = (value << 8) | accumulator as u32;
    }

    value.max(0x01_0000)
}

/// Device information payload: null-terminated name + big-endian record
pub fn encode_device_info_payload(info: &DeviceInfo) -> Vec<u8> {
    let mut payload = Vec::with_capacity(info.payload_len());
    payload.extend_from_slice(info.name.as_bytes());
    payload.push(0);
    payload.extend_from_slice(&info.serial_no.to_be_bytes());
    payload.extend_from_slice(&info.hardware_version.to_be_bytes());
    payload.extend_from_slice(&info.software_version.to_be_bytes());
    payload.push(info.parameter_count);
    payload.push(info.parameter_version);
    payload
}

/// Complete device information frame (type 0x29) addressed to the handset
pub fn encode_device_info_frame(info: &DeviceInfo) -> Vec<u8> {
    encode_extended_frame(
        CRSF_FRAMETYPE_DEVICE_INFO,
        CRSF_ADDRESS_RADIO_TRANSMITTER,
        CRSF_ADDRESS_CRSF_TRANSMITTER,
        &encode_device_info_payload(info),
    )
}

/// Link statistics frame addressed to the handset
pub fn make_link_statistics_frame(stats: &LinkStatistics) -> Vec<u8> {
    encode_frame(
        CRSF_ADDRESS_RADIO_TRANSMITTER,
        CRSF_FRAMETYPE_LINK_STATISTICS,
        &stats.to_payload(),
    )
}

/// Payload of a handset timing correction
///
/// `rate` and `offset` are in 100ns units and sent big-endian.
pub fn encode_timing_payload(rate: i32, offset: i32) -> [u8; 9] {
    let mut payload = [0u8; 9];
    payload[0] = CRSF_HANDSET_SUBCMD_TIMING;
    payload[1..5].copy_from_slice(&rate.to_be_bytes());
    payload[5..9].copy_from_slice(&offset.to_be_bytes());
    payload
}

/// Pack channel values into an 11-bit LSB-first bitstream
///
/// Values above 2047 are clamped. The payload is `ceil(channels * 11 / 8)`
/// bytes long.
///
/// ```text
/// Byte 0: Ch1[0:7]
/// Byte 1: Ch1[8:10] | Ch2[0:4]
/// Byte 2: Ch2[5:10] | Ch3[0:1]
/// ...
/// ```
pub fn pack_channels(channels: &[u16]) -> Vec<u8> {
    let bits = channels.len() * CRSF_CHANNEL_BITS as usize;
    let mut payload = Vec::with_capacity(bits.div_ceil(8));

    let mut acc: u32 = 0;
    let mut acc_bits: u32 = 0;
    for &channel in channels {
        acc |= (channel.min(CRSF_CHANNEL_VALUE_MAX) as u32) << acc_bits;
        acc_bits += CRSF_CHANNEL_BITS;
        while acc_bits >= 8 {
            payload.push(acc as u8);
            acc >>= 8;
            acc_bits -= 8;
        }
    }
    if acc_bits > 0 {
        payload.push(acc as u8);
    }

    payload
}

/// RC channels frame as a flight controller would see it
pub fn encode_rc_channels_frame(channels: &[u16]) -> Vec<u8> {
    encode_frame(
        CRSF_SYNC_BYTE,
        CRSF_FRAMETYPE_RC_CHANNELS_PACKED,
        &pack_channels(channels),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_rc_channels_frame_structure() {
        let channels = [CRSF_CHANNEL_VALUE_MID; CRSF_NUM_CHANNELS];
        let frame = encode_rc_channels_frame(&channels);

        assert_eq!(frame.len(), 26);
        assert_eq!(frame[0], CRSF_SYNC_BYTE);
        assert_eq!(frame[1], 24);
        assert_eq!(frame[2], CRSF_FRAMETYPE_RC_CHANNELS_PACKED);
        assert_eq!(frame[25], CRSF_CRC.calc(&frame[2..25], 0));
    }

    #[test]
    fn test_pack_channels_extremes() {
        assert_eq!(pack_channels(&[0u16; 16]), vec![0u8; 22]);
        assert_eq!(pack_channels(&[CRSF_CHANNEL_VALUE_MAX; 16]), vec![0xFFu8; 22]);
    }

    #[test]
    fn test_pack_channels_single_channel_and_clamp() {
        let mut channels = [0u16; CRSF_NUM_CHANNELS];
        channels[0] = 5000;

        let payload = pack_channels(&channels);
        assert_eq!(payload[0], 0xFF);
        assert_eq!(payload[1], 0x07);
        assert!(payload[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_pack_channels_second_channel_offset() {
        // Ch2 starts at bit 11: byte 1 bits 3..7
        let payload = pack_channels(&[0, 1]);
        assert_eq!(payload, vec![0x00, 0x08, 0x00]);
    }

    #[test]
    fn test_encode_extended_frame_layout() {
        let payload = [0xAA, 0xBB, 0xCC];
        let frame = encode_extended_frame(
            CRSF_FRAMETYPE_COMMAND,
            CRSF_ADDRESS_RADIO_TRANSMITTER,
            CRSF_ADDRESS_CRSF_TRANSMITTER,
            &payload,
        );

        assert_eq!(frame.len(), payload.len() + 6);
        assert_eq!(frame[0], CRSF_ADDRESS_RADIO_TRANSMITTER);
        assert_eq!(frame[1] as usize, frame.len() - 2);
        assert_eq!(frame[2], CRSF_FRAMETYPE_COMMAND);
        assert_eq!(frame[3], CRSF_ADDRESS_RADIO_TRANSMITTER);
        assert_eq!(frame[4], CRSF_ADDRESS_CRSF_TRANSMITTER);
        assert_eq!(&frame[5..8], &payload);
        assert_eq!(frame[8], CRSF_CRC.calc(&frame[2..8], 0));
    }

    #[test]
    fn test_version_str_to_u32() {
        assert_eq!(version_str_to_u32("2.2.15 ISM24G"), 0x0002020F);
        assert_eq!(version_str_to_u32("1.0.0"), 0x010000);
        assert_eq!(version_str_to_u32("0.9.1"), 0x010000);
        assert_eq!(version_str_to_u32(""), 0x010000);
        // Two fields parse to 0x0401, below 1.0.0
        assert_eq!(version_str_to_u32("4.1"), 0x010000);
    }

    #[test]
    fn test_version_field_wraps_to_8_bits() {
        // 300 does not fit a field; only the low 8 bits survive
        assert_eq!(version_str_to_u32("1.300.0"), 0x01_2C_00);
    }

    #[test]
    fn test_device_info_payload_layout() {
        let info = DeviceInfo::new("ESPNOW TX", version_str_to_u32("1.2.3"));
        let payload = encode_device_info_payload(&info);

        assert_eq!(payload.len(), info.payload_len());
        assert_eq!(&payload[..9], b"ESPNOW TX");
        assert_eq!(payload[9], 0);
        assert_eq!(&payload[10..14], &[0x45, 0x4E, 0x54, 0x58]);
        assert_eq!(&payload[14..18], &[0, 0, 0, 0]);
        assert_eq!(&payload[18..22], &[0x00, 0x01, 0x02, 0x03]);
        assert_eq!(&payload[22..], &[0, 0]);
    }

    #[test]
    fn test_device_info_frame() {
        let info = DeviceInfo::new("TX", 0x010000);
        let frame = encode_device_info_frame(&info);
        assert_eq!(frame[2], CRSF_FRAMETYPE_DEVICE_INFO);
        assert_eq!(frame.len(), info.payload_len() + 6);
        assert_eq!(&frame[5..7], b"TX");
    }

    #[test]
    fn test_link_statistics_frame() {
        let stats = LinkStatistics { uplink_lq: 100, downlink_snr: -5, ..Default::default() };
        let frame = make_link_statistics_frame(&stats);

        assert_eq!(frame.len(), 14);
        assert_eq!(frame[0], CRSF_ADDRESS_RADIO_TRANSMITTER);
        assert_eq!(frame[1], 12);
        assert_eq!(frame[2], CRSF_FRAMETYPE_LINK_STATISTICS);
        assert_eq!(frame[5], 100);
        assert_eq!(frame[12] as i8, -5);
    }

    #[test]
    fn test_timing_payload_big_endian() {
        let payload = encode_timing_payload(200_000, -1000);
        assert_eq!(payload[0], CRSF_HANDSET_SUBCMD_TIMING);
        assert_eq!(&payload[1..5], &[0x00, 0x03, 0x0D, 0x40]);
        assert_eq!(&payload[5..9], &[0xFF, 0xFF, 0xFC, 0x18]);
    }
}
