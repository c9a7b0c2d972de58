//! # CRSF Protocol Constants and Types
//!
//! Core protocol definitions for the handset (EdgeTX ⇄ TX module) link.
//!
//! Every frame on the wire has the shape
//!
//! ```text
//! [address][size][type][payload ...][crc]
//! ```
//!
//! where `size` counts everything after itself (type + payload + crc) and the
//! CRC covers `type..=payload`. Types `0x28..=0x96` carry two extra
//! addressing bytes (destination, origin) in front of the payload.

use serde::Serialize;

/// CRSF frame sync byte (always 0xC8)
pub const CRSF_SYNC_BYTE: u8 = 0xC8;

/// Maximum on-wire frame length, address byte through CRC
pub const CRSF_MAX_PACKET_LEN: usize = 64;

/// Smallest legal frame: address + size + type + crc
pub const CRSF_MIN_PACKET_LEN: usize = 4;

/// Address and size bytes, not counted by the size field
pub const CRSF_FRAME_NOT_COUNTED_BYTES: usize = 2;

/// Bytes of a standard header (address, size, type)
pub const CRSF_HEADER_LEN: usize = 3;

/// Bytes of an extended header (address, size, type, dest, origin)
pub const CRSF_EXT_HEADER_LEN: usize = 5;

/// Length byte index within a frame
pub const CRSF_TELEMETRY_LENGTH_INDEX: usize = 1;

/// Frame types
pub const CRSF_FRAMETYPE_LINK_STATISTICS: u8 = 0x14;
pub const CRSF_FRAMETYPE_RC_CHANNELS_PACKED: u8 = 0x16;
pub const CRSF_FRAMETYPE_DEVICE_PING: u8 = 0x28;
pub const CRSF_FRAMETYPE_DEVICE_INFO: u8 = 0x29;
pub const CRSF_FRAMETYPE_COMMAND: u8 = 0x32;
pub const CRSF_FRAMETYPE_HANDSET: u8 = 0x3A;

/// Last frame type that uses extended addressing
pub const CRSF_FRAMETYPE_EXTENDED_LAST: u8 = 0x96;

/// Command frame subcommands
pub const CRSF_COMMAND_SUBCMD_RX: u8 = 0x10;
pub const CRSF_COMMAND_SUBCMD_RX_BIND: u8 = 0x01;
pub const CRSF_COMMAND_MODEL_SELECT_ID: u8 = 0x05;

/// Handset frame subcommand carrying mixer timing
pub const CRSF_HANDSET_SUBCMD_TIMING: u8 = 0x10;

/// Device addresses
pub const CRSF_ADDRESS_BROADCAST: u8 = 0x00;
pub const CRSF_ADDRESS_FLIGHT_CONTROLLER: u8 = 0xC8;
pub const CRSF_ADDRESS_RADIO_TRANSMITTER: u8 = 0xEA;
pub const CRSF_ADDRESS_CRSF_RECEIVER: u8 = 0xEC;
pub const CRSF_ADDRESS_CRSF_TRANSMITTER: u8 = 0xEE;

/// Bits per packed RC channel
pub const CRSF_CHANNEL_BITS: u32 = 11;

/// Number of RC channels in a standard 0x16 frame
pub const CRSF_NUM_CHANNELS: usize = 16;

/// Largest channel vector the engine will carry
pub const CRSF_MAX_CHANNELS: usize = 32;

/// RC channels payload size (22 bytes for 16 channels × 11 bits)
pub const CRSF_RC_CHANNELS_PAYLOAD_SIZE: usize = 22;

/// Channel value range (11-bit: 0-2047)
pub const CRSF_CHANNEL_VALUE_MAX: u16 = 2047;
/// Channel value corresponding to 1500µs
pub const CRSF_CHANNEL_VALUE_MID: u16 = 992;

/// Link Statistics payload size
pub const CRSF_LINK_STATS_PAYLOAD_SIZE: usize = 10;

/// Fixed part of the device information payload (after the name)
pub const CRSF_DEVICE_INFO_RECORD_SIZE: usize = 14;

/// Longest device name that still fits a device information frame
pub const CRSF_DEVICE_NAME_MAX_LEN: usize =
    CRSF_MAX_PACKET_LEN - CRSF_FRAME_NOT_COUNTED_BYTES - ext_frame_size(1 + CRSF_DEVICE_INFO_RECORD_SIZE);

/// Serial number reported in device information, "ENTX"
pub const CRSF_DEVICE_SERIAL_NO: u32 = 0x454E_5458;

/// Value of the size byte for a standard frame with `payload_len` bytes
pub const fn frame_size(payload_len: usize) -> usize {
    payload_len + 2
}

/// Value of the size byte for an extended frame with `payload_len` bytes
pub const fn ext_frame_size(payload_len: usize) -> usize {
    frame_size(payload_len) + 2
}

/// Whether frames of this type carry extended addressing
pub fn is_extended_type(frame_type: u8) -> bool {
    (CRSF_FRAMETYPE_DEVICE_PING..=CRSF_FRAMETYPE_EXTENDED_LAST).contains(&frame_type)
}

/// Standard frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Device address / sync byte
    pub address: u8,
    /// Size field: bytes following it (type + payload + crc)
    pub size: u8,
    /// Frame type
    pub frame_type: u8,
}

impl FrameHeader {
    /// Total on-wire length implied by the size field
    pub fn total_len(&self) -> usize {
        self.size as usize + CRSF_FRAME_NOT_COUNTED_BYTES
    }
}

/// Destination/origin pair of an extended frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtendedAddress {
    pub dest: u8,
    pub origin: u8,
}

/// Link statistics telemetry data
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkStatistics {
    /// Uplink RSSI (antenna 1) in -dBm
    pub uplink_rssi_1: u8,

    /// Uplink RSSI (antenna 2) in -dBm (diversity)
    pub uplink_rssi_2: u8,

    /// Uplink link quality (0-100%)
    pub uplink_lq: u8,

    /// Uplink SNR in dB
    pub uplink_snr: i8,

    /// Active antenna (0 or 1)
    pub active_antenna: u8,

    /// RF mode / packet rate
    pub rf_mode: u8,

    /// Uplink TX power (enum: 0mW, 10mW, 25mW, 100mW, 500mW, 1000mW, 2000mW)
    pub uplink_tx_power: u8,

    /// Downlink RSSI in -dBm
    pub downlink_rssi: u8,

    /// Downlink link quality (0-100%)
    pub downlink_lq: u8,

    /// Downlink SNR in dB
    pub downlink_snr: i8,
}

impl LinkStatistics {
    /// Serialize into the fixed 10-byte wire order
    pub fn to_payload(&self) -> [u8; CRSF_LINK_STATS_PAYLOAD_SIZE] {
        [
            self.uplink_rssi_1,
            self.uplink_rssi_2,
            self.uplink_lq,
            self.uplink_snr as u8,
            self.active_antenna,
            self.rf_mode,
            self.uplink_tx_power,
            self.downlink_rssi,
            self.downlink_lq,
            self.downlink_snr as u8,
        ]
    }
}

/// Self-description returned in answer to a device ping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device name, sent null-terminated
    pub name: String,
    pub serial_no: u32,
    pub hardware_version: u32,
    /// Packed 24-bit firmware version, see [`version_str_to_u32`](super::encoder::version_str_to_u32)
    pub software_version: u32,
    pub parameter_count: u8,
    pub parameter_version: u8,
}

impl DeviceInfo {
    /// Device information for this module with no exposed parameters
    ///
    /// The name is cut at the first NUL and to [`CRSF_DEVICE_NAME_MAX_LEN`]
    /// bytes, on a character boundary.
    pub fn new(name: &str, software_version: u32) -> Self {
        let name = name.split('\0').next().unwrap_or_default();
        let mut end = name.len().min(CRSF_DEVICE_NAME_MAX_LEN);
        while !name.is_char_boundary(end) {
            end -= 1;
        }

        Self {
            name: name[..end].to_string(),
            serial_no: CRSF_DEVICE_SERIAL_NO,
            hardware_version: 0,
            software_version,
            parameter_count: 0,
            parameter_version: 0,
        }
    }

    /// Payload length: name, terminator and the fixed record
    pub fn payload_len(&self) -> usize {
        self.name.len() + 1 + CRSF_DEVICE_INFO_RECORD_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_constants() {
        assert_eq!(CRSF_SYNC_BYTE, 0xC8);
        assert_eq!(CRSF_FRAMETYPE_RC_CHANNELS_PACKED, 0x16);
        assert_eq!(CRSF_FRAMETYPE_LINK_STATISTICS, 0x14);
        assert_eq!(CRSF_MAX_PACKET_LEN, 64);
        assert_eq!(CRSF_NUM_CHANNELS * CRSF_CHANNEL_BITS as usize, CRSF_RC_CHANNELS_PAYLOAD_SIZE * 8);
    }

    #[test]
    fn test_frame_size_helpers() {
        assert_eq!(frame_size(22), 24);
        assert_eq!(ext_frame_size(9), 13);
        let header = FrameHeader { address: CRSF_SYNC_BYTE, size: 24, frame_type: 0x16 };
        assert_eq!(header.total_len(), 26);
    }

    #[test]
    fn test_extended_type_range() {
        assert!(!is_extended_type(CRSF_FRAMETYPE_RC_CHANNELS_PACKED));
        assert!(!is_extended_type(0x27));
        assert!(is_extended_type(CRSF_FRAMETYPE_DEVICE_PING));
        assert!(is_extended_type(CRSF_FRAMETYPE_HANDSET));
        assert!(is_extended_type(0x96));
        assert!(!is_extended_type(0x97));
    }

    #[test]
    fn test_link_statistics_payload_order() {
        let stats = LinkStatistics {
            uplink_rssi_1: 1,
            uplink_rssi_2: 2,
            uplink_lq: 3,
            uplink_snr: -4,
            active_antenna: 5,
            rf_mode: 6,
            uplink_tx_power: 7,
            downlink_rssi: 8,
            downlink_lq: 9,
            downlink_snr: -10,
        };
        assert_eq!(stats.to_payload(), [1, 2, 3, 0xFC, 5, 6, 7, 8, 9, 0xF6]);
    }

    #[test]
    fn test_device_info_payload_len() {
        let info = DeviceInfo::new("CyberBrick", 0x010203);
        assert_eq!(info.payload_len(), 10 + 1 + 14);
        assert_eq!(info.serial_no, 0x454E5458);
    }

    #[test]
    fn test_device_name_bounded() {
        assert_eq!(CRSF_DEVICE_NAME_MAX_LEN, 43);

        let info = DeviceInfo::new(&"X".repeat(50), 0x010000);
        assert_eq!(info.name.len(), CRSF_DEVICE_NAME_MAX_LEN);
        assert_eq!(info.payload_len() + 6, CRSF_MAX_PACKET_LEN);

        // Multi-byte character straddling the limit is dropped whole
        let name = format!("{}é", "a".repeat(42));
        assert_eq!(DeviceInfo::new(&name, 0).name, "a".repeat(42));

        assert_eq!(DeviceInfo::new("TX\0junk", 0).name, "TX");
    }
}
