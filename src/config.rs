//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{HandsetError, Result};
use crate::handset::autobaud::TX_TO_HANDSET_BAUDS;
use crate::handset::mixer_sync::MAX_PACKET_INTERVAL_US;
use crate::handset::HandsetSettings;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub handset: HandsetConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial line configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default)]
    pub half_duplex: bool,

    #[serde(default = "default_autobaud")]
    pub autobaud: bool,

    /// Initial polarity; follows `half_duplex` when unset
    #[serde(default)]
    pub inverted: Option<bool>,
}

/// Handset protocol configuration
#[derive(Debug, Deserialize, Clone)]
pub struct HandsetConfig {
    #[serde(default = "default_packet_interval_us")]
    pub packet_interval_us: u32,

    #[serde(default = "default_channel_count")]
    pub channel_count: usize,

    #[serde(default = "default_device_name")]
    pub device_name: String,

    #[serde(default = "default_firmware_version")]
    pub firmware_version: String,

    #[serde(default = "default_watchdog_interval_ms")]
    pub watchdog_interval_ms: u64,

    #[serde(default)]
    pub bind_command_enabled: bool,
}

/// Telemetry configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,

    #[serde(default = "default_log_interval_ms")]
    pub log_interval_ms: u64,

    #[serde(default = "default_link_stats_interval_ms")]
    pub link_stats_interval_ms: u64,
}

/// Diagnostic log output
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Also write daily log files here
    #[serde(default)]
    pub dir: Option<String>,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { 5_250_000 }
fn default_autobaud() -> bool { true }

fn default_packet_interval_us() -> u32 { 20_000 }
fn default_channel_count() -> usize { 16 }
fn default_device_name() -> String { "CRSF Handset".to_string() }
fn default_firmware_version() -> String { env!("CARGO_PKG_VERSION").to_string() }
fn default_watchdog_interval_ms() -> u64 { 1000 }

fn default_telemetry_enabled() -> bool { true }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }
fn default_log_interval_ms() -> u64 { 1000 }
fn default_link_stats_interval_ms() -> u64 { 240 }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            half_duplex: false,
            autobaud: default_autobaud(),
            inverted: None,
        }
    }
}

impl Default for HandsetConfig {
    fn default() -> Self {
        Self {
            packet_interval_us: default_packet_interval_us(),
            channel_count: default_channel_count(),
            device_name: default_device_name(),
            firmware_version: default_firmware_version(),
            watchdog_interval_ms: default_watchdog_interval_ms(),
            bind_command_enabled: false,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
            log_interval_ms: default_log_interval_ms(),
            link_stats_interval_ms: default_link_stats_interval_ms(),
        }
    }
}

fn invalid(msg: impl std::fmt::Display) -> HandsetError {
    HandsetError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use crsf_handset::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if !TX_TO_HANDSET_BAUDS.contains(&self.serial.baud_rate) {
            return Err(invalid(format!(
                "baud_rate must be one of: {}",
                TX_TO_HANDSET_BAUDS.map(|b| b.to_string()).join(", ")
            )));
        }

        if !(1_000..=MAX_PACKET_INTERVAL_US).contains(&self.handset.packet_interval_us) {
            return Err(invalid(format!(
                "packet_interval_us must be between 1000 and {}",
                MAX_PACKET_INTERVAL_US
            )));
        }

        if ![16, 32].contains(&self.handset.channel_count) {
            return Err(invalid("channel_count must be 16 or 32"));
        }

        if self.handset.device_name.is_empty() || self.handset.device_name.len() > 15 {
            return Err(invalid("device_name must be 1 to 15 bytes"));
        }

        if self.handset.device_name.contains('\0') {
            return Err(invalid("device_name cannot contain NUL"));
        }

        if self.handset.watchdog_interval_ms == 0 || self.handset.watchdog_interval_ms > 60000 {
            return Err(invalid("watchdog_interval_ms must be between 1 and 60000"));
        }

        if self.telemetry.enabled && self.telemetry.log_dir.is_empty() {
            return Err(invalid("telemetry log_dir cannot be empty when enabled"));
        }

        if self.telemetry.log_interval_ms == 0 || self.telemetry.log_interval_ms > 60000 {
            return Err(invalid("log_interval_ms must be between 1 and 60000"));
        }

        if self.telemetry.link_stats_interval_ms == 0 || self.telemetry.link_stats_interval_ms > 60000 {
            return Err(invalid("link_stats_interval_ms must be between 1 and 60000"));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        if let Some(dir) = &self.logging.dir {
            if dir.is_empty() {
                return Err(invalid("logging dir cannot be empty when set"));
            }
        }

        Ok(())
    }

    /// Engine settings derived from this configuration
    pub fn handset_settings(&self) -> HandsetSettings {
        HandsetSettings {
            baud_rate: self.serial.baud_rate,
            half_duplex: self.serial.half_duplex,
            // A half-duplex line is usually the inverted S.Port pin
            inverted: self.serial.inverted.unwrap_or(self.serial.half_duplex),
            autobaud: self.serial.autobaud,
            packet_interval_us: self.handset.packet_interval_us,
            channel_count: self.handset.channel_count,
            device_name: self.handset.device_name.clone(),
            firmware_version: self.handset.firmware_version.clone(),
            watchdog_interval_ms: self.handset.watchdog_interval_ms,
            bind_command_enabled: self.handset.bind_command_enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.serial.baud_rate, 5_250_000);
        assert_eq!(config.handset.packet_interval_us, 20_000);
        assert_eq!(config.telemetry.link_stats_interval_ms, 240);
        assert!(config.logging.dir.is_none());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert!(config.serial.autobaud);
        assert!(!config.handset.bind_command_enabled);
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[serial]
port = "/dev/ttyAMA0"
baud_rate = 400000
half_duplex = true

[handset]
packet_interval_us = 4000
channel_count = 32
device_name = "Bench TX"

[telemetry]
enabled = false

[logging]
dir = "/tmp/crsf-logs"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyAMA0");
        assert_eq!(config.handset.channel_count, 32);
        assert_eq!(config.logging.dir.as_deref(), Some("/tmp/crsf-logs"));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load("/nonexistent/crsf-handset.toml").unwrap_err();
        assert!(matches!(err, HandsetError::Io(_)));
    }

    #[test]
    fn test_malformed_toml() {
        let err = Config::from_toml("[serial\nport = ").unwrap_err();
        assert!(matches!(err, HandsetError::Config(_)));
    }

    #[test]
    fn test_empty_serial_port() {
        let mut config = Config::default();
        config.serial.port = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unsupported_baud_rate() {
        let mut config = Config::default();
        config.serial.baud_rate = 420_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("baud_rate"));

        config.serial.baud_rate = 1_870_000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_packet_interval_range() {
        let mut config = Config::default();
        config.handset.packet_interval_us = 999;
        assert!(config.validate().is_err());
        config.handset.packet_interval_us = 1_000_001;
        assert!(config.validate().is_err());
        config.handset.packet_interval_us = 1_000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_channel_count() {
        let mut config = Config::default();
        config.handset.channel_count = 12;
        assert!(config.validate().is_err());
        config.handset.channel_count = 32;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_device_name_length() {
        let mut config = Config::default();
        config.handset.device_name = String::new();
        assert!(config.validate().is_err());
        config.handset.device_name = "a".repeat(16);
        assert!(config.validate().is_err());
        config.handset.device_name = "a".repeat(15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_watchdog_interval_zero() {
        let mut config = Config::default();
        config.handset.watchdog_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_log_dir_when_enabled() {
        let mut config = Config::default();
        config.telemetry.enabled = true;
        config.telemetry.log_dir = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_log_dir_when_disabled() {
        let mut config = Config::default();
        config.telemetry.enabled = false;
        config.telemetry.log_dir = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_interval_zero() {
        let mut config = Config::default();
        config.telemetry.log_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_files_to_keep_zero() {
        let mut config = Config::default();
        config.telemetry.max_files_to_keep = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_handset_settings_polarity_follows_duplex() {
        let mut config = Config::default();
        config.serial.half_duplex = true;
        assert!(config.handset_settings().inverted);

        config.serial.inverted = Some(false);
        let settings = config.handset_settings();
        assert!(!settings.inverted);
        assert!(settings.half_duplex);
        assert_eq!(settings.baud_rate, config.serial.baud_rate);
    }
}
