//! # CRSF Handset
//!
//! Hosted runner for the handset link engine.
//!
//! Opens the serial line the handset is wired to, polls the engine every
//! millisecond and plays the part of the radio scheduler: once per RC packet
//! interval it reports a transmission so the handset's mixer stays in phase.

use anyhow::{bail, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crsf_handset::clock::MonotonicClock;
use crsf_handset::config::{Config, LoggingConfig};
use crsf_handset::crsf::protocol::LinkStatistics;
use crsf_handset::handset::autobaud::NoPulseMeter;
use crsf_handset::handset::duplex::FixedLine;
use crsf_handset::handset::{CrsfHandset, LinkSnapshot};
use crsf_handset::serial::SerialHandsetPort;
use crsf_handset::telemetry::{LinkStatsReporter, SessionLogger};

/// Configuration file used when none is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Engine polling period
const POLL_INTERVAL_MS: u64 = 1;

/// Main entry point for the CRSF handset runner
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (path from the first argument)
///    - Set up logging with tracing subscriber
///    - Open the serial line and start the engine
///
/// 2. **Main Loop**
///    - Poll the engine every millisecond
///    - Report an RF transmission every packet interval while RC data is fresh
///    - Send link statistics and write the session log
///    - Handle Ctrl+C for graceful shutdown
///
/// # Errors
///
/// Returns error if:
/// - The configuration file is missing or invalid
/// - The serial port cannot be opened
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config_exists = Path::new(&config_path).exists();
    let config = load_config(&config_path, config_exists)?;

    let _log_guard = init_logging(&config.logging);

    info!("CRSF Handset v{} starting...", env!("CARGO_PKG_VERSION"));
    if config_exists {
        info!("Loaded configuration from {}", config_path);
    } else {
        info!("No configuration at {}, using defaults", config_path);
    }

    let mut settings = config.handset_settings();
    if settings.autobaud {
        warn!("Pulse measurement is not available on this port; autobaud disabled");
        settings.autobaud = false;
    }

    let port = SerialHandsetPort::open_with_paths(&[config.serial.port.as_str()], settings.baud_rate)?;
    info!("Handset line opened at: {}", port.device_path());

    let mut handset = CrsfHandset::new(
        port,
        FixedLine,
        NoPulseMeter,
        &settings,
        Arc::new(MonotonicClock::new()),
    );
    handset.begin()?;
    let handle = handset.handle();

    let mut poll = interval(Duration::from_millis(POLL_INTERVAL_MS));
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut rf_tick = interval(Duration::from_micros(settings.packet_interval_us as u64));
    rf_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut status_tick = interval(Duration::from_millis(config.telemetry.log_interval_ms));

    let mut link_stats = LinkStatsReporter::new(handle.clone(), config.telemetry.link_stats_interval_ms);
    let mut session_log = if config.telemetry.enabled {
        Some(SessionLogger::new(
            &config.telemetry.log_dir,
            config.telemetry.max_records_per_file,
            config.telemetry.max_files_to_keep,
        )?)
    } else {
        None
    };

    info!(
        "Running at {}us RC interval (minimum {}us at {} baud)",
        handset.packet_interval_us(),
        handset.min_packet_interval_us(),
        handset.baud()
    );
    info!("Press Ctrl+C to exit");

    let mut rf_packets: u64 = 0;

    loop {
        tokio::select! {
            _ = poll.tick() => {
                handset.handle_input();
                link_stats.poll(handle.now_us() / 1000);
            }

            // Stand-in for the radio scheduler
            _ = rf_tick.tick() => {
                let now = handle.now_us();
                if handle.rc_data_last_recv_us() == 0 || handle.rc_data_is_stale(now) {
                    continue;
                }
                handle.notify_transmitted();
                rf_packets += 1;
            }

            _ = status_tick.tick() => {
                let snapshot = handset.snapshot();
                link_stats.set_link_up(snapshot.connected);
                if snapshot.connected {
                    link_stats.update(line_quality_stats(&snapshot));
                }

                if let Some(logger) = session_log.as_mut() {
                    if let Err(e) = logger.log(&snapshot) {
                        warn!("Failed to write session log: {}", e);
                    }
                }

                debug!(
                    connected = snapshot.connected,
                    baud = snapshot.baud,
                    good = snapshot.good_frames,
                    bad = snapshot.bad_frames,
                    offset = snapshot.sync_offset_100ns,
                    rf_packets,
                    "link status"
                );
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                info!("Total RF packets reported: {}", rf_packets);
                break;
            }
        }
    }

    if let Some(logger) = session_log.as_mut() {
        logger.flush()?;
    }

    Ok(())
}

/// Read the configuration; a missing default file falls back to defaults
fn load_config(path: &str, exists: bool) -> Result<Config> {
    if exists {
        Ok(Config::load(path)?)
    } else if path == DEFAULT_CONFIG_PATH {
        Ok(Config::default())
    } else {
        bail!("Configuration file not found: {}", path)
    }
}

/// Console logging, plus a daily file when a log directory is configured
///
/// The returned guard must be kept alive for file output to be flushed.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match &config.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "crsf-handset.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

/// Link statistics reflecting the handset line itself
///
/// Without a radio receiver behind this runner, link quality is the share
/// of valid frames in the last watchdog period.
fn line_quality_stats(snapshot: &LinkSnapshot) -> LinkStatistics {
    let total = snapshot.good_frames as u64 + snapshot.bad_frames as u64;
    let lq = if total == 0 {
        0
    } else {
        (snapshot.good_frames as u64 * 100 / total) as u8
    };

    LinkStatistics {
        uplink_lq: lq,
        downlink_lq: lq,
        ..Default::default()
    }
}
