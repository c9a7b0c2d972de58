//! # Telemetry Module
//!
//! Everything that flows back from the module to the handset or to disk.
//!
//! This module handles:
//! - Periodic link statistics frames towards the handset
//! - Formatting link snapshots as JSONL (JSON Lines)
//! - Writing to rotating log files
//! - Managing file rotation (max N records per file)
//! - Retaining only last M files

pub mod link_stats;
pub mod logger;

pub use link_stats::LinkStatsReporter;
pub use logger::SessionLogger;
