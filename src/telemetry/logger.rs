//! JSONL session log with rotation.
//!
//! One line per link snapshot. A new file is started every
//! `max_records_per_file` records and only the newest `max_files_to_keep`
//! files are retained.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::handset::LinkSnapshot;

const FILE_PREFIX: &str = "session_";
const FILE_SUFFIX: &str = ".jsonl";

#[derive(Serialize)]
struct SessionRecord<'a> {
    timestamp: String,
    #[serde(flatten)]
    link: &'a LinkSnapshot,
}

/// Rotating JSONL writer
pub struct SessionLogger {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    current_path: Option<PathBuf>,
    records_in_file: usize,
    sequence: u32,
}

impl SessionLogger {
    /// Create the log directory if needed; the first file is opened lazily
    pub fn new(dir: impl AsRef<Path>, max_records_per_file: usize, max_files_to_keep: usize) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        info!("Session log directory: {}", dir.display());

        Ok(Self {
            dir,
            max_records_per_file: max_records_per_file.max(1),
            max_files_to_keep: max_files_to_keep.max(1),
            writer: None,
            current_path: None,
            records_in_file: 0,
            sequence: 0,
        })
    }

    /// File currently being written, if any
    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    /// Append one snapshot
    pub fn log(&mut self, snapshot: &LinkSnapshot) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        let record = SessionRecord {
            timestamp: Local::now().to_rfc3339(),
            link: snapshot,
        };
        let line = serde_json::to_string(&record)?;

        if let Some(writer) = self.writer.as_mut() {
            writeln!(writer, "{}", line)?;
            self.records_in_file += 1;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn rotate(&mut self) -> Result<()> {
        self.flush()?;

        let name = format!(
            "{}{}_{:04}{}",
            FILE_PREFIX,
            Local::now().format("%Y%m%d_%H%M%S"),
            self.sequence,
            FILE_SUFFIX
        );
        self.sequence = self.sequence.wrapping_add(1);

        let path = self.dir.join(name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!("Opened session log {}", path.display());

        self.writer = Some(BufWriter::new(file));
        self.current_path = Some(path);
        self.records_in_file = 0;

        self.prune();
        Ok(())
    }

    /// Delete the oldest session files beyond the retention limit
    fn prune(&self) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to list {}: {}", self.dir.display(), e);
                return;
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(FILE_PREFIX) && n.ends_with(FILE_SUFFIX))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        let excess = files.len().saturating_sub(self.max_files_to_keep);
        for path in files.iter().take(excess) {
            match fs::remove_file(path) {
                Ok(()) => debug!("Deleted old session log {}", path.display()),
                Err(e) => warn!("Failed to delete {}: {}", path.display(), e),
            }
        }
    }
}

impl Drop for SessionLogger {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("Failed to flush session log: {}", e);
        }
    }
}
