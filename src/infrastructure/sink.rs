//! Append-only plain-text log file.

use crate::domain::error::PortLogResult;
use chrono::{DateTime, Local};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name for a log started at `started_at`
pub fn log_file_name(started_at: &DateTime<Local>) -> String {
    format!("serial_log_{}.log", started_at.format("%Y%m%d_%H%M%S"))
}

/// Plain log file target.
///
/// Writes go straight to the file handle so every accepted line is visible
/// to readers immediately; `flush` additionally syncs to disk.
#[derive(Debug)]
pub struct LogSink {
    path: PathBuf,
    file: Option<File>,
}

impl LogSink {
    /// Create or append to `serial_log_<YYYYMMDD_HHMMSS>.log` in `dir`
    pub fn open(dir: &Path, started_at: &DateTime<Local>) -> PortLogResult<Self> {
        let path = dir.join(log_file_name(started_at));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        info!("Log file opened: {}", path.display());

        Ok(Self {
            path,
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Append `line` and a newline. Does nothing once the sink is closed.
    pub fn write(&mut self, line: &str) -> PortLogResult<()> {
        match self.file.as_mut() {
            Some(file) => {
                let mut buf = String::with_capacity(line.len() + 1);
                buf.push_str(line);
                buf.push('\n');
                file.write_all(buf.as_bytes())?;
                Ok(())
            }
            None => {
                debug!("Dropping line for closed log {}", self.path.display());
                Ok(())
            }
        }
    }

    /// Push buffered data to persistent storage without closing
    pub fn flush(&mut self) -> PortLogResult<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
            file.sync_data()?;
        }
        Ok(())
    }

    /// Flush and release the file. Idempotent.
    pub fn close(&mut self) -> PortLogResult<()> {
        let result = self.flush();
        if self.file.take().is_some() {
            info!("Log file closed: {}", self.path.display());
        }
        result
    }
}

impl Drop for LogSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close log file {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
impl LogSink {
    /// Sink over an already-open file
    pub(crate) fn from_file(path: PathBuf, file: File) -> Self {
        Self {
            path,
            file: Some(file),
        }
    }
}
