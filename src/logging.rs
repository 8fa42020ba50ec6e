//! Session-scoped logging
//!
//! Each session keeps a plain-text log next to its analysis output. The file
//! is appended to when previously analyzed data is being reloaded and
//! truncated for a fresh parse, so a session's log accumulates across
//! re-analysis. Messages are mirrored to `tracing` for live output.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::Result;

/// Initialize global tracing output for the process.
///
/// `RUST_LOG` wins over the supplied default level.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

/// Append-or-truncate file logger scoped to one session's analysis path.
#[derive(Debug)]
pub struct SessionLogger {
    path: PathBuf,
    file: File,
}

impl SessionLogger {
    /// Open `<analysis path>/session.log`, appending when `append` is set
    /// (reloading previously analyzed data) and truncating otherwise.
    ///
    /// # Errors
    ///
    /// IO failure opening the log file.
    pub fn open(analysis_path: &Path, append: bool) -> Result<Self> {
        let path = analysis_path.join("session.log");
        let file = OpenOptions::new()
            .create(true)
            .append(append)
            .write(true)
            .truncate(!append)
            .open(&path)?;
        Ok(Self { path, file })
    }

    /// Path of the underlying log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Log an informational message.
    pub fn info(&mut self, message: &str) {
        tracing::info!("{message}");
        self.write_line("INFO", message);
    }

    /// Log a warning.
    pub fn warn(&mut self, message: &str) {
        tracing::warn!("{message}");
        self.write_line("WARN", message);
    }

    fn write_line(&mut self, level: &str, message: &str) {
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        // log-file write failure must not abort analysis
        let _ = writeln!(self.file, "[{stamp}] {level} {message}");
    }
}
