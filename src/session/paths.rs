//! Session path resolution
//!
//! Resolves everything a session touches on disk: the raw session directory
//! under the presentation root, the protocol and preference files, the
//! per-run stimlog/riglog pairs, the analysis save path with its expected
//! per-run data files, and the database directory.
//!
//! Run layout: a multi-run session keeps each run in a `run*` subdirectory;
//! a single-run session keeps its log pair directly in the session
//! directory. Either way every run must hold exactly one stimlog and one
//! riglog, which keeps the stimlog/riglog counts equal by construction.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::{Error, Result};

/// One run's log pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    /// Stimulus-presentation log
    pub stimlog: PathBuf,
    /// Rig hardware/timing log
    pub riglog: PathBuf,
}

/// Resolved file-system locations for one session.
#[derive(Debug, Clone)]
pub struct DataPaths {
    /// Session directory name (e.g. `230615_KC045_detect_AB`)
    pub sessiondir: String,
    /// Raw session directory under the presentation root
    pub session_path: PathBuf,
    /// Protocol file
    pub prot_file: PathBuf,
    /// Preferences file, when the rig wrote one
    pub pref_file: Option<PathBuf>,
    /// Combined pyvstim log, for sessions recorded by the old logger
    pub pyvstim_log: Option<PathBuf>,
    /// Per-run log pairs, in run order
    pub run_paths: Vec<RunPaths>,
    /// Analysis output directory for this session
    pub save_path: PathBuf,
    /// Expected per-run saved data files under `save_path`
    pub data_paths: Vec<PathBuf>,
    /// Flat-file database directory
    pub database_path: PathBuf,
}

impl DataPaths {
    /// Resolve all paths for `sessiondir` against the configured roots.
    ///
    /// # Errors
    ///
    /// [`Error::Path`] when the session directory does not exist, no
    /// protocol file is found, or any run is missing half of its log pair.
    pub fn resolve(config: &Config, sessiondir: &str) -> Result<Self> {
        let session_path = config.presentation_path.join(sessiondir);
        if !session_path.is_dir() {
            return Err(Error::Path(format!(
                "session directory not found: {}",
                session_path.display()
            )));
        }

        let prot_file = find_protocol_file(&session_path)?;
        let pref_file = existing(session_path.join("prefs.json"));
        let pyvstim_log = first_with_extension(&session_path, "vstimlog")?;

        // pyvstim sessions carry one combined log and no stimlog/riglog pairs
        let mut run_paths = Vec::new();
        if pyvstim_log.is_none() {
            let run_dirs = run_directories(&session_path)?;
            run_paths.reserve(run_dirs.len());
            for dir in &run_dirs {
                run_paths.push(RunPaths {
                    stimlog: required_log(dir, "stimlog")?,
                    riglog: required_log(dir, "riglog")?,
                });
            }
        }

        let save_path = config.analysis_path.join(sessiondir);
        let data_paths = (0..run_paths.len().max(1))
            .map(|i| save_path.join(format!("run{i:03}_session_data.parquet")))
            .collect();

        Ok(Self {
            sessiondir: sessiondir.to_string(),
            session_path,
            prot_file,
            pref_file,
            pyvstim_log,
            run_paths,
            save_path,
            data_paths,
            database_path: config.database_path.clone(),
        })
    }

    /// Number of runs the session spans.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.run_paths.len()
    }
}

fn existing(path: PathBuf) -> Option<PathBuf> {
    path.is_file().then_some(path)
}

/// Protocol file: `.prot` wins, `.txt` is the legacy extension.
fn find_protocol_file(session_path: &Path) -> Result<PathBuf> {
    if let Some(prot) = first_with_extension(session_path, "prot")? {
        return Ok(prot);
    }
    first_with_extension(session_path, "txt")?.ok_or_else(|| {
        Error::Path(format!(
            "no protocol file (.prot/.txt) in {}",
            session_path.display()
        ))
    })
}

fn first_with_extension(dir: &Path, extension: &str) -> Result<Option<PathBuf>> {
    let mut matches: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == extension))
        .collect();
    matches.sort();
    Ok(matches.into_iter().next())
}

/// Run directories in run order; the session directory itself when the
/// session is single-run.
fn run_directories(session_path: &Path) -> Result<Vec<PathBuf>> {
    let mut runs: Vec<PathBuf> = std::fs::read_dir(session_path)?
        .filter_map(std::result::Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.is_dir()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("run"))
        })
        .collect();
    runs.sort();
    if runs.is_empty() {
        runs.push(session_path.to_path_buf());
    }
    Ok(runs)
}

fn required_log(run_dir: &Path, extension: &str) -> Result<PathBuf> {
    first_with_extension(run_dir, extension)?.ok_or_else(|| {
        Error::Path(format!(
            "run {} has no .{extension} file",
            run_dir.display()
        ))
    })
}
