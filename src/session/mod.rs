//! Session orchestration
//!
//! [`Session`] owns everything one behavioral session needs: resolved data
//! paths, derived metadata, a session-scoped file logger, and the flat-file
//! database handle. Pipeline stages hand back immutable results
//! ([`SessionRawData`]) rather than mutating session state, so a re-run of
//! any stage starts from the same inputs.

pub mod data;
pub mod meta;
pub mod paths;
pub mod protocol;

use std::path::PathBuf;

use serde_json::json;
use tracing::info;

use crate::config::Config;
use crate::db::{row, Database, Row, ANIMALS_TABLE, SESSIONS_TABLE, TRIALS_TABLE};
use crate::logging::SessionLogger;
use crate::logs::extrapolate::extrapolate_time;
use crate::logs::format::{read_pyvstim_log, read_riglog, read_stimlog};
use crate::logs::stitch::stitch_runs;
use crate::logs::{overlay, Comment, LogData};
use crate::sheets::{WeightSheet, WeightSource};
use crate::{Error, Result};

pub use data::SessionData;
pub use meta::{OptoMode, SessionMeta};
pub use paths::{DataPaths, RunPaths};

/// Which logger produced the session's files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogVersion {
    /// Old single-log pyvstim recorder
    PyVStim,
    /// Stimpy recorder with separate stimlog/riglog
    Stimpy,
}

/// One run's reconciled stream plus its comments.
#[derive(Debug, Clone, PartialEq)]
pub struct RunData {
    /// Combined, time-extrapolated channel streams
    pub data: LogData,
    /// Comments in source order
    pub comments: Vec<Comment>,
}

/// Raw result of reading a session: one entry per run, single-run sessions
/// included, so downstream consumers always see the same shape.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRawData {
    /// Per-run results in run order
    pub runs: Vec<RunData>,
}

/// One behavioral session for one animal on one date.
pub struct Session {
    meta: SessionMeta,
    paths: DataPaths,
    logger: SessionLogger,
    db: Database,
    log_version: LogVersion,
    save_mat: bool,
}

impl Session {
    /// Open a session by directory name.
    ///
    /// Resolves paths (creating the save directory when absent), opens the
    /// session log (appending when `load_flag` is set, so re-analysis
    /// accumulates), derives metadata from the protocol file, and opens the
    /// database.
    ///
    /// # Errors
    ///
    /// Path resolution, protocol parsing, identity derivation, or database
    /// open failure. Weight-sheet problems never fail construction.
    pub fn new(config: &Config, sessiondir: &str, load_flag: bool, save_mat: bool) -> Result<Self> {
        let paths = DataPaths::resolve(config, sessiondir)?;

        if !paths.save_path.exists() {
            std::fs::create_dir_all(&paths.save_path)?;
            info!(path = %paths.save_path.display(), "save path did not exist, created save folder");
        }
        let mut logger = SessionLogger::open(&paths.save_path, load_flag)?;

        let sheet = config.weight_sheet.as_deref().map(WeightSheet::open);
        let meta = SessionMeta::from_protocol_file(
            &paths.prot_file,
            sheet.as_ref().map(|s| s as &dyn WeightSource),
        )?;

        let db = Database::open(&paths.database_path)?;
        let log_version = if paths.pyvstim_log.is_some() {
            LogVersion::PyVStim
        } else {
            LogVersion::Stimpy
        };
        logger.info(&format!("opened session {}", meta.session_id));

        Ok(Self {
            meta,
            paths,
            logger,
            db,
            log_version,
            save_mat,
        })
    }

    /// Session metadata.
    #[must_use]
    pub fn meta(&self) -> &SessionMeta {
        &self.meta
    }

    /// Resolved paths.
    #[must_use]
    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    /// Database handle.
    #[must_use]
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Logger version driving [`read_data`](Self::read_data) dispatch.
    #[must_use]
    pub const fn log_version(&self) -> LogVersion {
        self.log_version
    }

    /// Read the session's raw data fresh from its log files.
    ///
    /// Stimpy sessions read and combine each run's log pair independently,
    /// extrapolating time per run; pyvstim sessions parse the single
    /// combined log. Both paths yield the uniform per-run list shape.
    ///
    /// # Errors
    ///
    /// Unrecognized or malformed logs (fatal per run), missing files.
    pub fn read_data(&mut self) -> Result<SessionRawData> {
        let runs = match self.log_version {
            LogVersion::PyVStim => {
                let log = self.paths.pyvstim_log.clone().ok_or_else(|| {
                    Error::Path("pyvstim session has no combined log".to_string())
                })?;
                let (data, comments) = read_pyvstim_log(&log)?;
                vec![RunData {
                    data: extrapolate_time(data),
                    comments,
                }]
            }
            LogVersion::Stimpy => {
                let mut runs = Vec::with_capacity(self.paths.run_count());
                for run in self.paths.run_paths.clone() {
                    let (data, comments) =
                        Self::read_combine_logs(&[run.stimlog], &[run.riglog])?;
                    runs.push(RunData {
                        data: extrapolate_time(data),
                        comments,
                    });
                }
                runs
            }
        };
        self.logger.info("read rawdata");
        Ok(SessionRawData { runs })
    }

    /// Read and combine one or more stimlog/riglog pairs into a single
    /// stream.
    ///
    /// Multiple pairs are stitched per kind before combining; a single pair
    /// combines directly (stitching one run is the identity). Riglog
    /// channels overlay stimlog channels on a name collision; comments come
    /// back stimlog-first, tagged with their pair index.
    ///
    /// # Errors
    ///
    /// [`Error::RunCountMismatch`] before any file is opened when the lists
    /// differ in length; adapter errors otherwise. No partial result is
    /// produced.
    pub fn read_combine_logs(
        stimlog_paths: &[PathBuf],
        riglog_paths: &[PathBuf],
    ) -> Result<(LogData, Vec<Comment>)> {
        if stimlog_paths.len() != riglog_paths.len() {
            return Err(Error::RunCountMismatch {
                stimlogs: stimlog_paths.len(),
                riglogs: riglog_paths.len(),
            });
        }

        let mut stim_runs = Vec::with_capacity(stimlog_paths.len());
        let mut rig_runs = Vec::with_capacity(riglog_paths.len());
        let mut stim_comments = Vec::new();
        let mut rig_comments = Vec::new();
        for (run_no, (stim_path, rig_path)) in
            stimlog_paths.iter().zip(riglog_paths).enumerate()
        {
            let (stim, mut comments) = read_stimlog(stim_path)?;
            for c in &mut comments {
                c.run = run_no;
            }
            stim_comments.append(&mut comments);
            stim_runs.push(stim);

            let (rig, mut comments) = read_riglog(rig_path)?;
            for c in &mut comments {
                c.run = run_no;
            }
            rig_comments.append(&mut comments);
            rig_runs.push(rig);
        }

        let stim = stitch_runs(&stim_runs);
        let rig = stitch_runs(&rig_runs);

        let mut comments = stim_comments;
        comments.append(&mut rig_comments);
        Ok((overlay(stim, rig), comments))
    }

    /// Whether previously saved data exists for every run.
    ///
    /// True only when the save path exists and every expected per-run data
    /// file is present; each missing file is logged for diagnosis. Presence
    /// is all this checks; a corrupt file still reads as saved and fails
    /// later on load.
    pub fn is_saved(&mut self) -> bool {
        if !self.paths.save_path.exists() {
            self.logger.warn("save path does not exist");
            return false;
        }
        let mut loadable = true;
        for path in self.paths.data_paths.clone() {
            if path.exists() {
                self.logger.info(&format!("found saved data: {}", path.display()));
            } else {
                self.logger
                    .info(&format!("save path exists but {} is missing", path.display()));
                loadable = false;
            }
        }
        loadable
    }

    /// Load previously saved per-run tables.
    ///
    /// # Errors
    ///
    /// Storage failure reading any expected data file.
    pub fn load_data(&self) -> Result<SessionData> {
        SessionData::load(&self.paths.data_paths)
    }

    /// Save per-run tables to the expected data files, mirroring `.mat`
    /// files when the session was opened with `save_mat`.
    ///
    /// # Errors
    ///
    /// Storage failure writing any file.
    pub fn save_data(&self, data: &SessionData) -> Result<()> {
        data.save(&self.paths.data_paths, self.save_mat)
    }

    /// Idempotent upsert of this session's database row.
    ///
    /// First save inserts the row and bumps the animal's session counter;
    /// later saves update the existing row in place. Never creates a second
    /// row for the same `session_id`.
    ///
    /// # Errors
    ///
    /// Database access failure.
    pub fn save_to_db(&mut self, db_row: Row) -> Result<()> {
        let id_filter = row(&[("sessionId", json!(self.meta.session_id))]);

        if self.db.exists(&id_filter, SESSIONS_TABLE)? {
            self.db.update_entry(&id_filter, &db_row, SESSIONS_TABLE)?;
            self.logger.info(&format!(
                "session {} is already in database, updated the entry",
                self.meta.session_id
            ));
            return Ok(());
        }

        let session_no = self.overall_session_no()?;
        let mut entry = db_row;
        entry.insert("sessionId".to_string(), json!(self.meta.session_id));
        self.db.add_entry(entry, SESSIONS_TABLE)?;

        let animal_filter = row(&[("id", json!(self.meta.animalid))]);
        let patch = row(&[("nSessions", json!(session_no))]);
        let updated = self.db.update_entry(&animal_filter, &patch, ANIMALS_TABLE)?;
        if updated == 0 {
            self.db.add_entry(
                row(&[
                    ("id", json!(self.meta.animalid)),
                    ("nSessions", json!(session_no)),
                ]),
                ANIMALS_TABLE,
            )?;
        }
        Ok(())
    }

    /// Session number to assign to the session being processed: the
    /// animal's current counter (0 without a prior entry) plus one. Reads
    /// only; the counter moves in [`save_to_db`](Self::save_to_db).
    ///
    /// # Errors
    ///
    /// Database access failure.
    pub fn overall_session_no(&mut self) -> Result<i64> {
        let animal_filter = row(&[("id", json!(self.meta.animalid))]);
        let entries = self.db.get_entries(&animal_filter, ANIMALS_TABLE)?;
        let last = entries
            .first()
            .and_then(|e| e.get("nSessions"))
            .and_then(serde_json::Value::as_i64)
            .unwrap_or_else(|| {
                self.logger.info(&format!(
                    "no entry for animal {} in animals table",
                    self.meta.animalid
                ));
                0
            });
        Ok(last + 1)
    }

    /// Most recent cumulative trial count for the animal; 0 without a prior
    /// record or on any lookup failure.
    #[must_use]
    pub fn get_latest_trial_count(&self) -> i64 {
        let animal_filter = row(&[("id", json!(self.meta.animalid))]);
        self.db
            .get_entries(&animal_filter, TRIALS_TABLE)
            .ok()
            .and_then(|entries| {
                entries
                    .last()
                    .and_then(|e| e.get("total_trial_no"))
                    .and_then(serde_json::Value::as_i64)
            })
            .unwrap_or(0)
    }
}
