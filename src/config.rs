//! Pipeline configuration
//!
//! Names the three roots every session resolves against: where the
//! presentation software writes raw sessions, where analysis output goes,
//! and where the flat-file database lives. Loaded from a JSON file or built
//! directly (tests do the latter).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Resolved pipeline roots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Root the rig writes raw session directories under
    pub presentation_path: PathBuf,
    /// Root for analysis output (saved tables, session logs)
    pub analysis_path: PathBuf,
    /// Directory holding the flat-file database tables
    pub database_path: PathBuf,
    /// Optional JSON export of the animal-facility weight sheet
    #[serde(default)]
    pub weight_sheet: Option<PathBuf>,
}

impl Config {
    /// Load a config file.
    ///
    /// # Errors
    ///
    /// IO or JSON deserialization failure.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}
