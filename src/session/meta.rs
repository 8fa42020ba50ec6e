//! Session metadata derivation
//!
//! Canonical identity and metadata bundle for one session, derived from
//! exactly one of two sources: the protocol file (plus directory naming
//! convention and the optional weight sheet), or a pre-built key/value row
//! such as a database entry. Either path ends with a derived `session_id`;
//! failing to derive one is fatal and names the offending session directory.
//!
//! Directory naming convention: `<date>_<animalid>_..._<user>` with the date
//! token in `YYMMDD`.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::protocol::{parse_protocol_file, ProtocolValue};
use crate::sheets::WeightSource;
use crate::{Error, Result};

/// Protocol options that are presentation-software plumbing, not session
/// metadata.
const IGNORED_OPTIONS: [&str; 8] = [
    "picsFolder",
    "picsNameFormat",
    "shuffle",
    "mask",
    "nTrials",
    "progressWindow",
    "debiasingWindow",
    "decimationRatio",
];

/// Optogenetic stimulation mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptoMode {
    /// Continuous stimulation (code 0)
    #[default]
    Continuous,
    /// Pulsed stimulation (code 1)
    Pulsed,
}

impl OptoMode {
    /// Decode the protocol's integer opto mode; unknown codes read as
    /// continuous, matching the rig default.
    #[must_use]
    pub fn from_code(code: i64) -> Self {
        if code == 1 {
            Self::Pulsed
        } else {
            Self::Continuous
        }
    }
}

/// Session metadata with named, typed fields.
///
/// Protocol options that have no dedicated field land in `extra` keyed by
/// their option name; options on the ignore list are dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    /// Animal identifier (second directory token, e.g. `KC045`)
    pub animalid: String,
    /// Experimenter initials (last directory token)
    pub user: String,
    /// Six-digit session date, `YYMMDD`
    pub baredate: String,
    /// Parsed session date
    pub date: NaiveDate,
    /// Human-readable date, `DD Mon YY`
    pub nicedate: String,
    /// Protocol-file creation clock time, `HHMM`
    pub time: String,
    /// Durable session identity: baredate + time + digits of the animal id
    pub session_id: String,
    /// Training level token from the protocol filename, `"exp"` when absent
    pub level: String,
    /// Experiment controller named by the protocol, if any
    pub controller: Option<String>,
    /// Whether an opto-class controller drives this session
    pub opto: bool,
    /// Opto stimulation mode; only meaningful when `opto` is set
    pub opto_mode: Option<OptoMode>,
    /// Deduplicated spatial-frequency values from the parameter table
    pub sf_values: Vec<f64>,
    /// Deduplicated temporal-frequency values from the parameter table
    pub tf_values: Vec<f64>,
    /// Animal weight from the weight sheet, grams
    pub weight: Option<f64>,
    /// Water consumed on the rig from the weight sheet, microliters
    pub water_consumed: Option<i64>,
    /// Session directory name
    pub session_dir: String,
    /// Protocol file stem
    pub experiment_name: String,
    /// Rig name from the preferences file, when set
    pub rig: Option<String>,
    /// Recognized-but-untyped protocol options
    pub extra: BTreeMap<String, ProtocolValue>,
}

impl SessionMeta {
    /// Derive metadata from a protocol file.
    ///
    /// `weights` is the optional external weight/water source; pass `None`
    /// to skip the lookup entirely. Lookup failures degrade to `None`
    /// fields and never propagate.
    ///
    /// # Errors
    ///
    /// IO/parse failure on the protocol file, or [`Error::SessionId`] when
    /// the directory naming convention or the animal id digits cannot
    /// produce an identity.
    pub fn from_protocol_file(
        prot_file: &Path,
        weights: Option<&dyn WeightSource>,
    ) -> Result<Self> {
        let prot = parse_protocol_file(prot_file)?;

        let session_dir = dir_name(prot_file)?;
        let experiment_name = file_stem(prot_file)?;

        let tokens: Vec<&str> = session_dir.split('_').collect();
        if tokens.len() < 3 {
            return Err(Error::SessionId {
                session_dir: session_dir.clone(),
                reason: format!(
                    "directory name has {} underscore token(s), expected <date>_<animalid>_..._<user>",
                    tokens.len()
                ),
            });
        }
        let baredate = tokens[0].to_string();
        let animalid = tokens[1].to_string();
        let user = tokens[tokens.len() - 1].to_string();

        let date = NaiveDate::parse_from_str(&baredate, "%y%m%d").map_err(|e| {
            Error::SessionId {
                session_dir: session_dir.clone(),
                reason: format!("date token `{baredate}` is not YYMMDD: {e}"),
            }
        })?;
        let nicedate = date.format("%d %b %y").to_string();
        let time = creation_clock(prot_file).map_err(|e| Error::SessionId {
            session_dir: session_dir.clone(),
            reason: format!("cannot read protocol file clock: {e}"),
        })?;

        // option block: typed fields peel off, the rest goes to `extra`
        let mut controller = None;
        let mut opto = false;
        let mut opto_mode = None;
        let mut extra = BTreeMap::new();
        for (key, value) in prot.options {
            if IGNORED_OPTIONS.contains(&key.as_str()) {
                continue;
            }
            match key.as_str() {
                "controller" => {
                    let name = value.as_text();
                    opto = name.contains("Opto");
                    controller = Some(name);
                }
                "optoMode" => {
                    #[allow(clippy::cast_possible_truncation)]
                    let code = value.as_number().map_or(0, |n| n as i64);
                    opto_mode = Some(OptoMode::from_code(code));
                }
                _ => {
                    extra.insert(key, value);
                }
            }
        }
        if !opto {
            opto_mode = None;
        } else if opto_mode.is_none() {
            opto_mode = Some(OptoMode::default());
        }

        let (weight, water_consumed) = match weights {
            Some(source) => match source.lookup(&animalid, &baredate) {
                Some(entry) => (entry.weight, entry.water_consumed),
                None => {
                    debug!(%animalid, %baredate, "no weight sheet entry for session");
                    (None, None)
                }
            },
            None => (None, None),
        };

        let session_id = generate_session_id(&session_dir, &baredate, &time, &animalid)?;

        Ok(Self {
            animalid,
            user,
            baredate,
            date,
            nicedate,
            time,
            session_id,
            level: level_from_filename(&experiment_name),
            controller,
            opto,
            opto_mode,
            sf_values: prot.params.unique_values("sf"),
            tf_values: prot.params.unique_values("tf"),
            weight,
            water_consumed,
            session_dir,
            experiment_name,
            rig: None,
            extra,
        })
    }

    /// Build metadata from a pre-built key/value row (e.g. a database
    /// entry). Required keys: `animalid`, `user`, `baredate`, `time`;
    /// `session_id` is taken when present and derived otherwise. Unknown
    /// keys land in `extra`; no further validation happens on this path.
    ///
    /// # Errors
    ///
    /// [`Error::MissingField`] for a missing required key,
    /// [`Error::SessionId`] when an identity has to be derived and cannot.
    pub fn from_entries(entries: &serde_json::Map<String, Value>) -> Result<Self> {
        let get_str = |key: &str| -> Result<String> {
            entries
                .get(key)
                .and_then(Value::as_str)
                .map(ToString::to_string)
                .ok_or_else(|| Error::MissingField(key.to_string()))
        };

        let animalid = get_str("animalid")?;
        let user = get_str("user")?;
        let baredate = get_str("baredate")?;
        let time = get_str("time")?;
        let session_dir = get_str("session_dir").unwrap_or_default();
        // entries without a recorded directory still get a named error
        let id_context = if session_dir.is_empty() {
            animalid.clone()
        } else {
            session_dir.clone()
        };

        let date = NaiveDate::parse_from_str(&baredate, "%y%m%d").map_err(|e| {
            Error::SessionId {
                session_dir: id_context.clone(),
                reason: format!("date token `{baredate}` is not YYMMDD: {e}"),
            }
        })?;

        let session_id = match entries.get("session_id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => generate_session_id(&id_context, &baredate, &time, &animalid)?,
        };

        let known = [
            "animalid",
            "user",
            "baredate",
            "time",
            "session_id",
            "session_dir",
            "experiment_name",
            "level",
            "controller",
            "opto",
            "opto_mode",
            "sf_values",
            "tf_values",
            "weight",
            "water_consumed",
            "rig",
            "date",
            "nicedate",
        ];
        let extra = entries
            .iter()
            .filter(|(key, _)| !known.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), protocol_value_from_json(value)))
            .collect();

        let opto = entries.get("opto").and_then(Value::as_bool).unwrap_or(false);
        Ok(Self {
            nicedate: date.format("%d %b %y").to_string(),
            date,
            level: get_str("level").unwrap_or_else(|_| "exp".to_string()),
            controller: get_str("controller").ok(),
            opto,
            opto_mode: if opto {
                Some(OptoMode::from_code(
                    entries.get("opto_mode").and_then(Value::as_i64).unwrap_or(0),
                ))
            } else {
                None
            },
            sf_values: json_f64_list(entries.get("sf_values")),
            tf_values: json_f64_list(entries.get("tf_values")),
            weight: entries.get("weight").and_then(Value::as_f64),
            water_consumed: entries.get("water_consumed").and_then(Value::as_i64),
            experiment_name: get_str("experiment_name").unwrap_or_default(),
            rig: get_str("rig").ok(),
            extra,
            animalid,
            user,
            baredate,
            time,
            session_id,
            session_dir,
        })
    }

    /// Set the rig name from a preferences JSON file: `rig.name` when
    /// present, otherwise the last path component of `tmpFolder`.
    ///
    /// # Errors
    ///
    /// IO or JSON failure on the preferences file.
    pub fn set_rig(&mut self, pref_file: &Path) -> Result<()> {
        let contents = std::fs::read_to_string(pref_file)?;
        let prefs: Value = serde_json::from_str(&contents)?;

        let named = prefs
            .get("rig")
            .and_then(|r| r.get("name"))
            .and_then(Value::as_str)
            .map(ToString::to_string);
        self.rig = named.or_else(|| {
            prefs
                .get("tmpFolder")
                .and_then(Value::as_str)
                .and_then(|folder| folder.replace('\\', "/").split('/').next_back().map(ToString::to_string))
        });
        Ok(())
    }
}

/// Durable session identity. Fails loudly when the animal id carries no
/// digits; a silent malformed id would poison every downstream table.
fn generate_session_id(
    session_dir: &str,
    baredate: &str,
    time: &str,
    animalid: &str,
) -> Result<String> {
    let digits: String = animalid.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Err(Error::SessionId {
            session_dir: session_dir.to_string(),
            reason: format!("animal id `{animalid}` contains no digits"),
        });
    }
    Ok(format!("{baredate}{time}{digits}"))
}

/// `level<N>` token from the protocol file stem, terminated at the first
/// `.` or `_`; `"exp"` when the token is absent.
fn level_from_filename(name: &str) -> String {
    name.find("level").map_or_else(
        || "exp".to_string(),
        |at| {
            name[at + "level".len()..]
                .chars()
                .take_while(|c| *c != '.' && *c != '_')
                .collect()
        },
    )
}

/// Protocol-file creation clock formatted `HHMM`. Filesystems without a
/// birth time fall back to the modification time.
fn creation_clock(path: &Path) -> std::io::Result<String> {
    let meta = std::fs::metadata(path)?;
    let stamp = meta.created().or_else(|_| meta.modified())?;
    let local: DateTime<Local> = stamp.into();
    Ok(local.format("%H%M").to_string())
}

fn dir_name(prot_file: &Path) -> Result<String> {
    prot_file
        .parent()
        .and_then(Path::file_name)
        .and_then(|n| n.to_str())
        .map(ToString::to_string)
        .ok_or_else(|| Error::Path(format!("protocol file has no parent directory: {}", prot_file.display())))
}

fn file_stem(prot_file: &Path) -> Result<String> {
    prot_file
        .file_stem()
        .and_then(|n| n.to_str())
        .map(ToString::to_string)
        .ok_or_else(|| Error::Path(format!("protocol file has no file name: {}", prot_file.display())))
}

fn protocol_value_from_json(value: &Value) -> ProtocolValue {
    match value {
        Value::Number(n) => n
            .as_f64()
            .map_or_else(|| ProtocolValue::Text(n.to_string()), ProtocolValue::Number),
        Value::String(s) => ProtocolValue::coerce(s),
        other => ProtocolValue::Text(other.to_string()),
    }
}

fn json_f64_list(value: Option<&Value>) -> Vec<f64> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default()
}
