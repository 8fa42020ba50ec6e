//! Log format adapters
//!
//! Each adapter turns one log file into the common `(LogData, Vec<Comment>)`
//! representation. Stimlog files come in two dialects (the lab's pinned
//! stimpy build and the upstream github build); the reader walks an ordered
//! detector list and parses with the first format that recognizes the file.
//! Detection is a definite yes/no per format, not exception interception.
//! The riglog dialect never changed, so riglogs always go through the
//! primary format.
//!
//! ## Primary ("stimpy") grammar
//!
//! ```text
//! # CODES: vstim=10,stateMachine=20,wheel=2,lick=3,reward=4
//! # free text comment
//! 10,1533.2,1530.0,1
//! 10,1549.9,,2
//! ```
//!
//! Data lines are `code,elapsed,duino,value`: `elapsed` is the presentation
//! software clock (always present, loosely synced), `duino` the rig
//! microcontroller clock (empty when the event was not hardware-stamped).
//! A sample is an anchor iff `duino` is present.
//!
//! ## Github grammar
//!
//! ```text
//! ## STIMPY LOG v2
//! ## free text comment
//! vstim 1533.2 1530.0 1
//! vstim 1549.9 nan 2
//! ```
//!
//! Same fields, whitespace-separated, channel named inline, `nan` for a
//! missing rig stamp.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::warn;

use super::{Comment, LogData, Sample};
use crate::{Error, Result};

/// One log dialect: a definite detector plus a parser.
pub trait LogFormat: Sync {
    /// Short dialect name for diagnostics.
    fn name(&self) -> &'static str;

    /// Definite recognition check. Must not allocate per line beyond what a
    /// quick structural sniff needs; full validation belongs to [`parse`].
    ///
    /// [`parse`]: LogFormat::parse
    fn detect(&self, contents: &str) -> bool;

    /// Parse the whole file into channel streams and comments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] for a malformed line in a recognized file.
    fn parse(&self, contents: &str, path: &Path) -> Result<(LogData, Vec<Comment>)>;
}

/// Primary stimpy dialect (also the stable riglog dialect).
pub struct StimpyFormat;

/// Upstream github stimpy dialect.
pub struct StimpyGithubFormat;

/// Stimlog detectors in fallback order.
static STIMLOG_FORMATS: [&(dyn LogFormat); 2] = [&StimpyFormat, &StimpyGithubFormat];

impl StimpyFormat {
    fn parse_codes_header(line: &str) -> Option<BTreeMap<u32, String>> {
        let rest = line.strip_prefix("# CODES:")?;
        let mut codes = BTreeMap::new();
        for pair in rest.split(',') {
            let (name, code) = pair.split_once('=')?;
            let code: u32 = code.trim().parse().ok()?;
            codes.insert(code, name.trim().to_string());
        }
        Some(codes)
    }
}

impl LogFormat for StimpyFormat {
    fn name(&self) -> &'static str {
        "stimpy"
    }

    fn detect(&self, contents: &str) -> bool {
        let mut saw_codes = false;
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with("# CODES:") {
                saw_codes = true;
                continue;
            }
            if line.starts_with('#') {
                continue;
            }
            // First data line decides: codes header must precede it and the
            // line must have the 4-field CSV shape with a numeric code.
            let fields: Vec<&str> = line.split(',').collect();
            return saw_codes
                && fields.len() == 4
                && fields[0].trim().parse::<u32>().is_ok();
        }
        false
    }

    fn parse(&self, contents: &str, path: &Path) -> Result<(LogData, Vec<Comment>)> {
        let mut codes: BTreeMap<u32, String> = BTreeMap::new();
        let mut data = LogData::new();
        let mut comments = Vec::new();

        for (idx, raw) in contents.lines().enumerate() {
            let lineno = idx + 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with("# CODES:") {
                codes = Self::parse_codes_header(line).ok_or_else(|| Error::Parse {
                    path: path.to_path_buf(),
                    line: lineno,
                    message: "malformed CODES header".to_string(),
                })?;
                continue;
            }
            if let Some(text) = line.strip_prefix('#') {
                comments.push(Comment::new(lineno, text.trim()));
                continue;
            }

            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() != 4 {
                return Err(Error::Parse {
                    path: path.to_path_buf(),
                    line: lineno,
                    message: format!("expected 4 fields, got {}", fields.len()),
                });
            }
            let code: u32 = fields[0].trim().parse().map_err(|_| Error::Parse {
                path: path.to_path_buf(),
                line: lineno,
                message: format!("invalid event code `{}`", fields[0]),
            })?;
            let Some(channel) = codes.get(&code) else {
                warn!(code, line = lineno, "event code missing from CODES header, line skipped");
                continue;
            };
            let elapsed: f64 = fields[1].trim().parse().map_err(|_| Error::Parse {
                path: path.to_path_buf(),
                line: lineno,
                message: format!("invalid elapsed time `{}`", fields[1]),
            })?;
            let value: f64 = fields[3].trim().parse().map_err(|_| Error::Parse {
                path: path.to_path_buf(),
                line: lineno,
                message: format!("invalid value `{}`", fields[3]),
            })?;

            let duino = fields[2].trim();
            let sample = if duino.is_empty() {
                Sample::unmeasured(elapsed, value)
            } else {
                let t: f64 = duino.parse().map_err(|_| Error::Parse {
                    path: path.to_path_buf(),
                    line: lineno,
                    message: format!("invalid rig time `{duino}`"),
                })?;
                Sample::measured(t, value)
            };
            data.entry(channel.clone()).or_default().push(sample);
        }

        Ok((data, comments))
    }
}

impl LogFormat for StimpyGithubFormat {
    fn name(&self) -> &'static str {
        "stimpy-github"
    }

    fn detect(&self, contents: &str) -> bool {
        contents
            .lines()
            .find(|l| !l.trim().is_empty())
            .is_some_and(|l| l.trim().starts_with("## STIMPY"))
    }

    fn parse(&self, contents: &str, path: &Path) -> Result<(LogData, Vec<Comment>)> {
        let mut data = LogData::new();
        let mut comments = Vec::new();

        for (idx, raw) in contents.lines().enumerate() {
            let lineno = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with("## STIMPY") {
                continue;
            }
            if let Some(text) = line.strip_prefix("##") {
                comments.push(Comment::new(lineno, text.trim()));
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 4 {
                return Err(Error::Parse {
                    path: path.to_path_buf(),
                    line: lineno,
                    message: format!("expected 4 fields, got {}", fields.len()),
                });
            }
            let channel = fields[0];
            let elapsed: f64 = fields[1].parse().map_err(|_| Error::Parse {
                path: path.to_path_buf(),
                line: lineno,
                message: format!("invalid elapsed time `{}`", fields[1]),
            })?;
            let value: f64 = fields[3].parse().map_err(|_| Error::Parse {
                path: path.to_path_buf(),
                line: lineno,
                message: format!("invalid value `{}`", fields[3]),
            })?;

            let rig: f64 = fields[2].parse().map_err(|_| Error::Parse {
                path: path.to_path_buf(),
                line: lineno,
                message: format!("invalid rig time `{}`", fields[2]),
            })?;
            let sample = if rig.is_nan() {
                Sample::unmeasured(elapsed, value)
            } else {
                Sample::measured(rig, value)
            };
            data.entry(channel.to_string()).or_default().push(sample);
        }

        Ok((data, comments))
    }
}

/// Read one stimlog through the ordered detector list.
///
/// # Errors
///
/// [`Error::UnrecognizedFormat`] when no detector matches (fatal for that
/// run); [`Error::Parse`] when the matching dialect fails on a line.
pub fn read_stimlog(path: &Path) -> Result<(LogData, Vec<Comment>)> {
    let contents = std::fs::read_to_string(path)?;
    for format in STIMLOG_FORMATS {
        if format.detect(&contents) {
            tracing::debug!(format = format.name(), path = %path.display(), "stimlog format detected");
            return format.parse(&contents, path);
        }
    }
    Err(Error::UnrecognizedFormat {
        path: path.to_path_buf(),
    })
}

/// Read one riglog. The riglog dialect never changed, so this always uses
/// the primary format.
///
/// # Errors
///
/// [`Error::Parse`] on a malformed line, [`Error::UnrecognizedFormat`] if the
/// file lacks the riglog structure entirely.
pub fn read_riglog(path: &Path) -> Result<(LogData, Vec<Comment>)> {
    let contents = std::fs::read_to_string(path)?;
    if !StimpyFormat.detect(&contents) {
        return Err(Error::UnrecognizedFormat {
            path: path.to_path_buf(),
        });
    }
    StimpyFormat.parse(&contents, path)
}

/// Read a pyvstim session: one combined log carrying both stimulus and rig
/// events, in the primary grammar.
///
/// # Errors
///
/// Same failure modes as [`read_riglog`].
pub fn read_pyvstim_log(path: &Path) -> Result<(LogData, Vec<Comment>)> {
    read_riglog(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const STIMPY_LOG: &str = "\
# CODES: vstim=10,stateMachine=20
# rig warmed up
10,100.0,98.5,1
10,116.7,,2
20,120.0,119.0,3
";

    const GITHUB_LOG: &str = "\
## STIMPY LOG v2
## photodiode flaky today
vstim 100.0 98.5 1
vstim 116.7 nan 2
stateMachine 120.0 119.0 3
";

    fn p() -> PathBuf {
        PathBuf::from("test.stimlog")
    }

    #[test]
    fn test_stimpy_detects_own_dialect() {
        assert!(StimpyFormat.detect(STIMPY_LOG));
        assert!(!StimpyFormat.detect(GITHUB_LOG));
    }

    #[test]
    fn test_github_detects_own_dialect() {
        assert!(StimpyGithubFormat.detect(GITHUB_LOG));
        assert!(!StimpyGithubFormat.detect(STIMPY_LOG));
    }

    #[test]
    fn test_stimpy_parse_channels_and_anchors() {
        let (data, comments) = StimpyFormat.parse(STIMPY_LOG, &p()).unwrap();
        assert_eq!(data["vstim"].len(), 2);
        assert_eq!(data["stateMachine"].len(), 1);

        // hardware-stamped line is an anchor at the rig time
        assert!(data["vstim"][0].measured);
        assert_eq!(data["vstim"][0].time, 98.5);
        // blank duino field falls back to the elapsed clock, unmeasured
        assert!(!data["vstim"][1].measured);
        assert_eq!(data["vstim"][1].time, 116.7);

        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].text, "rig warmed up");
    }

    #[test]
    fn test_github_parse_matches_primary_semantics() {
        let (data, comments) = StimpyGithubFormat.parse(GITHUB_LOG, &p()).unwrap();
        assert_eq!(data["vstim"].len(), 2);
        assert!(data["vstim"][0].measured);
        assert!(!data["vstim"][1].measured);
        assert_eq!(data["vstim"][1].time, 116.7);
        assert_eq!(comments[0].text, "photodiode flaky today");
    }

    #[test]
    fn test_stimpy_rejects_short_line() {
        let bad = "# CODES: vstim=10\n10,100.0,1\n";
        let err = StimpyFormat.parse(bad, &p()).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 2, .. }));
    }

    #[test]
    fn test_unknown_code_skipped_not_fatal() {
        let log = "# CODES: vstim=10\n99,100.0,98.0,1\n10,101.0,99.0,2\n";
        let (data, _) = StimpyFormat.parse(log, &p()).unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data["vstim"].len(), 1);
    }

    #[test]
    fn test_comment_order_preserved() {
        let log = "# CODES: vstim=10\n# first\n10,1.0,1.0,1\n# second\n";
        let (_, comments) = StimpyFormat.parse(log, &p()).unwrap();
        let texts: Vec<_> = comments.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn test_detect_requires_codes_before_data() {
        let headerless = "10,100.0,98.5,1\n";
        assert!(!StimpyFormat.detect(headerless));
    }
}
