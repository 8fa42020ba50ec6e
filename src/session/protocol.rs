//! Protocol file parsing
//!
//! A protocol file is a `key = value` option block followed by a
//! tab-separated parameter table (header row then numeric rows); the table
//! carries at least the `sf` and `tf` stimulus columns. Option values are
//! coerced to numbers where possible and kept as text otherwise.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A protocol option value: numeric when it coerces, raw text otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProtocolValue {
    /// Value that parsed as a float
    Number(f64),
    /// Anything else, kept verbatim
    Text(String),
}

impl ProtocolValue {
    /// Coerce a raw option string, falling back to text.
    #[must_use]
    pub fn coerce(raw: &str) -> Self {
        let trimmed = raw.trim();
        trimmed
            .parse::<f64>()
            .map_or_else(|_| Self::Text(trimmed.to_string()), Self::Number)
    }

    /// The value as text, however it was stored.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }

    /// The value as a float, if numeric.
    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

/// Tabular parameter section of a protocol file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamTable {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl ParamTable {
    /// Column names in file order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of parameter rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sorted, NaN-filtered, deduplicated values of one column.
    ///
    /// Returns an empty vec for a column the table does not have.
    #[must_use]
    pub fn unique_values(&self, column: &str) -> Vec<f64> {
        let Some(idx) = self.columns.iter().position(|c| c == column) else {
            return Vec::new();
        };
        let mut values: Vec<f64> = self
            .rows
            .iter()
            .filter_map(|row| row.get(idx).copied())
            .filter(|v| !v.is_nan())
            .collect();
        values.sort_by(f64::total_cmp);
        values.dedup();
        values
    }
}

/// Parsed protocol file: options plus the parameter table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProtocolFile {
    /// Option block, values coerced
    pub options: BTreeMap<String, ProtocolValue>,
    /// Tab-separated parameter table
    pub params: ParamTable,
}

/// Parse a protocol file from disk.
///
/// # Errors
///
/// IO failure, or [`Error::Parse`] when the parameter table is structurally
/// broken (row width differing from the header).
pub fn parse_protocol_file(path: &Path) -> Result<ProtocolFile> {
    let contents = std::fs::read_to_string(path)?;
    parse_protocol(&contents, path)
}

fn parse_protocol(contents: &str, path: &Path) -> Result<ProtocolFile> {
    let mut options = BTreeMap::new();
    let mut params = ParamTable::default();
    let mut in_table = false;

    for (idx, raw) in contents.lines().enumerate() {
        let line = raw.trim_end();
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }

        if !in_table {
            if let Some((key, value)) = line.split_once('=') {
                options.insert(key.trim().to_string(), ProtocolValue::coerce(value));
                continue;
            }
            // first non key=value line opens the parameter table header
            in_table = true;
            params.columns = line.split('\t').map(|c| c.trim().to_string()).collect();
            continue;
        }

        let row: Vec<f64> = line
            .split('\t')
            .map(|cell| cell.trim().parse::<f64>().unwrap_or(f64::NAN))
            .collect();
        if row.len() != params.columns.len() {
            return Err(Error::Parse {
                path: path.to_path_buf(),
                line: idx + 1,
                message: format!(
                    "parameter row has {} cells, header has {}",
                    row.len(),
                    params.columns.len()
                ),
            });
        }
        params.rows.push(row);
    }

    Ok(ProtocolFile { options, params })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const PROT: &str = "\
controller = OptoDetectionController
optoMode = 1
stimDuration = 1.5
picsFolder = C:\\pics

sf\ttf\tcontrast
0.04\t1\t0.5
0.08\t2\t1
0.04\tnan\t0.1
";

    fn parse(contents: &str) -> ProtocolFile {
        parse_protocol(contents, &PathBuf::from("detect_level3.txt")).unwrap()
    }

    #[test]
    fn test_option_coercion() {
        let prot = parse(PROT);
        assert_eq!(
            prot.options["controller"],
            ProtocolValue::Text("OptoDetectionController".to_string())
        );
        assert_eq!(prot.options["stimDuration"], ProtocolValue::Number(1.5));
        assert_eq!(prot.options["optoMode"], ProtocolValue::Number(1.0));
    }

    #[test]
    fn test_param_table_shape() {
        let prot = parse(PROT);
        assert_eq!(prot.params.columns(), ["sf", "tf", "contrast"]);
        assert_eq!(prot.params.len(), 3);
    }

    #[test]
    fn test_unique_values_sorted_deduped_nonan() {
        let prot = parse(PROT);
        assert_eq!(prot.params.unique_values("sf"), vec![0.04, 0.08]);
        // nan row dropped from tf
        assert_eq!(prot.params.unique_values("tf"), vec![1.0, 2.0]);
        assert!(prot.params.unique_values("ori").is_empty());
    }

    #[test]
    fn test_ragged_row_rejected() {
        let bad = "sf\ttf\n0.04\n";
        let err = parse_protocol(&bad, &PathBuf::from("p.txt")).unwrap_err();
        assert!(matches!(err, crate::Error::Parse { .. }));
    }

    #[test]
    fn test_options_only_no_table() {
        let prot = parse("controller = Detection\n");
        assert!(prot.params.is_empty());
        assert_eq!(prot.options.len(), 1);
    }
}
