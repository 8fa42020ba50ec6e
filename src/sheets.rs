//! External weight/water source
//!
//! The animal facility keeps weights and rig water in a spreadsheet; the
//! pipeline consumes a JSON export of it. Lookups are keyed by animal id +
//! bare date and are strictly best-effort: absence, a malformed file, or a
//! malformed cell all collapse to `None` fields and never propagate as
//! errors.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// One matching sheet row for a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightEntry {
    /// Animal weight in grams
    pub weight: Option<f64>,
    /// Water consumed on the rig, in microliters
    pub water_consumed: Option<i64>,
}

/// Anything that can answer a weight/water query for (animal id, bare date).
pub trait WeightSource {
    /// At most one matching entry; `None` when nothing matches.
    fn lookup(&self, animalid: &str, baredate: &str) -> Option<WeightEntry>;
}

#[derive(Debug, Deserialize)]
struct SheetRow {
    #[serde(rename = "Mouse ID")]
    mouse_id: String,
    #[serde(rename = "Date [YYMMDD]")]
    date: serde_json::Value,
    #[serde(rename = "weight [g]")]
    weight: Option<serde_json::Value>,
    #[serde(rename = "rig water [ul]")]
    rig_water: Option<serde_json::Value>,
}

/// JSON export of the animal-facility log sheet.
#[derive(Debug, Default)]
pub struct WeightSheet {
    rows: Vec<SheetRow>,
}

impl WeightSheet {
    /// Load a sheet export. A missing or unparseable file yields an empty
    /// sheet (every lookup misses), with a warning.
    #[must_use]
    pub fn open(path: &Path) -> Self {
        let rows = std::fs::read_to_string(path)
            .ok()
            .and_then(|contents| serde_json::from_str::<Vec<SheetRow>>(&contents).ok());
        match rows {
            Some(rows) => Self { rows },
            None => {
                warn!(path = %path.display(), "weight sheet unavailable, lookups will miss");
                Self::default()
            }
        }
    }

    fn date_matches(cell: &serde_json::Value, baredate: &str) -> bool {
        match cell {
            serde_json::Value::String(s) => s == baredate,
            // sheet exports sometimes carry the date as a number
            serde_json::Value::Number(n) => {
                baredate.parse::<i64>().ok() == n.as_i64()
            }
            _ => false,
        }
    }

    fn as_f64(cell: Option<&serde_json::Value>) -> Option<f64> {
        match cell? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn as_i64(cell: Option<&serde_json::Value>) -> Option<i64> {
        Self::as_f64(cell).map(|v| v as i64)
    }
}

impl WeightSource for WeightSheet {
    fn lookup(&self, animalid: &str, baredate: &str) -> Option<WeightEntry> {
        let row = self
            .rows
            .iter()
            .find(|r| r.mouse_id == animalid && Self::date_matches(&r.date, baredate))?;
        Some(WeightEntry {
            weight: Self::as_f64(row.weight.as_ref()),
            water_consumed: Self::as_i64(row.rig_water.as_ref()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SHEET: &str = r#"[
        {"Mouse ID": "KC045", "Date [YYMMDD]": 230615, "weight [g]": 24.3, "rig water [ul]": 850},
        {"Mouse ID": "KC045", "Date [YYMMDD]": "230616", "weight [g]": "24.1", "rig water [ul]": "bad"},
        {"Mouse ID": "KC012", "Date [YYMMDD]": 230615, "weight [g]": null, "rig water [ul]": null}
    ]"#;

    fn sheet() -> WeightSheet {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(SHEET.as_bytes()).unwrap();
        WeightSheet::open(f.path())
    }

    #[test]
    fn test_lookup_numeric_date() {
        let entry = sheet().lookup("KC045", "230615").unwrap();
        assert_eq!(entry.weight, Some(24.3));
        assert_eq!(entry.water_consumed, Some(850));
    }

    #[test]
    fn test_malformed_cells_become_none() {
        let entry = sheet().lookup("KC045", "230616").unwrap();
        assert_eq!(entry.weight, Some(24.1));
        assert_eq!(entry.water_consumed, None);
    }

    #[test]
    fn test_null_cells_become_none() {
        let entry = sheet().lookup("KC012", "230615").unwrap();
        assert_eq!(entry, WeightEntry::default());
    }

    #[test]
    fn test_no_match_is_none() {
        assert!(sheet().lookup("KC999", "230615").is_none());
    }

    #[test]
    fn test_missing_file_is_empty_sheet() {
        let sheet = WeightSheet::open(Path::new("/nonexistent/sheet.json"));
        assert!(sheet.lookup("KC045", "230615").is_none());
    }
}
