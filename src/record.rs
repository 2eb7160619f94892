//! Record model for one ingested test log.
//!
//! A [`ParsedRecord`] is produced fresh by the parser for every file. After
//! that only the versioning resolver touches it, and only to set
//! `version` and `superseded` right before the record is stored.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pass/fail verdict as written in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    /// Parse a verdict token (`PASS`/`OK`, `FAIL`/`NOK`, any case).
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_uppercase().as_str() {
            "PASS" | "PASSED" | "OK" => Some(Self::Pass),
            "FAIL" | "FAILED" | "NOK" => Some(Self::Fail),
            _ => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
        }
    }
}

/// Fields that make up the record key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub device_serial: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

/// Free-form descriptive header fields; all optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub operator_id: Option<String>,
    pub unit_serial: Option<String>,
    pub board_serial: Option<String>,
    pub firmware_version: Option<String>,
    pub config_version: Option<String>,
    pub read_level: Option<i64>,
}

/// One-line test summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub duration_seconds: u64,
    pub overall_result: Verdict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentMeasurement {
    pub value: f64,
    pub lower_limit: f64,
    pub upper_limit: f64,
    pub unit: String,
    pub result: Verdict,
}

/// Optional comparison line inside a signal block.
///
/// Limits are optional: a limit that does not parse means "no limit".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub kind: Option<String>,
    pub lower_limit: Option<f64>,
    pub upper_limit: Option<f64>,
    pub measurement: f64,
    pub unit: String,
    pub result: Verdict,
}

/// One repeating power-level test section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalBlock {
    pub output_power: i64,
    pub result: Verdict,
    pub comparison: Option<Comparison>,
    pub frequencies: Vec<i64>,
    /// Ragged: rows are not required to share a length.
    pub matrix: Vec<Vec<i64>>,
    pub averages: Vec<i64>,
    pub attenuations: Vec<i64>,
}

/// Metadata of a version that was replaced under the same key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupersededVersion {
    pub version: u32,
    pub fingerprint: String,
    pub superseded_at: DateTime<Utc>,
}

/// Canonical output of parsing one test log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRecord {
    pub key: String,
    pub identity: Identity,
    pub header: Header,
    pub summary: Summary,
    pub current: CurrentMeasurement,
    pub signal_blocks: Vec<SignalBlock>,
    pub raw_text: String,
    pub fingerprint: String,
    pub version: u32,
    pub superseded: Vec<SupersededVersion>,
    /// File name the record was parsed from.
    pub source_file: String,
    pub ingested_at: DateTime<Utc>,
}

impl ParsedRecord {
    /// Latest superseded entry, if this record replaced an earlier one.
    pub fn previous(&self) -> Option<&SupersededVersion> {
        self.superseded.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_parse() {
        assert_eq!(Verdict::parse("PASS"), Some(Verdict::Pass));
        assert_eq!(Verdict::parse(" pass "), Some(Verdict::Pass));
        assert_eq!(Verdict::parse("NOK"), Some(Verdict::Fail));
        assert_eq!(Verdict::parse("Failed"), Some(Verdict::Fail));
        assert_eq!(Verdict::parse("maybe"), None);
    }

    #[test]
    fn test_verdict_serializes_lowercase() {
        let json = serde_json::to_string(&Verdict::Fail).unwrap();
        assert_eq!(json, "\"fail\"");
    }
}
