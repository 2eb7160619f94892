//! Factory test-log parser
//!
//! Pure transformation from the raw text of one log file into a
//! [`ParsedRecord`]. The input is scanned as four ordered sections:
//!
//! ```text
//! Device Serial Number: SN123          ┐
//! Date: 2024-03-15                     │ header / identity
//! Time: 14:05:09                       ┘ (label: value, prefix match)
//! Test duration:  125  Result:  PASS     test summary
//! Measured current:  0,174719  LimitLow: ... Pass/Fail: PASS
//! Signal test                          ┐
//! Output power:  10  Pass/Fail:  PASS  │ zero or more signal blocks
//! GELE  0,5  1,5  0,9  dB  PASS        │ (see `signal`)
//! Frequencies: ...                     ┘
//! ```
//!
//! Unknown lines are skipped. A required field that is missing or fails to
//! convert aborts the parse with a [`FormatError`] naming that field.
//!
//! ## Example
//!
//! ```no_run
//! use loghopper::parser;
//!
//! # fn example() -> anyhow::Result<()> {
//! let text = std::fs::read_to_string("drop/SN123.txt")?;
//! let record = parser::parse(&text, "SN123.txt")?;
//! println!("{} -> {}", record.key, record.summary.overall_result);
//! # Ok(())
//! # }
//! ```

mod signal;
mod tokens;

use crate::error::FormatError;
use crate::identity;
use crate::record::{CurrentMeasurement, Header, Identity, ParsedRecord, Summary, Verdict};
use chrono::{NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tokens::{LabeledFields, has_label, parse_decimal, value_after_colon};

/// Decimal separator used for measurement values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecimalConvention {
    /// `0,174719`
    #[default]
    Comma,
    /// `0.174719`
    Point,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    pub decimal: DecimalConvention,
}

const SUMMARY: &[&str] = &["test duration", "duration"];
const CURRENT: &[&str] = &["measured current"];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y", "%Y/%m/%d"];
const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M"];

/// Parse with the default (decimal-comma) options.
///
/// # Errors
///
/// Returns [`FormatError`] when the identity, summary or current
/// measurement cannot be located or converted, or a signal block is
/// malformed.
pub fn parse(raw_text: &str, file_name: &str) -> Result<ParsedRecord, FormatError> {
    parse_with(raw_text, file_name, &ParseOptions::default())
}

/// Parse one log file.
///
/// # Errors
///
/// See [`parse`].
pub fn parse_with(
    raw_text: &str,
    file_name: &str,
    options: &ParseOptions,
) -> Result<ParsedRecord, FormatError> {
    let body = raw_text.strip_prefix('\u{feff}').unwrap_or(raw_text);
    let lines: Vec<&str> = body.lines().collect();

    let header_end = lines
        .iter()
        .position(|l| starts_body_section(l))
        .unwrap_or(lines.len());
    let (header_lines, rest) = lines.split_at(header_end);
    let header = HeaderFields::scan(header_lines);

    let blocks_start = rest
        .iter()
        .position(|l| signal::is_block_marker(l))
        .unwrap_or(rest.len());
    let (preamble, block_lines) = rest.split_at(blocks_start);

    let summary = parse_summary(preamble)?;
    let current = parse_current(preamble, options)?;
    let signal_blocks = signal::parse_blocks(block_lines, options)?;

    // Identity is checked last, once every section has been scanned.
    let identity = header.identity()?;

    Ok(ParsedRecord {
        key: identity::record_key(&identity),
        identity,
        header: header.descriptive,
        summary,
        current,
        signal_blocks,
        fingerprint: identity::fingerprint(raw_text),
        raw_text: raw_text.to_owned(),
        version: 1,
        superseded: Vec::new(),
        source_file: file_name.to_owned(),
        ingested_at: Utc::now(),
    })
}

fn starts_body_section(line: &str) -> bool {
    has_label(line, SUMMARY) || has_label(line, CURRENT) || signal::is_block_marker(line)
}

/// Raw identity values plus the descriptive header.
#[derive(Debug, Default)]
struct HeaderFields<'a> {
    device_serial: Option<&'a str>,
    date: Option<&'a str>,
    time: Option<&'a str>,
    descriptive: Header,
}

impl<'a> HeaderFields<'a> {
    fn scan(lines: &[&'a str]) -> Self {
        let mut fields = Self::default();

        for &line in lines {
            if !line.contains(':') {
                continue;
            }
            let value = value_after_colon(line);
            let text = (!value.is_empty()).then(|| value.to_owned());

            // More specific labels first: "unit serial" before "date"/"time" etc.
            if has_label(line, &["device serial"]) {
                fields.device_serial = Some(value);
            } else if has_label(line, &["unit serial"]) {
                fields.descriptive.unit_serial = text;
            } else if has_label(line, &["board serial", "pcb serial"]) {
                fields.descriptive.board_serial = text;
            } else if has_label(line, &["operator"]) {
                fields.descriptive.operator_id = text;
            } else if has_label(line, &["firmware"]) {
                fields.descriptive.firmware_version = text;
            } else if has_label(line, &["config version", "configuration version"]) {
                fields.descriptive.config_version = text;
            } else if has_label(line, &["read level"]) {
                fields.descriptive.read_level = tokens::parse_int(value);
            } else if has_label(line, &["date"]) {
                fields.date = Some(value);
            } else if has_label(line, &["time"]) {
                fields.time = Some(value);
            }
        }

        fields
    }

    fn identity(&self) -> Result<Identity, FormatError> {
        let device_serial = self
            .device_serial
            .filter(|s| !s.is_empty())
            .ok_or(FormatError::MissingField("device serial number"))?;

        let raw_date = self
            .date
            .filter(|s| !s.is_empty())
            .ok_or(FormatError::MissingField("date"))?;
        let date = DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(raw_date, fmt).ok())
            .ok_or_else(|| FormatError::invalid("date", raw_date, "not a calendar date"))?;

        let raw_time = self
            .time
            .filter(|s| !s.is_empty())
            .ok_or(FormatError::MissingField("time"))?;
        let time = TIME_FORMATS
            .iter()
            .find_map(|fmt| NaiveTime::parse_from_str(raw_time, fmt).ok())
            .ok_or_else(|| FormatError::invalid("time", raw_time, "not a time of day"))?;

        Ok(Identity {
            device_serial: device_serial.to_owned(),
            date,
            time,
        })
    }
}

fn parse_summary(lines: &[&str]) -> Result<Summary, FormatError> {
    let line = lines
        .iter()
        .find(|l| has_label(l, SUMMARY))
        .ok_or(FormatError::MissingField("test summary"))?;
    let fields = LabeledFields::parse(line);

    let raw_duration = fields
        .get(&["duration"])
        .ok_or(FormatError::MissingField("test duration"))?;
    let duration_seconds = raw_duration
        .parse::<u64>()
        .map_err(|e| FormatError::invalid("test duration", raw_duration, e.to_string()))?;

    let raw_result = fields
        .get(&["result", "pass/fail"])
        .ok_or(FormatError::MissingField("test result"))?;
    let overall_result = Verdict::parse(raw_result)
        .ok_or_else(|| FormatError::invalid("test result", raw_result, "expected PASS or FAIL"))?;

    Ok(Summary {
        duration_seconds,
        overall_result,
    })
}

/// Parse the current-measurement record from the first line carrying its label.
fn parse_current(lines: &[&str], options: &ParseOptions) -> Result<CurrentMeasurement, FormatError> {
    let line = lines
        .iter()
        .find(|l| has_label(l, CURRENT))
        .ok_or(FormatError::MissingField("measured current"))?;
    current_from_line(line, options)
}

pub(crate) fn current_from_line(
    line: &str,
    options: &ParseOptions,
) -> Result<CurrentMeasurement, FormatError> {
    let fields = LabeledFields::parse(line);
    let decimal = |needles: &[&str], field: &'static str| -> Result<f64, FormatError> {
        let raw = fields.get(needles).ok_or(FormatError::MissingField(field))?;
        parse_decimal(raw, options.decimal)
            .ok_or_else(|| FormatError::invalid(field, raw, "not a decimal number"))
    };

    let value = decimal(CURRENT, "measured current")?;
    let lower_limit = decimal(&["limitlow", "limit low", "lower"], "current lower limit")?;
    let upper_limit = decimal(&["limithigh", "limit high", "upper"], "current upper limit")?;

    let raw_result = fields
        .get(&["pass/fail", "result"])
        .ok_or(FormatError::MissingField("current result"))?;
    let result = Verdict::parse(raw_result)
        .ok_or_else(|| FormatError::invalid("current result", raw_result, "expected PASS or FAIL"))?;

    Ok(CurrentMeasurement {
        value,
        lower_limit,
        upper_limit,
        unit: fields.get(&["unit"]).unwrap_or_default().to_owned(),
        result,
    })
}
