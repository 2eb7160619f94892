//! Repeating signal blocks.
//!
//! Each block starts at a `Signal test` marker and runs to the next marker
//! or end of input. Inside a block the lines may come in any order, except
//! that matrix rows follow the frequency line and stop at a blank line or
//! the next known label.

use super::tokens::{
    LabeledFields, has_label, is_int_row, parse_decimal, parse_int, parse_int_list,
    tokens_after_colon,
};
use super::{DecimalConvention, ParseOptions};
use crate::error::FormatError;
use crate::record::{Comparison, SignalBlock, Verdict};

const BLOCK_MARKER: &[&str] = &["signal test"];
const OUTPUT_POWER: &[&str] = &["output power"];
const FREQUENCIES: &[&str] = &["frequencies", "frequency"];
const AVERAGES: &[&str] = &["averages", "average"];
const ATTENUATIONS: &[&str] = &["attenuations", "attenuation"];

/// Whether the line opens a new signal block.
pub(crate) fn is_block_marker(line: &str) -> bool {
    has_label(line, BLOCK_MARKER)
}

/// Parse every block in `lines`, which must start at a block marker (or be
/// empty).
pub(crate) fn parse_blocks(
    lines: &[&str],
    options: &ParseOptions,
) -> Result<Vec<SignalBlock>, FormatError> {
    let mut blocks = Vec::new();
    let mut start: Option<usize> = None;

    for (idx, line) in lines.iter().enumerate() {
        if is_block_marker(line) {
            if let Some(begin) = start.replace(idx) {
                blocks.push(parse_block(lines.get(begin + 1..idx).unwrap_or_default(), options)?);
            }
        }
    }
    if let Some(begin) = start {
        blocks.push(parse_block(lines.get(begin + 1..).unwrap_or_default(), options)?);
    }

    Ok(blocks)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Body,
    Matrix,
}

#[derive(Debug, Default)]
struct BlockBuilder {
    power: Option<(i64, Verdict)>,
    comparison: Option<Comparison>,
    frequencies: Vec<i64>,
    matrix: Vec<Vec<i64>>,
    averages: Vec<i64>,
    attenuations: Vec<i64>,
}

impl BlockBuilder {
    fn finish(self) -> Result<SignalBlock, FormatError> {
        let (output_power, result) = self.power.ok_or(FormatError::MissingField("output power"))?;
        Ok(SignalBlock {
            output_power,
            result,
            comparison: self.comparison,
            frequencies: self.frequencies,
            matrix: self.matrix,
            averages: self.averages,
            attenuations: self.attenuations,
        })
    }
}

fn parse_block(lines: &[&str], options: &ParseOptions) -> Result<SignalBlock, FormatError> {
    let mut block = BlockBuilder::default();
    let mut phase = Phase::Body;

    for line in lines {
        if line.trim().is_empty() {
            phase = Phase::Body;
            continue;
        }

        if has_label(line, OUTPUT_POWER) {
            block.power = Some(parse_output_power(line)?);
            phase = Phase::Body;
        } else if has_label(line, FREQUENCIES) {
            block.frequencies = int_array(line, "frequencies")?;
            phase = Phase::Matrix;
        } else if has_label(line, AVERAGES) {
            block.averages = int_array(line, "averages")?;
            phase = Phase::Body;
        } else if has_label(line, ATTENUATIONS) {
            block.attenuations = int_array(line, "attenuations")?;
            phase = Phase::Body;
        } else if phase == Phase::Matrix && is_int_row(line) {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let row = parse_int_list(&tokens)
                .map_err(|bad| FormatError::invalid("matrix", bad, "not an integer"))?;
            block.matrix.push(row);
        } else if block.comparison.is_none() && looks_like_comparison(line) {
            block.comparison = Some(parse_comparison(line, options.decimal)?);
        }
        // anything else is an unknown line and skipped
    }

    block.finish()
}

fn parse_output_power(line: &str) -> Result<(i64, Verdict), FormatError> {
    let fields = LabeledFields::parse(line);
    let raw = fields
        .get(OUTPUT_POWER)
        .ok_or(FormatError::MissingField("output power"))?;
    let power =
        parse_int(raw).ok_or_else(|| FormatError::invalid("output power", raw, "not an integer"))?;

    let raw_result = fields
        .get(&["pass/fail", "result"])
        .ok_or(FormatError::MissingField("signal result"))?;
    let result = Verdict::parse(raw_result)
        .ok_or_else(|| FormatError::invalid("signal result", raw_result, "expected PASS or FAIL"))?;

    Ok((power, result))
}

fn int_array(line: &str, field: &'static str) -> Result<Vec<i64>, FormatError> {
    parse_int_list(&tokens_after_colon(line))
        .map_err(|bad| FormatError::invalid(field, bad, "not an integer"))
}

/// An unlabelled line of at least five tokens ending in a verdict.
fn looks_like_comparison(line: &str) -> bool {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    tokens.len() >= 5
        && !tokens.iter().any(|t| t.ends_with(':'))
        && tokens.last().and_then(|t| Verdict::parse(t)).is_some()
}

/// `[TYPE] low high measured unit verdict`.
///
/// The leading token is probed: if it is not a number it is the comparison
/// type and the remaining fields shift by one. Unparseable limits mean "no
/// limit".
fn parse_comparison(line: &str, convention: DecimalConvention) -> Result<Comparison, FormatError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let (kind, fields) = match tokens.split_first() {
        Some((first, rest)) if parse_decimal(first, convention).is_none() => {
            (Some((*first).to_owned()), rest)
        }
        _ => (None, tokens.as_slice()),
    };

    let [low, high, measured, unit, verdict, ..] = fields else {
        return Err(FormatError::MissingField("comparison measurement"));
    };

    let measurement = parse_decimal(measured, convention).ok_or_else(|| {
        FormatError::invalid("comparison measurement", *measured, "not a decimal number")
    })?;
    let result = Verdict::parse(verdict)
        .ok_or_else(|| FormatError::invalid("comparison result", *verdict, "expected PASS or FAIL"))?;

    Ok(Comparison {
        kind,
        lower_limit: parse_decimal(low, convention),
        upper_limit: parse_decimal(high, convention),
        measurement,
        unit: (*unit).to_owned(),
        result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> ParseOptions {
        ParseOptions::default()
    }

    #[test]
    fn test_comparison_with_type_label() {
        let cmp = parse_comparison("GELE\t0,5\t1,5\t0,9\tdB\tPASS", DecimalConvention::Comma).unwrap();
        assert_eq!(cmp.kind.as_deref(), Some("GELE"));
        assert_eq!(cmp.lower_limit, Some(0.5));
        assert_eq!(cmp.upper_limit, Some(1.5));
        assert_eq!(cmp.measurement, 0.9);
        assert_eq!(cmp.unit, "dB");
        assert_eq!(cmp.result, Verdict::Pass);
    }

    #[test]
    fn test_comparison_without_type_label() {
        let cmp = parse_comparison("0,5  1,5  0,9  dB  FAIL", DecimalConvention::Comma).unwrap();
        assert_eq!(cmp.kind, None);
        assert_eq!(cmp.lower_limit, Some(0.5));
        assert_eq!(cmp.result, Verdict::Fail);
    }

    #[test]
    fn test_comparison_unparseable_limits_are_absent() {
        let cmp = parse_comparison("GT\t---\t1,5\t0,9\tdB\tPASS", DecimalConvention::Comma).unwrap();
        assert_eq!(cmp.lower_limit, None);
        assert_eq!(cmp.upper_limit, Some(1.5));
    }

    #[test]
    fn test_comparison_bad_measurement_names_field() {
        let err = parse_comparison("GELE 0,5 1,5 x dB PASS", DecimalConvention::Comma).unwrap_err();
        assert_eq!(err.field(), "comparison measurement");
    }

    #[test]
    fn test_block_with_ragged_matrix() {
        let lines = [
            "Signal test",
            "Output power:\t10\tPass/Fail:\tPASS",
            "GELE\t0,5\t1,5\t0,9\tdB\tPASS",
            "Frequencies:\t100\t200\t300",
            "1\t2\t3",
            "4\t5",
            "6\t7\t8\t9",
            "",
            "Averages:\t3\t4\t5",
            "Attenuations:\t-1\t-2\t-3",
        ];
        let blocks = parse_blocks(&lines, &opts()).unwrap();
        assert_eq!(blocks.len(), 1);
        let block = &blocks[0];
        assert_eq!(block.output_power, 10);
        assert_eq!(block.frequencies, vec![100, 200, 300]);
        assert_eq!(block.matrix, vec![vec![1, 2, 3], vec![4, 5], vec![6, 7, 8, 9]]);
        assert_eq!(block.averages, vec![3, 4, 5]);
        assert_eq!(block.attenuations, vec![-1, -2, -3]);
        assert!(block.comparison.is_some());
    }

    #[test]
    fn test_matrix_ends_at_next_label_without_blank_line() {
        let lines = [
            "Signal test",
            "Frequencies: 1 2",
            "10 20",
            "30 40",
            "Averages: 20 30",
            "99 99",
            "Output power: 5 Pass/Fail: FAIL",
        ];
        let blocks = parse_blocks(&lines, &opts()).unwrap();
        let block = &blocks[0];
        assert_eq!(block.matrix, vec![vec![10, 20], vec![30, 40]]);
        assert_eq!(block.averages, vec![20, 30]);
        assert_eq!(block.result, Verdict::Fail);
        assert!(block.attenuations.is_empty());
    }

    #[test]
    fn test_multiple_blocks_and_unknown_lines() {
        let lines = [
            "Signal test 1",
            "Output power: 10 Pass/Fail: PASS",
            "some operator remark",
            "Signal test 2",
            "Output power: 20 Pass/Fail: PASS",
        ];
        let blocks = parse_blocks(&lines, &opts()).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].output_power, 20);
        assert!(blocks[0].comparison.is_none());
    }

    #[test]
    fn test_block_without_output_power_fails() {
        let lines = ["Signal test", "Frequencies: 1 2 3"];
        let err = parse_blocks(&lines, &opts()).unwrap_err();
        assert_eq!(err, FormatError::MissingField("output power"));
    }

    #[test]
    fn test_no_blocks() {
        assert!(parse_blocks(&[], &opts()).unwrap().is_empty());
    }
}
