//! Line-level helpers: label matching, labelled-field extraction and the
//! locale-aware number parsing used by every section parser.

use super::DecimalConvention;

/// Lowercase the line and collapse every run of tabs/spaces to one space.
pub(crate) fn normalize(line: &str) -> String {
    line.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Case-insensitive prefix match on the normalized line.
pub(crate) fn has_label(line: &str, prefixes: &[&str]) -> bool {
    let norm = normalize(line);
    prefixes.iter().any(|p| norm.starts_with(p))
}

/// Text after the first colon, trimmed. Empty when the line has no colon.
pub(crate) fn value_after_colon(line: &str) -> &str {
    line.split_once(':').map(|(_, v)| v.trim()).unwrap_or("")
}

/// Whitespace-separated tokens after the first colon.
pub(crate) fn tokens_after_colon(line: &str) -> Vec<&str> {
    value_after_colon(line).split_whitespace().collect()
}

/// `label: value` pairs found on a single line.
///
/// A label is one or more words ending in a colon; its value is the next
/// token. Words between a value and the next colon-terminated word become
/// part of that next label, so `Output power: 10 dBm Pass/Fail: PASS`
/// yields `output power = 10` and `dbm pass/fail = PASS`.
#[derive(Debug, Default)]
pub(crate) struct LabeledFields<'a> {
    entries: Vec<(String, &'a str)>,
}

impl<'a> LabeledFields<'a> {
    pub(crate) fn parse(line: &'a str) -> Self {
        let mut entries = Vec::new();
        let mut pending: Vec<&str> = Vec::new();
        let mut label: Option<String> = None;

        for token in line.split_whitespace() {
            if let Some(word) = token.strip_suffix(':') {
                pending.push(word);
                label = Some(pending.join(" ").to_lowercase());
                pending.clear();
            } else if let Some(done) = label.take() {
                entries.push((done, token));
            } else {
                pending.push(token);
            }
        }

        Self { entries }
    }

    /// First value whose label contains any of `needles`.
    pub(crate) fn get(&self, needles: &[&str]) -> Option<&'a str> {
        self.entries
            .iter()
            .find(|(label, _)| needles.iter().any(|n| label.contains(n)))
            .map(|(_, value)| *value)
    }
}

/// Parse a measurement value under the configured decimal convention.
///
/// With [`DecimalConvention::Comma`] a plain point-decimal is still
/// accepted as long as the token carries no comma.
pub(crate) fn parse_decimal(token: &str, convention: DecimalConvention) -> Option<f64> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    let normalized = match convention {
        DecimalConvention::Comma => {
            let commas = token.matches(',').count();
            let points = token.matches('.').count();
            if commas + points > 1 {
                return None;
            }
            token.replace(',', ".")
        }
        DecimalConvention::Point => {
            if token.contains(',') {
                return None;
            }
            token.to_owned()
        }
    };

    // Keep "inf"/"nan" and friends out; only digits, sign and the separator.
    if !normalized
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'))
    {
        return None;
    }

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Plain digit integer, optional sign.
pub(crate) fn parse_int(token: &str) -> Option<i64> {
    token.trim().parse::<i64>().ok()
}

/// Parse every token as an integer; returns the first offending token.
pub(crate) fn parse_int_list<'a>(tokens: &[&'a str]) -> Result<Vec<i64>, &'a str> {
    tokens
        .iter()
        .map(|t| parse_int(t).ok_or(*t))
        .collect()
}

/// True when the line is non-empty and every token is an integer.
pub(crate) fn is_int_row(line: &str) -> bool {
    let mut tokens = line.split_whitespace().peekable();
    tokens.peek().is_some() && tokens.all(|t| parse_int(t).is_some())
}
