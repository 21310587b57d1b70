//! Parsers for CLI output.
//!
//! `lemonldap-ng-cli info` prints `Key : Value` lines, `lemonldap-ng-cli get`
//! prints `key = value` lines, and the session and save/restore commands print
//! raw JSON. Whitespace runs around separators and trailing blank lines are
//! ignored. A line without a separator continues the previous value.

use crate::error::{Result, TransportError};
use serde_json::Value;
use std::collections::BTreeMap;

/// Parse colon-delimited `Key : Value` output.
#[must_use]
pub fn parse_info(output: &str) -> BTreeMap<String, String> {
    parse_pairs(output, ':')
}

/// Parse `key = value` output.
#[must_use]
pub fn parse_get(output: &str) -> BTreeMap<String, String> {
    parse_pairs(output, '=')
}

/// Parse raw JSON output.
///
/// # Errors
///
/// Returns a parse error if the output is empty or not valid JSON.
pub fn parse_json(what: &str, output: &str) -> Result<Value> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Err(TransportError::parse(what, "empty output"));
    }
    serde_json::from_str(trimmed).map_err(|e| TransportError::parse(what, e.to_string()))
}

fn parse_pairs(output: &str, separator: char) -> BTreeMap<String, String> {
    let mut pairs = BTreeMap::new();
    let mut last_key: Option<String> = None;

    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match trimmed.split_once(separator) {
            Some((key, value)) if !key.trim().is_empty() => {
                let key = collapse_whitespace(key);
                pairs.insert(key.clone(), value.trim().to_string());
                last_key = Some(key);
            }
            _ => {
                if let Some(value) = last_key.as_ref().and_then(|k| pairs.get_mut(k)) {
                    value.push('\n');
                    value.push_str(trimmed);
                }
            }
        }
    }
    pairs
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
