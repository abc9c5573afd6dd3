// Chainwatch - Blockchain test-network monitoring
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Parser of the Prometheus text exposition format, as emitted by nodes.
//!
//! ```text
//! # TYPE chain_execution summary
//! chain_execution {quantile="0.5"} 7.8168292e+07
//! # TYPE chain_block_age gauge
//! chain_block_age 815212292
//! ```
//!
//! A `# TYPE` line opens a metric. Value lines that follow must carry the
//! name of the open metric. Lines that do not are reported, and the scan
//! goes on with the next line.

use super::{PrometheusLogKey, PrometheusLogValue, PrometheusMetricType};
use crate::error::{MonitorError, ParseError};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref QUANTILE: Regex = Regex::new(r#"^\{quantile="([^"]*)"\}$"#).expect("quantile regex");
}

const CHAIN_INFO: &str = "chain_info";

/// Parses a metrics snapshot, returning every good sample together with the
/// accumulated errors of the lines that could not be parsed.
pub fn parse_prometheus_text(text: &str) -> (Vec<PrometheusLogValue>, Option<ParseError>) {
    let mut values = Vec::new();
    let mut errors = Vec::new();
    let mut current_name = String::new();
    let mut current_type = PrometheusMetricType::Untyped;

    for line in text.lines() {
        let tokens: Vec<&str> = line.split(' ').collect();
        if tokens.len() < 2 {
            continue;
        }

        if tokens[0] == "#" {
            if tokens[1] == "TYPE" {
                match (tokens.get(2), tokens.get(3)) {
                    (Some(name), Some(kind)) => {
                        current_name = name.to_string();
                        current_type = kind.parse().unwrap_or(PrometheusMetricType::Untyped);
                    }
                    _ => errors.push(unexpected(&current_name, line)),
                }
            }
            continue;
        }

        let (name, labels) = split_name(tokens[0]);
        if name == CHAIN_INFO {
            continue;
        }
        if name != current_name {
            errors.push(unexpected(&current_name, line));
            continue;
        }

        match parse_value(name, labels, &tokens[1..], current_type) {
            Ok(value) => values.push(value),
            Err(err) => errors.push(err),
        }
    }

    (values, ParseError::collect(errors))
}

/// Parses a metrics snapshot, failing if any line is malformed.
pub fn parse_prometheus_log(text: &str) -> Result<Vec<PrometheusLogValue>, MonitorError> {
    match parse_prometheus_text(text) {
        (values, None) => Ok(values),
        (_, Some(err)) => Err(err.into()),
    }
}

/// Splits `name{labels}` written without a separating space.
fn split_name(token: &str) -> (&str, Option<&str>) {
    match token.find('{') {
        Some(i) => (&token[..i], Some(&token[i..])),
        None => (token, None),
    }
}

fn parse_value(
    name: &str,
    labels: Option<&str>,
    rest: &[&str],
    metric_type: PrometheusMetricType,
) -> Result<PrometheusLogValue, ParseError> {
    let (labels, value) = match (labels, rest) {
        (Some(labels), [value, ..]) => (Some(labels), *value),
        (None, [labels, value, ..]) if QUANTILE.is_match(labels) => (Some(*labels), *value),
        (None, [value, ..]) => (None, *value),
        _ => return Err(ParseError::MissingField("value")),
    };

    let quantile = match labels {
        Some(labels) => QUANTILE
            .captures(labels)
            .and_then(|c| c.get(1))
            .map(|q| q.as_str().to_string())
            .ok_or_else(|| ParseError::UnexpectedLine {
                expected: name.to_string(),
                line: labels.to_string(),
            })?,
        None => String::new(),
    };

    let value: f64 = value.parse().map_err(|_| ParseError::InvalidNumber {
        field: "value",
        value: value.to_string(),
    })?;

    Ok(PrometheusLogValue::new(
        PrometheusLogKey::with_quantile(name, quantile),
        metric_type,
        value,
    ))
}

fn unexpected(expected: &str, line: &str) -> ParseError {
    ParseError::UnexpectedLine {
        expected: expected.to_string(),
        line: line.to_string(),
    }
}
