// Chainwatch - Blockchain test-network monitoring
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Parsing of "New block" node log lines.
//!
//! Example line:
//!
//! ```text
//! INFO [05-04|09:34:15.537] New block index=3 id=3:1:3d6fb6 gas_used=117,867 base_fee=123 txs=1/0 gas_rate=2.31 age=343.255ms t=1.579ms
//! ```

use super::Block;
use crate::error::ParseError;
use crate::types::{BlockNumber, Time};
use chrono::{Datelike, NaiveDateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;

/// Marker of lines describing a produced block.
pub const BLOCK_LINE_MARKER: &str = "New block";

lazy_static! {
    static ref TIMESTAMP: Regex = Regex::new(r"\[\S*\]").expect("timestamp regex");
    static ref BLOCK: Regex = Regex::new(r"index=\d*").expect("block regex");
    static ref GAS_USED: Regex = Regex::new(r"gas_used=\S*").expect("gas regex");
    static ref GAS_RATE: Regex = Regex::new(r"gas_rate=\d+(\.\d*)?").expect("gas rate regex");
    static ref BASE_FEE: Regex = Regex::new(r"base_fee=\d+").expect("base fee regex");
    static ref TXS: Regex = Regex::new(r"txs=\d+").expect("txs regex");
    static ref PROCESSING_TIME: Regex = Regex::new(r"t=\S*").expect("processing time regex");
}

/// Whether the line reports a new block.
pub fn is_block_line(line: &str) -> bool {
    line.contains(BLOCK_LINE_MARKER)
}

/// Parses one block line.
pub fn parse_block(line: &str) -> Result<Block, ParseError> {
    let timestamp = TIMESTAMP
        .find(line)
        .ok_or(ParseError::MissingField("timestamp"))?;
    let height = field(&BLOCK, line, "index")?;
    let gas_used = field(&GAS_USED, line, "gas_used")?.replace(',', "");
    let txs = field(&TXS, line, "txs")?;
    let processing_time = field(&PROCESSING_TIME, line, "t")?;

    let gas_rate = match GAS_RATE.find(line) {
        Some(m) => Some(parse_number::<f64>(value_of(m.as_str()), "gas_rate")?),
        None => None,
    };
    let gas_base_fee = match BASE_FEE.find(line) {
        Some(m) => Some(parse_number::<u64>(value_of(m.as_str()), "base_fee")?),
        None => None,
    };

    Ok(Block {
        height: BlockNumber(parse_number(height, "index")?),
        time: parse_time(timestamp.as_str())?,
        txs: parse_number(txs, "txs")?,
        gas_used: parse_number(&gas_used, "gas_used")?,
        processing_time: parse_duration(processing_time.trim_matches('"'))?,
        gas_base_fee,
        gas_rate,
    })
}

/// Parses a `[MM-DD|HH:MM:SS.mmm]` log timestamp. The year is the current
/// UTC year.
pub fn parse_time(text: &str) -> Result<Time, ParseError> {
    let year = Utc::now().year();
    let full = format!("{}-{}", year, text);
    let naive = NaiveDateTime::parse_from_str(&full, "%Y-[%m-%d|%H:%M:%S%.f]")
        .map_err(|_| ParseError::InvalidTimestamp(text.to_string()))?;
    Ok(Time::from_datetime(Utc.from_utc_datetime(&naive)))
}

/// Parses a duration such as `1.579ms`, `711.334µs`, `2s` or `1m30s`.
pub fn parse_duration(text: &str) -> Result<Duration, ParseError> {
    let invalid = || ParseError::InvalidDuration(text.to_string());
    if text == "0" {
        return Ok(Duration::ZERO);
    }
    if text.is_empty() {
        return Err(invalid());
    }

    let mut rest = text;
    let mut nanos = 0f64;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if number_len == 0 {
            return Err(invalid());
        }
        let number: f64 = rest[..number_len].parse().map_err(|_| invalid())?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];
        nanos += number * scale;
    }

    Ok(Duration::from_nanos(nanos.round() as u64))
}

fn field<'a>(regex: &Regex, line: &'a str, name: &'static str) -> Result<&'a str, ParseError> {
    regex
        .find(line)
        .map(|m| value_of(m.as_str()))
        .ok_or(ParseError::MissingField(name))
}

fn value_of(pair: &str) -> &str {
    pair.split_once('=').map(|(_, v)| v).unwrap_or("")
}

fn parse_number<T: std::str::FromStr>(value: &str, field: &'static str) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}
