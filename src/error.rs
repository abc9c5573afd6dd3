// Chainwatch - Blockchain test-network monitoring
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for Chainwatch
//!
//! This module defines all error types used throughout the monitoring core.

use std::fmt;
use thiserror::Error;

/// Result type alias for monitoring operations
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Main error type for monitoring operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MonitorError {
    /// Append did not advance the series position
    #[error("Out of order append: position {attempted} is not after {last}")]
    OutOfOrder { last: String, attempted: String },

    /// A source is already registered under this metric name
    #[error("Metric already registered: {0}")]
    MetricAlreadyRegistered(String),

    /// No source is registered under this metric name
    #[error("Metric not supported: {0}")]
    MetricNotSupported(String),

    /// A source exists for the metric, but with other subject/value types
    #[error("Type mismatch for metric {metric}")]
    TypeMismatch { metric: String },

    /// Subject is already tracked by the source
    #[error("Subject already exists: {0}")]
    SubjectAlreadyExists(String),

    /// Requested data point does not exist
    #[error("Data point not found")]
    NotFound,

    /// Sensor read failed
    #[error("Sensor error: {0}")]
    Sensor(String),

    /// Fetching remote data (metrics endpoint, RPC) failed
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Parsing of a log line or metrics snapshot failed
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// The monitor (or dispatcher) has been shut down
    #[error("Monitor is shut down")]
    ShutDown,

    /// Several errors collected while shutting down
    #[error("Shutdown failed with {} error(s): {}", .0.len(), JoinedErrors(.0))]
    ShutdownFailed(Vec<MonitorError>),
}

impl MonitorError {
    /// Joins accumulated errors. An empty list is a success.
    pub fn join(errors: Vec<MonitorError>) -> Result<()> {
        let mut errors: Vec<MonitorError> = errors
            .into_iter()
            .flat_map(|err| match err {
                MonitorError::ShutdownFailed(inner) => inner,
                other => vec![other],
            })
            .collect();
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(MonitorError::ShutdownFailed(errors)),
        }
    }

    /// Number of individual errors carried by this error.
    pub fn count(&self) -> usize {
        match self {
            MonitorError::ShutdownFailed(inner) => inner.len(),
            _ => 1,
        }
    }
}

impl From<std::io::Error> for MonitorError {
    fn from(err: std::io::Error) -> Self {
        MonitorError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        MonitorError::Config(err.to_string())
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for MonitorError {
    fn from(err: reqwest::Error) -> Self {
        MonitorError::Fetch(err.to_string())
    }
}

/// Errors while parsing node logs and metric snapshots
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Field is not present on the line
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Field is present but not a number
    #[error("Invalid number for {field}: {value}")]
    InvalidNumber { field: &'static str, value: String },

    /// Timestamp has an unexpected format
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Duration has an unexpected format
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    /// Metric line does not belong to the open `# TYPE` section
    #[error("Unexpected line for metric '{expected}': {line}")]
    UnexpectedLine { expected: String, line: String },

    /// Several lines failed to parse
    #[error("{} line(s) failed to parse: {}", .0.len(), JoinedErrors(.0))]
    Multiple(Vec<ParseError>),
}

impl ParseError {
    /// Collapses accumulated line errors into one error, if any.
    pub fn collect(mut errors: Vec<ParseError>) -> Option<ParseError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(ParseError::Multiple(errors)),
        }
    }
}

struct JoinedErrors<'a, E>(&'a [E]);

impl<E: fmt::Display> fmt::Display for JoinedErrors<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}
