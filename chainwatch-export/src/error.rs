// Chainwatch Export - CSV export of monitored series
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for CSV export

use thiserror::Error;

/// Errors raised while exporting series
#[derive(Error, Debug)]
pub enum ExportError {
    /// Writing to the output failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The CSV writer rejected a record
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The monitor could not provide a source
    #[error("Monitor error: {0}")]
    Monitor(#[from] chainwatch::MonitorError),

    /// An account subject already names the workers column
    #[error("Metric {metric}: account {subject} conflicts with worker position {workers}")]
    ConflictingWorkers {
        metric: String,
        subject: String,
        workers: i64,
    },

    /// The source is keyed differently than the open section
    #[error("Metric {metric} is keyed by {key}, section is keyed by {section}")]
    KeyTypeMismatch {
        metric: String,
        key: &'static str,
        section: &'static str,
    },

    /// A listed subject has no series
    #[error("Metric {metric} lists subject {subject} without data")]
    MissingSeries { metric: String, subject: String },

    /// Several sources failed during one export
    #[error("{} export errors: {}", .0.len(), display_all(.0))]
    Multiple(Vec<ExportError>),
}

fn display_all(errors: &[ExportError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ExportError {
    /// Folds collected errors into one result.
    pub fn join(mut errors: Vec<ExportError>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ExportError::Multiple(errors)),
        }
    }
}

/// Result type for export operations
pub type Result<T> = std::result::Result<T, ExportError>;
