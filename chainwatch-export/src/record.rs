// Chainwatch Export - CSV export of monitored series
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Exportable subjects, positions and values.
//!
//! Each series type that can be exported maps onto a small closed set of
//! cells: a [`SubjectId`] for the subject, a [`Position`] for the key and a
//! [`CellValue`] for the value. The raw exporter turns these into a
//! [`Record`]; the section exporter renders them directly.

use crate::error::{ExportError, Result};
use crate::format::{format_clock, format_duration};
use chainwatch::{Account, App, BlockNumber, DataPoint, Key, Network, Node, Subject, Time, Value};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Exportable identity of a subject.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubjectId {
    Network,
    Node(String),
    App(String),
    Account { app: String, id: usize },
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectId::Network => write!(f, "{{}}"),
            SubjectId::Node(label) => write!(f, "{}", label),
            SubjectId::App(name) => write!(f, "{}", name),
            SubjectId::Account { app, id } => write!(f, "{}#{}", app, id),
        }
    }
}

/// Subjects that can appear in an export.
pub trait ExportSubject: Subject {
    fn subject_id(&self) -> SubjectId;
}

impl ExportSubject for Network {
    fn subject_id(&self) -> SubjectId {
        SubjectId::Network
    }
}

impl ExportSubject for Node {
    fn subject_id(&self) -> SubjectId {
        SubjectId::Node(self.label().to_string())
    }
}

impl ExportSubject for App {
    fn subject_id(&self) -> SubjectId {
        SubjectId::App(self.name().to_string())
    }
}

impl ExportSubject for Account {
    fn subject_id(&self) -> SubjectId {
        SubjectId::Account {
            app: self.app.name().to_string(),
            id: self.id,
        }
    }
}

/// Exportable series position.
///
/// Positions of one series share a variant, so the derived order is the
/// order of the underlying keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Position {
    Block(u64),
    Time(Time),
    Workers(i64),
}

impl Position {
    /// Key cell of a section.
    pub fn cell(&self) -> String {
        match self {
            Position::Block(block) => block.to_string(),
            Position::Time(time) => format_clock(*time),
            Position::Workers(workers) => workers.to_string(),
        }
    }
}

/// Series keys that can appear in an export.
pub trait ExportKey: Key {
    /// Name of the key column in a section subheader.
    const TYPE_NAME: &'static str;

    fn position(&self) -> Position;
}

impl ExportKey for BlockNumber {
    const TYPE_NAME: &'static str = "BlockNumber";

    fn position(&self) -> Position {
        Position::Block(self.0)
    }
}

impl ExportKey for Time {
    const TYPE_NAME: &'static str = "Time";

    fn position(&self) -> Position {
        Position::Time(*self)
    }
}

/// Number of workers of a load application.
impl ExportKey for i64 {
    const TYPE_NAME: &'static str = "int";

    fn position(&self) -> Position {
        Position::Workers(*self)
    }
}

/// Exportable series value.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Int(i64),
    UInt(u64),
    Float32(f32),
    Float(f64),
    Text(String),
    Time(Time),
    Duration(Duration),
}

impl CellValue {
    /// Cell in a section: timestamps as wall-clock time.
    pub fn section_cell(&self) -> String {
        match self {
            CellValue::Time(time) => format_clock(*time),
            other => other.raw_cell(),
        }
    }

    /// Cell in a raw export: timestamps as unix nanoseconds.
    pub fn raw_cell(&self) -> String {
        match self {
            CellValue::Int(v) => v.to_string(),
            CellValue::UInt(v) => v.to_string(),
            CellValue::Float32(v) => v.to_string(),
            CellValue::Float(v) => v.to_string(),
            CellValue::Text(v) => v.clone(),
            CellValue::Time(v) => v.as_nanos().to_string(),
            CellValue::Duration(v) => format_duration(*v),
        }
    }
}

/// Series values that can appear in an export.
pub trait ExportValue: Value {
    fn cell_value(&self) -> CellValue;
}

impl ExportValue for i64 {
    fn cell_value(&self) -> CellValue {
        CellValue::Int(*self)
    }
}

impl ExportValue for u64 {
    fn cell_value(&self) -> CellValue {
        CellValue::UInt(*self)
    }
}

impl ExportValue for usize {
    fn cell_value(&self) -> CellValue {
        CellValue::UInt(*self as u64)
    }
}

impl ExportValue for f32 {
    fn cell_value(&self) -> CellValue {
        CellValue::Float32(*self)
    }
}

impl ExportValue for f64 {
    fn cell_value(&self) -> CellValue {
        CellValue::Float(*self)
    }
}

impl ExportValue for String {
    fn cell_value(&self) -> CellValue {
        CellValue::Text(self.clone())
    }
}

impl ExportValue for Time {
    fn cell_value(&self) -> CellValue {
        CellValue::Time(*self)
    }
}

impl ExportValue for Duration {
    fn cell_value(&self) -> CellValue {
        CellValue::Duration(*self)
    }
}

/// One row of a raw export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Record {
    pub metric: String,
    pub network: String,
    pub node: Option<String>,
    pub app: Option<String>,
    pub time: Option<u64>,
    pub block: Option<u64>,
    pub workers: Option<i64>,
    pub value: String,
}

impl Record {
    /// Column names of a raw export, in field order.
    pub const HEADER: [&'static str; 8] = [
        "metric", "network", "node", "app", "time", "block", "workers", "value",
    ];

    /// Builds the row of one data point.
    ///
    /// Accounts store their id in the workers column, so an account series
    /// keyed by worker count cannot be exported.
    pub fn from_point<S, K, V>(metric: &str, subject: &S, point: &DataPoint<K, V>) -> Result<Self>
    where
        S: ExportSubject,
        K: ExportKey,
        V: ExportValue,
    {
        let mut record = Record {
            metric: metric.to_string(),
            network: "network".to_string(),
            value: point.value.cell_value().raw_cell(),
            ..Default::default()
        };

        match subject.subject_id() {
            SubjectId::Network => {}
            SubjectId::Node(label) => record.node = Some(label),
            SubjectId::App(name) => record.app = Some(name),
            SubjectId::Account { app, id } => {
                record.app = Some(app);
                record.workers = Some(id as i64);
            }
        }

        match point.position.position() {
            Position::Block(block) => record.block = Some(block),
            Position::Time(time) => record.time = Some(time.as_nanos()),
            Position::Workers(workers) => {
                if record.workers.is_some() {
                    return Err(ExportError::ConflictingWorkers {
                        metric: metric.to_string(),
                        subject: subject.to_string(),
                        workers,
                    });
                }
                record.workers = Some(workers);
            }
        }

        Ok(record)
    }
}
