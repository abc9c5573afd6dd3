// Chainwatch Export - CSV export of monitored series
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Sectioned CSV export.
//!
//! A section is a block of columns sharing one key column:
//!
//! ```text
//! , BlockCompletionTime, , BlockNumberOfTransactions,
//! BlockNumber, A, B, {},
//! 1, 09:34:15.08, 09:34:16.512, 17,
//! 2, 09:34:15.537, 09:34:17.003, 21,
//! ```
//!
//! The first source of a section picks the key column from its longest
//! series. Every later series is aligned to the current key column
//! moving forward only: a point fills the row of the first unfilled key
//! not smaller than its own position, rows without a point stay blank.
//! A series sharing no key with the column is written next to its own key
//! column, which then serves the series that follow.
//!
//! Cells are separated by `", "` and every line ends with `","`.

use crate::error::{ExportError, Result};
use crate::record::{ExportKey, ExportSubject, ExportValue, Position};
use chainwatch::{Metric, Monitor, Series, Source};
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, warn};

struct Column {
    header: String,
    subheader: String,
    cells: Vec<String>,
}

impl Column {
    fn key(key_type: &str, positions: &[Position]) -> Self {
        Self {
            header: String::new(),
            subheader: key_type.to_string(),
            cells: positions.iter().map(Position::cell).collect(),
        }
    }
}

struct Section {
    key_type: &'static str,
    index: Option<Vec<Position>>,
    columns: Vec<Column>,
}

impl Section {
    fn new(key_type: &'static str) -> Self {
        Self {
            key_type,
            index: None,
            columns: Vec::new(),
        }
    }

    fn render(&self, lines: &mut Vec<String>) {
        if self.columns.is_empty() {
            return;
        }
        lines.push(line(self.columns.iter().map(|c| c.header.as_str())));
        lines.push(line(self.columns.iter().map(|c| c.subheader.as_str())));

        let height = self.columns.iter().map(|c| c.cells.len()).max().unwrap_or(0);
        for row in 0..height {
            lines.push(line(
                self.columns
                    .iter()
                    .map(|c| c.cells.get(row).map(String::as_str).unwrap_or("")),
            ));
        }
    }
}

fn line<'a>(cells: impl Iterator<Item = &'a str>) -> String {
    let mut out = cells.collect::<Vec<_>>().join(", ");
    out.push(',');
    out
}

/// Aligns points to the key column, moving forward only.
///
/// Returns one cell per key and the number of points placed.
fn align(index: &[Position], points: &[(Position, String)]) -> (Vec<String>, usize) {
    let mut cells = Vec::with_capacity(index.len());
    let mut next = 0;
    for key in index {
        match points.get(next) {
            Some((position, value)) if position <= key => {
                cells.push(value.clone());
                next += 1;
            }
            _ => cells.push(String::new()),
        }
    }
    (cells, next)
}

/// Writes sources as aligned CSV sections.
///
/// Output is buffered per section and written on [`flush`](Self::flush)
/// or [`close`](Self::close).
pub struct CsvSectionsExporter<W: Write> {
    writer: W,
    lines: Vec<String>,
    section: Option<Section>,
}

impl<W: Write> CsvSectionsExporter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            lines: Vec::new(),
            section: None,
        }
    }

    /// Ends the open section and writes `lines` separator lines.
    pub fn add_empty_section(&mut self, lines: usize) {
        self.finish_section();
        self.lines.extend(std::iter::repeat(",".to_string()).take(lines));
    }

    /// Ends the open section and starts one keyed by `K`.
    pub fn add_section<K: ExportKey>(&mut self) {
        self.finish_section();
        self.section = Some(Section::new(K::TYPE_NAME));
    }

    /// Adds one column per subject of `source` to the open section.
    ///
    /// A section keyed by `K` is started if none is open. Subjects are
    /// exported in order; a listed subject without a series is skipped
    /// and reported once the rest of the source is written.
    pub fn add_source<S, K, V, Src>(&mut self, source: &Src) -> Result<()>
    where
        S: ExportSubject,
        K: ExportKey,
        V: ExportValue,
        Src: Source<S, Arc<dyn Series<K, V>>> + ?Sized,
    {
        let metric = source.metric();
        let section = self
            .section
            .get_or_insert_with(|| Section::new(K::TYPE_NAME));
        if section.key_type != K::TYPE_NAME {
            return Err(ExportError::KeyTypeMismatch {
                metric: metric.name().to_string(),
                key: K::TYPE_NAME,
                section: section.key_type,
            });
        }

        let mut subjects = source.subjects();
        subjects.sort();

        let mut missing = Vec::new();
        let mut series = Vec::with_capacity(subjects.len());
        for subject in subjects {
            match source.data(&subject) {
                Some(data) => {
                    let points: Vec<(Position, String)> = data
                        .get_all()
                        .into_iter()
                        .map(|p| (p.position.position(), p.value.cell_value().section_cell()))
                        .collect();
                    series.push((subject.subject_id().to_string(), points));
                }
                None => {
                    warn!(metric = %metric.name(), subject = %subject, "Subject without data");
                    missing.push(ExportError::MissingSeries {
                        metric: metric.name().to_string(),
                        subject: subject.to_string(),
                    });
                }
            }
        }

        if section.index.is_none() {
            let mut longest: Option<&Vec<(Position, String)>> = None;
            for (_, points) in &series {
                if longest.map_or(true, |l| points.len() > l.len()) {
                    longest = Some(points);
                }
            }
            let index: Vec<Position> = longest
                .map(|points| points.iter().map(|(p, _)| *p).collect())
                .unwrap_or_default();
            section.columns.push(Column::key(section.key_type, &index));
            section.index = Some(index);
        }

        for (i, (subject, points)) in series.into_iter().enumerate() {
            let header = if i == 0 {
                metric.name().to_string()
            } else {
                String::new()
            };
            let index = section.index.get_or_insert_with(Vec::new);
            let (cells, placed) = align(index, &points);

            if placed == 0 && !points.is_empty() {
                let positions: Vec<Position> = points.iter().map(|(p, _)| *p).collect();
                debug!(metric = %metric.name(), subject = %subject, "Series re-anchored");
                section.columns.push(Column::key(section.key_type, &positions));
                section.columns.push(Column {
                    header,
                    subheader: subject,
                    cells: points.into_iter().map(|(_, v)| v).collect(),
                });
                section.index = Some(positions);
            } else {
                section.columns.push(Column {
                    header,
                    subheader: subject,
                    cells,
                });
            }
        }

        ExportError::join(missing)
    }

    /// Exports the source a monitor holds for `metric`.
    pub fn add_metric<S, K, V>(
        &mut self,
        monitor: &Monitor,
        metric: &Metric<S, Arc<dyn Series<K, V>>>,
    ) -> Result<()>
    where
        S: ExportSubject,
        K: ExportKey,
        V: ExportValue,
    {
        let source = monitor.get_source(metric)?;
        self.add_source(&*source)
    }

    /// Writes every finished line, ending the open section.
    pub fn flush(&mut self) -> Result<()> {
        self.finish_section();
        for line in self.lines.drain(..) {
            self.writer.write_all(line.as_bytes())?;
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes and returns the underlying writer.
    pub fn close(mut self) -> Result<W> {
        self.flush()?;
        Ok(self.writer)
    }

    fn finish_section(&mut self) {
        if let Some(section) = self.section.take() {
            section.render(&mut self.lines);
        }
    }
}
