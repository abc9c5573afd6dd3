// Chainwatch Export - CSV export of monitored series
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Raw long-format CSV export.

use crate::error::{ExportError, Result};
use crate::record::{ExportKey, ExportSubject, ExportValue, Record};
use chainwatch::{Metric, Monitor, Series, Source};
use std::io::Write;
use std::sync::Arc;
use tracing::debug;

/// Writes one row per data point of every exported source.
///
/// ```text
/// metric,network,node,app,time,block,workers,value
/// BlockCompletionTime,network,A,,,1,,1683192855080000000
/// ```
pub struct RawCsvExporter<W: Write> {
    writer: csv::Writer<W>,
    rows: usize,
}

impl<W: Write> RawCsvExporter<W> {
    pub fn new(writer: W) -> Self {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        Self { writer, rows: 0 }
    }

    /// Writes the column names. Call once, before the first source.
    pub fn write_header(&mut self) -> Result<()> {
        self.writer.write_record(Record::HEADER)?;
        Ok(())
    }

    /// Appends every point of every subject of `source`, subjects in order.
    ///
    /// Returns the number of rows written.
    pub fn add_source<S, K, V, Src>(&mut self, source: &Src) -> Result<usize>
    where
        S: ExportSubject,
        K: ExportKey,
        V: ExportValue,
        Src: Source<S, Arc<dyn Series<K, V>>> + ?Sized,
    {
        let metric = source.metric();
        let mut subjects = source.subjects();
        subjects.sort();

        let mut written = 0;
        for subject in subjects {
            let series = source
                .data(&subject)
                .ok_or_else(|| ExportError::MissingSeries {
                    metric: metric.name().to_string(),
                    subject: subject.to_string(),
                })?;
            for point in series.get_all() {
                let record = Record::from_point(metric.name(), &subject, &point)?;
                self.writer.serialize(record)?;
                written += 1;
            }
        }

        debug!(metric = %metric.name(), rows = written, "Exported raw rows");
        self.rows += written;
        Ok(written)
    }

    /// Exports the source a monitor holds for `metric`.
    pub fn add_metric<S, K, V>(
        &mut self,
        monitor: &Monitor,
        metric: &Metric<S, Arc<dyn Series<K, V>>>,
    ) -> Result<usize>
    where
        S: ExportSubject,
        K: ExportKey,
        V: ExportValue,
    {
        let source = monitor.get_source(metric)?;
        self.add_source(&*source)
    }

    /// Rows written so far, header excluded.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes and returns the underlying writer.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| ExportError::Io(e.into_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainwatch::{Account, App, BlockNumber, BlockSeries, Node, SeriesSource, Time, TimeSeries};

    const TXS: Metric<Node, BlockSeries<u64>> = Metric::new("Txs", "transactions per block");
    const SENT: Metric<Account, TimeSeries<u64>> = Metric::new("Sent", "sent transactions");
    const BY_WORKERS: Metric<Account, Arc<dyn Series<i64, u64>>> =
        Metric::new("ByWorkers", "sent transactions per worker count");

    fn output<W: Write>(exporter: RawCsvExporter<W>) -> W {
        exporter.into_inner().unwrap()
    }

    #[test]
    fn test_header_only() {
        let mut exporter = RawCsvExporter::new(Vec::new());
        exporter.write_header().unwrap();
        let out = String::from_utf8(output(exporter)).unwrap();
        assert_eq!(out, "metric,network,node,app,time,block,workers,value\n");
    }

    #[test]
    fn test_subjects_are_sorted() {
        let source = SeriesSource::new(TXS);
        source
            .new_subject(Node::new("B"))
            .unwrap()
            .append(BlockNumber(1), 2)
            .unwrap();
        source
            .new_subject(Node::new("A"))
            .unwrap()
            .append(BlockNumber(1), 1)
            .unwrap();

        let mut exporter = RawCsvExporter::new(Vec::new());
        assert_eq!(exporter.add_source(&source).unwrap(), 2);
        assert_eq!(exporter.rows(), 2);
        let out = String::from_utf8(output(exporter)).unwrap();
        assert_eq!(out, "Txs,network,A,,,1,,1\nTxs,network,B,,,1,,2\n");
    }

    #[test]
    fn test_account_rows() {
        let source = SeriesSource::new(SENT);
        let series = source
            .new_subject(Account::new(App::new("app-1"), 3))
            .unwrap();
        series.append(Time::from_nanos(1000), 5).unwrap();

        let mut exporter = RawCsvExporter::new(Vec::new());
        exporter.add_source(&source).unwrap();
        let out = String::from_utf8(output(exporter)).unwrap();
        assert_eq!(out, "Sent,network,,app-1,1000,,3,5\n");
    }

    #[test]
    fn test_account_keyed_by_workers_is_rejected() {
        let source = SeriesSource::new(BY_WORKERS);
        let series = source
            .new_subject(Account::new(App::new("app-1"), 3))
            .unwrap();
        series.append(10, 5).unwrap();

        let mut exporter = RawCsvExporter::new(Vec::new());
        let result = exporter.add_source(&source);
        assert!(matches!(result, Err(ExportError::ConflictingWorkers { .. })));
    }
}
