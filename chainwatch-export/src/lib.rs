// Chainwatch Export - CSV export of monitored series
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Chainwatch Export
//!
//! Writes the series collected by a Chainwatch monitor to CSV.
//!
//! ## Formats
//!
//! - **Sections** ([`CsvSectionsExporter`]): human-readable blocks of columns
//!   sharing one key column (block number or time). Later sources are
//!   aligned to the key column of the section.
//! - **Raw** ([`RawCsvExporter`]): one row per data point with the fixed
//!   header `metric,network,node,app,time,block,workers,value`, suited for
//!   loading into a dataframe.
//!
//! ## Quick Start
//!
//! ```rust
//! use chainwatch::{BlockNumber, BlockSeries, Metric, Node, SeriesSource};
//! use chainwatch_export::CsvSectionsExporter;
//!
//! const TXS: Metric<Node, BlockSeries<u64>> = Metric::new("Txs", "transactions per block");
//!
//! let source = SeriesSource::new(TXS);
//! let series = source.new_subject(Node::new("A")).unwrap();
//! series.append(BlockNumber(1), 17).unwrap();
//!
//! let mut out = Vec::new();
//! let mut csv = CsvSectionsExporter::new(&mut out);
//! csv.add_section::<BlockNumber>();
//! csv.add_source(&source).unwrap();
//! csv.close().unwrap();
//!
//! assert_eq!(String::from_utf8(out).unwrap(), ", Txs,\nBlockNumber, A,\n1, 17,\n");
//! ```

// Modules
pub mod error;
pub mod format;
pub mod raw;
pub mod record;
pub mod sections;

// Re-exports for convenient access
pub use error::{ExportError, Result};
pub use format::{format_clock, format_duration};
pub use raw::RawCsvExporter;
pub use record::{
    CellValue, ExportKey, ExportSubject, ExportValue, Position, Record, SubjectId,
};
pub use sections::CsvSectionsExporter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
