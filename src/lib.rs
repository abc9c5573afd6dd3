// Chainwatch - Blockchain test-network monitoring
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Chainwatch - Blockchain test-network monitoring
//!
//! Collects time- and block-indexed measurements from the nodes and load
//! applications of a test network while a scenario runs.
//!
//! ## Key Features
//!
//! - **Series Store**: append-only, position-ordered series per subject
//! - **Typed Metrics**: one source per metric name, looked up with its types
//! - **Periodic Sampling**: one supervised task per sensor, errors reported at shutdown
//! - **Log Dispatch**: blocks parsed from node logs, samples scraped from node metrics
//! - **Moving Averages**: incremental SMA over any numeric series
//!
//! ## Quick Start
//!
//! ```rust
//! use chainwatch::{BlockNumber, Series, SmaSeries, SyncedSeries};
//! use std::sync::Arc;
//!
//! let throughput = Arc::new(SyncedSeries::new());
//! for (block, tps) in [(1u64, 10.0f64), (2, 30.0), (3, 50.0)] {
//!     throughput.append(BlockNumber(block), tps).unwrap();
//! }
//!
//! let sma = SmaSeries::new(throughput, 2);
//! assert_eq!(sma.get_latest().unwrap().value, 40.0);
//! ```
//!
//! ## Modules
//!
//! - [`series`]: Series trait and the synchronized in-memory series
//! - [`metric`] and [`source`]: metric identity and data-producing sources
//! - [`monitor`]: registry of sources and owner of the log pipelines
//! - [`sampling`]: periodic sensor sampling
//! - [`logs`]: block events parsed from node logs
//! - [`prometheus`]: metrics scraped from node endpoints
//! - [`sma`]: simple moving average transform
//! - [`network`]: traits of the observed network

// Modules
pub mod config;
pub mod error;
pub mod logs;
pub mod metric;
pub mod monitor;
pub mod network;
pub mod prometheus;
pub mod sampling;
pub mod series;
pub mod sma;
pub mod source;
pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod testutil;

// Re-exports for convenient access
pub use config::{MonitorConfig, DEFAULT_PROMETHEUS_PATH};
pub use error::{MonitorError, ParseError, Result};
pub use logs::{Block, LogListener, NodeLogDispatcher, NodeLogProvider};
pub use metric::Metric;
pub use monitor::{Monitor, MonitorBuilder, SourceRegistry};
pub use prometheus::{
    PrometheusLogDispatcher, PrometheusLogKey, PrometheusLogProvider, PrometheusLogValue,
    PrometheusMetricType, TimeLogListener,
};
pub use sampling::{PeriodicDataSource, Sensor};
pub use series::{BlockSeries, DataPoint, Series, SyncedSeries, TimeSeries};
pub use sma::{Number, SmaSeries};
pub use source::{SeriesSource, Source};
pub use types::{Account, App, BlockNumber, Key, Network, Node, Subject, Time, Value};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_block_series_with_moving_average() {
        let series = std::sync::Arc::new(SyncedSeries::new());
        for (block, value) in [(1u64, 1.0f64), (2, 3.0), (3, 5.0)] {
            series.append(BlockNumber(block), value).unwrap();
        }
        let sma = SmaSeries::new(series.clone(), 2);
        let values: Vec<f64> = sma.get_all().into_iter().map(|p| p.value).collect();
        assert_eq!(values, vec![1.0, 2.0, 4.0]);
    }
}
