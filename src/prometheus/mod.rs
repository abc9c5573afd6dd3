// Chainwatch - Blockchain test-network monitoring
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Prometheus metrics scraped from nodes.
//!
//! Every period each node's metrics endpoint is fetched and parsed. Every
//! sample is stamped with the fetch time and the node, and handed to the
//! listeners registered for its exact `(name, quantile)` key.
//!
//! ## Architecture
//!
//! ```text
//!             tick          ┌────────────────────┐
//! ┌────────┐ ─────────────▶ │ node A: fetch,     │──┐
//! │ ticker │    channel     │ parse, distribute  │  │  ┌───────────────┐
//! └────────┘ ─────────────▶ ├────────────────────┤  ├─▶│ listeners per │
//!                           │ node B: ...        │──┘  │ (name, q) key │
//!                           └────────────────────┘     └───────────────┘
//! ```
//!
//! One task per node keeps the samples of that node in fetch order.

mod dispatcher;
mod fetcher;
mod parser;

pub use dispatcher::PrometheusLogDispatcher;
#[cfg(feature = "http")]
pub use fetcher::HttpFetcher;
pub use fetcher::{FnFetcher, PrometheusFetcher};
pub use parser::{parse_prometheus_log, parse_prometheus_text};

use crate::types::{Node, Time};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Common summary quantiles.
pub mod quantile {
    /// Quantile of counters and gauges.
    pub const NONE: &str = "";
    pub const Q05: &str = "0.5";
    pub const Q075: &str = "0.75";
    pub const Q095: &str = "0.95";
    pub const Q099: &str = "0.99";
    pub const Q0999: &str = "0.999";
    pub const Q09999: &str = "0.9999";
}

/// Identity of a scraped value: metric name plus quantile for summaries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrometheusLogKey {
    pub name: String,
    pub quantile: String,
}

impl PrometheusLogKey {
    /// Key of a counter or gauge.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quantile: quantile::NONE.to_string(),
        }
    }

    /// Key of one quantile of a summary.
    pub fn with_quantile(name: impl Into<String>, quantile: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quantile: quantile.into(),
        }
    }

    pub fn has_quantile(&self) -> bool {
        !self.quantile.is_empty()
    }
}

impl fmt::Display for PrometheusLogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_quantile() {
            write!(f, "{}_q{}", self.name, self.quantile)
        } else {
            f.write_str(&self.name)
        }
    }
}

/// Kind of a scraped metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrometheusMetricType {
    Counter,
    Gauge,
    Summary,
    Untyped,
}

impl FromStr for PrometheusMetricType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "counter" => PrometheusMetricType::Counter,
            "gauge" => PrometheusMetricType::Gauge,
            "summary" => PrometheusMetricType::Summary,
            _ => PrometheusMetricType::Untyped,
        })
    }
}

impl fmt::Display for PrometheusMetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrometheusMetricType::Counter => "counter",
            PrometheusMetricType::Gauge => "gauge",
            PrometheusMetricType::Summary => "summary",
            PrometheusMetricType::Untyped => "untyped",
        };
        f.write_str(name)
    }
}

/// One parsed sample.
#[derive(Debug, Clone, PartialEq)]
pub struct PrometheusLogValue {
    pub key: PrometheusLogKey,
    pub metric_type: PrometheusMetricType,
    pub value: f64,
}

impl PrometheusLogValue {
    pub fn new(key: PrometheusLogKey, metric_type: PrometheusMetricType, value: f64) -> Self {
        Self {
            key,
            metric_type,
            value,
        }
    }
}

/// Receives samples of the keys it registered for.
pub trait TimeLogListener: Send + Sync {
    fn on_log(&self, node: &Node, time: Time, value: f64);
}

/// Registry of sample listeners.
pub trait PrometheusLogProvider: Send + Sync {
    fn register_log_listener(&self, key: PrometheusLogKey, listener: Arc<dyn TimeLogListener>);

    fn unregister_log_listener(&self, key: &PrometheusLogKey, listener: &Arc<dyn TimeLogListener>);
}
