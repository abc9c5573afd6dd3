// Chainwatch - Blockchain test-network monitoring
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Monitor configuration.

use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default path of the node metrics endpoint.
pub const DEFAULT_PROMETHEUS_PATH: &str = "/debug/metrics/prometheus";

/// Monitor-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Period of sensor polling in milliseconds (default: 1000)
    pub sampling_period_ms: u64,

    /// Period of metrics scraping in milliseconds (default: 1000)
    pub prometheus_period_ms: u64,

    /// Path of the metrics endpoint appended to the node URL
    pub prometheus_path: String,

    /// Pending scrape requests buffered per node
    pub node_channel_capacity: usize,

    /// Copy raw node logs to `<dir>/node_logs/<label>.log` (optional)
    pub node_log_dir: Option<PathBuf>,

    /// Window sizes of the moving-average throughput metrics
    pub sma_periods: Vec<usize>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sampling_period_ms: 1_000,
            prometheus_period_ms: 1_000,
            prometheus_path: DEFAULT_PROMETHEUS_PATH.to_string(),
            node_channel_capacity: 100,
            node_log_dir: None,
            sma_periods: vec![10, 100, 1000],
        }
    }
}

impl MonitorConfig {
    /// Create a configuration with a custom sampling period
    pub fn with_sampling_period(period: Duration) -> Self {
        Self {
            sampling_period_ms: period.as_millis() as u64,
            ..Default::default()
        }
    }

    /// Create a configuration with a custom scrape period
    pub fn with_prometheus_period(period: Duration) -> Self {
        Self {
            prometheus_period_ms: period.as_millis() as u64,
            ..Default::default()
        }
    }

    /// Create a configuration capturing node logs under `dir`
    pub fn with_node_log_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            node_log_dir: Some(dir.into()),
            ..Default::default()
        }
    }

    /// Load a configuration from a JSON file. Missing fields use defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn sampling_period(&self) -> Duration {
        Duration::from_millis(self.sampling_period_ms)
    }

    pub fn prometheus_period(&self) -> Duration {
        Duration::from_millis(self.prometheus_period_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sampling_period_ms == 0 {
            return Err(MonitorError::Config("sampling period must be positive".into()));
        }
        if self.prometheus_period_ms == 0 {
            return Err(MonitorError::Config("prometheus period must be positive".into()));
        }
        if self.node_channel_capacity == 0 {
            return Err(MonitorError::Config("node channel capacity must be positive".into()));
        }
        if self.sma_periods.contains(&0) {
            return Err(MonitorError::Config("moving average period must be positive".into()));
        }
        Ok(())
    }
}
