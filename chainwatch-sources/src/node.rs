// Chainwatch Sources - Node, network, application and account metrics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Per-node metrics.
//!
//! Block metrics are recorded from the blocks every node reports in its
//! log. Prometheus metrics are recorded from the scraped node endpoints.

use async_trait::async_trait;
use chainwatch::{
    Block, BlockNumber, BlockSeries, LogListener, Metric, Monitor, NodeLogProvider, Node,
    PrometheusLogKey, PrometheusLogProvider, Result, Series, SeriesSource, SmaSeries, Source,
    Time, TimeLogListener, TimeSeries, Value,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::warn;

pub const BLOCK_COMPLETION_TIME: Metric<Node, BlockSeries<Time>> =
    Metric::new("BlockCompletionTime", "Time the block was completed");

pub const BLOCK_EVENT_AND_TXS_PROCESSING_TIME: Metric<Node, BlockSeries<Duration>> = Metric::new(
    "BlockEventAndTxsProcessingTime",
    "Time to process a block: apply its events and transactions, and commit the state",
);

pub const TRANSACTIONS_THROUGHPUT: Metric<Node, BlockSeries<f32>> = Metric::new(
    "TransactionsThroughput",
    "Transactions per second processed by each node, per block",
);

pub const TRANSACTIONS_THROUGHPUT_SMA_10: Metric<Node, BlockSeries<f32>> = Metric::new(
    "TransactionsThroughputSMA_10",
    "Transaction throughput simple moving average",
);

pub const TRANSACTIONS_THROUGHPUT_SMA_100: Metric<Node, BlockSeries<f32>> = Metric::new(
    "TransactionsThroughputSMA_100",
    "Transaction throughput simple moving average",
);

pub const TRANSACTIONS_THROUGHPUT_SMA_1000: Metric<Node, BlockSeries<f32>> = Metric::new(
    "TransactionsThroughputSMA_1000",
    "Transaction throughput simple moving average",
);

/// Moving average of the transaction throughput over `period` blocks.
pub fn transactions_throughput_sma(period: usize) -> Metric<Node, BlockSeries<f32>> {
    Metric::dynamic(
        format!("TransactionsThroughputSMA_{}", period),
        "Transaction throughput simple moving average",
    )
}

/// Metric recorded for one Prometheus key, named `name` or `name_q<quantile>`.
pub fn prometheus_metric(key: &PrometheusLogKey) -> Metric<Node, TimeSeries<f64>> {
    Metric::dynamic(key.to_string(), format!("Prometheus metric for {}", key))
}

// ============================================================================
// Block metrics
// ============================================================================

/// Records one property of every block, per reporting node.
pub struct BlockNodeSource<V> {
    base: SeriesSource<Node, BlockNumber, V>,
    property: fn(&Block) -> V,
    provider: Arc<dyn NodeLogProvider>,
    me: Weak<Self>,
}

impl<V: Value> BlockNodeSource<V> {
    pub fn new(
        metric: Metric<Node, BlockSeries<V>>,
        monitor: &Monitor,
        property: fn(&Block) -> V,
    ) -> Arc<Self> {
        let provider: Arc<dyn NodeLogProvider> = monitor.node_log_provider();
        let source = Arc::new_cyclic(|me| Self {
            base: SeriesSource::new(metric),
            property,
            provider: Arc::clone(&provider),
            me: me.clone(),
        });
        provider.register_log_listener(Arc::clone(&source) as Arc<dyn LogListener>);
        source
    }
}

impl<V: Value> LogListener for BlockNodeSource<V> {
    fn on_block(&self, node: &Node, block: &Block) {
        let series = self.base.get_or_add_subject(node.clone());
        if let Err(e) = series.append(block.height, (self.property)(block)) {
            warn!(
                metric = %self.base.metric().name(),
                node = %node,
                error = %e,
                "Block not recorded"
            );
        }
    }
}

#[async_trait]
impl<V: Value> Source<Node, BlockSeries<V>> for BlockNodeSource<V> {
    fn metric(&self) -> Metric<Node, BlockSeries<V>> {
        self.base.metric()
    }

    fn subjects(&self) -> Vec<Node> {
        self.base.subjects()
    }

    fn data(&self, subject: &Node) -> Option<BlockSeries<V>> {
        self.base.data(subject)
    }

    async fn shutdown(&self) -> Result<()> {
        if let Some(me) = self.me.upgrade() {
            self.provider
                .unregister_log_listener(&(me as Arc<dyn LogListener>));
        }
        Ok(())
    }
}

pub fn new_block_completion_time_source(
    monitor: &Arc<Monitor>,
) -> Arc<dyn Source<Node, BlockSeries<Time>>> {
    BlockNodeSource::new(BLOCK_COMPLETION_TIME, monitor, |b| b.time)
}

pub fn new_block_processing_time_source(
    monitor: &Arc<Monitor>,
) -> Arc<dyn Source<Node, BlockSeries<Duration>>> {
    BlockNodeSource::new(BLOCK_EVENT_AND_TXS_PROCESSING_TIME, monitor, |b| b.processing_time)
}

// ============================================================================
// Throughput
// ============================================================================

/// Transactions per second of each block, from the time since the previous
/// block of the same node.
///
/// The first block of a node only starts its series. Blocks completed at
/// the same instant as the previous one are skipped.
pub struct TransactionsThroughputSource {
    base: SeriesSource<Node, BlockNumber, f32>,
    last_times: Mutex<HashMap<Node, Time>>,
    provider: Arc<dyn NodeLogProvider>,
    me: Weak<Self>,
}

impl TransactionsThroughputSource {
    pub fn new(monitor: &Monitor) -> Arc<Self> {
        let provider: Arc<dyn NodeLogProvider> = monitor.node_log_provider();
        let source = Arc::new_cyclic(|me| Self {
            base: SeriesSource::new(TRANSACTIONS_THROUGHPUT),
            last_times: Mutex::new(HashMap::new()),
            provider: Arc::clone(&provider),
            me: me.clone(),
        });
        provider.register_log_listener(Arc::clone(&source) as Arc<dyn LogListener>);
        source
    }
}

impl LogListener for TransactionsThroughputSource {
    fn on_block(&self, node: &Node, block: &Block) {
        let previous = self.last_times.lock().insert(node.clone(), block.time);
        let series = self.base.get_or_add_subject(node.clone());
        let previous = match previous {
            Some(previous) => previous,
            None => return,
        };

        let elapsed = (block.time - previous).as_nanos();
        if elapsed == 0 {
            return;
        }
        let throughput = block.txs as f64 * 1e9 / elapsed as f64;
        if let Err(e) = series.append(block.height, throughput as f32) {
            warn!(node = %node, error = %e, "Throughput not recorded");
        }
    }
}

#[async_trait]
impl Source<Node, BlockSeries<f32>> for TransactionsThroughputSource {
    fn metric(&self) -> Metric<Node, BlockSeries<f32>> {
        self.base.metric()
    }

    fn subjects(&self) -> Vec<Node> {
        self.base.subjects()
    }

    fn data(&self, subject: &Node) -> Option<BlockSeries<f32>> {
        self.base.data(subject)
    }

    async fn shutdown(&self) -> Result<()> {
        if let Some(me) = self.me.upgrade() {
            self.provider
                .unregister_log_listener(&(me as Arc<dyn LogListener>));
        }
        Ok(())
    }
}

pub fn new_transactions_throughput_source(
    monitor: &Arc<Monitor>,
) -> Arc<dyn Source<Node, BlockSeries<f32>>> {
    TransactionsThroughputSource::new(monitor)
}

// ============================================================================
// Moving averages
// ============================================================================

/// Moving average of another per-node block metric of the same monitor.
///
/// The input is looked up on demand, so the input source is installed on
/// first use. Series are created once per node and cached.
pub struct SmaSource {
    metric: Metric<Node, BlockSeries<f32>>,
    input: Metric<Node, BlockSeries<f32>>,
    period: usize,
    monitor: Weak<Monitor>,
    series: Mutex<HashMap<Node, BlockSeries<f32>>>,
}

impl SmaSource {
    pub fn new(
        metric: Metric<Node, BlockSeries<f32>>,
        input: Metric<Node, BlockSeries<f32>>,
        period: usize,
        monitor: &Arc<Monitor>,
    ) -> Self {
        Self {
            metric,
            input,
            period,
            monitor: Arc::downgrade(monitor),
            series: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Source<Node, BlockSeries<f32>> for SmaSource {
    fn metric(&self) -> Metric<Node, BlockSeries<f32>> {
        self.metric.clone()
    }

    fn subjects(&self) -> Vec<Node> {
        let monitor = match self.monitor.upgrade() {
            Some(monitor) => monitor,
            None => return Vec::new(),
        };
        monitor.get_subjects(&self.input).unwrap_or_else(|e| {
            warn!(metric = %self.metric.name(), error = %e, "Input subjects unavailable");
            Vec::new()
        })
    }

    fn data(&self, subject: &Node) -> Option<BlockSeries<f32>> {
        if let Some(series) = self.series.lock().get(subject) {
            return Some(Arc::clone(series));
        }

        let monitor = self.monitor.upgrade()?;
        let input = match monitor.get_data(&self.input, subject) {
            Ok(input) => input?,
            Err(e) => {
                warn!(metric = %self.metric.name(), error = %e, "Input series unavailable");
                return None;
            }
        };

        let mut cached = self.series.lock();
        let series = cached
            .entry(subject.clone())
            .or_insert_with(|| Arc::new(SmaSeries::new(input, self.period)) as BlockSeries<f32>);
        Some(Arc::clone(series))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// Throughput moving average over `period` blocks.
pub fn new_throughput_sma_source(
    monitor: &Arc<Monitor>,
    period: usize,
) -> Arc<dyn Source<Node, BlockSeries<f32>>> {
    Arc::new(SmaSource::new(
        transactions_throughput_sma(period),
        TRANSACTIONS_THROUGHPUT,
        period,
        monitor,
    ))
}

// ============================================================================
// Prometheus metrics
// ============================================================================

/// Records the samples of one Prometheus key, per node.
pub struct PromLogSource {
    base: SeriesSource<Node, Time, f64>,
    key: PrometheusLogKey,
    provider: Arc<dyn PrometheusLogProvider>,
    me: Weak<Self>,
}

impl PromLogSource {
    pub fn new(monitor: &Monitor, key: PrometheusLogKey) -> Arc<Self> {
        let provider: Arc<dyn PrometheusLogProvider> = monitor.prometheus_log_provider();
        let source = Arc::new_cyclic(|me| Self {
            base: SeriesSource::new(prometheus_metric(&key)),
            key: key.clone(),
            provider: Arc::clone(&provider),
            me: me.clone(),
        });
        provider.register_log_listener(key, Arc::clone(&source) as Arc<dyn TimeLogListener>);
        source
    }

    /// Creates the source of `key` and installs it in the monitor.
    pub fn install(
        monitor: &Monitor,
        key: PrometheusLogKey,
    ) -> Result<Metric<Node, TimeSeries<f64>>> {
        let source = Self::new(monitor, key);
        let metric = source.base.metric();
        monitor.install_source(source as Arc<dyn Source<Node, TimeSeries<f64>>>)?;
        Ok(metric)
    }

    pub fn key(&self) -> &PrometheusLogKey {
        &self.key
    }
}

impl TimeLogListener for PromLogSource {
    fn on_log(&self, node: &Node, time: Time, value: f64) {
        let series = self.base.get_or_add_subject(node.clone());
        if let Err(e) = series.append(time, value) {
            warn!(key = %self.key, node = %node, error = %e, "Sample not recorded");
        }
    }
}

#[async_trait]
impl Source<Node, TimeSeries<f64>> for PromLogSource {
    fn metric(&self) -> Metric<Node, TimeSeries<f64>> {
        self.base.metric()
    }

    fn subjects(&self) -> Vec<Node> {
        self.base.subjects()
    }

    fn data(&self, subject: &Node) -> Option<TimeSeries<f64>> {
        self.base.data(subject)
    }

    async fn shutdown(&self) -> Result<()> {
        if let Some(me) = self.me.upgrade() {
            self.provider
                .unregister_log_listener(&self.key, &(me as Arc<dyn TimeLogListener>));
        }
        Ok(())
    }
}
