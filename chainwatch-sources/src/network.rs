// Chainwatch Sources - Node, network, application and account metrics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Network-wide metrics.

use async_trait::async_trait;
use chainwatch::network::Network as ObservedNetwork;
use chainwatch::{
    Block, BlockNumber, BlockSeries, LogListener, Metric, Monitor, Network, Node,
    NodeLogProvider, PeriodicDataSource, Result, Sensor, SeriesSource, Source, SyncedSeries,
    TimeSeries, Value,
};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::warn;

pub const BLOCK_NUMBER_OF_TRANSACTIONS: Metric<Network, BlockSeries<u64>> = Metric::new(
    "BlockNumberOfTransactions",
    "The number of transactions processed in a block",
);

pub const BLOCK_GAS_USED: Metric<Network, BlockSeries<u64>> =
    Metric::new("BlockGasUsed", "The gas used in a block");

pub const NUMBER_OF_NODES: Metric<Network, TimeSeries<i64>> =
    Metric::new("NumberOfNodes", "The number of connected nodes at various times");

/// Records one property per block height of the network.
///
/// Every node reports the same blocks; only the first report of a height
/// above the last recorded one is kept.
pub struct BlockNetworkSource<V> {
    base: SeriesSource<Network, BlockNumber, V>,
    series: Arc<SyncedSeries<BlockNumber, V>>,
    property: fn(&Block) -> V,
    last_block: Mutex<Option<BlockNumber>>,
    provider: Arc<dyn NodeLogProvider>,
    me: Weak<Self>,
}

impl<V: Value> BlockNetworkSource<V> {
    pub fn new(
        metric: Metric<Network, BlockSeries<V>>,
        monitor: &Monitor,
        property: fn(&Block) -> V,
    ) -> Arc<Self> {
        let provider: Arc<dyn NodeLogProvider> = monitor.node_log_provider();
        let base = SeriesSource::new(metric);
        let series = base.get_or_add_subject(Network);
        let source = Arc::new_cyclic(|me| Self {
            base,
            series,
            property,
            last_block: Mutex::new(None),
            provider: Arc::clone(&provider),
            me: me.clone(),
        });
        provider.register_log_listener(Arc::clone(&source) as Arc<dyn LogListener>);
        source
    }
}

impl<V: Value> LogListener for BlockNetworkSource<V> {
    fn on_block(&self, _node: &Node, block: &Block) {
        let mut last = self.last_block.lock();
        if last.map_or(false, |last| block.height <= last) {
            return;
        }
        if let Err(e) = self.series.append(block.height, (self.property)(block)) {
            warn!(metric = %self.base.metric().name(), error = %e, "Block not recorded");
        }
        *last = Some(block.height);
    }
}

#[async_trait]
impl<V: Value> Source<Network, BlockSeries<V>> for BlockNetworkSource<V> {
    fn metric(&self) -> Metric<Network, BlockSeries<V>> {
        self.base.metric()
    }

    fn subjects(&self) -> Vec<Network> {
        self.base.subjects()
    }

    fn data(&self, subject: &Network) -> Option<BlockSeries<V>> {
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

pub fn new_number_of_transactions_source(
    monitor: &Arc<Monitor>,
) -> Arc<dyn Source<Network, BlockSeries<u64>>> {
    BlockNetworkSource::new(BLOCK_NUMBER_OF_TRANSACTIONS, monitor, |b| b.txs)
}

pub fn new_gas_used_source(monitor: &Arc<Monitor>) -> Arc<dyn Source<Network, BlockSeries<u64>>> {
    BlockNetworkSource::new(BLOCK_GAS_USED, monitor, |b| b.gas_used)
}

/// Counts the active nodes of the network.
pub struct NodeCountSensor {
    network: Arc<dyn ObservedNetwork>,
}

impl NodeCountSensor {
    pub fn new(network: Arc<dyn ObservedNetwork>) -> Self {
        Self { network }
    }
}

#[async_trait]
impl Sensor<i64> for NodeCountSensor {
    async fn read_value(&self) -> Result<i64> {
        Ok(self.network.active_nodes().len() as i64)
    }
}

pub fn new_number_of_nodes_source(
    monitor: &Arc<Monitor>,
) -> Arc<dyn Source<Network, TimeSeries<i64>>> {
    number_of_nodes_source(monitor, monitor.config().sampling_period())
}

fn number_of_nodes_source(
    monitor: &Monitor,
    period: Duration,
) -> Arc<dyn Source<Network, TimeSeries<i64>>> {
    let source = Arc::new(PeriodicDataSource::new(NUMBER_OF_NODES, period));
    let sensor = Arc::new(NodeCountSensor::new(Arc::clone(monitor.network())));
    if let Err(e) = source.add_subject(Network, sensor) {
        warn!(error = %e, "Node count sampling not started");
    }
    source
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainwatch::prometheus::{FnFetcher, PrometheusFetcher};
    use chainwatch::testutil::{FakeNetwork, FakeNode};
    use chainwatch::{MonitorConfig, PrometheusLogValue, Series, Time};

    fn monitor(network: Arc<FakeNetwork>) -> Arc<Monitor> {
        let fetcher: Arc<dyn PrometheusFetcher> =
            Arc::new(FnFetcher(|_: &str| -> Result<Vec<PrometheusLogValue>> {
                Ok(Vec::new())
            }));
        Monitor::builder(network, MonitorConfig::default())
            .prometheus_fetcher(fetcher)
            .build()
            .unwrap()
    }

    fn block(height: u64, txs: u64, gas_used: u64) -> Block {
        Block {
            height: BlockNumber(height),
            time: Time::from_nanos(height),
            txs,
            gas_used,
            processing_time: Duration::ZERO,
            gas_base_fee: None,
            gas_rate: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_heights_collapse() {
        let monitor = monitor(FakeNetwork::new());
        let source = BlockNetworkSource::new(BLOCK_NUMBER_OF_TRANSACTIONS, &monitor, |b| b.txs);
        let (a, b) = (Node::new("A"), Node::new("B"));

        source.on_block(&a, &block(1, 10, 0));
        source.on_block(&b, &block(1, 99, 0));
        source.on_block(&a, &block(2, 20, 0));
        source.on_block(&b, &block(2, 99, 0));
        source.on_block(&b, &block(3, 30, 0));
        source.on_block(&a, &block(3, 99, 0));
        source.on_block(&a, &block(1, 99, 0));

        let series = source.data(&Network).unwrap();
        let values: Vec<u64> = series.get_all().into_iter().map(|p| p.value).collect();
        assert_eq!(values, vec![10, 20, 30]);
        assert_eq!(source.subjects(), vec![Network]);
        monitor.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_gas_used_from_node_logs() {
        let network = FakeNetwork::new();
        let monitor = monitor(network.clone());
        let source = new_gas_used_source(&monitor);

        network.add_node(FakeNode::new("A", chainwatch::testutil::NODE1_TEST_LOG));
        network.add_node(FakeNode::new("B", chainwatch::testutil::NODE2_TEST_LOG));
        monitor.node_log_provider().wait_for_logs_to_be_consumed().await;

        let series = source.data(&Network).unwrap();
        let heights: Vec<u64> = series.get_all().into_iter().map(|p| p.position.0).collect();
        assert_eq!(heights.first(), Some(&1));
        assert_eq!(series.get_latest().unwrap().position, BlockNumber(3));
        assert!(series.get_all().iter().all(|p| [11, 22, 33].contains(&p.value)));

        source.shutdown().await.unwrap();
        monitor.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_number_of_nodes_is_sampled() {
        let network = FakeNetwork::with_nodes(vec![FakeNode::new("A", ""), FakeNode::new("B", "")]);
        let monitor = monitor(network.clone());
        let source = number_of_nodes_source(&monitor, Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(60)).await;
        source.shutdown().await.unwrap();

        let series = source.data(&Network).unwrap();
        assert!(!series.is_empty());
        assert!(series.get_all().iter().all(|p| p.value == 2));
        monitor.shutdown().await.unwrap();
    }
}
