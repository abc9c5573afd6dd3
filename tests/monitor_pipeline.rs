// Chainwatch - Blockchain test-network monitoring
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Integration tests for a monitor wired to a fake network
//!
//! These tests verify that blocks from node logs reach sources installed
//! in the monitor, and that sampled sources are stopped by its shutdown.

use async_trait::async_trait;
use chainwatch::prometheus::{FnFetcher, PrometheusFetcher};
use chainwatch::testutil::{FakeNetwork, FakeNode, NODE1_TEST_LOG, NODE2_TEST_LOG};
use chainwatch::{
    Block, BlockNumber, BlockSeries, LogListener, Metric, Monitor, MonitorConfig, MonitorError,
    Node, NodeLogProvider, PeriodicDataSource, PrometheusLogValue, Result, Sensor, Series,
    SeriesSource, Source, SourceRegistry, TimeSeries,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const BLOCK_TXS: Metric<Node, BlockSeries<u64>> = Metric::new("BlockTxs", "transactions per block");
const TICKS: Metric<Node, TimeSeries<u64>> = Metric::new("Ticks", "sensor reads");

/// Records the transaction count of every block seen in node logs.
struct BlockTxsSource {
    base: SeriesSource<Node, BlockNumber, u64>,
}

impl LogListener for BlockTxsSource {
    fn on_block(&self, node: &Node, block: &Block) {
        let series = self.base.get_or_add_subject(node.clone());
        let _ = series.append(block.height, block.txs);
    }
}

#[async_trait]
impl Source<Node, BlockSeries<u64>> for BlockTxsSource {
    fn metric(&self) -> Metric<Node, BlockSeries<u64>> {
        BLOCK_TXS
    }

    fn subjects(&self) -> Vec<Node> {
        self.base.subjects()
    }

    fn data(&self, subject: &Node) -> Option<BlockSeries<u64>> {
        self.base.data(subject)
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

struct CountingSensor(AtomicU64);

#[async_trait]
impl Sensor<u64> for CountingSensor {
    async fn read_value(&self) -> Result<u64> {
        Ok(self.0.fetch_add(1, Ordering::SeqCst))
    }
}

fn registry() -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    registry
        .register(BLOCK_TXS, |monitor: &Arc<Monitor>| {
            let source = Arc::new(BlockTxsSource {
                base: SeriesSource::new(BLOCK_TXS),
            });
            monitor
                .node_log_provider()
                .register_log_listener(source.clone());
            source as Arc<dyn Source<Node, BlockSeries<u64>>>
        })
        .unwrap();
    registry
        .register(TICKS, |monitor: &Arc<Monitor>| {
            let period = monitor.config().sampling_period();
            let source = Arc::new(PeriodicDataSource::new(TICKS, period));
            for node in monitor.network().active_nodes() {
                let sensor = Arc::new(CountingSensor(AtomicU64::new(0)));
                let _ = source.add_subject(Node::new(node.label()), sensor);
            }
            source as Arc<dyn Source<Node, TimeSeries<u64>>>
        })
        .unwrap();
    registry
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn no_metrics() -> Arc<dyn PrometheusFetcher> {
    Arc::new(FnFetcher(|_: &str| -> Result<Vec<PrometheusLogValue>> {
        Ok(Vec::new())
    }))
}

#[tokio::test]
async fn test_blocks_reach_installed_source() {
    init_tracing();
    let network = FakeNetwork::new();
    let monitor = Monitor::builder(network.clone(), MonitorConfig::default())
        .registry(registry())
        .prometheus_fetcher(no_metrics())
        .build()
        .unwrap();
    monitor.install_all_registered_sources().unwrap();

    network.add_node(FakeNode::new("A", NODE1_TEST_LOG));
    network.add_node(FakeNode::new("B", NODE2_TEST_LOG));
    monitor.node_log_provider().wait_for_logs_to_be_consumed().await;

    let subjects = monitor.get_subjects(&BLOCK_TXS).unwrap();
    assert_eq!(subjects, vec![Node::new("A"), Node::new("B")]);

    let series = monitor.get_data(&BLOCK_TXS, &Node::new("A")).unwrap().unwrap();
    let txs: Vec<u64> = series.get_all().into_iter().map(|p| p.value).collect();
    assert_eq!(txs, vec![10, 20, 30]);

    let series = monitor.get_data(&BLOCK_TXS, &Node::new("B")).unwrap().unwrap();
    assert_eq!(series.get_latest().unwrap().position, BlockNumber(2));

    monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_sampling_stops_at_monitor_shutdown() {
    init_tracing();
    let network = FakeNetwork::with_nodes(vec![FakeNode::new("A", "")]);
    let config = MonitorConfig::with_sampling_period(Duration::from_millis(10));
    let monitor = Monitor::builder(network, config)
        .registry(registry())
        .prometheus_fetcher(no_metrics())
        .build()
        .unwrap();

    // installed lazily on first use
    assert!(monitor.installed_metrics().is_empty());
    assert_eq!(monitor.get_subjects(&TICKS).unwrap(), vec![Node::new("A")]);

    tokio::time::sleep(Duration::from_millis(100)).await;
    monitor.shutdown().await.unwrap();

    let series = monitor.get_data(&TICKS, &Node::new("A")).unwrap().unwrap();
    let samples = series.len();
    assert!(samples > 0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(series.len(), samples);
}

#[tokio::test]
async fn test_duplicate_install_is_rejected() {
    let monitor = Monitor::builder(FakeNetwork::new(), MonitorConfig::default())
        .registry(registry())
        .prometheus_fetcher(no_metrics())
        .build()
        .unwrap();
    monitor.install_all_registered_sources().unwrap();

    let duplicate = Arc::new(BlockTxsSource {
        base: SeriesSource::new(BLOCK_TXS),
    });
    let result = monitor.install_source::<Node, BlockSeries<u64>>(duplicate);
    assert!(matches!(result, Err(MonitorError::MetricAlreadyRegistered(_))));

    monitor.shutdown().await.unwrap();
}
