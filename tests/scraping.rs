// Chainwatch - Blockchain test-network monitoring
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Integration tests for metrics scraping over HTTP
//!
//! A local axum server exposes a prometheus registry in the text format,
//! the same way a node does.

use chainwatch::prometheus::{HttpFetcher, PrometheusFetcher};
use chainwatch::testutil::{FakeNetwork, FakeNode};
use chainwatch::{
    MonitorConfig, Node, PrometheusLogDispatcher, PrometheusLogKey, PrometheusLogProvider,
    PrometheusMetricType, Time, TimeLogListener, DEFAULT_PROMETHEUS_PATH,
};
use parking_lot::Mutex;
use prometheus::{Encoder, Gauge, IntCounter, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

struct FakeMetricsServer {
    addr: SocketAddr,
    head: Gauge,
    executions: IntCounter,
}

impl FakeMetricsServer {
    async fn start() -> Self {
        let registry = Registry::new();
        let head = Gauge::new("chain_head_block", "current head block").unwrap();
        let executions = IntCounter::new("chain_execution_count", "executed blocks").unwrap();
        registry.register(Box::new(head.clone())).unwrap();
        registry.register(Box::new(executions.clone())).unwrap();

        let app = axum::Router::new().route(
            DEFAULT_PROMETHEUS_PATH,
            axum::routing::get(move || {
                let registry = registry.clone();
                async move {
                    let mut buffer = Vec::new();
                    TextEncoder::new()
                        .encode(&registry.gather(), &mut buffer)
                        .unwrap();
                    String::from_utf8(buffer).unwrap()
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            head,
            executions,
        }
    }

    fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

#[derive(Default)]
struct Recorder {
    logs: Mutex<Vec<(Node, Time, f64)>>,
}

impl TimeLogListener for Recorder {
    fn on_log(&self, node: &Node, time: Time, value: f64) {
        self.logs.lock().push((node.clone(), time, value));
    }
}

#[tokio::test]
async fn test_http_fetcher_reads_text_exposition() {
    let server = FakeMetricsServer::start().await;
    server.head.set(42.0);
    server.executions.inc_by(3);

    let fetcher = HttpFetcher::new(DEFAULT_PROMETHEUS_PATH);
    let values = fetcher.fetch(&server.url()).await.unwrap();

    let head = values
        .iter()
        .find(|v| v.key == PrometheusLogKey::new("chain_head_block"))
        .expect("gauge is scraped");
    assert_eq!(head.value, 42.0);
    assert_eq!(head.metric_type, PrometheusMetricType::Gauge);

    let executions = values
        .iter()
        .find(|v| v.key.name == "chain_execution_count")
        .expect("counter is scraped");
    assert_eq!(executions.value, 3.0);
    assert_eq!(executions.metric_type, PrometheusMetricType::Counter);
}

#[tokio::test]
async fn test_http_fetcher_reports_missing_endpoint() {
    let server = FakeMetricsServer::start().await;
    let fetcher = HttpFetcher::new("/no/such/path");
    assert!(fetcher.fetch(&server.url()).await.is_err());
}

#[tokio::test]
async fn test_dispatcher_scrapes_live_endpoint() {
    let server = FakeMetricsServer::start().await;
    server.head.set(7.0);

    let network = FakeNetwork::with_nodes(vec![FakeNode::with_urls(
        "node-1",
        Some(&server.url()),
        None,
    )]);
    let config = MonitorConfig::with_prometheus_period(Duration::from_millis(20));
    let dispatcher = PrometheusLogDispatcher::start_http(network, &config).unwrap();

    let recorder = Arc::new(Recorder::default());
    dispatcher.register_log_listener(PrometheusLogKey::new("chain_head_block"), recorder.clone());

    let start = Time::now();
    for _ in 0..200 {
        if !recorder.logs.lock().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    dispatcher.shutdown().await;

    let logs = recorder.logs.lock().clone();
    assert!(!logs.is_empty(), "no sample received");
    let (node, time, value) = &logs[0];
    assert_eq!(node, &Node::new("node-1"));
    assert!(*time >= start);
    assert_eq!(*value, 7.0);
}
