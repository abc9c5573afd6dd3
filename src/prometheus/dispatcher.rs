// Chainwatch - Blockchain test-network monitoring
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

use super::{
    PrometheusFetcher, PrometheusLogKey, PrometheusLogProvider, PrometheusLogValue, TimeLogListener,
};
use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::network::{same_instance, Network, NetworkListener, NodeHandle};
use crate::types::{Node, Time};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type Listeners = Arc<Mutex<HashMap<PrometheusLogKey, Vec<Arc<dyn TimeLogListener>>>>>;
type Ticks = Arc<Mutex<HashMap<Node, mpsc::Sender<()>>>>;

/// Periodically scrapes the metrics of every node and hands each sample to
/// the listeners registered for its key.
///
/// A single ticker fans ticks out to one task per node over a bounded
/// channel. When a node falls behind, ticks for it are dropped rather than
/// queued without bound.
pub struct PrometheusLogDispatcher {
    network: Arc<dyn Network>,
    me: Weak<PrometheusLogDispatcher>,
    runtime: Handle,
    fetcher: Arc<dyn PrometheusFetcher>,
    ticks: Ticks,
    listeners: Listeners,
    ticker: Mutex<Option<JoinHandle<()>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    token: CancellationToken,
    capacity: usize,
    shut_down: AtomicBool,
}

impl PrometheusLogDispatcher {
    /// Creates the dispatcher and starts scraping the active nodes.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(
        network: Arc<dyn Network>,
        fetcher: Arc<dyn PrometheusFetcher>,
        config: &MonitorConfig,
    ) -> Result<Arc<Self>> {
        let runtime = Handle::try_current()
            .map_err(|e| MonitorError::Config(format!("no async runtime: {}", e)))?;
        let period = config.prometheus_period().max(Duration::from_millis(1));
        let capacity = config.node_channel_capacity.max(1);

        let ticks: Ticks = Arc::new(Mutex::new(HashMap::new()));
        let token = CancellationToken::new();
        let ticker = runtime.spawn(tick(Arc::clone(&ticks), period, token.clone()));

        let dispatcher = Arc::new_cyclic(|me| Self {
            network: Arc::clone(&network),
            me: me.clone(),
            runtime,
            fetcher,
            ticks,
            listeners: Arc::new(Mutex::new(HashMap::new())),
            ticker: Mutex::new(Some(ticker)),
            tasks: Mutex::new(Vec::new()),
            token,
            capacity,
            shut_down: AtomicBool::new(false),
        });

        network.register_listener(Arc::clone(&dispatcher) as Arc<dyn NetworkListener>);
        for node in network.active_nodes() {
            dispatcher.after_node_creation(&node);
        }

        Ok(dispatcher)
    }

    /// Creates a dispatcher scraping nodes over HTTP.
    #[cfg(feature = "http")]
    pub fn start_http(network: Arc<dyn Network>, config: &MonitorConfig) -> Result<Arc<Self>> {
        let fetcher = Arc::new(super::HttpFetcher::from_config(config));
        Self::start(network, fetcher, config)
    }

    /// Nodes being scraped, sorted.
    pub fn nodes(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.ticks.lock().keys().cloned().collect();
        nodes.sort();
        nodes
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().values().map(Vec::len).sum()
    }

    /// Stops scraping. No listener is called once this returns.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(me) = self.me.upgrade() {
            self.network
                .unregister_listener(&(me as Arc<dyn NetworkListener>));
        }
        self.token.cancel();

        let ticker = self.ticker.lock().take();
        if let Some(ticker) = ticker {
            if let Err(err) = ticker.await {
                warn!(error = %err, "Scrape ticker failed");
            }
        }
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "Scrape task failed");
            }
        }
        self.ticks.lock().clear();
        debug!("Prometheus log dispatcher stopped");
    }
}

impl PrometheusLogProvider for PrometheusLogDispatcher {
    fn register_log_listener(&self, key: PrometheusLogKey, listener: Arc<dyn TimeLogListener>) {
        self.listeners.lock().entry(key).or_default().push(listener);
    }

    fn unregister_log_listener(&self, key: &PrometheusLogKey, listener: &Arc<dyn TimeLogListener>) {
        let mut listeners = self.listeners.lock();
        if let Some(registered) = listeners.get_mut(key) {
            registered.retain(|l| !same_instance(l, listener));
            if registered.is_empty() {
                listeners.remove(key);
            }
        }
    }
}

impl NetworkListener for PrometheusLogDispatcher {
    fn after_node_creation(&self, handle: &Arc<dyn NodeHandle>) {
        if self.shut_down.load(Ordering::SeqCst) {
            return;
        }
        let node = Node::new(handle.label());
        let url = match handle.metrics_url() {
            Some(url) => url,
            None => {
                debug!(node = %node, "Node exposes no metrics");
                return;
            }
        };

        let mut ticks = self.ticks.lock();
        if ticks.contains_key(&node) {
            return;
        }
        let (tx, rx) = mpsc::channel(self.capacity);
        ticks.insert(node.clone(), tx);

        info!(node = %node, url = %url, "Scraping node metrics");
        let task = self.runtime.spawn(scrape(
            node,
            url,
            rx,
            Arc::clone(&self.fetcher),
            Arc::clone(&self.listeners),
            self.token.clone(),
        ));
        self.tasks.lock().push(task);
    }

    fn after_node_removal(&self, handle: &Arc<dyn NodeHandle>) {
        // dropping the sender ends the node's task
        self.ticks.lock().remove(&Node::new(handle.label()));
    }
}

async fn tick(ticks: Ticks, period: Duration, token: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                for (node, tx) in ticks.lock().iter() {
                    if let Err(TrySendError::Full(_)) = tx.try_send(()) {
                        warn!(node = %node, "Metrics scrape is lagging, tick skipped");
                    }
                }
            }
        }
    }
}

async fn scrape(
    node: Node,
    url: String,
    mut ticks: mpsc::Receiver<()>,
    fetcher: Arc<dyn PrometheusFetcher>,
    listeners: Listeners,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            tick = ticks.recv() => {
                if tick.is_none() {
                    break;
                }
            }
        }

        let values = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            values = fetcher.fetch(&url) => values,
        };
        match values {
            Ok(values) => distribute(&node, Time::now(), &values, &listeners),
            Err(err) => warn!(node = %node, error = %err, "Failed to scrape node metrics"),
        }
    }
    debug!(node = %node, "Metrics scraping stopped");
}

fn distribute(node: &Node, time: Time, values: &[PrometheusLogValue], listeners: &Listeners) {
    let listeners = listeners.lock().clone();
    for value in values {
        if let Some(registered) = listeners.get(&value.key) {
            for listener in registered {
                listener.on_log(node, time, value.value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prometheus::{quantile, FnFetcher, PrometheusMetricType};
    use crate::testutil::{FakeNetwork, FakeNode};
    use std::sync::atomic::AtomicU64;

    fn fast_config() -> MonitorConfig {
        MonitorConfig::with_prometheus_period(Duration::from_millis(10))
    }

    fn metrics_node(label: &str) -> Arc<FakeNode> {
        FakeNode::with_urls(label, Some(label), None)
    }

    fn value(name: &str, q: &str, v: f64) -> PrometheusLogValue {
        PrometheusLogValue::new(
            PrometheusLogKey::with_quantile(name, q),
            PrometheusMetricType::Gauge,
            v,
        )
    }

    fn fake_data(url: &str) -> Result<Vec<PrometheusLogValue>> {
        Ok(match url {
            "A" => vec![
                value("A_summary", quantile::Q099, 1.0),
                value("A_counter", quantile::NONE, 2.0),
                value("A_gauge", quantile::NONE, 3.0),
                value("B_counter", quantile::NONE, 4.0),
            ],
            "B" => vec![
                value("A_counter", quantile::NONE, 7.0),
                value("A_gauge", quantile::NONE, 8.0),
                value("B_gauge", quantile::NONE, 9.0),
            ],
            "C" => vec![value("C", quantile::NONE, 10.0)],
            other => return Err(MonitorError::Fetch(format!("unknown node {}", other))),
        })
    }

    #[derive(Default)]
    struct RecordingListener {
        logs: Mutex<Vec<(Node, Time, f64)>>,
    }

    impl RecordingListener {
        fn values(&self) -> Vec<f64> {
            self.logs.lock().iter().map(|(_, _, v)| *v).collect()
        }

        fn count(&self) -> usize {
            self.logs.lock().len()
        }
    }

    impl TimeLogListener for RecordingListener {
        fn on_log(&self, node: &Node, time: Time, value: f64) {
            self.logs.lock().push((node.clone(), time, value));
        }
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_logs_dispatched_by_key() {
        let network = FakeNetwork::with_nodes(vec![metrics_node("A"), metrics_node("B")]);
        let dispatcher = PrometheusLogDispatcher::start(
            network.clone(),
            Arc::new(FnFetcher(fake_data)),
            &fast_config(),
        )
        .unwrap();

        let listener = Arc::new(RecordingListener::default());
        for key in [
            PrometheusLogKey::with_quantile("A_summary", quantile::Q099),
            PrometheusLogKey::new("A_counter"),
            PrometheusLogKey::new("A_gauge"),
            PrometheusLogKey::new("C"),
        ] {
            dispatcher.register_log_listener(key, listener.clone());
        }
        network.add_node(metrics_node("C"));

        wait_until(|| {
            let got = listener.values();
            [1.0, 2.0, 3.0, 7.0, 8.0, 10.0].iter().all(|v| got.contains(v))
        })
        .await;

        let got = listener.values();
        assert!(!got.contains(&4.0));
        assert!(!got.contains(&9.0));
        assert_eq!(dispatcher.nodes(), vec![Node::new("A"), Node::new("B"), Node::new("C")]);

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_logs_are_ordered_per_node() {
        let counter = Arc::new(AtomicU64::new(0));
        let fetch_counter = Arc::clone(&counter);
        let fetcher = FnFetcher(move |_: &str| -> Result<Vec<PrometheusLogValue>> {
            let n = fetch_counter.fetch_add(1, Ordering::SeqCst);
            Ok(vec![value("counter", quantile::NONE, n as f64)])
        });

        let network = FakeNetwork::with_nodes(vec![metrics_node("A")]);
        let dispatcher =
            PrometheusLogDispatcher::start(network, Arc::new(fetcher), &fast_config()).unwrap();
        let listener = Arc::new(RecordingListener::default());
        dispatcher.register_log_listener(PrometheusLogKey::new("counter"), listener.clone());

        wait_until(|| listener.count() >= 5).await;
        dispatcher.shutdown().await;

        let logs = listener.logs.lock().clone();
        for pair in logs.windows(2) {
            assert!(pair[0].2 < pair[1].2);
            assert!(pair[0].1 <= pair[1].1);
        }
    }

    #[tokio::test]
    async fn test_no_logs_after_shutdown() {
        let network = FakeNetwork::with_nodes(vec![metrics_node("A")]);
        let dispatcher = PrometheusLogDispatcher::start(
            network.clone(),
            Arc::new(FnFetcher(fake_data)),
            &fast_config(),
        )
        .unwrap();
        let listener = Arc::new(RecordingListener::default());
        dispatcher.register_log_listener(PrometheusLogKey::new("A_gauge"), listener.clone());

        wait_until(|| listener.count() > 0).await;
        dispatcher.shutdown().await;
        let seen = listener.count();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(listener.count(), seen);
        assert_eq!(network.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_unregistered_listener_stops_receiving() {
        let network = FakeNetwork::with_nodes(vec![metrics_node("A")]);
        let dispatcher =
            PrometheusLogDispatcher::start(network, Arc::new(FnFetcher(fake_data)), &fast_config())
                .unwrap();
        let listener = Arc::new(RecordingListener::default());
        let as_dyn: Arc<dyn TimeLogListener> = listener.clone();
        let key = PrometheusLogKey::new("A_gauge");
        dispatcher.register_log_listener(key.clone(), as_dyn.clone());

        wait_until(|| listener.count() > 0).await;
        dispatcher.unregister_log_listener(&key, &as_dyn);
        assert_eq!(dispatcher.listener_count(), 0);
        let seen = listener.count();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(listener.count(), seen);
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_twice() {
        let network = FakeNetwork::with_nodes(vec![metrics_node("A")]);
        let dispatcher =
            PrometheusLogDispatcher::start(network, Arc::new(FnFetcher(fake_data)), &fast_config())
                .unwrap();
        dispatcher.shutdown().await;
        dispatcher.shutdown().await;
        assert!(dispatcher.nodes().is_empty());
    }

    #[tokio::test]
    async fn test_register_after_shutdown_is_never_called() {
        let network = FakeNetwork::with_nodes(vec![metrics_node("A")]);
        let dispatcher =
            PrometheusLogDispatcher::start(network, Arc::new(FnFetcher(fake_data)), &fast_config())
                .unwrap();
        dispatcher.shutdown().await;

        let listener = Arc::new(RecordingListener::default());
        dispatcher.register_log_listener(PrometheusLogKey::new("A_gauge"), listener.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(listener.count(), 0);
    }

    #[tokio::test]
    async fn test_node_without_metrics_is_ignored() {
        let network = FakeNetwork::with_nodes(vec![FakeNode::new("A", "")]);
        let dispatcher =
            PrometheusLogDispatcher::start(network, Arc::new(FnFetcher(fake_data)), &fast_config())
                .unwrap();
        assert!(dispatcher.nodes().is_empty());
        dispatcher.shutdown().await;
    }
}
