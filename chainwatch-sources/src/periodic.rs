// Chainwatch Sources - Node, network, application and account metrics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Periodically sampled sources following the network.
//!
//! Each source creates one sensor per subject through a factory as nodes
//! or applications join, and keeps sampling them until shutdown. A removed
//! node stops being sampled but its series stays readable.
//!
//! Sensors are started on the Tokio runtime, so network notifications
//! must be delivered from within it.

use async_trait::async_trait;
use chainwatch::network::{Application, Network as ObservedNetwork, NetworkListener, NodeHandle};
use chainwatch::{
    Account, App, Metric, Monitor, Node, PeriodicDataSource, Result, Sensor, Series, Source,
    Subject, Time, Value,
};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::warn;

/// Creates the sensor sampling one node.
pub trait NodeSensorFactory<T>: Send + Sync {
    fn create_sensor(&self, node: &Arc<dyn NodeHandle>) -> Result<Arc<dyn Sensor<T>>>;
}

/// Creates the sensor sampling one application.
pub trait AppSensorFactory<T>: Send + Sync {
    fn create_sensor(&self, app: &Arc<dyn Application>) -> Result<Arc<dyn Sensor<T>>>;
}

/// Creates the sensor sampling one account of an application.
pub trait AccountSensorFactory<T>: Send + Sync {
    fn create_sensor(&self, app: &Arc<dyn Application>, account: usize)
        -> Result<Arc<dyn Sensor<T>>>;
}

/// Delegates `Source` to the inner sampler and detaches from the network
/// at shutdown.
macro_rules! periodic_source {
    ($source:ident, $subject:ty) => {
        #[async_trait]
        impl<T: Value> Source<$subject, Arc<dyn Series<Time, T>>> for $source<T> {
            fn metric(&self) -> Metric<$subject, Arc<dyn Series<Time, T>>> {
                self.sampler.metric()
            }

            fn subjects(&self) -> Vec<$subject> {
                self.sampler.subjects()
            }

            fn data(&self, subject: &$subject) -> Option<Arc<dyn Series<Time, T>>> {
                self.sampler.data(subject)
            }

            async fn shutdown(&self) -> Result<()> {
                if let Some(me) = self.me.upgrade() {
                    self.network
                        .unregister_listener(&(me as Arc<dyn NetworkListener>));
                }
                self.sampler.shutdown().await
            }
        }
    };
}

fn start_sampling<S: Subject, T: Value>(
    sampler: &PeriodicDataSource<S, T>,
    subject: S,
    sensor: Result<Arc<dyn Sensor<T>>>,
) {
    let metric = sampler.metric();
    match sensor {
        Ok(sensor) => {
            if let Err(e) = sampler.add_subject(subject.clone(), sensor) {
                warn!(
                    metric = %metric.name(),
                    subject = %subject,
                    error = %e,
                    "Sampling not started"
                );
            }
        }
        Err(e) => {
            warn!(
                metric = %metric.name(),
                subject = %subject,
                error = %e,
                "Failed to create sensor"
            );
        }
    }
}

// ============================================================================
// Nodes
// ============================================================================

/// Samples every node of the network.
pub struct PeriodicNodeDataSource<T> {
    sampler: PeriodicDataSource<Node, T>,
    factory: Box<dyn NodeSensorFactory<T>>,
    network: Arc<dyn ObservedNetwork>,
    me: Weak<Self>,
}

impl<T: Value> PeriodicNodeDataSource<T> {
    pub fn new(
        metric: Metric<Node, Arc<dyn Series<Time, T>>>,
        monitor: &Monitor,
        factory: impl NodeSensorFactory<T> + 'static,
    ) -> Arc<Self> {
        Self::with_period(metric, monitor, monitor.config().sampling_period(), factory)
    }

    pub fn with_period(
        metric: Metric<Node, Arc<dyn Series<Time, T>>>,
        monitor: &Monitor,
        period: Duration,
        factory: impl NodeSensorFactory<T> + 'static,
    ) -> Arc<Self> {
        let network = Arc::clone(monitor.network());
        let source = Arc::new_cyclic(|me| Self {
            sampler: PeriodicDataSource::new(metric, period),
            factory: Box::new(factory),
            network: Arc::clone(&network),
            me: me.clone(),
        });

        network.register_listener(Arc::clone(&source) as Arc<dyn NetworkListener>);
        for node in network.active_nodes() {
            source.after_node_creation(&node);
        }
        source
    }
}

impl<T: Value> NetworkListener for PeriodicNodeDataSource<T> {
    fn after_node_creation(&self, node: &Arc<dyn NodeHandle>) {
        let sensor = self.factory.create_sensor(node);
        start_sampling(&self.sampler, Node::new(node.label()), sensor);
    }

    fn after_node_removal(&self, node: &Arc<dyn NodeHandle>) {
        self.sampler.retire_subject(&Node::new(node.label()));
    }
}

periodic_source!(PeriodicNodeDataSource, Node);

// ============================================================================
// Applications
// ============================================================================

/// Samples every application of the network.
pub struct PeriodicAppDataSource<T> {
    sampler: PeriodicDataSource<App, T>,
    factory: Box<dyn AppSensorFactory<T>>,
    network: Arc<dyn ObservedNetwork>,
    me: Weak<Self>,
}

impl<T: Value> PeriodicAppDataSource<T> {
    pub fn new(
        metric: Metric<App, Arc<dyn Series<Time, T>>>,
        monitor: &Monitor,
        factory: impl AppSensorFactory<T> + 'static,
    ) -> Arc<Self> {
        Self::with_period(metric, monitor, monitor.config().sampling_period(), factory)
    }

    pub fn with_period(
        metric: Metric<App, Arc<dyn Series<Time, T>>>,
        monitor: &Monitor,
        period: Duration,
        factory: impl AppSensorFactory<T> + 'static,
    ) -> Arc<Self> {
        let network = Arc::clone(monitor.network());
        let source = Arc::new_cyclic(|me| Self {
            sampler: PeriodicDataSource::new(metric, period),
            factory: Box::new(factory),
            network: Arc::clone(&network),
            me: me.clone(),
        });

        network.register_listener(Arc::clone(&source) as Arc<dyn NetworkListener>);
        for app in network.active_applications() {
            source.after_application_creation(&app);
        }
        source
    }
}

impl<T: Value> NetworkListener for PeriodicAppDataSource<T> {
    fn after_application_creation(&self, app: &Arc<dyn Application>) {
        let sensor = self.factory.create_sensor(app);
        start_sampling(&self.sampler, App::new(app.name()), sensor);
    }
}

periodic_source!(PeriodicAppDataSource, App);

// ============================================================================
// Accounts
// ============================================================================

/// Samples every account of every application of the network.
pub struct PeriodicAccountDataSource<T> {
    sampler: PeriodicDataSource<Account, T>,
    factory: Box<dyn AccountSensorFactory<T>>,
    network: Arc<dyn ObservedNetwork>,
    me: Weak<Self>,
}

impl<T: Value> PeriodicAccountDataSource<T> {
    pub fn new(
        metric: Metric<Account, Arc<dyn Series<Time, T>>>,
        monitor: &Monitor,
        factory: impl AccountSensorFactory<T> + 'static,
    ) -> Arc<Self> {
        Self::with_period(metric, monitor, monitor.config().sampling_period(), factory)
    }

    pub fn with_period(
        metric: Metric<Account, Arc<dyn Series<Time, T>>>,
        monitor: &Monitor,
        period: Duration,
        factory: impl AccountSensorFactory<T> + 'static,
    ) -> Arc<Self> {
        let network = Arc::clone(monitor.network());
        let source = Arc::new_cyclic(|me| Self {
            sampler: PeriodicDataSource::new(metric, period),
            factory: Box::new(factory),
            network: Arc::clone(&network),
            me: me.clone(),
        });

        network.register_listener(Arc::clone(&source) as Arc<dyn NetworkListener>);
        for app in network.active_applications() {
            source.after_application_creation(&app);
        }
        source
    }
}

impl<T: Value> NetworkListener for PeriodicAccountDataSource<T> {
    fn after_application_creation(&self, app: &Arc<dyn Application>) {
        let name = App::new(app.name());
        for id in 0..app.accounts() {
            let sensor = self.factory.create_sensor(app, id);
            start_sampling(&self.sampler, Account::new(name.clone(), id), sensor);
        }
    }
}

periodic_source!(PeriodicAccountDataSource, Account);

#[cfg(test)]
mod tests {
    use super::*;
    use chainwatch::prometheus::{FnFetcher, PrometheusFetcher};
    use chainwatch::testutil::{FakeApp, FakeNetwork, FakeNode};
    use chainwatch::{MonitorConfig, MonitorError, PrometheusLogValue, TimeSeries};
    use std::sync::atomic::{AtomicU64, Ordering};

    const NODE_TICKS: Metric<Node, TimeSeries<u64>> = Metric::new("NodeTicks", "sensor reads");
    const APP_TICKS: Metric<App, TimeSeries<u64>> = Metric::new("AppTicks", "sensor reads");
    const ACCOUNT_IDS: Metric<Account, TimeSeries<u64>> = Metric::new("AccountIds", "account ids");

    struct Counter(AtomicU64);

    #[async_trait]
    impl Sensor<u64> for Counter {
        async fn read_value(&self) -> Result<u64> {
            Ok(self.0.fetch_add(1, Ordering::SeqCst))
        }
    }

    struct Fixed(u64);

    #[async_trait]
    impl Sensor<u64> for Fixed {
        async fn read_value(&self) -> Result<u64> {
            Ok(self.0)
        }
    }

    struct Counters;

    impl NodeSensorFactory<u64> for Counters {
        fn create_sensor(&self, node: &Arc<dyn NodeHandle>) -> Result<Arc<dyn Sensor<u64>>> {
            if node.label() == "broken" {
                return Err(MonitorError::Sensor("no sensor".into()));
            }
            Ok(Arc::new(Counter(AtomicU64::new(0))))
        }
    }

    impl AppSensorFactory<u64> for Counters {
        fn create_sensor(&self, _app: &Arc<dyn Application>) -> Result<Arc<dyn Sensor<u64>>> {
            Ok(Arc::new(Counter(AtomicU64::new(0))))
        }
    }

    impl AccountSensorFactory<u64> for Counters {
        fn create_sensor(
            &self,
            _app: &Arc<dyn Application>,
            account: usize,
        ) -> Result<Arc<dyn Sensor<u64>>> {
            Ok(Arc::new(Fixed(account as u64)))
        }
    }

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

    const PERIOD: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn test_node_source_follows_network() {
        let network = FakeNetwork::with_nodes(vec![FakeNode::new("A", "")]);
        let monitor = monitor(network.clone());
        let source = PeriodicNodeDataSource::with_period(NODE_TICKS, &monitor, PERIOD, Counters);

        network.add_node(FakeNode::new("B", ""));
        network.add_node(FakeNode::new("broken", ""));
        assert_eq!(source.subjects(), vec![Node::new("A"), Node::new("B")]);

        tokio::time::sleep(Duration::from_millis(60)).await;
        network.remove_node("A");
        let series = source.data(&Node::new("A")).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let stopped = series.len();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(series.len(), stopped);
        assert!(source.data(&Node::new("A")).is_some());

        source.shutdown().await.unwrap();
        assert_eq!(network.listener_count(), 2);
        monitor.shutdown().await.unwrap();
        assert_eq!(network.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_app_source_adds_existing_and_new_apps() {
        let network = FakeNetwork::new();
        network.add_application(FakeApp::new("app-1", 1));
        let monitor = monitor(network.clone());
        let source = PeriodicAppDataSource::with_period(APP_TICKS, &monitor, PERIOD, Counters);

        network.add_application(FakeApp::new("app-2", 1));
        assert_eq!(source.subjects(), vec![App::new("app-1"), App::new("app-2")]);

        source.shutdown().await.unwrap();
        monitor.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_account_source_samples_every_account() {
        let network = FakeNetwork::new();
        network.add_application(FakeApp::new("app-1", 3));
        let monitor = monitor(network.clone());
        let source =
            PeriodicAccountDataSource::with_period(ACCOUNT_IDS, &monitor, PERIOD, Counters);

        let app = App::new("app-1");
        let expected: Vec<Account> = (0..3).map(|id| Account::new(app.clone(), id)).collect();
        assert_eq!(source.subjects(), expected);

        tokio::time::sleep(Duration::from_millis(50)).await;
        source.shutdown().await.unwrap();

        let series = source.data(&Account::new(app, 2)).unwrap();
        assert!(!series.is_empty());
        assert!(series.get_all().iter().all(|p| p.value == 2));
        monitor.shutdown().await.unwrap();
    }
}
