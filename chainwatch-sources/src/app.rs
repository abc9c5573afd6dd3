// Chainwatch Sources - Node, network, application and account metrics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Per-application metrics.

use crate::periodic::{AppSensorFactory, PeriodicAppDataSource};
use async_trait::async_trait;
use chainwatch::network::{
    Application, Network as ObservedNetwork, NetworkListener, TransactionCounts,
};
use chainwatch::{
    App, Metric, Monitor, MonitorError, Result, Sensor, Series, SeriesSource, Source, TimeSeries,
};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::debug;

pub const RECEIVED_TRANSACTIONS_PROGRESS: Metric<App, TimeSeries<u64>> = Metric::new(
    "ReceivedTransactionsProgress",
    "The number of transactions actually received by an application over time",
);

/// Series keyed by the number of sending accounts of the application.
pub type WorkerSeries = Arc<dyn Series<i64, u64>>;

pub const SENT_TRANSACTIONS: Metric<App, WorkerSeries> = Metric::new(
    "SentTransactions",
    "The number of transactions attempted to be sent to an application",
);

pub const RECEIVED_TRANSACTIONS: Metric<App, WorkerSeries> = Metric::new(
    "ReceivedTransactions",
    "The number of transactions actually received by an application",
);

// ============================================================================
// Received transactions over time
// ============================================================================

/// Reads the received transaction count of one application.
pub struct ReceivedTransactionsSensor {
    app: Arc<dyn Application>,
}

#[async_trait]
impl Sensor<u64> for ReceivedTransactionsSensor {
    async fn read_value(&self) -> Result<u64> {
        self.app.received_transactions().await
    }
}

pub struct ReceivedTransactionsSensorFactory;

impl AppSensorFactory<u64> for ReceivedTransactionsSensorFactory {
    fn create_sensor(&self, app: &Arc<dyn Application>) -> Result<Arc<dyn Sensor<u64>>> {
        Ok(Arc::new(ReceivedTransactionsSensor {
            app: Arc::clone(app),
        }))
    }
}

pub fn new_received_transactions_progress_source(
    monitor: &Arc<Monitor>,
) -> Arc<dyn Source<App, TimeSeries<u64>>> {
    PeriodicAppDataSource::new(
        RECEIVED_TRANSACTIONS_PROGRESS,
        monitor,
        ReceivedTransactionsSensorFactory,
    )
}

// ============================================================================
// Final counters
// ============================================================================

/// Captures one transaction counter per application when shut down.
///
/// The value is recorded at the application's account count, so runs with
/// different numbers of workers line up in one series.
pub struct TxsCounterSource {
    base: SeriesSource<App, i64, u64>,
    counter: fn(&TransactionCounts) -> u64,
    applications: Mutex<Vec<Arc<dyn Application>>>,
    network: Arc<dyn ObservedNetwork>,
    me: Weak<Self>,
}

impl TxsCounterSource {
    pub fn new(
        metric: Metric<App, WorkerSeries>,
        monitor: &Monitor,
        counter: fn(&TransactionCounts) -> u64,
    ) -> Arc<Self> {
        let network = Arc::clone(monitor.network());
        let source = Arc::new_cyclic(|me| Self {
            base: SeriesSource::new(metric),
            counter,
            applications: Mutex::new(Vec::new()),
            network: Arc::clone(&network),
            me: me.clone(),
        });

        network.register_listener(Arc::clone(&source) as Arc<dyn NetworkListener>);
        for app in network.active_applications() {
            source.after_application_creation(&app);
        }
        source
    }

    /// Applications whose counter is still to be captured.
    pub fn pending_applications(&self) -> usize {
        self.applications.lock().len()
    }
}

impl NetworkListener for TxsCounterSource {
    fn after_application_creation(&self, app: &Arc<dyn Application>) {
        self.applications.lock().push(Arc::clone(app));
    }
}

#[async_trait]
impl Source<App, WorkerSeries> for TxsCounterSource {
    fn metric(&self) -> Metric<App, WorkerSeries> {
        self.base.metric()
    }

    fn subjects(&self) -> Vec<App> {
        self.base.subjects()
    }

    fn data(&self, subject: &App) -> Option<WorkerSeries> {
        self.base.data(subject)
    }

    async fn shutdown(&self) -> Result<()> {
        if let Some(me) = self.me.upgrade() {
            self.network
                .unregister_listener(&(me as Arc<dyn NetworkListener>));
        }

        let applications: Vec<_> = self.applications.lock().drain(..).collect();
        let mut errors = Vec::new();
        for app in applications {
            let name = app.name();
            let counts = match app.transaction_counts().await {
                Ok(counts) => counts,
                Err(e) => {
                    errors.push(MonitorError::Sensor(format!("{}: {}", name, e)));
                    continue;
                }
            };
            let value = (self.counter)(&counts);
            let series = self.base.get_or_add_subject(App::new(name.as_str()));
            if let Err(e) = series.append(app.accounts() as i64, value) {
                errors.push(e);
            }
            debug!(metric = %self.base.metric().name(), app = %name, value, "Counter captured");
        }
        MonitorError::join(errors)
    }
}

pub fn new_sent_transactions_source(monitor: &Arc<Monitor>) -> Arc<dyn Source<App, WorkerSeries>> {
    TxsCounterSource::new(SENT_TRANSACTIONS, monitor, TransactionCounts::total_sent)
}

pub fn new_received_transactions_source(
    monitor: &Arc<Monitor>,
) -> Arc<dyn Source<App, WorkerSeries>> {
    TxsCounterSource::new(RECEIVED_TRANSACTIONS, monitor, |c| c.received)
}
