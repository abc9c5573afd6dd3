// Chainwatch Sources - Node, network, application and account metrics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Per-account metrics.

use crate::periodic::{AccountSensorFactory, PeriodicAccountDataSource};
use async_trait::async_trait;
use chainwatch::network::Application;
use chainwatch::{Account, Metric, Monitor, Result, Sensor, Source, TimeSeries};
use std::sync::Arc;

pub const ACCOUNT_SENT_TRANSACTIONS: Metric<Account, TimeSeries<u64>> = Metric::new(
    "AccountSentTransactions",
    "The number of transactions attempted to be sent by an account",
);

/// Reads the sent transaction count of one account.
///
/// An account the application does not report reads 0.
pub struct SentTransactionsSensor {
    app: Arc<dyn Application>,
    account: usize,
}

#[async_trait]
impl Sensor<u64> for SentTransactionsSensor {
    async fn read_value(&self) -> Result<u64> {
        let counts = self.app.transaction_counts().await?;
        Ok(counts.sent.get(self.account).copied().unwrap_or(0))
    }
}

pub struct SentTransactionsSensorFactory;

impl AccountSensorFactory<u64> for SentTransactionsSensorFactory {
    fn create_sensor(
        &self,
        app: &Arc<dyn Application>,
        account: usize,
    ) -> Result<Arc<dyn Sensor<u64>>> {
        Ok(Arc::new(SentTransactionsSensor {
            app: Arc::clone(app),
            account,
        }))
    }
}

pub fn new_account_sent_transactions_source(
    monitor: &Arc<Monitor>,
) -> Arc<dyn Source<Account, TimeSeries<u64>>> {
    PeriodicAccountDataSource::new(ACCOUNT_SENT_TRANSACTIONS, monitor, SentTransactionsSensorFactory)
}
