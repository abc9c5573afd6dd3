// Chainwatch Sources - Node, network, application and account metrics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Chainwatch Sources
//!
//! The metrics a Chainwatch monitor records about a test network, and the
//! sources producing them.
//!
//! ## Metrics
//!
//! | Subject | Metric | Series |
//! |---------|--------|--------|
//! | Node | `BlockCompletionTime` | block → time |
//! | Node | `BlockEventAndTxsProcessingTime` | block → duration |
//! | Node | `TransactionsThroughput` | block → transactions/s |
//! | Node | `TransactionsThroughputSMA_<n>` | block → transactions/s |
//! | Node | `NodeBlockHeight` | time → height |
//! | Network | `BlockNumberOfTransactions` | block → count |
//! | Network | `BlockGasUsed` | block → gas |
//! | Network | `NumberOfNodes` | time → count |
//! | App | `ReceivedTransactionsProgress` | time → count |
//! | App | `SentTransactions`, `ReceivedTransactions` | accounts → count |
//! | Account | `AccountSentTransactions` | time → count |
//!
//! Prometheus metrics are recorded per key with [`node::PromLogSource`].
//!
//! ## Quick Start
//!
//! ```no_run
//! # use chainwatch::{Monitor, MonitorConfig};
//! # use chainwatch::network::Network;
//! # use std::sync::Arc;
//! # async fn run(network: Arc<dyn Network>) -> chainwatch::Result<()> {
//! use chainwatch_sources::{default_registry, node::TRANSACTIONS_THROUGHPUT};
//!
//! let config = MonitorConfig::default();
//! let monitor = Monitor::builder(network, config.clone())
//!     .registry(default_registry(&config)?)
//!     .build()?;
//! monitor.install_all_registered_sources()?;
//! // ... run the scenario ...
//! monitor.shutdown().await?;
//! let nodes = monitor.get_subjects(&TRANSACTIONS_THROUGHPUT)?;
//! # Ok(())
//! # }
//! ```

// Modules
pub mod account;
pub mod app;
pub mod network;
pub mod node;
pub mod periodic;
#[cfg(feature = "http")]
pub mod rpc;

// Re-exports for convenient access
pub use periodic::{
    AccountSensorFactory, AppSensorFactory, NodeSensorFactory, PeriodicAccountDataSource,
    PeriodicAppDataSource, PeriodicNodeDataSource,
};

use chainwatch::{MonitorConfig, Result, SourceRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Registry of every metric of this crate.
///
/// One moving average of the throughput is registered per period of
/// `config.sma_periods`. The block height over JSON-RPC needs the `http`
/// feature.
pub fn default_registry(config: &MonitorConfig) -> Result<SourceRegistry> {
    let mut registry = SourceRegistry::new();

    registry.register(node::BLOCK_COMPLETION_TIME, node::new_block_completion_time_source)?;
    registry.register(
        node::BLOCK_EVENT_AND_TXS_PROCESSING_TIME,
        node::new_block_processing_time_source,
    )?;
    registry.register(
        node::TRANSACTIONS_THROUGHPUT,
        node::new_transactions_throughput_source,
    )?;
    for &period in &config.sma_periods {
        registry.register(node::transactions_throughput_sma(period), move |monitor| {
            node::new_throughput_sma_source(monitor, period)
        })?;
    }

    #[cfg(feature = "http")]
    {
        let factory = rpc::BlockHeightSensorFactory::new()?;
        registry.register(rpc::NODE_BLOCK_HEIGHT, move |monitor| {
            rpc::new_node_block_height_source(monitor, factory.clone())
        })?;
    }

    registry.register(
        network::BLOCK_NUMBER_OF_TRANSACTIONS,
        network::new_number_of_transactions_source,
    )?;
    registry.register(network::BLOCK_GAS_USED, network::new_gas_used_source)?;
    registry.register(network::NUMBER_OF_NODES, network::new_number_of_nodes_source)?;

    registry.register(
        app::RECEIVED_TRANSACTIONS_PROGRESS,
        app::new_received_transactions_progress_source,
    )?;
    registry.register(app::SENT_TRANSACTIONS, app::new_sent_transactions_source)?;
    registry.register(app::RECEIVED_TRANSACTIONS, app::new_received_transactions_source)?;

    registry.register(
        account::ACCOUNT_SENT_TRANSACTIONS,
        account::new_account_sent_transactions_source,
    )?;

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_default_registry_names() {
        let registry = default_registry(&MonitorConfig::default()).unwrap();
        for name in [
            "BlockCompletionTime",
            "BlockEventAndTxsProcessingTime",
            "TransactionsThroughput",
            "TransactionsThroughputSMA_10",
            "TransactionsThroughputSMA_100",
            "TransactionsThroughputSMA_1000",
            "BlockNumberOfTransactions",
            "BlockGasUsed",
            "NumberOfNodes",
            "ReceivedTransactionsProgress",
            "SentTransactions",
            "ReceivedTransactions",
            "AccountSentTransactions",
        ] {
            assert!(registry.contains(name), "{} is not registered", name);
        }
        #[cfg(feature = "http")]
        assert!(registry.contains("NodeBlockHeight"));
    }

    #[test]
    fn test_sma_periods_follow_config() {
        let config = MonitorConfig {
            sma_periods: vec![5],
            ..Default::default()
        };
        let registry = default_registry(&config).unwrap();
        assert!(registry.contains("TransactionsThroughputSMA_5"));
        assert!(!registry.contains("TransactionsThroughputSMA_10"));
    }

    #[test]
    fn test_duplicate_sma_period_is_rejected() {
        let config = MonitorConfig {
            sma_periods: vec![10, 10],
            ..Default::default()
        };
        assert!(default_registry(&config).is_err());
    }
}
