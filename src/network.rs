// Chainwatch - Blockchain test-network monitoring
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Interfaces of the observed network.
//!
//! Node lifecycle, log streaming and applications are owned by the test
//! driver. The monitor only sees them through these traits.

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::AsyncRead;

/// Continuous byte stream of a node's log output.
pub type LogStream = Box<dyn AsyncRead + Send + Unpin>;

/// A running node of the network.
pub trait NodeHandle: Send + Sync {
    /// Unique label of the node.
    fn label(&self) -> String;

    /// Opens a new stream of the node's log, starting from its beginning.
    fn stream_log(&self) -> Result<LogStream>;

    /// Base URL of the node's debug/metrics service.
    fn metrics_url(&self) -> Option<String>;

    /// URL of the node's JSON-RPC service.
    fn rpc_url(&self) -> Option<String>;
}

/// Transaction counters of an application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionCounts {
    /// Sent transactions, one entry per account.
    pub sent: Vec<u64>,
    /// Transactions observed as received by the application.
    pub received: u64,
}

impl TransactionCounts {
    pub fn total_sent(&self) -> u64 {
        self.sent.iter().sum()
    }
}

/// An application generating load on the network.
#[async_trait]
pub trait Application: Send + Sync {
    fn name(&self) -> String;

    /// Number of sending accounts.
    fn accounts(&self) -> usize;

    async fn received_transactions(&self) -> Result<u64>;

    async fn transaction_counts(&self) -> Result<TransactionCounts>;
}

/// Notifications about network changes.
pub trait NetworkListener: Send + Sync {
    fn after_node_creation(&self, _node: &Arc<dyn NodeHandle>) {}

    fn after_node_removal(&self, _node: &Arc<dyn NodeHandle>) {}

    fn after_application_creation(&self, _app: &Arc<dyn Application>) {}
}

/// The observed network.
pub trait Network: Send + Sync {
    fn register_listener(&self, listener: Arc<dyn NetworkListener>);

    fn unregister_listener(&self, listener: &Arc<dyn NetworkListener>);

    fn active_nodes(&self) -> Vec<Arc<dyn NodeHandle>>;

    fn active_applications(&self) -> Vec<Arc<dyn Application>>;
}

/// Whether two shared trait objects point to the same instance.
pub fn same_instance<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quiet;
    impl NetworkListener for Quiet {}

    #[test]
    fn test_same_instance() {
        let a: Arc<dyn NetworkListener> = Arc::new(Quiet);
        let b = Arc::clone(&a);
        let c: Arc<dyn NetworkListener> = Arc::new(Quiet);
        assert!(same_instance(&a, &b));
        assert!(!same_instance(&a, &c));
    }

    #[test]
    fn test_total_sent() {
        let counts = TransactionCounts {
            sent: vec![1, 2, 3],
            received: 4,
        };
        assert_eq!(counts.total_sent(), 6);
    }
}
