// Chainwatch - Blockchain test-network monitoring
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! In-memory network, node and application fakes for tests.

use crate::error::{MonitorError, Result};
use crate::network::{
    same_instance, Application, LogStream, Network, NetworkListener, NodeHandle, TransactionCounts,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Network whose nodes and applications are added by the test.
#[derive(Default)]
pub struct FakeNetwork {
    nodes: Mutex<Vec<Arc<dyn NodeHandle>>>,
    apps: Mutex<Vec<Arc<dyn Application>>>,
    listeners: Mutex<Vec<Arc<dyn NetworkListener>>>,
}

impl FakeNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_nodes(nodes: Vec<Arc<dyn NodeHandle>>) -> Arc<Self> {
        let network = Self::default();
        *network.nodes.lock() = nodes;
        Arc::new(network)
    }

    /// Adds a node and notifies listeners.
    pub fn add_node(&self, node: Arc<dyn NodeHandle>) {
        self.nodes.lock().push(Arc::clone(&node));
        for listener in self.listeners() {
            listener.after_node_creation(&node);
        }
    }

    /// Removes a node by label and notifies listeners.
    pub fn remove_node(&self, label: &str) {
        let removed: Vec<_> = {
            let mut nodes = self.nodes.lock();
            let (removed, kept) = nodes.drain(..).partition(|n| n.label() == label);
            *nodes = kept;
            removed
        };
        for node in removed {
            for listener in self.listeners() {
                listener.after_node_removal(&node);
            }
        }
    }

    /// Adds an application and notifies listeners.
    pub fn add_application(&self, app: Arc<dyn Application>) {
        self.apps.lock().push(Arc::clone(&app));
        for listener in self.listeners() {
            listener.after_application_creation(&app);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    fn listeners(&self) -> Vec<Arc<dyn NetworkListener>> {
        self.listeners.lock().clone()
    }
}

impl Network for FakeNetwork {
    fn register_listener(&self, listener: Arc<dyn NetworkListener>) {
        self.listeners.lock().push(listener);
    }

    fn unregister_listener(&self, listener: &Arc<dyn NetworkListener>) {
        self.listeners.lock().retain(|l| !same_instance(l, listener));
    }

    fn active_nodes(&self) -> Vec<Arc<dyn NodeHandle>> {
        self.nodes.lock().clone()
    }

    fn active_applications(&self) -> Vec<Arc<dyn Application>> {
        self.apps.lock().clone()
    }
}

/// Node serving a fixed log and optional service URLs.
pub struct FakeNode {
    label: String,
    log: Vec<u8>,
    metrics_url: Option<String>,
    rpc_url: Option<String>,
    streams: AtomicUsize,
}

impl FakeNode {
    pub fn new(label: &str, log: &str) -> Arc<Self> {
        Self::from_bytes(label, log.as_bytes())
    }

    /// Node whose log is not necessarily valid UTF-8.
    pub fn from_bytes(label: &str, log: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            log: log.to_vec(),
            metrics_url: None,
            rpc_url: None,
            streams: AtomicUsize::new(0),
        })
    }

    pub fn with_urls(label: &str, metrics_url: Option<&str>, rpc_url: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            log: Vec::new(),
            metrics_url: metrics_url.map(str::to_string),
            rpc_url: rpc_url.map(str::to_string),
            streams: AtomicUsize::new(0),
        })
    }

    /// Number of log streams opened so far.
    pub fn streams_opened(&self) -> usize {
        self.streams.load(Ordering::SeqCst)
    }
}

impl NodeHandle for FakeNode {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn stream_log(&self) -> Result<LogStream> {
        self.streams.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Cursor::new(self.log.clone())))
    }

    fn metrics_url(&self) -> Option<String> {
        self.metrics_url.clone()
    }

    fn rpc_url(&self) -> Option<String> {
        self.rpc_url.clone()
    }
}

/// Application with settable transaction counters.
pub struct FakeApp {
    name: String,
    counts: Mutex<TransactionCounts>,
    failing: bool,
}

impl FakeApp {
    pub fn new(name: &str, accounts: usize) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            counts: Mutex::new(TransactionCounts {
                sent: vec![0; accounts],
                received: 0,
            }),
            failing: false,
        })
    }

    /// Application whose counter queries always fail.
    pub fn failing(name: &str, accounts: usize) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            counts: Mutex::new(TransactionCounts {
                sent: vec![0; accounts],
                received: 0,
            }),
            failing: true,
        })
    }

    pub fn set_counts(&self, sent: Vec<u64>, received: u64) {
        *self.counts.lock() = TransactionCounts { sent, received };
    }
}

#[async_trait]
impl Application for FakeApp {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn accounts(&self) -> usize {
        self.counts.lock().sent.len()
    }

    async fn received_transactions(&self) -> Result<u64> {
        if self.failing {
            return Err(MonitorError::Sensor(format!("{} is unreachable", self.name)));
        }
        Ok(self.counts.lock().received)
    }

    async fn transaction_counts(&self) -> Result<TransactionCounts> {
        if self.failing {
            return Err(MonitorError::Sensor(format!("{} is unreachable", self.name)));
        }
        Ok(self.counts.lock().clone())
    }
}

/// Log lines of three blocks, as written by a node.
pub const NODE1_TEST_LOG: &str = "INFO [05-04|09:34:15.080] New block      index=1 id=2:1:247c79       gas_used=11 txs=10/0 base_fee=1 gas_rate=1.23 age=7.392s t=\"711.334µs\" \n\
INFO [05-04|09:34:15.537] New block      index=2 id=3:1:3d6fb6       gas_used=22 txs=20/0 base_fee=2 gas_rate=2.31 age=343.255ms t=1.579ms \n\
INFO [05-04|09:34:16.027] New block      index=3 id=3:4:9bb789       gas_used=33 txs=30/0 base_fee=3 gas_rate=3.12 age=380.470ms t=1.540ms \n";

/// Log lines of two blocks of a second node.
pub const NODE2_TEST_LOG: &str = "INFO [05-04|09:34:16.512] New block      index=1 id=2:1:247c79       gas_used=11 base_fee=1 gas_rate=3.4 txs=10/0 age=7.392s t=4.686ms \n\
INFO [05-04|09:34:17.003] New block      index=2 id=3:1:3d6fb6       gas_used=22 base_fee=2 gas_rate=5 txs=20/0 age=343.255ms t=2.579ms \n";

/// Log line of a single block of a third node.
pub const NODE3_TEST_LOG: &str = "INFO [05-04|09:38:15.080] New block      index=1 id=2:1:247c79       gas_used=11 base_fee=1 gas_rate=2.34 txs=10/0 age=7.392s t=5.686ms \n";
