// Chainwatch - Blockchain test-network monitoring
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

use super::parser::{is_block_line, parse_block};
use super::{LogListener, NodeLogProvider};
use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::network::{same_instance, LogStream, Network, NetworkListener, NodeHandle};
use crate::types::Node;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type Listeners = Arc<Mutex<Vec<Arc<dyn LogListener>>>>;

/// Reads the logs of every node of the network and fans parsed blocks out
/// to registered listeners.
///
/// Nodes running at construction time are picked up immediately, later
/// ones through network notifications. When a log directory is configured
/// each node's raw log is also copied to `<dir>/node_logs/<label>.log`.
pub struct NodeLogDispatcher {
    network: Arc<dyn Network>,
    me: Weak<NodeLogDispatcher>,
    runtime: Handle,
    nodes: Mutex<HashSet<Node>>,
    listeners: Listeners,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    token: CancellationToken,
    log_dir: Option<PathBuf>,
    shut_down: AtomicBool,
}

impl NodeLogDispatcher {
    /// Creates the dispatcher and starts following the active nodes.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(network: Arc<dyn Network>, config: &MonitorConfig) -> Result<Arc<Self>> {
        let runtime = Handle::try_current()
            .map_err(|e| MonitorError::Config(format!("no async runtime: {}", e)))?;

        let log_dir = match &config.node_log_dir {
            Some(dir) => {
                let dir = dir.join("node_logs");
                std::fs::create_dir_all(&dir)?;
                Some(dir)
            }
            None => None,
        };

        let dispatcher = Arc::new_cyclic(|me| Self {
            network: Arc::clone(&network),
            me: me.clone(),
            runtime,
            nodes: Mutex::new(HashSet::new()),
            listeners: Arc::new(Mutex::new(Vec::new())),
            tasks: Mutex::new(Vec::new()),
            token: CancellationToken::new(),
            log_dir,
            shut_down: AtomicBool::new(false),
        });

        network.register_listener(Arc::clone(&dispatcher) as Arc<dyn NetworkListener>);
        for node in network.active_nodes() {
            dispatcher.after_node_creation(&node);
        }

        Ok(dispatcher)
    }

    /// Nodes whose logs are being followed, sorted.
    pub fn nodes(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.nodes.lock().iter().cloned().collect();
        nodes.sort();
        nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Waits until every log stream opened so far has been read to its end.
    pub async fn wait_for_logs_to_be_consumed(&self) {
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "Log task failed");
            }
        }
    }

    /// Stops reading logs and closes all streams.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(me) = self.me.upgrade() {
            self.network
                .unregister_listener(&(me as Arc<dyn NetworkListener>));
        }
        self.token.cancel();
        self.wait_for_logs_to_be_consumed().await;
        debug!("Node log dispatcher stopped");
    }

    fn spawn(&self, task: impl std::future::Future<Output = ()> + Send + 'static) {
        let handle = self.runtime.spawn(task);
        self.tasks.lock().push(handle);
    }
}

impl NodeLogProvider for NodeLogDispatcher {
    fn register_log_listener(&self, listener: Arc<dyn LogListener>) {
        self.listeners.lock().push(listener);
    }

    fn unregister_log_listener(&self, listener: &Arc<dyn LogListener>) {
        self.listeners.lock().retain(|l| !same_instance(l, listener));
    }
}

impl NetworkListener for NodeLogDispatcher {
    fn after_node_creation(&self, handle: &Arc<dyn NodeHandle>) {
        if self.shut_down.load(Ordering::SeqCst) {
            return;
        }
        let node = Node::new(handle.label());
        let mut nodes = self.nodes.lock();
        if nodes.contains(&node) {
            return;
        }

        if let Some(dir) = &self.log_dir {
            let path = dir.join(format!("{}.log", node.label()));
            match handle.stream_log() {
                Ok(stream) => self.spawn(capture_log(node.clone(), stream, path, self.token.clone())),
                Err(err) => warn!(node = %node, error = %err, "Log of node is not captured"),
            }
        }

        let stream = match handle.stream_log() {
            Ok(stream) => stream,
            Err(err) => {
                warn!(node = %node, error = %err, "Failed to obtain node log, blocks will not be tracked");
                return;
            }
        };
        info!(node = %node, "Following node log");
        self.spawn(dispatch_blocks(
            node.clone(),
            stream,
            Arc::clone(&self.listeners),
            self.token.clone(),
        ));
        nodes.insert(node);
    }

    fn after_node_removal(&self, handle: &Arc<dyn NodeHandle>) {
        self.nodes.lock().remove(&Node::new(handle.label()));
    }
}

async fn dispatch_blocks(
    node: Node,
    stream: LogStream,
    listeners: Listeners,
    token: CancellationToken,
) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            read = reader.read_until(b'\n', &mut buf) => read,
        };
        match read {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                warn!(node = %node, error = %err, "Reading node log failed");
                break;
            }
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        if !is_block_line(line) {
            continue;
        }
        match parse_block(line) {
            Ok(block) => {
                // held for one block: a slow listener delays all others
                let listeners = listeners.lock();
                for listener in listeners.iter() {
                    listener.on_block(&node, &block);
                }
            }
            Err(err) => warn!(node = %node, error = %err, "Skipping malformed block line"),
        }
    }
    debug!(node = %node, "Node log closed");
}

async fn capture_log(node: Node, mut stream: LogStream, path: PathBuf, token: CancellationToken) {
    let mut file = match tokio::fs::File::create(&path).await {
        Ok(file) => file,
        Err(err) => {
            warn!(node = %node, path = %path.display(), error = %err, "Cannot create node log file");
            return;
        }
    };
    tokio::select! {
        _ = token.cancelled() => {}
        copied = tokio::io::copy(&mut stream, &mut file) => {
            if let Err(err) = copied {
                warn!(node = %node, error = %err, "Failed to capture node log");
            }
        }
    }
    if let Err(err) = file.flush().await {
        warn!(node = %node, error = %err, "Failed to flush node log");
    }
}
