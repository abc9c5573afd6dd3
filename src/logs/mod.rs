// Chainwatch - Blockchain test-network monitoring
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Block events parsed from node logs.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────┐  log lines  ┌──────────────┐  Block  ┌──────────────┐
//! │ Node A │────────────▶│  task per    │────────▶│  listener 1  │
//! ├────────┤             │  node: parse │         ├──────────────┤
//! │ Node B │────────────▶│  + dispatch  │────────▶│  listener N  │
//! └────────┘             └──────────────┘         └──────────────┘
//! ```

mod dispatcher;
mod parser;

pub use dispatcher::NodeLogDispatcher;
pub use parser::{is_block_line, parse_block, parse_duration, parse_time, BLOCK_LINE_MARKER};

use crate::types::{BlockNumber, Node, Time};
use std::sync::Arc;
use std::time::Duration;

/// A block reported by a node.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub height: BlockNumber,
    /// Completion time as logged by the node
    pub time: Time,
    /// Number of transactions in the block
    pub txs: u64,
    pub gas_used: u64,
    /// Time the node spent processing the block
    pub processing_time: Duration,
    pub gas_base_fee: Option<u64>,
    /// Gas processed per second
    pub gas_rate: Option<f64>,
}

/// Receives every block reported by any node.
///
/// Listeners are called one after another while the dispatcher holds its
/// listener lock, so `on_block` must return quickly.
pub trait LogListener: Send + Sync {
    fn on_block(&self, node: &Node, block: &Block);
}

/// Registry of block listeners.
pub trait NodeLogProvider: Send + Sync {
    fn register_log_listener(&self, listener: Arc<dyn LogListener>);

    fn unregister_log_listener(&self, listener: &Arc<dyn LogListener>);
}
