// Chainwatch Sources - Node, network, application and account metrics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Block height sampled over JSON-RPC.

use crate::periodic::{NodeSensorFactory, PeriodicNodeDataSource};
use async_trait::async_trait;
use chainwatch::network::NodeHandle;
use chainwatch::{
    Metric, Monitor, MonitorError, Node, ParseError, Result, Sensor, Source, TimeSeries,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub const NODE_BLOCK_HEIGHT: Metric<Node, TimeSeries<u64>> =
    Metric::new("NodeBlockHeight", "The block height of nodes at various times");

const RPC_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Parses a JSON-RPC quantity such as `0x1b4`.
pub fn parse_hex_quantity(text: &str) -> std::result::Result<u64, ParseError> {
    let digits = text.strip_prefix("0x").unwrap_or(text);
    u64::from_str_radix(digits, 16).map_err(|_| ParseError::InvalidNumber {
        field: "block number",
        value: text.to_string(),
    })
}

/// Reads `eth_blockNumber` from one node.
pub struct BlockHeightSensor {
    client: reqwest::Client,
    url: String,
}

impl BlockHeightSensor {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Sensor<u64> for BlockHeightSensor {
    async fn read_value(&self) -> Result<u64> {
        let request = json!({
            "jsonrpc": "2.0",
            "method": "eth_blockNumber",
            "params": [],
            "id": 1,
        });
        let response: RpcResponse = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(MonitorError::Sensor(format!(
                "eth_blockNumber failed ({}): {}",
                error.code, error.message
            )));
        }
        let result = response
            .result
            .ok_or(MonitorError::Parse(ParseError::MissingField("result")))?;
        Ok(parse_hex_quantity(&result)?)
    }
}

/// Creates a [`BlockHeightSensor`] for every node exposing an RPC service.
#[derive(Clone)]
pub struct BlockHeightSensorFactory {
    client: reqwest::Client,
}

impl BlockHeightSensorFactory {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder().timeout(RPC_TIMEOUT).build()?;
        Ok(Self { client })
    }
}

impl NodeSensorFactory<u64> for BlockHeightSensorFactory {
    fn create_sensor(&self, node: &Arc<dyn NodeHandle>) -> Result<Arc<dyn Sensor<u64>>> {
        let url = node.rpc_url().ok_or_else(|| {
            MonitorError::Sensor(format!("node {} does not export an RPC server", node.label()))
        })?;
        Ok(Arc::new(BlockHeightSensor::new(self.client.clone(), url)))
    }
}

pub fn new_node_block_height_source(
    monitor: &Arc<Monitor>,
    factory: BlockHeightSensorFactory,
) -> Arc<dyn Source<Node, TimeSeries<u64>>> {
    PeriodicNodeDataSource::new(NODE_BLOCK_HEIGHT, monitor, factory)
}
