// Chainwatch - Blockchain test-network monitoring
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

use super::PrometheusLogValue;
use crate::error::Result;
use async_trait::async_trait;

/// Retrieves the current metric values of one node.
#[async_trait]
pub trait PrometheusFetcher: Send + Sync {
    /// `metrics_url` is the base metrics address of the node.
    async fn fetch(&self, metrics_url: &str) -> Result<Vec<PrometheusLogValue>>;
}

/// Fetcher backed by a plain function, mostly for tests and embedders that
/// already hold the metrics in memory.
pub struct FnFetcher<F>(pub F);

#[async_trait]
impl<F> PrometheusFetcher for FnFetcher<F>
where
    F: Fn(&str) -> Result<Vec<PrometheusLogValue>> + Send + Sync,
{
    async fn fetch(&self, metrics_url: &str) -> Result<Vec<PrometheusLogValue>> {
        (self.0)(metrics_url)
    }
}

#[cfg(feature = "http")]
pub use http::HttpFetcher;

#[cfg(feature = "http")]
mod http {
    use super::*;
    use crate::config::MonitorConfig;
    use crate::prometheus::parse_prometheus_text;
    use tracing::warn;

    /// Scrapes `<metrics_url><path>` over HTTP.
    ///
    /// Lines that cannot be parsed are logged and dropped, the rest of the
    /// snapshot is kept.
    pub struct HttpFetcher {
        client: reqwest::Client,
        path: String,
    }

    impl HttpFetcher {
        pub fn new(path: impl Into<String>) -> Self {
            Self {
                client: reqwest::Client::new(),
                path: path.into(),
            }
        }

        pub fn from_config(config: &MonitorConfig) -> Self {
            Self::new(config.prometheus_path.clone())
        }

        fn url(&self, metrics_url: &str) -> String {
            format!("{}{}", metrics_url.trim_end_matches('/'), self.path)
        }
    }

    #[async_trait]
    impl PrometheusFetcher for HttpFetcher {
        async fn fetch(&self, metrics_url: &str) -> Result<Vec<PrometheusLogValue>> {
            let url = self.url(metrics_url);
            let text = self
                .client
                .get(&url)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;

            let (values, err) = parse_prometheus_text(&text);
            if let Some(err) = err {
                warn!(url = %url, error = %err, "Metrics snapshot partially parsed");
            }
            Ok(values)
        }
    }

}
