// Chainwatch - Blockchain test-network monitoring
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! The monitor: one source per metric, plus the log pipelines feeding them.
//!
//! Sources are keyed by metric name. Each one keeps its `Subject`/value
//! types behind a type-erased entry, and lookups with a [`Metric`] of other
//! types fail with [`MonitorError::TypeMismatch`].
//!
//! Factories are listed in a [`SourceRegistry`] handed to the builder. They
//! are instantiated all at once with
//! [`Monitor::install_all_registered_sources`], or lazily on the first
//! lookup of their metric.
//!
//! # Example
//!
//! ```no_run
//! # use chainwatch::{Monitor, MonitorConfig, SourceRegistry};
//! # use chainwatch::network::Network;
//! # use std::sync::Arc;
//! # async fn run(network: Arc<dyn Network>) -> chainwatch::Result<()> {
//! let monitor = Monitor::builder(network, MonitorConfig::default())
//!     .registry(SourceRegistry::new())
//!     .build()?;
//! monitor.install_all_registered_sources()?;
//! // ... run the test scenario ...
//! monitor.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::logs::NodeLogDispatcher;
use crate::metric::Metric;
use crate::network::Network;
use crate::prometheus::{PrometheusFetcher, PrometheusLogDispatcher};
use crate::source::Source;
use crate::types::Subject;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

#[async_trait]
trait ErasedSource: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    async fn shutdown(&self) -> Result<()>;
}

struct Typed<S, T>(Arc<dyn Source<S, T>>);

#[async_trait]
impl<S: Subject, T: Send + Sync + 'static> ErasedSource for Typed<S, T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn shutdown(&self) -> Result<()> {
        self.0.shutdown().await
    }
}

type Factory = Arc<dyn Fn(&Arc<Monitor>) -> Arc<dyn ErasedSource> + Send + Sync>;

#[derive(Clone)]
struct Registration {
    type_id: TypeId,
    description: String,
    factory: Factory,
}

/// Factories of the sources a monitor may install, keyed by metric name.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    factories: BTreeMap<String, Registration>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the factory of a metric's source.
    ///
    /// Fails if a factory is already registered under the metric's name.
    pub fn register<S, T, F>(&mut self, metric: Metric<S, T>, factory: F) -> Result<()>
    where
        S: Subject,
        T: Send + Sync + 'static,
        F: Fn(&Arc<Monitor>) -> Arc<dyn Source<S, T>> + Send + Sync + 'static,
    {
        let name = metric.name().to_string();
        if self.factories.contains_key(&name) {
            return Err(MonitorError::MetricAlreadyRegistered(name));
        }
        let factory: Factory = Arc::new(move |monitor: &Arc<Monitor>| {
            Arc::new(Typed(factory(monitor))) as Arc<dyn ErasedSource>
        });
        self.factories.insert(
            name,
            Registration {
                type_id: TypeId::of::<Typed<S, T>>(),
                description: metric.description().to_string(),
                factory,
            },
        );
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered metric names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Description of a registered metric.
    pub fn description(&self, name: &str) -> Option<&str> {
        self.factories.get(name).map(|r| r.description.as_str())
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// Builder of [`Monitor`] instances.
pub struct MonitorBuilder {
    network: Arc<dyn Network>,
    config: MonitorConfig,
    registry: SourceRegistry,
    fetcher: Option<Arc<dyn PrometheusFetcher>>,
}

impl MonitorBuilder {
    pub fn registry(mut self, registry: SourceRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replaces the HTTP scraper of node metrics.
    pub fn prometheus_fetcher(mut self, fetcher: Arc<dyn PrometheusFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Starts the log pipelines and creates the monitor. No source is
    /// installed yet.
    ///
    /// Must be called within a Tokio runtime.
    pub fn build(self) -> Result<Arc<Monitor>> {
        self.config.validate()?;
        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => default_fetcher(&self.config)?,
        };

        let node_logs = NodeLogDispatcher::start(Arc::clone(&self.network), &self.config)?;
        let prometheus =
            PrometheusLogDispatcher::start(Arc::clone(&self.network), fetcher, &self.config)?;

        info!(metrics = self.registry.len(), "Monitor started");
        Ok(Arc::new_cyclic(|me| Monitor {
            network: self.network,
            config: self.config,
            node_logs,
            prometheus,
            registry: self.registry,
            sources: RwLock::new(HashMap::new()),
            me: me.clone(),
            shut_down: AtomicBool::new(false),
        }))
    }
}

#[cfg(feature = "http")]
fn default_fetcher(config: &MonitorConfig) -> Result<Arc<dyn PrometheusFetcher>> {
    Ok(Arc::new(crate::prometheus::HttpFetcher::from_config(config)))
}

#[cfg(not(feature = "http"))]
fn default_fetcher(_config: &MonitorConfig) -> Result<Arc<dyn PrometheusFetcher>> {
    Err(MonitorError::Config(
        "no prometheus fetcher configured and the http feature is disabled".into(),
    ))
}

/// Owner of every installed source and of the log pipelines of a test run.
///
/// Factories run while the monitor holds its source table. They must not
/// look up other metrics during construction; sources depending on other
/// metrics keep a `Weak<Monitor>` and resolve them on demand.
pub struct Monitor {
    network: Arc<dyn Network>,
    config: MonitorConfig,
    node_logs: Arc<NodeLogDispatcher>,
    prometheus: Arc<PrometheusLogDispatcher>,
    registry: SourceRegistry,
    sources: RwLock<HashMap<String, Arc<dyn ErasedSource>>>,
    me: Weak<Monitor>,
    shut_down: AtomicBool,
}

impl Monitor {
    pub fn builder(network: Arc<dyn Network>, config: MonitorConfig) -> MonitorBuilder {
        MonitorBuilder {
            network,
            config,
            registry: SourceRegistry::new(),
            fetcher: None,
        }
    }

    pub fn network(&self) -> &Arc<dyn Network> {
        &self.network
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn node_log_provider(&self) -> Arc<NodeLogDispatcher> {
        Arc::clone(&self.node_logs)
    }

    pub fn prometheus_log_provider(&self) -> Arc<PrometheusLogDispatcher> {
        Arc::clone(&self.prometheus)
    }

    /// Installs a source created outside the registry.
    pub fn install_source<S, T>(&self, source: Arc<dyn Source<S, T>>) -> Result<()>
    where
        S: Subject,
        T: Send + Sync + 'static,
    {
        if self.is_shut_down() {
            return Err(MonitorError::ShutDown);
        }
        let name = source.metric().name().to_string();
        let mut sources = self.sources.write();
        if sources.contains_key(&name) {
            return Err(MonitorError::MetricAlreadyRegistered(name));
        }
        debug!(metric = %name, "Source installed");
        sources.insert(name, Arc::new(Typed(source)));
        Ok(())
    }

    /// Instantiates every registered factory not installed yet.
    pub fn install_all_registered_sources(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(MonitorError::ShutDown);
        }
        let monitor = self.strong()?;
        let mut sources = self.sources.write();
        for (name, registration) in &self.registry.factories {
            if !sources.contains_key(name) {
                debug!(metric = %name, "Source installed");
                sources.insert(name.clone(), (registration.factory)(&monitor));
            }
        }
        Ok(())
    }

    /// Whether a source is installed or registered for the metric.
    pub fn is_supported(&self, name: &str) -> bool {
        self.sources.read().contains_key(name) || self.registry.contains(name)
    }

    /// Names of the installed metrics, sorted.
    pub fn installed_metrics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Source of a metric, installing a registered one on first use.
    pub fn get_source<S, T>(&self, metric: &Metric<S, T>) -> Result<Arc<dyn Source<S, T>>>
    where
        S: Subject,
        T: Send + Sync + 'static,
    {
        self.lookup(metric)?
            .ok_or_else(|| MonitorError::MetricNotSupported(metric.name().to_string()))
    }

    /// Subjects with data for the metric. An unsupported metric has none.
    pub fn get_subjects<S, T>(&self, metric: &Metric<S, T>) -> Result<Vec<S>>
    where
        S: Subject,
        T: Send + Sync + 'static,
    {
        Ok(self
            .lookup(metric)?
            .map(|source| source.subjects())
            .unwrap_or_default())
    }

    /// Data of one subject of the metric, if any.
    pub fn get_data<S, T>(&self, metric: &Metric<S, T>, subject: &S) -> Result<Option<T>>
    where
        S: Subject,
        T: Send + Sync + 'static,
    {
        Ok(self.lookup(metric)?.and_then(|source| source.data(subject)))
    }

    /// Shuts down every source, then the log pipelines.
    ///
    /// Sources stay readable afterwards. Calling it again is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut installed: Vec<(String, Arc<dyn ErasedSource>)> = self
            .sources
            .read()
            .iter()
            .map(|(name, source)| (name.clone(), Arc::clone(source)))
            .collect();
        installed.sort_by(|a, b| a.0.cmp(&b.0));

        let mut errors = Vec::new();
        for (name, source) in installed {
            if let Err(err) = source.shutdown().await {
                warn!(metric = %name, error = %err, "Source shutdown failed");
                errors.push(err);
            }
        }

        self.node_logs.shutdown().await;
        self.prometheus.shutdown().await;
        info!(errors = errors.len(), "Monitor stopped");
        MonitorError::join(errors)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn strong(&self) -> Result<Arc<Monitor>> {
        self.me.upgrade().ok_or(MonitorError::ShutDown)
    }

    fn lookup<S, T>(&self, metric: &Metric<S, T>) -> Result<Option<Arc<dyn Source<S, T>>>>
    where
        S: Subject,
        T: Send + Sync + 'static,
    {
        let name = metric.name();
        let installed = self.sources.read().get(name).cloned();
        let erased = match installed {
            Some(erased) => erased,
            None => match self.install_registered(name, TypeId::of::<Typed<S, T>>())? {
                Some(erased) => erased,
                None => return Ok(None),
            },
        };

        erased
            .as_any()
            .downcast_ref::<Typed<S, T>>()
            .map(|typed| Some(Arc::clone(&typed.0)))
            .ok_or_else(|| MonitorError::TypeMismatch {
                metric: name.to_string(),
            })
    }

    fn install_registered(
        &self,
        name: &str,
        type_id: TypeId,
    ) -> Result<Option<Arc<dyn ErasedSource>>> {
        let registration = match self.registry.factories.get(name) {
            Some(registration) => registration,
            None => return Ok(None),
        };
        if registration.type_id != type_id {
            return Err(MonitorError::TypeMismatch {
                metric: name.to_string(),
            });
        }
        if self.is_shut_down() {
            return Ok(None);
        }

        let monitor = self.strong()?;
        let mut sources = self.sources.write();
        // another caller may have won the race
        if let Some(existing) = sources.get(name) {
            return Ok(Some(Arc::clone(existing)));
        }
        debug!(metric = %name, "Source installed on first use");
        let source = (registration.factory)(&monitor);
        sources.insert(name.to_string(), Arc::clone(&source));
        Ok(Some(source))
    }
}
