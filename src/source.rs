// Chainwatch - Blockchain test-network monitoring
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Data sources.
//!
//! A [`Source`] produces data for one [`Metric`] and keeps one value (usually
//! a series) per subject. Subjects appear the first time data arrives for
//! them and are never removed from [`Source::subjects`].

use crate::error::{MonitorError, Result};
use crate::metric::Metric;
use crate::series::{Series, SyncedSeries};
use crate::types::{Key, Subject, Value};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Component producing data of one metric for a set of subjects.
#[async_trait]
pub trait Source<S: Subject, T>: Send + Sync {
    /// The metric this source produces.
    fn metric(&self) -> Metric<S, T>;

    /// Every subject data was recorded for, sorted.
    fn subjects(&self) -> Vec<S>;

    /// Data of one subject.
    fn data(&self, subject: &S) -> Option<T>;

    /// Stops producing data. Accumulated failures are reported here.
    async fn shutdown(&self) -> Result<()>;
}

/// Reusable per-subject series storage backing most sources.
pub struct SeriesSource<S, K, V> {
    metric: Metric<S, Arc<dyn Series<K, V>>>,
    series: Mutex<BTreeMap<S, Arc<SyncedSeries<K, V>>>>,
}

impl<S: Subject, K: Key, V: Value> SeriesSource<S, K, V> {
    pub fn new(metric: Metric<S, Arc<dyn Series<K, V>>>) -> Self {
        Self {
            metric,
            series: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn metric(&self) -> Metric<S, Arc<dyn Series<K, V>>> {
        self.metric.clone()
    }

    /// Creates the series of a new subject.
    pub fn new_subject(&self, subject: S) -> Result<Arc<SyncedSeries<K, V>>> {
        let mut series = self.series.lock();
        if series.contains_key(&subject) {
            return Err(MonitorError::SubjectAlreadyExists(subject.to_string()));
        }
        let created = Arc::new(SyncedSeries::new());
        series.insert(subject, Arc::clone(&created));
        Ok(created)
    }

    /// Series of the subject, created on first use.
    pub fn get_or_add_subject(&self, subject: S) -> Arc<SyncedSeries<K, V>> {
        Arc::clone(
            self.series
                .lock()
                .entry(subject)
                .or_insert_with(|| Arc::new(SyncedSeries::new())),
        )
    }

    pub fn contains(&self, subject: &S) -> bool {
        self.series.lock().contains_key(subject)
    }

    pub fn subjects(&self) -> Vec<S> {
        self.series.lock().keys().cloned().collect()
    }

    pub fn data(&self, subject: &S) -> Option<Arc<dyn Series<K, V>>> {
        self.series
            .lock()
            .get(subject)
            .map(|s| Arc::clone(s) as Arc<dyn Series<K, V>>)
    }
}

#[async_trait]
impl<S: Subject, K: Key, V: Value> Source<S, Arc<dyn Series<K, V>>> for SeriesSource<S, K, V> {
    fn metric(&self) -> Metric<S, Arc<dyn Series<K, V>>> {
        SeriesSource::metric(self)
    }

    fn subjects(&self) -> Vec<S> {
        SeriesSource::subjects(self)
    }

    fn data(&self, subject: &S) -> Option<Arc<dyn Series<K, V>>> {
        SeriesSource::data(self, subject)
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
