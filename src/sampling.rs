// Chainwatch - Blockchain test-network monitoring
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Periodic sampling of per-subject sensors.
//!
//! [`PeriodicDataSource`] runs one task per subject. Each task waits a random
//! offset within one period, so that subjects added together do not poll in
//! lock-step, and then reads its [`Sensor`] on every tick, appending
//! `(now, value)` to the subject's series.
//!
//! Read failures never stop a task. They are collected and returned when the
//! subject is removed or the source is shut down.

use crate::error::{MonitorError, Result};
use crate::metric::Metric;
use crate::series::{Series, SyncedSeries};
use crate::source::{SeriesSource, Source};
use crate::types::{Subject, Time, Value};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A pollable probe returning one value per read.
#[async_trait]
pub trait Sensor<T>: Send + Sync {
    async fn read_value(&self) -> Result<T>;
}

struct SamplingTask {
    token: CancellationToken,
    handle: JoinHandle<Vec<MonitorError>>,
}

/// Source sampling one sensor per subject at a fixed period.
pub struct PeriodicDataSource<S, T> {
    base: SeriesSource<S, Time, T>,
    period: Duration,
    root: CancellationToken,
    tasks: Mutex<HashMap<S, SamplingTask>>,
    retired: Mutex<Vec<JoinHandle<Vec<MonitorError>>>>,
    shut_down: AtomicBool,
}

impl<S: Subject, T: Value> PeriodicDataSource<S, T> {
    pub fn new(metric: Metric<S, Arc<dyn Series<Time, T>>>, period: Duration) -> Self {
        Self {
            base: SeriesSource::new(metric),
            period: period.max(Duration::from_nanos(1)),
            root: CancellationToken::new(),
            tasks: Mutex::new(HashMap::new()),
            retired: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Starts sampling `sensor` for a new subject.
    ///
    /// Must be called within a Tokio runtime.
    pub fn add_subject(&self, subject: S, sensor: Arc<dyn Sensor<T>>) -> Result<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(MonitorError::ShutDown);
        }
        let series = self.base.new_subject(subject.clone())?;
        let token = self.root.child_token();
        let offset = random_offset(self.period);
        let handle = tokio::spawn(sample(
            sensor,
            series,
            self.period,
            offset,
            token.clone(),
        ));

        debug!(
            metric = %self.base.metric().name(),
            subject = %subject,
            offset_ms = offset.as_millis() as u64,
            "Sampling started"
        );
        self.tasks.lock().insert(subject, SamplingTask { token, handle });
        Ok(())
    }

    /// Stops sampling one subject and returns the errors its sensor produced.
    ///
    /// The subject's data stays available. Unknown subjects are ignored.
    pub async fn remove_subject(&self, subject: &S) -> Result<()> {
        let task = self.tasks.lock().remove(subject);
        match task {
            Some(task) => {
                task.token.cancel();
                MonitorError::join(join_task(task.handle).await)
            }
            None => Ok(()),
        }
    }

    /// Stops sampling one subject without waiting for the task to finish.
    ///
    /// Its errors are reported by [`Source::shutdown`].
    pub fn retire_subject(&self, subject: &S) {
        if let Some(task) = self.tasks.lock().remove(subject) {
            task.token.cancel();
            self.retired.lock().push(task.handle);
        }
    }

    /// Subjects currently being sampled.
    pub fn active_subjects(&self) -> Vec<S> {
        let mut subjects: Vec<S> = self.tasks.lock().keys().cloned().collect();
        subjects.sort();
        subjects
    }

    pub fn series_source(&self) -> &SeriesSource<S, Time, T> {
        &self.base
    }
}

#[async_trait]
impl<S: Subject, T: Value> Source<S, Arc<dyn Series<Time, T>>> for PeriodicDataSource<S, T> {
    fn metric(&self) -> Metric<S, Arc<dyn Series<Time, T>>> {
        self.base.metric()
    }

    fn subjects(&self) -> Vec<S> {
        self.base.subjects()
    }

    fn data(&self, subject: &S) -> Option<Arc<dyn Series<Time, T>>> {
        self.base.data(subject)
    }

    async fn shutdown(&self) -> Result<()> {
        self.shut_down.store(true, Ordering::SeqCst);
        self.root.cancel();

        let mut handles: Vec<_> = self.tasks.lock().drain().map(|(_, t)| t.handle).collect();
        handles.append(&mut self.retired.lock());

        let mut errors = Vec::new();
        for handle in handles {
            errors.extend(join_task(handle).await);
        }
        if !errors.is_empty() {
            warn!(
                metric = %self.base.metric().name(),
                errors = errors.len(),
                "Sampling finished with errors"
            );
        }
        MonitorError::join(errors)
    }
}

fn random_offset(period: Duration) -> Duration {
    let nanos = period.as_nanos().min(u64::MAX as u128) as u64;
    if nanos == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(rand::thread_rng().gen_range(0..nanos))
}

async fn join_task(handle: JoinHandle<Vec<MonitorError>>) -> Vec<MonitorError> {
    match handle.await {
        Ok(errors) => errors,
        Err(err) => vec![MonitorError::Sensor(format!("sampling task failed: {}", err))],
    }
}

async fn sample<T: Value>(
    sensor: Arc<dyn Sensor<T>>,
    series: Arc<SyncedSeries<Time, T>>,
    period: Duration,
    offset: Duration,
    token: CancellationToken,
) -> Vec<MonitorError> {
    let mut errors = Vec::new();

    tokio::select! {
        biased;
        _ = token.cancelled() => return errors,
        _ = sleep(offset) => {}
    }

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let read = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            read = sensor.read_value() => read,
        };

        match read {
            Ok(value) => {
                if let Err(err) = series.append(Time::now(), value) {
                    errors.push(err);
                }
            }
            Err(err) => errors.push(err),
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Node;
    use std::sync::atomic::AtomicUsize;

    struct CountingSensor {
        count: AtomicUsize,
        fail: bool,
    }

    impl CountingSensor {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                count: AtomicUsize::new(0),
                fail,
            })
        }

        fn count(&self) -> usize {
            self.count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Sensor<i64> for CountingSensor {
        async fn read_value(&self) -> Result<i64> {
            self.count.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(MonitorError::Sensor("buggy sensor".into()))
            } else {
                Ok(123)
            }
        }
    }

    fn source(period: Duration) -> PeriodicDataSource<Node, i64> {
        PeriodicDataSource::new(Metric::new("TestMetric", "Test Metric"), period)
    }

    async fn wait_for(sensor: &CountingSensor, calls: usize) {
        while sensor.count() < calls {
            sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test]
    async fn test_shutdown_before_any_action() {
        let source = source(Duration::from_millis(10));
        assert!(source.shutdown().await.is_ok());
        assert!(source.subjects().is_empty());
    }

    #[tokio::test]
    async fn test_samples_are_recorded() {
        let source = source(Duration::from_millis(5));
        let sensor = CountingSensor::new(false);
        source.add_subject(Node::new("A"), sensor.clone()).unwrap();

        wait_for(&sensor, 3).await;
        source.shutdown().await.unwrap();

        let series = source.data(&Node::new("A")).unwrap();
        assert!(series.len() >= 2);
        assert!(series.get_all().iter().all(|p| p.value == 123));
    }

    #[tokio::test]
    async fn test_duplicate_subject_is_rejected() {
        let source = source(Duration::from_millis(10));
        source.add_subject(Node::new("A"), CountingSensor::new(false)).unwrap();
        let err = source
            .add_subject(Node::new("A"), CountingSensor::new(false))
            .unwrap_err();
        assert!(matches!(err, MonitorError::SubjectAlreadyExists(_)));
        source.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_no_reads_after_shutdown() {
        let period = Duration::from_millis(2);
        let source = source(period);
        let sensors: Vec<_> = (0..5).map(|_| CountingSensor::new(false)).collect();
        for (i, sensor) in sensors.iter().enumerate() {
            source
                .add_subject(Node::new(format!("N{}", i)), sensor.clone())
                .unwrap();
        }
        for sensor in &sensors {
            wait_for(sensor, 2).await;
        }

        source.shutdown().await.unwrap();
        let counts: Vec<_> = sensors.iter().map(|s| s.count()).collect();
        let sizes: Vec<_> = source
            .subjects()
            .iter()
            .map(|s| source.data(s).unwrap().len())
            .collect();

        sleep(period * 10).await;

        let after: Vec<_> = sensors.iter().map(|s| s.count()).collect();
        assert_eq!(counts, after);
        let sizes_after: Vec<_> = source
            .subjects()
            .iter()
            .map(|s| source.data(s).unwrap().len())
            .collect();
        assert_eq!(sizes, sizes_after);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_remove_subject_stops_only_that_subject() {
        let source = source(Duration::from_millis(2));
        let a = CountingSensor::new(false);
        let b = CountingSensor::new(false);
        source.add_subject(Node::new("A"), a.clone()).unwrap();
        source.add_subject(Node::new("B"), b.clone()).unwrap();
        wait_for(&a, 1).await;

        source.remove_subject(&Node::new("A")).await.unwrap();
        let removed_count = a.count();
        let b_before = b.count();

        wait_for(&b, b_before + 3).await;
        assert_eq!(a.count(), removed_count);
        assert_eq!(source.active_subjects(), vec![Node::new("B")]);
        // data of removed subjects is kept
        assert_eq!(source.subjects().len(), 2);

        source.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_unknown_subject_is_ignored() {
        let source = source(Duration::from_millis(10));
        assert!(source.remove_subject(&Node::new("X")).await.is_ok());
    }

    #[tokio::test]
    async fn test_errors_are_collected() {
        let source = source(Duration::from_nanos(1));
        let sensor = CountingSensor::new(true);
        source.add_subject(Node::new("A"), sensor.clone()).unwrap();

        wait_for(&sensor, 5).await;
        let err = source.shutdown().await.unwrap_err();
        assert!(err.count() >= 5);
        assert!(err.to_string().contains("buggy sensor"));
    }

    #[tokio::test]
    async fn test_retired_subject_errors_reported_on_shutdown() {
        let source = source(Duration::from_nanos(1));
        let sensor = CountingSensor::new(true);
        source.add_subject(Node::new("A"), sensor.clone()).unwrap();
        wait_for(&sensor, 2).await;

        source.retire_subject(&Node::new("A"));
        assert!(source.active_subjects().is_empty());
        assert!(source.shutdown().await.is_err());
    }

    #[tokio::test]
    async fn test_add_after_shutdown_fails() {
        let source = source(Duration::from_millis(10));
        source.shutdown().await.unwrap();
        let err = source
            .add_subject(Node::new("A"), CountingSensor::new(false))
            .unwrap_err();
        assert_eq!(err, MonitorError::ShutDown);
    }
}
