// Chainwatch - Blockchain test-network monitoring
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Append-only series of data points.
//!
//! A [`Series`] is an ordered sequence of `(position, value)` pairs where the
//! position strictly grows with every append. [`SyncedSeries`] is the
//! in-memory implementation shared between producing tasks and readers.

use crate::error::{MonitorError, Result};
use crate::types::{BlockNumber, Key, Time, Value};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// One recorded value at a position of a series.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint<K, V> {
    pub position: K,
    pub value: V,
}

impl<K, V> DataPoint<K, V> {
    pub fn new(position: K, value: V) -> Self {
        Self { position, value }
    }
}

/// Read access to an ordered series.
pub trait Series<K: Key, V: Value>: Send + Sync {
    /// Snapshot of the points with position in `[from, to)`.
    fn get_range(&self, from: &K, to: &K) -> Vec<DataPoint<K, V>>;

    /// The most recent point, if any.
    fn get_latest(&self) -> Option<DataPoint<K, V>>;

    /// Snapshot of every point.
    fn get_all(&self) -> Vec<DataPoint<K, V>>;

    /// Point recorded exactly at `position`.
    fn get_at(&self, position: &K) -> Result<DataPoint<K, V>> {
        self.get_all()
            .into_iter()
            .find(|p| p.position == *position)
            .ok_or(MonitorError::NotFound)
    }

    fn len(&self) -> usize {
        self.get_all().len()
    }

    fn is_empty(&self) -> bool {
        self.get_latest().is_none()
    }
}

/// Series indexed by block height.
pub type BlockSeries<V> = Arc<dyn Series<BlockNumber, V>>;

/// Series indexed by wall-clock time.
pub type TimeSeries<V> = Arc<dyn Series<Time, V>>;

/// Thread-safe in-memory series.
///
/// All operations lock a single mutex; per-subject write rates are low.
pub struct SyncedSeries<K, V> {
    data: Mutex<Vec<DataPoint<K, V>>>,
}

impl<K: Key, V: Value> SyncedSeries<K, V> {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(Vec::new()),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    /// Appends a point. Fails and leaves the series untouched if `position`
    /// is not strictly after the latest position.
    pub fn append(&self, position: K, value: V) -> Result<()> {
        let mut data = self.data.lock();
        if let Some(last) = data.last() {
            if position <= last.position {
                return Err(MonitorError::OutOfOrder {
                    last: last.position.to_string(),
                    attempted: position.to_string(),
                });
            }
        }
        data.push(DataPoint::new(position, value));
        Ok(())
    }
}

impl<K: Key, V: Value> fmt::Debug for SyncedSeries<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.data.lock();
        f.debug_struct("SyncedSeries")
            .field("len", &data.len())
            .field("latest", &data.last().map(|p| p.position.to_string()))
            .finish()
    }
}

impl<K: Key, V: Value> Default for SyncedSeries<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key, V: Value> Series<K, V> for SyncedSeries<K, V> {
    fn get_range(&self, from: &K, to: &K) -> Vec<DataPoint<K, V>> {
        if to <= from {
            return Vec::new();
        }
        let data = self.data.lock();
        let start = data.partition_point(|p| p.position < *from);
        let end = data.partition_point(|p| p.position < *to);
        if start >= end {
            return Vec::new();
        }
        data[start..end].to_vec()
    }

    fn get_latest(&self) -> Option<DataPoint<K, V>> {
        self.data.lock().last().cloned()
    }

    fn get_all(&self) -> Vec<DataPoint<K, V>> {
        self.data.lock().clone()
    }

    fn get_at(&self, position: &K) -> Result<DataPoint<K, V>> {
        let data = self.data.lock();
        data.binary_search_by(|p| p.position.cmp(position))
            .map(|i| data[i].clone())
            .map_err(|_| MonitorError::NotFound)
    }

    fn len(&self) -> usize {
        self.data.lock().len()
    }

    fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn series_1_to_5() -> SyncedSeries<u64, i64> {
        let series = SyncedSeries::new();
        for i in 1..=5u64 {
            series.append(i, (i * 10) as i64).unwrap();
        }
        series
    }

    #[test]
    fn test_can_add_and_retrieve_data() {
        let series = SyncedSeries::<u64, i64>::new();
        assert!(series.is_empty());
        assert!(series.get_latest().is_none());

        series.append(1, 10).unwrap();
        series.append(2, 20).unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series.get_latest(), Some(DataPoint::new(2, 20)));
        assert_eq!(
            series.get_all(),
            vec![DataPoint::new(1, 10), DataPoint::new(2, 20)]
        );
    }

    #[test]
    fn test_append_fails_if_position_is_not_progressing() {
        let series = SyncedSeries::<u64, i64>::new();
        series.append(5, 1).unwrap();

        let err = series.append(3, 2).unwrap_err();
        assert!(matches!(err, MonitorError::OutOfOrder { .. }));
        assert!(series.append(5, 3).is_err());

        // unchanged
        assert_eq!(series.get_all(), vec![DataPoint::new(5, 1)]);
    }

    #[test]
    fn test_debug_shows_length_and_latest() {
        let series = series_1_to_5();
        assert_eq!(
            format!("{:?}", series),
            "SyncedSeries { len: 5, latest: Some(\"5\") }"
        );
        assert_eq!(
            format!("{:?}", SyncedSeries::<u64, i64>::new()),
            "SyncedSeries { len: 0, latest: None }"
        );
    }

    #[test]
    fn test_get_range_is_half_open() {
        let series = series_1_to_5();

        let positions = |from, to| {
            series
                .get_range(&from, &to)
                .into_iter()
                .map(|p| p.position)
                .collect::<Vec<_>>()
        };

        assert_eq!(positions(2, 4), vec![2, 3]);
        assert_eq!(positions(1, 6), vec![1, 2, 3, 4, 5]);
        assert_eq!(positions(0, 1), Vec::<u64>::new());
        assert_eq!(positions(3, 3), Vec::<u64>::new());
        assert_eq!(positions(3, 2), Vec::<u64>::new());
        assert_eq!(positions(6, 10), Vec::<u64>::new());
    }

    #[test]
    fn test_get_range_returns_copy() {
        let series = series_1_to_5();
        let snapshot = series.get_range(&1, &3);
        series.append(6, 60).unwrap();
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn test_get_at() {
        let series = series_1_to_5();
        assert_eq!(series.get_at(&3).unwrap().value, 30);
        assert_eq!(series.get_at(&7).unwrap_err(), MonitorError::NotFound);
    }

    #[test]
    fn test_get_latest_returns_last_appended() {
        let series = SyncedSeries::<u64, String>::new();
        for i in 0..10u64 {
            series.append(i, format!("v{}", i)).unwrap();
            assert_eq!(series.get_latest().unwrap().value, format!("v{}", i));
        }
    }

    #[test]
    fn test_concurrent_readers_and_writer() {
        let series = Arc::new(SyncedSeries::<u64, u64>::new());
        let writer = {
            let series = Arc::clone(&series);
            thread::spawn(move || {
                for i in 0..1000 {
                    series.append(i, i).unwrap();
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let series = Arc::clone(&series);
                thread::spawn(move || {
                    for _ in 0..100 {
                        let all = series.get_all();
                        assert!(all.windows(2).all(|w| w[0].position < w[1].position));
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(series.len(), 1000);
    }
}
