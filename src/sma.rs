// Chainwatch - Blockchain test-network monitoring
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Simple moving average over a growing series.
//!
//! [`SmaSeries`] is computed lazily: every read first folds the input points
//! appended since the previous read into the output. Points already emitted
//! are never recomputed. Until `period` points are available the average is
//! taken over the points seen so far.

use crate::series::{DataPoint, Series, SyncedSeries};
use crate::types::{Key, Value};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::warn;

/// Numeric series values the moving average can work with.
pub trait Number: Value + Copy {
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
}

impl Number for f64 {
    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64(value: f64) -> Self {
        value
    }
}

impl Number for f32 {
    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

struct SmaState<K, V> {
    window: VecDeque<f64>,
    sum: f64,
    /// Position of the last input point folded into the output.
    end_key: Option<K>,
    output: SyncedSeries<K, V>,
}

/// Moving average of an input series over a window of `period` points.
pub struct SmaSeries<K, V> {
    input: Arc<dyn Series<K, V>>,
    period: usize,
    state: Mutex<SmaState<K, V>>,
}

impl<K: Key, V: Number> SmaSeries<K, V> {
    pub fn new(input: Arc<dyn Series<K, V>>, period: usize) -> Self {
        let period = period.max(1);
        Self {
            input,
            period,
            state: Mutex::new(SmaState {
                window: VecDeque::with_capacity(period + 1),
                sum: 0.0,
                end_key: None,
                output: SyncedSeries::new(),
            }),
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    fn update(&self) {
        let latest = match self.input.get_latest() {
            Some(latest) => latest,
            None => return,
        };

        let mut state = self.state.lock();
        let pending: Vec<DataPoint<K, V>> = match state.end_key {
            Some(end) if end >= latest.position => return,
            Some(end) => {
                let mut points: Vec<_> = self
                    .input
                    .get_range(&end, &latest.position)
                    .into_iter()
                    .filter(|p| p.position > end)
                    .collect();
                points.push(latest);
                points
            }
            None => self.input.get_all(),
        };

        for point in pending {
            let value = point.value.to_f64();
            state.window.push_back(value);
            state.sum += value;
            if state.window.len() > self.period {
                if let Some(oldest) = state.window.pop_front() {
                    state.sum -= oldest;
                }
            }
            let average = state.sum / state.window.len() as f64;
            if let Err(err) = state.output.append(point.position, V::from_f64(average)) {
                warn!(error = %err, "Cannot extend moving average");
            }
            state.end_key = Some(point.position);
        }
    }
}

impl<K: Key, V: Number> Series<K, V> for SmaSeries<K, V> {
    fn get_range(&self, from: &K, to: &K) -> Vec<DataPoint<K, V>> {
        self.update();
        self.state.lock().output.get_range(from, to)
    }

    fn get_latest(&self) -> Option<DataPoint<K, V>> {
        self.update();
        self.state.lock().output.get_latest()
    }

    fn get_all(&self) -> Vec<DataPoint<K, V>> {
        self.update();
        self.state.lock().output.get_all()
    }

    fn len(&self) -> usize {
        self.update();
        self.state.lock().output.len()
    }
}
