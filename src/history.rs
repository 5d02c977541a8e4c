//! Rolling deviation history for the live monitor.
//!
//! A fixed-capacity FIFO window: the newest sample is appended at the back and
//! the oldest is evicted once capacity is exceeded. There is no other way to
//! remove samples.

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::models::DeviationSample;

/// Window length shown by the dashboard charts.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    samples: VecDeque<DeviationSample>,
    capacity: usize,
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: DeviationSample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Contents oldest → newest.
    pub fn snapshot(&self) -> Vec<DeviationSample> {
        self.samples.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviationSample> + '_ {
        self.samples.iter()
    }

    pub fn latest(&self) -> Option<&DeviationSample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn deviation_series(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.dev_bps).collect()
    }

    pub fn forward_series(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.observed_forward).collect()
    }
}

/// Handle shared between the single refresh-loop writer and chart readers.
#[derive(Debug, Clone, Default)]
pub struct SharedHistory {
    inner: Arc<RwLock<HistoryBuffer>>,
}

impl SharedHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HistoryBuffer::new(capacity))),
        }
    }

    pub fn push(&self, sample: DeviationSample) {
        self.inner.write().push(sample);
    }

    pub fn snapshot(&self) -> Vec<DeviationSample> {
        self.inner.read().snapshot()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Runs `f` against the buffer under the read lock.
    pub fn with_read<T>(&self, f: impl FnOnce(&HistoryBuffer) -> T) -> T {
        f(&self.inner.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn sample(i: usize) -> DeviationSample {
        DeviationSample {
            timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
                + Duration::seconds(5 * i as i64),
            dev_bps: i as f64,
            observed_forward: 1.1 + i as f64 * 1e-5,
        }
    }

    #[test]
    fn test_push_below_capacity_keeps_everything() {
        let mut buf = HistoryBuffer::default();
        for i in 0..10 {
            buf.push(sample(i));
        }
        assert_eq!(buf.len(), 10);
        assert_eq!(buf.capacity(), DEFAULT_HISTORY_CAPACITY);
        assert_eq!(buf.latest().unwrap().dev_bps, 9.0);
    }

    #[test]
    fn test_fifty_one_pushes_evict_the_oldest() {
        let mut buf = HistoryBuffer::default();
        for i in 0..51 {
            buf.push(sample(i));
        }
        assert_eq!(buf.len(), 50);
        let snap = buf.snapshot();
        assert!(snap.iter().all(|s| s.dev_bps != 0.0));
        let expected: Vec<f64> = (1..51).map(|i| i as f64).collect();
        assert_eq!(buf.deviation_series(), expected);
        assert_eq!(snap.first().unwrap().dev_bps, 1.0);
        assert_eq!(snap.last().unwrap().dev_bps, 50.0);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut buf = HistoryBuffer::new(7);
        for i in 0..500 {
            buf.push(sample(i));
            assert!(buf.len() <= 7);
        }
        assert_eq!(buf.forward_series().len(), 7);
    }

    #[test]
    fn test_zero_capacity_clamps_to_one() {
        let mut buf = HistoryBuffer::new(0);
        buf.push(sample(1));
        buf.push(sample(2));
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.latest().unwrap().dev_bps, 2.0);
    }

    #[test]
    fn test_shared_history_visible_to_readers() {
        let shared = SharedHistory::new(3);
        let reader = shared.clone();
        for i in 0..5 {
            shared.push(sample(i));
        }
        assert_eq!(reader.len(), 3);
        let devs = reader.with_read(|b| b.deviation_series());
        assert_eq!(devs, vec![2.0, 3.0, 4.0]);
    }
}
