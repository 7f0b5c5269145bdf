//! Metric storage (§4.7): samples with timestamps and tags, kept in a
//! fixed-size ring buffer per metric name (teacher convention of a narrow
//! `parking_lot` mutex per entry rather than one lock over the whole store).

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// The five metric shapes named in §4.7. `Histogram` and `Rate` are not
/// recorded directly through [`crate::Monitor`]'s [`swarm_runtime::MetricsSink`]
/// impl (that surface only carries Counter/Gauge/Timer, per the engine's
/// hook); they're derived views computed on demand from stored samples —
/// see [`crate::Monitor::histogram`] and [`crate::Monitor::rate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
    Timer,
    Rate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub metric_type: MetricType,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub tags: HashMap<String, String>,
}

/// Bounded per-metric history (§4.7 "ring buffers per metric, size 1000").
pub const RING_BUFFER_SIZE: usize = 1000;

struct RingBuffer {
    samples: VecDeque<MetricSample>,
}

impl RingBuffer {
    fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(RING_BUFFER_SIZE),
        }
    }

    fn push(&mut self, sample: MetricSample) {
        if self.samples.len() >= RING_BUFFER_SIZE {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    fn evict_before(&mut self, cutoff: DateTime<Utc>) {
        while matches!(self.samples.front(), Some(s) if s.timestamp < cutoff) {
            self.samples.pop_front();
        }
    }
}

/// Per-metric-name ring buffers, keyed concurrently (mirrors the agent
/// registry's `DashMap<String, AgentPoolEntry>` shape in `swarm-core`).
#[derive(Default)]
pub struct MetricStore {
    series: DashMap<String, Mutex<RingBuffer>>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &str, metric_type: MetricType, value: f64, tags: &[(&str, &str)]) {
        let sample = MetricSample {
            metric_type,
            value,
            timestamp: Utc::now(),
            tags: tags.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        };
        self.series
            .entry(name.to_string())
            .or_insert_with(|| Mutex::new(RingBuffer::new()))
            .lock()
            .push(sample);
    }

    /// All samples currently retained for `name`, oldest first.
    pub fn samples(&self, name: &str) -> Vec<MetricSample> {
        self.series
            .get(name)
            .map(|entry| entry.lock().samples.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn latest(&self, name: &str) -> Option<MetricSample> {
        self.series.get(name).and_then(|entry| entry.lock().samples.back().cloned())
    }

    pub fn metric_names(&self) -> Vec<String> {
        self.series.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Drops samples older than the retention window (§4.7 "retention
    /// window, default 24h").
    pub fn evict_retired(&self, cutoff: DateTime<Utc>) {
        for entry in self.series.iter() {
            entry.value().lock().evict_before(cutoff);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_caps_at_1000_and_drops_oldest() {
        let store = MetricStore::new();
        for i in 0..1100 {
            store.record("queue_depth", MetricType::Gauge, i as f64, &[]);
        }
        let samples = store.samples("queue_depth");
        assert_eq!(samples.len(), RING_BUFFER_SIZE);
        assert_eq!(samples.first().unwrap().value, 100.0);
        assert_eq!(samples.last().unwrap().value, 1099.0);
    }

    #[test]
    fn latest_returns_most_recent_sample() {
        let store = MetricStore::new();
        store.record("cpu", MetricType::Gauge, 0.2, &[]);
        store.record("cpu", MetricType::Gauge, 0.4, &[]);
        assert_eq!(store.latest("cpu").unwrap().value, 0.4);
    }

    #[test]
    fn unknown_metric_yields_no_samples() {
        let store = MetricStore::new();
        assert!(store.samples("nope").is_empty());
        assert!(store.latest("nope").is_none());
    }
}
