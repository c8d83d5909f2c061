// Tickscope - Real-time telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Samples and frames.
//!
//! A [`Sample`] is one channel's reading at one instant. A [`Frame`] is one
//! tick's readings for every channel of a group, which is what a group
//! window stores.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Anything carrying a millisecond timestamp.
pub trait Timestamped {
    fn timestamp_ms(&self) -> u64;
}

/// A timestamped set of named metric values for one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp_ms: u64,
    pub values: BTreeMap<String, f64>,
}

impl Sample {
    pub fn new(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            values: BTreeMap::new(),
        }
    }

    /// Builder-style setter.
    pub fn with(mut self, metric: &str, value: f64) -> Self {
        self.set(metric, value);
        self
    }

    pub fn set(&mut self, metric: &str, value: f64) {
        self.values.insert(metric.to_string(), value);
    }

    pub fn value(&self, metric: &str) -> Option<f64> {
        self.values.get(metric).copied()
    }

    pub fn metrics(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_zero(&self) -> bool {
        self.values.values().all(|v| *v == 0.0)
    }
}

impl Timestamped for Sample {
    fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }
}

/// One tick of a channel group: a sample per channel, keyed by channel id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub timestamp_ms: u64,
    pub samples: BTreeMap<String, Sample>,
}

impl Frame {
    pub fn new(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            samples: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, channel_id: &str, sample: Sample) {
        self.samples.insert(channel_id.to_string(), sample);
    }

    pub fn sample(&self, channel_id: &str) -> Option<&Sample> {
        self.samples.get(channel_id)
    }

    pub fn value(&self, channel_id: &str, metric: &str) -> Option<f64> {
        self.sample(channel_id).and_then(|s| s.value(metric))
    }

    pub fn channel_ids(&self) -> impl Iterator<Item = &str> {
        self.samples.keys().map(String::as_str)
    }

    /// Sum of `metric` over the channels that report it.
    pub fn total(&self, metric: &str) -> f64 {
        self.samples.values().filter_map(|s| s.value(metric)).sum()
    }

    /// Mean of `metric` over the channels that report it.
    pub fn mean(&self, metric: &str) -> Option<f64> {
        let values: Vec<f64> = self.samples.values().filter_map(|s| s.value(metric)).collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }

    /// Mean of `metric` over the listed channels that report it.
    pub fn mean_over<'a>(&self, metric: &str, channel_ids: impl IntoIterator<Item = &'a str>) -> Option<f64> {
        let values: Vec<f64> = channel_ids
            .into_iter()
            .filter_map(|id| self.value(id, metric))
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Timestamped for Frame {
    fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }
}
