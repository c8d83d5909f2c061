// Tickscope - Real-time telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Per-category metric profiles: which metrics a channel reports, their
//! valid ranges and how far a synthetic value may move in one tick.

use crate::channel::ChannelCategory;
use crate::sample::Sample;

/// Utilization in percent.
pub const UTILIZATION: &str = "utilization";
/// Throughput in MB/s.
pub const THROUGHPUT: &str = "throughput";
/// Resident size in MB.
pub const USED_MB: &str = "used_mb";

/// Bounds and step size of one metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSpec {
    pub name: &'static str,
    pub lower: f64,
    pub upper: f64,
    /// Largest change a synthetic source may apply per tick.
    pub max_step: f64,
    /// Starting value when a channel does not set one.
    pub initial: f64,
}

impl MetricSpec {
    /// Clamp a value into `[lower, upper]`. NaN maps to `lower`.
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            self.lower
        } else {
            value.clamp(self.lower, self.upper)
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Metrics reported by every channel of a category.
#[derive(Debug)]
pub struct CategoryProfile {
    pub category: ChannelCategory,
    /// Metric summed into a group's total throughput.
    pub primary: &'static str,
    pub metrics: &'static [MetricSpec],
}

static CPU: CategoryProfile = CategoryProfile {
    category: ChannelCategory::Cpu,
    primary: UTILIZATION,
    metrics: &[MetricSpec {
        name: UTILIZATION,
        lower: 0.0,
        upper: 100.0,
        max_step: 5.0,
        initial: 50.0,
    }],
};

static MEMORY: CategoryProfile = CategoryProfile {
    category: ChannelCategory::Memory,
    primary: USED_MB,
    metrics: &[
        MetricSpec {
            name: USED_MB,
            lower: 0.0,
            upper: 16_384.0,
            max_step: 50.0,
            initial: 1024.0,
        },
        MetricSpec {
            name: UTILIZATION,
            lower: 0.0,
            upper: 100.0,
            max_step: 2.0,
            initial: 25.0,
        },
    ],
};

static IO: CategoryProfile = CategoryProfile {
    category: ChannelCategory::Io,
    primary: THROUGHPUT,
    metrics: &[
        MetricSpec {
            name: THROUGHPUT,
            lower: 0.0,
            upper: 2_000.0,
            max_step: 10.0,
            initial: 50.0,
        },
        MetricSpec {
            name: UTILIZATION,
            lower: 0.0,
            upper: 100.0,
            max_step: 5.0,
            initial: 30.0,
        },
    ],
};

static DMA: CategoryProfile = CategoryProfile {
    category: ChannelCategory::Dma,
    primary: THROUGHPUT,
    metrics: &[
        MetricSpec {
            name: THROUGHPUT,
            lower: 0.0,
            upper: 4_096.0,
            max_step: 10.0,
            initial: 100.0,
        },
        MetricSpec {
            name: UTILIZATION,
            lower: 0.0,
            upper: 100.0,
            max_step: 5.0,
            initial: 50.0,
        },
    ],
};

impl CategoryProfile {
    /// Profile for a category.
    pub fn of(category: ChannelCategory) -> &'static CategoryProfile {
        match category {
            ChannelCategory::Cpu => &CPU,
            ChannelCategory::Memory => &MEMORY,
            ChannelCategory::Io => &IO,
            ChannelCategory::Dma => &DMA,
        }
    }

    pub fn metric(&self, name: &str) -> Option<&MetricSpec> {
        self.metrics.iter().find(|m| m.name == name)
    }

    /// A sample with every metric at zero (clamped into range).
    pub fn zero_sample(&self, timestamp_ms: u64) -> Sample {
        let mut sample = Sample::new(timestamp_ms);
        for m in self.metrics {
            sample.set(m.name, m.clamp(0.0));
        }
        sample
    }

    /// Force a sample onto this profile: every metric present, every value
    /// in range, unknown metrics dropped. Missing metrics fall back to
    /// `fallback`, then to the profile's initial value.
    ///
    /// Returns the sanitized sample and how many values had to be clamped.
    pub fn conform(&self, raw: &Sample, fallback: &Sample, timestamp_ms: u64) -> (Sample, usize) {
        let mut sample = Sample::new(timestamp_ms);
        let mut clamped = 0;
        for m in self.metrics {
            let value = raw
                .value(m.name)
                .or_else(|| fallback.value(m.name))
                .unwrap_or(m.initial);
            let bounded = m.clamp(value);
            if bounded != value {
                clamped += 1;
            }
            sample.set(m.name, bounded);
        }
        (sample, clamped)
    }
}
