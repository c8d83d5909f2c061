// Tickscope - Real-time telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Sample sources.
//!
//! The engine asks a [`SampleSource`] for one sample per channel per tick.
//! [`SyntheticSource`] is a bounded random walk with one seedable RNG per
//! channel category, so categories evolve independently and runs with the
//! same seed are reproducible.

use crate::channel::{Channel, ChannelCategory};
use crate::sample::Sample;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::{Normal, Uniform};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Produces the next reading of a channel.
///
/// Implementations return a zero-valued sample for idle channels. The engine
/// clamps every returned value into the category's range, so a source does
/// not need to be exact about bounds.
pub trait SampleSource: Send + Sync {
    /// Called once per tick before any `next_sample` call.
    fn begin_tick(&mut self, _timestamp_ms: u64) {}

    fn next_sample(&mut self, channel: &Channel, previous: &Sample, timestamp_ms: u64) -> Sample;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "custom"
    }
}

/// Distribution of per-tick deltas, always bounded by the metric's `max_step`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DeltaDistribution {
    /// Uniform over `[-max_step, +max_step]`.
    Uniform,
    /// Normal with `std = max_step * sigma_fraction`, truncated at `±max_step`.
    TruncatedNormal { sigma_fraction: f64 },
}

impl Default for DeltaDistribution {
    fn default() -> Self {
        DeltaDistribution::Uniform
    }
}

impl DeltaDistribution {
    fn draw<R: Rng + ?Sized>(&self, rng: &mut R, max_step: f64) -> f64 {
        if max_step <= 0.0 || !max_step.is_finite() {
            return 0.0;
        }
        match self {
            DeltaDistribution::Uniform => Uniform::new_inclusive(-max_step, max_step).sample(rng),
            DeltaDistribution::TruncatedNormal { sigma_fraction } => {
                match Normal::new(0.0, max_step * sigma_fraction) {
                    Ok(normal) => normal.sample(rng).clamp(-max_step, max_step),
                    Err(_) => 0.0,
                }
            }
        }
    }
}

/// Derive a category's seed from the master seed.
fn category_seed(seed: u64, category: ChannelCategory) -> u64 {
    let salt = match category {
        ChannelCategory::Cpu => 1,
        ChannelCategory::Memory => 2,
        ChannelCategory::Io => 3,
        ChannelCategory::Dma => 4,
    };
    seed ^ 0x9E37_79B9_7F4A_7C15u64.wrapping_mul(salt)
}

/// Bounded random-walk generator.
pub struct SyntheticSource {
    rngs: HashMap<ChannelCategory, StdRng>,
    distribution: DeltaDistribution,
}

impl SyntheticSource {
    /// Seeded when `seed` is set, otherwise drawn from OS entropy.
    pub fn new(seed: Option<u64>) -> Self {
        let rngs = ChannelCategory::ALL
            .iter()
            .map(|&category| {
                let rng = match seed {
                    Some(s) => StdRng::seed_from_u64(category_seed(s, category)),
                    None => StdRng::from_entropy(),
                };
                (category, rng)
            })
            .collect();

        Self {
            rngs,
            distribution: DeltaDistribution::default(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(Some(seed))
    }

    pub fn from_entropy() -> Self {
        Self::new(None)
    }

    pub fn with_distribution(mut self, distribution: DeltaDistribution) -> Self {
        self.distribution = distribution;
        self
    }

    pub fn distribution(&self) -> DeltaDistribution {
        self.distribution
    }
}

impl SampleSource for SyntheticSource {
    fn next_sample(&mut self, channel: &Channel, previous: &Sample, timestamp_ms: u64) -> Sample {
        let profile = channel.category.profile();
        if !channel.is_active() {
            return profile.zero_sample(timestamp_ms);
        }

        let distribution = self.distribution;
        let rng = self
            .rngs
            .entry(channel.category)
            .or_insert_with(StdRng::from_entropy);

        let mut sample = Sample::new(timestamp_ms);
        for spec in profile.metrics {
            let prev = previous.value(spec.name).unwrap_or(spec.initial);
            let delta = distribution.draw(rng, spec.max_step);
            sample.set(spec.name, spec.clamp(prev + delta));
        }
        sample
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

/// Repeats each channel's previous values. Idle channels read zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct HoldSource;

impl SampleSource for HoldSource {
    fn next_sample(&mut self, channel: &Channel, previous: &Sample, timestamp_ms: u64) -> Sample {
        if !channel.is_active() {
            return channel.category.profile().zero_sample(timestamp_ms);
        }
        Sample {
            timestamp_ms,
            values: previous.values.clone(),
        }
    }

    fn name(&self) -> &str {
        "hold"
    }
}
