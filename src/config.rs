// Tickscope - Real-time telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Engine configuration.
//!
//! Every field has a default, so a JSON file only needs the values it
//! changes. The 90% threshold and the 31-frame window are defaults, not
//! invariants.

use crate::aggregate::TrackedSeries;
use crate::alert::ThresholdRule;
use crate::error::{EngineError, Result};
use crate::profile::UTILIZATION;
use crate::source::DeltaDistribution;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Master configuration for the telemetry engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Tick cadence in milliseconds.
    pub tick_interval_ms: u64,

    /// Frames kept per group window (last 30 seconds plus current).
    pub window_capacity: usize,

    /// Fill windows with backward-dated frames at startup.
    pub prefill: bool,

    /// Seed for the synthetic source. `None` draws from OS entropy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Timestamp of the newest prefilled frame. `None` uses the clock.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time_ms: Option<u64>,

    /// Start paused instead of live.
    pub start_paused: bool,

    /// Delta distribution of the synthetic source.
    pub distribution: DeltaDistribution,

    /// Alert thresholds.
    pub alerts: AlertConfig,

    /// Per-group overrides, keyed by group id.
    pub groups: BTreeMap<String, GroupConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: crate::DEFAULT_TICK_INTERVAL_MS,
            window_capacity: crate::DEFAULT_WINDOW_CAPACITY,
            prefill: true,
            seed: None,
            start_time_ms: None,
            start_paused: false,
            distribution: DeltaDistribution::Uniform,
            alerts: AlertConfig::default(),
            groups: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.window_capacity = capacity;
        self
    }

    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.tick_interval_ms = interval_ms;
        self
    }

    pub fn with_start_time(mut self, timestamp_ms: u64) -> Self {
        self.start_time_ms = Some(timestamp_ms);
        self
    }

    pub fn without_prefill(mut self) -> Self {
        self.prefill = false;
        self
    }

    /// Track a specific series for a group's peak and running average.
    pub fn with_tracked(mut self, group: &str, tracked: TrackedSeries) -> Self {
        self.groups.insert(
            group.to_string(),
            GroupConfig {
                tracked: Some(tracked),
            },
        );
        self
    }

    /// Configured series for `group`, if overridden.
    pub fn tracked(&self, group: &str) -> Option<&TrackedSeries> {
        self.groups.get(group).and_then(|g| g.tracked.as_ref())
    }

    /// Check values that would make the engine misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.window_capacity == 0 {
            return Err(EngineError::InvalidConfig(
                "window_capacity must be at least 1".to_string(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "tick_interval_ms must be at least 1".to_string(),
            ));
        }
        if let DeltaDistribution::TruncatedNormal { sigma_fraction } = self.distribution {
            if !(sigma_fraction.is_finite() && sigma_fraction > 0.0) {
                return Err(EngineError::InvalidConfig(format!(
                    "sigma_fraction must be positive, got {}",
                    sigma_fraction
                )));
            }
        }
        self.alerts.validate()
    }
}

/// Alert thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Master switch.
    pub enabled: bool,

    /// Utilization above this raises a high-severity alert.
    pub utilization_high_threshold: f64,

    /// Utilization above this (but not above high) raises a warning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utilization_warn_threshold: Option<f64>,

    /// Additional rules on any metric.
    pub rules: Vec<ThresholdRule>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            utilization_high_threshold: 90.0,
            utilization_warn_threshold: None,
            rules: Vec::new(),
        }
    }
}

impl AlertConfig {
    /// The utilization rule followed by the extra rules. Empty when disabled.
    pub fn effective_rules(&self) -> Vec<ThresholdRule> {
        if !self.enabled {
            return Vec::new();
        }
        let mut utilization = ThresholdRule::new(UTILIZATION, self.utilization_high_threshold);
        utilization.warn = self.utilization_warn_threshold;

        std::iter::once(utilization)
            .chain(self.rules.iter().cloned())
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        let check = |name: &str, value: f64| {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(EngineError::InvalidConfig(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )))
            }
        };

        check("utilization_high_threshold", self.utilization_high_threshold)?;
        if let Some(warn) = self.utilization_warn_threshold {
            check("utilization_warn_threshold", warn)?;
            if warn >= self.utilization_high_threshold {
                return Err(EngineError::InvalidConfig(
                    "utilization_warn_threshold must be below utilization_high_threshold"
                        .to_string(),
                ));
            }
        }
        for rule in &self.rules {
            if rule.metric.is_empty() {
                return Err(EngineError::InvalidConfig(
                    "threshold rule needs a metric".to_string(),
                ));
            }
            check(&format!("{} threshold", rule.metric), rule.high)?;
            if let Some(warn) = rule.warn {
                check(&format!("{} warn threshold", rule.metric), warn)?;
                if warn >= rule.high {
                    return Err(EngineError::InvalidConfig(format!(
                        "{} warn threshold must be below its high threshold",
                        rule.metric
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Per-group settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    /// Series for peak and running average. Defaults to the group total of
    /// the category's primary metric.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracked: Option<TrackedSeries>,
}
