// Tickscope - Real-time telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Threshold alerts.
//!
//! Alerts are stateless: each tick the evaluator looks at the latest sample
//! of every channel and reports the rules currently breached. An alert
//! exists exactly while its condition holds. There is no persistence,
//! cooldown or history here.

use crate::channel::{Channel, ChannelCategory};
use crate::sample::Sample;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Severity level of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    High,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Warning => "WARN",
            AlertSeverity::High => "HIGH",
        }
    }
}

/// A rule breached on the current tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub channel_id: String,
    pub metric: String,
    pub severity: AlertSeverity,
    pub value: f64,
    pub threshold: f64,
    pub timestamp_ms: u64,
    /// Human-readable message.
    pub message: String,
}

impl AlertEvent {
    pub fn threshold_breach(
        channel: &Channel,
        metric: &str,
        severity: AlertSeverity,
        value: f64,
        threshold: f64,
        timestamp_ms: u64,
    ) -> Self {
        let message = match severity {
            AlertSeverity::High => format!(
                "High {} on {}: {:.1} (threshold: {:.1})",
                metric, channel.name, value, threshold
            ),
            AlertSeverity::Warning => format!(
                "Elevated {} on {}: {:.1} (threshold: {:.1})",
                metric, channel.name, value, threshold
            ),
        };
        Self {
            channel_id: channel.id.clone(),
            metric: metric.to_string(),
            severity,
            value,
            threshold,
            timestamp_ms,
            message,
        }
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Alert when `metric > high` (or `> warn` for a warning).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub metric: String,
    pub high: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warn: Option<f64>,
    /// Restrict the rule to one category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ChannelCategory>,
}

impl ThresholdRule {
    pub fn new(metric: &str, high: f64) -> Self {
        Self {
            metric: metric.to_string(),
            high,
            warn: None,
            category: None,
        }
    }

    pub fn with_warn(mut self, warn: f64) -> Self {
        self.warn = Some(warn);
        self
    }

    pub fn for_category(mut self, category: ChannelCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn applies_to(&self, channel: &Channel) -> bool {
        self.category.map_or(true, |c| c == channel.category)
    }

    /// Highest severity breached by `value`, strictly above the threshold.
    pub fn severity_for(&self, value: f64) -> Option<(AlertSeverity, f64)> {
        if value > self.high {
            return Some((AlertSeverity::High, self.high));
        }
        match self.warn {
            Some(warn) if value > warn => Some((AlertSeverity::Warning, warn)),
            _ => None,
        }
    }
}

/// Evaluates threshold rules against the latest sample of each channel.
#[derive(Debug, Clone, Default)]
pub struct AlertEvaluator {
    rules: Vec<ThresholdRule>,
}

impl AlertEvaluator {
    pub fn new(rules: Vec<ThresholdRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ThresholdRule] {
        &self.rules
    }

    /// Alerts for the current tick, in channel then rule order.
    /// Idle channels never alert.
    pub fn evaluate<'a>(
        &self,
        channels: impl IntoIterator<Item = &'a Channel>,
        latest: &HashMap<String, Sample>,
        timestamp_ms: u64,
    ) -> Vec<AlertEvent> {
        let mut events = Vec::new();

        for channel in channels {
            if !channel.is_active() {
                continue;
            }
            let Some(sample) = latest.get(&channel.id) else {
                continue;
            };

            for rule in self.rules.iter().filter(|r| r.applies_to(channel)) {
                let Some(value) = sample.value(&rule.metric) else {
                    continue;
                };
                if let Some((severity, threshold)) = rule.severity_for(value) {
                    events.push(AlertEvent::threshold_breach(
                        channel,
                        &rule.metric,
                        severity,
                        value,
                        threshold,
                        timestamp_ms,
                    ));
                }
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{THROUGHPUT, UTILIZATION};

    fn latest(entries: &[(&str, f64)]) -> HashMap<String, Sample> {
        entries
            .iter()
            .map(|(id, u)| (id.to_string(), Sample::new(0).with(UTILIZATION, *u)))
            .collect()
    }

    #[test]
    fn test_severity_as_str() {
        assert_eq!(AlertSeverity::High.as_str(), "HIGH");
        assert_eq!(AlertSeverity::Warning.as_str(), "WARN");
        assert!(AlertSeverity::High > AlertSeverity::Warning);
    }

    #[test]
    fn test_single_high_alert() {
        let channels = vec![Channel::new("dma.camera", "Camera Sensor", ChannelCategory::Dma)];
        let evaluator = AlertEvaluator::new(vec![ThresholdRule::new(UTILIZATION, 90.0)]);

        let events = evaluator.evaluate(&channels, &latest(&[("dma.camera", 95.0)]), 1000);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].channel_id, "dma.camera");
        assert_eq!(events[0].severity, AlertSeverity::High);
        assert!(events[0].message.contains("Camera Sensor"));

        let events = evaluator.evaluate(&channels, &latest(&[("dma.camera", 85.0)]), 2000);
        assert!(events.is_empty());
    }

    #[test]
    fn test_threshold_is_strict() {
        let channels = vec![Channel::new("c", "C", ChannelCategory::Cpu)];
        let evaluator = AlertEvaluator::new(vec![ThresholdRule::new(UTILIZATION, 90.0)]);
        assert!(evaluator
            .evaluate(&channels, &latest(&[("c", 90.0)]), 0)
            .is_empty());
    }

    #[test]
    fn test_idle_channel_never_alerts() {
        let channels = vec![Channel::new("c", "C", ChannelCategory::Cpu).idle()];
        let evaluator = AlertEvaluator::new(vec![ThresholdRule::new(UTILIZATION, 90.0)]);
        assert!(evaluator
            .evaluate(&channels, &latest(&[("c", 99.0)]), 0)
            .is_empty());
    }

    #[test]
    fn test_warn_level() {
        let rule = ThresholdRule::new(UTILIZATION, 90.0).with_warn(75.0);
        assert_eq!(rule.severity_for(80.0), Some((AlertSeverity::Warning, 75.0)));
        assert_eq!(rule.severity_for(95.0), Some((AlertSeverity::High, 90.0)));
        assert_eq!(rule.severity_for(70.0), None);
    }

    #[test]
    fn test_category_filter() {
        let channels = vec![
            Channel::new("c", "C", ChannelCategory::Cpu),
            Channel::new("d", "D", ChannelCategory::Dma),
        ];
        let evaluator = AlertEvaluator::new(vec![
            ThresholdRule::new(UTILIZATION, 90.0).for_category(ChannelCategory::Dma)
        ]);

        let events = evaluator.evaluate(&channels, &latest(&[("c", 99.0), ("d", 99.0)]), 0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].channel_id, "d");
    }

    #[test]
    fn test_missing_metric_is_skipped() {
        let channels = vec![Channel::new("d", "D", ChannelCategory::Dma)];
        let evaluator = AlertEvaluator::new(vec![ThresholdRule::new(THROUGHPUT, 10.0)]);
        assert!(evaluator
            .evaluate(&channels, &latest(&[("d", 99.0)]), 0)
            .is_empty());
    }

    #[test]
    fn test_event_json() {
        let channel = Channel::new("d", "D", ChannelCategory::Dma);
        let event =
            AlertEvent::threshold_breach(&channel, UTILIZATION, AlertSeverity::High, 95.0, 90.0, 7);
        let json = event.to_json().unwrap();
        assert!(json.contains("\"high\""));
        assert!(json.contains("\"channel_id\":\"d\""));
    }
}
