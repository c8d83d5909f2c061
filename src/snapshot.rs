// Tickscope - Real-time telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Published engine state.
//!
//! A [`TelemetrySnapshot`] is built once per completed tick and shared
//! behind an `Arc`. Windows inside it are the committed window snapshots,
//! so cloning a snapshot never copies frames.

use crate::aggregate::AggregateSnapshot;
use crate::alert::{AlertEvent, AlertSeverity};
use crate::sample::Frame;
use crate::window::WindowSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Consistent view of windows, aggregates and alerts after one tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub version: u32,
    /// Completed ticks since start (prefill is tick 0).
    pub tick: u64,
    pub timestamp_ms: u64,
    pub live: bool,
    pub windows: BTreeMap<String, WindowSnapshot<Frame>>,
    pub aggregates: BTreeMap<String, AggregateSnapshot>,
    pub alerts: Vec<AlertEvent>,
}

impl TelemetrySnapshot {
    pub fn window(&self, group: &str) -> Option<&[Frame]> {
        self.windows.get(group).map(|w| &w[..])
    }

    pub fn aggregate(&self, group: &str) -> Option<&AggregateSnapshot> {
        self.aggregates.get(group)
    }

    pub fn alerts_for<'a>(&'a self, channel_id: &'a str) -> impl Iterator<Item = &'a AlertEvent> {
        self.alerts.iter().filter(move |a| a.channel_id == channel_id)
    }

    /// Count of alerts at or above `severity`.
    pub fn alert_count(&self, severity: AlertSeverity) -> usize {
        self.alerts.iter().filter(|a| a.severity >= severity).count()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
