// Tickscope Exporter - Prometheus metrics definitions
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Prometheus metrics for Tickscope.
//!
//! Gauges are refreshed from each published [`TelemetrySnapshot`], so a
//! scrape always reflects one completed tick.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, CounterVec, Encoder, Gauge, GaugeVec,
    TextEncoder,
};
use tickscope::{AlertSeverity, TelemetrySnapshot};
use tracing::warn;

lazy_static! {
    // ============================================================
    // Engine State
    // ============================================================

    /// Completed ticks since start.
    pub static ref TICKS: Gauge = register_gauge!(
        "tickscope_ticks",
        "Completed engine ticks since start"
    ).unwrap();

    /// Live flag (1 = live, 0 = paused).
    pub static ref LIVE: Gauge = register_gauge!(
        "tickscope_live",
        "Engine live state (1=live, 0=paused)"
    ).unwrap();

    /// Timestamp of the last completed tick.
    pub static ref LAST_TICK_TIMESTAMP_MS: Gauge = register_gauge!(
        "tickscope_last_tick_timestamp_ms",
        "Timestamp of the last completed tick in epoch milliseconds"
    ).unwrap();

    // ============================================================
    // Channel Readings
    // ============================================================

    /// Latest value per channel and metric.
    pub static ref CHANNEL_VALUE: GaugeVec = register_gauge_vec!(
        "tickscope_channel_value",
        "Latest reading of a channel metric",
        &["group", "channel", "metric"]
    ).unwrap();

    // ============================================================
    // Group Aggregates
    // ============================================================

    pub static ref GROUP_TOTAL_THROUGHPUT: GaugeVec = register_gauge_vec!(
        "tickscope_group_total_throughput",
        "Sum of the latest primary metric over a group",
        &["group"]
    ).unwrap();

    /// Absent while the group has no active channel.
    pub static ref GROUP_AVERAGE_UTILIZATION: GaugeVec = register_gauge_vec!(
        "tickscope_group_average_utilization",
        "Mean latest utilization over active channels",
        &["group"]
    ).unwrap();

    pub static ref GROUP_PEAK: GaugeVec = register_gauge_vec!(
        "tickscope_group_peak",
        "Maximum of the tracked series over the window",
        &["group"]
    ).unwrap();

    pub static ref GROUP_RUNNING_AVERAGE: GaugeVec = register_gauge_vec!(
        "tickscope_group_running_average",
        "Mean of the tracked series over the window",
        &["group"]
    ).unwrap();

    pub static ref GROUP_ACTIVE_CHANNELS: GaugeVec = register_gauge_vec!(
        "tickscope_group_active_channels",
        "Active channels in a group",
        &["group"]
    ).unwrap();

    // ============================================================
    // Alerts
    // ============================================================

    /// Alerts currently raised, by severity.
    pub static ref ACTIVE_ALERTS: GaugeVec = register_gauge_vec!(
        "tickscope_active_alerts",
        "Alerts raised on the last completed tick",
        &["severity"]
    ).unwrap();

    /// Ticks on which a channel was in breach.
    pub static ref ALERT_TICKS_TOTAL: CounterVec = register_counter_vec!(
        "tickscope_alert_ticks_total",
        "Ticks on which a channel breached a threshold",
        &["channel", "metric", "severity"]
    ).unwrap();

    // ============================================================
    // Exporter Metrics
    // ============================================================

    /// Current replay position (row index).
    pub static ref REPLAY_POSITION: Gauge = register_gauge!(
        "tickscope_exporter_replay_position",
        "Current replay position (row index)"
    ).unwrap();

    /// Rows in the replay dataset.
    pub static ref REPLAY_TOTAL_ROWS: Gauge = register_gauge!(
        "tickscope_exporter_replay_total_rows",
        "Rows in the replay dataset"
    ).unwrap();
}

/// Refresh every gauge from a snapshot.
pub fn update_from_snapshot(snapshot: &TelemetrySnapshot) {
    TICKS.set(snapshot.tick as f64);
    LIVE.set(if snapshot.live { 1.0 } else { 0.0 });
    LAST_TICK_TIMESTAMP_MS.set(snapshot.timestamp_ms as f64);

    for (group, window) in &snapshot.windows {
        let Some(frame) = window.last() else {
            continue;
        };
        for (channel_id, sample) in &frame.samples {
            for (metric, value) in sample.metrics() {
                CHANNEL_VALUE
                    .with_label_values(&[group.as_str(), channel_id.as_str(), metric])
                    .set(value);
            }
        }
    }

    for (group, aggregate) in &snapshot.aggregates {
        let labels = [group.as_str()];
        GROUP_TOTAL_THROUGHPUT
            .with_label_values(&labels)
            .set(aggregate.total_throughput);
        GROUP_ACTIVE_CHANNELS
            .with_label_values(&labels)
            .set(aggregate.active_channels as f64);
        set_or_remove(&GROUP_AVERAGE_UTILIZATION, &labels, aggregate.average_utilization);
        set_or_remove(&GROUP_PEAK, &labels, aggregate.peak);
        set_or_remove(&GROUP_RUNNING_AVERAGE, &labels, aggregate.running_average);
    }

    for severity in [AlertSeverity::Warning, AlertSeverity::High] {
        let count = snapshot
            .alerts
            .iter()
            .filter(|a| a.severity == severity)
            .count();
        ACTIVE_ALERTS
            .with_label_values(&[severity.as_str()])
            .set(count as f64);
    }
}

/// Count the alerts of a completed tick.
pub fn record_alerts(snapshot: &TelemetrySnapshot) {
    for alert in &snapshot.alerts {
        ALERT_TICKS_TOTAL
            .with_label_values(&[
                alert.channel_id.as_str(),
                alert.metric.as_str(),
                alert.severity.as_str(),
            ])
            .inc();
    }
}

fn set_or_remove(gauge: &GaugeVec, labels: &[&str], value: Option<f64>) {
    match value {
        Some(v) => gauge.with_label_values(labels).set(v),
        None => {
            // Not an error when the series was never set
            let _ = gauge.remove_label_values(labels);
        }
    }
}

/// Update replay position metrics.
pub fn update_replay_metrics(position: usize, total: usize) {
    REPLAY_POSITION.set(position as f64);
    REPLAY_TOTAL_ROWS.set(total as f64);
}

/// Encode all metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
