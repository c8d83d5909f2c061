// Tickscope - Real-time telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Per-group aggregates.
//!
//! Everything here is recomputed from the full window on every tick. There
//! is no running state, so values cannot drift from the window contents.

use crate::channel::Channel;
use crate::error::{EngineError, Result};
use crate::profile::UTILIZATION;
use crate::sample::Frame;
use serde::{Deserialize, Serialize};

/// Series over which peak and running average are taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackedSeries {
    /// Sum of `metric` over the group's channels in each frame.
    GroupTotal { metric: String },
    /// Mean of `metric` over the group's active channels in each frame.
    GroupMean { metric: String },
    /// A single channel's metric.
    Channel { channel_id: String, metric: String },
}

impl TrackedSeries {
    pub fn group_total(metric: &str) -> Self {
        TrackedSeries::GroupTotal {
            metric: metric.to_string(),
        }
    }

    pub fn group_mean(metric: &str) -> Self {
        TrackedSeries::GroupMean {
            metric: metric.to_string(),
        }
    }

    pub fn channel(channel_id: &str, metric: &str) -> Self {
        TrackedSeries::Channel {
            channel_id: channel_id.to_string(),
            metric: metric.to_string(),
        }
    }

    /// Value of the series in one frame, if the frame has it. `channels`
    /// are the group's channels; idle ones are left out of a mean.
    pub fn value(&self, frame: &Frame, channels: &[&Channel]) -> Option<f64> {
        match self {
            TrackedSeries::GroupTotal { metric } => {
                if frame.is_empty() {
                    None
                } else {
                    Some(frame.total(metric))
                }
            }
            TrackedSeries::GroupMean { metric } => frame.mean_over(
                metric,
                channels.iter().filter(|c| c.is_active()).map(|c| c.id.as_str()),
            ),
            TrackedSeries::Channel { channel_id, metric } => frame.value(channel_id, metric),
        }
    }
}

/// Derived statistics of one group, replaced wholesale every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    pub group: String,
    /// Timestamp of the newest frame (0 for an empty window).
    pub timestamp_ms: u64,
    /// Sum of the latest primary metric over all channels of the group.
    pub total_throughput: f64,
    /// Mean latest utilization over active channels. `None` means not
    /// applicable: the group has no active channel.
    pub average_utilization: Option<f64>,
    /// Maximum of the tracked series over the window.
    pub peak: Option<f64>,
    /// Mean of the tracked series over the window.
    pub running_average: Option<f64>,
    pub active_channels: usize,
    pub total_channels: usize,
    pub window_len: usize,
}

impl AggregateSnapshot {
    pub fn is_utilization_applicable(&self) -> bool {
        self.average_utilization.is_some()
    }
}

/// Sum of each channel's primary metric in `frame`.
pub fn total_throughput<'a>(channels: impl IntoIterator<Item = &'a Channel>, frame: &Frame) -> f64 {
    channels
        .into_iter()
        .filter_map(|c| frame.value(&c.id, c.category.profile().primary))
        .sum()
}

/// Mean utilization over active channels in `frame`.
///
/// Fails with [`EngineError::EmptyActiveSet`] when no active channel
/// reports a utilization.
pub fn average_utilization<'a>(
    group: &str,
    channels: impl IntoIterator<Item = &'a Channel>,
    frame: &Frame,
) -> Result<f64> {
    let values: Vec<f64> = channels
        .into_iter()
        .filter(|c| c.is_active())
        .filter_map(|c| frame.value(&c.id, UTILIZATION))
        .collect();

    if values.is_empty() {
        return Err(EngineError::EmptyActiveSet(group.to_string()));
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// Peak and mean of `series` over every frame, or `None` when no frame
/// carries the series.
pub fn window_stats(
    frames: &[Frame],
    channels: &[&Channel],
    series: &TrackedSeries,
) -> Option<(f64, f64)> {
    let mut count = 0usize;
    let mut sum = 0.0;
    let mut peak = f64::NEG_INFINITY;

    for value in frames.iter().filter_map(|f| series.value(f, channels)) {
        count += 1;
        sum += value;
        peak = peak.max(value);
    }

    if count == 0 {
        None
    } else {
        Some((peak, sum / count as f64))
    }
}

/// Compute a group's aggregate from its channels and current window.
pub fn compute(
    group: &str,
    channels: &[&Channel],
    frames: &[Frame],
    series: &TrackedSeries,
) -> AggregateSnapshot {
    let latest = frames.last();
    let active_channels = channels.iter().filter(|c| c.is_active()).count();

    let (total_throughput, average_utilization, timestamp_ms) = match latest {
        Some(frame) => (
            total_throughput(channels.iter().copied(), frame),
            average_utilization(group, channels.iter().copied(), frame).ok(),
            frame.timestamp_ms,
        ),
        None => (0.0, None, 0),
    };

    let (peak, running_average) = match window_stats(frames, channels, series) {
        Some((peak, mean)) => (Some(peak), Some(mean)),
        None => (None, None),
    };

    AggregateSnapshot {
        group: group.to_string(),
        timestamp_ms,
        total_throughput,
        average_utilization,
        peak,
        running_average,
        active_channels,
        total_channels: channels.len(),
        window_len: frames.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelCategory;
    use crate::profile::THROUGHPUT;
    use crate::sample::Sample;
    use approx::assert_relative_eq;

    fn dma_channels() -> Vec<Channel> {
        vec![
            Channel::new("dma.camera", "Camera Sensor", ChannelCategory::Dma),
            Channel::new("dma.lidar", "LIDAR Data", ChannelCategory::Dma),
            Channel::new("dma.imu", "IMU Stream", ChannelCategory::Dma),
            Channel::new("dma.audio", "Audio Input", ChannelCategory::Dma).idle(),
        ]
    }

    fn dma_frame(ts: u64, readings: [(f64, f64); 4]) -> Frame {
        let mut frame = Frame::new(ts);
        for (channel, (throughput, utilization)) in dma_channels().iter().zip(readings) {
            frame.insert(
                &channel.id,
                Sample::new(ts)
                    .with(THROUGHPUT, throughput)
                    .with(UTILIZATION, utilization),
            );
        }
        frame
    }

    #[test]
    fn test_total_throughput() {
        let channels = dma_channels();
        let frame = dma_frame(0, [(245.0, 82.0), (189.0, 67.0), (12.0, 15.0), (0.0, 0.0)]);
        assert_relative_eq!(total_throughput(&channels, &frame), 446.0);
    }

    #[test]
    fn test_average_utilization_ignores_idle() {
        let channels = dma_channels();
        let frame = dma_frame(0, [(245.0, 82.0), (189.0, 67.0), (12.0, 15.0), (0.0, 0.0)]);
        let avg = average_utilization("dma", &channels, &frame).unwrap();
        assert_relative_eq!(avg, (82.0 + 67.0 + 15.0) / 3.0);
    }

    #[test]
    fn test_average_utilization_empty_active_set() {
        let channels: Vec<Channel> = dma_channels().into_iter().map(Channel::idle).collect();
        let frame = dma_frame(0, [(0.0, 0.0); 4]);

        let err = average_utilization("dma", &channels, &frame).unwrap_err();
        assert!(matches!(err, EngineError::EmptyActiveSet(g) if g == "dma"));
    }

    #[test]
    fn test_window_stats() {
        let channels = dma_channels();
        let refs: Vec<&Channel> = channels.iter().collect();
        let frames = vec![
            dma_frame(0, [(100.0, 0.0), (0.0, 0.0), (0.0, 0.0), (0.0, 0.0)]),
            dma_frame(1, [(300.0, 0.0), (0.0, 0.0), (0.0, 0.0), (0.0, 0.0)]),
            dma_frame(2, [(200.0, 0.0), (0.0, 0.0), (0.0, 0.0), (0.0, 0.0)]),
        ];

        let (peak, mean) = window_stats(&frames, &refs, &TrackedSeries::group_total(THROUGHPUT)).unwrap();
        assert_relative_eq!(peak, 300.0);
        assert_relative_eq!(mean, 200.0);

        let (peak, _) =
            window_stats(&frames, &refs, &TrackedSeries::channel("dma.lidar", THROUGHPUT)).unwrap();
        assert_relative_eq!(peak, 0.0);

        assert!(window_stats(&frames, &refs, &TrackedSeries::channel("nope", THROUGHPUT)).is_none());
        assert!(window_stats(&[], &refs, &TrackedSeries::group_total(THROUGHPUT)).is_none());
    }

    #[test]
    fn test_compute() {
        let channels = dma_channels();
        let refs: Vec<&Channel> = channels.iter().collect();
        let frames = vec![
            dma_frame(1000, [(240.0, 80.0), (180.0, 60.0), (10.0, 10.0), (0.0, 0.0)]),
            dma_frame(2000, [(245.0, 82.0), (189.0, 67.0), (12.0, 15.0), (0.0, 0.0)]),
        ];

        let agg = compute("dma", &refs, &frames, &TrackedSeries::group_total(THROUGHPUT));

        assert_eq!(agg.timestamp_ms, 2000);
        assert_relative_eq!(agg.total_throughput, 446.0);
        assert_eq!(agg.active_channels, 3);
        assert_eq!(agg.total_channels, 4);
        assert_eq!(agg.window_len, 2);
        assert_relative_eq!(agg.peak.unwrap(), 446.0);
        assert_relative_eq!(agg.running_average.unwrap(), (430.0 + 446.0) / 2.0);
        assert!(agg.is_utilization_applicable());
    }

    #[test]
    fn test_group_mean_skips_idle_channels() {
        let channels = dma_channels();
        let refs: Vec<&Channel> = channels.iter().collect();
        let frames = vec![
            dma_frame(1000, [(240.0, 80.0), (180.0, 60.0), (10.0, 10.0), (0.0, 0.0)]),
            dma_frame(2000, [(245.0, 90.0), (189.0, 66.0), (12.0, 15.0), (0.0, 0.0)]),
        ];
        let series = TrackedSeries::group_mean(UTILIZATION);

        // audio is idle: its zero does not pull the mean down
        assert_relative_eq!(series.value(&frames[0], &refs).unwrap(), 50.0);

        let (peak, mean) = window_stats(&frames, &refs, &series).unwrap();
        assert_relative_eq!(peak, 57.0);
        assert_relative_eq!(mean, 53.5);
    }

    #[test]
    fn test_group_mean_all_idle() {
        let channels: Vec<Channel> = dma_channels().into_iter().map(Channel::idle).collect();
        let refs: Vec<&Channel> = channels.iter().collect();
        let frames = vec![dma_frame(0, [(0.0, 0.0); 4])];

        let agg = compute("dma", &refs, &frames, &TrackedSeries::group_mean(UTILIZATION));
        assert!(agg.peak.is_none());
        assert!(agg.running_average.is_none());
    }

    #[test]
    fn test_compute_empty_window() {
        let channels = dma_channels();
        let refs: Vec<&Channel> = channels.iter().collect();

        let agg = compute("dma", &refs, &[], &TrackedSeries::group_total(THROUGHPUT));

        assert_eq!(agg.total_throughput, 0.0);
        assert!(agg.average_utilization.is_none());
        assert!(agg.peak.is_none());
        assert!(agg.running_average.is_none());
    }

    #[test]
    fn test_tracked_series_json() {
        let series = TrackedSeries::channel("cpu.core0", UTILIZATION);
        let json = serde_json::to_string(&series).unwrap();
        assert!(json.contains("\"kind\":\"channel\""));
        let parsed: TrackedSeries = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, series);
    }
}
