// Tickscope - Real-time telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Channel registry
//!
//! Channels are registered once at startup and never change afterwards.
//! Each channel belongs to exactly one group; a group owns one window.

use crate::error::{EngineError, Result};
use crate::profile::{CategoryProfile, THROUGHPUT, USED_MB, UTILIZATION};
use crate::sample::Sample;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Kind of telemetry source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelCategory {
    Cpu,
    Memory,
    Io,
    Dma,
}

impl ChannelCategory {
    pub const ALL: [ChannelCategory; 4] = [
        ChannelCategory::Cpu,
        ChannelCategory::Memory,
        ChannelCategory::Io,
        ChannelCategory::Dma,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelCategory::Cpu => "cpu",
            ChannelCategory::Memory => "memory",
            ChannelCategory::Io => "io",
            ChannelCategory::Dma => "dma",
        }
    }

    pub fn profile(&self) -> &'static CategoryProfile {
        CategoryProfile::of(*self)
    }
}

/// Whether a channel is producing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    Active,
    Idle,
}

impl ChannelStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, ChannelStatus::Active)
    }
}

/// A registered telemetry channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub category: ChannelCategory,
    /// Group (window) this channel feeds. Defaults to the category name.
    pub group: String,
    pub status: ChannelStatus,
    /// Starting metric values; missing metrics use the profile default.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub initial: BTreeMap<String, f64>,
}

impl Channel {
    pub fn new(id: &str, name: &str, category: ChannelCategory) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            category,
            group: category.as_str().to_string(),
            status: ChannelStatus::Active,
            initial: BTreeMap::new(),
        }
    }

    pub fn with_group(mut self, group: &str) -> Self {
        self.group = group.to_string();
        self
    }

    pub fn with_status(mut self, status: ChannelStatus) -> Self {
        self.status = status;
        self
    }

    pub fn idle(self) -> Self {
        self.with_status(ChannelStatus::Idle)
    }

    pub fn with_initial(mut self, metric: &str, value: f64) -> Self {
        self.initial.insert(metric.to_string(), value);
        self
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// First sample of this channel: zero when idle, otherwise the
    /// configured initial values clamped into the category's ranges.
    pub fn initial_sample(&self, timestamp_ms: u64) -> Sample {
        let profile = self.category.profile();
        if !self.is_active() {
            return profile.zero_sample(timestamp_ms);
        }
        let mut sample = Sample::new(timestamp_ms);
        for spec in profile.metrics {
            let value = self.initial.get(spec.name).copied().unwrap_or(spec.initial);
            sample.set(spec.name, spec.clamp(value));
        }
        sample
    }
}

/// Static set of channels, kept in registration order.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    channels: Vec<Channel>,
    index: HashMap<String, usize>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry, rejecting duplicate ids.
    pub fn from_channels(channels: impl IntoIterator<Item = Channel>) -> Result<Self> {
        let mut registry = Self::new();
        for channel in channels {
            registry.register(channel)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, channel: Channel) -> Result<()> {
        if channel.id.is_empty() {
            return Err(EngineError::InvalidConfig(
                "channel id must not be empty".to_string(),
            ));
        }
        if self.index.contains_key(&channel.id) {
            return Err(EngineError::InvalidConfig(format!(
                "duplicate channel id: {}",
                channel.id
            )));
        }
        self.index.insert(channel.id.clone(), self.channels.len());
        self.channels.push(channel);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&Channel> {
        self.index
            .get(id)
            .map(|&i| &self.channels[i])
            .ok_or_else(|| EngineError::InvalidChannelReference(id.to_string()))
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Group ids in order of first appearance.
    pub fn groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = Vec::new();
        for channel in &self.channels {
            if !groups.contains(&channel.group.as_str()) {
                groups.push(&channel.group);
            }
        }
        groups
    }

    pub fn contains_group(&self, group: &str) -> bool {
        self.channels.iter().any(|c| c.group == group)
    }

    pub fn in_group<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a Channel> + 'a {
        self.channels.iter().filter(move |c| c.group == group)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Channel set of the embedded profiling board: four CPU cores, three
    /// memory pools, the two disk directions and four DMA streams (audio idle).
    pub fn embedded_default() -> Self {
        use ChannelCategory::*;

        let channels = vec![
            Channel::new("cpu.core0", "Core 0", Cpu).with_initial(UTILIZATION, 70.0),
            Channel::new("cpu.core1", "Core 1", Cpu).with_initial(UTILIZATION, 60.0),
            Channel::new("cpu.core2", "Core 2", Cpu).with_initial(UTILIZATION, 65.0),
            Channel::new("cpu.core3", "Core 3", Cpu).with_initial(UTILIZATION, 75.0),
            Channel::new("mem.used", "Used", Memory)
                .with_initial(USED_MB, 3000.0)
                .with_initial(UTILIZATION, 37.0),
            Channel::new("mem.cached", "Cached", Memory)
                .with_initial(USED_MB, 1450.0)
                .with_initial(UTILIZATION, 18.0),
            Channel::new("mem.buffers", "Buffers", Memory)
                .with_initial(USED_MB, 550.0)
                .with_initial(UTILIZATION, 7.0),
            Channel::new("io.read", "Read", Io)
                .with_initial(THROUGHPUT, 85.0)
                .with_initial(UTILIZATION, 40.0),
            Channel::new("io.write", "Write", Io)
                .with_initial(THROUGHPUT, 50.0)
                .with_initial(UTILIZATION, 25.0),
            Channel::new("dma.camera", "Camera Sensor", Dma)
                .with_initial(THROUGHPUT, 245.0)
                .with_initial(UTILIZATION, 82.0),
            Channel::new("dma.lidar", "LIDAR Data", Dma)
                .with_initial(THROUGHPUT, 189.0)
                .with_initial(UTILIZATION, 67.0),
            Channel::new("dma.imu", "IMU Stream", Dma)
                .with_initial(THROUGHPUT, 12.0)
                .with_initial(UTILIZATION, 15.0),
            Channel::new("dma.audio", "Audio Input", Dma).idle(),
        ];

        let mut registry = Self::new();
        for channel in channels {
            let id = channel.id.clone();
            registry.channels.push(channel);
            registry.index.insert(id, registry.channels.len() - 1);
        }
        registry
    }
}
