// Tickscope - Real-time telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! TelemetryEngine - the per-tick pipeline.
//!
//! One tick runs generate, clamp, append, aggregate and evaluate, then
//! publishes a new [`TelemetrySnapshot`]. Readers only ever see committed
//! windows, so a tick is all-or-nothing from the outside.

use crate::aggregate::{self, AggregateSnapshot, TrackedSeries};
use crate::alert::{AlertEvaluator, AlertEvent};
use crate::channel::{Channel, ChannelRegistry};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::live::{LiveControl, LiveState};
use crate::profile::UTILIZATION;
use crate::sample::{Frame, Sample};
use crate::snapshot::{TelemetrySnapshot, SNAPSHOT_VERSION};
use crate::source::{SampleSource, SyntheticSource};
use crate::window::{WindowSnapshot, WindowStore};
use log::{debug, info, trace};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Result of a tick request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A tick ran and its results are published.
    Completed {
        tick: u64,
        timestamp_ms: u64,
        alerts: usize,
    },
    /// The engine is paused; nothing changed.
    Paused,
}

impl TickOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TickOutcome::Completed { .. })
    }
}

/// Builder for [`TelemetryEngine`].
pub struct EngineBuilder {
    registry: ChannelRegistry,
    config: EngineConfig,
    source: Option<Box<dyn SampleSource>>,
    clock: Option<Box<dyn Clock>>,
}

impl EngineBuilder {
    pub fn new(registry: ChannelRegistry) -> Self {
        Self {
            registry,
            config: EngineConfig::default(),
            source: None,
            clock: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sample source. Defaults to a [`SyntheticSource`] seeded from the config.
    pub fn source(self, source: impl SampleSource + 'static) -> Self {
        self.boxed_source(Box::new(source))
    }

    pub fn boxed_source(mut self, source: Box<dyn SampleSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Tick clock. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    /// Validate everything and build a prefilled engine.
    pub fn build(self) -> Result<TelemetryEngine> {
        let EngineBuilder {
            registry,
            config,
            source,
            clock,
        } = self;

        config.validate()?;
        if registry.is_empty() {
            return Err(EngineError::InvalidConfig(
                "registry has no channels".to_string(),
            ));
        }
        for group in config.groups.keys() {
            if !registry.contains_group(group) {
                return Err(EngineError::UnknownGroup(group.clone()));
            }
        }

        let mut tracked = BTreeMap::new();
        let mut windows = WindowStore::new();
        for group in registry.groups() {
            let series = match config.tracked(group) {
                Some(series) => {
                    check_tracked(&registry, group, series)?;
                    series.clone()
                }
                None => default_tracked(&registry, group),
            };
            tracked.insert(group.to_string(), series);
            windows.register_group(group, config.window_capacity);
        }

        let source = source.unwrap_or_else(|| {
            Box::new(SyntheticSource::new(config.seed).with_distribution(config.distribution))
        });
        let mut clock = clock.unwrap_or_else(|| Box::new(SystemClock));
        let start_ms = config.start_time_ms.unwrap_or_else(|| clock.now_ms());

        let live = LiveControl::new(if config.start_paused {
            LiveState::Paused
        } else {
            LiveState::Live
        });
        let evaluator = AlertEvaluator::new(config.alerts.effective_rules());

        let mut engine = TelemetryEngine {
            config,
            registry,
            source,
            clock,
            live,
            windows,
            latest: HashMap::new(),
            tracked,
            evaluator,
            aggregates: BTreeMap::new(),
            alerts: Vec::new(),
            tick_count: 0,
            last_timestamp_ms: start_ms,
            clamped_values: 0,
            snapshot: Arc::new(empty_snapshot()),
        };

        if engine.config.prefill {
            engine.prefill(start_ms)?;
        } else {
            engine.latest = engine.initial_samples(start_ms);
        }
        engine.recompute(start_ms)?;

        info!(
            "Telemetry engine ready: {} channels in {} groups, capacity {}, {} ms interval, {} source",
            engine.registry.len(),
            engine.windows.len(),
            engine.config.window_capacity,
            engine.config.tick_interval_ms,
            engine.source.name()
        );
        Ok(engine)
    }
}

fn check_tracked(registry: &ChannelRegistry, group: &str, series: &TrackedSeries) -> Result<()> {
    match series {
        TrackedSeries::GroupTotal { metric } | TrackedSeries::GroupMean { metric } => {
            let reported = registry
                .in_group(group)
                .any(|c| c.category.profile().metric(metric).is_some());
            if !reported {
                return Err(EngineError::InvalidConfig(format!(
                    "no channel of group {} reports metric '{}'",
                    group, metric
                )));
            }
        }
        TrackedSeries::Channel { channel_id, metric } => {
            let channel = registry.get(channel_id)?;
            if channel.group != group {
                return Err(EngineError::InvalidConfig(format!(
                    "tracked channel {} is not in group {}",
                    channel_id, group
                )));
            }
            if channel.category.profile().metric(metric).is_none() {
                return Err(EngineError::InvalidConfig(format!(
                    "channel {} does not report metric '{}'",
                    channel_id, metric
                )));
            }
        }
    }
    Ok(())
}

/// Group total of the primary metric of the group's first channel.
fn default_tracked(registry: &ChannelRegistry, group: &str) -> TrackedSeries {
    let metric = registry
        .in_group(group)
        .next()
        .map(|c| c.category.profile().primary)
        .unwrap_or(UTILIZATION);
    TrackedSeries::group_total(metric)
}

fn empty_snapshot() -> TelemetrySnapshot {
    TelemetrySnapshot {
        version: SNAPSHOT_VERSION,
        tick: 0,
        timestamp_ms: 0,
        live: true,
        windows: BTreeMap::new(),
        aggregates: BTreeMap::new(),
        alerts: Vec::new(),
    }
}

/// Real-time telemetry engine.
pub struct TelemetryEngine {
    config: EngineConfig,
    registry: ChannelRegistry,
    source: Box<dyn SampleSource>,
    clock: Box<dyn Clock>,
    live: LiveControl,
    windows: WindowStore<Frame>,
    latest: HashMap<String, Sample>,
    tracked: BTreeMap<String, TrackedSeries>,
    evaluator: AlertEvaluator,

    // Published state
    aggregates: BTreeMap<String, AggregateSnapshot>,
    alerts: Vec<AlertEvent>,
    tick_count: u64,
    last_timestamp_ms: u64,
    clamped_values: u64,
    snapshot: Arc<TelemetrySnapshot>,
}

impl TelemetryEngine {
    /// Engine with the synthetic source and the system clock.
    pub fn new(registry: ChannelRegistry, config: EngineConfig) -> Result<Self> {
        Self::builder(registry).config(config).build()
    }

    pub fn builder(registry: ChannelRegistry) -> EngineBuilder {
        EngineBuilder::new(registry)
    }

    /// Run one tick at the clock's current time. No-op while paused.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        if !self.live.is_live() {
            trace!("Tick skipped: paused");
            return Ok(TickOutcome::Paused);
        }
        let now = self.clock.now_ms();
        self.tick_at(now)
    }

    /// Run one tick stamped `timestamp_ms`. No-op while paused.
    ///
    /// Timestamps older than the previous tick are raised to it, so
    /// windows stay ordered when the clock steps backwards.
    pub fn tick_at(&mut self, timestamp_ms: u64) -> Result<TickOutcome> {
        if !self.live.is_live() {
            trace!("Tick skipped: paused");
            return Ok(TickOutcome::Paused);
        }

        let timestamp_ms = if timestamp_ms < self.last_timestamp_ms {
            trace!(
                "Clock stepped back {} ms, holding at {}",
                self.last_timestamp_ms - timestamp_ms,
                self.last_timestamp_ms
            );
            self.last_timestamp_ms
        } else {
            timestamp_ms
        };

        let latest = self.sample_all(timestamp_ms);
        self.append_frames(latest, timestamp_ms)?;
        self.windows.commit_all();
        self.tick_count += 1;
        self.recompute(timestamp_ms)?;

        debug!(
            "Tick {} at {} ms: {} alerts",
            self.tick_count,
            timestamp_ms,
            self.alerts.len()
        );
        Ok(TickOutcome::Completed {
            tick: self.tick_count,
            timestamp_ms,
            alerts: self.alerts.len(),
        })
    }

    /// Switch between live and paused. Returns whether the state changed.
    pub fn set_live(&mut self, live: bool) -> bool {
        let changed = self.live.set_live(live);
        if changed {
            info!("Telemetry {}", self.live.state().as_str());
            self.publish();
        }
        changed
    }

    pub fn is_live(&self) -> bool {
        self.live.is_live()
    }

    pub fn live_state(&self) -> LiveState {
        self.live.state()
    }

    /// Committed window of a group.
    pub fn window(&self, group: &str) -> Result<WindowSnapshot<Frame>> {
        self.windows.snapshot(group)
    }

    pub fn aggregate(&self, group: &str) -> Result<&AggregateSnapshot> {
        self.aggregates
            .get(group)
            .ok_or_else(|| EngineError::UnknownGroup(group.to_string()))
    }

    pub fn aggregates(&self) -> &BTreeMap<String, AggregateSnapshot> {
        &self.aggregates
    }

    /// Alerts of the last completed tick.
    pub fn alerts(&self) -> &[AlertEvent] {
        &self.alerts
    }

    pub fn alerts_for(&self, channel_id: &str) -> Result<Vec<&AlertEvent>> {
        self.registry.get(channel_id)?;
        Ok(self
            .alerts
            .iter()
            .filter(|a| a.channel_id == channel_id)
            .collect())
    }

    pub fn channel(&self, id: &str) -> Result<&Channel> {
        self.registry.get(id)
    }

    /// Newest sample of a channel.
    pub fn latest_sample(&self, channel_id: &str) -> Result<&Sample> {
        self.registry.get(channel_id)?;
        self.latest
            .get(channel_id)
            .ok_or_else(|| EngineError::InvalidChannelReference(channel_id.to_string()))
    }

    /// `(timestamp_ms, value)` of one channel's metric over a group's window.
    pub fn series(&self, group: &str, channel_id: &str, metric: &str) -> Result<Vec<(u64, f64)>> {
        let window = self.windows.snapshot(group)?;
        let channel = self.registry.get(channel_id)?;
        if channel.group != group {
            return Err(EngineError::InvalidChannelReference(format!(
                "{} (not in group {})",
                channel_id, group
            )));
        }
        Ok(window
            .iter()
            .filter_map(|frame| {
                frame
                    .value(channel_id, metric)
                    .map(|v| (frame.timestamp_ms, v))
            })
            .collect())
    }

    /// Tracked series of a group.
    pub fn tracked(&self, group: &str) -> Result<&TrackedSeries> {
        self.tracked
            .get(group)
            .ok_or_else(|| EngineError::UnknownGroup(group.to_string()))
    }

    /// Shared view of the last completed tick.
    pub fn snapshot(&self) -> Arc<TelemetrySnapshot> {
        Arc::clone(&self.snapshot)
    }

    pub fn groups(&self) -> Vec<&str> {
        self.registry.groups()
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Completed ticks, prefill excluded.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn last_timestamp_ms(&self) -> u64 {
        self.last_timestamp_ms
    }

    /// Source values forced back into range since start.
    pub fn clamped_values(&self) -> u64 {
        self.clamped_values
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Fill every window with frames ending at `newest_ms`, one interval
    /// apart, starting from the channels' initial values.
    fn prefill(&mut self, newest_ms: u64) -> Result<()> {
        let capacity = self.config.window_capacity;
        let interval = self.config.tick_interval_ms;

        for i in 0..capacity {
            let back = (capacity - 1 - i) as u64;
            let timestamp_ms = newest_ms.saturating_sub(back.saturating_mul(interval));
            let latest = if i == 0 {
                self.initial_samples(timestamp_ms)
            } else {
                self.sample_all(timestamp_ms)
            };
            self.append_frames(latest, timestamp_ms)?;
        }
        self.windows.commit_all();

        debug!(
            "Prefilled {} frames per group ending at {} ms",
            capacity, newest_ms
        );
        Ok(())
    }

    fn initial_samples(&self, timestamp_ms: u64) -> HashMap<String, Sample> {
        self.registry
            .channels()
            .iter()
            .map(|c| (c.id.clone(), c.initial_sample(timestamp_ms)))
            .collect()
    }

    /// Ask the source for every channel's next sample, clamped into range.
    fn sample_all(&mut self, timestamp_ms: u64) -> HashMap<String, Sample> {
        self.source.begin_tick(timestamp_ms);

        let mut next = HashMap::with_capacity(self.registry.len());
        let mut clamped = 0;
        for channel in self.registry.channels() {
            let profile = channel.category.profile();
            if !channel.is_active() {
                next.insert(channel.id.clone(), profile.zero_sample(timestamp_ms));
                continue;
            }

            let initial;
            let previous = match self.latest.get(&channel.id) {
                Some(sample) => sample,
                None => {
                    initial = channel.initial_sample(timestamp_ms);
                    &initial
                }
            };
            let raw = self.source.next_sample(channel, previous, timestamp_ms);
            let (sample, n) = profile.conform(&raw, previous, timestamp_ms);
            if n > 0 {
                debug!("Clamped {} value(s) from channel {}", n, channel.id);
            }
            clamped += n;
            next.insert(channel.id.clone(), sample);
        }

        self.clamped_values += clamped as u64;
        next
    }

    /// Stage one frame per group. Published by the next commit.
    fn append_frames(&mut self, latest: HashMap<String, Sample>, timestamp_ms: u64) -> Result<()> {
        for group in self.registry.groups() {
            let mut frame = Frame::new(timestamp_ms);
            for channel in self.registry.in_group(group) {
                if let Some(sample) = latest.get(&channel.id) {
                    frame.insert(&channel.id, sample.clone());
                }
            }
            self.windows.get_mut(group)?.append(frame)?;
        }

        self.latest = latest;
        self.last_timestamp_ms = timestamp_ms;
        Ok(())
    }

    /// Rebuild aggregates and alerts from committed windows, then publish.
    fn recompute(&mut self, timestamp_ms: u64) -> Result<()> {
        let mut aggregates = BTreeMap::new();
        for group in self.registry.groups() {
            let channels: Vec<&Channel> = self.registry.in_group(group).collect();
            let frames = self.windows.snapshot(group)?;
            let series = self
                .tracked
                .get(group)
                .ok_or_else(|| EngineError::UnknownGroup(group.to_string()))?;
            aggregates.insert(
                group.to_string(),
                aggregate::compute(group, &channels, &frames, series),
            );
        }
        self.aggregates = aggregates;
        self.alerts = self
            .evaluator
            .evaluate(self.registry.channels(), &self.latest, timestamp_ms);
        self.publish();
        Ok(())
    }

    fn publish(&mut self) {
        self.snapshot = Arc::new(TelemetrySnapshot {
            version: SNAPSHOT_VERSION,
            tick: self.tick_count,
            timestamp_ms: self.last_timestamp_ms,
            live: self.live.is_live(),
            windows: self.windows.snapshots(),
            aggregates: self.aggregates.clone(),
            alerts: self.alerts.clone(),
        });
    }
}
