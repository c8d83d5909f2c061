// Tickscope - Integration Tests
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Integration tests for the tick pipeline.

use approx::assert_relative_eq;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tickscope::*;

const START_MS: u64 = 1_700_000_000_000;

// ============================================================================
// Helper Functions
// ============================================================================

/// Holds previous values except for readings the test scripted.
#[derive(Clone, Default)]
struct ScriptedSource {
    script: Arc<Mutex<HashMap<String, Sample>>>,
}

impl ScriptedSource {
    fn set(&self, channel_id: &str, metric: &str, value: f64) {
        self.script
            .lock()
            .unwrap()
            .entry(channel_id.to_string())
            .or_insert_with(|| Sample::new(0))
            .set(metric, value);
    }
}

impl SampleSource for ScriptedSource {
    fn next_sample(&mut self, channel: &Channel, previous: &Sample, timestamp_ms: u64) -> Sample {
        let mut sample = Sample {
            timestamp_ms,
            values: previous.values.clone(),
        };
        if let Some(scripted) = self.script.lock().unwrap().get(&channel.id) {
            for (metric, value) in scripted.metrics() {
                sample.set(metric, value);
            }
        }
        sample
    }
}

/// Ignores every bound.
struct WildSource;

impl SampleSource for WildSource {
    fn next_sample(&mut self, _channel: &Channel, _previous: &Sample, timestamp_ms: u64) -> Sample {
        Sample::new(timestamp_ms)
            .with(THROUGHPUT, 1.0e9)
            .with(USED_MB, f64::NAN)
            .with(UTILIZATION, -5.0)
    }
}

fn scripted_engine(config: EngineConfig) -> (TelemetryEngine, ScriptedSource) {
    let source = ScriptedSource::default();
    let engine = TelemetryEngine::builder(ChannelRegistry::embedded_default())
        .config(config.with_start_time(START_MS))
        .source(source.clone())
        .clock(StepClock::new(START_MS + 1000, 1000))
        .build()
        .unwrap();
    (engine, source)
}

fn synthetic_engine(seed: u64) -> TelemetryEngine {
    TelemetryEngine::builder(ChannelRegistry::embedded_default())
        .config(EngineConfig::default().with_seed(seed).with_start_time(START_MS))
        .clock(StepClock::new(START_MS + 1000, 1000))
        .build()
        .unwrap()
}

// ============================================================================
// Section 1: Window Invariants
// ============================================================================

#[test]
fn test_prefill_fills_every_window() {
    let engine = synthetic_engine(1);
    for group in ["cpu", "memory", "io", "dma"] {
        let window = engine.window(group).unwrap();
        assert_eq!(window.len(), DEFAULT_WINDOW_CAPACITY, "group {}", group);
        assert_eq!(window[0].timestamp_ms, START_MS - 30_000);
        assert_eq!(window[30].timestamp_ms, START_MS);
    }
}

#[test]
fn test_window_never_exceeds_capacity() {
    let mut engine = synthetic_engine(2);
    for _ in 0..100 {
        engine.tick().unwrap();
        let window = engine.window("cpu").unwrap();
        assert_eq!(window.len(), DEFAULT_WINDOW_CAPACITY);
        assert!(window
            .windows(2)
            .all(|pair| pair[0].timestamp_ms <= pair[1].timestamp_ms));
    }
}

#[test]
fn test_window_length_without_prefill() {
    let config = EngineConfig::default().with_capacity(10).without_prefill();
    let (mut engine, _) = scripted_engine(config);

    assert_eq!(engine.window("io").unwrap().len(), 0);
    for t in 1..=25usize {
        engine.tick().unwrap();
        assert_eq!(engine.window("io").unwrap().len(), t.min(10));
    }
}

#[test]
fn test_overflow_evicts_exactly_the_oldest() {
    let mut engine = synthetic_engine(3);
    let before = engine.window("dma").unwrap();

    engine.tick().unwrap();
    let after = engine.window("dma").unwrap();

    assert_eq!(&after[..30], &before[1..]);
    assert_eq!(after[30].timestamp_ms, START_MS + 1000);
}

#[test]
fn test_window_reads_are_stable_between_ticks() {
    let mut engine = synthetic_engine(4);
    let a = engine.window("cpu").unwrap();
    let b = engine.window("cpu").unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    engine.tick().unwrap();
    let c = engine.window("cpu").unwrap();
    assert!(!Arc::ptr_eq(&a, &c));
    // The old snapshot is untouched by the tick
    assert_eq!(a.len(), DEFAULT_WINDOW_CAPACITY);
    assert_eq!(a[30].timestamp_ms, START_MS);
}

#[test]
fn test_replay_equals_sequential_appends() {
    let mut engine = synthetic_engine(5);
    for _ in 0..12 {
        engine.tick().unwrap();
    }
    let recorded = engine.window("memory").unwrap();

    let replayed = SlidingWindow::replay(recorded.len(), recorded.iter().cloned()).unwrap();

    let mut sequential = SlidingWindow::new(recorded.len());
    for frame in recorded.iter() {
        sequential.append(frame.clone()).unwrap();
    }
    sequential.commit();

    assert_eq!(&replayed.snapshot()[..], &sequential.snapshot()[..]);
    assert_eq!(&replayed.snapshot()[..], &recorded[..]);
}

// ============================================================================
// Section 2: Value Bounds
// ============================================================================

#[test]
fn test_generated_values_stay_in_bounds() {
    let mut engine = synthetic_engine(6);
    for _ in 0..300 {
        engine.tick().unwrap();
    }

    let registry = ChannelRegistry::embedded_default();
    for group in registry.groups() {
        for frame in engine.window(group).unwrap().iter() {
            for channel in registry.in_group(group) {
                for spec in channel.category.profile().metrics {
                    let value = frame.value(&channel.id, spec.name).unwrap();
                    assert!(
                        spec.contains(value),
                        "{}.{} = {} out of range",
                        channel.id,
                        spec.name,
                        value
                    );
                }
            }
        }
    }
}

#[test]
fn test_out_of_range_source_is_clamped() {
    let mut engine = TelemetryEngine::builder(ChannelRegistry::embedded_default())
        .config(EngineConfig::default().with_start_time(START_MS))
        .source(WildSource)
        .build()
        .unwrap();
    engine.tick_at(START_MS + 1000).unwrap();

    let camera = engine.latest_sample("dma.camera").unwrap();
    assert_eq!(camera.value(THROUGHPUT), Some(4096.0));
    assert_eq!(camera.value(UTILIZATION), Some(0.0));

    let used = engine.latest_sample("mem.used").unwrap();
    assert_eq!(used.value(USED_MB), Some(0.0));
    assert!(engine.clamped_values() > 0);
}

#[test]
fn test_idle_channel_reads_zero() {
    let mut engine = synthetic_engine(7);
    engine.tick().unwrap();
    assert!(engine.latest_sample("dma.audio").unwrap().is_zero());
}

// ============================================================================
// Section 3: Aggregation
// ============================================================================

#[test]
fn test_dma_total_throughput() {
    let (mut engine, script) = scripted_engine(EngineConfig::default());
    script.set("dma.camera", THROUGHPUT, 245.0);
    script.set("dma.lidar", THROUGHPUT, 189.0);
    script.set("dma.imu", THROUGHPUT, 12.0);
    engine.tick().unwrap();

    let dma = engine.aggregate("dma").unwrap();
    assert_relative_eq!(dma.total_throughput, 446.0);
    assert_eq!(dma.active_channels, 3);
    assert_eq!(dma.total_channels, 4);
}

#[test]
fn test_average_utilization_over_active_channels() {
    let (engine, _) = scripted_engine(EngineConfig::default());

    // camera 82, lidar 67, imu 15; audio is idle and excluded
    let dma = engine.aggregate("dma").unwrap();
    assert_relative_eq!(dma.average_utilization.unwrap(), (82.0 + 67.0 + 15.0) / 3.0);
}

#[test]
fn test_all_idle_group_is_not_applicable() {
    let registry = ChannelRegistry::from_channels(vec![
        Channel::new("dma.a", "A", ChannelCategory::Dma).idle(),
        Channel::new("dma.b", "B", ChannelCategory::Dma).idle(),
    ])
    .unwrap();
    let mut engine = TelemetryEngine::builder(registry)
        .config(EngineConfig::default().with_start_time(START_MS))
        .build()
        .unwrap();
    engine.tick_at(START_MS + 1000).unwrap();

    let dma = engine.aggregate("dma").unwrap();
    assert_eq!(dma.average_utilization, None);
    assert!(!dma.is_utilization_applicable());
    assert_eq!(dma.total_throughput, 0.0);
    assert!(engine.alerts().is_empty());
}

#[test]
fn test_peak_and_running_average_follow_window() {
    let (mut engine, script) = scripted_engine(EngineConfig::default());

    let dma = engine.aggregate("dma").unwrap();
    assert_relative_eq!(dma.peak.unwrap(), 446.0);
    assert_relative_eq!(dma.running_average.unwrap(), 446.0);

    script.set("dma.camera", THROUGHPUT, 300.0);
    engine.tick().unwrap();

    let dma = engine.aggregate("dma").unwrap();
    assert_relative_eq!(dma.peak.unwrap(), 501.0);
    assert_relative_eq!(
        dma.running_average.unwrap(),
        (30.0 * 446.0 + 501.0) / 31.0,
        epsilon = 1e-9
    );
}

#[test]
fn test_tracked_channel_series() {
    let config =
        EngineConfig::default().with_tracked("dma", TrackedSeries::channel("dma.lidar", UTILIZATION));
    let (mut engine, script) = scripted_engine(config);

    script.set("dma.lidar", UTILIZATION, 99.0);
    engine.tick().unwrap();

    let dma = engine.aggregate("dma").unwrap();
    assert_relative_eq!(dma.peak.unwrap(), 99.0);

    let series = engine.series("dma", "dma.lidar", UTILIZATION).unwrap();
    assert_eq!(series.len(), DEFAULT_WINDOW_CAPACITY);
    assert_eq!(series.last(), Some(&(START_MS + 1000, 99.0)));
}

#[test]
fn test_group_mean_series_covers_active_channels() {
    let config =
        EngineConfig::default().with_tracked("dma", TrackedSeries::group_mean(UTILIZATION));
    let (mut engine, script) = scripted_engine(config);

    // camera 82, lidar 67, imu 15; idle audio reads 0 but is left out
    let dma = engine.aggregate("dma").unwrap();
    assert_relative_eq!(dma.peak.unwrap(), (82.0 + 67.0 + 15.0) / 3.0);
    assert_relative_eq!(dma.running_average.unwrap(), (82.0 + 67.0 + 15.0) / 3.0);

    script.set("dma.camera", UTILIZATION, 97.0);
    engine.tick().unwrap();

    let dma = engine.aggregate("dma").unwrap();
    assert_relative_eq!(dma.peak.unwrap(), (97.0 + 67.0 + 15.0) / 3.0);
    assert_relative_eq!(dma.peak.unwrap(), dma.average_utilization.unwrap());
}

// ============================================================================
// Section 4: Alerts
// ============================================================================

#[test]
fn test_alert_raised_and_cleared() {
    let (mut engine, script) = scripted_engine(EngineConfig::default());
    assert!(engine.alerts().is_empty());

    script.set("dma.camera", UTILIZATION, 95.0);
    engine.tick().unwrap();
    let alerts = engine.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].channel_id, "dma.camera");
    assert_eq!(alerts[0].severity, AlertSeverity::High);
    assert_eq!(alerts[0].threshold, 90.0);

    script.set("dma.camera", UTILIZATION, 85.0);
    engine.tick().unwrap();
    assert!(engine.alerts().is_empty());
}

#[test]
fn test_alert_persists_while_breached() {
    let (mut engine, script) = scripted_engine(EngineConfig::default());
    script.set("cpu.core2", UTILIZATION, 97.0);

    for _ in 0..3 {
        engine.tick().unwrap();
        assert_eq!(engine.alerts_for("cpu.core2").unwrap().len(), 1);
        assert_eq!(engine.alerts().len(), 1);
    }
}

#[test]
fn test_warning_threshold() {
    let mut config = EngineConfig::default();
    config.alerts.utilization_warn_threshold = Some(80.0);
    let (engine, _) = scripted_engine(config);

    // dma.camera starts at 82
    let alerts = engine.alerts_for("dma.camera").unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, AlertSeverity::Warning);
}

#[test]
fn test_custom_rule() {
    let mut config = EngineConfig::default();
    config
        .alerts
        .rules
        .push(ThresholdRule::new(USED_MB, 2500.0).for_category(ChannelCategory::Memory));
    let (engine, _) = scripted_engine(config);

    let alerts = engine.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].channel_id, "mem.used");
    assert_eq!(alerts[0].metric, USED_MB);
}

#[test]
fn test_alerts_for_unknown_channel() {
    let (engine, _) = scripted_engine(EngineConfig::default());
    assert!(matches!(
        engine.alerts_for("gpu.0"),
        Err(EngineError::InvalidChannelReference(_))
    ));
}

// ============================================================================
// Section 5: Live / Pause
// ============================================================================

#[test]
fn test_paused_engine_changes_nothing() {
    let (mut engine, script) = scripted_engine(EngineConfig::default());
    assert!(engine.set_live(false));
    assert!(!engine.is_live());

    let window = engine.window("cpu").unwrap();
    let aggregate = engine.aggregate("cpu").unwrap().clone();
    script.set("cpu.core0", UTILIZATION, 99.0);

    for _ in 0..5 {
        assert_eq!(engine.tick().unwrap(), TickOutcome::Paused);
    }

    assert!(Arc::ptr_eq(&window, &engine.window("cpu").unwrap()));
    assert_eq!(engine.aggregate("cpu").unwrap(), &aggregate);
    assert!(engine.alerts().is_empty());
    assert_eq!(engine.tick_count(), 0);
}

#[test]
fn test_resume_continues_from_frozen_state() {
    let (mut engine, _) = scripted_engine(EngineConfig::default());
    engine.tick().unwrap();
    engine.set_live(false);
    engine.tick().unwrap();
    assert!(engine.set_live(true));
    assert!(!engine.set_live(true));

    let outcome = engine.tick().unwrap();
    assert_eq!(
        outcome,
        TickOutcome::Completed {
            tick: 2,
            timestamp_ms: START_MS + 2000,
            alerts: 0
        }
    );
}

#[test]
fn test_start_paused() {
    let mut config = EngineConfig::default();
    config.start_paused = true;
    let (mut engine, _) = scripted_engine(config);

    assert!(!engine.is_live());
    assert!(!engine.snapshot().live);
    assert_eq!(engine.tick().unwrap(), TickOutcome::Paused);
    assert_eq!(engine.window("cpu").unwrap().len(), DEFAULT_WINDOW_CAPACITY);
}

// ============================================================================
// Section 6: Determinism & Snapshots
// ============================================================================

#[test]
fn test_same_seed_same_windows() {
    let mut a = synthetic_engine(42);
    let mut b = synthetic_engine(42);
    for _ in 0..20 {
        a.tick().unwrap();
        b.tick().unwrap();
    }
    for group in ["cpu", "memory", "io", "dma"] {
        assert_eq!(&a.window(group).unwrap()[..], &b.window(group).unwrap()[..]);
    }
}

#[test]
fn test_snapshot_is_consistent() {
    let (mut engine, script) = scripted_engine(EngineConfig::default());
    script.set("cpu.core1", UTILIZATION, 93.0);
    engine.tick().unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.tick, 1);
    assert_eq!(snapshot.timestamp_ms, START_MS + 1000);
    assert!(Arc::ptr_eq(
        &snapshot.windows["cpu"],
        &engine.window("cpu").unwrap()
    ));
    assert_eq!(snapshot.aggregate("cpu"), Some(engine.aggregate("cpu").unwrap()));
    assert_eq!(snapshot.alerts, engine.alerts());

    let json = snapshot.to_json().unwrap();
    let parsed = TelemetrySnapshot::from_json(&json).unwrap();
    assert_eq!(parsed.window("cpu"), snapshot.window("cpu"));
}

#[test]
fn test_unknown_group_is_an_error() {
    let (engine, _) = scripted_engine(EngineConfig::default());
    assert!(matches!(
        engine.aggregate("gpu"),
        Err(EngineError::UnknownGroup(_))
    ));
    assert!(engine.window("gpu").unwrap_err().is_reference_error());
}

#[test]
fn test_config_for_unknown_group_rejected() {
    let config = EngineConfig::default().with_tracked("gpu", TrackedSeries::group_total(UTILIZATION));
    let result = TelemetryEngine::builder(ChannelRegistry::embedded_default())
        .config(config)
        .build();
    assert!(matches!(result, Err(EngineError::UnknownGroup(_))));
}
