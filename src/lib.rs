// Tickscope - Real-time telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Tickscope - Real-time telemetry engine
//!
//! The engine behind an embedded profiling dashboard: a periodic sampler
//! that keeps bounded sliding windows of multi-channel samples, derives
//! totals, averages and peaks, and evaluates threshold alerts, all under a
//! live/pause switch.
//!
//! ## Key Features
//!
//! - **Bounded windows**: fixed-capacity FIFO per channel group, prefilled
//!   with backward-dated frames and published as immutable snapshots
//! - **Pluggable sources**: seedable synthetic random walk, or any
//!   [`SampleSource`] (replayed or real readings)
//! - **Fresh aggregates**: recomputed from the full window on every tick
//! - **Stateless alerts**: an alert exists exactly while its threshold is breached
//!
//! ## Quick Start
//!
//! ```rust
//! use tickscope::{ChannelRegistry, EngineConfig, StepClock, TelemetryEngine};
//!
//! let config = EngineConfig::default().with_seed(42).with_start_time(30_000);
//! let mut engine = TelemetryEngine::builder(ChannelRegistry::embedded_default())
//!     .config(config)
//!     .clock(StepClock::new(31_000, 1000))
//!     .build()
//!     .unwrap();
//!
//! // Windows start full
//! assert_eq!(engine.window("cpu").unwrap().len(), 31);
//!
//! // One tick adds a frame and evicts the oldest
//! engine.tick().unwrap();
//! let dma = engine.aggregate("dma").unwrap();
//! assert!(dma.total_throughput >= 0.0);
//!
//! // Paused engines ignore ticks
//! engine.set_live(false);
//! assert!(!engine.tick().unwrap().is_completed());
//! ```
//!
//! ## Modules
//!
//! - [`channel`]: Channels, categories and the registry
//! - [`profile`]: Per-category metric ranges
//! - [`source`]: Sample sources
//! - [`window`]: Sliding windows and the window store
//! - [`aggregate`]: Per-group statistics
//! - [`alert`]: Threshold alerts
//! - [`engine`]: The tick pipeline
//! - [`scheduler`]: Periodic driver (feature `runtime`)

// Modules
pub mod aggregate;
pub mod alert;
pub mod channel;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod live;
pub mod profile;
pub mod sample;
#[cfg(feature = "runtime")]
pub mod scheduler;
pub mod snapshot;
pub mod source;
pub mod window;

// Re-exports for convenient access
pub use aggregate::{AggregateSnapshot, TrackedSeries};
pub use alert::{AlertEvaluator, AlertEvent, AlertSeverity, ThresholdRule};
pub use channel::{Channel, ChannelCategory, ChannelRegistry, ChannelStatus};
pub use clock::{Clock, StepClock, SystemClock};
pub use config::{AlertConfig, EngineConfig, GroupConfig};
pub use engine::{EngineBuilder, TelemetryEngine, TickOutcome};
pub use error::{EngineError, Result};
pub use live::{LiveControl, LiveState};
pub use profile::{CategoryProfile, MetricSpec, THROUGHPUT, USED_MB, UTILIZATION};
pub use sample::{Frame, Sample, Timestamped};
#[cfg(feature = "runtime")]
pub use scheduler::{Scheduler, SchedulerHandle, SharedEngine};
pub use snapshot::{TelemetrySnapshot, SNAPSHOT_VERSION};
pub use source::{DeltaDistribution, HoldSource, SampleSource, SyntheticSource};
pub use window::{SlidingWindow, WindowSnapshot, WindowStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tick cadence in milliseconds
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;

/// Default window capacity (last 30 seconds plus current)
pub const DEFAULT_WINDOW_CAPACITY: usize = 31;
