// Tickscope - Real-time telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Periodic tick driver on tokio.
//!
//! The scheduler task is the only writer: it takes the engine's write lock
//! for a whole tick, so readers holding the read lock only ever see
//! completed ticks. The next tick is scheduled after the current one
//! finishes, so ticks never overlap. Late wakeups are not compensated.

use crate::engine::{TelemetryEngine, TickOutcome};
use crate::snapshot::TelemetrySnapshot;
use log::{info, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

/// Engine shared between the scheduler and readers.
pub type SharedEngine = Arc<RwLock<TelemetryEngine>>;

/// Callback run after every completed tick, outside the engine lock.
pub type TickObserver = Box<dyn Fn(&TelemetrySnapshot) + Send + Sync>;

/// Drives [`TelemetryEngine::tick`] at a fixed interval.
pub struct Scheduler {
    engine: SharedEngine,
    interval: Duration,
    observers: Vec<TickObserver>,
}

impl Scheduler {
    /// Take ownership of an engine; the interval comes from its config.
    pub fn new(engine: TelemetryEngine) -> Self {
        let interval = Duration::from_millis(engine.config().tick_interval_ms);
        Self::from_shared(Arc::new(RwLock::new(engine)), interval)
    }

    pub fn from_shared(engine: SharedEngine, interval: Duration) -> Self {
        Self {
            engine,
            interval: interval.max(Duration::from_millis(1)),
            observers: Vec::new(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Register a callback for completed ticks.
    pub fn on_tick(mut self, observer: impl Fn(&TelemetrySnapshot) + Send + Sync + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    pub fn engine(&self) -> SharedEngine {
        Arc::clone(&self.engine)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start the tick loop on the current tokio runtime.
    pub fn spawn(self) -> SchedulerHandle {
        let engine = Arc::clone(&self.engine);
        let shutdown = Arc::new(Notify::new());
        let running = Arc::new(AtomicBool::new(true));

        let task = tokio::spawn(self.run(Arc::clone(&shutdown), Arc::clone(&running)));

        SchedulerHandle {
            engine,
            shutdown,
            running,
            task: Some(task),
        }
    }

    async fn run(self, shutdown: Arc<Notify>, running: Arc<AtomicBool>) -> u64 {
        info!("Scheduler started: {} ms interval", self.interval.as_millis());
        let mut completed = 0u64;
        let mut deadline = Instant::now() + self.interval;

        loop {
            tokio::select! {
                _ = shutdown.notified() => break,
                _ = sleep_until(deadline) => {}
            }

            let late = Instant::now().saturating_duration_since(deadline);
            if !late.is_zero() {
                trace!("Tick fired {} ms late", late.as_millis());
            }

            let published = {
                let mut engine = self.engine.write().await;
                match engine.tick() {
                    Ok(TickOutcome::Completed { .. }) => Some(engine.snapshot()),
                    Ok(TickOutcome::Paused) => None,
                    Err(e) => {
                        warn!("Tick failed: {}", e);
                        None
                    }
                }
            };

            if let Some(snapshot) = published {
                completed += 1;
                for observer in &self.observers {
                    observer(snapshot.as_ref());
                }
            }

            deadline = Instant::now() + self.interval;
        }

        running.store(false, Ordering::SeqCst);
        info!("Scheduler stopped after {} ticks", completed);
        completed
    }
}

/// Handle to a running scheduler. Dropping it stops the loop.
pub struct SchedulerHandle {
    engine: SharedEngine,
    shutdown: Arc<Notify>,
    running: Arc<AtomicBool>,
    task: Option<JoinHandle<u64>>,
}

impl SchedulerHandle {
    pub fn engine(&self) -> SharedEngine {
        Arc::clone(&self.engine)
    }

    pub async fn set_live(&self, live: bool) -> bool {
        self.engine.write().await.set_live(live)
    }

    pub async fn is_live(&self) -> bool {
        self.engine.read().await.is_live()
    }

    pub async fn snapshot(&self) -> Arc<TelemetrySnapshot> {
        self.engine.read().await.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Cancel the pending tick and wait for the loop to exit.
    /// Returns the number of ticks the loop completed.
    pub async fn shutdown(mut self) -> u64 {
        self.shutdown.notify_one();
        let Some(task) = self.task.take() else {
            return 0;
        };
        match task.await {
            Ok(completed) => completed,
            Err(e) => {
                warn!("Scheduler task ended abnormally: {}", e);
                0
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            // The permit is kept until the loop next polls `notified()`
            self.shutdown.notify_one();
        }
    }
}
