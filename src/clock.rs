// Tickscope - Real-time telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Time sources for tick timestamps.

use chrono::Utc;

/// Supplies the timestamp of the next tick.
pub trait Clock: Send + Sync {
    fn now_ms(&mut self) -> u64;
}

/// Wall clock, UTC epoch milliseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&mut self) -> u64 {
        Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Logical clock advancing a fixed step per reading. Used for
/// deterministic runs and tests.
#[derive(Debug, Clone, Copy)]
pub struct StepClock {
    next_ms: u64,
    step_ms: u64,
}

impl StepClock {
    /// The first reading returns `start_ms`.
    pub fn new(start_ms: u64, step_ms: u64) -> Self {
        Self {
            next_ms: start_ms,
            step_ms,
        }
    }
}

impl Clock for StepClock {
    fn now_ms(&mut self) -> u64 {
        let now = self.next_ms;
        self.next_ms = self.next_ms.saturating_add(self.step_ms);
        now
    }
}
