// Tickscope - Real-time telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Live/pause control.

use serde::{Deserialize, Serialize};

/// Whether scheduled ticks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiveState {
    #[default]
    Live,
    Paused,
}

impl LiveState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LiveState::Live => "live",
            LiveState::Paused => "paused",
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, LiveState::Live)
    }
}

impl From<bool> for LiveState {
    fn from(live: bool) -> Self {
        if live {
            LiveState::Live
        } else {
            LiveState::Paused
        }
    }
}

/// Two-state switch with a transition counter.
#[derive(Debug, Clone, Default)]
pub struct LiveControl {
    state: LiveState,
    transitions: u64,
}

impl LiveControl {
    pub fn new(state: LiveState) -> Self {
        Self {
            state,
            transitions: 0,
        }
    }

    /// Set the state. Idempotent; returns whether it changed.
    pub fn set_live(&mut self, live: bool) -> bool {
        let next = LiveState::from(live);
        if next == self.state {
            return false;
        }
        self.state = next;
        self.transitions += 1;
        true
    }

    pub fn is_live(&self) -> bool {
        self.state.is_live()
    }

    pub fn state(&self) -> LiveState {
        self.state
    }

    /// Number of state changes since creation.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }
}
