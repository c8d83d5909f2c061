// Tickscope - Real-time telemetry engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Fixed-capacity sliding windows and the per-group window store.
//!
//! Appends are staged and become visible to readers on [`SlidingWindow::commit`].
//! Readers only ever hold a [`WindowSnapshot`], an immutable shared slice,
//! so a later append can never change what they see.

use crate::error::{EngineError, Result};
use crate::sample::Timestamped;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

/// Immutable view of a window's contents, oldest first.
pub type WindowSnapshot<T> = Arc<[T]>;

/// Bounded FIFO of timestamped items.
#[derive(Debug, Clone)]
pub struct SlidingWindow<T> {
    items: VecDeque<T>,
    capacity: usize,
    published: WindowSnapshot<T>,
    dirty: bool,
    evicted: u64,
}

impl<T: Clone + Timestamped> SlidingWindow<T> {
    /// Create an empty window. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            published: Arc::from(Vec::new()),
            dirty: false,
            evicted: 0,
        }
    }

    /// Rebuild a window from recorded items and publish it.
    pub fn replay(capacity: usize, items: impl IntoIterator<Item = T>) -> Result<Self> {
        let mut window = Self::new(capacity);
        for item in items {
            window.append(item)?;
        }
        window.commit();
        Ok(window)
    }

    /// Append an item, evicting the oldest one when full.
    ///
    /// Items must not be older than the newest item already held.
    pub fn append(&mut self, item: T) -> Result<Option<T>> {
        if let Some(last) = self.items.back() {
            if item.timestamp_ms() < last.timestamp_ms() {
                return Err(EngineError::OutOfOrderSample {
                    last_ms: last.timestamp_ms(),
                    timestamp_ms: item.timestamp_ms(),
                });
            }
        }

        let evicted = if self.items.len() == self.capacity {
            self.evicted += 1;
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        self.dirty = true;
        Ok(evicted)
    }

    /// Publish staged appends to readers.
    pub fn commit(&mut self) {
        if self.dirty {
            self.published = self.items.iter().cloned().collect();
            self.dirty = false;
        }
    }

    /// Last committed contents. Calls without an intervening commit return
    /// the same allocation.
    pub fn snapshot(&self) -> WindowSnapshot<T> {
        Arc::clone(&self.published)
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn oldest(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total items evicted since creation.
    pub fn evicted_count(&self) -> u64 {
        self.evicted
    }

    /// Time span covered, `(oldest, newest)`.
    pub fn time_range(&self) -> Option<(u64, u64)> {
        match (self.items.front(), self.items.back()) {
            (Some(first), Some(last)) => Some((first.timestamp_ms(), last.timestamp_ms())),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.dirty = true;
    }
}

/// Arena of windows keyed by group id.
#[derive(Debug, Clone)]
pub struct WindowStore<T> {
    windows: BTreeMap<String, SlidingWindow<T>>,
}

impl<T: Clone + Timestamped> WindowStore<T> {
    pub fn new() -> Self {
        Self {
            windows: BTreeMap::new(),
        }
    }

    /// Register a group with an empty window. Existing groups are kept.
    pub fn register_group(&mut self, group: &str, capacity: usize) {
        self.windows
            .entry(group.to_string())
            .or_insert_with(|| SlidingWindow::new(capacity));
    }

    pub fn get(&self, group: &str) -> Result<&SlidingWindow<T>> {
        self.windows
            .get(group)
            .ok_or_else(|| EngineError::UnknownGroup(group.to_string()))
    }

    pub fn get_mut(&mut self, group: &str) -> Result<&mut SlidingWindow<T>> {
        self.windows
            .get_mut(group)
            .ok_or_else(|| EngineError::UnknownGroup(group.to_string()))
    }

    pub fn snapshot(&self, group: &str) -> Result<WindowSnapshot<T>> {
        self.get(group).map(SlidingWindow::snapshot)
    }

    /// Snapshots of every group.
    pub fn snapshots(&self) -> BTreeMap<String, WindowSnapshot<T>> {
        self.windows
            .iter()
            .map(|(group, window)| (group.clone(), window.snapshot()))
            .collect()
    }

    pub fn commit_all(&mut self) {
        for window in self.windows.values_mut() {
            window.commit();
        }
    }

    pub fn groups(&self) -> impl Iterator<Item = &String> {
        self.windows.keys()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

impl<T: Clone + Timestamped> Default for WindowStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
