// Tickscope Exporter - Recorded telemetry replay
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Replay of recorded telemetry from CSV.
//!
//! The file has a `timestamp_ms` column followed by one column per
//! `<channel_id>.<metric>`, e.g. `dma.camera.throughput`. The channel id is
//! everything before the last dot. Each engine tick consumes one row.
//! Empty cells keep the channel's previous value.

use crate::metrics::update_replay_metrics;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tickscope::{Channel, ChannelRegistry, Sample, SampleSource};
use tracing::{debug, info};

/// Progress shared with the HTTP handlers.
#[derive(Debug)]
pub struct ReplayState {
    /// Row used by the last tick.
    pub position: AtomicUsize,
    /// Rows in the dataset.
    pub total_rows: AtomicUsize,
    /// Completed passes over the dataset.
    pub loops: AtomicU64,
    /// Set once the first row has been consumed.
    pub started: AtomicBool,
    /// Set once a non-looping replay has reached its last row.
    pub finished: AtomicBool,
}

impl ReplayState {
    fn new(total_rows: usize) -> Self {
        Self {
            position: AtomicUsize::new(0),
            total_rows: AtomicUsize::new(total_rows),
            loops: AtomicU64::new(0),
            started: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        }
    }

    pub fn progress_percent(&self) -> f64 {
        let total = self.total_rows.load(Ordering::SeqCst);
        if total == 0 || !self.started.load(Ordering::SeqCst) {
            return 0.0;
        }
        let position = self.position.load(Ordering::SeqCst);
        ((position + 1) as f64 / total as f64) * 100.0
    }
}

/// One recorded row: partial readings keyed by channel id.
#[derive(Debug, Clone)]
struct RecordedRow {
    timestamp_ms: u64,
    readings: HashMap<String, Vec<(String, f64)>>,
}

/// A column of the recording.
#[derive(Debug, Clone, PartialEq)]
struct Column {
    channel_id: String,
    metric: String,
}

impl Column {
    fn parse(header: &str) -> Result<Self, ReplayError> {
        match header.trim().rsplit_once('.') {
            Some((channel_id, metric)) if !channel_id.is_empty() && !metric.is_empty() => {
                Ok(Self {
                    channel_id: channel_id.to_string(),
                    metric: metric.to_string(),
                })
            }
            _ => Err(ReplayError::InvalidFormat(format!(
                "Column '{}' is not <channel>.<metric>",
                header
            ))),
        }
    }
}

/// [`SampleSource`] that plays back a recording.
pub struct RecordedSource {
    columns: Vec<Column>,
    rows: Vec<RecordedRow>,
    cursor: Option<usize>,
    loop_replay: bool,
    state: Arc<ReplayState>,
}

impl RecordedSource {
    /// Load a recording from a CSV file.
    pub fn from_csv(path: impl AsRef<Path>, loop_replay: bool) -> Result<Self, ReplayError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ReplayError::FileNotFound(path.display().to_string()));
        }
        let (columns, rows) = Self::parse_csv(path)?;
        if rows.is_empty() {
            return Err(ReplayError::EmptyDataset);
        }

        info!(
            "Loaded recording {}: {} columns, {} rows",
            path.display(),
            columns.len(),
            rows.len()
        );

        let state = Arc::new(ReplayState::new(rows.len()));
        Ok(Self {
            columns,
            rows,
            cursor: None,
            loop_replay,
            state,
        })
    }

    /// Parse a CSV file into columns and rows.
    fn parse_csv(path: &Path) -> Result<(Vec<Column>, Vec<RecordedRow>), ReplayError> {
        let mut reader = csv::Reader::from_path(path)?;

        let headers = reader.headers()?.clone();
        let header_strs: Vec<&str> = headers.iter().collect();
        if header_strs.is_empty() || header_strs[0].trim() != "timestamp_ms" {
            return Err(ReplayError::InvalidFormat(
                "First column must be 'timestamp_ms'".to_string(),
            ));
        }
        let columns = header_strs[1..]
            .iter()
            .map(|h| Column::parse(h))
            .collect::<Result<Vec<_>, _>>()?;

        let mut rows = Vec::new();
        for (line, result) in reader.records().enumerate() {
            let record = result?;
            let values: Vec<&str> = record.iter().collect();
            if values.is_empty() {
                continue;
            }

            let timestamp_ms: u64 = values[0].trim().parse().map_err(|_| {
                ReplayError::InvalidFormat(format!("Invalid timestamp on row {}", line + 1))
            })?;

            let mut readings: HashMap<String, Vec<(String, f64)>> = HashMap::new();
            for (i, column) in columns.iter().enumerate() {
                let Some(cell) = values.get(i + 1).map(|s| s.trim()) else {
                    continue;
                };
                if cell.is_empty() {
                    continue;
                }
                let value: f64 = cell.parse().map_err(|_| {
                    ReplayError::InvalidFormat(format!(
                        "Invalid value '{}' for {}.{} on row {}",
                        cell,
                        column.channel_id,
                        column.metric,
                        line + 1
                    ))
                })?;
                readings
                    .entry(column.channel_id.clone())
                    .or_default()
                    .push((column.metric.clone(), value));
            }

            rows.push(RecordedRow {
                timestamp_ms,
                readings,
            });
        }

        Ok((columns, rows))
    }

    /// Reject recordings that name channels the registry does not have.
    pub fn check_channels(&self, registry: &ChannelRegistry) -> Result<(), ReplayError> {
        for column in &self.columns {
            if registry.get(&column.channel_id).is_err() {
                return Err(ReplayError::UnknownChannel(column.channel_id.clone()));
            }
        }
        Ok(())
    }

    pub fn state(&self) -> Arc<ReplayState> {
        Arc::clone(&self.state)
    }

    pub fn dataset_info(&self) -> DatasetInfo {
        let duration_ms = match (self.rows.first(), self.rows.last()) {
            (Some(first), Some(last)) => last.timestamp_ms.saturating_sub(first.timestamp_ms),
            _ => 0,
        };

        let mut channel_ids: Vec<String> = Vec::new();
        for column in &self.columns {
            if !channel_ids.contains(&column.channel_id) {
                channel_ids.push(column.channel_id.clone());
            }
        }

        DatasetInfo {
            channel_count: channel_ids.len(),
            row_count: self.rows.len(),
            duration_ms,
            channel_ids,
        }
    }

    fn current_row(&self) -> Option<&RecordedRow> {
        self.cursor.and_then(|i| self.rows.get(i))
    }
}

impl SampleSource for RecordedSource {
    fn begin_tick(&mut self, _timestamp_ms: u64) {
        let next = match self.cursor {
            None => 0,
            Some(i) if i + 1 < self.rows.len() => i + 1,
            Some(_) if self.loop_replay => {
                self.state.loops.fetch_add(1, Ordering::SeqCst);
                debug!("Recording complete, looping");
                0
            }
            Some(i) => {
                if !self.state.finished.swap(true, Ordering::SeqCst) {
                    info!("Recording complete, holding last row");
                }
                i
            }
        };

        self.cursor = Some(next);
        self.state.position.store(next, Ordering::SeqCst);
        self.state.started.store(true, Ordering::SeqCst);
        update_replay_metrics(next, self.rows.len());
    }

    fn next_sample(&mut self, channel: &Channel, previous: &Sample, timestamp_ms: u64) -> Sample {
        let mut sample = Sample {
            timestamp_ms,
            values: previous.values.clone(),
        };
        if let Some(readings) = self.current_row().and_then(|r| r.readings.get(&channel.id)) {
            for (metric, value) in readings {
                sample.set(metric, *value);
            }
        }
        sample
    }

    fn name(&self) -> &str {
        "replay"
    }
}

/// Dataset information.
#[derive(Debug, Clone)]
pub struct DatasetInfo {
    pub channel_count: usize,
    pub row_count: usize,
    pub duration_ms: u64,
    pub channel_ids: Vec<String>,
}

/// Replay errors.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Unknown channel in recording: {0}")]
    UnknownChannel(String),

    #[error("Empty dataset")]
    EmptyDataset,
}
