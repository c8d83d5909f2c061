// Tickscope Exporter - HTTP and Prometheus exporter for Tickscope
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Tickscope Exporter
//!
//! Runs the telemetry engine on a 1 Hz scheduler and serves its windows,
//! aggregates and alerts to the dashboard, plus Prometheus metrics.
//!
//! ## Usage
//!
//! ```bash
//! # Synthetic telemetry, reproducible
//! tickscope-exporter --seed 42
//!
//! # Replay a recording, starting paused
//! tickscope-exporter --replay recording.csv --paused --port 9090
//! ```

mod metrics;

#[cfg(feature = "replay")]
mod replay;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use metrics::encode_metrics;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tickscope::{
    AggregateSnapshot, AlertEvent, ChannelRegistry, EngineConfig, EngineError, Frame, Scheduler,
    SharedEngine, TelemetryEngine, WindowSnapshot,
};
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "replay")]
use replay::{RecordedSource, ReplayError, ReplayState};

/// Tickscope telemetry exporter
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "9100")]
    port: u16,

    /// Engine configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tick interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Frames kept per group window
    #[arg(long)]
    capacity: Option<usize>,

    /// Utilization alert threshold
    #[arg(long)]
    threshold: Option<f64>,

    /// Seed for synthetic telemetry
    #[arg(long)]
    seed: Option<u64>,

    /// CSV recording to replay instead of synthetic telemetry
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Stop at the end of the recording instead of looping
    #[arg(long)]
    no_loop: bool,

    /// Start paused
    #[arg(long)]
    paused: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Exporter errors.
#[derive(Debug, thiserror::Error)]
enum ExporterError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[cfg(feature = "replay")]
    #[error("Replay error: {0}")]
    Replay(#[from] ReplayError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state shared across handlers.
struct AppState {
    engine: SharedEngine,
    #[cfg(feature = "replay")]
    replay_state: Option<Arc<ReplayState>>,
    start_time: std::time::Instant,
}

/// Engine configuration from the optional file, with flags applied on top.
fn load_config(args: &Args) -> Result<EngineConfig, EngineError> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };

    if let Some(interval_ms) = args.interval_ms {
        config.tick_interval_ms = interval_ms;
    }
    if let Some(capacity) = args.capacity {
        config.window_capacity = capacity;
    }
    if let Some(threshold) = args.threshold {
        config.alerts.utilization_high_threshold = threshold;
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if args.paused {
        config.start_paused = true;
    }

    config.validate()?;
    Ok(config)
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), ExporterError> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    info!("Tickscope Exporter v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args)?;
    let registry = ChannelRegistry::embedded_default();
    let builder = TelemetryEngine::builder(registry.clone()).config(config);

    #[cfg(feature = "replay")]
    let (builder, replay_state) = match &args.replay {
        Some(path) => {
            let source = RecordedSource::from_csv(path, !args.no_loop)?;
            source.check_channels(&registry)?;
            let dataset = source.dataset_info();
            info!(
                "Replaying {} channels over {} rows ({} ms recorded)",
                dataset.channel_count, dataset.row_count, dataset.duration_ms
            );
            let state = source.state();
            (builder.source(source), Some(state))
        }
        None => {
            info!("No recording specified, generating synthetic telemetry");
            (builder, None)
        }
    };

    #[cfg(not(feature = "replay"))]
    if args.replay.is_some() {
        tracing::warn!("Replay feature not enabled, ignoring --replay argument");
    }

    let engine = builder.build()?;
    metrics::update_from_snapshot(&engine.snapshot());

    let handle = Scheduler::new(engine)
        .on_tick(|snapshot| {
            metrics::update_from_snapshot(snapshot);
            metrics::record_alerts(snapshot);
        })
        .spawn();

    let state = Arc::new(AppState {
        engine: handle.engine(),
        #[cfg(feature = "replay")]
        replay_state,
        start_time: std::time::Instant::now(),
    });

    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Starting server on http://{}", addr);
    info!("Metrics endpoint: http://{}/metrics", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let ticks = handle.shutdown().await;
    info!("Exporter stopped after {} ticks", ticks);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/status", get(status_handler))
        .route("/snapshot", get(snapshot_handler))
        .route("/windows/:group", get(window_handler))
        .route("/aggregates/:group", get(aggregate_handler))
        .route("/alerts", get(alerts_handler))
        .route("/live", post(live_handler))
        .with_state(state)
}

/// Engine errors as HTTP responses.
struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        if self.0.is_reference_error() {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Root handler - shows a simple HTML page.
async fn root_handler() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Tickscope Exporter</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 800px; margin: 50px auto; padding: 20px; }
        h1 { color: #2c3e50; }
        a { color: #3498db; text-decoration: none; }
        .endpoints { background: #f8f9fa; padding: 20px; border-radius: 8px; margin: 20px 0; }
        .endpoint { margin: 10px 0; }
        code { background: #e9ecef; padding: 2px 6px; border-radius: 4px; }
    </style>
</head>
<body>
    <h1>Tickscope Exporter</h1>
    <p>Real-time CPU, memory, I/O and DMA telemetry.</p>

    <div class="endpoints">
        <h2>Endpoints</h2>
        <div class="endpoint"><a href="/snapshot">/snapshot</a> - Windows, aggregates and alerts of the last tick</div>
        <div class="endpoint"><code>/windows/{group}</code> - One group's window (cpu, memory, io, dma)</div>
        <div class="endpoint"><code>/aggregates/{group}</code> - One group's aggregates</div>
        <div class="endpoint"><a href="/alerts">/alerts</a> - Active alerts</div>
        <div class="endpoint"><code>POST /live {"live": false}</code> - Pause or resume</div>
        <div class="endpoint"><a href="/metrics">/metrics</a> - Prometheus metrics</div>
        <div class="endpoint"><a href="/health">/health</a> - Health check</div>
        <div class="endpoint"><a href="/ready">/ready</a> - Readiness check</div>
        <div class="endpoint"><a href="/status">/status</a> - Status information (JSON)</div>
    </div>
</body>
</html>"#,
    )
}

/// Metrics handler - returns Prometheus text format.
async fn metrics_handler() -> impl IntoResponse {
    let metrics = encode_metrics();
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        metrics,
    )
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness check handler. Ready once every window holds a frame.
async fn ready_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.engine.read().await.snapshot();
    if snapshot.windows.values().all(|w| !w.is_empty()) {
        (StatusCode::OK, "Ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Warming up")
    }
}

/// Status information response.
#[derive(Serialize)]
struct StatusResponse {
    version: String,
    uptime_secs: u64,
    live: bool,
    tick: u64,
    timestamp_ms: u64,
    source: String,
    channels: usize,
    groups: Vec<String>,
    alerts: usize,
    clamped_values: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    replay: Option<ReplayStatus>,
}

/// Replay status information.
#[derive(Serialize)]
struct ReplayStatus {
    position: usize,
    total_rows: usize,
    progress_percent: f64,
    loops: u64,
    finished: bool,
}

/// Status handler - returns JSON status information.
async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    #[cfg(feature = "replay")]
    let replay = state.replay_state.as_ref().map(|replay| ReplayStatus {
        position: replay.position.load(Ordering::SeqCst),
        total_rows: replay.total_rows.load(Ordering::SeqCst),
        progress_percent: replay.progress_percent(),
        loops: replay.loops.load(Ordering::SeqCst),
        finished: replay.finished.load(Ordering::SeqCst),
    });

    #[cfg(not(feature = "replay"))]
    let replay: Option<ReplayStatus> = None;

    let engine = state.engine.read().await;
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        live: engine.is_live(),
        tick: engine.tick_count(),
        timestamp_ms: engine.last_timestamp_ms(),
        source: engine.source_name().to_string(),
        channels: engine.registry().len(),
        groups: engine.groups().iter().map(|g| g.to_string()).collect(),
        alerts: engine.alerts().len(),
        clamped_values: engine.clamped_values(),
        replay,
    })
}

async fn snapshot_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.engine.read().await.snapshot();
    Json(snapshot)
}

#[derive(Serialize)]
struct WindowResponse {
    group: String,
    capacity: usize,
    frames: WindowSnapshot<Frame>,
}

async fn window_handler(
    State(state): State<Arc<AppState>>,
    Path(group): Path<String>,
) -> Result<Json<WindowResponse>, ApiError> {
    let engine = state.engine.read().await;
    let frames = engine.window(&group)?;
    Ok(Json(WindowResponse {
        capacity: engine.config().window_capacity,
        group,
        frames,
    }))
}

async fn aggregate_handler(
    State(state): State<Arc<AppState>>,
    Path(group): Path<String>,
) -> Result<Json<AggregateSnapshot>, ApiError> {
    let engine = state.engine.read().await;
    Ok(Json(engine.aggregate(&group)?.clone()))
}

async fn alerts_handler(State(state): State<Arc<AppState>>) -> Json<Vec<AlertEvent>> {
    Json(state.engine.read().await.alerts().to_vec())
}

#[derive(Debug, Deserialize)]
struct LiveRequest {
    live: bool,
}

#[derive(Debug, Serialize)]
struct LiveResponse {
    live: bool,
    changed: bool,
}

async fn live_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LiveRequest>,
) -> Json<LiveResponse> {
    let mut engine = state.engine.write().await;
    let changed = engine.set_live(request.live);
    metrics::update_from_snapshot(&engine.snapshot());
    Json(LiveResponse {
        live: engine.is_live(),
        changed,
    })
}
