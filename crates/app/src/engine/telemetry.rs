//! Tracing subscribers, the Prometheus recorder, and dispatcher-inheriting threads.

use std::{io, panic, path::Path, sync::OnceLock, thread, time::Duration};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{
    filter::{EnvFilter, filter_fn},
    fmt,
    prelude::*,
};

use crate::engine::config::TelemetryOptions;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static PROM_UPKEEP_THREAD: OnceLock<thread::JoinHandle<()>> = OnceLock::new();

/// Keeps the engine's subscriber installed and the chrome trace flushing.
pub(crate) struct TelemetryGuard {
    _default_guard: tracing::subscriber::DefaultGuard,
    _chrome_guard: Option<tracing_chrome::FlushGuard>,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// What [`init_metrics_recorder`] did with the global recorder slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RecorderInit {
    Installed,
    /// An earlier call in this process already installed it.
    Reused,
    /// Another recorder owns the global slot; `/metrics` renders nothing.
    Foreign(String),
}

/// Install the global Prometheus recorder once.
pub(crate) fn init_metrics_recorder() -> RecorderInit {
    let mut outcome = RecorderInit::Reused;
    PROM_HANDLE.get_or_init(|| {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        outcome = match metrics::set_global_recorder(recorder) {
            Ok(()) => RecorderInit::Installed,
            Err(err) => RecorderInit::Foreign(err.to_string()),
        };
        describe_metrics();

        let upkeep_handle = handle.clone();
        PROM_UPKEEP_THREAD.get_or_init(|| {
            spawn_thread("prometheus-upkeep", move || {
                loop {
                    thread::sleep(Duration::from_secs(5));
                    upkeep_handle.run_upkeep();
                }
            })
            .expect("failed to spawn prometheus upkeep thread")
        });

        handle
    });
    outcome
}

pub(crate) fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROM_HANDLE.get()
}

fn describe_metrics() {
    metrics::describe_histogram!(
        "juggler_tick_seconds",
        metrics::Unit::Seconds,
        "Wall time of one engine tick, capture excluded"
    );
    metrics::describe_gauge!("juggler_fps", "Smoothed processed frames per second");
    metrics::describe_gauge!("juggler_observations", "Balls observed on the last tick");
    metrics::describe_counter!(
        "juggler_frames_skipped_total",
        "Ticks skipped because a color or depth frame was missing"
    );
    metrics::describe_counter!(
        "juggler_telemetry_dropped_total",
        "Telemetry frames dropped for lagging subscribers"
    );
    metrics::describe_counter!(
        "juggler_datagram_errors_total",
        "Actuator datagrams that failed to send"
    );
    metrics::describe_counter!("juggler_commands_total", "Commands routed, by source");
}

/// Install the engine's subscriber on the current thread.
pub(crate) fn enter_runtime(opts: &TelemetryOptions) -> TelemetryGuard {
    let (chrome_layer, chrome_guard) = match opts.chrome_trace_path.as_deref() {
        Some(path) => match build_chrome_layer(path) {
            Ok((layer, guard)) => (Some(layer), Some(guard)),
            Err(err) => {
                tracing::warn!(
                    "failed to initialise chrome trace writer at {}: {err}",
                    path.display()
                );
                (None, None)
            }
        },
        None => (None, None),
    };

    let console_layer = if !opts.enable_tokio_console {
        None
    } else if chrome_layer.is_some() {
        tracing::warn!(
            "Chrome trace and tokio-console enabled together; defaulting to chrome trace only"
        );
        None
    } else {
        match panic::catch_unwind(|| {
            console_subscriber::ConsoleLayer::builder()
                .with_default_env()
                .spawn()
        }) {
            Ok(layer) => Some(layer),
            Err(_) => {
                tracing::warn!(
                    "tokio-console requested but current build lacks `tokio_unstable`; skipping console layer"
                );
                None
            }
        }
    };

    let subscriber = tracing_subscriber::registry()
        .with(chrome_layer.map(|layer| layer.with_filter(filter_fn(|meta| meta.is_span()))))
        .with(console_layer)
        .with(
            fmt::layer()
                .with_target(false)
                .with_timer(fmt::time::uptime())
                .with_filter(env_filter()),
        )
        .with(tracing_error::ErrorLayer::default());

    TelemetryGuard {
        _default_guard: tracing::subscriber::set_default(subscriber),
        _chrome_guard: chrome_guard,
    }
}

/// Plain global logging for the short-lived subcommands.
pub(crate) fn init_cli_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

/// Spawn a thread that inherits the current tracing dispatcher.
pub(crate) fn spawn_thread<F, T>(name: impl Into<String>, f: F) -> io::Result<thread::JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let dispatch = tracing::dispatcher::get_default(|current| current.clone());
    thread::Builder::new()
        .name(name.into())
        .spawn(move || tracing::dispatcher::with_default(&dispatch, f))
}

fn build_chrome_layer(
    path: &Path,
) -> io::Result<(
    tracing_chrome::ChromeLayer<tracing_subscriber::Registry>,
    tracing_chrome::FlushGuard,
)> {
    let file = std::fs::File::create(path)?;
    Ok(tracing_chrome::ChromeLayerBuilder::new()
        .writer(file)
        .include_args(true)
        .trace_style(tracing_chrome::TraceStyle::Threaded)
        .build())
}
