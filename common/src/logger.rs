use std::future::Future;
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use tracing::{Level, Span};
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// Initializes the process-wide `tracing` subscriber once. Safe to call from
/// multiple test modules; later calls are no-ops.
pub fn init_tracing(service_name: &'static str, json: bool) {
    LOGGER_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let builder = fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_span_events(fmt::format::FmtSpan::CLOSE);

        if json {
            builder.json().init();
        } else {
            builder.pretty().init();
        }

        tracing::info!(service = service_name, "logger initialized");
    });
}

/// Correlation id threaded through one cron invocation or API call.
#[derive(Clone, Debug)]
pub struct TraceId(Uuid);

impl TraceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_str(&self) -> String {
        self.0.as_hyphenated().to_string()
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

/// Root span for a request / cron tick / job run.
pub fn root_span(name: &'static str, trace_id: &TraceId) -> Span {
    tracing::span!(Level::INFO, "root", op = name, trace_id = %trace_id.as_str())
}

/// Child span inheriting the active root span's fields.
pub fn child_span(name: &'static str) -> Span {
    tracing::span!(Level::INFO, "step", op = name)
}

pub fn annotate_span(span: &Span, key: &'static str, value: impl std::fmt::Display) {
    span.record(key, tracing::field::display(value));
}

/// Runs `fut` and logs a warning if it takes longer than `max_duration`.
/// Used around store/notifier/broadcaster calls, which are the system's
/// suspension points and the ones most worth flagging when slow.
pub async fn warn_if_slow<F, T>(label: &'static str, max_duration: Duration, fut: F) -> T
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    let result = fut.await;
    let elapsed = start.elapsed();
    if elapsed > max_duration {
        tracing::warn!(label, ?elapsed, ?max_duration, "slow operation");
    }
    result
}
