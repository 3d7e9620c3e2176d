//! # Tracing and Request Correlation
//!
//! Every API request carries a trace id, taken from an incoming
//! `x-request-id` header or freshly minted. The id lives in task-local
//! storage for the request's lifetime so error payloads and auth failures
//! can echo it back to the caller without threading it through every
//! signature. Subscriber setup is once-only and routes legacy `log`
//! records through tracing.

use std::sync::atomic::{AtomicBool, Ordering};

use axum::{extract::Request, middleware::Next, response::Response};
use thiserror::Error;
use tokio::task_local;
use tracing::Instrument;
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::Layer,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::AppConfig;

/// Correlation id scoped to one request
#[derive(Debug, Clone)]
pub struct TraceContext {
    pub trace_id: String,
}

task_local! {
    static ACTIVE_TRACE_CONTEXT: TraceContext;
}

/// Errors from global telemetry initialization
#[derive(Debug, Error)]
pub enum TelemetryInitError {
    #[error("failed to install log tracer bridge: {0}")]
    LogTracer(#[from] log::SetLoggerError),
}

static TELEMETRY_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize the global subscriber exactly once.
///
/// `RUST_LOG` overrides the configured log level; the format layer is json
/// unless the config asks for pretty output. Repeat calls are no-ops, and a
/// subscriber installed earlier (tests do this) is left in place.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryInitError> {
    if TELEMETRY_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Ok(());
    }

    // The log bridge may already be registered by an earlier subscriber;
    // that is fine, records keep flowing through it.
    let _ = LogTracer::builder()
        .with_max_level(log::LevelFilter::Trace)
        .init();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let fmt_layer = match config.log_format.as_str() {
        "pretty" => fmt::layer().pretty().boxed(),
        _ => fmt::layer().json().boxed(),
    };

    if tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!("A tracing subscriber was already installed; keeping it");
    }

    Ok(())
}

/// Middleware attaching a trace context to every request.
///
/// Honors an incoming `x-request-id` so ids minted by a fronting proxy
/// survive into our logs; otherwise a fresh UUID is used. The context is
/// stored both in request extensions (for middleware running later) and in
/// task-local storage (for everything under the handler).
pub async fn trace_middleware(mut request: Request, next: Next) -> Response {
    let trace_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let context = TraceContext {
        trace_id: trace_id.clone(),
    };
    request.extensions_mut().insert(context.clone());

    let span = tracing::info_span!("request", trace_id = %trace_id);
    with_trace_context(context, next.run(request).instrument(span)).await
}

/// Run `future` with the given trace context active in task-local storage.
pub async fn with_trace_context<Fut, R>(context: TraceContext, future: Fut) -> R
where
    Fut: std::future::Future<Output = R>,
{
    ACTIVE_TRACE_CONTEXT.scope(context, future).await
}

/// The trace id of the current request, if one is active.
pub fn current_trace_id() -> Option<String> {
    ACTIVE_TRACE_CONTEXT
        .try_with(|ctx| ctx.trace_id.clone())
        .ok()
}
