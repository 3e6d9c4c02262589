//! Tracing setup and HTTP request instrumentation.
//!
//! Logs go to stdout by default. Setting `CARTABLE_LOG_DIR` switches to a
//! daily-rotated JSON file in that directory, written through a non-blocking
//! appender whose guard lives for the duration of the process.

use std::{sync::OnceLock, time::Duration};

use axum::http::{Request, Response};
use tower_http::trace::{MakeSpan, OnResponse};
use tracing::{Span, info_span};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static TRACING_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match std::env::var("CARTABLE_LOG_DIR") {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "cartable-server.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = TRACING_GUARD.set(guard);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(writer))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}

#[derive(Clone)]
pub struct HttpMakeSpan;

impl<B> MakeSpan<B> for HttpMakeSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        info_span!(
            "http request",
            method = %request.method(),
            path = %request.uri().path(),
        )
    }
}

/// Logs every response, escalating the level with the status class so
/// failures stand out without a separate error channel.
#[derive(Clone)]
pub struct ResponseLogger;

impl<B> OnResponse<B> for ResponseLogger {
    fn on_response(self, response: &Response<B>, latency: Duration, _span: &Span) {
        let status = response.status();
        let latency_ms = latency.as_millis() as u64;
        if status.is_server_error() {
            tracing::error!(status = %status, latency_ms, "request failed");
        } else if status.is_client_error() {
            tracing::warn!(status = %status, latency_ms, "request rejected");
        } else {
            tracing::info!(status = %status, latency_ms, "request completed");
        }
    }
}

pub fn http_make_span() -> HttpMakeSpan {
    HttpMakeSpan
}

pub fn response_logger() -> ResponseLogger {
    ResponseLogger
}
