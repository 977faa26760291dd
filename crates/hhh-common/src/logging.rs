//! Structured Logging Configuration
//!
//! The session core only emits `tracing` events; the host decides where they
//! go by calling one of the initializers here once at startup.
//!
//! # Environment Variables
//!
//! - `LOG_FORMAT`: Set to "json" for JSON output, anything else for text (default: text)
//! - `RUST_LOG`: Standard log level filter (default: info)
//!   Examples: `RUST_LOG=debug`, `RUST_LOG=hhh_session=trace`
//!
//! Bearer tokens must never appear in log fields. Log the request path and
//! status instead.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter, Registry,
};

/// Initialize logging for the given service.
///
/// Panics if a global subscriber is already installed. Use
/// [`try_init_logging`] where that can happen (tests, embedded hosts).
pub fn init_logging(service_name: &str) {
    if let Err(err) = try_init_logging(service_name) {
        panic!("failed to initialize logging for {}: {}", service_name, err);
    }
}

/// Initialize logging, returning an error instead of panicking when a
/// global subscriber already exists.
pub fn try_init_logging(service_name: &str) -> Result<(), TryInitError> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    let env_filter = default_filter();

    let result = if log_format.eq_ignore_ascii_case("json") {
        init_json_logging(env_filter)
    } else {
        init_text_logging(env_filter)
    };

    if result.is_ok() {
        tracing::debug!(service = service_name, format = %log_format, "Logging initialized");
    }
    result
}

/// `RUST_LOG` if set and valid, otherwise `info`.
pub fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_json_logging(env_filter: EnvFilter) -> Result<(), TryInitError> {
    Registry::default()
        .with(env_filter)
        .with(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_target(true)
                .flatten_event(true)
                .with_span_events(FmtSpan::CLOSE),
        )
        .try_init()
}

fn init_text_logging(env_filter: EnvFilter) -> Result<(), TryInitError> {
    Registry::default()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(true),
        )
        .try_init()
}

/// Initialize logging with the default service name.
pub fn init_default_logging() {
    init_logging("hhh-jobs");
}
