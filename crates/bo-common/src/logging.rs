//! Structured Logging Configuration
//!
//! - JSON output for production (`LOG_FORMAT=json`)
//! - Human-readable output for development (default)
//!
//! # Environment Variables
//!
//! - `LOG_FORMAT`: "json" for JSON output, anything else for text
//! - `RUST_LOG`: standard level filter (default: info),
//!   e.g. `RUST_LOG=bo_platform=debug,tower_http=info`
//!
//! Request context (request id, user) is attached through spans; every
//! event emitted inside a span carries its fields.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Initialize logging for the named service.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(service_name: &str) {
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let initialized = if json {
        init_json_logging(env_filter)
    } else {
        init_text_logging(env_filter)
    };

    if initialized {
        tracing::debug!(service = service_name, json, "Logging initialized");
    }
}

fn init_json_logging(env_filter: EnvFilter) -> bool {
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .flatten_event(true)
                .with_span_events(FmtSpan::CLOSE),
        )
        .try_init()
        .is_ok()
}

fn init_text_logging(env_filter: EnvFilter) -> bool {
    tracing_subscriber::registry()
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
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_does_not_panic() {
        init_logging("bo-test");
        init_logging("bo-test");
    }
}
