//! # Structured Logging Module
//!
//! Environment-aware structured logging for the dispatcher. Console output is
//! human readable by default and switches to JSON lines when
//! `PAPA_EVENTS_LOG_FORMAT=json`.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));

        let console = if use_json_format() {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        // Another global subscriber (e.g. the host application's) wins
        if tracing_subscriber::registry().with(console).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            "Structured logging initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("PAPA_EVENTS_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "test" => "debug".to_string(),
        "development" => "debug".to_string(),
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

fn use_json_format() -> bool {
    std::env::var("PAPA_EVENTS_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Log structured data for registry operations
pub fn log_registry_operation(
    operation: &str,
    use_case: &str,
    patterns: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        use_case = %use_case,
        patterns = patterns,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "REGISTRY_OPERATION"
    );
}

/// Log structured data for lifecycle transitions
pub fn log_lifecycle_transition(from: &str, to: &str, details: Option<&str>) {
    tracing::info!(
        from = %from,
        to = %to,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "LIFECYCLE_TRANSITION"
    );
}

/// Log a contained handler failure with full context
pub fn log_handler_failure(use_case: &str, routing_key: &str, attempts: u32, error: &str) {
    tracing::error!(
        use_case = %use_case,
        routing_key = %routing_key,
        attempts = attempts,
        error = %error,
        timestamp = %Utc::now().to_rfc3339(),
        "HANDLER_FAILURE"
    );
}
