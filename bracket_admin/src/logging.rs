//! Structured logging for the admin tool.
//!
//! The engine logs through the `log` facade; `init` bridges those records
//! into the tracing subscriber so both end up on stderr.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured logging
///
/// Levels are configurable via the RUST_LOG env var. Output goes to
/// stderr so command results on stdout stay machine readable.
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::debug!("Structured logging initialized");
}

/// Log how long an engine operation took
///
/// # Arguments
///
/// * `operation` - Engine operation name
/// * `duration_ms` - Duration in milliseconds
/// * `metadata` - Optional context, such as the stage or match id
pub fn log_performance(operation: &str, duration_ms: u64, metadata: Option<&str>) {
    if duration_ms > 1000 {
        tracing::warn!(
            operation = operation,
            duration_ms = duration_ms,
            metadata = metadata,
            "PERFORMANCE: Slow operation"
        );
    } else {
        tracing::debug!(
            operation = operation,
            duration_ms = duration_ms,
            metadata = metadata,
            "Performance metric"
        );
    }
}

/// Log a store round trip made on behalf of a command
///
/// # Arguments
///
/// * `operation` - Kind of access (connect, schema)
/// * `target` - What was touched
/// * `duration_ms` - Duration in milliseconds
pub fn log_database_operation(operation: &str, target: &str, duration_ms: u64) {
    tracing::debug!(
        operation = operation,
        target_name = target,
        duration_ms = duration_ms,
        "Database operation"
    );

    if duration_ms > 250 {
        tracing::warn!(
            operation = operation,
            target_name = target,
            duration_ms = duration_ms,
            "Slow database operation detected"
        );
    }
}
