//! Telemetry & Observability
//!
//! Structured logging for the recovery engine:
//! - Recovery attempt spans with timing and outcome
//! - Configurable log levels via RUST_LOG
//! - Optional JSON output via SELFHEAL_LOG_FORMAT=json
//! - Sanitising and redaction of collaborator-supplied text

use regex::Regex;
use std::sync::OnceLock;
use std::time::Instant;
use tracing::{error, info, info_span, Instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Sanitize a string for safe log output by escaping control characters.
/// Prevents log injection where reporters embed newlines to forge log entries.
pub fn sanitize_for_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\x1b' => out.push_str("\\e"),
            '\x00' => out.push_str("\\0"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            _ => out.push(c),
        }
    }
    out
}

static SECRET_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

fn secret_patterns() -> &'static Vec<Regex> {
    SECRET_PATTERNS.get_or_init(|| {
        [
            r"(?i)(sk-|key-|token-)[A-Za-z0-9_\-]{8,}",
            r"(?i)Bearer\s+[A-Za-z0-9_\-\.]{8,}",
            r"(?i)(password|passwd|pwd)\s*=\s*\S+",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Redact API keys, bearer tokens and connection-string passwords.
pub fn redact_secrets(input: &str) -> String {
    let mut result = input.to_string();
    for pattern in secret_patterns() {
        result = pattern.replace_all(&result, "[REDACTED]").to_string();
    }
    result
}

/// Sanitize and redact in one pass; what every reported message goes through.
pub fn safe_log_text(input: &str) -> String {
    redact_secrets(&sanitize_for_log(input))
}

/// Initialize global tracing subscriber.
/// Only enables output when RUST_LOG is explicitly set.
pub fn init_tracing() {
    if let Ok(filter) = std::env::var("RUST_LOG") {
        init_tracing_with_filter(&filter);
    }
}

/// Initialize tracing only for verbose mode
pub fn init_tracing_verbose() {
    init_tracing_with_filter("debug")
}

/// Initialize with custom filter string
pub fn init_tracing_with_filter(filter: &str) {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let filter_layer = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));
        let json = std::env::var("SELFHEAL_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if json {
            let _ = tracing_subscriber::registry()
                .with(filter_layer)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .try_init();
        } else {
            let _ = tracing_subscriber::registry()
                .with(filter_layer)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_level(true)
                        .compact()
                        .with_writer(std::io::stderr),
                )
                .try_init();
        }
    });
}

/// Run one recovery attempt inside a span that records duration and outcome.
pub async fn track_recovery<F, Fut, T, E>(error_id: &str, strategy: &str, f: F) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let start = Instant::now();
    let span = info_span!(
        "recovery.attempt",
        error_id = error_id,
        strategy = safe_log_text(strategy).as_str(),
        duration_ms = tracing::field::Empty,
        success = tracing::field::Empty,
    );

    let result = f().instrument(span.clone()).await;
    let duration = start.elapsed().as_millis() as u64;
    span.record("duration_ms", duration);

    let _enter = span.enter();
    match &result {
        Ok(_) => {
            span.record("success", true);
            info!(duration_ms = duration, "Recovery attempt succeeded");
        }
        Err(e) => {
            span.record("success", false);
            error!(
                duration_ms = duration,
                error = safe_log_text(&e.to_string()).as_str(),
                "Recovery attempt failed"
            );
        }
    }
    result
}
