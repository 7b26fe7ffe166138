//! Sentry adapter for scraper error tracking and alerting.
//!
//! Process-wide singleton, live only in production with a DSN configured;
//! every function here is a silent no-op otherwise. All outgoing events
//! pass through [`scrub_event`], which redacts sensitive keys at any depth
//! plus request headers and cookies.

use sentry::protocol::{Event, Value};
use sentry::{Breadcrumb, Level};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Config, Environment};
use crate::session::AlertSeverity;

/// Key fragments that mark a field as sensitive wherever it appears.
const SENSITIVE_KEY_PATTERNS: &[&str] =
    &["password", "token", "secret", "key", "auth", "dsn", "api_key"];

/// Request headers always redacted regardless of key matching.
const REDACTED_HEADERS: &[&str] = &["authorization", "cookie", "x-api-key", "proxy-authorization"];

const REDACTED: &str = "[REDACTED]";

/// Initialize Sentry for the scraper context.
///
/// Returns the guard that must live for the duration of the process, or
/// None when telemetry is disabled (non-production environment or no DSN).
pub fn init(config: &Config) -> Option<sentry::ClientInitGuard> {
    if config.environment != Environment::Production {
        info!(
            environment = config.environment.as_str(),
            "telemetry disabled outside production"
        );
        return None;
    }
    let Some(dsn) = config.sentry_dsn.as_deref() else {
        warn!("SENTRY_DSN not set for production environment");
        return None;
    };

    let guard = sentry::init((
        dsn,
        sentry::ClientOptions {
            environment: Some(config.environment.as_str().into()),
            release: config.sentry_release.clone().map(Into::into),
            attach_stacktrace: true,
            send_default_pii: false,
            max_breadcrumbs: 100,
            traces_sample_rate: 1.0,
            before_send: Some(Arc::new(|event| Some(scrub_event(event)))),
            ..Default::default()
        },
    ));

    sentry::configure_scope(|scope| {
        scope.set_tag("service", "scraper-cron");
        scope.set_tag("runtime", "rust");
    });

    info!("telemetry sink initialized");
    Some(guard)
}

/// True when a field with this key must never leave the process.
pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_lowercase();
    SENSITIVE_KEY_PATTERNS
        .iter()
        .any(|pattern| key.contains(pattern))
}

/// Redact sensitive keys at any nesting depth.
pub fn scrub_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                if is_sensitive_key(key) {
                    *entry = Value::String(REDACTED.to_string());
                } else {
                    scrub_value(entry);
                }
            }
        }
        Value::Array(entries) => {
            for entry in entries.iter_mut() {
                scrub_value(entry);
            }
        }
        _ => {}
    }
}

/// Remove sensitive data from an outgoing event.
pub fn scrub_event(mut event: Event<'static>) -> Event<'static> {
    for (key, value) in event.extra.iter_mut() {
        if is_sensitive_key(key) {
            *value = Value::String(REDACTED.to_string());
        } else {
            scrub_value(value);
        }
    }

    if let Some(request) = event.request.as_mut() {
        for (name, value) in request.headers.iter_mut() {
            let lowered = name.to_lowercase();
            if REDACTED_HEADERS.contains(&lowered.as_str()) || is_sensitive_key(&lowered) {
                *value = REDACTED.to_string();
            }
        }
        request.cookies = None;
    }

    event
}

/// Add a breadcrumb for scraper debugging context.
pub fn add_breadcrumb(category: &str, message: impl Into<String>) {
    sentry::add_breadcrumb(Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.into()),
        level: Level::Info,
        ..Default::default()
    });
}

fn severity_level(severity: AlertSeverity) -> Level {
    match severity {
        AlertSeverity::Warning => Level::Warning,
        AlertSeverity::Error => Level::Error,
        AlertSeverity::Critical => Level::Fatal,
    }
}

/// Capture a scraper failure with organization context.
pub fn capture_scrape_error(
    org_name: &str,
    org_id: Option<i32>,
    scrape_log_id: Option<i32>,
    phase: &str,
    error: &anyhow::Error,
) {
    sentry::with_scope(
        |scope| {
            scope.set_tag("scraper.organization", org_name);
            scope.set_tag("scraper.phase", phase);
            if let Some(id) = org_id {
                scope.set_tag("scraper.org_id", id.to_string());
            }
            if let Some(id) = scrape_log_id {
                scope.set_tag("scraper.scrape_log_id", id.to_string());
            }
        },
        || {
            sentry::capture_message(
                &format!("scrape failed for {org_name}: {error:#}"),
                Level::Error,
            )
        },
    );
}

/// Alert: a scraper found zero animals despite positive history. Likely a
/// site structure change or a block.
pub fn alert_zero_animals(org_name: &str, org_id: Option<i32>, scrape_log_id: Option<i32>) {
    sentry::with_scope(
        |scope| {
            scope.set_tag("scraper.organization", org_name);
            scope.set_tag("scraper.alert_type", "zero_animals_found");
            if let Some(id) = org_id {
                scope.set_tag("scraper.org_id", id.to_string());
            }
            if let Some(id) = scrape_log_id {
                scope.set_tag("scraper.scrape_log_id", id.to_string());
            }
        },
        || {
            sentry::capture_message(
                &format!("zero animals found for {org_name} - website may have changed"),
                Level::Fatal,
            )
        },
    );
    warn!(organization = org_name, "sent zero-animals alert");
}

/// Alert: observed volume implausibly low against the historical average.
pub fn alert_partial_failure(
    org_name: &str,
    animals_found: usize,
    expected: f64,
    severity: AlertSeverity,
    org_id: Option<i32>,
    scrape_log_id: Option<i32>,
) {
    sentry::with_scope(
        |scope| {
            scope.set_tag("scraper.organization", org_name);
            scope.set_tag("scraper.alert_type", "partial_failure");
            scope.set_tag("scraper.severity", severity.as_str());
            if let Some(id) = org_id {
                scope.set_tag("scraper.org_id", id.to_string());
            }
            if let Some(id) = scrape_log_id {
                scope.set_tag("scraper.scrape_log_id", id.to_string());
            }
        },
        || {
            sentry::capture_message(
                &format!(
                    "partial failure for {org_name}: found {animals_found} animals, expected ~{expected:.0}"
                ),
                severity_level(severity),
            )
        },
    );
    warn!(
        organization = org_name,
        animals_found,
        expected,
        severity = severity.as_str(),
        "sent partial-failure alert"
    );
}

/// Alert: enrichment failed for too many animals in one batch.
pub fn alert_enrichment_failure(
    org_name: &str,
    batch_size: usize,
    failed_count: usize,
    detail: Option<&str>,
) {
    sentry::with_scope(
        |scope| {
            scope.set_tag("scraper.organization", org_name);
            scope.set_tag("scraper.alert_type", "enrichment_failure");
        },
        || {
            sentry::capture_message(
                &format!(
                    "enrichment failed for {failed_count}/{batch_size} animals in {org_name}{}",
                    detail.map(|d| format!(": {d}")).unwrap_or_default()
                ),
                Level::Warning,
            )
        },
    );
}
