//! Batch driver for scheduled runs.
//!
//! Enumerates enabled organizations, runs each scraper in its own task
//! under a global parallelism bound and a per-scraper timeout, and
//! aggregates everything into the machine-readable run summary the cron
//! host consumes. Each scraper is an isolated failure domain: nothing a
//! scrape does — error, panic, timeout — escapes its [`RunResult`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::config::org::OrgConfig;
use crate::db::models::ScrapeOutcome;
use crate::error::ScrapeError;
use crate::scraper::adapters::create_adapter;
use crate::scraper::run_scrape;
use crate::telemetry;

/// How long a cancelled scrape gets to unwind and close its log.
const CANCEL_GRACE: Duration = Duration::from_secs(10);

/// Outcome of one scraper run; never raises to the caller.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub config_id: String,
    pub organization: String,
    pub success: bool,
    pub animals_found: usize,
    pub error: Option<String>,
}

impl RunResult {
    fn failure(config_id: &str, organization: &str, error: impl Into<String>) -> Self {
        Self {
            config_id: config_id.to_string(),
            organization: organization.to_string(),
            success: false,
            animals_found: 0,
            error: Some(error.into()),
        }
    }
}

/// Everything one batch run produced.
#[derive(Debug)]
pub struct BatchRunReport {
    pub results: Vec<RunResult>,
    pub started_at: DateTime<Utc>,
}

impl BatchRunReport {
    pub fn successful(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.successful()
    }
}

/// The run summary emitted as JSON on stdout.
#[derive(Debug, Serialize)]
pub struct BatchSummary {
    pub batch_complete: bool,
    pub timestamp: String,
    pub total_orgs: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_dogs_found: usize,
    pub duration_seconds: f64,
    pub failed_orgs: Vec<String>,
    pub overall_success: bool,
}

/// Fold a batch report into the summary shape.
pub fn format_summary(report: &BatchRunReport, ended_at: DateTime<Utc>) -> BatchSummary {
    let duration = (ended_at - report.started_at)
        .to_std()
        .unwrap_or(Duration::ZERO)
        .as_secs_f64();
    let total_dogs_found = report
        .results
        .iter()
        .filter(|r| r.success)
        .map(|r| r.animals_found)
        .sum();
    let failed_orgs: Vec<String> = report
        .results
        .iter()
        .filter(|r| !r.success)
        .map(|r| r.config_id.clone())
        .collect();
    let failed = report.failed();

    BatchSummary {
        batch_complete: true,
        timestamp: ended_at.to_rfc3339(),
        total_orgs: report.results.len(),
        successful: report.successful(),
        failed,
        total_dogs_found,
        duration_seconds: (duration * 100.0).round() / 100.0,
        failed_orgs,
        overall_success: failed == 0,
    }
}

/// 0 iff every scraper succeeded.
pub fn exit_code(summary: &BatchSummary) -> i32 {
    if summary.overall_success { 0 } else { 1 }
}

/// Log the human-readable rendition of a summary.
pub fn log_summary(summary: &BatchSummary) {
    info!(
        total_orgs = summary.total_orgs,
        successful = summary.successful,
        failed = summary.failed,
        total_dogs_found = summary.total_dogs_found,
        duration_seconds = summary.duration_seconds,
        "batch scrape complete"
    );
    if !summary.failed_orgs.is_empty() {
        warn!(failed_orgs = ?summary.failed_orgs, "some organizations failed");
    }
}

/// Run one scraper under its timeout. Captures every failure mode —
/// adapter error, timeout, cancellation — into the result.
pub async fn run_one(
    org_config: &OrgConfig,
    pool: &PgPool,
    default_timeout: Duration,
    parent_cancel: &CancellationToken,
) -> RunResult {
    let config_id = org_config.config_id.clone();
    let adapter = match create_adapter(org_config) {
        Ok(adapter) => adapter,
        Err(e) => return RunResult::failure(&config_id, &org_config.name, format!("{e:#}")),
    };

    let timeout = org_config.scraper.timeout.unwrap_or(default_timeout);
    let cancel = parent_cancel.child_token();
    let scrape = run_scrape(adapter.as_ref(), org_config, pool, cancel.clone());
    tokio::pin!(scrape);

    tokio::select! {
        result = &mut scrape => match result {
            Ok(summary) => RunResult {
                config_id: summary.config_id,
                organization: summary.organization,
                success: summary.outcome != ScrapeOutcome::Failure,
                animals_found: summary.animals_found,
                error: None,
            },
            Err(e) => RunResult::failure(&config_id, &org_config.name, format!("{e:#}")),
        },
        _ = tokio::time::sleep(timeout) => {
            warn!(config_id, timeout_seconds = timeout.as_secs(), "scrape timed out, cancelling");
            cancel.cancel();
            // Let the scrape unwind so it can roll back and close its log
            let _ = tokio::time::timeout(CANCEL_GRACE, &mut scrape).await;
            RunResult::failure(
                &config_id,
                &org_config.name,
                ScrapeError::Timeout(timeout).to_string(),
            )
        }
    }
}

/// Run every enabled organization with bounded parallelism.
///
/// On shutdown request no new scrapers start; in-flight ones run to
/// completion (up to their timeout).
pub async fn run_all(
    configs: &[OrgConfig],
    pool: &PgPool,
    app_config: &Config,
    cancel: &CancellationToken,
) -> BatchRunReport {
    let started_at = Utc::now();
    let enabled: Vec<&OrgConfig> = configs.iter().filter(|c| c.active).collect();
    info!(
        enabled = enabled.len(),
        max_parallel = app_config.max_parallel_scrapers,
        "starting batch scrape run"
    );
    telemetry::add_breadcrumb("cron", format!("batch run started: {} orgs", enabled.len()));

    let semaphore = Arc::new(Semaphore::new(app_config.max_parallel_scrapers.max(1)));
    let default_timeout = app_config.scraper_timeout;

    let handles: Vec<(String, JoinHandle<RunResult>)> = enabled
        .iter()
        .map(|org_config| {
            let org_config = (*org_config).clone();
            let pool = pool.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let config_id = org_config.config_id.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("scraper semaphore closed");
                if cancel.is_cancelled() {
                    return RunResult::failure(
                        &org_config.config_id,
                        &org_config.name,
                        "skipped: shutdown requested before start",
                    );
                }
                run_one(&org_config, &pool, default_timeout, &cancel).await
            });
            (config_id, handle)
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for (config_id, handle) in handles {
        match handle.await {
            Ok(result) => results.push(result),
            Err(e) => {
                // A panicking scrape stays inside its own failure domain
                error!(config_id, error = %e, "scraper task panicked");
                results.push(RunResult::failure(&config_id, &config_id, format!("task panicked: {e}")));
            }
        }
    }

    telemetry::add_breadcrumb(
        "cron",
        format!(
            "batch run finished: {}/{} succeeded",
            results.iter().filter(|r| r.success).count(),
            results.len()
        ),
    );
    BatchRunReport {
        results,
        started_at,
    }
}

/// Cancel the token on SIGINT or SIGTERM so the driver stops accepting new
/// scrapers and drains the in-flight ones.
pub fn spawn_signal_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("Failed to install CTRL+C signal handler");
        };

        #[cfg(unix)]
        let sigterm = async {
            use tokio::signal::unix::{SignalKind, signal};
            let mut sigterm_stream =
                signal(SignalKind::terminate()).expect("Failed to install SIGTERM signal handler");
            sigterm_stream.recv().await;
        };

        #[cfg(not(unix))]
        let sigterm = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("received ctrl+c, requesting graceful shutdown"),
            _ = sigterm => info!("received SIGTERM, requesting graceful shutdown"),
        }
        cancel.cancel();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success(config_id: &str, found: usize) -> RunResult {
        RunResult {
            config_id: config_id.to_string(),
            organization: config_id.to_string(),
            success: true,
            animals_found: found,
            error: None,
        }
    }

    #[test]
    fn test_summary_aggregation() {
        // One org succeeds with 10 animals, one fails with an exception
        let report = BatchRunReport {
            results: vec![
                success("pawsofhope", 10),
                RunResult::failure("streethearts", "Street Hearts", "listing payload has no item array"),
            ],
            started_at: Utc::now(),
        };
        let summary = format_summary(&report, Utc::now());

        assert_eq!(summary.total_orgs, 2);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total_dogs_found, 10);
        assert_eq!(summary.failed_orgs, vec!["streethearts"]);
        assert!(!summary.overall_success);
        assert_eq!(exit_code(&summary), 1);
    }

    #[test]
    fn test_all_success_exit_code_zero() {
        let report = BatchRunReport {
            results: vec![success("a", 5), success("b", 7)],
            started_at: Utc::now(),
        };
        let summary = format_summary(&report, Utc::now());
        assert!(summary.overall_success);
        assert_eq!(summary.total_dogs_found, 12);
        assert!(summary.failed_orgs.is_empty());
        assert_eq!(exit_code(&summary), 0);
    }

    #[test]
    fn test_failed_orgs_not_counted_in_dogs_found() {
        let mut failed = success("c", 50);
        failed.success = false;
        failed.error = Some("timeout".to_string());
        let report = BatchRunReport {
            results: vec![success("a", 5), failed],
            started_at: Utc::now(),
        };
        let summary = format_summary(&report, Utc::now());
        assert_eq!(summary.total_dogs_found, 5);
    }

    #[test]
    fn test_summary_json_shape() {
        let report = BatchRunReport {
            results: vec![success("a", 1)],
            started_at: Utc::now(),
        };
        let summary = format_summary(&report, Utc::now());
        let value = serde_json::to_value(&summary).unwrap();

        for key in [
            "batch_complete",
            "timestamp",
            "total_orgs",
            "successful",
            "failed",
            "total_dogs_found",
            "duration_seconds",
            "failed_orgs",
            "overall_success",
        ] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
        assert_eq!(value["batch_complete"], true);
    }

    #[test]
    fn test_empty_run_is_successful() {
        let report = BatchRunReport {
            results: vec![],
            started_at: Utc::now(),
        };
        let summary = format_summary(&report, Utc::now());
        assert!(summary.overall_success);
        assert_eq!(exit_code(&summary), 0);
    }
}
