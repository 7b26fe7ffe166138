//! Per-scrape session: observed-id tracking and the stale-detection
//! state machine.
//!
//! A session lives for exactly one scrape. It accumulates every external id
//! the adapter discovered (before any filtering), then at close reconciles
//! the organization's stored animals against that set:
//!
//! | was in store | seen | new counter | new confidence |
//! |--------------|------|-------------|----------------|
//! | yes          | yes  | 0           | high           |
//! | yes          | no   | prev+1      | medium (prev < 4) / low (prev >= 4) |
//! | no           | yes  | 0           | high (on insert) |
//!
//! The partial-failure guard suppresses the absence transitions when the
//! observed volume is implausibly low against recent history, so a broken
//! adapter cannot mass-demote healthy data.

use sqlx::PgPool;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::{info, warn};

use crate::db::animals::{self, PresenceUpdate};
use crate::db::models::{AvailabilityConfidence, ScrapeOutcome};
use crate::error::Result;

/// Counter value at which an unseen animal demotes to low confidence.
const LOW_CONFIDENCE_THRESHOLD: i32 = 4;

/// Severity attached to partial-failure alerts, derived from the
/// observed/expected ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertSeverity {
    Warning,
    Error,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Warning => "warning",
            AlertSeverity::Error => "error",
            AlertSeverity::Critical => "critical",
        }
    }
}

/// Ratio bands for partial-failure severity.
const CRITICAL_RATIO: f64 = 0.10;
const ERROR_RATIO: f64 = 0.25;

/// Knobs for the partial-failure guard.
#[derive(Debug, Clone, Copy)]
pub struct GuardConfig {
    /// Observed/expected ratio below which the guard may trip.
    pub threshold: f64,
    /// Absolute observed-count floor; counts at or above it never trip.
    pub absolute_floor: i64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            absolute_floor: 10,
        }
    }
}

/// Health verdict for one scrape's observed volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrapeHealth {
    Normal,
    /// Implausibly low volume; absence transitions are suppressed.
    PartialFailure {
        expected: f64,
        ratio: f64,
        severity: AlertSeverity,
    },
    /// Nothing observed despite positive history; always a partial failure.
    ZeroItems { expected: f64 },
}

impl ScrapeHealth {
    /// Whether the absence-side transitions may run.
    pub fn allows_absence_transitions(&self) -> bool {
        matches!(self, ScrapeHealth::Normal)
    }

    pub fn outcome(&self) -> ScrapeOutcome {
        match self {
            ScrapeHealth::Normal => ScrapeOutcome::Success,
            _ => ScrapeOutcome::PartialFailure,
        }
    }
}

/// Compare this scrape's observed count against the rolling historical
/// average. No history means no guard: a brand-new organization's first
/// scrape is always "normal".
pub fn evaluate_scrape_health(
    observed: usize,
    historical_average: Option<f64>,
    config: GuardConfig,
) -> ScrapeHealth {
    let Some(expected) = historical_average else {
        return ScrapeHealth::Normal;
    };
    if expected <= 0.0 {
        return ScrapeHealth::Normal;
    }

    if observed == 0 {
        return ScrapeHealth::ZeroItems { expected };
    }

    let ratio = observed as f64 / expected;
    if ratio < config.threshold && (observed as i64) < config.absolute_floor {
        let severity = if ratio < CRITICAL_RATIO {
            AlertSeverity::Critical
        } else if ratio < ERROR_RATIO {
            AlertSeverity::Error
        } else {
            AlertSeverity::Warning
        };
        return ScrapeHealth::PartialFailure {
            expected,
            ratio,
            severity,
        };
    }

    ScrapeHealth::Normal
}

/// The confidence an unseen animal lands on given its previous counter.
pub fn absence_confidence(previous_missing: i32) -> AvailabilityConfidence {
    if previous_missing >= LOW_CONFIDENCE_THRESHOLD {
        AvailabilityConfidence::Low
    } else {
        AvailabilityConfidence::Medium
    }
}

/// In-memory per-scrape observation set plus identity of the owning log.
///
/// The observed set is mutex-guarded because adapters may record ids from a
/// detail-fetch worker pool.
pub struct ScrapeSession {
    organization_id: i32,
    scrape_log_id: i32,
    observed: Mutex<HashSet<String>>,
}

impl ScrapeSession {
    pub fn new(organization_id: i32, scrape_log_id: i32) -> Self {
        Self {
            organization_id,
            scrape_log_id,
            observed: Mutex::new(HashSet::new()),
        }
    }

    pub fn organization_id(&self) -> i32 {
        self.organization_id
    }

    pub fn scrape_log_id(&self) -> i32 {
        self.scrape_log_id
    }

    /// Record one observed external id; returns false for duplicates.
    pub fn record_found(&self, external_id: &str) -> bool {
        self.observed
            .lock()
            .expect("observed set poisoned")
            .insert(external_id.to_string())
    }

    pub fn observed_count(&self) -> usize {
        self.observed.lock().expect("observed set poisoned").len()
    }

    pub fn was_observed(&self, external_id: &str) -> bool {
        self.observed
            .lock()
            .expect("observed set poisoned")
            .contains(external_id)
    }

    fn observed_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .observed
            .lock()
            .expect("observed set poisoned")
            .iter()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Close the session: apply the transition table atomically, honoring
    /// the partial-failure guard. "Seen" resets always run; absence
    /// transitions run only on a healthy scrape.
    pub async fn close(&self, health: &ScrapeHealth, pool: &PgPool) -> Result<PresenceUpdate> {
        let observed = self.observed_ids();
        let apply_absence = health.allows_absence_transitions();

        if !apply_absence {
            warn!(
                organization_id = self.organization_id,
                scrape_log_id = self.scrape_log_id,
                observed = observed.len(),
                "partial failure guard tripped, skipping absence transitions"
            );
        }

        let update = animals::apply_presence_transitions(
            self.organization_id,
            &observed,
            apply_absence,
            pool,
        )
        .await?;

        info!(
            organization_id = self.organization_id,
            scrape_log_id = self.scrape_log_id,
            observed = observed.len(),
            reset = update.reset,
            demoted = update.demoted,
            "session closed"
        );
        Ok(update)
    }
}
