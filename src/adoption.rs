//! Adoption detector: resolves the fate of animals that stopped appearing.
//!
//! Animals missing from several consecutive scrapes are checked against
//! their own listing page through an external page-analysis service (the
//! [`StatusChecker`] seam; the HTTP specifics live outside the core). This
//! is the only producer of `adopted`/`reserved` status transitions — the
//! stale-detection state machine never touches status.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::org::OrgConfig;
use crate::db::models::AnimalStatus;
use crate::db::organizations;
use crate::error::{Result, ScrapeError};

/// `adoption_check_data` is stored only below this serialized size; larger
/// payloads keep a marker instead of the verbose fields.
const CHECK_DATA_MAX_BYTES: usize = 10_000;

/// Evidence text is clipped to this length before storage.
const EVIDENCE_MAX_CHARS: usize = 200;

/// An animal eligible for an adoption check.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EligibleAnimal {
    pub id: i32,
    pub name: String,
    pub adoption_url: String,
    pub status: String,
    pub consecutive_scrapes_missing: i32,
}

/// Outcome of checking one animal's listing page.
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub detected_status: AnimalStatusDetection,
    pub evidence: String,
    pub confidence: f64,
    /// Raw service response, subject to the storage size cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<Value>,
    /// Set when the check itself failed; errored outcomes are counted but
    /// never persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What the external service concluded about the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimalStatusDetection {
    Adopted,
    Reserved,
    Available,
    Unknown,
}

impl AnimalStatusDetection {
    fn to_status(self) -> AnimalStatus {
        match self {
            AnimalStatusDetection::Adopted => AnimalStatus::Adopted,
            AnimalStatusDetection::Reserved => AnimalStatus::Reserved,
            AnimalStatusDetection::Available => AnimalStatus::Available,
            AnimalStatusDetection::Unknown => AnimalStatus::Unknown,
        }
    }
}

/// External page-analysis service contract.
#[async_trait]
pub trait StatusChecker: Send + Sync {
    async fn check(&self, animal: &EligibleAnimal) -> Result<CheckOutcome>;
}

/// Dogs eligible for a check: missing at least `threshold` scrapes, not
/// already resolved, and not checked within the recheck interval. Most
/// missed first so the strongest signals are spent first under the cap.
pub async fn eligible_animals(
    organization_id: i32,
    threshold: i32,
    recheck_cutoff: DateTime<Utc>,
    limit: i64,
    pool: &PgPool,
) -> Result<Vec<EligibleAnimal>> {
    let rows = sqlx::query_as::<_, EligibleAnimal>(
        r#"
        SELECT id, name, adoption_url, status, consecutive_scrapes_missing
        FROM animals
        WHERE organization_id = $1
          AND consecutive_scrapes_missing >= $2
          AND status NOT IN ('adopted', 'reserved')
          AND (adoption_checked_at IS NULL OR adoption_checked_at < $3)
        ORDER BY consecutive_scrapes_missing DESC, id
        LIMIT $4
        "#,
    )
    .bind(organization_id)
    .bind(threshold)
    .bind(recheck_cutoff)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Build the `adoption_check_data` blob, enforcing the size cap: an
/// oversized raw response is dropped and marked rather than stored.
pub fn check_data_for_storage(outcome: &CheckOutcome) -> Value {
    let mut data = json!({
        "detected_status": outcome.detected_status,
        "evidence": clip(&outcome.evidence, EVIDENCE_MAX_CHARS),
        "confidence": outcome.confidence,
    });

    if let Some(raw) = &outcome.raw_response {
        let with_raw = {
            let mut candidate = data.clone();
            candidate["raw_response"] = raw.clone();
            candidate
        };
        if with_raw.to_string().len() < CHECK_DATA_MAX_BYTES {
            data = with_raw;
        } else {
            data["raw_response_dropped"] = json!(true);
        }
    }

    data
}

fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Persist one check result.
async fn apply_outcome(
    animal: &EligibleAnimal,
    outcome: &CheckOutcome,
    pool: &PgPool,
) -> Result<()> {
    let status = outcome.detected_status.to_status();
    sqlx::query(
        r#"
        UPDATE animals
        SET status = $2,
            adoption_checked_at = NOW(),
            adoption_check_data = $3,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(animal.id)
    .bind(status.as_str())
    .bind(check_data_for_storage(outcome))
    .execute(pool)
    .await?;
    Ok(())
}

/// Totals from one adoption-check run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckRunStats {
    pub checked: usize,
    pub adopted: usize,
    pub reserved: usize,
    pub unknown: usize,
    pub errors: usize,
}

/// Run adoption checks for one organization, bounded by its config.
pub async fn run_checks(
    org_config: &OrgConfig,
    checker: &dyn StatusChecker,
    cancel: &CancellationToken,
    pool: &PgPool,
) -> Result<CheckRunStats> {
    if !org_config.scraper.check_adoption_status {
        return Ok(CheckRunStats::default());
    }
    let org = organizations::find_by_config_id(&org_config.config_id, pool)
        .await?
        .ok_or_else(|| {
            ScrapeError::FatalSetup(format!(
                "organization {} not found in database",
                org_config.config_id
            ))
        })?;

    let check_config = &org_config.scraper.adoption_check_config;
    let cutoff = Utc::now() - Duration::hours(check_config.check_interval_hours);
    let eligible = eligible_animals(
        org.id,
        org_config.scraper.adoption_check_threshold,
        cutoff,
        check_config.max_checks_per_run,
        pool,
    )
    .await?;
    info!(
        config_id = org_config.config_id,
        eligible = eligible.len(),
        "running adoption checks"
    );

    let mut stats = CheckRunStats::default();
    for animal in &eligible {
        if cancel.is_cancelled() {
            break;
        }
        match checker.check(animal).await {
            Ok(outcome) if outcome.error.is_some() => {
                warn!(
                    animal_id = animal.id,
                    animal = animal.name,
                    error = outcome.error.as_deref().unwrap_or_default(),
                    "adoption check unavailable"
                );
                stats.errors += 1;
            }
            Ok(outcome) => {
                apply_outcome(animal, &outcome, pool).await?;
                stats.checked += 1;
                match outcome.detected_status {
                    AnimalStatusDetection::Adopted => stats.adopted += 1,
                    AnimalStatusDetection::Reserved => stats.reserved += 1,
                    AnimalStatusDetection::Available => {}
                    AnimalStatusDetection::Unknown => stats.unknown += 1,
                }
            }
            Err(e) => {
                warn!(
                    animal_id = animal.id,
                    animal = animal.name,
                    error = %e,
                    "adoption check failed"
                );
                stats.errors += 1;
            }
        }
    }

    info!(
        config_id = org_config.config_id,
        checked = stats.checked,
        adopted = stats.adopted,
        reserved = stats.reserved,
        errors = stats.errors,
        "adoption checks complete"
    );
    Ok(stats)
}

/// Checker used when no external service is configured: every animal stays
/// unknown, with the reason recorded as evidence.
pub struct DisabledChecker;

#[async_trait]
impl StatusChecker for DisabledChecker {
    async fn check(&self, _animal: &EligibleAnimal) -> Result<CheckOutcome> {
        Ok(CheckOutcome {
            detected_status: AnimalStatusDetection::Unknown,
            evidence: "adoption detection service not configured".to_string(),
            confidence: 0.0,
            raw_response: None,
            error: Some("no status checker configured".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_outcome(raw: Option<Value>) -> CheckOutcome {
        CheckOutcome {
            detected_status: AnimalStatusDetection::Adopted,
            evidence: "Found their forever home".to_string(),
            confidence: 0.95,
            raw_response: raw,
            error: None,
        }
    }

    #[test]
    fn test_check_data_keeps_small_raw_response() {
        let data = check_data_for_storage(&make_outcome(Some(json!({"page": "adopted"}))));
        assert_eq!(data["detected_status"], "adopted");
        assert_eq!(data["raw_response"]["page"], "adopted");
        assert!(data.get("raw_response_dropped").is_none());
    }

    #[test]
    fn test_check_data_drops_oversized_raw_response() {
        let huge = json!({"page": "x".repeat(CHECK_DATA_MAX_BYTES)});
        let data = check_data_for_storage(&make_outcome(Some(huge)));
        assert!(data.get("raw_response").is_none());
        assert_eq!(data["raw_response_dropped"], true);
        assert!(data.to_string().len() < CHECK_DATA_MAX_BYTES);
    }

    #[test]
    fn test_check_data_clips_evidence() {
        let mut outcome = make_outcome(None);
        outcome.evidence = "e".repeat(500);
        let data = check_data_for_storage(&outcome);
        let stored = data["evidence"].as_str().unwrap();
        assert_eq!(stored.chars().count(), EVIDENCE_MAX_CHARS);
    }

    #[test]
    fn test_detection_maps_to_status() {
        assert_eq!(
            AnimalStatusDetection::Adopted.to_status(),
            AnimalStatus::Adopted
        );
        assert_eq!(
            AnimalStatusDetection::Available.to_status(),
            AnimalStatus::Available
        );
        assert_eq!(
            AnimalStatusDetection::Unknown.to_status(),
            AnimalStatus::Unknown
        );
    }

    #[tokio::test]
    async fn test_disabled_checker_returns_unknown() {
        let animal = EligibleAnimal {
            id: 1,
            name: "Ghost".to_string(),
            adoption_url: "https://x/ghost".to_string(),
            status: "unknown".to_string(),
            consecutive_scrapes_missing: 5,
        };
        let outcome = DisabledChecker.check(&animal).await.unwrap();
        assert_eq!(outcome.detected_status, AnimalStatusDetection::Unknown);
        assert_eq!(outcome.confidence, 0.0);
        assert!(outcome.error.is_some());
    }
}
