//! Scraper framework: one abstract operation, shared lifecycle.
//!
//! Every site adapter implements exactly one thing, [`Scraper::collect_data`].
//! The rest of the lifecycle — presence recording, filtering,
//! standardization, validation, batched persistence, stale-detection
//! session close, scrape-log bookkeeping — is [`run_scrape`], shared by all
//! adapters. Adapters never touch the database.

pub mod adapters;
pub mod rate_limit;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::PgPool;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::batch::{
    BatchConfig, BatchErrorKind, BatchProcessor, BatchResult, PgBatchSink, SqlStatement,
};
use crate::config::org::OrgConfig;
use crate::db::animals::{self, ChangeKind, NewAnimal};
use crate::db::models::{AnimalStatus, ScrapeOutcome};
use crate::db::scrape_logs::{self, ScrapeDurations, ScrapeTotals};
use crate::db::organizations;
use crate::error::{Result, ScrapeError};
use crate::filtering::FilteringService;
use crate::progress::{ProgressTracker, Verbosity, ops};
use crate::quality;
use crate::session::{GuardConfig, ScrapeHealth, ScrapeSession, evaluate_scrape_health};
use crate::standardize::{self, RawProfile};
use crate::telemetry;
use rate_limit::RequestPacer;

/// A raw listing item crossing the adapter/framework boundary.
///
/// Every field is optional at parse time; the required ones are enforced by
/// [`validate`] so an incomplete item becomes a counted validation failure
/// instead of a parse error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAnimal {
    #[serde(default)]
    pub external_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub adoption_url: String,
    #[serde(default)]
    pub primary_image_url: String,
    #[serde(default)]
    pub breed: Option<String>,
    #[serde(default)]
    pub age_text: Option<String>,
    #[serde(default)]
    pub sex: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    /// Bag of source-specific extras, persisted as jsonb.
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// The single operation a site adapter implements.
#[async_trait]
pub trait Scraper: Send + Sync {
    /// Discover every currently listed animal for this organization.
    ///
    /// Must check `ctx` for cancellation before each network call and pace
    /// requests through `ctx.pacer`. Errors terminate the scrape as a
    /// failure; item-level problems should be logged and skipped instead.
    async fn collect_data(&self, ctx: &CollectContext) -> Result<Vec<RawAnimal>>;
}

/// Shared collaborators handed to an adapter for one scrape.
pub struct CollectContext {
    pub http: reqwest::Client,
    pub pacer: RequestPacer,
    pub cancel: CancellationToken,
    /// Retry budget for transient network errors inside the adapter.
    pub max_retries: u32,
}

impl CollectContext {
    /// Bail out early when shutdown or timeout cancellation was requested.
    pub fn ensure_active(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ScrapeError::Cancelled.into());
        }
        Ok(())
    }
}

/// Check the fields the store refuses to accept empty.
pub fn validate(item: &RawAnimal) -> std::result::Result<(), String> {
    let mut missing = Vec::new();
    if item.external_id.trim().is_empty() {
        missing.push("external_id");
    }
    if item.name.trim().is_empty() {
        missing.push("name");
    }
    if item.adoption_url.trim().is_empty() {
        missing.push("adoption_url");
    }
    if item.primary_image_url.trim().is_empty() {
        missing.push("primary_image_url");
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!("missing required fields: {}", missing.join(", ")))
    }
}

/// Standardize a validated item into its insert shape.
pub fn prepare(item: &RawAnimal, organization_id: i32, now: chrono::DateTime<Utc>) -> NewAnimal {
    let profile = standardize::standardize(
        &RawProfile {
            breed: item.breed.as_deref(),
            age_text: item.age_text.as_deref(),
            sex: item.sex.as_deref(),
            size: item.size.as_deref(),
            weight_kg: item.weight_kg,
        },
        now,
    );

    NewAnimal {
        organization_id,
        external_id: item.external_id.clone(),
        adoption_url: item.adoption_url.clone(),
        name: item.name.trim().to_string(),
        breed: item.breed.clone(),
        standardized_breed: profile.breed,
        breed_group: profile.breed_group.as_str().to_string(),
        primary_breed: profile.primary_breed,
        age_text: item.age_text.clone(),
        age_min_months: profile.age.min_months,
        age_max_months: profile.age.max_months,
        age_category: profile.age.category.as_str().to_string(),
        sex: item.sex.clone(),
        gender: profile.sex.as_str().to_string(),
        size: item.size.clone(),
        standardized_size: profile.size.as_str().to_string(),
        standardization_confidence: profile.confidence,
        primary_image_url: item.primary_image_url.clone(),
        properties: Value::Object(item.properties.clone()),
        status: AnimalStatus::Available,
    }
}

/// One write routed through the batch processor: the animal upsert followed
/// by its image-metadata upsert.
#[derive(Debug)]
enum WriteOp {
    Animal(NewAnimal),
    Image(NewAnimal),
}

fn render_write_op(op: &WriteOp) -> Result<SqlStatement> {
    match op {
        WriteOp::Animal(animal) => Ok(animals::render_upsert(animal)),
        WriteOp::Image(animal) => Ok(animals::render_image_upsert(animal)),
    }
}

/// What one scrape reports back to the orchestrator.
#[derive(Debug, Clone)]
pub struct ScrapeSummary {
    pub config_id: String,
    pub organization: String,
    pub animals_found: usize,
    pub outcome: ScrapeOutcome,
}

/// Run the full scrape lifecycle for one organization.
///
/// Never called concurrently for the same organization; the orchestrator
/// gives each org its own task and failure domain.
pub async fn run_scrape(
    adapter: &dyn Scraper,
    org_config: &OrgConfig,
    pool: &PgPool,
    cancel: CancellationToken,
) -> Result<ScrapeSummary> {
    let started = Instant::now();

    // Resolve the organization row (insert if missing) and open the log
    let org = organizations::sync_from_config(org_config, pool).await?;
    let scrape_log_id = scrape_logs::open(org.id, None, pool).await?;
    let session = ScrapeSession::new(org.id, scrape_log_id);
    telemetry::add_breadcrumb("scraper", format!("starting scrape for {}", org.config_id));
    info!(
        config_id = org.config_id,
        org_id = org.id,
        scrape_log_id,
        adapter = org_config.scraper.adapter.as_str(),
        "scrape starting"
    );

    let ctx = CollectContext {
        http: reqwest::Client::new(),
        pacer: RequestPacer::new(org_config.rate_limit()),
        cancel: cancel.clone(),
        max_retries: org_config.scraper.max_retries,
    };

    // Collection phase
    let collection_started = Instant::now();
    let raw_items = match adapter.collect_data(&ctx).await {
        Ok(items) => items,
        Err(e) => {
            return fail_scrape(
                &org.name,
                org.id,
                scrape_log_id,
                "collection",
                e,
                collection_started.elapsed(),
                started.elapsed(),
                pool,
            )
            .await;
        }
    };
    let collection = collection_started.elapsed();
    info!(
        config_id = org.config_id,
        count = raw_items.len(),
        collection_seconds = format!("{:.1}", collection.as_secs_f64()),
        "collection complete"
    );

    // Presence recording strictly precedes filtering
    let mut filtering = FilteringService::new(org_config.scraper.skip_existing_animals);
    filtering.record_all_found(&raw_items, &session);

    let existing_urls = if org_config.scraper.skip_existing_animals {
        animals::existing_adoption_urls(org.id, pool).await?
    } else {
        HashSet::new()
    };
    let items = filtering.filter_new(raw_items, &existing_urls);
    let animals_found = filtering.effective_found_count(items.len());

    // Processing phase: validate, standardize, classify, persist
    let processing_started = Instant::now();
    let mut tracker = ProgressTracker::new(items.len(), org_config.scraper.batch_size);
    if tracker.verbosity() != Verbosity::Minimal {
        info!(config_id = org.config_id, total = items.len(), "processing animals");
    }
    let snapshots = animals::load_snapshots(org.id, pool).await?;
    let now = Utc::now();

    let mut write_ops: Vec<WriteOp> = Vec::new();
    let mut totals = ScrapeTotals::default();
    let mut quality_scores: Vec<f64> = Vec::new();
    let mut image_positions: HashSet<usize> = HashSet::new();

    for item in &items {
        if let Err(reason) = validate(item) {
            warn!(
                config_id = org.config_id,
                external_id = item.external_id,
                reason, "dropping item that failed validation"
            );
            tracker.track_operation(ops::VALIDATION_FAILURES, 1);
            continue;
        }

        let animal = prepare(item, org.id, now);
        quality_scores.push(quality::assess(&quality::view_new(&animal)).overall_score);

        match animals::classify(&animal, snapshots.get(&animal.external_id)) {
            ChangeKind::Unchanged => {
                totals.dogs_unchanged += 1;
                tracker.update(1, ops::ANIMALS_UNCHANGED);
            }
            ChangeKind::Added => {
                totals.dogs_added += 1;
                tracker.update(1, ops::ANIMALS_ADDED);
                write_ops.push(WriteOp::Animal(animal.clone()));
                image_positions.insert(write_ops.len());
                write_ops.push(WriteOp::Image(animal));
            }
            ChangeKind::Updated => {
                totals.dogs_updated += 1;
                tracker.update(1, ops::ANIMALS_UPDATED);
                write_ops.push(WriteOp::Animal(animal.clone()));
                image_positions.insert(write_ops.len());
                write_ops.push(WriteOp::Image(animal));
            }
        }

        if tracker.should_log_progress() {
            info!(config_id = org.config_id, "{}", tracker.progress_message());
            tracker.mark_progress_logged();
        }
    }

    let batch_result = persist(&write_ops, org_config, pool).await;
    let (images_uploaded, images_failed) = image_counts(&batch_result, &image_positions);
    totals.dogs_found = animals_found as i32;
    totals.dogs_skipped = filtering.total_skipped() as i32;
    totals.images_uploaded = images_uploaded;
    totals.images_failed = images_failed;
    tracker.track_operation(ops::IMAGES_UPLOADED, images_uploaded as usize);
    tracker.track_operation(ops::IMAGES_FAILED, images_failed as usize);
    let processing = processing_started.elapsed();
    tracker.record_phase("collection", collection);
    tracker.record_phase("processing", processing);

    // A timeout or shutdown mid-persist must not apply transitions
    if cancel.is_cancelled() {
        return fail_scrape(
            &org.name,
            org.id,
            scrape_log_id,
            "processing",
            ScrapeError::Cancelled.into(),
            collection,
            started.elapsed(),
            pool,
        )
        .await;
    }

    // Partial-failure guard, alerts, session close
    let history = animals::historical_average(
        org.id,
        scrape_log_id,
        org_config.scraper.failure_window_scrapes,
        pool,
    )
    .await?;
    let observed = session.observed_count();
    let health = evaluate_scrape_health(
        observed,
        history,
        GuardConfig {
            threshold: org_config.scraper.failure_threshold,
            absolute_floor: org_config.scraper.failure_absolute_floor,
        },
    );
    match &health {
        ScrapeHealth::ZeroItems { expected } => {
            warn!(
                config_id = org.config_id,
                expected = *expected,
                "zero animals observed against positive history"
            );
            telemetry::alert_zero_animals(&org.name, Some(org.id), Some(scrape_log_id));
        }
        ScrapeHealth::PartialFailure {
            expected, severity, ..
        } => {
            telemetry::alert_partial_failure(
                &org.name,
                observed,
                *expected,
                *severity,
                Some(org.id),
                Some(scrape_log_id),
            );
        }
        ScrapeHealth::Normal => {}
    }
    session.close(&health, pool).await?;

    // Complete the log
    let outcome = health.outcome();
    let quality_score = mean(&quality_scores);
    let error_detail = summarize_errors(&batch_result);
    scrape_logs::complete(
        scrape_log_id,
        outcome,
        &totals,
        ScrapeDurations {
            collection: collection.as_secs_f64(),
            processing: processing.as_secs_f64(),
            total: started.elapsed().as_secs_f64(),
        },
        quality_score,
        error_detail.as_deref(),
        pool,
    )
    .await?;

    info!(
        config_id = org.config_id,
        outcome = outcome.as_str(),
        found = totals.dogs_found,
        added = totals.dogs_added,
        updated = totals.dogs_updated,
        unchanged = totals.dogs_unchanged,
        skipped = totals.dogs_skipped,
        duration_seconds = format!("{:.1}", started.elapsed().as_secs_f64()),
        "scrape complete"
    );
    telemetry::add_breadcrumb(
        "scraper",
        format!(
            "finished {}: {} found, outcome {}",
            org.config_id,
            totals.dogs_found,
            outcome.as_str()
        ),
    );

    Ok(ScrapeSummary {
        config_id: org.config_id,
        organization: org.name,
        animals_found,
        outcome,
    })
}

/// Route the prepared writes through the batch processor.
async fn persist(write_ops: &[WriteOp], org_config: &OrgConfig, pool: &PgPool) -> BatchResult {
    let mut sink = PgBatchSink::new(pool.clone());
    let mut processor = BatchProcessor::new(
        &mut sink,
        BatchConfig {
            batch_size: org_config.scraper.batch_size,
            max_retries: org_config.scraper.max_retries,
            retry_delay: Duration::from_secs(1),
            commit_frequency: 1,
        },
    );
    let mut on_progress = |done: usize, total: usize| {
        debug!(done, total, "batch progress");
    };
    processor
        .process(write_ops, render_write_op, Some(&mut on_progress))
        .await
}

/// Derive image success/failure counts from batch errors: an image op that
/// fell in a failed window or failed to render counts as a failed upload.
fn image_counts(result: &BatchResult, image_positions: &HashSet<usize>) -> (i32, i32) {
    let failed = result
        .errors
        .iter()
        .filter(|e| {
            matches!(
                e.kind,
                BatchErrorKind::ItemRender | BatchErrorKind::BatchDatabase
            ) && image_positions.contains(&e.position)
        })
        .count() as i32;
    let total = image_positions.len() as i32;
    ((total - failed).max(0), failed)
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Human-readable blob of batch errors for the scrape log.
fn summarize_errors(result: &BatchResult) -> Option<String> {
    if result.errors.is_empty() {
        return None;
    }
    let lines: Vec<String> = result
        .errors
        .iter()
        .map(|e| format!("{} at {}: {}", e.kind.as_str(), e.position, e.detail))
        .collect();
    Some(lines.join("\n"))
}

/// Close out a scrape that failed before its session could be reconciled.
/// No stale transitions run; the log records the failure.
#[allow(clippy::too_many_arguments)]
async fn fail_scrape(
    org_name: &str,
    org_id: i32,
    scrape_log_id: i32,
    phase: &str,
    error: anyhow::Error,
    collection: Duration,
    total: Duration,
    pool: &PgPool,
) -> Result<ScrapeSummary> {
    error!(organization = org_name, phase, error = %error, "scrape failed");
    telemetry::capture_scrape_error(org_name, Some(org_id), Some(scrape_log_id), phase, &error);
    let detail = format!("{phase} failed: {error:#}");
    scrape_logs::complete(
        scrape_log_id,
        ScrapeOutcome::Failure,
        &ScrapeTotals::default(),
        ScrapeDurations {
            collection: collection.as_secs_f64(),
            processing: 0.0,
            total: total.as_secs_f64(),
        },
        None,
        Some(&detail),
        pool,
    )
    .await?;
    Err(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn make_item() -> RawAnimal {
        RawAnimal {
            external_id: "x1".to_string(),
            name: "Buddy".to_string(),
            adoption_url: "https://x/y".to_string(),
            primary_image_url: "https://x/img".to_string(),
            breed: Some("labrador".to_string()),
            age_text: Some("2 years".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_accepts_complete_item() {
        assert!(validate(&make_item()).is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_image() {
        let mut item = make_item();
        item.primary_image_url = String::new();
        let reason = validate(&item).unwrap_err();
        assert!(reason.contains("primary_image_url"), "{reason}");
    }

    #[test]
    fn test_validate_lists_all_missing_fields() {
        let item = RawAnimal::default();
        let reason = validate(&item).unwrap_err();
        for field in ["external_id", "name", "adoption_url", "primary_image_url"] {
            assert!(reason.contains(field), "{reason} missing {field}");
        }
    }

    #[test]
    fn test_validate_rejects_whitespace_only() {
        let mut item = make_item();
        item.name = "   ".to_string();
        assert!(validate(&item).is_err());
    }

    #[test]
    fn test_prepare_standardizes_fields() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
        let animal = prepare(&make_item(), 7, now);

        assert_eq!(animal.organization_id, 7);
        assert_eq!(animal.standardized_breed, "Labrador Retriever");
        assert_eq!(animal.standardized_size, "Medium");
        assert_eq!(animal.age_min_months, 24);
        assert_eq!(animal.age_max_months, 24);
        assert_eq!(animal.gender, "unknown");
        assert_eq!(animal.status, AnimalStatus::Available);
        assert!((0.0..=1.0).contains(&animal.standardization_confidence));
    }

    #[test]
    fn test_prepare_carries_properties() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
        let mut item = make_item();
        item.properties
            .insert("description".to_string(), json!("A very good boy."));
        let animal = prepare(&item, 1, now);
        assert_eq!(animal.properties["description"], "A very good boy.");
    }

    #[test]
    fn test_image_counts_attribution() {
        let mut result = BatchResult::default();
        result.errors.push(crate::batch::BatchError {
            kind: BatchErrorKind::ItemRender,
            position: 1,
            item: None,
            detail: "bad image row".to_string(),
            retries: 0,
        });
        result.errors.push(crate::batch::BatchError {
            kind: BatchErrorKind::ItemRender,
            position: 0,
            item: None,
            detail: "animal row, not an image".to_string(),
            retries: 0,
        });
        let image_positions: HashSet<usize> = [1, 3].into();

        let (uploaded, failed) = image_counts(&result, &image_positions);
        assert_eq!(failed, 1);
        assert_eq!(uploaded, 1);
    }

    #[test]
    fn test_summarize_errors_empty_is_none() {
        assert!(summarize_errors(&BatchResult::default()).is_none());
    }
}
