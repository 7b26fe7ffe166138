//! Scrape log rows: one per attempt, opened at start, completed at close.

use sqlx::PgPool;
use tracing::debug;

use crate::db::models::ScrapeOutcome;
use crate::error::Result;

/// Aggregated totals written when a scrape completes.
#[derive(Debug, Clone, Default)]
pub struct ScrapeTotals {
    pub dogs_found: i32,
    pub dogs_skipped: i32,
    pub dogs_added: i32,
    pub dogs_updated: i32,
    pub dogs_unchanged: i32,
    pub images_uploaded: i32,
    pub images_failed: i32,
}

/// Phase durations in seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScrapeDurations {
    pub collection: f64,
    pub processing: f64,
    pub total: f64,
}

/// Open a new scrape log; `outcome` stays NULL until completion.
pub async fn open(organization_id: i32, trace_id: Option<&str>, pool: &PgPool) -> Result<i32> {
    let id: i32 = sqlx::query_scalar(
        r#"
        INSERT INTO scrape_logs (organization_id, started_at, trace_id)
        VALUES ($1, NOW(), $2)
        RETURNING id
        "#,
    )
    .bind(organization_id)
    .bind(trace_id)
    .fetch_one(pool)
    .await?;
    debug!(organization_id, scrape_log_id = id, "scrape log opened");
    Ok(id)
}

/// Close a scrape log with its outcome and aggregated stats.
#[allow(clippy::too_many_arguments)]
pub async fn complete(
    scrape_log_id: i32,
    outcome: ScrapeOutcome,
    totals: &ScrapeTotals,
    durations: ScrapeDurations,
    data_quality_score: Option<f64>,
    error_detail: Option<&str>,
    pool: &PgPool,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE scrape_logs
        SET ended_at = NOW(),
            outcome = $2,
            dogs_found = $3,
            dogs_skipped = $4,
            dogs_added = $5,
            dogs_updated = $6,
            dogs_unchanged = $7,
            images_uploaded = $8,
            images_failed = $9,
            collection_seconds = $10,
            processing_seconds = $11,
            duration_seconds = $12,
            data_quality_score = $13,
            error_detail = $14
        WHERE id = $1
        "#,
    )
    .bind(scrape_log_id)
    .bind(outcome.as_str())
    .bind(totals.dogs_found)
    .bind(totals.dogs_skipped)
    .bind(totals.dogs_added)
    .bind(totals.dogs_updated)
    .bind(totals.dogs_unchanged)
    .bind(totals.images_uploaded)
    .bind(totals.images_failed)
    .bind(durations.collection)
    .bind(durations.processing)
    .bind(durations.total)
    .bind(data_quality_score)
    .bind(error_detail)
    .execute(pool)
    .await?;
    debug!(scrape_log_id, outcome = outcome.as_str(), "scrape log completed");
    Ok(())
}
