//! Animal rows: snapshots, upsert rendering, presence transitions.
//!
//! Statement *rendering* is pure (it feeds the batch processor's render
//! contract); only the presence-transition and query functions touch the
//! pool directly.

use serde_json::Value;
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::batch::{SqlStatement, SqlValue};
use crate::db::models::{AnimalSnapshot, AnimalStatus};
use crate::error::Result;

/// A validated, standardized animal ready for persistence.
///
/// Insert-shaped counterpart of the stored row; every required column is
/// non-empty by the time one of these exists.
#[derive(Debug, Clone)]
pub struct NewAnimal {
    pub organization_id: i32,
    pub external_id: String,
    pub adoption_url: String,
    pub name: String,
    pub breed: Option<String>,
    pub standardized_breed: String,
    pub breed_group: String,
    pub primary_breed: Option<String>,
    pub age_text: Option<String>,
    pub age_min_months: i32,
    pub age_max_months: i32,
    pub age_category: String,
    pub sex: Option<String>,
    pub gender: String,
    pub size: Option<String>,
    pub standardized_size: String,
    pub standardization_confidence: f64,
    pub primary_image_url: String,
    pub properties: Value,
    pub status: AnimalStatus,
}

/// How an incoming item relates to what is already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Updated,
    Unchanged,
}

/// Compare an incoming animal against its stored snapshot.
///
/// Only source-observable fields participate; standardized columns are
/// derived from them, and presence bookkeeping is the session's business.
pub fn classify(new: &NewAnimal, existing: Option<&AnimalSnapshot>) -> ChangeKind {
    let Some(stored) = existing else {
        return ChangeKind::Added;
    };

    let same = stored.name == new.name
        && stored.adoption_url == new.adoption_url
        && stored.breed.as_deref() == new.breed.as_deref()
        && stored.age_text.as_deref() == new.age_text.as_deref()
        && stored.sex.as_deref() == new.sex.as_deref()
        && stored.size.as_deref() == new.size.as_deref()
        && stored.primary_image_url.as_deref() == Some(new.primary_image_url.as_str())
        && stored.properties == new.properties;

    if same {
        ChangeKind::Unchanged
    } else {
        ChangeKind::Updated
    }
}

/// Render the animal upsert keyed on `(organization_id, external_id)`.
///
/// Inserts start observed: confidence high, counter zero, `last_seen_at`
/// now. Updates touch only data fields; the presence columns belong to the
/// session-close transition.
pub fn render_upsert(animal: &NewAnimal) -> SqlStatement {
    SqlStatement {
        sql: r#"
            INSERT INTO animals (
                organization_id, external_id, adoption_url, name,
                breed, standardized_breed, breed_group, primary_breed,
                age_text, age_min_months, age_max_months, age_category,
                sex, gender, size, standardized_size, standardization_confidence,
                primary_image_url, properties, status,
                availability_confidence, consecutive_scrapes_missing, last_seen_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                $13, $14, $15, $16, $17, $18, $19, $20,
                'high', 0, NOW()
            )
            ON CONFLICT (organization_id, external_id)
            DO UPDATE SET
                adoption_url = EXCLUDED.adoption_url,
                name = EXCLUDED.name,
                breed = EXCLUDED.breed,
                standardized_breed = EXCLUDED.standardized_breed,
                breed_group = EXCLUDED.breed_group,
                primary_breed = EXCLUDED.primary_breed,
                age_text = EXCLUDED.age_text,
                age_min_months = EXCLUDED.age_min_months,
                age_max_months = EXCLUDED.age_max_months,
                age_category = EXCLUDED.age_category,
                sex = EXCLUDED.sex,
                gender = EXCLUDED.gender,
                size = EXCLUDED.size,
                standardized_size = EXCLUDED.standardized_size,
                standardization_confidence = EXCLUDED.standardization_confidence,
                primary_image_url = EXCLUDED.primary_image_url,
                properties = EXCLUDED.properties,
                updated_at = NOW()
        "#
        .to_string(),
        params: vec![
            SqlValue::Int4(animal.organization_id),
            SqlValue::Text(animal.external_id.clone()),
            SqlValue::Text(animal.adoption_url.clone()),
            SqlValue::Text(animal.name.clone()),
            SqlValue::OptText(animal.breed.clone()),
            SqlValue::Text(animal.standardized_breed.clone()),
            SqlValue::Text(animal.breed_group.clone()),
            SqlValue::OptText(animal.primary_breed.clone()),
            SqlValue::OptText(animal.age_text.clone()),
            SqlValue::Int4(animal.age_min_months),
            SqlValue::Int4(animal.age_max_months),
            SqlValue::Text(animal.age_category.clone()),
            SqlValue::OptText(animal.sex.clone()),
            SqlValue::Text(animal.gender.clone()),
            SqlValue::OptText(animal.size.clone()),
            SqlValue::Text(animal.standardized_size.clone()),
            SqlValue::Float(animal.standardization_confidence),
            SqlValue::Text(animal.primary_image_url.clone()),
            SqlValue::Json(animal.properties.clone()),
            SqlValue::Text(animal.status.as_str().to_string()),
        ],
    }
}

/// Render the image-metadata upsert that follows each animal upsert.
pub fn render_image_upsert(animal: &NewAnimal) -> SqlStatement {
    SqlStatement {
        sql: r#"
            INSERT INTO animal_images (animal_id, image_url, is_primary)
            SELECT id, $3, TRUE FROM animals
            WHERE organization_id = $1 AND external_id = $2
            ON CONFLICT (animal_id, image_url)
            DO UPDATE SET is_primary = EXCLUDED.is_primary
        "#
        .to_string(),
        params: vec![
            SqlValue::Int4(animal.organization_id),
            SqlValue::Text(animal.external_id.clone()),
            SqlValue::Text(animal.primary_image_url.clone()),
        ],
    }
}

/// Adoption URLs currently stored for one organization.
pub async fn existing_adoption_urls(organization_id: i32, pool: &PgPool) -> Result<HashSet<String>> {
    let urls: Vec<String> =
        sqlx::query_scalar("SELECT adoption_url FROM animals WHERE organization_id = $1")
            .bind(organization_id)
            .fetch_all(pool)
            .await?;
    Ok(urls.into_iter().collect())
}

/// Snapshot of all stored animals for one org, keyed by external id.
pub async fn load_snapshots(
    organization_id: i32,
    pool: &PgPool,
) -> Result<HashMap<String, AnimalSnapshot>> {
    let rows = sqlx::query_as::<_, AnimalSnapshot>(
        r#"
        SELECT external_id, adoption_url, name, breed, age_text, sex, size,
               primary_image_url, properties
        FROM animals
        WHERE organization_id = $1
        "#,
    )
    .bind(organization_id)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|row| (row.external_id.clone(), row))
        .collect())
}

/// Counts from one presence-transition application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresenceUpdate {
    /// Animals seen this scrape: counter reset, confidence high.
    pub reset: u64,
    /// Animals not seen: counter incremented, confidence demoted.
    pub demoted: u64,
}

/// Apply the session-close transition table for one organization.
///
/// Runs in a single transaction so cross-scrape state never tears. When
/// `apply_absence` is false (partial-failure guard tripped) only the
/// observed-side reset runs.
pub async fn apply_presence_transitions(
    organization_id: i32,
    observed: &[String],
    apply_absence: bool,
    pool: &PgPool,
) -> Result<PresenceUpdate> {
    let mut tx = pool.begin().await?;
    let mut update = PresenceUpdate::default();

    let reset = sqlx::query(
        r#"
        UPDATE animals
        SET consecutive_scrapes_missing = 0,
            availability_confidence = 'high',
            last_seen_at = NOW(),
            updated_at = NOW()
        WHERE organization_id = $1 AND external_id = ANY($2)
        "#,
    )
    .bind(organization_id)
    .bind(observed)
    .execute(&mut *tx)
    .await?;
    update.reset = reset.rows_affected();

    if apply_absence {
        // RHS column references read pre-update values, so the confidence
        // CASE sees the old counter: >= 4 missed scrapes demotes to low.
        let demoted = sqlx::query(
            r#"
            UPDATE animals
            SET availability_confidence = CASE
                    WHEN consecutive_scrapes_missing >= 4 THEN 'low'
                    ELSE 'medium'
                END,
                consecutive_scrapes_missing = consecutive_scrapes_missing + 1,
                updated_at = NOW()
            WHERE organization_id = $1 AND NOT (external_id = ANY($2))
            "#,
        )
        .bind(organization_id)
        .bind(observed)
        .execute(&mut *tx)
        .await?;
        update.demoted = demoted.rows_affected();
    }

    tx.commit().await?;
    debug!(
        organization_id,
        reset = update.reset,
        demoted = update.demoted,
        apply_absence,
        "presence transitions applied"
    );
    Ok(update)
}

/// Rolling average of `dogs_found` over the last `window` successful
/// scrapes, excluding the current log. None when no history exists.
pub async fn historical_average(
    organization_id: i32,
    exclude_scrape_log_id: i32,
    window: i64,
    pool: &PgPool,
) -> Result<Option<f64>> {
    let average: Option<f64> = sqlx::query_scalar(
        r#"
        SELECT AVG(dogs_found)::float8 FROM (
            SELECT dogs_found FROM scrape_logs
            WHERE organization_id = $1 AND outcome = 'success' AND id <> $2
            ORDER BY started_at DESC
            LIMIT $3
        ) recent
        "#,
    )
    .bind(organization_id)
    .bind(exclude_scrape_log_id)
    .bind(window)
    .fetch_one(pool)
    .await?;
    Ok(average)
}

/// Animals eligible for availability-based queries, most recent first.
/// Adopted and reserved animals are retained but excluded.
pub async fn available_for_quality_scan(
    organization_id: Option<i32>,
    pool: &PgPool,
) -> Result<Vec<crate::db::models::Animal>> {
    let rows = match organization_id {
        Some(org_id) => {
            sqlx::query_as::<_, crate::db::models::Animal>(
                r#"
                SELECT * FROM animals
                WHERE organization_id = $1 AND status = 'available'
                ORDER BY created_at DESC
                "#,
            )
            .bind(org_id)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, crate::db::models::Animal>(
                r#"
                SELECT * FROM animals
                WHERE status = 'available'
                ORDER BY organization_id, created_at DESC
                "#,
            )
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows)
}
