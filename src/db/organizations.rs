//! Organization rows: config sync and lookup.

use sqlx::PgPool;
use tracing::{debug, info};

use crate::config::org::OrgConfig;
use crate::db::models::Organization;
use crate::error::Result;

/// Upsert one organization from its config, returning the stored row.
///
/// Organizations are created at config load and never destroyed by
/// scrapers; config sync is the only writer of identity fields.
pub async fn sync_from_config(config: &OrgConfig, pool: &PgPool) -> Result<Organization> {
    let org = sqlx::query_as::<_, Organization>(
        r#"
        INSERT INTO organizations (config_id, name, active, website_url)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (config_id)
        DO UPDATE SET
            name = EXCLUDED.name,
            active = EXCLUDED.active,
            website_url = EXCLUDED.website_url,
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(&config.config_id)
    .bind(&config.name)
    .bind(config.active)
    .bind(config.metadata.website_url.as_deref())
    .fetch_one(pool)
    .await?;

    debug!(
        config_id = org.config_id,
        org_id = org.id,
        active = org.active,
        "organization synced"
    );
    Ok(org)
}

/// Sync every loaded config; returns the number touched.
pub async fn sync_all(configs: &[OrgConfig], pool: &PgPool) -> Result<usize> {
    for config in configs {
        sync_from_config(config, pool).await?;
    }
    info!(count = configs.len(), "organization configs synced to database");
    Ok(configs.len())
}

/// Look up an organization by its config id.
pub async fn find_by_config_id(config_id: &str, pool: &PgPool) -> Result<Option<Organization>> {
    let org = sqlx::query_as::<_, Organization>(
        "SELECT * FROM organizations WHERE config_id = $1",
    )
    .bind(config_id)
    .fetch_optional(pool)
    .await?;
    Ok(org)
}
