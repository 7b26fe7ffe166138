//! Database access layer.
//!
//! Pool-backed; each scrape borrows connections per transaction and no
//! connection is held across batches. Scrapers operate on disjoint
//! `(organization_id, external_id)` ranges, so cross-scraper row contention
//! is zero.

pub mod animals;
pub mod models;
pub mod organizations;
pub mod scrape_logs;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::config::Config;
use crate::error::Result;

/// Create the shared connection pool.
///
/// Sized `max_parallel_scrapers x (1 + detail_pool_size)` so a full fleet of
/// scrapers with busy detail workers never starves on connections.
pub async fn connect(config: &Config) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_pool_size())
        .connect(&config.database_url())
        .await?;
    info!(
        max_connections = config.database_pool_size(),
        "database pool created"
    );
    Ok(pool)
}

/// Apply pending migrations from `migrations/`.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!().run(pool).await?;
    Ok(())
}
