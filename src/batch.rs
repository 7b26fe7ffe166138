//! Generic batched database commit engine.
//!
//! Commits a homogeneous stream of work items in bounded-size windows with
//! bounded blast radius on failure: a malformed item skips only itself, a
//! transient database error retries the window with linear backoff, and a
//! failed commit burns only the windows since the last successful commit.
//!
//! Execution goes through the [`BatchSink`] seam. Production uses
//! [`PgBatchSink`], which keeps one outer transaction open and wraps each
//! window in a savepoint; tests drive the processor with an in-memory sink.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{error, warn};

use crate::error::Result;

/// A rendered SQL statement with positional parameters.
#[derive(Debug, Clone)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Owned parameter values a render function can produce.
#[derive(Debug, Clone)]
pub enum SqlValue {
    Text(String),
    OptText(Option<String>),
    Int4(i32),
    Int8(i64),
    Float(f64),
    Bool(bool),
    Json(Value),
    Timestamp(DateTime<Utc>),
}

/// Immutable per-invocation configuration.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Items per window; must be at least 1.
    pub batch_size: usize,
    /// Retries per window on transient database errors.
    pub max_retries: u32,
    /// Base backoff; attempt N sleeps `retry_delay * N`.
    pub retry_delay: Duration,
    /// Commit the outer transaction every N successful windows.
    pub commit_frequency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            commit_frequency: 1,
        }
    }
}

/// Error kinds surfaced in a [`BatchResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchErrorKind {
    /// `render` failed for one item; only that item was skipped.
    ItemRender,
    /// A window exhausted its retries on database errors.
    BatchDatabase,
    /// The outer commit failed; the uncommitted windows were rolled back.
    Commit,
    /// A non-database failure aborted the window without retry.
    Unexpected,
}

impl BatchErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchErrorKind::ItemRender => "item_render_error",
            BatchErrorKind::BatchDatabase => "batch_database_error",
            BatchErrorKind::Commit => "commit_error",
            BatchErrorKind::Unexpected => "unexpected_error",
        }
    }
}

/// One structured failure from a batch run.
#[derive(Debug, Clone)]
pub struct BatchError {
    pub kind: BatchErrorKind,
    /// Item position for render errors, window start position otherwise.
    pub position: usize,
    /// Truncated debug representation of the offending item, when item-level.
    pub item: Option<String>,
    pub detail: String,
    /// Retries spent before giving up (database errors only).
    pub retries: u32,
}

/// Maximum characters of an item kept in an error entry.
const ITEM_REPR_LIMIT: usize = 100;

/// Outcome of one `process` invocation.
#[derive(Debug, Default)]
pub struct BatchResult {
    /// Items in windows that were executed and committed.
    pub total_processed: usize,
    pub successful_batches: usize,
    pub failed_batches: usize,
    /// Total retry attempts spent across all windows.
    pub retries: u32,
    pub errors: Vec<BatchError>,
    pub processing_time: Duration,
}

impl BatchResult {
    /// Fraction of processed items that raised no item-level error;
    /// 0 when nothing was processed.
    pub fn success_rate(&self) -> f64 {
        if self.total_processed == 0 {
            return 0.0;
        }
        let item_errors = self
            .errors
            .iter()
            .filter(|e| e.kind == BatchErrorKind::ItemRender)
            .count();
        (self.total_processed.saturating_sub(item_errors)) as f64 / self.total_processed as f64
    }
}

/// Failure classification at the sink boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkErrorKind {
    /// Transient database failure; the window may be retried.
    Database,
    /// Anything else; the window is abandoned immediately.
    Other,
}

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct SinkError {
    pub kind: SinkErrorKind,
    pub message: String,
}

impl SinkError {
    pub fn database(message: impl Into<String>) -> Self {
        Self {
            kind: SinkErrorKind::Database,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: SinkErrorKind::Other,
            message: message.into(),
        }
    }

    fn from_sqlx(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::Database(_)
            | sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Protocol(_) => Self::database(error.to_string()),
            _ => Self::other(error.to_string()),
        }
    }
}

/// Transactional execution target for the batch processor.
///
/// One window = `begin_window`, N `execute`s, then `commit_window` or
/// `abort_window`. `commit` makes everything since the previous `commit`
/// durable.
#[async_trait]
pub trait BatchSink: Send {
    async fn begin_window(&mut self) -> Result<(), SinkError>;
    async fn execute(&mut self, statement: &SqlStatement) -> Result<(), SinkError>;
    async fn commit_window(&mut self) -> Result<(), SinkError>;
    async fn abort_window(&mut self) -> Result<(), SinkError>;
    async fn commit(&mut self) -> Result<(), SinkError>;
}

/// The batched commit engine: `process(items, render) -> BatchResult`.
pub struct BatchProcessor<'a, S: BatchSink> {
    sink: &'a mut S,
    config: BatchConfig,
}

impl<'a, S: BatchSink> BatchProcessor<'a, S> {
    pub fn new(sink: &'a mut S, config: BatchConfig) -> Self {
        let config = BatchConfig {
            batch_size: config.batch_size.max(1),
            commit_frequency: config.commit_frequency.max(1),
            ..config
        };
        Self { sink, config }
    }

    /// Process `items` in windows of `batch_size`.
    ///
    /// `render` turns one item into a statement; a render failure skips only
    /// that item. The optional progress callback receives the cumulative
    /// attempted count and the total after each window.
    pub async fn process<T, F>(
        &mut self,
        items: &[T],
        render: F,
        mut progress: Option<&mut (dyn FnMut(usize, usize) + Send)>,
    ) -> BatchResult
    where
        T: std::fmt::Debug,
        F: Fn(&T) -> Result<SqlStatement>,
    {
        let started = Instant::now();
        let total = items.len();
        let mut result = BatchResult::default();

        if total == 0 {
            return result;
        }

        // Windows not yet made durable by an outer commit
        let mut pending_windows = 0usize;
        let mut pending_items = 0usize;

        for (window_index, window) in items.chunks(self.config.batch_size).enumerate() {
            let batch_start = window_index * self.config.batch_size;

            let window_ok = self
                .process_window(window, batch_start, &render, &mut result)
                .await;

            if window_ok {
                result.successful_batches += 1;
                result.total_processed += window.len();
                pending_windows += 1;
                pending_items += window.len();

                if result.successful_batches % self.config.commit_frequency == 0 {
                    self.commit_pending(&mut result, batch_start, &mut pending_windows, &mut pending_items)
                        .await;
                }
            } else {
                result.failed_batches += 1;
            }

            if let Some(callback) = progress.as_mut() {
                (**callback)((batch_start + window.len()).min(total), total);
            }
        }

        // Residual commit for windows past the last frequency boundary
        if pending_windows > 0 {
            let last_start = total.saturating_sub(1) / self.config.batch_size * self.config.batch_size;
            self.commit_pending(&mut result, last_start, &mut pending_windows, &mut pending_items)
                .await;
        }

        result.processing_time = started.elapsed();
        result
    }

    async fn commit_pending(
        &mut self,
        result: &mut BatchResult,
        position: usize,
        pending_windows: &mut usize,
        pending_items: &mut usize,
    ) {
        match self.sink.commit().await {
            Ok(()) => {
                *pending_windows = 0;
                *pending_items = 0;
            }
            Err(e) => {
                error!(error = %e, "batch commit failed, rolling back uncommitted windows");
                // The rolled-back windows did not land; reclassify them.
                result.successful_batches -= *pending_windows;
                result.failed_batches += *pending_windows;
                result.total_processed -= *pending_items;
                result.errors.push(BatchError {
                    kind: BatchErrorKind::Commit,
                    position,
                    item: None,
                    detail: e.to_string(),
                    retries: 0,
                });
                *pending_windows = 0;
                *pending_items = 0;
            }
        }
    }

    /// Run one window with retry. Returns true when the window's statements
    /// were executed and its savepoint released.
    async fn process_window<T, F>(
        &mut self,
        window: &[T],
        batch_start: usize,
        render: &F,
        result: &mut BatchResult,
    ) -> bool
    where
        T: std::fmt::Debug,
        F: Fn(&T) -> Result<SqlStatement>,
    {
        for attempt in 0..=self.config.max_retries {
            let failure = match self.attempt_window(window, batch_start, render, result, attempt).await
            {
                Ok(()) => return true,
                Err(failure) => failure,
            };

            if self.sink.abort_window().await.is_err() {
                warn!(batch_start, "failed to roll back window savepoint");
            }

            match failure.kind {
                SinkErrorKind::Database if attempt < self.config.max_retries => {
                    warn!(
                        batch_start,
                        attempt = attempt + 1,
                        max_attempts = self.config.max_retries + 1,
                        error = %failure,
                        "database error in batch window, retrying"
                    );
                    result.retries += 1;
                    sleep(self.config.retry_delay * (attempt + 1)).await;
                }
                SinkErrorKind::Database => {
                    error!(
                        batch_start,
                        retries = attempt,
                        error = %failure,
                        "batch window failed after exhausting retries"
                    );
                    result.errors.push(BatchError {
                        kind: BatchErrorKind::BatchDatabase,
                        position: batch_start,
                        item: None,
                        detail: failure.to_string(),
                        retries: attempt,
                    });
                    return false;
                }
                SinkErrorKind::Other => {
                    error!(batch_start, error = %failure, "unexpected error in batch window");
                    result.errors.push(BatchError {
                        kind: BatchErrorKind::Unexpected,
                        position: batch_start,
                        item: None,
                        detail: failure.to_string(),
                        retries: 0,
                    });
                    return false;
                }
            }
        }
        false
    }

    async fn attempt_window<T, F>(
        &mut self,
        window: &[T],
        batch_start: usize,
        render: &F,
        result: &mut BatchResult,
        attempt: u32,
    ) -> Result<(), SinkError>
    where
        T: std::fmt::Debug,
        F: Fn(&T) -> Result<SqlStatement>,
    {
        self.sink.begin_window().await?;

        for (index, item) in window.iter().enumerate() {
            let statement = match render(item) {
                Ok(statement) => statement,
                Err(e) => {
                    // Record once; retries re-render but must not duplicate
                    if attempt == 0 {
                        let position = batch_start + index;
                        warn!(position, error = %e, "failed to render item, skipping");
                        result.errors.push(BatchError {
                            kind: BatchErrorKind::ItemRender,
                            position,
                            item: Some(truncate_repr(item)),
                            detail: e.to_string(),
                            retries: 0,
                        });
                    }
                    continue;
                }
            };
            self.sink.execute(&statement).await?;
        }

        self.sink.commit_window().await
    }
}

fn truncate_repr<T: std::fmt::Debug>(item: &T) -> String {
    let repr = format!("{item:?}");
    repr.chars().take(ITEM_REPR_LIMIT).collect()
}

/// Postgres sink: one outer transaction, savepoint per window.
pub struct PgBatchSink {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

const WINDOW_SAVEPOINT: &str = "batch_window";

impl PgBatchSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, tx: None }
    }

    /// Lazily opens the outer transaction; dropping the sink with one still
    /// open rolls it back.
    async fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, SinkError> {
        if self.tx.is_none() {
            let tx = self.pool.begin().await.map_err(SinkError::from_sqlx)?;
            self.tx = Some(tx);
        }
        Ok(self.tx.as_mut().unwrap())
    }
}

#[async_trait]
impl BatchSink for PgBatchSink {
    async fn begin_window(&mut self) -> Result<(), SinkError> {
        let tx = self.tx().await?;
        sqlx::query(&format!("SAVEPOINT {WINDOW_SAVEPOINT}"))
            .execute(&mut **tx)
            .await
            .map_err(SinkError::from_sqlx)?;
        Ok(())
    }

    async fn execute(&mut self, statement: &SqlStatement) -> Result<(), SinkError> {
        let tx = self.tx().await?;
        let mut query = sqlx::query(&statement.sql);
        for param in &statement.params {
            query = match param {
                SqlValue::Text(v) => query.bind(v),
                SqlValue::OptText(v) => query.bind(v.as_deref()),
                SqlValue::Int4(v) => query.bind(*v),
                SqlValue::Int8(v) => query.bind(*v),
                SqlValue::Float(v) => query.bind(*v),
                SqlValue::Bool(v) => query.bind(*v),
                SqlValue::Json(v) => query.bind(v),
                SqlValue::Timestamp(v) => query.bind(*v),
            };
        }
        query
            .execute(&mut **tx)
            .await
            .map_err(SinkError::from_sqlx)?;
        Ok(())
    }

    async fn commit_window(&mut self) -> Result<(), SinkError> {
        let tx = self.tx().await?;
        sqlx::query(&format!("RELEASE SAVEPOINT {WINDOW_SAVEPOINT}"))
            .execute(&mut **tx)
            .await
            .map_err(SinkError::from_sqlx)?;
        Ok(())
    }

    async fn abort_window(&mut self) -> Result<(), SinkError> {
        let tx = self.tx().await?;
        sqlx::query(&format!("ROLLBACK TO SAVEPOINT {WINDOW_SAVEPOINT}"))
            .execute(&mut **tx)
            .await
            .map_err(SinkError::from_sqlx)?;
        sqlx::query(&format!("RELEASE SAVEPOINT {WINDOW_SAVEPOINT}"))
            .execute(&mut **tx)
            .await
            .map_err(SinkError::from_sqlx)?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), SinkError> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await.map_err(SinkError::from_sqlx)?;
        }
        Ok(())
    }
}
