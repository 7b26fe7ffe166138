//! Error types shared across the scrape engine.

pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;

/// Errors produced while driving a single scrape.
///
/// Item-level problems (render failures, batch statement errors, commit
/// failures) are reported through [`crate::batch::BatchErrorKind`] instead;
/// these are the failures that terminate or reclassify a whole scrape.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// The adapter could not reach the source site after exhausting retries.
    #[error("transient network error: {0}")]
    TransientNetwork(String),
    /// A listing or detail page did not parse into a usable item.
    #[error("failed to parse listing data: {0}")]
    Parse(String),
    /// Cancellation was requested while the scrape was in flight.
    #[error("scrape cancelled")]
    Cancelled,
    /// The orchestrator's per-scrape deadline elapsed.
    #[error("scrape timed out after {0:.0?}")]
    Timeout(std::time::Duration),
    /// Startup-level misconfiguration; nothing was scraped.
    #[error("setup error: {0}")]
    FatalSetup(String),
}
