//! Fixture adapter: serves listings from a static JSON file.
//!
//! Used by tests, dry runs and local development; it exercises the whole
//! framework lifecycle without touching the network.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

use crate::error::{Result, ScrapeError};
use crate::scraper::{CollectContext, RawAnimal, Scraper};

pub struct FixtureScraper {
    path: PathBuf,
}

impl FixtureScraper {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn parse(raw: &str) -> Result<Vec<RawAnimal>> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let items: Vec<RawAnimal> = serde_path_to_error::deserialize(&mut deserializer)
            .map_err(|e| ScrapeError::Parse(format!("fixture: {e}")))?;
        Ok(items)
    }
}

#[async_trait]
impl Scraper for FixtureScraper {
    async fn collect_data(&self, ctx: &CollectContext) -> Result<Vec<RawAnimal>> {
        ctx.ensure_active()?;
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ScrapeError::FatalSetup(format!("cannot read fixture {}: {e}", self.path.display()))
        })?;
        let items = Self::parse(&raw)?;
        debug!(path = %self.path.display(), count = items.len(), "fixture loaded");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_complete_fixture() {
        let raw = r#"[
            {
                "external_id": "f1",
                "name": "Nellie",
                "adoption_url": "https://fixy.example/dogs/f1",
                "primary_image_url": "https://fixy.example/img/f1.jpg",
                "breed": "beagle",
                "age_text": "3 years"
            }
        ]"#;
        let items = FixtureScraper::parse(raw).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].external_id, "f1");
        assert_eq!(items[0].breed.as_deref(), Some("beagle"));
    }

    #[test]
    fn test_parse_fills_missing_optionals() {
        // Items can omit everything; validation, not parsing, enforces
        // required fields
        let items = FixtureScraper::parse(r#"[{"name": "Ghost"}]"#).unwrap();
        assert_eq!(items[0].name, "Ghost");
        assert!(items[0].external_id.is_empty());
        assert!(items[0].primary_image_url.is_empty());
    }

    #[test]
    fn test_parse_error_names_the_path() {
        let err = FixtureScraper::parse(r#"[{"name": 42}]"#).unwrap_err();
        assert!(err.to_string().contains("name"), "{err}");
    }

    #[tokio::test]
    async fn test_collect_reads_file() {
        let path = std::env::temp_dir().join("rehome-fixture-test.json");
        tokio::fs::write(
            &path,
            r#"[{"external_id": "a", "name": "A", "adoption_url": "https://x/a", "primary_image_url": "https://x/a.jpg"}]"#,
        )
        .await
        .unwrap();

        let scraper = FixtureScraper::new(path.clone());
        let ctx = CollectContext {
            http: reqwest::Client::new(),
            pacer: crate::scraper::rate_limit::RequestPacer::new(std::time::Duration::ZERO),
            cancel: tokio_util::sync::CancellationToken::new(),
            max_retries: 0,
        };
        let items = scraper.collect_data(&ctx).await.unwrap();
        assert_eq!(items.len(), 1);

        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn test_collect_respects_cancellation() {
        let scraper = FixtureScraper::new(PathBuf::from("does-not-matter.json"));
        let cancel = tokio_util::sync::CancellationToken::new();
        cancel.cancel();
        let ctx = CollectContext {
            http: reqwest::Client::new(),
            pacer: crate::scraper::rate_limit::RequestPacer::new(std::time::Duration::ZERO),
            cancel,
            max_retries: 0,
        };
        assert!(scraper.collect_data(&ctx).await.is_err());
    }
}
