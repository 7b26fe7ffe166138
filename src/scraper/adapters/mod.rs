//! Site adapter registry.
//!
//! New adapters are first-class code: implement [`crate::scraper::Scraper`],
//! add a [`AdapterKind`] variant, and wire it here. Which adapter an
//! organization uses is declared in its config file.

pub mod fixture;
pub mod rest_api;

use crate::config::org::{AdapterKind, OrgConfig};
use crate::error::{Result, ScrapeError};
use crate::scraper::Scraper;

use fixture::FixtureScraper;
use rest_api::RestApiScraper;

/// Build the adapter an organization's config selects.
pub fn create_adapter(config: &OrgConfig) -> Result<Box<dyn Scraper>> {
    match config.scraper.adapter {
        AdapterKind::RestApi => {
            let api = config.scraper.api.clone().ok_or_else(|| {
                ScrapeError::FatalSetup(format!(
                    "{}: rest-api adapter without [scraper.api]",
                    config.config_id
                ))
            })?;
            Ok(Box::new(RestApiScraper::new(config.config_id.clone(), api)))
        }
        AdapterKind::Fixture => {
            let path = config.scraper.fixture_path.clone().ok_or_else(|| {
                ScrapeError::FatalSetup(format!(
                    "{}: fixture adapter without fixture_path",
                    config.config_id
                ))
            })?;
            Ok(Box::new(FixtureScraper::new(path)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::org::OrgConfig;

    #[test]
    fn test_create_adapter_for_each_kind() {
        let rest = OrgConfig::from_toml(
            r#"
            config_id = "resty"
            name = "Resty"
            [scraper]
            adapter = "rest-api"
            [scraper.api]
            listing_url = "https://resty.example/api/dogs?page={page}"
            "#,
        )
        .unwrap();
        assert!(create_adapter(&rest).is_ok());

        let fixture = OrgConfig::from_toml(
            r#"
            config_id = "fixy"
            name = "Fixy"
            [scraper]
            adapter = "fixture"
            fixture_path = "fixtures/fixy.json"
            "#,
        )
        .unwrap();
        assert!(create_adapter(&fixture).is_ok());
    }
}
