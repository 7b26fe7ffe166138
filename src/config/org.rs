//! Per-organization scraper configuration.
//!
//! Each rescue organization is described by one TOML file in the config
//! directory. The file name (minus extension) must match the `config_id`
//! inside it; `config_id` is the stable external key joining config, database
//! rows and CLI arguments.

use figment::Figment;
use figment::providers::{Format, Toml};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Result, ScrapeError};

use super::deserialize_opt_duration;

/// One organization's declarative config.
#[derive(Deserialize, Clone, Debug)]
pub struct OrgConfig {
    /// Stable identifier (slug); primary external key.
    pub config_id: String,
    /// Display name.
    pub name: String,
    /// Disabled organizations are listed but never scraped.
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub metadata: OrgMetadata,
    pub scraper: ScraperConfig,
}

#[derive(Deserialize, Clone, Debug, Default)]
pub struct OrgMetadata {
    /// Base URL of the organization's website.
    #[serde(default)]
    pub website_url: Option<String>,
}

/// Scraper tuning parameters for one organization.
#[derive(Deserialize, Clone, Debug)]
pub struct ScraperConfig {
    /// Which adapter implementation collects data for this source.
    pub adapter: AdapterKind,
    /// Pause between outbound requests, in seconds.
    #[serde(default = "default_rate_limit_delay")]
    pub rate_limit_delay: f64,
    /// Window size for the batch committer.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Retries for transient database errors per batch window.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-scrape timeout override; falls back to the global setting.
    #[serde(default, deserialize_with = "deserialize_opt_duration")]
    pub timeout: Option<Duration>,
    /// When true, animals whose adoption URL is already stored are not
    /// re-processed (their presence is still recorded).
    #[serde(default)]
    pub skip_existing_animals: bool,
    /// Enables the adoption detector for this organization.
    #[serde(default)]
    pub check_adoption_status: bool,
    /// Minimum consecutive missed scrapes before an adoption check.
    #[serde(default = "default_adoption_check_threshold")]
    pub adoption_check_threshold: i32,
    #[serde(default)]
    pub adoption_check_config: AdoptionCheckConfig,
    /// Rolling window (successful scrapes) for the partial-failure guard.
    #[serde(default = "default_failure_window_scrapes")]
    pub failure_window_scrapes: i64,
    /// Observed/expected ratio below which a scrape is a partial failure.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: f64,
    /// Absolute observed-count floor for the partial-failure guard.
    #[serde(default = "default_failure_absolute_floor")]
    pub failure_absolute_floor: i64,
    /// REST adapter settings; required when `adapter = "rest-api"`.
    #[serde(default)]
    pub api: Option<ApiConfig>,
    /// Fixture adapter settings; required when `adapter = "fixture"`.
    #[serde(default)]
    pub fixture_path: Option<PathBuf>,
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AdapterKind {
    /// Paginated JSON listing API.
    RestApi,
    /// Static JSON file; used by tests and dry runs.
    Fixture,
}

impl AdapterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterKind::RestApi => "rest-api",
            AdapterKind::Fixture => "fixture",
        }
    }
}

/// Settings for the generic JSON listing adapter.
#[derive(Deserialize, Clone, Debug)]
pub struct ApiConfig {
    /// Listing endpoint; `{page}` is substituted with the 1-based page number.
    pub listing_url: String,
    /// Optional detail endpoint; `{id}` is substituted with the external id.
    #[serde(default)]
    pub detail_url: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Field names in the listing payload, overridable per source.
    #[serde(default)]
    pub fields: ApiFieldMap,
}

/// Maps this source's JSON field names onto the canonical raw-item fields.
#[derive(Deserialize, Clone, Debug)]
pub struct ApiFieldMap {
    #[serde(default = "default_field_id")]
    pub external_id: String,
    #[serde(default = "default_field_name")]
    pub name: String,
    #[serde(default = "default_field_url")]
    pub adoption_url: String,
    #[serde(default = "default_field_image")]
    pub primary_image_url: String,
    #[serde(default = "default_field_breed")]
    pub breed: String,
    #[serde(default = "default_field_age")]
    pub age_text: String,
    #[serde(default = "default_field_sex")]
    pub sex: String,
    #[serde(default = "default_field_size")]
    pub size: String,
}

impl Default for ApiFieldMap {
    fn default() -> Self {
        Self {
            external_id: default_field_id(),
            name: default_field_name(),
            adoption_url: default_field_url(),
            primary_image_url: default_field_image(),
            breed: default_field_breed(),
            age_text: default_field_age(),
            sex: default_field_sex(),
            size: default_field_size(),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct AdoptionCheckConfig {
    #[serde(default = "default_max_checks_per_run")]
    pub max_checks_per_run: i64,
    #[serde(default = "default_check_interval_hours")]
    pub check_interval_hours: i64,
}

impl Default for AdoptionCheckConfig {
    fn default() -> Self {
        Self {
            max_checks_per_run: default_max_checks_per_run(),
            check_interval_hours: default_check_interval_hours(),
        }
    }
}

impl OrgConfig {
    /// Effective inter-request pause for this organization.
    pub fn rate_limit(&self) -> Duration {
        Duration::from_secs_f64(self.scraper.rate_limit_delay.max(0.0))
    }

    /// Schema checks beyond what serde enforces; errors are fatal setup
    /// errors because a half-valid config would scrape garbage.
    fn validate(&self) -> Result<()> {
        if self.config_id.trim().is_empty() {
            return Err(ScrapeError::FatalSetup("config_id must not be empty".into()).into());
        }
        if self.name.trim().is_empty() {
            return Err(
                ScrapeError::FatalSetup(format!("{}: name must not be empty", self.config_id))
                    .into(),
            );
        }
        if self.scraper.batch_size == 0 {
            return Err(ScrapeError::FatalSetup(format!(
                "{}: scraper.batch_size must be at least 1",
                self.config_id
            ))
            .into());
        }
        if !(0.0..=1.0).contains(&self.scraper.failure_threshold) {
            return Err(ScrapeError::FatalSetup(format!(
                "{}: scraper.failure_threshold must be within [0, 1]",
                self.config_id
            ))
            .into());
        }
        if let Some(website) = &self.metadata.website_url
            && Url::parse(website).is_err()
        {
            return Err(ScrapeError::FatalSetup(format!(
                "{}: metadata.website_url is not a valid URL: {website}",
                self.config_id
            ))
            .into());
        }
        match self.scraper.adapter {
            AdapterKind::RestApi if self.scraper.api.is_none() => {
                Err(ScrapeError::FatalSetup(format!(
                    "{}: adapter \"rest-api\" requires a [scraper.api] section",
                    self.config_id
                ))
                .into())
            }
            AdapterKind::Fixture if self.scraper.fixture_path.is_none() => {
                Err(ScrapeError::FatalSetup(format!(
                    "{}: adapter \"fixture\" requires scraper.fixture_path",
                    self.config_id
                ))
                .into())
            }
            _ => Ok(()),
        }
    }

    /// Parse one config from TOML text. Figment errors carry the offending
    /// field path, so a typo'd key names itself in the failure.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: OrgConfig = Figment::from(Toml::string(raw))
            .extract()
            .map_err(|e| ScrapeError::FatalSetup(format!("invalid organization config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load every `*.toml` in the config directory, sorted by `config_id`.
    ///
    /// An unreadable directory is fatal; an individual file that fails to
    /// parse is fatal too (a silently skipped org would look like a site
    /// outage downstream).
    pub fn load_dir(dir: &Path) -> Result<Vec<OrgConfig>> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            ScrapeError::FatalSetup(format!("cannot read config dir {}: {e}", dir.display()))
        })?;

        let mut configs: BTreeMap<String, OrgConfig> = BTreeMap::new();
        for entry in entries {
            let path = entry
                .map_err(|e| ScrapeError::FatalSetup(format!("config dir read failed: {e}")))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            let raw = std::fs::read_to_string(&path).map_err(|e| {
                ScrapeError::FatalSetup(format!("cannot read {}: {e}", path.display()))
            })?;
            let config = Self::load_str(&raw, &path)?;

            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
            if stem != config.config_id {
                warn!(
                    file = %path.display(),
                    config_id = config.config_id,
                    "config file name does not match config_id"
                );
            }
            debug!(config_id = config.config_id, active = config.active, "loaded organization config");
            configs.insert(config.config_id.clone(), config);
        }
        Ok(configs.into_values().collect())
    }

    fn load_str(raw: &str, path: &Path) -> Result<OrgConfig> {
        Self::from_toml(raw).map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))
    }
}

fn default_active() -> bool {
    true
}

/// Default pause of 1 second between requests
fn default_rate_limit_delay() -> f64 {
    1.0
}

/// Default batch window of 25 items
fn default_batch_size() -> usize {
    25
}

/// Default of 3 retries per batch window
fn default_max_retries() -> u32 {
    3
}

/// Default adoption-check threshold of 3 missed scrapes
fn default_adoption_check_threshold() -> i32 {
    3
}

/// Default rolling window of the last 3 successful scrapes
fn default_failure_window_scrapes() -> i64 {
    3
}

/// Default observed/expected ratio of 0.5
fn default_failure_threshold() -> f64 {
    0.5
}

/// Default absolute floor of 10 observed animals
fn default_failure_absolute_floor() -> i64 {
    10
}

fn default_page_size() -> usize {
    50
}

fn default_max_checks_per_run() -> i64 {
    25
}

fn default_check_interval_hours() -> i64 {
    72
}

fn default_field_id() -> String {
    "id".to_string()
}

fn default_field_name() -> String {
    "name".to_string()
}

fn default_field_url() -> String {
    "url".to_string()
}

fn default_field_image() -> String {
    "image".to_string()
}

fn default_field_breed() -> String {
    "breed".to_string()
}

fn default_field_age() -> String {
    "age".to_string()
}

fn default_field_sex() -> String {
    "sex".to_string()
}

fn default_field_size() -> String {
    "size".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        config_id = "pawsofhope"
        name = "Paws of Hope"

        [metadata]
        website_url = "https://pawsofhope.example.org"

        [scraper]
        adapter = "rest-api"

        [scraper.api]
        listing_url = "https://pawsofhope.example.org/api/dogs?page={page}"
    "#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = OrgConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.config_id, "pawsofhope");
        assert!(config.active);
        assert_eq!(config.scraper.batch_size, 25);
        assert_eq!(config.scraper.max_retries, 3);
        assert!(!config.scraper.skip_existing_animals);
        assert!(!config.scraper.check_adoption_status);
        assert_eq!(config.scraper.failure_window_scrapes, 3);
        assert!((config.scraper.failure_threshold - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.rate_limit(), Duration::from_secs(1));
    }

    #[test]
    fn test_timeout_accepts_duration_string() {
        let raw = MINIMAL.replace(
            "[scraper]\n        adapter = \"rest-api\"",
            "[scraper]\n        adapter = \"rest-api\"\n        timeout = \"5m\"",
        );
        let config = OrgConfig::from_toml(&raw).unwrap();
        assert_eq!(config.scraper.timeout, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_rest_api_requires_api_section() {
        let raw = r#"
            config_id = "x"
            name = "X"
            [scraper]
            adapter = "rest-api"
        "#;
        let err = OrgConfig::from_toml(raw).unwrap_err();
        assert!(err.to_string().contains("[scraper.api]"), "{err}");
    }

    #[test]
    fn test_fixture_requires_path() {
        let raw = r#"
            config_id = "x"
            name = "X"
            [scraper]
            adapter = "fixture"
        "#;
        assert!(OrgConfig::from_toml(raw).is_err());
    }

    #[test]
    fn test_invalid_website_url_rejected() {
        let raw = MINIMAL.replace("https://pawsofhope.example.org\"", "not a url\"");
        assert!(OrgConfig::from_toml(&raw).is_err());
    }

    #[test]
    fn test_empty_batch_size_rejected() {
        let raw = MINIMAL.replace(
            "adapter = \"rest-api\"",
            "adapter = \"rest-api\"\n        batch_size = 0",
        );
        assert!(OrgConfig::from_toml(&raw).is_err());
    }
}
