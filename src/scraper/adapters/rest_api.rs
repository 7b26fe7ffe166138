//! Generic adapter for paginated JSON listing APIs.
//!
//! Many rescue sites expose their listings through a JSON endpoint; this
//! adapter walks its pages, remaps source field names onto the canonical
//! raw-item shape, and optionally enriches each item from a per-dog detail
//! endpoint using a small bounded worker pool.

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::org::ApiConfig;
use crate::error::{Result, ScrapeError};
use crate::scraper::{CollectContext, RawAnimal, Scraper};

/// Concurrent detail fetches per scrape.
const DETAIL_POOL_SIZE: usize = 5;

/// Base backoff between network retries; attempt N waits N times this.
const RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Envelope keys tried when the listing payload is not a bare array.
const ITEM_KEYS: &[&str] = &["items", "data", "results", "animals", "dogs"];

pub struct RestApiScraper {
    config_id: String,
    api: ApiConfig,
}

impl RestApiScraper {
    pub fn new(config_id: String, api: ApiConfig) -> Self {
        Self { config_id, api }
    }

    /// Walk listing pages until a short page signals the end.
    async fn collect_listing(&self, ctx: &CollectContext) -> Result<Vec<RawAnimal>> {
        let mut collected = Vec::new();
        let mut page = 1usize;
        loop {
            ctx.ensure_active()?;
            ctx.pacer.pause().await;

            let url = self.api.listing_url.replace("{page}", &page.to_string());
            let payload = fetch_json(ctx, &url).await?;
            let entries = extract_items(&payload).ok_or_else(|| {
                ScrapeError::Parse(format!("{url}: listing payload has no item array"))
            })?;
            let page_len = entries.len();

            for entry in entries {
                match self.parse_item(entry) {
                    Ok(item) => collected.push(item),
                    Err(reason) => {
                        warn!(
                            config_id = self.config_id,
                            page, reason, "dropping unparseable listing item"
                        );
                    }
                }
            }

            debug!(config_id = self.config_id, page, count = page_len, "listing page fetched");
            if page_len < self.api.page_size {
                break;
            }
            page += 1;
        }
        Ok(collected)
    }

    /// Remap one listing entry onto the canonical raw-item shape.
    ///
    /// Unmapped fields ride along in `properties` so source-specific extras
    /// survive into the store.
    fn parse_item(&self, entry: &Value) -> std::result::Result<RawAnimal, String> {
        let object = entry
            .as_object()
            .ok_or_else(|| "listing entry is not an object".to_string())?;
        let fields = &self.api.fields;

        let text = |key: &str| object.get(key).and_then(value_to_string);
        let external_id =
            text(&fields.external_id).ok_or_else(|| format!("no {} field", fields.external_id))?;

        let mapped: HashSet<&str> = [
            fields.external_id.as_str(),
            fields.name.as_str(),
            fields.adoption_url.as_str(),
            fields.primary_image_url.as_str(),
            fields.breed.as_str(),
            fields.age_text.as_str(),
            fields.sex.as_str(),
            fields.size.as_str(),
        ]
        .into();
        let properties: Map<String, Value> = object
            .iter()
            .filter(|(key, _)| !mapped.contains(key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(RawAnimal {
            external_id,
            name: text(&fields.name).unwrap_or_default(),
            adoption_url: text(&fields.adoption_url).unwrap_or_default(),
            primary_image_url: text(&fields.primary_image_url).unwrap_or_default(),
            breed: text(&fields.breed),
            age_text: text(&fields.age_text),
            sex: text(&fields.sex),
            size: text(&fields.size),
            weight_kg: object
                .get("weight_kg")
                .or_else(|| object.get("weight"))
                .and_then(Value::as_f64),
            properties,
        })
    }

    /// Fetch per-dog detail pages under a bounded pool and fold the extra
    /// fields into each item's properties. Detail failures are per-item:
    /// logged and skipped, never fatal to the scrape.
    async fn enrich_details(&self, ctx: &CollectContext, template: &str, items: &mut [RawAnimal]) {
        let semaphore = Semaphore::new(DETAIL_POOL_SIZE);
        let fetched: Mutex<HashSet<String>> = Mutex::new(HashSet::new());

        let futures = items.iter().enumerate().map(|(index, item)| {
            let semaphore = &semaphore;
            let fetched = &fetched;
            let external_id = item.external_id.clone();
            async move {
                let _permit = semaphore.acquire().await.ok()?;
                if ctx.cancel.is_cancelled() {
                    return None;
                }
                {
                    let mut seen = fetched.lock().expect("detail dedup set poisoned");
                    if !seen.insert(external_id.clone()) {
                        return None;
                    }
                }
                ctx.pacer.pause().await;
                let url = template.replace("{id}", &external_id);
                match fetch_json(ctx, &url).await {
                    Ok(payload) => Some((index, payload)),
                    Err(e) => {
                        warn!(
                            config_id = self.config_id,
                            external_id,
                            error = %e,
                            "detail fetch failed, keeping listing data"
                        );
                        None
                    }
                }
            }
        });

        for (index, payload) in join_all(futures).await.into_iter().flatten() {
            if let Some(detail) = payload.as_object() {
                merge_detail(&mut items[index], detail);
            }
        }
    }
}

#[async_trait]
impl Scraper for RestApiScraper {
    async fn collect_data(&self, ctx: &CollectContext) -> Result<Vec<RawAnimal>> {
        let mut items = self.collect_listing(ctx).await?;
        if let Some(template) = self.api.detail_url.clone() {
            self.enrich_details(ctx, &template, &mut items).await;
        }
        Ok(items)
    }
}

/// GET a JSON document with retry on transient failures.
async fn fetch_json(ctx: &CollectContext, url: &str) -> Result<Value> {
    let mut attempt: u32 = 0;
    loop {
        ctx.ensure_active()?;
        match try_fetch(ctx, url).await {
            Ok(payload) => return Ok(payload),
            Err(e) if attempt < ctx.max_retries => {
                attempt += 1;
                warn!(url, attempt, error = %e, "request failed, backing off");
                tokio::time::sleep(RETRY_BACKOFF * attempt).await;
            }
            Err(e) => {
                return Err(ScrapeError::TransientNetwork(format!("{url}: {e}")).into());
            }
        }
    }
}

async fn try_fetch(ctx: &CollectContext, url: &str) -> reqwest::Result<Value> {
    ctx.http
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await
}

/// Pull the item array out of a listing payload.
fn extract_items(payload: &Value) -> Option<&Vec<Value>> {
    if let Value::Array(entries) = payload {
        return Some(entries);
    }
    ITEM_KEYS
        .iter()
        .find_map(|key| payload.get(key).and_then(|v| v.as_array()))
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Fold detail-page fields into an item without clobbering listing data.
fn merge_detail(item: &mut RawAnimal, detail: &Map<String, Value>) {
    for (key, value) in detail {
        match key.as_str() {
            "breed" => {
                if item.breed.is_none() {
                    item.breed = value_to_string(value);
                }
            }
            "age" | "age_text" => {
                if item.age_text.is_none() {
                    item.age_text = value_to_string(value);
                }
            }
            "sex" => {
                if item.sex.is_none() {
                    item.sex = value_to_string(value);
                }
            }
            "size" => {
                if item.size.is_none() {
                    item.size = value_to_string(value);
                }
            }
            "weight" | "weight_kg" => {
                if item.weight_kg.is_none() {
                    item.weight_kg = value.as_f64();
                }
            }
            _ => {
                item.properties.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::org::ApiFieldMap;
    use serde_json::json;

    fn make_scraper() -> RestApiScraper {
        RestApiScraper::new(
            "resty".to_string(),
            ApiConfig {
                listing_url: "https://resty.example/api/dogs?page={page}".to_string(),
                detail_url: None,
                page_size: 50,
                fields: ApiFieldMap::default(),
            },
        )
    }

    #[test]
    fn test_parse_item_default_fields() {
        let scraper = make_scraper();
        let entry = json!({
            "id": 42,
            "name": "Rex",
            "url": "https://resty.example/dogs/42",
            "image": "https://resty.example/img/42.jpg",
            "breed": "beagle",
            "age": "4 years",
            "sex": "M",
            "size": "Small",
            "rescue_story": "found by the river"
        });

        let item = scraper.parse_item(&entry).unwrap();
        assert_eq!(item.external_id, "42");
        assert_eq!(item.name, "Rex");
        assert_eq!(item.breed.as_deref(), Some("beagle"));
        assert_eq!(item.sex.as_deref(), Some("M"));
        // Unmapped fields land in properties
        assert_eq!(item.properties["rescue_story"], "found by the river");
        assert!(!item.properties.contains_key("name"));
    }

    #[test]
    fn test_parse_item_custom_field_map() {
        let mut fields = ApiFieldMap::default();
        fields.external_id = "dog_ref".to_string();
        fields.adoption_url = "profile_link".to_string();
        let scraper = RestApiScraper::new(
            "custom".to_string(),
            ApiConfig {
                listing_url: "https://c.example/list?page={page}".to_string(),
                detail_url: None,
                page_size: 50,
                fields,
            },
        );

        let entry = json!({
            "dog_ref": "d-9",
            "name": "Luna",
            "profile_link": "https://c.example/d-9"
        });
        let item = scraper.parse_item(&entry).unwrap();
        assert_eq!(item.external_id, "d-9");
        assert_eq!(item.adoption_url, "https://c.example/d-9");
    }

    #[test]
    fn test_parse_item_requires_external_id() {
        let scraper = make_scraper();
        let entry = json!({"name": "NoId"});
        assert!(scraper.parse_item(&entry).is_err());
    }

    #[test]
    fn test_parse_item_reads_weight() {
        let scraper = make_scraper();
        let entry = json!({"id": "1", "name": "Chunk", "weight": 32.5});
        let item = scraper.parse_item(&entry).unwrap();
        assert_eq!(item.weight_kg, Some(32.5));
    }

    #[test]
    fn test_extract_items_variants() {
        let bare = json!([{"id": 1}]);
        assert_eq!(extract_items(&bare).unwrap().len(), 1);

        let wrapped = json!({"items": [{"id": 1}, {"id": 2}]});
        assert_eq!(extract_items(&wrapped).unwrap().len(), 2);

        let dogs = json!({"dogs": [{"id": 1}]});
        assert_eq!(extract_items(&dogs).unwrap().len(), 1);

        assert!(extract_items(&json!({"total": 3})).is_none());
    }

    #[test]
    fn test_value_to_string_trims_and_rejects_empty() {
        assert_eq!(value_to_string(&json!("  Rex  ")), Some("Rex".to_string()));
        assert_eq!(value_to_string(&json!("   ")), None);
        assert_eq!(value_to_string(&json!(7)), Some("7".to_string()));
        assert_eq!(value_to_string(&json!(null)), None);
    }

    #[test]
    fn test_merge_detail_prefers_listing_data() {
        let mut item = RawAnimal {
            external_id: "1".to_string(),
            breed: Some("beagle".to_string()),
            ..Default::default()
        };
        let detail = json!({
            "breed": "something else",
            "age": "2 years",
            "temperament": "gentle"
        });
        merge_detail(&mut item, detail.as_object().unwrap());

        assert_eq!(item.breed.as_deref(), Some("beagle"));
        assert_eq!(item.age_text.as_deref(), Some("2 years"));
        assert_eq!(item.properties["temperament"], "gentle");
    }
}
