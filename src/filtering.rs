//! Skip-existing filtering and presence recording.
//!
//! Presence recording is unconditional and MUST run before any filtering:
//! stale detection needs to know which dogs were actually on the website,
//! not which ones we chose to re-process. Filtering itself is a policy
//! layer on top, controlled by `skip_existing_animals`.

use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::scraper::RawAnimal;
use crate::session::ScrapeSession;

/// Tracks skip-existing policy and the stats the scrape log reports.
pub struct FilteringService {
    skip_existing_animals: bool,
    total_before_filter: usize,
    total_skipped: usize,
}

impl FilteringService {
    pub fn new(skip_existing_animals: bool) -> Self {
        Self {
            skip_existing_animals,
            total_before_filter: 0,
            total_skipped: 0,
        }
    }

    pub fn total_before_filter(&self) -> usize {
        self.total_before_filter
    }

    pub fn total_skipped(&self) -> usize {
        self.total_skipped
    }

    /// Record every discovered external id into the session.
    ///
    /// Returns the number recorded. Items without an external id are
    /// dropped later by validation; they cannot participate in stale
    /// detection either way.
    pub fn record_all_found(&self, items: &[RawAnimal], session: &ScrapeSession) -> usize {
        let mut recorded = 0;
        for item in items {
            if !item.external_id.is_empty() {
                session.record_found(&item.external_id);
                recorded += 1;
            }
        }
        if recorded > 0 {
            debug!(recorded, "recorded external ids for stale detection");
        }
        recorded
    }

    /// Apply the skip-existing policy.
    ///
    /// With the policy off this is the identity (presence recording must
    /// already have happened). With it on, items whose adoption URL is
    /// already stored for this organization are dropped and counted.
    pub fn filter_new(
        &mut self,
        items: Vec<RawAnimal>,
        existing_urls: &HashSet<String>,
    ) -> Vec<RawAnimal> {
        if !self.skip_existing_animals {
            debug!(count = items.len(), "skip_existing_animals off, processing all");
            return items;
        }

        let before = items.len();
        if existing_urls.is_empty() {
            info!(count = before, "no existing animals stored, processing all");
            self.total_before_filter = before;
            self.total_skipped = 0;
            return items;
        }

        let filtered: Vec<RawAnimal> = items
            .into_iter()
            .filter(|item| !existing_urls.contains(&item.adoption_url))
            .collect();
        let skipped = before - filtered.len();

        self.total_before_filter = before;
        self.total_skipped = skipped;

        info!(
            found = before,
            skipped,
            new = filtered.len(),
            "filtered existing animals"
        );
        if skipped == 0 && !existing_urls.is_empty() {
            warn!("no items filtered despite stored animals, possible URL mismatch");
        }

        filtered
    }

    /// The found-count to report: discovery volume, not processing volume.
    ///
    /// When skipping filtered everything, `post_filter_count` would be 0
    /// even though the site listed dozens of dogs; run summaries report the
    /// pre-filter count instead.
    pub fn effective_found_count(&self, post_filter_count: usize) -> usize {
        if self.skip_existing_animals && self.total_before_filter > 0 {
            self.total_before_filter
        } else {
            post_filter_count
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_item(external_id: &str, adoption_url: &str) -> RawAnimal {
        RawAnimal {
            external_id: external_id.to_string(),
            name: format!("dog-{external_id}"),
            adoption_url: adoption_url.to_string(),
            primary_image_url: format!("https://img.example/{external_id}.jpg"),
            ..Default::default()
        }
    }

    #[test]
    fn test_record_all_found_before_filtering() {
        let session = ScrapeSession::new(1, 1);
        let service = FilteringService::new(true);
        let items = vec![
            make_item("a", "https://x/a"),
            make_item("b", "https://x/b"),
            make_item("", "https://x/anon"),
        ];

        let recorded = service.record_all_found(&items, &session);
        assert_eq!(recorded, 2);
        assert!(session.was_observed("a"));
        assert!(session.was_observed("b"));
        assert_eq!(session.observed_count(), 2);
    }

    #[test]
    fn test_filter_disabled_is_identity() {
        let mut service = FilteringService::new(false);
        let existing: HashSet<String> = ["https://x/a".to_string()].into();
        let items = vec![make_item("a", "https://x/a"), make_item("b", "https://x/b")];

        let filtered = service.filter_new(items, &existing);
        assert_eq!(filtered.len(), 2);
        assert_eq!(service.total_skipped(), 0);
    }

    #[test]
    fn test_filter_removes_stored_urls() {
        let mut service = FilteringService::new(true);
        let existing: HashSet<String> =
            ["https://x/a".to_string(), "https://x/c".to_string()].into();
        let items = vec![
            make_item("a", "https://x/a"),
            make_item("b", "https://x/b"),
            make_item("c", "https://x/c"),
        ];

        let filtered = service.filter_new(items, &existing);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].external_id, "b");
        assert_eq!(service.total_before_filter(), 3);
        assert_eq!(service.total_skipped(), 2);
    }

    #[test]
    fn test_filter_never_returns_stored_url() {
        let mut service = FilteringService::new(true);
        let existing: HashSet<String> = (0..50).map(|i| format!("https://x/{i}")).collect();
        let items: Vec<RawAnimal> = (0..100)
            .map(|i| make_item(&i.to_string(), &format!("https://x/{i}")))
            .collect();

        let filtered = service.filter_new(items, &existing);
        for item in &filtered {
            assert!(!existing.contains(&item.adoption_url));
        }
        assert_eq!(filtered.len(), 50);
    }

    #[test]
    fn test_effective_found_count_reports_discovery_volume() {
        let mut service = FilteringService::new(true);
        let existing: HashSet<String> =
            ["https://x/a".to_string(), "https://x/b".to_string()].into();
        let items = vec![make_item("a", "https://x/a"), make_item("b", "https://x/b")];

        let filtered = service.filter_new(items, &existing);
        assert!(filtered.is_empty());
        // All filtered out, but the site listed two dogs
        assert_eq!(service.effective_found_count(filtered.len()), 2);
    }

    #[test]
    fn test_effective_found_count_without_skipping() {
        let service = FilteringService::new(false);
        assert_eq!(service.effective_found_count(7), 7);
    }
}
