//! Row types for the aggregation schema.
//!
//! Status-like columns are TEXT in Postgres; the enums here own the
//! canonical string forms and parse defensively (an unrecognized value
//! degrades to `Unknown`/`Low` rather than failing a whole query).

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;

/// A rescue organization (one scraper source).
#[derive(Debug, Clone, FromRow)]
pub struct Organization {
    pub id: i32,
    pub config_id: String,
    pub name: String,
    pub active: bool,
    pub website_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing status; only the adoption detector or explicit input moves an
/// animal to `Adopted`/`Reserved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimalStatus {
    Available,
    Reserved,
    Adopted,
    Unknown,
}

impl AnimalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnimalStatus::Available => "available",
            AnimalStatus::Reserved => "reserved",
            AnimalStatus::Adopted => "adopted",
            AnimalStatus::Unknown => "unknown",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "available" => AnimalStatus::Available,
            "reserved" => AnimalStatus::Reserved,
            "adopted" => AnimalStatus::Adopted,
            _ => AnimalStatus::Unknown,
        }
    }
}

/// Heuristic belief that a stored animal is still adoptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityConfidence {
    High,
    Medium,
    Low,
}

impl AvailabilityConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            AvailabilityConfidence::High => "high",
            AvailabilityConfidence::Medium => "medium",
            AvailabilityConfidence::Low => "low",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "high" => AvailabilityConfidence::High,
            "medium" => AvailabilityConfidence::Medium,
            _ => AvailabilityConfidence::Low,
        }
    }
}

/// Terminal outcome of one scrape attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeOutcome {
    Success,
    PartialFailure,
    Failure,
}

impl ScrapeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeOutcome::Success => "success",
            ScrapeOutcome::PartialFailure => "partial_failure",
            ScrapeOutcome::Failure => "failure",
        }
    }
}

/// Full animal row.
#[derive(Debug, Clone, FromRow)]
pub struct Animal {
    pub id: i32,
    pub organization_id: i32,
    pub external_id: String,
    pub adoption_url: String,
    pub name: String,
    pub breed: Option<String>,
    pub standardized_breed: Option<String>,
    pub breed_group: Option<String>,
    pub primary_breed: Option<String>,
    pub age_text: Option<String>,
    pub age_min_months: Option<i32>,
    pub age_max_months: Option<i32>,
    pub age_category: Option<String>,
    pub sex: Option<String>,
    pub gender: Option<String>,
    pub size: Option<String>,
    pub standardized_size: Option<String>,
    pub standardization_confidence: Option<f64>,
    pub primary_image_url: Option<String>,
    pub properties: Value,
    pub status: String,
    pub availability_confidence: String,
    pub consecutive_scrapes_missing: i32,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub adoption_checked_at: Option<DateTime<Utc>>,
    pub adoption_check_data: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The slice of an animal row the framework compares incoming items against
/// to classify them as added/updated/unchanged.
#[derive(Debug, Clone, FromRow, PartialEq)]
pub struct AnimalSnapshot {
    pub external_id: String,
    pub adoption_url: String,
    pub name: String,
    pub breed: Option<String>,
    pub age_text: Option<String>,
    pub sex: Option<String>,
    pub size: Option<String>,
    pub primary_image_url: Option<String>,
    pub properties: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            AnimalStatus::Available,
            AnimalStatus::Reserved,
            AnimalStatus::Adopted,
            AnimalStatus::Unknown,
        ] {
            assert_eq!(AnimalStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn test_unrecognized_status_degrades() {
        assert_eq!(AnimalStatus::parse("pending??"), AnimalStatus::Unknown);
    }

    #[test]
    fn test_confidence_round_trip() {
        for confidence in [
            AvailabilityConfidence::High,
            AvailabilityConfidence::Medium,
            AvailabilityConfidence::Low,
        ] {
            assert_eq!(
                AvailabilityConfidence::parse(confidence.as_str()),
                confidence
            );
        }
    }
}
