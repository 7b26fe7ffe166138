//! Deterministic standardization of raw listing fields.
//!
//! Everything in this module is a pure function: raw text in, canonical
//! values plus a confidence score out. The store forbids nulls in the
//! standardized columns, so unknown inputs map to documented defaults.
//! Standardization is idempotent; re-running it over its own output is a
//! no-op.

pub mod age;
pub mod breed;

use chrono::{DateTime, Utc};

pub use age::{AgeCategory, StandardizedAge, standardize_age};
pub use breed::{BreedGroup, StandardizedBreed, standardize_breed};

/// Canonical size buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Size {
    Tiny,
    Small,
    Medium,
    Large,
    XLarge,
}

impl Size {
    pub fn as_str(&self) -> &'static str {
        match self {
            Size::Tiny => "Tiny",
            Size::Small => "Small",
            Size::Medium => "Medium",
            Size::Large => "Large",
            Size::XLarge => "XLarge",
        }
    }
}

/// Canonical sex values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sex {
    Male,
    Female,
    Unknown,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "male",
            Sex::Female => "female",
            Sex::Unknown => "unknown",
        }
    }
}

/// Weight-to-size breakpoints in kilograms.
const TINY_CEILING_KG: f64 = 5.0;
const SMALL_CEILING_KG: f64 = 12.0;
const MEDIUM_CEILING_KG: f64 = 25.0;
const LARGE_CEILING_KG: f64 = 40.0;

/// Raw fields feeding standardization; all optional, all free-form.
#[derive(Debug, Clone, Default)]
pub struct RawProfile<'a> {
    pub breed: Option<&'a str>,
    pub age_text: Option<&'a str>,
    pub sex: Option<&'a str>,
    pub size: Option<&'a str>,
    pub weight_kg: Option<f64>,
}

/// Fully standardized profile; every field is populated.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub breed: String,
    pub breed_group: BreedGroup,
    pub primary_breed: Option<String>,
    pub size: Size,
    pub age: StandardizedAge,
    pub sex: Sex,
    /// Overall confidence in [0, 1]; driven by how well the breed resolved.
    pub confidence: f64,
}

/// Standardize one raw profile.
pub fn standardize(raw: &RawProfile, now: DateTime<Utc>) -> Profile {
    let breed = standardize_breed(raw.breed.unwrap_or(""));
    let size = standardize_size(raw.size, raw.weight_kg);
    let age = raw
        .age_text
        .map(|text| standardize_age(text, now))
        .unwrap_or_else(age::default_age);
    let sex = standardize_sex(raw.sex.unwrap_or(""));

    Profile {
        confidence: breed.confidence.clamp(0.0, 1.0),
        breed: breed.name,
        breed_group: breed.group,
        primary_breed: breed.primary,
        size,
        age,
        sex,
    }
}

/// Resolve a size bucket from text, falling back to weight, then to Medium.
pub fn standardize_size(size: Option<&str>, weight_kg: Option<f64>) -> Size {
    if let Some(text) = size
        && let Some(parsed) = parse_size(text)
    {
        return parsed;
    }
    if let Some(kg) = weight_kg {
        return size_from_weight(kg);
    }
    Size::Medium
}

fn parse_size(text: &str) -> Option<Size> {
    match text.trim().to_lowercase().as_str() {
        "tiny" | "toy" | "xs" | "extra small" => Some(Size::Tiny),
        "small" | "s" | "sm" => Some(Size::Small),
        "medium" | "m" | "med" => Some(Size::Medium),
        "large" | "l" | "lg" => Some(Size::Large),
        "xlarge" | "xl" | "x-large" | "extra large" | "giant" => Some(Size::XLarge),
        _ => None,
    }
}

/// Weight fallback: {<5 Tiny, <12 Small, <25 Medium, <40 Large, else XLarge}.
pub fn size_from_weight(kg: f64) -> Size {
    if kg < TINY_CEILING_KG {
        Size::Tiny
    } else if kg < SMALL_CEILING_KG {
        Size::Small
    } else if kg < MEDIUM_CEILING_KG {
        Size::Medium
    } else if kg < LARGE_CEILING_KG {
        Size::Large
    } else {
        Size::XLarge
    }
}

/// Map sex tokens onto male/female/unknown.
pub fn standardize_sex(raw: &str) -> Sex {
    match raw.trim().to_lowercase().as_str() {
        "male" | "m" | "boy" | "dog" => Sex::Male,
        "female" | "f" | "girl" | "bitch" => Sex::Female,
        _ => Sex::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_full_profile() {
        let raw = RawProfile {
            breed: Some("labrador"),
            age_text: Some("2 years"),
            sex: Some("Male"),
            size: None,
            weight_kg: None,
        };
        let profile = standardize(&raw, now());
        assert_eq!(profile.breed, "Labrador Retriever");
        assert_eq!(profile.size, Size::Medium);
        assert_eq!(profile.age.min_months, 24);
        assert_eq!(profile.sex, Sex::Male);
        assert!(profile.confidence >= 0.9);
    }

    #[test]
    fn test_weight_fallback_breakpoints() {
        let cases = [
            (3.0, Size::Tiny),
            (8.0, Size::Small),
            (20.0, Size::Medium),
            (35.0, Size::Large),
            (45.0, Size::XLarge),
        ];
        for (kg, expected) in cases {
            assert_eq!(size_from_weight(kg), expected, "{kg}kg");
        }
    }

    #[test]
    fn test_size_text_beats_weight() {
        assert_eq!(standardize_size(Some("Small"), Some(45.0)), Size::Small);
    }

    #[test]
    fn test_unrecognized_size_falls_through_to_weight() {
        assert_eq!(standardize_size(Some("chunky"), Some(45.0)), Size::XLarge);
    }

    #[test]
    fn test_missing_size_defaults_medium() {
        assert_eq!(standardize_size(None, None), Size::Medium);
    }

    #[test]
    fn test_sex_tokens() {
        let cases = [
            ("Male", Sex::Male),
            ("MALE", Sex::Male),
            ("M", Sex::Male),
            ("female", Sex::Female),
            ("F", Sex::Female),
            ("", Sex::Unknown),
            ("neutered", Sex::Unknown),
        ];
        for (raw, expected) in cases {
            assert_eq!(standardize_sex(raw), expected, "{raw:?}");
        }
    }

    #[test]
    fn test_confidence_bounds() {
        for breed in [Some("labrador"), Some("???"), None, Some("Unknown Mix")] {
            let raw = RawProfile {
                breed,
                ..Default::default()
            };
            let profile = standardize(&raw, now());
            assert!((0.0..=1.0).contains(&profile.confidence));
        }
    }

    #[test]
    fn test_standardize_is_idempotent() {
        let raw = RawProfile {
            breed: Some("jack russell"),
            age_text: Some("18 months"),
            sex: Some("F"),
            size: Some("small"),
            weight_kg: None,
        };
        let once = standardize(&raw, now());

        let again = RawProfile {
            breed: Some(&once.breed),
            age_text: Some("18 months"),
            sex: Some(once.sex.as_str()),
            size: Some(once.size.as_str()),
            weight_kg: None,
        };
        let twice = standardize(&again, now());

        assert_eq!(once.breed, twice.breed);
        assert_eq!(once.breed_group, twice.breed_group);
        assert_eq!(once.size, twice.size);
        assert_eq!(once.age, twice.age);
        assert_eq!(once.sex, twice.sex);
    }

    #[test]
    fn test_empty_profile_gets_defaults() {
        let profile = standardize(&RawProfile::default(), now());
        assert_eq!(profile.breed, "Unknown");
        assert_eq!(profile.size, Size::Medium);
        assert_eq!(profile.age.min_months, 12);
        assert_eq!(profile.age.max_months, 36);
        assert_eq!(profile.sex, Sex::Unknown);
    }
}
