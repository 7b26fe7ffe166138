//! Age parsing and bucketing.
//!
//! Sources describe age as year/month phrases ("2 years", "18 months"),
//! life-stage words ("puppy", "senior"), or `dd/mm/yyyy` birth dates. All of
//! them reduce to a month range plus a coarse category. Unparseable input
//! maps to a documented default range, never to missing values.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use regex::Regex;
use std::sync::LazyLock;

/// Coarse age bucket derived from the month range midpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeCategory {
    Puppy,
    Young,
    Adult,
    Senior,
}

impl AgeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgeCategory::Puppy => "Puppy",
            AgeCategory::Young => "Young",
            AgeCategory::Adult => "Adult",
            AgeCategory::Senior => "Senior",
        }
    }
}

/// Month range plus category for one age description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardizedAge {
    pub min_months: i32,
    pub max_months: i32,
    pub category: AgeCategory,
}

/// Life-stage ranges in months.
const PUPPY_RANGE: (i32, i32) = (0, 6);
const YOUNG_RANGE: (i32, i32) = (6, 24);
const ADULT_RANGE: (i32, i32) = (24, 84);
const SENIOR_RANGE: (i32, i32) = (84, 180);

/// Fallback when nothing parses: a wide adult-leaning range.
const DEFAULT_RANGE: (i32, i32) = (12, 36);

/// Category midpoint boundaries in months.
const PUPPY_CEILING: i32 = 12;
const YOUNG_CEILING: i32 = 36;
const ADULT_CEILING: i32 = 96;

static YEARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:[.,]\d+)?)\s*(?:years?|yrs?|y\b)").unwrap());
static MONTHS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*(?:months?|mos?\b)").unwrap());
static WEEKS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*(?:weeks?|wks?\b)").unwrap());
static BIRTH_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})/(\d{1,2})/(\d{4})").unwrap());

/// Parse an age description into a month range and category.
///
/// `now` is injected so birth-date math is deterministic under test.
pub fn standardize_age(raw: &str, now: DateTime<Utc>) -> StandardizedAge {
    let text = raw.trim().to_lowercase();
    if text.is_empty() {
        return from_range(DEFAULT_RANGE);
    }

    if let Some(months) = parse_birth_date(&text, now) {
        return from_exact(months);
    }

    if let Some(months) = parse_duration_phrase(&text) {
        return from_exact(months);
    }

    if let Some(range) = parse_life_stage(&text) {
        return from_range(range);
    }

    from_range(DEFAULT_RANGE)
}

/// Sum year/month/week components of a phrase like "1 year 6 months".
fn parse_duration_phrase(text: &str) -> Option<i32> {
    let mut months: f64 = 0.0;
    let mut matched = false;

    if let Some(cap) = YEARS_RE.captures(text) {
        let years: f64 = cap[1].replace(',', ".").parse().ok()?;
        months += years * 12.0;
        matched = true;
    }
    if let Some(cap) = MONTHS_RE.captures(text) {
        let m: f64 = cap[1].parse().ok()?;
        months += m;
        matched = true;
    }
    if let Some(cap) = WEEKS_RE.captures(text) {
        let weeks: f64 = cap[1].parse().ok()?;
        months += weeks / 4.0;
        matched = true;
    }

    if matched { Some(months.round() as i32) } else { None }
}

fn parse_life_stage(text: &str) -> Option<(i32, i32)> {
    if text.contains("puppy") || text.contains("pup") {
        Some(PUPPY_RANGE)
    } else if text.contains("senior") || text.contains("older") {
        Some(SENIOR_RANGE)
    } else if text.contains("young") || text.contains("juvenile") {
        Some(YOUNG_RANGE)
    } else if text.contains("adult") {
        Some(ADULT_RANGE)
    } else {
        None
    }
}

/// `dd/mm/yyyy` birth date, converted to whole months of age.
fn parse_birth_date(text: &str, now: DateTime<Utc>) -> Option<i32> {
    let cap = BIRTH_DATE_RE.captures(text)?;
    let day: u32 = cap[1].parse().ok()?;
    let month: u32 = cap[2].parse().ok()?;
    let year: i32 = cap[3].parse().ok()?;
    let born = NaiveDate::from_ymd_opt(year, month, day)?;

    let today = now.date_naive();
    if born > today {
        return None;
    }
    let mut months =
        (today.year() - born.year()) * 12 + today.month() as i32 - born.month() as i32;
    if today.day() < born.day() {
        months -= 1;
    }
    Some(months.max(0))
}

/// Bucket by the midpoint of the range so wide stage ranges land sensibly.
pub fn categorize(min_months: i32, max_months: i32) -> AgeCategory {
    let midpoint = (min_months + max_months) / 2;
    if midpoint < PUPPY_CEILING {
        AgeCategory::Puppy
    } else if midpoint < YOUNG_CEILING {
        AgeCategory::Young
    } else if midpoint < ADULT_CEILING {
        AgeCategory::Adult
    } else {
        AgeCategory::Senior
    }
}

fn from_exact(months: i32) -> StandardizedAge {
    let months = months.max(0);
    StandardizedAge {
        min_months: months,
        max_months: months,
        category: categorize(months, months),
    }
}

fn from_range((min, max): (i32, i32)) -> StandardizedAge {
    StandardizedAge {
        min_months: min,
        max_months: max,
        category: categorize(min, max),
    }
}

/// The default produced for unparseable or missing age text.
pub fn default_age() -> StandardizedAge {
    from_range(DEFAULT_RANGE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_year_phrases() {
        assert_eq!(standardize_age("2 years", now()).min_months, 24);
        assert_eq!(standardize_age("1 year", now()).min_months, 12);
        assert_eq!(standardize_age("3 years old", now()).max_months, 36);
    }

    #[test]
    fn test_month_phrases() {
        assert_eq!(standardize_age("6 months", now()).min_months, 6);
        assert_eq!(standardize_age("18 months", now()).min_months, 18);
    }

    #[test]
    fn test_combined_phrase() {
        let age = standardize_age("1 year 6 months", now());
        assert_eq!(age.min_months, 18);
        assert_eq!(age.max_months, 18);
    }

    #[test]
    fn test_fractional_years() {
        assert_eq!(standardize_age("2.5 years", now()).min_months, 30);
    }

    #[test]
    fn test_life_stages() {
        let cases = [
            ("puppy", 0, 6, AgeCategory::Puppy),
            ("young", 6, 24, AgeCategory::Young),
            ("adult", 24, 84, AgeCategory::Adult),
            ("senior", 84, 180, AgeCategory::Senior),
        ];
        for (text, min, max, category) in cases {
            let age = standardize_age(text, now());
            assert_eq!(age.min_months, min, "{text}");
            assert_eq!(age.max_months, max, "{text}");
            assert_eq!(age.category, category, "{text}");
        }
    }

    #[test]
    fn test_birth_date() {
        // Born 2023-04-20, now 2025-06-15: 25 full months
        let age = standardize_age("20/04/2023", now());
        assert_eq!(age.min_months, 25);
        assert_eq!(age.max_months, 25);
    }

    #[test]
    fn test_birth_date_day_not_reached() {
        // Born 2023-06-20, now 2025-06-15: the 24th month isn't complete yet
        let age = standardize_age("20/06/2023", now());
        assert_eq!(age.min_months, 23);
    }

    #[test]
    fn test_future_birth_date_falls_back() {
        let age = standardize_age("20/04/2026", now());
        assert_eq!(age.min_months, DEFAULT_RANGE.0);
        assert_eq!(age.max_months, DEFAULT_RANGE.1);
    }

    #[test]
    fn test_unparseable_defaults() {
        let age = standardize_age("born under a bridge", now());
        assert_eq!(age.min_months, 12);
        assert_eq!(age.max_months, 36);
    }

    #[test]
    fn test_empty_defaults() {
        let age = standardize_age("", now());
        assert_eq!((age.min_months, age.max_months), DEFAULT_RANGE);
    }

    #[test]
    fn test_category_from_exact_months() {
        assert_eq!(standardize_age("3 months", now()).category, AgeCategory::Puppy);
        assert_eq!(standardize_age("2 years", now()).category, AgeCategory::Young);
        assert_eq!(standardize_age("5 years", now()).category, AgeCategory::Adult);
        assert_eq!(standardize_age("10 years", now()).category, AgeCategory::Senior);
    }

    #[test]
    fn test_min_never_exceeds_max() {
        for text in ["2 years", "puppy", "senior", "", "gibberish", "20/04/2023"] {
            let age = standardize_age(text, now());
            assert!(age.min_months <= age.max_months, "{text}");
        }
    }
}
