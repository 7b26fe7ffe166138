//! Offline data-quality scoring.
//!
//! Scores each animal 0-100 across four weighted categories and aggregates
//! per organization. Read-only and off the scrape hot path; the framework
//! reuses the per-animal scorer to stamp a quality score on each scrape log.

use serde_json::Value;
use sqlx::PgPool;
use std::collections::BTreeMap;
use tracing::info;

use crate::db::animals::{self, NewAnimal};
use crate::db::models::Animal;
use crate::error::Result;

/// Category weights; must sum to 100.
const WEIGHT_COMPLETENESS: f64 = 40.0;
const WEIGHT_STANDARDIZATION: f64 = 30.0;
const WEIGHT_RICH_CONTENT: f64 = 20.0;
const WEIGHT_VISUAL_APPEAL: f64 = 10.0;

/// Completeness point split (out of 40).
const POINTS_NAME: u32 = 20;
const POINTS_AGE: u32 = 10;
const POINTS_BREED: u32 = 5;
const POINTS_SEX: u32 = 3;
const POINTS_SIZE: u32 = 2;

/// Standardization point split (out of 30).
const POINTS_STD_BREED: u32 = 15;
const POINTS_STD_SIZE: u32 = 15;

/// A description shorter than this is not "rich content".
const MIN_DESCRIPTION_CHARS: usize = 50;

/// Score threshold below which an animal counts as low quality.
const LOW_QUALITY_THRESHOLD: f64 = 70.0;

/// Borrowed view over the fields quality scoring reads, so stored rows and
/// freshly prepared animals share one scorer.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityView<'a> {
    pub name: &'a str,
    pub breed: Option<&'a str>,
    pub age_text: Option<&'a str>,
    pub age_min_months: Option<i32>,
    pub age_max_months: Option<i32>,
    pub sex: Option<&'a str>,
    pub size: Option<&'a str>,
    pub standardized_breed: Option<&'a str>,
    pub standardized_size: Option<&'a str>,
    pub primary_image_url: Option<&'a str>,
    pub properties: Option<&'a Value>,
}

pub fn view_stored(animal: &Animal) -> QualityView<'_> {
    QualityView {
        name: &animal.name,
        breed: animal.breed.as_deref(),
        age_text: animal.age_text.as_deref(),
        age_min_months: animal.age_min_months,
        age_max_months: animal.age_max_months,
        sex: animal.sex.as_deref(),
        size: animal.size.as_deref(),
        standardized_breed: animal.standardized_breed.as_deref(),
        standardized_size: animal.standardized_size.as_deref(),
        primary_image_url: animal.primary_image_url.as_deref(),
        properties: Some(&animal.properties),
    }
}

pub fn view_new(animal: &NewAnimal) -> QualityView<'_> {
    QualityView {
        name: &animal.name,
        breed: animal.breed.as_deref(),
        age_text: animal.age_text.as_deref(),
        age_min_months: Some(animal.age_min_months),
        age_max_months: Some(animal.age_max_months),
        sex: animal.sex.as_deref(),
        size: animal.size.as_deref(),
        standardized_breed: Some(&animal.standardized_breed),
        standardized_size: Some(&animal.standardized_size),
        primary_image_url: Some(&animal.primary_image_url),
        properties: Some(&animal.properties),
    }
}

/// Points earned in one category.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryScore {
    pub points_earned: u32,
    pub max_points: u32,
    pub issues: Vec<&'static str>,
}

impl CategoryScore {
    pub fn percentage(&self) -> f64 {
        if self.max_points == 0 {
            return 0.0;
        }
        self.points_earned as f64 / self.max_points as f64 * 100.0
    }
}

/// Complete quality assessment for one animal.
#[derive(Debug, Clone)]
pub struct QualityAssessment {
    pub completeness: CategoryScore,
    pub standardization: CategoryScore,
    pub rich_content: CategoryScore,
    pub visual_appeal: CategoryScore,
    /// Weighted 0-100 overall score.
    pub overall_score: f64,
}

fn present(field: Option<&str>) -> bool {
    field.is_some_and(|value| !value.trim().is_empty())
}

fn assess_completeness(view: &QualityView) -> CategoryScore {
    let max_points = POINTS_NAME + POINTS_AGE + POINTS_BREED + POINTS_SEX + POINTS_SIZE;
    let mut points = 0;
    let mut issues = Vec::new();

    if view.name.trim().is_empty() {
        issues.push("missing name");
    } else {
        points += POINTS_NAME;
    }

    let has_age =
        present(view.age_text) || view.age_min_months.is_some() || view.age_max_months.is_some();
    if has_age {
        points += POINTS_AGE;
    } else {
        issues.push("missing age information");
    }

    if present(view.breed) {
        points += POINTS_BREED;
    } else {
        issues.push("missing breed");
    }

    if present(view.sex) {
        points += POINTS_SEX;
    } else {
        issues.push("missing sex information");
    }

    if present(view.size) {
        points += POINTS_SIZE;
    } else {
        issues.push("missing size information");
    }

    CategoryScore {
        points_earned: points,
        max_points,
        issues,
    }
}

fn assess_standardization(view: &QualityView) -> CategoryScore {
    let max_points = POINTS_STD_BREED + POINTS_STD_SIZE;
    let mut points = 0;
    let mut issues = Vec::new();

    if present(view.standardized_breed) {
        points += POINTS_STD_BREED;
    } else {
        issues.push("missing standardized breed");
    }
    if present(view.standardized_size) {
        points += POINTS_STD_SIZE;
    } else {
        issues.push("missing standardized size");
    }

    CategoryScore {
        points_earned: points,
        max_points,
        issues,
    }
}

fn description_of(properties: Option<&Value>) -> Option<&str> {
    properties?.get("description")?.as_str()
}

fn assess_rich_content(view: &QualityView) -> CategoryScore {
    let meaningful = description_of(view.properties)
        .map(|d| d.trim().chars().count() > MIN_DESCRIPTION_CHARS)
        .unwrap_or(false);

    CategoryScore {
        points_earned: if meaningful { 20 } else { 0 },
        max_points: 20,
        issues: if meaningful {
            Vec::new()
        } else {
            vec!["missing or insufficient description"]
        },
    }
}

fn assess_visual_appeal(view: &QualityView) -> CategoryScore {
    let has_image = present(view.primary_image_url);
    CategoryScore {
        points_earned: if has_image { 10 } else { 0 },
        max_points: 10,
        issues: if has_image {
            Vec::new()
        } else {
            vec!["missing primary image URL"]
        },
    }
}

/// Perform the complete weighted assessment of one animal.
pub fn assess(view: &QualityView) -> QualityAssessment {
    let completeness = assess_completeness(view);
    let standardization = assess_standardization(view);
    let rich_content = assess_rich_content(view);
    let visual_appeal = assess_visual_appeal(view);

    let overall_score = (completeness.percentage() * WEIGHT_COMPLETENESS
        + standardization.percentage() * WEIGHT_STANDARDIZATION
        + rich_content.percentage() * WEIGHT_RICH_CONTENT
        + visual_appeal.percentage() * WEIGHT_VISUAL_APPEAL)
        / 100.0;

    QualityAssessment {
        completeness,
        standardization,
        rich_content,
        visual_appeal,
        overall_score,
    }
}

/// Quality metrics aggregated over one organization's available animals.
#[derive(Debug, Clone)]
pub struct OrganizationQuality {
    pub organization_id: i32,
    pub total_animals: usize,
    pub overall_score: f64,
    pub animals_at_100: usize,
    pub animals_below_70: usize,
    pub completeness_avg: f64,
    pub standardization_avg: f64,
    pub rich_content_avg: f64,
    pub visual_appeal_avg: f64,
    pub common_issues: BTreeMap<&'static str, usize>,
}

/// Aggregate assessments for a set of animals from one organization.
pub fn aggregate(organization_id: i32, assessments: &[QualityAssessment]) -> OrganizationQuality {
    let total = assessments.len();
    let mut common_issues: BTreeMap<&'static str, usize> = BTreeMap::new();
    for assessment in assessments {
        for issue in assessment
            .completeness
            .issues
            .iter()
            .chain(&assessment.standardization.issues)
            .chain(&assessment.rich_content.issues)
            .chain(&assessment.visual_appeal.issues)
        {
            *common_issues.entry(*issue).or_insert(0) += 1;
        }
    }

    let avg = |select: fn(&QualityAssessment) -> f64| {
        if total == 0 {
            0.0
        } else {
            assessments.iter().map(select).sum::<f64>() / total as f64
        }
    };

    OrganizationQuality {
        organization_id,
        total_animals: total,
        overall_score: avg(|a| a.overall_score),
        animals_at_100: assessments
            .iter()
            .filter(|a| a.overall_score >= 100.0)
            .count(),
        animals_below_70: assessments
            .iter()
            .filter(|a| a.overall_score < LOW_QUALITY_THRESHOLD)
            .count(),
        completeness_avg: avg(|a| a.completeness.percentage()),
        standardization_avg: avg(|a| a.standardization.percentage()),
        rich_content_avg: avg(|a| a.rich_content.percentage()),
        visual_appeal_avg: avg(|a| a.visual_appeal.percentage()),
        common_issues,
    }
}

/// Score every available animal for one org (or all orgs when None),
/// grouped per organization.
pub async fn scan(
    organization_id: Option<i32>,
    pool: &PgPool,
) -> Result<Vec<OrganizationQuality>> {
    let rows = animals::available_for_quality_scan(organization_id, pool).await?;
    let mut by_org: BTreeMap<i32, Vec<QualityAssessment>> = BTreeMap::new();
    for animal in &rows {
        by_org
            .entry(animal.organization_id)
            .or_default()
            .push(assess(&view_stored(animal)));
    }

    let report: Vec<OrganizationQuality> = by_org
        .into_iter()
        .map(|(org_id, assessments)| aggregate(org_id, &assessments))
        .collect();
    info!(
        organizations = report.len(),
        animals = rows.len(),
        "quality scan complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn complete_view(properties: &Value) -> QualityView<'_> {
        QualityView {
            name: "Bella",
            breed: Some("Labrador Mix"),
            age_text: Some("3 years"),
            age_min_months: Some(36),
            age_max_months: Some(36),
            sex: Some("Female"),
            size: Some("Large"),
            standardized_breed: Some("Labrador Retriever Mix"),
            standardized_size: Some("Large"),
            primary_image_url: Some("https://img.example/bella.jpg"),
            properties: Some(properties),
        }
    }

    #[test]
    fn test_perfect_animal_scores_100() {
        let properties = json!({
            "description": "Bella is a wonderful, energetic Labrador mix who loves playing \
                            fetch and swimming. She gets along great with children."
        });
        let assessment = assess(&complete_view(&properties));
        assert!(
            (assessment.overall_score - 100.0).abs() < f64::EPSILON,
            "{}",
            assessment.overall_score
        );
    }

    #[test]
    fn test_empty_animal_scores_0() {
        let assessment = assess(&QualityView::default());
        assert_eq!(assessment.overall_score, 0.0);
        assert!(!assessment.completeness.issues.is_empty());
    }

    #[test]
    fn test_missing_name_costs_20_of_40() {
        let properties = json!({});
        let mut view = complete_view(&properties);
        view.name = "";
        let assessment = assess(&view);
        assert_eq!(assessment.completeness.points_earned, 20);
        assert!(assessment.completeness.issues.contains(&"missing name"));
    }

    #[test]
    fn test_age_satisfied_by_any_age_field() {
        let properties = json!({});
        let mut view = complete_view(&properties);
        view.age_text = None;
        view.age_min_months = None;
        // max still set
        let assessment = assess(&view);
        assert_eq!(assessment.completeness.points_earned, 40);

        view.age_max_months = None;
        let assessment = assess(&view);
        assert_eq!(assessment.completeness.points_earned, 30);
    }

    #[test]
    fn test_short_description_is_not_rich_content() {
        let properties = json!({"description": "Nice dog."});
        let assessment = assess(&complete_view(&properties));
        assert_eq!(assessment.rich_content.points_earned, 0);
    }

    #[test]
    fn test_standardization_partial_credit() {
        let properties = json!({});
        let mut view = complete_view(&properties);
        view.standardized_size = None;
        let assessment = assess(&view);
        assert_eq!(assessment.standardization.points_earned, 15);
        assert!((assessment.standardization.percentage() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_aggregate_counts_and_issues() {
        let rich = json!({
            "description": "A long and loving description of a very good dog who deserves \
                            the best home in the entire world."
        });
        let perfect = assess(&complete_view(&rich));

        let empty_props = json!({});
        let mut poor_view = complete_view(&empty_props);
        poor_view.name = "";
        poor_view.standardized_breed = None;
        poor_view.primary_image_url = None;
        let poor = assess(&poor_view);

        let report = aggregate(3, &[perfect, poor]);
        assert_eq!(report.organization_id, 3);
        assert_eq!(report.total_animals, 2);
        assert_eq!(report.animals_at_100, 1);
        assert_eq!(report.animals_below_70, 1);
        assert_eq!(report.common_issues["missing name"], 1);
        assert!(report.overall_score < 100.0);
    }

    #[test]
    fn test_aggregate_empty_is_zeroed() {
        let report = aggregate(1, &[]);
        assert_eq!(report.total_animals, 0);
        assert_eq!(report.overall_score, 0.0);
    }
}
