//! Merging per-site outcomes into one combined record.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::ScrapeError;
use crate::models::{
    CombinedEnrichmentResult, CrimeData, EnrichmentError, ErrorSource, LocationQuery, SchoolData,
    SchoolLevel, SiteResult, WalkabilityData,
};

/// How the average school rating is derived.
///
/// The mean of the `primary` levels that have a rating; when none do, the
/// mean of the `fallback` levels; otherwise no average.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RatingPolicy {
    pub primary: Vec<SchoolLevel>,
    pub fallback: Vec<SchoolLevel>,
}

impl Default for RatingPolicy {
    fn default() -> Self {
        Self {
            primary: vec![SchoolLevel::Elementary, SchoolLevel::High],
            fallback: vec![SchoolLevel::Middle],
        }
    }
}

impl RatingPolicy {
    pub fn average(&self, rating: impl Fn(SchoolLevel) -> Option<u8>) -> Option<f64> {
        mean(&self.primary, &rating).or_else(|| mean(&self.fallback, &rating))
    }

    pub fn average_for(&self, schools: &SchoolData) -> Option<f64> {
        self.average(|level| schools.rating(level))
    }
}

fn mean(levels: &[SchoolLevel], rating: &impl Fn(SchoolLevel) -> Option<u8>) -> Option<f64> {
    let values: Vec<f64> = levels
        .iter()
        .filter_map(|level| rating(*level))
        .map(f64::from)
        .collect();
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Per-site results of one run. `None` marks a site that was never
/// attempted because the run aborted first.
#[derive(Debug, Clone, Default)]
pub struct SiteOutcomes {
    pub crime: Option<SiteResult<CrimeData>>,
    pub schools: Option<SiteResult<SchoolData>>,
    pub walkability: Option<SiteResult<WalkabilityData>>,
    /// Error that aborted the run, if any.
    pub fatal: Option<EnrichmentError>,
}

#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    policy: RatingPolicy,
}

impl ResultAggregator {
    pub fn new(policy: RatingPolicy) -> Self {
        Self { policy }
    }

    /// Result for a query rejected before any browser work.
    pub fn rejected(&self, query: LocationQuery, error: &ScrapeError) -> CombinedEnrichmentResult {
        let message = error.to_string();
        CombinedEnrichmentResult {
            success: false,
            timestamp: Utc::now(),
            property: query,
            crime: SiteResult::failed(message.clone()),
            schools: SiteResult::failed(message.clone()),
            walkability: SiteResult::failed(message.clone()),
            errors: vec![EnrichmentError {
                source: ErrorSource::Validation,
                error: message,
            }],
        }
    }

    pub fn aggregate(&self, query: LocationQuery, outcomes: SiteOutcomes) -> CombinedEnrichmentResult {
        let skipped = outcomes
            .fatal
            .as_ref()
            .map(|f| format!("not attempted: {}", f.error))
            .unwrap_or_else(|| "not attempted".to_string());
        let mut errors = Vec::new();

        let crime = settle(ErrorSource::Crime, outcomes.crime, &skipped, &mut errors);
        let schools = settle(ErrorSource::Schools, outcomes.schools, &skipped, &mut errors).map(
            |mut data| {
                data.average_rating = self.policy.average_for(&data);
                data
            },
        );
        let walkability = settle(
            ErrorSource::Walkability,
            outcomes.walkability,
            &skipped,
            &mut errors,
        );
        errors.extend(outcomes.fatal);

        CombinedEnrichmentResult {
            success: crime.success || schools.success || walkability.success,
            timestamp: Utc::now(),
            property: query,
            crime,
            schools,
            walkability,
            errors,
        }
    }
}

fn settle<T>(
    source: ErrorSource,
    outcome: Option<SiteResult<T>>,
    skipped: &str,
    errors: &mut Vec<EnrichmentError>,
) -> SiteResult<T> {
    match outcome {
        Some(result) => {
            if !result.success {
                errors.push(EnrichmentError {
                    source,
                    error: result
                        .error
                        .clone()
                        .unwrap_or_else(|| "unknown error".to_string()),
                });
            }
            result
        }
        None => SiteResult::failed(skipped),
    }
}
