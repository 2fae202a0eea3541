//! Enrichment result types.
//!
//! These are the stable JSON contract handed to the persistence layer, so
//! field names are camelCase and every optional value serializes as `null`
//! rather than being omitted.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::LocationQuery;

/// Outcome envelope for one external site.
///
/// Exactly one of `data` / `error` is set. A failed site is a value, never a
/// panic or a propagated error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> SiteResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> SiteResult<U> {
        SiteResult {
            success: self.success,
            data: self.data.map(f),
            error: self.error,
        }
    }
}

/// Which extraction technique produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Dedicated widgets: chart labels, badge alt text, ARIA labels.
    Widget,
    /// Label/value rows in tables or definition lists.
    Table,
    /// Regular expressions over visible text.
    Text,
    /// Progress bars and meters.
    Graphical,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyKind::Widget => "widget",
            StrategyKind::Table => "table",
            StrategyKind::Text => "text",
            StrategyKind::Graphical => "graphical",
        };
        f.write_str(name)
    }
}

/// Crime indices (100 = national average).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrimeData {
    pub violent_crime_index: Option<f64>,
    pub property_crime_index: Option<f64>,
    pub total_crime_index: Option<f64>,
    /// Letter grade when the site shows one.
    pub grade: Option<String>,
    pub strategy: StrategyKind,
    pub source_url: String,
    pub scraped_at: DateTime<Utc>,
}

/// One school picked for a level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolInfo {
    pub name: String,
    /// 1-10 site rating.
    pub rating: Option<u8>,
}

/// School level a result is categorized into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchoolLevel {
    Elementary,
    Middle,
    High,
}

impl fmt::Display for SchoolLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchoolLevel::Elementary => "elementary",
            SchoolLevel::Middle => "middle",
            SchoolLevel::High => "high",
        };
        f.write_str(name)
    }
}

/// How the school list was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchoolSearchPath {
    /// The site's own address search; results tagged as assigned.
    AddressSearch,
    /// Generic city listing; schools near the address, not assigned to it.
    CityListing,
}

/// Whether schools are known to serve the address or are merely nearby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchoolConfidence {
    Assigned,
    Nearby,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolData {
    pub elementary: Option<SchoolInfo>,
    pub middle: Option<SchoolInfo>,
    pub high: Option<SchoolInfo>,
    /// Derived by the aggregator's rating policy.
    pub average_rating: Option<f64>,
    pub method: SchoolSearchPath,
    pub strategy: StrategyKind,
    pub confidence: SchoolConfidence,
    pub source_url: String,
    pub scraped_at: DateTime<Utc>,
}

impl SchoolData {
    pub fn school(&self, level: SchoolLevel) -> Option<&SchoolInfo> {
        match level {
            SchoolLevel::Elementary => self.elementary.as_ref(),
            SchoolLevel::Middle => self.middle.as_ref(),
            SchoolLevel::High => self.high.as_ref(),
        }
    }

    pub fn rating(&self, level: SchoolLevel) -> Option<u8> {
        self.school(level).and_then(|s| s.rating)
    }
}

/// Walk, transit and bike scores (0-100).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalkabilityData {
    pub walk_score: Option<u8>,
    pub transit_score: Option<u8>,
    pub bike_score: Option<u8>,
    pub strategy: StrategyKind,
    pub source_url: String,
    pub scraped_at: DateTime<Utc>,
}

/// Origin tag for an entry in [`CombinedEnrichmentResult::errors`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSource {
    Validation,
    Browser,
    Crime,
    Schools,
    Walkability,
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorSource::Validation => "validation",
            ErrorSource::Browser => "browser",
            ErrorSource::Crime => "crime",
            ErrorSource::Schools => "schools",
            ErrorSource::Walkability => "walkability",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentError {
    pub source: ErrorSource,
    pub error: String,
}

/// The single record produced by one orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedEnrichmentResult {
    /// True iff any site succeeded.
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub property: LocationQuery,
    pub crime: SiteResult<CrimeData>,
    pub schools: SiteResult<SchoolData>,
    pub walkability: SiteResult<WalkabilityData>,
    pub errors: Vec<EnrichmentError>,
}
