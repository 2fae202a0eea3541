//! Crime index extractor.
//!
//! Pages are addressed by zip code when one is known, with the city page as
//! the fallback. Chart labels on these pages usually list the local figure
//! next to state and national figures; the cascade keeps the state figure,
//! or the local one when no state figure is shown.

use std::collections::HashMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use tracing::{debug, warn};

use super::parse::{
    accessible_labels, element_text, label_matches, label_pairs, normalize_label,
    scan_label_rows, selector, MetricSpec, NumberKind,
};
use super::{run_cascade, visit, Extraction, SiteExtractor, Strategy};
use crate::browser::{PageHandle, PageSnapshot};
use crate::error::{ScrapeError, ScrapeResult};
use crate::models::states::{slugify, state_name, state_slug};
use crate::models::{CrimeData, ErrorSource, LocationQuery, StrategyKind};

pub const DEFAULT_CRIME_BASE_URL: &str = "https://www.bestplaces.net";

const NATIONAL: &[&str] = &["united states", "national", "u s", "usa", "us average", "nation"];

// Every label names crime; "total" or "property" alone appear in unrelated
// alt text and captions.
const VIOLENT: &[&str] = &["violent crime"];
const PROPERTY: &[&str] = &["property crime"];
const TOTAL: &[&str] = &["total crime", "overall crime", "crime index"];

const SPECS: &[MetricSpec] = &[
    MetricSpec {
        key: "violent",
        labels: VIOLENT,
        exclude: NATIONAL,
        kind: NumberKind::Plain,
    },
    MetricSpec {
        key: "property",
        labels: PROPERTY,
        exclude: NATIONAL,
        kind: NumberKind::Plain,
    },
    MetricSpec {
        key: "total",
        labels: TOTAL,
        exclude: NATIONAL,
        kind: NumberKind::Plain,
    },
];

/// Indices found by one strategy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrimeFigures {
    pub violent: Option<f64>,
    pub property: Option<f64>,
    pub total: Option<f64>,
}

impl Extraction for CrimeFigures {
    fn is_empty(&self) -> bool {
        self.violent.is_none() && self.property.is_none() && self.total.is_none()
    }
}

impl CrimeFigures {
    fn set(&mut self, metric: Metric, value: f64) {
        let slot = match metric {
            Metric::Violent => &mut self.violent,
            Metric::Property => &mut self.property,
            Metric::Total => &mut self.total,
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    fn from_found(found: &HashMap<&'static str, f64>) -> Self {
        Self {
            violent: found.get("violent").copied(),
            property: found.get("property").copied(),
            total: found.get("total").copied(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Metric {
    Violent,
    Property,
    Total,
}

fn classify(label: &str) -> Option<Metric> {
    if label_matches(label, VIOLENT) {
        Some(Metric::Violent)
    } else if label_matches(label, PROPERTY) {
        Some(Metric::Property)
    } else if label_matches(label, TOTAL) {
        Some(Metric::Total)
    } else {
        None
    }
}

/// Place names used to pick the state figure out of a chart label.
#[derive(Debug, Clone, Default)]
pub struct PlaceContext {
    pub city: Option<String>,
    pub state_code: String,
    pub state_name: Option<String>,
}

impl PlaceContext {
    pub fn from_query(query: &LocationQuery) -> Self {
        let state_code = query.state();
        Self {
            city: query.city().map(str::to_string),
            state_name: state_name(&state_code).map(str::to_string),
            state_code,
        }
    }

    fn rank(&self, name: &str) -> Option<u8> {
        let norm = normalize_label(name);
        if NATIONAL.iter().any(|n| norm.contains(&normalize_label(n))) {
            return None;
        }
        let matches = |place: &str| !place.is_empty() && norm.contains(&normalize_label(place));
        if self.state_name.as_deref().is_some_and(matches)
            || norm.split(' ').any(|w| w.eq_ignore_ascii_case(&self.state_code))
        {
            Some(0)
        } else if self.city.as_deref().is_some_and(matches) {
            Some(1)
        } else {
            Some(2)
        }
    }

    /// State figure among `(place, value)` pairs, else the best local one.
    /// National figures are never picked.
    pub fn pick(&self, pairs: &[(String, f64)]) -> Option<f64> {
        pairs
            .iter()
            .filter_map(|(name, value)| self.rank(name).map(|r| (r, *value)))
            .min_by_key(|(rank, _)| *rank)
            .map(|(_, value)| value)
    }
}

/// Crime page URLs for a query, most specific first.
///
/// Pure and deterministic. Unmapped state codes are rejected before any
/// navigation happens.
pub fn crime_urls(base: &str, query: &LocationQuery) -> ScrapeResult<Vec<String>> {
    let state_code = query.state();
    let state = state_slug(&state_code, '_').ok_or_else(|| {
        ScrapeError::validation(format!("no crime page mapping for state '{}'", state_code))
    })?;
    let base = base.trim_end_matches('/');
    let city = query.city().map(|c| slugify(c, '_')).filter(|c| !c.is_empty());

    let mut urls = Vec::new();
    match (query.zip5(), city.as_deref()) {
        (Some(zip), Some(city)) => {
            urls.push(format!("{}/crime/zip-code/{}/{}/{}", base, state, city, zip));
            urls.push(format!("{}/crime/city/{}/{}", base, state, city));
        }
        (Some(zip), None) => urls.push(format!("{}/crime/zip-code/{}/{}", base, state, zip)),
        (None, Some(city)) => urls.push(format!("{}/crime/city/{}/{}", base, state, city)),
        (None, None) => {
            return Err(ScrapeError::validation(
                "crime lookup needs a zip code or a city",
            ))
        }
    }
    Ok(urls)
}

/// Chart labels and ARIA labels: each label names its metric and lists one
/// or more place/value pairs.
fn widget_strategy(snapshot: &PageSnapshot, ctx: &PlaceContext) -> CrimeFigures {
    let mut figures = CrimeFigures::default();

    for label in accessible_labels(&snapshot.html) {
        let Some(metric) = classify(&label) else {
            continue;
        };
        if let Some(value) = ctx.pick(&label_pairs(&label)) {
            figures.set(metric, value);
        }
    }

    // Charts whose title names the metric and whose data labels are
    // separate elements.
    let doc = snapshot.document();
    let (Some(charts), Some(titles), Some(data_labels)) = (
        selector("[class*=chart], figure, [data-chart]"),
        selector("h2, h3, h4, h5, figcaption, [class*=title], svg title"),
        selector("svg text, [class*=data-label], [class*=chart-label], [class*=legend] li"),
    ) else {
        return figures;
    };
    for chart in doc.select(&charts) {
        let title = chart
            .value()
            .attr("aria-label")
            .map(str::to_string)
            .or_else(|| chart.select(&titles).next().map(|t| element_text(&t)))
            .unwrap_or_default();
        let Some(metric) = classify(&title) else {
            continue;
        };
        let labels: Vec<String> = chart.select(&data_labels).map(|l| element_text(&l)).collect();
        let pairs = label_pairs(&labels.join(", "));
        if let Some(value) = ctx.pick(&pairs) {
            figures.set(metric, value);
        }
    }

    figures
}

fn table_strategy(snapshot: &PageSnapshot, _ctx: &PlaceContext) -> CrimeFigures {
    CrimeFigures::from_found(&scan_label_rows(&snapshot.html, SPECS))
}

fn text_patterns() -> &'static [(Metric, Regex)] {
    static PATTERNS: OnceLock<Vec<(Metric, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let number = r"(\d[\d,]*(?:\.\d+)?)";
        [
            (Metric::Violent, r"violent\s+crime"),
            (Metric::Property, r"property\s+crime"),
            (Metric::Total, r"(?:total|overall)\s+crime"),
            (Metric::Total, r"crime\s+index"),
        ]
        .into_iter()
        .filter_map(|(metric, prefix)| {
            let pattern = format!(
                r"(?i){}(?:\s+(?:rate|index|score))?\s*(?:\([^)]*\))?[^\d\n]{{0,40}}?{}",
                prefix, number
            );
            Regex::new(&pattern).ok().map(|re| (metric, re))
        })
        .collect()
    })
}

/// Phrases like "violent crime rate of 21.4" or "Property Crime: 54.7".
fn text_strategy(snapshot: &PageSnapshot, _ctx: &PlaceContext) -> CrimeFigures {
    let mut figures = CrimeFigures::default();
    for (metric, re) in text_patterns() {
        let value = re
            .captures(&snapshot.text)
            .and_then(|c| c.get(1))
            .and_then(|m| super::parse::first_number(m.as_str()));
        if let Some(value) = value {
            figures.set(*metric, value);
        }
    }
    figures
}

fn graphical_strategy(snapshot: &PageSnapshot, _ctx: &PlaceContext) -> CrimeFigures {
    let mut figures = CrimeFigures::default();
    for meter in &snapshot.meters {
        if label_matches(&meter.label, NATIONAL) {
            continue;
        }
        if let Some(metric) = classify(&meter.label) {
            figures.set(metric, meter.value);
        }
    }
    figures
}

const CASCADE: &[(StrategyKind, Strategy<PlaceContext, CrimeFigures>)] = &[
    (StrategyKind::Widget, widget_strategy),
    (StrategyKind::Table, table_strategy),
    (StrategyKind::Text, text_strategy),
    (StrategyKind::Graphical, graphical_strategy),
];

fn grade_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)crime\s+grade\s*[:\-]?\s*([A-F][+\-]?)(?:\s|$|[^A-Za-z0-9])")
            .expect("valid regex")
    })
}

/// Letter grade shown alongside the indices, if any.
pub fn crime_grade(text: &str) -> Option<String> {
    grade_pattern()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_ascii_uppercase())
}

/// Run the crime cascade over one snapshot.
pub fn extract_crime(snapshot: &PageSnapshot, ctx: &PlaceContext) -> Option<CrimeData> {
    let (strategy, figures) = run_cascade(ErrorSource::Crime, snapshot, ctx, CASCADE)?;
    Some(CrimeData {
        violent_crime_index: figures.violent,
        property_crime_index: figures.property,
        total_crime_index: figures.total,
        grade: crime_grade(&snapshot.text),
        strategy,
        source_url: snapshot.url.clone(),
        scraped_at: Utc::now(),
    })
}

/// Crime indices for the subject property's zip code or city.
#[derive(Debug, Clone)]
pub struct CrimeExtractor {
    base_url: String,
}

impl Default for CrimeExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_CRIME_BASE_URL)
    }
}

impl CrimeExtractor {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl SiteExtractor for CrimeExtractor {
    type Output = CrimeData;

    fn source(&self) -> ErrorSource {
        ErrorSource::Crime
    }

    async fn scrape(&self, page: &dyn PageHandle, query: &LocationQuery) -> ScrapeResult<CrimeData> {
        let urls = crime_urls(&self.base_url, query)?;
        let ctx = PlaceContext::from_query(query);

        let mut last_error = None;
        for url in &urls {
            let snapshot = match visit(page, url).await {
                Ok(snapshot) => snapshot,
                Err(e @ ScrapeError::Blocked(_)) => return Err(e),
                Err(e) => {
                    warn!("Crime page {} failed: {}", url, e);
                    last_error = Some(e);
                    continue;
                }
            };
            if let Some(data) = extract_crime(&snapshot, &ctx) {
                return Ok(data);
            }
            debug!("No crime figures on {}", url);
            last_error = Some(ScrapeError::parse_failure(format!(
                "no crime indices found on {}",
                url
            )));
        }

        Err(last_error
            .unwrap_or_else(|| ScrapeError::parse_failure("no crime page could be read")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(city: Option<&str>, state: &str, zip: Option<&str>) -> LocationQuery {
        LocationQuery::new("2778 2nd St NE", city, state, zip).unwrap()
    }

    fn ctx() -> PlaceContext {
        PlaceContext::from_query(&query(Some("Hickory"), "NC", Some("28602")))
    }

    #[test]
    fn test_urls_zip_then_city() {
        let urls = crime_urls(DEFAULT_CRIME_BASE_URL, &query(Some("Hickory"), "NC", Some("28602")))
            .unwrap();
        assert_eq!(
            urls,
            vec![
                "https://www.bestplaces.net/crime/zip-code/north_carolina/hickory/28602",
                "https://www.bestplaces.net/crime/city/north_carolina/hickory",
            ]
        );
    }

    #[test]
    fn test_urls_are_deterministic() {
        let q = query(None, "NC", Some("28602-1234"));
        let a = crime_urls("https://crime.example/", &q).unwrap();
        let b = crime_urls("https://crime.example/", &q).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, vec!["https://crime.example/crime/zip-code/north_carolina/28602"]);
    }

    #[test]
    fn test_urls_city_only() {
        let urls = crime_urls("https://c.example", &query(Some("Winston-Salem"), "NC", None)).unwrap();
        assert_eq!(urls, vec!["https://c.example/crime/city/north_carolina/winston_salem"]);
    }

    #[test]
    fn test_unmapped_state_is_validation_error() {
        let q: LocationQuery =
            serde_json::from_str(r#"{"street":"1 Main","city":"Hickory","state":"ZZ"}"#).unwrap();
        let err = crime_urls(DEFAULT_CRIME_BASE_URL, &q).unwrap_err();
        assert!(matches!(err, ScrapeError::Validation(_)));
    }

    #[test]
    fn test_pick_prefers_state_over_national() {
        let ctx = ctx();
        let pairs = vec![
            ("United States".to_string(), 22.7),
            ("North Carolina".to_string(), 21.9),
        ];
        assert_eq!(ctx.pick(&pairs), Some(21.9));

        let pairs = vec![
            ("Hickory".to_string(), 38.3),
            ("North Carolina".to_string(), 21.9),
        ];
        assert_eq!(ctx.pick(&pairs), Some(21.9));

        let pairs = vec![
            ("United States".to_string(), 22.7),
            ("Hickory".to_string(), 38.3),
        ];
        assert_eq!(ctx.pick(&pairs), Some(38.3));

        let pairs = vec![("National".to_string(), 22.7)];
        assert_eq!(ctx.pick(&pairs), None);
    }

    #[test]
    fn test_widget_strategy_chart_labels() {
        let html = r#"
            <div aria-label="Violent crime: North Carolina 21.9, United States 22.7"></div>
            <div aria-label="Property crime: United States 35.4, North Carolina 41.2"></div>"#;
        let snap = PageSnapshot::from_html("https://c.example/x", html);
        let data = extract_crime(&snap, &ctx()).unwrap();
        assert_eq!(data.strategy, StrategyKind::Widget);
        assert_eq!(data.violent_crime_index, Some(21.9));
        assert_eq!(data.property_crime_index, Some(41.2));
        assert_eq!(data.total_crime_index, None);
        assert_eq!(data.source_url, "https://c.example/x");
    }

    #[test]
    fn test_widget_strategy_chart_containers() {
        let html = r#"
            <div class="crime-chart">
              <h3>Violent Crime</h3>
              <svg><text>Hickory: 38.3</text><text>United States: 22.7</text></svg>
            </div>"#;
        let snap = PageSnapshot::from_html("https://c.example/x", html);
        let data = extract_crime(&snap, &ctx()).unwrap();
        assert_eq!(data.violent_crime_index, Some(38.3));
    }

    #[test]
    fn test_table_strategy() {
        let html = r#"
            <table>
              <tr><th></th><th>Hickory</th><th>United States</th></tr>
              <tr><td>Violent Crime</td><td>38.3</td><td>22.7</td></tr>
              <tr><td>Property Crime</td><td>61.0</td><td>35.4</td></tr>
              <tr><td>National total</td><td>100</td></tr>
            </table>"#;
        let snap = PageSnapshot::from_html("https://c.example/x", html);
        let data = extract_crime(&snap, &ctx()).unwrap();
        assert_eq!(data.strategy, StrategyKind::Table);
        assert_eq!(data.violent_crime_index, Some(38.3));
        assert_eq!(data.property_crime_index, Some(61.0));
        assert_eq!(data.total_crime_index, None);
    }

    #[test]
    fn test_text_strategy() {
        let html = "<p>Hickory has a violent crime rate of 21.4 and a property crime rate of 54.7. \
                    Crime Grade: C+ overall.</p>";
        let snap = PageSnapshot::from_html("https://c.example/x", html);
        let data = extract_crime(&snap, &ctx()).unwrap();
        assert_eq!(data.strategy, StrategyKind::Text);
        assert_eq!(data.violent_crime_index, Some(21.4));
        assert_eq!(data.property_crime_index, Some(54.7));
        assert_eq!(data.grade.as_deref(), Some("C+"));
    }

    #[test]
    fn test_unrelated_labels_are_not_crime_figures() {
        let html = r#"
            <img src="/pop.png" alt="Total population: Hickory 43,490">
            <div aria-label="Property values: Hickory 212,000"></div>
            <p>Hickory has a violent crime rate of 21.4 and a property crime rate of 54.7.</p>"#;
        let snap = PageSnapshot::from_html("https://c.example/x", html);
        let data = extract_crime(&snap, &ctx()).unwrap();
        assert_eq!(data.strategy, StrategyKind::Text);
        assert_eq!(data.total_crime_index, None);
        assert_eq!(data.violent_crime_index, Some(21.4));
        assert_eq!(data.property_crime_index, Some(54.7));
    }

    #[test]
    fn test_graphical_strategy() {
        let html = r#"
            <div role="meter" aria-label="Violent crime" aria-valuenow="38"></div>
            <div role="meter" aria-label="Violent crime (national)" aria-valuenow="23"></div>"#;
        let snap = PageSnapshot::from_html("https://c.example/x", html);
        let data = extract_crime(&snap, &ctx()).unwrap();
        assert_eq!(data.strategy, StrategyKind::Graphical);
        assert_eq!(data.violent_crime_index, Some(38.0));
    }

    #[test]
    fn test_nothing_found() {
        let snap = PageSnapshot::from_html("https://c.example/x", "<p>Nothing to see</p>");
        assert!(extract_crime(&snap, &ctx()).is_none());
    }
}
