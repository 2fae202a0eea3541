//! Walk, transit and bike score extractor.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use tracing::{debug, warn};

use super::parse::{
    accessible_labels, label_matches, scan_label_rows, selector, to_score, MetricSpec, NumberKind,
};
use super::{capture, dismiss_consent, first_present, run_cascade, visit, Extraction, SiteExtractor, Strategy};
use crate::browser::{PageHandle, PageSnapshot};
use crate::error::{ScrapeError, ScrapeResult};
use crate::models::states::slugify;
use crate::models::{ErrorSource, LocationQuery, StrategyKind, WalkabilityData};

pub const DEFAULT_WALKABILITY_BASE_URL: &str = "https://www.walkscore.com";

const SEARCH_INPUTS: &[&str] = &[
    "input#gs-street",
    "input[name='street']",
    "input[type='search']",
    "input[type='text']",
];

const SPECS: &[MetricSpec] = &[
    MetricSpec {
        key: "walk",
        labels: &["walk score", "walkability"],
        exclude: &[],
        kind: NumberKind::Plain,
    },
    MetricSpec {
        key: "transit",
        labels: &["transit score", "transit"],
        exclude: &[],
        kind: NumberKind::Plain,
    },
    MetricSpec {
        key: "bike",
        labels: &["bike score", "bikeability", "bike"],
        exclude: &[],
        kind: NumberKind::Plain,
    },
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scores {
    pub walk: Option<u8>,
    pub transit: Option<u8>,
    pub bike: Option<u8>,
}

impl Extraction for Scores {
    fn is_empty(&self) -> bool {
        self.walk.is_none() && self.transit.is_none() && self.bike.is_none()
    }
}

impl Scores {
    fn set(&mut self, kind: &str, value: f64) {
        let slot = match kind {
            "walk" => &mut self.walk,
            "transit" => &mut self.transit,
            "bike" => &mut self.bike,
            _ => return,
        };
        if slot.is_none() {
            *slot = to_score(value);
        }
    }

    fn from_found(found: &HashMap<&'static str, f64>) -> Self {
        let mut scores = Self::default();
        for (key, value) in found {
            scores.set(key, *value);
        }
        scores
    }
}

fn score_kind(label: &str) -> Option<&'static str> {
    SPECS
        .iter()
        .find(|spec| label_matches(label, spec.labels))
        .map(|spec| spec.key)
}

/// Score pages to try before the search form: the hyphenated address, then
/// the URL-encoded one.
pub fn walkability_urls(base: &str, query: &LocationQuery) -> Vec<String> {
    let base = base.trim_end_matches('/');
    let address = query.full_address();
    vec![
        format!("{}/score/{}", base, slugify(&address, '-')),
        format!("{}/score/{}", base, urlencoding::encode(&address)),
    ]
}

fn badge_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"/badge/(walk|transit|bike)/score/(\d{1,3})").expect("valid regex")
    })
}

fn labelled_score_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(walk|transit|bike)\s*score\s*(?:of|is|:)?\s*(\d{1,3})\b")
            .expect("valid regex")
    })
}

fn number_first_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(\d{1,3})\s*(walk|transit|bike)\s*score\b").expect("valid regex")
    })
}

/// Labelled scores in `text`; returns the byte ranges of the numbers used.
fn scores_in(text: &str, scores: &mut Scores) -> Vec<std::ops::Range<usize>> {
    let mut claimed = Vec::new();
    for cap in labelled_score_pattern().captures_iter(text) {
        if let (Some(kind), Some(value)) = (cap.get(1), cap.get(2)) {
            if let Ok(parsed) = value.as_str().parse::<f64>() {
                scores.set(&kind.as_str().to_ascii_lowercase(), parsed);
                claimed.push(value.range());
            }
        }
    }
    claimed
}

/// Badge images and their alt text ("Walk Score of 62").
fn widget_strategy(snapshot: &PageSnapshot, _ctx: &()) -> Scores {
    let mut scores = Scores::default();
    let doc = snapshot.document();
    if let Some(imgs) = selector("img[src*='/badge/']") {
        for img in doc.select(&imgs) {
            let Some(cap) = img.value().attr("src").and_then(|s| badge_pattern().captures(s)) else {
                continue;
            };
            if let (Some(kind), Some(value)) = (cap.get(1), cap.get(2)) {
                if let Ok(value) = value.as_str().parse::<f64>() {
                    scores.set(kind.as_str(), value);
                }
            }
        }
    }
    for label in accessible_labels(&snapshot.html) {
        scores_in(&label, &mut scores);
    }
    scores
}

fn table_strategy(snapshot: &PageSnapshot, _ctx: &()) -> Scores {
    Scores::from_found(&scan_label_rows(&snapshot.html, SPECS))
}

/// "Walk Score: 43", "Transit Score of 20" or "62 Walk Score".
///
/// A number already read as the value of a preceding label is never reused
/// for the label after it.
fn text_strategy(snapshot: &PageSnapshot, _ctx: &()) -> Scores {
    let mut scores = Scores::default();
    // Large score numerals are often rendered on the line above the label.
    let flattened = snapshot.text.replace('\n', " ");
    let claimed = scores_in(&flattened, &mut scores);
    for cap in number_first_pattern().captures_iter(&flattened) {
        let (Some(value), Some(kind)) = (cap.get(1), cap.get(2)) else {
            continue;
        };
        if claimed.iter().any(|r| r.start < value.end() && value.start() < r.end) {
            continue;
        }
        if let Ok(parsed) = value.as_str().parse::<f64>() {
            scores.set(&kind.as_str().to_ascii_lowercase(), parsed);
        }
    }
    scores
}

fn graphical_strategy(snapshot: &PageSnapshot, _ctx: &()) -> Scores {
    let mut scores = Scores::default();
    for meter in &snapshot.meters {
        if let Some(kind) = score_kind(&meter.label) {
            scores.set(kind, meter.value);
        }
    }
    scores
}

const CASCADE: &[(StrategyKind, Strategy<(), Scores>)] = &[
    (StrategyKind::Widget, widget_strategy),
    (StrategyKind::Table, table_strategy),
    (StrategyKind::Text, text_strategy),
    (StrategyKind::Graphical, graphical_strategy),
];

pub fn extract_walkability(snapshot: &PageSnapshot) -> Option<WalkabilityData> {
    let (strategy, scores) = run_cascade(ErrorSource::Walkability, snapshot, &(), CASCADE)?;
    Some(WalkabilityData {
        walk_score: scores.walk,
        transit_score: scores.transit,
        bike_score: scores.bike,
        strategy,
        source_url: snapshot.url.clone(),
        scraped_at: Utc::now(),
    })
}

/// Walk/transit/bike scores for the subject address.
#[derive(Debug, Clone)]
pub struct WalkabilityExtractor {
    base_url: String,
    ui_timeout: Duration,
    settle: Duration,
}

impl Default for WalkabilityExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_WALKABILITY_BASE_URL)
    }
}

impl WalkabilityExtractor {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ui_timeout: Duration::from_secs(10),
            settle: Duration::from_millis(2000),
        }
    }

    pub fn with_timing(mut self, ui_timeout: Duration, settle: Duration) -> Self {
        self.ui_timeout = ui_timeout;
        self.settle = settle;
        self
    }

    async fn search_form(
        &self,
        page: &dyn PageHandle,
        query: &LocationQuery,
    ) -> ScrapeResult<PageSnapshot> {
        page.goto(&self.base_url).await?;
        dismiss_consent(page).await;
        let input = first_present(page, SEARCH_INPUTS, self.ui_timeout)
            .await
            .ok_or_else(|| ScrapeError::SelectorNotFound(SEARCH_INPUTS.join(", ")))?;
        page.type_text(input, &query.full_address()).await?;
        page.press_enter(input).await?;
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }
        dismiss_consent(page).await;
        capture(page).await
    }
}

#[async_trait]
impl SiteExtractor for WalkabilityExtractor {
    type Output = WalkabilityData;

    fn source(&self) -> ErrorSource {
        ErrorSource::Walkability
    }

    async fn scrape(
        &self,
        page: &dyn PageHandle,
        query: &LocationQuery,
    ) -> ScrapeResult<WalkabilityData> {
        let mut last_error = None;

        for url in walkability_urls(&self.base_url, query) {
            match visit(page, &url).await {
                Ok(snapshot) => {
                    if let Some(data) = extract_walkability(&snapshot) {
                        return Ok(data);
                    }
                    debug!("No scores on {}", url);
                }
                Err(e @ ScrapeError::Blocked(_)) => return Err(e),
                Err(e) => {
                    debug!("Score page {} failed: {}", url, e);
                    last_error = Some(e);
                }
            }
        }

        warn!("Direct score pages failed, using the search form");
        match self.search_form(page, query).await {
            Ok(snapshot) => extract_walkability(&snapshot).ok_or_else(|| {
                ScrapeError::parse_failure(format!("no walkability scores on {}", snapshot.url))
            }),
            Err(e) => {
                if let Some(earlier) = last_error {
                    debug!("Earlier score page failure: {}", earlier);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> LocationQuery {
        LocationQuery::new("2778 2nd St NE", Some("Hickory"), "NC", Some("28602")).unwrap()
    }

    #[test]
    fn urls_hyphenated_then_encoded() {
        let urls = walkability_urls("https://w.example/", &query());
        assert_eq!(
            urls,
            vec![
                "https://w.example/score/2778-2nd-st-ne-hickory-nc-28602",
                "https://w.example/score/2778%202nd%20St%20NE%2C%20Hickory%2C%20NC%2028602",
            ]
        );
    }

    #[test]
    fn badge_images() {
        let html = r#"
            <img src="//pp.walk.sc/badge/walk/score/62.svg" alt="">
            <img src="//pp.walk.sc/badge/bike/score/40.svg" alt="">"#;
        let snap = PageSnapshot::from_html("https://w.example/score/x", html);
        let data = extract_walkability(&snap).unwrap();
        assert_eq!(data.strategy, StrategyKind::Widget);
        assert_eq!(data.walk_score, Some(62));
        assert_eq!(data.transit_score, None);
        assert_eq!(data.bike_score, Some(40));
    }

    #[test]
    fn badge_alt_text() {
        let html = r#"<img src="/logo.png" alt="Transit Score of 27">"#;
        let snap = PageSnapshot::from_html("https://w.example/score/x", html);
        let data = extract_walkability(&snap).unwrap();
        assert_eq!(data.transit_score, Some(27));
    }

    #[test]
    fn table_rows() {
        let html = "<table><tr><td>Walk Score</td><td>62</td></tr><tr><td>Bike Score</td><td>40</td></tr></table>";
        let snap = PageSnapshot::from_html("https://w.example/score/x", html);
        let data = extract_walkability(&snap).unwrap();
        assert_eq!(data.strategy, StrategyKind::Table);
        assert_eq!(data.walk_score, Some(62));
        assert_eq!(data.bike_score, Some(40));
    }

    #[test]
    fn free_text() {
        let html = "<p>This address has a Walk Score: 43 out of 100.</p><div>20</div><div>Transit Score</div>";
        let snap = PageSnapshot::from_html("https://w.example/score/x", html);
        let data = extract_walkability(&snap).unwrap();
        assert_eq!(data.strategy, StrategyKind::Text);
        assert_eq!(data.walk_score, Some(43));
        assert_eq!(data.transit_score, Some(20));
    }

    #[test]
    fn unavailable_score_stays_empty() {
        let html = "<div>Walk Score: 62</div><div>Bike Score: unavailable</div>";
        let snap = PageSnapshot::from_html("https://w.example/score/x", html);
        let data = extract_walkability(&snap).unwrap();
        assert_eq!(data.strategy, StrategyKind::Text);
        assert_eq!(data.walk_score, Some(62));
        assert_eq!(data.bike_score, None);
        assert_eq!(data.transit_score, None);
    }

    #[test]
    fn numerals_above_each_label() {
        let html = "<div>Walk Score: 62</div><div>35</div><div>Bike Score</div>";
        let snap = PageSnapshot::from_html("https://w.example/score/x", html);
        let data = extract_walkability(&snap).unwrap();
        assert_eq!(data.walk_score, Some(62));
        assert_eq!(data.bike_score, Some(35));
    }

    #[test]
    fn meters_last() {
        let html = r#"<div role="progressbar" aria-valuenow="71"><span>Bikeability</span></div>"#;
        let snap = PageSnapshot::from_html("https://w.example/score/x", html);
        let data = extract_walkability(&snap).unwrap();
        assert_eq!(data.strategy, StrategyKind::Graphical);
        assert_eq!(data.bike_score, Some(71));
    }

    #[test]
    fn nothing_found() {
        let snap = PageSnapshot::from_html("https://w.example/score/x", "<p>Score unavailable</p>");
        assert!(extract_walkability(&snap).is_none());
    }
}
