//! School ratings extractor.
//!
//! A city listing only returns schools near an address. The site's own
//! address search knows which schools are assigned to it, so that path runs
//! first and the listing is the lower-confidence fallback.

mod candidates;
pub mod categorize;

pub use candidates::{parse_rating, pick_levels, CandidateFilter, LevelPicks, SchoolCandidate};

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use super::{capture, dismiss_consent, first_present, run_cascade, visit, SiteExtractor};
use crate::browser::{PageHandle, PageSnapshot};
use crate::error::{ScrapeError, ScrapeResult};
use crate::models::states::{slugify, state_slug};
use crate::models::{
    ErrorSource, LocationQuery, SchoolConfidence, SchoolData, SchoolSearchPath, StrategyKind,
};

pub const DEFAULT_SCHOOLS_BASE_URL: &str = "https://www.greatschools.org";

const SEARCH_INPUTS: &[&str] = &[
    "input[data-testid='search-input']",
    "input[name='searchTerm']",
    "input[type='search']",
    "input[placeholder*='address' i]",
    "input[placeholder*='Address']",
    "#home-page-search-input",
];

const AUTOCOMPLETE_OPTIONS: &[&str] = &[
    "[role='listbox'] [role='option']",
    "[class*='autocomplete'] li",
    "[class*='suggestion']",
];

const PUBLIC_FILTERS: &[&str] = &[
    "[data-testid='filter-public']",
    "input[value='public']",
    "label[for*='public']",
    "button[aria-label*='Public']",
];

const RESULT_MARKERS: &[&str] = &[
    "[class*='school-card']",
    "[class*='SchoolCard']",
    "[class*='school-list']",
    "table",
];

/// Generic public-school listing for the query's city, or a zip search
/// when no city is known.
pub fn city_listing_url(base: &str, query: &LocationQuery) -> ScrapeResult<String> {
    let state_code = query.state();
    let state = state_slug(&state_code, '-').ok_or_else(|| {
        ScrapeError::validation(format!("no school listing mapping for state '{}'", state_code))
    })?;
    let base = base.trim_end_matches('/');
    match (query.city().map(|c| slugify(c, '-')), query.zip5()) {
        (Some(city), _) if !city.is_empty() => {
            Ok(format!("{}/{}/{}/schools/?st=public", base, state, city))
        }
        (_, Some(zip)) => Ok(format!("{}/search/search.page?q={}&st=public", base, zip)),
        _ => Err(ScrapeError::validation(
            "school listing needs a city or a zip code",
        )),
    }
}

/// Run the candidate cascade and pick one school per level.
pub fn extract_schools(
    snapshot: &PageSnapshot,
    filter: &CandidateFilter,
) -> Option<(StrategyKind, LevelPicks)> {
    let (strategy, candidates) =
        run_cascade(ErrorSource::Schools, snapshot, filter, candidates::CASCADE)?;
    let picks = pick_levels(&candidates);
    if picks.is_empty() {
        debug!(
            count = candidates.len(),
            "School candidates found but none could be categorized"
        );
        return None;
    }
    Some((strategy, picks))
}

fn school_data(
    snapshot: &PageSnapshot,
    strategy: StrategyKind,
    picks: LevelPicks,
    method: SchoolSearchPath,
) -> SchoolData {
    let confidence = match method {
        SchoolSearchPath::AddressSearch => SchoolConfidence::Assigned,
        SchoolSearchPath::CityListing => SchoolConfidence::Nearby,
    };
    SchoolData {
        elementary: picks.elementary,
        middle: picks.middle,
        high: picks.high,
        average_rating: None,
        method,
        strategy,
        confidence,
        source_url: snapshot.url.clone(),
        scraped_at: Utc::now(),
    }
}

/// Assigned-school ratings for the subject property.
#[derive(Debug, Clone)]
pub struct SchoolExtractor {
    base_url: String,
    /// Wait for each search UI element.
    ui_timeout: Duration,
    /// Pause after submitting the search or toggling a filter.
    settle: Duration,
}

impl Default for SchoolExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_SCHOOLS_BASE_URL)
    }
}

impl SchoolExtractor {
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

    async fn settle(&self) {
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }
    }

    /// Drive the site's address search. `Ok(None)` means the search UI or
    /// its assigned results were not available and the caller should fall
    /// back to the city listing.
    async fn address_search(
        &self,
        page: &dyn PageHandle,
        query: &LocationQuery,
    ) -> ScrapeResult<Option<SchoolData>> {
        page.goto(&self.base_url).await?;
        dismiss_consent(page).await;

        let Some(input) = first_present(page, SEARCH_INPUTS, self.ui_timeout).await else {
            debug!("School address search input not found");
            return Ok(None);
        };
        page.click(input).await?;
        page.type_text(input, &query.full_address()).await?;

        match first_present(page, AUTOCOMPLETE_OPTIONS, self.ui_timeout).await {
            Some(option) => {
                debug!("Selecting autocomplete option {}", option);
                page.click(option).await?;
            }
            None => {
                debug!("No autocomplete suggestions, submitting the search");
                page.press_enter(input).await?;
            }
        }
        self.settle().await;

        if first_present(page, RESULT_MARKERS, self.ui_timeout).await.is_none() {
            debug!("No school results rendered for the address search");
            return Ok(None);
        }

        if let Some(filter) = first_present(page, PUBLIC_FILTERS, Duration::from_millis(500)).await
        {
            match page.click(filter).await {
                Ok(()) => self.settle().await,
                Err(e) => debug!("Public school filter not applied: {}", e),
            }
        }

        let snapshot = capture(page).await?;
        let filter = CandidateFilter {
            assigned_only: true,
        };
        Ok(extract_schools(&snapshot, &filter).map(|(strategy, picks)| {
            school_data(&snapshot, strategy, picks, SchoolSearchPath::AddressSearch)
        }))
    }

    async fn city_listing(
        &self,
        page: &dyn PageHandle,
        query: &LocationQuery,
    ) -> ScrapeResult<SchoolData> {
        let url = city_listing_url(&self.base_url, query)?;
        warn!(
            url = %url,
            "Falling back to the city school listing; schools are nearby, not assigned"
        );
        let snapshot = visit(page, &url).await?;
        let (strategy, picks) = extract_schools(&snapshot, &CandidateFilter::default())
            .ok_or_else(|| {
                ScrapeError::parse_failure(format!("no categorizable schools on {}", url))
            })?;
        Ok(school_data(
            &snapshot,
            strategy,
            picks,
            SchoolSearchPath::CityListing,
        ))
    }
}

#[async_trait]
impl SiteExtractor for SchoolExtractor {
    type Output = SchoolData;

    fn source(&self) -> ErrorSource {
        ErrorSource::Schools
    }

    async fn scrape(
        &self,
        page: &dyn PageHandle,
        query: &LocationQuery,
    ) -> ScrapeResult<SchoolData> {
        // Reject unmapped states before touching the page.
        city_listing_url(&self.base_url, query)?;

        match self.address_search(page, query).await {
            Ok(Some(data)) => {
                info!("Assigned schools resolved through the address search");
                return Ok(data);
            }
            Ok(None) => {}
            Err(e @ ScrapeError::Blocked(_)) => return Err(e),
            Err(e) => debug!("Address search failed: {}", e),
        }

        self.city_listing(page, query).await
    }
}
