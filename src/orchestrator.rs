//! One enrichment pass for one location.
//!
//! Sites run in a fixed order (crime, schools, walkability) on a single
//! session owned by the call. The session is closed before the result is
//! assembled, whatever happened in between.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::aggregate::{ResultAggregator, SiteOutcomes};
use crate::browser::{BrowserSession, SessionFactory};
use crate::config::EnrichConfig;
use crate::error::{ScrapeError, ScrapeResult};
use crate::models::{
    CombinedEnrichmentResult, CrimeData, EnrichmentError, ErrorSource, LocationQuery, SchoolData,
    SiteResult, WalkabilityData,
};
use crate::pacing;
use crate::retry::{RetryPolicy, RetryingOperation};
use crate::scrapers::{CrimeExtractor, SchoolExtractor, SiteExtractor, WalkabilityExtractor};

pub type CrimeSite = Box<dyn SiteExtractor<Output = CrimeData>>;
pub type SchoolSite = Box<dyn SiteExtractor<Output = SchoolData>>;
pub type WalkabilitySite = Box<dyn SiteExtractor<Output = WalkabilityData>>;

pub struct ScraperOrchestrator {
    factory: Arc<dyn SessionFactory>,
    headless: bool,
    retry: RetryingOperation,
    request_delay: Duration,
    request_jitter: Duration,
    aggregator: ResultAggregator,
    crime: CrimeSite,
    schools: SchoolSite,
    walkability: WalkabilitySite,
}

impl ScraperOrchestrator {
    pub fn new(factory: Arc<dyn SessionFactory>, config: &EnrichConfig) -> Self {
        Self {
            factory,
            headless: config.headless,
            retry: RetryingOperation::new(config.retry_policy()),
            request_delay: config.request_delay(),
            request_jitter: config.request_jitter(),
            aggregator: ResultAggregator::new(config.rating_policy.clone()),
            crime: Box::new(CrimeExtractor::new(config.sites.crime.clone())),
            schools: Box::new(SchoolExtractor::new(config.sites.schools.clone())),
            walkability: Box::new(WalkabilityExtractor::new(config.sites.walkability.clone())),
        }
    }

    /// Replace the site extractors.
    pub fn with_extractors(
        mut self,
        crime: CrimeSite,
        schools: SchoolSite,
        walkability: WalkabilitySite,
    ) -> Self {
        self.crime = crime;
        self.schools = schools;
        self.walkability = walkability;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        self.retry.policy()
    }

    /// Enrich one location. Always returns a complete record; invalid queries
    /// are rejected before a session is created.
    pub async fn scrape_all(&self, query: &LocationQuery) -> CombinedEnrichmentResult {
        if let Err(e) = query.validate() {
            warn!(error = %e, "Rejecting location query");
            return self.aggregator.rejected(query.clone(), &e);
        }

        info!(address = %query.full_address(), "Starting enrichment");
        let mut session = self.factory.create();
        let outcomes = self.run_sites(session.as_mut(), query).await;
        session.close().await;

        let result = self.aggregator.aggregate(query.clone(), outcomes);
        info!(
            success = result.success,
            errors = result.errors.len(),
            "Enrichment finished"
        );
        result
    }

    async fn run_sites(
        &self,
        session: &mut dyn BrowserSession,
        query: &LocationQuery,
    ) -> SiteOutcomes {
        let mut outcomes = SiteOutcomes::default();

        if let Err(e) = session.open(self.headless).await {
            error!(error = %e, "Browser session could not be opened");
            outcomes.fatal = Some(browser_error(&e));
            return outcomes;
        }

        let (crime, aborted) = self.run_site(session, self.crime.as_ref(), query).await;
        outcomes.crime = Some(crime);
        if let Some(e) = aborted {
            outcomes.fatal = Some(browser_error(&e));
            return outcomes;
        }

        if let Err(e) = self.between_sites(session).await {
            outcomes.fatal = Some(browser_error(&e));
            return outcomes;
        }
        let (schools, aborted) = self.run_site(session, self.schools.as_ref(), query).await;
        outcomes.schools = Some(schools);
        if let Some(e) = aborted {
            outcomes.fatal = Some(browser_error(&e));
            return outcomes;
        }

        if let Err(e) = self.between_sites(session).await {
            outcomes.fatal = Some(browser_error(&e));
            return outcomes;
        }
        let (walkability, aborted) = self
            .run_site(session, self.walkability.as_ref(), query)
            .await;
        outcomes.walkability = Some(walkability);
        if let Some(e) = aborted {
            outcomes.fatal = Some(browser_error(&e));
        }

        outcomes
    }

    /// Retry one site. The second value is set when the browser was lost and
    /// the run has to stop.
    async fn run_site<T>(
        &self,
        session: &mut dyn BrowserSession,
        extractor: &dyn SiteExtractor<Output = T>,
        query: &LocationQuery,
    ) -> (SiteResult<T>, Option<ScrapeError>)
    where
        T: Send,
    {
        let outcome = self.retry.run(session, extractor, query).await;
        info!(
            source = %extractor.source(),
            success = outcome.result.success,
            attempts = outcome.attempts.len(),
            "Site finished"
        );
        if let Some(e) = &outcome.aborted {
            error!(source = %extractor.source(), error = %e, "Browser lost, aborting the run");
        }
        (outcome.result, outcome.aborted)
    }

    /// Pause, then put the session back in the configured mode; a site's
    /// final attempt may have left it visible or closed.
    async fn between_sites(&self, session: &mut dyn BrowserSession) -> ScrapeResult<()> {
        pacing::pause(self.request_delay, self.request_jitter).await;
        if !session.is_open() || session.is_headless() != self.headless {
            info!(headless = self.headless, "Restoring browser mode");
            session.open(self.headless).await?;
        }
        Ok(())
    }
}

fn browser_error(e: &ScrapeError) -> EnrichmentError {
    EnrichmentError {
        source: ErrorSource::Browser,
        error: e.to_string(),
    }
}
