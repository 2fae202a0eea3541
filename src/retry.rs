//! Bounded retries for one site scrape.
//!
//! Each attempt gets a fresh page that is closed whatever the outcome. When
//! the session is headless, the final attempt re-opens it in visible mode,
//! since some sites serve automation-detected browsers differently.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::browser::BrowserSession;
use crate::error::{ScrapeError, ScrapeResult};
use crate::models::{LocationQuery, SiteResult};
use crate::pacing;
use crate::scrapers::SiteExtractor;

/// Retry behavior for a single site.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts after the first; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Upper bound of the random extra added to `retry_delay`.
    pub jitter: Duration,
    /// Budget for one attempt, navigation and extraction included.
    pub attempt_timeout: Duration,
    /// Re-open the session visibly for the final attempt.
    pub escalate_to_visible: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay: Duration::from_millis(2000),
            jitter: Duration::from_millis(1000),
            attempt_timeout: Duration::from_secs(120),
            escalate_to_visible: true,
        }
    }
}

impl RetryPolicy {
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// One attempt as it happened.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    /// Zero-based attempt index.
    pub attempt: u32,
    /// Mode the browser was in for this attempt.
    pub headless: bool,
    /// `None` when the attempt succeeded.
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    pub result: SiteResult<T>,
    pub attempts: Vec<AttemptRecord>,
    /// Set when the browser could not be re-opened; the run cannot continue.
    pub aborted: Option<ScrapeError>,
}

/// Runs a site extractor under a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetryingOperation {
    policy: RetryPolicy,
}

impl RetryingOperation {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Scrape with retries. Never returns an error: exhausted attempts become
    /// a failed [`SiteResult`] carrying the last error.
    pub async fn run<E>(
        &self,
        session: &mut dyn BrowserSession,
        extractor: &E,
        query: &LocationQuery,
    ) -> RetryOutcome<E::Output>
    where
        E: SiteExtractor + ?Sized,
    {
        let source = extractor.source();
        let total = self.policy.total_attempts();
        let mut attempts = Vec::new();
        let mut last_error: Option<ScrapeError> = None;

        for attempt in 0..total {
            let is_final = attempt + 1 == total;

            if is_final && attempt > 0 && self.policy.escalate_to_visible && session.is_headless()
            {
                info!(source = %source, attempt, "Re-opening the browser in visible mode for the final attempt");
                if let Err(e) = session.open(false).await {
                    error!(source = %source, attempt, error = %e, "Visible browser could not be opened");
                    attempts.push(AttemptRecord {
                        attempt,
                        headless: false,
                        error: Some(e.to_string()),
                    });
                    return RetryOutcome {
                        result: SiteResult::failed(e.to_string()),
                        attempts,
                        aborted: Some(e),
                    };
                }
            }

            let headless = session.is_headless();
            debug!(source = %source, attempt, headless, "Starting attempt");

            match self.attempt(session, extractor, query).await {
                Ok(data) => {
                    info!(source = %source, attempt, headless, "Site scraped");
                    attempts.push(AttemptRecord {
                        attempt,
                        headless,
                        error: None,
                    });
                    return RetryOutcome {
                        result: SiteResult::ok(data),
                        attempts,
                        aborted: None,
                    };
                }
                Err(e) => {
                    warn!(source = %source, attempt, headless, error = %e, "Attempt failed");
                    attempts.push(AttemptRecord {
                        attempt,
                        headless,
                        error: Some(e.to_string()),
                    });
                    let retriable = e.is_retriable();
                    last_error = Some(e);
                    if !retriable {
                        debug!(source = %source, "Error is not retriable, giving up");
                        break;
                    }
                    if !is_final {
                        pacing::pause(self.policy.retry_delay, self.policy.jitter).await;
                    }
                }
            }
        }

        let error = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts were made".to_string());
        RetryOutcome {
            result: SiteResult::failed(error),
            attempts,
            aborted: None,
        }
    }

    /// One attempt on a fresh page. The page is closed on every path.
    async fn attempt<E>(
        &self,
        session: &mut dyn BrowserSession,
        extractor: &E,
        query: &LocationQuery,
    ) -> ScrapeResult<E::Output>
    where
        E: SiteExtractor + ?Sized,
    {
        let page = session.new_page().await?;
        let timeout = self.policy.attempt_timeout;

        let result = match tokio::time::timeout(timeout, extractor.scrape(page.as_ref(), query)).await
        {
            Ok(result) => result,
            Err(_) => Err(ScrapeError::Timeout {
                operation: format!("{} scrape", extractor.source()),
                timeout,
            }),
        };

        if let Err(e) = page.close().await {
            debug!("Page close failed: {}", e);
        }
        result
    }
}
