//! Site extractors for locality signals.
//!
//! Each extractor owns one site's URL rules and an ordered cascade of
//! strategies (widget, table, text, graphical) run over a [`PageSnapshot`].
//! The first strategy that yields any value wins.

pub mod crime;
pub mod parse;
pub mod schools;
pub mod walkability;

pub use crime::CrimeExtractor;
pub use schools::SchoolExtractor;
pub use walkability::WalkabilityExtractor;

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::browser::{PageHandle, PageSnapshot};
use crate::error::{ScrapeError, ScrapeResult};
use crate::models::{ErrorSource, LocationQuery, StrategyKind};

/// One target site.
#[async_trait]
pub trait SiteExtractor: Send + Sync {
    type Output: Send;

    /// Tag used in logs and in the combined result's error list.
    fn source(&self) -> ErrorSource;

    /// Scrape the site for `query` using an already-prepared page.
    async fn scrape(
        &self,
        page: &dyn PageHandle,
        query: &LocationQuery,
    ) -> ScrapeResult<Self::Output>;
}

/// Values a strategy produced; empty means the strategy failed.
pub trait Extraction {
    fn is_empty(&self) -> bool;
}

impl<T> Extraction for Vec<T> {
    fn is_empty(&self) -> bool {
        Vec::is_empty(self)
    }
}

/// A pure strategy over a snapshot plus site-specific context.
pub type Strategy<C, T> = fn(&PageSnapshot, &C) -> T;

/// Run strategies in order, returning the first non-empty extraction.
pub fn run_cascade<C, T: Extraction>(
    site: ErrorSource,
    snapshot: &PageSnapshot,
    ctx: &C,
    cascade: &[(StrategyKind, Strategy<C, T>)],
) -> Option<(StrategyKind, T)> {
    for (kind, strategy) in cascade {
        let extracted = strategy(snapshot, ctx);
        if extracted.is_empty() {
            debug!(source = %site, strategy = %kind, url = %snapshot.url, "Strategy found nothing");
            continue;
        }
        info!(source = %site, strategy = %kind, url = %snapshot.url, "Strategy succeeded");
        return Some((*kind, extracted));
    }
    None
}

/// Navigate, clear consent overlays and capture the page.
///
/// Fails with [`ScrapeError::Blocked`] when the page is a bot wall.
pub async fn visit(page: &dyn PageHandle, url: &str) -> ScrapeResult<PageSnapshot> {
    debug!("Navigating to {}", url);
    page.goto(url).await?;
    dismiss_consent(page).await;
    capture(page).await
}

/// Capture the current page, checking for bot walls.
pub async fn capture(page: &dyn PageHandle) -> ScrapeResult<PageSnapshot> {
    let snapshot = PageSnapshot::capture(page).await?;
    if let Some(marker) = snapshot.blocked_marker() {
        return Err(ScrapeError::Blocked(format!(
            "{} ('{}' on page)",
            snapshot.url, marker
        )));
    }
    Ok(snapshot)
}

/// Clicks a consent "accept" control, then removes any remaining overlay
/// roots so they cannot intercept clicks or hide scores.
const DISMISS_CONSENT_SCRIPT: &str = r#"
(() => {
    const selectors = [
        '#onetrust-accept-btn-handler',
        '#truste-consent-button',
        'button[aria-label*="Accept"]',
        'button[id*="accept"]',
        'button[class*="accept"]',
        '.fc-cta-consent',
        '[data-testid="cookie-accept"]'
    ];
    let clicked = null;
    for (const sel of selectors) {
        const el = document.querySelector(sel);
        if (el) { el.click(); clicked = sel; break; }
    }
    if (!clicked) {
        const labels = ['accept', 'accept all', 'accept cookies', 'i agree', 'agree', 'allow all', 'got it', 'ok'];
        for (const b of document.querySelectorAll('button, a[role="button"]')) {
            const t = (b.innerText || '').trim().toLowerCase();
            if (labels.includes(t)) { b.click(); clicked = t; break; }
        }
    }
    document.querySelectorAll('#onetrust-consent-sdk, .fc-consent-root, #truste-consent-track, [class*="cookie-banner"], [id*="cookie-banner"], [class*="consent-overlay"]')
        .forEach(e => e.remove());
    if (document.body) { document.body.style.overflow = 'auto'; }
    return clicked;
})()
"#;

/// Best-effort consent dismissal; failures are logged, never raised.
pub async fn dismiss_consent(page: &dyn PageHandle) {
    match page.evaluate(DISMISS_CONSENT_SCRIPT).await {
        Ok(serde_json::Value::String(what)) => debug!("Dismissed consent overlay via {}", what),
        Ok(_) => {}
        Err(e) => debug!("Consent dismissal skipped: {}", e),
    }
}

const PRESENCE_POLL: Duration = Duration::from_millis(250);

/// First selector in `candidates` that appears within `timeout`.
///
/// All candidates share one deadline; each poll checks every candidate in
/// order without waiting on any of them.
pub async fn first_present(
    page: &dyn PageHandle,
    candidates: &[&'static str],
    timeout: Duration,
) -> Option<&'static str> {
    let deadline = Instant::now() + timeout;
    loop {
        for sel in candidates {
            if page.wait_for_selector(sel, Duration::ZERO).await.is_ok() {
                return Some(sel);
            }
        }
        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        tokio::time::sleep(PRESENCE_POLL.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Found(Vec<u8>);

    impl Extraction for Found {
        fn is_empty(&self) -> bool {
            self.0.is_empty()
        }
    }

    fn nothing(_: &PageSnapshot, _: &()) -> Found {
        Found::default()
    }

    fn from_text(snap: &PageSnapshot, _: &()) -> Found {
        Found(snap.text.bytes().take(1).collect())
    }

    fn never(_: &PageSnapshot, _: &()) -> Found {
        panic!("cascade should stop at the first success")
    }

    #[test]
    fn test_cascade_stops_at_first_success() {
        let snap = PageSnapshot::from_html("https://example.com", "<p>hello</p>");
        let cascade: &[(StrategyKind, Strategy<(), Found>)] = &[
            (StrategyKind::Widget, nothing),
            (StrategyKind::Table, nothing),
            (StrategyKind::Text, from_text),
            (StrategyKind::Graphical, never),
        ];
        let (kind, found) = run_cascade(ErrorSource::Crime, &snap, &(), cascade).unwrap();
        assert_eq!(kind, StrategyKind::Text);
        assert_eq!(found.0, vec![b'h']);
    }

    #[test]
    fn test_cascade_all_empty() {
        let snap = PageSnapshot::from_html("https://example.com", "<p></p>");
        let cascade: &[(StrategyKind, Strategy<(), Found>)] =
            &[(StrategyKind::Widget, nothing), (StrategyKind::Table, nothing)];
        assert!(run_cascade(ErrorSource::Crime, &snap, &(), cascade).is_none());
    }
}
