//! Scripted browser and extractors for integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use locality::browser::{BrowserSession, PageHandle, SessionFactory};
use locality::config::EnrichConfig;
use locality::error::{ScrapeError, ScrapeResult};
use locality::models::{
    CrimeData, ErrorSource, LocationQuery, SchoolData, StrategyKind, WalkabilityData,
};
use locality::scrapers::SiteExtractor;
use scraper::{Html, Selector};

pub const NOT_FOUND: &str =
    "<html><head><title>404</title></head><body><h1>Page not found</h1></body></html>";

pub fn fixture(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("{}: {}", path.display(), e))
}

pub fn hickory() -> LocationQuery {
    LocationQuery::new("2778 2nd St NE", Some("Hickory"), "NC", Some("28602")).unwrap()
}

/// Config with every pause and jitter zeroed.
pub fn fast_config() -> EnrichConfig {
    EnrichConfig {
        retry_delay_ms: 0,
        retry_jitter_ms: 0,
        request_delay_ms: 0,
        request_jitter_ms: 0,
        ..EnrichConfig::default()
    }
}

/// Pages served by URL, plus navigations triggered by clicks or Enter.
#[derive(Debug, Default, Clone)]
pub struct FakeWeb {
    pages: HashMap<String, String>,
    clicks: HashMap<String, String>,
    submit: Option<String>,
    unreachable: HashSet<String>,
    slow_waits: bool,
}

impl FakeWeb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, html: impl Into<String>) -> Self {
        self.pages.insert(url.to_string(), html.into());
        self
    }

    /// Clicking `selector` navigates to `url`.
    pub fn on_click(mut self, selector: &str, url: &str) -> Self {
        self.clicks.insert(selector.to_string(), url.to_string());
        self
    }

    /// Pressing Enter in any input navigates to `url`.
    pub fn on_submit(mut self, url: &str) -> Self {
        self.submit = Some(url.to_string());
        self
    }

    /// Navigating to `url` fails with a network error.
    pub fn unreachable(mut self, url: &str) -> Self {
        self.unreachable.insert(url.to_string());
        self
    }

    /// Selector waits that miss use up their whole timeout.
    pub fn slow_waits(mut self) -> Self {
        self.slow_waits = true;
        self
    }

    fn html(&self, url: &str) -> String {
        self.pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| NOT_FOUND.to_string())
    }
}

/// Everything the fake browser saw.
#[derive(Debug, Default)]
pub struct BrowserLog {
    /// Sessions handed out by the factory.
    pub sessions: AtomicUsize,
    /// Requested mode of every `open` call, `true` = headless.
    pub opens: Mutex<Vec<bool>>,
    pub closes: AtomicUsize,
    pub pages_opened: AtomicUsize,
    pub pages_closed: AtomicUsize,
    pub visited: Mutex<Vec<String>>,
    pub typed: Mutex<Vec<String>>,
}

impl BrowserLog {
    pub fn opens(&self) -> Vec<bool> {
        self.opens.lock().unwrap().clone()
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn pages_opened(&self) -> usize {
        self.pages_opened.load(Ordering::SeqCst)
    }

    pub fn pages_closed(&self) -> usize {
        self.pages_closed.load(Ordering::SeqCst)
    }
}

/// Which `open` calls fail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OpenFailure {
    #[default]
    Never,
    Always,
    /// Only visible-mode opens fail.
    Visible,
}

pub struct MockSession {
    web: Arc<FakeWeb>,
    log: Arc<BrowserLog>,
    failure: OpenFailure,
    open: bool,
    headless: bool,
}

impl MockSession {
    pub fn new(web: FakeWeb, log: Arc<BrowserLog>) -> Self {
        Self {
            web: Arc::new(web),
            log,
            failure: OpenFailure::Never,
            open: false,
            headless: true,
        }
    }

    pub fn failing(mut self, failure: OpenFailure) -> Self {
        self.failure = failure;
        self
    }
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn open(&mut self, headless: bool) -> ScrapeResult<()> {
        self.log.opens.lock().unwrap().push(headless);
        self.open = false;
        let fails = match self.failure {
            OpenFailure::Never => false,
            OpenFailure::Always => true,
            OpenFailure::Visible => !headless,
        };
        if fails {
            return Err(ScrapeError::LaunchFailure("no chrome in test".into()));
        }
        self.open = true;
        self.headless = headless;
        Ok(())
    }

    async fn new_page(&mut self) -> ScrapeResult<Box<dyn PageHandle>> {
        if !self.open {
            return Err(ScrapeError::browser("session is not open"));
        }
        self.log.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockPage {
            web: Arc::clone(&self.web),
            log: Arc::clone(&self.log),
            url: Mutex::new("about:blank".to_string()),
            closed: AtomicBool::new(false),
        }))
    }

    async fn close(&mut self) {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn is_headless(&self) -> bool {
        self.headless
    }
}

pub struct MockPage {
    web: Arc<FakeWeb>,
    log: Arc<BrowserLog>,
    url: Mutex<String>,
    closed: AtomicBool,
}

impl MockPage {
    fn navigate(&self, url: &str) {
        self.log.visited.lock().unwrap().push(url.to_string());
        *self.url.lock().unwrap() = url.to_string();
    }

    fn html(&self) -> String {
        self.web.html(&self.url.lock().unwrap())
    }

    fn require(&self, selector: &str) -> ScrapeResult<()> {
        if matches_selector(&self.html(), selector) {
            Ok(())
        } else {
            Err(ScrapeError::SelectorNotFound(selector.to_string()))
        }
    }
}

/// Unparsable selectors count as absent.
fn matches_selector(html: &str, selector: &str) -> bool {
    let Ok(sel) = Selector::parse(selector) else {
        return false;
    };
    Html::parse_document(html).select(&sel).next().is_some()
}

#[async_trait]
impl PageHandle for MockPage {
    async fn goto(&self, url: &str) -> ScrapeResult<()> {
        self.navigate(url);
        if self.web.unreachable.contains(url) {
            return Err(ScrapeError::browser(format!("net::ERR_CONNECTION_RESET at {}", url)));
        }
        Ok(())
    }

    async fn current_url(&self) -> ScrapeResult<String> {
        Ok(self.url.lock().unwrap().clone())
    }

    async fn content(&self) -> ScrapeResult<String> {
        Ok(self.html())
    }

    async fn evaluate(&self, _script: &str) -> ScrapeResult<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> ScrapeResult<()> {
        let found = self.require(selector);
        if found.is_err() && self.web.slow_waits {
            tokio::time::sleep(timeout).await;
        }
        found
    }

    async fn click(&self, selector: &str) -> ScrapeResult<()> {
        self.require(selector)?;
        if let Some(target) = self.web.clicks.get(selector) {
            self.navigate(target);
        }
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> ScrapeResult<()> {
        self.require(selector)?;
        self.log.typed.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn press_enter(&self, selector: &str) -> ScrapeResult<()> {
        self.require(selector)?;
        if let Some(target) = self.web.submit.clone() {
            self.navigate(&target);
        }
        Ok(())
    }

    async fn close(&self) -> ScrapeResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.log.pages_closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

pub struct MockFactory {
    web: FakeWeb,
    log: Arc<BrowserLog>,
    failure: OpenFailure,
}

impl MockFactory {
    pub fn new(web: FakeWeb) -> Self {
        Self {
            web,
            log: Arc::new(BrowserLog::default()),
            failure: OpenFailure::Never,
        }
    }

    pub fn failing(mut self, failure: OpenFailure) -> Self {
        self.failure = failure;
        self
    }

    pub fn log(&self) -> Arc<BrowserLog> {
        Arc::clone(&self.log)
    }
}

impl SessionFactory for MockFactory {
    fn create(&self) -> Box<dyn BrowserSession> {
        self.log.sessions.fetch_add(1, Ordering::SeqCst);
        Box::new(MockSession::new(self.web.clone(), Arc::clone(&self.log)).failing(self.failure))
    }
}

/// Extractor that replays a fixed list of outcomes, then keeps failing.
pub struct Scripted<T> {
    source: ErrorSource,
    script: Mutex<VecDeque<ScrapeResult<T>>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl<T> Scripted<T> {
    pub fn new(source: ErrorSource, script: Vec<ScrapeResult<T>>) -> Self {
        Self {
            source,
            script: Mutex::new(script.into()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(source: ErrorSource) -> Self {
        Self::new(source, Vec::new())
    }

    /// Sleep this long inside every call before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T: Send + Sync> SiteExtractor for Scripted<T> {
    type Output = T;

    fn source(&self) -> ErrorSource {
        self.source
    }

    async fn scrape(&self, page: &dyn PageHandle, _query: &LocationQuery) -> ScrapeResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        page.goto(&format!("https://scripted.test/{}", self.source))
            .await?;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Err(ScrapeError::parse_failure(format!(
                "{} found nothing",
                self.source
            )))
        })
    }
}

pub fn walk_score(score: u8) -> WalkabilityData {
    WalkabilityData {
        walk_score: Some(score),
        transit_score: None,
        bike_score: None,
        strategy: StrategyKind::Widget,
        source_url: "https://walk.test/score".to_string(),
        scraped_at: Utc::now(),
    }
}

pub fn crime_index(total: f64) -> CrimeData {
    CrimeData {
        violent_crime_index: None,
        property_crime_index: None,
        total_crime_index: Some(total),
        grade: None,
        strategy: StrategyKind::Table,
        source_url: "https://crime.test/crime".to_string(),
        scraped_at: Utc::now(),
    }
}

pub type NoSchools = Scripted<SchoolData>;
