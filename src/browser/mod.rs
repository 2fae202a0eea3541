//! Browser session management for scraping JS-heavy locality sites.
//!
//! The engine talks to the browser only through [`BrowserSession`] and
//! [`PageHandle`]. The chromiumoxide (CDP) implementation lives in
//! [`chromium`]; tests substitute scripted sessions.

mod config;
#[cfg(feature = "browser")]
mod chromium;
mod snapshot;
pub mod stealth;

pub use config::{BrowserEngineConfig, Geolocation, PageTimeouts, Viewport, DEFAULT_USER_AGENT};
#[cfg(feature = "browser")]
pub use chromium::{ChromiumPage, ChromiumSession, ChromiumSessionFactory};
pub use snapshot::{MeterReading, PageSnapshot};

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ScrapeResult;

/// One browser tab.
///
/// Every call is bounded by the session's timeouts; exceeding one returns a
/// recoverable [`crate::error::ScrapeError`], never a process abort.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Navigate and wait for the document to become interactive.
    async fn goto(&self, url: &str) -> ScrapeResult<()>;

    /// Current URL, after redirects.
    async fn current_url(&self) -> ScrapeResult<String>;

    /// Serialized DOM.
    async fn content(&self) -> ScrapeResult<String>;

    /// Evaluate a script and return its JSON value (`Null` for `undefined`).
    async fn evaluate(&self, script: &str) -> ScrapeResult<serde_json::Value>;

    /// Wait until `selector` matches an element.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> ScrapeResult<()>;

    async fn click(&self, selector: &str) -> ScrapeResult<()>;

    /// Focus `selector` and type `text` key by key.
    async fn type_text(&self, selector: &str, text: &str) -> ScrapeResult<()>;

    /// Press Enter inside `selector`.
    async fn press_enter(&self, selector: &str) -> ScrapeResult<()>;

    /// Close the tab. Closing twice is a no-op.
    async fn close(&self) -> ScrapeResult<()>;
}

/// One browser process plus one browsing context, owned by a single
/// orchestration run.
#[async_trait]
pub trait BrowserSession: Send {
    /// Launch (or connect). Re-opening an open session closes it first.
    async fn open(&mut self, headless: bool) -> ScrapeResult<()>;

    /// New page with the anti-detection init script already attached.
    async fn new_page(&mut self) -> ScrapeResult<Box<dyn PageHandle>>;

    /// Release context then browser. Safe to call repeatedly.
    async fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Mode of the currently open browser.
    fn is_headless(&self) -> bool;
}

/// Creates a fresh, unopened session for each orchestration run.
pub trait SessionFactory: Send + Sync {
    fn create(&self) -> Box<dyn BrowserSession>;
}
