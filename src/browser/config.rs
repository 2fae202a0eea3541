//! Browser engine configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Chrome on Windows; the most common desktop fingerprint.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Browser engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BrowserEngineConfig {
    /// User agent presented on every page.
    pub user_agent: String,

    /// Fixed viewport.
    pub viewport: Viewport,

    /// Browser locale, also used for the `Accept-Language` header.
    pub locale: String,

    /// Default geolocation reported to pages.
    pub geolocation: Geolocation,

    /// Proxy server URL (e.g., "socks5://127.0.0.1:1080").
    pub proxy: Option<String>,

    /// Explicit Chrome executable; discovered from common paths when unset.
    pub chrome_executable: Option<PathBuf>,

    /// Additional Chrome arguments.
    pub chrome_args: Vec<String>,

    /// Remote Chrome DevTools URL (e.g., "ws://localhost:9222").
    /// If set, connects to existing browser instead of launching one.
    pub remote_url: Option<String>,
}

impl Default for BrowserEngineConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            viewport: Viewport::default(),
            locale: "en-US".to_string(),
            geolocation: Geolocation::default(),
            proxy: None,
            chrome_executable: None,
            chrome_args: Vec::new(),
            remote_url: None,
        }
    }
}

impl BrowserEngineConfig {
    /// Apply environment overrides.
    ///
    /// - `BROWSER_URL` - remote DevTools endpoint
    /// - `SOCKS_PROXY` - proxy server for browser traffic
    /// - `CHROME_PATH` - Chrome executable
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("BROWSER_URL") {
            if !url.trim().is_empty() {
                self.remote_url = Some(url.trim().to_string());
            }
        }
        if let Ok(proxy) = std::env::var("SOCKS_PROXY") {
            if !proxy.trim().is_empty() {
                self.proxy = Some(proxy.trim().to_string());
            }
        }
        if let Ok(path) = std::env::var("CHROME_PATH") {
            if !path.trim().is_empty() {
                self.chrome_executable = Some(PathBuf::from(path.trim()));
            }
        }
        self
    }

    /// Language list advertised by `navigator.languages`, derived from the locale.
    pub fn languages(&self) -> Vec<String> {
        let locale = self.locale.trim();
        if locale.is_empty() {
            return vec!["en-US".to_string(), "en".to_string()];
        }
        let mut langs = vec![locale.to_string()];
        if let Some((base, _)) = locale.split_once('-') {
            langs.push(base.to_string());
        }
        langs
    }

    /// `Accept-Language` header value matching [`Self::languages`].
    pub fn accept_language(&self) -> String {
        self.languages()
            .iter()
            .enumerate()
            .map(|(i, lang)| {
                if i == 0 {
                    lang.clone()
                } else {
                    format!("{};q=0.9", lang)
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1366,
            height: 768,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Geolocation {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
}

impl Default for Geolocation {
    // Charlotte, NC
    fn default() -> Self {
        Self {
            latitude: 35.2271,
            longitude: -80.8431,
            accuracy: 100.0,
        }
    }
}

/// Timeouts applied to every page a session creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTimeouts {
    /// Selector waits, clicks, script evaluation.
    pub operation: Duration,
    /// Page navigation.
    pub navigation: Duration,
}

impl Default for PageTimeouts {
    fn default() -> Self {
        Self {
            operation: Duration::from_secs(30),
            navigation: Duration::from_secs(60),
        }
    }
}
