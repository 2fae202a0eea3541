//! Configuration for the enrichment engine.
//!
//! Values come from defaults, then a TOML file, then environment variables.
//! The file is the one passed explicitly or, failing that, the `locality`
//! config discovered in the standard locations. Keys are camelCase; the short names (`timeout`,
//! `navigationTimeout`, `retryDelay`, `requestDelay`) are accepted as aliases.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::aggregate::RatingPolicy;
use crate::browser::{BrowserEngineConfig, PageTimeouts};
use crate::retry::RetryPolicy;
use crate::scrapers::crime::DEFAULT_CRIME_BASE_URL;
use crate::scrapers::schools::DEFAULT_SCHOOLS_BASE_URL;
use crate::scrapers::walkability::DEFAULT_WALKABILITY_BASE_URL;

/// Base URLs of the three target sites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SiteUrls {
    pub crime: String,
    pub schools: String,
    pub walkability: String,
}

impl Default for SiteUrls {
    fn default() -> Self {
        Self {
            crime: DEFAULT_CRIME_BASE_URL.to_string(),
            schools: DEFAULT_SCHOOLS_BASE_URL.to_string(),
            walkability: DEFAULT_WALKABILITY_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EnrichConfig {
    /// Start the browser headless. The final retry may still go visible.
    pub headless: bool,

    /// Per-operation timeout.
    #[serde(alias = "timeout")]
    pub timeout_ms: u64,

    #[serde(alias = "navigationTimeout")]
    pub navigation_timeout_ms: u64,

    /// Retries after the first attempt, per site.
    pub retry_attempts: u32,

    #[serde(alias = "retryDelay")]
    pub retry_delay_ms: u64,

    pub retry_jitter_ms: u64,

    /// Base pause between sites.
    #[serde(alias = "requestDelay")]
    pub request_delay_ms: u64,

    pub request_jitter_ms: u64,

    /// Budget for one site attempt, navigation and extraction included.
    pub attempt_timeout_ms: u64,

    /// Re-open the browser visibly for each site's final attempt.
    pub escalate_to_visible: bool,

    pub rating_policy: RatingPolicy,

    pub sites: SiteUrls,

    pub browser: BrowserEngineConfig,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            headless: true,
            timeout_ms: 30_000,
            navigation_timeout_ms: 60_000,
            retry_attempts: 2,
            retry_delay_ms: 2_000,
            retry_jitter_ms: 1_000,
            request_delay_ms: 1_500,
            request_jitter_ms: 1_000,
            attempt_timeout_ms: 120_000,
            escalate_to_visible: true,
            rating_policy: RatingPolicy::default(),
            sites: SiteUrls::default(),
            browser: BrowserEngineConfig::default(),
        }
    }
}

impl EnrichConfig {
    /// Defaults, overlaid by `path` (or a discovered config file), then by
    /// the environment. An explicit path that cannot be read is an error.
    pub async fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => Self::load_from_path(path).await?,
            None => match Self::discover().await {
                Some(found) => match Self::load_from_path(&found).await {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!("Ignoring config file {}: {:#}", found.display(), e);
                        Self::default()
                    }
                },
                None => Self::default(),
            },
        };
        Ok(config.with_env_overrides())
    }

    /// Path of the `locality` config file in the standard locations, if any.
    pub async fn discover() -> Option<PathBuf> {
        let found = prefer::load("locality").await.ok()?;
        let path = found.source_path()?.to_path_buf();
        tracing::debug!("Discovered config file {}", path.display());
        Some(path)
    }

    pub async fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Apply environment overrides.
    ///
    /// - `LOCALITY_HEADLESS` - `true`/`false`/`1`/`0`
    /// - `LOCALITY_TIMEOUT_MS`, `LOCALITY_NAVIGATION_TIMEOUT_MS`
    /// - `LOCALITY_RETRY_ATTEMPTS`, `LOCALITY_RETRY_DELAY_MS`
    /// - `LOCALITY_REQUEST_DELAY_MS`
    /// - browser overrides (`BROWSER_URL`, `SOCKS_PROXY`, `CHROME_PATH`)
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("LOCALITY_HEADLESS") {
            match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.headless = true,
                "0" | "false" | "no" => self.headless = false,
                other => tracing::warn!("Ignoring LOCALITY_HEADLESS={}", other),
            }
        }
        if let Some(v) = get("LOCALITY_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.timeout_ms = v;
        }
        if let Some(v) = get("LOCALITY_NAVIGATION_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.navigation_timeout_ms = v;
        }
        if let Some(v) = get("LOCALITY_RETRY_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.retry_attempts = v;
        }
        if let Some(v) = get("LOCALITY_RETRY_DELAY_MS").and_then(|v| v.parse().ok()) {
            self.retry_delay_ms = v;
        }
        if let Some(v) = get("LOCALITY_REQUEST_DELAY_MS").and_then(|v| v.parse().ok()) {
            self.request_delay_ms = v;
        }

        self.browser = self.browser.with_env_overrides();
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry_attempts,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            jitter: Duration::from_millis(self.retry_jitter_ms),
            attempt_timeout: Duration::from_millis(self.attempt_timeout_ms),
            escalate_to_visible: self.escalate_to_visible,
        }
    }

    pub fn page_timeouts(&self) -> PageTimeouts {
        PageTimeouts {
            operation: Duration::from_millis(self.timeout_ms),
            navigation: Duration::from_millis(self.navigation_timeout_ms),
        }
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn request_jitter(&self) -> Duration {
        Duration::from_millis(self.request_jitter_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::models::SchoolLevel;

    #[test]
    fn defaults_match_documented_values() {
        let config = EnrichConfig::default();
        assert!(config.headless);
        assert_eq!(config.timeout_ms, 30_000);
        assert_eq!(config.navigation_timeout_ms, 60_000);
        assert_eq!(config.retry_attempts, 2);
        assert_eq!(config.retry_delay_ms, 2_000);
        assert_eq!(config.request_delay_ms, 1_500);
        assert_eq!(config.retry_policy().total_attempts(), 3);
    }

    #[test]
    fn toml_with_aliases() {
        let raw = r#"
            headless = false
            timeout = 45000
            navigationTimeout = 90000
            retryDelay = 500
            requestDelayMs = 0

            [ratingPolicy]
            primary = ["elementary", "middle", "high"]
            fallback = []

            [sites]
            crime = "http://127.0.0.1:8080"

            [browser]
            locale = "en-GB"
            viewport = { width = 1280, height = 800 }
        "#;
        let config = EnrichConfig::from_toml_str(raw).unwrap();
        assert!(!config.headless);
        assert_eq!(config.timeout_ms, 45_000);
        assert_eq!(config.navigation_timeout_ms, 90_000);
        assert_eq!(config.retry_delay_ms, 500);
        assert_eq!(config.request_delay_ms, 0);
        assert_eq!(config.retry_attempts, 2);
        assert_eq!(config.rating_policy.primary.len(), 3);
        assert!(config.rating_policy.primary.contains(&SchoolLevel::Middle));
        assert_eq!(config.sites.crime, "http://127.0.0.1:8080");
        assert_eq!(config.sites.schools, DEFAULT_SCHOOLS_BASE_URL);
        assert_eq!(config.browser.locale, "en-GB");
        assert_eq!(config.browser.viewport.width, 1280);
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> = [
            ("LOCALITY_HEADLESS", "false"),
            ("LOCALITY_RETRY_ATTEMPTS", "4"),
            ("LOCALITY_TIMEOUT_MS", "not-a-number"),
            ("LOCALITY_REQUEST_DELAY_MS", " 250 "),
        ]
        .into_iter()
        .collect();
        let config = EnrichConfig::default()
            .with_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert!(!config.headless);
        assert_eq!(config.retry_attempts, 4);
        assert_eq!(config.timeout_ms, 30_000);
        assert_eq!(config.request_delay_ms, 250);
    }

    #[test]
    fn toml_round_trip_keeps_values() {
        let mut config = EnrichConfig::default();
        config.request_delay_ms = 10;
        let raw = config.to_toml().unwrap();
        assert!(raw.contains("requestDelayMs = 10"));
        assert_eq!(EnrichConfig::from_toml_str(&raw).unwrap(), config);
    }

    #[tokio::test]
    async fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locality.toml");
        std::fs::write(&path, "retryAttempts = 1\n").unwrap();
        let config = EnrichConfig::load(Some(&path)).await.unwrap();
        assert_eq!(config.retry_attempts, 1);

        let missing = dir.path().join("missing.toml");
        assert!(EnrichConfig::load(Some(&missing)).await.is_err());
    }

    #[tokio::test]
    async fn invalid_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locality.toml");
        std::fs::write(&path, "retryAttempts = \"many\"\n").unwrap();
        let err = EnrichConfig::load_from_path(&path).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid config file"));
    }

    #[tokio::test]
    async fn load_without_path_never_fails() {
        // Whatever discovery finds, an unreadable file falls back to defaults.
        assert!(EnrichConfig::load(None).await.is_ok());
    }
}
