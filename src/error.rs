//! Error taxonomy for the enrichment engine.

use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the scraping engine.
pub type ScrapeResult<T> = Result<T, ScrapeError>;

/// Errors raised while enriching a location.
///
/// Only [`ScrapeError::Validation`] and [`ScrapeError::LaunchFailure`] abort an
/// orchestration run. Everything else is recoverable: the retry layer consumes
/// it and, once attempts are exhausted, downgrades it to a failed site result.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScrapeError {
    #[error("Invalid location query: {0}")]
    Validation(String),

    #[error("Browser launch failed: {0}")]
    LaunchFailure(String),

    #[error("Navigation to {url} timed out after {timeout:?}")]
    NavigationTimeout { url: String, timeout: Duration },

    #[error("{operation} timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    #[error("Selector not found: {0}")]
    SelectorNotFound(String),

    #[error("No data extracted: {0}")]
    ParseFailure(String),

    #[error("Access blocked by {0}")]
    Blocked(String),

    #[error("Browser error: {0}")]
    Browser(String),
}

impl ScrapeError {
    /// Whether this error aborts the whole orchestration run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScrapeError::Validation(_) | ScrapeError::LaunchFailure(_))
    }

    /// Whether another attempt could plausibly succeed.
    ///
    /// Validation failures are deterministic; a launch failure inside an
    /// attempt (visible-mode escalation) is handled by the orchestrator.
    pub fn is_retriable(&self) -> bool {
        !self.is_fatal()
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ScrapeError::Validation(msg.into())
    }

    pub fn parse_failure(msg: impl Into<String>) -> Self {
        ScrapeError::ParseFailure(msg.into())
    }

    pub fn browser(err: impl std::fmt::Display) -> Self {
        ScrapeError::Browser(err.to_string())
    }
}
