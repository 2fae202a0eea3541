//! Locality enrichment: crime indices, school ratings and walkability scores
//! for a property address, scraped from public sites with a stealth browser.
//!
//! [`orchestrator::ScraperOrchestrator`] is the entry point. It runs each site
//! through [`retry::RetryingOperation`] on one [`browser::BrowserSession`] and
//! returns a [`models::CombinedEnrichmentResult`] that is always complete,
//! whatever failed along the way.

pub mod aggregate;
pub mod browser;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod pacing;
pub mod retry;
pub mod scrapers;
pub mod sink;

pub use config::EnrichConfig;
pub use error::{ScrapeError, ScrapeResult};
pub use models::{CombinedEnrichmentResult, LocationQuery};
pub use orchestrator::ScraperOrchestrator;
