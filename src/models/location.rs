//! Location query: the normalized address handed to the enrichment engine.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::states::is_known_state;
use crate::error::{ScrapeError, ScrapeResult};

fn state_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z]{2}$").expect("valid regex"))
}

fn zip_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{5}(-\d{4})?$").expect("valid regex"))
}

/// Subject property address.
///
/// Immutable once built. Queries arriving through deserialization are not
/// trusted: the orchestrator calls [`LocationQuery::validate`] before any
/// browser work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationQuery {
    #[serde(default)]
    street: String,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    state: String,
    #[serde(default, rename = "zipCode", alias = "zip")]
    zip: Option<String>,
}

impl LocationQuery {
    /// Build and validate a query. Blank optional parts become `None` and the
    /// state code is uppercased.
    pub fn new(
        street: impl Into<String>,
        city: Option<&str>,
        state: impl Into<String>,
        zip: Option<&str>,
    ) -> ScrapeResult<Self> {
        let query = Self {
            street: street.into().trim().to_string(),
            city: non_blank(city),
            state: state.into().trim().to_ascii_uppercase(),
            zip: non_blank(zip),
        };
        query.validate()?;
        Ok(query)
    }

    /// Check the query invariants: a known two-letter state, at least one of
    /// city or zip, and a well-formed zip when present.
    pub fn validate(&self) -> ScrapeResult<()> {
        let state = self.state.trim();
        if state.is_empty() {
            return Err(ScrapeError::validation("state is required"));
        }
        if !state_pattern().is_match(state) {
            return Err(ScrapeError::validation(format!(
                "state must be a two-letter code, got '{}'",
                state
            )));
        }
        if !is_known_state(state) {
            return Err(ScrapeError::validation(format!(
                "unknown state code '{}'",
                state
            )));
        }
        if self.city().is_none() && self.zip().is_none() {
            return Err(ScrapeError::validation(
                "at least one of city or zip code is required",
            ));
        }
        if let Some(zip) = self.zip() {
            if !zip_pattern().is_match(zip) {
                return Err(ScrapeError::validation(format!(
                    "zip code must be 5 digits (optionally +4), got '{}'",
                    zip
                )));
            }
        }
        Ok(())
    }

    pub fn street(&self) -> &str {
        &self.street
    }

    pub fn city(&self) -> Option<&str> {
        self.city.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }

    /// State code, uppercased.
    pub fn state(&self) -> String {
        self.state.trim().to_ascii_uppercase()
    }

    pub fn zip(&self) -> Option<&str> {
        self.zip.as_deref().map(str::trim).filter(|z| !z.is_empty())
    }

    /// Five-digit zip without the +4 suffix.
    pub fn zip5(&self) -> Option<&str> {
        self.zip().map(|z| z.split('-').next().unwrap_or(z))
    }

    /// Single-line address, e.g. `2778 2nd St NE, Hickory, NC 28602`.
    pub fn full_address(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if !self.street.trim().is_empty() {
            parts.push(self.street.trim().to_string());
        }
        if let Some(city) = self.city() {
            parts.push(city.to_string());
        }
        let mut tail = self.state();
        if let Some(zip) = self.zip5() {
            tail.push(' ');
            tail.push_str(zip);
        }
        parts.push(tail);
        parts.join(", ")
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
