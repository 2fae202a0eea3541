//! Point-in-time capture of a page that the strategy cascades run over.

use scraper::Html;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::PageHandle;
use crate::error::ScrapeResult;
use crate::scrapers::parse::{element_text, first_number, normalize_ws, selector, visible_text};

/// A progress bar or meter value normalized to 0-100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterReading {
    pub label: String,
    pub value: f64,
}

/// Rendered page state: DOM, visible text and meter readings.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSnapshot {
    pub url: String,
    pub html: String,
    pub text: String,
    pub meters: Vec<MeterReading>,
}

/// Collects bar widths as rendered, for meters that carry no attributes.
const METER_PROBE_SCRIPT: &str = r#"
(() => {
    const out = [];
    const bars = document.querySelectorAll('[class*="progress"] > *, [class*="meter"] > *, [class*="bar-fill"], [class*="score-bar"] > *');
    for (const el of bars) {
        const parent = el.parentElement;
        if (!parent) continue;
        const pw = parent.getBoundingClientRect().width;
        const w = el.getBoundingClientRect().width;
        if (!pw || !w) continue;
        const holder = parent.closest('[aria-label], [title], [data-label]') || parent.parentElement || parent;
        const label = holder.getAttribute('aria-label') || holder.getAttribute('title')
            || holder.getAttribute('data-label') || (holder.innerText || '').slice(0, 80);
        out.push({ label: label.trim(), value: Math.round((w / pw) * 1000) / 10 });
    }
    return out;
})()
"#;

const VISIBLE_TEXT_SCRIPT: &str = "document.body ? document.body.innerText : ''";

/// Visible-text markers of interstitials and bot walls.
const BLOCK_MARKERS: &[&str] = &[
    "attention required! | cloudflare",
    "verify you are human",
    "pardon our interruption",
    "request unsuccessful. incapsula",
    "please complete the security check",
    "are you a robot",
];

/// Phrases that also occur in ordinary articles; they only count in the
/// title or main heading, or on a page with little else on it.
const HEADLINE_MARKERS: &[&str] = &["access denied"];

/// Visible text shorter than this is treated as an interstitial.
const SHORT_PAGE_CHARS: usize = 600;

impl PageSnapshot {
    /// Snapshot built from HTML alone (saved fixtures, or when the live
    /// probes are unavailable).
    pub fn from_html(url: impl Into<String>, html: impl Into<String>) -> Self {
        let html = html.into();
        let text = visible_text(&html);
        let meters = meters_from_html(&html);
        Self {
            url: url.into(),
            html,
            text,
            meters,
        }
    }

    /// Capture the live page. Rendered text and bar widths are preferred;
    /// HTML-derived values fill in when the scripts return nothing.
    pub async fn capture(page: &dyn PageHandle) -> ScrapeResult<Self> {
        let url = page.current_url().await?;
        let html = page.content().await?;
        let mut snapshot = Self::from_html(url, html);

        match page.evaluate(VISIBLE_TEXT_SCRIPT).await {
            Ok(serde_json::Value::String(text)) if !text.trim().is_empty() => {
                snapshot.text = text;
            }
            Ok(_) => {}
            Err(e) => debug!("innerText probe failed, using DOM text: {}", e),
        }

        match page.evaluate(METER_PROBE_SCRIPT).await {
            Ok(value @ serde_json::Value::Array(_)) => {
                let probed: Vec<MeterReading> = serde_json::from_value(value).unwrap_or_default();
                snapshot.meters.extend(probed.into_iter().filter(|m| !m.label.is_empty()));
            }
            Ok(_) => {}
            Err(e) => debug!("Meter probe failed: {}", e),
        }

        Ok(snapshot)
    }

    pub fn document(&self) -> Html {
        Html::parse_document(&self.html)
    }

    /// Block/challenge marker present on the page, if any.
    pub fn blocked_marker(&self) -> Option<&'static str> {
        let lowered = self.text.to_lowercase();
        if let Some(marker) = BLOCK_MARKERS.iter().copied().find(|m| lowered.contains(m)) {
            return Some(marker);
        }

        let headline = if lowered.trim().chars().count() < SHORT_PAGE_CHARS {
            lowered
        } else {
            self.headings().to_lowercase()
        };
        HEADLINE_MARKERS
            .iter()
            .copied()
            .find(|m| headline.contains(m))
    }

    /// Title and `h1` text.
    fn headings(&self) -> String {
        let doc = self.document();
        let Some(sel) = selector("title, h1") else {
            return String::new();
        };
        doc.select(&sel)
            .map(|el| element_text(&el))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Meters declared in markup: ARIA progress bars, `<progress>`/`<meter>`,
/// `data-value` holders and inline `width: N%` fills.
pub fn meters_from_html(html: &str) -> Vec<MeterReading> {
    let doc = Html::parse_document(html);
    let Some(sel) = selector(
        "[role=progressbar], [role=meter], progress, meter, [aria-valuenow], [data-value], [style*=width]",
    ) else {
        return Vec::new();
    };

    let mut readings = Vec::new();
    for el in doc.select(&sel) {
        let attrs = el.value();
        let max = attrs
            .attr("aria-valuemax")
            .or_else(|| attrs.attr("max"))
            .and_then(first_number)
            .filter(|m| *m > 0.0)
            .unwrap_or(100.0);

        let raw = attrs
            .attr("aria-valuenow")
            .or_else(|| attrs.attr("data-value"))
            .or_else(|| {
                matches!(attrs.name(), "progress" | "meter")
                    .then(|| attrs.attr("value"))
                    .flatten()
            })
            .and_then(first_number)
            .map(|v| v * 100.0 / max)
            .or_else(|| attrs.attr("style").and_then(style_width_percent));

        let Some(value) = raw else { continue };

        let labelled_by = attrs.attr("aria-labelledby").and_then(|id| {
            selector(&format!("#{}", id))
                .and_then(|s| doc.select(&s).next())
                .map(|e| element_text(&e))
        });
        let label = attrs
            .attr("aria-label")
            .or_else(|| attrs.attr("title"))
            .or_else(|| attrs.attr("data-label"))
            .map(normalize_ws)
            .or(labelled_by)
            .or_else(|| {
                el.parent()
                    .and_then(scraper::ElementRef::wrap)
                    .map(|p| element_text(&p))
            })
            .unwrap_or_default();

        if label.is_empty() {
            continue;
        }
        readings.push(MeterReading {
            label: label.chars().take(120).collect(),
            value,
        });
    }
    readings
}

fn style_width_percent(style: &str) -> Option<f64> {
    style.split(';').find_map(|decl| {
        let (prop, value) = decl.split_once(':')?;
        if prop.trim().eq_ignore_ascii_case("width") && value.trim().ends_with('%') {
            first_number(value)
        } else {
            None
        }
    })
}
