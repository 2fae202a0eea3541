//! Shared HTML and number parsing helpers for the strategy cascades.
//!
//! Everything here is pure: it works on HTML strings and plain text so the
//! cascades can be exercised against saved fixtures.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// How a raw numeric string should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    Plain,
    /// Divide by 100 (`"45%"` -> `0.45`).
    Percent,
}

fn number_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("valid regex"))
}

fn pair_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([A-Za-z][A-Za-z .'()-]*?)\s*[:=]?\s*\$?(-?\d[\d,]*(?:\.\d+)?)\s*%?")
            .expect("valid regex")
    })
}

/// Parse the first number in `raw` after stripping `$`, `,` and `%`.
pub fn sanitize_number(raw: &str, kind: NumberKind) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '%'))
        .collect();
    let value: f64 = number_pattern().find(&cleaned)?.as_str().parse().ok()?;
    match kind {
        NumberKind::Plain => Some(value),
        NumberKind::Percent => Some(value / 100.0),
    }
}

/// First plain number in `raw`.
pub fn first_number(raw: &str) -> Option<f64> {
    sanitize_number(raw, NumberKind::Plain)
}

/// Clamp a parsed value into a 0-100 score.
pub fn to_score(value: f64) -> Option<u8> {
    if !(0.0..=100.0).contains(&value) {
        return None;
    }
    // Range checked above.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Some(value.round() as u8)
}

/// Clamp a parsed value into a 1-10 rating.
pub fn to_rating(value: f64) -> Option<u8> {
    if !(1.0..=10.0).contains(&value) {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Some(value.round() as u8)
}

/// Collapse whitespace runs to single spaces.
pub fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercased, alphanumeric-only form used for fuzzy label matching.
pub fn normalize_label(text: &str) -> String {
    let lowered: String = text
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    normalize_ws(&lowered)
}

/// Substring match of any pattern against the normalized label.
pub fn label_matches(label: &str, patterns: &[&str]) -> bool {
    let label = normalize_label(label);
    if label.is_empty() {
        return false;
    }
    patterns
        .iter()
        .any(|p| label.contains(&normalize_label(p)))
}

/// Normalized text content of an element.
pub fn element_text(el: &ElementRef<'_>) -> String {
    normalize_ws(&el.text().collect::<String>())
}

pub fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template", "head", "svg"];

/// Visible text of a document, one text node per line.
pub fn visible_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut lines: Vec<String> = Vec::new();
    for node in doc.tree.nodes() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| HIDDEN_TAGS.contains(&e.name()))
        });
        if hidden {
            continue;
        }
        let line = normalize_ws(text);
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines.join("\n")
}

/// Name/number pairs inside a chart label such as
/// `"Violent crime: Hickory 38.3, North Carolina 21.9, United States 22.7"`.
pub fn label_pairs(text: &str) -> Vec<(String, f64)> {
    pair_pattern()
        .captures_iter(text)
        .filter_map(|cap| {
            let name = normalize_ws(cap.get(1)?.as_str())
                .trim_matches(|c: char| c == ',' || c == '-' || c.is_whitespace())
                .to_string();
            let value = first_number(cap.get(2)?.as_str())?;
            Some((name, value))
        })
        .collect()
}

/// A metric a table or meter scan is looking for.
#[derive(Debug, Clone, Copy)]
pub struct MetricSpec {
    pub key: &'static str,
    /// Label fragments matched fuzzily against the label cell.
    pub labels: &'static [&'static str],
    /// Label fragments that disqualify a row (e.g. "national").
    pub exclude: &'static [&'static str],
    pub kind: NumberKind,
}

impl MetricSpec {
    pub fn matches(&self, label: &str) -> bool {
        label_matches(label, self.labels) && !label_matches(label, self.exclude)
    }
}

/// Scan table rows and definition lists for `label | value` pairs.
///
/// The label is matched fuzzily; the value is the first numeric cell after
/// it. The first match per metric wins.
pub fn scan_label_rows(html: &str, specs: &[MetricSpec]) -> HashMap<&'static str, f64> {
    let doc = Html::parse_document(html);
    let mut found: HashMap<&'static str, f64> = HashMap::new();

    if let (Some(rows), Some(cells)) = (selector("tr"), selector("th, td")) {
        for row in doc.select(&rows) {
            let texts: Vec<String> = row.select(&cells).map(|c| element_text(&c)).collect();
            record_row(&texts, specs, &mut found);
        }
    }

    if let (Some(lists), Some(terms)) = (selector("dl"), selector("dt, dd")) {
        for list in doc.select(&lists) {
            let texts: Vec<String> = list.select(&terms).map(|c| element_text(&c)).collect();
            for pair in texts.chunks(2) {
                record_row(pair, specs, &mut found);
            }
        }
    }

    found
}

fn record_row(cells: &[String], specs: &[MetricSpec], found: &mut HashMap<&'static str, f64>) {
    for spec in specs {
        if found.contains_key(spec.key) {
            continue;
        }
        let Some(label_idx) = cells.iter().position(|c| spec.matches(c)) else {
            continue;
        };
        let value = cells[label_idx + 1..]
            .iter()
            .find_map(|c| sanitize_number(c, spec.kind));
        if let Some(value) = value {
            found.insert(spec.key, value);
        }
    }
}

/// Attribute values that sites use as accessible labels for widgets.
pub fn accessible_labels(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let Some(sel) = selector("[aria-label], [alt], [title], [data-label], [data-tooltip]") else {
        return Vec::new();
    };
    let mut labels = Vec::new();
    for el in doc.select(&sel) {
        for attr in ["aria-label", "alt", "title", "data-label", "data-tooltip"] {
            if let Some(value) = el.value().attr(attr) {
                let value = normalize_ws(value);
                if !value.is_empty() {
                    labels.push(value);
                }
            }
        }
    }
    labels
}
