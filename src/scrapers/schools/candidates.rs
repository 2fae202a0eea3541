//! Strategy cascade that turns a results page into school candidates.

use std::sync::OnceLock;

use regex::Regex;
use scraper::ElementRef;

use super::categorize::{categorize, parse_grade_range};
use crate::browser::PageSnapshot;
use crate::models::{SchoolInfo, SchoolLevel, StrategyKind};
use crate::scrapers::parse::{element_text, label_matches, selector, to_rating};
use crate::scrapers::Strategy;

/// One school row or card as read from the page.
#[derive(Debug, Clone, PartialEq)]
pub struct SchoolCandidate {
    pub name: String,
    pub rating: Option<u8>,
    /// Level tag shown with the result, if any.
    pub label: Option<String>,
    /// Text holding the grade range, if any.
    pub grades: Option<String>,
    /// Tagged by the site as serving the searched address.
    pub assigned: bool,
}

impl SchoolCandidate {
    pub fn level(&self) -> Option<SchoolLevel> {
        categorize(self.label.as_deref(), self.grades.as_deref(), &self.name)
    }
}

/// What the cascade should accept.
#[derive(Debug, Clone, Copy, Default)]
pub struct CandidateFilter {
    /// Keep only results tagged as assigned to the address.
    pub assigned_only: bool,
}

impl CandidateFilter {
    fn keep(&self, candidate: &SchoolCandidate) -> bool {
        !candidate.name.is_empty() && (!self.assigned_only || candidate.assigned)
    }

    fn apply(&self, candidates: Vec<SchoolCandidate>) -> Vec<SchoolCandidate> {
        candidates.into_iter().filter(|c| self.keep(c)).collect()
    }
}

/// Whole class tokens such as `assigned` or `school-card--assigned`;
/// `unassigned` and `not-assigned` do not count.
fn has_assigned_class(class: &str) -> bool {
    class.split_whitespace().any(|token| {
        let token = token.to_ascii_lowercase();
        let words: Vec<&str> = token.split(['-', '_']).filter(|w| !w.is_empty()).collect();
        words
            .iter()
            .enumerate()
            .any(|(i, w)| *w == "assigned" && (i == 0 || !matches!(words[i - 1], "not" | "non")))
    })
}

fn is_assigned(text: &str) -> bool {
    label_matches(text, &["assigned"]) && !label_matches(text, &["not assigned", "unassigned"])
}

fn rating_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(10|[1-9])\s*(?:/\s*10|out\s+of\s+10)\b").expect("valid regex")
    })
}

/// A 1-10 rating in text like `"7/10"`, `"7 out of 10"` or a bare `"7"`.
pub fn parse_rating(text: &str) -> Option<u8> {
    if let Some(cap) = rating_pattern().captures(text) {
        return cap.get(1).and_then(|m| m.as_str().parse().ok());
    }
    let trimmed = text.trim();
    if trimmed.len() <= 2 {
        return trimmed.parse::<f64>().ok().and_then(to_rating);
    }
    None
}

const CARD_SELECTOR: &str = "[class*=school-card], [class*=SchoolCard], [data-testid*=school-card], \
     li[class*=school], [class*=school-list-item], [class*=search-result]";
const NAME_SELECTOR: &str = "[class*=school-name], [class*=name] a, a[class*=name], h2, h3, h4, a[href*='/school']";
const RATING_SELECTOR: &str = "[class*=rating], [data-rating], [aria-label*=rating], [aria-label*=Rating], [aria-label*='out of 10']";
const LEVEL_SELECTOR: &str = "[class*=school-type], [class*=level], [data-level]";
const GRADES_SELECTOR: &str = "[class*=grades], [class*=grade-range], [data-grades]";

fn card_rating(card: &ElementRef<'_>) -> Option<u8> {
    let sel = selector(RATING_SELECTOR)?;
    card.select(&sel).find_map(|el| {
        let attrs = el.value();
        attrs
            .attr("data-rating")
            .and_then(parse_rating)
            .or_else(|| attrs.attr("aria-label").and_then(parse_rating))
            .or_else(|| parse_rating(&element_text(&el)))
    })
}

fn first_text(card: &ElementRef<'_>, css: &str) -> Option<String> {
    let sel = selector(css)?;
    card.select(&sel)
        .map(|el| element_text(&el))
        .find(|t| !t.is_empty())
}

/// Result cards: one element per school with name, rating badge and tags.
fn card_strategy(snapshot: &PageSnapshot, filter: &CandidateFilter) -> Vec<SchoolCandidate> {
    let doc = snapshot.document();
    let Some(cards) = selector(CARD_SELECTOR) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for card in doc.select(&cards) {
        let Some(name) = first_text(&card, NAME_SELECTOR) else {
            continue;
        };
        let text = element_text(&card);
        let class = card.value().attr("class").unwrap_or_default();
        out.push(SchoolCandidate {
            name,
            rating: card_rating(&card),
            label: first_text(&card, LEVEL_SELECTOR),
            grades: first_text(&card, GRADES_SELECTOR)
                .or_else(|| parse_grade_range(&text).map(|_| text.clone())),
            assigned: has_assigned_class(class) || is_assigned(&text),
        });
    }
    filter.apply(out)
}

/// Result tables: name cell, rating cell and grades cell in any order.
fn table_strategy(snapshot: &PageSnapshot, filter: &CandidateFilter) -> Vec<SchoolCandidate> {
    let doc = snapshot.document();
    let (Some(rows), Some(cells), Some(links)) = (selector("tr"), selector("td, th"), selector("a"))
    else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for row in doc.select(&rows) {
        let texts: Vec<String> = row.select(&cells).map(|c| element_text(&c)).collect();
        if texts.len() < 2 {
            continue;
        }
        let name = row
            .select(&links)
            .map(|a| element_text(&a))
            .find(|t| !t.is_empty())
            .or_else(|| {
                texts
                    .iter()
                    .find(|t| t.chars().any(char::is_alphabetic) && parse_grade_range(t).is_none())
                    .cloned()
            });
        let Some(name) = name else { continue };
        let rating = texts
            .iter()
            .filter(|t| **t != name)
            .find_map(|t| parse_rating(t));
        let grades = texts.iter().find(|t| parse_grade_range(t).is_some()).cloned();
        if rating.is_none() && grades.is_none() {
            continue;
        }
        let row_text = texts.join(" ");
        out.push(SchoolCandidate {
            name,
            rating,
            label: None,
            grades,
            assigned: is_assigned(&row_text),
        });
    }
    filter.apply(out)
}

fn text_line_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(?P<name>[A-Z0-9][\w .'&-]*?(?:Elementary|Middle|High|Intermediate|Primary|Academy|School)[\w .'&-]*?)\s*(?:[:(\-–]\s*)?(?:rating\s*)?(?P<rating>10|[1-9])\s*(?:/\s*10|out\s+of\s+10)",
        )
        .expect("valid regex")
    })
}

/// Lines like `"Hickory High School: 6/10"`. The line before counts as the
/// tag line for "assigned" markers.
fn text_strategy(snapshot: &PageSnapshot, filter: &CandidateFilter) -> Vec<SchoolCandidate> {
    let lines: Vec<&str> = snapshot.text.lines().map(str::trim).collect();
    let mut out = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        let Some(cap) = text_line_pattern().captures(line) else {
            continue;
        };
        let (Some(name), Some(rating)) = (cap.name("name"), cap.name("rating")) else {
            continue;
        };
        let previous = idx.checked_sub(1).map(|i| lines[i]).unwrap_or_default();
        out.push(SchoolCandidate {
            name: name.as_str().trim().to_string(),
            rating: rating.as_str().parse().ok(),
            label: None,
            grades: parse_grade_range(line).map(|_| line.to_string()),
            assigned: is_assigned(line) || is_assigned(previous),
        });
    }
    filter.apply(out)
}

const SCHOOL_WORDS: &[&str] = &["elementary", "middle", "high", "school", "academy", "intermediate"];

/// Rating meters labelled with a school name; 0-100 maps onto 1-10.
fn graphical_strategy(snapshot: &PageSnapshot, filter: &CandidateFilter) -> Vec<SchoolCandidate> {
    let out = snapshot
        .meters
        .iter()
        .filter(|m| label_matches(&m.label, SCHOOL_WORDS))
        .map(|m| {
            let value = if m.value > 10.0 { m.value / 10.0 } else { m.value };
            SchoolCandidate {
                name: m.label.clone(),
                rating: to_rating(value),
                label: None,
                grades: None,
                assigned: is_assigned(&m.label),
            }
        })
        .collect();
    filter.apply(out)
}

pub(super) const CASCADE: &[(StrategyKind, Strategy<CandidateFilter, Vec<SchoolCandidate>>)] = &[
    (StrategyKind::Widget, card_strategy),
    (StrategyKind::Table, table_strategy),
    (StrategyKind::Text, text_strategy),
    (StrategyKind::Graphical, graphical_strategy),
];

/// Schools picked per level: the first categorized candidate, preferring
/// one that carries a rating.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelPicks {
    pub elementary: Option<SchoolInfo>,
    pub middle: Option<SchoolInfo>,
    pub high: Option<SchoolInfo>,
}

impl LevelPicks {
    pub fn is_empty(&self) -> bool {
        self.elementary.is_none() && self.middle.is_none() && self.high.is_none()
    }
}

pub fn pick_levels(candidates: &[SchoolCandidate]) -> LevelPicks {
    let pick = |level: SchoolLevel| {
        let mut matching = candidates.iter().filter(|c| c.level() == Some(level));
        let first = matching.clone().next()?;
        let best = matching.find(|c| c.rating.is_some()).unwrap_or(first);
        Some(SchoolInfo {
            name: best.name.clone(),
            rating: best.rating,
        })
    };
    LevelPicks {
        elementary: pick(SchoolLevel::Elementary),
        middle: pick(SchoolLevel::Middle),
        high: pick(SchoolLevel::High),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::run_cascade;
    use crate::models::ErrorSource;

    const CARDS: &str = r#"
        <ul>
          <li class="school-card assigned">
            <span class="assigned-tag">Assigned school</span>
            <a class="name" href="/nc/hickory/1-Jenkins">Jenkins Elementary</a>
            <div class="circle-rating" aria-label="8 out of 10">8/10</div>
            <span class="grades">K-5</span>
          </li>
          <li class="school-card">
            <a class="name" href="/nc/hickory/2-Oakwood">Oakwood Elementary</a>
            <div class="rating">9/10</div>
            <span class="grades">K-5</span>
          </li>
          <li class="school-card">
            <span>Assigned school</span>
            <a class="name" href="/nc/hickory/3-Northview">Northview Middle</a>
            <div class="rating">4/10</div>
          </li>
          <li class="school-card">
            <span>Assigned school</span>
            <a class="name" href="/nc/hickory/4-Hickory">Hickory High</a>
            <div class="rating">6/10</div>
            <span class="grades">9-12</span>
          </li>
        </ul>"#;

    #[test]
    fn assigned_class_tokens() {
        assert!(has_assigned_class("school-card assigned"));
        assert!(has_assigned_class("school-card--assigned"));
        assert!(has_assigned_class("Assigned_School"));
        assert!(!has_assigned_class("school-card unassigned"));
        assert!(!has_assigned_class("school-card not-assigned"));
        assert!(!has_assigned_class("school-card"));
    }

    #[test]
    fn unassigned_cards_are_filtered_out() {
        let html = r#"
            <li class="school-card unassigned">
              <a class="name" href="/nc/hickory/5-Longview">Longview Elementary</a>
              <div class="rating">7/10</div>
            </li>"#;
        let snap = PageSnapshot::from_html("https://s.example/results", html);
        let filter = CandidateFilter {
            assigned_only: true,
        };
        assert!(card_strategy(&snap, &filter).is_empty());
    }

    #[test]
    fn parse_rating_formats() {
        assert_eq!(parse_rating("7/10"), Some(7));
        assert_eq!(parse_rating("Rating 10 out of 10"), Some(10));
        assert_eq!(parse_rating(" 6 "), Some(6));
        assert_eq!(parse_rating("612 students"), None);
        assert_eq!(parse_rating("0"), None);
    }

    #[test]
    fn cards_keep_assigned_only() {
        let snap = PageSnapshot::from_html("https://s.example/search", CARDS);
        let filter = CandidateFilter { assigned_only: true };
        let (kind, found) =
            run_cascade(ErrorSource::Schools, &snap, &filter, CASCADE).unwrap();
        assert_eq!(kind, StrategyKind::Widget);
        let names: Vec<&str> = found.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Jenkins Elementary", "Northview Middle", "Hickory High"]);

        let picks = pick_levels(&found);
        assert_eq!(picks.elementary.unwrap().rating, Some(8));
        assert_eq!(picks.middle.unwrap().rating, Some(4));
        assert_eq!(picks.high.unwrap().name, "Hickory High");
    }

    #[test]
    fn cards_without_filter_keep_everything() {
        let snap = PageSnapshot::from_html("https://s.example/listing", CARDS);
        let found = card_strategy(&snap, &CandidateFilter::default());
        assert_eq!(found.len(), 4);
        assert!(!found[1].assigned);
    }

    #[test]
    fn table_rows() {
        let html = r#"<table>
            <tr><th>School</th><th>Rating</th><th>Grades</th></tr>
            <tr><td><a href="/x">Jenkins Elementary</a></td><td>8/10</td><td>K-5</td></tr>
            <tr><td>Grandview Junior High</td><td>5</td><td>7-9</td></tr>
            <tr><td><a href="/z">Hickory High</a></td><td>6/10</td><td>9-12</td></tr>
        </table>"#;
        let snap = PageSnapshot::from_html("https://s.example/t", html);
        let found = table_strategy(&snap, &CandidateFilter::default());
        assert_eq!(found.len(), 3);
        let picks = pick_levels(&found);
        assert_eq!(picks.elementary.unwrap().rating, Some(8));
        assert_eq!(picks.middle.unwrap().name, "Grandview Junior High");
        assert_eq!(picks.high.unwrap().rating, Some(6));
    }

    #[test]
    fn text_lines() {
        let html = "<p>Assigned</p><p>Jenkins Elementary: 8/10</p><p>Hickory High School 6 out of 10</p>";
        let snap = PageSnapshot::from_html("https://s.example/t", html);
        let all = text_strategy(&snap, &CandidateFilter::default());
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].name, "Hickory High School");
        assert_eq!(all[1].rating, Some(6));

        let assigned = text_strategy(&snap, &CandidateFilter { assigned_only: true });
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].name, "Jenkins Elementary");
    }

    #[test]
    fn graphical_meters() {
        let html = r#"<div role="meter" aria-label="Hickory High School" aria-valuenow="60"></div>"#;
        let snap = PageSnapshot::from_html("https://s.example/t", html);
        let found = graphical_strategy(&snap, &CandidateFilter::default());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].rating, Some(6));
    }

    #[test]
    fn prefers_rated_candidate() {
        let candidates = vec![
            SchoolCandidate {
                name: "Oakwood Elementary".into(),
                rating: None,
                label: None,
                grades: None,
                assigned: false,
            },
            SchoolCandidate {
                name: "Jenkins Elementary".into(),
                rating: Some(8),
                label: None,
                grades: None,
                assigned: false,
            },
        ];
        let picks = pick_levels(&candidates);
        assert_eq!(picks.elementary.unwrap().name, "Jenkins Elementary");
        assert!(picks.middle.is_none());
    }
}
