//! Sorting school results into elementary, middle and high.
//!
//! Explicit level labels win, then the grade range, then the school name.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::SchoolLevel;
use crate::scrapers::parse::normalize_label;

fn grade_range_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(PK|TK|K|\d{1,2})(?:st|nd|rd|th)?\s*(?:-|–|—|to|through)\s*(PK|TK|K|\d{1,2})(?:st|nd|rd|th)?\b")
            .expect("valid regex")
    })
}

fn grade_value(token: &str) -> Option<i8> {
    match token.to_ascii_uppercase().as_str() {
        "PK" | "TK" => Some(-1),
        "K" => Some(0),
        digits => digits.parse::<i8>().ok().filter(|g| (1..=12).contains(g)),
    }
}

/// Lowest and highest grade in text such as `"Grades K-5"` or `"6 to 8"`.
pub fn parse_grade_range(text: &str) -> Option<(i8, i8)> {
    grade_range_pattern().captures_iter(text).find_map(|cap| {
        let lo = grade_value(cap.get(1)?.as_str())?;
        let hi = grade_value(cap.get(2)?.as_str())?;
        (lo <= hi).then_some((lo, hi))
    })
}

/// Level served by a grade range. K-8 and similar spans count as
/// elementary; ranges that start in high school count as high.
pub fn level_from_grades(lo: i8, hi: i8) -> Option<SchoolLevel> {
    if lo >= 9 {
        Some(SchoolLevel::High)
    } else if hi <= 5 {
        Some(SchoolLevel::Elementary)
    } else if lo >= 5 && hi <= 8 {
        Some(SchoolLevel::Middle)
    } else if hi <= 6 && lo <= 1 {
        Some(SchoolLevel::Elementary)
    } else if lo <= 5 && hi <= 8 {
        Some(SchoolLevel::Elementary)
    } else {
        None
    }
}

// "junior high" has to be checked before "high".
const MIDDLE_WORDS: &[&str] = &["junior high", "middle", "intermediate", "jr high"];
const HIGH_WORDS: &[&str] = &["high school", "high", "secondary", "senior"];
const ELEMENTARY_WORDS: &[&str] = &["elementary", "primary", "grade school", "es"];

fn level_from_words(text: &str) -> Option<SchoolLevel> {
    let norm = format!(" {} ", normalize_label(text));
    let has = |words: &[&str]| words.iter().any(|w| norm.contains(&format!(" {} ", w)));
    if has(MIDDLE_WORDS) {
        Some(SchoolLevel::Middle)
    } else if has(HIGH_WORDS) {
        Some(SchoolLevel::High)
    } else if has(ELEMENTARY_WORDS) {
        Some(SchoolLevel::Elementary)
    } else {
        None
    }
}

/// Level tag shown next to a result ("Elementary School", "High").
pub fn level_from_label(label: &str) -> Option<SchoolLevel> {
    level_from_words(label)
}

/// Name heuristics: "Northview Middle", "Hickory High", "Jenkins Elementary".
pub fn level_from_name(name: &str) -> Option<SchoolLevel> {
    level_from_words(name)
}

pub fn categorize(label: Option<&str>, grades: Option<&str>, name: &str) -> Option<SchoolLevel> {
    label
        .and_then(level_from_label)
        .or_else(|| {
            grades
                .and_then(parse_grade_range)
                .and_then(|(lo, hi)| level_from_grades(lo, hi))
        })
        .or_else(|| level_from_name(name))
}
