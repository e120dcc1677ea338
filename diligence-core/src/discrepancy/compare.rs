//! Comparison primitives: text overlap, amounts and dates.

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::LazyLock;

const SCALE: &str = r"thousand|million|billion|trillion|bn|mm|k|m|b|t";

/// One numeric token: optional currency, number, optional scale, and an
/// optional range tail (`51-200`, `$5–10M`, `1 to 5 million`).
static AMOUNT_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(?P<cur>[$€£¥]|\b(?:usd|eur|gbp))?\s*(?P<lo>\d+(?:\.\d+)?)\s*(?P<lo_scale>{SCALE})?\b(?:\s*(?:-|–|—|\bto\b)\s*[$€£¥]?\s*(?P<hi>\d+(?:\.\d+)?)\s*(?P<hi_scale>{SCALE})?\b)?"
    ))
    .ok()
});

static YEAR_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b(1[89]\d{2}|20\d{2})\b").ok());

/// Intersection-over-union of the lowercase word sets of `a` and `b`.
///
/// Two empty texts are identical; one empty text shares nothing.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let words_a = word_set(a);
    let words_b = word_set(b);
    if words_a.is_empty() && words_b.is_empty() {
        return 1.0;
    }
    let union = words_a.union(&words_b).count();
    if union == 0 {
        return 0.0;
    }
    words_a.intersection(&words_b).count() as f64 / union as f64
}

fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(String::from)
        .collect()
}

/// A reported quantity. Ranges such as `51-200 employees` keep both ends;
/// exact figures have `low == high`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantity {
    pub low: f64,
    pub high: f64,
}

impl Quantity {
    pub fn exact(value: f64) -> Self {
        Self {
            low: value,
            high: value,
        }
    }

    pub fn midpoint(&self) -> f64 {
        (self.low + self.high) / 2.0
    }

    pub fn is_range(&self) -> bool {
        self.low != self.high
    }
}

/// A numeric token found in free text.
struct Token {
    quantity: Quantity,
    /// Carries a currency marker or a scale suffix.
    marked: bool,
    /// A bare `18xx`-`20xx` integer, most likely a year.
    year_like: bool,
}

fn scale_of(suffix: Option<&str>) -> f64 {
    match suffix.map(str::to_lowercase).as_deref() {
        Some("k" | "thousand") => 1e3,
        Some("m" | "mm" | "million") => 1e6,
        Some("b" | "bn" | "billion") => 1e9,
        Some("t" | "trillion") => 1e12,
        _ => 1.0,
    }
}

fn is_year(digits: &str) -> bool {
    digits.len() == 4
        && digits
            .parse::<u16>()
            .is_ok_and(|y| (1800..=2099).contains(&y))
}

fn tokens(text: &str) -> Vec<Token> {
    let Some(re) = AMOUNT_RE.as_ref() else {
        return Vec::new();
    };
    re.captures_iter(text)
        .filter_map(|caps| {
            let lo = caps.name("lo")?;
            let currency = caps.name("cur").is_some();
            // labels such as FY2023, Q3 or H1
            let glued = text[..lo.start()]
                .chars()
                .next_back()
                .is_some_and(char::is_alphanumeric);
            if glued && !currency {
                return None;
            }

            let lo_scale = caps.name("lo_scale").map(|m| m.as_str());
            let hi_scale = caps.name("hi_scale").map(|m| m.as_str());
            let low: f64 = lo.as_str().parse().ok()?;
            let high = caps
                .name("hi")
                .and_then(|m| m.as_str().parse::<f64>().ok());

            // `$5-10M` scales both ends by the trailing suffix
            let low_scale = scale_of(lo_scale.or(hi_scale));
            let quantity = match high {
                Some(high) if high * scale_of(hi_scale) >= low * low_scale => Quantity {
                    low: low * low_scale,
                    high: high * scale_of(hi_scale),
                },
                _ => Quantity::exact(low * scale_of(lo_scale)),
            };

            let marked = currency || lo_scale.is_some() || hi_scale.is_some();
            // `2019-2021` is a span of years; `2021-03` is a date
            let year_like = !marked
                && is_year(lo.as_str())
                && (!quantity.is_range() || caps.name("hi").is_some_and(|hi| is_year(hi.as_str())));
            Some(Token {
                quantity,
                marked,
                year_like,
            })
        })
        .collect()
}

/// Parse a monetary amount, count, or range from free text.
///
/// A token with a currency marker or scale suffix wins over bare numbers, and
/// bare years are used only when nothing else is present. So
/// `FY2023 revenue of $5M` is five million and `51-200 employees` is the range
/// 51 to 200.
pub fn parse_quantity(text: &str) -> Option<Quantity> {
    let cleaned = text.replace(',', "");
    let tokens = tokens(&cleaned);
    tokens
        .iter()
        .find(|t| t.marked)
        .or_else(|| tokens.iter().find(|t| !t.year_like))
        .or_else(|| tokens.first())
        .map(|t| t.quantity)
}

/// Parse a monetary amount or count: `$12.5M`, `1,200,000`, `3 billion`, `250`.
/// Ranges collapse to their midpoint.
pub fn parse_amount(text: &str) -> Option<f64> {
    parse_quantity(text).map(|q| q.midpoint())
}

/// Quantity view of a JSON value: numbers directly, strings through [`parse_quantity`].
pub fn quantity_of(value: &Value) -> Option<Quantity> {
    match value {
        Value::Number(n) => n.as_f64().map(Quantity::exact),
        Value::String(s) => parse_quantity(s),
        _ => None,
    }
}

/// Numeric view of a JSON value. Ranges collapse to their midpoint.
pub fn amount_of(value: &Value) -> Option<f64> {
    quantity_of(value).map(|q| q.midpoint())
}

/// Relative difference between two quantities.
///
/// Overlapping quantities agree. Otherwise the gap is measured between the
/// nearest ends, so `150` against `51-200` is `0.0` and `300` against `51-200`
/// is `0.5`.
pub fn quantity_difference(a: Quantity, b: Quantity) -> f64 {
    if a.low <= b.high && b.low <= a.high {
        0.0
    } else if a.high < b.low {
        relative_difference(a.high, b.low)
    } else {
        relative_difference(a.low, b.high)
    }
}

/// Difference between two quantities relative to the smaller one.
///
/// `100` vs `150` is `0.5`; `100` vs `300` is `2.0`. A zero against a non-zero
/// value is infinitely different.
pub fn relative_difference(a: f64, b: f64) -> f64 {
    let (a, b) = (a.abs(), b.abs());
    let smaller = a.min(b);
    let diff = (a - b).abs();
    if diff == 0.0 {
        0.0
    } else if smaller == 0.0 {
        f64::INFINITY
    } else {
        diff / smaller
    }
}

/// A date with the precision it was reported at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportedDate {
    Year(i32),
    Day(NaiveDate),
}

impl ReportedDate {
    pub fn year(&self) -> i32 {
        match self {
            ReportedDate::Year(y) => *y,
            ReportedDate::Day(d) => d.year(),
        }
    }
}

impl std::fmt::Display for ReportedDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportedDate::Year(y) => write!(f, "{y}"),
            ReportedDate::Day(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

const DAY_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%B %d, %Y", "%b %d, %Y", "%d %B %Y", "%d %b %Y"];

/// Parse a date as reported: full dates, `YYYY-MM`, `Month YYYY`, or a bare year
/// anywhere in the text.
pub fn parse_date(text: &str) -> Option<ReportedDate> {
    let text = text.trim();
    for format in DAY_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(ReportedDate::Day(date));
        }
    }
    // month precision: pin to the first of the month
    for format in ["%Y-%m-%d", "%B %d %Y", "%b %d %Y"] {
        let candidate = match format {
            "%Y-%m-%d" => format!("{text}-01"),
            _ => {
                let mut parts = text.splitn(2, ' ');
                match (parts.next(), parts.next()) {
                    (Some(month), Some(year)) => format!("{month} 01 {year}"),
                    _ => continue,
                }
            }
        };
        if let Ok(date) = NaiveDate::parse_from_str(&candidate, format) {
            return Some(ReportedDate::Day(date));
        }
    }

    let re = YEAR_RE.as_ref()?;
    let year = re.captures(text)?.get(1)?.as_str().parse().ok()?;
    Some(ReportedDate::Year(year))
}

/// Date view of a JSON value. Integers are treated as years.
pub fn date_of(value: &Value) -> Option<ReportedDate> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(|y| i32::try_from(y).ok())
            .filter(|y| (1800..=2100).contains(y))
            .map(ReportedDate::Year),
        Value::String(s) => parse_date(s),
        _ => None,
    }
}

/// Whether two reported dates are further apart than `max_gap_days`.
///
/// When either side only has year precision the comparison is in whole years,
/// so `2015` and `2015-11-20` agree.
pub fn dates_differ(a: ReportedDate, b: ReportedDate, max_gap_days: i64) -> bool {
    match (a, b) {
        (ReportedDate::Day(a), ReportedDate::Day(b)) => (a - b).num_days().abs() > max_gap_days,
        _ => i64::from((a.year() - b.year()).abs()) * 365 > max_gap_days,
    }
}
