//! Marker-delimited summaries and metrics
//!
//! Stage prompts ask the model to wrap its summary and key figures in
//! period-specific markers. The last complete region wins, so a model that
//! drafts, then revises, is read at its final version.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?P<open>\()?\s*(?P<sign>[-−+])?\s*[$€£¥]?\s*(?P<sign2>[-−])?\s*(?P<num>\d[\d,]*(?:\.\d+)?|\.\d+)\s*(?P<suffix>%|bn|billion|million|thousand|[bmk])?(?P<rest>.*)$",
    )
    .expect("valid regex")
});

/// Longest prefix of `text` holding at most `max_chars` characters
///
/// Always cuts on a UTF-8 character boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Parse a reported figure into a number
///
/// Understands currency symbols, thousands separators, a trailing `%`
/// (kept as the percentage value), parenthesised negatives and `B`/`M`/`K`
/// scale suffixes. Anything else, including `n/a`, yields `None`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().trim_matches(|c| c == '*' || c == '`' || c == '_').trim();
    let caps = NUMBER.captures(cleaned)?;

    let digits = caps["num"].replace(',', "");
    let mut value: f64 = digits.parse().ok()?;

    let rest = caps.name("rest").map_or("", |m| m.as_str());
    let suffix = caps.name("suffix").map(|m| m.as_str().to_lowercase());
    let scale = match suffix.as_deref() {
        // "12 months" is not twelve million
        Some(s) if s.len() == 1 && rest.starts_with(|c: char| c.is_alphabetic()) => 1.0,
        Some("b") | Some("bn") | Some("billion") => 1e9,
        Some("m") | Some("million") => 1e6,
        Some("k") | Some("thousand") => 1e3,
        _ => 1.0,
    };
    value *= scale;

    let parenthesised = caps.name("open").is_some() && rest.trim_start().starts_with(')');
    let signed = caps.name("sign").is_some_and(|m| m.as_str() != "+") || caps.name("sign2").is_some();
    if parenthesised || signed {
        value = -value;
    }
    Some(value)
}

/// Period-specific summary and metrics markers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryMarkers {
    period: String,
}

impl SummaryMarkers {
    pub fn for_period(period: impl Into<String>) -> Self {
        Self { period: period.into() }
    }

    pub fn period(&self) -> &str {
        &self.period
    }

    pub fn summary_open(&self) -> String {
        format!("<<<SUMMARY:{}>>>", self.period)
    }

    pub fn summary_close(&self) -> String {
        format!("<<<END SUMMARY:{}>>>", self.period)
    }

    pub fn metrics_open(&self) -> String {
        format!("<<<METRICS:{}>>>", self.period)
    }

    pub fn metrics_close(&self) -> String {
        format!("<<<END METRICS:{}>>>", self.period)
    }
}

/// Summary and metrics recovered from a stage's raw output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Extraction {
    pub summary: String,

    /// Only figures the model reported explicitly and that parse as numbers
    pub metrics: BTreeMap<String, f64>,

    /// True when no summary region was found and `summary` is the raw text
    pub fallback: bool,
}

impl Extraction {
    /// Cut the summary to `ceiling` characters
    pub fn bounded(mut self, ceiling: usize) -> Self {
        let total = self.summary.chars().count();
        if total > ceiling {
            debug!(%total, %ceiling, "Extraction::bounded: truncating summary");
            self.summary = truncate_chars(&self.summary, ceiling).to_string();
        }
        self
    }
}

/// Pull the summary and metrics regions for `markers` out of `raw`
///
/// Never fails: a missing or empty summary region falls back to the raw
/// text with `fallback` set.
pub fn extract(raw: &str, markers: &SummaryMarkers) -> Extraction {
    debug!(period = %markers.period(), chars = raw.len(), "extract: called");
    let summary = last_region(raw, &markers.summary_open(), &markers.summary_close()).filter(|s| !s.is_empty());
    let metrics = last_region(raw, &markers.metrics_open(), &markers.metrics_close())
        .map(parse_metrics)
        .unwrap_or_default();

    match summary {
        Some(summary) => Extraction {
            summary: summary.to_string(),
            metrics,
            fallback: false,
        },
        None => {
            warn!(period = %markers.period(), "Summary markers not found; using raw text");
            Extraction {
                summary: raw.trim().to_string(),
                metrics,
                fallback: true,
            }
        }
    }
}

/// Content of the last complete `open`..`close` region, trimmed
fn last_region<'a>(raw: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let mut search_end = raw.len();
    while let Some(close_at) = raw[..search_end].rfind(close) {
        if let Some(open_at) = raw[..close_at].rfind(open) {
            let content = &raw[open_at + open.len()..close_at];
            // A close marker inside means this open belongs to an earlier region
            if !content.contains(close) {
                return Some(content.trim());
            }
        }
        search_end = close_at;
    }
    None
}

fn parse_metrics(region: &str) -> BTreeMap<String, f64> {
    let mut metrics = BTreeMap::new();
    for line in region.lines() {
        let line = line.trim().trim_start_matches(['-', '*', '•']).trim();
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim().trim_matches(|c| c == '*' || c == '_' || c == '`').trim();
        if name.is_empty() {
            continue;
        }
        match parse_number(value) {
            Some(number) => {
                metrics.insert(name.to_string(), number);
            }
            None => debug!(%name, value = %value.trim(), "parse_metrics: skipping non-numeric value"),
        }
    }
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fy23() -> SummaryMarkers {
        SummaryMarkers::for_period("FY2023")
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("日本語", 0), "");
    }

    #[test]
    fn test_parse_number_variants() {
        assert_eq!(parse_number("1,234.5"), Some(1234.5));
        assert_eq!(parse_number("$12.5B"), Some(12.5e9));
        assert_eq!(parse_number("€ 300 million"), Some(300e6));
        assert_eq!(parse_number("(45)"), Some(-45.0));
        assert_eq!(parse_number("-3.2%"), Some(-3.2));
        assert_eq!(parse_number("$-5"), Some(-5.0));
        assert_eq!(parse_number("**18.5%**"), Some(18.5));
        assert_eq!(parse_number("750K"), Some(750e3));
        assert_eq!(parse_number("12 months"), Some(12.0));
        assert_eq!(parse_number("n/a"), None);
        assert_eq!(parse_number("not disclosed"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn test_extract_regions() {
        let raw = "Analysis...\n<<<SUMMARY:FY2023>>>\nMargins expanded.\n<<<END SUMMARY:FY2023>>>\n\
                   <<<METRICS:FY2023>>>\n- Revenue: $1,200M\n- Gross Margin: 41.5%\n- Segment count: n/a\n\
                   <<<END METRICS:FY2023>>>";
        let extraction = extract(raw, &fy23());
        assert!(!extraction.fallback);
        assert_eq!(extraction.summary, "Margins expanded.");
        assert_eq!(extraction.metrics.get("Revenue"), Some(&1.2e9));
        assert_eq!(extraction.metrics.get("Gross Margin"), Some(&41.5));
        assert!(!extraction.metrics.contains_key("Segment count"));
    }

    #[test]
    fn test_last_complete_region_wins() {
        let raw = "<<<SUMMARY:FY2023>>>draft<<<END SUMMARY:FY2023>>>\n\
                   <<<SUMMARY:FY2023>>>final<<<END SUMMARY:FY2023>>>\n\
                   <<<SUMMARY:FY2023>>>unterminated";
        assert_eq!(extract(raw, &fy23()).summary, "final");
    }

    #[test]
    fn test_other_period_markers_do_not_match() {
        let raw = "<<<SUMMARY:FY2024>>>current<<<END SUMMARY:FY2024>>>";
        let extraction = extract(raw, &fy23());
        assert!(extraction.fallback);
        assert_eq!(extraction.summary, raw);
    }

    #[test]
    fn test_missing_markers_fall_back_to_raw() {
        let extraction = extract("  no markers here  ", &fy23());
        assert!(extraction.fallback);
        assert_eq!(extraction.summary, "no markers here");
        assert!(extraction.metrics.is_empty());
    }

    #[test]
    fn test_empty_region_is_fallback() {
        let raw = "text <<<SUMMARY:FY2023>>>  <<<END SUMMARY:FY2023>>>";
        assert!(extract(raw, &fy23()).fallback);
    }

    #[test]
    fn test_bounded() {
        let raw = format!("<<<SUMMARY:FY2023>>>{}<<<END SUMMARY:FY2023>>>", "é".repeat(50));
        let bounded = extract(&raw, &fy23()).bounded(10);
        assert_eq!(bounded.summary.chars().count(), 10);

        let fallback = extract(&"x".repeat(100), &fy23()).bounded(20);
        assert_eq!(fallback.summary.len(), 20);
    }

    proptest! {
        #[test]
        fn prop_extract_is_idempotent(prefix in ".{0,40}", body in ".{0,80}", metric in "[a-z]{1,8}", value in -1.0e6f64..1.0e6) {
            let raw = format!(
                "{}<<<SUMMARY:FY2023>>>{}<<<END SUMMARY:FY2023>>><<<METRICS:FY2023>>>{}: {}<<<END METRICS:FY2023>>>",
                prefix, body, metric, value
            );
            let first = extract(&raw, &fy23());
            let second = extract(&raw, &fy23());
            prop_assert_eq!(&first, &second);
        }

        #[test]
        fn prop_truncate_never_exceeds(text in ".{0,200}", max in 0usize..100) {
            let cut = truncate_chars(&text, max);
            prop_assert!(cut.chars().count() <= max);
            prop_assert!(text.starts_with(cut));
        }
    }
}
