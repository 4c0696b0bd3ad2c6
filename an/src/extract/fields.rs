//! Decision fields from labelled lines of free text

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::parse_number;

static LABELLED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^[ \t>#*\-•]*(?P<label>recommendation|decision|rating|confidence|price target|target price|fair value|intrinsic value|upside potential|upside|downside|current price|margin of safety)[*_]*[ \t]*:[ \t]*(?P<value>.+)$",
    )
    .expect("valid regex")
});

static DECISION_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\b(buy|hold|sell)\b").expect("valid regex"));

static CONFIDENCE_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(low|medium|moderate|high)\b").expect("valid regex"));

/// Investment decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Buy,
    Hold,
    Sell,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Hold => write!(f, "HOLD"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Qualitative confidence level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

/// Confidence as stated by the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Confidence {
    Percent(u8),
    Level(ConfidenceLevel),
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Percent(p) => write!(f, "{}%", p),
            Self::Level(ConfidenceLevel::Low) => write!(f, "Low"),
            Self::Level(ConfidenceLevel::Medium) => write!(f, "Medium"),
            Self::Level(ConfidenceLevel::High) => write!(f, "High"),
        }
    }
}

/// Structured fields of an analysis document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionFields {
    pub decision: Option<Decision>,
    pub confidence: Option<Confidence>,

    /// Numeric fields keyed by canonical name (`price_target`, `fair_value`,
    /// `upside_pct`, `current_price`, `margin_of_safety_pct`)
    pub numbers: BTreeMap<String, f64>,
}

impl DecisionFields {
    /// Extract fields from labelled lines; the last occurrence of a label wins
    pub fn extract(text: &str) -> Self {
        debug!(chars = text.len(), "DecisionFields::extract: called");
        let mut fields = Self::default();

        for caps in LABELLED_LINE.captures_iter(text) {
            let label = caps["label"].to_lowercase();
            let value = caps["value"].trim().trim_matches(|c| c == '*' || c == '_' || c == '`').trim();
            match label.as_str() {
                "recommendation" | "decision" | "rating" => {
                    if let Some(decision) = parse_decision(value) {
                        fields.decision = Some(decision);
                    }
                }
                "confidence" => {
                    if let Some(confidence) = parse_confidence(value) {
                        fields.confidence = Some(confidence);
                    }
                }
                other => {
                    let key = match other {
                        "price target" | "target price" => "price_target",
                        "fair value" | "intrinsic value" => "fair_value",
                        "upside" | "upside potential" => "upside_pct",
                        "downside" => "downside_pct",
                        "current price" => "current_price",
                        _ => "margin_of_safety_pct",
                    };
                    if let Some(number) = parse_number(value) {
                        fields.numbers.insert(key.to_string(), number);
                    }
                }
            }
        }

        debug!(decision = ?fields.decision, numbers = fields.numbers.len(), "DecisionFields::extract: done");
        fields
    }

    /// Overwrite with every value `refined` actually carries
    ///
    /// Absent values in `refined` never clear a value already present.
    pub fn merge_non_null(&mut self, refined: &DecisionFields) {
        if let Some(decision) = refined.decision {
            self.decision = Some(decision);
        }
        if let Some(confidence) = refined.confidence {
            self.confidence = Some(confidence);
        }
        for (key, value) in &refined.numbers {
            self.numbers.insert(key.clone(), *value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.decision.is_none() && self.confidence.is_none() && self.numbers.is_empty()
    }
}

fn parse_decision(value: &str) -> Option<Decision> {
    let word = DECISION_WORD.captures(value)?;
    match word[1].to_lowercase().as_str() {
        "buy" => Some(Decision::Buy),
        "hold" => Some(Decision::Hold),
        "sell" => Some(Decision::Sell),
        _ => None,
    }
}

fn parse_confidence(value: &str) -> Option<Confidence> {
    if let Some(number) = parse_number(value) {
        // 0.8 means 80%
        let percent = if value.contains('%') || number > 1.0 { number } else { number * 100.0 };
        return Some(Confidence::Percent(percent.round().clamp(0.0, 100.0) as u8));
    }
    let word = CONFIDENCE_WORD.captures(value)?;
    match word[1].to_lowercase().as_str() {
        "low" => Some(Confidence::Level(ConfidenceLevel::Low)),
        "medium" | "moderate" => Some(Confidence::Level(ConfidenceLevel::Medium)),
        "high" => Some(Confidence::Level(ConfidenceLevel::High)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "# ACME Analysis\n\n\
        ## Recommendation\n\n\
        **Recommendation:** BUY\n\
        **Confidence**: 75%\n\
        - Price Target: $145.00\n\
        - Fair Value: $150\n\
        - Upside: +18%\n\
        - Current Price: n/a\n";

    #[test]
    fn test_extract_labelled_fields() {
        let fields = DecisionFields::extract(DOC);
        assert_eq!(fields.decision, Some(Decision::Buy));
        assert_eq!(fields.confidence, Some(Confidence::Percent(75)));
        assert_eq!(fields.numbers.get("price_target"), Some(&145.0));
        assert_eq!(fields.numbers.get("fair_value"), Some(&150.0));
        assert_eq!(fields.numbers.get("upside_pct"), Some(&18.0));
        assert!(!fields.numbers.contains_key("current_price"));
    }

    #[test]
    fn test_heading_alone_is_not_a_field() {
        let fields = DecisionFields::extract("## Recommendation\n\nWe like it.");
        assert!(fields.is_empty());
    }

    #[test]
    fn test_last_occurrence_wins() {
        let fields = DecisionFields::extract("Rating: HOLD\n...\nRating: Sell (revised)\n");
        assert_eq!(fields.decision, Some(Decision::Sell));
    }

    #[test]
    fn test_confidence_levels() {
        assert_eq!(
            DecisionFields::extract("Confidence: Moderate").confidence,
            Some(Confidence::Level(ConfidenceLevel::Medium))
        );
        assert_eq!(DecisionFields::extract("Confidence: 0.8").confidence, Some(Confidence::Percent(80)));
        assert_eq!(DecisionFields::extract("Confidence: unsure").confidence, None);
    }

    #[test]
    fn test_not_found_is_absent() {
        assert_eq!(DecisionFields::extract("No labels at all."), DecisionFields::default());
    }

    #[test]
    fn test_merge_non_null_preserves_existing() {
        let mut base = DecisionFields::extract(DOC);
        let refined = DecisionFields::extract("Price Target: $160\n");
        base.merge_non_null(&refined);

        assert_eq!(base.decision, Some(Decision::Buy));
        assert_eq!(base.confidence, Some(Confidence::Percent(75)));
        assert_eq!(base.numbers.get("price_target"), Some(&160.0));
        assert_eq!(base.numbers.get("fair_value"), Some(&150.0));
    }

    #[test]
    fn test_display() {
        assert_eq!(Decision::Hold.to_string(), "HOLD");
        assert_eq!(Confidence::Percent(60).to_string(), "60%");
        assert_eq!(Confidence::Level(ConfidenceLevel::High).to_string(), "High");
    }
}
