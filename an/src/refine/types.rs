//! Critique and fix records

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Issue severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Important,
    Critical,
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "critical" | "blocker" | "severe" => Ok(Self::Critical),
            "important" | "major" | "significant" | "moderate" => Ok(Self::Important),
            "minor" | "low" | "trivial" | "nit" => Ok(Self::Minor),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minor => write!(f, "minor"),
            Self::Important => write!(f, "important"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// One problem found by the critique pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,

    #[serde(default)]
    pub category: String,

    pub description: String,

    #[serde(default)]
    pub suggested_fix: Option<String>,
}

/// Critique of a synthesized document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Critique {
    /// Overall quality, 0-100
    pub score: u8,
    pub issues: Vec<Issue>,
}

impl Critique {
    pub fn has_critical(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Critical)
    }

    /// Correction is needed for any critical issue or a score below threshold
    pub fn needs_correction(&self, acceptance_score: u8) -> bool {
        self.has_critical() || self.score < acceptance_score
    }

    /// Issues at or above `min_severity`
    pub fn fixable(&self, min_severity: Severity) -> Vec<&Issue> {
        self.issues.iter().filter(|i| i.severity >= min_severity).collect()
    }
}

/// An exact-substitution patch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fix {
    pub find: String,
    pub replace: String,

    /// How the model checked the replacement (tool call, source quote)
    #[serde(default)]
    pub verification: Option<String>,
}
