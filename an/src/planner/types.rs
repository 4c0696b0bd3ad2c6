//! Periods, strategies and the planner state machine

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::llm::TokenUsage;

/// How the current period's primary source is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Keep the complete analysis text
    Full,

    /// Analyze fully but keep only a bounded summary
    Compressed,
}

impl Strategy {
    /// Compressed strictly above the threshold, full otherwise
    pub fn for_size(measured_size: usize, threshold: usize) -> Self {
        if measured_size > threshold {
            Self::Compressed
        } else {
            Self::Full
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Compressed => write!(f, "compressed"),
        }
    }
}

/// One reporting period covered by an analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub id: String,

    /// Primary source size in bytes; only the current period is measured
    pub measured_size: Option<usize>,

    pub strategy: Strategy,
}

/// Output of one period stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageResult {
    pub period: String,

    /// Bounded summary, or the complete analysis for a full current period
    pub summary: String,

    /// Figures the model reported explicitly
    pub metrics: BTreeMap<String, f64>,

    pub usage: TokenUsage,
}

/// Where the planner is in an analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlannerState {
    NotStarted,
    CurrentPeriod,
    PriorPeriods,
    Synthesis,
    Done,
}

impl fmt::Display for PlannerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not-started"),
            Self::CurrentPeriod => write!(f, "current-period"),
            Self::PriorPeriods => write!(f, "prior-periods"),
            Self::Synthesis => write!(f, "synthesis"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// A recorded state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: PlannerState,
    pub to: PlannerState,
}
