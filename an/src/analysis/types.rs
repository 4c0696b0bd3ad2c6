//! Request, result and failure types of one analysis

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::driver::DriverError;
use crate::extract::DecisionFields;
use crate::llm::UsageLedger;
use crate::planner::{Period, PlannerState, Transition};
use crate::refine::RefineOutcome;
use crate::tools::SourceError;

/// How much work one analysis does after synthesis
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    /// Synthesis only
    Quick,

    /// Synthesis followed by critique and correction cycles
    #[default]
    Standard,
}

impl FromStr for AnalysisMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "quick" => Ok(Self::Quick),
            "standard" => Ok(Self::Standard),
            other => Err(format!("unknown mode '{}' (expected quick or standard)", other)),
        }
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quick => write!(f, "quick"),
            Self::Standard => write!(f, "standard"),
        }
    }
}

/// One analysis to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Entity under analysis, e.g. a ticker
    pub subject: String,

    /// Reporting periods to cover, most recent first
    pub depth: usize,

    pub mode: AnalysisMode,
}

impl AnalysisRequest {
    pub fn new(subject: impl Into<String>, depth: usize, mode: AnalysisMode) -> Self {
        Self {
            subject: subject.into(),
            depth,
            mode,
        }
    }
}

/// Something that went wrong without stopping the analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Degradation {
    /// A stage's answer lacked its summary markers; the raw text was used
    ExtractionFallback { stage: String },

    /// A prior-period stage failed and its period is missing from synthesis
    PriorPeriodFailed { period: String, reason: String },

    /// The subject has fewer periods than requested
    MissingPeriod { position: usize, depth: usize },

    /// A critique or fix pass failed; the pre-correction document was kept
    RefinementDegraded { cycle: u32, reason: String },
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExtractionFallback { stage } => {
                write!(f, "Stage {} did not produce a marked summary; its raw answer was used", stage)
            }
            Self::PriorPeriodFailed { period, reason } => {
                write!(f, "Period {} could not be analyzed: {}", period, reason)
            }
            Self::MissingPeriod { position, depth } => {
                write!(f, "Period {} of {} requested is not available", position, depth)
            }
            Self::RefinementDegraded { cycle, reason } => {
                write!(f, "Review cycle {} failed and was abandoned: {}", cycle, reason)
            }
        }
    }
}

/// Why a stage failed
#[derive(Debug, Error)]
pub enum StageFailure {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("Source material unavailable: {0}")]
    Source(#[from] SourceError),

    #[error("Prompt could not be rendered: {0}")]
    Prompt(String),
}

/// Why an analysis produced no document
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("No reporting periods available for {subject}")]
    NoPeriods { subject: String },

    #[error("Stage {stage} failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: StageFailure,
    },

    #[error("Analysis cancelled before {next}")]
    Cancelled { next: PlannerState },
}

impl AnalysisError {
    pub fn stage(stage: impl Into<String>, source: impl Into<StageFailure>) -> Self {
        Self::Stage {
            stage: stage.into(),
            source: source.into(),
        }
    }
}

/// Cooperative cancellation shared between a request and whoever may stop it
///
/// Checked only between stages; a running stage always finishes.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The finished analysis
#[derive(Debug, Clone, Serialize)]
pub struct FinalDocument {
    pub request_id: String,
    pub subject: String,

    /// Synthesis text after any applied fixes
    pub text: String,

    /// Review summary appended when refinement ran
    pub critique_section: Option<String>,

    pub fields: DecisionFields,
    pub degradations: Vec<Degradation>,

    /// Periods covered, most recent first
    pub periods: Vec<Period>,

    pub transitions: Vec<Transition>,

    /// Refinement result, absent in quick mode
    pub refinement: Option<RefineOutcome>,

    pub usage: UsageLedger,
}

impl FinalDocument {
    /// Markdown document: text, review section, then analysis notes
    pub fn render(&self) -> String {
        let mut out = self.text.trim_end().to_string();
        out.push('\n');

        if let Some(section) = &self.critique_section {
            out.push('\n');
            out.push_str(section.trim_end());
            out.push('\n');
        }

        if !self.degradations.is_empty() {
            out.push_str("\n## Analysis notes\n\n");
            for degradation in &self.degradations {
                out.push_str(&format!("- {}\n", degradation));
            }
        }

        out
    }
}
