//! Structured-text extraction
//!
//! Turns a stage's free-text answer into typed data: marker-delimited
//! summaries and metrics, labelled decision fields, and JSON critique and
//! fix records. Extraction never panics; missing structure degrades to a
//! fallback the caller can report.

mod fields;
mod markers;
mod review;

pub use fields::{Confidence, ConfidenceLevel, Decision, DecisionFields};
pub use markers::{Extraction, SummaryMarkers, extract, parse_number, truncate_chars};
pub use review::{
    CRITIQUE_CLOSE, CRITIQUE_OPEN, ExtractError, FIXES_CLOSE, FIXES_OPEN, parse_critique, parse_fixes,
};
