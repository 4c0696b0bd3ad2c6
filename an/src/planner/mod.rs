//! Stage planner
//!
//! One analysis is a fixed sequence of driver invocations: the most recent
//! period (full or compressed depending on its source size), one compressed
//! pass per earlier period, then a single synthesis over everything retained.

mod stages;
mod types;

pub use stages::{PlanOutcome, StagePlanner};
pub use types::{Period, PlannerState, StageResult, Strategy, Transition};
