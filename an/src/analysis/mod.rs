//! Analysis requests and their results
//!
//! `Analyst` ties the planner and the refiner together for one request and
//! produces a `FinalDocument`; `AnalysisRecord` and `ReportSink` persist it.

mod analyst;
mod record;
mod types;

pub use analyst::Analyst;
pub use record::{AnalysisRecord, JsonFileSink, ReportSink};
pub use types::{
    AnalysisError, AnalysisMode, AnalysisRequest, CancelFlag, Degradation, FinalDocument, StageFailure,
};
