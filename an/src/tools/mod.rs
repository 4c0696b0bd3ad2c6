//! Tool system for the reasoning loop
//!
//! Tools give the model access to filings, financial metrics, web search and
//! valuation arithmetic. The registry validates every call against the
//! tool's schema before dispatch; data access goes through the collaborator
//! traits in `sources` so the pipeline never depends on where data lives.

mod context;
mod error;
mod local;
mod registry;
mod schema;
mod sources;
mod traits;

pub mod builtin;

pub use context::ToolContext;
pub use error::{SourceError, ToolError};
pub use local::{LocalFilingStore, LocalMetricsStore, extract_section};
pub use registry::{DEFAULT_MAX_OUTPUT_CHARS, ToolRegistry};
pub use schema::validate as validate_schema;
pub use sources::{FilingSource, MetricsSource, SearchHit, SearchSource};
pub use traits::{Tool, ToolResult};
