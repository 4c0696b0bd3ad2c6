//! Built-in research tools

mod filing;
mod metrics;
mod search;
mod valuation;

pub use filing::FilingTool;
pub use metrics::MetricsTool;
pub use search::{SearchTool, TavilySearch};
pub use valuation::{Dcf, ValuationTool, cagr, dcf, implied_multiple, margin_of_safety};
