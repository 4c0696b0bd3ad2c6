//! Analyst - multi-period research analysis on a tool-augmented reasoning loop
//!
//! An analysis of one subject runs as a short, fixed sequence of stages. Each
//! stage is a bounded conversation with the model in which it may call
//! research tools; oversized conversations are pruned without breaking the
//! provider's reasoning-continuity rules; each stage's free-text answer is
//! reduced to a bounded summary before the next stage sees it; and the
//! synthesized document is critiqued and patched in place.
//!
//! # Modules
//!
//! - [`tools`] - Tool registry, built-in research tools and data sources
//! - [`driver`] - Reasoning-loop driver with retry
//! - [`context`] - Token estimation and conversation pruning
//! - [`planner`] - Current-period, prior-period and synthesis stages
//! - [`extract`] - Summaries, metrics and decision fields from free text
//! - [`refine`] - Critique and exact-substitution correction
//! - [`analysis`] - Requests, final documents and report persistence
//! - [`llm`] - LLM client trait and Anthropic implementation
//! - [`prompts`] - Prompt templates
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod analysis;
pub mod cli;
pub mod config;
pub mod context;
pub mod driver;
pub mod extract;
pub mod llm;
pub mod planner;
pub mod prompts;
pub mod refine;
pub mod tools;

pub use analysis::{
    AnalysisError, AnalysisMode, AnalysisRecord, AnalysisRequest, Analyst, CancelFlag, Degradation, FinalDocument,
    JsonFileSink, ReportSink,
};
pub use config::Config;
pub use driver::{DriverError, Invocation, ReasoningDriver};
pub use llm::{LlmClient, LlmError, UsageLedger, create_client};
pub use planner::{PlannerState, Strategy};
pub use tools::{FilingSource, MetricsSource, SearchSource, ToolRegistry};
