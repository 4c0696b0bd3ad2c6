//! Stage prompt templates
//!
//! Every stage of an analysis renders a Handlebars `.pmt` template. A file
//! under `.analyst/prompts/` overrides the copy in `prompts/`, and the
//! embedded copy is used when neither exists.

pub mod embedded;
mod loader;

pub use loader::PromptLoader;
