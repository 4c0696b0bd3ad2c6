//! Validator-refiner
//!
//! After synthesis the document is critiqued without tools; when the
//! critique finds critical issues or scores below the acceptance threshold,
//! a fix pass with verification tools proposes exact substitutions that are
//! applied directly to the text.

mod apply;
mod refiner;
mod types;

pub use apply::{FixOutcome, apply_fixes};
pub use refiner::{RefineOutcome, ValidatorRefiner};
pub use types::{Critique, Fix, Issue, Severity};
