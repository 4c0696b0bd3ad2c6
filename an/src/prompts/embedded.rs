//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

pub const SYSTEM: &str = include_str!("../../prompts/system.pmt");
pub const CURRENT_FULL: &str = include_str!("../../prompts/current-full.pmt");
pub const CURRENT_COMPRESSED: &str = include_str!("../../prompts/current-compressed.pmt");
pub const PRIOR_PERIOD: &str = include_str!("../../prompts/prior-period.pmt");
pub const SYNTHESIS: &str = include_str!("../../prompts/synthesis.pmt");
pub const CRITIQUE: &str = include_str!("../../prompts/critique.pmt");
pub const FIX: &str = include_str!("../../prompts/fix.pmt");

/// Names of every embedded template
pub const NAMES: [&str; 7] = [
    "system",
    "current-full",
    "current-compressed",
    "prior-period",
    "synthesis",
    "critique",
    "fix",
];

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "system" => Some(SYSTEM),
        "current-full" => Some(CURRENT_FULL),
        "current-compressed" => Some(CURRENT_COMPRESSED),
        "prior-period" => Some(PRIOR_PERIOD),
        "synthesis" => Some(SYNTHESIS),
        "critique" => Some(CRITIQUE),
        "fix" => Some(FIX),
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}
