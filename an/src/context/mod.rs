//! Context budget management
//!
//! Keeps a reasoning-loop conversation inside the model's context window by
//! dropping middle turns while preserving task framing, recent history and
//! the structural rules the provider enforces.

mod budget;
mod conversation;

pub use budget::{ContextBudget, PruneError, estimate_tokens, prune};
pub use conversation::Conversation;
