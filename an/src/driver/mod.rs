//! Reasoning-loop driver
//!
//! Runs one bounded multi-turn conversation with the model: sends the
//! conversation, executes requested tools through the registry, prunes when
//! the context budget is exceeded and returns the model's final answer.

mod engine;
mod retry;

pub use engine::{DriverError, FinalTurn, Invocation, ReasoningDriver};
pub use retry::RetryPolicy;
