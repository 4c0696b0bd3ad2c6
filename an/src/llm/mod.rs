//! Model provider boundary
//!
//! Provider boundary for the reasoning loop: request/response types,
//! the `LlmClient` trait, the Anthropic implementation and usage accounting.

use std::sync::Arc;

use tracing::debug;

mod anthropic;
pub mod client;
mod error;
mod types;
mod usage;

pub use anthropic::AnthropicClient;
pub use client::LlmClient;
pub use error::LlmError;
pub use types::{
    CompletionRequest, CompletionResponse, ContentBlock, Message, MessageContent, Role, StopReason, TokenUsage,
    ToolCall, ToolDefinition,
};
pub use usage::{UsageEntry, UsageLedger};

use crate::config::LlmConfig;

/// Client for the provider named in `[llm] provider`
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client: called");
    match config.provider.as_str() {
        "anthropic" => Ok(Arc::new(AnthropicClient::from_config(config)?)),
        other => {
            debug!(provider = %other, "create_client: unknown provider");
            Err(LlmError::Config(format!(
                "Provider '{}' is not supported (available: anthropic)",
                other
            )))
        }
    }
}
