//! The contract every research tool implements

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::context::ToolContext;

/// A capability the model can invoke during a reasoning loop
///
/// Implementations receive arguments that already passed schema validation
/// and report collaborator failures as error results so the model can see
/// them and adjust.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Identifier the model uses in its tool-use blocks
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON Schema the registry checks arguments against
    fn input_schema(&self) -> Value;

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult;
}

/// Text handed back to the model, flagged when it describes a failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    fn new(content: impl Into<String>, is_error: bool) -> Self {
        Self {
            content: content.into(),
            is_error,
        }
    }

    pub fn success(content: impl Into<String>) -> Self {
        Self::new(content, false)
    }

    pub fn error(content: impl Into<String>) -> Self {
        let result = Self::new(content, true);
        debug!(content = %result.content, "ToolResult::error: called");
        result
    }

    /// Pretty-printed JSON payload
    pub fn json<T: serde::Serialize>(value: &T) -> Self {
        serde_json::to_string_pretty(value)
            .map(Self::success)
            .unwrap_or_else(|e| Self::error(format!("Result could not be encoded as JSON: {}", e)))
    }
}
