//! ToolRegistry - name to tool dispatch with argument validation

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::llm::ToolDefinition;

use super::builtin::{FilingTool, MetricsTool, SearchTool, ValuationTool};
use super::schema;
use super::sources::{FilingSource, MetricsSource, SearchSource};
use super::{Tool, ToolContext, ToolError, ToolResult};

/// Default cap on characters returned by one tool call
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 100_000;

/// Maps tool names to tools and their schemas
///
/// The registry holds no per-request state; one instance is shared by every
/// analysis running in the process.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    max_output_chars: usize,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn empty() -> Self {
        debug!("ToolRegistry::empty: called");
        Self {
            tools: HashMap::new(),
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
        }
    }

    /// Registry with the research tools wired to the given collaborators
    ///
    /// The search tool is only registered when a search source is available.
    pub fn standard(
        filings: Arc<dyn FilingSource>,
        metrics: Arc<dyn MetricsSource>,
        search: Option<Arc<dyn SearchSource>>,
    ) -> Self {
        debug!(has_search = %search.is_some(), "ToolRegistry::standard: called");
        let mut registry = Self::empty();
        registry.add_tool(Box::new(FilingTool::new(filings)));
        registry.add_tool(Box::new(MetricsTool::new(metrics)));
        registry.add_tool(Box::new(ValuationTool));
        if let Some(search) = search {
            registry.add_tool(Box::new(SearchTool::new(search)));
        }
        registry
    }

    /// Cap the characters any single tool result may carry
    pub fn with_max_output_chars(mut self, max_output_chars: usize) -> Self {
        debug!(%max_output_chars, "ToolRegistry::with_max_output_chars: called");
        self.max_output_chars = max_output_chars;
        self
    }

    /// Add a tool to the registry
    pub fn add_tool(&mut self, tool: Box<dyn Tool>) {
        debug!(tool_name = %tool.name(), "ToolRegistry::add_tool: called");
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Definitions of every registered tool, sorted by name
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        debug!("ToolRegistry::definitions: called");
        let mut definitions: Vec<ToolDefinition> = self.tools.values().map(|t| definition(t.as_ref())).collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Definitions for a subset of tools by name
    ///
    /// Names that are not registered are skipped with a warning; a call to
    /// one of them would still fail as an unknown tool.
    pub fn definitions_for(&self, tool_names: &[String]) -> Vec<ToolDefinition> {
        debug!(?tool_names, "ToolRegistry::definitions_for: called");
        tool_names
            .iter()
            .filter_map(|name| {
                let tool = self.tools.get(name);
                if tool.is_none() {
                    warn!(%name, "ToolRegistry::definitions_for: tool not registered");
                }
                tool
            })
            .map(|t| definition(t.as_ref()))
            .collect()
    }

    /// Validate arguments and dispatch to the named tool
    ///
    /// An unknown name is an `Err`. Schema violations and tool failures
    /// are `Ok` results flagged `is_error` so the model can correct itself.
    pub async fn invoke(&self, name: &str, args: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        debug!(tool_name = %name, request_id = %ctx.request_id, "ToolRegistry::invoke: called");
        let Some(tool) = self.tools.get(name) else {
            warn!(tool_name = %name, "ToolRegistry::invoke: unknown tool");
            return Err(ToolError::UnknownTool { name: name.to_string() });
        };

        if let Err(violations) = schema::validate(&tool.input_schema(), &args) {
            debug!(tool_name = %name, ?violations, "ToolRegistry::invoke: schema violation");
            return Ok(ToolResult::error(format!(
                "Invalid arguments for tool '{}':\n{}",
                name,
                violations.join("\n")
            )));
        }

        let result = tool.execute(args, ctx).await;
        debug!(tool_name = %name, is_error = %result.is_error, chars = result.content.len(), "ToolRegistry::invoke: completed");
        Ok(self.cap_output(result))
    }

    fn cap_output(&self, result: ToolResult) -> ToolResult {
        let total = result.content.chars().count();
        if total <= self.max_output_chars {
            return result;
        }
        debug!(%total, cap = %self.max_output_chars, "ToolRegistry::cap_output: truncating");
        let kept = crate::extract::truncate_chars(&result.content, self.max_output_chars);
        ToolResult {
            content: format!("{}\n[output truncated: {} of {} chars]", kept, self.max_output_chars, total),
            is_error: result.is_error,
        }
    }

    /// Check if a tool exists
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names, sorted
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
}

fn definition(tool: &dyn Tool) -> ToolDefinition {
    ToolDefinition::new(tool.name(), tool.description(), tool.input_schema())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{LocalFilingStore, LocalMetricsStore};
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn description(&self) -> &'static str {
            "Echo the text argument"
        }

        fn input_schema(&self) -> Value {
            serde_json::json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"],
                "additionalProperties": false
            })
        }

        async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
            ToolResult::success(input["text"].as_str().unwrap_or_default())
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new("req-1", "ACME")
    }

    fn echo_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::empty();
        registry.add_tool(Box::new(EchoTool));
        registry
    }

    #[test]
    fn test_standard_registry_tools() {
        let temp = tempdir().unwrap();
        let registry = ToolRegistry::standard(
            Arc::new(LocalFilingStore::new(temp.path())),
            Arc::new(LocalMetricsStore::new(temp.path())),
            None,
        );
        assert_eq!(registry.tool_names(), vec!["filing", "metrics", "valuation"]);
        assert!(!registry.has_tool("search"));
        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["filing", "metrics", "valuation"]);
    }

    #[test]
    fn test_definitions_for_subset() {
        let registry = echo_registry();
        let defs = registry.definitions_for(&["echo".to_string(), "missing".to_string()]);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
        assert!(registry.definitions_for(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let result = echo_registry()
            .invoke("echo", serde_json::json!({"text": "hi"}), &ctx())
            .await
            .unwrap();
        assert_eq!(result, ToolResult::success("hi"));
    }

    #[tokio::test]
    async fn test_invoke_unknown_tool_is_err() {
        let err = echo_registry()
            .invoke("teleport", serde_json::json!({}), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool { ref name } if name == "teleport"));
    }

    #[tokio::test]
    async fn test_invoke_schema_violation_is_error_result() {
        let result = echo_registry()
            .invoke("echo", serde_json::json!({"text": 5, "extra": true}), &ctx())
            .await
            .unwrap();
        assert!(result.is_error);
        assert!(result.content.contains("Invalid arguments for tool 'echo'"));
        assert!(result.content.contains("expected string"));
        assert!(result.content.contains("unexpected property 'extra'"));
    }

    #[tokio::test]
    async fn test_output_is_capped() {
        let registry = echo_registry().with_max_output_chars(10);
        let result = registry
            .invoke("echo", serde_json::json!({"text": "é".repeat(25)}), &ctx())
            .await
            .unwrap();
        assert!(result.content.starts_with(&"é".repeat(10)));
        assert!(result.content.ends_with("[output truncated: 10 of 25 chars]"));
    }
}
