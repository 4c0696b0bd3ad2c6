//! ToolContext - execution context for tools

use tracing::debug;

/// Execution context for tools - scoped to a single analysis request
///
/// Tools are stateless; everything request-specific they need travels here.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Analysis request id (for log correlation)
    pub request_id: String,

    /// Subject the request is about; used when the model omits it
    pub subject: String,
}

impl ToolContext {
    /// Create a new tool context
    pub fn new(request_id: impl Into<String>, subject: impl Into<String>) -> Self {
        let request_id = request_id.into();
        let subject = subject.into();
        debug!(%request_id, %subject, "ToolContext::new: called");
        Self { request_id, subject }
    }

    /// Subject from tool input, falling back to the request's subject
    pub fn subject_or<'a>(&'a self, input: &'a serde_json::Value) -> &'a str {
        input["subject"].as_str().filter(|s| !s.is_empty()).unwrap_or(&self.subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_or_prefers_input() {
        let ctx = ToolContext::new("req-1", "ACME");
        assert_eq!(ctx.subject_or(&serde_json::json!({"subject": "BETA"})), "BETA");
        assert_eq!(ctx.subject_or(&serde_json::json!({})), "ACME");
        assert_eq!(ctx.subject_or(&serde_json::json!({"subject": ""})), "ACME");
    }
}
