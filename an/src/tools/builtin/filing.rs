//! filing tool - retrieve periodic reports or named sections of them

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::tools::sources::FilingSource;
use crate::tools::{Tool, ToolContext, ToolResult};

/// Retrieve filings through a `FilingSource`
pub struct FilingTool {
    source: Arc<dyn FilingSource>,
}

impl FilingTool {
    pub fn new(source: Arc<dyn FilingSource>) -> Self {
        debug!("FilingTool::new: called");
        Self { source }
    }
}

#[async_trait]
impl Tool for FilingTool {
    fn name(&self) -> &'static str {
        "filing"
    }

    fn description(&self) -> &'static str {
        "Retrieve a periodic filing (or one named section of it) for the subject, or list the reporting periods on file."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["fetch", "list_periods"],
                    "description": "fetch a document (default) or list available periods"
                },
                "subject": {
                    "type": "string",
                    "description": "Subject identifier; defaults to the subject under analysis"
                },
                "period": {
                    "type": "string",
                    "description": "Reporting period id, e.g. FY2024"
                },
                "doc_type": {
                    "type": "string",
                    "description": "Document type, e.g. annual-report or quarterly-report"
                },
                "section": {
                    "type": "string",
                    "description": "Optional section heading, e.g. Risk Factors"
                }
            },
            "additionalProperties": false
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(?input, "FilingTool::execute: called");
        let subject = ctx.subject_or(&input);

        if input["action"].as_str() == Some("list_periods") {
            debug!(%subject, "FilingTool::execute: listing periods");
            return match self.source.list_periods(subject).await {
                Ok(periods) if periods.is_empty() => ToolResult::success(format!("No periods on file for {}", subject)),
                Ok(periods) => ToolResult::success(periods.join("\n")),
                Err(e) => ToolResult::error(e.to_string()),
            };
        }

        let (Some(period), Some(doc_type)) = (input["period"].as_str(), input["doc_type"].as_str()) else {
            debug!("FilingTool::execute: missing period or doc_type");
            return ToolResult::error("period and doc_type are required to fetch a filing");
        };
        let section = input["section"].as_str();

        match self.source.fetch(subject, period, doc_type, section).await {
            Ok(text) => {
                debug!(chars = text.len(), "FilingTool::execute: fetched");
                ToolResult::success(text)
            }
            Err(e) => {
                debug!(error = %e, "FilingTool::execute: fetch failed");
                ToolResult::error(e.to_string())
            }
        }
    }
}
