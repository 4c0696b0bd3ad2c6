//! metrics tool - structured financial data

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::tools::sources::MetricsSource;
use crate::tools::{Tool, ToolContext, ToolResult};

/// Fetch metric sets through a `MetricsSource`
pub struct MetricsTool {
    source: Arc<dyn MetricsSource>,
}

impl MetricsTool {
    pub fn new(source: Arc<dyn MetricsSource>) -> Self {
        debug!("MetricsTool::new: called");
        Self { source }
    }
}

#[async_trait]
impl Tool for MetricsTool {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn description(&self) -> &'static str {
        "Fetch a named set of financial metrics (income statement, balance sheet, ratios, prices) as JSON. Omit metric_set to list what is available."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "subject": {
                    "type": "string",
                    "description": "Subject identifier; defaults to the subject under analysis"
                },
                "metric_set": {
                    "type": "string",
                    "description": "Metric set name, e.g. income, balance-sheet, ratios"
                }
            },
            "additionalProperties": false
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(?input, "MetricsTool::execute: called");
        let subject = ctx.subject_or(&input);

        let Some(metric_set) = input["metric_set"].as_str() else {
            debug!(%subject, "MetricsTool::execute: listing metric sets");
            return match self.source.metric_sets(subject).await {
                Ok(sets) => ToolResult::success(format!("Available metric sets: {}", sets.join(", "))),
                Err(e) => ToolResult::error(e.to_string()),
            };
        };

        match self.source.fetch(subject, metric_set).await {
            Ok(value) => ToolResult::json(&value),
            Err(e) => {
                debug!(error = %e, "MetricsTool::execute: fetch failed");
                ToolResult::error(e.to_string())
            }
        }
    }
}
