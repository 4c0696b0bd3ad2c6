//! search tool - web search for news and commentary

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::tools::sources::{SearchHit, SearchSource};
use crate::tools::{SourceError, Tool, ToolContext, ToolResult};

const DEFAULT_MAX_RESULTS: usize = 5;
const SNIPPET_CHARS: usize = 300;

/// Search the web through a `SearchSource`
pub struct SearchTool {
    source: Arc<dyn SearchSource>,
}

impl SearchTool {
    pub fn new(source: Arc<dyn SearchSource>) -> Self {
        debug!("SearchTool::new: called");
        Self { source }
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &'static str {
        "search"
    }

    fn description(&self) -> &'static str {
        "Search the web for recent news, guidance and commentary about the subject."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                },
                "recency_days": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Only return results from the last N days"
                },
                "max_results": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 20,
                    "description": "Maximum results to return (default: 5)"
                }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
        debug!(?input, "SearchTool::execute: called");
        let Some(query) = input["query"].as_str() else {
            return ToolResult::error("query is required");
        };
        let recency = input["recency_days"].as_u64().map(|d| d as u32);
        let max_results = input["max_results"].as_u64().map_or(DEFAULT_MAX_RESULTS, |n| n as usize);

        match self.source.search(query, recency, max_results).await {
            Ok(hits) if hits.is_empty() => ToolResult::success("No results found"),
            Ok(hits) => ToolResult::success(format_hits(&hits)),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

fn format_hits(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            let snippet = crate::extract::truncate_chars(&hit.snippet, SNIPPET_CHARS);
            format!("{}. {}\n   {}\n   {}\n", i + 1, hit.title, hit.url, snippet)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Tavily web search (reads `TAVILY_API_KEY`)
pub struct TavilySearch {
    api_key: String,
    http: reqwest::Client,
}

impl TavilySearch {
    /// Create from the environment; `None` when no key is configured
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("TAVILY_API_KEY").ok()?;
        debug!("TavilySearch::from_env: key found");
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Some(Self { api_key, http })
    }
}

#[async_trait]
impl SearchSource for TavilySearch {
    async fn search(
        &self,
        query: &str,
        recency_days: Option<u32>,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, SourceError> {
        debug!(%query, ?recency_days, %max_results, "TavilySearch::search: called");
        let mut body = serde_json::json!({
            "api_key": self.api_key,
            "query": query,
            "max_results": max_results,
            "search_depth": "basic"
        });
        if let Some(days) = recency_days {
            body["topic"] = Value::from("news");
            body["days"] = Value::from(days);
        }

        let response = self
            .http
            .post("https://api.tavily.com/search")
            .json(&body)
            .send()
            .await
            .map_err(|e| SourceError::Upstream(format!("Search request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(SourceError::Upstream(format!("Tavily API error {}: {}", status, error_text)));
        }

        let result: Value = response
            .json()
            .await
            .map_err(|e| SourceError::Malformed(format!("Failed to parse response: {}", e)))?;

        Ok(parse_tavily(&result))
    }
}

fn parse_tavily(result: &Value) -> Vec<SearchHit> {
    result["results"]
        .as_array()
        .map(|results| {
            results
                .iter()
                .map(|r| SearchHit {
                    title: r["title"].as_str().unwrap_or("(no title)").to_string(),
                    url: r["url"].as_str().unwrap_or_default().to_string(),
                    snippet: r["content"].as_str().unwrap_or_default().to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CannedSearch {
        hits: Vec<SearchHit>,
        seen: Mutex<Vec<(String, Option<u32>, usize)>>,
    }

    #[async_trait]
    impl SearchSource for CannedSearch {
        async fn search(
            &self,
            query: &str,
            recency_days: Option<u32>,
            max_results: usize,
        ) -> Result<Vec<SearchHit>, SourceError> {
            self.seen
                .lock()
                .unwrap()
                .push((query.to_string(), recency_days, max_results));
            Ok(self.hits.clone())
        }
    }

    #[tokio::test]
    async fn test_search_formats_hits() {
        let source = Arc::new(CannedSearch {
            hits: vec![SearchHit {
                title: "ACME beats estimates".into(),
                url: "https://news.example/acme".into(),
                snippet: "Revenue grew 12%".into(),
            }],
            seen: Mutex::new(vec![]),
        });
        let tool = SearchTool::new(source.clone());
        let ctx = ToolContext::new("req", "ACME");

        let result = tool
            .execute(serde_json::json!({"query": "ACME earnings", "recency_days": 30}), &ctx)
            .await;
        assert!(!result.is_error);
        assert!(result.content.starts_with("1. ACME beats estimates"));
        assert_eq!(
            source.seen.lock().unwrap()[0],
            ("ACME earnings".to_string(), Some(30), DEFAULT_MAX_RESULTS)
        );
    }

    #[tokio::test]
    async fn test_search_no_results() {
        let tool = SearchTool::new(Arc::new(CannedSearch {
            hits: vec![],
            seen: Mutex::new(vec![]),
        }));
        let result = tool
            .execute(serde_json::json!({"query": "x"}), &ToolContext::new("req", "ACME"))
            .await;
        assert_eq!(result.content, "No results found");
    }

    #[test]
    fn test_parse_tavily() {
        let hits = parse_tavily(&serde_json::json!({
            "results": [{"title": "T", "url": "https://u", "content": "C"}, {"url": "https://v"}]
        }));
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].snippet, "C");
        assert_eq!(hits[1].title, "(no title)");
        assert!(parse_tavily(&serde_json::json!({})).is_empty());
    }
}
