//! External data collaborators behind the built-in tools
//!
//! These traits are the seam between the analysis pipeline and wherever the
//! data really lives. Network access, rate limiting and retries belong to the
//! implementations, never to the registry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::SourceError;

/// Periodic filings (annual and quarterly reports and their sections)
#[async_trait]
pub trait FilingSource: Send + Sync {
    /// Reporting periods available for a subject, most recent first
    async fn list_periods(&self, subject: &str) -> Result<Vec<String>, SourceError>;

    /// Size in characters of a document, without retrieving its content
    async fn measure(&self, subject: &str, period: &str, doc_type: &str) -> Result<usize, SourceError>;

    /// Full document text, or a single named section of it
    async fn fetch(
        &self,
        subject: &str,
        period: &str,
        doc_type: &str,
        section: Option<&str>,
    ) -> Result<String, SourceError>;
}

/// Structured financial metrics (statements, ratios, price history)
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Metric sets this source can serve for a subject
    async fn metric_sets(&self, subject: &str) -> Result<Vec<String>, SourceError>;

    /// One named metric set as JSON
    async fn fetch(&self, subject: &str, metric_set: &str) -> Result<Value, SourceError>;
}

/// A single web search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Web search for news and commentary
#[async_trait]
pub trait SearchSource: Send + Sync {
    /// Search, optionally limited to the last `recency_days` days
    async fn search(
        &self,
        query: &str,
        recency_days: Option<u32>,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, SourceError>;
}
