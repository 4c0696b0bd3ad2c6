//! Persisted analysis records

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::llm::TokenUsage;
use crate::planner::Period;

use super::{AnalysisRequest, Degradation, FinalDocument};

/// A finished analysis plus the metadata needed to audit it
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRecord {
    pub request_id: String,
    pub request: AnalysisRequest,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// Strategy used for each period
    pub periods: Vec<Period>,

    pub total_usage: TokenUsage,
    pub review_cycles: u32,
    pub fix_passes: u32,
    pub fixes_applied: usize,
    pub fixes_skipped: usize,
    pub degradations: Vec<Degradation>,

    /// Rendered markdown
    pub markdown: String,

    pub document: FinalDocument,
}

impl AnalysisRecord {
    pub fn new(
        request: AnalysisRequest,
        document: FinalDocument,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let refinement = document.refinement.as_ref();
        Self {
            request_id: document.request_id.clone(),
            request,
            started_at,
            finished_at,
            periods: document.periods.clone(),
            total_usage: document.usage.total(),
            review_cycles: refinement.map_or(0, |r| r.cycles),
            fix_passes: refinement.map_or(0, |r| r.fix_passes),
            fixes_applied: refinement.map_or(0, |r| r.applied),
            fixes_skipped: refinement.map_or(0, |r| r.skipped),
            degradations: document.degradations.clone(),
            markdown: document.render(),
            document,
        }
    }

    /// File stem: sanitized subject plus the finish time
    pub fn file_stem(&self) -> String {
        let subject: String = self
            .request
            .subject
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        format!("{}-{}", subject, self.finished_at.format("%Y%m%dT%H%M%SZ"))
    }
}

/// Destination for finished analyses
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Persist a record, returning where it went
    async fn write(&self, record: &AnalysisRecord) -> Result<PathBuf>;
}

/// Writes `<dir>/<subject>-<timestamp>.json` and a matching `.md`
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ReportSink for JsonFileSink {
    async fn write(&self, record: &AnalysisRecord) -> Result<PathBuf> {
        debug!(dir = %self.dir.display(), request_id = %record.request_id, "JsonFileSink::write: called");
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create report directory {}", self.dir.display()))?;

        let stem = record.file_stem();
        let json_path = self.dir.join(format!("{}.json", stem));
        let md_path = self.dir.join(format!("{}.md", stem));

        let json = serde_json::to_string_pretty(record).context("Failed to serialize analysis record")?;
        tokio::fs::write(&json_path, json)
            .await
            .with_context(|| format!("Failed to write {}", json_path.display()))?;
        tokio::fs::write(&md_path, &record.markdown)
            .await
            .with_context(|| format!("Failed to write {}", md_path.display()))?;

        info!(path = %json_path.display(), "Analysis record written");
        Ok(json_path)
    }
}
