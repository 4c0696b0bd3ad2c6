//! Filesystem-backed collaborators
//!
//! Layout under the data directory:
//!
//! ```text
//! <data-dir>/<SUBJECT>/<PERIOD>/<doc-type>.md   (or .txt)
//! <data-dir>/<SUBJECT>/metrics.json             ({"<metric-set>": {...}, ...})
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::SourceError;
use super::sources::{FilingSource, MetricsSource};

const DOC_EXTENSIONS: [&str; 2] = ["md", "txt"];

/// Accept `value` only as one plain path segment
fn component<'a>(field: &'static str, value: &'a str) -> Result<&'a str, SourceError> {
    let trimmed = value.trim();
    let plain = !trimmed.is_empty()
        && trimmed != "."
        && trimmed != ".."
        && !trimmed.contains(['/', '\\', ':', '\0']);
    if plain {
        Ok(trimmed)
    } else {
        warn!(%field, %value, "Rejected path component from tool input");
        Err(SourceError::InvalidPath {
            field,
            value: value.to_string(),
        })
    }
}

/// Resolve symlinks in `path` and require the result to stay under `root`
async fn contained(root: &Path, path: PathBuf, field: &'static str, value: &str) -> Result<PathBuf, SourceError> {
    let canonical = tokio::fs::canonicalize(&path).await?;
    let root = tokio::fs::canonicalize(root).await?;
    if canonical.starts_with(&root) {
        Ok(canonical)
    } else {
        warn!(path = %path.display(), root = %root.display(), "Resolved path escapes the data directory");
        Err(SourceError::InvalidPath {
            field,
            value: value.to_string(),
        })
    }
}

/// Filings read from a directory of pre-fetched documents
#[derive(Debug, Clone)]
pub struct LocalFilingStore {
    root: PathBuf,
}

impl LocalFilingStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        debug!(root = %root.display(), "LocalFilingStore::new: called");
        Self { root }
    }

    fn subject_dir(&self, subject: &str) -> Result<PathBuf, SourceError> {
        Ok(self.root.join(component("subject", subject)?.to_uppercase()))
    }

    async fn document_path(&self, subject: &str, period: &str, doc_type: &str) -> Result<PathBuf, SourceError> {
        let dir = self.subject_dir(subject)?.join(component("period", period)?);
        let doc_type = component("doc_type", doc_type)?;
        for ext in DOC_EXTENSIONS {
            let path = dir.join(format!("{}.{}", doc_type, ext));
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return contained(&self.root, path, "doc_type", doc_type).await;
            }
        }
        debug!(dir = %dir.display(), %doc_type, "LocalFilingStore::document_path: not found");
        Err(SourceError::NotFound {
            subject: subject.to_string(),
            what: format!("{} for {}", doc_type, period),
        })
    }
}

#[async_trait]
impl FilingSource for LocalFilingStore {
    async fn list_periods(&self, subject: &str) -> Result<Vec<String>, SourceError> {
        debug!(%subject, "LocalFilingStore::list_periods: called");
        let dir = self.subject_dir(subject)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceError::NotFound {
                    subject: subject.to_string(),
                    what: "filings".to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let mut periods = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                periods.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        // Period ids sort chronologically (FY2022 < FY2023, 2024-Q1 < 2024-Q2)
        periods.sort_by(|a, b| b.cmp(a));
        debug!(count = periods.len(), "LocalFilingStore::list_periods: found periods");
        Ok(periods)
    }

    async fn measure(&self, subject: &str, period: &str, doc_type: &str) -> Result<usize, SourceError> {
        debug!(%subject, %period, %doc_type, "LocalFilingStore::measure: called");
        let path = self.document_path(subject, period, doc_type).await?;
        let meta = tokio::fs::metadata(&path).await?;
        Ok(meta.len() as usize)
    }

    async fn fetch(
        &self,
        subject: &str,
        period: &str,
        doc_type: &str,
        section: Option<&str>,
    ) -> Result<String, SourceError> {
        debug!(%subject, %period, %doc_type, ?section, "LocalFilingStore::fetch: called");
        let path = self.document_path(subject, period, doc_type).await?;
        let content = tokio::fs::read_to_string(&path).await?;
        match section {
            None => Ok(content),
            Some(name) => extract_section(&content, name).map(str::to_string).ok_or_else(|| {
                SourceError::SectionNotFound {
                    subject: subject.to_string(),
                    period: period.to_string(),
                    doc_type: doc_type.to_string(),
                    section: name.to_string(),
                }
            }),
        }
    }
}

/// Text of the markdown section whose heading matches `name`
///
/// Runs from the heading line up to the next heading of the same or a
/// higher level. Matching is case-insensitive on the heading text.
pub fn extract_section<'a>(content: &'a str, name: &str) -> Option<&'a str> {
    let wanted = name.trim().to_lowercase();
    let mut start: Option<(usize, usize)> = None;
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        if let Some((level, title)) = heading(line) {
            let open = start;
            match open {
                Some((begin, open_level)) if level <= open_level => {
                    return Some(content[begin..offset].trim_end());
                }
                None if title.to_lowercase() == wanted => start = Some((offset, level)),
                _ => {}
            }
        }
        offset += line.len();
    }

    start.map(|(begin, _)| content[begin..].trim_end())
}

fn heading(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_end();
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.starts_with(' ') {
        return None;
    }
    Some((level, rest.trim()))
}

/// Metrics read from `<SUBJECT>/metrics.json`
#[derive(Debug, Clone)]
pub struct LocalMetricsStore {
    root: PathBuf,
}

impl LocalMetricsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        debug!(root = %root.display(), "LocalMetricsStore::new: called");
        Self { root }
    }

    async fn load(&self, subject: &str) -> Result<serde_json::Map<String, Value>, SourceError> {
        let path = metrics_path(&self.root, component("subject", subject)?);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                contained(&self.root, path.clone(), "subject", subject).await?;
                content
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceError::NotFound {
                    subject: subject.to_string(),
                    what: "metrics".to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(SourceError::Malformed(format!("{} is not a JSON object", path.display()))),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "LocalMetricsStore::load: invalid JSON");
                Err(SourceError::Malformed(format!("{}: {}", path.display(), e)))
            }
        }
    }
}

fn metrics_path(root: &Path, subject: &str) -> PathBuf {
    root.join(subject.to_uppercase()).join("metrics.json")
}

#[async_trait]
impl MetricsSource for LocalMetricsStore {
    async fn metric_sets(&self, subject: &str) -> Result<Vec<String>, SourceError> {
        debug!(%subject, "LocalMetricsStore::metric_sets: called");
        let mut sets: Vec<String> = self.load(subject).await?.keys().cloned().collect();
        sets.sort();
        Ok(sets)
    }

    async fn fetch(&self, subject: &str, metric_set: &str) -> Result<Value, SourceError> {
        debug!(%subject, %metric_set, "LocalMetricsStore::fetch: called");
        let mut sets = self.load(subject).await?;
        sets.remove(metric_set).ok_or_else(|| SourceError::NotFound {
            subject: subject.to_string(),
            what: format!("metric set '{}'", metric_set),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const REPORT: &str = "# Annual Report\n\nIntro.\n\n## Risk Factors\n\nSupply chain.\n\n### Currency\n\nFX exposure.\n\n## Outlook\n\nGrowth.\n";

    fn seed(root: &Path) {
        for period in ["FY2022", "FY2024", "FY2023"] {
            let dir = root.join("ACME").join(period);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("annual-report.md"), REPORT).unwrap();
        }
        std::fs::write(
            root.join("ACME").join("metrics.json"),
            r#"{"income": {"revenue": 1200}, "ratios": {"pe": 18.5}}"#,
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_list_periods_most_recent_first() {
        let temp = tempdir().unwrap();
        seed(temp.path());
        let store = LocalFilingStore::new(temp.path());

        let periods = store.list_periods("acme").await.unwrap();
        assert_eq!(periods, vec!["FY2024", "FY2023", "FY2022"]);
    }

    #[tokio::test]
    async fn test_list_periods_unknown_subject() {
        let temp = tempdir().unwrap();
        let store = LocalFilingStore::new(temp.path());
        assert!(matches!(store.list_periods("NOPE").await, Err(SourceError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_measure_and_fetch() {
        let temp = tempdir().unwrap();
        seed(temp.path());
        let store = LocalFilingStore::new(temp.path());

        let size = store.measure("ACME", "FY2024", "annual-report").await.unwrap();
        assert_eq!(size, REPORT.len());

        let full = store.fetch("ACME", "FY2024", "annual-report", None).await.unwrap();
        assert_eq!(full, REPORT);

        let missing = store.fetch("ACME", "FY2024", "quarterly-report", None).await;
        assert!(matches!(missing, Err(SourceError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_fetch_section() {
        let temp = tempdir().unwrap();
        seed(temp.path());
        let store = LocalFilingStore::new(temp.path());

        let risks = store
            .fetch("ACME", "FY2024", "annual-report", Some("risk factors"))
            .await
            .unwrap();
        assert!(risks.starts_with("## Risk Factors"));
        assert!(risks.contains("FX exposure."));
        assert!(!risks.contains("Growth."));

        let err = store
            .fetch("ACME", "FY2024", "annual-report", Some("Legal Proceedings"))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::SectionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_traversal_outside_data_dir_is_rejected() {
        let temp = tempdir().unwrap();
        let data = temp.path().join("data");
        seed(&data);
        std::fs::create_dir_all(temp.path().join("secret")).unwrap();
        std::fs::write(temp.path().join("secret").join("notes.md"), "outside").unwrap();
        let store = LocalFilingStore::new(&data);

        let err = store.fetch("ACME", "../../secret", "notes", None).await.unwrap_err();
        assert!(matches!(err, SourceError::InvalidPath { field: "period", .. }));
        let err = store.fetch("..", "secret", "notes", None).await.unwrap_err();
        assert!(matches!(err, SourceError::InvalidPath { field: "subject", .. }));
        let err = store.measure("ACME", "FY2024", "../../../secret/notes").await.unwrap_err();
        assert!(matches!(err, SourceError::InvalidPath { field: "doc_type", .. }));
        assert!(store.list_periods("../secret").await.is_err());

        let metrics = LocalMetricsStore::new(&data);
        assert!(matches!(
            metrics.fetch("../ACME", "income").await,
            Err(SourceError::InvalidPath { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_out_of_data_dir_is_rejected() {
        let temp = tempdir().unwrap();
        let data = temp.path().join("data");
        seed(&data);
        let outside = temp.path().join("outside");
        std::fs::create_dir_all(&outside).unwrap();
        std::fs::write(outside.join("notes.md"), "outside").unwrap();
        std::os::unix::fs::symlink(&outside, data.join("ACME").join("LINKED")).unwrap();
        let store = LocalFilingStore::new(&data);

        let err = store.fetch("ACME", "LINKED", "notes", None).await.unwrap_err();
        assert!(matches!(err, SourceError::InvalidPath { .. }));
    }

    #[test]
    fn test_extract_section_last_section_runs_to_end() {
        assert_eq!(extract_section(REPORT, "Outlook"), Some("## Outlook\n\nGrowth."));
        assert_eq!(extract_section(REPORT, "Currency"), Some("### Currency\n\nFX exposure."));
    }

    #[tokio::test]
    async fn test_metrics_store() {
        let temp = tempdir().unwrap();
        seed(temp.path());
        let store = LocalMetricsStore::new(temp.path());

        assert_eq!(store.metric_sets("ACME").await.unwrap(), vec!["income", "ratios"]);
        let income = store.fetch("ACME", "income").await.unwrap();
        assert_eq!(income["revenue"], 1200);
        assert!(store.fetch("ACME", "cash-flow").await.is_err());
        assert!(store.fetch("OTHER", "income").await.is_err());
    }
}
