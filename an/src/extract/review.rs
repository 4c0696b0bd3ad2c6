//! Critique and fix records from model output
//!
//! The model is asked for JSON, either fenced or between `<<<CRITIQUE>>>` /
//! `<<<FIXES>>>` markers. Prose around the payload is ignored.

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::refine::{Critique, Fix, Issue};

pub const CRITIQUE_OPEN: &str = "<<<CRITIQUE>>>";
pub const CRITIQUE_CLOSE: &str = "<<<END CRITIQUE>>>";
pub const FIXES_OPEN: &str = "<<<FIXES>>>";
pub const FIXES_CLOSE: &str = "<<<END FIXES>>>";

/// Structured output could not be recovered
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("No JSON payload found in {what} output")]
    NoPayload { what: &'static str },

    #[error("Malformed {what}: {source}")]
    Malformed {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct RawCritique {
    score: f64,
    #[serde(default)]
    issues: Vec<Issue>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFixes {
    Wrapped { fixes: Vec<Fix> },
    Bare(Vec<Fix>),
}

/// Parse a critique; the score is clamped to 0-100
pub fn parse_critique(raw: &str) -> Result<Critique, ExtractError> {
    debug!(chars = raw.len(), "parse_critique: called");
    let payload = json_payload(raw, CRITIQUE_OPEN, CRITIQUE_CLOSE).ok_or(ExtractError::NoPayload { what: "critique" })?;
    let parsed: RawCritique =
        serde_json::from_str(payload).map_err(|source| ExtractError::Malformed { what: "critique", source })?;
    Ok(Critique {
        score: parsed.score.round().clamp(0.0, 100.0) as u8,
        issues: parsed.issues,
    })
}

/// Parse fix records in emission order
pub fn parse_fixes(raw: &str) -> Result<Vec<Fix>, ExtractError> {
    debug!(chars = raw.len(), "parse_fixes: called");
    let payload = json_payload(raw, FIXES_OPEN, FIXES_CLOSE).ok_or(ExtractError::NoPayload { what: "fixes" })?;
    let parsed: RawFixes =
        serde_json::from_str(payload).map_err(|source| ExtractError::Malformed { what: "fixes", source })?;
    Ok(match parsed {
        RawFixes::Wrapped { fixes } | RawFixes::Bare(fixes) => fixes,
    })
}

/// Locate the JSON text: markers first, then the last fenced block, then
/// the outermost braces or brackets
fn json_payload<'a>(raw: &'a str, open: &str, close: &str) -> Option<&'a str> {
    if let Some(end) = raw.rfind(close)
        && let Some(start) = raw[..end].rfind(open)
    {
        let inner = raw[start + open.len()..end].trim();
        return Some(strip_fence(inner).unwrap_or(inner));
    }

    if let Some(fenced) = last_fenced_block(raw) {
        return Some(fenced);
    }

    let start = raw.find(['{', '['])?;
    let end = raw.rfind(['}', ']'])?;
    (end > start).then(|| &raw[start..=end])
}

fn strip_fence(text: &str) -> Option<&str> {
    let rest = text.strip_prefix("```")?;
    let body_start = rest.find('\n')? + 1;
    let body = rest[body_start..].trim_end().strip_suffix("```")?;
    Some(body.trim())
}

fn last_fenced_block(raw: &str) -> Option<&str> {
    let end = raw.rfind("```")?;
    let start = raw[..end].rfind("```")?;
    let block = &raw[start + 3..end];
    // Skip the info string (```json)
    let body = match block.find('\n') {
        Some(newline) => &block[newline + 1..],
        None => block,
    };
    let body = body.trim();
    body.starts_with(['{', '[']).then_some(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refine::Severity;

    #[test]
    fn test_parse_critique_fenced() {
        let raw = "Here is my review.\n```json\n{\"score\": 72.4, \"issues\": [{\"severity\": \"Critical\", \"category\": \"accuracy\", \"description\": \"Revenue misstated\", \"suggested_fix\": \"Use 1.2B\"}]}\n```\nDone.";
        let critique = parse_critique(raw).unwrap();
        assert_eq!(critique.score, 72);
        assert_eq!(critique.issues.len(), 1);
        assert_eq!(critique.issues[0].severity, Severity::Critical);
        assert_eq!(critique.issues[0].suggested_fix.as_deref(), Some("Use 1.2B"));
    }

    #[test]
    fn test_parse_critique_markers() {
        let raw = "<<<CRITIQUE>>>\n{\"score\": 140, \"issues\": []}\n<<<END CRITIQUE>>>";
        assert_eq!(parse_critique(raw).unwrap().score, 100);
    }

    #[test]
    fn test_parse_critique_bare_json() {
        let raw = "Score follows {\"score\": 88} end";
        let critique = parse_critique(raw).unwrap();
        assert_eq!(critique.score, 88);
        assert!(critique.issues.is_empty());
    }

    #[test]
    fn test_parse_critique_failures() {
        assert!(matches!(parse_critique("no json"), Err(ExtractError::NoPayload { .. })));
        assert!(matches!(
            parse_critique("{\"issues\": []}"),
            Err(ExtractError::Malformed { .. })
        ));
    }

    #[test]
    fn test_parse_fixes_wrapped_and_bare() {
        let wrapped = "<<<FIXES>>>\n```json\n{\"fixes\": [{\"find\": \"a\", \"replace\": \"b\", \"verification\": \"metrics tool\"}]}\n```\n<<<END FIXES>>>";
        let fixes = parse_fixes(wrapped).unwrap();
        assert_eq!(fixes.len(), 1);
        assert_eq!(fixes[0].verification.as_deref(), Some("metrics tool"));

        let bare = "```\n[{\"find\": \"x\", \"replace\": \"y\"}, {\"find\": \"p\", \"replace\": \"q\"}]\n```";
        let fixes = parse_fixes(bare).unwrap();
        assert_eq!(fixes.len(), 2);
        assert_eq!(fixes[1].find, "p");
        assert!(fixes[1].verification.is_none());
    }

    #[test]
    fn test_parse_fixes_empty_list() {
        assert!(parse_fixes("{\"fixes\": []}").unwrap().is_empty());
    }
}
