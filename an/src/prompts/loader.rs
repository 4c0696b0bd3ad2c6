//! Template lookup and rendering
//!
//! Stage templates resolve from override directories before the embedded set.

use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use super::embedded;

/// Resolves stage templates and renders them with Handlebars
pub struct PromptLoader {
    hbs: Handlebars<'static>,
    /// User override directory (e.g., `.analyst/prompts/`)
    user_dir: Option<PathBuf>,
    /// Checked after `user_dir`, normally `prompts/`
    repo_dir: Option<PathBuf>,
}

fn engine() -> Handlebars<'static> {
    let mut hbs = Handlebars::new();
    // Prompts are plain text; markers like <<<SUMMARY>>> must survive
    hbs.register_escape_fn(handlebars::no_escape);
    hbs
}

impl PromptLoader {
    /// Create a new prompt loader rooted at `base`
    ///
    /// Looks for `.analyst/prompts/` and `prompts/` under `base`.
    pub fn new(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        debug!(?base, "PromptLoader::new: called");
        let user_dir = base.join(".analyst/prompts");
        let repo_dir = base.join("prompts");

        let user_dir_exists = user_dir.is_dir();
        let repo_dir_exists = repo_dir.is_dir();
        debug!(?user_dir, %user_dir_exists, ?repo_dir, %repo_dir_exists, "PromptLoader::new: checking directories");

        Self {
            hbs: engine(),
            user_dir: user_dir_exists.then_some(user_dir),
            repo_dir: repo_dir_exists.then_some(repo_dir),
        }
    }

    /// Create a loader that only uses embedded prompts
    pub fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        Self {
            hbs: engine(),
            user_dir: None,
            repo_dir: None,
        }
    }

    /// Source text of `name`, first match wins: `.analyst/prompts/`,
    /// then `prompts/`, then the embedded copy
    pub fn load_template(&self, name: &str) -> Result<String> {
        debug!(%name, "PromptLoader::load_template: called");
        for dir in [&self.user_dir, &self.repo_dir].into_iter().flatten() {
            let path = dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found override");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read prompt {}: {}", path.display(), e));
            }
        }

        if let Some(content) = embedded::get_embedded(name) {
            debug!(%name, "PromptLoader::load_template: using embedded");
            return Ok(content.to_string());
        }

        debug!(%name, "PromptLoader::load_template: not found anywhere");
        Err(eyre!("Prompt template not found: {}", name))
    }

    pub fn render<T: Serialize>(&self, template_name: &str, context: &T) -> Result<String> {
        debug!(%template_name, "PromptLoader::render: called");
        let template = self.load_template(template_name)?;
        self.hbs
            .render_template(&template, context)
            .map_err(|e| eyre!("Failed to render template {}: {}", template_name, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_render_embedded_keeps_markers() {
        let loader = PromptLoader::embedded_only();
        let rendered = loader
            .render(
                "prior-period",
                &serde_json::json!({
                    "subject": "ACME",
                    "current_period": "FY2024",
                    "period": "FY2022",
                    "doc_type": "annual-report",
                    "summary_ceiling": 15000,
                    "summary_open": "<<<SUMMARY:FY2022>>>",
                    "summary_close": "<<<END SUMMARY:FY2022>>>",
                    "metrics_open": "<<<METRICS:FY2022>>>",
                    "metrics_close": "<<<END METRICS:FY2022>>>",
                }),
            )
            .unwrap();
        assert!(rendered.contains("<<<SUMMARY:FY2022>>>"));
        assert!(rendered.contains("FY2024"));
        assert!(rendered.contains("15000"));
    }

    #[test]
    fn test_missing_variable_renders_empty() {
        let loader = PromptLoader::embedded_only();
        let rendered = loader.render("system", &serde_json::json!({})).unwrap();
        assert!(rendered.contains("investment analysis of ."));
    }

    #[test]
    fn test_unknown_template_is_error() {
        let loader = PromptLoader::embedded_only();
        assert!(loader.load_template("nonexistent-template").is_err());
        assert!(loader.render("nonexistent-template", &serde_json::json!({})).is_err());
    }

    #[test]
    fn test_override_precedence() {
        let temp = tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join(".analyst/prompts")).unwrap();
        std::fs::create_dir_all(temp.path().join("prompts")).unwrap();
        std::fs::write(temp.path().join("prompts/system.pmt"), "repo {{subject}}").unwrap();
        std::fs::write(temp.path().join("prompts/fix.pmt"), "repo fix").unwrap();
        std::fs::write(temp.path().join(".analyst/prompts/system.pmt"), "user {{subject}}").unwrap();

        let loader = PromptLoader::new(temp.path());
        let system = loader.render("system", &serde_json::json!({"subject": "ACME"})).unwrap();
        assert_eq!(system, "user ACME");
        assert_eq!(loader.load_template("fix").unwrap(), "repo fix");
        assert!(loader.load_template("critique").unwrap().contains("Score the document"));
    }
}
