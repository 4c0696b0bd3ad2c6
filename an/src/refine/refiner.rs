//! ValidatorRefiner - bounded critique and correction cycles

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::analysis::Degradation;
use crate::config::RefineConfig;
use crate::driver::{Invocation, ReasoningDriver};
use crate::extract::{CRITIQUE_CLOSE, CRITIQUE_OPEN, DecisionFields, FIXES_CLOSE, FIXES_OPEN, parse_critique, parse_fixes};
use crate::llm::UsageLedger;
use crate::prompts::PromptLoader;
use crate::tools::ToolContext;

use super::{Critique, Fix, Issue, apply_fixes};

/// What refinement did to a document
#[derive(Debug, Clone, Serialize)]
pub struct RefineOutcome {
    /// Document after every applied fix
    pub document: String,

    /// Decision fields, refined values merged over the originals
    pub fields: DecisionFields,

    /// Most recent successful critique
    pub critique: Option<Critique>,

    /// Critique passes completed
    pub cycles: u32,

    pub fix_passes: u32,
    pub applied: usize,
    pub skipped: usize,
    pub degradations: Vec<Degradation>,
}

impl RefineOutcome {
    fn unrefined(document: String, fields: DecisionFields) -> Self {
        Self {
            document,
            fields,
            critique: None,
            cycles: 0,
            fix_passes: 0,
            applied: 0,
            skipped: 0,
            degradations: Vec::new(),
        }
    }

    /// Markdown review section for the final document
    pub fn critique_section(&self) -> String {
        let mut out = String::from("## Review\n\n");
        match &self.critique {
            Some(critique) => out.push_str(&format!("Latest score: {}/100\n", critique.score)),
            None => out.push_str("Latest score: not available\n"),
        }
        out.push_str(&format!(
            "Review cycles: {}; fix passes: {}; fixes applied: {}; fixes skipped: {}\n",
            self.cycles, self.fix_passes, self.applied, self.skipped
        ));

        if let Some(critique) = &self.critique
            && !critique.issues.is_empty()
        {
            out.push_str("\nOutstanding issues at last review:\n\n");
            for issue in &critique.issues {
                if issue.category.is_empty() {
                    out.push_str(&format!("- [{}] {}\n", issue.severity, issue.description));
                } else {
                    out.push_str(&format!("- [{}] {}: {}\n", issue.severity, issue.category, issue.description));
                }
            }
        }
        out
    }
}

/// Critiques a synthesized document and patches it by exact substitution
pub struct ValidatorRefiner<'a> {
    driver: &'a ReasoningDriver,
    prompts: &'a PromptLoader,
    config: &'a RefineConfig,
}

impl<'a> ValidatorRefiner<'a> {
    pub fn new(driver: &'a ReasoningDriver, prompts: &'a PromptLoader, config: &'a RefineConfig) -> Self {
        Self {
            driver,
            prompts,
            config,
        }
    }

    /// Run up to `max_cycles` critique and fix cycles
    ///
    /// Never fails: a failed pass is recorded as a degradation and the
    /// document as it stood before that pass is kept.
    pub async fn refine(
        &self,
        system_prompt: &str,
        document: String,
        fields: DecisionFields,
        ctx: &ToolContext,
        ledger: &mut UsageLedger,
    ) -> RefineOutcome {
        debug!(subject = %ctx.subject, max_cycles = self.config.max_cycles, "ValidatorRefiner::refine: called");
        let mut outcome = RefineOutcome::unrefined(document, fields);

        for cycle in 1..=self.config.max_cycles {
            let critique = match self.critique_pass(cycle, system_prompt, &outcome.document, ctx, ledger).await {
                Ok(critique) => critique,
                Err(reason) => {
                    warn!(%cycle, %reason, "Critique pass failed; keeping document");
                    outcome.degradations.push(Degradation::RefinementDegraded { cycle, reason });
                    break;
                }
            };
            outcome.cycles = cycle;
            info!(%cycle, score = critique.score, issues = critique.issues.len(), "Critique complete");

            if !critique.needs_correction(self.config.acceptance_score) {
                debug!(%cycle, "ValidatorRefiner::refine: accepted");
                outcome.critique = Some(critique);
                break;
            }

            let fixable: Vec<_> = critique.fixable(self.config.min_fix_severity).into_iter().cloned().collect();
            outcome.critique = Some(critique);
            if fixable.is_empty() {
                debug!(%cycle, "ValidatorRefiner::refine: nothing at or above fix severity");
                break;
            }

            outcome.fix_passes += 1;
            let fixes = match self.fix_pass(cycle, system_prompt, &outcome.document, &fixable, ctx, ledger).await {
                Ok(fixes) => fixes,
                Err(reason) => {
                    warn!(%cycle, %reason, "Fix pass failed; keeping pre-correction document");
                    outcome.degradations.push(Degradation::RefinementDegraded { cycle, reason });
                    break;
                }
            };

            let patched = apply_fixes(&outcome.document, &fixes);
            outcome.applied += patched.applied;
            outcome.skipped += patched.skipped;
            info!(%cycle, applied = patched.applied, skipped = patched.skipped, "Fixes applied");

            if patched.applied == 0 {
                debug!(%cycle, "ValidatorRefiner::refine: no fix applied, stopping");
                break;
            }

            outcome.document = patched.document;
            let refined = DecisionFields::extract(&outcome.document);
            outcome.fields.merge_non_null(&refined);
        }

        outcome
    }

    async fn critique_pass(
        &self,
        cycle: u32,
        system_prompt: &str,
        document: &str,
        ctx: &ToolContext,
        ledger: &mut UsageLedger,
    ) -> Result<Critique, String> {
        debug!(%cycle, "ValidatorRefiner::critique_pass: called");
        let prompt = self
            .prompts
            .render(
                "critique",
                &json!({
                    "subject": ctx.subject,
                    "acceptance_score": self.config.acceptance_score,
                    "critique_open": CRITIQUE_OPEN,
                    "critique_close": CRITIQUE_CLOSE,
                    "document": document,
                }),
            )
            .map_err(|e| e.to_string())?;

        let invocation = Invocation {
            stage: format!("critique:{}", cycle),
            system_prompt: system_prompt.to_string(),
            first_message: prompt,
            tool_names: Vec::new(),
            max_iterations: self.config.max_iterations,
        };
        let turn = self
            .driver
            .run(&invocation, ctx, ledger)
            .await
            .map_err(|e| format!("critique pass: {}", e))?;
        parse_critique(&turn.text).map_err(|e| format!("critique pass: {}", e))
    }

    async fn fix_pass(
        &self,
        cycle: u32,
        system_prompt: &str,
        document: &str,
        issues: &[Issue],
        ctx: &ToolContext,
        ledger: &mut UsageLedger,
    ) -> Result<Vec<Fix>, String> {
        debug!(%cycle, issues = issues.len(), "ValidatorRefiner::fix_pass: called");
        let prompt = self
            .prompts
            .render(
                "fix",
                &json!({
                    "subject": ctx.subject,
                    "issues": issues,
                    "fixes_open": FIXES_OPEN,
                    "fixes_close": FIXES_CLOSE,
                    "document": document,
                }),
            )
            .map_err(|e| e.to_string())?;

        let invocation = Invocation {
            stage: format!("fix:{}", cycle),
            system_prompt: system_prompt.to_string(),
            first_message: prompt,
            tool_names: self.driver.tools().tool_names(),
            max_iterations: self.config.max_iterations,
        };
        let turn = self
            .driver
            .run(&invocation, ctx, ledger)
            .await
            .map_err(|e| format!("fix pass: {}", e))?;
        parse_fixes(&turn.text).map_err(|e| format!("fix pass: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::extract::Decision;
    use crate::llm::client::mock::MockLlmClient;
    use crate::llm::{CompletionResponse, LlmClient};
    use crate::refine::Severity;
    use crate::tools::ToolRegistry;
    use crate::tools::builtin::ValuationTool;
    use std::sync::Arc;

    const DOCUMENT: &str = "# ACME\n\nRevenue was $1.1B in FY2024.\n\nRecommendation: HOLD\nConfidence: 60%\nPrice Target: $120\n";

    fn driver(client: Arc<MockLlmClient>) -> ReasoningDriver {
        let mut registry = ToolRegistry::empty();
        registry.add_tool(Box::new(ValuationTool));
        let client: Arc<dyn LlmClient> = client;
        ReasoningDriver::new(client, Arc::new(registry), &Config::default())
    }

    fn critique(score: u8, severity: &str) -> CompletionResponse {
        MockLlmClient::text(&format!(
            "{}\n{{\"score\": {}, \"issues\": [{{\"severity\": \"{}\", \"category\": \"accuracy\", \"description\": \"Revenue figure is wrong\"}}]}}\n{}",
            CRITIQUE_OPEN, score, severity, CRITIQUE_CLOSE
        ))
    }

    fn fixes(pairs: &[(&str, &str)]) -> CompletionResponse {
        let fixes: Vec<_> = pairs.iter().map(|(f, r)| json!({"find": f, "replace": r})).collect();
        MockLlmClient::text(&format!("{}\n{}\n{}", FIXES_OPEN, json!({"fixes": fixes}), FIXES_CLOSE))
    }

    async fn run(client: Arc<MockLlmClient>, config: &RefineConfig) -> RefineOutcome {
        let driver = driver(client);
        let prompts = PromptLoader::embedded_only();
        let refiner = ValidatorRefiner::new(&driver, &prompts, config);
        let mut ledger = UsageLedger::new();
        refiner
            .refine(
                "system",
                DOCUMENT.to_string(),
                DecisionFields::extract(DOCUMENT),
                &ToolContext::new("req", "ACME"),
                &mut ledger,
            )
            .await
    }

    #[tokio::test]
    async fn test_accepted_document_needs_no_fix_pass() {
        let client = Arc::new(MockLlmClient::new(vec![critique(90, "minor")]));
        let outcome = run(client.clone(), &RefineConfig::default()).await;

        assert_eq!(outcome.cycles, 1);
        assert_eq!(outcome.fix_passes, 0);
        assert_eq!(outcome.document, DOCUMENT);
        assert_eq!(client.call_count(), 1);
        assert!(client.requests()[0].tools.is_empty());
    }

    #[tokio::test]
    async fn test_critical_issue_is_fixed_and_fields_merged() {
        let client = Arc::new(MockLlmClient::new(vec![
            critique(95, "critical"),
            fixes(&[("$1.1B", "$1.2B"), ("Recommendation: HOLD", "Recommendation: BUY")]),
            critique(92, "minor"),
        ]));
        let outcome = run(client.clone(), &RefineConfig::default()).await;

        assert_eq!(outcome.cycles, 2);
        assert_eq!(outcome.fix_passes, 1);
        assert_eq!(outcome.applied, 2);
        assert!(outcome.document.contains("Revenue was $1.2B"));
        assert_eq!(outcome.fields.decision, Some(Decision::Buy));
        assert_eq!(outcome.fields.numbers.get("price_target"), Some(&120.0));
        assert_eq!(outcome.critique.as_ref().map(|c| c.score), Some(92));
        assert!(!client.requests()[1].tools.is_empty());
    }

    #[tokio::test]
    async fn test_zero_applied_fixes_ends_refinement() {
        let client = Arc::new(MockLlmClient::new(vec![critique(50, "important"), fixes(&[("not there", "x")])]));
        let outcome = run(client.clone(), &RefineConfig::default()).await;

        assert_eq!(outcome.cycles, 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.document, DOCUMENT);
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn test_unparseable_critique_degrades() {
        let client = Arc::new(MockLlmClient::new(vec![MockLlmClient::text("Looks fine to me.")]));
        let outcome = run(client, &RefineConfig::default()).await;

        assert_eq!(outcome.cycles, 0);
        assert!(outcome.critique.is_none());
        assert!(matches!(outcome.degradations[0], Degradation::RefinementDegraded { cycle: 1, .. }));
        assert_eq!(outcome.document, DOCUMENT);
    }

    #[tokio::test]
    async fn test_fix_pass_failure_keeps_document() {
        // Critique succeeds, then the provider has nothing left to give
        let client = Arc::new(MockLlmClient::new(vec![critique(40, "critical")]));
        let outcome = run(client, &RefineConfig::default()).await;

        assert_eq!(outcome.fix_passes, 1);
        assert_eq!(outcome.document, DOCUMENT);
        assert_eq!(outcome.fields.decision, Some(Decision::Hold));
        assert_eq!(outcome.degradations.len(), 1);
    }

    #[tokio::test]
    async fn test_minor_issues_below_fix_severity_are_not_fixed() {
        let client = Arc::new(MockLlmClient::new(vec![critique(60, "minor")]));
        let outcome = run(client.clone(), &RefineConfig::default()).await;
        assert_eq!(outcome.fix_passes, 0);
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cycles_are_bounded() {
        let client = Arc::new(MockLlmClient::new(vec![
            critique(50, "critical"),
            fixes(&[("$1.1B", "$1.2B")]),
            critique(50, "critical"),
            fixes(&[("$1.2B", "$1.3B")]),
        ]));
        let config = RefineConfig {
            max_cycles: 2,
            ..Default::default()
        };
        let outcome = run(client.clone(), &config).await;
        assert_eq!(outcome.cycles, 2);
        assert_eq!(outcome.fix_passes, 2);
        assert_eq!(client.call_count(), 4);
        assert!(outcome.document.contains("$1.3B"));
    }

    #[test]
    fn test_critique_section_lists_counts_and_issues() {
        let mut outcome = RefineOutcome::unrefined(DOCUMENT.to_string(), DecisionFields::default());
        outcome.cycles = 2;
        outcome.fix_passes = 1;
        outcome.applied = 2;
        outcome.skipped = 1;
        outcome.critique = Some(Critique {
            score: 85,
            issues: vec![Issue {
                severity: Severity::Minor,
                category: "style".to_string(),
                description: "Long paragraphs".to_string(),
                suggested_fix: None,
            }],
        });
        let section = outcome.critique_section();
        assert!(section.starts_with("## Review"));
        assert!(section.contains("Latest score: 85/100"));
        assert!(section.contains("fixes applied: 2; fixes skipped: 1"));
        assert!(section.contains("- [minor] style: Long paragraphs"));
    }
}
