//! Analyst - entry point for running one analysis end to end

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::driver::ReasoningDriver;
use crate::llm::{LlmClient, UsageLedger};
use crate::planner::StagePlanner;
use crate::prompts::PromptLoader;
use crate::refine::ValidatorRefiner;
use crate::tools::builtin::TavilySearch;
use crate::tools::{FilingSource, LocalFilingStore, LocalMetricsStore, SearchSource, ToolContext, ToolRegistry};

use super::{AnalysisError, AnalysisMode, AnalysisRequest, CancelFlag, Degradation, FinalDocument};

/// Runs analyses; shareable across concurrent requests
///
/// Holds no per-request state. Every call to `analyze` owns its own
/// conversation, usage ledger and degradation list.
pub struct Analyst {
    driver: ReasoningDriver,
    filings: Arc<dyn FilingSource>,
    prompts: PromptLoader,
    config: Config,
}

impl Analyst {
    pub fn new(driver: ReasoningDriver, filings: Arc<dyn FilingSource>, prompts: PromptLoader, config: Config) -> Self {
        debug!("Analyst::new: called");
        Self {
            driver,
            filings,
            prompts,
            config,
        }
    }

    /// Wire the standard tools to the local data directory
    ///
    /// Web search is registered only when `TAVILY_API_KEY` is set.
    pub fn from_config(config: Config, llm: Arc<dyn LlmClient>, prompts: PromptLoader) -> Self {
        debug!(data_dir = %config.tools.data_dir.display(), "Analyst::from_config: called");
        let filings: Arc<dyn FilingSource> = Arc::new(LocalFilingStore::new(&config.tools.data_dir));
        let metrics = Arc::new(LocalMetricsStore::new(&config.tools.data_dir));
        let search = TavilySearch::from_env().map(|s| Arc::new(s) as Arc<dyn SearchSource>);
        if search.is_none() {
            info!("TAVILY_API_KEY not set; web search disabled");
        }
        let registry = ToolRegistry::standard(filings.clone(), metrics, search)
            .with_max_output_chars(config.tools.max_output_chars);
        let driver = ReasoningDriver::new(llm, Arc::new(registry), &config);
        Self::new(driver, filings, prompts, config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        self.driver.tools()
    }

    /// Run every stage of `request` and, in standard mode, refinement
    pub async fn analyze(&self, request: &AnalysisRequest, cancel: &CancelFlag) -> Result<FinalDocument, AnalysisError> {
        let request_id = Uuid::now_v7().to_string();
        info!(%request_id, subject = %request.subject, depth = request.depth, mode = %request.mode, "Starting analysis");
        let ctx = ToolContext::new(request_id.clone(), request.subject.clone());
        let mut ledger = UsageLedger::new();

        let mut planner = StagePlanner::new(&self.driver, self.filings.as_ref(), &self.prompts, &self.config, cancel);
        let plan = planner.run(request, &ctx, &mut ledger).await?;
        let mut degradations = plan.degradations;

        let refine = request.mode == AnalysisMode::Standard && self.config.refine.max_cycles > 0;
        let (text, fields, refinement) = if refine && cancel.is_cancelled() {
            warn!(%request_id, "Cancelled before review; returning unreviewed synthesis");
            degradations.push(Degradation::RefinementDegraded {
                cycle: 0,
                reason: "cancelled before review".to_string(),
            });
            (plan.synthesis, plan.fields, None)
        } else if refine {
            let refiner = ValidatorRefiner::new(&self.driver, &self.prompts, &self.config.refine);
            let outcome = refiner
                .refine(&plan.system_prompt, plan.synthesis, plan.fields, &ctx, &mut ledger)
                .await;
            degradations.extend(outcome.degradations.iter().cloned());
            (outcome.document.clone(), outcome.fields.clone(), Some(outcome))
        } else {
            (plan.synthesis, plan.fields, None)
        };

        let total = ledger.total();
        info!(
            %request_id,
            subject = %request.subject,
            calls = ledger.calls(),
            input_tokens = total.input_tokens,
            output_tokens = total.output_tokens,
            degradations = degradations.len(),
            "Analysis complete"
        );

        Ok(FinalDocument {
            request_id,
            subject: request.subject.clone(),
            text,
            critique_section: refinement.as_ref().map(|r| r.critique_section()),
            fields,
            degradations,
            periods: plan.periods,
            transitions: plan.transitions,
            refinement,
            usage: ledger,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{CRITIQUE_CLOSE, CRITIQUE_OPEN, Decision};
    use crate::llm::client::mock::MockLlmClient;
    use crate::planner::PlannerState;
    use tempfile::TempDir;

    const SYNTHESIS: &str = "# ACME\n\nRecommendation: HOLD\nConfidence: 70%\n";

    fn analyst(client: Arc<MockLlmClient>) -> (TempDir, Analyst) {
        let dir = tempfile::tempdir().unwrap();
        let period_dir = dir.path().join("ACME").join("FY2024");
        std::fs::create_dir_all(&period_dir).unwrap();
        std::fs::write(period_dir.join("annual-report.md"), "# Annual report\n").unwrap();

        let mut config = Config::default();
        config.tools.data_dir = dir.path().to_path_buf();
        let llm: Arc<dyn LlmClient> = client;
        let analyst = Analyst::from_config(config, llm, PromptLoader::embedded_only());
        (dir, analyst)
    }

    fn accepted_critique() -> crate::llm::CompletionResponse {
        MockLlmClient::text(&format!(
            "{}\n{{\"score\": 88, \"issues\": []}}\n{}",
            CRITIQUE_OPEN, CRITIQUE_CLOSE
        ))
    }

    #[test]
    fn test_analyst_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Analyst>();
    }

    #[tokio::test]
    async fn test_quick_mode_skips_review() {
        let client = Arc::new(MockLlmClient::new(vec![
            MockLlmClient::text("Current analysis."),
            MockLlmClient::text(SYNTHESIS),
        ]));
        let (_dir, analyst) = analyst(client.clone());
        let request = AnalysisRequest::new("ACME", 1, AnalysisMode::Quick);

        let doc = analyst.analyze(&request, &CancelFlag::new()).await.unwrap();
        assert!(doc.critique_section.is_none());
        assert!(doc.refinement.is_none());
        assert_eq!(doc.fields.decision, Some(Decision::Hold));
        assert_eq!(client.call_count(), 2);
        assert_eq!(doc.usage.calls(), 2);
        assert_eq!(doc.transitions.last().map(|t| t.to), Some(PlannerState::Done));
    }

    #[tokio::test]
    async fn test_standard_mode_appends_review() {
        let client = Arc::new(MockLlmClient::new(vec![
            MockLlmClient::text("Current analysis."),
            MockLlmClient::text(SYNTHESIS),
            accepted_critique(),
        ]));
        let (_dir, analyst) = analyst(client.clone());
        let request = AnalysisRequest::new("ACME", 1, AnalysisMode::Standard);

        let doc = analyst.analyze(&request, &CancelFlag::new()).await.unwrap();
        let rendered = doc.render();
        assert!(rendered.starts_with("# ACME"));
        assert!(rendered.contains("Latest score: 88/100"));
        assert_eq!(doc.refinement.as_ref().map(|r| r.fix_passes), Some(0));
        assert!(doc.usage.stage("critique:1").is_some());
    }

    #[tokio::test]
    async fn test_standard_tools_are_registered() {
        let client = Arc::new(MockLlmClient::new(vec![]));
        let (_dir, analyst) = analyst(client);
        assert!(analyst.tools().has_tool("filing"));
        assert!(analyst.tools().has_tool("metrics"));
        assert!(analyst.tools().has_tool("valuation"));
    }
}
