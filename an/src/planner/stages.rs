//! StagePlanner - current period, prior periods, synthesis

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::analysis::{AnalysisError, AnalysisRequest, CancelFlag, Degradation, StageFailure};
use crate::config::Config;
use crate::driver::{Invocation, ReasoningDriver};
use crate::extract::{DecisionFields, SummaryMarkers, extract};
use crate::llm::UsageLedger;
use crate::prompts::PromptLoader;
use crate::tools::{FilingSource, ToolContext};

use super::{Period, PlannerState, StageResult, Strategy, Transition};

/// Stage label for failures before the current period is known
const CURRENT_STAGE: &str = "current";
const SYNTHESIS_STAGE: &str = "synthesis";

/// Everything the planner produced for one request
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    /// System prompt shared by every stage, reused for refinement
    pub system_prompt: String,

    /// Periods covered, most recent first
    pub periods: Vec<Period>,

    pub current: StageResult,
    pub priors: Vec<StageResult>,

    /// Synthesized document text
    pub synthesis: String,

    pub fields: DecisionFields,
    pub degradations: Vec<Degradation>,
    pub transitions: Vec<Transition>,
}

#[derive(Serialize)]
struct PriorSummary<'a> {
    period: &'a str,
    summary: &'a str,
}

/// Runs the stages of one analysis strictly in sequence
pub struct StagePlanner<'a> {
    driver: &'a ReasoningDriver,
    filings: &'a dyn FilingSource,
    prompts: &'a PromptLoader,
    config: &'a Config,
    cancel: &'a CancelFlag,
    state: PlannerState,
    transitions: Vec<Transition>,
}

impl<'a> StagePlanner<'a> {
    pub fn new(
        driver: &'a ReasoningDriver,
        filings: &'a dyn FilingSource,
        prompts: &'a PromptLoader,
        config: &'a Config,
        cancel: &'a CancelFlag,
    ) -> Self {
        Self {
            driver,
            filings,
            prompts,
            config,
            cancel,
            state: PlannerState::NotStarted,
            transitions: Vec::new(),
        }
    }

    pub fn state(&self) -> PlannerState {
        self.state
    }

    /// State changes so far, in order
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    fn advance(&mut self, to: PlannerState) {
        info!(from = %self.state, %to, "Planner state change");
        self.transitions.push(Transition { from: self.state, to });
        self.state = to;
    }

    fn check_cancelled(&self, next: PlannerState) -> Result<(), AnalysisError> {
        if self.cancel.is_cancelled() {
            warn!(state = %self.state, %next, "Analysis cancelled");
            return Err(AnalysisError::Cancelled { next });
        }
        Ok(())
    }

    fn render<T: Serialize>(&self, template: &str, context: &T) -> Result<String, StageFailure> {
        self.prompts
            .render(template, context)
            .map_err(|e| StageFailure::Prompt(e.to_string()))
    }

    /// Run every stage of `request`
    pub async fn run(
        &mut self,
        request: &AnalysisRequest,
        ctx: &ToolContext,
        ledger: &mut UsageLedger,
    ) -> Result<PlanOutcome, AnalysisError> {
        debug!(subject = %request.subject, depth = request.depth, mode = %request.mode, "StagePlanner::run: called");
        if request.depth == 0 {
            return Err(AnalysisError::InvalidRequest("depth must be at least 1".to_string()));
        }
        let mut degradations = Vec::new();

        self.check_cancelled(PlannerState::CurrentPeriod)?;
        self.advance(PlannerState::CurrentPeriod);

        let mut ids = self
            .filings
            .list_periods(&request.subject)
            .await
            .map_err(|e| AnalysisError::stage(CURRENT_STAGE, e))?;
        if ids.is_empty() {
            return Err(AnalysisError::NoPeriods {
                subject: request.subject.clone(),
            });
        }
        ids.truncate(request.depth);
        for position in ids.len() + 1..=request.depth {
            warn!(subject = %request.subject, %position, depth = request.depth, "Requested period not available");
            degradations.push(Degradation::MissingPeriod {
                position,
                depth: request.depth,
            });
        }

        let system_prompt = self
            .render(
                "system",
                &json!({
                    "subject": request.subject,
                    "as_of": chrono::Local::now().format("%Y-%m-%d").to_string(),
                }),
            )
            .map_err(|e| AnalysisError::stage(CURRENT_STAGE, e))?;

        let (current_period, current) = self
            .current_period(&request.subject, &ids[0], &system_prompt, ctx, ledger, &mut degradations)
            .await?;
        let mut periods = vec![current_period];

        let mut priors = Vec::new();
        if ids.len() > 1 {
            self.check_cancelled(PlannerState::PriorPeriods)?;
            self.advance(PlannerState::PriorPeriods);
            for id in &ids[1..] {
                self.check_cancelled(PlannerState::PriorPeriods)?;
                periods.push(Period {
                    id: id.clone(),
                    measured_size: None,
                    strategy: Strategy::Compressed,
                });
                match self
                    .prior_period(&request.subject, &ids[0], id, &system_prompt, ctx, ledger, &mut degradations)
                    .await
                {
                    Ok(result) => priors.push(result),
                    Err(reason) => {
                        warn!(period = %id, %reason, "Prior period failed; continuing without it");
                        degradations.push(Degradation::PriorPeriodFailed {
                            period: id.clone(),
                            reason,
                        });
                    }
                }
            }
        }

        self.check_cancelled(PlannerState::Synthesis)?;
        self.advance(PlannerState::Synthesis);
        let synthesis = self
            .synthesis(&request.subject, &current, &priors, &degradations, &system_prompt, ctx, ledger)
            .await
            .map_err(|e| AnalysisError::stage(SYNTHESIS_STAGE, e))?;
        let fields = DecisionFields::extract(&synthesis);
        self.advance(PlannerState::Done);

        Ok(PlanOutcome {
            system_prompt,
            periods,
            current,
            priors,
            synthesis,
            fields,
            degradations,
            transitions: self.transitions.clone(),
        })
    }

    async fn current_period(
        &self,
        subject: &str,
        period: &str,
        system_prompt: &str,
        ctx: &ToolContext,
        ledger: &mut UsageLedger,
        degradations: &mut Vec<Degradation>,
    ) -> Result<(Period, StageResult), AnalysisError> {
        let stage = format!("current:{}", period);
        let doc_type = &self.config.planner.primary_document;
        debug!(%subject, %period, %doc_type, "StagePlanner::current_period: called");

        let measured_size = self
            .filings
            .measure(subject, period, doc_type)
            .await
            .map_err(|e| AnalysisError::stage(&stage, e))?;
        let strategy = Strategy::for_size(measured_size, self.config.planner.large_document_threshold);
        info!(%period, %measured_size, %strategy, "Current period strategy chosen");

        let markers = SummaryMarkers::for_period(period);
        let template = match strategy {
            Strategy::Full => "current-full",
            Strategy::Compressed => "current-compressed",
        };
        let prompt = self
            .render(
                template,
                &json!({
                    "subject": subject,
                    "period": period,
                    "doc_type": doc_type,
                    "source_size": measured_size,
                    "summary_ceiling": self.config.planner.summary_ceiling,
                    "summary_open": markers.summary_open(),
                    "summary_close": markers.summary_close(),
                    "metrics_open": markers.metrics_open(),
                    "metrics_close": markers.metrics_close(),
                }),
            )
            .map_err(|e| AnalysisError::stage(&stage, e))?;

        let invocation = Invocation {
            stage: stage.clone(),
            system_prompt: system_prompt.to_string(),
            first_message: prompt,
            tool_names: self.driver.tools().tool_names(),
            max_iterations: self.config.driver.max_iterations,
        };
        let turn = self
            .driver
            .run(&invocation, ctx, ledger)
            .await
            .map_err(|e| AnalysisError::stage(&stage, e))?;

        let extraction = extract(&turn.text, &markers);
        let summary = match strategy {
            Strategy::Full => turn.text,
            Strategy::Compressed => {
                let bounded = extraction.clone().bounded(self.config.planner.summary_ceiling);
                if bounded.fallback {
                    degradations.push(Degradation::ExtractionFallback { stage: stage.clone() });
                }
                bounded.summary
            }
        };

        let period = Period {
            id: period.to_string(),
            measured_size: Some(measured_size),
            strategy,
        };
        let result = StageResult {
            period: period.id.clone(),
            summary,
            metrics: extraction.metrics,
            usage: turn.usage,
        };
        Ok((period, result))
    }

    #[allow(clippy::too_many_arguments)]
    async fn prior_period(
        &self,
        subject: &str,
        current_period: &str,
        period: &str,
        system_prompt: &str,
        ctx: &ToolContext,
        ledger: &mut UsageLedger,
        degradations: &mut Vec<Degradation>,
    ) -> Result<StageResult, String> {
        let stage = format!("prior:{}", period);
        debug!(%subject, %period, "StagePlanner::prior_period: called");

        let markers = SummaryMarkers::for_period(period);
        let prompt = self
            .render(
                "prior-period",
                &json!({
                    "subject": subject,
                    "current_period": current_period,
                    "period": period,
                    "doc_type": self.config.planner.primary_document,
                    "summary_ceiling": self.config.planner.summary_ceiling,
                    "summary_open": markers.summary_open(),
                    "summary_close": markers.summary_close(),
                    "metrics_open": markers.metrics_open(),
                    "metrics_close": markers.metrics_close(),
                }),
            )
            .map_err(|e| e.to_string())?;

        let invocation = Invocation {
            stage: stage.clone(),
            system_prompt: system_prompt.to_string(),
            first_message: prompt,
            tool_names: self.driver.tools().tool_names(),
            max_iterations: self.config.planner.prior_max_iterations,
        };
        let turn = self
            .driver
            .run(&invocation, ctx, ledger)
            .await
            .map_err(|e| e.to_string())?;

        let extraction = extract(&turn.text, &markers).bounded(self.config.planner.summary_ceiling);
        if extraction.fallback {
            degradations.push(Degradation::ExtractionFallback { stage });
        }
        Ok(StageResult {
            period: period.to_string(),
            summary: extraction.summary,
            metrics: extraction.metrics,
            usage: turn.usage,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn synthesis(
        &self,
        subject: &str,
        current: &StageResult,
        priors: &[StageResult],
        degradations: &[Degradation],
        system_prompt: &str,
        ctx: &ToolContext,
        ledger: &mut UsageLedger,
    ) -> Result<String, StageFailure> {
        debug!(%subject, priors = priors.len(), "StagePlanner::synthesis: called");
        let prior_summaries: Vec<PriorSummary> = priors
            .iter()
            .map(|p| PriorSummary {
                period: &p.period,
                summary: &p.summary,
            })
            .collect();
        let notes: Vec<String> = degradations.iter().map(ToString::to_string).collect();

        let prompt = self.render(
            "synthesis",
            &json!({
                "subject": subject,
                "current_period": current.period,
                "current_analysis": current.summary,
                "priors": prior_summaries,
                "notes": notes,
            }),
        )?;

        let invocation = Invocation {
            stage: SYNTHESIS_STAGE.to_string(),
            system_prompt: system_prompt.to_string(),
            first_message: prompt,
            tool_names: self.driver.tools().tool_names(),
            max_iterations: self.config.driver.max_iterations,
        };
        let turn = self.driver.run(&invocation, ctx, ledger).await?;
        Ok(turn.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisMode;
    use crate::extract::Decision;
    use crate::llm::client::mock::MockLlmClient;
    use crate::llm::{LlmClient, LlmError};
    use crate::tools::{LocalFilingStore, ToolRegistry};
    use std::sync::Arc;
    use tempfile::TempDir;

    const SYNTHESIS: &str = "# ACME\n\nRecommendation: BUY\nConfidence: High\nPrice Target: $150\n";

    fn filings(periods: &[(&str, usize)]) -> (TempDir, LocalFilingStore) {
        let dir = tempfile::tempdir().unwrap();
        for (period, size) in periods {
            let period_dir = dir.path().join("ACME").join(period);
            std::fs::create_dir_all(&period_dir).unwrap();
            std::fs::write(period_dir.join("annual-report.md"), "x".repeat(*size)).unwrap();
        }
        let store = LocalFilingStore::new(dir.path());
        (dir, store)
    }

    fn driver(client: Arc<MockLlmClient>) -> ReasoningDriver {
        let client: Arc<dyn LlmClient> = client;
        ReasoningDriver::new(client, Arc::new(ToolRegistry::empty()), &Config::default())
    }

    fn summary_reply(period: &str, summary: &str) -> String {
        let markers = SummaryMarkers::for_period(period);
        format!(
            "Analysis...\n{}\n{}\n{}\n{}\nRevenue: $1.2B\n{}\n",
            markers.summary_open(),
            summary,
            markers.summary_close(),
            markers.metrics_open(),
            markers.metrics_close()
        )
    }

    async fn plan(
        client: Arc<MockLlmClient>,
        store: &LocalFilingStore,
        depth: usize,
        cancel: &CancelFlag,
    ) -> (Result<PlanOutcome, AnalysisError>, UsageLedger) {
        let driver = driver(client);
        let prompts = PromptLoader::embedded_only();
        let config = Config::default();
        let mut planner = StagePlanner::new(&driver, store, &prompts, &config, cancel);
        let mut ledger = UsageLedger::new();
        let request = AnalysisRequest::new("ACME", depth, AnalysisMode::Quick);
        let outcome = planner.run(&request, &ToolContext::new("req", "ACME"), &mut ledger).await;
        (outcome, ledger)
    }

    #[tokio::test]
    async fn test_depth_one_skips_prior_periods() {
        let (_dir, store) = filings(&[("FY2024", 1_000), ("FY2023", 1_000)]);
        let client = Arc::new(MockLlmClient::new(vec![
            MockLlmClient::text("Full analysis of FY2024."),
            MockLlmClient::text(SYNTHESIS),
        ]));
        let (outcome, ledger) = plan(client.clone(), &store, 1, &CancelFlag::new()).await;
        let outcome = outcome.unwrap();

        let states: Vec<_> = outcome.transitions.iter().map(|t| t.to).collect();
        assert_eq!(
            states,
            vec![PlannerState::CurrentPeriod, PlannerState::Synthesis, PlannerState::Done]
        );
        assert_eq!(outcome.transitions[0].from, PlannerState::NotStarted);
        assert_eq!(outcome.periods[0].strategy, Strategy::Full);
        assert_eq!(outcome.current.summary, "Full analysis of FY2024.");
        assert_eq!(outcome.fields.decision, Some(Decision::Buy));
        assert!(outcome.degradations.is_empty());
        assert_eq!(client.call_count(), 2);
        assert!(ledger.stage("current:FY2024").is_some());
        assert!(ledger.stage("synthesis").is_some());
    }

    #[tokio::test]
    async fn test_large_source_is_compressed_and_bounded() {
        let (_dir, store) = filings(&[("FY2024", 500_000)]);
        let long_summary = "s".repeat(40_000);
        let client = Arc::new(MockLlmClient::new(vec![
            MockLlmClient::text(&summary_reply("FY2024", &long_summary)),
            MockLlmClient::text(SYNTHESIS),
        ]));
        let (outcome, _) = plan(client.clone(), &store, 1, &CancelFlag::new()).await;
        let outcome = outcome.unwrap();

        assert_eq!(outcome.periods[0].strategy, Strategy::Compressed);
        assert_eq!(outcome.periods[0].measured_size, Some(500_000));
        assert!(outcome.current.summary.chars().count() <= 15_000);
        assert_eq!(outcome.current.metrics.get("Revenue"), Some(&1_200_000_000.0));
        let first_prompt = &client.requests()[0].messages[0];
        assert!(format!("{:?}", first_prompt).contains("<<<SUMMARY:FY2024>>>"));
    }

    #[tokio::test]
    async fn test_prior_failure_and_missing_period_degrade() {
        let (_dir, store) = filings(&[("FY2024", 1_000), ("FY2023", 1_000)]);
        let client = Arc::new(MockLlmClient::with_replies(vec![
            Ok(MockLlmClient::text("Current analysis.")),
            Err(LlmError::InvalidResponse("garbled".to_string())),
            Ok(MockLlmClient::text(SYNTHESIS)),
        ]));
        let (outcome, _) = plan(client.clone(), &store, 3, &CancelFlag::new()).await;
        let outcome = outcome.unwrap();

        assert!(outcome.priors.is_empty());
        assert_eq!(outcome.periods.len(), 2);
        assert!(outcome.degradations.contains(&Degradation::MissingPeriod { position: 3, depth: 3 }));
        assert!(
            outcome
                .degradations
                .iter()
                .any(|d| matches!(d, Degradation::PriorPeriodFailed { period, .. } if period == "FY2023"))
        );
        let synthesis_prompt = format!("{:?}", client.requests()[2].messages[0]);
        assert!(synthesis_prompt.contains("Gaps in the research"));
    }

    #[tokio::test]
    async fn test_prior_summaries_reach_synthesis() {
        let (_dir, store) = filings(&[("FY2024", 1_000), ("FY2023", 1_000)]);
        let client = Arc::new(MockLlmClient::new(vec![
            MockLlmClient::text("Current analysis."),
            MockLlmClient::text(&summary_reply("FY2023", "Margins expanded in FY2023.")),
            MockLlmClient::text(SYNTHESIS),
        ]));
        let (outcome, ledger) = plan(client.clone(), &store, 2, &CancelFlag::new()).await;
        let outcome = outcome.unwrap();

        assert_eq!(outcome.priors[0].summary, "Margins expanded in FY2023.");
        assert!(ledger.stage("prior:FY2023").is_some());
        let synthesis_prompt = format!("{:?}", client.requests()[2].messages[0]);
        assert!(synthesis_prompt.contains("Margins expanded in FY2023."));
        assert!(outcome.transitions.iter().any(|t| t.to == PlannerState::PriorPeriods));
    }

    #[tokio::test]
    async fn test_missing_summary_markers_fall_back() {
        let (_dir, store) = filings(&[("FY2024", 1_000), ("FY2023", 1_000)]);
        let client = Arc::new(MockLlmClient::new(vec![
            MockLlmClient::text("Current analysis."),
            MockLlmClient::text("FY2023 was a good year."),
            MockLlmClient::text(SYNTHESIS),
        ]));
        let (outcome, _) = plan(client, &store, 2, &CancelFlag::new()).await;
        let outcome = outcome.unwrap();

        assert_eq!(outcome.priors[0].summary, "FY2023 was a good year.");
        assert_eq!(
            outcome.degradations,
            vec![Degradation::ExtractionFallback {
                stage: "prior:FY2023".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_current_period_failure_is_fatal() {
        let (_dir, store) = filings(&[("FY2024", 1_000)]);
        let client = Arc::new(MockLlmClient::with_replies(vec![Err(LlmError::InvalidResponse(
            "garbled".to_string(),
        ))]));
        let (outcome, _) = plan(client, &store, 1, &CancelFlag::new()).await;
        match outcome {
            Err(AnalysisError::Stage { stage, .. }) => assert_eq!(stage, "current:FY2024"),
            other => panic!("expected current stage failure, got {:?}", other.map(|o| o.transitions)),
        }
    }

    #[tokio::test]
    async fn test_unknown_subject_is_fatal() {
        let (_dir, store) = filings(&[]);
        let client = Arc::new(MockLlmClient::new(vec![]));
        let (outcome, _) = plan(client.clone(), &store, 1, &CancelFlag::new()).await;
        assert!(matches!(outcome, Err(AnalysisError::Stage { .. })));
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (_dir, store) = filings(&[("FY2024", 1_000)]);
        let client = Arc::new(MockLlmClient::new(vec![]));
        let cancel = CancelFlag::new();
        cancel.cancel();
        let (outcome, _) = plan(client.clone(), &store, 1, &cancel).await;
        assert!(matches!(
            outcome,
            Err(AnalysisError::Cancelled {
                next: PlannerState::CurrentPeriod
            })
        ));
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_depth_is_rejected() {
        let (_dir, store) = filings(&[("FY2024", 1_000)]);
        let client = Arc::new(MockLlmClient::new(vec![]));
        let (outcome, _) = plan(client, &store, 0, &CancelFlag::new()).await;
        assert!(matches!(outcome, Err(AnalysisError::InvalidRequest(_))));
    }
}
