//! ReasoningDriver - one bounded, tool-augmented conversation with the model

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::context::{ContextBudget, Conversation, PruneError};
use crate::llm::{
    CompletionRequest, ContentBlock, LlmClient, LlmError, Message, StopReason, TokenUsage, UsageLedger,
};
use crate::tools::{ToolContext, ToolError, ToolRegistry};

use super::RetryPolicy;

/// Sent when the model's reply was cut off by the output token limit
const CONTINUE_PROMPT: &str = "Continue from where you left off. Your previous response was truncated.";

/// Why a driver invocation failed
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Provider request failed: {0}")]
    Provider(#[from] LlmError),

    #[error("Conversation could not be pruned into a valid request: {0}")]
    InvalidState(#[from] PruneError),

    #[error("Tool dispatch failed: {0}")]
    Tool(#[from] ToolError),

    #[error("No final answer after {iterations} iterations")]
    Inconclusive { iterations: u32 },

    #[error("Model ended its turn without any text")]
    EmptyResponse,
}

/// Parameters of one driver invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Label usage is recorded under, e.g. `current:FY2024`
    pub stage: String,

    pub system_prompt: String,

    /// Task framing; the first turn of the conversation
    pub first_message: String,

    /// Tools offered to the model for this invocation
    pub tool_names: Vec<String>,

    /// Provider round-trips allowed before giving up
    pub max_iterations: u32,
}

/// The model's final answer and how it was reached
#[derive(Debug, Clone)]
pub struct FinalTurn {
    /// Final answer text, including any continuation after truncation
    pub text: String,

    /// Provider round-trips used
    pub iterations: u32,

    /// Tool calls executed
    pub tool_calls: u32,

    /// Times the conversation was pruned
    pub prunes: u32,

    /// Usage summed over this invocation
    pub usage: TokenUsage,
}

/// Drives a single conversation until the model gives a final answer
///
/// The driver itself is stateless between invocations and can be shared
/// across concurrent analysis requests.
pub struct ReasoningDriver {
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    budget: ContextBudget,
    retry: RetryPolicy,
    max_tokens: u32,
    reasoning_budget: Option<u32>,
}

impl ReasoningDriver {
    pub fn new(llm: Arc<dyn LlmClient>, tools: Arc<ToolRegistry>, config: &Config) -> Self {
        debug!(model = %config.llm.model, "ReasoningDriver::new: called");
        Self {
            llm,
            tools,
            budget: ContextBudget::from_config(&config.context),
            retry: RetryPolicy::from_config(&config.driver),
            max_tokens: config.llm.max_tokens,
            reasoning_budget: config.llm.reasoning_budget,
        }
    }

    /// Override the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override the context budget
    pub fn with_budget(mut self, budget: ContextBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run one invocation to completion
    ///
    /// Every provider call's usage is recorded into `ledger` under the
    /// invocation's stage label, including calls of a failed invocation.
    pub async fn run(
        &self,
        invocation: &Invocation,
        ctx: &ToolContext,
        ledger: &mut UsageLedger,
    ) -> Result<FinalTurn, DriverError> {
        debug!(
            stage = %invocation.stage,
            request_id = %ctx.request_id,
            tools = ?invocation.tool_names,
            max_iterations = invocation.max_iterations,
            "ReasoningDriver::run: called"
        );
        let tool_defs = self.tools.definitions_for(&invocation.tool_names);
        let reasoning_active = self.reasoning_budget.is_some();
        let mut conversation = Conversation::new(invocation.first_message.clone());
        let mut usage = TokenUsage::default();
        let mut tool_calls = 0;
        let mut prunes = 0;
        let mut truncated_text = String::new();

        for iteration in 1..=invocation.max_iterations {
            debug!(stage = %invocation.stage, iteration, turns = conversation.len(), "ReasoningDriver::run: iteration start");

            if let Some(pruned) = self.budget.enforce(
                &invocation.system_prompt,
                &tool_defs,
                conversation.messages(),
                reasoning_active,
            )? {
                conversation.replace(pruned);
                prunes += 1;
            }

            let request = CompletionRequest {
                system_prompt: invocation.system_prompt.clone(),
                messages: conversation.messages().to_vec(),
                tools: tool_defs.clone(),
                max_tokens: self.max_tokens,
                reasoning_budget: self.reasoning_budget,
            };

            let response = self.retry.complete(self.llm.as_ref(), &request).await?;
            ledger.record(&invocation.stage, &response.usage);
            usage.add(&response.usage);
            debug!(stage = %invocation.stage, iteration, stop_reason = ?response.stop_reason, "ReasoningDriver::run: response received");

            conversation.push(response.to_message());

            let calls = response.tool_calls();
            if !calls.is_empty() {
                let mut results = Vec::with_capacity(calls.len());
                for call in calls {
                    if !invocation.tool_names.contains(&call.name) {
                        warn!(stage = %invocation.stage, tool = %call.name, "Model called a tool it was not offered");
                        return Err(ToolError::UnknownTool { name: call.name }.into());
                    }
                    debug!(tool = %call.name, id = %call.id, "ReasoningDriver::run: invoking tool");
                    let result = self.tools.invoke(&call.name, call.input, ctx).await?;
                    tool_calls += 1;
                    results.push(ContentBlock::tool_result(call.id, result.content, result.is_error));
                }
                conversation.push(Message::user_blocks(results));
                truncated_text.clear();
                continue;
            }

            let text = response.text().unwrap_or_default();
            if response.stop_reason == StopReason::MaxTokens {
                debug!(stage = %invocation.stage, iteration, "ReasoningDriver::run: truncated, asking to continue");
                truncated_text.push_str(&text);
                conversation.push(Message::user(CONTINUE_PROMPT));
                continue;
            }

            let text = truncated_text + &text;
            if text.trim().is_empty() {
                warn!(stage = %invocation.stage, "Model returned no text");
                return Err(DriverError::EmptyResponse);
            }

            info!(
                stage = %invocation.stage,
                iterations = iteration,
                tool_calls,
                prunes,
                "Reasoning loop finished"
            );
            return Ok(FinalTurn {
                text,
                iterations: iteration,
                tool_calls,
                prunes,
                usage,
            });
        }

        warn!(stage = %invocation.stage, max_iterations = invocation.max_iterations, "Reasoning loop inconclusive");
        Err(DriverError::Inconclusive {
            iterations: invocation.max_iterations,
        })
    }
}
