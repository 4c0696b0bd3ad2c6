//! Token estimation and conversation pruning

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ContextConfig;
use crate::llm::{Message, Role, ToolDefinition};

/// Pruning could not produce a conversation the provider will accept
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PruneError {
    #[error("Conversation is empty; nothing to prune")]
    EmptyConversation,

    #[error(
        "No valid context window found after {attempts} expansion attempts ({turns} turns): \
         a retained turn would orphan a tool result or break reasoning continuity"
    )]
    InvariantUnsatisfiable { attempts: usize, turns: usize },
}

/// Deterministic token estimate: characters divided by four, rounded up
///
/// Counts the system prompt, every tool schema and every block of every turn.
pub fn estimate_tokens(system_prompt: &str, tools: &[ToolDefinition], messages: &[Message]) -> usize {
    let tool_chars: usize = tools
        .iter()
        .map(|t| t.name.len() + t.description.len() + t.input_schema.to_string().len())
        .sum();
    let message_chars: usize = messages.iter().map(Message::char_len).sum();
    (system_prompt.len() + tool_chars + message_chars).div_ceil(4)
}

/// Prune a conversation to its first turn plus a recent window
///
/// The window starts with the `min_recent_turns` most recent turns and grows
/// backward one turn at a time, at most `max_attempts` times, until it is
/// valid:
///
/// - every tool result kept has its tool-use request kept too
/// - with `reasoning_active`, the first assistant turn in the window opens
///   with a reasoning block
pub fn prune(
    messages: &[Message],
    min_recent_turns: usize,
    reasoning_active: bool,
    max_attempts: usize,
) -> Result<Vec<Message>, PruneError> {
    debug!(turns = messages.len(), %min_recent_turns, %reasoning_active, %max_attempts, "prune: called");
    let Some(first) = messages.first() else {
        return Err(PruneError::EmptyConversation);
    };

    let mut start = messages.len().saturating_sub(min_recent_turns.max(1)).max(1);
    let mut attempt = 0;

    loop {
        let window = &messages[start..];
        if window_is_valid(first, window, reasoning_active) {
            debug!(%start, %attempt, kept = window.len() + 1, "prune: valid window found");
            let mut pruned = Vec::with_capacity(window.len() + 1);
            pruned.push(first.clone());
            pruned.extend_from_slice(window);
            return Ok(pruned);
        }

        if attempt >= max_attempts || start <= 1 {
            warn!(%attempt, turns = messages.len(), "prune: no valid window");
            return Err(PruneError::InvariantUnsatisfiable {
                attempts: attempt,
                turns: messages.len(),
            });
        }

        attempt += 1;
        start -= 1;
        debug!(%start, %attempt, "prune: window invalid, expanding backward");
    }
}

fn window_is_valid(first: &Message, window: &[Message], reasoning_active: bool) -> bool {
    let requested: HashSet<&str> = std::iter::once(first)
        .chain(window)
        .flat_map(Message::tool_use_ids)
        .collect();
    let orphaned = std::iter::once(first)
        .chain(window)
        .flat_map(Message::tool_result_ids)
        .any(|id| !requested.contains(id));
    if orphaned {
        debug!("window_is_valid: orphaned tool result");
        return false;
    }

    if reasoning_active
        && let Some(assistant) = window.iter().find(|m| m.role == Role::Assistant)
        && !assistant.opens_with_reasoning()
    {
        debug!("window_is_valid: first assistant turn lacks reasoning block");
        return false;
    }

    true
}

/// Context budget for one reasoning loop
#[derive(Debug, Clone)]
pub struct ContextBudget {
    /// Estimated tokens above which the conversation is pruned
    pub threshold_tokens: usize,

    /// Most recent turns always retained
    pub min_recent_turns: usize,

    /// Backward expansions before giving up
    pub max_attempts: usize,
}

impl ContextBudget {
    pub fn new(threshold_tokens: usize, min_recent_turns: usize, max_attempts: usize) -> Self {
        Self {
            threshold_tokens,
            min_recent_turns,
            max_attempts,
        }
    }

    pub fn from_config(config: &ContextConfig) -> Self {
        Self::new(config.threshold_tokens, config.min_recent_turns, config.max_prune_attempts)
    }

    /// Prune `messages` if the estimated request size exceeds the threshold
    ///
    /// Returns `Ok(Some(pruned))` when a smaller valid conversation was
    /// produced and `Ok(None)` when nothing could or needed to be dropped.
    pub fn enforce(
        &self,
        system_prompt: &str,
        tools: &[ToolDefinition],
        messages: &[Message],
        reasoning_active: bool,
    ) -> Result<Option<Vec<Message>>, PruneError> {
        let estimate = estimate_tokens(system_prompt, tools, messages);
        debug!(%estimate, threshold = %self.threshold_tokens, "ContextBudget::enforce: called");
        if estimate <= self.threshold_tokens {
            return Ok(None);
        }

        let pruned = prune(messages, self.min_recent_turns, reasoning_active, self.max_attempts)?;
        if pruned.len() == messages.len() {
            warn!(%estimate, turns = messages.len(), "Conversation exceeds context budget but has no turns to drop");
            return Ok(None);
        }
        let after = estimate_tokens(system_prompt, tools, &pruned);
        info!(
            before_turns = messages.len(),
            after_turns = pruned.len(),
            before_tokens = %estimate,
            after_tokens = %after,
            "Pruned conversation to fit context budget"
        );
        if after > self.threshold_tokens {
            warn!(%after, threshold = %self.threshold_tokens, "Pruned conversation still exceeds context budget");
        }
        Ok(Some(pruned))
    }
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self::from_config(&ContextConfig::default())
    }
}
