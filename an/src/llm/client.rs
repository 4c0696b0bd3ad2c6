//! The completion seam between the driver and a provider

use async_trait::async_trait;

use super::{CompletionRequest, CompletionResponse, LlmError};

/// One round trip to a model
///
/// The caller owns the conversation and sends it in full on every request;
/// the client keeps no per-conversation state, so one client can serve many
/// independent analysis requests at once.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Implementations make exactly one attempt. Retry policy belongs to the
    /// reasoning-loop driver so it can be applied uniformly across providers.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}
