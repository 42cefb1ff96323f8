//! Completion gateway abstraction

use async_trait::async_trait;

use crate::error::GatewayError;

use super::types::ChatMessage;

/// Anything that can turn an assembled prompt into assistant text.
///
/// The production implementation is [`super::LlmClient`]; tests plug in
/// scripted gateways.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Request one completion for the given model and prompt
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<String, GatewayError>;
}
