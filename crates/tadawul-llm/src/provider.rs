//! LLM provider trait definition

use crate::{CompletionRequest, CompletionResponse, Result};
use async_trait::async_trait;

/// Trait for LLM providers
///
/// Implementations wrap a concrete model service. Every call is fallible and
/// may be slow; callers decide how to degrade.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate a completion from the model
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Get the provider name (e.g., "openai")
    fn name(&self) -> &str;

    /// Convenience wrapper: send one user prompt and return the reply text
    async fn complete_text(&self, request: CompletionRequest) -> Result<String> {
        let response = self.complete(request).await?;
        response
            .message
            .text()
            .map(str::to_string)
            .ok_or_else(|| crate::LLMError::UnexpectedResponse("Empty completion".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Message, StopReason, TokenUsage};

    struct EchoProvider;

    #[async_trait]
    impl LLMProvider for EchoProvider {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
            let text = request
                .messages
                .last()
                .and_then(|m| m.text())
                .unwrap_or_default()
                .to_string();
            Ok(CompletionResponse {
                message: Message::assistant(text),
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage {
                    input_tokens: 1,
                    output_tokens: 1,
                },
            })
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    #[tokio::test]
    async fn test_complete_text() {
        let request = CompletionRequest::builder("test")
            .add_message(Message::user("ping"))
            .build();
        let text = tokio_test::assert_ok!(EchoProvider.complete_text(request).await);
        assert_eq!(text, "ping");
    }

    #[tokio::test]
    async fn test_complete_text_empty() {
        let request = CompletionRequest::builder("test")
            .add_message(Message::user(""))
            .build();
        tokio_test::assert_err!(EchoProvider.complete_text(request).await);
    }
}
