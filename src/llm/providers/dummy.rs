//! Dummy LLM provider — echoes the last user message back prefixed with `[echo]`.
//! Used for running the console without a real API key.

use crate::llm::{ChatMessage, LlmResponse, ProviderError};

#[derive(Debug, Clone)]
pub struct DummyProvider;

impl DummyProvider {
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<LlmResponse, ProviderError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        Ok(LlmResponse { text: format!("[echo] {last_user}"), usage: None })
    }
}
