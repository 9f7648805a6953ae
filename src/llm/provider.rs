// src/llm/provider.rs
// The provider client seam the gateway calls through

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::CompletionRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gemini,
    DeepSeek,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gemini => f.write_str("gemini"),
            Self::DeepSeek => f.write_str("deepseek"),
        }
    }
}

/// One provider endpoint.
///
/// `send` returns the reply text and errors on non-2xx responses, transport failures
/// and timeouts. Clients keep no conversational state between calls.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn send(&self, request: CompletionRequest) -> Result<String>;

    fn provider_type(&self) -> Provider;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_names() {
        assert_eq!(Provider::DeepSeek.to_string(), "deepseek");
        assert_eq!(Provider::Gemini.to_string(), "gemini");
        assert_eq!(serde_json::to_string(&Provider::DeepSeek).unwrap(), "\"deepseek\"");
    }
}
