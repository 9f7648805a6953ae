// src/llm/gemini.rs
// Primary provider: Gemini behind an OpenAI-compatible gateway
// The thinking level travels in `extra_body`; any <think> wrapper is removed by the gateway.

use crate::llm::CompletionRequest;
use crate::llm::http_client::LlmHttpClient;
use crate::llm::openai_compat::ChatRequest;
use crate::llm::provider::{LlmClient, Provider};
use anyhow::Result;
use async_trait::async_trait;
use tracing::{Span, info, instrument};
use uuid::Uuid;

/// Gemini client speaking the OpenAI chat-completions dialect
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    http: LlmHttpClient,
}

impl GeminiClient {
    /// Create a client for `{base_url}/chat/completions`
    pub fn new(api_key: String, base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            // The gateway owns the retry budget for the primary provider
            http: LlmHttpClient::new(client),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    fn provider_type(&self) -> Provider {
        Provider::Gemini
    }

    #[instrument(skip(self, request), fields(request_id, model = %request.model))]
    async fn send(&self, request: CompletionRequest) -> Result<String> {
        let request_id = Uuid::new_v4().to_string();
        Span::current().record("request_id", &request_id);
        info!(
            request_id = %request_id,
            thinking_level = ?request.thinking_level,
            messages = request.messages.len(),
            "Calling Gemini"
        );

        let body = ChatRequest::new(&request.model, request.messages)
            .with_max_tokens(request.max_tokens)
            .with_temperature(request.temperature)
            .with_thinking_level(request.thinking_level);

        self.http
            .chat(Provider::Gemini, &request_id, &self.endpoint(), &self.api_key, &body)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = GeminiClient::new(
            "key".to_string(),
            "https://grsai.dakka.com.cn/v1/",
            reqwest::Client::new(),
        );
        assert_eq!(client.endpoint(), "https://grsai.dakka.com.cn/v1/chat/completions");
        assert_eq!(client.provider_type(), Provider::Gemini);
    }

    #[test]
    fn test_primary_has_no_transient_retries() {
        let client = GeminiClient::new("key".to_string(), "http://x", reqwest::Client::new());
        assert_eq!(client.http.transient_retries, 0);
    }
}
