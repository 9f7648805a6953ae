// src/llm/deepseek.rs
// Secondary provider: DeepSeek chat/reasoner (non-streaming)

use crate::llm::CompletionRequest;
use crate::llm::http_client::LlmHttpClient;
use crate::llm::openai_compat::ChatRequest;
use crate::llm::provider::{LlmClient, Provider};
use anyhow::Result;
use async_trait::async_trait;
use tracing::{Span, info, instrument};
use uuid::Uuid;

const DEEPSEEK_API_URL: &str = "https://api.deepseek.com/v1/chat/completions";

/// Transient retries the fallback provider gets on its own
const FALLBACK_TRANSIENT_RETRIES: u32 = 1;

pub struct DeepSeekClient {
    api_key: String,
    url: String,
    http: LlmHttpClient,
}

impl DeepSeekClient {
    pub fn new(api_key: String, client: reqwest::Client) -> Self {
        Self {
            api_key,
            url: DEEPSEEK_API_URL.to_string(),
            http: LlmHttpClient::new(client).with_transient_retries(FALLBACK_TRANSIENT_RETRIES),
        }
    }

    /// Point the client at a different OpenAI-compatible endpoint
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl LlmClient for DeepSeekClient {
    fn provider_type(&self) -> Provider {
        Provider::DeepSeek
    }

    #[instrument(skip(self, request), fields(request_id, model = %request.model))]
    async fn send(&self, request: CompletionRequest) -> Result<String> {
        let request_id = Uuid::new_v4().to_string();
        Span::current().record("request_id", &request_id);
        info!(
            request_id = %request_id,
            temperature = ?request.temperature,
            messages = request.messages.len(),
            "Calling DeepSeek"
        );

        // No thinking hint here; the model choice carries the effort
        let body = ChatRequest::new(&request.model, request.messages)
            .with_max_tokens(request.max_tokens)
            .with_temperature(request.temperature)
            .non_streaming();

        self.http
            .chat(Provider::DeepSeek, &request_id, &self.url, &self.api_key, &body)
            .await
    }
}
