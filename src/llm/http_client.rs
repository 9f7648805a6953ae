// src/llm/http_client.rs
// Provider transport: POST a chat request, retry transient failures, log usage

use crate::llm::openai_compat::{ChatRequest, Usage, parse_chat_response};
use crate::llm::provider::Provider;
use anyhow::{Result, anyhow};
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const DEFAULT_BASE_BACKOFF: Duration = Duration::from_secs(1);

/// 429 and 5xx may succeed on a resend; other statuses will not
pub fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Outcome of a single POST
enum Attempt {
    Body(String),
    Transient(anyhow::Error),
    Fatal(anyhow::Error),
}

/// HTTP transport shared by the provider clients.
///
/// `transient_retries` are extra sends after the first one; only 429, 5xx,
/// connect errors and timeouts spend them.
pub struct LlmHttpClient {
    client: Client,
    pub transient_retries: u32,
    pub base_backoff: Duration,
}

impl LlmHttpClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            transient_retries: 0,
            base_backoff: DEFAULT_BASE_BACKOFF,
        }
    }

    pub fn with_transient_retries(mut self, retries: u32) -> Self {
        self.transient_retries = retries;
        self
    }

    pub fn with_base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff = backoff;
        self
    }

    async fn attempt(&self, url: &str, api_key: &str, body: &str) -> Attempt {
        let sent = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .await;

        let response = match sent {
            Ok(response) => response,
            // Only connect/timeout errors are safe to resend
            Err(e) if e.is_connect() || e.is_timeout() => {
                return Attempt::Transient(anyhow!("request failed: {}", e));
            }
            Err(e) => return Attempt::Fatal(anyhow!("request failed: {}", e)),
        };

        let status = response.status();
        if status.is_success() {
            return match response.text().await {
                Ok(text) => Attempt::Body(text),
                Err(e) => Attempt::Fatal(anyhow!("unreadable response body: {}", e)),
            };
        }

        let error_body = response.text().await.unwrap_or_default();
        let error = anyhow!("API error {}: {}", status, error_body);
        if is_transient_status(status) {
            Attempt::Transient(error)
        } else {
            Attempt::Fatal(error)
        }
    }

    /// POST a JSON body with Bearer auth; returns the raw response body on 2xx
    pub async fn post_json(
        &self,
        request_id: &str,
        url: &str,
        api_key: &str,
        body: &str,
    ) -> Result<String> {
        let mut retries = 0;
        let mut backoff = self.base_backoff;

        loop {
            match self.attempt(url, api_key, body).await {
                Attempt::Body(text) => return Ok(text),
                Attempt::Fatal(e) => return Err(e),
                Attempt::Transient(e) if retries < self.transient_retries => {
                    warn!(
                        request_id = %request_id,
                        retry = retries + 1,
                        error = %e,
                        "Transient provider error, retrying in {:?}",
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    retries += 1;
                    backoff *= 2;
                }
                Attempt::Transient(e) => return Err(e),
            }
        }
    }

    /// Send a chat request and return the first choice's text
    pub async fn chat(
        &self,
        provider: Provider,
        request_id: &str,
        url: &str,
        api_key: &str,
        request: &ChatRequest,
    ) -> Result<String> {
        let start = Instant::now();
        let body = serde_json::to_string(request)?;
        debug!(request_id = %request_id, provider = %provider, "Request body: {}", body);

        let raw = self.post_json(request_id, url, api_key, &body).await?;
        let (content, usage) = parse_chat_response(&raw)?;

        log_call(
            request_id,
            provider,
            start.elapsed().as_millis() as u64,
            content.len(),
            usage.as_ref(),
        );
        Ok(content)
    }
}

fn log_call(
    request_id: &str,
    provider: Provider,
    duration_ms: u64,
    content_len: usize,
    usage: Option<&Usage>,
) {
    match usage {
        Some(u) => info!(
            request_id = %request_id,
            provider = %provider,
            duration_ms,
            content_len,
            prompt_tokens = u.prompt_tokens,
            completion_tokens = u.completion_tokens,
            total_tokens = u.total_tokens,
            "Provider call complete"
        ),
        None => info!(
            request_id = %request_id,
            provider = %provider,
            duration_ms,
            content_len,
            "Provider call complete"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_transient_status(StatusCode::UNAUTHORIZED));
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn test_no_retries_by_default() {
        let client = LlmHttpClient::new(Client::new());
        assert_eq!(client.transient_retries, 0);
        assert_eq!(client.base_backoff, DEFAULT_BASE_BACKOFF);

        let client = client
            .with_transient_retries(2)
            .with_base_backoff(Duration::from_millis(50));
        assert_eq!(client.transient_retries, 2);
        assert_eq!(client.base_backoff, Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_refused_connection_is_an_error() {
        let client = LlmHttpClient::new(
            Client::builder()
                .timeout(Duration::from_millis(500))
                .connect_timeout(Duration::from_millis(200))
                .build()
                .unwrap(),
        )
        .with_transient_retries(1)
        .with_base_backoff(Duration::from_millis(10));

        let result = client
            .post_json("test", "http://127.0.0.1:1", "key", "{}")
            .await;
        assert!(result.is_err());
    }
}
