// src/llm/gateway.rs
// Model Invocation Gateway: primary provider with bounded retry, then failover
// to the secondary provider with an effort-specific model profile.

use crate::error::{IntakeError, Result};
use crate::llm::circuit_breaker::CircuitBreaker;
use crate::llm::provider::LlmClient;
use crate::llm::{CompletionRequest, EffortLevel, Message};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Output cap for every call
pub const DEFAULT_MAX_TOKENS: u32 = 4000;

static THINK_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));

/// Remove `<think>…</think>` reasoning markup and surrounding whitespace
pub fn strip_thinking(text: &str) -> String {
    THINK_BLOCK.replace_all(text, "").trim().to_string()
}

/// Seam between the intake engine and the model providers
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Run one completion. `system_prompt` is prepended as a system message.
    async fn complete(
        &self,
        messages: Vec<Message>,
        system_prompt: &str,
        effort: EffortLevel,
    ) -> Result<String>;
}

/// Exponential backoff applied to the primary provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay after the `failed_attempts`-th failure (1-based), clamped to the cap
    pub fn delay_for(&self, failed_attempts: u32) -> Duration {
        let exp = failed_attempts.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }
}

/// Model name plus sampling parameters for one call path
#[derive(Debug, Clone, PartialEq)]
pub struct ModelProfile {
    pub model: String,
    pub temperature: Option<f32>,
}

impl ModelProfile {
    pub fn new(model: impl Into<String>, temperature: Option<f32>) -> Self {
        Self {
            model: model.into(),
            temperature,
        }
    }
}

/// Which model and parameters each provider path uses
#[derive(Debug, Clone)]
pub struct GatewayProfiles {
    pub primary: ModelProfile,
    /// Secondary model for low effort calls
    pub fallback_fast: ModelProfile,
    /// Secondary model for high effort calls (reasoner: no temperature)
    pub fallback_deep: ModelProfile,
    pub max_tokens: u32,
}

impl Default for GatewayProfiles {
    fn default() -> Self {
        Self {
            primary: ModelProfile::new("gemini-3-pro", Some(1.0)),
            fallback_fast: ModelProfile::new("deepseek-chat", Some(0.7)),
            fallback_deep: ModelProfile::new("deepseek-reasoner", None),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl GatewayProfiles {
    pub fn fallback_for(&self, effort: EffortLevel) -> &ModelProfile {
        match effort {
            EffortLevel::Low => &self.fallback_fast,
            EffortLevel::High => &self.fallback_deep,
        }
    }
}

/// Explicitly constructed gateway; holds no conversational state between calls.
pub struct ModelGateway {
    primary: Option<Arc<dyn LlmClient>>,
    secondary: Option<Arc<dyn LlmClient>>,
    profiles: GatewayProfiles,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
    call_timeout: Option<Duration>,
}

impl ModelGateway {
    pub fn new(primary: Option<Arc<dyn LlmClient>>, secondary: Option<Arc<dyn LlmClient>>) -> Self {
        Self {
            primary,
            secondary,
            profiles: GatewayProfiles::default(),
            retry: RetryPolicy::default(),
            breaker: CircuitBreaker::new(),
            call_timeout: None,
        }
    }

    pub fn with_profiles(mut self, profiles: GatewayProfiles) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_circuit_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = breaker;
        self
    }

    /// Bound every provider call; an elapsed call counts as a provider failure
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn profiles(&self) -> &GatewayProfiles {
        &self.profiles
    }

    /// One provider call, with the optional timeout and think-stripping applied
    async fn call_once(
        &self,
        client: &Arc<dyn LlmClient>,
        request: CompletionRequest,
    ) -> anyhow::Result<String> {
        let send = client.send(request);
        let raw = match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, send)
                .await
                .map_err(|_| anyhow::anyhow!("call timed out after {:?}", limit))??,
            None => send.await?,
        };

        let text = strip_thinking(&raw);
        if text.is_empty() {
            anyhow::bail!("provider returned an empty reply");
        }
        Ok(text)
    }

    async fn try_primary(
        &self,
        client: &Arc<dyn LlmClient>,
        messages: &[Message],
        effort: EffortLevel,
    ) -> std::result::Result<String, String> {
        let provider = client.provider_type();
        let mut last_error = String::new();

        for attempt in 1..=self.retry.max_attempts.max(1) {
            let request = CompletionRequest {
                messages: messages.to_vec(),
                model: self.profiles.primary.model.clone(),
                max_tokens: self.profiles.max_tokens,
                temperature: self.profiles.primary.temperature,
                thinking_level: Some(effort),
            };

            match self.call_once(client, request).await {
                Ok(text) => {
                    self.breaker.record_success(provider);
                    return Ok(text);
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(
                        provider = %provider,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        error = %e,
                        "Primary provider call failed"
                    );
                    if attempt < self.retry.max_attempts {
                        tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    }
                }
            }
        }

        self.breaker.record_failure(provider);
        Err(last_error)
    }
}

#[async_trait]
impl CompletionGateway for ModelGateway {
    async fn complete(
        &self,
        messages: Vec<Message>,
        system_prompt: &str,
        effort: EffortLevel,
    ) -> Result<String> {
        let mut final_messages = Vec::with_capacity(messages.len() + 1);
        if !system_prompt.trim().is_empty() {
            final_messages.push(Message::system(system_prompt));
        }
        final_messages.extend(messages);

        let mut failures = Vec::new();

        if let Some(ref primary) = self.primary {
            let provider = primary.provider_type();
            if self.breaker.is_available(provider) {
                info!(provider = %provider, effort = %effort, "Calling primary provider");
                match self.try_primary(primary, &final_messages, effort).await {
                    Ok(text) => return Ok(text),
                    Err(e) => failures.push(format!("{}: {}", provider, e)),
                }
            } else {
                warn!(provider = %provider, "Primary circuit open, going straight to fallback");
                failures.push(format!("{}: circuit open", provider));
            }
        }

        if let Some(ref secondary) = self.secondary {
            let provider = secondary.provider_type();
            let profile = self.profiles.fallback_for(effort);
            error!(
                provider = %provider,
                model = %profile.model,
                effort = %effort,
                "Primary unavailable, falling back"
            );

            let request = CompletionRequest {
                messages: final_messages,
                model: profile.model.clone(),
                max_tokens: self.profiles.max_tokens,
                temperature: profile.temperature,
                thinking_level: None,
            };
            match self.call_once(secondary, request).await {
                Ok(text) => return Ok(text),
                Err(e) => failures.push(format!("{}: {}", provider, e)),
            }
        }

        if failures.is_empty() {
            failures.push("no model provider configured".to_string());
        }
        Err(IntakeError::ProviderUnavailable(failures.join("; ")))
    }
}
