// src/llm/factory.rs
// Builds the model gateway from environment and file configuration

use crate::config::{EnvConfig, HealthyConfig};
use crate::http::create_client;
use crate::llm::deepseek::DeepSeekClient;
use crate::llm::gateway::{GatewayProfiles, ModelGateway, ModelProfile, DEFAULT_MAX_TOKENS};
use crate::llm::gemini::GeminiClient;
use crate::llm::provider::LlmClient;
use std::sync::Arc;
use tracing::{info, warn};

/// Fast fallback model when the config file names none
pub const DEFAULT_FALLBACK_FAST_MODEL: &str = "deepseek-chat";

/// Resolve model profiles: env supplies the primary and reasoner, the file may override
pub fn gateway_profiles(env: &EnvConfig, file: &HealthyConfig) -> GatewayProfiles {
    let fast = file
        .llm
        .fallback_fast_model
        .clone()
        .unwrap_or_else(|| DEFAULT_FALLBACK_FAST_MODEL.to_string());
    let deep = file
        .llm
        .fallback_deep_model
        .clone()
        .unwrap_or_else(|| env.deepseek_reasoner_model.clone());

    GatewayProfiles {
        primary: ModelProfile::new(env.gemini_model.clone(), Some(1.0)),
        fallback_fast: ModelProfile::new(fast, Some(0.7)),
        fallback_deep: ModelProfile::new(deep, None),
        max_tokens: file.llm.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
    }
}

/// Create the gateway with whichever providers have keys configured
pub fn build_gateway(env: &EnvConfig, file: &HealthyConfig) -> ModelGateway {
    let primary: Option<Arc<dyn LlmClient>> = env.api_keys.gemini.as_ref().map(|key| {
        info!(base_url = %env.gemini_base_url, model = %env.gemini_model, "Gemini client initialized");
        Arc::new(GeminiClient::new(
            key.clone(),
            env.gemini_base_url.clone(),
            create_client(env.gemini_timeout),
        )) as Arc<dyn LlmClient>
    });

    let secondary: Option<Arc<dyn LlmClient>> = env.api_keys.deepseek.as_ref().map(|key| {
        info!("DeepSeek client initialized");
        Arc::new(DeepSeekClient::new(
            key.clone(),
            create_client(env.deepseek_timeout),
        )) as Arc<dyn LlmClient>
    });

    if primary.is_none() {
        warn!("No Gemini key configured, every call goes to the fallback provider");
    }
    if secondary.is_none() {
        warn!("No DeepSeek key configured, primary failures are not recoverable");
    }

    ModelGateway::new(primary, secondary).with_profiles(gateway_profiles(env, file))
}
