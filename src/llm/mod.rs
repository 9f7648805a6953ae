// src/llm/mod.rs
// Model providers (Gemini primary, DeepSeek fallback) and the invocation gateway

mod circuit_breaker;
mod deepseek;
mod factory;
mod gateway;
mod gemini;
mod http_client;
pub mod openai_compat;
mod provider;
mod types;

pub use circuit_breaker::{BreakerSettings, CircuitBreaker};
pub use deepseek::DeepSeekClient;
pub use factory::{build_gateway, gateway_profiles, DEFAULT_FALLBACK_FAST_MODEL};
pub use gateway::{
    strip_thinking, CompletionGateway, GatewayProfiles, ModelGateway, ModelProfile, RetryPolicy,
    DEFAULT_MAX_TOKENS,
};
pub use gemini::GeminiClient;
pub use http_client::LlmHttpClient;
pub use provider::{LlmClient, Provider};
pub use types::{CompletionRequest, EffortLevel, Message, Role};
