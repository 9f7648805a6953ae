// src/llm/openai_compat/request.rs
// OpenAI-compatible chat request builder

use crate::llm::{EffortLevel, Message};
use serde::Serialize;

/// Provider-specific passthrough parameters (used by the Gemini gateway)
#[derive(Debug, Clone, Serialize)]
pub struct ExtraBody {
    pub thinking_level: EffortLevel,
}

/// Chat completion request (OpenAI-compatible format)
#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_body: Option<ExtraBody>,
}

impl ChatRequest {
    /// Create a new chat request with required fields
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens: None,
            temperature: None,
            stream: None,
            extra_body: None,
        }
    }

    /// Set maximum output tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set temperature; `None` leaves the field out of the payload
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Ask for a single non-streamed response
    pub fn non_streaming(mut self) -> Self {
        self.stream = Some(false);
        self
    }

    pub fn with_thinking_level(mut self, level: Option<EffortLevel>) -> Self {
        self.extra_body = level.map(|thinking_level| ExtraBody { thinking_level });
        self
    }
}
