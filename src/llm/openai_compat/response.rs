// src/llm/openai_compat/response.rs
// OpenAI-compatible chat response parsing

use anyhow::{Result, anyhow};
use serde::Deserialize;

/// Token usage as reported by the provider
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Non-streaming chat response (OpenAI-compatible format)
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ResponseChoice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseChoice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Parse a response body into the trimmed reply text plus usage.
///
/// A response without a first choice or with empty content is an error: the
/// gateway must see it as a failed call, never as an empty reply.
pub fn parse_chat_response(response_body: &str) -> Result<(String, Option<Usage>)> {
    let data: ChatResponse = serde_json::from_str(response_body)
        .map_err(|e| anyhow!("Failed to parse chat response: {}", e))?;

    let content = data
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| anyhow!("Chat response contained no content"))?;

    Ok((content, data.usage))
}
