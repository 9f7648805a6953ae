// src/llm/openai_compat/mod.rs
// Shared OpenAI-compatible request/response handling for both providers

mod request;
mod response;

pub use request::{ChatRequest, ExtraBody};
pub use response::{ChatResponse, ResponseChoice, Usage, parse_chat_response};
