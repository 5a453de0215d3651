//! Language-model backends for leetcrew workers.
//!
//! Every backend implements [`LlmClient`]; [`build_llm_client`] turns an
//! [`LlmConfig`] into a concurrency-limited client.

pub mod anthropic;
pub mod client;
pub mod config;
pub mod gemini;
mod http;
pub mod openai;

pub use anthropic::AnthropicClient;
pub use client::{ChatMessage, ChatRole, LlmClient, LlmRequest, LlmResponse, TokenUsage};
pub use config::{LlmConfig, SemaphoredClient, build_llm_client};
pub use gemini::GeminiClient;
pub use openai::OpenAiClient;
