//! OpenAI-compatible chat completions. Also serves local Ollama, which exposes
//! the same endpoint.

use async_trait::async_trait;
use leetcrew_common::{Result, SolverError};
use serde::{Deserialize, Serialize};

use crate::client::{ChatRole, LlmClient, LlmRequest, LlmResponse, TokenUsage};
use crate::http::{build_http_client, post_json};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct WireMessage {
    role: ChatRole,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    model: String,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: WireMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

pub struct OpenAiClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(
        base_url: Option<String>,
        model: String,
        api_key: Option<String>,
        timeout_ms: u64,
    ) -> Result<Self> {
        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
            http_client: build_http_client(timeout_ms)?,
        })
    }

    fn build_body(&self, request: &LlmRequest) -> ChatCompletionRequest {
        let system = request.system_prompt.iter().map(|s| WireMessage {
            role: ChatRole::System,
            content: Some(s.clone()),
        });
        let conversation = request.messages.iter().map(|m| WireMessage {
            role: m.role,
            content: Some(m.content.clone()),
        });

        ChatCompletionRequest {
            model: self.model.clone(),
            messages: system.chain(conversation).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.build_body(&request);

        let mut http_req = self.http_client.post(&url);
        if let Some(ref key) = self.api_key {
            http_req = http_req.bearer_auth(key);
        }

        let reply: ChatCompletionResponse = post_json("OpenAI", http_req, &body).await?;

        let choice = reply
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| SolverError::Llm("No choices in OpenAI response".to_string()))?;

        Ok(LlmResponse {
            content: choice.message.content.unwrap_or_default(),
            model: reply.model,
            usage: reply.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            }),
            finish_reason: choice.finish_reason,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ChatMessage;

    #[test]
    fn body_puts_system_prompt_first() {
        let client =
            OpenAiClient::new(None, "gpt-4o".into(), Some("sk-test".into()), 1_000).unwrap();
        let request = LlmRequest {
            system_prompt: Some("Be precise.".to_string()),
            messages: vec![ChatMessage::user("Analyze two sum")],
            temperature: Some(0.1),
            max_tokens: Some(512),
        };

        let json = serde_json::to_value(client.build_body(&request)).unwrap();

        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["max_tokens"], 512);
        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "Be precise.");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "Analyze two sum");
    }

    #[test]
    fn body_omits_unset_sampling_fields() {
        let client = OpenAiClient::new(None, "llama3.1:8b".into(), None, 1_000).unwrap();
        let request = LlmRequest {
            messages: vec![ChatMessage::user("Hello")],
            ..Default::default()
        };

        let json = serde_json::to_value(client.build_body(&request)).unwrap();
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
        assert!(json.get("temperature").is_none());
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn default_base_url_is_local_ollama() {
        let client = OpenAiClient::new(None, "llama3.1:8b".into(), None, 1_000).unwrap();
        assert_eq!(client.base_url, "http://localhost:11434");
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = OpenAiClient::new(
            Some("https://api.openai.com/".into()),
            "gpt-4o".into(),
            None,
            1_000,
        )
        .unwrap();
        assert_eq!(client.base_url, "https://api.openai.com");
    }

    #[test]
    fn null_content_decodes() {
        let raw = r#"{"model":"m","choices":[{"message":{"role":"assistant","content":null},"finish_reason":"stop"}]}"#;
        let reply: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert!(reply.choices[0].message.content.is_none());
    }
}
