use async_trait::async_trait;
use leetcrew_common::Result;
use serde::{Deserialize, Serialize};

use crate::client::{ChatRole, LlmClient, LlmRequest, LlmResponse, TokenUsage};
use crate::http::{build_http_client, post_json};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Serialize)]
struct MessagesRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    max_tokens: u32,
}

#[derive(Serialize, Debug, Clone)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    model: String,
    usage: Option<Usage>,
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

pub struct AnthropicClient {
    model: String,
    api_key: String,
    http_client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(model: String, api_key: String, timeout_ms: u64) -> Result<Self> {
        Ok(Self {
            model,
            api_key,
            http_client: build_http_client(timeout_ms)?,
        })
    }

    fn build_body(&self, request: &LlmRequest) -> MessagesRequest {
        // The system prompt travels in the top-level `system` field.
        let messages = request
            .messages
            .iter()
            .filter(|msg| msg.role != ChatRole::System)
            .map(|msg| AnthropicMessage {
                role: match msg.role {
                    ChatRole::Assistant => "assistant",
                    _ => "user",
                },
                content: vec![ContentBlock {
                    kind: "text".to_string(),
                    text: msg.content.clone(),
                }],
            })
            .collect();

        MessagesRequest {
            model: self.model.clone(),
            messages,
            system: request.system_prompt.clone(),
            temperature: request.temperature,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let body = self.build_body(&request);

        let http_req = self
            .http_client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION);

        let reply: MessagesResponse = post_json("Anthropic", http_req, &body).await?;

        let content = reply
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(LlmResponse {
            content,
            model: reply.model,
            usage: reply.usage.map(|u| TokenUsage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
            }),
            finish_reason: reply.stop_reason,
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

    fn client() -> AnthropicClient {
        AnthropicClient::new(
            "claude-sonnet-4-20250514".into(),
            "sk-ant-test".into(),
            1_000,
        )
        .unwrap()
    }

    #[test]
    fn body_matches_messages_api() {
        let request = LlmRequest {
            system_prompt: Some("You are the Clean Code Author.".to_string()),
            messages: vec![
                ChatMessage::user("Write the code"),
                ChatMessage::assistant("<tool name=\"Code Validator\">x = 1</tool>"),
                ChatMessage::user("Tool result: Code is syntactically valid"),
            ],
            temperature: Some(0.2),
            max_tokens: Some(1024),
        };

        let json = serde_json::to_value(client().build_body(&request)).unwrap();

        assert_eq!(json["model"], "claude-sonnet-4-20250514");
        assert_eq!(json["system"], "You are the Clean Code Author.");
        assert_eq!(json["max_tokens"], 1024);
        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"][0]["type"], "text");
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[2]["role"], "user");
    }

    #[test]
    fn system_messages_never_appear_inline() {
        let request = LlmRequest {
            system_prompt: Some("top level".into()),
            messages: vec![
                ChatMessage {
                    role: ChatRole::System,
                    content: "stray".into(),
                },
                ChatMessage::user("Hello"),
            ],
            ..Default::default()
        };

        let json = serde_json::to_value(client().build_body(&request)).unwrap();
        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(json["max_tokens"], 4096);
    }
}
