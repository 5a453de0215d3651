use std::sync::Arc;

use async_trait::async_trait;
use leetcrew_common::{Result, SolverError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::anthropic::AnthropicClient;
use crate::client::{LlmClient, LlmRequest, LlmResponse};
use crate::gemini::GeminiClient;
use crate::openai::OpenAiClient;

/// One language-model backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "openai" (also Ollama and other compatible servers), "ollama", "anthropic" or "gemini".
    pub provider: String,
    pub model: String,
    /// Falls back to the provider's environment variable when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
}

fn default_timeout_ms() -> u64 {
    120_000
}

fn default_max_concurrent() -> usize {
    2
}

impl LlmConfig {
    /// The Gemini Flash backend with a low temperature.
    pub fn gemini_flash() -> Self {
        Self {
            provider: "gemini".into(),
            model: "gemini-2.5-flash".into(),
            api_key: None,
            api_url: None,
            temperature: Some(0.1),
            max_tokens: None,
            timeout_ms: default_timeout_ms(),
            max_concurrent_requests: default_max_concurrent(),
        }
    }

    /// Name of the environment variable consulted for this provider's key.
    pub fn api_key_env_var(&self) -> Option<&'static str> {
        match self.provider.as_str() {
            "openai" => Some("OPENAI_API_KEY"),
            "anthropic" => Some("ANTHROPIC_API_KEY"),
            "gemini" => Some("GOOGLE_API_KEY"),
            _ => None,
        }
    }

    /// Explicit non-empty `api_key` first, then the provider's environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(ref key) = self.api_key
            && !key.is_empty()
        {
            return Some(key.clone());
        }
        self.api_key_env_var()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty())
    }
}

/// Bounds the number of in-flight requests to one backend across all runs.
pub struct SemaphoredClient {
    inner: Arc<dyn LlmClient>,
    semaphore: Arc<tokio::sync::Semaphore>,
}

impl SemaphoredClient {
    pub fn new(inner: Arc<dyn LlmClient>, max_concurrent: usize) -> Self {
        Self {
            inner,
            semaphore: Arc::new(tokio::sync::Semaphore::new(max_concurrent.max(1))),
        }
    }
}

#[async_trait]
impl LlmClient for SemaphoredClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| SolverError::Llm(format!("Semaphore acquire failed: {e}")))?;
        self.inner.complete(request).await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

pub fn build_llm_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let api_key = config.resolve_api_key();
    let require_key = |provider: &str| {
        api_key.clone().ok_or_else(|| {
            SolverError::Configuration(format!(
                "{provider} requires an API key (set api_key or {})",
                config.api_key_env_var().unwrap_or("an environment variable")
            ))
        })
    };

    let base_client: Arc<dyn LlmClient> = match config.provider.as_str() {
        "openai" | "ollama" => Arc::new(OpenAiClient::new(
            config.api_url.clone(),
            config.model.clone(),
            api_key.clone(),
            config.timeout_ms,
        )?),
        "anthropic" => Arc::new(AnthropicClient::new(
            config.model.clone(),
            require_key("Anthropic")?,
            config.timeout_ms,
        )?),
        "gemini" => Arc::new(GeminiClient::new(
            config.api_url.clone(),
            config.model.clone(),
            require_key("Gemini")?,
            config.timeout_ms,
        )?),
        other => {
            return Err(SolverError::Configuration(format!(
                "Unknown LLM provider: {other}"
            )));
        }
    };

    debug!(
        provider = %config.provider,
        model = %config.model,
        max_concurrent = config.max_concurrent_requests,
        "Built LLM client"
    );

    Ok(Arc::new(SemaphoredClient::new(
        base_client,
        config.max_concurrent_requests,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str, model: &str, api_key: Option<&str>) -> LlmConfig {
        LlmConfig {
            provider: provider.to_string(),
            model: model.to_string(),
            api_key: api_key.map(str::to_string),
            api_url: None,
            temperature: None,
            max_tokens: None,
            timeout_ms: 1_000,
            max_concurrent_requests: 2,
        }
    }

    #[test]
    fn deserialize_config_from_toml() {
        let toml_str = r#"
provider = "openai"
model = "llama3.1:8b"
api_url = "http://localhost:11434"
temperature = 0.2
max_concurrent_requests = 4
"#;
        let config: LlmConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.provider, "openai");
        assert_eq!(config.model, "llama3.1:8b");
        assert_eq!(config.api_url.as_deref(), Some("http://localhost:11434"));
        assert!(config.api_key.is_none());
        assert_eq!(config.max_concurrent_requests, 4);
        assert_eq!(config.timeout_ms, 120_000);
    }

    #[test]
    fn explicit_key_wins() {
        let cfg = config("gemini", "gemini-2.5-flash", Some("from-file"));
        assert_eq!(cfg.resolve_api_key().as_deref(), Some("from-file"));
    }

    #[test]
    fn unknown_provider_has_no_env_var() {
        assert!(config("mystery", "m", None).api_key_env_var().is_none());
        assert_eq!(
            config("gemini", "m", None).api_key_env_var(),
            Some("GOOGLE_API_KEY")
        );
    }

    #[test]
    fn build_openai_client_without_key() {
        let client = build_llm_client(&config("openai", "llama3.1:8b", None)).unwrap();
        assert_eq!(client.model_name(), "llama3.1:8b");
    }

    #[test]
    fn build_keyed_clients() {
        let anthropic =
            build_llm_client(&config("anthropic", "claude-sonnet-4-20250514", Some("sk"))).unwrap();
        assert_eq!(anthropic.model_name(), "claude-sonnet-4-20250514");

        let gemini = build_llm_client(&config("gemini", "gemini-2.5-flash", Some("g"))).unwrap();
        assert_eq!(gemini.model_name(), "gemini-2.5-flash");
    }

    #[test]
    fn build_unknown_provider_fails() {
        match build_llm_client(&config("cohere", "command", Some("k"))) {
            Err(SolverError::Configuration(msg)) => assert!(msg.contains("cohere")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn semaphored_client_limits_concurrency() {
        use std::sync::atomic::{AtomicU32, Ordering};

        struct CountingClient {
            concurrent: Arc<AtomicU32>,
            max_seen: Arc<AtomicU32>,
        }

        #[async_trait]
        impl LlmClient for CountingClient {
            async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse> {
                let current = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_seen.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(tokio::time::Duration::from_millis(30)).await;
                self.concurrent.fetch_sub(1, Ordering::SeqCst);
                Ok(LlmResponse {
                    content: "ok".to_string(),
                    model: "test".to_string(),
                    usage: None,
                    finish_reason: None,
                })
            }
            fn model_name(&self) -> &str {
                "test"
            }
        }

        let max_seen = Arc::new(AtomicU32::new(0));
        let inner = Arc::new(CountingClient {
            concurrent: Arc::new(AtomicU32::new(0)),
            max_seen: max_seen.clone(),
        });
        let semaphored = Arc::new(SemaphoredClient::new(inner, 2));

        let mut handles = vec![];
        for _ in 0..6 {
            let client = semaphored.clone();
            handles.push(tokio::spawn(async move {
                client.complete(LlmRequest::default()).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }
}
