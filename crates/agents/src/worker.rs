//! Workers produce the text for one stage.
//!
//! The pipeline depends only on the [`Worker`] trait. [`LlmWorker`] is the
//! production implementation; which worker serves which role is decided by a
//! [`WorkerPool`].

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Instant;

use async_trait::async_trait;
use leetcrew_common::{RequestId, Result, SolverError};
use leetcrew_llm::{ChatMessage, LlmClient, LlmRequest};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::roles::{RoleId, RoleSpec};
use crate::tools::Tool;

static TOOL_CALL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<tool\s+name\s*=\s*"([^"]+)"\s*>(.*?)</tool>"#)
        .expect("tool call pattern is a valid regex")
});

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 3;

/// Everything a worker gets for one stage of one run.
#[derive(Clone)]
pub struct WorkerInvocation {
    pub request_id: RequestId,
    pub stage_index: usize,
    pub role: RoleSpec,
    pub prompt: String,
    /// Tools usable during this invocation only.
    pub tools: Vec<Arc<dyn Tool>>,
}

impl WorkerInvocation {
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn find_tool(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }
}

impl std::fmt::Debug for WorkerInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerInvocation")
            .field("request_id", &self.request_id)
            .field("stage_index", &self.stage_index)
            .field("role", &self.role.id)
            .field("prompt_len", &self.prompt.len())
            .field("tools", &self.tool_names())
            .finish()
    }
}

#[async_trait]
pub trait Worker: Send + Sync {
    /// Produce the stage output. Any error aborts the run.
    async fn invoke(&self, invocation: WorkerInvocation) -> Result<String>;

    /// Backend label used in logs.
    fn name(&self) -> &str;
}

/// A worker backed by a chat-completion model.
///
/// When tools are granted, the model may answer with a single
/// `<tool name="...">input</tool>` block instead of a final answer. The tool's
/// result is fed back and the model is asked again, up to `max_tool_rounds`
/// times.
pub struct LlmWorker {
    name: String,
    client: Arc<dyn LlmClient>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    max_tool_rounds: usize,
}

impl LlmWorker {
    pub fn new(name: impl Into<String>, client: Arc<dyn LlmClient>) -> Self {
        Self {
            name: name.into(),
            client,
            temperature: None,
            max_tokens: None,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_sampling(mut self, temperature: Option<f32>, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    fn system_prompt(role: &RoleSpec, tools: &[Arc<dyn Tool>]) -> String {
        let mut prompt = role.system_prompt();
        if tools.is_empty() {
            return prompt;
        }

        prompt.push_str("\n\nYou have access to the following tools:\n");
        for tool in tools {
            prompt.push_str(&format!("- {}: {}\n", tool.name(), tool.description()));
        }
        prompt.push_str(
            "\nTo use a tool, reply with only a block of the form \
             <tool name=\"TOOL NAME\">input</tool> and wait for the result. \
             When you are done, reply with your final answer and no tool block.",
        );
        prompt
    }
}

fn parse_tool_call(content: &str) -> Option<(String, String)> {
    let captures = TOOL_CALL_PATTERN.captures(content)?;
    let name = captures.get(1)?.as_str().trim().to_string();
    let input = captures.get(2)?.as_str().to_string();
    Some((name, input))
}

#[async_trait]
impl Worker for LlmWorker {
    async fn invoke(&self, invocation: WorkerInvocation) -> Result<String> {
        let WorkerInvocation {
            request_id,
            stage_index,
            role,
            prompt,
            tools,
        } = invocation;

        let system_prompt = Self::system_prompt(&role, &tools);
        let mut messages = vec![ChatMessage::user(prompt)];

        for round in 0..=self.max_tool_rounds {
            let start = Instant::now();
            let response = self
                .client
                .complete(LlmRequest {
                    system_prompt: Some(system_prompt.clone()),
                    messages: messages.clone(),
                    temperature: self.temperature,
                    max_tokens: self.max_tokens,
                })
                .await?;

            debug!(
                request_id = %request_id,
                stage = stage_index,
                backend = %self.name,
                model = %response.model,
                round,
                duration_ms = start.elapsed().as_millis() as u64,
                output_len = response.content.len(),
                "Model responded"
            );

            let content = response.content.trim().to_string();
            if content.is_empty() {
                return Err(SolverError::Llm(format!(
                    "{} returned an empty response",
                    self.client.model_name()
                )));
            }

            if tools.is_empty() {
                return Ok(content);
            }
            let Some((tool_name, tool_input)) = parse_tool_call(&content) else {
                return Ok(content);
            };

            if round == self.max_tool_rounds {
                return Err(SolverError::Tool(format!(
                    "Tool call budget of {} rounds exhausted",
                    self.max_tool_rounds
                )));
            }

            let Some(tool) = tools.iter().find(|t| t.name() == tool_name) else {
                warn!(
                    request_id = %request_id,
                    stage = stage_index,
                    role = %role.id,
                    tool = %tool_name,
                    "Model requested a tool the role does not have"
                );
                return Err(SolverError::Tool(format!(
                    "Role '{}' has no tool named '{}'",
                    role.id, tool_name
                )));
            };

            let tool_output = tool.call(&tool_input);
            info!(
                request_id = %request_id,
                stage = stage_index,
                role = %role.id,
                tool = %tool_name,
                event = "tool_call",
                "Tool invoked"
            );

            messages.push(ChatMessage::assistant(content));
            messages.push(ChatMessage::user(format!(
                "Tool result from {tool_name}:\n{tool_output}\n\nContinue with your answer."
            )));
        }

        Err(SolverError::Tool(format!(
            "Tool call budget of {} rounds exhausted",
            self.max_tool_rounds
        )))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Which worker serves which role. Roles without an explicit binding use the
/// default worker.
#[derive(Clone)]
pub struct WorkerPool {
    default: Arc<dyn Worker>,
    bindings: HashMap<RoleId, Arc<dyn Worker>>,
}

impl WorkerPool {
    pub fn new(default: Arc<dyn Worker>) -> Self {
        Self {
            default,
            bindings: HashMap::new(),
        }
    }

    pub fn bind(mut self, role: RoleId, worker: Arc<dyn Worker>) -> Self {
        self.bindings.insert(role, worker);
        self
    }

    pub fn worker_for(&self, role: RoleId) -> Arc<dyn Worker> {
        self.bindings
            .get(&role)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bindings: HashMap<_, _> = self
            .bindings
            .iter()
            .map(|(role, worker)| (role.as_str(), worker.name().to_string()))
            .collect();
        f.debug_struct("WorkerPool")
            .field("default", &self.default.name())
            .field("bindings", &bindings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::RoleRegistry;
    use crate::tools::CodeValidatorTool;
    use leetcrew_llm::LlmResponse;
    use std::sync::Mutex;

    /// Replays canned completions and records each request.
    struct CannedClient {
        replies: Mutex<Vec<String>>,
        requests: Mutex<Vec<LlmRequest>>,
    }

    impl CannedClient {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmClient for CannedClient {
        async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
            self.requests.lock().unwrap().push(request);
            let content = self.replies.lock().unwrap().pop().unwrap_or_default();
            Ok(LlmResponse {
                content,
                model: "canned".into(),
                usage: None,
                finish_reason: None,
            })
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    fn invocation(role: RoleId, tools: Vec<Arc<dyn Tool>>) -> WorkerInvocation {
        WorkerInvocation {
            request_id: RequestId::from_optional(Some("req-1".into())),
            stage_index: 4,
            role: RoleRegistry::standard().get(role).cloned().unwrap(),
            prompt: "Check the solution".into(),
            tools,
        }
    }

    fn validator() -> Vec<Arc<dyn Tool>> {
        vec![Arc::new(CodeValidatorTool::new())]
    }

    #[test]
    fn parses_tool_block() {
        let (name, input) =
            parse_tool_call("Let me check.\n<tool name=\"Code Validator\">x = 1\n</tool>").unwrap();
        assert_eq!(name, "Code Validator");
        assert_eq!(input, "x = 1\n");
        assert!(parse_tool_call("no tools here").is_none());
    }

    #[tokio::test]
    async fn plain_answer_returned_trimmed() {
        let client = CannedClient::new(&["  final answer \n"]);
        let worker = LlmWorker::new("default", client.clone());
        let out = worker
            .invoke(invocation(RoleId::Optimizer, Vec::new()))
            .await
            .unwrap();
        assert_eq!(out, "final answer");

        let requests = client.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let system = requests[0].system_prompt.as_deref().unwrap();
        assert!(system.contains("Performance Optimization Expert"));
        assert!(!system.contains("access to the following tools"));
    }

    #[tokio::test]
    async fn tool_result_is_fed_back() {
        let client = CannedClient::new(&[
            "<tool name=\"Code Validator\">def f(x)\n    return x</tool>",
            "The code has a missing colon on line 1.",
        ]);
        let worker = LlmWorker::new("default", client.clone());
        let out = worker
            .invoke(invocation(RoleId::ValidatorTester, validator()))
            .await
            .unwrap();
        assert_eq!(out, "The code has a missing colon on line 1.");

        let requests = client.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].system_prompt.as_deref().unwrap().contains("Code Validator"));
        let feedback = &requests[1].messages[2].content;
        assert!(feedback.contains("Syntax Error"), "{feedback}");
        assert!(feedback.contains("expected ':'"));
    }

    #[tokio::test]
    async fn tool_budget_is_enforced() {
        let call = "<tool name=\"Code Validator\">x = 1</tool>";
        let client = CannedClient::new(&[call, call, call]);
        let worker = LlmWorker::new("default", client).with_max_tool_rounds(2);
        let err = worker
            .invoke(invocation(RoleId::ValidatorTester, validator()))
            .await
            .unwrap_err();
        assert!(matches!(err, SolverError::Tool(_)));
    }

    #[tokio::test]
    async fn unknown_tool_is_a_capability_error() {
        let client = CannedClient::new(&["<tool name=\"Shell\">rm -rf /</tool>"]);
        let worker = LlmWorker::new("default", client);
        let err = worker
            .invoke(invocation(RoleId::ValidatorTester, validator()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Shell"));
    }

    #[tokio::test]
    async fn tool_block_ignored_without_tools() {
        let client = CannedClient::new(&["<tool name=\"Code Validator\">x</tool>"]);
        let worker = LlmWorker::new("default", client.clone());
        let out = worker
            .invoke(invocation(RoleId::CodeAuthor, Vec::new()))
            .await
            .unwrap();
        assert!(out.starts_with("<tool"));
        assert_eq!(client.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_response_is_an_error() {
        let client = CannedClient::new(&["   "]);
        let worker = LlmWorker::new("default", client);
        let err = worker
            .invoke(invocation(RoleId::Optimizer, Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, SolverError::Llm(_)));
    }

    #[test]
    fn pool_falls_back_to_default() {
        let default: Arc<dyn Worker> =
            Arc::new(LlmWorker::new("gemini", CannedClient::new(&[])));
        let coder: Arc<dyn Worker> = Arc::new(LlmWorker::new("ollama", CannedClient::new(&[])));
        let pool = WorkerPool::new(default).bind(RoleId::CodeAuthor, coder);

        assert_eq!(pool.worker_for(RoleId::CodeAuthor).name(), "ollama");
        assert_eq!(pool.worker_for(RoleId::Coordinator).name(), "gemini");
    }
}
