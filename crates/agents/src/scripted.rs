//! A deterministic [`Worker`] for tests. Built only under `cfg(test)` or the
//! `testing` feature.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use leetcrew_common::{Result, SolverError};

use crate::roles::RoleId;
use crate::worker::{Worker, WorkerInvocation};

/// What a [`ScriptedWorker`] saw on one call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub request_id: String,
    pub stage_index: usize,
    pub role: RoleId,
    pub prompt: String,
    pub tool_names: Vec<String>,
}

#[derive(Debug, Clone)]
enum Script {
    Reply(String),
    Fail(String),
    UseTool { tool: String, input: String },
}

#[derive(Default)]
struct ScriptState {
    scripts: HashMap<usize, Script>,
    calls: Vec<RecordedCall>,
}

/// Answers each stage from a script and records every invocation.
///
/// Unscripted stages answer `"<agent name> output for stage <n>"`.
#[derive(Clone)]
pub struct ScriptedWorker {
    name: String,
    delay: Option<Duration>,
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedWorker {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delay: None,
            state: Arc::new(Mutex::new(ScriptState::default())),
        }
    }

    pub fn reply(self, stage_index: usize, text: impl Into<String>) -> Self {
        self.script(stage_index, Script::Reply(text.into()))
    }

    /// Fail the given stage with an LLM error.
    pub fn fail_at(self, stage_index: usize, reason: impl Into<String>) -> Self {
        self.script(stage_index, Script::Fail(reason.into()))
    }

    /// Call the named tool with `input` at the given stage and answer with its
    /// result. Fails if the invocation did not grant that tool.
    pub fn use_tool(
        self,
        stage_index: usize,
        tool: impl Into<String>,
        input: impl Into<String>,
    ) -> Self {
        self.script(
            stage_index,
            Script::UseTool {
                tool: tool.into(),
                input: input.into(),
            },
        )
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Calls made for a given stage.
    pub fn calls_for_stage(&self, stage_index: usize) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.stage_index == stage_index)
            .count()
    }

    fn script(self, stage_index: usize, script: Script) -> Self {
        self.lock().scripts.insert(stage_index, script);
        self
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    async fn invoke(&self, invocation: WorkerInvocation) -> Result<String> {
        let script = {
            let mut state = self.lock();
            state.calls.push(RecordedCall {
                request_id: invocation.request_id.to_string(),
                stage_index: invocation.stage_index,
                role: invocation.role.id,
                prompt: invocation.prompt.clone(),
                tool_names: invocation.tool_names(),
            });
            state.scripts.get(&invocation.stage_index).cloned()
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match script {
            Some(Script::Reply(text)) => Ok(text),
            Some(Script::Fail(reason)) => Err(SolverError::Llm(reason)),
            Some(Script::UseTool { tool, input }) => {
                let tool = invocation.find_tool(&tool).ok_or_else(|| {
                    SolverError::Tool(format!(
                        "Role '{}' has no tool named '{}'",
                        invocation.role.id, tool
                    ))
                })?;
                Ok(format!("{} reports: {}", tool.name(), tool.call(&input)))
            }
            None => Ok(format!(
                "{} output for stage {}",
                invocation.role.name, invocation.stage_index
            )),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
