//! Per-request run state: the problem being solved and what each stage produced.

use serde::{Deserialize, Serialize};

use crate::{Result, SolverError};

/// Message returned when the caller supplies no usable problem text.
pub const PROBLEM_REQUIRED: &str = "Problem description is required";

/// A non-blank problem description. Construction trims surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProblemStatement(String);

impl ProblemStatement {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SolverError::InvalidInput(PROBLEM_REQUIRED.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProblemStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque correlation token. Never interpreted, only threaded through logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// A fresh random (v4) identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Use the caller's token, or generate one when it is absent or blank.
    pub fn from_optional(raw: Option<String>) -> Self {
        match raw {
            Some(id) if !id.trim().is_empty() => Self(id),
            _ => Self::generate(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Output of one stage in one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// 1-based stage position.
    pub stage_index: usize,
    /// Display name of the agent bound to the stage (e.g. "Problem Analyzer").
    pub agent_name: String,
    /// Role title the agent played (e.g. "Problem Understanding Specialist").
    pub role_name: String,
    pub output: String,
    pub duration_ms: u64,
}

/// One complete end-to-end execution of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub request_id: RequestId,
    pub problem: ProblemStatement,
    pub stage_results: Vec<StageResult>,
    /// Output of the final (coordinator) stage.
    pub terminal_output: String,
}

impl PipelineRun {
    pub fn agent_names(&self) -> Vec<String> {
        self.stage_results
            .iter()
            .map(|r| r.agent_name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn problem_statement_trims() {
        let p = ProblemStatement::parse("  two sum \n").unwrap();
        assert_eq!(p.as_str(), "two sum");
    }

    #[test]
    fn blank_problem_is_rejected() {
        for raw in ["", "   ", "\n\t "] {
            match ProblemStatement::parse(raw) {
                Err(SolverError::InvalidInput(msg)) => assert!(msg.contains("required")),
                other => panic!("expected InvalidInput, got {other:?}"),
            }
        }
    }

    #[test]
    fn request_id_keeps_caller_token() {
        let id = RequestId::from_optional(Some("req-42".into()));
        assert_eq!(id.as_str(), "req-42");
    }

    #[test]
    fn request_id_generated_when_missing_or_blank() {
        let a = RequestId::from_optional(None);
        let b = RequestId::from_optional(Some("  ".into()));
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn request_ids_are_unique() {
        let ids: std::collections::HashSet<_> = (0..100).map(|_| RequestId::generate()).collect();
        assert_eq!(ids.len(), 100);
    }
}
