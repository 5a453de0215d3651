//! Turns a finished run (or its failure) into the response callers consume.

use leetcrew_common::{PipelineRun, Result, SolverError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent: String,
    pub result: String,
}

/// Either every success field is set or only `error` is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveResponse {
    pub status: ResponseStatus,
    pub problem: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_results: Option<Vec<AgentResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles_used: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SolveResponse {
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    /// `problem` is the caller's raw text, used only on the error branch.
    pub fn from_result(problem: &str, result: &Result<PipelineRun>) -> Self {
        match result {
            Ok(run) => assemble(run),
            Err(e) => assemble_error(problem, e),
        }
    }
}

pub fn assemble(run: &PipelineRun) -> SolveResponse {
    let agent_results = run
        .stage_results
        .iter()
        .map(|r| AgentResult {
            agent: r.agent_name.clone(),
            result: r.output.clone(),
        })
        .collect();

    SolveResponse {
        status: ResponseStatus::Success,
        problem: run.problem.to_string(),
        solution: Some(run.terminal_output.clone()),
        agent_results: Some(agent_results),
        roles_used: Some(run.agent_names()),
        error: None,
    }
}

pub fn assemble_error(problem: &str, error: &SolverError) -> SolveResponse {
    SolveResponse {
        status: ResponseStatus::Error,
        problem: problem.trim().to_string(),
        solution: None,
        agent_results: None,
        roles_used: None,
        error: Some(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leetcrew_common::{ProblemStatement, RequestId, StageResult};

    fn run() -> PipelineRun {
        let stage_results: Vec<_> = ["Problem Analyzer", "Manager Agent"]
            .iter()
            .enumerate()
            .map(|(i, name)| StageResult {
                stage_index: i + 1,
                agent_name: name.to_string(),
                role_name: "role".into(),
                output: format!("output {}", i + 1),
                duration_ms: 5,
            })
            .collect();
        PipelineRun {
            request_id: RequestId::generate(),
            problem: ProblemStatement::parse("Two sum").unwrap(),
            terminal_output: "output 2".into(),
            stage_results,
        }
    }

    #[test]
    fn success_response_shape() {
        let json = serde_json::to_value(assemble(&run())).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["problem"], "Two sum");
        assert_eq!(json["solution"], "output 2");
        assert_eq!(json["agentResults"][0]["agent"], "Problem Analyzer");
        assert_eq!(json["agentResults"][1]["result"], "output 2");
        assert_eq!(json["rolesUsed"][1], "Manager Agent");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn error_response_has_only_error_fields() {
        let err = SolverError::StageExecution {
            stage: 3,
            role: "Performance Optimization Expert".into(),
            reason: "backend unreachable".into(),
        };
        let response = assemble_error(" Two sum ", &err);
        assert!(!response.is_success());

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["problem"], "Two sum");
        assert!(json["error"].as_str().unwrap().contains("Stage 3"));
        for absent in ["solution", "agentResults", "rolesUsed"] {
            assert!(json.get(absent).is_none(), "{absent} should be absent");
        }
    }
}
