//! The sequential solver pipeline.
//!
//! A run executes every stage strictly in order. Each stage's prompt carries
//! the problem and all earlier outputs of the same run. The first worker
//! failure aborts the run; nothing is retried and no partial run is returned.

use std::time::{Duration, Instant};

use leetcrew_common::{
    PipelineRun, ProblemStatement, RequestId, Result, SolverError, StageResult,
};
use tracing::{debug, error, info};

use crate::assembler::{SolveResponse, assemble, assemble_error};
use crate::roles::RoleSummary;
use crate::stages::PipelineConfig;
use crate::tools::ToolBox;
use crate::worker::{WorkerInvocation, WorkerPool};

/// Shared by all concurrent runs; holds no per-run state.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    workers: WorkerPool,
    tools: ToolBox,
}

impl Pipeline {
    /// Fails when a role needs a capability the toolbox cannot provide.
    pub fn new(config: PipelineConfig, workers: WorkerPool, tools: ToolBox) -> Result<Self> {
        tools.check_covers(config.roles())?;
        Ok(Self {
            config,
            workers,
            tools,
        })
    }

    /// The six standard stages and roles with the standard tools.
    pub fn standard(workers: WorkerPool) -> Result<Self> {
        Self::new(PipelineConfig::standard(), workers, ToolBox::standard())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Every role in stage order.
    pub fn roster(&self) -> Vec<RoleSummary> {
        self.config
            .stages_in_order()
            .iter()
            .filter_map(|stage| self.config.role_for(stage.index))
            .map(RoleSummary::from)
            .collect()
    }

    pub fn agent_names(&self) -> Vec<String> {
        self.roster().into_iter().map(|r| r.name).collect()
    }

    /// Run every stage for `problem`. A missing request id is generated.
    pub async fn run(&self, problem: &str, request_id: Option<RequestId>) -> Result<PipelineRun> {
        let request_id = request_id.unwrap_or_else(RequestId::generate);
        let problem = match ProblemStatement::parse(problem) {
            Ok(p) => p,
            Err(e) => {
                info!(
                    request_id = %request_id,
                    event = "solve_request_invalid",
                    "Rejected problem: {e}"
                );
                return Err(e);
            }
        };

        let start_time = Instant::now();
        let stages = self.config.stages_in_order();
        info!(
            request_id = %request_id,
            stages = stages.len(),
            problem_len = problem.as_str().len(),
            event = "pipeline_start",
            "Starting solver pipeline"
        );

        let mut stage_results: Vec<StageResult> = Vec::with_capacity(stages.len());

        for stage in stages {
            let role = self.config.role_for(stage.index).ok_or_else(|| {
                SolverError::Configuration(format!("No role bound to stage {}", stage.index))
            })?;
            let worker = self.workers.worker_for(role.id);
            let stage_start = Instant::now();

            info!(
                request_id = %request_id,
                stage = stage.index,
                role = %role.id,
                agent = %role.name,
                backend = %worker.name(),
                event = "stage_start",
                "Executing stage"
            );

            let invocation = WorkerInvocation {
                request_id: request_id.clone(),
                stage_index: stage.index,
                role: role.clone(),
                prompt: stage.render(&problem, &stage_results),
                tools: self.tools.tools_for(role),
            };

            let outcome = worker.invoke(invocation).await.and_then(|output| {
                if output.trim().is_empty() {
                    Err(SolverError::Llm("worker returned empty output".to_string()))
                } else {
                    Ok(output)
                }
            });

            let output = match outcome {
                Ok(output) => output,
                Err(e) => {
                    error!(
                        request_id = %request_id,
                        stage = stage.index,
                        role = %role.id,
                        agent = %role.name,
                        completed_stages = stage_results.len(),
                        duration_ms = stage_start.elapsed().as_millis() as u64,
                        error = %e,
                        event = "stage_failed",
                        "Stage failed, aborting run"
                    );
                    return Err(SolverError::StageExecution {
                        stage: stage.index,
                        role: role.title.clone(),
                        reason: e.to_string(),
                    });
                }
            };

            let duration_ms = stage_start.elapsed().as_millis() as u64;
            debug!(
                request_id = %request_id,
                stage = stage.index,
                role = %role.id,
                output_len = output.len(),
                duration_ms,
                event = "stage_complete",
                "Stage completed"
            );

            stage_results.push(StageResult {
                stage_index: stage.index,
                agent_name: role.name.clone(),
                role_name: role.title.clone(),
                output,
                duration_ms,
            });
        }

        let terminal_output = stage_results
            .last()
            .map(|r| r.output.clone())
            .unwrap_or_default();

        info!(
            request_id = %request_id,
            stages = stage_results.len(),
            duration_ms = start_time.elapsed().as_millis() as u64,
            event = "pipeline_complete",
            "Solver pipeline completed"
        );

        Ok(PipelineRun {
            request_id,
            problem,
            stage_results,
            terminal_output,
        })
    }

    /// [`run`](Self::run) under a wall-clock limit. On expiry the in-flight
    /// worker call is dropped.
    pub async fn run_with_timeout(
        &self,
        problem: &str,
        request_id: Option<RequestId>,
        limit: Duration,
    ) -> Result<PipelineRun> {
        let request_id = request_id.unwrap_or_else(RequestId::generate);
        match tokio::time::timeout(limit, self.run(problem, Some(request_id.clone()))).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    request_id = %request_id,
                    limit_secs = limit.as_secs_f64(),
                    event = "pipeline_timeout",
                    "Solver pipeline timed out"
                );
                Err(SolverError::Timeout(format!("solver run exceeded {limit:?}")))
            }
        }
    }

    /// Run and assemble the caller-facing response. Never fails.
    pub async fn solve(&self, problem: &str, request_id: Option<RequestId>) -> SolveResponse {
        match self.run(problem, request_id).await {
            Ok(run) => assemble(&run),
            Err(e) => assemble_error(problem, &e),
        }
    }
}
