//! Multi-role coding-problem solver.
//!
//! A problem statement flows through six specialist stages, each handled by a
//! role-bound [`Worker`]:
//!
//! ```text
//!  problem ──▶ 1 Problem Analyzer ──▶ 2 Brute Force Agent ──▶ 3 Optimization Agent
//!                                                                    │
//!  response ◀── 6 Manager Agent ◀── 5 Code Generator ◀── 4 Edge Case Agent
//!                                                        (Code Validator tool)
//! ```
//!
//! Every stage sees the problem and all earlier outputs of its run. Roles,
//! stages, workers and tools are assembled once into a [`Pipeline`] and shared
//! by concurrent runs.

pub mod assembler;
pub mod config;
pub mod pipeline;
pub mod roles;
#[cfg(any(test, feature = "testing"))]
pub mod scripted;
pub mod stages;
pub mod tools;
pub mod worker;

pub use assembler::{AgentResult, ResponseStatus, SolveResponse, assemble, assemble_error};
pub use config::SolverConfig;
pub use pipeline::Pipeline;
pub use roles::{Capability, RoleId, RoleRegistry, RoleSpec, RoleSummary};
#[cfg(any(test, feature = "testing"))]
pub use scripted::{RecordedCall, ScriptedWorker};
pub use stages::{PipelineConfig, StageSpec, standard_stages};
pub use tools::{CodeValidatorTool, SyntaxValidator, Tool, ToolBox, ValidationVerdict};
pub use worker::{LlmWorker, Worker, WorkerInvocation, WorkerPool};
