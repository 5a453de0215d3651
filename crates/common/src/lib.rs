//! Common types shared across leetcrew crates.
//!
//! This crate holds the error taxonomy and the per-request run model that the
//! pipeline, the LLM backends and the HTTP layer all speak.

pub mod error;
pub mod run;

pub use error::{Result, SolverError};
pub use run::{PROBLEM_REQUIRED, PipelineRun, ProblemStatement, RequestId, StageResult};
