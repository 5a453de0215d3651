//! The specialist roles that staff the pipeline.
//!
//! Roles are configuration data. A [`RoleRegistry`] is built once at startup
//! and shared read-only by every run.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use leetcrew_common::{Result, SolverError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleId {
    ProblemAnalyzer,
    BaselineSolver,
    Optimizer,
    ValidatorTester,
    CodeAuthor,
    Coordinator,
}

impl RoleId {
    pub const ALL: [RoleId; 6] = [
        RoleId::ProblemAnalyzer,
        RoleId::BaselineSolver,
        RoleId::Optimizer,
        RoleId::ValidatorTester,
        RoleId::CodeAuthor,
        RoleId::Coordinator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleId::ProblemAnalyzer => "problem_analyzer",
            RoleId::BaselineSolver => "baseline_solver",
            RoleId::Optimizer => "optimizer",
            RoleId::ValidatorTester => "validator_tester",
            RoleId::CodeAuthor => "code_author",
            RoleId::Coordinator => "coordinator",
        }
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleId {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self> {
        RoleId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| SolverError::Configuration(format!("Unknown role: {s}")))
    }
}

/// Something a role may do beyond producing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Static syntax checking of candidate code.
    CodeValidation,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::CodeValidation => f.write_str("code_validation"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoleSpec {
    pub id: RoleId,
    /// Short agent name shown to callers, e.g. "Problem Analyzer".
    pub name: String,
    /// The persona the worker adopts, e.g. "Problem Understanding Specialist".
    pub title: String,
    pub objective: String,
    pub backstory: String,
    /// One-line summary for introspection.
    pub responsibility: String,
    pub capabilities: Vec<Capability>,
}

impl RoleSpec {
    /// Persona text used as the worker's system prompt.
    pub fn system_prompt(&self) -> String {
        format!(
            "You are the {}.\n\nYour goal: {}\n\n{}",
            self.title, self.objective, self.backstory
        )
    }

    fn standard(
        id: RoleId,
        name: &str,
        title: &str,
        objective: &str,
        backstory: &str,
        responsibility: &str,
        capabilities: &[Capability],
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            title: title.to_string(),
            objective: objective.to_string(),
            backstory: backstory.to_string(),
            responsibility: responsibility.to_string(),
            capabilities: capabilities.to_vec(),
        }
    }
}

/// Introspection view of one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleSummary {
    pub name: String,
    pub role: String,
    pub responsibility: String,
}

impl From<&RoleSpec> for RoleSummary {
    fn from(spec: &RoleSpec) -> Self {
        Self {
            name: spec.name.clone(),
            role: spec.title.clone(),
            responsibility: spec.responsibility.clone(),
        }
    }
}

/// Immutable lookup table of roles by id.
#[derive(Debug, Clone)]
pub struct RoleRegistry {
    roles: BTreeMap<RoleId, RoleSpec>,
}

impl RoleRegistry {
    /// Fails if two specs share an id.
    pub fn new(roles: Vec<RoleSpec>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for role in roles {
            let id = role.id;
            if map.insert(id, role).is_some() {
                return Err(SolverError::Configuration(format!(
                    "Role '{id}' is defined more than once"
                )));
            }
        }
        Ok(Self { roles: map })
    }

    /// The six specialists of the standard pipeline.
    pub fn standard() -> Self {
        let roles = [
            RoleSpec::standard(
                RoleId::ProblemAnalyzer,
                "Problem Analyzer",
                "Problem Understanding Specialist",
                "Extract and analyze the core problem requirements, constraints, and classify the problem type",
                "You are an expert at breaking down complex coding problems into clear, structured components. You identify patterns and classify problems accurately.",
                "Extract inputs, outputs, constraints, and classify problem type",
                &[],
            ),
            RoleSpec::standard(
                RoleId::BaselineSolver,
                "Brute Force Agent",
                "Baseline Solution Developer",
                "Create a working brute-force solution that prioritizes correctness over efficiency",
                "You specialize in creating straightforward, easy-to-understand solutions. You focus on correctness first, efficiency second.",
                "Generate naive solution with complexity analysis",
                &[],
            ),
            RoleSpec::standard(
                RoleId::Optimizer,
                "Optimization Agent",
                "Performance Optimization Expert",
                "Transform brute-force solutions into efficient algorithms using optimal data structures and techniques",
                "You are a master of algorithms and data structures. You can identify bottlenecks and apply the right optimization techniques.",
                "Improve efficiency using advanced algorithms",
                &[],
            ),
            RoleSpec::standard(
                RoleId::ValidatorTester,
                "Edge Case Agent",
                "Solution Validator and Tester",
                "Identify edge cases, potential bugs, and ensure solution robustness",
                "You have a keen eye for finding corner cases and potential failures. You think like a tester and debugger.",
                "Identify edge cases and potential bugs",
                &[Capability::CodeValidation],
            ),
            RoleSpec::standard(
                RoleId::CodeAuthor,
                "Code Generator",
                "Clean Code Author",
                "Write production-ready, well-commented Python code following LeetCode conventions",
                "You write clean, readable, and well-documented code. You follow best practices and coding standards.",
                "Write clean, production-ready Python code",
                &[],
            ),
            RoleSpec::standard(
                RoleId::Coordinator,
                "Manager Agent",
                "System Coordinator",
                "Orchestrate the problem-solving process and ensure coherent final output",
                "You coordinate multiple specialists to produce the best possible solution. You resolve conflicts and ensure quality.",
                "Coordinate agents and produce final solution",
                &[],
            ),
        ];

        Self {
            roles: roles.into_iter().map(|r| (r.id, r)).collect(),
        }
    }

    pub fn get(&self, id: RoleId) -> Option<&RoleSpec> {
        self.roles.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoleSpec> {
        self.roles.values()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}
