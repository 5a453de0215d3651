//! Stage definitions and the stage-to-role binding.

use leetcrew_common::{ProblemStatement, Result, SolverError, StageResult};

use crate::roles::{RoleId, RoleRegistry, RoleSpec};

const PROBLEM_PLACEHOLDER: &str = "{problem}";

/// One step of the pipeline.
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// 1-based position.
    pub index: usize,
    pub role: RoleId,
    /// Instructions for the worker. May contain `{problem}`.
    pub prompt_template: String,
    /// What a finished answer looks like. Shapes the worker's response only.
    pub expected_output: String,
}

impl StageSpec {
    pub fn new(
        index: usize,
        role: RoleId,
        prompt_template: impl Into<String>,
        expected_output: impl Into<String>,
    ) -> Self {
        Self {
            index,
            role,
            prompt_template: prompt_template.into(),
            expected_output: expected_output.into(),
        }
    }

    /// Build the prompt for this stage from the problem and every earlier result
    /// of the same run.
    pub fn render(&self, problem: &ProblemStatement, prior: &[StageResult]) -> String {
        let mut prompt = String::new();

        if !self.prompt_template.contains(PROBLEM_PLACEHOLDER) {
            prompt.push_str("--- Problem ---\n");
            prompt.push_str(problem.as_str());
            prompt.push_str("\n\n");
        }

        for result in prior {
            prompt.push_str(&format!(
                "--- Stage {} Output: {} ({}) ---\n{}\n\n",
                result.stage_index, result.agent_name, result.role_name, result.output
            ));
        }

        prompt.push_str(
            self.prompt_template
                .replace(PROBLEM_PLACEHOLDER, problem.as_str())
                .trim(),
        );
        prompt.push_str("\n\nExpected output: ");
        prompt.push_str(&self.expected_output);
        prompt
    }
}

/// The six stages, in execution order.
pub fn standard_stages() -> Vec<StageSpec> {
    vec![
        StageSpec::new(
            1,
            RoleId::ProblemAnalyzer,
            "Analyze this coding problem: {problem}

Extract and provide:
1. Problem summary in simple terms
2. Input format and constraints
3. Expected output format
4. Problem classification (array, string, DP, graph, etc.)
5. Key insights or patterns you notice

Format your response as structured analysis.",
            "Structured problem analysis with classification and key insights",
        ),
        StageSpec::new(
            2,
            RoleId::BaselineSolver,
            "Based on the problem analysis, create a brute-force solution.

Provide:
1. Step-by-step approach explanation
2. Pseudocode or algorithm outline
3. Time complexity analysis
4. Space complexity analysis
5. Why this approach works (correctness proof)

Focus on correctness over efficiency.",
            "Brute-force solution with complexity analysis and correctness explanation",
        ),
        StageSpec::new(
            3,
            RoleId::Optimizer,
            "Optimize the brute-force solution using advanced techniques.

Provide:
1. Identified bottlenecks in brute-force approach
2. Optimization strategy (data structures, algorithms)
3. Improved algorithm explanation
4. New time and space complexity
5. Trade-offs made during optimization

Aim for the most efficient solution possible.",
            "Optimized solution with improved complexity and detailed optimization rationale",
        ),
        StageSpec::new(
            4,
            RoleId::ValidatorTester,
            "Validate the optimized solution by identifying edge cases.

Provide:
1. List of critical edge cases to test
2. Potential failure scenarios
3. Input validation requirements
4. Boundary condition handling
5. Stress test considerations

Think like a thorough tester.",
            "Comprehensive edge case analysis with potential failure scenarios",
        ),
        StageSpec::new(
            5,
            RoleId::CodeAuthor,
            "Write the final Python implementation based on the optimized solution.

Requirements:
1. Clean, readable Python code
2. Proper variable naming and structure
3. Inline comments explaining key logic
4. LeetCode-style function signature
5. Handle edge cases identified earlier
6. Include complexity analysis as comments

Write production-ready code.",
            "Clean Python code with comments and complexity analysis",
        ),
        StageSpec::new(
            6,
            RoleId::Coordinator,
            "Coordinate all previous outputs into a final comprehensive solution.

Compile:
1. Problem explanation
2. Solution approach (brute-force vs optimized)
3. Final Python code
4. Complexity analysis
5. Edge cases covered
6. Any additional insights

Ensure consistency and completeness across all agent outputs.",
            "Final comprehensive solution with all components integrated",
        ),
    ]
}

/// Roles plus stages, checked for integrity once at startup.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    roles: RoleRegistry,
    stages: Vec<StageSpec>,
}

impl PipelineConfig {
    /// Stages must be numbered 1..=n in order, and each must name a role the
    /// registry defines.
    pub fn new(roles: RoleRegistry, stages: Vec<StageSpec>) -> Result<Self> {
        if stages.is_empty() {
            return Err(SolverError::Configuration(
                "Pipeline has no stages".to_string(),
            ));
        }
        for (position, stage) in stages.iter().enumerate() {
            if stage.index != position + 1 {
                return Err(SolverError::Configuration(format!(
                    "Stage at position {} has index {}; stages must be numbered 1..{} in order",
                    position + 1,
                    stage.index,
                    stages.len()
                )));
            }
            if roles.get(stage.role).is_none() {
                return Err(SolverError::Configuration(format!(
                    "Stage {} is bound to role '{}', which is not registered",
                    stage.index, stage.role
                )));
            }
        }
        Ok(Self { roles, stages })
    }

    pub fn standard() -> Self {
        Self {
            roles: RoleRegistry::standard(),
            stages: standard_stages(),
        }
    }

    pub fn stages_in_order(&self) -> &[StageSpec] {
        &self.stages
    }

    pub fn roles(&self) -> &RoleRegistry {
        &self.roles
    }

    /// The role bound to the 1-based `stage_index`.
    pub fn role_for(&self, stage_index: usize) -> Option<&RoleSpec> {
        let stage = self.stages.get(stage_index.checked_sub(1)?)?;
        self.roles.get(stage.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(stage_index: usize, output: &str) -> StageResult {
        StageResult {
            stage_index,
            agent_name: format!("Agent {stage_index}"),
            role_name: format!("Role {stage_index}"),
            output: output.to_string(),
            duration_ms: 0,
        }
    }

    #[test]
    fn standard_config_binds_six_stages() {
        let config = PipelineConfig::standard();
        assert_eq!(config.stages_in_order().len(), 6);
        let names: Vec<_> = (1..=6)
            .map(|i| config.role_for(i).unwrap().name.as_str())
            .collect();
        assert_eq!(
            names,
            [
                "Problem Analyzer",
                "Brute Force Agent",
                "Optimization Agent",
                "Edge Case Agent",
                "Code Generator",
                "Manager Agent"
            ]
        );
        assert!(config.role_for(0).is_none());
        assert!(config.role_for(7).is_none());
    }

    #[test]
    fn standard_stages_pass_integrity_check() {
        PipelineConfig::new(RoleRegistry::standard(), standard_stages()).unwrap();
    }

    #[test]
    fn out_of_order_stages_rejected() {
        let mut stages = standard_stages();
        stages.swap(1, 2);
        let err = PipelineConfig::new(RoleRegistry::standard(), stages).unwrap_err();
        assert!(matches!(err, SolverError::Configuration(_)));
    }

    #[test]
    fn unregistered_role_rejected() {
        let registry = RoleRegistry::new(Vec::new()).unwrap();
        let err = PipelineConfig::new(registry, standard_stages()).unwrap_err();
        assert!(err.to_string().contains("Stage 1"));
    }

    #[test]
    fn first_stage_prompt_embeds_problem_once() {
        let problem = ProblemStatement::parse("Reverse a linked list.").unwrap();
        let prompt = standard_stages()[0].render(&problem, &[]);
        assert!(prompt.starts_with("Analyze this coding problem: Reverse a linked list."));
        assert_eq!(prompt.matches("Reverse a linked list.").count(), 1);
        assert!(prompt.ends_with("Structured problem analysis with classification and key insights"));
    }

    #[test]
    fn later_stages_see_problem_and_all_prior_output() {
        let problem = ProblemStatement::parse("Two sum").unwrap();
        let prior = [result(1, "analysis text"), result(2, "brute force text")];
        let prompt = standard_stages()[2].render(&problem, &prior);

        assert!(prompt.contains("--- Problem ---\nTwo sum"));
        let first = prompt.find("analysis text").unwrap();
        let second = prompt.find("brute force text").unwrap();
        assert!(first < second);
        assert!(prompt.contains("--- Stage 2 Output: Agent 2 (Role 2) ---"));
        assert!(prompt.contains("Optimize the brute-force solution"));
    }
}
