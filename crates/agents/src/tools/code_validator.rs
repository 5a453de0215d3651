use super::Tool;
use super::syntax::SyntaxValidator;

/// Exposes [`SyntaxValidator`] to workers under the name "Code Validator".
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeValidatorTool {
    validator: SyntaxValidator,
}

impl CodeValidatorTool {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tool for CodeValidatorTool {
    fn name(&self) -> &str {
        "Code Validator"
    }

    fn description(&self) -> &str {
        "Checks Python code for syntax errors without running it. Input: the code."
    }

    fn call(&self, input: &str) -> String {
        self.validator.validate(strip_code_fence(input)).message
    }
}

/// Models usually wrap code in a Markdown fence; validate only the body.
fn strip_code_fence(input: &str) -> &str {
    let trimmed = input.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return input;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => return input,
    };
    body.strip_suffix("```").unwrap_or(body)
}
