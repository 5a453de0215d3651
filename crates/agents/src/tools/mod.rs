//! Tools that roles may invoke while producing their stage output.

mod code_validator;
mod syntax;

use std::collections::HashMap;
use std::sync::Arc;

use leetcrew_common::{Result, SolverError};

use crate::roles::{Capability, RoleRegistry, RoleSpec};

pub use code_validator::CodeValidatorTool;
pub use syntax::{SyntaxValidator, ValidationVerdict};

/// A synchronous, side-effect-free helper a worker can call by name.
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// One-line usage hint shown to the model.
    fn description(&self) -> &str;

    /// Run the tool. Failures are reported in the returned text.
    fn call(&self, input: &str) -> String;
}

/// Maps each capability to the tool that provides it.
#[derive(Clone, Default)]
pub struct ToolBox {
    tools: HashMap<Capability, Arc<dyn Tool>>,
}

impl ToolBox {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every capability the standard roles use.
    pub fn standard() -> Self {
        Self::empty().with_tool(Capability::CodeValidation, Arc::new(CodeValidatorTool::new()))
    }

    pub fn with_tool(mut self, capability: Capability, tool: Arc<dyn Tool>) -> Self {
        self.tools.insert(capability, tool);
        self
    }

    /// Tools granted to `role`, in the order its capabilities are listed.
    pub fn tools_for(&self, role: &RoleSpec) -> Vec<Arc<dyn Tool>> {
        role.capabilities
            .iter()
            .filter_map(|cap| self.tools.get(cap).cloned())
            .collect()
    }

    /// Fails if any role declares a capability with no registered tool.
    pub fn check_covers(&self, registry: &RoleRegistry) -> Result<()> {
        for role in registry.iter() {
            for cap in &role.capabilities {
                if !self.tools.contains_key(cap) {
                    return Err(SolverError::Configuration(format!(
                        "Role '{}' requires capability '{}' but no tool provides it",
                        role.id, cap
                    )));
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ToolBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.tools.values().map(|t| t.name().to_string()).collect();
        names.sort();
        f.debug_struct("ToolBox").field("tools", &names).finish()
    }
}
