//! Solver configuration: model backends and which role uses which backend.
//!
//! ```toml
//! [backends.default]
//! provider = "gemini"
//! model = "gemini-2.5-flash"
//! temperature = 0.1
//!
//! [backends.local]
//! provider = "openai"
//! model = "llama3.1:8b"
//! api_url = "http://localhost:11434"
//!
//! [bindings]
//! default = "default"
//!
//! [bindings.roles]
//! code_author = "local"
//!
//! [pipeline]
//! max_tool_rounds = 3
//! ```
//!
//! Config files are checked on Unix: they must be regular files, must not be
//! world-writable, and must not be world-readable when they hold an API key.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use leetcrew_common::{Result, SolverError};
use leetcrew_llm::{LlmConfig, build_llm_client};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::roles::RoleId;
use crate::worker::{DEFAULT_MAX_TOOL_ROUNDS, LlmWorker, Worker, WorkerPool};

const DEFAULT_BACKEND: &str = "default";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Named model backends.
    #[serde(default = "default_backends")]
    pub backends: BTreeMap<String, LlmConfig>,

    #[serde(default)]
    pub bindings: BindingsConfig,

    #[serde(default)]
    pub pipeline: PipelineSettings,
}

/// Backend binding policy: one default plus optional per-role overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingsConfig {
    #[serde(default = "default_backend_name")]
    pub default: String,

    /// Role id (e.g. `code_author`) to backend name.
    #[serde(default)]
    pub roles: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Tool calls a worker may make within one stage.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
}

fn default_backends() -> BTreeMap<String, LlmConfig> {
    BTreeMap::from([(DEFAULT_BACKEND.to_string(), LlmConfig::gemini_flash())])
}

fn default_backend_name() -> String {
    DEFAULT_BACKEND.into()
}

fn default_max_tool_rounds() -> usize {
    DEFAULT_MAX_TOOL_ROUNDS
}

impl Default for BindingsConfig {
    fn default() -> Self {
        Self {
            default: default_backend_name(),
            roles: BTreeMap::new(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            backends: default_backends(),
            bindings: BindingsConfig::default(),
            pipeline: PipelineSettings::default(),
        }
    }
}

impl SolverConfig {
    /// Load and validate a TOML config file, checking its permissions first.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();

        #[cfg(unix)]
        validate_config_file_permissions(path)?;

        let config = Self::from_file_unchecked(path)?;

        let keyed: Vec<_> = config
            .backends
            .iter()
            .filter(|(_, b)| b.api_key.is_some())
            .map(|(name, _)| name.as_str())
            .collect();
        if !keyed.is_empty() {
            warn!(
                backends = ?keyed,
                "API key found in config file '{}'. Prefer environment variables \
                 (OPENAI_API_KEY, ANTHROPIC_API_KEY, GOOGLE_API_KEY).",
                path.display()
            );
        }

        Ok(config)
    }

    /// Load and validate without permission checks.
    pub fn from_file_unchecked(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Every binding must name a defined backend and a known role.
    pub fn validate(&self) -> Result<()> {
        if !self.backends.contains_key(&self.bindings.default) {
            return Err(SolverError::Configuration(format!(
                "Default backend '{}' is not defined under [backends]",
                self.bindings.default
            )));
        }
        for (role, backend) in &self.bindings.roles {
            role.parse::<RoleId>()?;
            if !self.backends.contains_key(backend) {
                return Err(SolverError::Configuration(format!(
                    "Role '{role}' is bound to undefined backend '{backend}'"
                )));
            }
        }
        Ok(())
    }

    /// Role id to backend name for every role with an override.
    pub fn role_bindings(&self) -> Result<Vec<(RoleId, &str)>> {
        self.bindings
            .roles
            .iter()
            .map(|(role, backend)| Ok((role.parse::<RoleId>()?, backend.as_str())))
            .collect()
    }

    /// One worker per referenced backend, shared by every role bound to it.
    pub fn build_workers(&self) -> Result<WorkerPool> {
        self.validate()?;

        let mut built: HashMap<&str, Arc<dyn Worker>> = HashMap::new();
        let mut worker_for = |name: &str| -> Result<Arc<dyn Worker>> {
            let (name, backend) = self.backends.get_key_value(name).ok_or_else(|| {
                SolverError::Configuration(format!("Backend '{name}' is not defined"))
            })?;
            if let Some(worker) = built.get(name.as_str()) {
                return Ok(worker.clone());
            }

            let client = build_llm_client(backend)?;
            let worker: Arc<dyn Worker> = Arc::new(
                LlmWorker::new(name.as_str(), client)
                    .with_sampling(backend.temperature, backend.max_tokens)
                    .with_max_tool_rounds(self.pipeline.max_tool_rounds),
            );
            info!(
                backend = %name,
                provider = %backend.provider,
                model = %backend.model,
                "Configured worker backend"
            );
            built.insert(name.as_str(), worker.clone());
            Ok(worker)
        };

        let mut pool = WorkerPool::new(worker_for(&self.bindings.default)?);
        for (role, backend) in self.role_bindings()? {
            pool = pool.bind(role, worker_for(backend)?);
        }
        Ok(pool)
    }
}

/// Reject config files others could tamper with or read secrets from.
#[cfg(unix)]
fn validate_config_file_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::symlink_metadata(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;

    if !metadata.is_file() {
        anyhow::bail!(
            "Config path '{}' is not a regular file. Symlinks and directories are not allowed.",
            path.display()
        );
    }

    let permission_bits = metadata.permissions().mode() & 0o777;

    if permission_bits & 0o002 != 0 {
        anyhow::bail!(
            "Config file '{}' is world-writable (mode {:04o}). Fix with: chmod o-w {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    let content = std::fs::read_to_string(path)?;
    let has_api_key = content.lines().any(|line| {
        let line = line.trim_start();
        !line.starts_with('#') && line.starts_with("api_key")
    });

    if has_api_key && permission_bits & 0o004 != 0 {
        anyhow::bail!(
            "Config file '{}' contains an API key and is world-readable (mode {:04o}). \
             Fix with: chmod o-r {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[cfg(unix)]
    fn set_mode(file: &tempfile::NamedTempFile, mode: u32) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(mode)).unwrap();
    }

    #[test]
    fn default_config_uses_gemini_flash() {
        let config = SolverConfig::default();
        config.validate().unwrap();
        let backend = &config.backends["default"];
        assert_eq!(backend.provider, "gemini");
        assert_eq!(backend.model, "gemini-2.5-flash");
        assert_eq!(backend.temperature, Some(0.1));
        assert_eq!(config.pipeline.max_tool_rounds, 3);
    }

    #[test]
    fn parses_split_backend_bindings() {
        let config: SolverConfig = toml::from_str(
            r#"
[backends.default]
provider = "gemini"
model = "gemini-2.5-flash"

[backends.local]
provider = "openai"
model = "llama3.1:8b"

[bindings]
default = "default"

[bindings.roles]
baseline_solver = "local"
code_author = "local"

[pipeline]
max_tool_rounds = 5
"#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.pipeline.max_tool_rounds, 5);
        let bindings = config.role_bindings().unwrap();
        assert_eq!(
            bindings,
            vec![(RoleId::BaselineSolver, "local"), (RoleId::CodeAuthor, "local")]
        );
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config: SolverConfig = toml::from_str("").unwrap();
        assert!(config.backends.contains_key("default"));
        assert_eq!(config.bindings.default, "default");
    }

    #[test]
    fn undefined_backend_is_a_configuration_error() {
        let mut config = SolverConfig::default();
        config
            .bindings
            .roles
            .insert("optimizer".into(), "missing".into());
        let err = config.validate().unwrap_err();
        assert!(matches!(err, SolverError::Configuration(_)));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn unknown_role_is_a_configuration_error() {
        let mut config = SolverConfig::default();
        config.bindings.roles.insert("janitor".into(), "default".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn builds_shared_workers_per_backend() {
        let config: SolverConfig = toml::from_str(
            r#"
[backends.default]
provider = "openai"
model = "llama3.1:8b"

[backends.big]
provider = "openai"
model = "gpt-4o"
api_key = "sk-test"

[bindings.roles]
optimizer = "big"
coordinator = "big"
"#,
        )
        .unwrap();

        let pool = config.build_workers().unwrap();
        assert_eq!(pool.worker_for(RoleId::Optimizer).name(), "big");
        assert_eq!(pool.worker_for(RoleId::Coordinator).name(), "big");
        assert_eq!(pool.worker_for(RoleId::ProblemAnalyzer).name(), "default");
        assert!(Arc::ptr_eq(
            &pool.worker_for(RoleId::Optimizer),
            &pool.worker_for(RoleId::Coordinator)
        ));
    }

    #[test]
    fn load_config_from_file() {
        let file = write_config(
            r#"
[backends.default]
provider = "openai"
model = "llama3.1:8b"
"#,
        );
        #[cfg(unix)]
        set_mode(&file, 0o600);

        let config = SolverConfig::from_file(file.path()).unwrap();
        assert_eq!(config.backends["default"].model, "llama3.1:8b");
    }

    #[test]
    fn invalid_bindings_fail_to_load() {
        let file = write_config("[bindings]\ndefault = \"nowhere\"\n");
        assert!(SolverConfig::from_file_unchecked(file.path()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn world_writable_config_rejected() {
        let file = write_config("[pipeline]\nmax_tool_rounds = 1\n");
        set_mode(&file, 0o666);
        let err = SolverConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("world-writable"));
    }

    #[cfg(unix)]
    #[test]
    fn world_readable_key_rejected() {
        let file = write_config(
            "[backends.default]\nprovider = \"gemini\"\nmodel = \"gemini-2.5-flash\"\napi_key = \"secret\"\n",
        );
        set_mode(&file, 0o644);
        let err = SolverConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("world-readable"));

        set_mode(&file, 0o600);
        assert!(SolverConfig::from_file(file.path()).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_config_rejected() {
        let file = write_config("");
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("solver.toml");
        std::os::unix::fs::symlink(file.path(), &link).unwrap();
        let err = SolverConfig::from_file(&link).unwrap_err();
        assert!(err.to_string().contains("not a regular file"));
    }
}
