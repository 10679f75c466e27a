//! Harness and per-scenario configuration.
//!
//! Harness-wide settings come from the command line. A scenario root may carry
//! a `scenario.json` with its own defaults; explicit CLI values win over it,
//! and it wins over the built-in defaults.
use crate::cli::RunArgs;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SCENARIO_CONFIG_FILE: &str = "scenario.json";
pub const DEFAULT_EXEC_NAME: &str = "test";
pub const DEFAULT_PATCH_TOOL: &str = "./katana";
pub const DEFAULT_ESCALATE_WITH: &str = "sudo";
pub const DEFAULT_SETTLE_MS: u64 = 500;
pub const DEFAULT_OBSERVE_MS: u64 = 500;
pub const DEFAULT_TERMINATE_GRACE_MS: u64 = 1000;

/// Optional `scenario.json` in a scenario root.
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub exec_name: Option<String>,
    #[serde(default)]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub elevated: Option<bool>,
    #[serde(default)]
    pub settle_ms: Option<u64>,
    #[serde(default)]
    pub observe_ms: Option<u64>,
}

/// Load `scenario.json` when present; a missing file means "no overrides".
pub fn load_scenario_config(root: &Path) -> Result<ScenarioConfig> {
    let path = root.join(SCENARIO_CONFIG_FILE);
    if !path.exists() {
        return Ok(ScenarioConfig::default());
    }
    let bytes = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
    let config: ScenarioConfig =
        serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))?;
    if let Some(exec_name) = config.exec_name.as_deref() {
        if exec_name.trim().is_empty() {
            return Err(anyhow!("{}: exec_name must be non-empty", path.display()));
        }
    }
    Ok(config)
}

/// Values given on the command line that apply to every scenario of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioOverrides {
    pub exec_name: Option<String>,
    pub args: Option<Vec<String>>,
    pub elevated: bool,
    pub settle_ms: Option<u64>,
    pub observe_ms: Option<u64>,
}

impl ScenarioOverrides {
    pub fn from_args(args: &RunArgs) -> Self {
        Self {
            exec_name: args.exec_name.clone(),
            args: (!args.target_args.is_empty()).then(|| args.target_args.clone()),
            elevated: args.elevated,
            settle_ms: args.settle_ms,
            observe_ms: args.observe_ms,
        }
    }

    /// Same overrides, but with a designated executable name.
    pub fn with_exec_name(&self, exec_name: &str) -> Self {
        Self {
            exec_name: Some(exec_name.to_string()),
            ..self.clone()
        }
    }
}

/// Settings shared by every scenario of one harness run.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub patch_tool: PathBuf,
    /// Command prefix for elevated launch and termination, e.g. `sudo -n`.
    pub escalate_with: Vec<String>,
    pub terminate_grace: Duration,
}

impl HarnessConfig {
    pub fn resolve(args: &RunArgs) -> Result<Self> {
        let patch_tool = resolve_program(&args.patch_tool).context("resolve patch tool")?;
        let escalate_with = shell_words::split(&args.escalate_with)
            .with_context(|| format!("parse --escalate-with {:?}", args.escalate_with))?;
        if escalate_with.is_empty() {
            return Err(anyhow!("--escalate-with must name a command"));
        }
        Ok(Self {
            patch_tool,
            escalate_with,
            terminate_grace: Duration::from_millis(args.terminate_grace_ms),
        })
    }
}

/// Paths are taken as given (made absolute); bare names are looked up on PATH.
pub fn resolve_program(raw: &str) -> Result<PathBuf> {
    if raw.trim().is_empty() {
        return Err(anyhow!("program name is empty"));
    }
    if raw.contains('/') {
        let path = Path::new(raw);
        if !path.is_file() {
            return Err(anyhow!("{raw} does not exist"));
        }
        return path
            .canonicalize()
            .with_context(|| format!("resolve {raw}"));
    }
    which::which(raw).with_context(|| format!("{raw} not found on PATH"))
}
