//! Scenario model.
//!
//! A scenario root holds an old program tree (`v0`), a new one (`v1`), a
//! `validate.json`, and optionally a `scenario.json`. The harness writes its
//! per-scenario artifacts next to them and leaves them for inspection.
use crate::config::{
    load_scenario_config, ScenarioOverrides, DEFAULT_EXEC_NAME, DEFAULT_OBSERVE_MS,
    DEFAULT_SETTLE_MS,
};
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const OLD_TREE: &str = "v0";
pub const NEW_TREE: &str = "v1";

/// One self-contained generate/apply/validate case. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub name: String,
    pub root: PathBuf,
    pub old_tree: PathBuf,
    pub new_tree: PathBuf,
    pub exec_name: String,
    pub args: Vec<String>,
    pub elevated: bool,
    pub settle: Duration,
    pub observe: Duration,
}

impl Scenario {
    pub fn load(root: &Path, overrides: &ScenarioOverrides) -> Result<Self> {
        if !root.is_dir() {
            return Err(anyhow!("scenario root {} is not a directory", root.display()));
        }
        let old_tree = root.join(OLD_TREE);
        let new_tree = root.join(NEW_TREE);
        for tree in [&old_tree, &new_tree] {
            if !tree.is_dir() {
                return Err(anyhow!("missing program tree {}", tree.display()));
            }
        }
        let config = load_scenario_config(root)?;

        let exec_name = overrides
            .exec_name
            .clone()
            .or(config.exec_name)
            .unwrap_or_else(|| DEFAULT_EXEC_NAME.to_string());
        let args = overrides
            .args
            .clone()
            .or(config.args)
            .unwrap_or_default();
        let elevated = overrides.elevated || config.elevated.unwrap_or(false);
        let settle_ms = overrides
            .settle_ms
            .or(config.settle_ms)
            .unwrap_or(DEFAULT_SETTLE_MS);
        let observe_ms = overrides
            .observe_ms
            .or(config.observe_ms)
            .unwrap_or(DEFAULT_OBSERVE_MS);

        let name = root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());

        Ok(Self {
            name,
            root: root.to_path_buf(),
            old_tree,
            new_tree,
            exec_name,
            args,
            elevated,
            settle: Duration::from_millis(settle_ms),
            observe: Duration::from_millis(observe_ms),
        })
    }

    /// The program that gets launched and patched.
    pub fn target_path(&self) -> PathBuf {
        self.old_tree.join(&self.exec_name)
    }

    pub fn paths(&self) -> ScenarioPaths {
        ScenarioPaths::new(&self.root)
    }
}

/// Files the harness creates inside a scenario root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioPaths {
    pub captured_log: PathBuf,
    pub target_stderr: PathBuf,
    pub artifact: PathBuf,
    pub generate_stdout: PathBuf,
    pub generate_stderr: PathBuf,
    pub apply_stdout: PathBuf,
    pub apply_stderr: PathBuf,
}

impl ScenarioPaths {
    pub fn new(root: &Path) -> Self {
        Self {
            captured_log: root.join("log"),
            target_stderr: root.join("target_err.log"),
            artifact: root.join("patch.po"),
            generate_stdout: root.join("generate.log"),
            generate_stderr: root.join("generate_err.log"),
            apply_stdout: root.join("apply.log"),
            apply_stderr: root.join("apply_err.log"),
        }
    }
}
