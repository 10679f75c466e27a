//! Scenario discovery and the pass/fail tally.
use crate::cli::RunArgs;
use crate::config::{HarnessConfig, ScenarioOverrides};
use crate::diagnostics::DiagnosticLog;
use crate::runner::{record_load_failure, run_scenario, RunContext, ScenarioError};
use crate::scenario::Scenario;
use crate::validator::load_validator;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Only directories whose names start with this are scenarios.
pub const SCENARIO_DIR_PREFIX: &str = "t";
pub const DEFAULT_SCENARIO_DIR: &str = "tests";
/// Real-world scenarios run after the synthetic ones, with their executable.
pub const REAL_WORLD_SCENARIOS: &[(&str, &str)] = &[("real_tests/apache", "httpd")];

/// Progress messages are dot-padded to this many columns.
const PROGRESS_WIDTH: usize = 35;

/// One scenario to run, with the overrides that apply to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioRequest {
    pub root: PathBuf,
    pub label: String,
    pub overrides: ScenarioOverrides,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTally {
    pub passed: usize,
    pub total: usize,
}

impl RunTally {
    pub fn record(&mut self, pass: bool) {
        self.total += 1;
        if pass {
            self.passed += 1;
        }
    }

    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }
}

/// Which scenarios the command line asks for, in run order.
pub fn discover(args: &RunArgs) -> Result<Vec<ScenarioRequest>> {
    let overrides = ScenarioOverrides::from_args(args);
    match (&args.scenario, args.run_directory) {
        (Some(root), false) => {
            if !root.is_dir() {
                return Err(anyhow!("scenario {} is not a directory", root.display()));
            }
            Ok(vec![ScenarioRequest {
                root: root.clone(),
                label: scenario_label(root),
                overrides,
            }])
        }
        (Some(dir), true) => scenarios_in(dir, &overrides),
        (None, _) => {
            let mut requests = scenarios_in(&args.root.join(DEFAULT_SCENARIO_DIR), &overrides)?;
            // Always counted: a missing real-world scenario fails when loaded.
            for (relative, exec_name) in REAL_WORLD_SCENARIOS {
                let root = args.root.join(relative);
                if !root.is_dir() {
                    tracing::warn!(scenario = %root.display(), "real-world scenario missing");
                }
                requests.push(ScenarioRequest {
                    label: scenario_label(&root),
                    root,
                    overrides: overrides.with_exec_name(exec_name),
                });
            }
            Ok(requests)
        }
    }
}

/// Immediate `t*` subdirectories of `dir`, sorted by name.
pub fn scenarios_in(dir: &Path, overrides: &ScenarioOverrides) -> Result<Vec<ScenarioRequest>> {
    let entries = fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))?;
    let mut roots = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("read {}", dir.display()))?;
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(SCENARIO_DIR_PREFIX) {
            continue;
        }
        if entry.path().is_dir() {
            roots.push(entry.path());
        }
    }
    roots.sort();
    Ok(roots
        .into_iter()
        .map(|root| ScenarioRequest {
            label: scenario_label(&root),
            root,
            overrides: overrides.clone(),
        })
        .collect())
}

/// Progress lines show only the scenario directory's own name.
fn scenario_label(root: &Path) -> String {
    root.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string())
}

/// Run each request in order, printing progress to `out`.
pub fn run_suite(
    requests: &[ScenarioRequest],
    config: &HarnessConfig,
    sink: &mut DiagnosticLog,
    out: &mut dyn Write,
) -> Result<RunTally> {
    let mut tally = RunTally::default();
    for request in requests {
        let message = format!("running test {}", request.label);
        write!(out, "{message:.<width$}|", width = PROGRESS_WIDTH).context("write progress")?;
        out.flush().context("write progress")?;

        let pass = run_request(request, config, sink, out);
        writeln!(out, "{}", if pass { "PASSED" } else { "FAILED" }).context("write progress")?;
        tally.record(pass);
    }
    Ok(tally)
}

fn run_request(
    request: &ScenarioRequest,
    config: &HarnessConfig,
    sink: &mut DiagnosticLog,
    out: &mut dyn Write,
) -> bool {
    let scenario = match Scenario::load(&request.root, &request.overrides) {
        Ok(scenario) => scenario,
        Err(err) => {
            return load_failed(
                sink,
                &request.root,
                ScenarioError::InvalidScenario {
                    root: request.root.clone(),
                    reason: format!("{err:#}"),
                },
            )
        }
    };
    let validator = match load_validator(&request.root) {
        Ok(validator) => validator,
        Err(err) => {
            return load_failed(
                sink,
                &request.root,
                ScenarioError::InvalidValidator {
                    root: request.root.clone(),
                    reason: format!("{err:#}"),
                },
            )
        }
    };
    let mut ctx = RunContext {
        config,
        sink,
        progress: out,
    };
    run_scenario(&mut ctx, &scenario, &validator).pass
}

fn load_failed(sink: &mut DiagnosticLog, root: &Path, err: ScenarioError) -> bool {
    tracing::warn!(error = %err, "scenario could not be loaded");
    if let Err(write_err) = sink.banner(&format!("scenario {}", root.display())) {
        tracing::warn!(error = %write_err, "failed to write diagnostic log");
    }
    record_load_failure(sink, &err);
    false
}
