//! Invocations of the external patch tool.
//!
//! Generation: `<tool> -g -o <artifact> <old_tree> <new_tree> <exec_name>`.
//! Application: `<tool> -p <artifact> <pid>`. Both run to completion with
//! stdout and stderr captured into per-stage files in the scenario root;
//! those files are then copied into the diagnostic log.
use super::error::ScenarioError;
use crate::diagnostics::DiagnosticLog;
use crate::util::{exit_status_string, format_command_line, path_arg};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Generate,
    Apply,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Generate => "generate",
            Stage::Apply => "apply",
        }
    }
}

pub fn generate_argv(
    tool: &Path,
    artifact: &Path,
    old_tree: &Path,
    new_tree: &Path,
    exec_name: &str,
) -> Vec<String> {
    vec![
        path_arg(tool),
        "-g".to_string(),
        "-o".to_string(),
        path_arg(artifact),
        path_arg(old_tree),
        path_arg(new_tree),
        exec_name.to_string(),
    ]
}

pub fn apply_argv(tool: &Path, artifact: &Path, pid: u32) -> Vec<String> {
    vec![
        path_arg(tool),
        "-p".to_string(),
        path_arg(artifact),
        pid.to_string(),
    ]
}

/// Where one tool invocation writes its output.
#[derive(Debug, Clone)]
pub struct Capture {
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

/// Run the tool once and return its exit status. Only spawn and capture
/// failures are errors here; the caller decides what a non-zero exit means.
pub fn invoke_patch_tool(
    stage: Stage,
    argv: &[String],
    capture: &Capture,
    sink: &mut DiagnosticLog,
) -> Result<ExitStatus, ScenarioError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(ScenarioError::io(
            format!("{} command is empty", stage.label()),
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty argv"),
        ));
    };
    let sink_err = |err: std::io::Error| ScenarioError::io("write diagnostic log", err);
    sink.section(stage.label()).map_err(sink_err)?;
    sink.command(argv).map_err(sink_err)?;

    let stdout = create_capture(&capture.stdout)?;
    let stderr = create_capture(&capture.stderr)?;

    tracing::debug!(
        stage = stage.label(),
        command = %format_command_line(argv),
        "invoking patch tool"
    );
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .status()
        .map_err(|err| ScenarioError::io(format!("spawn {program}"), err))?;

    let label = stage.label();
    sink.line(&format!("{label} exit status: {}", exit_status_string(&status)))
        .map_err(sink_err)?;
    sink.append_file(&format!("{label} stdout"), &capture.stdout)
        .map_err(sink_err)?;
    sink.append_file(&format!("{label} stderr"), &capture.stderr)
        .map_err(sink_err)?;
    Ok(status)
}

fn create_capture(path: &Path) -> Result<File, ScenarioError> {
    File::create(path).map_err(|err| ScenarioError::io(format!("create {}", path.display()), err))
}
