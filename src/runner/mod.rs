//! One scenario through the whole pipeline:
//! generate, launch, settle, apply, observe, liveness, terminate, validate.
//!
//! Every stage either advances or produces a [`ScenarioError`]. Whatever
//! happens, the target is gone once [`run_scenario`] returns.
mod error;
mod procfs;
mod target;
mod tool;

pub use error::ScenarioError;

use crate::config::HarnessConfig;
use crate::diagnostics::DiagnosticLog;
use crate::scenario::{Scenario, ScenarioPaths};
use crate::util::{exit_status_string, path_arg};
use crate::validator::{Validator, Verdict};
use std::fs::File;
use std::io::Write;
use std::thread;
use procfs::comm_of;
use target::{EscalatedTerminator, SignalTerminator, TargetProcess, Terminator};
use tool::{apply_argv, generate_argv, invoke_patch_tool, Capture, Stage};

/// Harness-wide state a scenario run needs.
pub struct RunContext<'a> {
    pub config: &'a HarnessConfig,
    pub sink: &'a mut DiagnosticLog,
    pub progress: &'a mut dyn Write,
}

/// Run one scenario and judge it. Failures of any stage become a failing
/// verdict; the reason is written to the diagnostic log.
pub fn run_scenario(
    ctx: &mut RunContext<'_>,
    scenario: &Scenario,
    validator: &dyn Validator,
) -> Verdict {
    let span = tracing::info_span!("scenario", name = %scenario.name);
    let _guard = span.enter();

    match try_run(ctx, scenario, validator) {
        Ok(()) => {
            tracing::info!("scenario passed");
            Verdict::pass()
        }
        Err(err) => {
            tracing::info!(stage = err.stage(), error = %err, "scenario failed");
            let diagnostics = err.diagnostics();
            record_failure(ctx.sink, &err, &diagnostics);
            let mut lines = vec![err.to_string()];
            lines.extend(diagnostics);
            Verdict::fail(lines)
        }
    }
}

/// Record a failure that happened before the pipeline could start.
pub fn record_load_failure(sink: &mut DiagnosticLog, err: &ScenarioError) {
    record_failure(sink, err, &err.diagnostics());
}

fn record_failure(sink: &mut DiagnosticLog, err: &ScenarioError, diagnostics: &[String]) {
    let mut write = || -> std::io::Result<()> {
        sink.line(&format!("FAILED at {}: {err}", err.stage()))?;
        // Validator diagnostics are already in the sink.
        if !matches!(err, ScenarioError::ValidationFailed { .. }) {
            for line in diagnostics {
                sink.line(line)?;
            }
        }
        sink.flush()
    };
    if let Err(write_err) = write() {
        tracing::warn!(error = %write_err, "failed to record scenario failure");
    }
}

fn try_run(
    ctx: &mut RunContext<'_>,
    scenario: &Scenario,
    validator: &dyn Validator,
) -> Result<(), ScenarioError> {
    let paths = scenario.paths();
    let config = ctx.config;
    let tool = config.patch_tool.as_path();
    ctx.sink
        .banner(&format!("scenario {}", scenario.root.display()))
        .map_err(sink_error)?;

    // Generate.
    let argv = generate_argv(
        tool,
        &paths.artifact,
        &scenario.old_tree,
        &scenario.new_tree,
        &scenario.exec_name,
    );
    let capture = Capture {
        stdout: paths.generate_stdout.clone(),
        stderr: paths.generate_stderr.clone(),
    };
    let status = invoke_patch_tool(Stage::Generate, &argv, &capture, ctx.sink)?;
    if !status.success() {
        return Err(ScenarioError::PatchGenerationFailed {
            status: exit_status_string(&status),
            stdout: capture.stdout,
            stderr: capture.stderr,
        });
    }
    progress(ctx, "gen|")?;

    // Launch, then let the target reach steady state.
    let mut target = launch(ctx, scenario, &paths)?;
    tracing::info!(pid = target.pid(), "target running");
    thread::sleep(scenario.settle);

    // Resolved after settling so a forking wrapper has had time to start it.
    let pid = target.target_pid();
    if pid != target.pid() {
        ctx.sink
            .line(&format!(
                "target pid {pid} (launched through wrapper pid {})",
                target.pid()
            ))
            .map_err(sink_error)?;
    }

    // Apply.
    let argv = apply_argv(tool, &paths.artifact, pid);
    let capture = Capture {
        stdout: paths.apply_stdout.clone(),
        stderr: paths.apply_stderr.clone(),
    };
    let status = invoke_patch_tool(Stage::Apply, &argv, &capture, ctx.sink)?;
    if !status.success() {
        return Err(ScenarioError::PatchApplicationFailed {
            pid,
            status: exit_status_string(&status),
            stdout: capture.stdout,
            stderr: capture.stderr,
        });
    }
    progress(ctx, "patch|")?;

    // Observe, then check the target survived.
    thread::sleep(scenario.observe);
    let exited = target
        .exit_status()
        .map_err(|err| ScenarioError::io(format!("poll target pid {pid}"), err))?;
    if let Some(status) = exited {
        if let Err(err) = ctx.sink.append_file("target stderr", &paths.target_stderr) {
            tracing::warn!(error = %err, "failed to copy target stderr");
        }
        return Err(ScenarioError::TargetCrashed {
            status: exit_status_string(&status),
            stderr: paths.target_stderr,
        });
    }

    // Terminate. A target that will not die is noted but does not decide
    // the verdict; the log is complete either way.
    if let Err(err) = target.terminate() {
        tracing::warn!(pid, error = %err, "failed to terminate target");
        ctx.sink
            .line(&format!("warning: failed to terminate pid {pid}: {err}"))
            .map_err(sink_error)?;
    }
    drop(target);

    // Validate.
    ctx.sink
        .section(&format!("validate ({})", validator.name()))
        .map_err(sink_error)?;
    let verdict = validator.validate(&paths.captured_log, &mut *ctx.sink);
    if !verdict.pass {
        return Err(ScenarioError::ValidationFailed {
            validator: validator.name().to_string(),
            log: paths.captured_log,
            diagnostics: verdict.diagnostics,
        });
    }
    Ok(())
}

fn launch(
    ctx: &mut RunContext<'_>,
    scenario: &Scenario,
    paths: &ScenarioPaths,
) -> Result<TargetProcess, ScenarioError> {
    let mut argv = Vec::new();
    if scenario.elevated {
        argv.extend(ctx.config.escalate_with.iter().cloned());
    }
    argv.push(path_arg(&scenario.target_path()));
    argv.extend(scenario.args.iter().cloned());

    ctx.sink.section("launch").map_err(sink_error)?;
    ctx.sink.command(&argv).map_err(sink_error)?;

    let stdout = create(&paths.captured_log)?;
    let stderr = create(&paths.target_stderr)?;
    let (terminator, wrapper_comm) = if scenario.elevated {
        let wrapper_comm = ctx
            .config
            .escalate_with
            .first()
            .map(|program| comm_of(program.as_str()));
        let terminator: Box<dyn Terminator> = Box::new(EscalatedTerminator {
            wrapper: ctx.config.escalate_with.clone(),
            grace: ctx.config.terminate_grace,
        });
        (terminator, wrapper_comm)
    } else {
        let terminator: Box<dyn Terminator> = Box::new(SignalTerminator {
            grace: ctx.config.terminate_grace,
        });
        (terminator, None)
    };
    TargetProcess::launch(&argv, stdout, stderr, terminator, wrapper_comm).map_err(|err| {
        ScenarioError::io(format!("launch {}", scenario.target_path().display()), err)
    })
}

fn create(path: &std::path::Path) -> Result<File, ScenarioError> {
    File::create(path).map_err(|err| ScenarioError::io(format!("create {}", path.display()), err))
}

fn progress(ctx: &mut RunContext<'_>, marker: &str) -> Result<(), ScenarioError> {
    write!(ctx.progress, "{marker}")
        .and_then(|()| ctx.progress.flush())
        .map_err(|err| ScenarioError::io("write progress", err))
}

fn sink_error(err: std::io::Error) -> ScenarioError {
    ScenarioError::io("write diagnostic log", err)
}
