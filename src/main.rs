//! hotpatch-harness: drives an external binary patch tool against sample
//! programs and reports which scenarios survived patching.
use anyhow::Result;
use clap::Parser;
use std::io::{self, Write};
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod diagnostics;
mod interrupt;
mod runner;
mod scenario;
mod suite;
mod util;
mod validator;

use cli::RunArgs;
use config::HarnessConfig;
use diagnostics::{DiagnosticLog, SinkMode};

fn main() -> ExitCode {
    let args = match RunArgs::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    init_tracing(&args.log_level);

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();
}

/// Returns whether every scenario passed.
fn run(args: &RunArgs) -> Result<bool> {
    let requests = suite::discover(args)?;
    let config = HarnessConfig::resolve(args)?;
    interrupt::install();

    // A single scenario adds to the existing history; full runs start over.
    let mode = if args.scenario.is_some() && !args.run_directory {
        SinkMode::Append
    } else {
        SinkMode::Truncate
    };
    let mut sink = DiagnosticLog::open(&args.diagnostic_log, mode)?;
    tracing::info!(
        scenarios = requests.len(),
        patch_tool = %config.patch_tool.display(),
        "starting run"
    );

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let tally = suite::run_suite(&requests, &config, &mut sink, &mut out)?;

    writeln!(out, "Passed {} out of {} tests", tally.passed, tally.total)?;
    if !tally.all_passed() {
        writeln!(out, "See {} for more information", sink.path().display())?;
    }
    out.flush()?;
    Ok(tally.all_passed())
}
