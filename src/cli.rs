//! CLI argument parsing for the patch harness.
//!
//! One command, three shapes of run: a single scenario root, a directory of
//! scenario roots (`-d`), or the default suite when no path is given.
use crate::config::{
    DEFAULT_ESCALATE_WITH, DEFAULT_PATCH_TOOL, DEFAULT_TERMINATE_GRACE_MS,
};
use crate::diagnostics::DEFAULT_DIAGNOSTIC_LOG;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "hotpatch-harness",
    version,
    about = "Generate, apply, and validate hot patches against running sample programs",
    after_help = "Examples:\n  hotpatch-harness                         Run tests/t* plus the real-world scenarios\n  hotpatch-harness tests/t1_basic          Run one scenario\n  hotpatch-harness -d tests                Run every t* scenario under tests/\n  hotpatch-harness real_tests/apache httpd -X\n                                           Run one scenario with a custom executable and arguments\n\nExit status is 0 only when every scenario passed."
)]
pub struct RunArgs {
    /// Scenario root (or, with -d, a directory of scenario roots)
    #[arg(value_name = "SCENARIO")]
    pub scenario: Option<PathBuf>,

    /// Executable name inside the scenario's old tree [default: test]
    #[arg(value_name = "EXEC_NAME")]
    pub exec_name: Option<String>,

    /// Extra arguments for the target program
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    pub target_args: Vec<String>,

    /// Treat SCENARIO as a directory of scenarios rather than a single one
    #[arg(short = 'd', long = "directory", requires = "scenario")]
    pub run_directory: bool,

    /// Launch and terminate targets through the escalation command
    #[arg(long)]
    pub elevated: bool,

    /// External patch tool (path, or a name looked up on PATH)
    #[arg(long, value_name = "PATH", default_value = DEFAULT_PATCH_TOOL)]
    pub patch_tool: String,

    /// Escalation command prefix used with --elevated
    #[arg(long, value_name = "CMD", default_value = DEFAULT_ESCALATE_WITH)]
    pub escalate_with: String,

    /// Delay between launching the target and applying the patch
    #[arg(long, value_name = "MS")]
    pub settle_ms: Option<u64>,

    /// Delay between applying the patch and the liveness check
    #[arg(long, value_name = "MS")]
    pub observe_ms: Option<u64>,

    /// How long a terminated target gets before it is killed outright
    #[arg(long, value_name = "MS", default_value_t = DEFAULT_TERMINATE_GRACE_MS)]
    pub terminate_grace_ms: u64,

    /// Diagnostic log shared by every scenario of the run
    #[arg(long, value_name = "PATH", default_value = DEFAULT_DIAGNOSTIC_LOG)]
    pub diagnostic_log: PathBuf,

    /// Base directory for the default suite
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub root: PathBuf,

    /// Tracing filter for harness logs on stderr (RUST_LOG wins when set)
    #[arg(long, value_name = "FILTER", default_value = "warn")]
    pub log_level: String,
}
