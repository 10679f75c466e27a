mod common;

use common::*;
use std::path::Path;

const FIELD_RELOCATION: &str = r#"{ "preset": "field_relocation" }"#;
const CONSTANTS: &str = r#"{ "preset": "constants" }"#;

fn path_str(path: &Path) -> String {
    path.display().to_string()
}

#[test]
fn relocated_fields_pass() {
    let ws = Workspace::new();
    let tool = ws.tool("katana", GOOD_TOOL);
    let root = ws.scenario("tests", "t1_fields", RELOCATING_TARGET, FIELD_RELOCATION);

    let output = run_harness(&tool, &ws.sink(), &[&path_str(&root)]);

    let printed = stdout(&output);
    assert!(output.status.success(), "stdout: {printed}\nsink: {}", read(&ws.sink()));
    assert!(printed.contains("|gen|patch|PASSED"));
    assert!(printed.ends_with("Passed 1 out of 1 tests\n"));
    assert!(root.join("patch.po").is_file());
    assert!(read(&root.join("log")).contains("7f10"));
}

#[test]
fn target_is_gone_after_the_run() {
    let ws = Workspace::new();
    let tool = ws.tool("katana", GOOD_TOOL);
    let root = ws.scenario("tests", "t1_fields", RELOCATING_TARGET, FIELD_RELOCATION);

    run_harness(&tool, &ws.sink(), &[&path_str(&root)]);

    let pid = announced_pid(&root.join("log"));
    assert!(stops_running(pid), "pid {pid} still running");
}

/// Runs the target in a child shell, the way `sudo` keeps a monitor
/// process between itself and the command.
const FORKING_WRAPPER: &str = r#"sh -c '"$@"; exit $?' wrap"#;

/// Records the pid it was asked to patch next to the artifact.
const PID_RECORDING_TOOL: &str = r#"case "$1" in
  -g) out="$3"; rm -f "$(dirname "$out")/applied"; echo patch > "$out" ;;
  -p) echo "$3" > "$(dirname "$2")/applied_pid"; touch "$(dirname "$2")/applied" ;;
  *) exit 64 ;;
esac"#;

#[test]
fn elevated_run_patches_the_wrapped_target() {
    let ws = Workspace::new();
    let tool = ws.tool("katana", PID_RECORDING_TOOL);
    let root = ws.scenario("tests", "t1_fields", RELOCATING_TARGET, FIELD_RELOCATION);

    let output = run_harness(
        &tool,
        &ws.sink(),
        &["--elevated", "--escalate-with", FORKING_WRAPPER, &path_str(&root)],
    );

    let printed = stdout(&output);
    assert!(output.status.success(), "stdout: {printed}\nsink: {}", read(&ws.sink()));
    let pid = announced_pid(&root.join("log"));
    assert_eq!(read(&root.join("applied_pid")).trim(), pid.to_string());
    assert!(read(&ws.sink()).contains(&format!("target pid {pid} (launched through wrapper pid")));
    assert!(stops_running(pid), "wrapped target {pid} still running");
}

#[test]
fn interrupting_the_harness_kills_the_target() {
    use std::os::unix::process::ExitStatusExt;

    let ws = Workspace::new();
    let tool = ws.tool("katana", GOOD_TOOL);
    let root = ws.scenario("tests", "t1_fields", RELOCATING_TARGET, FIELD_RELOCATION);

    let mut harness = spawn_harness(
        &tool,
        &ws.sink(),
        &["--settle-ms", "10000", "--terminate-grace-ms", "500", &path_str(&root)],
    );
    let pid = wait_for_announced_pid(&root.join("log"));
    let harness_pid = i32::try_from(harness.id()).expect("pid fits i32");
    // SAFETY: plain kill(2) on a child this test spawned.
    assert_eq!(unsafe { libc::kill(harness_pid, libc::SIGINT) }, 0);
    let status = harness.wait().expect("wait harness");

    assert_eq!(status.signal(), Some(libc::SIGINT));
    assert!(stops_running(pid), "target {pid} survived the interrupt");
    assert!(!root.join("applied").exists());
}

#[test]
fn failed_apply_is_reported_and_target_stopped() {
    let ws = Workspace::new();
    let tool = ws.tool("katana", APPLY_FAILS_TOOL);
    let root = ws.scenario("tests", "t1_fields", RELOCATING_TARGET, FIELD_RELOCATION);

    let output = run_harness(&tool, &ws.sink(), &[&path_str(&root)]);

    assert_eq!(output.status.code(), Some(1));
    let printed = stdout(&output);
    assert!(printed.contains("|gen|FAILED"));
    assert!(printed.contains("See "));
    let sink = read(&ws.sink());
    assert!(sink.contains("cannot attach to"));
    assert!(sink.contains("FAILED at apply"));
    assert!(!sink.contains("---- validate"));
    let pid = announced_pid(&root.join("log"));
    assert!(stops_running(pid), "pid {pid} still running");
}

#[test]
fn crash_after_patch_fails_liveness() {
    let ws = Workspace::new();
    let tool = ws.tool("katana", GOOD_TOOL);
    let root = ws.scenario("tests", "t1_crash", CRASHING_TARGET, FIELD_RELOCATION);

    let output = run_harness(&tool, &ws.sink(), &[&path_str(&root)]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("|gen|patch|FAILED"));
    let sink = read(&ws.sink());
    assert!(sink.contains("FAILED at liveness: target exited during observation (exit status 139)"));
    assert!(sink.contains("segfault after patch"));
}

#[test]
fn generation_failure_skips_launch() {
    let ws = Workspace::new();
    let tool = ws.tool("katana", GENERATE_FAILS_TOOL);
    let root = ws.scenario("tests", "t1_fields", RELOCATING_TARGET, FIELD_RELOCATION);

    let output = run_harness(&tool, &ws.sink(), &[&path_str(&root)]);

    assert_eq!(output.status.code(), Some(1));
    let printed = stdout(&output);
    assert!(printed.contains("|FAILED"));
    assert!(!printed.contains("gen|"));
    assert!(!root.join("log").exists());
    assert!(read(&ws.sink()).contains("no debug info in test"));
}

#[test]
fn unchanged_program_fails_validation() {
    let ws = Workspace::new();
    let tool = ws.tool("katana", NOOP_TOOL);
    let root = ws.scenario("tests", "t1_fields", RELOCATING_TARGET, FIELD_RELOCATION);

    let output = run_harness(&tool, &ws.sink(), &[&path_str(&root)]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("|gen|patch|FAILED"));
    assert!(read(&ws.sink()).contains("patching never happened: field1 never changed"));
}

#[test]
fn directory_mode_runs_t_dirs_in_order() {
    let ws = Workspace::new();
    let tool = ws.tool("katana", GOOD_TOOL);
    ws.scenario("suite", "t1_fields", RELOCATING_TARGET, FIELD_RELOCATION);
    ws.scenario("suite", "t2_constants", RELOCATING_TARGET, CONSTANTS);
    ws.scenario("suite", "scratch", RELOCATING_TARGET, FIELD_RELOCATION);

    let suite = path_str(&ws.path().join("suite"));
    let output = run_harness(&tool, &ws.sink(), &["-d", &suite]);

    assert_eq!(output.status.code(), Some(1));
    let printed = stdout(&output);
    let lines: Vec<&str> = printed.lines().collect();
    assert_eq!(lines.len(), 4, "{printed}");
    assert!(lines[0].starts_with("running test t1_fields.") && lines[0].ends_with("PASSED"));
    assert!(lines[1].starts_with("running test t2_constants.") && lines[1].ends_with("FAILED"));
    assert_eq!(lines[2], "Passed 1 out of 2 tests");
    assert_eq!(lines[3], format!("See {} for more information", ws.sink().display()));
    assert!(!printed.contains("scratch"));
}

#[test]
fn repeated_runs_agree() {
    let ws = Workspace::new();
    let tool = ws.tool("katana", GOOD_TOOL);
    let root = ws.scenario("tests", "t1_fields", RELOCATING_TARGET, FIELD_RELOCATION);

    let first = run_harness(&tool, &ws.sink(), &[&path_str(&root)]);
    let second = run_harness(&tool, &ws.sink(), &[&path_str(&root)]);

    assert!(first.status.success());
    assert!(second.status.success());
    // Single-scenario runs append to the diagnostic log.
    assert_eq!(read(&ws.sink()).matches("---- generate ----").count(), 2);
}

#[test]
fn usage_errors_exit_one() {
    let ws = Workspace::new();
    let tool = ws.tool("katana", GOOD_TOOL);

    let missing_dir = run_harness(&tool, &ws.sink(), &["-d"]);
    assert_eq!(missing_dir.status.code(), Some(1));

    let missing = path_str(&ws.path().join("t9_missing"));
    let output = run_harness(&tool, &ws.sink(), &[&missing]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("not a directory"));

    let root = ws.scenario("tests", "t1_fields", RELOCATING_TARGET, FIELD_RELOCATION);
    let no_tool = run_harness(&ws.path().join("absent-tool"), &ws.sink(), &[&path_str(&root)]);
    assert_eq!(no_tool.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&no_tool.stderr).contains("resolve patch tool"));
}
