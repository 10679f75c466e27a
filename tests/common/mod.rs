//! Throwaway scenarios for driving the harness binary end to end.
//!
//! The patch tool and the target are `/bin/sh` scripts. Generation clears an
//! `applied` marker in the scenario root; application touches it, and the
//! target switches the addresses it prints once the marker exists.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub const GOOD_TOOL: &str = r#"case "$1" in
  -g) out="$3"; rm -f "$(dirname "$out")/applied"; echo patch > "$out"; echo "generated $out" ;;
  -p) kill -0 "$3" || exit 3; touch "$(dirname "$2")/applied"; echo "applied to $3" ;;
  *) exit 64 ;;
esac"#;

pub const APPLY_FAILS_TOOL: &str = r#"case "$1" in
  -g) echo patch > "$3" ;;
  -p) echo "cannot attach to $3" >&2; exit 1 ;;
esac"#;

pub const GENERATE_FAILS_TOOL: &str = r#"echo "no debug info in $6" >&2
exit 2"#;

/// Applies successfully but never changes the running program.
pub const NOOP_TOOL: &str = r#"case "$1" in
  -g) echo patch > "$3" ;;
  -p) exit 0 ;;
esac"#;

pub const RELOCATING_TARGET: &str = r#"marker="$(dirname "$0")/../applied"
echo "has pid $$"
while :; do
  echo "Foo: 42,66"
  if [ -e "$marker" ]; then
    echo "field 1 at addr: 7f10, field 2 at addr: 7f14"
  else
    echo "field 1 at addr: 6010, field 2 at addr: 6014"
  fi
  sleep 0.05
done"#;

pub const CRASHING_TARGET: &str = r#"marker="$(dirname "$0")/../applied"
echo "has pid $$"
while :; do
  if [ -e "$marker" ]; then
    echo "segfault after patch" >&2
    exit 139
  fi
  echo "Foo: 42,66"
  echo "field 1 at addr: 6010, field 2 at addr: 6014"
  sleep 0.05
done"#;

pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn sink(&self) -> PathBuf {
        self.path().join("validator_log")
    }

    pub fn tool(&self, name: &str, body: &str) -> PathBuf {
        let path = self.path().join(name);
        write_script(&path, body);
        path
    }

    /// Create `<parent>/<name>` with a `test` target and a validator.
    pub fn scenario(&self, parent: &str, name: &str, target: &str, validator: &str) -> PathBuf {
        let root = self.path().join(parent).join(name);
        fs::create_dir_all(root.join("v0")).expect("create v0");
        fs::create_dir_all(root.join("v1")).expect("create v1");
        write_script(&root.join("v0").join("test"), target);
        fs::write(root.join("validate.json"), validator).expect("write validate.json");
        root
    }
}

pub fn write_script(path: &Path, body: &str) {
    fs::write(path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod script");
}

fn harness_command(tool: &Path, sink: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_hotpatch-harness"));
    command
        .arg("--patch-tool")
        .arg(tool)
        .arg("--diagnostic-log")
        .arg(sink);
    command
}

pub fn run_harness(tool: &Path, sink: &Path, args: &[&str]) -> Output {
    harness_command(tool, sink)
        .args(["--settle-ms", "200", "--observe-ms", "300"])
        .args(["--terminate-grace-ms", "500"])
        .args(args)
        .output()
        .expect("run harness")
}

/// Start the harness without waiting for it; `args` carries every timing flag.
pub fn spawn_harness(tool: &Path, sink: &Path, args: &[&str]) -> Child {
    harness_command(tool, sink)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn harness")
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_else(|err| panic!("read {}: {err}", path.display()))
}

fn pid_banner(text: &str) -> Option<u32> {
    text.lines()
        .find_map(|line| line.strip_prefix("has pid "))
        .and_then(|pid| pid.trim().parse().ok())
}

/// PID the target announced on its first line.
pub fn announced_pid(log: &Path) -> u32 {
    pid_banner(&read(log)).expect("target announced its pid")
}

/// Wait up to five seconds for the target to write its pid banner.
pub fn wait_for_announced_pid(log: &Path) -> u32 {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(pid) = fs::read_to_string(log).ok().as_deref().and_then(pid_banner) {
            return pid;
        }
        assert!(Instant::now() < deadline, "target never announced its pid");
        thread::sleep(Duration::from_millis(20));
    }
}

/// A missing `/proc` entry and a zombie both mean the program stopped.
pub fn process_running(pid: u32) -> bool {
    let Ok(stat) = fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    let state = stat
        .rsplit_once(')')
        .and_then(|(_, rest)| rest.split_whitespace().next())
        .unwrap_or("");
    !matches!(state, "Z" | "X" | "x")
}

/// An orphaned process may take a moment to be reaped by init.
pub fn stops_running(pid: u32) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while process_running(pid) {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(20));
    }
    true
}
