//! The launched target program and how it gets stopped.
//!
//! Every target is spawned as the leader of a fresh process group, so its
//! pid doubles as the group id. Termination signals the whole group: an
//! escalation wrapper that forks the real program, and anything the
//! program forks itself, go down with it.
use super::procfs::{self, PROC_ROOT};
use crate::interrupt;
use crate::util::format_command_line;
use std::fs::File;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Stops a running target's process group. Implementations must leave the
/// group leader reaped.
pub trait Terminator {
    fn terminate(&self, child: &mut Child) -> io::Result<()>;
}

/// Direct SIGTERM to the group, then SIGKILL once `grace` runs out.
#[derive(Debug, Clone)]
pub struct SignalTerminator {
    pub grace: Duration,
}

impl Terminator for SignalTerminator {
    fn terminate(&self, child: &mut Child) -> io::Result<()> {
        let pgid = child.id();
        signal_group(pgid, libc::SIGTERM)?;
        if wait_for_group(child, self.grace)? {
            return Ok(());
        }
        tracing::debug!(pgid, "target ignored SIGTERM, killing");
        signal_group(pgid, libc::SIGKILL)?;
        if wait_for_group(child, self.grace)? {
            return Ok(());
        }
        Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("process group {pgid} survived SIGKILL"),
        ))
    }
}

/// Signals the group through the escalation wrapper, for targets we lack
/// the privilege to signal directly.
#[derive(Debug, Clone)]
pub struct EscalatedTerminator {
    pub wrapper: Vec<String>,
    pub grace: Duration,
}

impl EscalatedTerminator {
    fn kill_via_wrapper(&self, pgid: u32, signal: &str) -> io::Result<()> {
        let Some(program) = self.wrapper.first() else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "escalation wrapper is empty",
            ));
        };
        let group = format!("-{pgid}");
        let mut argv: Vec<&str> = self.wrapper.iter().map(String::as_str).collect();
        argv.extend(["kill", signal, group.as_str()]);
        tracing::debug!(command = %format_command_line(&argv), "escalated kill");
        let status = Command::new(program)
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        if !status.success() {
            tracing::debug!(pgid, signal, %status, "escalated kill reported failure");
        }
        Ok(())
    }
}

impl Terminator for EscalatedTerminator {
    fn terminate(&self, child: &mut Child) -> io::Result<()> {
        let pgid = child.id();
        self.kill_via_wrapper(pgid, "-TERM")?;
        if wait_for_group(child, self.grace)? {
            return Ok(());
        }
        self.kill_via_wrapper(pgid, "-KILL")?;
        if wait_for_group(child, self.grace)? {
            return Ok(());
        }
        Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("process group {pgid} survived an escalated SIGKILL"),
        ))
    }
}

fn signal_group(pgid: u32, signal: libc::c_int) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(pgid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pgid out of range"))?;
    // SAFETY: plain kill(2) on a process group we created.
    let rc = unsafe { libc::kill(-pgid, signal) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        return Ok(());
    }
    Err(err)
}

/// Whether anything in the group still runs. Falls back to `kill(-pgid, 0)`
/// when `/proc` cannot be scanned.
fn group_alive(pgid: u32) -> bool {
    match procfs::group_has_live_members(Path::new(PROC_ROOT), pgid) {
        Ok(alive) => alive,
        Err(_) => {
            let Ok(pgid) = libc::pid_t::try_from(pgid) else {
                return false;
            };
            // SAFETY: signal 0 only checks for existence.
            let rc = unsafe { libc::kill(-pgid, 0) };
            rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
        }
    }
}

/// Reap the leader and wait for the rest of its group, up to `limit`.
fn wait_for_group(child: &mut Child, limit: Duration) -> io::Result<bool> {
    let pgid = child.id();
    let start = Instant::now();
    loop {
        if child.try_wait()?.is_some() && !group_alive(pgid) {
            return Ok(true);
        }
        if start.elapsed() >= limit {
            return Ok(false);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// A running target. Dropping it terminates its process group and reaps
/// the leader.
pub struct TargetProcess {
    child: Child,
    terminator: Box<dyn Terminator>,
    /// `comm` of the escalation wrapper the target was launched through.
    wrapper_comm: Option<String>,
    finished: Option<ExitStatus>,
    stopped: bool,
}

impl TargetProcess {
    pub fn launch(
        argv: &[String],
        stdout: File,
        stderr: File,
        terminator: Box<dyn Terminator>,
        wrapper_comm: Option<String>,
    ) -> io::Result<Self> {
        let Some((program, args)) = argv.split_first() else {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty target argv"));
        };
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .process_group(0)
            .spawn()?;
        interrupt::register(child.id());
        tracing::debug!(pid = child.id(), command = %format_command_line(argv), "target launched");
        Ok(Self {
            child,
            terminator,
            wrapper_comm,
            finished: None,
            stopped: false,
        })
    }

    /// Pid of the spawned process, which is also the process group id.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Pid of the program under test. Behind an escalation wrapper this is
    /// the process the wrapper started, not the wrapper itself.
    pub fn target_pid(&self) -> u32 {
        match self.wrapper_comm.as_deref() {
            Some(wrapper) => procfs::resolve_wrapped(Path::new(PROC_ROOT), self.pid(), wrapper),
            None => self.pid(),
        }
    }

    /// Non-blocking liveness check: `Some` once the spawned process has exited.
    pub fn exit_status(&mut self) -> io::Result<Option<ExitStatus>> {
        if let Some(status) = self.finished {
            return Ok(Some(status));
        }
        self.finished = self.child.try_wait()?;
        Ok(self.finished)
    }

    pub fn terminate(&mut self) -> io::Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.terminator.terminate(&mut self.child)?;
        self.finished = self.child.try_wait()?;
        self.stopped = true;
        interrupt::clear(self.child.id());
        Ok(())
    }
}

impl Drop for TargetProcess {
    fn drop(&mut self) {
        if self.stopped {
            return;
        }
        if let Err(err) = self.terminate() {
            tracing::warn!(pid = self.child.id(), error = %err, "failed to stop target on drop");
            let _ = signal_group(self.child.id(), libc::SIGKILL);
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
        interrupt::clear(self.child.id());
    }
}
