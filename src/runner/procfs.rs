//! Just enough of `/proc` to follow a target through its escalation
//! wrapper and to tell when its process group is empty.
use std::fs;
use std::io;
use std::path::Path;

pub const PROC_ROOT: &str = "/proc";

/// Fields of `/proc/<pid>/stat` the harness cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcStat {
    pub pid: u32,
    pub comm: String,
    pub state: char,
    pub ppid: u32,
    pub pgrp: u32,
}

impl ProcStat {
    /// Zombies and dead entries no longer run anything.
    pub fn is_live(&self) -> bool {
        !matches!(self.state, 'Z' | 'X' | 'x')
    }
}

pub fn parse_stat(pid: u32, contents: &str) -> Option<ProcStat> {
    // comm may contain spaces and parens; it ends at the last ')'.
    let (head, after_comm) = contents.rsplit_once(')')?;
    let (_, comm) = head.split_once('(')?;
    let mut fields = after_comm.split_whitespace();
    let state = fields.next()?.chars().next()?;
    let ppid = fields.next()?.parse().ok()?;
    let pgrp = fields.next()?.parse().ok()?;
    Some(ProcStat {
        pid,
        comm: comm.to_string(),
        state,
        ppid,
        pgrp,
    })
}

pub fn read_stat(proc_root: &Path, pid: u32) -> Option<ProcStat> {
    let contents = fs::read_to_string(proc_root.join(pid.to_string()).join("stat")).ok()?;
    parse_stat(pid, &contents)
}

/// Every process visible under `proc_root`. Entries that vanish mid-scan
/// are skipped.
pub fn scan(proc_root: &Path) -> io::Result<Vec<ProcStat>> {
    let mut stats = Vec::new();
    for entry in fs::read_dir(proc_root)? {
        let Ok(entry) = entry else { continue };
        let Ok(pid) = entry.file_name().to_string_lossy().parse::<u32>() else {
            continue;
        };
        if let Some(stat) = read_stat(proc_root, pid) {
            stats.push(stat);
        }
    }
    Ok(stats)
}

pub fn live_children(proc_root: &Path, parent: u32) -> io::Result<Vec<u32>> {
    let mut children: Vec<u32> = scan(proc_root)?
        .into_iter()
        .filter(|stat| stat.ppid == parent && stat.is_live())
        .map(|stat| stat.pid)
        .collect();
    children.sort_unstable();
    Ok(children)
}

pub fn group_has_live_members(proc_root: &Path, pgid: u32) -> io::Result<bool> {
    Ok(scan(proc_root)?
        .iter()
        .any(|stat| stat.pgrp == pgid && stat.is_live()))
}

/// Follow a chain of wrapper processes named `wrapper_comm` (for example
/// `sudo` and its monitor) down to the first process that is not one.
/// A wrapper that exec'd into the target resolves to itself.
pub fn resolve_wrapped(proc_root: &Path, pid: u32, wrapper_comm: &str) -> u32 {
    let mut current = pid;
    loop {
        let Some(stat) = read_stat(proc_root, current) else {
            return current;
        };
        if stat.comm != wrapper_comm {
            return current;
        }
        match live_children(proc_root, current).as_deref() {
            Ok([only]) => current = *only,
            _ => return current,
        }
    }
}

/// The kernel keeps at most 15 bytes of a program name in `comm`.
pub fn comm_of(program: &str) -> String {
    let name = Path::new(program)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.to_string());
    name.chars().take(15).collect()
}
