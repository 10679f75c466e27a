//! Process-wide diagnostic log.
//!
//! One append-only file per harness run. Every external command is recorded
//! verbatim (shell-quoted) under a section heading so a failing step can be
//! re-run by hand. Nothing written here goes to stdout.
use crate::util::format_command_line;
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const DEFAULT_DIAGNOSTIC_LOG: &str = "validator_log";

const BANNER: &str = "############################";

/// How the sink treats an existing file when opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkMode {
    /// Full suite run: start from an empty file.
    Truncate,
    /// Single scenario run: keep earlier history.
    Append,
}

pub struct DiagnosticLog {
    path: PathBuf,
    file: File,
}

impl DiagnosticLog {
    pub fn open(path: &Path, mode: SinkMode) -> Result<Self> {
        let mut options = OpenOptions::new();
        options.create(true);
        match mode {
            SinkMode::Truncate => options.write(true).truncate(true),
            SinkMode::Append => options.append(true),
        };
        let file = options
            .open(path)
            .with_context(|| format!("open diagnostic log {}", path.display()))?;
        tracing::debug!(path = %path.display(), ?mode, "diagnostic log opened");
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start a new scenario block.
    pub fn banner(&mut self, title: &str) -> io::Result<()> {
        writeln!(self.file, "{BANNER}")?;
        writeln!(self.file, "{title}")
    }

    pub fn section(&mut self, heading: &str) -> io::Result<()> {
        writeln!(self.file, "---- {heading} ----")
    }

    pub fn command<S: AsRef<str>>(&mut self, argv: &[S]) -> io::Result<()> {
        writeln!(self.file, "running:")?;
        writeln!(self.file, " {}", format_command_line(argv))
    }

    pub fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.file, "{text}")
    }

    /// Copy a per-scenario capture file into the sink under `heading`.
    pub fn append_file(&mut self, heading: &str, path: &Path) -> io::Result<()> {
        self.section(&format!("{heading}: {}", path.display()))?;
        let mut source = File::open(path)?;
        io::copy(&mut source, &mut self.file)?;
        self.file.flush()
    }
}

impl Write for DiagnosticLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
