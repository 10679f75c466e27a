//! Why a scenario failed.
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("patch generation failed (exit status {status})")]
    PatchGenerationFailed {
        status: String,
        stdout: PathBuf,
        stderr: PathBuf,
    },

    #[error("patch application to pid {pid} failed (exit status {status})")]
    PatchApplicationFailed {
        pid: u32,
        status: String,
        stdout: PathBuf,
        stderr: PathBuf,
    },

    #[error("target exited during observation (exit status {status})")]
    TargetCrashed { status: String, stderr: PathBuf },

    #[error("validator {validator} rejected {}", .log.display())]
    ValidationFailed {
        validator: String,
        log: PathBuf,
        diagnostics: Vec<String>,
    },

    #[error("{context}")]
    OrchestrationIo {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid validator for {}: {reason}", .root.display())]
    InvalidValidator { root: PathBuf, reason: String },

    #[error("invalid scenario {}: {reason}", .root.display())]
    InvalidScenario { root: PathBuf, reason: String },
}

impl ScenarioError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::OrchestrationIo {
            context: context.into(),
            source,
        }
    }

    /// Pipeline stage the failure belongs to, for logs.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::PatchGenerationFailed { .. } => "generate",
            Self::PatchApplicationFailed { .. } => "apply",
            Self::TargetCrashed { .. } => "liveness",
            Self::ValidationFailed { .. } => "validate",
            Self::OrchestrationIo { .. } => "orchestration",
            Self::InvalidValidator { .. } | Self::InvalidScenario { .. } => "load",
        }
    }

    /// Lines worth recording in the diagnostic log beyond the headline.
    pub fn diagnostics(&self) -> Vec<String> {
        match self {
            Self::PatchGenerationFailed { stdout, stderr, .. }
            | Self::PatchApplicationFailed { stdout, stderr, .. } => vec![
                format!("tool stdout: {}", stdout.display()),
                format!("tool stderr: {}", stderr.display()),
            ],
            Self::TargetCrashed { stderr, .. } => {
                vec![format!("target stderr: {}", stderr.display())]
            }
            Self::ValidationFailed { diagnostics, .. } => diagnostics.clone(),
            Self::OrchestrationIo { source, .. } => vec![format!("cause: {source}")],
            Self::InvalidValidator { .. } | Self::InvalidScenario { .. } => Vec::new(),
        }
    }
}
