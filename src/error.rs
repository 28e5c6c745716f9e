//! Typed failures for pipeline and server operations.
//!
//! Every variant carries the region (and stage or container where one
//! applies) so a failure is actionable without re-running verbosely.
use crate::layout::{Artifact, Stage};
use std::path::PathBuf;
use thiserror::Error;

pub type OsrmResult<T> = Result<T, OsrmError>;

#[derive(Debug, Error)]
pub enum OsrmError {
    #[error("invalid region {region:?}: {reason}")]
    InvalidRegion { region: String, reason: String },

    #[error("download of {region} from {url} failed: {reason}")]
    DownloadFailure {
        region: String,
        url: String,
        reason: String,
    },

    #[error("{stage} stage for {region} failed with {}{}", exit_label(.exit_code), output_suffix(.output))]
    StageExecutionFailure {
        region: String,
        stage: Stage,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("{artifact} for {region} is missing at {} (run process-map first)", .path.display())]
    ArtifactMissing {
        region: String,
        artifact: Artifact,
        path: PathBuf,
    },

    #[error("server for {region} is already running as {container}")]
    AlreadyRunning { region: String, container: String },

    #[error("server for {region} is not running ({container})")]
    NotRunning { region: String, container: String },

    #[error("server for {region} on port {port} is running but unhealthy: {reason}")]
    Unhealthy {
        region: String,
        port: u16,
        reason: String,
    },

    #[error("{action} of {container} for {region} failed with {}{}", exit_label(.exit_code), output_suffix(.output))]
    ContainerCommandFailure {
        region: String,
        action: &'static str,
        container: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("container runtime {program} is unavailable: {reason}")]
    RuntimeUnavailable { program: String, reason: String },

    #[error("{context} for {region}: {source}")]
    Io {
        region: String,
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl OsrmError {
    /// Whether the failure makes every further runtime call in this
    /// invocation pointless.
    pub fn is_fatal(&self) -> bool {
        matches!(self, OsrmError::RuntimeUnavailable { .. })
    }

    /// The pipeline stage the failure belongs to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            OsrmError::DownloadFailure { .. } => Some(Stage::Download),
            OsrmError::StageExecutionFailure { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub(crate) fn io(region: &str, context: impl Into<String>, source: std::io::Error) -> Self {
        OsrmError::Io {
            region: region.to_string(),
            context: context.into(),
            source,
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

fn output_suffix(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\n{trimmed}")
    }
}
