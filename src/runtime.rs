//! Container runtime boundary.
//!
//! Everything the orchestrator knows about containers goes through
//! [`ContainerRuntime`]; exit codes and captured output are the whole
//! contract. The production implementation shells out to a docker-compatible
//! CLI (see [`docker`]).
pub mod docker;

use crate::error::{OsrmError, OsrmResult};
use crate::util::tail_string;
use serde::Serialize;
use std::path::PathBuf;

pub use docker::DockerCli;

/// Maximum captured output carried into error reports.
pub const MAX_CAPTURED_OUTPUT_BYTES: usize = 8 * 1024;

/// Run state of a named container as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    Absent,
    Stopped,
    Running,
}

impl ContainerState {
    /// Map the runtime's `.State.Status` string onto the three observable states.
    pub fn from_status(status: &str) -> Self {
        match status.trim() {
            "running" => ContainerState::Running,
            "" => ContainerState::Absent,
            _ => ContainerState::Stopped,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ContainerState::Absent => "absent",
            ContainerState::Stopped => "stopped",
            ContainerState::Running => "running",
        }
    }
}

/// A `run` invocation: one named container from one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    pub name: String,
    pub image: String,
    /// Return as soon as the container is created instead of waiting for exit.
    pub detach: bool,
    /// `(host, container)` port mapping.
    pub publish: Option<(u16, u16)>,
    /// `(host, container)` bind mount.
    pub volume: (PathBuf, String),
    pub command: Vec<String>,
}

/// Exit status and captured output of one runtime call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stdout then stderr, keeping only the tail that fits in an error report.
    pub fn captured(&self) -> String {
        let mut combined = String::new();
        for part in [self.stdout.trim_end(), self.stderr.trim_end()] {
            if part.is_empty() {
                continue;
            }
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(part);
        }
        tail_string(&combined, MAX_CAPTURED_OUTPUT_BYTES)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// One line of container output delivered to a log sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogLine {
    pub stream: LogStream,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOptions {
    pub follow: bool,
    pub tail: usize,
}

/// Operations the orchestrator needs from a container engine.
///
/// Implementations must report a missing container from [`inspect_state`]
/// as [`ContainerState::Absent`], and reserve errors for an engine that
/// cannot be reached at all.
///
/// [`inspect_state`]: ContainerRuntime::inspect_state
pub trait ContainerRuntime {
    /// Human-readable name of the engine, used in error messages.
    fn program(&self) -> &str;

    fn inspect_state(&self, name: &str) -> OsrmResult<ContainerState>;

    fn run(&self, spec: &RunSpec) -> OsrmResult<ProcessOutput>;

    fn stop(&self, name: &str) -> OsrmResult<ProcessOutput>;

    fn remove(&self, name: &str, force: bool) -> OsrmResult<ProcessOutput>;

    /// Deliver container output line by line to `sink`; with `follow` this
    /// blocks until the container exits or the caller is interrupted.
    fn logs(
        &self,
        name: &str,
        options: LogOptions,
        sink: &mut dyn FnMut(LogLine),
    ) -> OsrmResult<ProcessOutput>;
}

/// Stand-in for a runtime that could not be resolved.
///
/// Lets runtime-free work (downloads, probing files) proceed; the first
/// container call fails with the original resolution error.
#[derive(Debug, Clone)]
pub struct UnavailableRuntime {
    program: String,
    reason: String,
}

impl UnavailableRuntime {
    pub fn new(err: &OsrmError) -> Self {
        match err {
            OsrmError::RuntimeUnavailable { program, reason } => Self {
                program: program.clone(),
                reason: reason.clone(),
            },
            other => Self {
                program: "container runtime".to_string(),
                reason: other.to_string(),
            },
        }
    }

    fn error(&self) -> OsrmError {
        OsrmError::RuntimeUnavailable {
            program: self.program.clone(),
            reason: self.reason.clone(),
        }
    }
}

impl ContainerRuntime for UnavailableRuntime {
    fn program(&self) -> &str {
        &self.program
    }

    fn inspect_state(&self, _name: &str) -> OsrmResult<ContainerState> {
        Err(self.error())
    }

    fn run(&self, _spec: &RunSpec) -> OsrmResult<ProcessOutput> {
        Err(self.error())
    }

    fn stop(&self, _name: &str) -> OsrmResult<ProcessOutput> {
        Err(self.error())
    }

    fn remove(&self, _name: &str, _force: bool) -> OsrmResult<ProcessOutput> {
        Err(self.error())
    }

    fn logs(
        &self,
        _name: &str,
        _options: LogOptions,
        _sink: &mut dyn FnMut(LogLine),
    ) -> OsrmResult<ProcessOutput> {
        Err(self.error())
    }
}
