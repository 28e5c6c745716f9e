//! Docker-compatible CLI runtime.
//!
//! Works with any engine that speaks the docker CLI surface (`docker`,
//! `podman`, `sudo docker`). The engine command is resolved on PATH once so
//! a missing engine fails before any pipeline work starts.
use super::{
    ContainerRuntime, ContainerState, LogLine, LogOptions, LogStream, ProcessOutput, RunSpec,
};
use crate::error::{OsrmError, OsrmResult};
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::sync::mpsc;
use std::time::Instant;

/// Daemon-side failures that mean the engine itself is unreachable.
const UNREACHABLE_MARKERS: &[&str] = &[
    "Cannot connect to the Docker daemon",
    "Cannot connect to Podman",
    "error during connect",
    "Is the docker daemon running",
    "permission denied while trying to connect",
    "unable to connect to Podman socket",
];

/// Inspect failures that only mean the container does not exist.
const NOT_FOUND_MARKERS: &[&str] = &["no such object", "no such container"];

#[derive(Debug, Clone)]
pub struct DockerCli {
    program: PathBuf,
    leading_args: Vec<String>,
    display: String,
}

impl DockerCli {
    /// Resolve a runtime command line such as `docker` or `sudo -n docker`.
    pub fn resolve(runtime_command: &str) -> OsrmResult<Self> {
        let unavailable = |reason: String| OsrmError::RuntimeUnavailable {
            program: runtime_command.to_string(),
            reason,
        };
        let words = shell_words::split(runtime_command)
            .map_err(|err| unavailable(format!("cannot parse runtime command: {err}")))?;
        let (program, leading_args) = words
            .split_first()
            .ok_or_else(|| unavailable("runtime command is empty".to_string()))?;
        let program = which::which(program)
            .map_err(|err| unavailable(format!("{program} not found on PATH: {err}")))?;
        Ok(Self {
            program,
            leading_args: leading_args.to_vec(),
            display: runtime_command.to_string(),
        })
    }

    fn command(&self, args: &[String]) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.leading_args).args(args);
        command
    }

    fn execute(&self, args: Vec<String>) -> OsrmResult<ProcessOutput> {
        let start = Instant::now();
        let output = self
            .command(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| self.unavailable(err.to_string()))?;
        let output = self.check_reachable(output)?;
        tracing::debug!(
            runtime = %self.display,
            subcommand = args.first().map(String::as_str).unwrap_or_default(),
            elapsed_ms = start.elapsed().as_millis(),
            exit_code = output.exit_code,
            "runtime call complete"
        );
        Ok(output)
    }

    fn check_reachable(&self, output: Output) -> OsrmResult<ProcessOutput> {
        let output = ProcessOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        if !output.success() && is_unreachable(&output.stderr) {
            let detail = output.stderr.trim().lines().next().unwrap_or_default();
            return Err(self.unavailable(detail.to_string()));
        }
        Ok(output)
    }

    fn unavailable(&self, reason: String) -> OsrmError {
        OsrmError::RuntimeUnavailable {
            program: self.display.clone(),
            reason,
        }
    }
}

impl ContainerRuntime for DockerCli {
    fn program(&self) -> &str {
        &self.display
    }

    fn inspect_state(&self, name: &str) -> OsrmResult<ContainerState> {
        let output = self.execute(inspect_args(name))?;
        if !output.success() {
            if is_not_found(&output.stderr) {
                return Ok(ContainerState::Absent);
            }
            let detail = output.stderr.trim().lines().next().unwrap_or_default();
            return Err(self.unavailable(format!("inspect of {name} failed: {detail}")));
        }
        Ok(ContainerState::from_status(&output.stdout))
    }

    fn run(&self, spec: &RunSpec) -> OsrmResult<ProcessOutput> {
        self.execute(run_args(spec))
    }

    fn stop(&self, name: &str) -> OsrmResult<ProcessOutput> {
        self.execute(vec!["stop".to_string(), name.to_string()])
    }

    fn remove(&self, name: &str, force: bool) -> OsrmResult<ProcessOutput> {
        let mut args = vec!["rm".to_string()];
        if force {
            args.push("-f".to_string());
        }
        args.push(name.to_string());
        self.execute(args)
    }

    fn logs(
        &self,
        name: &str,
        options: LogOptions,
        sink: &mut dyn FnMut(LogLine),
    ) -> OsrmResult<ProcessOutput> {
        let mut child = self
            .command(&logs_args(name, options))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| self.unavailable(err.to_string()))?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let mut stderr_text = String::new();
        let (tx, rx) = mpsc::channel::<LogLine>();
        std::thread::scope(|scope| {
            if let Some(stdout) = stdout {
                let tx = tx.clone();
                scope.spawn(move || forward_lines(stdout, LogStream::Stdout, &tx));
            }
            if let Some(stderr) = stderr {
                let tx = tx.clone();
                scope.spawn(move || forward_lines(stderr, LogStream::Stderr, &tx));
            }
            drop(tx);
            for line in rx {
                if line.stream == LogStream::Stderr {
                    stderr_text.push_str(&line.text);
                    stderr_text.push('\n');
                }
                sink(line);
            }
        });

        let status = child
            .wait()
            .map_err(|err| self.unavailable(err.to_string()))?;
        let output = ProcessOutput {
            exit_code: status.code(),
            stdout: String::new(),
            stderr: stderr_text,
        };
        if !output.success() && is_unreachable(&output.stderr) {
            return Err(self.unavailable(output.stderr.trim().to_string()));
        }
        Ok(output)
    }
}

fn forward_lines(reader: impl Read, stream: LogStream, tx: &mpsc::Sender<LogLine>) {
    for line in BufReader::new(reader).lines() {
        let Ok(text) = line else {
            break;
        };
        if tx.send(LogLine { stream, text }).is_err() {
            break;
        }
    }
}

fn is_unreachable(stderr: &str) -> bool {
    UNREACHABLE_MARKERS
        .iter()
        .any(|marker| stderr.contains(marker))
}

fn is_not_found(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    NOT_FOUND_MARKERS
        .iter()
        .any(|marker| stderr.contains(marker))
}

fn inspect_args(name: &str) -> Vec<String> {
    vec![
        "inspect".to_string(),
        "--type".to_string(),
        "container".to_string(),
        "-f".to_string(),
        "{{.State.Status}}".to_string(),
        name.to_string(),
    ]
}

fn run_args(spec: &RunSpec) -> Vec<String> {
    let mut args = vec!["run".to_string()];
    if spec.detach {
        args.push("-d".to_string());
    }
    args.push("--name".to_string());
    args.push(spec.name.clone());
    if let Some((host, container)) = spec.publish {
        args.push("-p".to_string());
        args.push(format!("{host}:{container}"));
    }
    args.push("-v".to_string());
    args.push(format!("{}:{}", spec.volume.0.display(), spec.volume.1));
    args.push(spec.image.clone());
    args.extend(spec.command.iter().cloned());
    args
}

fn logs_args(name: &str, options: LogOptions) -> Vec<String> {
    let mut args = vec!["logs".to_string()];
    if options.follow {
        args.push("--follow".to_string());
    }
    args.push("--tail".to_string());
    args.push(options.tail.to_string());
    args.push(name.to_string());
    args
}
