//! In-memory fakes for the runtime, downloader and health probe seams.
use crate::error::{OsrmError, OsrmResult};
use crate::layout::{ContainerRole, RegionLayout, Stage};
use crate::runtime::{
    ContainerRuntime, ContainerState, LogLine, LogOptions, LogStream, ProcessOutput, RunSpec,
};
use crate::server::health::{HealthProbe, RouteCheck, RouteSummary};
use crate::stage::download::Downloader;
use anyhow::{anyhow, Result};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One recorded runtime call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Inspect(String),
    Run(String),
    Stop(String),
    Remove(String),
    Logs(String),
}

/// Container engine double that mimics docker's named-container semantics.
#[derive(Default)]
pub struct FakeRuntime {
    states: RefCell<BTreeMap<String, ContainerState>>,
    outputs: RefCell<BTreeMap<String, Vec<PathBuf>>>,
    failures: RefCell<BTreeMap<String, (i32, String)>>,
    logs: RefCell<BTreeMap<String, Vec<String>>>,
    calls: RefCell<Vec<RuntimeCall>>,
    runs: RefCell<Vec<RunSpec>>,
    unreachable: Cell<bool>,
    stop_fails: Cell<bool>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make container stages write their real output files on success.
    pub fn produce_stage_outputs(&self, layout: &RegionLayout) {
        for stage in Stage::ALL.iter().filter(|stage| stage.is_containerized()) {
            let name = layout.container_name(ContainerRole::Stage(*stage));
            self.outputs
                .borrow_mut()
                .insert(name, layout.output_paths(*stage));
        }
    }

    /// Make `run` of `container` exit with `code` after writing a partial marker.
    pub fn fail_run(&self, container: &str, code: i32, output: &str) {
        self.failures
            .borrow_mut()
            .insert(container.to_string(), (code, output.to_string()));
    }

    pub fn set_state(&self, container: &str, state: ContainerState) {
        let mut states = self.states.borrow_mut();
        if state == ContainerState::Absent {
            states.remove(container);
        } else {
            states.insert(container.to_string(), state);
        }
    }

    pub fn state(&self, container: &str) -> ContainerState {
        self.states
            .borrow()
            .get(container)
            .copied()
            .unwrap_or(ContainerState::Absent)
    }

    pub fn set_logs(&self, container: &str, lines: &[&str]) {
        self.logs.borrow_mut().insert(
            container.to_string(),
            lines.iter().map(|line| line.to_string()).collect(),
        );
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.set(unreachable);
    }

    pub fn set_stop_fails(&self, fails: bool) {
        self.stop_fails.set(fails);
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.calls.borrow().clone()
    }

    /// Names of containers passed to `run`, in order.
    pub fn run_names(&self) -> Vec<String> {
        self.runs.borrow().iter().map(|spec| spec.name.clone()).collect()
    }

    pub fn run_specs(&self) -> Vec<RunSpec> {
        self.runs.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
        self.runs.borrow_mut().clear();
    }

    fn record(&self, call: RuntimeCall) -> OsrmResult<()> {
        self.calls.borrow_mut().push(call);
        if self.unreachable.get() {
            return Err(OsrmError::RuntimeUnavailable {
                program: "fake".to_string(),
                reason: "daemon unreachable".to_string(),
            });
        }
        Ok(())
    }
}

fn exit(code: i32, stderr: &str) -> ProcessOutput {
    ProcessOutput {
        exit_code: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

impl ContainerRuntime for FakeRuntime {
    fn program(&self) -> &str {
        "fake"
    }

    fn inspect_state(&self, name: &str) -> OsrmResult<ContainerState> {
        self.record(RuntimeCall::Inspect(name.to_string()))?;
        Ok(self.state(name))
    }

    fn run(&self, spec: &RunSpec) -> OsrmResult<ProcessOutput> {
        self.record(RuntimeCall::Run(spec.name.clone()))?;
        self.runs.borrow_mut().push(spec.clone());
        if self.state(&spec.name) != ContainerState::Absent {
            return Ok(exit(125, "Conflict. The container name is already in use"));
        }
        if let Some((code, output)) = self.failures.borrow().get(&spec.name).cloned() {
            if let Some(first) = self
                .outputs
                .borrow()
                .get(&spec.name)
                .and_then(|paths| paths.first())
            {
                std::fs::write(first, b"partial").expect("write partial output");
            }
            self.set_state(&spec.name, ContainerState::Stopped);
            return Ok(exit(code, &output));
        }
        if let Some(paths) = self.outputs.borrow().get(&spec.name) {
            for path in paths {
                std::fs::write(path, b"graph").expect("write stage output");
            }
        }
        let state = if spec.detach {
            ContainerState::Running
        } else {
            ContainerState::Stopped
        };
        self.set_state(&spec.name, state);
        Ok(ProcessOutput {
            exit_code: Some(0),
            stdout: if spec.detach {
                "0123456789ab\n".to_string()
            } else {
                String::new()
            },
            stderr: String::new(),
        })
    }

    fn stop(&self, name: &str) -> OsrmResult<ProcessOutput> {
        self.record(RuntimeCall::Stop(name.to_string()))?;
        if self.stop_fails.get() {
            return Ok(exit(1, "Error response from daemon: cannot stop container"));
        }
        match self.state(name) {
            ContainerState::Absent => Ok(exit(1, "Error: No such container")),
            _ => {
                self.set_state(name, ContainerState::Stopped);
                Ok(exit(0, ""))
            }
        }
    }

    fn remove(&self, name: &str, force: bool) -> OsrmResult<ProcessOutput> {
        self.record(RuntimeCall::Remove(name.to_string()))?;
        match self.state(name) {
            ContainerState::Absent => Ok(exit(1, "Error: No such container")),
            ContainerState::Running if !force => Ok(exit(
                1,
                "Error response from daemon: cannot remove a running container",
            )),
            _ => {
                self.set_state(name, ContainerState::Absent);
                Ok(exit(0, ""))
            }
        }
    }

    fn logs(
        &self,
        name: &str,
        options: LogOptions,
        sink: &mut dyn FnMut(LogLine),
    ) -> OsrmResult<ProcessOutput> {
        self.record(RuntimeCall::Logs(name.to_string()))?;
        if self.state(name) == ContainerState::Absent {
            return Ok(exit(1, "Error: No such container"));
        }
        let lines = self.logs.borrow().get(name).cloned().unwrap_or_default();
        let skip = lines.len().saturating_sub(options.tail);
        for text in lines.into_iter().skip(skip) {
            sink(LogLine {
                stream: LogStream::Stdout,
                text,
            });
        }
        Ok(exit(0, ""))
    }
}

/// Downloader double that writes a fixed body or fails.
#[derive(Default)]
pub struct FakeDownloader {
    fail_with: RefCell<Option<String>>,
    urls: RefCell<Vec<String>>,
}

impl FakeDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, reason: &str) {
        *self.fail_with.borrow_mut() = Some(reason.to_string());
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.borrow().clone()
    }
}

impl Downloader for FakeDownloader {
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        self.urls.borrow_mut().push(url.to_string());
        if let Some(reason) = self.fail_with.borrow().as_ref() {
            return Err(anyhow!("{reason}"));
        }
        let body = b"fake osm pbf";
        std::fs::write(dest, body)?;
        Ok(body.len() as u64)
    }
}

/// Health probe double with a scripted answer.
pub struct FakeHealthProbe {
    answer: RefCell<std::result::Result<RouteCheck, String>>,
    ports: RefCell<Vec<u16>>,
}

impl FakeHealthProbe {
    pub fn healthy(distance: f64, duration: f64) -> Self {
        Self {
            answer: RefCell::new(Ok(RouteCheck::Route(RouteSummary { distance, duration }))),
            ports: RefCell::new(Vec::new()),
        }
    }

    pub fn answer(&self, answer: std::result::Result<RouteCheck, String>) {
        *self.answer.borrow_mut() = answer;
    }

    pub fn ports(&self) -> Vec<u16> {
        self.ports.borrow().clone()
    }
}

impl HealthProbe for FakeHealthProbe {
    fn check_route(&self, port: u16) -> Result<RouteCheck> {
        self.ports.borrow_mut().push(port);
        self.answer.borrow().clone().map_err(|reason| anyhow!("{reason}"))
    }
}
