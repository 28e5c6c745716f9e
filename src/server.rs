//! Server controller for the long-lived `osrm-routed` container.
//!
//! At rest a region's server is either absent or running (or stopped by
//! someone else). Starting and stopping are synchronous, so the transient
//! states only exist for the duration of a call. The duplicate-start guard
//! is a state check, not a lock.
pub mod health;

use crate::error::{OsrmError, OsrmResult};
use crate::layout::{Algorithm, Profile, RegionLayout, Stage, CONTAINER_DATA_DIR};
use crate::pipeline::{PipelineOrchestrator, PipelineReport, PipelineRun};
use crate::probe::{probe, probe_all, probe_server, StageArtifact};
use crate::runtime::{ContainerRuntime, ContainerState, LogLine, LogOptions, ProcessOutput, RunSpec};
use health::{HealthProbe, RouteCheck, RouteSummary};
use serde::Serialize;

/// Port `osrm-routed` listens on inside the container.
pub const SERVER_CONTAINER_PORT: u16 = 5000;

#[derive(Debug, Clone, Copy)]
pub struct StartOptions {
    pub port: u16,
    pub algorithm: Algorithm,
    /// Run the pipeline with this profile when the customized graph is missing.
    pub process_if_missing: Option<Profile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartOutcome {
    pub region: String,
    pub container: String,
    pub container_id: String,
    pub port: u16,
    pub algorithm: Algorithm,
    /// A stopped container of the same name was removed first.
    pub replaced_stopped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<PipelineReport>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StopOutcome {
    Stopped { region: String, container: String },
    NothingToStop {
        region: String,
        container: String,
        state: ContainerState,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ServerHealth {
    /// No running container; the service was not contacted.
    Down { state: ContainerState },
    /// The container runs but the service did not return a usable route.
    Unhealthy { reason: String },
    Healthy { route: RouteSummary },
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub region: String,
    pub container: String,
    pub port: u16,
    pub state: ContainerState,
    pub health: ServerHealth,
    pub artifacts: Vec<StageArtifact>,
}

impl StatusReport {
    /// Turn anything but a healthy answer into the matching error.
    pub fn require_healthy(&self) -> OsrmResult<RouteSummary> {
        match &self.health {
            ServerHealth::Healthy { route } => Ok(*route),
            ServerHealth::Down { .. } => Err(OsrmError::NotRunning {
                region: self.region.clone(),
                container: self.container.clone(),
            }),
            ServerHealth::Unhealthy { reason } => Err(OsrmError::Unhealthy {
                region: self.region.clone(),
                port: self.port,
                reason: reason.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogsOutcome {
    pub region: String,
    pub container: String,
    pub lines: usize,
}

pub struct ServerController<'a> {
    pipeline: &'a PipelineOrchestrator<'a>,
    health: &'a dyn HealthProbe,
    image: String,
}

impl<'a> ServerController<'a> {
    pub fn new(
        pipeline: &'a PipelineOrchestrator<'a>,
        health: &'a dyn HealthProbe,
        image: &str,
    ) -> Self {
        Self {
            pipeline,
            health,
            image: image.to_string(),
        }
    }

    fn runtime(&self) -> &'a dyn ContainerRuntime {
        self.pipeline.executor().runtime()
    }

    /// Launch the server container; returns once the launch command succeeds.
    pub fn start(&self, layout: &RegionLayout, options: StartOptions) -> OsrmResult<StartOutcome> {
        let runtime = self.runtime();
        let container = layout.server_container();
        let state = probe_server(runtime, layout)?;
        if state == ContainerState::Running {
            return Err(OsrmError::AlreadyRunning {
                region: layout.region().to_string(),
                container,
            });
        }

        let mut pipeline = None;
        if !probe(layout, Stage::Customize).is_present() {
            let Some(profile) = options.process_if_missing else {
                return Err(OsrmError::ArtifactMissing {
                    region: layout.region().to_string(),
                    artifact: Stage::Customize.artifact(),
                    path: layout.marker_path(Stage::Customize),
                });
            };
            tracing::info!(region = %layout.region(), "customized graph missing; processing first");
            let mut run = PipelineRun::new(layout.clone(), profile);
            run.cleanup_on_finish = true;
            pipeline = Some(self.pipeline.run(&run)?);
        }

        let replaced_stopped = state == ContainerState::Stopped;
        if replaced_stopped {
            let removed = runtime.remove(&container, true)?;
            if !removed.success() {
                return Err(command_failure(layout, "remove", &container, &removed));
            }
            tracing::info!(%container, "removed stopped server container");
        }

        let spec = RunSpec {
            name: container.clone(),
            image: self.image.clone(),
            detach: true,
            publish: Some((options.port, SERVER_CONTAINER_PORT)),
            volume: (layout.data_dir().to_path_buf(), CONTAINER_DATA_DIR.to_string()),
            command: vec![
                "osrm-routed".to_string(),
                "--algorithm".to_string(),
                options.algorithm.as_arg().to_string(),
                layout.container_graph_base(),
            ],
        };
        let output = runtime.run(&spec)?;
        if !output.success() {
            return Err(command_failure(layout, "launch", &container, &output));
        }
        tracing::info!(region = %layout.region(), %container, port = options.port, "server launched");
        Ok(StartOutcome {
            region: layout.region().to_string(),
            container,
            container_id: output.stdout.trim().to_string(),
            port: options.port,
            algorithm: options.algorithm,
            replaced_stopped,
            pipeline,
        })
    }

    /// Stop and remove a running server; anything else is nothing to stop.
    pub fn stop(&self, layout: &RegionLayout) -> OsrmResult<StopOutcome> {
        let runtime = self.runtime();
        let container = layout.server_container();
        let state = probe_server(runtime, layout)?;
        if state != ContainerState::Running {
            return Ok(StopOutcome::NothingToStop {
                region: layout.region().to_string(),
                container,
                state,
            });
        }
        let stopped = runtime.stop(&container)?;
        if !stopped.success() {
            return Err(command_failure(layout, "stop", &container, &stopped));
        }
        let removed = runtime.remove(&container, false)?;
        if !removed.success() {
            return Err(command_failure(layout, "remove", &container, &removed));
        }
        tracing::info!(region = %layout.region(), %container, "server stopped");
        Ok(StopOutcome::Stopped {
            region: layout.region().to_string(),
            container,
        })
    }

    /// Container state first; the network is only consulted when running.
    pub fn status(&self, layout: &RegionLayout, port: u16) -> OsrmResult<StatusReport> {
        let container = layout.server_container();
        let state = probe_server(self.runtime(), layout)?;
        let health = if state == ContainerState::Running {
            self.check_health(port)
        } else {
            ServerHealth::Down { state }
        };
        Ok(StatusReport {
            region: layout.region().to_string(),
            container,
            port,
            state,
            health,
            artifacts: probe_all(layout),
        })
    }

    fn check_health(&self, port: u16) -> ServerHealth {
        match self.health.check_route(port) {
            Ok(RouteCheck::Route(route)) if route.is_positive() => ServerHealth::Healthy { route },
            Ok(RouteCheck::Route(route)) => ServerHealth::Unhealthy {
                reason: format!(
                    "route has non-positive distance {} or duration {}",
                    route.distance, route.duration
                ),
            },
            Ok(RouteCheck::NoRoute {
                status,
                code,
                message,
            }) => {
                let mut reason = format!("no route returned (HTTP {status}");
                if let Some(code) = code {
                    reason.push_str(&format!(", code {code}"));
                }
                reason.push(')');
                if let Some(message) = message {
                    reason.push_str(&format!(": {message}"));
                }
                ServerHealth::Unhealthy { reason }
            }
            Err(err) => ServerHealth::Unhealthy {
                reason: format!("{err:#}"),
            },
        }
    }

    /// Deliver the server's output to `sink`. Purely observational.
    pub fn logs(
        &self,
        layout: &RegionLayout,
        options: LogOptions,
        sink: &mut dyn FnMut(LogLine),
    ) -> OsrmResult<LogsOutcome> {
        let runtime = self.runtime();
        let container = layout.server_container();
        if probe_server(runtime, layout)? == ContainerState::Absent {
            return Err(OsrmError::NotRunning {
                region: layout.region().to_string(),
                container,
            });
        }
        let mut lines = 0usize;
        let output = runtime.logs(&container, options, &mut |line| {
            lines += 1;
            sink(line);
        })?;
        if !output.success() {
            return Err(command_failure(layout, "logs", &container, &output));
        }
        Ok(LogsOutcome {
            region: layout.region().to_string(),
            container,
            lines,
        })
    }
}

fn command_failure(
    layout: &RegionLayout,
    action: &'static str,
    container: &str,
    output: &ProcessOutput,
) -> OsrmError {
    OsrmError::ContainerCommandFailure {
        region: layout.region().to_string(),
        action,
        container: container.to_string(),
        exit_code: output.exit_code,
        output: output.captured(),
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
