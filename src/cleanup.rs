//! Teardown of a region's named containers.
//!
//! Cleanup is total: a container that is already gone counts as cleaned,
//! and one that cannot be removed is reported rather than raised. Only an
//! unreachable runtime aborts the sweep.
use crate::error::OsrmResult;
use crate::layout::RegionLayout;
use crate::runtime::{ContainerRuntime, ContainerState};
use serde::Serialize;

/// Which of a region's containers to tear down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupTargets {
    /// Extract, partition and customize containers.
    Stages,
    /// Stage containers plus the server container.
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupFailure {
    pub container: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub region: String,
    pub removed: Vec<String>,
    pub absent: Vec<String>,
    pub failed: Vec<CleanupFailure>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct CleanupManager<'a> {
    runtime: &'a dyn ContainerRuntime,
}

impl<'a> CleanupManager<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime) -> Self {
        Self { runtime }
    }

    pub fn cleanup(&self, layout: &RegionLayout, targets: CleanupTargets) -> OsrmResult<CleanupReport> {
        let mut containers = layout.stage_containers();
        if targets == CleanupTargets::All {
            containers.push(layout.server_container());
        }

        let mut report = CleanupReport {
            region: layout.region().to_string(),
            ..CleanupReport::default()
        };
        for container in containers {
            let state = self.runtime.inspect_state(&container)?;
            if state == ContainerState::Absent {
                report.absent.push(container);
                continue;
            }
            if state == ContainerState::Running {
                let stopped = self.runtime.stop(&container)?;
                if !stopped.success() {
                    tracing::warn!(
                        %container,
                        output = %stopped.captured(),
                        "stop failed; removing anyway"
                    );
                }
            }
            let removed = self.runtime.remove(&container, true)?;
            if removed.success() {
                tracing::info!(region = %layout.region(), %container, "container removed");
                report.removed.push(container);
            } else {
                report.failed.push(CleanupFailure {
                    container,
                    reason: removed.captured(),
                });
            }
        }
        Ok(report)
    }
}
