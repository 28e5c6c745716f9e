//! Side-effect-free checks of how far a region has progressed.
use crate::error::OsrmResult;
use crate::layout::{Artifact, RegionLayout, Stage};
use crate::runtime::{ContainerRuntime, ContainerState};
use serde::Serialize;
use std::path::PathBuf;

/// Presence of a file artifact. Binary: partial writes are not detected here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactState {
    Absent,
    Present,
}

impl ArtifactState {
    pub fn is_present(self) -> bool {
        matches!(self, ArtifactState::Present)
    }
}

/// Probe result for one stage, as listed by `status` and `artifacts`.
#[derive(Debug, Clone, Serialize)]
pub struct StageArtifact {
    pub stage: Stage,
    pub path: PathBuf,
    pub state: ArtifactState,
}

/// Report whether the output of `stage` exists.
pub fn probe(layout: &RegionLayout, stage: Stage) -> ArtifactState {
    if layout.marker_path(stage).is_file() {
        ArtifactState::Present
    } else {
        ArtifactState::Absent
    }
}

/// Probe every stage in pipeline order.
pub fn probe_all(layout: &RegionLayout) -> Vec<StageArtifact> {
    Stage::ALL
        .iter()
        .map(|stage| StageArtifact {
            stage: *stage,
            path: layout.marker_path(*stage),
            state: probe(layout, *stage),
        })
        .collect()
}

/// Report the run state of the region's server container.
pub fn probe_server(
    runtime: &dyn ContainerRuntime,
    layout: &RegionLayout,
) -> OsrmResult<ContainerState> {
    let container = layout.server_container();
    let state = runtime.inspect_state(&container)?;
    tracing::debug!(
        region = %layout.region(),
        artifact = %Artifact::ServerProcess,
        %container,
        state = state.label(),
        "probed"
    );
    Ok(state)
}
