//! Stage executor: runs one pipeline stage to completion.
//!
//! Container stages block until the container exits; the download streams
//! over HTTP. A failed stage removes whatever output it may have half
//! written so the next probe does not mistake it for completed work, along
//! with the outputs of every later stage, which no longer have an input.
pub mod download;

use crate::error::{OsrmError, OsrmResult};
use crate::layout::{ContainerRole, Profile, RegionLayout, Stage, CONTAINER_DATA_DIR};
use crate::runtime::{ContainerRuntime, ProcessOutput, RunSpec};
use download::{mirror_url, Downloader};
use std::time::Instant;

/// Image and mirror settings shared by every stage.
#[derive(Debug, Clone)]
pub struct StageSettings {
    pub image: String,
    pub mirror_base_url: String,
}

pub struct StageExecutor<'a> {
    runtime: &'a dyn ContainerRuntime,
    downloader: &'a dyn Downloader,
    settings: StageSettings,
}

impl<'a> StageExecutor<'a> {
    pub fn new(
        runtime: &'a dyn ContainerRuntime,
        downloader: &'a dyn Downloader,
        settings: StageSettings,
    ) -> Self {
        Self {
            runtime,
            downloader,
            settings,
        }
    }

    pub fn runtime(&self) -> &'a dyn ContainerRuntime {
        self.runtime
    }

    /// Run `stage` for the region described by `layout`.
    pub fn execute(&self, stage: Stage, layout: &RegionLayout, profile: Profile) -> OsrmResult<()> {
        let start = Instant::now();
        tracing::info!(region = %layout.region(), %stage, "stage starting");
        let result = match stage {
            Stage::Download => self.download(layout),
            _ => self.run_container(stage, layout, profile),
        };
        match &result {
            Ok(()) => tracing::info!(
                region = %layout.region(),
                %stage,
                elapsed_ms = start.elapsed().as_millis(),
                "stage complete"
            ),
            Err(err) => tracing::warn!(
                region = %layout.region(),
                %stage,
                elapsed_ms = start.elapsed().as_millis(),
                error = %err,
                "stage failed"
            ),
        }
        result
    }

    fn download(&self, layout: &RegionLayout) -> OsrmResult<()> {
        let url = mirror_url(&self.settings.mirror_base_url, &layout.raw_extract_file_name());
        let dest = layout.raw_extract_path();
        match self.downloader.fetch(&url, &dest) {
            Ok(bytes) => {
                tracing::info!(region = %layout.region(), %url, bytes, "extract downloaded");
                Ok(())
            }
            Err(err) => Err(OsrmError::DownloadFailure {
                region: layout.region().to_string(),
                url,
                reason: format!("{err:#}"),
            }),
        }
    }

    fn run_container(&self, stage: Stage, layout: &RegionLayout, profile: Profile) -> OsrmResult<()> {
        let name = layout.container_name(ContainerRole::Stage(stage));
        // A container left over from an earlier run would block `run --name`.
        let leftover = self.runtime.remove(&name, true)?;
        if leftover.success() {
            tracing::debug!(container = %name, "removed leftover stage container");
        }

        let spec = RunSpec {
            name,
            image: self.settings.image.clone(),
            detach: false,
            publish: None,
            volume: (layout.data_dir().to_path_buf(), CONTAINER_DATA_DIR.to_string()),
            command: stage_command(stage, layout, profile),
        };
        let output = self.runtime.run(&spec)?;
        if !output.success() {
            invalidate_from(layout, stage);
            return Err(stage_failure(layout, stage, &output, None));
        }
        let marker = layout.marker_path(stage);
        if !marker.is_file() {
            invalidate_from(layout, stage);
            let note = format!("exited cleanly but did not write {}", marker.display());
            return Err(stage_failure(layout, stage, &output, Some(note)));
        }
        Ok(())
    }
}

/// The OSRM tool invocation for a containerized stage.
pub fn stage_command(stage: Stage, layout: &RegionLayout, profile: Profile) -> Vec<String> {
    match stage {
        Stage::Download => Vec::new(),
        Stage::Extract => vec![
            "osrm-extract".to_string(),
            "-p".to_string(),
            profile.lua_path(),
            layout.container_raw_extract(),
        ],
        Stage::Partition => vec![
            "osrm-partition".to_string(),
            layout.container_graph_base(),
        ],
        Stage::Customize => vec![
            "osrm-customize".to_string(),
            layout.container_graph_base(),
        ],
    }
}

fn stage_failure(
    layout: &RegionLayout,
    stage: Stage,
    output: &ProcessOutput,
    note: Option<String>,
) -> OsrmError {
    let mut captured = output.captured();
    if let Some(note) = note {
        if !captured.is_empty() {
            captured.push('\n');
        }
        captured.push_str(&note);
    }
    OsrmError::StageExecutionFailure {
        region: layout.region().to_string(),
        stage,
        exit_code: output.exit_code,
        output: captured,
    }
}

/// Remove the outputs of `failed` and of every stage after it, so no later
/// artifact outlives an earlier one.
fn invalidate_from(layout: &RegionLayout, failed: Stage) {
    for stage in Stage::ALL.into_iter().filter(|stage| *stage >= failed) {
        remove_partial_outputs(layout, stage);
    }
}

/// Best-effort removal of a stage's output; errors are only logged.
fn remove_partial_outputs(layout: &RegionLayout, stage: Stage) {
    for path in layout.output_paths(stage) {
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::info!(
                region = %layout.region(),
                %stage,
                path = %path.display(),
                "removed partial output"
            ),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(
                region = %layout.region(),
                %stage,
                path = %path.display(),
                error = %err,
                "could not remove partial output"
            ),
        }
    }
}

#[cfg(test)]
#[path = "stage_tests.rs"]
mod tests;
