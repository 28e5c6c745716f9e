//! The exposed operations: one method per lifecycle command.
//!
//! Each method builds a region layout, delegates to the pipeline, server or
//! cleanup component, and returns a structured result. Nothing here prints.
use crate::cleanup::{CleanupManager, CleanupReport, CleanupTargets};
use crate::config::OsrmConfig;
use crate::error::{OsrmError, OsrmResult};
use crate::layout::{Algorithm, Profile, Region, RegionLayout, Stage};
use crate::pipeline::{ForcedStages, PipelineOrchestrator, PipelineReport, PipelineRun};
use crate::probe::{probe_all, StageArtifact};
use crate::runtime::{ContainerRuntime, LogLine, LogOptions};
use crate::server::health::HealthProbe;
use crate::server::{
    LogsOutcome, ServerController, StartOptions, StartOutcome, StatusReport, StopOutcome,
};
use crate::stage::download::Downloader;
use crate::stage::{StageExecutor, StageSettings};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct FullSetupReport {
    pub pipeline: PipelineReport,
    pub server: StartOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactListing {
    pub region: String,
    pub data_dir: PathBuf,
    pub artifacts: Vec<StageArtifact>,
}

pub struct Lifecycle<'a> {
    pipeline: PipelineOrchestrator<'a>,
    health: &'a dyn HealthProbe,
    image: String,
    container_prefix: String,
}

impl<'a> Lifecycle<'a> {
    pub fn new(
        config: &OsrmConfig,
        runtime: &'a dyn ContainerRuntime,
        downloader: &'a dyn Downloader,
        health: &'a dyn HealthProbe,
    ) -> Self {
        let settings = StageSettings {
            image: config.image.clone(),
            mirror_base_url: config.mirror_base_url.clone(),
        };
        Self {
            pipeline: PipelineOrchestrator::new(StageExecutor::new(runtime, downloader, settings)),
            health,
            image: config.image.clone(),
            container_prefix: config.container_prefix.clone(),
        }
    }

    fn runtime(&self) -> &'a dyn ContainerRuntime {
        self.pipeline.executor().runtime()
    }

    fn server(&self) -> ServerController<'_> {
        ServerController::new(&self.pipeline, self.health, &self.image)
    }

    /// Layout for operations that touch files; the data dir is made absolute
    /// because it is bind-mounted into containers.
    pub fn layout(&self, region: &Region, data_dir: &Path) -> OsrmResult<RegionLayout> {
        let data_dir = if data_dir.is_absolute() {
            data_dir.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|err| OsrmError::io(region.as_str(), "resolve current directory", err))?
                .join(data_dir)
        };
        Ok(RegionLayout::new(
            region.clone(),
            data_dir,
            &self.container_prefix,
        ))
    }

    /// Layout for container-only operations, where the data dir is unused.
    fn container_layout(&self, region: &Region) -> RegionLayout {
        RegionLayout::new(region.clone(), PathBuf::new(), &self.container_prefix)
    }

    /// Process the region end to end, clean up stage containers and start
    /// the server.
    pub fn full_setup(
        &self,
        region: &Region,
        data_dir: &Path,
        port: u16,
        profile: Profile,
        algorithm: Algorithm,
    ) -> OsrmResult<FullSetupReport> {
        let pipeline = self.process_map(region, data_dir, profile, ForcedStages::none(), true)?;
        let server = self.start_server(region, data_dir, port, algorithm, false)?;
        Ok(FullSetupReport { pipeline, server })
    }

    pub fn process_map(
        &self,
        region: &Region,
        data_dir: &Path,
        profile: Profile,
        force: ForcedStages,
        cleanup_on_finish: bool,
    ) -> OsrmResult<PipelineReport> {
        let mut run = PipelineRun::new(self.layout(region, data_dir)?, profile);
        run.force = force;
        run.cleanup_on_finish = cleanup_on_finish;
        self.pipeline.run(&run)
    }

    /// Download stage only.
    pub fn download_map(
        &self,
        region: &Region,
        data_dir: &Path,
        force: bool,
    ) -> OsrmResult<PipelineReport> {
        // The profile only matters to container stages.
        let mut run = PipelineRun::new(self.layout(region, data_dir)?, Profile::Car);
        run.target = Stage::Download;
        if force {
            run.force = ForcedStages::only([Stage::Download]);
        }
        self.pipeline.run(&run)
    }

    /// Start the server. With `process_if_missing`, a region without a
    /// customized graph is processed first using the car profile.
    pub fn start_server(
        &self,
        region: &Region,
        data_dir: &Path,
        port: u16,
        algorithm: Algorithm,
        process_if_missing: bool,
    ) -> OsrmResult<StartOutcome> {
        let layout = self.layout(region, data_dir)?;
        let options = StartOptions {
            port,
            algorithm,
            process_if_missing: process_if_missing.then_some(Profile::Car),
        };
        self.server().start(&layout, options)
    }

    pub fn stop_server(&self, region: &Region) -> OsrmResult<StopOutcome> {
        self.server().stop(&self.container_layout(region))
    }

    pub fn status(&self, region: &Region, data_dir: &Path, port: u16) -> OsrmResult<StatusReport> {
        let layout = self.layout(region, data_dir)?;
        self.server().status(&layout, port)
    }

    /// Tear down every container of the region, server included.
    pub fn cleanup(&self, region: &Region) -> OsrmResult<CleanupReport> {
        CleanupManager::new(self.runtime())
            .cleanup(&self.container_layout(region), CleanupTargets::All)
    }

    pub fn logs(
        &self,
        region: &Region,
        options: LogOptions,
        sink: &mut dyn FnMut(LogLine),
    ) -> OsrmResult<LogsOutcome> {
        self.server()
            .logs(&self.container_layout(region), options, sink)
    }

    pub fn artifacts(&self, region: &Region, data_dir: &Path) -> OsrmResult<ArtifactListing> {
        let layout = self.layout(region, data_dir)?;
        Ok(ArtifactListing {
            region: region.to_string(),
            data_dir: layout.data_dir().to_path_buf(),
            artifacts: probe_all(&layout),
        })
    }
}
