//! Pipeline orchestrator: Download → Extract → Partition → Customize.
//!
//! The filesystem is the only record of progress. Each stage is probed
//! before it runs and skipped when its artifact already exists, so a run
//! interrupted by a transient failure can simply be repeated. Force is
//! evaluated per stage: re-downloading does not imply re-extracting.
use crate::cleanup::{CleanupManager, CleanupReport, CleanupTargets};
use crate::error::{OsrmError, OsrmResult};
use crate::layout::{Profile, RegionLayout, Stage};
use crate::probe::probe;
use crate::stage::StageExecutor;
use serde::Serialize;
use std::collections::BTreeSet;

/// Stages the caller explicitly asked to redo even when present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForcedStages(BTreeSet<Stage>);

impl ForcedStages {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self(Stage::ALL.into_iter().collect())
    }

    pub fn only(stages: impl IntoIterator<Item = Stage>) -> Self {
        Self(stages.into_iter().collect())
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.0.contains(&stage)
    }
}

/// One pipeline invocation. Holds no state beyond the call.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub layout: RegionLayout,
    pub profile: Profile,
    pub force: ForcedStages,
    pub cleanup_on_finish: bool,
    /// Last stage to run; `Customize` for a full pipeline.
    pub target: Stage,
}

impl PipelineRun {
    pub fn new(layout: RegionLayout, profile: Profile) -> Self {
        Self {
            layout,
            profile,
            force: ForcedStages::none(),
            cleanup_on_finish: false,
            target: Stage::Customize,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub region: String,
    pub completed_through: Stage,
    pub executed: Vec<Stage>,
    pub skipped: Vec<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<CleanupReport>,
}

pub struct PipelineOrchestrator<'a> {
    executor: StageExecutor<'a>,
}

impl<'a> PipelineOrchestrator<'a> {
    pub fn new(executor: StageExecutor<'a>) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &StageExecutor<'a> {
        &self.executor
    }

    /// Run every stage up to `run.target`, stopping at the first failure.
    pub fn run(&self, run: &PipelineRun) -> OsrmResult<PipelineReport> {
        let layout = &run.layout;
        std::fs::create_dir_all(layout.data_dir()).map_err(|err| {
            OsrmError::io(
                layout.region().as_str(),
                format!("create data dir {}", layout.data_dir().display()),
                err,
            )
        })?;

        let mut report = PipelineReport {
            region: layout.region().to_string(),
            completed_through: Stage::Download,
            executed: Vec::new(),
            skipped: Vec::new(),
            cleanup: None,
        };
        let outcome = self.run_stages(run, &mut report);

        if run.cleanup_on_finish {
            let manager = CleanupManager::new(self.executor.runtime());
            match manager.cleanup(layout, CleanupTargets::Stages) {
                Ok(cleanup) => report.cleanup = Some(cleanup),
                Err(err) if outcome.is_err() => {
                    tracing::warn!(region = %layout.region(), error = %err, "cleanup after failure failed");
                }
                Err(err) => return Err(err),
            }
        }

        outcome.map(|()| report)
    }

    fn run_stages(&self, run: &PipelineRun, report: &mut PipelineReport) -> OsrmResult<()> {
        let layout = &run.layout;
        for stage in Stage::ALL.into_iter().filter(|stage| *stage <= run.target) {
            let present = probe(layout, stage).is_present();
            if present && !run.force.contains(stage) {
                tracing::info!(region = %layout.region(), %stage, "artifact present; skipping");
                report.skipped.push(stage);
            } else {
                if present {
                    tracing::info!(region = %layout.region(), %stage, "artifact present; forced re-run");
                }
                self.executor.execute(stage, layout, run.profile)?;
                report.executed.push(stage);
            }
            report.completed_through = stage;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
