//! Text rendering of command results.
//!
//! Every renderer takes a structured result and returns the text printed on
//! stdout; `--json` bypasses these and serializes the result directly.
use crate::cleanup::CleanupReport;
use crate::config::{ConfigSource, OsrmConfig};
use crate::lifecycle::{ArtifactListing, FullSetupReport};
use crate::pipeline::PipelineReport;
use crate::probe::StageArtifact;
use crate::server::{ServerHealth, StartOutcome, StatusReport, StopOutcome};
use crate::util::display_path;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;

/// Pretty JSON for `--json` output.
pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("serialize command result")
}

fn stage_list(stages: &[crate::layout::Stage]) -> String {
    if stages.is_empty() {
        return "none".to_string();
    }
    stages
        .iter()
        .map(|stage| stage.name())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn render_pipeline(report: &PipelineReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "region: {}", report.region);
    let _ = writeln!(out, "completed through: {}", report.completed_through);
    let _ = writeln!(out, "executed: {}", stage_list(&report.executed));
    let _ = writeln!(out, "skipped: {}", stage_list(&report.skipped));
    if let Some(cleanup) = &report.cleanup {
        out.push_str(&render_cleanup(cleanup));
    }
    out
}

pub fn render_start(outcome: &StartOutcome) -> String {
    let mut out = String::new();
    if let Some(pipeline) = &outcome.pipeline {
        out.push_str(&render_pipeline(pipeline));
    }
    if outcome.replaced_stopped {
        let _ = writeln!(out, "removed stopped container {}", outcome.container);
    }
    let short_id: String = outcome.container_id.chars().take(12).collect();
    let _ = writeln!(
        out,
        "started {} ({short_id}) on port {} with {}",
        outcome.container,
        outcome.port,
        outcome.algorithm.as_arg()
    );
    out
}

pub fn render_full_setup(report: &FullSetupReport) -> String {
    let mut out = render_pipeline(&report.pipeline);
    out.push_str(&render_start(&report.server));
    let _ = writeln!(out, "full setup for {} complete", report.server.region);
    out
}

pub fn render_stop(outcome: &StopOutcome) -> String {
    match outcome {
        StopOutcome::Stopped { container, .. } => format!("stopped and removed {container}\n"),
        StopOutcome::NothingToStop {
            container, state, ..
        } => format!("nothing to stop: {container} is {}\n", state.label()),
    }
}

fn render_artifacts(out: &mut String, data_dir: &Path, artifacts: &[StageArtifact]) {
    let _ = writeln!(out, "artifacts:");
    for artifact in artifacts {
        let mark = if artifact.state.is_present() {
            "present"
        } else {
            "missing"
        };
        let _ = writeln!(
            out,
            "  - {}: {mark} ({})",
            artifact.stage.artifact(),
            display_path(&artifact.path, Some(data_dir))
        );
    }
}

pub fn render_status(report: &StatusReport, data_dir: &Path) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "region: {}", report.region);
    let _ = writeln!(out, "container: {} ({})", report.container, report.state.label());
    match &report.health {
        ServerHealth::Down { .. } => {
            let _ = writeln!(out, "health: down");
        }
        ServerHealth::Unhealthy { reason } => {
            let _ = writeln!(out, "health: unhealthy on port {} ({reason})", report.port);
        }
        ServerHealth::Healthy { route } => {
            let _ = writeln!(
                out,
                "health: healthy on port {} (test route {:.0} m, {:.0} s)",
                report.port, route.distance, route.duration
            );
        }
    }
    render_artifacts(&mut out, data_dir, &report.artifacts);
    out
}

pub fn render_artifact_listing(listing: &ArtifactListing) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "region: {}", listing.region);
    let _ = writeln!(out, "data dir: {}", listing.data_dir.display());
    render_artifacts(&mut out, &listing.data_dir, &listing.artifacts);
    out
}

pub fn render_cleanup(report: &CleanupReport) -> String {
    let mut out = String::new();
    for container in &report.removed {
        let _ = writeln!(out, "removed {container}");
    }
    if !report.absent.is_empty() {
        let _ = writeln!(out, "not present: {}", report.absent.join(", "));
    }
    for failure in &report.failed {
        let _ = writeln!(out, "failed to remove {}: {}", failure.container, failure.reason);
    }
    out
}

/// Effective config plus where it came from.
#[derive(Serialize)]
pub struct ConfigView<'a> {
    pub source: &'a ConfigSource,
    pub config: &'a OsrmConfig,
}

pub fn render_config(view: &ConfigView<'_>) -> Result<String> {
    let mut out = String::new();
    match view.source.path() {
        Some(path) => {
            let _ = writeln!(out, "# config: {}", path.display());
        }
        None => {
            let _ = writeln!(out, "# config: built-in defaults");
        }
    }
    out.push_str(&to_json(view.config)?);
    out.push('\n');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Stage;
    use crate::probe::ArtifactState;
    use crate::runtime::ContainerState;
    use crate::server::health::RouteSummary;
    use std::path::PathBuf;

    fn artifacts(present: usize) -> Vec<StageArtifact> {
        Stage::ALL
            .iter()
            .enumerate()
            .map(|(index, stage)| StageArtifact {
                stage: *stage,
                path: PathBuf::from(format!("/srv/osrm-data/{}.marker", stage.name())),
                state: if index < present {
                    ArtifactState::Present
                } else {
                    ArtifactState::Absent
                },
            })
            .collect()
    }

    #[test]
    fn pipeline_text_lists_executed_and_skipped() {
        let report = PipelineReport {
            region: "testland".to_string(),
            completed_through: Stage::Customize,
            executed: vec![Stage::Partition, Stage::Customize],
            skipped: vec![Stage::Download, Stage::Extract],
            cleanup: None,
        };
        let text = render_pipeline(&report);
        assert!(text.contains("executed: partition, customize"));
        assert!(text.contains("skipped: download, extract"));
        assert!(text.contains("completed through: customize"));
    }

    #[test]
    fn status_text_shows_health_and_relative_artifacts() {
        let report = StatusReport {
            region: "testland".to_string(),
            container: "osrm-testland-server".to_string(),
            port: 5000,
            state: ContainerState::Running,
            health: ServerHealth::Healthy {
                route: RouteSummary {
                    distance: 5123.4,
                    duration: 612.9,
                },
            },
            artifacts: artifacts(2),
        };
        let text = render_status(&report, Path::new("/srv/osrm-data"));
        assert!(text.contains("container: osrm-testland-server (running)"));
        assert!(text.contains("health: healthy on port 5000 (test route 5123 m, 613 s)"));
        assert!(text.contains("  - raw extract: present (download.marker)"));
        assert!(text.contains("  - customized graph: missing (customize.marker)"));
    }

    #[test]
    fn status_json_tags_health() {
        let report = StatusReport {
            region: "testland".to_string(),
            container: "osrm-testland-server".to_string(),
            port: 5000,
            state: ContainerState::Absent,
            health: ServerHealth::Down {
                state: ContainerState::Absent,
            },
            artifacts: Vec::new(),
        };
        let value: serde_json::Value =
            serde_json::from_str(&to_json(&report).expect("json")).expect("parse");
        assert_eq!(value["health"]["status"], "down");
        assert_eq!(value["state"], "absent");
    }

    #[test]
    fn stop_text_distinguishes_nothing_to_stop() {
        let text = render_stop(&StopOutcome::NothingToStop {
            region: "testland".to_string(),
            container: "osrm-testland-server".to_string(),
            state: ContainerState::Absent,
        });
        assert_eq!(text, "nothing to stop: osrm-testland-server is absent\n");
    }
}
