//! Command handlers.
//!
//! Each handler resolves the region, runs one lifecycle operation and prints
//! its result. Services are built once per invocation from the effective
//! config.
use crate::cli::{forced_stages, Command, ConfigArgs, RootArgs};
use crate::config::{
    default_config_path, load_effective_config, resolve_config_path, write_config, ConfigSource,
    OsrmConfig, CONFIG_ENV_VAR,
};
use crate::error::OsrmError;
use crate::layout::Region;
use crate::lifecycle::Lifecycle;
use crate::output::{self, ConfigView};
use crate::runtime::{ContainerRuntime, DockerCli, LogLine, LogOptions, LogStream, UnavailableRuntime};
use crate::server::health::HttpHealthProbe;
use crate::stage::download::HttpDownloader;
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::path::PathBuf;

/// Production implementations of the three seams.
struct Services {
    runtime: Box<dyn ContainerRuntime>,
    downloader: HttpDownloader,
    health: HttpHealthProbe,
}

impl Services {
    fn build(config: &OsrmConfig) -> Self {
        // Commands that never reach the runtime (download, artifacts) must
        // still work on hosts without one.
        let runtime: Box<dyn ContainerRuntime> = match DockerCli::resolve(&config.runtime_command) {
            Ok(runtime) => Box::new(runtime),
            Err(err) => {
                tracing::debug!(error = %err, "container runtime unavailable");
                Box::new(UnavailableRuntime::new(&err))
            }
        };
        tracing::debug!(runtime = runtime.program(), image = %config.image, "services ready");
        Self {
            runtime,
            downloader: HttpDownloader::new(config.download_timeout()),
            health: HttpHealthProbe::new(config.health.target(), config.health.timeout()),
        }
    }

    fn lifecycle(&self, config: &OsrmConfig) -> Lifecycle<'_> {
        Lifecycle::new(config, self.runtime.as_ref(), &self.downloader, &self.health)
    }
}

pub fn run(args: RootArgs) -> Result<()> {
    let RootArgs {
        config: config_flag,
        json,
        command,
        ..
    } = args;

    if let Command::Config(config_args) = &command {
        if config_args.init {
            return run_config_init(config_args, config_flag);
        }
    }

    let (config, source) = load_effective_config(config_flag.as_deref())?;
    if let Command::Config(_) = command {
        let view = ConfigView {
            source: &source,
            config: &config,
        };
        let text = if json {
            output::to_json(&view)?
        } else {
            output::render_config(&view)?
        };
        println!("{}", text.trim_end());
        return Ok(());
    }

    let services = Services::build(&config);
    let lifecycle = services.lifecycle(&config);
    dispatch(&lifecycle, command, json)
}

fn dispatch(lifecycle: &Lifecycle<'_>, command: Command, json: bool) -> Result<()> {
    match command {
        Command::FullSetup(args) => {
            let region = parse_region(&args.data.region.region)?;
            let report = lifecycle
                .full_setup(
                    &region,
                    &args.data.data_dir,
                    args.port,
                    args.profile,
                    args.algorithm,
                )
                .map_err(with_hint)?;
            emit(json, &report, output::render_full_setup)
        }
        Command::ProcessMap(args) => {
            let region = parse_region(&args.data.region.region)?;
            let report = lifecycle
                .process_map(
                    &region,
                    &args.data.data_dir,
                    args.profile,
                    forced_stages(&args.force),
                    !args.keep_containers,
                )
                .map_err(with_hint)?;
            emit(json, &report, output::render_pipeline)
        }
        Command::Download(args) => {
            let region = parse_region(&args.data.region.region)?;
            let report = lifecycle
                .download_map(&region, &args.data.data_dir, args.force)
                .map_err(with_hint)?;
            emit(json, &report, output::render_pipeline)
        }
        Command::Start(args) => {
            let region = parse_region(&args.data.region.region)?;
            let outcome = lifecycle
                .start_server(
                    &region,
                    &args.data.data_dir,
                    args.port,
                    args.algorithm,
                    args.process,
                )
                .map_err(with_hint)?;
            emit(json, &outcome, output::render_start)
        }
        Command::Stop(args) => {
            let region = parse_region(&args.region)?;
            let outcome = lifecycle.stop_server(&region).map_err(with_hint)?;
            emit(json, &outcome, output::render_stop)
        }
        Command::Status(args) => {
            let region = parse_region(&args.data.region.region)?;
            let report = lifecycle
                .status(&region, &args.data.data_dir, args.port)
                .map_err(with_hint)?;
            let layout = lifecycle.layout(&region, &args.data.data_dir)?;
            emit(json, &report, |report| {
                output::render_status(report, layout.data_dir())
            })?;
            report.require_healthy().map_err(with_hint)?;
            Ok(())
        }
        Command::Cleanup(args) => {
            let region = parse_region(&args.region)?;
            let report = lifecycle.cleanup(&region).map_err(with_hint)?;
            emit(json, &report, output::render_cleanup)?;
            if !report.is_clean() {
                return Err(anyhow!(
                    "{} container(s) of {} could not be removed",
                    report.failed.len(),
                    report.region
                ));
            }
            Ok(())
        }
        Command::Logs(args) => {
            let region = parse_region(&args.region.region)?;
            let options = LogOptions {
                follow: args.follow,
                tail: args.tail,
            };
            let mut write_error = None;
            let outcome = lifecycle
                .logs(&region, options, &mut |line| {
                    if write_error.is_none() {
                        write_error = print_log_line(&line, json).err();
                    }
                })
                .map_err(with_hint)?;
            if let Some(err) = write_error {
                return Err(err);
            }
            tracing::debug!(container = %outcome.container, lines = outcome.lines, "logs finished");
            Ok(())
        }
        Command::Artifacts(args) => {
            let region = parse_region(&args.region.region)?;
            let listing = lifecycle.artifacts(&region, &args.data_dir)?;
            emit(json, &listing, output::render_artifact_listing)
        }
        Command::Config(_) => unreachable!("config handled before services are built"),
    }
}

fn run_config_init(args: &ConfigArgs, config_flag: Option<PathBuf>) -> Result<()> {
    let source = resolve_config_path(
        config_flag.as_deref(),
        std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from),
        None,
    );
    let path = match source {
        ConfigSource::Flag(path) | ConfigSource::Env(path) | ConfigSource::UserConfigDir(path) => {
            path
        }
        ConfigSource::Defaults => default_config_path()
            .ok_or_else(|| anyhow!("no user config directory; pass --config <PATH>"))?,
    };
    if path.is_file() && !args.force {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            path.display()
        ));
    }
    write_config(&path, &OsrmConfig::default())?;
    println!("wrote {}", path.display());
    Ok(())
}

fn parse_region(raw: &str) -> Result<Region> {
    Region::parse(raw).context("resolve --region")
}

fn emit<T: Serialize>(json: bool, value: &T, render: impl FnOnce(&T) -> String) -> Result<()> {
    let text = if json {
        output::to_json(value)?
    } else {
        render(value)
    };
    println!("{}", text.trim_end());
    Ok(())
}

fn print_log_line(line: &LogLine, json: bool) -> Result<()> {
    if json {
        println!("{}", log_line_json(line)?);
        return Ok(());
    }
    match line.stream {
        LogStream::Stdout => println!("{}", line.text),
        LogStream::Stderr => eprintln!("{}", line.text),
    }
    Ok(())
}

fn log_line_json(line: &LogLine) -> Result<String> {
    serde_json::to_string(line).context("serialize log line")
}

/// Attach the next step an operator would take for the common failures.
fn with_hint(err: OsrmError) -> anyhow::Error {
    let hint = if err.is_fatal() {
        Some("check runtime_command in the config and that the container engine is running".to_string())
    } else if let Some(stage) = err.stage() {
        Some(format!(
            "pipeline stopped at the {stage} stage; completed stages are kept and process-map resumes here"
        ))
    } else if let OsrmError::AlreadyRunning { .. } = err {
        Some("stop the server first, or pick another region".to_string())
    } else {
        None
    };
    match hint {
        Some(hint) => anyhow::Error::new(err).context(hint),
        None => anyhow::Error::new(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Stage;

    #[test]
    fn stage_failures_point_at_resume() {
        let err = with_hint(OsrmError::StageExecutionFailure {
            region: "testland".to_string(),
            stage: Stage::Extract,
            exit_code: Some(1),
            output: String::new(),
        });
        let chain = format!("{err:#}");
        assert!(chain.starts_with("pipeline stopped at the extract stage"));
        assert!(chain.contains("extract stage for testland failed with exit code 1"));
    }

    #[test]
    fn plain_errors_pass_through() {
        let err = with_hint(OsrmError::NotRunning {
            region: "testland".to_string(),
            container: "osrm-testland-server".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "server for testland is not running (osrm-testland-server)"
        );
    }

    #[test]
    fn log_lines_serialize_with_their_stream() {
        let line = LogLine {
            stream: LogStream::Stderr,
            text: "[warn] no edges".to_string(),
        };
        assert_eq!(
            log_line_json(&line).expect("json"),
            r#"{"stream":"stderr","text":"[warn] no edges"}"#
        );
    }

    #[test]
    fn invalid_region_is_reported_with_context() {
        let err = parse_region("../etc").expect_err("invalid");
        assert!(format!("{err:#}").contains("invalid region"));
    }
}
