//! CLI argument parsing for the routing-service lifecycle.
//!
//! The CLI is thin: every subcommand maps to one lifecycle operation, and
//! defaults mirror a single-region deployment on one host.
use crate::layout::{Algorithm, Profile, Stage};
use crate::pipeline::ForcedStages;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub const DEFAULT_REGION: &str = "malaysia-singapore-brunei";
pub const DEFAULT_DATA_DIR: &str = "osrm-data";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_LOG_TAIL: usize = 100;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "osrmctl",
    version,
    about = "Download, process and serve regional OSRM routing data",
    after_help = "Commands:\n  full-setup    Download, process and start the server in one go\n  process-map   Run the download/extract/partition/customize pipeline\n  download      Fetch the raw extract only\n  start         Start the routing server container\n  stop          Stop and remove the routing server container\n  status        Report container state, health and artifacts\n  cleanup       Remove every container of a region\n  logs          Show or follow server logs\n  artifacts     List pipeline artifacts on disk\n  config        Print the effective configuration\n\nExamples:\n  osrmctl full-setup --region malaysia-singapore-brunei\n  osrmctl process-map --force partition\n  osrmctl start --port 5001 --process\n  osrmctl status --json\n  osrmctl logs --follow",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Config file (overrides OSRMCTL_CONFIG and the user config dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Emit machine-readable JSON output
    #[arg(long, global = true)]
    pub json: bool,

    /// Log debug detail to stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level lifecycle commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    FullSetup(FullSetupArgs),
    ProcessMap(ProcessMapArgs),
    Download(DownloadArgs),
    Start(StartArgs),
    /// Stop and remove the routing server container
    Stop(RegionArgs),
    Status(StatusArgs),
    /// Remove every stage and server container of a region
    Cleanup(RegionArgs),
    Logs(LogsArgs),
    /// List pipeline artifacts on disk
    Artifacts(DataArgs),
    Config(ConfigArgs),
}

/// Region selection shared by every command.
#[derive(Args, Debug, Clone)]
pub struct RegionArgs {
    /// Region key, as named by the extract mirror
    #[arg(long, value_name = "REGION", default_value = DEFAULT_REGION)]
    pub region: String,
}

/// Region plus the directory holding its artifacts.
#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    #[command(flatten)]
    pub region: RegionArgs,

    /// Directory for extracts and processed graphs
    #[arg(long, value_name = "DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,
}

#[derive(Parser, Debug)]
#[command(about = "Download, process and start the server in one go")]
pub struct FullSetupArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Host port to publish the server on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Routing profile used at extract time
    #[arg(long, value_enum, default_value_t = Profile::Car)]
    pub profile: Profile,

    /// Query algorithm for osrm-routed
    #[arg(long, value_enum, default_value_t = Algorithm::Mld)]
    pub algorithm: Algorithm,
}

#[derive(Parser, Debug)]
#[command(about = "Run the pipeline, skipping stages whose output exists")]
pub struct ProcessMapArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Routing profile used at extract time
    #[arg(long, value_enum, default_value_t = Profile::Car)]
    pub profile: Profile,

    /// Re-run a stage even if its output exists (repeatable)
    #[arg(long, value_enum, value_name = "STAGE")]
    pub force: Vec<ForceArg>,

    /// Keep the stage containers instead of removing them afterwards
    #[arg(long)]
    pub keep_containers: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Fetch the raw extract from the mirror")]
pub struct DownloadArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Download again even if the extract exists
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Start the routing server container")]
pub struct StartArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Host port to publish the server on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Query algorithm for osrm-routed
    #[arg(long, value_enum, default_value_t = Algorithm::Mld)]
    pub algorithm: Algorithm,

    /// Run the pipeline first when the processed graph is missing
    #[arg(long)]
    pub process: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Report container state, route health and artifacts")]
pub struct StatusArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Host port the server was published on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

#[derive(Parser, Debug)]
#[command(about = "Show or follow the server container output")]
pub struct LogsArgs {
    #[command(flatten)]
    pub region: RegionArgs,

    /// Keep streaming until interrupted
    #[arg(long, short = 'f')]
    pub follow: bool,

    /// Number of trailing lines to show
    #[arg(long, short = 'n', default_value_t = DEFAULT_LOG_TAIL)]
    pub tail: usize,
}

#[derive(Parser, Debug)]
#[command(about = "Print the effective configuration")]
pub struct ConfigArgs {
    /// Write the default config to the resolved path (or the user config dir)
    #[arg(long)]
    pub init: bool,

    /// Overwrite an existing config file with --init
    #[arg(long, requires = "init")]
    pub force: bool,
}

/// Stage names accepted by `--force`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ForceArg {
    Download,
    Extract,
    Partition,
    Customize,
    All,
}

/// Collapse repeated `--force` values into the stage set.
pub fn forced_stages(args: &[ForceArg]) -> ForcedStages {
    if args.contains(&ForceArg::All) {
        return ForcedStages::all();
    }
    ForcedStages::only(args.iter().filter_map(|arg| match arg {
        ForceArg::Download => Some(Stage::Download),
        ForceArg::Extract => Some(Stage::Extract),
        ForceArg::Partition => Some(Stage::Partition),
        ForceArg::Customize => Some(Stage::Customize),
        ForceArg::All => None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        RootArgs::command().debug_assert();
    }

    #[test]
    fn defaults_follow_single_region_deployment() {
        let args = RootArgs::try_parse_from(["osrmctl", "full-setup"]).expect("parse");
        match args.command {
            Command::FullSetup(setup) => {
                assert_eq!(setup.data.region.region, DEFAULT_REGION);
                assert_eq!(setup.data.data_dir, PathBuf::from("osrm-data"));
                assert_eq!(setup.port, 5000);
                assert_eq!(setup.profile, Profile::Car);
                assert_eq!(setup.algorithm, Algorithm::Mld);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn force_is_repeatable_and_per_stage() {
        let args = RootArgs::try_parse_from([
            "osrmctl",
            "process-map",
            "--force",
            "download",
            "--force",
            "partition",
        ])
        .expect("parse");
        let Command::ProcessMap(process) = args.command else {
            panic!("expected process-map");
        };
        let forced = forced_stages(&process.force);
        assert!(forced.contains(Stage::Download));
        assert!(forced.contains(Stage::Partition));
        assert!(!forced.contains(Stage::Extract));

        assert_eq!(forced_stages(&[ForceArg::All]), ForcedStages::all());
        assert_eq!(forced_stages(&[]), ForcedStages::none());
    }

    #[test]
    fn global_flags_may_follow_the_subcommand() {
        let args = RootArgs::try_parse_from(["osrmctl", "status", "--json", "--port", "5001"])
            .expect("parse");
        assert!(args.json);
        let Command::Status(status) = args.command else {
            panic!("expected status");
        };
        assert_eq!(status.port, 5001);
    }

    #[test]
    fn bike_is_an_alias_for_bicycle() {
        let args = RootArgs::try_parse_from(["osrmctl", "process-map", "--profile", "bike"])
            .expect("parse");
        let Command::ProcessMap(process) = args.command else {
            panic!("expected process-map");
        };
        assert_eq!(process.profile, Profile::Bicycle);
    }
}
