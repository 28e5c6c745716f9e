//! Region keys and the artifact layout derived from them.
//!
//! Every file path and container name an operation touches is derived here
//! from the region, so two invocations for the same region always agree on
//! what "done" looks like without any bookkeeping file.
use crate::error::{OsrmError, OsrmResult};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Mount point of the data directory inside every OSRM container.
pub const CONTAINER_DATA_DIR: &str = "/data";

const MAX_REGION_LEN: usize = 128;

/// Validated region key, e.g. `malaysia-singapore-brunei`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Region(String);

impl Region {
    pub fn parse(raw: &str) -> OsrmResult<Self> {
        let invalid = |reason: &str| OsrmError::InvalidRegion {
            region: raw.to_string(),
            reason: reason.to_string(),
        };
        if raw.is_empty() {
            return Err(invalid("region must be non-empty"));
        }
        if raw.len() > MAX_REGION_LEN {
            return Err(invalid("region must be at most 128 bytes"));
        }
        if !region_pattern().is_match(raw) {
            return Err(invalid(
                "region must start with a letter or digit and contain only letters, digits, '-', '_' or '.'",
            ));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn region_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid region regex"))
}

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Download,
    Extract,
    Partition,
    Customize,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Download,
        Stage::Extract,
        Stage::Partition,
        Stage::Customize,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Download => "download",
            Stage::Extract => "extract",
            Stage::Partition => "partition",
            Stage::Customize => "customize",
        }
    }

    /// The file artifact this stage produces.
    pub fn artifact(self) -> Artifact {
        match self {
            Stage::Download => Artifact::RawExtract,
            Stage::Extract => Artifact::ExtractedGraph,
            Stage::Partition => Artifact::PartitionedGraph,
            Stage::Customize => Artifact::CustomizedGraph,
        }
    }

    /// Stages that run inside a container (everything but the download).
    pub fn is_containerized(self) -> bool {
        !matches!(self, Stage::Download)
    }

    /// Suffixes (appended to the graph base) written by this stage; the
    /// first one is the marker the probe checks.
    fn graph_outputs(self) -> &'static [&'static str] {
        match self {
            Stage::Download => &[],
            Stage::Extract => EXTRACT_OUTPUTS,
            Stage::Partition => &[".partition", ".cells"],
            Stage::Customize => &[".mldgr", ".cell_metrics"],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const EXTRACT_OUTPUTS: &[&str] = &[
    ".ebg",
    ".ebg_nodes",
    ".edges",
    ".enw",
    ".fileIndex",
    ".geometry",
    ".icd",
    ".maneuver_overrides",
    ".names",
    ".nbg_nodes",
    ".properties",
    ".ramIndex",
    ".restrictions",
    ".timestamp",
    ".tld",
    ".tls",
    ".turn_duration_penalties",
    ".turn_penalties_index",
    ".turn_weight_penalties",
    ".cnbg",
    ".cnbg_to_ebg",
];

/// Named artifacts whose presence encodes pipeline progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Artifact {
    RawExtract,
    ExtractedGraph,
    PartitionedGraph,
    CustomizedGraph,
    ServerProcess,
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Artifact::RawExtract => "raw extract",
            Artifact::ExtractedGraph => "extracted graph",
            Artifact::PartitionedGraph => "partitioned graph",
            Artifact::CustomizedGraph => "customized graph",
            Artifact::ServerProcess => "server container",
        };
        f.write_str(label)
    }
}

/// Routing profile baked into the graph at extract time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    Car,
    Foot,
    #[value(alias = "bike")]
    Bicycle,
}

impl Profile {
    /// Profile script path inside the OSRM image.
    pub fn lua_path(self) -> String {
        let name = match self {
            Profile::Car => "car",
            Profile::Foot => "foot",
            Profile::Bicycle => "bicycle",
        };
        format!("/opt/{name}.lua")
    }
}

/// Query algorithm passed to `osrm-routed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Mld,
    Ch,
}

impl Algorithm {
    pub fn as_arg(self) -> &'static str {
        match self {
            Algorithm::Mld => "mld",
            Algorithm::Ch => "ch",
        }
    }
}

/// Which side of a region a container belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerRole {
    Stage(Stage),
    Server,
}

impl ContainerRole {
    fn suffix(self) -> &'static str {
        match self {
            ContainerRole::Stage(stage) => stage.name(),
            ContainerRole::Server => "server",
        }
    }
}

/// Typed paths and container names for one region in one data directory.
#[derive(Debug, Clone)]
pub struct RegionLayout {
    region: Region,
    data_dir: PathBuf,
    container_prefix: String,
}

impl RegionLayout {
    pub fn new(region: Region, data_dir: PathBuf, container_prefix: &str) -> Self {
        Self {
            region,
            data_dir,
            container_prefix: container_prefix.to_string(),
        }
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Return the `{region}-latest.osm.pbf` file name.
    pub fn raw_extract_file_name(&self) -> String {
        format!("{}-latest.osm.pbf", self.region)
    }

    /// Return the `{region}-latest.osrm` graph base name.
    pub fn graph_base_name(&self) -> String {
        format!("{}-latest.osrm", self.region)
    }

    /// Return the host path of the downloaded extract.
    pub fn raw_extract_path(&self) -> PathBuf {
        self.data_dir.join(self.raw_extract_file_name())
    }

    /// Return the marker file whose presence means `stage` completed.
    pub fn marker_path(&self, stage: Stage) -> PathBuf {
        match stage {
            Stage::Download => self.raw_extract_path(),
            _ => self.graph_file(stage.graph_outputs()[0]),
        }
    }

    /// Return every file `stage` writes; used to clear partial output.
    pub fn output_paths(&self, stage: Stage) -> Vec<PathBuf> {
        match stage {
            Stage::Download => vec![self.raw_extract_path()],
            _ => stage
                .graph_outputs()
                .iter()
                .map(|suffix| self.graph_file(suffix))
                .collect(),
        }
    }

    /// Return the extract path as seen from inside a container.
    pub fn container_raw_extract(&self) -> String {
        format!("{CONTAINER_DATA_DIR}/{}", self.raw_extract_file_name())
    }

    /// Return the graph base as seen from inside a container.
    pub fn container_graph_base(&self) -> String {
        format!("{CONTAINER_DATA_DIR}/{}", self.graph_base_name())
    }

    /// Return the `{prefix}-{region}-{stage|server}` container name.
    pub fn container_name(&self, role: ContainerRole) -> String {
        format!(
            "{}-{}-{}",
            self.container_prefix,
            self.region,
            role.suffix()
        )
    }

    pub fn server_container(&self) -> String {
        self.container_name(ContainerRole::Server)
    }

    /// Names of the per-stage containers, in stage order.
    pub fn stage_containers(&self) -> Vec<String> {
        Stage::ALL
            .iter()
            .filter(|stage| stage.is_containerized())
            .map(|stage| self.container_name(ContainerRole::Stage(*stage)))
            .collect()
    }

    fn graph_file(&self, suffix: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}{suffix}", self.graph_base_name()))
    }
}
