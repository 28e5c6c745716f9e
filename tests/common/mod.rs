//! Shared test infrastructure for CLI integration tests.
//!
//! Each fixture owns a temp dir with a data dir, a config pointing the
//! runtime at `tests/fixtures/fake-docker.sh`, and the fake runtime's state.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

pub const REGION: &str = "testland";

/// Path of the route query built from the default health coordinates.
pub const ROUTE_PATH: &str = "/route/v1/driving/101.62917,3.10782;101.6164,3.14685";

pub struct Fixture {
    pub root: TempDir,
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
    pub state_dir: PathBuf,
    fail_stage: Option<String>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_runtime_command(None)
    }

    /// Fixture whose config names `runtime_command` instead of the fake.
    pub fn with_runtime_command(runtime_command: Option<&str>) -> Self {
        let root = tempfile::tempdir().expect("create temp dir");
        let data_dir = root.path().join("osrm-data");
        let state_dir = root.path().join("runtime-state");
        fs::create_dir_all(&data_dir).expect("create data dir");
        fs::create_dir_all(&state_dir).expect("create state dir");

        let runtime_command = match runtime_command {
            Some(command) => command.to_string(),
            None => install_fake_runtime(root.path()).display().to_string(),
        };
        let config = serde_json::json!({
            "schema_version": 1,
            "runtime_command": runtime_command,
            "image": "osrm/osrm-backend",
            "container_prefix": "osrm",
            // Nothing listens here; tests pre-create the extract.
            "mirror_base_url": "http://127.0.0.1:9/mirror",
            "download_timeout_secs": 5,
            "health": {
                "host": "127.0.0.1",
                "timeout_secs": 5
            }
        });
        let config_path = root.path().join("config.json");
        fs::write(
            &config_path,
            serde_json::to_string_pretty(&config).expect("serialize config"),
        )
        .expect("write config");

        Self {
            root,
            config_path,
            data_dir,
            state_dir,
            fail_stage: None,
        }
    }

    /// Make the fake runtime fail the given OSRM stage.
    pub fn fail_stage(&mut self, stage: Option<&str>) {
        self.fail_stage = stage.map(str::to_string);
    }

    pub fn write_raw_extract(&self) {
        fs::write(
            self.data_dir.join(format!("{REGION}-latest.osm.pbf")),
            b"fake pbf",
        )
        .expect("write raw extract");
    }

    pub fn graph_file(&self, suffix: &str) -> PathBuf {
        self.data_dir.join(format!("{REGION}-latest.osrm{suffix}"))
    }

    pub fn container_state(&self, name: &str) -> Option<String> {
        fs::read_to_string(self.state_dir.join(format!("{name}.container")))
            .ok()
            .map(|text| text.trim().to_string())
    }

    pub fn runtime_calls(&self) -> Vec<String> {
        fs::read_to_string(self.state_dir.join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn clear_runtime_calls(&self) {
        let _ = fs::remove_file(self.state_dir.join("calls.log"));
    }

    /// Run `osrmctl <args> --config <fixture config>` against the fake runtime.
    pub fn osrmctl(&self, args: &[&str]) -> Output {
        self.osrmctl_with_env(args, &[])
    }

    pub fn osrmctl_with_env(&self, args: &[&str], envs: &[(&str, &str)]) -> Output {
        let mut command = Command::new(env!("CARGO_BIN_EXE_osrmctl"));
        command
            .args(args)
            .arg("--config")
            .arg(&self.config_path)
            .env("FAKE_DOCKER_STATE", &self.state_dir)
            .env("RUST_LOG", "warn")
            .env_remove("OSRMCTL_CONFIG")
            .current_dir(self.root.path());
        match &self.fail_stage {
            Some(stage) => command.env("FAKE_DOCKER_FAIL", stage),
            None => command.env_remove("FAKE_DOCKER_FAIL"),
        };
        command.env_remove("FAKE_DOCKER_DENIED");
        command.envs(envs.iter().copied());
        command.output().expect("run osrmctl")
    }

    pub fn data_dir_arg(&self) -> String {
        self.data_dir.display().to_string()
    }
}

fn install_fake_runtime(root: &Path) -> PathBuf {
    let source = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/fake-docker.sh");
    let target = root.join("bin").join("fake-docker");
    fs::create_dir_all(target.parent().expect("bin dir")).expect("create bin dir");
    fs::copy(&source, &target).expect("copy fake runtime");
    let mut permissions = fs::metadata(&target).expect("stat fake runtime").permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&target, permissions).expect("chmod fake runtime");
    target
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

pub fn json_stdout(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|err| {
        panic!(
            "stdout is not JSON ({err}):\n{}\nstderr:\n{}",
            stdout(output),
            stderr(output)
        )
    })
}

/// Mock OSRM endpoint answering the configured health route.
pub struct RouteMock {
    pub server: mockito::ServerGuard,
    pub port: String,
}

impl RouteMock {
    pub fn new() -> Self {
        let server = mockito::Server::new();
        let port = server
            .host_with_port()
            .rsplit(':')
            .next()
            .expect("mock server port")
            .to_string();
        Self { server, port }
    }

    /// Answer the default test route with `status` and `body`.
    pub fn route(&mut self, status: usize, body: &str) -> mockito::Mock {
        self.server
            .mock("GET", ROUTE_PATH)
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create()
    }
}
