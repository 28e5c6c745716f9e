//! Bulk download of raw extracts from a mirror.
use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::time::Duration;
use ureq::Agent;

/// Fetches a URL into a destination file.
///
/// Implementations must never leave a partially written file at `dest`: the
/// artifact probe treats presence as completion.
pub trait Downloader {
    /// Returns the number of bytes written.
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// Blocking HTTP downloader that streams into a temp file beside `dest`
/// and renames it into place once the body has been read completely.
pub struct HttpDownloader {
    agent: Agent,
}

impl HttpDownloader {
    pub fn new(timeout: Duration) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: Agent::new_with_config(config),
        }
    }
}

impl Downloader for HttpDownloader {
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        let dir = dest
            .parent()
            .ok_or_else(|| anyhow!("download target {} has no parent", dest.display()))?;
        let mut response = self
            .agent
            .get(url)
            .call()
            .with_context(|| format!("GET {url}"))?;
        let mut partial = tempfile::Builder::new()
            .prefix(".download-")
            .suffix(".part")
            .tempfile_in(dir)
            .with_context(|| format!("create temp file in {}", dir.display()))?;
        let bytes = std::io::copy(&mut response.body_mut().as_reader(), partial.as_file_mut())
            .context("stream response body")?;
        partial.as_file().sync_all().context("flush download")?;
        partial
            .persist(dest)
            .with_context(|| format!("move download into {}", dest.display()))?;
        Ok(bytes)
    }
}

/// Mirror URL for a raw extract file name.
pub fn mirror_url(base_url: &str, file_name: &str) -> String {
    format!("{}/{file_name}", base_url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_url_joins_without_doubling_slashes() {
        assert_eq!(
            mirror_url("https://download.geofabrik.de/asia/", "testland-latest.osm.pbf"),
            "https://download.geofabrik.de/asia/testland-latest.osm.pbf"
        );
        assert_eq!(
            mirror_url("http://mirror.local", "x-latest.osm.pbf"),
            "http://mirror.local/x-latest.osm.pbf"
        );
    }

    #[test]
    fn unreachable_mirror_leaves_no_file_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dest = dir.path().join("testland-latest.osm.pbf");
        let downloader = HttpDownloader::new(Duration::from_secs(2));
        // Port 9 (discard) on localhost is not expected to speak HTTP.
        let result = downloader.fetch("http://127.0.0.1:9/testland-latest.osm.pbf", &dest);
        assert!(result.is_err());
        assert!(!dest.exists());
        let leftovers = std::fs::read_dir(dir.path()).expect("read dir").count();
        assert_eq!(leftovers, 0);
    }
}
