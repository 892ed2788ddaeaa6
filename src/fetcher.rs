//! Archive index fetching and `.deb` download.
//!
//! Package indexes are read from the Debian archive layout
//! `{archive}/dists/{dist}/{repo}/binary-{arch}/Packages.gz`, one fetch
//! per cell of the `(release+pocket) × repo × arch` grid, all cells in
//! flight concurrently. Candidates merge into a name-indexed map in
//! pocket priority order, replacing only on a strictly greater Debian
//! version, so a higher-versioned candidate always wins and ties keep
//! the earliest-listed pocket.

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use futures::StreamExt;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::version::version_greater;

/// Pockets overlaid on a release, in priority order: on equal versions
/// the earliest listed wins.
pub const DEFAULT_POCKETS: &[&str] = &["-updates", "-security", ""];

/// One binary package as described by an archive index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    pub version: String,
    /// Archive-relative path of the `.deb`.
    pub filename: String,
    /// Index-declared hash, used as the cache key (not re-validated).
    pub sha1: String,
}

#[derive(Debug, Clone)]
pub struct Fetcher {
    archive: String,
    repos: Vec<String>,
    archs: Vec<String>,
    pockets: Vec<String>,
    work_dir: PathBuf,
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new(
        archive: impl Into<String>,
        repos: Vec<String>,
        archs: Vec<String>,
        pockets: Option<Vec<String>>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            archive: archive.into(),
            repos,
            archs,
            pockets: pockets
                .unwrap_or_else(|| DEFAULT_POCKETS.iter().map(|p| p.to_string()).collect()),
            work_dir: work_dir.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Returns a clone scoped to a different work directory. The runner
    /// uses this to give every release worker its own scratch space.
    pub fn with_work_dir(&self, work_dir: impl Into<PathBuf>) -> Self {
        let mut fetcher = self.clone();
        fetcher.work_dir = work_dir.into();
        fetcher
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Fetches and merges the package indexes for one release.
    ///
    /// All `(pocket, repo, arch)` cells are fetched concurrently; any cell
    /// failure fails the whole call.
    pub async fn fetch_packages(&self, release: &str) -> Result<Vec<Package>> {
        if self.repos.is_empty() || self.archs.is_empty() {
            bail!("fetcher requires repos and archs");
        }

        let mut cells = Vec::new();
        for pocket in &self.pockets {
            let dist = format!("{}{}", release, pocket);
            for repo in &self.repos {
                for arch in &self.archs {
                    cells.push((dist.clone(), repo.clone(), arch.clone()));
                }
            }
        }

        let results = futures::future::try_join_all(
            cells
                .iter()
                .map(|(dist, repo, arch)| self.fetch_index_cell(dist, repo, arch)),
        )
        .await?;

        // Merge in pocket priority order (try_join_all preserves input order).
        let mut packages: HashMap<String, Package> = HashMap::new();
        for candidates in results {
            for candidate in candidates {
                match packages.get(&candidate.name) {
                    Some(current) if !version_greater(&candidate.version, &current.version) => {}
                    _ => {
                        packages.insert(candidate.name.clone(), candidate);
                    }
                }
            }
        }

        Ok(packages.into_values().collect())
    }

    async fn fetch_index_cell(&self, dist: &str, repo: &str, arch: &str) -> Result<Vec<Package>> {
        info!(dist, repo, arch, "fetching packages");

        let url = format!(
            "{}/dists/{}/{}/binary-{}/Packages.gz",
            self.archive.trim_end_matches('/'),
            dist,
            repo,
            arch
        );

        let body = async {
            let response = self.client.get(&url).send().await.context("download packages")?;
            let status = response.status();
            if !status.is_success() {
                bail!("download packages: status {}", status);
            }
            response.bytes().await.context("read packages body")
        }
        .await
        .with_context(|| format!("open packages {} {} {}", dist, repo, arch))?;

        let mut text = String::new();
        GzDecoder::new(body.as_ref())
            .read_to_string(&mut text)
            .with_context(|| format!("decompress packages {} {} {}", dist, repo, arch))?;

        let candidates = parse_packages(&text);
        info!(count = candidates.len(), dist, repo, arch, "parsed packages");
        Ok(candidates)
    }

    /// Downloads one `.deb`, streaming to a temp file that is atomically
    /// renamed to `{work_dir}/{basename}` on success.
    ///
    /// Transport errors are retried twice (1 s, then 2 s between
    /// attempts); a non-2xx status fails immediately.
    pub async fn fetch_deb(&self, archive_relative_path: &str) -> Result<PathBuf> {
        let url = format!(
            "{}/{}",
            self.archive.trim_end_matches('/'),
            archive_relative_path.trim_start_matches('/')
        );
        let basename = archive_relative_path
            .rsplit('/')
            .next()
            .unwrap_or(archive_relative_path);
        let dest = self.work_dir.join(basename);

        debug!(url = %url, "downloading deb");
        std::fs::create_dir_all(&self.work_dir).context("create work dir")?;

        let mut last_err = None;
        for attempt in 0..3 {
            if attempt > 0 {
                warn!(url = %url, attempt = attempt + 1, "retrying download");
                tokio::time::sleep(Duration::from_secs(attempt)).await;
            }

            match self.download_to(&url, &dest).await {
                Ok(()) => return Ok(dest),
                Err(err) => {
                    if !err.retryable {
                        return Err(err.error);
                    }
                    last_err = Some(err.error);
                }
            }
        }
        Err(last_err.expect("at least one download attempt"))
    }

    async fn download_to(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("download deb")
            .map_err(DownloadError::retryable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::fatal(anyhow::anyhow!(
                "download deb: status {}",
                status
            )));
        }

        let mut tmp = tempfile::NamedTempFile::new_in(&self.work_dir)
            .context("create temp deb file")
            .map_err(DownloadError::fatal)?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .context("read deb body")
                .map_err(DownloadError::retryable)?;
            tmp.write_all(&chunk)
                .context("write deb file")
                .map_err(DownloadError::fatal)?;
        }

        tmp.persist(dest)
            .context("rename deb file")
            .map_err(DownloadError::fatal)?;
        Ok(())
    }
}

/// Download failure tagged with whether another attempt makes sense:
/// transport failures are retryable, HTTP error statuses and local I/O
/// failures are not.
struct DownloadError {
    error: anyhow::Error,
    retryable: bool,
}

impl DownloadError {
    fn retryable(error: anyhow::Error) -> Self {
        Self {
            error,
            retryable: true,
        }
    }

    fn fatal(error: anyhow::Error) -> Self {
        Self {
            error,
            retryable: false,
        }
    }
}

/// Parses the RFC 822-style control file: stanzas separated by blank
/// lines, `Key: value` per line. A stanza missing any of the four
/// retained fields is silently dropped; unknown fields are ignored.
fn parse_packages(text: &str) -> Vec<Package> {
    let mut results = Vec::new();
    let mut fields: HashMap<&str, &str> = HashMap::new();

    let mut flush = |fields: &mut HashMap<&str, &str>| {
        if let (Some(name), Some(version), Some(filename), Some(sha1)) = (
            fields.get("Package"),
            fields.get("Version"),
            fields.get("Filename"),
            fields.get("SHA1"),
        ) {
            results.push(Package {
                name: name.to_string(),
                version: version.to_string(),
                filename: filename.to_string(),
                sha1: sha1.to_string(),
            });
        }
        fields.clear();
    };

    for line in text.lines() {
        if line.is_empty() {
            flush(&mut fields);
            continue;
        }
        let Some((key, value)) = line.split_once(": ") else {
            continue;
        };
        if matches!(key, "Package" | "Version" | "Filename" | "SHA1") {
            fields.insert(key, value);
        }
    }
    flush(&mut fields);

    results
}
