use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Application configuration, loaded from a TOML file.
///
/// See `config/manpages.example.toml` for a full example.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Public site base URL, e.g. `https://manpages.ubuntu.com`.
    pub site: String,
    /// Debian archive base URL, e.g. `http://archive.ubuntu.com/ubuntu`.
    pub archive: String,
    /// Root of the published file tree (fragments, gzip sources, sitemaps).
    pub public_html_dir: PathBuf,
    /// Path of the search index database. Defaults to
    /// `{public_html_dir}/search.db` when unset.
    #[serde(default)]
    pub index_path: Option<PathBuf>,
    /// Archive repositories to scan, e.g. `["main", "universe"]`.
    pub repos: Vec<String>,
    /// Architecture whose binary indexes are fetched, e.g. `amd64`.
    pub arch: String,
    /// Releases to ingest: codename → human label (e.g. `noble = "24.04"`).
    pub releases: BTreeMap<String, String>,
}

impl Config {
    pub fn index_path(&self) -> PathBuf {
        match &self.index_path {
            Some(path) => path.clone(),
            None => self.public_html_dir.join("search.db"),
        }
    }

    pub fn site_url(&self) -> String {
        self.site.trim_end_matches('/').to_string()
    }

    /// Release codenames in sorted order (BTreeMap iteration order).
    pub fn release_keys(&self) -> Vec<String> {
        self.releases.keys().cloned().collect()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.site.is_empty() {
        anyhow::bail!("site is required");
    }
    if config.archive.is_empty() {
        anyhow::bail!("archive is required");
    }
    if config.public_html_dir.as_os_str().is_empty() {
        anyhow::bail!("public_html_dir is required");
    }
    if config.repos.is_empty() {
        anyhow::bail!("repos must not be empty");
    }
    if config.arch.is_empty() {
        anyhow::bail!("arch is required");
    }
    if config.releases.is_empty() {
        anyhow::bail!("releases must not be empty");
    }

    Ok(config)
}
