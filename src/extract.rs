//! `.deb` extraction and control metadata.
//!
//! Unpacking and field queries are delegated to `dpkg-deb`; the only
//! format assumptions are that manpages live at paths containing `/man/`
//! with a `.gz` suffix and that the `Package`, `Version`, and `Source`
//! control fields exist.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::process::Command;
use walkdir::WalkDir;

use crate::transform::ManpageMeta;

/// One manpage file found inside an extracted package.
#[derive(Debug, Clone)]
pub struct ManpageFile {
    /// Absolute path inside the extraction directory.
    pub path: PathBuf,
    /// Slash-normalized path relative to the extraction root.
    pub relative_path: String,
    pub is_symlink: bool,
    /// Raw link target when `is_symlink` is set.
    pub symlink_target: String,
    pub meta: ManpageMeta,
}

pub struct DebExtractor {
    work_dir: PathBuf,
}

impl DebExtractor {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    /// Unpacks a `.deb` into a fresh temp directory and enumerates its
    /// manpage files. The returned [`TempDir`] removes the extraction
    /// tree when dropped, on every exit path.
    pub async fn extract_manpages(&self, deb_path: &Path) -> Result<(Vec<ManpageFile>, TempDir)> {
        let temp_dir = tempfile::Builder::new()
            .prefix("manpages-deb-")
            .tempdir_in(&self.work_dir)
            .context("create temp dir")?;

        let output = Command::new("dpkg-deb")
            .arg("-x")
            .arg(deb_path)
            .arg(temp_dir.path())
            .output()
            .await
            .context("Failed to execute 'dpkg-deb'. Is dpkg installed?")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("extract deb: {}", stderr.trim());
        }

        let mut manpages = find_manpages(temp_dir.path())?;
        let meta = read_deb_metadata(deb_path).await?;
        for manpage in &mut manpages {
            manpage.meta = meta.clone();
        }

        Ok((manpages, temp_dir))
    }
}

/// Reads `Package`, `Version`, and `Source` from the control file. The
/// `Source` field may carry a version suffix (`src (1.2-3)`), which is
/// stripped; a missing source falls back to the package name.
async fn read_deb_metadata(deb_path: &Path) -> Result<ManpageMeta> {
    let output = Command::new("dpkg-deb")
        .arg("-f")
        .arg(deb_path)
        .args(["Package", "Version", "Source"])
        .output()
        .await
        .context("read deb metadata")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("read deb metadata: {}", stderr.trim());
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.trim().lines().collect();

    let mut meta = ManpageMeta::default();
    if let Some(line) = lines.first() {
        meta.package_name = normalize_field(line, "Package");
    }
    if let Some(line) = lines.get(1) {
        meta.package_version = line.trim().to_string();
    }
    if let Some(line) = lines.get(2) {
        meta.source_package = normalize_source_field(line);
    }
    if meta.source_package.is_empty() {
        meta.source_package = meta.package_name.clone();
    }
    Ok(meta)
}

fn normalize_field(value: &str, label: &str) -> String {
    let value = value.trim();
    match value.strip_prefix(&format!("{}:", label)) {
        Some(rest) => rest.trim().to_string(),
        None => value.to_string(),
    }
}

fn normalize_source_field(value: &str) -> String {
    let value = normalize_field(value, "Source");
    match value.find(" (") {
        Some(idx) if idx > 0 => value[..idx].trim().to_string(),
        _ => value,
    }
}

/// Walks an extraction tree for manpage files: anything under a `/man/`
/// segment ending in `.gz`. Symlinks are recorded with their raw target,
/// never followed.
fn find_manpages(root: &Path) -> Result<Vec<ManpageFile>> {
    let mut results = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry.context("walk manpages")?;
        if entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path();
        let slash_path = path.to_string_lossy().replace('\\', "/");
        if !slash_path.contains("/man/") || !slash_path.ends_with(".gz") {
            continue;
        }

        let relative = path.strip_prefix(root).context("rel path")?;
        let mut item = ManpageFile {
            path: path.to_path_buf(),
            relative_path: relative.to_string_lossy().replace('\\', "/"),
            is_symlink: false,
            symlink_target: String::new(),
            meta: ManpageMeta::default(),
        };

        if entry.file_type().is_symlink() {
            item.is_symlink = true;
            let target = std::fs::read_link(path).context("read symlink")?;
            item.symlink_target = target.to_string_lossy().into_owned();
        }

        results.push(item);
    }

    Ok(results)
}
