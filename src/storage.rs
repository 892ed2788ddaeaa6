//! Release-partitioned filesystem storage for fragments, gzipped sources,
//! symlinks, and the per-package content cache.
//!
//! Every write removes any existing entry first (a previous ingest may
//! have left a symlink there, and opening with truncate would follow it
//! into the wrong file) and then atomically replaces the path via a temp
//! file in the destination directory.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn write_html(&self, dest_path: &str, content: &[u8]) -> Result<()> {
        self.write_file(dest_path, content)
    }

    pub fn write_gzip(&self, dest_path: &str, content: &[u8]) -> Result<()> {
        self.write_file(dest_path, content)
    }

    pub fn write_symlink(&self, dest_path: &str, target: &str) -> Result<()> {
        self.write_symlink_at(&self.root.join(dest_path), target)
    }

    pub fn write_gzip_symlink(&self, dest_path: &str, target: &str) -> Result<()> {
        self.write_symlink_at(&self.root.join(dest_path), target)
    }

    /// True iff the cache file for the package exists and records this
    /// exact index hash.
    pub fn check_cache(&self, release: &str, pkg_name: &str, sha1: &str) -> bool {
        match std::fs::read_to_string(self.cache_path(release, pkg_name)) {
            Ok(recorded) => recorded == sha1,
            Err(_) => false,
        }
    }

    /// Records the index hash for a package. Written only after every
    /// manpage of the package has been persisted.
    pub fn write_cache(&self, release: &str, pkg_name: &str, sha1: &str) -> Result<()> {
        if release.is_empty() {
            anyhow::bail!("cache release required");
        }
        self.write_file_absolute(&self.cache_path(release, pkg_name), sha1.as_bytes())
    }

    fn cache_path(&self, release: &str, pkg_name: &str) -> PathBuf {
        self.root
            .join("manpages")
            .join(release)
            .join(".cache")
            .join(pkg_name)
    }

    fn write_file(&self, dest_path: &str, content: &[u8]) -> Result<()> {
        self.write_file_absolute(&self.root.join(dest_path), content)
    }

    fn write_file_absolute(&self, full_path: &Path, content: &[u8]) -> Result<()> {
        let parent = full_path.parent().context("destination has no parent")?;
        std::fs::create_dir_all(parent).context("mkdir")?;

        remove_existing(full_path)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent).context("create temp file")?;
        tmp.write_all(content).context("write file")?;
        let file = tmp.persist(full_path).context("persist file")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o644))
                .context("set permissions")?;
        }
        #[cfg(not(unix))]
        drop(file);

        Ok(())
    }

    fn write_symlink_at(&self, full_path: &Path, target: &str) -> Result<()> {
        let parent = full_path.parent().context("destination has no parent")?;
        std::fs::create_dir_all(parent).context("mkdir")?;

        remove_existing(full_path)?;

        #[cfg(unix)]
        std::os::unix::fs::symlink(target, full_path).context("symlink")?;
        #[cfg(not(unix))]
        anyhow::bail!("symlinks unsupported on this platform");

        #[cfg(unix)]
        Ok(())
    }
}

/// Unlinks whatever currently sits at `path`, including a dangling or
/// circular symlink. `symlink_metadata` is used so the link itself is
/// inspected, never its target.
fn remove_existing(path: &Path) -> Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(_) => std::fs::remove_file(path).context("remove existing"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).context("stat existing"),
    }
}
