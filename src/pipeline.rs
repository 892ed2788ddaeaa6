//! Top-level ingest orchestration.
//!
//! One worker per release runs the full fetch → extract → convert →
//! transform → store flow; within a release, packages (and the manpages
//! inside each package) are processed sequentially. Shared status and
//! failure records sit behind a single mutex that is never held across
//! I/O. Dropping the run future (e.g. on Ctrl-C) tears every worker down
//! at its next suspension point.
//!
//! # Failure policy
//!
//! A conversion failure is confined to its manpage: it is appended to the
//! release's failures log and counted, and the package continues (without
//! a cache entry). Any other per-package error aborts that package; a
//! per-release error aborts that release. The first error seen across
//! releases becomes the run's result. Sitemap generation is non-fatal.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::convert::{ConvertError, Converter};
use crate::extract::{DebExtractor, ManpageFile};
use crate::fetcher::{Fetcher, Package};
use crate::index::{Document, Indexer};
use crate::paths::{convert_so_target, convert_symlink_target, detect_so_link, parse_manpage_path};
use crate::sitemap::SitemapGenerator;
use crate::storage::FsStorage;
use crate::transform;

/// Progress of a single release ingest.
#[derive(Debug, Clone, Default)]
pub struct ReleaseStatus {
    pub release: String,
    /// "waiting", "processing", "done", or "error".
    pub stage: String,
    pub total: usize,
    pub done: usize,
    pub skipped: usize,
    pub errors: usize,
    pub failures_path: Option<PathBuf>,
}

struct ReleaseState {
    status: ReleaseStatus,
    failures: Vec<String>,
}

pub struct Runner {
    fetcher: Fetcher,
    converter: Converter,
    storage: FsStorage,
    indexer: Option<Arc<dyn Indexer>>,
    sitemap: Option<SitemapGenerator>,
    failures_dir: Option<PathBuf>,
    force: bool,
    state: Mutex<Vec<ReleaseState>>,
}

impl Runner {
    pub fn new(fetcher: Fetcher, converter: Converter, storage: FsStorage) -> Self {
        Self {
            fetcher,
            converter,
            storage,
            indexer: None,
            sitemap: None,
            failures_dir: None,
            force: false,
            state: Mutex::new(Vec::new()),
        }
    }

    pub fn with_indexer(mut self, indexer: Arc<dyn Indexer>) -> Self {
        self.indexer = Some(indexer);
        self
    }

    pub fn with_sitemap(mut self, sitemap: SitemapGenerator) -> Self {
        self.sitemap = Some(sitemap);
        self
    }

    pub fn with_failures_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.failures_dir = Some(dir.into());
        self
    }

    /// Bypass the package cache and reprocess everything.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Current per-release progress snapshot.
    pub fn statuses(&self) -> Vec<ReleaseStatus> {
        let state = self.state.lock().expect("runner state poisoned");
        state.iter().map(|rel| rel.status.clone()).collect()
    }

    /// Runs the full ingest for the given releases, in parallel.
    pub async fn run(self: Arc<Self>, releases: &[String]) -> Result<()> {
        {
            let mut state = self.state.lock().expect("runner state poisoned");
            *state = releases
                .iter()
                .map(|release| ReleaseState {
                    status: ReleaseStatus {
                        release: release.clone(),
                        stage: "waiting".to_string(),
                        ..Default::default()
                    },
                    failures: Vec::new(),
                })
                .collect();
        }

        let mut workers = JoinSet::new();
        for (idx, release) in releases.iter().enumerate() {
            let runner = Arc::clone(&self);
            let release = release.clone();
            workers.spawn(async move {
                let result = runner.run_release(idx, &release).await;
                (idx, release, result)
            });
        }

        let mut first_err: Option<anyhow::Error> = None;
        while let Some(joined) = workers.join_next().await {
            let (idx, release, result) = joined.context("join release worker")?;
            if let Err(err) = result {
                error!(release = %release, error = %format!("{err:#}"), "release failed");
                self.set_stage(idx, "error");
                if first_err.is_none() {
                    first_err = Some(err);
                }
            } else {
                self.set_stage(idx, "done");
            }
        }

        if let Some(indexer) = &self.indexer {
            indexer.close().await.context("close indexer")?;
        }

        if let Some(generator) = &self.sitemap {
            if let Err(err) = generator.generate(releases) {
                // Non-fatal: a sitemap error must not fail the ingest.
                error!(error = %format!("{err:#}"), "sitemap generation failed");
            }
        }

        let total_failures: usize = {
            let state = self.state.lock().expect("runner state poisoned");
            state.iter().map(|rel| rel.failures.len()).sum()
        };
        if total_failures > 0 {
            warn!(count = total_failures, "ingest completed with failures");
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn run_release(&self, idx: usize, release: &str) -> Result<()> {
        // Per-release scratch directory for downloads and extraction.
        let release_dir = self.fetcher.work_dir().join(release);
        std::fs::create_dir_all(&release_dir).context("create release work dir")?;
        let fetcher = self.fetcher.with_work_dir(&release_dir);
        let extractor = DebExtractor::new(&release_dir);

        let failures_path = self
            .failures_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}-failures.log", release)));
        if let Some(path) = &failures_path {
            // Create the log up front so it can be tailed during the run.
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let _ = std::fs::write(path, b"");
        }
        {
            let mut state = self.state.lock().expect("runner state poisoned");
            state[idx].status.failures_path = failures_path;
        }

        info!(release, "fetching package list");
        let packages = fetcher
            .fetch_packages(release)
            .await
            .with_context(|| format!("fetch packages for {}", release))?;

        {
            let mut state = self.state.lock().expect("runner state poisoned");
            state[idx].status.stage = "processing".to_string();
            state[idx].status.total = packages.len();
        }

        for package in &packages {
            if let Err(err) = self
                .process_package(idx, release, package, &fetcher, &extractor)
                .await
            {
                self.record_failure(idx, "package", &package.name, &err);
            }
            let mut state = self.state.lock().expect("runner state poisoned");
            state[idx].status.done += 1;
        }

        let status = {
            let state = self.state.lock().expect("runner state poisoned");
            state[idx].status.clone()
        };
        info!(
            release,
            total = status.total,
            skipped = status.skipped,
            errors = status.errors,
            "release done"
        );
        Ok(())
    }

    async fn process_package(
        &self,
        idx: usize,
        release: &str,
        package: &Package,
        fetcher: &Fetcher,
        extractor: &DebExtractor,
    ) -> Result<()> {
        info!(release, package = %package.name, "processing package");

        if !self.force && !package.name.is_empty() && !package.sha1.is_empty() {
            if self
                .storage
                .check_cache(release, &package.name, &package.sha1)
            {
                debug!(release, package = %package.name, "skipping unchanged package");
                let mut state = self.state.lock().expect("runner state poisoned");
                state[idx].status.skipped += 1;
                return Ok(());
            }
        }

        let deb_path = fetcher
            .fetch_deb(&package.filename)
            .await
            .with_context(|| format!("fetch deb {}", package.filename))?;

        let result = self
            .process_deb(idx, release, package, &deb_path, extractor)
            .await;
        let _ = std::fs::remove_file(&deb_path);
        result
    }

    async fn process_deb(
        &self,
        idx: usize,
        release: &str,
        package: &Package,
        deb_path: &Path,
        extractor: &DebExtractor,
    ) -> Result<()> {
        // The TempDir guard removes the extraction tree on every path out.
        let (manpages, _extract_dir) = extractor
            .extract_manpages(deb_path)
            .await
            .with_context(|| format!("extract manpages for {}", package.filename))?;

        let mut convert_failures = 0usize;
        for manpage in &manpages {
            debug!(
                path = %manpage.relative_path,
                symlink = manpage.is_symlink,
                "processing"
            );
            if let Err(err) = process_single_manpage(
                release,
                manpage,
                &self.converter,
                &self.storage,
                self.indexer.as_deref(),
            )
            .await
            {
                if err.downcast_ref::<ConvertError>().is_some() {
                    self.record_failure(idx, "convert", &manpage.path.to_string_lossy(), &err);
                    convert_failures += 1;
                    continue;
                }
                return Err(err);
            }
        }

        // The cache marks a package fully persisted; a convert failure
        // leaves it uncached so the next run retries the package.
        if convert_failures == 0 && !package.name.is_empty() && !package.sha1.is_empty() {
            self.storage
                .write_cache(release, &package.name, &package.sha1)
                .with_context(|| format!("write cache for {}", package.name))?;
        }

        Ok(())
    }

    fn set_stage(&self, idx: usize, stage: &str) {
        let mut state = self.state.lock().expect("runner state poisoned");
        if let Some(rel) = state.get_mut(idx) {
            rel.status.stage = stage.to_string();
        }
    }

    fn record_failure(&self, idx: usize, stage: &str, path: &str, err: &anyhow::Error) {
        let message = format!("{} {}: {:#}", stage, path, err).trim().to_string();

        let failures_path = {
            let mut state = self.state.lock().expect("runner state poisoned");
            state[idx].failures.push(message.clone());
            state[idx].status.errors += 1;
            state[idx].status.failures_path.clone()
        };

        // Append outside the lock so a slow disk cannot stall workers.
        if let Some(path) = failures_path {
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(&path)
            {
                let _ = writeln!(file, "{}", message);
            }
        }

        warn!(stage, path, error = %message, "pipeline failure");
    }
}

/// Converts and stores a single manpage file.
///
/// Symlinks and `.so` include directives are persisted as symlinks
/// without invoking the converter. Conversion failures come back as
/// [`ConvertError`] so callers can decide whether they are fatal.
pub async fn process_single_manpage(
    release: &str,
    manpage: &ManpageFile,
    converter: &Converter,
    storage: &FsStorage,
    indexer: Option<&dyn Indexer>,
) -> Result<()> {
    let paths = parse_manpage_path(release, &manpage.relative_path)
        .with_context(|| format!("parse manpage path {}", manpage.relative_path))?;

    if manpage.is_symlink {
        let target = convert_symlink_target(&manpage.symlink_target);
        storage
            .write_symlink(&paths.html_path, &target)
            .context("write html symlink")?;
        storage
            .write_gzip_symlink(&paths.gzip_path, &manpage.symlink_target)
            .context("write gzip symlink")?;
        return Ok(());
    }

    if let Some(target) = detect_so_link(&manpage.path)? {
        // The gzipped source is not duplicated for .so redirects; the
        // target page's own gzip already exists.
        let so_target = convert_so_target(&target);
        storage
            .write_symlink(&paths.html_path, &so_target)
            .context("write html symlink")?;
        return Ok(());
    }

    let raw_html = match converter.convert(&manpage.path).await {
        Ok(raw_html) => raw_html,
        Err(err) => {
            return Err(ConvertError::new(format!(
                "convert {}: {:#}",
                manpage.path.display(),
                err
            ))
            .into());
        }
    };

    let mut meta = manpage.meta.clone();
    meta.filename = manpage
        .relative_path
        .rsplit('/')
        .next()
        .unwrap_or(&manpage.relative_path)
        .to_string();

    let doc = transform::pipeline(release, &raw_html, &meta)
        .with_context(|| format!("transform {}", manpage.path.display()))?;

    storage
        .write_html(&paths.html_path, &doc.body)
        .with_context(|| format!("write html {}", paths.html_path))?;

    if let Some(indexer) = indexer {
        let content = transform::strip_html_tags(&String::from_utf8_lossy(&doc.body));
        let document = Document {
            title: doc.title.clone(),
            path: format!("/{}", paths.html_path),
            section: paths.section,
            distro: release.to_string(),
            language: paths.language.clone(),
            content,
        };
        indexer
            .index_manpage(document)
            .await
            .with_context(|| format!("index manpage {}", paths.html_path))?;
    }

    let source = std::fs::read(&manpage.path).context("read manpage gzip")?;
    storage
        .write_gzip(&paths.gzip_path, &source)
        .with_context(|| format!("write gzip {}", paths.gzip_path))?;

    Ok(())
}
