//! # Manpages ingest CLI (`manpages`)
//!
//! | Command | Description |
//! |---------|-------------|
//! | `manpages ingest` | Run the full archive → site pipeline for configured releases |
//! | `manpages ingest-pkg` | Run a single package through the pipeline |
//! | `manpages search "<query>"` | Query the search index |
//!
//! ```bash
//! manpages --config ./config/manpages.toml ingest --release noble,jammy
//! manpages --config ./config/manpages.toml ingest-pkg --release noble --package coreutils
//! manpages --config ./config/manpages.toml search "list directory"
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use manpages_ingest::{
    load_config, process_single_manpage, Config, ConvertError, Converter, DebExtractor, Fetcher,
    FsStorage, Runner, Searcher, SitemapGenerator, SqliteIndexer,
};

/// Manpages ingest: builds a browsable, searchable static manpage site
/// from a Debian package archive.
#[derive(Parser)]
#[command(name = "manpages", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/manpages.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest all configured releases (or a subset) into the public tree.
    Ingest {
        /// Comma-separated list of releases to ingest. Defaults to every
        /// configured release.
        #[arg(long)]
        release: Option<String>,

        /// Working directory for downloads and extraction. Defaults to a
        /// temp directory removed after the run.
        #[arg(long)]
        workdir: Option<PathBuf>,

        /// Reprocess every package, ignoring the content cache.
        #[arg(long)]
        force: bool,

        /// Override the public HTML output directory.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Ingest a single package from one release. The search index is left
    /// untouched; the package's cache entry is written.
    IngestPkg {
        /// Release to ingest from.
        #[arg(long)]
        release: String,

        /// Package name to process.
        #[arg(long)]
        package: String,

        /// Working directory for downloads and extraction.
        #[arg(long)]
        workdir: Option<PathBuf>,

        /// Override the public HTML output directory.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Query the search index.
    Search {
        /// Search terms.
        query: String,

        /// Restrict results to one release.
        #[arg(long, default_value = "")]
        distro: String,

        /// Manpage language directory; empty for English.
        #[arg(long, default_value = "")]
        language: String,

        #[arg(long, default_value_t = 50)]
        limit: i64,

        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&cli.log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli).await {
        tracing::error!(error = %format!("{err:#}"), "command failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest {
            release,
            workdir,
            force,
            output,
        } => ingest(config, release, workdir, force, output).await,
        Commands::IngestPkg {
            release,
            package,
            workdir,
            output,
        } => ingest_pkg(config, release, package, workdir, output).await,
        Commands::Search {
            query,
            distro,
            language,
            limit,
            offset,
        } => search(config, query, distro, language, limit, offset).await,
    }
}

/// Resolves a comma-separated release list against the configuration.
fn resolve_releases(config: &Config, release_list: Option<&str>) -> Result<Vec<String>> {
    let Some(release_list) = release_list.filter(|list| !list.trim().is_empty()) else {
        return Ok(config.release_keys());
    };

    let releases: Vec<String> = release_list
        .split(',')
        .map(|release| release.trim().to_string())
        .collect();

    for release in &releases {
        if release.is_empty() || !config.releases.contains_key(release) {
            bail!(
                "unknown release {:?} (available: {:?})",
                release,
                config.release_keys()
            );
        }
    }
    Ok(releases)
}

/// A work directory that is removed at the end of the run unless the
/// user supplied their own.
enum WorkDir {
    Owned(tempfile::TempDir),
    User(PathBuf),
}

impl WorkDir {
    fn resolve(workdir: Option<PathBuf>, prefix: &str) -> Result<WorkDir> {
        match workdir {
            Some(dir) => Ok(WorkDir::User(dir)),
            None => Ok(WorkDir::Owned(
                tempfile::Builder::new()
                    .prefix(prefix)
                    .tempdir()
                    .context("create work dir")?,
            )),
        }
    }

    fn path(&self) -> PathBuf {
        match self {
            WorkDir::Owned(dir) => dir.path().to_path_buf(),
            WorkDir::User(path) => path.clone(),
        }
    }
}

async fn ingest(
    mut config: Config,
    release: Option<String>,
    workdir: Option<PathBuf>,
    force: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    if let Some(output) = output {
        config.public_html_dir = output;
    }

    let releases = resolve_releases(&config, release.as_deref())?;
    let workdir = WorkDir::resolve(workdir, "manpages-ingest-")?;
    info!(path = %workdir.path().display(), "using work directory");

    let fetcher = Fetcher::new(
        &config.archive,
        config.repos.clone(),
        vec![config.arch.clone()],
        None,
        workdir.path(),
    );
    let indexer = SqliteIndexer::new(&config.index_path()).await?;
    let sitemap = SitemapGenerator::new(&config.public_html_dir, config.site_url());

    let runner = Arc::new(
        Runner::new(
            fetcher,
            Converter::default(),
            FsStorage::new(&config.public_html_dir),
        )
        .with_indexer(Arc::new(indexer))
        .with_sitemap(sitemap)
        .with_failures_dir(&config.public_html_dir)
        .with_force(force),
    );

    let run = runner.run(&releases);
    tokio::select! {
        result = run => result,
        _ = tokio::signal::ctrl_c() => {
            bail!("interrupted");
        }
    }
}

async fn ingest_pkg(
    mut config: Config,
    release: String,
    package_name: String,
    workdir: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<()> {
    if let Some(output) = output {
        config.public_html_dir = output;
    }
    if !config.releases.contains_key(&release) {
        bail!(
            "unknown release {:?} (available: {:?})",
            release,
            config.release_keys()
        );
    }

    let workdir = WorkDir::resolve(workdir, "manpages-ingest-pkg-")?;
    info!(path = %workdir.path().display(), "using work directory");

    let fetcher = Fetcher::new(
        &config.archive,
        config.repos.clone(),
        vec![config.arch.clone()],
        None,
        workdir.path(),
    );
    let converter = Converter::default();
    let extractor = DebExtractor::new(workdir.path());
    let storage = FsStorage::new(&config.public_html_dir);

    info!(release = %release, "fetching package list");
    let packages = fetcher
        .fetch_packages(&release)
        .await
        .context("fetch packages")?;

    let package = packages
        .iter()
        .find(|candidate| candidate.name == package_name)
        .with_context(|| {
            format!(
                "package {:?} not found in release {:?} ({} packages searched)",
                package_name,
                release,
                packages.len()
            )
        })?;
    info!(
        name = %package.name,
        version = %package.version,
        filename = %package.filename,
        "found package"
    );

    let deb_path = fetcher
        .fetch_deb(&package.filename)
        .await
        .context("fetch deb")?;
    info!(path = %deb_path.display(), "deb ready");

    let (manpages, _extract_dir) = extractor
        .extract_manpages(&deb_path)
        .await
        .context("extract manpages")?;
    info!(count = manpages.len(), "extracted manpages");

    let mut convert_errors = 0usize;
    for manpage in &manpages {
        if let Err(err) =
            process_single_manpage(&release, manpage, &converter, &storage, None).await
        {
            if err.downcast_ref::<ConvertError>().is_some() {
                warn!(path = %manpage.relative_path, error = %format!("{err:#}"), "convert failed");
                convert_errors += 1;
                continue;
            }
            return Err(err).with_context(|| format!("process manpage {}", manpage.relative_path));
        }
    }

    // Mark the package processed only when every manpage persisted, so a
    // later full ingest retries the failures.
    if convert_errors == 0 && !package.sha1.is_empty() {
        storage
            .write_cache(&release, &package.name, &package.sha1)
            .context("write cache")?;
    }

    let _ = std::fs::remove_file(&deb_path);

    info!(
        package = %package.name,
        release = %release,
        manpages = manpages.len(),
        convert_errors,
        output = %config.public_html_dir.display(),
        "done"
    );
    Ok(())
}

async fn search(
    config: Config,
    query: String,
    distro: String,
    language: String,
    limit: i64,
    offset: i64,
) -> Result<()> {
    let searcher = Searcher::open(&config.index_path()).await?;
    let response = searcher
        .search(&query, &distro, &language, limit, offset)
        .await?;
    searcher.close().await;

    if response.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    println!("{} results", response.total);
    for (i, result) in response.results.iter().enumerate() {
        println!(
            "{}. {} ({}) [{}]",
            i + 1 + offset as usize,
            result.title,
            result.section,
            result.distro
        );
        println!("    {}", result.path);
    }
    Ok(())
}
