//! Ingest pipeline for a browsable, searchable static manpage site.
//!
//! The crate turns Debian binary packages from an apt-style archive into
//! release-partitioned HTML fragments, gzipped sources, a full-text
//! search index, and sitemap manifests:
//!
//! ```text
//! Fetcher → Extractor → Paths ─┬→ symlink / .so redirect
//!                              └→ Converter → Transform ─┬→ Storage
//!                                                        └→ Indexer
//!                                        Runner ──────────→ Sitemaps
//! ```
//!
//! The [`pipeline::Runner`] orchestrates one worker per release; see the
//! module documentation for the failure policy.

pub mod config;
pub mod convert;
pub mod extract;
pub mod fetcher;
pub mod index;
pub mod paths;
pub mod pipeline;
pub mod search;
pub mod sitemap;
pub mod storage;
pub mod transform;
pub mod version;

pub use config::{load_config, Config};
pub use convert::{ConvertError, Converter};
pub use extract::{DebExtractor, ManpageFile};
pub use fetcher::{Fetcher, Package};
pub use index::{Document, Indexer, NoopIndexer, SqliteIndexer};
pub use paths::{parse_manpage_path, ManpagePaths};
pub use pipeline::{process_single_manpage, ReleaseStatus, Runner};
pub use search::{SearchResponse, Searcher};
pub use sitemap::SitemapGenerator;
pub use storage::FsStorage;
pub use transform::{FragmentMeta, ManpageMeta};
