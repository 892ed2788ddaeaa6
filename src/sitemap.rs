//! Sitemap XML generation.
//!
//! Walks the published tree and emits one sitemap per (release, section),
//! splitting at 50 000 URLs, plus a static sitemap and an index referencing
//! every emitted file. Section directories (`man1`..`man9`) are walked
//! directly; language subdirectories recurse one level into their `manN`
//! children. Failures for one release or one section are logged and
//! skipped so a partial tree still produces a sitemap index.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::path::{Path, PathBuf};
use tracing::warn;

const MAX_SITEMAP_URLS: usize = 50_000;
const SITEMAP_XMLNS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

#[derive(Debug, Clone)]
struct SitemapUrl {
    loc: String,
    lastmod: String,
}

#[derive(Debug, Clone)]
pub struct SitemapGenerator {
    /// The public HTML root.
    root: PathBuf,
    /// Site base URL without trailing slash.
    site_url: String,
}

impl SitemapGenerator {
    pub fn new(root: impl Into<PathBuf>, site_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            site_url: site_url.into(),
        }
    }

    /// Generates all sitemap files under `{root}/sitemaps/`.
    pub fn generate(&self, releases: &[String]) -> Result<()> {
        let sitemap_dir = self.root.join("sitemaps");
        std::fs::create_dir_all(&sitemap_dir).context("create sitemaps dir")?;

        let now = today_utc();
        let mut index_refs: Vec<SitemapUrl> = Vec::new();

        // Static pages: homepage, search, browse root, one entry per release.
        let mut static_urls = vec![
            SitemapUrl {
                loc: format!("{}/", self.site_url),
                lastmod: now.clone(),
            },
            SitemapUrl {
                loc: format!("{}/search", self.site_url),
                lastmod: now.clone(),
            },
            SitemapUrl {
                loc: format!("{}/manpages/", self.site_url),
                lastmod: now.clone(),
            },
        ];
        for release in releases {
            static_urls.push(SitemapUrl {
                loc: format!("{}/manpages/{}/", self.site_url, release),
                lastmod: now.clone(),
            });
        }
        write_urlset(&sitemap_dir.join("sitemap-static.xml"), &static_urls)
            .context("write static sitemap")?;
        index_refs.push(SitemapUrl {
            loc: format!("{}/sitemaps/sitemap-static.xml", self.site_url),
            lastmod: now.clone(),
        });

        for release in releases {
            let release_dir = self.root.join("manpages").join(release);
            let entries = match std::fs::read_dir(&release_dir) {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => {
                    warn!(release = %release, error = %err, "sitemap release error");
                    continue;
                }
            };

            for entry in entries.flatten() {
                let Ok(file_type) = entry.file_type() else {
                    continue;
                };
                if !file_type.is_dir() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with('.') {
                    continue;
                }
                match self.generate_dir(&sitemap_dir, release, &name, &entry.path()) {
                    Ok(refs) => index_refs.extend(refs),
                    Err(err) => {
                        warn!(release = %release, dir = %name, error = %err, "sitemap section error");
                    }
                }
            }
        }

        write_index(&sitemap_dir.join("sitemap-index.xml"), &index_refs)
            .context("write sitemap index")
    }

    /// Handles one directory under a release: a `manN` section directly,
    /// or a language directory whose `manN` children are each walked.
    fn generate_dir(
        &self,
        sitemap_dir: &Path,
        release: &str,
        dir_name: &str,
        dir_path: &Path,
    ) -> Result<Vec<SitemapUrl>> {
        if dir_name.starts_with("man") {
            return self.generate_section(sitemap_dir, release, dir_name, dir_path, "");
        }

        let mut refs = Vec::new();
        for entry in std::fs::read_dir(dir_path)?.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) || !name.starts_with("man") {
                continue;
            }
            match self.generate_section(sitemap_dir, release, &name, &entry.path(), dir_name) {
                Ok(section_refs) => refs.extend(section_refs),
                Err(err) => {
                    warn!(release, lang = dir_name, section = %name, error = %err, "sitemap lang section error");
                }
            }
        }
        Ok(refs)
    }

    fn generate_section(
        &self,
        sitemap_dir: &Path,
        release: &str,
        section: &str,
        section_dir: &Path,
        lang: &str,
    ) -> Result<Vec<SitemapUrl>> {
        let mut urls = Vec::new();
        let mut entries: Vec<_> = std::fs::read_dir(section_dir)?.flatten().collect();
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(".html") {
                continue;
            }

            let url_path = if lang.is_empty() {
                format!("/manpages/{}/{}/{}", release, section, name)
            } else {
                format!("/manpages/{}/{}/{}/{}", release, lang, section, name)
            };

            let lastmod = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .map(|mtime| DateTime::<Utc>::from(mtime).format("%Y-%m-%d").to_string())
                .unwrap_or_default();

            urls.push(SitemapUrl {
                loc: format!("{}{}", self.site_url, url_path),
                lastmod,
            });
        }

        if urls.is_empty() {
            return Ok(Vec::new());
        }

        let now = today_utc();
        let chunks: Vec<&[SitemapUrl]> = urls.chunks(MAX_SITEMAP_URLS).collect();
        let mut refs = Vec::new();

        for (i, chunk) in chunks.iter().enumerate() {
            let mut filename = if lang.is_empty() {
                format!("sitemap-{}-{}", release, section)
            } else {
                format!("sitemap-{}-{}-{}", release, lang, section)
            };
            if chunks.len() > 1 {
                filename = format!("{}-{}", filename, i + 1);
            }
            filename.push_str(".xml");

            write_urlset(&sitemap_dir.join(&filename), chunk)?;
            refs.push(SitemapUrl {
                loc: format!("{}/sitemaps/{}", self.site_url, filename),
                lastmod: now.clone(),
            });
        }

        Ok(refs)
    }
}

fn today_utc() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

fn write_urlset(path: &Path, urls: &[SitemapUrl]) -> Result<()> {
    write_xml(path, "urlset", "url", urls)
}

fn write_index(path: &Path, refs: &[SitemapUrl]) -> Result<()> {
    write_xml(path, "sitemapindex", "sitemap", refs)
}

fn write_xml(path: &Path, root_tag: &str, entry_tag: &str, urls: &[SitemapUrl]) -> Result<()> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .context("write xml decl")?;

    let mut root = BytesStart::new(root_tag);
    root.push_attribute(("xmlns", SITEMAP_XMLNS));
    writer.write_event(Event::Start(root))?;

    for url in urls {
        writer.write_event(Event::Start(BytesStart::new(entry_tag)))?;
        writer.write_event(Event::Start(BytesStart::new("loc")))?;
        writer.write_event(Event::Text(BytesText::new(&url.loc)))?;
        writer.write_event(Event::End(BytesEnd::new("loc")))?;
        if !url.lastmod.is_empty() {
            writer.write_event(Event::Start(BytesStart::new("lastmod")))?;
            writer.write_event(Event::Text(BytesText::new(&url.lastmod)))?;
            writer.write_event(Event::End(BytesEnd::new("lastmod")))?;
        }
        writer.write_event(Event::End(BytesEnd::new(entry_tag)))?;
    }

    writer.write_event(Event::End(BytesEnd::new(root_tag)))?;

    let mut content = writer.into_inner();
    content.push(b'\n');
    std::fs::write(path, content).with_context(|| format!("write sitemap {}", path.display()))?;
    Ok(())
}
