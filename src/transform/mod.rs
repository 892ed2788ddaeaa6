//! HTML transformation pipeline turning raw converter output into
//! web-ready manpage fragments.
//!
//! The pipeline runs as a fixed sequence of stages:
//!  1. Rewrite cross-reference links
//!  2. Extract title and remove the NAME section
//!  3. Strip leading `<br>` tags
//!  4. Remove empty sections
//!  5. Shift headings (h1 → h2, h2 → h3)
//!  6. Wrap sections with the `mp-section` class
//!  7. Generate the TOC with slug ids
//!  8. Prepend the metadata JSON header
//!
//! Stages are targeted pattern rewrites over one byte buffer rather than
//! a full HTML parse: the input grammar is the converter's narrow output,
//! the patterns are anchored, and the pipeline runs across millions of
//! files. All patterns are built once behind `LazyLock`.

mod links;
mod meta;
mod structure;
mod text;
mod title;
mod toc;

use anyhow::{Context, Result};

pub use links::rewrite_links;
pub use meta::{FragmentMeta, ManpageMeta};
pub use text::strip_html_tags;

use title::{cap_description, extract_manpage_title, split_manpage_title, title_from_filename};

/// Mutable state of a fragment as it passes through the pipeline.
#[derive(Debug, Clone)]
pub struct Doc {
    pub release: String,
    pub meta: ManpageMeta,
    /// Transformed HTML body, including the metadata header once stage 8
    /// has run.
    pub body: Vec<u8>,
    pub title: String,
    pub description: String,
    pub toc: String,
}

/// Runs all transformation stages on converter output.
///
/// This is a pure function of its inputs: identical `(release, raw_html,
/// meta)` produce byte-identical fragments.
pub fn pipeline(release: &str, raw_html: &str, meta: &ManpageMeta) -> Result<Doc> {
    let mut doc = Doc {
        release: release.to_string(),
        meta: meta.clone(),
        body: raw_html.as_bytes().to_vec(),
        title: String::new(),
        description: String::new(),
        toc: String::new(),
    };

    doc.body = rewrite_links(release, &doc.body).context("rewrite links")?;

    extract_title_and_remove_name(&mut doc);

    doc.body = structure::strip_leading_breaks(&doc.body);
    doc.body = structure::remove_empty_sections(&doc.body);
    doc.body = structure::shift_headings(&doc.body);
    doc.body = structure::wrap_sections(&doc.body);

    let (body, toc_html) = toc::generate_toc(&doc.body);
    doc.body = body;
    doc.toc = toc_html;

    prepend_meta(&mut doc).context("prepend meta")?;

    Ok(doc)
}

/// Stage 2: title/description extraction fused with NAME section removal,
/// so the body is only scanned for `<h1>` headings once per concern.
fn extract_title_and_remove_name(doc: &mut Doc) {
    let html = String::from_utf8_lossy(&doc.body).into_owned();
    let mut full_title = extract_manpage_title(&html);
    if full_title == title::FALLBACK_TITLE && !doc.meta.filename.is_empty() {
        full_title = title_from_filename(&doc.meta.filename);
    }
    let (title, description) = split_manpage_title(&full_title);
    doc.title = title;
    doc.description = cap_description(&description);
    doc.body = structure::remove_first_heading(&doc.body);
}

/// Stage 8: build the [`FragmentMeta`] JSON and prepend it as a
/// `<!--META:...-->` comment.
fn prepend_meta(doc: &mut Doc) -> Result<()> {
    let fragment = FragmentMeta {
        title: doc.title.clone(),
        description: doc.description.clone(),
        package: meta::build_package_label(&doc.meta),
        package_url: meta::build_package_url(&doc.release, &doc.meta),
        source: meta::build_source_label(&doc.meta),
        source_url: meta::build_source_url(&doc.release, &doc.meta),
        bug_url: meta::build_bug_url(&doc.release, &doc.meta),
        toc: doc.toc.clone(),
    };

    let meta_json = serde_json::to_vec(&fragment)?;

    let mut body = Vec::with_capacity(b"<!--META:-->\n".len() + meta_json.len() + doc.body.len());
    body.extend_from_slice(b"<!--META:");
    body.extend_from_slice(&meta_json);
    body.extend_from_slice(b"-->\n");
    body.extend_from_slice(&doc.body);
    doc.body = body;
    Ok(())
}
