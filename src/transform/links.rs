//! Cross-reference link rewriting.
//!
//! Three reference shapes are rewritten into site-relative links:
//! pandoc-style `file://` URLs, mandoc `.Xr` anchors, and plain
//! `name(section)` references in body text (with surrounding `<b>`/`<i>`
//! formatting pulled inside the generated anchor).

use anyhow::{ensure, Result};
use regex::bytes::Regex;
use std::sync::LazyLock;

static MAN_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"file:///[^"\s]*/man([1-9])/([^"\s]+)\.[1-9](\.gz)?"#).unwrap()
});
static XR_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<a class="Xr"[^>]*>([a-zA-Z0-9._-]+)\(([1-9][a-z]*)\)</a>"#).unwrap()
});
// Plain-text name(section) references, matched against tag-stripped text.
static XREF_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([a-zA-Z0-9][-a-zA-Z0-9._:+]*)\(([1-9][a-z]*)\)").unwrap());
// Opening and closing <b>/<i> tags, with optional attributes.
static INLINE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</?[bi]\b[^>]*>").unwrap());
static TRAILING_INLINE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[bi]\b[^>]*>\z").unwrap());
static LEADING_INLINE_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A</[bi]>").unwrap());

/// Rewrites every manpage cross-reference in `html` into a link under
/// `/manpages/{release}/`.
pub fn rewrite_links(release: &str, html: &[u8]) -> Result<Vec<u8>> {
    ensure!(!release.is_empty(), "release is required");

    // Pandoc-style file:// links.
    let replacement = format!("/manpages/{}/man$1/$2.$1.html", release);
    let html = MAN_LINK.replace_all(html, replacement.as_bytes());

    // Mandoc .Xr anchors: force the canonical href, keep the text.
    let html = XR_TAG.replace_all(&html, |caps: &regex::bytes::Captures| {
        let name = String::from_utf8_lossy(&caps[1]).into_owned();
        let section = String::from_utf8_lossy(&caps[2]).into_owned();
        format!(
            r#"<a class="Xr" href="/manpages/{release}/man{section}/{name}.{section}.html">{name}({section})</a>"#
        )
        .into_bytes()
    });

    Ok(rewrite_text_xrefs(release, &html))
}

/// Wraps plain `name(section)` references with anchors.
///
/// Inline `<b>`/`<i>` tag positions are collected in one pass; the
/// tag-stripped text is matched and positions are mapped back through a
/// position table, which keeps the cost linear on long paragraphs.
fn rewrite_text_xrefs(release: &str, html: &[u8]) -> Vec<u8> {
    let tag_spans: Vec<(usize, usize)> = INLINE_TAG
        .find_iter(html)
        .map(|m| (m.start(), m.end()))
        .collect();

    let mut stripped = Vec::with_capacity(html.len());
    let mut pos_map = Vec::with_capacity(html.len());
    let mut tag_idx = 0;
    let mut i = 0;
    while i < html.len() {
        if tag_idx < tag_spans.len() && i == tag_spans[tag_idx].0 {
            i = tag_spans[tag_idx].1;
            tag_idx += 1;
            continue;
        }
        pos_map.push(i);
        stripped.push(html[i]);
        i += 1;
    }

    let matches: Vec<_> = XREF_TEXT.captures_iter(&stripped).collect();
    if matches.is_empty() {
        return html.to_vec();
    }

    let mut out = Vec::with_capacity(html.len() + matches.len() * 64);
    let mut last_end = 0;
    for caps in &matches {
        let whole = caps.get(0).unwrap();

        // Map stripped positions back to original positions, then expand
        // the span over adjacent inline tags so formatting stays inside
        // the anchor.
        let orig_start = pos_map[whole.start()];
        let orig_match_end = pos_map[whole.end() - 1] + 1;
        let orig_start = expand_left(html, orig_start, last_end);
        let orig_end = expand_right(html, orig_match_end);

        if orig_start < last_end || is_inside_anchor(&html[..orig_start]) {
            continue;
        }

        let name = String::from_utf8_lossy(&caps[1]);
        let section = String::from_utf8_lossy(&caps[2]);
        let href = format!("/manpages/{}/man{}/{}.{}.html", release, section, name, section);

        out.extend_from_slice(&html[last_end..orig_start]);
        out.extend_from_slice(b"<a href=\"");
        out.extend_from_slice(href.as_bytes());
        out.extend_from_slice(b"\">");
        out.extend_from_slice(&html[orig_start..orig_end]);
        out.extend_from_slice(b"</a>");
        last_end = orig_end;
    }
    out.extend_from_slice(&html[last_end..]);
    out
}

fn expand_left(html: &[u8], mut pos: usize, limit: usize) -> usize {
    while pos > limit {
        match TRAILING_INLINE_OPEN.find(&html[limit..pos]) {
            Some(m) => pos = limit + m.start(),
            None => break,
        }
    }
    pos
}

fn expand_right(html: &[u8], mut pos: usize) -> usize {
    while pos < html.len() {
        match LEADING_INLINE_CLOSE.find(&html[pos..]) {
            Some(m) if m.start() == 0 => pos += m.end(),
            _ => break,
        }
    }
    pos
}

fn is_inside_anchor(html: &[u8]) -> bool {
    let last_open = [&b"<a "[..], &b"<a>"[..]]
        .iter()
        .filter_map(|needle| rfind(html, needle))
        .max();
    let Some(last_open) = last_open else {
        return false;
    };
    match rfind(html, b"</a>") {
        Some(last_close) => last_open > last_close,
        None => true,
    }
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .rposition(|window| window == needle)
}
