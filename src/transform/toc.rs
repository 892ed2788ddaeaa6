//! Table-of-contents generation and heading slug assignment.

use regex::bytes::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use super::text::{collapse_whitespace, drop_tags, escape_entities, unescape_entities};

static TOC_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<(h2)(\s[^>]*)?>(.+?)</h2>").unwrap());
static ID_ATTR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"\s*id="[^"]*""#).unwrap());
static PERMALINK_HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r##"<a class="permalink" href="#[^"]*""##).unwrap());

fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_dash = false;
    for c in text.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_matches('-').to_string()
}

/// Assigns a unique slug id to every `<h2>`, rewrites permalink anchors to
/// match, and returns the rewritten body together with the TOC list items
/// (in source order). Only `h2` headings participate.
pub(crate) fn generate_toc(html: &[u8]) -> (Vec<u8>, String) {
    let matches: Vec<_> = TOC_HEADING.captures_iter(html).collect();
    if matches.is_empty() {
        return (html.to_vec(), String::new());
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut entries: Vec<(String, String)> = Vec::new();

    let mut body = Vec::with_capacity(html.len() + matches.len() * 32);
    let mut last_end = 0;

    for (i, caps) in matches.iter().enumerate() {
        let whole = caps.get(0).unwrap();
        let tag = &caps[1];
        let attrs = caps.get(2).map(|m| m.as_bytes()).unwrap_or(b"");
        let inner = caps.get(3).unwrap().as_bytes();

        let text = collapse_whitespace(&drop_tags(&String::from_utf8_lossy(inner)));
        if text.is_empty() {
            body.extend_from_slice(&html[last_end..whole.end()]);
            last_end = whole.end();
            continue;
        }

        let mut slug = slugify(&unescape_entities(&text));
        if slug.is_empty() {
            slug = format!("heading-{}", i);
        }
        if seen.contains(&slug) {
            slug = format!("{}-{}", slug, i);
        }
        seen.insert(slug.clone());

        entries.push((slug.clone(), escape_entities(&unescape_entities(&text))));

        let permalink = format!(r##"<a class="permalink" href="#{}""##, slug);
        let rewritten_inner = PERMALINK_HREF.replace_all(inner, permalink.as_bytes());
        let clean_attrs = ID_ATTR.replace_all(attrs, &b""[..]);

        body.extend_from_slice(&html[last_end..whole.start()]);
        body.push(b'<');
        body.extend_from_slice(tag);
        body.extend_from_slice(b" id=\"");
        body.extend_from_slice(slug.as_bytes());
        body.push(b'"');
        body.extend_from_slice(&clean_attrs);
        body.push(b'>');
        body.extend_from_slice(&rewritten_inner);
        body.extend_from_slice(b"</");
        body.extend_from_slice(tag);
        body.push(b'>');
        last_end = whole.end();
    }
    body.extend_from_slice(&html[last_end..]);

    let mut toc = String::new();
    for (id, text) in &entries {
        toc.push_str(r#"<li class="p-table-of-contents__item">"#);
        toc.push_str(r##"<a class="p-table-of-contents__link" href="#"##);
        toc.push_str(id);
        toc.push_str(r#"">"#);
        toc.push_str(text);
        toc.push_str("</a></li>\n");
    }
    (body, toc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toc_of(html: &str) -> (String, String) {
        let (body, toc) = generate_toc(html.as_bytes());
        (String::from_utf8(body).unwrap(), toc)
    }

    #[test]
    fn assigns_slug_ids() {
        let (body, toc) = toc_of("<h2>SEE ALSO</h2><p>x</p>");
        assert!(body.contains(r#"<h2 id="see-also">SEE ALSO</h2>"#));
        assert!(toc.contains(r##"href="#see-also""##));
        assert!(toc.contains(">SEE ALSO</a>"));
    }

    #[test]
    fn replaces_existing_ids_and_permalinks() {
        let html = r##"<h2 class="Sh" id="OLD"><a class="permalink" href="#OLD">Exit Status</a></h2>"##;
        let (body, toc) = toc_of(html);
        assert!(body.contains(r#"id="exit-status""#));
        assert!(!body.contains("OLD"));
        assert!(body.contains(r##"<a class="permalink" href="#exit-status">"##));
        assert!(toc.contains("exit-status"));
    }

    #[test]
    fn deduplicates_colliding_slugs() {
        let (body, toc) = toc_of("<h2>Notes</h2><p>a</p><h2>Notes</h2><p>b</p>");
        assert!(body.contains(r#"id="notes""#));
        assert!(body.contains(r#"id="notes-1""#));
        assert_eq!(toc.matches("<li").count(), 2);
    }

    #[test]
    fn empty_slug_falls_back_to_index() {
        let (body, _) = toc_of("<h2>!!!</h2><p>x</p>");
        assert!(body.contains(r#"id="heading-0""#));
    }

    #[test]
    fn h3_subheadings_do_not_participate() {
        let (body, toc) = toc_of("<h2>Main</h2><h3>Sub</h3>");
        assert!(body.contains(r#"<h2 id="main">"#));
        assert!(!body.contains(r#"<h3 id"#));
        assert_eq!(toc.matches("<li").count(), 1);
    }

    #[test]
    fn toc_entries_escape_markup() {
        let (_, toc) = toc_of("<h2>a &amp; b</h2>");
        assert!(toc.contains(">a &amp; b</a>"));
    }

    #[test]
    fn every_toc_link_resolves() {
        let (body, toc) = toc_of("<h2>One</h2><p>x</p><h2>Two</h2><p>y</p><h2>One</h2><p>z</p>");
        for href in toc.split("href=\"#").skip(1) {
            let id = href.split('"').next().unwrap();
            assert!(
                body.contains(&format!("id=\"{}\"", id)),
                "missing id for {}",
                id
            );
        }
    }
}
