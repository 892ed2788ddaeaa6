//! Structural rewrites: NAME section removal, heading shifts, empty
//! section pruning, and `mp-section` wrapping.

use regex::bytes::Regex;
use std::sync::LazyLock;

use super::text::drop_tags;
use super::title::is_name_keyword;

static NAME_SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<section[^>]*>\s*<h1[^>]*>.*?</h1>.*?</section>").unwrap());
static H1_BYTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)(<h1[^>]*>)(.*?)(</h1>)").unwrap());
static EMPTY_SECTION_TAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)</h[12]>\s*</section>\s*").unwrap());
static LEADING_BREAKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A(\s*<br\s*/?\s*>\s*)+").unwrap());

static H2_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<(/?)h2([\s>])").unwrap());
static H1_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<(/?)h1([\s>])").unwrap());

static SECTION_H2: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)(<section[^>]*>)\s*(<h2[^>]*>.*?</h2>)\s*(.*?)(</section>)").unwrap()
});
static SECTION_H3: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)(<section[^>]*>)\s*(<h3[^>]*>.*?</h3>)\s*(.*?)(</section>)").unwrap()
});
static CLASS_ATTR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"class="([^"]*)""#).unwrap());
static H2_ELEMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<h2[^>]*>.*?</h2>").unwrap());

/// Removes the NAME heading and its section body. Prefers removing a
/// whole wrapping `<section>`; otherwise removes from the NAME `<h1>` up
/// to the next `<h1>` (or, for a non-NAME first heading, just the tag).
pub(crate) fn remove_first_heading(html: &[u8]) -> Vec<u8> {
    if let Some(m) = NAME_SECTION.find(html) {
        let mut out = Vec::with_capacity(html.len() - m.len());
        out.extend_from_slice(&html[..m.start()]);
        out.extend_from_slice(&html[m.end()..]);
        return out;
    }

    let headings: Vec<_> = H1_BYTES.captures_iter(html).take(2).collect();
    let Some(first) = headings.first() else {
        return html.to_vec();
    };
    let whole = first.get(0).unwrap();
    let inner = String::from_utf8_lossy(&first[2]);
    let text = drop_tags(&inner);

    let mut out = Vec::with_capacity(html.len());
    if is_name_keyword(text.trim()) {
        let end = headings
            .get(1)
            .map(|next| next.get(0).unwrap().start())
            .unwrap_or(html.len());
        out.extend_from_slice(&html[..whole.start()]);
        out.extend_from_slice(&html[end..]);
    } else {
        out.extend_from_slice(&html[..whole.start()]);
        out.extend_from_slice(&html[whole.end()..]);
    }
    out
}

pub(crate) fn strip_leading_breaks(html: &[u8]) -> Vec<u8> {
    LEADING_BREAKS.replace(html, &b""[..]).into_owned()
}

/// Drops sections whose body after the heading is whitespace only.
pub(crate) fn remove_empty_sections(html: &[u8]) -> Vec<u8> {
    let mut html = html.to_vec();
    loop {
        let Some(m) = EMPTY_SECTION_TAIL.find(&html) else {
            break;
        };
        let (start, end) = (m.start(), m.end());
        match rfind(&html[..start], b"<section") {
            Some(open) => {
                html.drain(open..end);
            }
            None => {
                html.drain(start..end);
            }
        }
    }
    html
}

/// Shifts `h2` → `h3` before `h1` → `h2` so the two never collide.
pub(crate) fn shift_headings(html: &[u8]) -> Vec<u8> {
    let html = H2_TAG.replace_all(html, &b"<${1}h3${2}"[..]);
    H1_TAG.replace_all(&html, &b"<${1}h2${2}"[..]).into_owned()
}

/// Hoists each section heading above its `<section>` and tags the section
/// with the `mp-section` class. Pages without sections get their content
/// between consecutive `<h2>`s wrapped in `mp-section` divs instead;
/// subsection-only pages (`<h3>` inside sections) get the `h3` variant.
pub(crate) fn wrap_sections(html: &[u8]) -> Vec<u8> {
    if SECTION_H2.is_match(html) {
        return SECTION_H2
            .replace_all(html, |caps: &regex::bytes::Captures| {
                hoist_heading(&caps[1], &caps[2], &caps[3], &caps[4])
            })
            .into_owned();
    }

    let headings: Vec<_> = H2_ELEMENT.find_iter(html).collect();
    if headings.is_empty() {
        if SECTION_H3.is_match(html) {
            return SECTION_H3
                .replace_all(html, |caps: &regex::bytes::Captures| {
                    hoist_heading(&caps[1], &caps[2], &caps[3], &caps[4])
                })
                .into_owned();
        }
        return html.to_vec();
    }

    let mut out = Vec::with_capacity(html.len() + headings.len() * 32);
    out.extend_from_slice(&html[..headings[0].start()]);
    for (i, heading) in headings.iter().enumerate() {
        let content_end = headings
            .get(i + 1)
            .map(|next| next.start())
            .unwrap_or(html.len());
        out.extend_from_slice(&html[heading.start()..heading.end()]);
        out.extend_from_slice(b"\n<div class=\"mp-section\">");
        out.extend_from_slice(&html[heading.end()..content_end]);
        out.extend_from_slice(b"</div>");
    }
    out
}

fn hoist_heading(open_tag: &[u8], heading: &[u8], body: &[u8], close_tag: &[u8]) -> Vec<u8> {
    let open_tag = if CLASS_ATTR.is_match(open_tag) {
        CLASS_ATTR
            .replace(open_tag, &br#"class="$1 mp-section""#[..])
            .into_owned()
    } else {
        let mut tag = open_tag.to_vec();
        if let Some(pos) = tag.iter().position(|&b| b == b'>') {
            tag.splice(pos..pos, br#" class="mp-section""#.iter().copied());
        }
        tag
    };

    let mut out = Vec::with_capacity(heading.len() + 1 + open_tag.len() + body.len() + close_tag.len());
    out.extend_from_slice(heading);
    out.push(b'\n');
    out.extend_from_slice(&open_tag);
    out.extend_from_slice(body);
    out.extend_from_slice(close_tag);
    out
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .rposition(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn removes_wrapping_name_section() {
        let html = br#"<section class="Sh"><h1 id="NAME">NAME</h1><p>groff - ref</p></section><section class="Sh"><h1>DESCRIPTION</h1><p>body</p></section>"#;
        let out = s(remove_first_heading(html));
        assert!(!out.contains("NAME"));
        assert!(out.contains("DESCRIPTION"));
    }

    #[test]
    fn removes_bare_name_heading_up_to_next() {
        let html = b"<h1>NAME</h1><p>ls - list</p><h1>SYNOPSIS</h1><p>ls [opts]</p>";
        let out = s(remove_first_heading(html));
        assert_eq!(out, "<h1>SYNOPSIS</h1><p>ls [opts]</p>");
    }

    #[test]
    fn removes_only_tag_for_non_name_heading() {
        let html = b"<h1>ls(1)</h1><p>body</p>";
        assert_eq!(s(remove_first_heading(html)), "<p>body</p>");
    }

    #[test]
    fn strips_leading_breaks() {
        assert_eq!(s(strip_leading_breaks(b" <br/>\n<br>\ntext")), "text");
        assert_eq!(s(strip_leading_breaks(b"text <br/>")), "text <br/>");
    }

    #[test]
    fn prunes_empty_sections() {
        let html = b"<section><h2>EMPTY</h2> </section><section><h2>FULL</h2><p>x</p></section>";
        let out = s(remove_empty_sections(html));
        assert!(!out.contains("EMPTY"));
        assert!(out.contains("FULL"));
    }

    #[test]
    fn shifts_headings_without_collisions() {
        let html = b"<h1>SYNOPSIS</h1><h2 class=\"Ss\">Options</h2>";
        let out = s(shift_headings(html));
        assert_eq!(out, "<h2>SYNOPSIS</h2><h3 class=\"Ss\">Options</h3>");
    }

    #[test]
    fn hoists_heading_out_of_section() {
        let html = br#"<section class="Sh"><h2>SYNOPSIS</h2><p>ls</p></section>"#;
        let out = s(wrap_sections(html));
        assert!(out.starts_with("<h2>SYNOPSIS</h2>\n"));
        assert!(out.contains(r#"<section class="Sh mp-section"><p>ls</p></section>"#));
    }

    #[test]
    fn wraps_bare_h2_runs_in_divs() {
        let html = b"<p>intro</p><h2>A</h2><p>one</p><h2>B</h2><p>two</p>";
        let out = s(wrap_sections(html));
        assert!(out.starts_with("<p>intro</p><h2>A</h2>"));
        assert!(out.contains("<h2>A</h2>\n<div class=\"mp-section\"><p>one</p></div>"));
        assert!(out.contains("<h2>B</h2>\n<div class=\"mp-section\"><p>two</p></div>"));
    }

    #[test]
    fn subsection_only_pages_use_h3_variant() {
        let html = br#"<section class="Ss"><h3>Sub</h3><p>x</p></section>"#;
        let out = s(wrap_sections(html));
        assert!(out.starts_with("<h3>Sub</h3>\n"));
        assert!(out.contains("mp-section"));
    }
}
