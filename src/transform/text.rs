//! Tag stripping, whitespace, and HTML entity helpers shared by the
//! transformation stages.

use regex::Regex;
use std::sync::LazyLock;

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<[^>]+>").unwrap());

/// Removes all HTML tags, replacing each with a space, and trims.
pub fn strip_html_tags(html: &str) -> String {
    TAG.replace_all(html, " ").trim().to_string()
}

/// Removes all HTML tags without inserting replacement spaces.
pub(crate) fn drop_tags(html: &str) -> String {
    TAG.replace_all(html, "").to_string()
}

/// Replaces runs of whitespace (including newlines) with a single space.
pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decodes the HTML entities that occur in converter output: the named
/// basics plus numeric character references in decimal and hex form.
pub(crate) fn unescape_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let Some(semi) = rest[..rest.len().min(32)].find(';') else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };

        let entity = &rest[1..semi];
        match decode_entity(entity) {
            Some(decoded) => {
                out.push(decoded);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    let code = match entity {
        "amp" => return Some('&'),
        "lt" => return Some('<'),
        "gt" => return Some('>'),
        "quot" => return Some('"'),
        "apos" => return Some('\''),
        "nbsp" => return Some('\u{a0}'),
        "ndash" => return Some('\u{2013}'),
        "mdash" => return Some('\u{2014}'),
        "bull" => return Some('\u{2022}'),
        other => other,
    };

    let value = if let Some(hex) = code.strip_prefix("#x").or_else(|| code.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok()?
    } else if let Some(dec) = code.strip_prefix('#') {
        dec.parse::<u32>().ok()?
    } else {
        return None;
    };
    char::from_u32(value)
}

/// Escapes the five characters with markup meaning, for text re-emitted
/// inside HTML (TOC entries).
pub(crate) fn escape_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags() {
        assert_eq!(strip_html_tags("<p>a <b>b</b></p>"), "a  b");
        assert_eq!(drop_tags("<p>a <b>b</b></p>"), "a b");
    }

    #[test]
    fn decodes_named_and_numeric() {
        assert_eq!(unescape_entities("a &amp; b"), "a & b");
        assert_eq!(unescape_entities("x &#8212; y"), "x \u{2014} y");
        assert_eq!(unescape_entities("x &#x2014; y"), "x \u{2014} y");
        assert_eq!(unescape_entities("&#x2022;"), "\u{2022}");
    }

    #[test]
    fn leaves_unknown_entities_alone() {
        assert_eq!(unescape_entities("a &unknown; b"), "a &unknown; b");
        assert_eq!(unescape_entities("stray & ampersand"), "stray & ampersand");
    }

    #[test]
    fn escape_round_trip() {
        assert_eq!(escape_entities("a<b> & \"c\""), "a&lt;b&gt; &amp; &#34;c&#34;");
    }
}
