//! Title and description extraction from the NAME section.

use regex::Regex;
use std::sync::LazyLock;

use super::text::{collapse_whitespace, drop_tags, unescape_entities};

pub(crate) static H1: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)(<h1[^>]*>)(.*?)(</h1>)").unwrap());

/// Default title when nothing better can be extracted.
pub const FALLBACK_TITLE: &str = "Ubuntu Manpage";

/// Maximum description length before truncation.
pub const MAX_DESCRIPTION_LEN: usize = 200;

/// Heading texts (uppercased) that identify a NAME section, including
/// common translations.
const NAME_KEYWORDS: &[&str] = &[
    "NAME",
    "BEZEICHNUNG",
    "NOMBRE",
    "NOM",
    "NOME",
    "NAAM",
    "NAZWA",
    "NAZWA:",
];

/// Common section heading texts that must never become a page title.
const SECTION_HEADINGS: &[&str] = &[
    "SYNOPSIS",
    "DESCRIPTION",
    "OPTIONS",
    "SEE ALSO",
    "AUTHOR",
    "AUTHORS",
    "BUGS",
    "EXAMPLES",
    "EXIT STATUS",
    "RETURN VALUE",
    "ENVIRONMENT",
    "FILES",
    "NOTES",
    "HISTORY",
    "STANDARDS",
    "CONFORMING TO",
];

pub(crate) fn is_name_keyword(text: &str) -> bool {
    NAME_KEYWORDS.contains(&text.to_uppercase().as_str())
}

fn is_section_heading(text: &str) -> bool {
    SECTION_HEADINGS.contains(&text.to_uppercase().as_str()) || is_name_keyword(text)
}

/// Extracts the full title line (`name - description`) from converter HTML.
///
/// Walks all `<h1>` headings for one whose text is a NAME keyword and
/// harvests the prose up to the next heading. Falls back to the first
/// `<h1>` that is not a well-known section heading, then to
/// [`FALLBACK_TITLE`].
pub(crate) fn extract_manpage_title(html: &str) -> String {
    let headings: Vec<_> = H1.captures_iter(html).collect();
    for (i, caps) in headings.iter().enumerate() {
        let inner = caps.get(2).unwrap();
        let text = drop_tags(inner.as_str());
        if !is_name_keyword(text.trim()) {
            continue;
        }

        let after_h1 = caps.get(0).unwrap().end();
        let end = headings
            .get(i + 1)
            .map(|next| next.get(0).unwrap().start())
            .unwrap_or(html.len());
        let content = unescape_entities(&drop_tags(&html[after_h1..end]));

        let mut lines = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                if !lines.is_empty() {
                    break;
                }
                continue;
            }
            lines.push(line);
        }
        if let Some(first) = lines.first() {
            if has_separator(first) {
                return collapse_whitespace(&lines.join(" "));
            }
            return collapse_whitespace(first);
        }
    }

    // Fallback: the first h1 whose text is not a section heading.
    for caps in &headings {
        let text = collapse_whitespace(&unescape_entities(&drop_tags(&caps[2])));
        if text.is_empty() || is_section_heading(&text) {
            continue;
        }
        return text;
    }
    FALLBACK_TITLE.to_string()
}

const SEPARATORS: &[&str] = &[" -- ", " - ", " \u{2013} ", " \u{2014} "];
const TRAILING_SEPARATORS: &[&str] = &[" --", " -", " \u{2013}", " \u{2014}"];

fn has_separator(s: &str) -> bool {
    SEPARATORS.iter().any(|sep| s.contains(sep))
        || TRAILING_SEPARATORS.iter().any(|sep| s.ends_with(sep))
}

/// Splits a `name - description` line into its two parts. Without a
/// separator the whole string is the name.
pub(crate) fn split_manpage_title(title: &str) -> (String, String) {
    for sep in SEPARATORS {
        if let Some(idx) = title.find(sep) {
            return (
                title[..idx].trim().to_string(),
                title[idx + sep.len()..].trim().to_string(),
            );
        }
    }
    for sep in TRAILING_SEPARATORS {
        if let Some(name) = title.strip_suffix(sep) {
            return (name.to_string(), String::new());
        }
    }
    (title.to_string(), String::new())
}

/// Truncates a description at the last space before [`MAX_DESCRIPTION_LEN`].
pub(crate) fn cap_description(desc: &str) -> String {
    if desc.len() <= MAX_DESCRIPTION_LEN {
        return desc.to_string();
    }
    let head = truncate_at_boundary(desc, MAX_DESCRIPTION_LEN);
    let cut = match head.rfind(' ') {
        Some(idx) if idx > 0 => idx,
        _ => head.len(),
    };
    format!("{} \u{2026}", head[..cut].trim_end_matches(['.', ',', ';', ':', ' ']))
}

fn truncate_at_boundary(s: &str, max: usize) -> &str {
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Derives a title from a source filename: compression extensions and a
/// trailing `.<digit>` section suffix are stripped.
pub(crate) fn title_from_filename(filename: &str) -> String {
    let mut name = filename;
    for ext in [".gz", ".bz2", ".xz", ".zst"] {
        name = name.strip_suffix(ext).unwrap_or(name);
    }
    if let Some(dot) = name.rfind('.') {
        if dot > 0 {
            let suffix = &name[dot + 1..];
            if suffix.chars().next().is_some_and(|c| c.is_ascii_digit() && c != '0') {
                name = &name[..dot];
            }
        }
    }
    if name.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        name.to_string()
    }
}
