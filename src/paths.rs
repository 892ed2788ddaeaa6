//! Canonical output path resolution for extracted manpage files.
//!
//! Pure path arithmetic except for [`detect_so_link`], which reads the
//! first line of a (possibly gzipped) source file to spot roff `.so`
//! include directives.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Output locations for one manpage, relative to the public root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManpagePaths {
    pub html_path: String,
    pub gzip_path: String,
    pub section: u32,
    pub language: String,
}

/// Maps a package-relative source path to its canonical output paths.
///
/// The path must contain a `/man/` segment. The first segment after it is
/// the language directory unless it is a `manN` section directory; the
/// section is taken from the section directory, falling back to the digit
/// after the last `.` of the filename, and finally to 0.
pub fn parse_manpage_path(release: &str, relative_path: &str) -> Result<ManpagePaths> {
    let idx = relative_path
        .find("/man/")
        .with_context(|| format!("missing /man/ segment in {}", relative_path))?;

    let man_rel = relative_path[idx + "/man/".len()..].trim_start_matches('/');
    let man_rel = clean_path(&man_rel.replace('\\', "/"));
    let man_rel = man_rel.strip_prefix("../").unwrap_or(&man_rel);

    // The first segment is a language code unless it looks like "man<digit>...".
    let mut lang = "";
    if let Some((first, _)) = man_rel.split_once('/') {
        let is_section_dir = first.len() >= 4
            && first.starts_with("man")
            && first.as_bytes()[3].is_ascii_digit();
        if !is_section_dir {
            lang = first;
        }
    }

    let base = man_rel.strip_suffix(".gz").unwrap_or(man_rel);
    let section = if lang.is_empty() {
        parse_section(base)
    } else {
        parse_section(base.strip_prefix(&format!("{}/", lang)).unwrap_or(base))
    };

    Ok(ManpagePaths {
        html_path: format!("manpages/{}/{}.html", release, base),
        gzip_path: format!("manpages.gz/{}/{}.gz", release, base),
        section,
        language: lang.to_string(),
    })
}

/// Translates a filesystem symlink target into the target of the HTML
/// symlink: slash-normalized, cleaned, `.gz` stripped, `.html` appended.
pub fn convert_symlink_target(target: &str) -> String {
    let target = clean_path(&target.replace('\\', "/"));
    normalize_html_ext(&target)
}

/// Translates a `.so` directive argument into an HTML symlink target.
/// The `..` prefix escapes the current `manN` directory so that e.g.
/// `man1/ls.1.gz` resolves from a sibling section directory.
pub fn convert_so_target(target: &str) -> String {
    let target = target.trim().trim_start_matches('/');
    let joined = clean_path(&format!("../{}", target));
    normalize_html_ext(&joined)
}

fn normalize_html_ext(path: &str) -> String {
    let path = path.strip_suffix(".gz").unwrap_or(path);
    if path.ends_with(".html") {
        path.to_string()
    } else {
        format!("{}.html", path)
    }
}

fn parse_section(man_rel: &str) -> u32 {
    let mut parts = man_rel.split('/');
    let section_dir = parts.next().unwrap_or("");
    let filename = man_rel.rsplit('/').next().unwrap_or(man_rel);
    match section_dir.trim_start_matches("man").parse::<u32>() {
        Ok(section) => section,
        Err(_) => parse_section_from_filename(filename),
    }
}

fn parse_section_from_filename(name: &str) -> u32 {
    let name = name.strip_suffix(".gz").unwrap_or(name);
    let Some(idx) = name.rfind('.') else {
        return 0;
    };
    if idx == name.len() - 1 {
        return 0;
    }
    let suffix = name[idx + 1..].trim_start_matches("man");
    suffix
        .chars()
        .next()
        .and_then(|c| c.to_digit(10))
        .unwrap_or(0)
}

/// Lexically cleans a slash-separated path: collapses `//`, resolves `.`
/// and `..` without touching the filesystem. Leading `..` segments of a
/// relative path are preserved.
pub fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut out: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match out.last() {
                Some(&last) if last != ".." => {
                    out.pop();
                }
                Some(_) => out.push(".."),
                None => {
                    if !rooted {
                        out.push("..");
                    }
                }
            },
            other => out.push(other),
        }
    }

    let joined = out.join("/");
    if rooted {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Checks for a leading `.so` include directive and returns its target.
/// Such pages are persisted as symlinks instead of being converted.
pub fn detect_so_link(path: &Path) -> Result<Option<String>> {
    let mut reader = open_maybe_gzipped(path)?;
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .with_context(|| format!("read manpage header: {}", path.display()))?;

    let line = line.trim();
    if let Some(target) = line.strip_prefix(".so ") {
        return Ok(Some(target.trim().to_string()));
    }
    Ok(None)
}

/// Opens a file, transparently gunzipping when the path ends with `.gz`.
pub fn open_maybe_gzipped(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).with_context(|| format!("open manpage: {}", path.display()))?;

    let is_gzip = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);

    if is_gzip {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Reads a whole manpage source, gunzipped when necessary, surrounding
/// whitespace trimmed.
pub fn read_manpage_content(path: &Path) -> Result<String> {
    let mut reader = open_maybe_gzipped(path)?;
    let mut buf = Vec::new();
    reader
        .read_to_end(&mut buf)
        .with_context(|| format!("read manpage: {}", path.display()))?;
    Ok(String::from_utf8_lossy(&buf).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn english_section_one() {
        let paths = parse_manpage_path("jammy", "./usr/share/man/man1/ls.1.gz").unwrap();
        assert_eq!(paths.html_path, "manpages/jammy/man1/ls.1.html");
        assert_eq!(paths.gzip_path, "manpages.gz/jammy/man1/ls.1.gz");
        assert_eq!(paths.section, 1);
        assert_eq!(paths.language, "");
    }

    #[test]
    fn translated_section_eight() {
        let paths = parse_manpage_path("noble", "./usr/share/man/zh_CN/man8/apt-get.8.gz").unwrap();
        assert_eq!(paths.html_path, "manpages/noble/zh_CN/man8/apt-get.8.html");
        assert_eq!(paths.gzip_path, "manpages.gz/noble/zh_CN/man8/apt-get.8.gz");
        assert_eq!(paths.section, 8);
        assert_eq!(paths.language, "zh_CN");
    }

    #[test]
    fn section_from_filename_fallback() {
        let paths = parse_manpage_path("noble", "usr/share/man/man3x/form.3x.gz").unwrap();
        assert_eq!(paths.section, 3);
    }

    #[test]
    fn missing_man_segment_errors() {
        assert!(parse_manpage_path("noble", "usr/share/doc/ls.1.gz").is_err());
    }

    #[test]
    fn distinct_inputs_distinct_outputs() {
        let inputs = [
            "usr/share/man/man1/ls.1.gz",
            "usr/share/man/man2/ls.2.gz",
            "usr/share/man/de/man1/ls.1.gz",
            "usr/share/man/man1/cat.1.gz",
        ];
        let mut html = std::collections::HashSet::new();
        let mut gzip = std::collections::HashSet::new();
        for input in inputs {
            let paths = parse_manpage_path("noble", input).unwrap();
            assert!(html.insert(paths.html_path));
            assert!(gzip.insert(paths.gzip_path));
        }
    }

    #[test]
    fn symlink_target_normalized() {
        assert_eq!(convert_symlink_target("ls.1.gz"), "ls.1.html");
        assert_eq!(
            convert_symlink_target("../man1/ls.1.gz"),
            "../man1/ls.1.html"
        );
    }

    #[test]
    fn so_target_escapes_section_dir() {
        assert_eq!(convert_so_target("man1/ls.1.gz"), "../man1/ls.1.html");
        assert_eq!(convert_so_target(" /man8/apt.8 "), "../man8/apt.8.html");
    }

    #[test]
    fn clean_path_lexical() {
        assert_eq!(clean_path("a/b/../c"), "a/c");
        assert_eq!(clean_path("./a//b/."), "a/b");
        assert_eq!(clean_path("../a"), "../a");
        assert_eq!(clean_path("/a/../.."), "/");
    }

    #[test]
    fn detects_so_directive_in_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ls.1.gz");
        let mut encoder = GzEncoder::new(std::fs::File::create(&path).unwrap(), Compression::fast());
        encoder.write_all(b".so man1/dir.1\n").unwrap();
        encoder.finish().unwrap();

        let target = detect_so_link(&path).unwrap();
        assert_eq!(target.as_deref(), Some("man1/dir.1"));
    }

    #[test]
    fn plain_page_is_not_so_link() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ls.1");
        std::fs::write(&path, ".TH LS 1\n.SH NAME\nls\n").unwrap();
        assert_eq!(detect_so_link(&path).unwrap(), None);
    }
}
