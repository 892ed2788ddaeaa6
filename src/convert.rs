//! External converter orchestration.
//!
//! Spawns `mandoc` to turn roff source into an HTML fragment, feeding the
//! source on stdin. Pages containing tbl tables first try mandoc alone
//! under a short deadline (its built-in tbl handling produces better HTML),
//! falling back to piping through `tbl` when mandoc hangs or fails. Every
//! child is spawned with `kill_on_drop` so a deadline can never leak a
//! process.

use anyhow::{bail, Context, Result};
use regex::Regex;
use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::Instant;

use crate::paths::read_manpage_content;

/// A converter failure: non-zero exit, deadline expiry, or unreadable
/// source. Non-fatal at the pipeline level.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ConvertError {
    pub message: String,
}

impl ConvertError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Converter {
    binary: String,
    tbl_binary: String,
    /// Overall deadline for one conversion.
    timeout: Duration,
    /// Deadline for the mandoc-only attempt on table-bearing pages.
    tbl_timeout: Duration,
}

impl Default for Converter {
    fn default() -> Self {
        Self::new("mandoc")
    }
}

impl Converter {
    pub fn new(binary: impl Into<String>) -> Self {
        let binary = binary.into();
        Self {
            binary: if binary.is_empty() {
                "mandoc".to_string()
            } else {
                binary
            },
            tbl_binary: "tbl".to_string(),
            timeout: Duration::from_secs(30),
            tbl_timeout: Duration::from_secs(10),
        }
    }

    /// Overrides the deadlines. Used by tests with stub binaries.
    pub fn with_timeouts(mut self, timeout: Duration, tbl_timeout: Duration) -> Self {
        self.timeout = timeout;
        self.tbl_timeout = tbl_timeout;
        self
    }

    pub fn with_tbl_binary(mut self, tbl_binary: impl Into<String>) -> Self {
        self.tbl_binary = tbl_binary.into();
        self
    }

    /// Converts one manpage source file (gunzipped transparently) into a
    /// scrubbed HTML fragment.
    pub async fn convert(&self, input_path: &Path) -> Result<String> {
        let deadline = Instant::now() + self.timeout;
        let content = read_manpage_content(input_path)?;

        let raw = if needs_tbl_preprocessing(&content) {
            let tbl_deadline = Instant::now() + self.tbl_timeout;
            match self.run_converter(&content, tbl_deadline.min(deadline)).await {
                Ok(raw) => raw,
                Err(_) => self.run_with_tbl(&content, deadline).await?,
            }
        } else {
            self.run_converter(&content, deadline).await?
        };

        Ok(scrub_output(&raw))
    }

    async fn run_converter(&self, content: &str, deadline: Instant) -> Result<String> {
        let mut command = Command::new(&self.binary);
        command.args(["-T", "html", "-O", "fragment"]);
        run_stdin_command(&mut command, content.as_bytes(), deadline)
            .await
            .with_context(|| format!("{} failed", self.binary))
    }

    /// Pipes the source through the table preprocessor, then converts the
    /// result.
    async fn run_with_tbl(&self, content: &str, deadline: Instant) -> Result<String> {
        let mut command = Command::new(&self.tbl_binary);
        let preprocessed = run_stdin_command(&mut command, content.as_bytes(), deadline)
            .await
            .with_context(|| format!("{} failed", self.tbl_binary))?;

        self.run_converter(&preprocessed, deadline).await
    }
}

/// Runs a child process feeding `input` on stdin and collecting stdout,
/// bounded by `deadline`. The child is reaped on every path; on deadline
/// it is killed via `kill_on_drop` and the error names the timeout.
async fn run_stdin_command(
    command: &mut Command,
    input: &[u8],
    deadline: Instant,
) -> Result<String> {
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .context("spawn converter")?;

    let mut stdin = child.stdin.take().context("open converter stdin")?;
    let input = input.to_vec();
    let feed = async move {
        // A write error here means the child exited early; the exit
        // status check below reports the real failure.
        let _ = stdin.write_all(&input).await;
        drop(stdin);
    };

    let (waited, ()) = tokio::join!(
        tokio::time::timeout_at(deadline, child.wait_with_output()),
        feed
    );

    let output = match waited {
        Ok(output) => output.context("wait for converter")?,
        Err(_) => bail!("timed out after deadline"),
    };

    if !output.status.success() {
        bail!(
            "exit {}: {}",
            output.status,
            stderr_tail(&output.stderr)
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Last kilobyte of stderr, trimmed. Keeps convert failures in the
/// failures log readable when a tool dumps pages of warnings.
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    match trimmed.char_indices().rev().nth(1023) {
        Some((idx, _)) => trimmed[idx..].to_string(),
        None => trimmed.to_string(),
    }
}

/// Reports whether the source contains tbl table directives (`.TS` at the
/// start of a line). Some complex tables make mandoc hang indefinitely.
fn needs_tbl_preprocessing(content: &str) -> bool {
    content.contains("\n.TS\n") || content.starts_with(".TS\n")
}

static HEAD_TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<table class="head">.*?</table>\s*"#).unwrap());
static FOOT_TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<table class="foot">.*?</table>\s*"#).unwrap());
static MANUAL_DIV_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)\A<div class="manual-text">\s*"#).unwrap());
static MANUAL_DIV_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\s*</div>\s*\z").unwrap());
static PRE_BLOCK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<pre>(.*?)</pre>").unwrap());

/// Strips mandoc's head/foot tables and outer `manual-text` div, fixes
/// verbatim blocks, and converts bullet lists.
fn scrub_output(raw: &str) -> String {
    let html = HEAD_TABLE.replace_all(raw, "");
    let html = FOOT_TABLE.replace_all(&html, "");
    let html = MANUAL_DIV_OPEN.replace(&html, "");
    let html = MANUAL_DIV_CLOSE.replace(&html, "");
    let html = strip_breaks_in_pre(&html);
    let html = convert_bullet_lists(&html);
    html.trim().to_string()
}

/// Removes `<br/>` lines inside `<pre>` blocks. Mandoc inserts them where
/// blank lines existed in the source, but `<pre>` already preserves the
/// newlines, so they double-space verbatim blocks.
fn strip_breaks_in_pre(html: &str) -> String {
    PRE_BLOCK
        .replace_all(html, |caps: &regex::Captures| {
            format!("<pre>{}</pre>", caps[1].replace("\n<br/>\n", "\n"))
        })
        .into_owned()
}

static BULLET_DT_DD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<dt>\s*&#x2022;\s*</dt>\s*<dd>").unwrap());

/// Converts mandoc bullet-style `<dl class="Bl-tag">` lists into semantic
/// `<ul>/<li>` elements. Mandoc renders bullet lists as definition lists
/// with `&#x2022;` terms; only simple, all-bullet lists are converted.
fn convert_bullet_lists(html: &str) -> String {
    const OPEN: &str = r#"<dl class="Bl-tag">"#;
    const CLOSE: &str = "</dl>";

    let mut out = String::with_capacity(html.len());
    let mut html = html;
    loop {
        let Some(idx) = html.find(OPEN) else {
            out.push_str(html);
            break;
        };
        out.push_str(&html[..idx]);
        let after = &html[idx + OPEN.len()..];

        // Find the matching </dl>, counting nesting.
        let mut depth = 1;
        let mut i = 0;
        let bytes = after.as_bytes();
        while i < bytes.len() && depth > 0 {
            if after[i..].starts_with("<dl") {
                depth += 1;
                i += 3;
            } else if after[i..].starts_with(CLOSE) {
                depth -= 1;
                if depth == 0 {
                    break;
                }
                i += CLOSE.len();
            } else {
                i += 1;
            }
        }
        if depth != 0 {
            out.push_str(OPEN);
            html = after;
            continue;
        }

        let inner = &after[..i];
        html = &after[i + CLOSE.len()..];

        // Only simple (non-nested) all-bullet lists are rewritten.
        if inner.contains("<dl") || !is_bullet_dl(inner) {
            out.push_str(OPEN);
            out.push_str(inner);
            out.push_str(CLOSE);
            continue;
        }

        let converted = BULLET_DT_DD.replace_all(inner, "<li>");
        out.push_str("<ul>");
        out.push_str(&converted.replace("</dd>", "</li>"));
        out.push_str("</ul>");
    }
    out
}

/// Reports whether every `<dt>` in a definition list body is exactly the
/// bullet entity.
fn is_bullet_dl(inner: &str) -> bool {
    const DT_OPEN: &str = "<dt>";
    const DT_CLOSE: &str = "</dt>";
    let mut pos = 0;
    let mut found = false;
    while let Some(start) = inner[pos..].find(DT_OPEN) {
        let start = pos + start;
        let Some(end) = inner[start..].find(DT_CLOSE) else {
            break;
        };
        let end = start + end;
        if inner[start + DT_OPEN.len()..end].trim() != "&#x2022;" {
            return false;
        }
        found = true;
        pos = end + DT_CLOSE.len();
    }
    found
}
