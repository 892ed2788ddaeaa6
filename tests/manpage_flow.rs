//! Per-manpage flow tests: symlink, `.so`, conversion, and persistence
//! paths through `process_single_manpage`, with a stub converter binary.

#![cfg(unix)]

use anyhow::Result;
use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use manpages_ingest::{
    process_single_manpage, ConvertError, Converter, Document, FsStorage, Indexer, ManpageFile,
    ManpageMeta,
};

const STUB_HTML: &str = r##"<section class="Sh"><h1 class="Sh" id="NAME"><a class="permalink" href="#NAME">NAME</a></h1>
<p class="Pp">ls - list directory contents</p></section>
<section class="Sh"><h1 class="Sh" id="SEE_ALSO"><a class="permalink" href="#SEE_ALSO">SEE ALSO</a></h1>
<p class="Pp">See <b>dircolors</b>(1).</p></section>"##;

/// Records indexed documents for assertions.
#[derive(Default)]
struct RecordingIndexer {
    docs: Mutex<Vec<Document>>,
}

#[async_trait]
impl Indexer for RecordingIndexer {
    async fn index_manpage(&self, doc: Document) -> Result<()> {
        self.docs.lock().unwrap().push(doc);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn stub_converter(dir: &Path) -> Converter {
    let script = write_script(
        dir,
        "mandoc",
        &format!("cat > /dev/null; cat <<'EOF'\n{}\nEOF", STUB_HTML),
    );
    Converter::new(script.to_str().unwrap())
}

fn write_gz(path: &Path, content: &[u8]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut encoder = GzEncoder::new(std::fs::File::create(path).unwrap(), Compression::fast());
    encoder.write_all(content).unwrap();
    encoder.finish().unwrap();
}

fn manpage(path: PathBuf, relative_path: &str) -> ManpageFile {
    ManpageFile {
        path,
        relative_path: relative_path.to_string(),
        is_symlink: false,
        symlink_target: String::new(),
        meta: ManpageMeta {
            package_name: "coreutils".to_string(),
            package_version: "9.4-1".to_string(),
            source_package: "coreutils".to_string(),
            filename: String::new(),
        },
    }
}

#[tokio::test]
async fn regular_manpage_persists_fragment_and_gzip() {
    let work = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let storage = FsStorage::new(out.path());
    let converter = stub_converter(work.path());
    let indexer = RecordingIndexer::default();

    let source = work.path().join("extract/usr/share/man/man1/ls.1.gz");
    write_gz(&source, b".TH LS 1\n.SH NAME\nls - list\n");
    let manpage = manpage(source.clone(), "usr/share/man/man1/ls.1.gz");

    process_single_manpage("noble", &manpage, &converter, &storage, Some(&indexer))
        .await
        .unwrap();

    let fragment =
        std::fs::read_to_string(out.path().join("manpages/noble/man1/ls.1.html")).unwrap();
    assert!(fragment.starts_with("<!--META:{\"title\":\"ls\""));
    assert!(fragment.contains("\"description\":\"list directory contents\""));
    assert!(fragment.contains("\"package\":\"coreutils (9.4-1)\""));
    assert!(fragment
        .contains("\"packageURL\":\"https://launchpad.net/ubuntu/noble/+package/coreutils\""));
    assert!(fragment.contains(r#"<a href="/manpages/noble/man1/dircolors.1.html"#));

    // The original compressed source travels alongside the fragment.
    let gzip = std::fs::read(out.path().join("manpages.gz/noble/man1/ls.1.gz")).unwrap();
    assert_eq!(gzip, std::fs::read(&source).unwrap());

    let docs = indexer.docs.lock().unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].title, "ls");
    assert_eq!(docs[0].path, "/manpages/noble/man1/ls.1.html");
    assert_eq!(docs[0].section, 1);
    assert_eq!(docs[0].distro, "noble");
    assert_eq!(docs[0].language, "");
    assert!(docs[0].content.contains("dircolors"));
}

#[tokio::test]
async fn symlink_manpage_writes_both_symlinks() {
    let work = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let storage = FsStorage::new(out.path());
    let converter = stub_converter(work.path());

    let mut link = manpage(
        work.path().join("extract/usr/share/man/man1/dir.1.gz"),
        "usr/share/man/man1/dir.1.gz",
    );
    link.is_symlink = true;
    link.symlink_target = "ls.1.gz".to_string();

    process_single_manpage("noble", &link, &converter, &storage, None)
        .await
        .unwrap();

    let html_target =
        std::fs::read_link(out.path().join("manpages/noble/man1/dir.1.html")).unwrap();
    assert_eq!(html_target.to_str().unwrap(), "ls.1.html");

    // The gzip symlink keeps the raw target.
    let gzip_target =
        std::fs::read_link(out.path().join("manpages.gz/noble/man1/dir.1.gz")).unwrap();
    assert_eq!(gzip_target.to_str().unwrap(), "ls.1.gz");
}

#[tokio::test]
async fn so_directive_writes_html_symlink_only() {
    let work = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let storage = FsStorage::new(out.path());
    let converter = stub_converter(work.path());

    let source = work.path().join("extract/usr/share/man/man8/alias.8.gz");
    write_gz(&source, b".so man8/apt.8\n");
    let manpage = manpage(source, "usr/share/man/man8/alias.8.gz");

    process_single_manpage("noble", &manpage, &converter, &storage, None)
        .await
        .unwrap();

    let html_target =
        std::fs::read_link(out.path().join("manpages/noble/man8/alias.8.html")).unwrap();
    assert_eq!(html_target.to_str().unwrap(), "../man8/apt.8.html");
    assert!(!out.path().join("manpages.gz/noble/man8/alias.8.gz").exists());
}

#[tokio::test]
async fn convert_failure_is_typed_and_isolated() {
    let work = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let storage = FsStorage::new(out.path());

    // Fails only for sources containing BROKEN, so one manpage of the
    // "package" fails while its sibling persists.
    let script = write_script(
        work.path(),
        "mandoc",
        r#"input=$(cat)
case "$input" in
  *BROKEN*) echo 'mandoc: cannot parse' >&2; exit 1 ;;
  *) printf '<h1>NAME</h1><p>good - fine</p>' ;;
esac"#,
    );
    let converter = Converter::new(script.to_str().unwrap());

    let bad_source = work.path().join("extract/usr/share/man/man1/bad.1.gz");
    write_gz(&bad_source, b".TH BAD 1\nBROKEN\n");
    let bad = manpage(bad_source, "usr/share/man/man1/bad.1.gz");

    let good_source = work.path().join("extract/usr/share/man/man1/good.1.gz");
    write_gz(&good_source, b".TH GOOD 1\nfine\n");
    let good = manpage(good_source, "usr/share/man/man1/good.1.gz");

    let err = process_single_manpage("noble", &bad, &converter, &storage, None)
        .await
        .unwrap_err();
    assert!(
        err.downcast_ref::<ConvertError>().is_some(),
        "expected ConvertError, got: {err:#}"
    );
    assert!(format!("{err:#}").contains("cannot parse"));

    process_single_manpage("noble", &good, &converter, &storage, None)
        .await
        .unwrap();

    assert!(!out.path().join("manpages/noble/man1/bad.1.html").exists());
    assert!(out.path().join("manpages/noble/man1/good.1.html").exists());
    assert!(out.path().join("manpages.gz/noble/man1/good.1.gz").exists());
}

#[tokio::test]
async fn translated_manpage_lands_under_language_dir() {
    let work = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let storage = FsStorage::new(out.path());
    let converter = stub_converter(work.path());
    let indexer = RecordingIndexer::default();

    let source = work
        .path()
        .join("extract/usr/share/man/zh_CN/man8/apt-get.8.gz");
    write_gz(&source, b".TH APT-GET 8\n");
    let manpage = manpage(source, "usr/share/man/zh_CN/man8/apt-get.8.gz");

    process_single_manpage("noble", &manpage, &converter, &storage, Some(&indexer))
        .await
        .unwrap();

    assert!(out
        .path()
        .join("manpages/noble/zh_CN/man8/apt-get.8.html")
        .exists());
    assert!(out
        .path()
        .join("manpages.gz/noble/zh_CN/man8/apt-get.8.gz")
        .exists());

    let docs = indexer.docs.lock().unwrap();
    assert_eq!(docs[0].language, "zh_CN");
    assert_eq!(docs[0].section, 8);
}
