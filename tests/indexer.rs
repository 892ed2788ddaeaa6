//! SQLite indexer and searcher round-trip tests.

use manpages_ingest::{Document, Indexer, Searcher, SqliteIndexer};

fn doc(path: &str, title: &str, distro: &str, language: &str, content: &str) -> Document {
    Document {
        title: title.to_string(),
        path: path.to_string(),
        section: 1,
        distro: distro.to_string(),
        language: language.to_string(),
        content: content.to_string(),
    }
}

#[tokio::test]
async fn index_and_search_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("search.db");

    let indexer = SqliteIndexer::new(&db).await.unwrap();
    indexer
        .index_manpage(doc(
            "/manpages/noble/man1/ls.1.html",
            "ls",
            "noble",
            "",
            "list directory contents",
        ))
        .await
        .unwrap();
    indexer
        .index_manpage(doc(
            "/manpages/noble/man1/grep.1.html",
            "grep",
            "noble",
            "",
            "print lines that match patterns",
        ))
        .await
        .unwrap();
    indexer
        .index_manpage(doc(
            "/manpages/jammy/man1/ls.1.html",
            "ls",
            "jammy",
            "",
            "list directory contents",
        ))
        .await
        .unwrap();
    indexer.close().await.unwrap();

    let searcher = Searcher::open(&db).await.unwrap();

    let all = searcher.search("list", "", "", 50, 0).await.unwrap();
    assert_eq!(all.total, 2);

    let noble_only = searcher.search("list", "noble", "", 50, 0).await.unwrap();
    assert_eq!(noble_only.total, 1);
    assert_eq!(noble_only.results[0].path, "/manpages/noble/man1/ls.1.html");
    assert_eq!(noble_only.results[0].title, "ls");
    assert_eq!(noble_only.results[0].section, 1);

    // Prefix-phrase matching: "direc" matches "directory".
    let prefix = searcher.search("direc", "noble", "", 50, 0).await.unwrap();
    assert_eq!(prefix.total, 1);

    let none = searcher.search("zzzzz", "", "", 50, 0).await.unwrap();
    assert_eq!(none.total, 0);
    assert!(none.results.is_empty());

    searcher.close().await;
}

#[tokio::test]
async fn title_matches_rank_and_match() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("search.db");

    let indexer = SqliteIndexer::new(&db).await.unwrap();
    indexer
        .index_manpage(doc(
            "/manpages/noble/man1/tar.1.html",
            "tar",
            "noble",
            "",
            "an archiving utility",
        ))
        .await
        .unwrap();
    indexer.close().await.unwrap();

    let searcher = Searcher::open(&db).await.unwrap();
    let by_title = searcher.search("tar", "", "", 50, 0).await.unwrap();
    assert_eq!(by_title.total, 1);
    searcher.close().await;
}

#[tokio::test]
async fn reindexing_a_path_replaces_the_row() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("search.db");

    let indexer = SqliteIndexer::new(&db).await.unwrap();
    indexer
        .index_manpage(doc(
            "/manpages/noble/man1/ls.1.html",
            "ls",
            "noble",
            "",
            "old content words",
        ))
        .await
        .unwrap();
    indexer
        .index_manpage(doc(
            "/manpages/noble/man1/ls.1.html",
            "ls",
            "noble",
            "",
            "fresh content words",
        ))
        .await
        .unwrap();
    indexer.close().await.unwrap();

    let searcher = Searcher::open(&db).await.unwrap();
    let fresh = searcher.search("fresh", "", "", 50, 0).await.unwrap();
    assert_eq!(fresh.total, 1);
    // The trigger-synced FTS table must not retain the replaced row.
    let old = searcher.search("old", "", "", 50, 0).await.unwrap();
    assert_eq!(old.total, 0);
    searcher.close().await;
}

#[tokio::test]
async fn construction_rebuilds_the_index_from_scratch() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("search.db");

    let first = SqliteIndexer::new(&db).await.unwrap();
    first
        .index_manpage(doc(
            "/manpages/noble/man1/stale.1.html",
            "stale",
            "noble",
            "",
            "stale entry",
        ))
        .await
        .unwrap();
    first.close().await.unwrap();

    // A new ingest drops and recreates the tables.
    let second = SqliteIndexer::new(&db).await.unwrap();
    second.close().await.unwrap();

    let searcher = Searcher::open(&db).await.unwrap();
    let stale = searcher.search("stale", "", "", 50, 0).await.unwrap();
    assert_eq!(stale.total, 0);
    searcher.close().await;
}

#[tokio::test]
async fn language_filter_separates_translations() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("search.db");

    let indexer = SqliteIndexer::new(&db).await.unwrap();
    indexer
        .index_manpage(doc(
            "/manpages/noble/man8/apt.8.html",
            "apt",
            "noble",
            "",
            "package manager",
        ))
        .await
        .unwrap();
    indexer
        .index_manpage(doc(
            "/manpages/noble/zh_CN/man8/apt.8.html",
            "apt",
            "noble",
            "zh_CN",
            "package manager translated",
        ))
        .await
        .unwrap();
    indexer.close().await.unwrap();

    let searcher = Searcher::open(&db).await.unwrap();
    let english = searcher.search("apt", "", "", 50, 0).await.unwrap();
    assert_eq!(english.total, 1);
    assert_eq!(english.results[0].path, "/manpages/noble/man8/apt.8.html");

    let chinese = searcher.search("apt", "", "zh_CN", 50, 0).await.unwrap();
    assert_eq!(chinese.total, 1);
    assert_eq!(
        chinese.results[0].path,
        "/manpages/noble/zh_CN/man8/apt.8.html"
    );
    searcher.close().await;
}

#[tokio::test]
async fn limit_and_offset_page_through_results() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("search.db");

    let indexer = SqliteIndexer::new(&db).await.unwrap();
    for i in 0..5 {
        indexer
            .index_manpage(doc(
                &format!("/manpages/noble/man1/tool{i}.1.html"),
                &format!("tool{i}"),
                "noble",
                "",
                "shared keyword corpus",
            ))
            .await
            .unwrap();
    }
    indexer.close().await.unwrap();

    let searcher = Searcher::open(&db).await.unwrap();
    let page_one = searcher.search("corpus", "", "", 2, 0).await.unwrap();
    assert_eq!(page_one.total, 5);
    assert_eq!(page_one.results.len(), 2);

    let page_three = searcher.search("corpus", "", "", 2, 4).await.unwrap();
    assert_eq!(page_three.results.len(), 1);
    searcher.close().await;
}
