//! End-to-end archive runs against mock API and asset servers
//!
//! Covers a full run into a fresh store, an unchanged rerun, resumption after a
//! failed run, Link-header pagination, asset deduplication and zip export.

mod common;

use common::{Fixture, mount_bytes, mount_json, repository, request_count};
use issue_archive::{Collection, Error, archive};
use serde_json::json;
use std::io::Read;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

const ISSUES: &str = "/repos/o/r/issues";
const COMMENTS: &str = "/repos/o/r/issues/comments";
const LABELS: &str = "/repos/o/r/labels";

async fn requests_to(server: &wiremock::MockServer, at: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == at)
        .count()
}

/// Two issues (one with a reaction), one comment with an image and an avatar, one label
async fn mount_small_repository(fx: &Fixture) {
    let issues = vec![
        fx.issue(1, "Context at https://example.com/not-an-asset", 1),
        fx.issue(2, "plain text", 0),
    ];
    fx.mount_collection(ISSUES, &issues).await;
    mount_json(
        &fx.api,
        "/repos/o/r/issues/1/reactions",
        json!([{"id": 100, "content": "+1", "created_at": "2021-01-02T04:00:00Z"}]),
    )
    .await;

    let comment = fx.comment(
        10,
        &format!("Diagram:\n\n![diagram]({}/2/diagram.png)", fx.images.uri()),
        &format!("{}/u/9?v=4", fx.avatars.uri()),
    );
    fx.mount_collection(COMMENTS, &[comment]).await;
    fx.mount_collection(LABELS, &[fx.label(5, "bug")]).await;

    mount_bytes(&fx.images, "/2/diagram.png", b"\x89PNG diagram").await;
    mount_bytes(&fx.avatars, "/u/9", b"avatar").await;
}

#[tokio::test]
async fn test_full_run_then_unchanged_rerun() {
    let fx = Fixture::start().await;
    mount_small_repository(&fx).await;
    let db = fx.open_db("state.sqlite").await;

    let stats = fx.archiver(&db).run().await.unwrap();
    assert_eq!(stats.records_fetched, 4);
    assert_eq!(stats.reactions_fetched, 1);
    assert_eq!(stats.files_fetched, 2);

    assert_eq!(db.count_records(Collection::Issues).await.unwrap(), 2);
    assert_eq!(db.count_records(Collection::Comments).await.unwrap(), 1);
    assert_eq!(db.count_records(Collection::Labels).await.unwrap(), 1);
    assert_eq!(db.count_reactions(Collection::Issues).await.unwrap(), 1);
    assert_eq!(db.count_files().await.unwrap(), 2);

    let api_before = request_count(&fx.api).await;
    let images_before = request_count(&fx.images).await;
    let avatars_before = request_count(&fx.avatars).await;

    // Nothing changed upstream: only the three listings are requested again
    let stats = fx.archiver(&db).run().await.unwrap();
    assert_eq!(stats.records_fetched, 0);
    assert_eq!(stats.records_skipped, 4);
    assert_eq!(stats.reactions_fetched, 0);
    assert_eq!(stats.files_fetched, 0);

    assert_eq!(request_count(&fx.api).await - api_before, 3);
    assert_eq!(request_count(&fx.images).await, images_before);
    assert_eq!(request_count(&fx.avatars).await, avatars_before);
}

#[tokio::test]
async fn test_failed_run_resumes_without_refetching() {
    let fx = Fixture::start().await;
    let issues = vec![
        fx.issue(1, "one", 0),
        fx.issue(2, "two", 0),
        fx.issue(3, "three", 0),
    ];

    // Issue 2 fails once; mounted first so it wins until exhausted
    Mock::given(method("GET"))
        .and(path("/repos/o/r/issues/2"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&fx.api)
        .await;
    fx.mount_collection(ISSUES, &issues).await;
    fx.mount_empty(&[COMMENTS, LABELS]).await;

    let db = fx.open_db("state.sqlite").await;
    let err = fx.archiver(&db).run().await.unwrap_err();
    assert!(matches!(err, Error::Http { status: 502, .. }), "got {:?}", err);
    assert_eq!(db.count_records(Collection::Issues).await.unwrap(), 1);
    drop(db);

    // A fresh process reopening the same store
    let db = fx.open_db("state.sqlite").await;
    let stats = fx.archiver(&db).run().await.unwrap();
    assert_eq!(stats.records_skipped, 1);
    assert_eq!(stats.records_fetched, 2);
    assert_eq!(db.count_records(Collection::Issues).await.unwrap(), 3);

    assert_eq!(requests_to(&fx.api, "/repos/o/r/issues/1").await, 1);
    assert_eq!(requests_to(&fx.api, "/repos/o/r/issues/2").await, 2);
    assert_eq!(requests_to(&fx.api, "/repos/o/r/issues/3").await, 1);
}

#[tokio::test]
async fn test_listing_follows_next_links() {
    let fx = Fixture::start().await;
    let first = fx.issue(1, "first page", 0);
    let second = fx.issue(2, "second page", 0);
    mount_json(&fx.api, "/repos/o/r/issues/1", first.clone()).await;
    mount_json(&fx.api, "/repos/o/r/issues/2", second.clone()).await;

    let next = fx.api_url("/repositories/77/issues?page=2&per_page=100");
    Mock::given(method("GET"))
        .and(path(ISSUES))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("link", format!("<{}>; rel=\"next\"", next).as_str())
                .set_body_json(json!([first])),
        )
        .mount(&fx.api)
        .await;
    mount_json(&fx.api, "/repositories/77/issues", json!([second])).await;
    fx.mount_empty(&[COMMENTS, LABELS]).await;

    let db = fx.open_db("state.sqlite").await;
    let stats = fx.archiver(&db).run().await.unwrap();
    assert_eq!(stats.records_fetched, 2);
    assert_eq!(requests_to(&fx.api, "/repositories/77/issues").await, 1);
}

#[tokio::test]
async fn test_assets_deduplicated_by_fragmentless_url() {
    let fx = Fixture::start().await;
    let image = format!("{}/1/a.png", fx.images.uri());
    let issues = vec![fx.issue(
        1,
        &format!("![one]({0}#one) and ![two]({0}#two) and again {0}", image),
        0,
    )];
    fx.mount_collection(ISSUES, &issues).await;

    // Avatar URLs that differ only in the query are distinct assets
    let comments = vec![
        fx.comment(10, "first", &format!("{}/u/1?v=3", fx.avatars.uri())),
        fx.comment(11, "second", &format!("{}/u/1?v=4", fx.avatars.uri())),
        fx.comment(12, "third", &format!("{}/u/1?v=4", fx.avatars.uri())),
    ];
    fx.mount_collection(COMMENTS, &comments).await;
    fx.mount_empty(&[LABELS]).await;

    Mock::given(method("GET"))
        .and(path("/1/a.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png".to_vec()))
        .expect(1)
        .mount(&fx.images)
        .await;
    Mock::given(method("GET"))
        .and(path("/u/1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"avatar".to_vec()))
        .expect(2)
        .mount(&fx.avatars)
        .await;

    let db = fx.open_db("state.sqlite").await;
    let stats = fx.archiver(&db).run().await.unwrap();
    assert_eq!(stats.files_fetched, 3);

    let urls = db.file_urls().await.unwrap();
    assert!(urls.contains(&image));
    assert!(urls.contains(&format!("{}/u/1?v=3", fx.avatars.uri())));
    assert!(urls.contains(&format!("{}/u/1?v=4", fx.avatars.uri())));
}

#[tokio::test]
async fn test_zip_export_after_run() {
    let fx = Fixture::start().await;
    mount_small_repository(&fx).await;
    let db = fx.open_db("out.zip.sqlite").await;
    db.claim_repository(&repository()).await.unwrap();

    fx.archiver(&db).run().await.unwrap();
    let output = fx.path("out.zip");
    let stats = archive::export(&db, &repository(), "https://github.com/", &output)
        .await
        .unwrap();
    // README, 4 records, 1 reaction, 2 files
    assert_eq!(stats.entries, 8);

    let mut zip = zip::ZipArchive::new(std::fs::File::open(&output).unwrap()).unwrap();
    let mut names: Vec<String> = zip.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "127.0.0.1/2/diagram.png",
            "127.0.0.1/u/9?v=4",
            "README",
            "issues/1.json",
            "issues/1/reactions/100.json",
            "issues/2.json",
            "issues/comments/10.json",
            "labels/5.json",
        ]
    );

    let mut reaction = String::new();
    zip.by_name("issues/1/reactions/100.json")
        .unwrap()
        .read_to_string(&mut reaction)
        .unwrap();
    let reaction: serde_json::Value = serde_json::from_str(&reaction).unwrap();
    assert_eq!(reaction["content"], "+1");

    let mut image = Vec::new();
    zip.by_name("127.0.0.1/2/diagram.png")
        .unwrap()
        .read_to_end(&mut image)
        .unwrap();
    assert_eq!(image, b"\x89PNG diagram");
}

#[tokio::test]
async fn test_store_refuses_other_repository() {
    let fx = Fixture::start().await;
    let db = fx.open_db("state.sqlite").await;
    db.claim_repository(&repository()).await.unwrap();
    // Same name, different case, is the same repository
    db.claim_repository(&issue_archive::Repository::new("O", "R"))
        .await
        .unwrap();

    let err = db
        .claim_repository(&issue_archive::Repository::new("other", "repo"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
}

#[tokio::test]
async fn test_export_refuses_empty_path_component() {
    let fx = Fixture::start().await;
    fx.mount_empty(&[ISSUES, LABELS]).await;
    let comment = fx.comment(
        10,
        &format!("![doubled]({}/1//x.png)", fx.images.uri()),
        &format!("{}/u/9", fx.avatars.uri()),
    );
    fx.mount_collection(COMMENTS, &[comment]).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"img".to_vec()))
        .mount(&fx.images)
        .await;
    mount_bytes(&fx.avatars, "/u/9", b"avatar").await;

    let db = fx.open_db("out.zip.sqlite").await;
    let stats = fx.archiver(&db).run().await.unwrap();
    assert_eq!(stats.files_fetched, 2);

    let output = fx.path("out.zip");
    let err = archive::export(&db, &repository(), "https://github.com/", &output)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsafePath { .. }), "got {:?}", err);
    assert!(!output.exists());
}
