use super::*;
use crate::db::Database;
use crate::store::Collection;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(api: &MockServer, assets: &MockServer) -> Config {
    let mut config = Config::default();
    config.api.base_url = format!("{}/", api.uri());
    config.retry.max_attempts = 0;
    config.assets.image_origins = vec![assets.uri()];
    config.assets.avatar_origins = vec![];
    config
}

async fn open_db(dir: &TempDir) -> Arc<Database> {
    Arc::new(Database::new(&dir.path().join("state.sqlite")).await.unwrap())
}

async fn mount_json(server: &MockServer, at: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn issue_json(server: &MockServer, id: i64, reactions: u64, body: &str) -> serde_json::Value {
    let url = format!("{}/repos/o/r/issues/{}", server.uri(), id);
    json!({
        "id": id,
        "url": url,
        "created_at": "2021-03-04T05:06:07Z",
        "body": body,
        "reactions": {"url": format!("{}/reactions", url), "total_count": reactions}
    })
}

async fn mount_empty_collections(server: &MockServer) {
    mount_json(server, "/repos/o/r/issues/comments", json!([])).await;
    mount_json(server, "/repos/o/r/labels", json!([])).await;
}

#[tokio::test]
async fn test_listing_urls() {
    let api = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&api, &api);
    config.api.base_url = "https://ghe.example/api/v3/".to_string();
    let archiver = Archiver::new(config, Repository::new("o", "r"), open_db(&dir).await).unwrap();

    assert_eq!(
        archiver.listing_url(Collection::Issues).unwrap().as_str(),
        "https://ghe.example/api/v3/repos/o/r/issues"
    );
    assert_eq!(
        archiver.listing_url(Collection::Comments).unwrap().as_str(),
        "https://ghe.example/api/v3/repos/o/r/issues/comments"
    );
    assert_eq!(
        archiver.listing_url(Collection::Labels).unwrap().as_str(),
        "https://ghe.example/api/v3/repos/o/r/labels"
    );
}

#[tokio::test]
async fn test_issue_listing_parameters_and_media_type() {
    let api = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/repos/o/r/issues"))
        .and(query_param("sort", "created"))
        .and(query_param("direction", "asc"))
        .and(query_param("state", "all"))
        .and(query_param("per_page", "100"))
        .and(header("accept", crate::config::MEDIATYPE_REACTIONS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&api)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/labels"))
        .and(header("accept", crate::config::MEDIATYPE))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&api)
        .await;
    mount_json(&api, "/repos/o/r/issues/comments", json!([])).await;

    let archiver =
        Archiver::new(test_config(&api, &api), Repository::new("o", "r"), open_db(&dir).await)
            .unwrap();
    let stats = archiver.run().await.unwrap();
    assert_eq!(stats, RunStats::default());
}

#[tokio::test]
async fn test_listed_url_on_foreign_origin_fails() {
    let api = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir).await;

    mount_json(
        &api,
        "/repos/o/r/issues",
        json!([{"id": 1, "url": "https://elsewhere.example/repos/o/r/issues/1"}]),
    )
    .await;

    let archiver =
        Archiver::new(test_config(&api, &api), Repository::new("o", "r"), db.clone()).unwrap();
    let err = archiver.run().await.unwrap_err();
    assert!(matches!(err, Error::OriginMismatch { .. }), "got {:?}", err);
    assert!(!db.exists(Collection::Issues, 1).await.unwrap());
}

#[tokio::test]
async fn test_reaction_walk_resumes_for_stored_parent() {
    let api = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir).await;

    let issue = issue_json(&api, 7, 2, "hello");
    mount_json(&api, "/repos/o/r/issues", json!([issue.clone()])).await;
    mount_json(&api, "/repos/o/r/issues/7", issue).await;
    mount_empty_collections(&api).await;

    // The first run sees only one of the two listed reactions
    Mock::given(method("GET"))
        .and(path("/repos/o/r/issues/7/reactions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 70, "content": "+1", "created_at": "2021-03-05T00:00:00Z"}
        ])))
        .up_to_n_times(1)
        .mount(&api)
        .await;

    let archiver =
        Archiver::new(test_config(&api, &api), Repository::new("o", "r"), db.clone()).unwrap();
    let stats = archiver.run().await.unwrap();
    assert_eq!(stats.records_fetched, 1);
    assert_eq!(stats.reactions_fetched, 1);
    assert_eq!(db.reaction_count(Collection::Issues, 7).await.unwrap(), 1);

    // Listing still reports two; the stored parent is skipped but its reactions are walked again
    Mock::given(method("GET"))
        .and(path("/repos/o/r/issues/7/reactions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 70, "content": "+1", "created_at": "2021-03-05T00:00:00Z"},
            {"id": 71, "content": "heart", "created_at": "2021-03-06T00:00:00Z"}
        ])))
        .expect(1)
        .mount(&api)
        .await;

    let stats = archiver.run().await.unwrap();
    assert_eq!(stats.records_fetched, 0);
    assert_eq!(stats.records_skipped, 1);
    assert_eq!(stats.reactions_fetched, 1);
    assert_eq!(db.reaction_count(Collection::Issues, 7).await.unwrap(), 2);

    // Complete now: a third run does not list reactions at all (expect(1) above)
    let stats = archiver.run().await.unwrap();
    assert_eq!(stats.reactions_fetched, 0);
}

#[tokio::test]
async fn test_comment_reactions_stored_under_comment() {
    let api = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir).await;

    let url = format!("{}/repos/o/r/issues/comments/12", api.uri());
    let comment = json!({
        "id": 12,
        "url": url,
        "created_at": "2021-03-04T05:06:07Z",
        "body": "a comment",
        "reactions": {"url": format!("{}/reactions", url), "total_count": 1}
    });
    mount_json(&api, "/repos/o/r/issues", json!([])).await;
    mount_json(&api, "/repos/o/r/issues/comments", json!([comment.clone()])).await;
    mount_json(&api, "/repos/o/r/issues/comments/12", comment).await;
    mount_json(&api, "/repos/o/r/labels", json!([])).await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/issues/comments/12/reactions"))
        .and(header("accept", crate::config::MEDIATYPE_REACTIONS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 120, "content": "laugh", "created_at": "2021-03-05T00:00:00Z"}
        ])))
        .expect(1)
        .mount(&api)
        .await;

    let archiver =
        Archiver::new(test_config(&api, &api), Repository::new("o", "r"), db.clone()).unwrap();
    let stats = archiver.run().await.unwrap();
    assert_eq!(stats.records_fetched, 1);
    assert_eq!(stats.reactions_fetched, 1);

    assert!(db.reaction_exists(Collection::Comments, 120).await.unwrap());
    assert!(!db.reaction_exists(Collection::Issues, 120).await.unwrap());
    assert_eq!(db.reaction_count(Collection::Comments, 12).await.unwrap(), 1);

    // Stored count matches the listing, so a rerun leaves the reactions alone
    let stats = archiver.run().await.unwrap();
    assert_eq!(stats.records_skipped, 1);
    assert_eq!(stats.reactions_fetched, 0);
}

#[tokio::test]
async fn test_record_fetch_failure_aborts_run() {
    let api = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir).await;

    mount_json(
        &api,
        "/repos/o/r/issues",
        json!([issue_json(&api, 1, 0, "a"), issue_json(&api, 2, 0, "b")]),
    )
    .await;
    mount_json(&api, "/repos/o/r/issues/1", issue_json(&api, 1, 0, "a")).await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/issues/2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&api)
        .await;

    let archiver =
        Archiver::new(test_config(&api, &api), Repository::new("o", "r"), db.clone()).unwrap();
    let err = archiver.run().await.unwrap_err();
    assert!(matches!(err, Error::Http { status: 500, .. }));

    assert!(db.exists(Collection::Issues, 1).await.unwrap());
    assert!(!db.exists(Collection::Issues, 2).await.unwrap());
}

#[tokio::test]
async fn test_missing_asset_tolerated_when_configured() {
    let api = MockServer::start().await;
    let assets = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir).await;

    let body = format!(
        "![gone]({0}/1/gone.png) ![here]({0}/1/here.png)",
        assets.uri()
    );
    let issue = issue_json(&api, 3, 0, &body);
    mount_json(&api, "/repos/o/r/issues", json!([issue.clone()])).await;
    mount_json(&api, "/repos/o/r/issues/3", issue).await;
    mount_empty_collections(&api).await;

    Mock::given(method("GET"))
        .and(path("/1/gone.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&assets)
        .await;
    Mock::given(method("GET"))
        .and(path("/1/here.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PNG".to_vec()))
        .mount(&assets)
        .await;

    // Strict by default: the 404 aborts the pass
    let archiver =
        Archiver::new(test_config(&api, &assets), Repository::new("o", "r"), db.clone()).unwrap();
    let err = archiver.run().await.unwrap_err();
    assert!(matches!(err, Error::Http { status: 404, .. }));

    let mut config = test_config(&api, &assets);
    config.assets.tolerate_missing = true;
    let archiver = Archiver::new(config, Repository::new("o", "r"), db.clone()).unwrap();
    let stats = archiver.run().await.unwrap();
    assert_eq!(stats.files_missing, 1);
    assert_eq!(stats.files_fetched, 1);
    assert_eq!(db.count_files().await.unwrap(), 1);
}

#[tokio::test]
async fn test_asset_pass_can_be_disabled() {
    let api = MockServer::start().await;
    let assets = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir).await;

    let issue = issue_json(&api, 4, 0, &format!("![x]({}/1/x.png)", assets.uri()));
    mount_json(&api, "/repos/o/r/issues", json!([issue.clone()])).await;
    mount_json(&api, "/repos/o/r/issues/4", issue).await;
    mount_empty_collections(&api).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&assets)
        .await;

    let mut config = test_config(&api, &assets);
    config.assets.enabled = false;
    let archiver = Archiver::new(config, Repository::new("o", "r"), db.clone()).unwrap();
    archiver.run().await.unwrap();
    assert_eq!(db.count_files().await.unwrap(), 0);
}

#[tokio::test]
async fn test_invalid_config_rejected_at_construction() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.api.per_page = 0;
    let result = Archiver::new(config, Repository::new("o", "r"), open_db(&dir).await);
    assert!(matches!(result, Err(Error::Config { .. })));
}
