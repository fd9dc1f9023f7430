//! Common test utilities for issue-archive integration tests
//!
//! A [`Fixture`] runs three mock servers standing in for the REST API, an image
//! host and an avatar host, plus a temporary directory for state and output.

#![allow(dead_code)]

use issue_archive::{Archiver, Config, Database, Repository};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock servers and scratch space for one test
pub struct Fixture {
    /// REST API
    pub api: MockServer,
    /// Image host
    pub images: MockServer,
    /// Avatar host
    pub avatars: MockServer,
    /// State databases and outputs
    pub dir: TempDir,
}

impl Fixture {
    /// Start the servers
    pub async fn start() -> Self {
        Self {
            api: MockServer::start().await,
            images: MockServer::start().await,
            avatars: MockServer::start().await,
            dir: TempDir::new().unwrap(),
        }
    }

    /// Configuration pointing every origin at the mock servers
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.api.base_url = format!("{}/", self.api.uri());
        config.retry.max_attempts = 0;
        config.assets.image_origins = vec![self.images.uri()];
        config.assets.avatar_origins = vec![self.avatars.uri()];
        config
    }

    /// Path inside the scratch directory
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Open (or reopen) a state database in the scratch directory
    pub async fn open_db(&self, name: &str) -> Arc<Database> {
        Arc::new(Database::new(&self.path(name)).await.unwrap())
    }

    /// An archiver for `o/r` over the given store
    pub fn archiver(&self, db: &Arc<Database>) -> Archiver {
        Archiver::new(self.config(), repository(), db.clone()).unwrap()
    }

    /// API URL for a path under the mock API
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.api.uri(), path)
    }

    /// Listing entry (also used as the full representation) for an issue
    pub fn issue(&self, id: i64, body: &str, reactions: u64) -> Value {
        let url = self.api_url(&format!("/repos/o/r/issues/{}", id));
        json!({
            "id": id,
            "url": url,
            "number": id,
            "created_at": "2021-01-02T03:04:05Z",
            "body": body,
            "reactions": {"url": format!("{}/reactions", url), "total_count": reactions},
        })
    }

    /// Listing entry for a comment written by a user with an avatar
    pub fn comment(&self, id: i64, body: &str, avatar: &str) -> Value {
        let url = self.api_url(&format!("/repos/o/r/issues/comments/{}", id));
        json!({
            "id": id,
            "url": url,
            "created_at": "2021-01-03T00:00:00Z",
            "body": body,
            "user": {"login": "someone", "avatar_url": avatar},
            "reactions": {"url": format!("{}/reactions", url), "total_count": 0},
        })
    }

    /// Listing entry for a label
    pub fn label(&self, id: i64, name: &str) -> Value {
        json!({
            "id": id,
            "url": self.api_url(&format!("/repos/o/r/labels/{}", name)),
            "name": name,
        })
    }

    /// Serve each record at its own `url` and list them all at `listing`
    pub async fn mount_collection(&self, listing: &str, records: &[Value]) {
        mount_json(&self.api, listing, json!(records)).await;
        for record in records {
            let url = record["url"].as_str().unwrap();
            let at = url.strip_prefix(&self.api.uri()).unwrap();
            mount_json(&self.api, at, record.clone()).await;
        }
    }

    /// Empty listings for whichever collections a test does not care about
    pub async fn mount_empty(&self, listings: &[&str]) {
        for listing in listings {
            mount_json(&self.api, listing, json!([])).await;
        }
    }
}

/// Repository every fixture archives
pub fn repository() -> Repository {
    Repository::new("o", "r")
}

/// Respond to GET `at` with a JSON body
pub async fn mount_json(server: &MockServer, at: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Respond to GET `at` with raw bytes and a Last-Modified header
pub async fn mount_bytes(server: &MockServer, at: &str, body: &'static [u8]) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("last-modified", "Wed, 21 Oct 2015 07:28:00 GMT")
                .set_body_bytes(body),
        )
        .mount(server)
        .await;
}

/// Number of requests a server has seen
pub async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.map(|r| r.len()).unwrap_or(0)
}
