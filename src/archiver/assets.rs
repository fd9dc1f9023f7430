//! Asset pass: fetch what committed bodies link to

use super::{Archiver, RunStats};
use crate::error::{Error, Result};
use crate::links::extract_links;
use crate::store::{Collection, NewFile};
use futures::StreamExt;
use serde::Deserialize;
use std::collections::BTreeMap;
use url::Url;

/// The parts of an issue or comment that can reference assets
#[derive(Debug, Default, Deserialize)]
struct TextRecord {
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    user: Option<Author>,
}

#[derive(Debug, Default, Deserialize)]
struct Author {
    #[serde(default)]
    avatar_url: Option<String>,
}

impl TextRecord {
    fn links(&self) -> Vec<String> {
        let mut links = extract_links(self.body.as_deref());
        if let Some(avatar) = self.user.as_ref().and_then(|u| u.avatar_url.clone()) {
            links.push(avatar);
        }
        links
    }
}

impl Archiver {
    /// Fetch every wanted asset not yet stored, in (destination, URL) order
    pub(crate) async fn fetch_assets(&self, stats: &mut RunStats) -> Result<()> {
        let mut frontier = self.store.file_urls().await?;

        // Keyed by (destination, url) so iteration is the fetch order and repeats collapse
        let mut wanted: BTreeMap<(Vec<String>, String), Url> = BTreeMap::new();
        for collection in Collection::ALL.into_iter().filter(|c| c.has_text_bodies()) {
            let mut bodies = self.store.scan_bodies(collection);
            while let Some(body) = bodies.next().await {
                let body = body?;
                let record: TextRecord = match serde_json::from_slice(&body) {
                    Ok(record) => record,
                    Err(e) => {
                        tracing::warn!(collection = %collection, error = %e, "unreadable stored body, not scanned");
                        continue;
                    }
                };
                for link in record.links() {
                    let Some(asset) = self.resolver.resolve(&link) else {
                        continue;
                    };
                    let key = asset.url.to_string();
                    if frontier.contains(&key) {
                        continue;
                    }
                    wanted.entry((asset.destination, key)).or_insert(asset.url);
                }
            }
        }

        tracing::info!(
            pending = wanted.len(),
            stored = frontier.len(),
            "asset pass started"
        );

        for ((destination, key), url) in wanted {
            let fetched = match self.fetcher.get_asset(&url).await {
                Ok(fetched) => fetched,
                Err(Error::Http { status, .. })
                    if self.config.assets.tolerate_missing && matches!(status, 404 | 410) =>
                {
                    tracing::warn!(url = %url, status, "asset missing, skipped");
                    stats.files_missing += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            self.store
                .insert_file(&NewFile {
                    url: key.clone(),
                    last_modified: fetched.last_modified(),
                    destination,
                    body: fetched.body,
                })
                .await?;
            frontier.insert(key);
            stats.files_fetched += 1;
        }

        Ok(())
    }
}
