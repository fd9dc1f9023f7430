//! Collection synchronization

use super::{Archiver, RunStats};
use crate::config::{ApiConfig, MEDIATYPE, MEDIATYPE_REACTIONS};
use crate::error::{Error, Result};
use crate::paginate::paginate;
use crate::store::{Collection, NewReaction, NewRecord};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Deserialize;
use url::Url;

/// The fields of a listing entry the synchronizer acts on
#[derive(Debug, Deserialize)]
pub(crate) struct ListedRecord {
    pub(crate) id: i64,
    pub(crate) url: String,
    #[serde(default)]
    pub(crate) created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub(crate) reactions: Option<ReactionSummary>,
}

/// The `reactions` rollup embedded by the reactions media type
#[derive(Debug, Deserialize)]
pub(crate) struct ReactionSummary {
    pub(crate) url: String,
    #[serde(default)]
    pub(crate) total_count: u64,
}

#[derive(Debug, Deserialize)]
struct ListedReaction {
    id: i64,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

/// Media type and query parameters for a collection's listing endpoint
pub(crate) fn listing_request(
    collection: Collection,
    api: &ApiConfig,
) -> (&'static str, Vec<(String, String)>) {
    let pair = |k: &str, v: &str| (k.to_string(), v.to_string());
    match collection {
        Collection::Issues => (
            MEDIATYPE_REACTIONS,
            vec![
                pair("sort", "created"),
                pair("direction", "asc"),
                pair("state", &api.issue_state),
            ],
        ),
        Collection::Comments => (
            MEDIATYPE_REACTIONS,
            vec![pair("sort", "created"), pair("direction", "asc")],
        ),
        Collection::Labels => (MEDIATYPE, Vec::new()),
    }
}

impl Archiver {
    /// `{base}/repos/{owner}/{repo}/...` for a collection's listing
    pub(crate) fn listing_url(&self, collection: Collection) -> Result<Url> {
        let tail: &[&str] = match collection {
            Collection::Issues => &["issues"],
            Collection::Comments => &["issues", "comments"],
            Collection::Labels => &["labels"],
        };

        let mut url = self.base_url.clone();
        url.set_query(None);
        url.set_fragment(None);
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                Error::InvalidUrl(format!("{} cannot be a base URL", self.base_url))
            })?;
            segments
                .pop_if_empty()
                .extend(["repos", self.repository.owner.as_str(), self.repository.repo.as_str()])
                .extend(tail);
        }
        Ok(url)
    }

    /// Walk one collection's listing, committing every record not yet stored
    pub(crate) async fn sync_collection(
        &self,
        collection: Collection,
        stats: &mut RunStats,
    ) -> Result<()> {
        let url = self.listing_url(collection)?;
        let (accept, params) = listing_request(collection, &self.config.api);
        tracing::info!(collection = %collection, url = %url, "synchronizing collection");

        let mut pages = paginate(&self.fetcher, url, accept, &params, self.config.api.per_page);
        while let Some(page) = pages.next().await {
            let listed: Vec<ListedRecord> = page?.json()?;
            for record in &listed {
                self.sync_record(collection, accept, record, stats).await?;
            }
        }
        Ok(())
    }

    async fn sync_record(
        &self,
        collection: Collection,
        accept: &str,
        listed: &ListedRecord,
        stats: &mut RunStats,
    ) -> Result<()> {
        let url = self.check_api_origin(&listed.url)?;

        let present = self.store.exists(collection, listed.id).await?;
        if present {
            tracing::debug!(collection = %collection, id = listed.id, "already archived");
            stats.records_skipped += 1;
        } else {
            let full = self.fetcher.get(&url, accept, &[]).await?;
            self.store
                .insert(&NewRecord {
                    collection,
                    id: listed.id,
                    created_at: listed.created_at,
                    body: full.body,
                })
                .await?;
            stats.records_fetched += 1;
        }

        if collection.reaction_table().is_none() {
            return Ok(());
        }
        let Some(reactions) = &listed.reactions else {
            return Ok(());
        };
        let reactions_url = self.check_api_origin(&reactions.url)?;
        if reactions.total_count == 0 {
            return Ok(());
        }
        if present {
            let stored = self.store.reaction_count(collection, listed.id).await?;
            if stored >= reactions.total_count {
                return Ok(());
            }
            tracing::info!(
                collection = %collection,
                id = listed.id,
                stored,
                listed = reactions.total_count,
                "resuming reaction walk"
            );
        }

        self.sync_reactions(collection, listed.id, reactions_url, stats)
            .await
    }

    async fn sync_reactions(
        &self,
        parent: Collection,
        parent_id: i64,
        url: Url,
        stats: &mut RunStats,
    ) -> Result<()> {
        let mut pages = paginate(
            &self.fetcher,
            url,
            MEDIATYPE_REACTIONS,
            &[],
            self.config.api.per_page,
        );
        while let Some(page) = pages.next().await {
            let entries: Vec<serde_json::Value> = page?.json()?;
            for entry in entries {
                let reaction: ListedReaction = serde_json::from_value(entry.clone())?;
                if self.store.reaction_exists(parent, reaction.id).await? {
                    continue;
                }
                self.store
                    .insert_reaction(&NewReaction {
                        parent,
                        parent_id,
                        id: reaction.id,
                        created_at: reaction.created_at,
                        body: serde_json::to_vec(&entry)?.into(),
                    })
                    .await?;
                stats.reactions_fetched += 1;
            }
        }
        Ok(())
    }
}
