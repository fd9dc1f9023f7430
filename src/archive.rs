//! Zip container export
//!
//! Packages a store into a single zip file:
//!
//! ```text
//! README
//! issues/{id}.json
//! issues/{id}/reactions/{reaction_id}.json
//! issues/comments/{id}.json
//! issues/comments/{id}/reactions/{reaction_id}.json
//! labels/{id}.json
//! {destination...}            one entry per fetched asset
//! ```
//!
//! Every entry path is planned and validated before the output is created, so
//! an unsafe or colliding path leaves nothing behind. The container is written
//! to a temporary file next to the target and renamed into place once complete.

use crate::assets::validate_destination;
use crate::config::Repository;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::store::Collection;
use chrono::{DateTime, Datelike, Timelike, Utc};
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use zip::CompressionMethod;
use zip::write::{FileOptions, ZipWriter};

/// Where an entry's bytes come from
#[derive(Debug)]
enum Source {
    Readme,
    Record(Collection, i64),
    Reaction(Collection, i64),
    File(String),
}

#[derive(Debug)]
struct PlannedEntry {
    path: String,
    modified: Option<DateTime<Utc>>,
    source: Source,
}

/// Summary of a finished export
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportStats {
    /// Entries written, README included
    pub entries: u64,
    /// Total uncompressed bytes written
    pub bytes: u64,
}

/// Write the contents of `db` as a zip container at `output`
///
/// `web_url` is the web origin named in the README. An existing file at `output`
/// is replaced only after the new container has been fully written.
pub async fn export(
    db: &Database,
    repository: &Repository,
    web_url: &str,
    output: &Path,
) -> Result<ExportStats> {
    let plan = plan_entries(db).await?;
    tracing::info!(entries = plan.len(), output = ?output, "writing archive");

    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir)?;

    let now = Utc::now();
    let readme = format!(
        "Archive of the GitHub repository {}/{}/{}/\nmade {}.\n",
        web_url.trim_end_matches('/'),
        repository.owner,
        repository.repo,
        now.format("%Y-%m-%d %H:%M:%S"),
    );

    let mut stats = ExportStats::default();
    {
        let mut zip = ZipWriter::new(temp.as_file_mut());
        for entry in &plan {
            let body = match &entry.source {
                Source::Readme => bytes::Bytes::from(readme.clone().into_bytes()),
                Source::Record(collection, id) => db.record_body(*collection, *id).await?,
                Source::Reaction(parent, id) => db.reaction_body(*parent, *id).await?,
                Source::File(url) => db.file_body(url).await?,
            };
            let modified = match entry.source {
                Source::Readme => Some(now),
                _ => entry.modified,
            };

            zip.start_file(entry.path.as_str(), entry_options(modified))?;
            zip.write_all(&body)?;
            stats.entries += 1;
            stats.bytes += body.len() as u64;
        }
        zip.finish()?;
    }

    temp.as_file().sync_all()?;
    temp.persist(output).map_err(|e| Error::Io(e.error))?;

    tracing::info!(
        entries = stats.entries,
        bytes = stats.bytes,
        output = ?output,
        "archive written"
    );
    Ok(stats)
}

fn entry_options(modified: Option<DateTime<Utc>>) -> FileOptions {
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    match modified.and_then(zip_time) {
        Some(time) => options.last_modified_time(time),
        None => options,
    }
}

// Zip timestamps cannot represent anything before 1980
fn zip_time(t: DateTime<Utc>) -> Option<zip::DateTime> {
    zip::DateTime::from_date_and_time(
        u16::try_from(t.year()).ok()?,
        t.month() as u8,
        t.day() as u8,
        t.hour() as u8,
        t.minute() as u8,
        t.second() as u8,
    )
    .ok()
}

fn from_timestamp(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| DateTime::from_timestamp(s, 0))
}

/// Lay out every entry and check the whole layout before anything is written
async fn plan_entries(db: &Database) -> Result<Vec<PlannedEntry>> {
    let mut plan = vec![PlannedEntry {
        path: "README".to_string(),
        modified: None,
        source: Source::Readme,
    }];

    for collection in Collection::ALL {
        let dir = collection.archive_dir();
        for record in db.record_index(collection).await? {
            plan.push(PlannedEntry {
                path: format!("{}/{}.json", dir, record.id),
                modified: from_timestamp(record.created_at),
                source: Source::Record(collection, record.id),
            });
        }
        if collection.reaction_table().is_some() {
            for reaction in db.reaction_index(collection).await? {
                plan.push(PlannedEntry {
                    path: format!("{}/{}/reactions/{}.json", dir, reaction.parent_id, reaction.id),
                    modified: from_timestamp(reaction.created_at),
                    source: Source::Reaction(collection, reaction.id),
                });
            }
        }
    }

    for file in db.file_index().await? {
        let destination = file.destination()?;
        validate_destination(&destination)?;
        plan.push(PlannedEntry {
            path: destination.join("/"),
            modified: from_timestamp(file.last_modified),
            source: Source::File(file.url),
        });
    }

    let mut seen = HashSet::with_capacity(plan.len());
    for entry in &plan {
        if !seen.insert(entry.path.as_str()) {
            return Err(Error::DuplicatePath(entry.path.clone()));
        }
    }

    Ok(plan)
}
