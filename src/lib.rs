//! # issue-archive
//!
//! Incremental, resumable archiver for a GitHub repository's issues, comments,
//! reactions, labels and the media their bodies link to.
//!
//! ## Design
//!
//! - **Resumable** - Every record is committed on its own; presence in the store is
//!   the only progress marker, so an interrupted run simply runs again
//! - **Rate-limit patient** - An exhausted API allowance puts the run to sleep
//!   until the reset time instead of failing it
//! - **Storage-agnostic core** - The archiver talks to a [`RecordStore`]; the
//!   SQLite [`Database`] is the shipped implementation and can be packaged as a
//!   zip container with [`archive::export`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use issue_archive::{Archiver, Config, Database, Repository};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let repository: Repository = "net4people/bbs".parse()?;
//!     let db = Arc::new(Database::new(Path::new("bbs.sqlite")).await?);
//!     db.claim_repository(&repository).await?;
//!
//!     let archiver = Archiver::new(Config::default(), repository, db.clone())?;
//!     let stats = archiver.run().await?;
//!     println!("fetched {} records", stats.records_fetched);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Zip container export
pub mod archive;
/// The archive run (collection synchronization and asset pass)
pub mod archiver;
/// Asset URL classification
pub mod assets;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Rate-limit aware HTTP fetcher
pub mod fetcher;
/// Markdown link extraction
pub mod links;
/// Link-header pagination
pub mod paginate;
/// Retry logic with exponential backoff
pub mod retry;
/// Durable record store interface
pub mod store;

// Re-export commonly used types
pub use archiver::{Archiver, RunStats};
pub use assets::{AssetResolver, ResolvedAsset};
pub use config::{Config, Credentials, Repository};
pub use db::Database;
pub use error::{DatabaseError, Error, Result};
pub use fetcher::{Fetched, Fetcher};
pub use store::{Collection, RecordStore};

/// Run the archiver until it finishes or a termination signal arrives
///
/// Returns `Ok(None)` when interrupted. Records committed before the signal stay
/// committed; the next run resumes from them.
///
/// - **Unix:** listens for SIGTERM and SIGINT, falling back to `tokio::signal::ctrl_c()`
///   if neither can be registered.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// If no listener can be installed at all, the run is never cut short.
pub async fn run_until_signal(archiver: &Archiver) -> Result<Option<RunStats>> {
    tokio::select! {
        result = archiver.run() => result.map(Some),
        _ = wait_for_signal() => {
            tracing::warn!("archive run interrupted, committed records are kept");
            Ok(None)
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                _ = sigint.recv() => tracing::info!("received SIGINT"),
            }
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "no SIGINT handler, listening for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("received SIGTERM");
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "no SIGTERM handler, listening for SIGINT only");
            sigint.recv().await;
            tracing::info!("received SIGINT");
        }
        (Err(e), Err(_)) => {
            tracing::warn!(error = %e, "signal registration failed, falling back to ctrl_c");
            until_signalled(tokio::signal::ctrl_c()).await;
            tracing::info!("received Ctrl+C");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    until_signalled(tokio::signal::ctrl_c()).await;
    tracing::info!("received Ctrl+C");
}

// A listener that cannot be installed never fires, so the run is left to finish
async fn until_signalled<F>(listener: F)
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    if let Err(e) = listener.await {
        tracing::error!(error = %e, "cannot listen for termination signals");
        std::future::pending::<()>().await;
    }
}
