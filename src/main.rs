//! `issue-archive` command-line entry point.
//!
//! # Usage
//!
//! ```text
//! issue-archive [-u username:token] owner/repo bbs.zip
//! issue-archive --config archive.json owner/repo bbs.sqlite
//! ```
//!
//! A `.zip` output is written from a state database kept next to it (or at
//! `--state`); rerunning resumes from that database. Any other output path is the
//! database itself.

use anyhow::{Context, Result, bail};
use clap::Parser;
use issue_archive::{Archiver, Config, Credentials, Database, Repository, archive};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser, Debug)]
#[command(
    name = "issue-archive",
    version,
    about = "Incrementally archive a GitHub repository's issues, comments, reactions, labels and media"
)]
struct Args {
    /// API credentials as username:token
    #[arg(short = 'u', long = "user", value_name = "USER:TOKEN")]
    credentials: Option<Credentials>,

    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// State database for .zip output (default: OUTPUT.sqlite)
    #[arg(long, value_name = "PATH")]
    state: Option<PathBuf>,

    /// Repository to archive, as owner/repo
    repository: Repository,

    /// Output path; a .zip extension selects the zip container
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    if let Some(credentials) = args.credentials.clone() {
        config.credentials = Some(credentials);
    }

    let zip_output = is_zip(&args.output);
    let db_path = match (&args.state, zip_output) {
        (Some(state), true) => state.clone(),
        (None, true) => with_suffix(&args.output, ".sqlite"),
        (Some(_), false) => bail!("--state only applies to .zip output"),
        (None, false) => args.output.clone(),
    };

    let db = Arc::new(
        Database::new(&db_path)
            .await
            .with_context(|| format!("opening state database {}", db_path.display()))?,
    );
    db.claim_repository(&args.repository).await?;

    let archiver = Archiver::new(config.clone(), args.repository.clone(), db.clone())?;
    let Some(stats) = issue_archive::run_until_signal(&archiver).await? else {
        db.pool().close().await;
        return Ok(ExitCode::from(130));
    };
    tracing::info!(?stats, "synchronization finished");

    db.set_last_completed(chrono::Utc::now()).await?;

    if zip_output {
        archive::export(&db, &args.repository, &config.api.web_url, &args.output)
            .await
            .with_context(|| format!("writing {}", args.output.display()))?;
    } else {
        db.compact().await?;
    }

    db.pool().close().await;
    Ok(ExitCode::SUCCESS)
}

fn load_config(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let config: Config = serde_json::from_str(&raw)
        .with_context(|| format!("parsing config file {}", path.display()))?;
    Ok(config)
}

fn is_zip(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
