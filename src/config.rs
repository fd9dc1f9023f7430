//! Configuration types for issue-archive

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};
use url::Url;

/// Media type for plain REST v3 responses
pub const MEDIATYPE: &str = "application/vnd.github.v3+json";

/// Media type that includes reaction summaries on issues and comments
pub const MEDIATYPE_REACTIONS: &str = "application/vnd.github.squirrel-girl-preview+json";

/// The repository being archived
///
/// Parsed from `owner/repo`. Passed explicitly to everything that needs to build
/// repository URLs or recognize repository-scoped attachment paths.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Account or organization that owns the repository
    pub owner: String,
    /// Repository name
    pub repo: String,
}

impl Repository {
    /// Create a repository reference
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

impl FromStr for Repository {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() => {
                Ok(Self::new(owner, repo))
            }
            _ => Err(Error::Config {
                message: format!("expected owner/repo, got {:?}", s),
                key: Some("repository".to_string()),
            }),
        }
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// HTTP Basic credentials for the API (username and personal access token)
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Account name
    pub username: String,
    /// Personal access token
    pub token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl FromStr for Credentials {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (username, token) = s.split_once(':').ok_or_else(|| Error::Config {
            message: "expected username:token".to_string(),
            key: Some("credentials".to_string()),
        })?;
        Ok(Self {
            username: username.to_string(),
            token: token.to_string(),
        })
    }
}

/// Remote API settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// REST API base URL (default: "https://api.github.com/")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Web origin that serves repository attachments (default: "https://github.com/")
    #[serde(default = "default_web_url")]
    pub web_url: String,

    /// Page size forced on every paginated request (default: 100, the API maximum)
    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// Per-request timeout (default: 60 seconds)
    #[serde(default = "default_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Issue state filter for the listing endpoint (default: "all")
    #[serde(default = "default_issue_state")]
    pub issue_state: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            web_url: default_web_url(),
            per_page: default_per_page(),
            timeout: default_timeout(),
            user_agent: default_user_agent(),
            issue_state: default_issue_state(),
        }
    }
}

/// Asset discovery and fetch settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Run the asset fetch pass after the collections are synchronized (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Origins whose every path is a stored image
    #[serde(default = "default_image_origins")]
    pub image_origins: Vec<String>,

    /// Origins that serve user avatars; query strings are part of the destination
    #[serde(default = "default_avatar_origins")]
    pub avatar_origins: Vec<String>,

    /// Log and skip assets that answer 404 or 410 instead of failing the run (default: false)
    #[serde(default)]
    pub tolerate_missing: bool,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            image_origins: default_image_origins(),
            avatar_origins: default_avatar_origins(),
            tolerate_missing: false,
        }
    }
}

/// Retry behavior for transient transport failures
///
/// Rate-limit waits are not governed by this: they retry until the quota resets.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration for the archiver
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// API credentials (None = anonymous, 60 requests per hour)
    #[serde(default)]
    pub credentials: Option<Credentials>,

    /// Transient failure retry settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Asset discovery settings
    #[serde(default)]
    pub assets: AssetConfig,
}

impl Config {
    /// Check that every URL parses and numeric settings are in range
    pub fn validate(&self) -> Result<()> {
        parse_origin(&self.api.base_url, "api.base_url")?;
        parse_origin(&self.api.web_url, "api.web_url")?;
        for origin in &self.assets.image_origins {
            parse_origin(origin, "assets.image_origins")?;
        }
        for origin in &self.assets.avatar_origins {
            parse_origin(origin, "assets.avatar_origins")?;
        }
        if !(1..=100).contains(&self.api.per_page) {
            return Err(Error::Config {
                message: format!("per_page must be between 1 and 100, got {}", self.api.per_page),
                key: Some("api.per_page".to_string()),
            });
        }
        if self.api.timeout.is_zero() {
            return Err(Error::Config {
                message: "timeout must be non-zero".to_string(),
                key: Some("api.timeout".to_string()),
            });
        }
        Ok(())
    }

    /// Parsed API base URL
    pub fn base_url(&self) -> Result<Url> {
        parse_origin(&self.api.base_url, "api.base_url")
    }
}

/// Parse a configured URL, requiring http(s) and a host
pub(crate) fn parse_origin(value: &str, key: &str) -> Result<Url> {
    let url = Url::parse(value).map_err(|e| Error::Config {
        message: format!("invalid URL {:?}: {}", value, e),
        key: Some(key.to_string()),
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(Error::Config {
            message: format!("{:?} is not an http(s) URL with a host", value),
            key: Some(key.to_string()),
        });
    }
    Ok(url)
}

fn default_base_url() -> String {
    "https://api.github.com/".to_string()
}

fn default_web_url() -> String {
    "https://github.com/".to_string()
}

fn default_per_page() -> u32 {
    100
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_user_agent() -> String {
    concat!("issue-archive/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_issue_state() -> String {
    "all".to_string()
}

fn default_image_origins() -> Vec<String> {
    vec![
        "https://user-images.githubusercontent.com".to_string(),
        "https://private-user-images.githubusercontent.com".to_string(),
    ]
}

fn default_avatar_origins() -> Vec<String> {
    vec!["https://avatars.githubusercontent.com".to_string()]
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
