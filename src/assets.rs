//! Classification of discovered URLs into archive destinations
//!
//! A URL is wanted only if it points at a known image host, a repository
//! attachment on the web origin, or an avatar host. Its destination is a list of
//! path components; the archive joins them with `/`.

use crate::config::{AssetConfig, Repository, parse_origin};
use crate::error::{Error, Result};
use url::{Origin, Url};

/// A URL worth fetching and where it goes in the archive
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedAsset {
    /// Source URL with any fragment removed; this is the dedup key
    pub url: Url,
    /// Archive path components
    pub destination: Vec<String>,
}

/// Decides whether a URL is an asset and where it is stored
#[derive(Clone, Debug)]
pub struct AssetResolver {
    repository: Repository,
    web_origin: Origin,
    image_origins: Vec<Origin>,
    avatar_origins: Vec<Origin>,
}

impl AssetResolver {
    /// Create a resolver for one repository
    pub fn new(repository: Repository, config: &AssetConfig, web_url: &str) -> Result<Self> {
        let origins = |values: &[String], key: &str| -> Result<Vec<Origin>> {
            values
                .iter()
                .map(|v| parse_origin(v, key).map(|url| url.origin()))
                .collect()
        };

        Ok(Self {
            web_origin: parse_origin(web_url, "api.web_url")?.origin(),
            image_origins: origins(&config.image_origins, "assets.image_origins")?,
            avatar_origins: origins(&config.avatar_origins, "assets.avatar_origins")?,
            repository,
        })
    }

    /// Classify a URL; `None` means it is not archived
    pub fn resolve(&self, raw: &str) -> Option<ResolvedAsset> {
        let mut url = Url::parse(raw).ok()?;
        url.set_fragment(None);

        let origin = url.origin();
        let segments = decoded_segments(&url)?;

        let destination = if self.image_origins.contains(&origin) {
            with_host(&url, segments)?
        } else if self.avatar_origins.contains(&origin) {
            let mut destination = with_host(&url, segments)?;
            if let Some(query) = url.query()
                && let Some(last) = destination.last_mut()
            {
                last.push('?');
                last.push_str(query);
            }
            destination
        } else if origin == self.web_origin {
            self.attachment_destination(&segments)?
        } else {
            return None;
        };

        Some(ResolvedAsset { url, destination })
    }

    fn attachment_destination(&self, segments: &[String]) -> Option<Vec<String>> {
        let (kind, rest) = match segments {
            [owner, repo, files, rest @ ..]
                if files == "files"
                    && owner.eq_ignore_ascii_case(&self.repository.owner)
                    && repo.eq_ignore_ascii_case(&self.repository.repo) =>
            {
                ("files", rest)
            }
            [prefix, files, rest @ ..] if prefix == "user-attachments" && files == "files" => {
                ("files", rest)
            }
            [prefix, assets, rest @ ..] if prefix == "user-attachments" && assets == "assets" => {
                ("assets", rest)
            }
            _ => return None,
        };
        if rest.is_empty() {
            return None;
        }
        let mut destination = Vec::with_capacity(rest.len() + 1);
        destination.push(kind.to_string());
        destination.extend(rest.iter().cloned());
        Some(destination)
    }
}

fn with_host(url: &Url, segments: Vec<String>) -> Option<Vec<String>> {
    let host = url.host_str()?;
    let mut destination = Vec::with_capacity(segments.len() + 1);
    destination.push(host.to_string());
    destination.extend(segments);
    Some(destination)
}

// Percent-decoded path segments, or None for a bare origin or a path that does
// not decode to UTF-8. Empty segments are kept so export can reject them.
fn decoded_segments(url: &Url) -> Option<Vec<String>> {
    if url.path() == "/" {
        return None;
    }
    url.path_segments()?
        .map(|s| urlencoding::decode(s).ok().map(|d| d.into_owned()))
        .collect()
}

/// Check that destination components are safe to join into an archive path
///
/// Rejects empty components, `.` and `..`, and any component containing a path
/// separator.
pub fn validate_destination(components: &[String]) -> Result<()> {
    let unsafe_path = |reason: &str| Error::UnsafePath {
        path: components.join("/"),
        reason: reason.to_string(),
    };

    if components.is_empty() {
        return Err(unsafe_path("no path components"));
    }
    for component in components {
        if component.is_empty() {
            return Err(unsafe_path("empty component"));
        }
        if component == "." || component == ".." {
            return Err(unsafe_path("relative component"));
        }
        if component.contains(['/', '\\']) {
            return Err(unsafe_path("component contains a path separator"));
        }
    }
    Ok(())
}
