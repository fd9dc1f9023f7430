//! Cursor-based pagination over `Link: <...>; rel="next"` headers
//!
//! The server-supplied next link is the only cursor. It is followed verbatim, after
//! checking that it stays on the origin of the first request. A walk can only be
//! restarted from the beginning; resumption happens per record in the synchronizer.

use crate::error::{Error, Result};
use crate::fetcher::{Fetched, Fetcher};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use reqwest::header::{HeaderMap, LINK};
use url::{Origin, Url};

enum Cursor {
    Fetch(Url, Vec<(String, String)>),
    Fail(Error),
    Done,
}

/// Walk a paginated listing, yielding one response per page
///
/// `per_page` replaces any caller-supplied page size and any `page` parameter is
/// dropped, both from `params` and from the query of `url` itself. The stream ends
/// after the first page without a next link, or after yielding the first error.
pub fn paginate<'a>(
    fetcher: &'a Fetcher,
    url: Url,
    accept: &'a str,
    params: &[(String, String)],
    per_page: u32,
) -> BoxStream<'a, Result<Fetched>> {
    let origin = url.origin();
    let url = strip_paging(url);

    let mut params: Vec<(String, String)> = params
        .iter()
        .filter(|(k, _)| !is_paging_param(k))
        .cloned()
        .collect();
    params.push(("per_page".to_string(), per_page.to_string()));

    stream::unfold(Cursor::Fetch(url, params), move |cursor| {
        let origin = origin.clone();
        async move {
            match cursor {
                Cursor::Done => None,
                Cursor::Fail(e) => Some((Err(e), Cursor::Done)),
                Cursor::Fetch(url, params) => match fetcher.get(&url, accept, &params).await {
                    Ok(page) => {
                        let next = next_cursor(&origin, &page.headers);
                        Some((Ok(page), next))
                    }
                    Err(e) => Some((Err(e), Cursor::Done)),
                },
            }
        }
    })
    .boxed()
}

fn next_cursor(origin: &Origin, headers: &HeaderMap) -> Cursor {
    let Some(next) = headers
        .get_all(LINK)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(next_link)
    else {
        return Cursor::Done;
    };

    match Url::parse(next) {
        Ok(url) if url.origin() == *origin => Cursor::Fetch(url, Vec::new()),
        Ok(url) => Cursor::Fail(Error::OriginMismatch {
            expected: origin.ascii_serialization(),
            actual: url.to_string(),
        }),
        Err(e) => Cursor::Fail(Error::InvalidUrl(format!("next link {:?}: {}", next, e))),
    }
}

fn is_paging_param(key: &str) -> bool {
    key == "page" || key == "per_page"
}

fn strip_paging(mut url: Url) -> Url {
    if url.query().is_none() {
        return url;
    }
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_paging_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url
}

/// Extract the `rel="next"` target from one `Link` header value (RFC 8288)
pub fn next_link(value: &str) -> Option<&str> {
    let mut rest = value;
    while let Some(start) = rest.find('<') {
        let after = &rest[start + 1..];
        let end = after.find('>')?;
        let target = &after[..end];
        let tail = &after[end + 1..];
        let params_end = tail.find('<').unwrap_or(tail.len());
        if tail[..params_end].split(';').any(is_rel_next) {
            return Some(target);
        }
        rest = &tail[params_end..];
    }
    None
}

fn is_rel_next(param: &str) -> bool {
    let Some((key, value)) = param.split_once('=') else {
        return false;
    };
    key.trim().eq_ignore_ascii_case("rel")
        && value
            .trim()
            .trim_matches('"')
            .split_whitespace()
            .any(|rel| rel.eq_ignore_ascii_case("next"))
}
