//! Link discovery in Markdown bodies
//!
//! Walks the pulldown-cmark event stream and collects link targets in document
//! order. Nothing is rendered. Besides the CommonMark constructs (inline and
//! reference links, images, `<...>` autolinks) GitHub bodies embed references two
//! more ways, and both are collected too: bare URLs in text, which GitHub
//! autolinks, and raw HTML such as `<img src="...">`, which is how uploaded images
//! usually appear.

use pulldown_cmark::{Event, LinkType, Options, Parser, Tag, TagEnd, TextMergeStream};
use regex::Regex;
use std::sync::OnceLock;

#[allow(clippy::expect_used)] // literal pattern, covered by tests
fn bare_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"https?://[^\s<>"'`]+"#).expect("valid bare URL regex"))
}

#[allow(clippy::expect_used)] // literal pattern, covered by tests
fn html_attr_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)\b(?:src|href)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
            .expect("valid HTML attribute regex")
    })
}

/// Extract every link target from a Markdown body, in document order
///
/// A missing body yields nothing. Malformed markup never fails; whatever the
/// parser recovers is returned.
pub fn extract_links(body: Option<&str>) -> Vec<String> {
    let Some(body) = body else {
        return Vec::new();
    };

    let options = Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_FOOTNOTES;

    let mut links = Vec::new();
    let mut in_code_block = false;
    let mut link_depth = 0usize;

    for event in TextMergeStream::new(Parser::new_ext(body, options)) {
        match event {
            Event::Start(Tag::Link {
                link_type,
                dest_url,
                ..
            }) => {
                link_depth += 1;
                if link_type != LinkType::Email && !dest_url.is_empty() {
                    links.push(dest_url.into_string());
                }
            }
            Event::End(TagEnd::Link) => link_depth = link_depth.saturating_sub(1),
            Event::Start(Tag::Image { dest_url, .. }) => {
                if !dest_url.is_empty() {
                    links.push(dest_url.into_string());
                }
            }
            Event::Start(Tag::CodeBlock(_)) => in_code_block = true,
            Event::End(TagEnd::CodeBlock) => in_code_block = false,
            Event::Text(text) if !in_code_block && link_depth == 0 => {
                links.extend(bare_urls(&text));
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                links.extend(html_attribute_urls(&html));
            }
            _ => {}
        }
    }

    links
}

/// URLs appearing as plain text, with trailing punctuation removed the way GitHub does
fn bare_urls(text: &str) -> impl Iterator<Item = String> + '_ {
    bare_url_pattern()
        .find_iter(text)
        .map(|m| trim_trailing_punctuation(m.as_str()))
        .filter(|url| url.len() > "https://".len())
        .map(str::to_string)
}

fn trim_trailing_punctuation(mut url: &str) -> &str {
    loop {
        let trimmed = url.trim_end_matches(['.', ',', ':', ';', '!', '?', '*', '_', '~']);
        let trimmed = if trimmed.ends_with(')')
            && trimmed.matches(')').count() > trimmed.matches('(').count()
        {
            &trimmed[..trimmed.len() - 1]
        } else {
            trimmed
        };
        if trimmed.len() == url.len() {
            return url;
        }
        url = trimmed;
    }
}

/// `src` and `href` attribute values in a raw HTML fragment
fn html_attribute_urls(html: &str) -> Vec<String> {
    html_attr_pattern()
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
        .map(|m| m.as_str().trim().replace("&amp;", "&"))
        .filter(|value| !value.is_empty())
        .collect()
}
