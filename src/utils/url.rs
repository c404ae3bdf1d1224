//! URL utilities: video id extraction and query-string handling

use crate::error::ResolveError;
use crate::utils::strategy::{first_success, Strategy};
use std::collections::HashMap;
use url::Url;

/// Decoded query-string record; the first occurrence of a key wins
pub type QueryMap = HashMap<String, String>;

/// Ways a video id can appear in a URL, tried in order
const ID_STRATEGIES: &[Strategy<Url, String>] = &[
    ("short link", short_link_id),
    ("embed path", embed_path_id),
    ("v path", v_path_id),
    ("watch path", watch_path_id),
    ("v parameter", v_param_id),
    ("u parameter", nested_watch_id),
];

/// Extract a video id from a URL, or accept a bare 11-character id
pub fn extract_video_id(input: &str) -> Result<String, ResolveError> {
    let input = input.trim();
    if is_bare_video_id(input) {
        return Ok(input.to_string());
    }

    let parsed = Url::parse(input)
        .map_err(|_| ResolveError::InvalidUrl(format!("Not a URL or video id: {}", input)))?;

    if !matches!(parsed.host_str(), Some(host) if is_youtube_host(host)) {
        return Err(ResolveError::InvalidUrl(
            "Not a supported video platform URL".to_string(),
        ));
    }

    first_success("video id", &parsed, ID_STRATEGIES)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ResolveError::InvalidUrl(format!("No video id in {}", input)))
}

fn is_bare_video_id(input: &str) -> bool {
    input.len() == 11
        && input
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn is_youtube_host(host: &str) -> bool {
    host == "youtu.be" || host == "youtube.com" || host.ends_with(".youtube.com")
}

fn short_link_id(url: &Url) -> Option<String> {
    if url.host_str()? != "youtu.be" {
        return None;
    }
    url.path_segments()?.next().map(str::to_string)
}

fn path_id(url: &Url, prefix: &str) -> Option<String> {
    let mut segments = url.path_segments()?;
    if segments.next()? != prefix {
        return None;
    }
    segments.next().map(str::to_string)
}

fn embed_path_id(url: &Url) -> Option<String> {
    path_id(url, "embed")
}

fn v_path_id(url: &Url) -> Option<String> {
    path_id(url, "v")
}

fn watch_path_id(url: &Url) -> Option<String> {
    path_id(url, "watch")
}

fn v_param_id(url: &Url) -> Option<String> {
    query_value(url, "v")
}

fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// `attribution_link?u=/watch%3Fv%3DID` style redirects
fn nested_watch_id(url: &Url) -> Option<String> {
    let nested = query_value(url, "u")?;
    let query = nested.split_once('?')?.1;
    parse_query(query).remove("v")
}

/// Decode a `k=v&k=v` query string
pub fn parse_query(query: &str) -> QueryMap {
    let mut map = QueryMap::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        map.entry(key.into_owned()).or_insert_with(|| value.into_owned());
    }
    map
}

/// Append `key=value` to `url`, choosing `?` or `&`
pub fn append_query_param(url: &str, key: &str, value: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}={}", url, separator, key, value)
}

/// Check whether `url` already carries the query parameter `key`
pub fn has_query_param(url: &str, key: &str) -> bool {
    url.split_once('?')
        .map(|(_, query)| {
            url::form_urlencoded::parse(query.as_bytes()).any(|(k, _)| k == key)
        })
        .unwrap_or(false)
}

/// Make a script reference absolute against the service origin `base`
pub fn absolute_script_url(base: &str, reference: &str) -> String {
    if reference.starts_with("//") {
        format!("https:{}", reference)
    } else if reference.starts_with('/') {
        format!("{}{}", base.trim_end_matches('/'), reference)
    } else {
        reference.to_string()
    }
}
