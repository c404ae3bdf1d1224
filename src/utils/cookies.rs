//! Session cookies for restricted-video resolution
//!
//! Cookies come from a Netscape-format `cookies.txt` file. Only the
//! `.youtube.com` session cookies matter; they are folded into a single
//! `Cookie` header for the watch-page re-fetch.

use crate::error::ResolveError;
use std::path::Path;
use tracing::{info, warn};

/// Cookie domain the session header is built from
pub const SESSION_DOMAIN: &str = ".youtube.com";

/// Session cookies copied into the header, in order
const SESSION_COOKIES: &[&str] = &["SSID", "HSID", "SID"];

/// One cookie from the user's session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub domain: String,
    pub name: String,
    pub value: String,
}

impl SessionCookie {
    pub fn new(
        domain: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Parse Netscape `cookies.txt` content
pub fn parse_cookie_file(content: &str) -> Vec<SessionCookie> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let line = line.strip_prefix("#HttpOnly_").unwrap_or(line);
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let parts: Vec<&str> = line.split('\t').collect();
            if parts.len() < 7 {
                return None;
            }
            Some(SessionCookie::new(parts[0], parts[5], parts[6]))
        })
        .collect()
}

/// Load cookies from a Netscape-format file
pub fn load_cookie_file(path: impl AsRef<Path>) -> Result<Vec<SessionCookie>, ResolveError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let cookies = parse_cookie_file(&content);
    info!("Loaded {} cookies from {}", cookies.len(), path.display());
    Ok(cookies)
}

/// `CONSENT=YES; SSID=..; HSID=..; SID=..` from the session-domain cookies.
///
/// Returns `None` when none of the session cookies is present.
pub fn session_cookie_header(cookies: &[SessionCookie]) -> Option<String> {
    let find = |name: &str| {
        cookies
            .iter()
            .filter(|c| c.domain.ends_with(SESSION_DOMAIN))
            .find(|c| c.name == name)
    };

    let parts: Vec<String> = SESSION_COOKIES
        .iter()
        .filter_map(|name| find(name).map(|c| format!("{}={}", c.name, c.value)))
        .collect();

    if parts.is_empty() {
        return None;
    }
    if parts.len() < SESSION_COOKIES.len() {
        warn!("Only {} of {} session cookies present", parts.len(), SESSION_COOKIES.len());
    }

    Some(format!("CONSENT=YES; {}", parts.join("; ")))
}
