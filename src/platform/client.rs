//! HTTP collaborators used by the resolver
//!
//! The resolver only needs text fetches, size probes and the user's session
//! cookies. [`Fetcher`] and [`CookieSource`] describe those seams;
//! [`HttpFetcher`] is the `reqwest`-backed implementation.

use crate::download::retry::{RetryConfigBuilder, RetryExecutor};
use crate::error::ResolveError;
use crate::utils::cookies::SessionCookie;
use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::{Client, ClientBuilder, Response};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Extra request headers as name/value pairs
pub type Headers<'a> = &'a [(&'a str, &'a str)];

/// Text fetches and size probes
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url` and return the body as text
    async fn fetch(&self, url: &str, headers: Headers<'_>) -> Result<String, ResolveError>;

    /// Total size in bytes of the resource at `url`
    async fn probe_size(&self, url: &str) -> Result<u64, ResolveError>;
}

/// Source of the user's session cookies
pub trait CookieSource: Send + Sync {
    fn current_session_cookies(&self) -> Vec<SessionCookie>;
}

/// No session cookies
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCookies;

impl CookieSource for NoCookies {
    fn current_session_cookies(&self) -> Vec<SessionCookie> {
        Vec::new()
    }
}

/// Fixed set of cookies, e.g. loaded from a cookies.txt file
#[derive(Debug, Clone, Default)]
pub struct StaticCookies {
    cookies: Vec<SessionCookie>,
}

impl StaticCookies {
    pub fn new(cookies: Vec<SessionCookie>) -> Self {
        Self { cookies }
    }
}

impl CookieSource for StaticCookies {
    fn current_session_cookies(&self) -> Vec<SessionCookie> {
        self.cookies.clone()
    }
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout
    pub timeout: Duration,
    /// Maximum retries for transient failures
    pub max_retries: u32,
    /// User agent string
    pub user_agent: Option<String>,
    /// Proxy URL
    pub proxy_url: Option<String>,
    /// Request rate cap
    pub requests_per_second: Option<NonZeroU32>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            user_agent: None,
            proxy_url: None,
            requests_per_second: None,
        }
    }
}

/// Default desktop browser user agent
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// `reqwest`-backed [`Fetcher`]
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    retry: RetryExecutor,
    limiter: Option<Arc<DirectLimiter>>,
}

impl HttpFetcher {
    /// Create a fetcher with default configuration
    pub fn new() -> Result<Self, ResolveError> {
        Self::with_config(HttpClientConfig::default())
    }

    /// Create a fetcher with custom configuration
    pub fn with_config(config: HttpClientConfig) -> Result<Self, ResolveError> {
        let mut builder = ClientBuilder::new()
            .timeout(config.timeout)
            .gzip(true)
            .brotli(true)
            .user_agent(config.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT));

        if let Some(proxy_url) = &config.proxy_url {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
        }

        let retry = RetryExecutor::with_config(
            RetryConfigBuilder::new()
                .max_retries(config.max_retries)
                .build(),
        );
        let limiter = config
            .requests_per_second
            .map(|rps| Arc::new(RateLimiter::direct(Quota::per_second(rps))));

        Ok(Self {
            client: builder.build()?,
            retry,
            limiter,
        })
    }

    async fn throttle(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<Response, ResolveError> {
        self.retry
            .execute(|| {
                let request = request.try_clone();
                async move {
                    self.throttle().await;
                    let request = request.ok_or_else(|| {
                        ResolveError::Parse("request body cannot be retried".to_string())
                    })?;
                    let response = request.send().await?;
                    let status = response.status();
                    if !status.is_success() {
                        return Err(ResolveError::HttpStatus {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                    }
                    Ok(response)
                }
            })
            .await
    }

    async fn probe_with_head(&self, url: &str) -> Result<u64, ResolveError> {
        let response = self.send(self.client.head(url), url).await?;
        header_u64(&response, CONTENT_LENGTH)
            .filter(|&length| length > 0)
            .ok_or_else(|| ResolveError::SizeProbe(format!("no content-length for {}", url)))
    }

    async fn probe_with_range(&self, url: &str) -> Result<u64, ResolveError> {
        let response = self
            .send(self.client.get(url).header(RANGE, "bytes=0-0"), url)
            .await?;
        content_range_total(&response)
            .or_else(|| {
                // 200 instead of 206: the server ignored the range and sent everything.
                (response.status() == reqwest::StatusCode::OK)
                    .then(|| header_u64(&response, CONTENT_LENGTH))
                    .flatten()
            })
            .ok_or_else(|| ResolveError::SizeProbe(format!("no content-range for {}", url)))
    }
}

fn header_u64(response: &Response, name: reqwest::header::HeaderName) -> Option<u64> {
    response.headers().get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Total from `Content-Range: bytes 0-0/total`
fn content_range_total(response: &Response) -> Option<u64> {
    let value = response.headers().get(CONTENT_RANGE)?.to_str().ok()?;
    parse_content_range_total(value)
}

pub(crate) fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, headers: Headers<'_>) -> Result<String, ResolveError> {
        debug!("Fetching {}", url);
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = self.send(request, url).await?;
        Ok(response.text().await?)
    }

    async fn probe_size(&self, url: &str) -> Result<u64, ResolveError> {
        match self.probe_with_head(url).await {
            Ok(size) => Ok(size),
            Err(e) => {
                debug!("HEAD probe failed ({}), trying ranged GET", e);
                self.probe_with_range(url).await.map_err(|e| {
                    warn!("Size probe failed for {}: {}", url, e);
                    ResolveError::SizeProbe(e.to_string())
                })
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory [`Fetcher`] keyed by exact URL
    #[derive(Default)]
    pub(crate) struct StubFetcher {
        pages: HashMap<String, String>,
        sizes: HashMap<String, u64>,
        requests: Mutex<Vec<(String, Option<String>)>>,
        probes: Mutex<Vec<String>>,
    }

    impl StubFetcher {
        pub(crate) fn with_page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), body.to_string());
            self
        }

        pub(crate) fn with_size(mut self, url: &str, size: u64) -> Self {
            self.sizes.insert(url.to_string(), size);
            self
        }

        /// Fetched URLs with the cookie header each carried
        pub(crate) fn requests(&self) -> Vec<(String, Option<String>)> {
            self.requests.lock().unwrap().clone()
        }

        pub(crate) fn fetched(&self, url: &str) -> bool {
            self.requests().iter().any(|(u, _)| u == url)
        }

        pub(crate) fn probes(&self) -> Vec<String> {
            self.probes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, url: &str, headers: Headers<'_>) -> Result<String, ResolveError> {
            let cookie = headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case("cookie"))
                .map(|(_, value)| value.to_string());
            self.requests.lock().unwrap().push((url.to_string(), cookie));
            self.pages.get(url).cloned().ok_or_else(|| ResolveError::HttpStatus {
                status: 404,
                url: url.to_string(),
            })
        }

        async fn probe_size(&self, url: &str) -> Result<u64, ResolveError> {
            self.probes.lock().unwrap().push(url.to_string());
            self.sizes
                .get(url)
                .copied()
                .ok_or_else(|| ResolveError::SizeProbe(format!("no size for {}", url)))
        }
    }
}
