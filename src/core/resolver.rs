//! Video resolution pipeline

use crate::core::catalog::{CatalogBuilder, DEFAULT_PROBE_CONCURRENCY};
use crate::core::context::ResolutionContext;
use crate::core::video_info::{PlayableEntry, Resolution, Signature, VideoInfo};
use crate::download::chunker::{RangeChunker, DEFAULT_CHUNK_SIZE};
use crate::error::ResolveError;
use crate::platform::cipher::CipherEngine;
use crate::platform::client::{CookieSource, Fetcher, HttpClientConfig, HttpFetcher, NoCookies};
use crate::platform::formats::select;
use crate::platform::manifest::{
    parse_adaptive_fmts, parse_dash_manifest, parse_stream_map, AdaptiveStreams,
};
use crate::platform::metadata::{Metadata, MetadataResolver, VideoMetadata, DEFAULT_SERVICE_BASE};
use crate::utils::cache::CacheConfig;
use crate::utils::url::extract_video_id;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Resolver configuration
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Range request size for adaptive legs
    pub chunk_size: u64,
    /// Concurrent size probes per video
    pub probe_concurrency: usize,
    /// Append `ratebypass=yes` to adaptive URLs
    pub rate_bypass: bool,
    /// Service origin
    pub service_base: String,
    /// Translation cache settings
    pub cache: CacheConfig,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            probe_concurrency: DEFAULT_PROBE_CONCURRENCY,
            rate_bypass: true,
            service_base: DEFAULT_SERVICE_BASE.to_string(),
            cache: CacheConfig::default(),
        }
    }
}

/// Per-request options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Explicit format id
    pub format_id: Option<String>,
    /// List the catalog instead of selecting an entry
    pub info_only: bool,
}

impl ResolveOptions {
    pub fn with_format(mut self, format_id: impl Into<String>) -> Self {
        self.format_id = Some(format_id.into());
        self
    }

    pub fn info_only(mut self) -> Self {
        self.info_only = true;
        self
    }
}

/// Resolves video ids into playable entries
pub struct Resolver {
    fetcher: Arc<dyn Fetcher>,
    cookies: Arc<dyn CookieSource>,
    cipher: CipherEngine,
    options: ResolverOptions,
}

impl Resolver {
    /// Create a resolver on top of `fetcher`
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        let options = ResolverOptions::default();
        Self {
            fetcher,
            cookies: Arc::new(NoCookies),
            cipher: CipherEngine::with_cache_config(&options.cache),
            options,
        }
    }

    /// Create a resolver backed by an HTTP client
    pub fn with_http(config: HttpClientConfig) -> Result<Self, ResolveError> {
        Ok(Self::new(Arc::new(HttpFetcher::with_config(config)?)))
    }

    /// Set the session cookie source
    pub fn with_cookies(mut self, cookies: Arc<dyn CookieSource>) -> Self {
        self.cookies = cookies;
        self
    }

    /// Replace all options
    pub fn with_options(mut self, options: ResolverOptions) -> Self {
        self.cipher = CipherEngine::with_cache_config(&options.cache);
        self.options = options;
        self
    }

    /// Set range request size; zero is ignored
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        if chunk_size > 0 {
            self.options.chunk_size = chunk_size;
        }
        self
    }

    pub fn with_probe_concurrency(mut self, probe_concurrency: usize) -> Self {
        self.options.probe_concurrency = probe_concurrency.max(1);
        self
    }

    pub fn with_rate_bypass(mut self, rate_bypass: bool) -> Self {
        self.options.rate_bypass = rate_bypass;
        self
    }

    pub fn with_service_base(mut self, base: impl Into<String>) -> Self {
        self.options.service_base = base.into();
        self
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    pub fn cipher(&self) -> &CipherEngine {
        &self.cipher
    }

    fn catalog_builder(&self) -> CatalogBuilder {
        let chunker = RangeChunker::try_new(self.options.chunk_size).unwrap_or_default();
        CatalogBuilder::new()
            .with_chunker(chunker)
            .with_rate_bypass(self.options.rate_bypass)
            .with_probe_concurrency(self.options.probe_concurrency)
    }

    /// Resolve a watch URL or bare video id
    pub async fn resolve_url(
        &self,
        url: &str,
        options: &ResolveOptions,
    ) -> Result<Resolution, ResolveError> {
        let video_id = extract_video_id(url)?;
        self.resolve_video(&video_id, options).await
    }

    /// Resolve one video
    pub async fn resolve_video(
        &self,
        video_id: &str,
        options: &ResolveOptions,
    ) -> Result<Resolution, ResolveError> {
        info!("Resolving video {}", video_id);

        let metadata = MetadataResolver::new(self.fetcher.as_ref(), self.cookies.as_ref())
            .with_base(&self.options.service_base)
            .resolve(video_id)
            .await?;
        let metadata = match metadata {
            Metadata::Live(endpoint) => return Ok(Resolution::Live { endpoint }),
            Metadata::Streams(metadata) => metadata,
        };

        let context = ResolutionContext::new(
            video_id,
            metadata.title.clone(),
            metadata.script_url.clone(),
            self.fetcher.as_ref(),
            &self.cipher,
        );

        let progressive = metadata
            .stream_map
            .as_deref()
            .map(parse_stream_map)
            .unwrap_or_default();
        let adaptive = self.adaptive_streams(&metadata).await;
        let catalog = self.catalog_builder().build(&context, progressive, adaptive).await?;

        let mut video = VideoInfo::new(video_id, metadata.title.clone(), catalog);
        video.script_url = metadata.script_url.clone();
        video.captions = metadata.captions.clone();

        let entry = select(&video.catalog, options.format_id.as_deref())?.clone();
        if options.info_only {
            return Ok(Resolution::Listing { video });
        }

        let entry = self.finalize(&context, entry).await?;
        info!("Selected format {} for {}", entry.id, video_id);
        Ok(Resolution::Selected { video, entry })
    }

    /// Resolve videos in order, stopping at cancellation between videos
    pub async fn resolve_many(
        &self,
        video_ids: &[String],
        options: &ResolveOptions,
        cancel: &CancellationToken,
    ) -> Vec<(String, Result<Resolution, ResolveError>)> {
        let mut results = Vec::with_capacity(video_ids.len());
        for video_id in video_ids {
            if cancel.is_cancelled() {
                debug!("Skipping {} after cancellation", video_id);
                results.push((video_id.clone(), Err(ResolveError::Cancelled)));
                continue;
            }
            let result = self.resolve_video(video_id, options).await;
            if let Err(e) = &result {
                warn!("Failed to resolve {}: {}", video_id, e);
            }
            results.push((video_id.clone(), result));
        }
        results
    }

    /// Adaptive streams from the manifest, else from the inline list
    async fn adaptive_streams(&self, metadata: &VideoMetadata) -> AdaptiveStreams {
        if let Some(url) = &metadata.dash_manifest_url {
            match self.fetch_manifest(url).await {
                Ok(streams) if !streams.is_empty() => return streams,
                Ok(_) => debug!("Manifest for {} lists no streams", metadata.video_id),
                Err(e) => warn!("Manifest for {} unusable: {}", metadata.video_id, e),
            }
        }

        // Inline entries are ciphered with the page's script, so they are only usable with one.
        match (&metadata.adaptive_fmts, &metadata.script_url) {
            (Some(list), Some(_)) => parse_adaptive_fmts(list),
            _ => AdaptiveStreams::default(),
        }
    }

    async fn fetch_manifest(&self, url: &str) -> Result<AdaptiveStreams, ResolveError> {
        let manifest = self.fetcher.fetch(url, &[]).await?;
        parse_dash_manifest(&manifest)
    }

    /// Sign and size the selected entry
    async fn finalize(
        &self,
        context: &ResolutionContext<'_>,
        mut entry: PlayableEntry,
    ) -> Result<PlayableEntry, ResolveError> {
        if entry.is_adaptive() {
            return Ok(entry);
        }

        if entry.signature.is_pending() {
            if let Some(url) = entry.groups.first_mut().and_then(|group| group.first_mut()) {
                *url = context.sign(url, &entry.signature).await?;
            }
            entry.signature = Signature::Unsigned;
        }

        if entry.size.is_none() {
            let first = entry.urls().next().map(str::to_string);
            if let Some(url) = first {
                entry.size = match self.fetcher.probe_size(&url).await {
                    Ok(size) => Some(size),
                    Err(e) => {
                        warn!("Size of format {} unknown: {}", entry.id, e);
                        None
                    }
                };
            }
        }
        Ok(entry)
    }
}
