//! Stream catalog assembly
//!
//! Progressive streams pass through untouched, signature still pending.
//! Adaptive streams are signed, sized, paired video with audio and split into
//! range requests.

use crate::core::context::ResolutionContext;
use crate::core::video_info::{Catalog, EntryKind, PlayableEntry, Signature, StreamDescriptor};
use crate::download::chunker::RangeChunker;
use crate::error::{ResolutionError, ResolveError};
use crate::platform::manifest::AdaptiveStreams;
use crate::utils::url::{append_query_param, has_query_param};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

/// Default number of concurrent size probes
pub const DEFAULT_PROBE_CONCURRENCY: usize = 4;

/// Builds a [`Catalog`] from parsed stream descriptors
#[derive(Debug, Clone)]
pub struct CatalogBuilder {
    chunker: RangeChunker,
    rate_bypass: bool,
    probe_concurrency: usize,
}

impl Default for CatalogBuilder {
    fn default() -> Self {
        Self {
            chunker: RangeChunker::default(),
            rate_bypass: true,
            probe_concurrency: DEFAULT_PROBE_CONCURRENCY,
        }
    }
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunker(mut self, chunker: RangeChunker) -> Self {
        self.chunker = chunker;
        self
    }

    /// Append `ratebypass=yes` to adaptive request URLs
    pub fn with_rate_bypass(mut self, rate_bypass: bool) -> Self {
        self.rate_bypass = rate_bypass;
        self
    }

    pub fn with_probe_concurrency(mut self, probe_concurrency: usize) -> Self {
        self.probe_concurrency = probe_concurrency.max(1);
        self
    }

    /// Assemble the catalog; fails only when nothing playable is left
    pub async fn build(
        &self,
        context: &ResolutionContext<'_>,
        progressive: Vec<StreamDescriptor>,
        adaptive: AdaptiveStreams,
    ) -> Result<Catalog, ResolveError> {
        let progressive: Vec<PlayableEntry> =
            progressive.iter().map(PlayableEntry::progressive).collect();

        let audio = self.prepare(context, adaptive.audio).await;
        let video = self.prepare(context, adaptive.video).await;
        let adaptive = self.pair(video, &audio);

        info!(
            "Catalog for {}: {} progressive, {} adaptive",
            context.video_id,
            progressive.len(),
            adaptive.len()
        );

        let catalog = Catalog {
            progressive,
            adaptive,
        };
        if catalog.is_empty() {
            return Err(ResolutionError::EmptyCatalog.into());
        }
        Ok(catalog)
    }

    /// Sign and size adaptive streams, dropping the ones that fail
    async fn prepare(
        &self,
        context: &ResolutionContext<'_>,
        streams: Vec<StreamDescriptor>,
    ) -> Vec<StreamDescriptor> {
        let mut signed = Vec::with_capacity(streams.len());
        for mut stream in streams {
            match context.sign(&stream.url, &stream.signature).await {
                Ok(url) => {
                    stream.url = self.bypass(url);
                    stream.signature = Signature::Unsigned;
                    signed.push(stream);
                }
                Err(e) => warn!("Dropping stream {}: {}", stream.id, e),
            }
        }

        let fetcher = context.fetcher();
        let mut sized: Vec<(usize, StreamDescriptor)> = stream::iter(signed.into_iter().enumerate())
            .map(|(position, stream)| async move {
                if stream.content_length.is_some() {
                    return Some((position, stream));
                }
                debug!("Probing size of {}", stream.id);
                match fetcher.probe_size(&stream.url).await {
                    Ok(size) => Some((position, stream.with_content_length(Some(size)))),
                    Err(e) => {
                        warn!("Dropping representation {}: {}", stream.id, e);
                        None
                    }
                }
            })
            .buffer_unordered(self.probe_concurrency)
            .filter_map(|probed| async move { probed })
            .collect()
            .await;

        sized.sort_by_key(|(position, _)| *position);
        sized.into_iter().map(|(_, stream)| stream).collect()
    }

    fn bypass(&self, url: String) -> String {
        if self.rate_bypass && !has_query_param(&url, "ratebypass") {
            append_query_param(&url, "ratebypass", "yes")
        } else {
            url
        }
    }

    /// Pair each video with same-container audio, else with any audio.
    ///
    /// Video without any audio leg is dropped.
    fn pair(&self, video: Vec<StreamDescriptor>, audio: &[StreamDescriptor]) -> Vec<PlayableEntry> {
        video
            .into_iter()
            .filter_map(|video| {
                let leg = audio
                    .iter()
                    .find(|a| a.container == video.container)
                    .or_else(|| {
                        let fallback = audio.first();
                        if let Some(a) = fallback {
                            debug!(
                                "No {} audio for {}, pairing with {}",
                                video.container, video.id, a.container
                            );
                        }
                        fallback
                    });
                let Some(audio) = leg else {
                    warn!("Dropping representation {}: no audio leg", video.id);
                    return None;
                };
                Some(self.entry(video, audio))
            })
            .collect()
    }

    fn entry(&self, video: StreamDescriptor, audio: &StreamDescriptor) -> PlayableEntry {
        let video_size = video.content_length.unwrap_or(0);
        let audio_size = audio.content_length.unwrap_or(0);
        let quality = video.dimensions_label().unwrap_or_else(|| video.quality.clone());

        PlayableEntry {
            groups: vec![
                self.chunker.urls(&video.url, video_size),
                self.chunker.urls(&audio.url, audio_size),
            ],
            size: Some(video_size + audio_size),
            id: video.id,
            quality,
            container: video.container,
            mime_type: video.mime_type,
            kind: EntryKind::Adaptive,
            signature: Signature::Unsigned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::video_info::MediaKind;
    use crate::platform::cipher::CipherEngine;
    use crate::platform::client::test_support::StubFetcher;
    use std::num::NonZeroU64;

    const SCRIPT: &str = r#"var Xy={rv:function(a){a.reverse()}};function Ab(a){a=a.split("");Xy.rv(a,1);return a.join("")};c.set(b.sp,encodeURIComponent(Ab(c.s)))"#;

    fn video(id: &str, mime: &str, size: Option<u64>) -> StreamDescriptor {
        let url = format!("https://m.test/{}?id={}", id, id);
        StreamDescriptor::new(id, url, mime, MediaKind::AdaptiveVideo)
            .with_content_length(size)
            .with_dimensions(Some(1920), Some(1080))
    }

    fn audio(id: &str, mime: &str, size: Option<u64>) -> StreamDescriptor {
        let url = format!("https://m.test/{}?id={}", id, id);
        StreamDescriptor::new(id, url, mime, MediaKind::AdaptiveAudio)
            .with_content_length(size)
    }

    fn builder() -> CatalogBuilder {
        CatalogBuilder::new().with_chunker(RangeChunker::new(NonZeroU64::new(10_485_760).unwrap()))
    }

    fn last_end(urls: &[String]) -> u64 {
        let last = urls.last().unwrap();
        let range = last.rsplit("range=").next().unwrap();
        range.split('-').nth(1).unwrap().parse().unwrap()
    }

    #[tokio::test]
    async fn test_progressive_passes_through() {
        let fetcher = StubFetcher::default();
        let cipher = CipherEngine::new();
        let context = ResolutionContext::new("abc", "T", None, &fetcher, &cipher);
        let stream =
            StreamDescriptor::new("18", "https://m.test/18", "video/mp4", MediaKind::Progressive)
                .with_signature(Signature::Ciphered("abc".to_string()));

        let catalog = builder()
            .build(&context, vec![stream], AdaptiveStreams::default())
            .await
            .unwrap();

        assert_eq!(catalog.progressive.len(), 1);
        assert_eq!(catalog.progressive[0].groups, vec![vec!["https://m.test/18".to_string()]]);
        assert!(catalog.progressive[0].signature.is_pending());
        assert!(!context.script_loaded());
    }

    #[tokio::test]
    async fn test_adaptive_legs_cover_their_sizes() {
        let fetcher = StubFetcher::default();
        let cipher = CipherEngine::new();
        let context = ResolutionContext::new("abc", "T", None, &fetcher, &cipher);
        let adaptive = AdaptiveStreams {
            audio: vec![audio("140", "audio/mp4", Some(3_000_000))],
            video: vec![video("137", "video/mp4", Some(20_000_000))],
        };

        let catalog = builder().build(&context, Vec::new(), adaptive).await.unwrap();
        let entry = &catalog.adaptive[0];

        assert_eq!(entry.id, "137");
        assert_eq!(entry.quality, "1920x1080");
        assert_eq!(entry.size, Some(23_000_000));
        assert_eq!(entry.groups[0].len(), 2);
        assert_eq!(
            entry.groups[0][1],
            "https://m.test/137?id=137&ratebypass=yes&range=10485760-19999999"
        );
        assert_eq!(last_end(&entry.groups[0]), 20_000_000 - 1);
        assert_eq!(last_end(&entry.groups[1]), 3_000_000 - 1);
    }

    #[tokio::test]
    async fn test_rate_bypass_not_duplicated() {
        let fetcher = StubFetcher::default();
        let cipher = CipherEngine::new();
        let context = ResolutionContext::new("abc", "T", None, &fetcher, &cipher);
        let mut leg = audio("140", "audio/mp4", Some(10));
        leg.url = "https://m.test/140?ratebypass=yes".to_string();
        let adaptive = AdaptiveStreams {
            audio: vec![leg],
            video: vec![video("137", "video/mp4", Some(10))],
        };

        let catalog = builder().build(&context, Vec::new(), adaptive).await.unwrap();
        assert_eq!(
            catalog.adaptive[0].groups[1],
            vec!["https://m.test/140?ratebypass=yes&range=0-9".to_string()]
        );
    }

    #[tokio::test]
    async fn test_missing_sizes_are_probed() {
        let fetcher = StubFetcher::default()
            .with_size("https://m.test/137?id=137&ratebypass=yes", 500)
            .with_size("https://m.test/140?id=140&ratebypass=yes", 100);
        let cipher = CipherEngine::new();
        let context = ResolutionContext::new("abc", "T", None, &fetcher, &cipher);
        let adaptive = AdaptiveStreams {
            audio: vec![audio("140", "audio/mp4", None)],
            video: vec![
                video("137", "video/mp4", None),
                video("136", "video/mp4", None),
            ],
        };

        let catalog = builder()
            .with_probe_concurrency(2)
            .build(&context, Vec::new(), adaptive)
            .await
            .unwrap();

        assert_eq!(catalog.adaptive.len(), 1);
        assert_eq!(catalog.adaptive[0].size, Some(600));
        assert_eq!(fetcher.probes().len(), 3);
    }

    #[tokio::test]
    async fn test_cross_container_audio_fallback() {
        let fetcher = StubFetcher::default();
        let cipher = CipherEngine::new();
        let context = ResolutionContext::new("abc", "T", None, &fetcher, &cipher);
        let adaptive = AdaptiveStreams {
            audio: vec![audio("171", "audio/webm", Some(100))],
            video: vec![video("137", "video/mp4", Some(100))],
        };

        let catalog = builder().build(&context, Vec::new(), adaptive).await.unwrap();
        assert!(catalog.adaptive[0].groups[1][0].starts_with("https://m.test/171"));
    }

    #[tokio::test]
    async fn test_ciphered_legs_are_signed() {
        let fetcher = StubFetcher::default().with_page("https://yt.test/base.js", SCRIPT);
        let cipher = CipherEngine::new();
        let context = ResolutionContext::new(
            "abc",
            "T",
            Some("https://yt.test/base.js".to_string()),
            &fetcher,
            &cipher,
        );
        let adaptive = AdaptiveStreams {
            audio: vec![audio("140", "audio/mp4", Some(100))
                .with_signature(Signature::Ciphered("xy".to_string()))],
            video: vec![video("137", "video/mp4", Some(200))
                .with_signature(Signature::Ciphered("abc".to_string()))],
        };

        let catalog = builder().build(&context, Vec::new(), adaptive).await.unwrap();
        let entry = &catalog.adaptive[0];
        assert_eq!(
            entry.groups[0],
            vec!["https://m.test/137?id=137&signature=cba&ratebypass=yes&range=0-199".to_string()]
        );
        assert_eq!(
            entry.groups[1],
            vec!["https://m.test/140?id=140&signature=yx&ratebypass=yes&range=0-99".to_string()]
        );
        assert_eq!(fetcher.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_signatures_drop_streams() {
        let fetcher = StubFetcher::default();
        let cipher = CipherEngine::new();
        let context = ResolutionContext::new("abc", "T", None, &fetcher, &cipher);
        let adaptive = AdaptiveStreams {
            audio: vec![audio("140", "audio/mp4", Some(100))
                .with_signature(Signature::Ciphered("x".to_string()))],
            video: vec![video("137", "video/mp4", Some(100))],
        };

        let err = builder().build(&context, Vec::new(), adaptive).await.unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Resolution(ResolutionError::EmptyCatalog)
        ));
    }
}
