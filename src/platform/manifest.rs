//! Stream map and adaptive manifest parsing
//!
//! Three encodings are understood:
//! - the query-string progressive stream map (`url_encoded_fmt_stream_map`)
//! - the XML adaptation-set manifest (`dashmpd`)
//! - the inline adaptive list (`adaptive_fmts`)

use crate::core::video_info::{MediaKind, Signature, StreamDescriptor};
use crate::error::ResolveError;
use crate::utils::mime::adaptive_kind;
use crate::utils::url::{parse_query, QueryMap};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, warn};

/// Adaptive streams split by media kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdaptiveStreams {
    /// Best audio representation per container
    pub audio: Vec<StreamDescriptor>,
    /// Every video representation in manifest order
    pub video: Vec<StreamDescriptor>,
}

impl AdaptiveStreams {
    pub fn is_empty(&self) -> bool {
        self.audio.is_empty() && self.video.is_empty()
    }

    fn from_descriptors(descriptors: Vec<StreamDescriptor>) -> Self {
        let (audio, video): (Vec<_>, Vec<_>) = descriptors
            .into_iter()
            .partition(|d| d.kind == MediaKind::AdaptiveAudio);
        Self {
            audio: retain_best_audio(audio),
            video,
        }
    }
}

fn signature_of(record: &QueryMap) -> Signature {
    if let Some(sig) = record.get("sig") {
        Signature::Signed(sig.clone())
    } else if let Some(s) = record.get("s") {
        Signature::Ciphered(s.clone())
    } else {
        Signature::Unsigned
    }
}

fn records(list: &str) -> impl Iterator<Item = QueryMap> + '_ {
    list.split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(parse_query)
}

/// Parse the comma-separated progressive stream map.
///
/// Records are keyed by itag: a repeated itag replaces the earlier record in place.
pub fn parse_stream_map(map: &str) -> Vec<StreamDescriptor> {
    let mut streams: Vec<StreamDescriptor> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records(map) {
        let (Some(itag), Some(url)) = (record.get("itag"), record.get("url")) else {
            warn!("Skipping stream map record without itag or url");
            continue;
        };
        let mime_type = record.get("type").map(String::as_str).unwrap_or_default();
        let descriptor =
            StreamDescriptor::new(itag.as_str(), url.as_str(), mime_type, MediaKind::Progressive)
                .with_quality(record.get("quality").cloned().unwrap_or_default())
                .with_signature(signature_of(&record));

        match index.get(itag) {
            Some(&i) => {
                debug!("Stream map lists itag {} twice, keeping the later record", itag);
                streams[i] = descriptor;
            }
            None => {
                index.insert(itag.clone(), streams.len());
                streams.push(descriptor);
            }
        }
    }
    streams
}

/// Parse the inline `adaptive_fmts` list
pub fn parse_adaptive_fmts(list: &str) -> AdaptiveStreams {
    let descriptors = records(list)
        .filter_map(|record| {
            let (Some(itag), Some(url)) = (record.get("itag"), record.get("url")) else {
                warn!("Skipping adaptive record without itag or url");
                return None;
            };
            let mime_type = record.get("type").map(String::as_str).unwrap_or_default();
            let kind = adaptive_kind(mime_type)?;

            let content_length = record.get("clen").and_then(|v| v.parse().ok());
            let bitrate = record.get("bitrate").and_then(|v| v.parse().ok());
            let mut descriptor = StreamDescriptor::new(itag.as_str(), url.as_str(), mime_type, kind)
                .with_signature(signature_of(&record))
                .with_content_length(content_length)
                .with_bitrate(bitrate);

            match kind {
                MediaKind::AdaptiveVideo => {
                    // Video records without a frame size are not listed.
                    let Some(size) = record.get("size") else {
                        debug!("Skipping video record {} without size", itag);
                        return None;
                    };
                    let (width, height) = parse_dimensions(size);
                    let quality = match record.get("quality_label") {
                        Some(label) => format!("{} ({})", size, label),
                        None => size.clone(),
                    };
                    descriptor = descriptor.with_dimensions(width, height).with_quality(quality);
                }
                _ => descriptor = descriptor.with_quality(audio_label(bitrate)),
            }
            Some(descriptor)
        })
        .collect();

    AdaptiveStreams::from_descriptors(descriptors)
}

fn parse_dimensions(size: &str) -> (Option<u32>, Option<u32>) {
    match size.split_once('x') {
        Some((w, h)) => (w.parse().ok(), h.parse().ok()),
        None => (None, None),
    }
}

fn audio_label(bitrate: Option<u64>) -> String {
    bitrate.map(|b| format!("{}k", b / 1000)).unwrap_or_default()
}

fn get_attr<T>(e: &BytesStart, attr: &str) -> Option<T>
where
    T: FromStr,
{
    e.try_get_attribute(attr)
        .ok()?
        .and_then(|a| std::str::from_utf8(&a.value).ok()?.parse().ok())
}

#[derive(Default)]
struct PendingRepresentation {
    id: String,
    mime_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    bandwidth: Option<u64>,
    content_length: Option<u64>,
    base_url: String,
}

impl PendingRepresentation {
    fn from_start_event(e: &BytesStart) -> Self {
        Self {
            id: get_attr(e, "id").unwrap_or_default(),
            mime_type: get_attr(e, "mimeType"),
            width: get_attr(e, "width"),
            height: get_attr(e, "height"),
            bandwidth: get_attr(e, "bandwidth"),
            ..Default::default()
        }
    }

    fn finish(self, set_mime: Option<&str>) -> Option<StreamDescriptor> {
        let mime_type = self.mime_type.as_deref().or(set_mime)?;
        let kind = adaptive_kind(mime_type)?;
        if self.id.is_empty() || self.base_url.is_empty() {
            warn!("Skipping representation without id or BaseURL");
            return None;
        }

        let descriptor = StreamDescriptor::new(self.id, self.base_url, mime_type, kind)
            .with_content_length(self.content_length)
            .with_bitrate(self.bandwidth)
            .with_dimensions(self.width, self.height);
        let quality = match kind {
            MediaKind::AdaptiveVideo => descriptor.dimensions_label().unwrap_or_default(),
            _ => audio_label(self.bandwidth),
        };
        Some(descriptor.with_quality(quality))
    }
}

/// Parse the XML adaptation-set manifest
pub fn parse_dash_manifest(manifest: &str) -> Result<AdaptiveStreams, ResolveError> {
    let mut reader = Reader::from_str(manifest);
    reader.trim_text(true);

    let mut descriptors = Vec::new();
    let mut set_mime: Option<String> = None;
    let mut pending: Option<PendingRepresentation> = None;
    let mut in_base_url = false;

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) => match e.name().as_ref() {
                b"AdaptationSet" => set_mime = get_attr(&e, "mimeType"),
                b"Representation" => pending = Some(PendingRepresentation::from_start_event(&e)),
                b"BaseURL" => {
                    in_base_url = true;
                    if let Some(repr) = pending.as_mut() {
                        repr.content_length = get_attr(&e, "yt:contentLength");
                    }
                }
                _ => (),
            },
            Event::Text(e) => {
                if in_base_url {
                    if let Some(repr) = pending.as_mut() {
                        repr.base_url = e.unescape()?.trim().to_string();
                    }
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"BaseURL" => in_base_url = false,
                b"Representation" => {
                    if let Some(descriptor) =
                        pending.take().and_then(|repr| repr.finish(set_mime.as_deref()))
                    {
                        descriptors.push(descriptor);
                    }
                }
                b"AdaptationSet" => set_mime = None,
                _ => (),
            },
            _ => (),
        }
    }

    debug!("Manifest lists {} representations", descriptors.len());
    Ok(AdaptiveStreams::from_descriptors(descriptors))
}

/// Keep the highest-bandwidth audio per container; on ties the later one wins
pub fn retain_best_audio(audio: Vec<StreamDescriptor>) -> Vec<StreamDescriptor> {
    let mut best: Vec<StreamDescriptor> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for descriptor in audio {
        match index.get(&descriptor.container) {
            Some(&i) => {
                if descriptor.bitrate.unwrap_or(0) >= best[i].bitrate.unwrap_or(0) {
                    best[i] = descriptor;
                }
            }
            None => {
                index.insert(descriptor.container.clone(), best.len());
                best.push(descriptor);
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MPD xmlns="urn:mpeg:DASH:schema:MPD:2011" xmlns:yt="http://youtube.com/yt/2012/10/10">
  <Period>
    <AdaptationSet id="0" mimeType="audio/mp4">
      <Representation id="139" codecs="mp4a.40.5" bandwidth="49000">
        <BaseURL yt:contentLength="1000">https://media.example/139?a=1&amp;b=2</BaseURL>
      </Representation>
      <Representation id="140" codecs="mp4a.40.2" bandwidth="130000">
        <BaseURL yt:contentLength="2000">https://media.example/140</BaseURL>
      </Representation>
    </AdaptationSet>
    <AdaptationSet id="1" mimeType="audio/webm">
      <Representation id="171" codecs="vorbis" bandwidth="120000">
        <BaseURL>https://media.example/171</BaseURL>
      </Representation>
    </AdaptationSet>
    <AdaptationSet id="2" mimeType="video/mp4">
      <Representation id="137" codecs="avc1.640028" width="1920" height="1080" bandwidth="4000000">
        <BaseURL yt:contentLength="20000000">https://media.example/137</BaseURL>
      </Representation>
      <Representation id="136" codecs="avc1.4d401f" width="1280" height="720" bandwidth="2000000">
        <BaseURL yt:contentLength="9000000">https://media.example/136</BaseURL>
      </Representation>
    </AdaptationSet>
  </Period>
</MPD>"#;

    #[test]
    fn test_parse_stream_map() {
        let map = "itag=18&url=https%3A%2F%2Fmedia.example%2F18&quality=medium&type=video%2Fmp4%3B+codecs%3D%22avc1%22,\
                   itag=22&url=https%3A%2F%2Fmedia.example%2F22&s=ABCDEF&type=video%2Fmp4,\
                   itag=43&url=https%3A%2F%2Fmedia.example%2F43&sig=XYZ&type=video%2Fwebm,\
                   quality=small&type=video%2Fmp4";
        let streams = parse_stream_map(map);
        assert_eq!(streams.len(), 3);

        assert_eq!(streams[0].id, "18");
        assert_eq!(streams[0].url, "https://media.example/18");
        assert_eq!(streams[0].quality, "medium");
        assert_eq!(streams[0].mime_type, "video/mp4");
        assert_eq!(streams[0].signature, Signature::Unsigned);

        assert_eq!(streams[1].signature, Signature::Ciphered("ABCDEF".to_string()));
        assert_eq!(streams[2].signature, Signature::Signed("XYZ".to_string()));
        assert_eq!(streams[2].container, "webm");
    }

    #[test]
    fn test_repeated_itag_keeps_later_record() {
        let streams = parse_stream_map("itag=18&url=A,itag=22&url=C,itag=18&url=B");
        let urls: Vec<&str> = streams.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, vec!["B", "C"]);
        assert_eq!(streams[0].id, "18");
    }

    #[test]
    fn test_parse_dash_manifest() {
        let streams = parse_dash_manifest(MANIFEST).unwrap();

        assert_eq!(streams.audio.len(), 2);
        assert_eq!(streams.audio[0].id, "140");
        assert_eq!(streams.audio[0].content_length, Some(2000));
        assert_eq!(streams.audio[1].id, "171");
        assert_eq!(streams.audio[1].content_length, None);

        assert_eq!(streams.video.len(), 2);
        assert_eq!(streams.video[0].id, "137");
        assert_eq!(streams.video[0].quality, "1920x1080");
        assert_eq!(streams.video[0].content_length, Some(20_000_000));
        assert_eq!(streams.video[1].quality, "1280x720");
    }

    #[test]
    fn test_manifest_unescapes_base_url() {
        let manifest = r#"<MPD><Period><AdaptationSet mimeType="audio/webm">
<Representation id="251" bandwidth="160000"><BaseURL>https://media.example/251?a=1&amp;b=2</BaseURL></Representation>
</AdaptationSet></Period></MPD>"#;
        let streams = parse_dash_manifest(manifest).unwrap();
        assert_eq!(streams.audio[0].url, "https://media.example/251?a=1&b=2");
        assert!(streams.video.is_empty());
    }

    #[test]
    fn test_malformed_manifest_is_error() {
        let result = parse_dash_manifest("<MPD><Period></AdaptationSet></MPD>");
        assert!(matches!(result, Err(ResolveError::Xml(_))));
    }

    #[test]
    fn test_parse_adaptive_fmts() {
        let list = "itag=140&type=audio%2Fmp4%3B+codecs%3D%22mp4a.40.2%22&url=https%3A%2F%2Fmedia.example%2F140&s=SIG&clen=3000&bitrate=128000,\
                    itag=137&type=video%2Fmp4&url=https%3A%2F%2Fmedia.example%2F137&size=1920x1080&quality_label=1080p&clen=50000,\
                    itag=999&type=video%2Fmp4&url=https%3A%2F%2Fmedia.example%2F999";
        let streams = parse_adaptive_fmts(list);

        assert_eq!(streams.audio.len(), 1);
        assert_eq!(streams.audio[0].signature, Signature::Ciphered("SIG".to_string()));
        assert_eq!(streams.audio[0].content_length, Some(3000));

        assert_eq!(streams.video.len(), 1);
        assert_eq!(streams.video[0].quality, "1920x1080 (1080p)");
        assert_eq!(streams.video[0].width, Some(1920));
    }

    #[test]
    fn test_best_audio_tie_goes_to_later() {
        let a = StreamDescriptor::new("a", "u1", "audio/mp4", MediaKind::AdaptiveAudio);
        let b = StreamDescriptor::new("b", "u2", "audio/mp4", MediaKind::AdaptiveAudio);
        let best = retain_best_audio(vec![a, b]);
        assert_eq!(best.len(), 1);
        assert_eq!(best[0].id, "b");
    }
}
