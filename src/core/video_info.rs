//! Stream and catalog structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Media kind of a stream descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaKind {
    /// Audio and video in one resource
    Progressive,
    AdaptiveAudio,
    AdaptiveVideo,
}

impl MediaKind {
    pub fn is_adaptive(&self) -> bool {
        !matches!(self, MediaKind::Progressive)
    }
}

/// Signature state of a stream URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "lowercase")]
pub enum Signature {
    /// URL is usable as is
    Unsigned,
    /// Precomputed signature, appended verbatim
    Signed(String),
    /// Cipher input token that must go through the signature program
    Ciphered(String),
}

impl Signature {
    pub fn is_pending(&self) -> bool {
        !matches!(self, Signature::Unsigned)
    }
}

impl Default for Signature {
    fn default() -> Self {
        Signature::Unsigned
    }
}

/// One stream as listed by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Format tag (itag or representation id)
    pub id: String,
    /// Container name (mp4, webm, flv, 3gp)
    pub container: String,
    /// Quality label
    pub quality: String,
    /// MIME type without codec parameters
    pub mime_type: String,
    pub kind: MediaKind,
    /// URL, possibly still missing its signature
    pub url: String,
    pub signature: Signature,
    /// Content length in bytes, if known
    pub content_length: Option<u64>,
    /// Bandwidth in bits per second
    pub bitrate: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl StreamDescriptor {
    /// Create a descriptor; container is derived from the MIME type
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        mime_type: &str,
        kind: MediaKind,
    ) -> Self {
        let mime_type = mime_type.split(';').next().unwrap_or_default().trim().to_string();
        Self {
            id: id.into(),
            container: crate::utils::mime::mime_to_container(&mime_type).to_string(),
            quality: String::new(),
            mime_type,
            kind,
            url: url.into(),
            signature: Signature::Unsigned,
            content_length: None,
            bitrate: None,
            width: None,
            height: None,
        }
    }

    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = quality.into();
        self
    }

    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = signature;
        self
    }

    pub fn with_content_length(mut self, content_length: Option<u64>) -> Self {
        self.content_length = content_length;
        self
    }

    pub fn with_bitrate(mut self, bitrate: Option<u64>) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn with_dimensions(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// `WxH` label when both dimensions are known
    pub fn dimensions_label(&self) -> Option<String> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(format!("{}x{}", w, h)),
            _ => None,
        }
    }
}

/// How a playable entry is fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// One self-contained URL
    Progressive,
    /// Video leg then audio leg, each a list of range requests
    Adaptive,
}

/// A catalog entry ready to hand to a downloader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayableEntry {
    pub id: String,
    pub quality: String,
    pub container: String,
    pub mime_type: String,
    pub kind: EntryKind,
    /// Ordered request-URL groups
    pub groups: Vec<Vec<String>>,
    /// Total size in bytes, if known
    pub size: Option<u64>,
    /// Pending signature of a progressive entry
    #[serde(skip)]
    pub signature: Signature,
}

impl PlayableEntry {
    /// Progressive entry wrapping a single stream descriptor
    pub fn progressive(stream: &StreamDescriptor) -> Self {
        Self {
            id: stream.id.clone(),
            quality: stream.quality.clone(),
            container: stream.container.clone(),
            mime_type: stream.mime_type.clone(),
            kind: EntryKind::Progressive,
            groups: vec![vec![stream.url.clone()]],
            size: stream.content_length,
            signature: stream.signature.clone(),
        }
    }

    pub fn is_adaptive(&self) -> bool {
        self.kind == EntryKind::Adaptive
    }

    /// All request URLs in order
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().flatten().map(String::as_str)
    }

    /// Number of requests needed to fetch the entry
    pub fn request_count(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }
}

/// All playable entries for one video
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// Progressive entries in service order
    pub progressive: Vec<PlayableEntry>,
    /// Paired adaptive entries in manifest order
    pub adaptive: Vec<PlayableEntry>,
}

impl Catalog {
    pub fn is_empty(&self) -> bool {
        self.progressive.is_empty() && self.adaptive.is_empty()
    }

    pub fn len(&self) -> usize {
        self.progressive.len() + self.adaptive.len()
    }

    /// Entry by id, progressive first
    pub fn get(&self, id: &str) -> Option<&PlayableEntry> {
        self.progressive
            .iter()
            .chain(self.adaptive.iter())
            .find(|entry| entry.id == id)
    }

    /// All entry ids, progressive first
    pub fn ids(&self) -> Vec<String> {
        self.progressive
            .iter()
            .chain(self.adaptive.iter())
            .map(|entry| entry.id.clone())
            .collect()
    }
}

/// Caption track discovered in the player response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionTrack {
    pub language_code: String,
    pub base_url: String,
}

/// Result of resolving one video
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Video id
    pub id: String,
    pub title: String,
    /// Client script used for signatures, if one was advertised
    pub script_url: Option<String>,
    pub catalog: Catalog,
    #[serde(default)]
    pub captions: Vec<CaptionTrack>,
    pub resolved_at: DateTime<Utc>,
}

impl VideoInfo {
    pub fn new(id: impl Into<String>, title: impl Into<String>, catalog: Catalog) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            script_url: None,
            catalog,
            captions: Vec::new(),
            resolved_at: Utc::now(),
        }
    }
}

/// HLS variant playlist of a live broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveEndpoint {
    pub video_id: String,
    pub title: String,
    pub url: String,
}

/// Outcome of a resolution request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Resolution {
    /// The selected entry, signature and size resolved
    Selected {
        video: VideoInfo,
        entry: PlayableEntry,
    },
    /// Full catalog, nothing selected
    Listing { video: VideoInfo },
    Live { endpoint: LiveEndpoint },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, kind: EntryKind) -> PlayableEntry {
        PlayableEntry {
            id: id.to_string(),
            quality: String::new(),
            container: "mp4".to_string(),
            mime_type: "video/mp4".to_string(),
            kind,
            groups: vec![vec![format!("https://media.example/{}", id)]],
            size: None,
            signature: Signature::Unsigned,
        }
    }

    #[test]
    fn test_descriptor_strips_codecs() {
        let stream = StreamDescriptor::new(
            "18",
            "https://media.example/18",
            "video/mp4; codecs=\"avc1.42001E, mp4a.40.2\"",
            MediaKind::Progressive,
        );
        assert_eq!(stream.mime_type, "video/mp4");
        assert_eq!(stream.container, "mp4");
    }

    #[test]
    fn test_progressive_entry_keeps_signature() {
        let url = "https://media.example/22";
        let stream = StreamDescriptor::new("22", url, "video/mp4", MediaKind::Progressive)
            .with_signature(Signature::Ciphered("abc".to_string()));
        let entry = PlayableEntry::progressive(&stream);
        assert_eq!(entry.groups, vec![vec!["https://media.example/22".to_string()]]);
        assert!(entry.signature.is_pending());
        assert_eq!(entry.request_count(), 1);
    }

    #[test]
    fn test_catalog_lookup_prefers_progressive() {
        let catalog = Catalog {
            progressive: vec![entry("18", EntryKind::Progressive)],
            adaptive: vec![entry("137", EntryKind::Adaptive), entry("18", EntryKind::Adaptive)],
        };
        assert_eq!(catalog.get("18").unwrap().kind, EntryKind::Progressive);
        assert_eq!(catalog.get("137").unwrap().kind, EntryKind::Adaptive);
        assert!(catalog.get("999").is_none());
        assert_eq!(catalog.ids(), vec!["18", "137", "18"]);
    }

    #[test]
    fn test_resolution_serializes_with_tag() {
        let resolution = Resolution::Live {
            endpoint: LiveEndpoint {
                video_id: "abc".to_string(),
                title: "Live".to_string(),
                url: "https://manifest.example/hls".to_string(),
            },
        };
        let json = serde_json::to_value(&resolution).unwrap();
        assert_eq!(json["type"], "live");
        assert_eq!(json["endpoint"]["url"], "https://manifest.example/hls");
    }
}
