//! Per-video status classification and player configuration extraction
//!
//! One `get_video_info` fetch decides the path: a plain watch page for `ok`
//! videos, a cookie-augmented re-fetch for restricted ones, and an immediate
//! error for everything else. The watch page embeds the player configuration
//! (`ytplayer.config = {...};`) that carries the title, the client script and
//! the stream lists.

use crate::core::video_info::{CaptionTrack, LiveEndpoint};
use crate::error::{ResolutionError, ResolveError};
use crate::platform::client::{CookieSource, Fetcher};
use crate::utils::cookies::session_cookie_header;
use crate::utils::strategy::{first_success, Strategy};
use crate::utils::url::{absolute_script_url, parse_query, QueryMap};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Service origin used for info, watch and script URLs
pub const DEFAULT_SERVICE_BASE: &str = "https://www.youtube.com";

/// Player configuration on a normal watch page
const CONFIG_PATTERN: &str = r"ytplayer\.config\s*=\s*([^\n]+?});";

/// Player configuration on a restricted-mode watch page
const RESTRICTED_CONFIG_PATTERN: &str = r"ytplayer\.config\s*=\s*([^\n]+});ytplayer";

/// User-facing message on a page without a player
const MESSAGE_PATTERN: &str = r#"class="message">([^<]+)<"#;

const RESTRICTED_ERROR_CODE: &str = "150";
const NOT_FOUND_ERROR_CODE: &str = "100";

/// Status of a video as reported by the info record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoStatus {
    Ok { cipher_protected: bool },
    Live,
    Restricted,
    NotFound,
    Failed {
        code: Option<String>,
        reason: String,
    },
    Unknown,
}

impl VideoStatus {
    /// Classify a decoded `get_video_info` record
    pub fn classify(info: &QueryMap) -> Self {
        match info.get("status").map(String::as_str) {
            Some("ok") if is_live(info.get("livestream")) || is_live(info.get("live_playback")) => {
                VideoStatus::Live
            }
            Some("ok") => VideoStatus::Ok {
                cipher_protected: info
                    .get("use_cipher_signature")
                    .is_some_and(|value| value != "False"),
            },
            Some("fail") => match info.get("errorcode").map(String::as_str) {
                Some(RESTRICTED_ERROR_CODE) => VideoStatus::Restricted,
                Some(NOT_FOUND_ERROR_CODE) => VideoStatus::NotFound,
                code => VideoStatus::Failed {
                    code: code.map(str::to_string),
                    reason: info
                        .get("reason")
                        .cloned()
                        .unwrap_or_else(|| "no reason given".to_string()),
                },
            },
            _ => VideoStatus::Unknown,
        }
    }
}

fn is_live(value: Option<&String>) -> bool {
    value.is_some_and(|v| v == "1")
}

fn flag_set(value: &Option<Value>) -> bool {
    match value {
        Some(Value::String(s)) => s == "1",
        Some(Value::Number(n)) => n.as_u64() == Some(1),
        Some(Value::Bool(b)) => *b,
        _ => false,
    }
}

/// Page-embedded player configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayerConfig {
    #[serde(default)]
    pub args: PlayerArgs,
    #[serde(default)]
    pub assets: PlayerAssets,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayerArgs {
    pub title: Option<String>,
    pub url_encoded_fmt_stream_map: Option<String>,
    pub adaptive_fmts: Option<String>,
    pub dashmpd: Option<String>,
    pub hlsvp: Option<String>,
    /// JSON document encoded as a string
    pub player_response: Option<String>,
    pub livestream: Option<Value>,
    pub live_playback: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayerAssets {
    pub js: Option<String>,
}

impl PlayerConfig {
    pub fn is_live(&self) -> bool {
        flag_set(&self.args.livestream) || flag_set(&self.args.live_playback)
    }
}

/// Extract the player configuration matched by `pattern`
pub fn extract_player_config(
    page: &str,
    pattern: &str,
) -> Result<Option<PlayerConfig>, ResolveError> {
    let re = Regex::new(pattern)?;
    let Some(json) = re.captures(page).and_then(|c| c.get(1)) else {
        return Ok(None);
    };
    match serde_json::from_str(json.as_str()) {
        Ok(config) => Ok(Some(config)),
        Err(e) => {
            debug!("Player configuration is not valid JSON: {}", e);
            Ok(None)
        }
    }
}

/// Embedded player response, only the fields the resolver reads
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayerResponse {
    #[serde(rename = "playabilityStatus")]
    pub playability_status: Option<PlayabilityStatus>,
    pub captions: Option<Captions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayabilityStatus {
    pub status: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Captions {
    #[serde(rename = "playerCaptionsTracklistRenderer")]
    pub tracklist: Option<CaptionTracklist>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaptionTracklist {
    #[serde(rename = "captionTracks", default)]
    pub tracks: Vec<RawCaptionTrack>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCaptionTrack {
    #[serde(rename = "baseUrl")]
    pub base_url: String,
    #[serde(rename = "languageCode")]
    pub language_code: String,
}

impl PlayerResponse {
    pub fn caption_tracks(&self) -> Vec<CaptionTrack> {
        self.captions
            .as_ref()
            .and_then(|c| c.tracklist.as_ref())
            .map(|t| {
                t.tracks
                    .iter()
                    .map(|track| CaptionTrack {
                        language_code: track.language_code.clone(),
                        base_url: track.base_url.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn unplayable_reason(&self) -> Option<&str> {
        self.playability_status.as_ref()?.reason.as_deref()
    }
}

/// Everything known about a video after the status step
struct Sources {
    info: QueryMap,
    config: Option<PlayerConfig>,
    base: String,
}

impl Sources {
    fn args(&self) -> Option<&PlayerArgs> {
        self.config.as_ref().map(|c| &c.args)
    }

    fn is_live(&self) -> bool {
        self.config.as_ref().is_some_and(PlayerConfig::is_live)
            || is_live(self.info.get("livestream"))
            || is_live(self.info.get("live_playback"))
    }

    fn script_url(&self) -> Option<String> {
        let js = self.config.as_ref()?.assets.js.as_deref()?;
        Some(absolute_script_url(&self.base, js))
    }
}

const TITLE_STRATEGIES: &[Strategy<Sources, String>] = &[
    ("video info", |s| s.info.get("title").cloned()),
    ("player config", |s| s.args()?.title.clone()),
];

/// Stream map and the script that signs it
const STREAM_MAP_STRATEGIES: &[Strategy<Sources, (String, Option<String>)>] = &[
    ("player config", |s| {
        let map = s.args()?.url_encoded_fmt_stream_map.clone()?;
        Some((map, s.script_url()))
    }),
    ("video info", |s| {
        let map = s.info.get("url_encoded_fmt_stream_map")?.clone();
        Some((map, None))
    }),
];

const DASH_MANIFEST_STRATEGIES: &[Strategy<Sources, String>] = &[
    ("player config", |s| s.args()?.dashmpd.clone()),
    ("video info", |s| s.info.get("dashmpd").cloned()),
];

const ADAPTIVE_LIST_STRATEGIES: &[Strategy<Sources, String>] = &[
    ("player config", |s| s.args()?.adaptive_fmts.clone()),
    ("video info", |s| s.info.get("adaptive_fmts").cloned()),
];

const HLS_STRATEGIES: &[Strategy<Sources, String>] = &[
    ("player config", |s| s.args()?.hlsvp.clone()),
    ("video info", |s| s.info.get("hlsvp").cloned()),
];

const PLAYER_RESPONSE_STRATEGIES: &[Strategy<Sources, PlayerResponse>] = &[
    ("player config", |s| {
        serde_json::from_str(s.args()?.player_response.as_deref()?).ok()
    }),
    ("video info", |s| {
        serde_json::from_str(s.info.get("player_response")?).ok()
    }),
];

const RESTRICTED_CONFIG_STRATEGIES: &[Strategy<String, PlayerConfig>] = &[
    ("restricted-mode config", |page| {
        extract_player_config(page, RESTRICTED_CONFIG_PATTERN).ok().flatten()
    }),
    ("standard config", |page| {
        extract_player_config(page, CONFIG_PATTERN).ok().flatten()
    }),
];

/// Metadata of a video with a stream catalog
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoMetadata {
    pub video_id: String,
    pub title: String,
    /// Absolute client script URL, when the stream map came from the player config
    pub script_url: Option<String>,
    /// Progressive stream map
    pub stream_map: Option<String>,
    /// Adaptive manifest URL
    pub dash_manifest_url: Option<String>,
    /// Inline adaptive list, used when the manifest is unusable
    pub adaptive_fmts: Option<String>,
    pub captions: Vec<CaptionTrack>,
}

/// Outcome of the status step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Metadata {
    Streams(VideoMetadata),
    Live(LiveEndpoint),
}

/// Drives the status state machine for one video
pub struct MetadataResolver<'a> {
    fetcher: &'a dyn Fetcher,
    cookies: &'a dyn CookieSource,
    base: &'a str,
}

impl<'a> MetadataResolver<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, cookies: &'a dyn CookieSource) -> Self {
        Self {
            fetcher,
            cookies,
            base: DEFAULT_SERVICE_BASE,
        }
    }

    /// Use a different service origin
    pub fn with_base(mut self, base: &'a str) -> Self {
        self.base = base;
        self
    }

    pub fn info_url(&self, video_id: &str) -> String {
        format!("{}/get_video_info?video_id={}", self.base, video_id)
    }

    pub fn watch_url(&self, video_id: &str) -> String {
        format!("{}/watch?v={}", self.base, video_id)
    }

    /// Fetch the info record and follow the status it reports
    pub async fn resolve(&self, video_id: &str) -> Result<Metadata, ResolveError> {
        let info = parse_query(&self.fetcher.fetch(&self.info_url(video_id), &[]).await?);
        let status = VideoStatus::classify(&info);
        debug!("Video {} status: {:?}", video_id, status);

        let sources = match status {
            VideoStatus::Ok {
                cipher_protected: false,
            }
            | VideoStatus::Live => {
                let page = self.fetcher.fetch(&self.watch_url(video_id), &[]).await?;
                let config = extract_player_config(&page, CONFIG_PATTERN)?;
                if config.is_none() {
                    debug!("No player config on watch page, using info record");
                }
                self.sources(info, config)
            }
            VideoStatus::Ok {
                cipher_protected: true,
            } => {
                let page = self.fetcher.fetch(&self.watch_url(video_id), &[]).await?;
                let config = extract_player_config(&page, CONFIG_PATTERN)?
                    .ok_or(ResolutionError::PlayerConfigMissing)?;
                self.sources(info, Some(config))
            }
            VideoStatus::Restricted => self.restricted(video_id, info).await?,
            VideoStatus::NotFound => return Err(ResolutionError::NotFound.into()),
            VideoStatus::Failed { reason, .. } => {
                return Err(ResolutionError::Failed { reason }.into())
            }
            VideoStatus::Unknown => return Err(ResolutionError::UnknownStatus.into()),
        };

        let title = first_success("title", &sources, TITLE_STRATEGIES).unwrap_or_else(|| {
            warn!("No title for {}, using the video id", video_id);
            video_id.to_string()
        });

        if sources.is_live() {
            return live_endpoint(video_id, title, &sources).map(Metadata::Live);
        }

        let stream_map = first_success("stream map", &sources, STREAM_MAP_STRATEGIES);
        let (stream_map, script_url) = match stream_map {
            Some((map, script)) => (Some(map), script),
            None => (None, sources.script_url()),
        };
        let captions = first_success("player response", &sources, PLAYER_RESPONSE_STRATEGIES)
            .map(|response| response.caption_tracks())
            .unwrap_or_default();

        info!("Resolved metadata for {}: {}", video_id, title);
        Ok(Metadata::Streams(VideoMetadata {
            video_id: video_id.to_string(),
            title,
            script_url,
            stream_map,
            dash_manifest_url: first_success("dash manifest", &sources, DASH_MANIFEST_STRATEGIES),
            adaptive_fmts: first_success("adaptive list", &sources, ADAPTIVE_LIST_STRATEGIES),
            captions,
        }))
    }

    fn sources(&self, info: QueryMap, config: Option<PlayerConfig>) -> Sources {
        Sources {
            info,
            config,
            base: self.base.to_string(),
        }
    }

    /// Re-fetch the watch page with the session cookies attached
    async fn restricted(&self, video_id: &str, info: QueryMap) -> Result<Sources, ResolveError> {
        let cookie_header = session_cookie_header(&self.cookies.current_session_cookies());
        let page = match &cookie_header {
            Some(header) => {
                debug!("Re-fetching restricted video {} with session cookies", video_id);
                self.fetcher
                    .fetch(&self.watch_url(video_id), &[("Cookie", header.as_str())])
                    .await?
            }
            None => {
                debug!("No session cookies, fetching restricted video {} anonymously", video_id);
                self.fetcher.fetch(&self.watch_url(video_id), &[]).await?
            }
        };

        let config = first_success("player config", &page, RESTRICTED_CONFIG_STRATEGIES);
        let Some(config) = config else {
            let message = Regex::new(MESSAGE_PATTERN)?
                .captures(&page)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_else(|| "Video is restricted".to_string());
            return Err(ResolutionError::Restricted(message).into());
        };

        if config.args.title.is_none() {
            return Err(ResolutionError::RegionBlocked.into());
        }

        let mut sources = self.sources(info, Some(config));
        // The info record of a restricted video carries no usable title.
        sources.info.remove("title");
        Ok(sources)
    }
}

fn live_endpoint(
    video_id: &str,
    title: String,
    sources: &Sources,
) -> Result<LiveEndpoint, ResolveError> {
    match first_success("live playlist", sources, HLS_STRATEGIES) {
        Some(url) => {
            info!("Video {} is live", video_id);
            Ok(LiveEndpoint {
                video_id: video_id.to_string(),
                title,
                url,
            })
        }
        None => {
            let reason = first_success("player response", sources, PLAYER_RESPONSE_STRATEGIES)
                .and_then(|response| response.unplayable_reason().map(str::to_string))
                .unwrap_or_else(|| "no live playlist advertised".to_string());
            Err(ResolutionError::LiveUnavailable(reason).into())
        }
    }
}
