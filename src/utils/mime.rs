//! MIME type helpers for stream classification

use crate::core::video_info::MediaKind;

/// Container name for a stream MIME type
pub fn mime_to_container(mime_type: &str) -> &'static str {
    match essence(mime_type) {
        "video/mp4" | "audio/mp4" => "mp4",
        "video/webm" | "audio/webm" => "webm",
        "video/3gpp" => "3gp",
        "video/x-flv" => "flv",
        _ => "unknown",
    }
}

/// MIME type without codec parameters
pub fn essence(mime_type: &str) -> &str {
    mime_type.split(';').next().unwrap_or_default().trim()
}

/// Check if MIME type is a video format
pub fn is_video_mime(mime_type: &str) -> bool {
    essence(mime_type).starts_with("video/")
}

/// Check if MIME type is an audio format
pub fn is_audio_mime(mime_type: &str) -> bool {
    essence(mime_type).starts_with("audio/")
}

/// Adaptive media kind for a manifest MIME type, `None` for anything else
pub fn adaptive_kind(mime_type: &str) -> Option<MediaKind> {
    if is_audio_mime(mime_type) {
        Some(MediaKind::AdaptiveAudio)
    } else if is_video_mime(mime_type) {
        Some(MediaKind::AdaptiveVideo)
    } else {
        None
    }
}
