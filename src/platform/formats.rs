//! Quality ranking and stream selection

use crate::core::video_info::{Catalog, PlayableEntry};
use crate::error::{ResolutionError, ResolveError};
use tracing::debug;

/// Known progressive encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamType {
    pub itag: &'static str,
    pub container: &'static str,
    pub resolution: &'static str,
    pub video_codec: &'static str,
    pub audio_codec: &'static str,
}

const fn stream_type(
    itag: &'static str,
    container: &'static str,
    resolution: &'static str,
    video_codec: &'static str,
    audio_codec: &'static str,
) -> StreamType {
    StreamType {
        itag,
        container,
        resolution,
        video_codec,
        audio_codec,
    }
}

/// Progressive encodings, best first
pub const QUALITY_TABLE: &[StreamType] = &[
    stream_type("38", "MP4", "3072p", "H.264", "AAC"),
    stream_type("46", "WebM", "1080p", "VP8", "Vorbis"),
    stream_type("37", "MP4", "1080p", "H.264", "AAC"),
    stream_type("45", "WebM", "720p", "VP8", "Vorbis"),
    stream_type("22", "MP4", "720p", "H.264", "AAC"),
    stream_type("120", "FLV", "720p", "H.264", "AAC"),
    stream_type("44", "WebM", "480p", "VP8", "Vorbis"),
    stream_type("35", "FLV", "480p", "H.264", "AAC"),
    stream_type("43", "WebM", "360p", "VP8", "Vorbis"),
    stream_type("34", "FLV", "360p", "H.264", "AAC"),
    stream_type("18", "MP4", "360p", "H.264", "AAC"),
    stream_type("6", "FLV", "270p", "Sorenson H.263", "MP3"),
    stream_type("13", "3GP", "", "MPEG-4 Visual", "AAC"),
    stream_type("5", "FLV", "240p", "Sorenson H.263", "MP3"),
    stream_type("36", "3GP", "240p", "MPEG-4 Visual", "AAC"),
    stream_type("17", "3GP", "144p", "MPEG-4 Visual", "AAC"),
];

/// Table entry for a format id
pub fn lookup(itag: &str) -> Option<&'static StreamType> {
    QUALITY_TABLE.iter().find(|t| t.itag == itag)
}

/// Position in the quality table; lower is better
pub fn rank(itag: &str) -> Option<usize> {
    QUALITY_TABLE.iter().position(|t| t.itag == itag)
}

/// Pick an entry from the catalog.
///
/// An explicit `format_id` must exist in the progressive or adaptive list.
/// Without one, the best-ranked progressive entry wins; progressive ids the
/// table does not know rank after every known one, in service order. A
/// catalog with only adaptive entries yields the largest of them.
pub fn select<'a>(
    catalog: &'a Catalog,
    format_id: Option<&str>,
) -> Result<&'a PlayableEntry, ResolveError> {
    if let Some(requested) = format_id {
        return catalog.get(requested).ok_or_else(|| ResolveError::InvalidFormatRequested {
            requested: requested.to_string(),
            available: catalog.ids(),
        });
    }

    let best_progressive = catalog
        .progressive
        .iter()
        .enumerate()
        .min_by_key(|(position, entry)| (rank(&entry.id).unwrap_or(QUALITY_TABLE.len()), *position))
        .map(|(_, entry)| entry);

    if let Some(entry) = best_progressive {
        debug!("Selected progressive format {}", entry.id);
        return Ok(entry);
    }

    let largest_adaptive = catalog
        .adaptive
        .iter()
        .rev()
        .max_by_key(|entry| entry.size.unwrap_or(0));

    match largest_adaptive {
        Some(entry) => {
            debug!("No progressive formats, selected adaptive format {}", entry.id);
            Ok(entry)
        }
        None => Err(ResolutionError::EmptyCatalog.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::video_info::{EntryKind, Signature};

    fn entry(id: &str, kind: EntryKind, size: Option<u64>) -> PlayableEntry {
        PlayableEntry {
            id: id.to_string(),
            quality: String::new(),
            container: "mp4".to_string(),
            mime_type: "video/mp4".to_string(),
            kind,
            groups: vec![vec![format!("https://media.test/{}", id)]],
            size,
            signature: Signature::Unsigned,
        }
    }

    fn catalog() -> Catalog {
        Catalog {
            progressive: vec![
                entry("36", EntryKind::Progressive, None),
                entry("18", EntryKind::Progressive, None),
                entry("22", EntryKind::Progressive, None),
                entry("43", EntryKind::Progressive, None),
            ],
            adaptive: vec![
                entry("137", EntryKind::Adaptive, Some(30)),
                entry("248", EntryKind::Adaptive, Some(40)),
            ],
        }
    }

    #[test]
    fn test_quality_table() {
        assert_eq!(QUALITY_TABLE.len(), 16);
        assert_eq!(rank("38"), Some(0));
        assert_eq!(rank("17"), Some(15));
        assert_eq!(rank("137"), None);
        assert_eq!(lookup("22").unwrap().resolution, "720p");
    }

    #[test]
    fn test_select_explicit() {
        let catalog = catalog();
        assert_eq!(select(&catalog, Some("18")).unwrap().id, "18");
        assert_eq!(select(&catalog, Some("248")).unwrap().id, "248");
    }

    #[test]
    fn test_select_unknown_lists_available() {
        let err = select(&catalog(), Some("999")).unwrap_err();
        match err {
            ResolveError::InvalidFormatRequested {
                requested,
                available,
            } => {
                assert_eq!(requested, "999");
                assert_eq!(available, vec!["36", "18", "22", "43", "137", "248"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_select_default_is_table_ranked() {
        let catalog = catalog();
        assert_eq!(select(&catalog, None).unwrap().id, "22");
        assert_eq!(select(&catalog, None).unwrap().id, "22");
    }

    #[test]
    fn test_select_default_unknown_ids_rank_last() {
        let catalog = Catalog {
            progressive: vec![
                entry("999", EntryKind::Progressive, None),
                entry("17", EntryKind::Progressive, None),
            ],
            adaptive: Vec::new(),
        };
        assert_eq!(select(&catalog, None).unwrap().id, "17");
    }

    #[test]
    fn test_select_default_without_progressive() {
        let catalog = Catalog {
            progressive: Vec::new(),
            adaptive: vec![
                entry("137", EntryKind::Adaptive, Some(40)),
                entry("248", EntryKind::Adaptive, Some(40)),
                entry("136", EntryKind::Adaptive, Some(10)),
            ],
        };
        assert_eq!(select(&catalog, None).unwrap().id, "137");
    }

    #[test]
    fn test_select_empty_catalog() {
        let err = select(&Catalog::default(), None).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Resolution(ResolutionError::EmptyCatalog)
        ));
    }
}
