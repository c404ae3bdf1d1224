//! Error types for ytresolve

use thiserror::Error;

/// Main error type for resolution operations
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("Signature error: {0}")]
    Cipher(#[from] CipherError),

    #[error("Size probe failed: {0}")]
    SizeProbe(String),

    #[error(
        "Invalid video format: {requested}. Run with --info and no specific format to view all available formats ({})",
        .available.join(", ")
    )]
    InvalidFormatRequested {
        requested: String,
        available: Vec<String>,
    },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Resolution cancelled")]
    Cancelled,
}

/// Terminal failures of a single video resolution
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("Video does not exist")]
    NotFound,

    #[error("{0}. Try again with --cookies to supply session cookies")]
    Restricted(String),

    #[error("Video is not available in your country")]
    RegionBlocked,

    #[error("Unknown status in video info response")]
    UnknownStatus,

    #[error("Video info request failed: {reason}")]
    Failed { reason: String },

    #[error("Live stream unavailable: {0}")]
    LiveUnavailable(String),

    #[error("Player configuration not found in watch page")]
    PlayerConfigMissing,

    #[error("No playable streams left after resolution")]
    EmptyCatalog,
}

/// Failures while locating, translating or evaluating a signature program
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    #[error("Signature entry point not found in client script")]
    EntryPointNotFound,

    #[error("Body of signature function '{0}' not found")]
    EntryBodyNotFound(String),

    #[error("Helper '{0}' not found or not recognised")]
    HelperNotFound(String),

    #[error("Untranslatable statement: {0}")]
    Untranslatable(String),

    #[error("Evaluation failed: {0}")]
    EvaluationFailed(String),

    #[error("Invalid extraction pattern: {0}")]
    Pattern(String),

    #[error("Client script unavailable: {0}")]
    ScriptUnavailable(String),
}

impl From<regex::Error> for CipherError {
    fn from(error: regex::Error) -> Self {
        CipherError::Pattern(error.to_string())
    }
}

impl ResolveError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            ResolveError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ResolveError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_retryable() {
        let err = ResolveError::HttpStatus {
            status: 503,
            url: "https://example.com".to_string(),
        };
        assert!(err.is_retryable());

        let err = ResolveError::HttpStatus {
            status: 404,
            url: "https://example.com".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_resolution_errors_not_retryable() {
        assert!(!ResolveError::from(ResolutionError::NotFound).is_retryable());
        assert!(!ResolveError::from(CipherError::EntryPointNotFound).is_retryable());
    }

    #[test]
    fn test_invalid_format_message_lists_ids() {
        let err = ResolveError::InvalidFormatRequested {
            requested: "99".to_string(),
            available: vec!["18".to_string(), "22".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("99"));
        assert!(message.contains("18, 22"));
    }
}
