//! Per-video resolution state

use crate::core::video_info::Signature;
use crate::error::CipherError;
use crate::platform::cipher::CipherEngine;
use crate::platform::client::Fetcher;
use crate::utils::url::append_query_param;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

/// State carried through one video's resolution.
///
/// The client script is fetched at most once, on the first signature that
/// needs it.
pub struct ResolutionContext<'a> {
    pub video_id: String,
    pub title: String,
    pub script_url: Option<String>,
    fetcher: &'a dyn Fetcher,
    cipher: &'a CipherEngine,
    script: OnceCell<Arc<str>>,
}

impl<'a> ResolutionContext<'a> {
    pub fn new(
        video_id: impl Into<String>,
        title: impl Into<String>,
        script_url: Option<String>,
        fetcher: &'a dyn Fetcher,
        cipher: &'a CipherEngine,
    ) -> Self {
        Self {
            video_id: video_id.into(),
            title: title.into(),
            script_url,
            fetcher,
            cipher,
            script: OnceCell::new(),
        }
    }

    pub fn fetcher(&self) -> &'a dyn Fetcher {
        self.fetcher
    }

    /// Whether the client script has been fetched
    pub fn script_loaded(&self) -> bool {
        self.script.initialized()
    }

    /// Client script text, fetched on first use
    pub async fn script(&self) -> Result<Arc<str>, CipherError> {
        let script = self
            .script
            .get_or_try_init(|| async {
                let url = self
                    .script_url
                    .as_deref()
                    .ok_or_else(|| {
                        CipherError::ScriptUnavailable("no client script advertised".to_string())
                    })?;
                debug!("Fetching client script {}", url);
                let text = self
                    .fetcher
                    .fetch(url, &[])
                    .await
                    .map_err(|e| CipherError::ScriptUnavailable(e.to_string()))?;
                Ok::<_, CipherError>(Arc::from(text))
            })
            .await?;
        Ok(script.clone())
    }

    /// `url` with its signature applied
    pub async fn sign(&self, url: &str, signature: &Signature) -> Result<String, CipherError> {
        match signature {
            Signature::Unsigned => Ok(url.to_string()),
            Signature::Signed(sig) => Ok(append_query_param(url, "signature", sig)),
            Signature::Ciphered(token) => {
                let script = self.script().await?;
                let sig = self.cipher.decipher(script, token).await?;
                Ok(append_query_param(url, "signature", &sig))
            }
        }
    }
}
