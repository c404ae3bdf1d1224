//! # ytresolve - YouTube media URL resolution
//!
//! Turns a video id into directly fetchable media URLs: sized,
//! quality-ranked, signed and, for split audio/video streams, chunked into
//! bounded range requests.
//!
//! ## Features
//!
//! - Signature deciphering without a script runtime
//! - Progressive stream maps, adaptive manifests and inline adaptive lists
//! - Audio/video pairing with range-request chunking
//! - Restricted videos via session cookies
//! - Live stream endpoints
//!
//! ## Example
//!
//! ```rust,no_run
//! use ytresolve::{HttpClientConfig, Resolution, ResolveOptions, Resolver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let resolver = Resolver::with_http(HttpClientConfig::default())?;
//!
//!     match resolver.resolve_video("dQw4w9WgXcQ", &ResolveOptions::default()).await? {
//!         Resolution::Selected { video, entry } => {
//!             println!("{}: format {}", video.title, entry.id);
//!             for url in entry.urls() {
//!                 println!("{}", url);
//!             }
//!         }
//!         Resolution::Live { endpoint } => println!("live: {}", endpoint.url),
//!         Resolution::Listing { .. } => {}
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod core;
pub mod download;
pub mod error;
pub mod platform;
pub mod utils;

// Re-export main types
pub use core::{
    Catalog, LiveEndpoint, PlayableEntry, Resolution, ResolveOptions, Resolver, ResolverOptions,
    VideoInfo,
};
pub use error::{CipherError, ResolutionError, ResolveError};
pub use platform::{
    resolve_cipher, CookieSource, Fetcher, HttpClientConfig, HttpFetcher, StaticCookies,
};

/// Result type alias for ytresolve operations
pub type Result<T> = std::result::Result<T, ResolveError>;
