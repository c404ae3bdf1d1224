//! Utility functions for ytresolve

pub mod cache;
pub mod cookies;
pub mod mime;
pub mod strategy;
pub mod url;

pub use cache::*;
pub use cookies::*;
pub use mime::*;
pub use strategy::*;
pub use self::url::*;
