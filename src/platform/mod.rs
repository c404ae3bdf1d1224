//! Service-specific collaborators: HTTP, metadata, manifests and signatures

pub mod cipher;
pub mod client;
pub mod formats;
pub mod manifest;
pub mod metadata;
pub mod program;

pub use cipher::*;
pub use client::*;
pub use formats::*;
pub use manifest::*;
pub use metadata::*;
pub use program::*;
