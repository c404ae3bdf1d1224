//! Range chunking and request retries

pub mod chunker;
pub mod retry;

pub use chunker::*;
pub use retry::*;
