//! Resolution pipeline and its data model

pub mod catalog;
pub mod context;
pub mod resolver;
pub mod video_info;

pub use catalog::*;
pub use context::*;
pub use resolver::*;
pub use video_info::*;
