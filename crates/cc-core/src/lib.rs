//! clip-contest/crates/cc-core/src/lib.rs
//!
//! The central domain logic and interface definitions for clip-contest:
//! the video URL classifier, the access gate, and the ports every plugin
//! implements.

pub mod access;
pub mod error;
pub mod models;
pub mod traits;
pub mod video_url;

// Re-exporting for easier access in other crates
pub use access::*;
pub use error::*;
pub use models::*;
pub use traits::*;
pub use video_url::{classify_video_url, is_url_valid};
