//! fragment-trails/crates/moderation-adapters/src/lib.rs
//!
//! Implementations of the `ModerationClassifier` port.

pub mod keyword;

#[cfg(feature = "moderation-http")]
pub mod http;

pub use keyword::KeywordClassifier;

#[cfg(feature = "moderation-http")]
pub use http::{HttpClassifierConfig, HttpModerationClassifier};
