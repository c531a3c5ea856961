//! Vulnerability feed model and sources.

pub mod model;
pub mod source;

pub use model::{AffectedVersionRange, Feed, FeedEntry, SoftwareRecord, SoftwareType};
pub use source::{FeedKind, FeedSource, FileFeedSource, WordfenceClient};
