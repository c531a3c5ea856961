//! wpadvisory-sync core library.
//!
//! Keeps the `conflict` section of a WordPress site's `composer.json` in step
//! with the Wordfence vulnerability feed: feed decoding, mapping vulnerable
//! software to composer packages, building and merging conflict constraints,
//! and publishing each change as a GitHub pull request.

pub mod config;
pub mod conflict;
pub mod errors;
pub mod feed;
pub mod git;
pub mod orchestrator;
pub mod proposal;

// Re-exports for convenience.
pub use config::AppConfig;
pub use conflict::{ComposerManifest, ConflictMerger};
pub use errors::CoreError;
pub use feed::{Feed, FeedEntry, FeedSource};
pub use git::{GitHubClient, GitHubGateway, RepositoryGateway};
pub use orchestrator::{ChangeOrchestrator, EntryState, OrchestratorSettings, RunReport};
