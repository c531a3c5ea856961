//! The composer `conflict` section and how vulnerabilities land in it.
//!
//! 1. **Keys** -- which composer package a vulnerable plugin/theme/core maps to.
//! 2. **Constraints** -- turning an affected version range into a constraint string.
//! 3. **Merging** -- folding constraints into the manifest idempotently.

pub mod constraint;
pub mod key;
pub mod manifest;
pub mod merger;
pub mod version;

pub use manifest::ComposerManifest;
pub use merger::{ConflictChange, ConflictMerger, EntryEvaluation, MergeOutcome};
