//! Commit message and pull request text for a published entry.

use crate::feed::FeedEntry;

/// Where the advisory text points readers.
pub const WORDFENCE_THREAT_INTEL_URL: &str =
    "https://www.wordfence.com/threat-intel/vulnerabilities/";

const UNKNOWN_TYPE: &str = "unknown type";
const UNKNOWN_NAME: &str = "unknown name";
const UNKNOWN_SCORE: &str = "unknown";

/// The text attached to one published change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    /// Used both as the commit message and the pull request title.
    pub title: String,
    pub body: String,
}

impl Proposal {
    /// Build the proposal text for `entry`, announcing `constraint`.
    ///
    /// The entry is named after its first software record.
    pub fn for_entry(entry: &FeedEntry, constraint: &str) -> Self {
        let (software_type, software_name) = match entry.primary_software() {
            Some(software) => (software.software_type.to_string(), software.name.clone()),
            None => (UNKNOWN_TYPE.to_string(), UNKNOWN_NAME.to_string()),
        };
        let score = format_score(entry.cvss_score);

        let title = format!("{software_type} {software_name} | CVSS = {score} | {constraint}");
        let body = format!(
            "According to [Wordfence]({WORDFENCE_THREAT_INTEL_URL}), {software_type} {software_name} \
             has a {score} CVSS security vulnerability\n\n\
             I'm bumping versions to {constraint}\n\n\
             References: {}",
            entry.references.join(" , ")
        );
        Self { title, body }
    }

    pub fn commit_message(&self) -> &str {
        &self.title
    }
}

fn format_score(score: Option<f64>) -> String {
    score.map_or_else(|| UNKNOWN_SCORE.to_string(), |s| s.to_string())
}
