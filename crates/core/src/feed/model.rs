//! Typed vulnerability feed records.
//!
//! The raw Wordfence feed is loosely shaped: entries may come as a JSON
//! object keyed by vulnerability id or as an array, `affected_versions` may be
//! keyed by a human-readable range label or be a plain list, and most fields
//! are optional. Everything is decoded here, once, into [`FeedEntry`] so the
//! rest of the crate never looks at raw JSON.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::errors::{FeedError, NormalizationError};

// ---------------------------------------------------------------------------
// Software type
// ---------------------------------------------------------------------------

/// Kind of WordPress software a vulnerability affects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SoftwareType {
    Plugin,
    Theme,
    Core,
    /// Any type string the feed uses that we have no package mapping for.
    Unsupported,
}

impl SoftwareType {
    /// Parse a feed type string. Unknown values map to `Unsupported`.
    pub fn from_str_val(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "plugin" => Self::Plugin,
            "theme" => Self::Theme,
            "core" => Self::Core,
            _ => Self::Unsupported,
        }
    }
}

impl std::fmt::Display for SoftwareType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plugin => write!(f, "plugin"),
            Self::Theme => write!(f, "theme"),
            Self::Core => write!(f, "core"),
            Self::Unsupported => write!(f, "unsupported"),
        }
    }
}

// ---------------------------------------------------------------------------
// Normalized records
// ---------------------------------------------------------------------------

/// One affected version range of a software record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AffectedVersionRange {
    /// Lower bound, or `"*"` when the range is open below.
    pub from_version: String,
    pub from_inclusive: bool,
    /// Upper bound. Ranges without one cannot be expressed as a conflict.
    pub to_version: Option<String>,
    pub to_inclusive: bool,
}

impl Default for AffectedVersionRange {
    fn default() -> Self {
        Self {
            from_version: "*".into(),
            from_inclusive: false,
            to_version: None,
            to_inclusive: false,
        }
    }
}

/// One affected package within a feed entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SoftwareRecord {
    #[serde(rename = "type")]
    pub software_type: SoftwareType,
    pub name: String,
    pub slug: String,
    pub affected_versions: Vec<AffectedVersionRange>,
}

/// One vulnerability record from the feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedEntry {
    pub id: Option<String>,
    pub title: Option<String>,
    pub software: Vec<SoftwareRecord>,
    pub cvss_score: Option<f64>,
    pub references: Vec<String>,
}

impl FeedEntry {
    /// Stable identifier used as the publish branch name.
    ///
    /// The feed id when present, otherwise [`FeedEntry::content_hash`].
    pub fn branch_name(&self) -> String {
        match self.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self.content_hash(),
        }
    }

    /// Hex SHA-256 of the JSON-encoded software list.
    pub fn content_hash(&self) -> String {
        // Serializing plain structs of strings, bools and enums cannot fail.
        let encoded = serde_json::to_vec(&self.software).unwrap_or_default();
        hex::encode(Sha256::digest(&encoded))
    }

    /// The first software record, which names the entry in commit messages.
    pub fn primary_software(&self) -> Option<&SoftwareRecord> {
        self.software.first()
    }
}

// ---------------------------------------------------------------------------
// Raw wire shapes
// ---------------------------------------------------------------------------

/// A JSON collection that may be either an array or an object keyed by label.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Collection<T> {
    List(Vec<T>),
    Keyed(IndexMap<String, T>),
}

impl<T> Collection<T> {
    /// Items paired with a label: the object key, or the array index.
    fn into_labeled(self) -> Vec<(String, T)> {
        match self {
            Self::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (i.to_string(), item))
                .collect(),
            Self::Keyed(map) => map.into_iter().collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    software: Option<Vec<RawSoftware>>,
    #[serde(default)]
    cvss: Option<RawCvss>,
    #[serde(default)]
    references: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawCvss {
    #[serde(default)]
    score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawSoftware {
    #[serde(rename = "type", default)]
    software_type: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    affected_versions: Option<Collection<RawRange>>,
}

#[derive(Debug, Deserialize)]
struct RawRange {
    #[serde(default)]
    from_version: Option<String>,
    #[serde(default)]
    from_inclusive: Option<bool>,
    #[serde(default)]
    to_version: Option<String>,
    #[serde(default)]
    to_inclusive: Option<bool>,
}

impl From<RawRange> for AffectedVersionRange {
    fn from(raw: RawRange) -> Self {
        let from_version = raw
            .from_version
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "*".into());
        Self {
            from_version,
            from_inclusive: raw.from_inclusive.unwrap_or(false),
            to_version: raw.to_version.map(|v| v.trim().to_string()),
            to_inclusive: raw.to_inclusive.unwrap_or(false),
        }
    }
}

impl FeedEntry {
    /// Normalize one raw feed record.
    ///
    /// `record` identifies the record in the feed (object key or array
    /// index) for error reporting. Software records without a `type` or
    /// `slug` are dropped with a warning; the entry keeps its other records.
    pub fn from_value(
        record: &str,
        value: serde_json::Value,
    ) -> Result<Self, NormalizationError> {
        Self::decode(record, value).map(|(entry, _)| entry)
    }

    /// Like [`FeedEntry::from_value`], also returning the dropped software records.
    fn decode(
        record: &str,
        value: serde_json::Value,
    ) -> Result<(Self, Vec<NormalizationError>), NormalizationError> {
        let malformed = |detail: String| NormalizationError {
            record: record.to_string(),
            detail,
        };

        let raw: RawEntry =
            serde_json::from_value(value).map_err(|e| malformed(e.to_string()))?;

        let mut software = Vec::new();
        let mut dropped = Vec::new();
        for (index, raw_software) in raw.software.unwrap_or_default().into_iter().enumerate() {
            match SoftwareRecord::from_raw(raw_software) {
                Ok(record) => software.push(record),
                Err(missing) => {
                    let err = malformed(format!("software[{index}] has no '{missing}'"));
                    warn!(record = %err.record, detail = %err.detail, "skipping software record");
                    dropped.push(err);
                }
            }
        }

        let entry = Self {
            id: raw.id.filter(|id| !id.trim().is_empty()),
            title: raw.title,
            software,
            cvss_score: raw.cvss.and_then(|c| c.score),
            references: raw.references.unwrap_or_default(),
        };
        Ok((entry, dropped))
    }
}

impl SoftwareRecord {
    /// Normalize a raw software record, or name the missing required field.
    fn from_raw(raw: RawSoftware) -> Result<Self, &'static str> {
        let type_str = raw.software_type.ok_or("type")?;
        let slug = raw
            .slug
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or("slug")?;
        let name = raw
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| slug.clone());
        let affected_versions = raw
            .affected_versions
            .map(Collection::into_labeled)
            .unwrap_or_default()
            .into_iter()
            .map(|(_, range)| AffectedVersionRange::from(range))
            .collect();

        Ok(Self {
            software_type: SoftwareType::from_str_val(&type_str),
            name,
            slug,
            affected_versions,
        })
    }
}

// ---------------------------------------------------------------------------
// Whole feed
// ---------------------------------------------------------------------------

/// A decoded feed: the usable entries in feed order plus what was dropped.
#[derive(Debug, Clone, Default)]
pub struct Feed {
    pub entries: Vec<FeedEntry>,
    /// Undecodable entries and software records dropped from kept entries.
    pub rejected: Vec<NormalizationError>,
}

impl Feed {
    /// Decode a feed body.
    ///
    /// Fails only when the body as a whole is unusable; malformed entries and
    /// software records are collected in [`Feed::rejected`].
    pub fn from_slice(bytes: &[u8]) -> Result<Self, FeedError> {
        let records: Collection<serde_json::Value> = serde_json::from_slice(bytes)
            .map_err(|e| FeedError::DecodeError(e.to_string()))?;

        let mut feed = Feed::default();
        for (label, value) in records.into_labeled() {
            match FeedEntry::decode(&label, value) {
                Ok((entry, dropped)) => {
                    feed.entries.push(entry);
                    feed.rejected.extend(dropped);
                }
                Err(e) => {
                    warn!(record = %e.record, detail = %e.detail, "skipping malformed feed record");
                    feed.rejected.push(e);
                }
            }
        }

        debug!(
            entries = feed.entries.len(),
            rejected = feed.rejected.len(),
            "decoded vulnerability feed"
        );
        Ok(feed)
    }
}
