//! Where the vulnerability feed comes from.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::errors::FeedError;
use crate::feed::model::Feed;

/// Public Wordfence Intelligence v2 endpoints.
pub const WORDFENCE_PRODUCTION_FEED_URL: &str =
    "https://www.wordfence.com/api/intelligence/v2/vulnerabilities/production/";
pub const WORDFENCE_SCANNER_FEED_URL: &str =
    "https://www.wordfence.com/api/intelligence/v2/vulnerabilities/scanner/";

/// Which Wordfence feed to read.
///
/// The production feed carries CVSS scores and references; the scanner feed
/// is the short form with only software and version ranges.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    #[default]
    Production,
    Scanner,
}

impl FeedKind {
    pub fn default_url(self) -> &'static str {
        match self {
            Self::Production => WORDFENCE_PRODUCTION_FEED_URL,
            Self::Scanner => WORDFENCE_SCANNER_FEED_URL,
        }
    }

    /// Parse a kind name. Returns `None` for unknown names.
    pub fn from_str_val(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" => Some(Self::Production),
            "scanner" => Some(Self::Scanner),
            _ => None,
        }
    }
}

impl std::fmt::Display for FeedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Scanner => write!(f, "scanner"),
        }
    }
}

/// Anything that can produce a decoded vulnerability feed.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Human-readable origin, used in logs.
    fn describe(&self) -> String;

    /// Fetch and decode the whole feed. No partial feed is ever returned.
    async fn fetch_feed(&self) -> Result<Feed, FeedError>;
}

#[async_trait]
impl<T: FeedSource + ?Sized> FeedSource for Box<T> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    async fn fetch_feed(&self) -> Result<Feed, FeedError> {
        (**self).fetch_feed().await
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Wordfence Intelligence HTTP feed client.
#[derive(Clone)]
pub struct WordfenceClient {
    http: reqwest::Client,
    url: String,
}

impl WordfenceClient {
    /// Client for one of the public feeds.
    pub fn new(kind: FeedKind) -> Self {
        Self::with_url(kind.default_url())
    }

    /// Client for an arbitrary feed URL (mirrors, tests).
    pub fn with_url(url: impl Into<String>) -> Self {
        let url = url.into();
        info!(url = %url, "created WordfenceClient");
        Self {
            http: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl FeedSource for WordfenceClient {
    fn describe(&self) -> String {
        self.url.clone()
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch_feed(&self) -> Result<Feed, FeedError> {
        let resp = self.http.get(&self.url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FeedError::BadStatus {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }
        let body = resp.bytes().await?;
        info!(bytes = body.len(), "fetched vulnerability feed");
        Feed::from_slice(&body)
    }
}

// ---------------------------------------------------------------------------
// Local file
// ---------------------------------------------------------------------------

/// Reads a feed previously saved to disk.
#[derive(Debug, Clone)]
pub struct FileFeedSource {
    path: PathBuf,
}

impl FileFeedSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FeedSource for FileFeedSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn fetch_feed(&self) -> Result<Feed, FeedError> {
        let body = tokio::fs::read(&self.path)
            .await
            .map_err(|source| FeedError::IoError {
                path: self.path.display().to_string(),
                source,
            })?;
        info!(bytes = body.len(), "read vulnerability feed from file");
        Feed::from_slice(&body)
    }
}
