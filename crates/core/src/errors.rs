//! Error types for the wpadvisory-sync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    GitHub(#[from] GitHubError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Writing plan output failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Feed errors
// ---------------------------------------------------------------------------

/// Errors from fetching or decoding the vulnerability feed.
///
/// Any of these aborts the run before a single entry is processed.
#[derive(Debug, Error)]
pub enum FeedError {
    /// HTTP-level transport error (network, TLS, etc.).
    #[error("feed HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The feed endpoint answered with a non-success status.
    #[error("feed request to {url} failed with HTTP {status}")]
    BadStatus {
        url: String,
        status: u16,
    },

    /// The feed body is not JSON, or not a JSON object/array of records.
    #[error("feed decode error: {0}")]
    DecodeError(String),

    /// Reading a local feed file failed.
    #[error("feed I/O error at '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A single feed record that could not be normalized into a
/// [`crate::feed::FeedEntry`]. Not fatal: the record is skipped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed feed record '{record}': {detail}")]
pub struct NormalizationError {
    /// Map key or array index identifying the record in the raw feed.
    pub record: String,
    pub detail: String,
}

/// A version bound that is not a concrete composer version.
///
/// Local to one affected range: that range is skipped, its siblings are not.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("'{version}' is not a valid composer version")]
pub struct ValidationError {
    pub version: String,
}

// ---------------------------------------------------------------------------
// Manifest errors
// ---------------------------------------------------------------------------

/// Errors from parsing or serializing `composer.json`.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest is not valid JSON.
    #[error("composer manifest parse error: {0}")]
    ParseError(#[from] serde_json::Error),

    /// The manifest is valid JSON but not an object.
    #[error("composer manifest must be a JSON object")]
    NotAnObject,

    /// The `conflict` member exists but is not an object of strings.
    #[error("composer manifest 'conflict' section is invalid: {0}")]
    InvalidConflictSection(String),

    /// The manifest bytes are not UTF-8.
    #[error("composer manifest is not valid UTF-8")]
    InvalidEncoding,
}

// ---------------------------------------------------------------------------
// GitHub API errors
// ---------------------------------------------------------------------------

/// Errors from GitHub REST API interactions.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// HTTP-level transport error (network, TLS, etc.).
    #[error("GitHub HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The API returned a non-success status code.
    #[error("GitHub API error (HTTP {status}): {body}")]
    ApiError {
        status: u16,
        body: String,
    },

    /// Authentication token is missing or invalid.
    #[error("GitHub authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Rate limit exceeded.
    #[error("GitHub rate limit exceeded, resets at {reset_at}")]
    RateLimited {
        reset_at: String,
    },

    /// The requested file, branch or ref does not exist.
    #[error("GitHub resource not found: {0}")]
    NotFound(String),

    /// Creating a ref failed because it already exists.
    #[error("branch '{0}' already exists")]
    BranchExists(String),

    /// The file SHA sent with an update no longer matches the remote file.
    #[error("stale SHA for '{path}': the file changed on the remote")]
    StaleSha {
        path: String,
    },

    /// The response body did not have the expected shape.
    #[error("GitHub response parse error: {0}")]
    ParseError(String),
}

// ---------------------------------------------------------------------------
// Publish errors
// ---------------------------------------------------------------------------

/// A failed step of the per-entry publish sequence.
///
/// Caught at the entry level: the entry is marked failed and the run goes on.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("creating branch '{branch}' failed: {source}")]
    CreateBranch {
        branch: String,
        #[source]
        source: GitHubError,
    },

    #[error("reading SHA of '{path}' failed: {source}")]
    FileSha {
        path: String,
        #[source]
        source: GitHubError,
    },

    #[error("updating '{path}' on branch '{branch}' failed: {source}")]
    UpdateFile {
        path: String,
        branch: String,
        #[source]
        source: GitHubError,
    },

    #[error("opening pull request for branch '{branch}' failed: {source}")]
    PullRequest {
        branch: String,
        #[source]
        source: GitHubError,
    },

    #[error("serializing the updated manifest failed: {0}")]
    Serialize(#[from] ManifestError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A required environment variable is not set.
    #[error("required environment variable '{var}' is not set (referenced by config field '{field}')")]
    EnvVarMissing {
        var: String,
        field: String,
    },

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue {
        field: String,
        detail: String,
    },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
