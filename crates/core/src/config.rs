//! Configuration for wpadvisory-sync.
//!
//! Loaded either from a TOML file or entirely from the environment (the way
//! the CI job runs it). Secrets are never stored in the file: the token is
//! referenced by the name of the environment variable holding it and resolved
//! at runtime via [`AppConfig::resolve_env_vars`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;
use crate::feed::FeedKind;
use crate::git::RepoRef;

/// Environment variables read by [`AppConfig::from_env`].
pub mod env {
    pub const TOKEN: &str = "BOT_PERSONAL_ACCESS_TOKEN";
    pub const REPO_OWNER: &str = "REPO_OWNER";
    pub const REPO_NAME: &str = "REPO_NAME";
    pub const FORK_OWNER: &str = "FORK_OWNER";
    pub const FORK_NAME: &str = "FORK_NAME";
    pub const PAUSE_SECS: &str = "API_PAUSE_BETWEEN_ACTIONS_SECONDS";
    pub const ENABLED: &str = "IS_ENABLED";
    pub const DEFAULT_BRANCH: &str = "DEFAULT_BRANCH";
    pub const FEED: &str = "WORDFENCE_FEED";
    pub const FEED_FILE: &str = "WORDFENCE_FEED_FILE";
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Target repository and API settings.
    pub github: GitHubConfig,

    /// Vulnerability feed settings.
    #[serde(default)]
    pub feed: FeedConfig,

    /// Run behaviour.
    #[serde(default)]
    pub run: RunConfig,
}

// ---------------------------------------------------------------------------
// GitHub
// ---------------------------------------------------------------------------

/// The repository whose `composer.json` is kept up to date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API base URL (default `https://api.github.com`).
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    /// Owner of the target repository.
    pub owner: String,

    /// Name of the target repository.
    pub repo: String,

    /// Environment variable holding the access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Branch pull requests are opened against.
    #[serde(default = "default_branch")]
    pub default_branch: String,

    /// Path of the manifest inside the repository.
    #[serde(default = "default_manifest_path")]
    pub manifest_path: String,

    /// Fork to push branches to. When set, pull requests are opened from
    /// `fork_owner:branch` against the target repository.
    #[serde(default)]
    pub fork_owner: Option<String>,

    #[serde(default)]
    pub fork_repo: Option<String>,

    /// Resolved token (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub token: Option<String>,
}

impl GitHubConfig {
    /// The repository pull requests target.
    pub fn upstream(&self) -> RepoRef {
        RepoRef::new(&self.owner, &self.repo)
    }

    /// The fork branches are pushed to, if cross-fork publishing is enabled.
    pub fn fork(&self) -> Option<RepoRef> {
        match (self.fork_owner.as_deref(), self.fork_repo.as_deref()) {
            (Some(owner), Some(repo)) => Some(RepoRef::new(owner, repo)),
            _ => None,
        }
    }
}

fn default_github_api_url() -> String {
    "https://api.github.com".into()
}

fn default_token_env() -> String {
    env::TOKEN.into()
}

fn default_branch() -> String {
    "master".into()
}

fn default_manifest_path() -> String {
    "composer.json".into()
}

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

/// Where the vulnerability feed is read from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Which Wordfence feed to use.
    #[serde(default)]
    pub kind: FeedKind,

    /// Override the feed URL (mirrors, proxies).
    #[serde(default)]
    pub url: Option<String>,

    /// Read the feed from a local JSON file instead of over HTTP.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl FeedConfig {
    /// The URL the feed is fetched from when no file is configured.
    pub fn effective_url(&self) -> &str {
        self.url.as_deref().unwrap_or_else(|| self.kind.default_url())
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Run behaviour options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Seconds to wait after each feed entry (API throttling).
    #[serde(default = "default_pause_secs")]
    pub pause_secs: u64,

    /// When false, a run does nothing and exits successfully.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl RunConfig {
    pub fn pause(&self) -> Duration {
        Duration::from_secs(self.pause_secs)
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            pause_secs: default_pause_secs(),
            enabled: true,
            log_level: default_log_level(),
        }
    }
}

fn default_pause_secs() -> u64 {
    1
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".into()
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Build the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_env_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let require = |name: &str, field: &str| {
            get(name).ok_or_else(|| ConfigError::EnvVarMissing {
                var: name.into(),
                field: field.into(),
            })
        };

        let pause_secs = match get(env::PAUSE_SECS) {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                field: "run.pause_secs".into(),
                detail: format!(
                    "{} must be a whole number of seconds, got '{raw}'",
                    env::PAUSE_SECS
                ),
            })?,
            None => default_pause_secs(),
        };

        let enabled = match get(env::ENABLED) {
            Some(raw) => parse_flag(&raw).ok_or_else(|| ConfigError::InvalidValue {
                field: "run.enabled".into(),
                detail: format!("{} must be 0/1 or true/false, got '{raw}'", env::ENABLED),
            })?,
            None => true,
        };

        let kind = match get(env::FEED) {
            Some(raw) => FeedKind::from_str_val(&raw).ok_or_else(|| ConfigError::InvalidValue {
                field: "feed.kind".into(),
                detail: format!("unknown feed '{raw}', expected 'production' or 'scanner'"),
            })?,
            None => FeedKind::default(),
        };

        let mut config = AppConfig {
            github: GitHubConfig {
                api_url: default_github_api_url(),
                owner: require(env::REPO_OWNER, "github.owner")?,
                repo: require(env::REPO_NAME, "github.repo")?,
                token_env: default_token_env(),
                default_branch: get(env::DEFAULT_BRANCH).unwrap_or_else(default_branch),
                manifest_path: default_manifest_path(),
                fork_owner: get(env::FORK_OWNER),
                fork_repo: get(env::FORK_NAME),
                token: None,
            },
            feed: FeedConfig {
                kind,
                url: None,
                file: get(env::FEED_FILE).map(PathBuf::from),
            },
            run: RunConfig {
                pause_secs,
                enabled,
                log_level: default_log_level(),
            },
        };
        config.github.token = get(&config.github.token_env);
        debug!("configuration built from environment");
        Ok(config)
    }

    /// Resolve all `*_env` fields from environment variables.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        info!("resolving environment variable references in config");
        self.github.token = resolve_optional_env(&self.github.token_env, "github.token_env");
        Ok(())
    }

    /// The resolved access token, or an error naming the variable to set.
    pub fn require_token(&self) -> Result<&str, ConfigError> {
        self.github
            .token
            .as_deref()
            .ok_or_else(|| ConfigError::EnvVarMissing {
                var: self.github.token_env.clone(),
                field: "github.token_env".into(),
            })
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, detail: &str| ConfigError::InvalidValue {
            field: field.into(),
            detail: detail.into(),
        };

        if self.github.owner.trim().is_empty() || self.github.owner.contains('/') {
            return Err(invalid("github.owner", "owner must be a non-empty name without '/'"));
        }
        if self.github.repo.trim().is_empty() || self.github.repo.contains('/') {
            return Err(invalid("github.repo", "repo must be a non-empty name without '/'"));
        }
        let api_url = &self.github.api_url;
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            return Err(invalid("github.api_url", "API URL must be http(s)"));
        }
        if self.github.default_branch.trim().is_empty() {
            return Err(invalid("github.default_branch", "default branch must not be empty"));
        }
        if self.github.manifest_path.trim().is_empty() {
            return Err(invalid("github.manifest_path", "manifest path must not be empty"));
        }
        if self.github.fork_owner.is_some() != self.github.fork_repo.is_some() {
            return Err(invalid(
                "github.fork_owner",
                "fork_owner and fork_repo must be set together",
            ));
        }
        if let Some(url) = &self.feed.url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(invalid("feed.url", "feed URL must be http(s)"));
            }
        }
        if !LOG_LEVELS.contains(&self.run.log_level.as_str()) {
            return Err(invalid(
                "run.log_level",
                "expected one of trace, debug, info, warn, error",
            ));
        }
        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Generate a default TOML config template string.
    pub fn default_template() -> &'static str {
        r#"# wpadvisory-sync configuration

[github]
api_url = "https://api.github.com"
owner = "your-org"
repo = "your-site"
token_env = "BOT_PERSONAL_ACCESS_TOKEN"
default_branch = "master"
manifest_path = "composer.json"
# fork_owner = "your-bot"   # push branches to a fork and open PRs from it
# fork_repo = "your-site"

[feed]
kind = "production"          # or "scanner"
# url = "https://mirror.example.com/wordfence/production.json"
# file = "./Production_Feed.json"

[run]
pause_secs = 1
enabled = true
log_level = "info"
"#
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Try to read an environment variable by name.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn sample_toml() -> &'static str {
        r#"
[github]
owner = "acme"
repo = "site"
token_env = "TEST_WPADVISORY_TOKEN"
default_branch = "main"
fork_owner = "acme-bot"
fork_repo = "site"

[feed]
kind = "scanner"

[run]
pause_secs = 5
log_level = "debug"
"#
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_parse_full_config() {
        let config: AppConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.github.upstream().full_name(), "acme/site");
        assert_eq!(config.github.fork().unwrap().full_name(), "acme-bot/site");
        assert_eq!(config.github.default_branch, "main");
        assert_eq!(config.feed.kind, FeedKind::Scanner);
        assert_eq!(config.run.pause(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let minimal = r#"
[github]
owner = "acme"
repo = "site"
"#;
        let config: AppConfig = toml::from_str(minimal).unwrap();
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.github.token_env, "BOT_PERSONAL_ACCESS_TOKEN");
        assert_eq!(config.github.default_branch, "master");
        assert_eq!(config.github.manifest_path, "composer.json");
        assert!(config.github.fork().is_none());
        assert_eq!(config.feed.kind, FeedKind::Production);
        assert!(config.feed.effective_url().ends_with("/production/"));
        assert_eq!(config.run.pause_secs, 1);
        assert!(config.run.enabled);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wpadvisory-sync.toml");
        std::fs::write(&path, sample_toml()).unwrap();

        let config = AppConfig::load_from_file(&path).expect("load failed");
        assert_eq!(config.run.log_level, "debug");
    }

    #[test]
    fn test_file_not_found() {
        let result = AppConfig::load_from_file("/nonexistent/wpadvisory-sync.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_validate_rejects_half_configured_fork() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.github.fork_repo = None;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "github.fork_owner"
        ));
    }

    #[test]
    fn test_validate_rejects_slash_in_repo() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.github.repo = "acme/site".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "github.repo"
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_log_level() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.run.log_level = "loud".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_env_vars_and_require_token() {
        std::env::set_var("TEST_WPADVISORY_TOKEN", "ghp_abc");
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.resolve_env_vars().unwrap();
        assert_eq!(config.require_token().unwrap(), "ghp_abc");
        std::env::remove_var("TEST_WPADVISORY_TOKEN");

        config.github.token = None;
        assert!(matches!(
            config.require_token(),
            Err(ConfigError::EnvVarMissing { ref var, .. }) if var == "TEST_WPADVISORY_TOKEN"
        ));
    }

    #[test]
    fn test_from_env() {
        let config = AppConfig::from_env_with(lookup(&[
            ("BOT_PERSONAL_ACCESS_TOKEN", "ghp_env"),
            ("REPO_OWNER", "acme"),
            ("REPO_NAME", "site"),
            ("FORK_OWNER", "bot"),
            ("FORK_NAME", "site-fork"),
            ("API_PAUSE_BETWEEN_ACTIONS_SECONDS", "3"),
            ("IS_ENABLED", "0"),
            ("WORDFENCE_FEED", "scanner"),
        ]))
        .unwrap();
        assert_eq!(config.github.token.as_deref(), Some("ghp_env"));
        assert_eq!(config.github.fork().unwrap().full_name(), "bot/site-fork");
        assert_eq!(config.run.pause_secs, 3);
        assert!(!config.run.enabled);
        assert_eq!(config.feed.kind, FeedKind::Scanner);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_env_requires_repo() {
        let result = AppConfig::from_env_with(lookup(&[("REPO_OWNER", "acme")]));
        assert!(matches!(
            result,
            Err(ConfigError::EnvVarMissing { ref var, .. }) if var == "REPO_NAME"
        ));
    }

    #[test]
    fn test_from_env_rejects_bad_pause() {
        let result = AppConfig::from_env_with(lookup(&[
            ("REPO_OWNER", "acme"),
            ("REPO_NAME", "site"),
            ("API_PAUSE_BETWEEN_ACTIONS_SECONDS", "soon"),
        ]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_default_template_is_valid() {
        let config: AppConfig = toml::from_str(AppConfig::default_template())
            .expect("default template should be valid TOML");
        assert!(config.validate().is_ok());
    }
}
