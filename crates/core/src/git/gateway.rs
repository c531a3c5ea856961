//! The repository operations the orchestrator depends on.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::errors::GitHubError;
use crate::git::github::{GitHubClient, PullRequest, RepoRef};

/// Remote repository surface used to read the manifest and publish changes.
///
/// Every method is a single remote round trip (or a short fixed sequence) and
/// reports failure instead of retrying.
#[async_trait]
pub trait RepositoryGateway: Send + Sync {
    /// Current content of `path` on the default branch.
    async fn get_file_content(&self, path: &str) -> Result<Vec<u8>, GitHubError>;

    /// Blob SHA of `path` on `branch`.
    async fn get_file_sha(&self, path: &str, branch: &str) -> Result<String, GitHubError>;

    /// Create branch `name` at the head of `from_branch`. Fails if it exists.
    async fn create_branch(&self, name: &str, from_branch: &str) -> Result<(), GitHubError>;

    async fn update_file_content(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
        old_sha: &str,
        branch: &str,
    ) -> Result<(), GitHubError>;

    /// Open a pull request from `head` into `base`.
    async fn create_pull_request(
        &self,
        base: &str,
        head: &str,
        title: &str,
        body: &str,
    ) -> Result<PullRequest, GitHubError>;
}

/// [`RepositoryGateway`] backed by the GitHub REST API.
///
/// Without a fork every call goes to `upstream`. With a fork, branches and
/// commits are written to the fork and the pull request is opened on
/// `upstream` from `fork_owner:branch`.
#[derive(Clone)]
pub struct GitHubGateway {
    client: GitHubClient,
    upstream: RepoRef,
    fork: Option<RepoRef>,
    default_branch: String,
}

impl GitHubGateway {
    pub fn new(
        client: GitHubClient,
        upstream: RepoRef,
        fork: Option<RepoRef>,
        default_branch: impl Into<String>,
    ) -> Self {
        let default_branch = default_branch.into();
        info!(
            upstream = %upstream,
            fork = ?fork.as_ref().map(RepoRef::full_name),
            default_branch = %default_branch,
            "created GitHubGateway"
        );
        Self {
            client,
            upstream,
            fork,
            default_branch,
        }
    }

    /// The repository branches and commits are written to.
    pub fn write_repo(&self) -> &RepoRef {
        self.fork.as_ref().unwrap_or(&self.upstream)
    }

    /// The `head` value for a pull request from `branch`.
    pub fn pull_request_head(&self, branch: &str) -> String {
        match &self.fork {
            Some(fork) => format!("{}:{}", fork.owner, branch),
            None => branch.to_string(),
        }
    }
}

#[async_trait]
impl RepositoryGateway for GitHubGateway {
    async fn get_file_content(&self, path: &str) -> Result<Vec<u8>, GitHubError> {
        self.client
            .get_file_content(&self.upstream, path, Some(&self.default_branch))
            .await
    }

    async fn get_file_sha(&self, path: &str, branch: &str) -> Result<String, GitHubError> {
        self.client.get_file_sha(self.write_repo(), path, branch).await
    }

    async fn create_branch(&self, name: &str, from_branch: &str) -> Result<(), GitHubError> {
        let repo = self.write_repo();
        let head = self.client.get_branch_sha(repo, from_branch).await?;
        debug!(branch = name, from = from_branch, sha = %head, "branching");
        self.client.create_branch(repo, name, &head).await
    }

    async fn update_file_content(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
        old_sha: &str,
        branch: &str,
    ) -> Result<(), GitHubError> {
        self.client
            .update_file_content(self.write_repo(), path, content, message, old_sha, branch)
            .await
    }

    async fn create_pull_request(
        &self,
        base: &str,
        head: &str,
        title: &str,
        body: &str,
    ) -> Result<PullRequest, GitHubError> {
        let head = self.pull_request_head(head);
        self.client
            .create_pull_request(&self.upstream, title, body, &head, base)
            .await
    }
}
