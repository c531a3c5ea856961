//! GitHub REST API client.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::errors::GitHubError;

/// An `owner/name` repository coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub state: String,
}

/// `GET /repos/{owner}/{repo}/contents/{path}` for a single file.
#[derive(Debug, Clone, Deserialize)]
struct ContentFile {
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

/// `GET /repos/{owner}/{repo}/git/ref/heads/{branch}`.
#[derive(Debug, Clone, Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Debug, Clone, Deserialize)]
struct GitObject {
    sha: String,
}

/// Asynchronous GitHub REST API client.
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Result<Self, GitHubError> {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        let token = token.into();
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("wpadvisory-sync/", env!("CARGO_PKG_VERSION"))),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        info!(api_url = %api_url, "created GitHubClient");
        Ok(Self {
            http,
            api_url,
            token,
        })
    }

    fn contents_url(&self, repo: &RepoRef, path: &str) -> String {
        format!(
            "{}/repos/{}/contents/{}",
            self.api_url,
            repo,
            path.trim_start_matches('/')
        )
    }

    async fn get_content_file(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<ContentFile, GitHubError> {
        let mut req = self
            .http
            .get(self.contents_url(repo, path))
            .bearer_auth(&self.token);
        if let Some(git_ref) = git_ref {
            req = req.query(&[("ref", git_ref)]);
        }
        let resp = req.send().await?;
        let resp = check_response(resp, path).await?;
        let file: ContentFile = resp.json().await?;
        Ok(file)
    }

    /// Raw bytes of a file. `git_ref` defaults to the repository's default branch.
    #[instrument(skip(self), fields(repo = %repo))]
    pub async fn get_file_content(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<Vec<u8>, GitHubError> {
        let file = self.get_content_file(repo, path, git_ref).await?;
        match file.encoding.as_deref() {
            Some("base64") => {}
            other => {
                return Err(GitHubError::ParseError(format!(
                    "unsupported content encoding {other:?} for '{path}'"
                )))
            }
        }
        // GitHub wraps the base64 payload at 60 columns.
        let encoded: String = file
            .content
            .unwrap_or_default()
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| GitHubError::ParseError(format!("invalid base64 for '{path}': {e}")))?;
        debug!(bytes = bytes.len(), sha = %file.sha, "fetched file content");
        Ok(bytes)
    }

    /// Blob SHA of a file on `branch`.
    #[instrument(skip(self), fields(repo = %repo))]
    pub async fn get_file_sha(
        &self,
        repo: &RepoRef,
        path: &str,
        branch: &str,
    ) -> Result<String, GitHubError> {
        let file = self.get_content_file(repo, path, Some(branch)).await?;
        debug!(sha = %file.sha, "fetched file sha");
        Ok(file.sha)
    }

    /// Head commit SHA of `branch`.
    #[instrument(skip(self), fields(repo = %repo))]
    pub async fn get_branch_sha(
        &self,
        repo: &RepoRef,
        branch: &str,
    ) -> Result<String, GitHubError> {
        let url = format!("{}/repos/{}/git/ref/heads/{}", self.api_url, repo, branch);
        let resp = self.http.get(&url).bearer_auth(&self.token).send().await?;
        let resp = check_response(resp, branch).await?;
        let git_ref: GitRef = resp.json().await?;
        debug!(sha = %git_ref.object.sha, "fetched branch head");
        Ok(git_ref.object.sha)
    }

    /// Create `refs/heads/{name}` pointing at `sha`.
    #[instrument(skip(self), fields(repo = %repo))]
    pub async fn create_branch(
        &self,
        repo: &RepoRef,
        name: &str,
        sha: &str,
    ) -> Result<(), GitHubError> {
        let url = format!("{}/repos/{}/git/refs", self.api_url, repo);
        let payload = serde_json::json!({ "ref": format!("refs/heads/{name}"), "sha": sha });
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?;
        if resp.status() == StatusCode::UNPROCESSABLE_ENTITY {
            let body = resp.text().await.unwrap_or_default();
            if body.contains("already exists") {
                return Err(GitHubError::BranchExists(name.to_string()));
            }
            return Err(GitHubError::ApiError { status: 422, body });
        }
        check_response(resp, name).await?;
        info!(branch = name, "created branch");
        Ok(())
    }

    /// Commit new content for an existing file on `branch`.
    ///
    /// `old_sha` must be the blob SHA the content replaces; GitHub answers
    /// 409 when it no longer matches.
    #[instrument(skip(self, content, message), fields(repo = %repo, bytes = content.len()))]
    pub async fn update_file_content(
        &self,
        repo: &RepoRef,
        path: &str,
        content: &[u8],
        message: &str,
        old_sha: &str,
        branch: &str,
    ) -> Result<(), GitHubError> {
        let payload = serde_json::json!({
            "message": message,
            "content": BASE64.encode(content),
            "sha": old_sha,
            "branch": branch,
        });
        let resp = self
            .http
            .put(self.contents_url(repo, path))
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?;
        if resp.status() == StatusCode::CONFLICT {
            return Err(GitHubError::StaleSha {
                path: path.to_string(),
            });
        }
        check_response(resp, path).await?;
        info!(path, branch, "updated file");
        Ok(())
    }

    #[instrument(skip(self, body), fields(repo = %repo))]
    pub async fn create_pull_request(
        &self,
        repo: &RepoRef,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequest, GitHubError> {
        let url = format!("{}/repos/{}/pulls", self.api_url, repo);
        let payload =
            serde_json::json!({ "title": title, "body": body, "head": head, "base": base });
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?;
        let resp = check_response(resp, head).await?;
        let pr: PullRequest = resp.json().await?;
        info!(number = pr.number, url = %pr.html_url, "created pull request");
        Ok(pr)
    }
}

/// Map non-success responses onto [`GitHubError`]. `subject` names the
/// resource for `NotFound`.
async fn check_response(resp: Response, subject: &str) -> Result<Response, GitHubError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let header = |name: &str| {
        resp.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let exhausted = header("x-ratelimit-remaining").as_deref() == Some("0");
    if status == StatusCode::TOO_MANY_REQUESTS || (status == StatusCode::FORBIDDEN && exhausted) {
        let reset_at = header("x-ratelimit-reset").unwrap_or_else(|| "unknown".into());
        return Err(GitHubError::RateLimited { reset_at });
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(GitHubError::AuthenticationFailed(format!("HTTP {}", status)));
    }
    if status == StatusCode::NOT_FOUND {
        return Err(GitHubError::NotFound(subject.to_string()));
    }
    let body = resp
        .text()
        .await
        .unwrap_or_else(|_| format!("HTTP {}", status));
    Err(GitHubError::ApiError {
        status: status.as_u16(),
        body,
    })
}
