//! GitHub client, gateway and Wordfence client against a mock HTTP server.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wpadvisory_sync_core::errors::{FeedError, GitHubError};
use wpadvisory_sync_core::feed::{FeedSource, WordfenceClient};
use wpadvisory_sync_core::git::{GitHubClient, GitHubGateway, RepoRef, RepositoryGateway};

fn gateway(server: &MockServer, fork: Option<RepoRef>) -> GitHubGateway {
    let client = GitHubClient::new(server.uri(), "ghp_test").unwrap();
    GitHubGateway::new(client, RepoRef::new("acme", "site"), fork, "master")
}

/// Base64 the way the contents API returns it: wrapped at 60 columns.
fn wrapped_base64(content: &str) -> String {
    let encoded = BASE64.encode(content);
    encoded
        .as_bytes()
        .chunks(60)
        .map(|chunk| std::str::from_utf8(chunk).unwrap())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Reading ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_file_content_decodes_wrapped_base64() {
    let server = MockServer::start().await;
    let manifest = format!("{{\n    \"description\": \"{}\"\n}}\n", "x".repeat(120));
    Mock::given(method("GET"))
        .and(path("/repos/acme/site/contents/composer.json"))
        .and(query_param("ref", "master"))
        .and(header("authorization", "Bearer ghp_test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sha": "blob1",
            "encoding": "base64",
            "content": wrapped_base64(&manifest),
        })))
        .expect(1)
        .mount(&server)
        .await;

    let bytes = gateway(&server, None)
        .get_file_content("composer.json")
        .await
        .unwrap();
    assert_eq!(String::from_utf8(bytes).unwrap(), manifest);
}

#[tokio::test]
async fn test_get_file_sha_reads_the_write_repo() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/bot/site-fork/contents/composer.json"))
        .and(query_param("ref", "master"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sha": "forkblob",
            "encoding": "base64",
            "content": "",
        })))
        .mount(&server)
        .await;

    let sha = gateway(&server, Some(RepoRef::new("bot", "site-fork")))
        .get_file_sha("composer.json", "master")
        .await
        .unwrap();
    assert_eq!(sha, "forkblob");
}

#[tokio::test]
async fn test_missing_file_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/site/contents/composer.json"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Not Found" })))
        .mount(&server)
        .await;

    let err = gateway(&server, None)
        .get_file_content("composer.json")
        .await
        .unwrap_err();
    assert!(matches!(err, GitHubError::NotFound(ref p) if p == "composer.json"));
}

// ── Branches ────────────────────────────────────────────────────

#[tokio::test]
async fn test_create_branch_from_default_head() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/site/git/ref/heads/master"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ref": "refs/heads/master",
            "object": { "sha": "head123", "type": "commit" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/site/git/refs"))
        .and(body_json(json!({ "ref": "refs/heads/v1", "sha": "head123" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "ref": "refs/heads/v1" })))
        .expect(1)
        .mount(&server)
        .await;

    gateway(&server, None)
        .create_branch("v1", "master")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_create_existing_branch_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/site/git/ref/heads/master"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": { "sha": "head123" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/site/git/refs"))
        .respond_with(
            ResponseTemplate::new(422)
                .set_body_json(json!({ "message": "Reference already exists" })),
        )
        .mount(&server)
        .await;

    let err = gateway(&server, None)
        .create_branch("v1", "master")
        .await
        .unwrap_err();
    assert!(matches!(err, GitHubError::BranchExists(ref b) if b == "v1"));
}

// ── File updates ────────────────────────────────────────────────

#[tokio::test]
async fn test_update_file_sends_base64_content_and_sha() {
    let server = MockServer::start().await;
    let content = "{\n    \"conflict\": {}\n}\n";
    Mock::given(method("PUT"))
        .and(path("/repos/acme/site/contents/composer.json"))
        .and(body_partial_json(json!({
            "message": "plugin x | CVSS = 5 | <1.0",
            "content": BASE64.encode(content),
            "sha": "blob1",
            "branch": "v1",
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "content": { "sha": "blob2" } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    gateway(&server, None)
        .update_file_content(
            "composer.json",
            content.as_bytes(),
            "plugin x | CVSS = 5 | <1.0",
            "blob1",
            "v1",
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_stale_sha_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/repos/acme/site/contents/composer.json"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "message": "composer.json does not match blob1"
        })))
        .mount(&server)
        .await;

    let err = gateway(&server, None)
        .update_file_content("composer.json", b"{}", "m", "blob1", "v1")
        .await
        .unwrap_err();
    assert!(matches!(err, GitHubError::StaleSha { ref path } if path == "composer.json"));
}

// ── Pull requests ───────────────────────────────────────────────

#[tokio::test]
async fn test_fork_pull_request_is_opened_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/site/pulls"))
        .and(body_json(json!({
            "title": "t",
            "body": "b",
            "head": "bot:v1",
            "base": "master",
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "number": 42,
            "title": "t",
            "html_url": "https://github.com/acme/site/pull/42",
            "state": "open",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let pr = gateway(&server, Some(RepoRef::new("bot", "site")))
        .create_pull_request("master", "v1", "t", "b")
        .await
        .unwrap();
    assert_eq!(pr.number, 42);
    assert_eq!(pr.html_url, "https://github.com/acme/site/pull/42");
}

#[tokio::test]
async fn test_validation_failure_carries_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/site/pulls"))
        .respond_with(
            ResponseTemplate::new(422).set_body_string("No commits between master and v1"),
        )
        .mount(&server)
        .await;

    let err = gateway(&server, None)
        .create_pull_request("master", "v1", "t", "b")
        .await
        .unwrap_err();
    match err {
        GitHubError::ApiError { status, body } => {
            assert_eq!(status, 422);
            assert!(body.contains("No commits"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

// ── Status mapping ──────────────────────────────────────────────

#[tokio::test]
async fn test_auth_and_rate_limit_statuses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/site/git/ref/heads/locked"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/site/git/ref/heads/throttled"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset", "1700000000"),
        )
        .mount(&server)
        .await;

    let gw = gateway(&server, None);
    let err = gw.create_branch("v1", "locked").await.unwrap_err();
    assert!(matches!(err, GitHubError::AuthenticationFailed(_)));

    let err = gw.create_branch("v1", "throttled").await.unwrap_err();
    assert!(matches!(err, GitHubError::RateLimited { ref reset_at } if reset_at == "1700000000"));
}

// ── Wordfence feed ──────────────────────────────────────────────

#[tokio::test]
async fn test_wordfence_client_fetches_and_decodes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/production/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "abc": {
                "id": "abc",
                "software": [{
                    "type": "theme",
                    "name": "Twenty",
                    "slug": "twenty",
                    "affected_versions": {
                        "* - 1.2": { "from_version": "*", "to_version": "1.2", "to_inclusive": true }
                    }
                }]
            },
            "broken": { "id": "broken", "software": [{ "type": "plugin" }] }
        })))
        .mount(&server)
        .await;

    let client = WordfenceClient::with_url(format!("{}/production/", server.uri()));
    let feed = client.fetch_feed().await.unwrap();
    assert_eq!(feed.entries.len(), 2);
    assert_eq!(feed.entries[0].branch_name(), "abc");
    assert!(feed.entries[1].software.is_empty());
    assert_eq!(feed.rejected.len(), 1);
    assert_eq!(feed.rejected[0].record, "broken");
}

#[tokio::test]
async fn test_wordfence_server_error_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = WordfenceClient::with_url(server.uri());
    let err = client.fetch_feed().await.unwrap_err();
    assert!(matches!(err, FeedError::BadStatus { status: 503, .. }));
}
