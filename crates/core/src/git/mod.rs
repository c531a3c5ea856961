//! Remote repository access: the GitHub REST client and the gateway seam
//! the orchestrator publishes through.

pub mod gateway;
pub mod github;

pub use gateway::{GitHubGateway, RepositoryGateway};
pub use github::{GitHubClient, PullRequest, RepoRef};
