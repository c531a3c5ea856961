//! Change orchestrator: turns the feed into conflict-section pull requests.
//!
//! A run reads the manifest once, fetches the feed, and then walks the feed
//! entries strictly in order. Each entry is evaluated against the manifest as
//! it was read at the start of the run. An entry that changes it goes through
//!
//! `pending → changed → branch_created → file_updated → proposal_created → done`
//!
//! and lands in `failed` if any publish step errors. A failed entry never
//! stops the run. After every entry the orchestrator sleeps for the
//! configured pause to stay under the API rate limits.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::AppConfig;
use crate::conflict::{ComposerManifest, ConflictChange, ConflictMerger, EntryEvaluation};
use crate::errors::{CoreError, PublishError};
use crate::feed::{FeedEntry, FeedSource};
use crate::git::{PullRequest, RepositoryGateway};
use crate::proposal::Proposal;

// ---------------------------------------------------------------------------
// State & report types
// ---------------------------------------------------------------------------

/// Where a feed entry ended up.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Pending,
    /// Evaluated; nothing to change.
    NoOp,
    /// Evaluated; the manifest needs an update.
    Changed,
    BranchCreated,
    FileUpdated,
    ProposalCreated,
    Done,
    Failed,
}

impl std::fmt::Display for EntryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::NoOp => write!(f, "no_op"),
            Self::Changed => write!(f, "changed"),
            Self::BranchCreated => write!(f, "branch_created"),
            Self::FileUpdated => write!(f, "file_updated"),
            Self::ProposalCreated => write!(f, "proposal_created"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// What happened to one feed entry.
#[derive(Debug, Clone, Serialize)]
pub struct EntryOutcome {
    /// Entry id, which is also the branch name.
    pub id: String,
    pub title: Option<String>,
    pub state: EntryState,
    /// Constraints this entry added to the conflict section.
    pub changes: Vec<ConflictChange>,
    pub pull_request_url: Option<String>,
    /// Where a plan wrote the candidate manifest.
    pub written_to: Option<PathBuf>,
    pub error: Option<String>,
}

impl EntryOutcome {
    fn new(entry: &FeedEntry) -> Self {
        Self {
            id: entry.branch_name(),
            title: entry.title.clone(),
            state: EntryState::Pending,
            changes: Vec::new(),
            pull_request_url: None,
            written_to: None,
            error: None,
        }
    }

    /// Move to `to`, logging the transition.
    fn set_state(&mut self, to: EntryState) {
        debug!(entry = %self.id, from = %self.state, to = %to, "entry state transition");
        self.state = to;
    }
}

/// Summary of a run or plan.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// True when the run was switched off and nothing was done.
    pub disabled: bool,
    /// Feed records dropped as malformed.
    pub rejected_records: usize,
    pub entries: Vec<EntryOutcome>,
}

impl RunReport {
    fn start() -> Self {
        Self {
            started_at: Utc::now(),
            completed_at: None,
            disabled: false,
            rejected_records: 0,
            entries: Vec::new(),
        }
    }

    fn finish(mut self) -> Self {
        self.completed_at = Some(Utc::now());
        self
    }

    pub fn count(&self, state: EntryState) -> usize {
        self.entries.iter().filter(|e| e.state == state).count()
    }

    /// Entries that needed a manifest change, whatever became of them.
    pub fn changed(&self) -> impl Iterator<Item = &EntryOutcome> {
        self.entries
            .iter()
            .filter(|e| !matches!(e.state, EntryState::NoOp | EntryState::Pending))
    }

    pub fn failed(&self) -> impl Iterator<Item = &EntryOutcome> {
        self.entries.iter().filter(|e| e.state == EntryState::Failed)
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Run parameters that do not depend on the remote collaborators.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub default_branch: String,
    pub manifest_path: String,
    /// Delay after every processed entry.
    pub pause: Duration,
    pub enabled: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            default_branch: "master".into(),
            manifest_path: "composer.json".into(),
            pause: Duration::from_secs(1),
            enabled: true,
        }
    }
}

impl From<&AppConfig> for OrchestratorSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            default_branch: config.github.default_branch.clone(),
            manifest_path: config.github.manifest_path.clone(),
            pause: config.run.pause(),
            enabled: config.run.enabled,
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct ChangeOrchestrator<G, F> {
    gateway: G,
    feed: F,
    settings: OrchestratorSettings,
}

impl<G, F> ChangeOrchestrator<G, F>
where
    G: RepositoryGateway,
    F: FeedSource,
{
    pub fn new(gateway: G, feed: F, settings: OrchestratorSettings) -> Self {
        Self {
            gateway,
            feed,
            settings,
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Process the whole feed, publishing a pull request per changing entry.
    ///
    /// Fails only when the manifest or the feed cannot be read; per-entry
    /// publish failures are recorded in the report.
    #[instrument(skip(self), fields(feed = %self.feed.describe()))]
    pub async fn run(&self) -> Result<RunReport, CoreError> {
        let mut report = RunReport::start();
        if !self.settings.enabled {
            info!("run is disabled, nothing to do");
            report.disabled = true;
            return Ok(report.finish());
        }

        let (base, entries) = self.load_sources(&mut report).await?;
        info!(entries = entries.len(), "processing feed entries");

        for entry in &entries {
            let outcome = self.process_entry(&base, entry).await;
            report.entries.push(outcome);
            tokio::time::sleep(self.settings.pause).await;
        }

        let report = report.finish();
        info!(
            entries = report.entries.len(),
            published = report.count(EntryState::Done),
            failed = report.count(EntryState::Failed),
            unchanged = report.count(EntryState::NoOp),
            "run complete"
        );
        Ok(report)
    }

    /// Evaluate the whole feed without writing anything remotely.
    ///
    /// With `output_dir`, each changed manifest is written there as
    /// `<branch>.json`, the branch name reduced to a single file name.
    #[instrument(skip(self), fields(feed = %self.feed.describe()))]
    pub async fn plan(&self, output_dir: Option<&Path>) -> Result<RunReport, CoreError> {
        let mut report = RunReport::start();
        let (base, entries) = self.load_sources(&mut report).await?;

        if let Some(dir) = output_dir {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| CoreError::Io {
                    path: dir.display().to_string(),
                    source,
                })?;
        }

        for entry in &entries {
            let mut outcome = EntryOutcome::new(entry);
            let Some(evaluation) = evaluate(&base, entry, &mut outcome) else {
                report.entries.push(outcome);
                continue;
            };
            if let Some(dir) = output_dir {
                let path = dir.join(candidate_file_name(&outcome.id));
                let json = evaluation.manifest.to_pretty_json()?;
                tokio::fs::write(&path, json)
                    .await
                    .map_err(|source| CoreError::Io {
                        path: path.display().to_string(),
                        source,
                    })?;
                debug!(entry = %outcome.id, path = %path.display(), "wrote candidate manifest");
                outcome.written_to = Some(path);
            }
            report.entries.push(outcome);
        }

        let report = report.finish();
        info!(
            entries = report.entries.len(),
            would_change = report.count(EntryState::Changed),
            "plan complete"
        );
        Ok(report)
    }

    /// Read the manifest, then the feed. Either failing aborts the run.
    async fn load_sources(
        &self,
        report: &mut RunReport,
    ) -> Result<(ComposerManifest, Vec<FeedEntry>), CoreError> {
        let bytes = self
            .gateway
            .get_file_content(&self.settings.manifest_path)
            .await?;
        let base = ComposerManifest::from_slice(&bytes)?;
        info!(
            path = %self.settings.manifest_path,
            conflicts = base.conflict().len(),
            "loaded manifest"
        );

        let feed = self.feed.fetch_feed().await?;
        report.rejected_records = feed.rejected.len();
        if !feed.rejected.is_empty() {
            warn!(rejected = feed.rejected.len(), "some feed records were malformed and skipped");
        }
        Ok((base, feed.entries))
    }

    async fn process_entry(&self, base: &ComposerManifest, entry: &FeedEntry) -> EntryOutcome {
        let mut outcome = EntryOutcome::new(entry);
        let Some(evaluation) = evaluate(base, entry, &mut outcome) else {
            return outcome;
        };

        let published = self.publish(entry, &evaluation, &mut outcome).await;
        match published {
            Ok(pr) => {
                outcome.pull_request_url = Some(pr.html_url);
                outcome.set_state(EntryState::Done);
                info!(entry = %outcome.id, number = pr.number, "pull request created");
            }
            Err(e) => {
                warn!(
                    entry = %outcome.id,
                    step = %outcome.state,
                    error = %e,
                    "publishing failed, continuing with next entry"
                );
                outcome.error = Some(e.to_string());
                outcome.set_state(EntryState::Failed);
            }
        }
        outcome
    }

    /// Branch, commit and open the pull request for one changed entry.
    async fn publish(
        &self,
        entry: &FeedEntry,
        evaluation: &EntryEvaluation,
        outcome: &mut EntryOutcome,
    ) -> Result<PullRequest, PublishError> {
        let branch = outcome.id.clone();
        let path = self.settings.manifest_path.as_str();
        let base_branch = self.settings.default_branch.as_str();

        let constraint = evaluation.last_constraint.as_deref().unwrap_or_default();
        let proposal = Proposal::for_entry(entry, constraint);
        // Serialize before touching the remote so a failure leaves nothing behind.
        let content = evaluation.manifest.to_pretty_json()?;

        self.gateway
            .create_branch(&branch, base_branch)
            .await
            .map_err(|source| PublishError::CreateBranch {
                branch: branch.clone(),
                source,
            })?;
        outcome.set_state(EntryState::BranchCreated);

        let sha = self
            .gateway
            .get_file_sha(path, base_branch)
            .await
            .map_err(|source| PublishError::FileSha {
                path: path.to_string(),
                source,
            })?;

        self.gateway
            .update_file_content(path, content.as_bytes(), proposal.commit_message(), &sha, &branch)
            .await
            .map_err(|source| PublishError::UpdateFile {
                path: path.to_string(),
                branch: branch.clone(),
                source,
            })?;
        outcome.set_state(EntryState::FileUpdated);

        let pr = self
            .gateway
            .create_pull_request(base_branch, &branch, &proposal.title, &proposal.body)
            .await
            .map_err(|source| PublishError::PullRequest {
                branch: branch.clone(),
                source,
            })?;
        outcome.set_state(EntryState::ProposalCreated);
        Ok(pr)
    }
}

/// Evaluate `entry` against `base`, recording the result in `outcome`.
///
/// Returns the evaluation only when the entry changes the manifest.
fn evaluate(
    base: &ComposerManifest,
    entry: &FeedEntry,
    outcome: &mut EntryOutcome,
) -> Option<EntryEvaluation> {
    if entry.software.is_empty() {
        warn!(entry = %outcome.id, "entry lists no software, skipping");
        outcome.set_state(EntryState::NoOp);
        return None;
    }

    let evaluation = ConflictMerger::evaluate_entry(base, entry);
    if !evaluation.changed() {
        debug!(entry = %outcome.id, "conflict section already covers entry");
        outcome.set_state(EntryState::NoOp);
        return None;
    }

    outcome.changes = evaluation.changes.clone();
    outcome.set_state(EntryState::Changed);
    Some(evaluation)
}

/// `<id>.json`, with anything that could leave the output directory replaced.
fn candidate_file_name(id: &str) -> String {
    let name: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let name = name.trim_start_matches('.');
    if name.is_empty() {
        "entry.json".to_string()
    } else {
        format!("{name}.json")
    }
}
