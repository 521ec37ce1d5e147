//! Publishing migration results as a pull request
//!
//! The hosting API is abstracted by [`GitHubClient`]. [`publish_results`]
//! commits changed files in batches of at most [`MAX_FILES_PER_COMMIT`],
//! chaining each commit onto the previous one, then opens or updates the
//! pull request for the branch.

use crate::error::PublishError;
use crate::job::{MigrationResult, RepositoryRef};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Upper bound on files per commit
pub const MAX_FILES_PER_COMMIT: usize = 20;

/// One file in a tree; `content: None` deletes the path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Repository path
    pub path: String,
    /// New content, or `None` to delete
    pub content: Option<String>,
}

/// Pull request fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestDraft {
    /// Title
    pub title: String,
    /// Markdown body
    pub body: String,
    /// Branch with the changes
    pub head: String,
    /// Branch to merge into
    pub base: String,
}

/// Pull request as returned by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Number
    pub number: u64,
    /// Web URL
    pub url: String,
    /// Head branch
    pub head: String,
}

/// Hosting API used for publishing
#[async_trait]
pub trait GitHubClient: Send + Sync {
    /// Whether `branch` exists
    async fn branch_exists(&self, repo: &RepositoryRef, branch: &str) -> Result<bool, PublishError>;
    /// Create `branch` at `sha`
    async fn create_branch(&self, repo: &RepositoryRef, branch: &str, sha: &str) -> Result<(), PublishError>;
    /// Delete `branch`
    async fn delete_branch(&self, repo: &RepositoryRef, branch: &str) -> Result<(), PublishError>;
    /// Create a tree on top of `base_commit`'s tree; returns the tree sha
    async fn create_tree(
        &self,
        repo: &RepositoryRef,
        base_commit: &str,
        entries: &[TreeEntry],
    ) -> Result<String, PublishError>;
    /// Create a commit; returns the commit sha
    async fn create_commit(
        &self,
        repo: &RepositoryRef,
        message: &str,
        tree: &str,
        parent: &str,
    ) -> Result<String, PublishError>;
    /// Point `branch` at `sha`
    async fn update_ref(&self, repo: &RepositoryRef, branch: &str, sha: &str) -> Result<(), PublishError>;
    /// Open pull request for `head`, if any
    async fn get_pull_request(&self, repo: &RepositoryRef, head: &str) -> Result<Option<PullRequest>, PublishError>;
    /// Open a pull request
    async fn create_pull_request(
        &self,
        repo: &RepositoryRef,
        draft: &PullRequestDraft,
    ) -> Result<PullRequest, PublishError>;
    /// Update title and body of a pull request
    async fn update_pull_request(
        &self,
        repo: &RepositoryRef,
        number: u64,
        draft: &PullRequestDraft,
    ) -> Result<PullRequest, PublishError>;
}

/// Outcome of a publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOutcome {
    /// Commits in creation order
    pub commits: Vec<String>,
    /// Pull request
    pub pull_request: PullRequest,
    /// Whether the pull request already existed
    pub updated_existing: bool,
}

/// Tree entries for a job result
///
/// Writes every changed or relocated file at its new path, deletes the old
/// path of relocated files and the paths the layout planner removed.
#[must_use]
pub fn tree_entries(result: &MigrationResult) -> Vec<TreeEntry> {
    let mut entries = Vec::new();
    for (path, file) in &result.results {
        let relocated = file.new_path != *path;
        if file.new_path.is_empty() {
            entries.push(TreeEntry {
                path: path.clone(),
                content: None,
            });
            continue;
        }
        if file.is_changed() || relocated {
            entries.push(TreeEntry {
                path: file.new_path.clone(),
                content: Some(file.code.clone()),
            });
        }
        if relocated {
            entries.push(TreeEntry {
                path: path.clone(),
                content: None,
            });
        }
    }
    entries
}

/// Commit `result` onto `branch` and open or update its pull request
///
/// `base_sha` is the commit the branch starts from when it does not exist.
///
/// # Errors
/// `PublishError::NothingToPublish` when no file changed, otherwise the
/// first failing API call
pub async fn publish_results(
    client: &dyn GitHubClient,
    repo: &RepositoryRef,
    base_sha: &str,
    result: &MigrationResult,
    draft: &PullRequestDraft,
) -> Result<PublishOutcome, PublishError> {
    let entries = tree_entries(result);
    if entries.is_empty() {
        return Err(PublishError::NothingToPublish);
    }

    let branch = draft.head.as_str();
    if !client.branch_exists(repo, branch).await? {
        client.create_branch(repo, branch, base_sha).await?;
    }

    let batches = entries.len().div_ceil(MAX_FILES_PER_COMMIT);
    let mut parent = base_sha.to_string();
    let mut commits = Vec::with_capacity(batches);
    for (idx, chunk) in entries.chunks(MAX_FILES_PER_COMMIT).enumerate() {
        let tree = client.create_tree(repo, &parent, chunk).await?;
        let message = if batches == 1 {
            draft.title.clone()
        } else {
            format!("{} ({}/{batches})", draft.title, idx + 1)
        };
        let commit = client.create_commit(repo, &message, &tree, &parent).await?;
        tracing::debug!(repository = %repo.slug(), commit = %commit, files = chunk.len(), "batch committed");
        parent.clone_from(&commit);
        commits.push(commit);
    }
    client.update_ref(repo, branch, &parent).await?;

    let (pull_request, updated_existing) = match client.get_pull_request(repo, branch).await? {
        Some(existing) => (
            client.update_pull_request(repo, existing.number, draft).await?,
            true,
        ),
        None => (client.create_pull_request(repo, draft).await?, false),
    };
    tracing::info!(
        repository = %repo.slug(),
        commits = commits.len(),
        pr = pull_request.number,
        "migration published"
    );
    Ok(PublishOutcome {
        commits,
        pull_request,
        updated_existing,
    })
}
