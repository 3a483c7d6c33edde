//! Deterministic in-memory doubles for [`SourceControl`] and
//! [`PullRequestService`].
//!
//! `MockSourceControl` materialises seeded repository contents into real
//! directories so the patch engine runs against the filesystem exactly as it
//! does in production; only git and GitHub are simulated.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::errors::{PullRequestError, RepositoryAccessError};
use crate::git::{PublishOutcome, SourceControl, WorkspaceRequest};
use crate::github::{PullRequestOutcome, PullRequestRequest, PullRequestService, RepoSlug};

type Snapshot = BTreeMap<PathBuf, Vec<u8>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn io_error(path: &Path, err: std::io::Error) -> RepositoryAccessError {
    RepositoryAccessError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

/// Every file under `root`, keyed by relative path.
fn snapshot(root: &Path) -> Result<Snapshot, RepositoryAccessError> {
    let mut files = Snapshot::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|err| io_error(&dir, err))?;
        for entry in entries {
            let path = entry.map_err(|err| io_error(&dir, err))?.path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let content = std::fs::read(&path).map_err(|err| io_error(&path, err))?;
                let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
                files.insert(relative, content);
            }
        }
    }
    Ok(files)
}

/// A call received by [`MockSourceControl`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockGitCall {
    Prepare {
        repository: String,
        base_branch: String,
        slot: usize,
    },
    HasChanges {
        workspace: PathBuf,
    },
    Publish {
        repository: String,
        branch: String,
        message: String,
    },
}

#[derive(Debug, Default)]
struct SourceState {
    /// Seeded base-branch contents per repository.
    repositories: HashMap<String, BTreeMap<String, String>>,
    prepare_failures: HashMap<String, VecDeque<RepositoryAccessError>>,
    publish_failures: HashMap<String, VecDeque<RepositoryAccessError>>,
    /// Workspace root -> (repository, checkout snapshot).
    workspaces: HashMap<PathBuf, (String, Snapshot)>,
    /// (repository, branch) -> pushed tree.
    remote_branches: HashMap<(String, String), Snapshot>,
    calls: Vec<MockGitCall>,
    commits: u64,
}

/// In-memory [`SourceControl`].
#[derive(Debug, Clone, Default)]
pub struct MockSourceControl {
    state: Arc<Mutex<SourceState>>,
}

impl MockSourceControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file to a repository's base branch. Unseeded repositories fail to clone.
    pub fn seed(&self, repository: &str, file: &str, content: &str) {
        lock(&self.state)
            .repositories
            .entry(repository.to_string())
            .or_default()
            .insert(file.to_string(), content.to_string());
    }

    /// Register a repository with no files.
    pub fn seed_empty(&self, repository: &str) {
        lock(&self.state)
            .repositories
            .entry(repository.to_string())
            .or_default();
    }

    /// Fail the next `prepare` for `repository`. Failures are consumed FIFO.
    pub fn fail_prepare(&self, repository: &str, error: RepositoryAccessError) {
        lock(&self.state)
            .prepare_failures
            .entry(repository.to_string())
            .or_default()
            .push_back(error);
    }

    /// Fail the next `publish` for `repository`.
    pub fn fail_publish(&self, repository: &str, error: RepositoryAccessError) {
        lock(&self.state)
            .publish_failures
            .entry(repository.to_string())
            .or_default()
            .push_back(error);
    }

    /// Snapshot of all calls received.
    #[must_use]
    pub fn calls(&self) -> Vec<MockGitCall> {
        lock(&self.state).calls.clone()
    }

    /// Publish calls for one repository.
    #[must_use]
    pub fn publishes(&self, repository: &str) -> Vec<MockGitCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, MockGitCall::Publish { repository: r, .. } if r == repository))
            .collect()
    }

    /// Content pushed to `branch`, if any.
    #[must_use]
    pub fn pushed_file(&self, repository: &str, branch: &str, file: &str) -> Option<String> {
        let state = lock(&self.state);
        let tree = state
            .remote_branches
            .get(&(repository.to_string(), branch.to_string()))?;
        tree.get(Path::new(file))
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

impl SourceControl for MockSourceControl {
    async fn prepare(&self, request: &WorkspaceRequest) -> Result<PathBuf, RepositoryAccessError> {
        let files = {
            let mut state = lock(&self.state);
            state.calls.push(MockGitCall::Prepare {
                repository: request.repository.clone(),
                base_branch: request.base_branch.clone(),
                slot: request.slot,
            });
            if let Some(error) = state
                .prepare_failures
                .get_mut(&request.repository)
                .and_then(VecDeque::pop_front)
            {
                return Err(error);
            }
            match state.repositories.get(&request.repository) {
                Some(files) => files.clone(),
                None => {
                    return Err(RepositoryAccessError::Clone {
                        repository: request.repository.clone(),
                        stderr: "remote: Repository not found.".to_string(),
                    });
                }
            }
        };

        let slug = RepoSlug::parse(&request.repository)
            .ok_or_else(|| RepositoryAccessError::InvalidRepository(request.repository.clone()))?;
        let root = request.workspace_dir(&slug);
        if root.exists() {
            std::fs::remove_dir_all(&root).map_err(|err| io_error(&root, err))?;
        }
        std::fs::create_dir_all(&root).map_err(|err| io_error(&root, err))?;
        for (file, content) in &files {
            let path = root.join(file);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|err| io_error(parent, err))?;
            }
            std::fs::write(&path, content).map_err(|err| io_error(&path, err))?;
        }

        let checkout = snapshot(&root)?;
        lock(&self.state)
            .workspaces
            .insert(root.clone(), (request.repository.clone(), checkout));
        Ok(root)
    }

    async fn has_changes(&self, workspace: &Path) -> Result<bool, RepositoryAccessError> {
        let current = snapshot(workspace)?;
        let mut state = lock(&self.state);
        state.calls.push(MockGitCall::HasChanges {
            workspace: workspace.to_path_buf(),
        });
        let (_, checkout) = state
            .workspaces
            .get(workspace)
            .ok_or_else(|| RepositoryAccessError::Io {
                path: workspace.display().to_string(),
                message: "not a prepared workspace".to_string(),
            })?;
        Ok(*checkout != current)
    }

    async fn publish(
        &self,
        workspace: &Path,
        branch: &str,
        message: &str,
    ) -> Result<PublishOutcome, RepositoryAccessError> {
        let tree = snapshot(workspace)?;
        let mut state = lock(&self.state);
        let repository = state
            .workspaces
            .get(workspace)
            .map(|(repository, _)| repository.clone())
            .ok_or_else(|| RepositoryAccessError::Io {
                path: workspace.display().to_string(),
                message: "not a prepared workspace".to_string(),
            })?;
        state.calls.push(MockGitCall::Publish {
            repository: repository.clone(),
            branch: branch.to_string(),
            message: message.to_string(),
        });
        if let Some(error) = state
            .publish_failures
            .get_mut(&repository)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }

        let key = (repository, branch.to_string());
        if state.remote_branches.get(&key) == Some(&tree) {
            return Ok(PublishOutcome::UpToDate);
        }
        state.remote_branches.insert(key, tree);
        state.commits += 1;
        Ok(PublishOutcome::Pushed {
            commit: format!("{:040x}", state.commits),
        })
    }
}

#[derive(Debug, Default)]
struct PullRequestState {
    scripted: VecDeque<Result<PullRequestOutcome, PullRequestError>>,
    requests: Vec<PullRequestRequest>,
    /// (repository, head, base) -> (url, number) of open PRs.
    open: HashMap<(String, String, String), (String, u64)>,
    next_number: u64,
}

/// In-memory [`PullRequestService`].
///
/// Without scripted results it behaves like GitHub: the first request for a
/// head/base pair creates a PR, later ones report it as already open.
#[derive(Debug, Clone, Default)]
pub struct MockPullRequestService {
    state: Arc<Mutex<PullRequestState>>,
}

impl MockPullRequestService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a scripted result. Results are consumed FIFO.
    pub fn push_result(&self, result: Result<PullRequestOutcome, PullRequestError>) {
        lock(&self.state).scripted.push_back(result);
    }

    /// Snapshot of all requests received.
    #[must_use]
    pub fn requests(&self) -> Vec<PullRequestRequest> {
        lock(&self.state).requests.clone()
    }
}

impl PullRequestService for MockPullRequestService {
    async fn open(
        &self,
        request: &PullRequestRequest,
    ) -> Result<PullRequestOutcome, PullRequestError> {
        let mut state = lock(&self.state);
        state.requests.push(request.clone());
        if let Some(result) = state.scripted.pop_front() {
            return result;
        }

        let key = (
            request.repository.clone(),
            request.head_branch.clone(),
            request.base_branch.clone(),
        );
        if let Some((url, number)) = state.open.get(&key) {
            return Ok(PullRequestOutcome::AlreadyOpen {
                url: url.clone(),
                number: *number,
            });
        }

        state.next_number += 1;
        let number = state.next_number;
        let slug = RepoSlug::parse(&request.repository)
            .map(|s| s.to_string())
            .unwrap_or_else(|| request.repository.clone());
        let url = format!("https://github.com/{slug}/pull/{number}");
        state.open.insert(key, (url.clone(), number));
        Ok(PullRequestOutcome::Created { url, number })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(dir: &Path, repository: &str) -> WorkspaceRequest {
        WorkspaceRequest {
            repository: repository.to_string(),
            base_branch: "main".to_string(),
            slot: 0,
            clone_dir: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn test_prepare_materialises_seeded_files() {
        let dir = tempfile::tempdir().unwrap();
        let git = MockSourceControl::new();
        git.seed("org/repo", "charms/a/metadata.yaml", "name: a\n");

        let root = git.prepare(&request(dir.path(), "org/repo")).await.unwrap();
        assert_eq!(root, dir.path().join("0-repo"));
        assert_eq!(
            std::fs::read_to_string(root.join("charms/a/metadata.yaml")).unwrap(),
            "name: a\n"
        );
        assert!(!git.has_changes(&root).await.unwrap());

        std::fs::write(root.join("charms/a/metadata.yaml"), "name: b\n").unwrap();
        assert!(git.has_changes(&root).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_repository_fails_to_clone() {
        let dir = tempfile::tempdir().unwrap();
        let git = MockSourceControl::new();
        let err = git
            .prepare(&request(dir.path(), "org/ghost"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to clone repository"));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_publish_same_tree_is_up_to_date() {
        let dir = tempfile::tempdir().unwrap();
        let git = MockSourceControl::new();
        git.seed("org/repo", "a.yaml", "a: 1\n");
        let root = git.prepare(&request(dir.path(), "org/repo")).await.unwrap();
        std::fs::write(root.join("a.yaml"), "a: 2\n").unwrap();

        let first = git.publish(&root, "integrate-x-1", "msg").await.unwrap();
        assert!(matches!(first, PublishOutcome::Pushed { .. }));
        let second = git.publish(&root, "integrate-x-1", "msg").await.unwrap();
        assert_eq!(second, PublishOutcome::UpToDate);
        assert_eq!(
            git.pushed_file("org/repo", "integrate-x-1", "a.yaml").as_deref(),
            Some("a: 2\n")
        );
        assert_eq!(git.publishes("org/repo").len(), 2);
    }

    #[tokio::test]
    async fn test_pull_requests_are_idempotent() {
        let prs = MockPullRequestService::new();
        let request = PullRequestRequest {
            repository: "https://github.com/org/repo.git".into(),
            head_branch: "integrate-x-1".into(),
            base_branch: "main".into(),
            title: "t".into(),
            body: "b".into(),
        };
        let first = prs.open(&request).await.unwrap();
        assert_eq!(
            first,
            PullRequestOutcome::Created {
                url: "https://github.com/org/repo/pull/1".into(),
                number: 1
            }
        );
        let second = prs.open(&request).await.unwrap();
        assert!(matches!(second, PullRequestOutcome::AlreadyOpen { number: 1, .. }));
        assert_eq!(prs.requests().len(), 2);
    }
}
