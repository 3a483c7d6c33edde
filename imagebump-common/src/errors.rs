//! Error taxonomy for metadata validation, repository access and PR creation.
//!
//! Structural errors from the patch engine live next to their modules
//! ([`crate::path::PathNotFoundError`], [`crate::document::DocumentError`]);
//! this module holds the errors that cross the orchestrator boundary.

use std::fmt;

use crate::document::DocumentError;
use crate::retry::RetryableError;
use crate::types::{IntegrationReport, PatchResult, PatchStatus};

// ── Metadata ────────────────────────────────────────────────────────────────

/// One schema violation with its location in the metadata document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Dotted location, e.g. `integrations[0].replace-image[1].path`.
    pub location: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.location.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.location, self.message)
        }
    }
}

/// Malformed integration metadata. Fatal for the whole run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid integration metadata ({} violation(s)): {}", .violations.len(), render_violations(.violations))]
pub struct SchemaValidationError {
    pub violations: Vec<Violation>,
}

fn render_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(Violation::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl SchemaValidationError {
    /// Whether any violation was reported at `location`.
    pub fn has_violation_at(&self, location: &str) -> bool {
        self.violations.iter().any(|v| v.location == location)
    }
}

/// Problems loading the metadata file before validation.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Schema(#[from] SchemaValidationError),
}

// ── Image reference ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageReferenceError {
    #[error("Invalid rock image '{0}': missing tag (expected <name>:<tag>)")]
    MissingTag(String),

    #[error("Invalid rock image format: '{0}'")]
    InvalidFormat(String),
}

// ── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("GitHub token not provided and GH_TOKEN not set.")]
    MissingToken,

    #[error("GitHub username must not be empty")]
    EmptyUsername,

    #[error("parallelism must be at least 1")]
    ZeroParallelism,
}

// ── Repository access ───────────────────────────────────────────────────────

/// Clone, checkout, commit or push failure for one consumer repository.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryAccessError {
    #[error("Invalid GitHub URL: '{0}'")]
    InvalidRepository(String),

    #[error("existing clone at {path} points to a different remote ({actual}, expected {expected})")]
    RemoteMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("failed to clone repository {repository}: {stderr}")]
    Clone { repository: String, stderr: String },

    /// A git subcommand exited non-zero. `stderr` is already credential-masked.
    #[error("git {operation} failed (exit code {code:?}): {stderr}")]
    Command {
        operation: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to run git {operation}: {message}")]
    Spawn { operation: String, message: String },

    #[error("workspace I/O error at {path}: {message}")]
    Io { path: String, message: String },
}

/// Fragments of git/curl stderr that indicate a transient network problem.
const TRANSIENT_GIT_MARKERS: &[&str] = &[
    "could not resolve host",
    "connection reset",
    "connection refused",
    "connection timed out",
    "operation timed out",
    "timed out",
    "unable to access",
    "early eof",
    "the remote end hung up unexpectedly",
    "rpc failed",
    "502",
    "503",
    "504",
];

fn is_transient_stderr(stderr: &str) -> bool {
    let lowered = stderr.to_ascii_lowercase();
    TRANSIENT_GIT_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

impl RepositoryAccessError {
    /// Whether the failure looks like a network blip worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Clone { stderr, .. } | Self::Command { stderr, .. } => {
                is_transient_stderr(stderr)
            }
            Self::Spawn { .. } => true,
            Self::InvalidRepository(_) | Self::RemoteMismatch { .. } | Self::Io { .. } => false,
        }
    }
}

impl RetryableError for RepositoryAccessError {
    fn is_retryable(&self) -> bool {
        RepositoryAccessError::is_retryable(self)
    }
}

// ── Pull requests ───────────────────────────────────────────────────────────

/// Pull request creation failure. An already-open PR is not an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PullRequestError {
    #[error("GitHub request failed: {0}")]
    Transport(String),

    #[error("GitHub API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("unexpected GitHub response: {0}")]
    Parse(String),

    #[error("Invalid GitHub URL: '{0}'")]
    InvalidRepository(String),
}

impl PullRequestError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::Parse(_) | Self::InvalidRepository(_) => false,
        }
    }
}

impl RetryableError for PullRequestError {
    fn is_retryable(&self) -> bool {
        PullRequestError::is_retryable(self)
    }
}

impl From<reqwest::Error> for PullRequestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Transport(err.without_url().to_string())
        }
    }
}

impl From<serde_json::Error> for PullRequestError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

// ── Integration failures ────────────────────────────────────────────────────

/// The transition an integration was attempting when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedAt {
    RepositoryAcquired,
    ImagesPatched,
    ServiceSpecPatched,
    Reported,
}

impl fmt::Display for FailedAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RepositoryAcquired => "repository acquisition",
            Self::ImagesPatched => "image replacement",
            Self::ServiceSpecPatched => "service-spec patching",
            Self::Reported => "publishing",
        };
        f.write_str(name)
    }
}

/// Why an integration failed.
#[derive(Debug, thiserror::Error)]
pub enum FailureReason {
    #[error(transparent)]
    RepositoryAccess(#[from] RepositoryAccessError),

    /// Image replacements that did not apply; any of them blocks the PR.
    #[error("{}", describe_unresolved(.0))]
    ImageReplacementsUnresolved(Vec<PatchResult>),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    PullRequest(#[from] PullRequestError),
}

fn describe_unresolved(results: &[PatchResult]) -> String {
    let mut parts = Vec::new();

    let missing_files: Vec<&str> = results
        .iter()
        .filter(|r| r.status() == PatchStatus::FileMissing)
        .map(|r| r.file())
        .collect();
    if !missing_files.is_empty() {
        parts.push(format!("missing expected files: {}", missing_files.join(", ")));
    }

    for result in results
        .iter()
        .filter(|r| r.status() == PatchStatus::PathMissing)
    {
        parts.push(format!(
            "no matches found for path '{}' in {}",
            result.path(),
            result.file()
        ));
    }

    parts.join("; ")
}

/// Per-integration failure record. Never aborts the batch.
#[derive(Debug, thiserror::Error)]
#[error("integration of {consumer_repository} failed during {failed_at}: {reason}")]
pub struct IntegrationFailure {
    pub consumer_repository: String,
    pub failed_at: FailedAt,
    #[source]
    pub reason: FailureReason,
    /// Patch outcomes gathered before the failure, when any were.
    pub report: Option<IntegrationReport>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Node;
    use crate::path::StructuredPath;

    #[test]
    fn test_repository_error_retryable_classification() {
        let transient = RepositoryAccessError::Clone {
            repository: "org/repo".into(),
            stderr: "fatal: unable to access 'https://github.com/org/repo.git/': Could not resolve host: github.com".into(),
        };
        assert!(transient.is_retryable());

        let auth = RepositoryAccessError::Command {
            operation: "push".into(),
            code: Some(128),
            stderr: "remote: Permission to org/repo.git denied".into(),
        };
        assert!(!auth.is_retryable());

        assert!(
            RepositoryAccessError::Spawn {
                operation: "clone".into(),
                message: "resource temporarily unavailable".into()
            }
            .is_retryable()
        );
        assert!(!RepositoryAccessError::InvalidRepository("nope".into()).is_retryable());
    }

    #[test]
    fn test_pull_request_error_retryable_classification() {
        assert!(PullRequestError::Transport("reset".into()).is_retryable());
        assert!(
            PullRequestError::Api {
                status: 502,
                message: "bad gateway".into()
            }
            .is_retryable()
        );
        assert!(
            PullRequestError::Api {
                status: 429,
                message: "slow down".into()
            }
            .is_retryable()
        );
        assert!(
            !PullRequestError::Api {
                status: 422,
                message: "Validation Failed".into()
            }
            .is_retryable()
        );
        assert!(!PullRequestError::Parse("eof".into()).is_retryable());
    }

    #[test]
    fn test_schema_error_lists_every_violation() {
        let err = SchemaValidationError {
            violations: vec![
                Violation {
                    location: "integrations[0]".into(),
                    message: "missing required key 'consumer-repository'".into(),
                },
                Violation {
                    location: "integrations[1].replace-image[0].path".into(),
                    message: "expected a string".into(),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("2 violation(s)"));
        assert!(text.contains("integrations[0]: missing required key"));
        assert!(text.contains("integrations[1].replace-image[0].path"));
        assert!(err.has_violation_at("integrations[0]"));
        assert!(!err.has_violation_at("integrations[2]"));
    }

    #[test]
    fn test_unresolved_image_replacements_message() {
        let path: StructuredPath = "a.b".parse().unwrap();
        let reason = FailureReason::ImageReplacementsUnresolved(vec![
            PatchResult::file_missing("metadata.yaml", &path, Node::from("img:1")),
            PatchResult::path_missing("config.yaml", &path, Node::from("img:1"), "key not found"),
        ]);
        let text = reason.to_string();
        assert!(text.contains("missing expected files: metadata.yaml"));
        assert!(text.contains("no matches found for path 'a.b' in config.yaml"));
    }

    #[test]
    fn test_missing_token_message() {
        assert_eq!(
            ConfigError::MissingToken.to_string(),
            "GitHub token not provided and GH_TOKEN not set."
        );
    }
}
