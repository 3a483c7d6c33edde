//! Run configuration resolved once at the process boundary.
//!
//! Nothing below `main` reads the environment for credentials; a fully built
//! [`RunConfig`] and [`Credentials`] are passed down instead.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::retry::RetryPolicy;
use crate::types::ImageReference;

/// Environment variable consulted when no token is passed explicitly.
pub const TOKEN_ENV_VAR: &str = "GH_TOKEN";

/// Username used for token authentication when none is given.
pub const DEFAULT_GITHUB_USERNAME: &str = "__token__";

/// GitHub identity used for clones, commits and the REST API.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub token: String,
    /// Commit author email.
    pub email: String,
}

impl Credentials {
    /// Build credentials from already-collected inputs.
    ///
    /// `token` is the explicit flag or the `GH_TOKEN` fallback, whichever the
    /// caller found first. The email defaults to the GitHub noreply address.
    pub fn resolve(
        token: Option<String>,
        username: Option<String>,
        email: Option<String>,
    ) -> Result<Self, ConfigError> {
        let token = token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingToken)?;

        let username = match username {
            Some(name) if name.trim().is_empty() => return Err(ConfigError::EmptyUsername),
            Some(name) => name.trim().to_string(),
            None => DEFAULT_GITHUB_USERNAME.to_string(),
        };

        let email = email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| format!("{username}@users.noreply.github.com"));

        Ok(Self {
            username,
            token,
            email,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("token", &"***")
            .field("email", &self.email)
            .finish()
    }
}

/// Everything the orchestrator needs for one batch.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub base_branch: String,
    pub image: ImageReference,
    /// Parent directory for per-integration workspaces.
    pub clone_dir: PathBuf,
    /// Link to the PR that produced the image, echoed in PR bodies.
    pub triggering_pr: Option<String>,
    /// Patch workspaces but skip commit, push and PR creation.
    pub dry_run: bool,
    /// Integrations processed concurrently.
    pub parallelism: usize,
    pub retry: RetryPolicy,
}

impl RunConfig {
    pub fn new(base_branch: impl Into<String>, image: ImageReference, clone_dir: PathBuf) -> Self {
        Self {
            base_branch: base_branch.into(),
            image,
            clone_dir,
            triggering_pr: None,
            dry_run: false,
            parallelism: 1,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_triggering_pr(mut self, url: Option<String>) -> Self {
        self.triggering_pr = url.filter(|u| !u.trim().is_empty());
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Result<Self, ConfigError> {
        if parallelism == 0 {
            return Err(ConfigError::ZeroParallelism);
        }
        self.parallelism = parallelism;
        Ok(self)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.retry.max_attempts = max_attempts.max(1);
        self
    }

    /// Replace the whole retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Keep the attempt budget but retry immediately.
    pub fn without_backoff(self) -> Self {
        let attempts = self.retry.max_attempts;
        self.with_retry(RetryPolicy {
            max_attempts: attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
        })
    }
}
