//! imagebump - propagate a published rock image into consumer repositories.
//!
//! Reads an integration metadata file, patches every listed repository on a
//! branch named after the image, and opens one pull request per repository.

#![forbid(unsafe_code)]

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};

use imagebump_common::{
    Credentials, DEFAULT_GITHUB_USERNAME, GitCli, GithubClient, ImageReference,
    IntegrationOrchestrator, IntegrationOutcome, LogConfig, PullRequestOutcome, Publication,
    PublishOutcome, RunConfig, init_logging, load_metadata_file,
};

#[derive(Parser, Debug)]
#[command(name = "imagebump")]
#[command(author, version, about = "Integrate a published rock image into consumer repositories")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Patch every repository listed in a metadata file and open pull requests
    IntegrateRock(IntegrateRockArgs),
}

#[derive(Args, Debug)]
struct IntegrateRockArgs {
    /// Integration metadata file (YAML or JSON)
    metadata_file: PathBuf,

    /// Branch the pull requests target
    base_branch: String,

    /// Published image reference, e.g. ghcr.io/canonical/my-rock:1.0.0
    rock_image: String,

    /// GitHub token (falls back to GH_TOKEN)
    #[arg(long, env = "GH_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// GitHub username used with the token
    #[arg(long, default_value = DEFAULT_GITHUB_USERNAME)]
    github_username: String,

    /// Commit author email (defaults to the username's noreply address)
    #[arg(long)]
    github_email: Option<String>,

    /// Directory to clone repositories into (defaults to a temporary directory)
    #[arg(long)]
    clone_dir: Option<PathBuf>,

    /// URL of the pull request that produced the image, linked from PR bodies
    #[arg(long)]
    triggering_pr: Option<String>,

    /// Patch workspaces but do not commit, push or open pull requests
    #[arg(long)]
    dry_run: bool,

    /// Number of repositories processed concurrently
    #[arg(long, default_value = "1")]
    parallelism: NonZeroUsize,

    /// Attempts for clone, push and pull request creation
    #[arg(long, default_value_t = 3)]
    max_attempts: u32,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env("info").with_stderr();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    init_logging(&log_config)?;

    match cli.command {
        Commands::IntegrateRock(args) => integrate_rock(args).await,
    }
}

async fn integrate_rock(args: IntegrateRockArgs) -> Result<ExitCode> {
    let credentials = Credentials::resolve(
        args.github_token,
        Some(args.github_username),
        args.github_email,
    )?;
    let image = ImageReference::parse(&args.rock_image)?;
    let metadata = load_metadata_file(&args.metadata_file).with_context(|| {
        format!(
            "Failed to load integration metadata from {}",
            args.metadata_file.display()
        )
    })?;

    // Held until the batch is done; dropping it removes the clones.
    let mut scratch = None;
    let clone_dir = match args.clone_dir {
        Some(dir) => dir,
        None => {
            let dir = tempfile::Builder::new()
                .prefix("imagebump-")
                .tempdir()
                .context("Failed to create temporary clone directory")?;
            let path = dir.path().to_path_buf();
            scratch = Some(dir);
            path
        }
    };
    debug!(clone_dir = %clone_dir.display(), temporary = scratch.is_some(), "Using clone directory");

    let config = RunConfig::new(args.base_branch, image, clone_dir)
        .with_triggering_pr(args.triggering_pr)
        .with_dry_run(args.dry_run)
        .with_parallelism(args.parallelism.get())?
        .with_max_attempts(args.max_attempts);

    let github = GithubClient::new(&credentials).context("Failed to build GitHub client")?;
    let orchestrator = IntegrationOrchestrator::new(GitCli::new(credentials), github, config);
    let batch = orchestrator.run(&metadata).await;

    for outcome in &batch.integrations {
        println!("{}", summary_line(outcome));
        if let Ok(done) = &outcome.result
            && done.publication == Publication::DryRun
        {
            println!("{}", done.pr_body);
        }
    }

    let failed = batch.failed().count();
    info!(
        succeeded = batch.succeeded().count(),
        failed,
        "Done"
    );
    drop(scratch);

    Ok(if batch.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// One human-readable line per integration.
fn summary_line(outcome: &IntegrationOutcome) -> String {
    let repository = &outcome.consumer_repository;
    match &outcome.result {
        Ok(done) => {
            let manual = if done.context.requires_manual_action() {
                " (manual action required, see PR body)"
            } else {
                ""
            };
            let status = match &done.publication {
                Publication::DryRun => "dry run, nothing published".to_string(),
                Publication::Unchanged => "already up to date, nothing to publish".to_string(),
                Publication::Published { push, pull_request } => {
                    let pushed = match push {
                        PublishOutcome::Pushed { commit } => {
                            format!("pushed {}", commit.get(..12).unwrap_or(commit))
                        }
                        PublishOutcome::UpToDate => "branch up to date".to_string(),
                    };
                    match pull_request {
                        PullRequestOutcome::Created { url, .. } => {
                            format!("{pushed}, opened {url}")
                        }
                        PullRequestOutcome::AlreadyOpen { url, .. } => {
                            format!("{pushed}, pull request already open at {url}")
                        }
                    }
                }
            };
            format!("[ok]   {repository}: {status}{manual}")
        }
        Err(failure) => format!("[FAIL] {repository}: {failure}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imagebump_common::{
        FailedAt, FailureReason, IntegrationFailure, IntegrationState, RepositoryAccessError,
    };

    fn parse(args: &[&str]) -> IntegrateRockArgs {
        let cli = Cli::try_parse_from(args.iter().copied()).unwrap();
        match cli.command {
            Commands::IntegrateRock(args) => args,
        }
    }

    #[test]
    fn test_parse_integrate_rock_defaults() {
        let args = parse(&[
            "imagebump",
            "integrate-rock",
            "rock-ci-metadata.yaml",
            "main",
            "ghcr.io/canonical/my-rock:1.0.0",
        ]);
        assert_eq!(args.metadata_file, PathBuf::from("rock-ci-metadata.yaml"));
        assert_eq!(args.base_branch, "main");
        assert_eq!(args.rock_image, "ghcr.io/canonical/my-rock:1.0.0");
        assert_eq!(args.github_username, "__token__");
        assert_eq!(args.parallelism.get(), 1);
        assert_eq!(args.max_attempts, 3);
        assert!(!args.dry_run);
        assert!(args.clone_dir.is_none());
    }

    #[test]
    fn test_parse_integrate_rock_all_flags() {
        let cli = Cli::try_parse_from([
            "imagebump",
            "integrate-rock",
            "meta.json",
            "track/2.0",
            "my-rock:2.0",
            "--github-token",
            "ghp_x",
            "--github-username",
            "bot",
            "--github-email",
            "bot@example.com",
            "--clone-dir",
            "/tmp/clones",
            "--triggering-pr",
            "https://github.com/org/rocks/pull/9",
            "--dry-run",
            "--parallelism",
            "4",
            "--max-attempts",
            "5",
            "--verbose",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Commands::IntegrateRock(args) = cli.command;
        assert_eq!(args.github_token.as_deref(), Some("ghp_x"));
        assert_eq!(args.github_username, "bot");
        assert_eq!(args.github_email.as_deref(), Some("bot@example.com"));
        assert_eq!(args.clone_dir, Some(PathBuf::from("/tmp/clones")));
        assert_eq!(
            args.triggering_pr.as_deref(),
            Some("https://github.com/org/rocks/pull/9")
        );
        assert!(args.dry_run);
        assert_eq!(args.parallelism.get(), 4);
        assert_eq!(args.max_attempts, 5);
    }

    #[test]
    fn test_parse_rejects_zero_parallelism_and_missing_args() {
        assert!(
            Cli::try_parse_from([
                "imagebump",
                "integrate-rock",
                "m.yaml",
                "main",
                "rock:1",
                "--parallelism",
                "0",
            ])
            .is_err()
        );
        assert!(Cli::try_parse_from(["imagebump", "integrate-rock", "m.yaml"]).is_err());
    }

    #[test]
    fn test_summary_line_for_failure() {
        let outcome = IntegrationOutcome {
            slot: 0,
            consumer_repository: "org/repo".into(),
            transitions: vec![IntegrationState::Pending, IntegrationState::Failed],
            result: Err(IntegrationFailure {
                consumer_repository: "org/repo".into(),
                failed_at: FailedAt::RepositoryAcquired,
                reason: FailureReason::RepositoryAccess(RepositoryAccessError::Clone {
                    repository: "org/repo".into(),
                    stderr: "Repository not found".into(),
                }),
                report: None,
            }),
        };
        let line = summary_line(&outcome);
        assert!(line.starts_with("[FAIL] org/repo:"));
        assert!(line.contains("failed to clone repository"));
    }
}
