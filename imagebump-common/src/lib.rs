//! Shared library for imagebump.
//!
//! Validates integration metadata, patches YAML/JSON files in consumer
//! repositories through structured paths, and drives each integration from
//! clone to pull request.

#![forbid(unsafe_code)]

pub mod config;
pub mod document;
pub mod errors;
pub mod git;
pub mod github;
pub mod logging;
pub mod mock;
pub mod orchestrator;
pub mod patcher;
pub mod path;
pub mod report;
pub mod retry;
pub mod schema;
pub mod splice;
pub mod types;

pub use config::{Credentials, DEFAULT_GITHUB_USERNAME, RunConfig, TOKEN_ENV_VAR};
pub use document::{DocumentError, DocumentFormat, Mapping, Node, Scalar};
pub use errors::{
    ConfigError, FailedAt, FailureReason, ImageReferenceError, IntegrationFailure, MetadataError,
    PullRequestError, RepositoryAccessError, SchemaValidationError, Violation,
};
pub use git::{GitCli, PublishOutcome, SourceControl, WorkspaceRequest};
pub use github::{
    GithubClient, PullRequestOutcome, PullRequestRequest, PullRequestService, RepoSlug,
};
pub use logging::{LogConfig, LogFormat, init_logging, mask_credentials};
pub use mock::{MockGitCall, MockPullRequestService, MockSourceControl};
pub use orchestrator::{
    BatchOutcome, CompletedIntegration, IntegrationOrchestrator, IntegrationOutcome,
    IntegrationState, Publication,
};
pub use path::{NotFoundReason, PathNotFoundError, PathSegment, PathSyntaxError, StructuredPath};
pub use report::{PrBodyContext, build as build_report, render_markdown};
pub use retry::{RetryPolicy, RetryableError, run_with_retry};
pub use schema::{load_metadata_file, validate as validate_metadata};
pub use splice::{SpliceError, splice};
pub use types::{
    FieldPatch, FieldResult, ImageReference, ImageReplacement, Integration, IntegrationMetadata,
    IntegrationReport, PatchResult, PatchStatus, ServiceField, ServiceSpecPatch,
};
