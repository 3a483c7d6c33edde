//! Drive every integration in a metadata document through its lifecycle.
//!
//! Each integration moves `Pending -> RepositoryAcquired -> ImagesPatched ->
//! ServiceSpecPatched -> Reported`, or ends in `Failed` from any of those.
//! Integrations share nothing but the read-only metadata and run in their own
//! workspace directory, so a failure in one never touches another. The batch
//! always runs to completion and reports one outcome per integration, in
//! metadata order.

use std::path::Path;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::RunConfig;
use crate::document::{DocumentError, Node};
use crate::errors::{FailedAt, FailureReason, IntegrationFailure};
use crate::git::{PublishOutcome, SourceControl, WorkspaceRequest};
use crate::github::{PullRequestOutcome, PullRequestRequest, PullRequestService};
use crate::patcher::{self, FileEdit};
use crate::report::{self, PrBodyContext};
use crate::retry::run_with_retry;
use crate::types::{
    FieldResult, Integration, IntegrationMetadata, IntegrationReport, PatchResult, ServiceField,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationState {
    Pending,
    RepositoryAcquired,
    ImagesPatched,
    ServiceSpecPatched,
    Reported,
    Failed,
}

/// What happened at the publishing step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Publication {
    /// Workspace patched, nothing committed.
    DryRun,
    /// Patching produced no diff against the base branch.
    Unchanged,
    Published {
        push: PublishOutcome,
        pull_request: PullRequestOutcome,
    },
}

#[derive(Debug, Clone)]
pub struct CompletedIntegration {
    pub report: IntegrationReport,
    pub context: PrBodyContext,
    pub pr_body: String,
    pub publication: Publication,
}

#[derive(Debug)]
pub struct IntegrationOutcome {
    /// Position in the metadata document.
    pub slot: usize,
    pub consumer_repository: String,
    /// Every state entered, starting with `Pending`.
    pub transitions: Vec<IntegrationState>,
    pub result: Result<CompletedIntegration, IntegrationFailure>,
}

impl IntegrationOutcome {
    pub fn final_state(&self) -> IntegrationState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(IntegrationState::Pending)
    }

    pub fn is_completed(&self) -> bool {
        self.result.is_ok()
    }

    /// Patch outcomes, whether or not the integration completed.
    pub fn report(&self) -> Option<&IntegrationReport> {
        match &self.result {
            Ok(done) => Some(&done.report),
            Err(failure) => failure.report.as_ref(),
        }
    }
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub integrations: Vec<IntegrationOutcome>,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> impl Iterator<Item = &IntegrationOutcome> {
        self.integrations.iter().filter(|o| o.is_completed())
    }

    pub fn failed(&self) -> impl Iterator<Item = &IntegrationOutcome> {
        self.integrations.iter().filter(|o| !o.is_completed())
    }

    /// True when every integration completed.
    pub fn is_success(&self) -> bool {
        self.integrations.iter().all(IntegrationOutcome::is_completed)
    }
}

/// Per-integration state bookkeeping.
struct Lifecycle<'a> {
    repository: &'a str,
    transitions: Vec<IntegrationState>,
}

impl<'a> Lifecycle<'a> {
    fn new(repository: &'a str) -> Self {
        Self {
            repository,
            transitions: vec![IntegrationState::Pending],
        }
    }

    fn advance(&mut self, state: IntegrationState) {
        debug!(state = ?state, "Integration state changed");
        self.transitions.push(state);
    }

    fn fail(
        &mut self,
        failed_at: FailedAt,
        reason: impl Into<FailureReason>,
        report: Option<IntegrationReport>,
    ) -> IntegrationFailure {
        self.transitions.push(IntegrationState::Failed);
        let failure = IntegrationFailure {
            consumer_repository: self.repository.to_string(),
            failed_at,
            reason: reason.into(),
            report,
        };
        error!(failed_at = %failed_at, error = %failure.reason, "Integration failed");
        failure
    }
}

pub struct IntegrationOrchestrator<S, P> {
    source_control: S,
    pull_requests: P,
    config: RunConfig,
}

impl<S, P> IntegrationOrchestrator<S, P>
where
    S: SourceControl,
    P: PullRequestService,
{
    pub fn new(source_control: S, pull_requests: P, config: RunConfig) -> Self {
        Self {
            source_control,
            pull_requests,
            config,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn source_control(&self) -> &S {
        &self.source_control
    }

    pub fn pull_requests(&self) -> &P {
        &self.pull_requests
    }

    /// Process every integration. Never fails as a whole.
    pub async fn run(&self, metadata: &IntegrationMetadata) -> BatchOutcome {
        info!(
            integrations = metadata.len(),
            image = %self.config.image,
            base_branch = %self.config.base_branch,
            parallelism = self.config.parallelism,
            dry_run = self.config.dry_run,
            "Starting integration batch"
        );

        let integrations = stream::iter(metadata.integrations().iter().enumerate())
            .map(|(slot, integration)| self.run_integration(slot, integration))
            .buffered(self.config.parallelism.max(1))
            .collect::<Vec<_>>()
            .await;

        let batch = BatchOutcome { integrations };
        info!(
            succeeded = batch.succeeded().count(),
            failed = batch.failed().count(),
            "Integration batch finished"
        );
        batch
    }

    async fn run_integration(&self, slot: usize, integration: &Integration) -> IntegrationOutcome {
        let span = info_span!(
            "integration",
            slot,
            repository = %integration.consumer_repository
        );
        async {
            let mut lifecycle = Lifecycle::new(&integration.consumer_repository);
            let result = self.drive(slot, integration, &mut lifecycle).await;
            IntegrationOutcome {
                slot,
                consumer_repository: integration.consumer_repository.clone(),
                transitions: lifecycle.transitions,
                result,
            }
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        slot: usize,
        integration: &Integration,
        lifecycle: &mut Lifecycle<'_>,
    ) -> Result<CompletedIntegration, IntegrationFailure> {
        // Pending -> RepositoryAcquired
        let request = WorkspaceRequest {
            repository: integration.consumer_repository.clone(),
            base_branch: self.config.base_branch.clone(),
            slot,
            clone_dir: self.config.clone_dir.clone(),
        };
        let workspace = run_with_retry("prepare", &self.config.retry, || {
            self.source_control.prepare(&request)
        })
        .await
        .map_err(|err| lifecycle.fail(FailedAt::RepositoryAcquired, err, None))?;
        info!(workspace = %workspace.display(), "Repository acquired");
        lifecycle.advance(IntegrationState::RepositoryAcquired);

        // RepositoryAcquired -> ImagesPatched
        let image_replacements = self
            .patch_images(&workspace, integration)
            .map_err(|err| lifecycle.fail(FailedAt::ImagesPatched, err, None))?;
        let mut report = IntegrationReport {
            consumer_repository: integration.consumer_repository.clone(),
            image: self.config.image.to_string(),
            image_replacements,
            service_spec: Vec::new(),
        };
        let unresolved: Vec<_> = report
            .image_replacements
            .iter()
            .filter(|r| !r.is_applied())
            .cloned()
            .collect();
        if !unresolved.is_empty() {
            return Err(lifecycle.fail(
                FailedAt::ImagesPatched,
                FailureReason::ImageReplacementsUnresolved(unresolved),
                Some(report),
            ));
        }
        lifecycle.advance(IntegrationState::ImagesPatched);

        // ImagesPatched -> ServiceSpecPatched
        report.service_spec = match self.patch_service_specs(&workspace, integration) {
            Ok(results) => results,
            Err(err) => {
                return Err(lifecycle.fail(FailedAt::ServiceSpecPatched, err, Some(report)));
            }
        };
        for entry in report.service_spec.iter().filter(|e| !e.result.is_applied()) {
            warn!(
                file = entry.result.file(),
                field = %entry.field,
                status = %entry.result.status(),
                "Service-spec field needs manual action"
            );
        }
        lifecycle.advance(IntegrationState::ServiceSpecPatched);

        // ServiceSpecPatched -> Reported
        let context = report::build(&report).with_triggering_pr(self.config.triggering_pr.clone());
        let pr_body = report::render_markdown(&context);
        let publication = match self.publish(&workspace, integration, &pr_body).await {
            Ok(publication) => publication,
            Err(reason) => return Err(lifecycle.fail(FailedAt::Reported, reason, Some(report))),
        };
        lifecycle.advance(IntegrationState::Reported);

        Ok(CompletedIntegration {
            report,
            context,
            pr_body,
            publication,
        })
    }

    fn patch_images(
        &self,
        workspace: &Path,
        integration: &Integration,
    ) -> Result<Vec<PatchResult>, DocumentError> {
        let image = Node::from(self.config.image.to_string());
        let edits: Vec<FileEdit<'_>> = integration
            .replace_image
            .iter()
            .map(|replacement| FileEdit {
                file: &replacement.file,
                path: &replacement.path,
                value: image.clone(),
            })
            .collect();
        patcher::apply_all(workspace, &edits)
    }

    fn patch_service_specs(
        &self,
        workspace: &Path,
        integration: &Integration,
    ) -> Result<Vec<FieldResult>, DocumentError> {
        let mut fields: Vec<ServiceField> = Vec::new();
        let mut edits: Vec<FileEdit<'_>> = Vec::new();
        for spec in &integration.service_spec {
            for (field, patch) in spec.fields() {
                fields.push(field);
                edits.push(FileEdit {
                    file: &spec.file,
                    path: &patch.path,
                    value: Node::from(patch.value.as_str()),
                });
            }
        }

        let results = patcher::apply_all(workspace, &edits)?;
        Ok(fields
            .into_iter()
            .zip(results)
            .map(|(field, result)| FieldResult { field, result })
            .collect())
    }

    async fn publish(
        &self,
        workspace: &Path,
        integration: &Integration,
        pr_body: &str,
    ) -> Result<Publication, FailureReason> {
        let branch = self.config.image.branch_name();
        let title = self.config.image.pull_request_title();

        if self.config.dry_run {
            info!(branch = %branch, "Dry run, skipping commit, push and pull request");
            debug!(body = %pr_body, "Rendered pull request body");
            return Ok(Publication::DryRun);
        }

        if !self.source_control.has_changes(workspace).await? {
            info!("No changes against base branch, nothing to publish");
            return Ok(Publication::Unchanged);
        }

        let push = run_with_retry("publish", &self.config.retry, || {
            self.source_control.publish(workspace, &branch, &title)
        })
        .await?;

        let request = PullRequestRequest {
            repository: integration.consumer_repository.clone(),
            head_branch: branch.clone(),
            base_branch: self.config.base_branch.clone(),
            title,
            body: pr_body.to_string(),
        };
        let pull_request = run_with_retry("open_pull_request", &self.config.retry, || {
            self.pull_requests.open(&request)
        })
        .await?;
        info!(url = pull_request.url(), branch = %branch, "Integration published");

        Ok(Publication::Published { push, pull_request })
    }
}
