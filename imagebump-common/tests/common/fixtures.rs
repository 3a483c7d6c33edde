use std::path::Path;

use imagebump_common::{
    BatchOutcome, DocumentFormat, ImageReference, IntegrationMetadata, IntegrationOrchestrator,
    MockPullRequestService, MockSourceControl, RunConfig, document, validate_metadata,
};
use tempfile::TempDir;

pub const IMAGE: &str = "ghcr.io/canonical/kserve-controller:0.14.1";

/// Two integrations against the same kserve repository layout: one whose
/// service spec is absent, one whose service spec exists.
pub const KSERVE_METADATA: &str = r#"
integrations:
- consumer-repository: canonical/kserve-operators
  replace-image:
  - file: charms/kserve-controller/metadata.yaml
    path: resources.kserve-controller-image.upstream-source
  - file: charms/kserve-controller/src/default-custom-images.json
    path: configmap__batcher
  - file: charms/kserve-controller/config.yaml
    path: options.no-proxy.default
  service-spec:
  - file: service-spec-missing.yaml
    user:
      path: user
      value: _daemon_
    command:
      path: command
      value: /manager
- consumer-repository: canonical/kserve-rocks-consumer
  replace-image:
  - file: charms/kserve-controller/metadata.yaml
    path: resources.kserve-controller-image.upstream-source
  service-spec:
  - file: service-spec.yaml
    user:
      path: services.manager.user
      value: _daemon_
"#;

const CHARM_METADATA: &str = "\
name: kserve-controller
resources:
  kserve-controller-image:
    type: oci-image
    upstream-source: ghcr.io/canonical/kserve-controller:0.13.0
";

const CUSTOM_IMAGES: &str = r#"{
    "configmap__batcher": "kserve/agent:v0.13.0",
    "configmap__explainers__art": "kserve/art-explainer:v0.13.0"
}
"#;

const CHARM_CONFIG: &str = "\
options:
  no-proxy:
    default: ''
    type: string
";

const SERVICE_SPEC: &str = "\
services:
  manager:
    user: root
    command: /manager
";

/// Service spec for the first integration, carrying both fields it patches.
pub const OPERATORS_SERVICE_SPEC: &str = "\
# Rock service spec
user: root
command: /bin/old-manager  # replaced on integration
";

/// Seed kserve-operators with a service spec at the path its integration names.
pub fn seed_operators_service_spec(git: &MockSourceControl) {
    git.seed(
        "canonical/kserve-operators",
        "service-spec-missing.yaml",
        OPERATORS_SERVICE_SPEC,
    );
}

pub fn metadata_from_yaml(text: &str) -> IntegrationMetadata {
    let raw = document::parse(text, DocumentFormat::Yaml, Path::new("rock-ci-metadata.yaml"))
        .expect("metadata fixture must parse");
    validate_metadata(&raw).expect("metadata fixture must validate")
}

/// Source control seeded with both kserve repositories.
pub fn kserve_source_control() -> MockSourceControl {
    let git = MockSourceControl::new();
    for repository in ["canonical/kserve-operators", "canonical/kserve-rocks-consumer"] {
        git.seed(repository, "charms/kserve-controller/metadata.yaml", CHARM_METADATA);
    }
    git.seed(
        "canonical/kserve-operators",
        "charms/kserve-controller/src/default-custom-images.json",
        CUSTOM_IMAGES,
    );
    git.seed(
        "canonical/kserve-operators",
        "charms/kserve-controller/config.yaml",
        CHARM_CONFIG,
    );
    git.seed("canonical/kserve-rocks-consumer", "service-spec.yaml", SERVICE_SPEC);
    git
}

/// An orchestrator over mocks plus the directory its workspaces live in.
pub struct ScenarioRun {
    pub clone_dir: TempDir,
    pub orchestrator: IntegrationOrchestrator<MockSourceControl, MockPullRequestService>,
}

impl ScenarioRun {
    pub fn new(git: MockSourceControl, prs: MockPullRequestService) -> Self {
        Self::with_config(git, prs, |config| config)
    }

    pub fn with_config(
        git: MockSourceControl,
        prs: MockPullRequestService,
        adjust: impl FnOnce(RunConfig) -> RunConfig,
    ) -> Self {
        crate::test_log!("FIXTURE: Creating scenario run for {}", IMAGE);
        let clone_dir = TempDir::new().expect("Failed to create clone dir");
        let image = ImageReference::parse(IMAGE).expect("fixture image must parse");
        let config = RunConfig::new("main", image, clone_dir.path().to_path_buf()).without_backoff();
        let orchestrator = IntegrationOrchestrator::new(git, prs, adjust(config));
        Self {
            clone_dir,
            orchestrator,
        }
    }

    pub async fn run(&self, metadata: &IntegrationMetadata) -> BatchOutcome {
        self.orchestrator.run(metadata).await
    }

    pub fn git(&self) -> &MockSourceControl {
        self.orchestrator.source_control()
    }

    pub fn prs(&self) -> &MockPullRequestService {
        self.orchestrator.pull_requests()
    }
}
