//! Common types used across imagebump components.

use serde::Serialize;

use crate::document::Node;
use crate::errors::ImageReferenceError;
use crate::path::StructuredPath;

/// Validated root of an integration metadata document.
///
/// Constructed once by [`crate::schema::validate`] and read-only afterwards.
/// Always holds at least one integration.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrationMetadata {
    integrations: Vec<Integration>,
}

impl IntegrationMetadata {
    pub(crate) fn new(integrations: Vec<Integration>) -> Self {
        debug_assert!(!integrations.is_empty());
        Self { integrations }
    }

    pub fn integrations(&self) -> &[Integration] {
        &self.integrations
    }

    pub fn len(&self) -> usize {
        self.integrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.integrations.is_empty()
    }
}

/// One consumer repository and the edits it needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Integration {
    /// Repository identifier, e.g. `org/repo` or a GitHub URL.
    pub consumer_repository: String,
    pub replace_image: Vec<ImageReplacement>,
    pub service_spec: Vec<ServiceSpecPatch>,
}

/// A field that must receive the new image reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageReplacement {
    /// Repository-relative file path.
    pub file: String,
    pub path: StructuredPath,
}

/// Runtime service-spec fields to rewrite in one file.
///
/// At least one of `user` / `command` is present; the schema enforces it.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSpecPatch {
    pub file: String,
    pub user: Option<FieldPatch>,
    pub command: Option<FieldPatch>,
}

impl ServiceSpecPatch {
    /// Present field patches in fixed `user`, `command` order.
    pub fn fields(&self) -> impl Iterator<Item = (ServiceField, &FieldPatch)> {
        [
            (ServiceField::User, self.user.as_ref()),
            (ServiceField::Command, self.command.as_ref()),
        ]
        .into_iter()
        .filter_map(|(field, patch)| patch.map(|patch| (field, patch)))
    }
}

/// A single `path -> value` substitution.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPatch {
    pub path: StructuredPath,
    pub value: String,
}

/// Which service-spec field a patch targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceField {
    User,
    Command,
}

impl ServiceField {
    pub fn name(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Command => "command",
        }
    }
}

impl std::fmt::Display for ServiceField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one requested field patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchStatus {
    /// The path was found and now holds the new value.
    Applied,
    /// The target file does not exist in the workspace.
    FileMissing,
    /// The file exists but the path does not resolve inside it.
    PathMissing,
}

impl std::fmt::Display for PatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Applied => write!(f, "applied"),
            Self::FileMissing => write!(f, "file missing"),
            Self::PathMissing => write!(f, "path missing"),
        }
    }
}

/// Immutable record of what happened to one `(file, path)` pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchResult {
    file: String,
    path: String,
    status: PatchStatus,
    old_value: Option<Node>,
    new_value: Node,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl PatchResult {
    pub fn applied(file: &str, path: &StructuredPath, old_value: Node, new_value: Node) -> Self {
        Self {
            file: file.to_string(),
            path: path.to_string(),
            status: PatchStatus::Applied,
            old_value: Some(old_value),
            new_value,
            detail: None,
        }
    }

    pub fn file_missing(file: &str, path: &StructuredPath, new_value: Node) -> Self {
        Self {
            file: file.to_string(),
            path: path.to_string(),
            status: PatchStatus::FileMissing,
            old_value: None,
            new_value,
            detail: None,
        }
    }

    pub fn path_missing(
        file: &str,
        path: &StructuredPath,
        new_value: Node,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            file: file.to_string(),
            path: path.to_string(),
            status: PatchStatus::PathMissing,
            old_value: None,
            new_value,
            detail: Some(detail.into()),
        }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn status(&self) -> PatchStatus {
        self.status
    }

    pub fn old_value(&self) -> Option<&Node> {
        self.old_value.as_ref()
    }

    pub fn new_value(&self) -> &Node {
        &self.new_value
    }

    /// Resolution failure description for `PathMissing` results.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn is_applied(&self) -> bool {
        self.status == PatchStatus::Applied
    }

    /// Whether applying this result altered the document.
    pub fn changed(&self) -> bool {
        self.is_applied() && self.old_value.as_ref() != Some(&self.new_value)
    }
}

/// A service-spec [`PatchResult`] tagged with the field it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldResult {
    pub field: ServiceField,
    pub result: PatchResult,
}

/// Per-integration aggregate of every patch outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrationReport {
    pub consumer_repository: String,
    pub image: String,
    /// One entry per `replace-image` item, in metadata order.
    pub image_replacements: Vec<PatchResult>,
    /// One entry per present `user`/`command` field, in metadata order.
    pub service_spec: Vec<FieldResult>,
}

/// Parsed container image reference (`name:tag`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    name: String,
    tag: String,
    short_name: String,
}

impl ImageReference {
    /// Parse `registry/org/name:tag`.
    ///
    /// The tag separator is the last `:` after the last `/`, so registries
    /// with a port (`localhost:5000/rock:1.0`) parse correctly.
    pub fn parse(raw: &str) -> Result<Self, ImageReferenceError> {
        let raw = raw.trim();
        let last_slash = raw.rfind('/').map_or(0, |idx| idx + 1);
        let Some(colon) = raw[last_slash..].rfind(':').map(|idx| idx + last_slash) else {
            return Err(ImageReferenceError::MissingTag(raw.to_string()));
        };

        let name = &raw[..colon];
        let tag = &raw[colon + 1..];
        let short_name = &name[last_slash.min(name.len())..];
        if name.is_empty() || tag.is_empty() || short_name.is_empty() {
            return Err(ImageReferenceError::InvalidFormat(raw.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            tag: tag.to_string(),
            short_name: short_name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Final path component of the image name.
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// Deterministic branch for this image; re-runs target the same branch.
    pub fn branch_name(&self) -> String {
        format!("integrate-{}-{}", self.short_name, self.tag)
    }

    /// Pull request title, also used as the commit message.
    pub fn pull_request_title(&self) -> String {
        format!("chore: integrate rock image {}:{}", self.short_name, self.tag)
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}
