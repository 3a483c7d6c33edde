//! Pull request description context and its default Markdown rendering.

use std::fmt::Write as _;

use serde::Serialize;

use crate::types::{IntegrationReport, PatchStatus, ServiceField};

/// An image reference that now points at the new image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdatedReference {
    pub file: String,
    pub path: String,
}

/// A service-spec field that was rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchedField {
    pub file: String,
    pub field_name: ServiceField,
    pub path: String,
    pub value: String,
}

/// A service-spec field whose file does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManualAction {
    pub file: String,
    pub field_name: ServiceField,
    pub value: String,
}

/// A service-spec field whose path did not resolve in an existing file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathProblem {
    pub file: String,
    pub field_name: ServiceField,
    pub path: String,
    pub value: String,
    pub detail: String,
}

/// Everything the PR description needs, already partitioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrBodyContext {
    pub consumer_repository: String,
    pub image: String,
    pub updated_references: Vec<UpdatedReference>,
    pub patched_fields: Vec<PatchedField>,
    pub manual_actions: Vec<ManualAction>,
    pub path_problems: Vec<PathProblem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggering_pr: Option<String>,
}

impl PrBodyContext {
    pub fn with_triggering_pr(mut self, url: Option<String>) -> Self {
        self.triggering_pr = url;
        self
    }

    pub fn requires_manual_action(&self) -> bool {
        !self.manual_actions.is_empty() || !self.path_problems.is_empty()
    }
}

/// Partition an integration report for the PR description. Input order is
/// preserved within every list.
pub fn build(report: &IntegrationReport) -> PrBodyContext {
    let updated_references = report
        .image_replacements
        .iter()
        .filter(|r| r.is_applied())
        .map(|r| UpdatedReference {
            file: r.file().to_string(),
            path: r.path().to_string(),
        })
        .collect();

    let mut patched_fields = Vec::new();
    let mut manual_actions = Vec::new();
    let mut path_problems = Vec::new();
    for entry in &report.service_spec {
        let result = &entry.result;
        let value = result.new_value().to_string();
        match result.status() {
            PatchStatus::Applied => patched_fields.push(PatchedField {
                file: result.file().to_string(),
                field_name: entry.field,
                path: result.path().to_string(),
                value,
            }),
            PatchStatus::FileMissing => manual_actions.push(ManualAction {
                file: result.file().to_string(),
                field_name: entry.field,
                value,
            }),
            PatchStatus::PathMissing => path_problems.push(PathProblem {
                file: result.file().to_string(),
                field_name: entry.field,
                path: result.path().to_string(),
                value,
                detail: result.detail().unwrap_or_default().to_string(),
            }),
        }
    }

    PrBodyContext {
        consumer_repository: report.consumer_repository.clone(),
        image: report.image.clone(),
        updated_references,
        patched_fields,
        manual_actions,
        path_problems,
        triggering_pr: None,
    }
}

/// Default Markdown PR body.
pub fn render_markdown(context: &PrBodyContext) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## Integrate rock image `{}`", context.image);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "This pull request updates `{}` to use the newly published rock image.",
        context.consumer_repository
    );
    if let Some(url) = &context.triggering_pr {
        let _ = writeln!(out);
        let _ = writeln!(out, "Triggered by: {url}");
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "### Updated image references");
    let _ = writeln!(out);
    for reference in &context.updated_references {
        let _ = writeln!(out, "- `{}`: `{}`", reference.file, reference.path);
    }

    if !context.patched_fields.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "### Service spec updates");
        let _ = writeln!(out);
        for field in &context.patched_fields {
            let _ = writeln!(
                out,
                "- `{}`: `{}` at `{}` set to `{}`",
                field.file, field.field_name, field.path, field.value
            );
        }
    }

    if !context.manual_actions.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "### Manual action required");
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "The following service-spec files were not found in this repository. \
             Please apply these values by hand:"
        );
        let _ = writeln!(out);
        for action in &context.manual_actions {
            let _ = writeln!(
                out,
                "- `{}`: set `{}` to `{}`",
                action.file, action.field_name, action.value
            );
        }
    }

    if !context.path_problems.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "### Unresolved service-spec paths");
        let _ = writeln!(out);
        for problem in &context.path_problems {
            let _ = writeln!(
                out,
                "- `{}`: `{}` at `{}` (wanted `{}`): {}",
                problem.file, problem.field_name, problem.path, problem.value, problem.detail
            );
        }
    }

    out
}
