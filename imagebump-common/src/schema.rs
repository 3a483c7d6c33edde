//! Integration metadata schema.
//!
//! Validation walks the raw document tree once and records every violation
//! it finds, each tagged with its location (`integrations[0].replace-image[1].path`).
//! A typed [`IntegrationMetadata`] is only built when no violation was found,
//! so callers never see a partially-populated record.
//!
//! Shape:
//!
//! ```yaml
//! integrations:                       # required, at least one item
//!   - consumer-repository: org/repo   # required, non-empty string
//!     replace-image:                  # required, at least one item
//!       - file: metadata.yaml
//!         path: resources.my-rock.upstream-source
//!     service-spec:                   # optional
//!       - file: service-spec.yaml
//!         user:    { path: user, value: _daemon_ }     # user and/or command
//!         command: { path: command, value: "..." }
//! ```
//!
//! Unknown keys are rejected at the root. Inside integrations they are
//! ignored and logged at debug level.

use std::path::Path;

use tracing::debug;

use crate::document::{self, Mapping, Node};
use crate::errors::{MetadataError, SchemaValidationError, Violation};
use crate::path::StructuredPath;
use crate::types::{
    FieldPatch, ImageReplacement, Integration, IntegrationMetadata, ServiceSpecPatch,
};

const ROOT_KEYS: &[&str] = &["integrations"];
const INTEGRATION_KEYS: &[&str] = &["consumer-repository", "replace-image", "service-spec"];
const REPLACEMENT_KEYS: &[&str] = &["file", "path"];
const SERVICE_SPEC_KEYS: &[&str] = &["file", "user", "command"];
const FIELD_KEYS: &[&str] = &["path", "value"];

/// Load and validate a metadata file (YAML or JSON by extension).
pub fn load_metadata_file(path: &Path) -> Result<IntegrationMetadata, MetadataError> {
    let raw = document::load(path)?;
    let metadata = validate(&raw)?;
    debug!(
        path = %path.display(),
        integrations = metadata.len(),
        "Loaded integration metadata"
    );
    Ok(metadata)
}

/// Validate a raw metadata tree.
pub fn validate(raw: &Node) -> Result<IntegrationMetadata, SchemaValidationError> {
    let mut validator = Validator::default();
    let integrations = validator.root(raw);
    if validator.violations.is_empty() {
        Ok(IntegrationMetadata::new(integrations))
    } else {
        Err(SchemaValidationError {
            violations: validator.violations,
        })
    }
}

fn child(location: &str, key: &str) -> String {
    if location.is_empty() {
        key.to_string()
    } else {
        format!("{location}.{key}")
    }
}

fn item(location: &str, index: usize) -> String {
    format!("{location}[{index}]")
}

#[derive(Default)]
struct Validator {
    violations: Vec<Violation>,
}

impl Validator {
    fn report(&mut self, location: &str, message: impl Into<String>) {
        self.violations.push(Violation {
            location: location.to_string(),
            message: message.into(),
        });
    }

    fn mapping<'n>(&mut self, node: &'n Node, location: &str) -> Option<&'n Mapping> {
        let mapping = node.as_mapping();
        if mapping.is_none() {
            self.report(location, format!("expected a mapping, found a {}", node.kind()));
        }
        mapping
    }

    fn reject_unknown_keys(&mut self, mapping: &Mapping, allowed: &[&str], location: &str) {
        for key in mapping.keys().filter(|key| !allowed.contains(key)) {
            self.report(
                &child(location, key),
                format!("unknown key (expected one of: {})", allowed.join(", ")),
            );
        }
    }

    fn ignore_unknown_keys(&self, mapping: &Mapping, allowed: &[&str], location: &str) {
        for key in mapping.keys().filter(|key| !allowed.contains(key)) {
            debug!(location = %child(location, key), "Ignoring unknown metadata key");
        }
    }

    fn required<'n>(&mut self, mapping: &'n Mapping, key: &str, location: &str) -> Option<&'n Node> {
        let value = mapping.get(key);
        if value.is_none() {
            self.report(location, format!("missing required key '{key}'"));
        }
        value
    }

    /// A string; `non_empty` additionally rejects `""`.
    fn string(&mut self, node: &Node, location: &str, non_empty: bool) -> Option<String> {
        match node.as_str() {
            Some(value) if non_empty && value.trim().is_empty() => {
                self.report(location, "must be a non-empty string");
                None
            }
            Some(value) => Some(value.to_string()),
            None => {
                self.report(location, format!("expected a string, found a {}", node.kind()));
                None
            }
        }
    }

    fn sequence<'n>(&mut self, node: &'n Node, location: &str, min_items: usize) -> Option<&'n [Node]> {
        match node.as_sequence() {
            Some(items) if items.len() < min_items => {
                self.report(location, format!("must contain at least {min_items} item(s)"));
                None
            }
            Some(items) => Some(items),
            None => {
                self.report(location, format!("expected a sequence, found a {}", node.kind()));
                None
            }
        }
    }

    fn path(&mut self, node: &Node, location: &str) -> Option<StructuredPath> {
        let raw = self.string(node, location, true)?;
        match raw.parse::<StructuredPath>() {
            Ok(path) => Some(path),
            Err(err) => {
                self.report(location, err.to_string());
                None
            }
        }
    }

    fn root(&mut self, raw: &Node) -> Vec<Integration> {
        let Some(root) = self.mapping(raw, "") else {
            return Vec::new();
        };
        self.reject_unknown_keys(root, ROOT_KEYS, "");

        let Some(node) = self.required(root, "integrations", "") else {
            return Vec::new();
        };
        let Some(items) = self.sequence(node, "integrations", 1) else {
            return Vec::new();
        };

        items
            .iter()
            .enumerate()
            .filter_map(|(index, node)| self.integration(node, &item("integrations", index)))
            .collect()
    }

    fn integration(&mut self, node: &Node, location: &str) -> Option<Integration> {
        let mapping = self.mapping(node, location)?;
        self.ignore_unknown_keys(mapping, INTEGRATION_KEYS, location);

        let repository = self
            .required(mapping, "consumer-repository", location)
            .and_then(|node| self.string(node, &child(location, "consumer-repository"), true));

        let replace_image = self
            .required(mapping, "replace-image", location)
            .and_then(|node| self.replacements(node, &child(location, "replace-image")));

        let service_spec = match mapping.get("service-spec") {
            Some(node) => self.service_specs(node, &child(location, "service-spec")),
            None => Some(Vec::new()),
        };

        Some(Integration {
            consumer_repository: repository?,
            replace_image: replace_image?,
            service_spec: service_spec?,
        })
    }

    fn replacements(&mut self, node: &Node, location: &str) -> Option<Vec<ImageReplacement>> {
        let items = self.sequence(node, location, 1)?;
        let parsed: Vec<_> = items
            .iter()
            .enumerate()
            .map(|(index, node)| self.replacement(node, &item(location, index)))
            .collect();
        parsed.into_iter().collect()
    }

    fn replacement(&mut self, node: &Node, location: &str) -> Option<ImageReplacement> {
        let mapping = self.mapping(node, location)?;
        self.ignore_unknown_keys(mapping, REPLACEMENT_KEYS, location);

        let file = self
            .required(mapping, "file", location)
            .and_then(|node| self.string(node, &child(location, "file"), true));
        let path = self
            .required(mapping, "path", location)
            .and_then(|node| self.path(node, &child(location, "path")));

        Some(ImageReplacement {
            file: file?,
            path: path?,
        })
    }

    fn service_specs(&mut self, node: &Node, location: &str) -> Option<Vec<ServiceSpecPatch>> {
        let items = self.sequence(node, location, 0)?;
        let parsed: Vec<_> = items
            .iter()
            .enumerate()
            .map(|(index, node)| self.service_spec(node, &item(location, index)))
            .collect();
        parsed.into_iter().collect()
    }

    fn service_spec(&mut self, node: &Node, location: &str) -> Option<ServiceSpecPatch> {
        let mapping = self.mapping(node, location)?;
        self.ignore_unknown_keys(mapping, SERVICE_SPEC_KEYS, location);

        let file = self
            .required(mapping, "file", location)
            .and_then(|node| self.string(node, &child(location, "file"), true));

        if !mapping.contains_key("user") && !mapping.contains_key("command") {
            self.report(location, "At least one of 'user' or 'command' must be provided");
            return None;
        }

        let mut complete = true;
        let mut field = |this: &mut Self, key: &str| -> Option<FieldPatch> {
            let node = mapping.get(key)?;
            let patch = this.field_patch(node, &child(location, key));
            complete &= patch.is_some();
            patch
        };
        let user = field(self, "user");
        let command = field(self, "command");

        if !complete {
            return None;
        }
        Some(ServiceSpecPatch {
            file: file?,
            user,
            command,
        })
    }

    fn field_patch(&mut self, node: &Node, location: &str) -> Option<FieldPatch> {
        let mapping = self.mapping(node, location)?;
        self.ignore_unknown_keys(mapping, FIELD_KEYS, location);

        let path = self
            .required(mapping, "path", location)
            .and_then(|node| self.path(node, &child(location, "path")));
        let value = self
            .required(mapping, "value", location)
            .and_then(|node| self.string(node, &child(location, "value"), false));

        Some(FieldPatch {
            path: path?,
            value: value?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentFormat, parse};

    fn yaml(text: &str) -> Node {
        parse(text, DocumentFormat::Yaml, Path::new("metadata.yaml")).unwrap()
    }

    const VALID: &str = r#"
integrations:
  - consumer-repository: https://github.com/canonical/kfp-operators
    replace-image:
      - file: charms/kfp-api/metadata.yaml
        path: resources.oci-image.upstream-source
      - file: charms/kfp-api/config.yaml
        path: spec.containers[0].image
    service-spec:
      - file: charms/kfp-api/service-config.yaml
        user:
          path: user
          value: _daemon_
        command:
          path: command
          value: "bash -c 'echo hello'"
"#;

    #[test]
    fn test_valid_metadata() {
        let metadata = validate(&yaml(VALID)).unwrap();
        assert_eq!(metadata.len(), 1);

        let integration = &metadata.integrations()[0];
        assert_eq!(
            integration.consumer_repository,
            "https://github.com/canonical/kfp-operators"
        );
        assert_eq!(integration.replace_image.len(), 2);
        assert_eq!(
            integration.replace_image[1].path.to_string(),
            "spec.containers[0].image"
        );

        let spec = &integration.service_spec[0];
        assert_eq!(spec.file, "charms/kfp-api/service-config.yaml");
        assert_eq!(spec.user.as_ref().unwrap().value, "_daemon_");
        assert_eq!(
            spec.command.as_ref().unwrap().value,
            "bash -c 'echo hello'"
        );
    }

    #[test]
    fn test_service_spec_optional() {
        let metadata = validate(&yaml(
            "integrations:\n- consumer-repository: org/repo\n  replace-image:\n  - {file: f.yaml, path: some.path}\n",
        ))
        .unwrap();
        assert!(metadata.integrations()[0].service_spec.is_empty());
    }

    #[test]
    fn test_only_command_is_enough() {
        let metadata = validate(&yaml(
            r#"
integrations:
- consumer-repository: org/repo
  replace-image: [{file: f.yaml, path: a}]
  service-spec:
  - file: svc.yaml
    command: {path: command, value: run}
"#,
        ))
        .unwrap();
        let spec = &metadata.integrations()[0].service_spec[0];
        assert!(spec.user.is_none());
        assert!(spec.command.is_some());
    }

    #[test]
    fn test_root_must_be_mapping() {
        let err = validate(&yaml("- a\n- b\n")).unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert!(err.violations[0].message.contains("expected a mapping"));
    }

    #[test]
    fn test_missing_integrations() {
        let err = validate(&yaml("{}")).unwrap_err();
        assert!(err.violations[0].message.contains("'integrations'"));
    }

    #[test]
    fn test_empty_integrations() {
        let err = validate(&yaml("integrations: []")).unwrap_err();
        assert!(err.has_violation_at("integrations"));
    }

    #[test]
    fn test_unknown_nested_keys_are_ignored() {
        let text = VALID
            .replace(
                "  - consumer-repository:",
                "  - channel: latest/edge\n    consumer-repository:",
            )
            .replace(
                "        path: resources.oci-image.upstream-source",
                "        path: resources.oci-image.upstream-source\n        note: pinned",
            )
            .replace(
                "          value: _daemon_",
                "          value: _daemon_\n          comment: non-root",
            );
        let metadata = validate(&yaml(&text)).unwrap();
        let integration = &metadata.integrations()[0];
        assert_eq!(integration.replace_image.len(), 2);
        assert_eq!(
            integration.service_spec[0].user.as_ref().unwrap().value,
            "_daemon_"
        );
    }

    #[test]
    fn test_extra_root_key_rejected() {
        let err = validate(&yaml(&format!("{VALID}\nextra: true\n"))).unwrap_err();
        assert!(err.has_violation_at("extra"));
        assert_eq!(err.violations.len(), 1);
    }

    #[test]
    fn test_missing_replace_image() {
        let err = validate(&yaml(
            "integrations:\n- consumer-repository: https://example.com/repo.git\n",
        ))
        .unwrap_err();
        assert!(err.has_violation_at("integrations[0]"));
        assert!(err.to_string().contains("'replace-image'"));
    }

    #[test]
    fn test_service_spec_requires_user_or_command() {
        let err = validate(&yaml(
            r#"
integrations:
- consumer-repository: org/repo
  replace-image: [{file: f.yaml, path: a}]
  service-spec: [{file: svc.yaml}]
"#,
        ))
        .unwrap_err();
        assert!(err.has_violation_at("integrations[0].service-spec[0]"));
        assert!(err.to_string().contains("At least one of 'user' or 'command'"));
    }

    #[test]
    fn test_field_patch_requires_path_and_value() {
        let err = validate(&yaml(
            r#"
integrations:
- consumer-repository: org/repo
  replace-image: [{file: f.yaml, path: a}]
  service-spec:
  - file: svc.yaml
    user: {path: user}
    command: {value: run}
"#,
        ))
        .unwrap_err();
        assert!(err.has_violation_at("integrations[0].service-spec[0].user"));
        assert!(err.has_violation_at("integrations[0].service-spec[0].command"));
        assert_eq!(err.violations.len(), 2);
    }

    #[test]
    fn test_collects_all_violations() {
        let err = validate(&yaml(
            r#"
integrations:
- replace-image:
  - {file: "", path: a}
  - {file: f.yaml, path: "a..b"}
- consumer-repository: org/other
  replace-image: [{file: f.yaml}]
  colour: blue
"#,
        ))
        .unwrap_err();
        assert!(err.has_violation_at("integrations[0]"));
        assert!(err.has_violation_at("integrations[0].replace-image[0].file"));
        assert!(err.has_violation_at("integrations[0].replace-image[1].path"));
        assert!(err.has_violation_at("integrations[1].replace-image[0]"));
        assert!(err.has_violation_at("integrations[1].colour"));
        assert_eq!(err.violations.len(), 5);
    }

    #[test]
    fn test_wrong_types_reported() {
        let err = validate(&yaml(
            r#"
integrations:
- consumer-repository: 42
  replace-image: {file: f.yaml, path: a}
  service-spec:
  - file: svc.yaml
    user: {path: user, value: 1000}
"#,
        ))
        .unwrap_err();
        assert!(err.has_violation_at("integrations[0].consumer-repository"));
        assert!(err.has_violation_at("integrations[0].replace-image"));
        assert!(err.has_violation_at("integrations[0].service-spec[0].user.value"));
    }

    #[test]
    fn test_load_metadata_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("rock-ci-metadata.yaml");
        std::fs::write(&file, VALID).unwrap();
        let metadata = load_metadata_file(&file).unwrap();
        assert_eq!(metadata.len(), 1);

        let missing = load_metadata_file(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(missing, MetadataError::Document(_)));

        std::fs::write(&file, "integrations: []\n").unwrap();
        let invalid = load_metadata_file(&file).unwrap_err();
        assert!(matches!(invalid, MetadataError::Schema(_)));
    }
}
