//! Apply path substitutions to files inside a repository workspace.
//!
//! Each file is loaded once, every requested edit is applied to the same
//! in-memory tree, and the file is written back at most once. Changed scalars
//! are spliced into the original text so comments and formatting survive; the
//! tree is re-rendered only when splicing cannot reproduce it. A missing file
//! and a missing path are distinct outcomes reported per edit, never errors;
//! only I/O and parse failures surface as [`DocumentError`].

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, warn};

use crate::document::{self, DocumentError, DocumentFormat, Node};
use crate::path::{self, StructuredPath};
use crate::splice;
use crate::types::PatchResult;

/// One `path -> value` edit within a single file.
#[derive(Debug, Clone)]
pub struct FieldEdit<'a> {
    pub path: &'a StructuredPath,
    pub value: Node,
}

/// One edit addressed by file, for batches spanning several files.
#[derive(Debug, Clone)]
pub struct FileEdit<'a> {
    pub file: &'a str,
    pub path: &'a StructuredPath,
    pub value: Node,
}

/// Outcome of patching one file.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchedFile {
    /// One result per requested edit, in request order.
    pub results: Vec<PatchResult>,
    /// Whether the file was rewritten on disk.
    pub written: bool,
}

/// Join a metadata-supplied relative path onto the workspace root.
///
/// Absolute paths and `..` components are rejected.
pub fn workspace_path(workspace_root: &Path, file: &str) -> Result<PathBuf, DocumentError> {
    let relative = Path::new(file);
    let escapes = relative.components().any(|component| {
        matches!(
            component,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if file.trim().is_empty() || escapes {
        return Err(DocumentError::OutsideWorkspace {
            file: file.to_string(),
        });
    }
    Ok(workspace_root.join(relative))
}

/// Apply `edits` to `file` under `workspace_root`.
pub fn apply(
    workspace_root: &Path,
    file: &str,
    edits: &[FieldEdit<'_>],
) -> Result<PatchedFile, DocumentError> {
    let target = workspace_path(workspace_root, file)?;

    if !target.is_file() {
        debug!(file, edits = edits.len(), "File not present in workspace");
        let results = edits
            .iter()
            .map(|edit| PatchResult::file_missing(file, edit.path, edit.value.clone()))
            .collect();
        return Ok(PatchedFile {
            results,
            written: false,
        });
    }

    let format = DocumentFormat::from_path(&target);
    let source = document::read_text(&target)?;
    let mut tree = document::parse(&source, format, &target)?;
    let results: Vec<PatchResult> = edits
        .iter()
        .map(|edit| match path::write(&mut tree, edit.path, edit.value.clone()) {
            Ok(old) => {
                debug!(file, path = %edit.path, old = %old, new = %edit.value, "Patched field");
                PatchResult::applied(file, edit.path, old, edit.value.clone())
            }
            Err(err) => {
                debug!(file, path = %edit.path, error = %err, "Path not found");
                PatchResult::path_missing(file, edit.path, edit.value.clone(), err.to_string())
            }
        })
        .collect();

    let written = results.iter().any(PatchResult::changed);
    if written {
        let changed: Vec<(&StructuredPath, &Node)> = edits
            .iter()
            .zip(&results)
            .filter(|(_, result)| result.changed())
            .map(|(edit, _)| (edit.path, &edit.value))
            .collect();
        match spliced(&source, format, &target, &changed, &tree) {
            Some(text) => document::write_text(&target, &text)?,
            None => document::save(&target, &tree)?,
        }
        info!(
            file,
            applied = results.iter().filter(|r| r.is_applied()).count(),
            "Wrote patched file"
        );
    } else {
        debug!(file, "No changes, file left untouched");
    }

    Ok(PatchedFile { results, written })
}

/// Splice `changed` into `source`, accepting the result only if it parses to
/// exactly `expected`.
fn spliced(
    source: &str,
    format: DocumentFormat,
    target: &Path,
    changed: &[(&StructuredPath, &Node)],
    expected: &Node,
) -> Option<String> {
    let text = match splice::splice(source, format, changed) {
        Ok(text) => text,
        Err(err) => {
            warn!(file = %target.display(), error = %err, "Re-rendering file, formatting will not be preserved");
            return None;
        }
    };
    match document::parse(&text, format, target) {
        Ok(reparsed) if &reparsed == expected => Some(text),
        _ => {
            warn!(file = %target.display(), "In-place edit did not reproduce the patched document, re-rendering");
            None
        }
    }
}

/// Apply edits spanning several files.
///
/// Edits are grouped so each file is loaded and written at most once; the
/// returned results follow the order of `edits`.
pub fn apply_all(
    workspace_root: &Path,
    edits: &[FileEdit<'_>],
) -> Result<Vec<PatchResult>, DocumentError> {
    let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();
    let mut group_of: HashMap<&str, usize> = HashMap::new();
    for (index, edit) in edits.iter().enumerate() {
        let slot = *group_of.entry(edit.file).or_insert_with(|| {
            groups.push((edit.file, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(index);
    }

    let mut ordered: Vec<Option<PatchResult>> = vec![None; edits.len()];
    for (file, indices) in groups {
        let field_edits: Vec<FieldEdit<'_>> = indices
            .iter()
            .map(|&i| FieldEdit {
                path: edits[i].path,
                value: edits[i].value.clone(),
            })
            .collect();
        let patched = apply(workspace_root, file, &field_edits)?;
        for (index, result) in indices.into_iter().zip(patched.results) {
            ordered[index] = Some(result);
        }
    }

    Ok(ordered.into_iter().flatten().collect())
}
