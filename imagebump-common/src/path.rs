//! Structured path expressions over document trees.
//!
//! A path such as `resources.my-rock.upstream-source` or
//! `containers[0].command[1]` is parsed once into a sequence of
//! [`PathSegment`]s and then evaluated against a [`Node`]. Resolution never
//! creates missing structure: an absent key or index is always reported as a
//! [`PathNotFoundError`].

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::document::Node;

/// One step of a structured path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Mapping key.
    Key(String),
    /// Zero-based sequence index.
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// Malformed path expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathSyntaxError {
    #[error("path expression is empty")]
    Empty,

    #[error("empty segment in path '{path}'")]
    EmptySegment { path: String },

    #[error("unclosed '[' in path '{path}'")]
    UnclosedBracket { path: String },

    #[error("invalid index '{index}' in path '{path}'")]
    InvalidIndex { path: String, index: String },

    #[error("unexpected characters '{rest}' after index in path '{path}'")]
    TrailingCharacters { path: String, rest: String },

    #[error("unexpected ']' in path '{path}'")]
    UnexpectedBracket { path: String },
}

/// Parsed dot/bracket path expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructuredPath {
    raw: String,
    segments: Vec<PathSegment>,
}

impl StructuredPath {
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Render the first `depth` segments back to path syntax.
    fn prefix(&self, depth: usize) -> String {
        render_segments(&self.segments[..depth.min(self.segments.len())])
    }
}

impl fmt::Display for StructuredPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for StructuredPath {
    type Err = PathSyntaxError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let segments = parse_segments(raw)?;
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }
}

fn render_segments(segments: &[PathSegment]) -> String {
    let mut out = String::new();
    for segment in segments {
        if let PathSegment::Key(key) = segment
            && !out.is_empty()
        {
            out.push('.');
            out.push_str(key);
        } else {
            out.push_str(&segment.to_string());
        }
    }
    out
}

fn parse_segments(raw: &str) -> Result<Vec<PathSegment>, PathSyntaxError> {
    if raw.trim().is_empty() {
        return Err(PathSyntaxError::Empty);
    }

    let mut segments = Vec::new();
    for part in raw.split('.') {
        if part.is_empty() {
            return Err(PathSyntaxError::EmptySegment {
                path: raw.to_string(),
            });
        }

        let (name, mut rest) = match part.find('[') {
            Some(open) => (&part[..open], &part[open..]),
            None => (part, ""),
        };
        if name.contains(']') {
            return Err(PathSyntaxError::UnexpectedBracket {
                path: raw.to_string(),
            });
        }
        if !name.is_empty() {
            segments.push(PathSegment::Key(name.to_string()));
        }

        while !rest.is_empty() {
            let Some(inner) = rest.strip_prefix('[') else {
                return Err(PathSyntaxError::TrailingCharacters {
                    path: raw.to_string(),
                    rest: rest.to_string(),
                });
            };
            let Some(close) = inner.find(']') else {
                return Err(PathSyntaxError::UnclosedBracket {
                    path: raw.to_string(),
                });
            };
            let digits = &inner[..close];
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(PathSyntaxError::InvalidIndex {
                    path: raw.to_string(),
                    index: digits.to_string(),
                });
            }
            let index = digits
                .parse::<usize>()
                .map_err(|_| PathSyntaxError::InvalidIndex {
                    path: raw.to_string(),
                    index: digits.to_string(),
                })?;
            segments.push(PathSegment::Index(index));
            rest = &inner[close + 1..];
        }
    }

    Ok(segments)
}

/// Why a segment failed to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFoundReason {
    /// The mapping has no such key.
    MissingKey,
    /// The sequence is shorter than the requested index.
    IndexOutOfRange { len: usize },
    /// A key was requested from something that is not a mapping.
    NotAMapping { found: &'static str },
    /// An index was requested from something that is not a sequence.
    NotASequence { found: &'static str },
}

impl fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingKey => write!(f, "key not found"),
            Self::IndexOutOfRange { len } => {
                write!(f, "index out of range (sequence has {len} items)")
            }
            Self::NotAMapping { found } => write!(f, "expected a mapping, found a {found}"),
            Self::NotASequence { found } => write!(f, "expected a sequence, found a {found}"),
        }
    }
}

/// A path did not resolve against a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no match for path '{path}': {reason} at '{segment}' (resolved so far: '{consumed}')")]
pub struct PathNotFoundError {
    /// Full path expression.
    pub path: String,
    /// The segment that failed.
    pub segment: String,
    /// Path prefix that did resolve.
    pub consumed: String,
    pub reason: NotFoundReason,
}

/// Resolved write location: the slot inside its direct parent container.
#[derive(Debug)]
pub struct WriteTarget<'a> {
    slot: &'a mut Node,
    terminal: &'a PathSegment,
}

impl<'a> WriteTarget<'a> {
    /// Current value at the location.
    pub fn current(&self) -> &Node {
        self.slot
    }

    /// Terminal key or index within the parent container.
    pub fn terminal(&self) -> &PathSegment {
        self.terminal
    }

    /// Overwrite in place, returning the previous value.
    pub fn replace(self, value: Node) -> Node {
        std::mem::replace(self.slot, value)
    }
}

fn step<'n>(node: &'n Node, segment: &PathSegment) -> Result<&'n Node, NotFoundReason> {
    match (node, segment) {
        (Node::Mapping(map), PathSegment::Key(key)) => map.get(key).ok_or(NotFoundReason::MissingKey),
        (Node::Sequence(items), PathSegment::Index(index)) => items
            .get(*index)
            .ok_or(NotFoundReason::IndexOutOfRange { len: items.len() }),
        (other, PathSegment::Key(_)) => Err(NotFoundReason::NotAMapping { found: other.kind() }),
        (other, PathSegment::Index(_)) => Err(NotFoundReason::NotASequence { found: other.kind() }),
    }
}

fn step_mut<'n>(node: &'n mut Node, segment: &PathSegment) -> Result<&'n mut Node, NotFoundReason> {
    match (node, segment) {
        (Node::Mapping(map), PathSegment::Key(key)) => {
            map.get_mut(key).ok_or(NotFoundReason::MissingKey)
        }
        (Node::Sequence(items), PathSegment::Index(index)) => {
            let len = items.len();
            items
                .get_mut(*index)
                .ok_or(NotFoundReason::IndexOutOfRange { len })
        }
        (other, PathSegment::Key(_)) => Err(NotFoundReason::NotAMapping { found: other.kind() }),
        (other, PathSegment::Index(_)) => Err(NotFoundReason::NotASequence { found: other.kind() }),
    }
}

fn not_found(path: &StructuredPath, depth: usize, reason: NotFoundReason) -> PathNotFoundError {
    PathNotFoundError {
        path: path.to_string(),
        segment: path.segments[depth].to_string(),
        consumed: path.prefix(depth),
        reason,
    }
}

/// Read the node at `path`.
pub fn resolve<'n>(tree: &'n Node, path: &StructuredPath) -> Result<&'n Node, PathNotFoundError> {
    let mut current = tree;
    for (depth, segment) in path.segments.iter().enumerate() {
        current = step(current, segment).map_err(|reason| not_found(path, depth, reason))?;
    }
    Ok(current)
}

/// Locate the slot addressed by `path` for an in-place overwrite.
pub fn resolve_for_write<'a>(
    tree: &'a mut Node,
    path: &'a StructuredPath,
) -> Result<WriteTarget<'a>, PathNotFoundError> {
    let mut current = tree;
    for (depth, segment) in path.segments.iter().enumerate() {
        current = step_mut(current, segment).map_err(|reason| not_found(path, depth, reason))?;
    }
    // Parsing guarantees at least one segment.
    let terminal = path
        .segments
        .last()
        .ok_or_else(|| not_found(path, 0, NotFoundReason::MissingKey))?;
    Ok(WriteTarget {
        slot: current,
        terminal,
    })
}

/// Replace the value at `path` and return the old one.
///
/// On failure the tree is untouched.
pub fn write(tree: &mut Node, path: &StructuredPath, value: Node) -> Result<Node, PathNotFoundError> {
    Ok(resolve_for_write(tree, path)?.replace(value))
}
