//! In-place edits of YAML and JSON source text.
//!
//! Patched files are not re-rendered from the tree. Each edited scalar is
//! located in the original text and only its bytes are replaced, so comments,
//! quoting, indentation and the spelling of every untouched value survive.
//! Locating is conservative: constructs it cannot place exactly (block
//! scalars, complex keys, merge keys) return a [`SpliceError`] and the caller
//! re-renders instead.

use thiserror::Error;

use crate::document::{DocumentFormat, Node, Scalar};
use crate::path::{PathSegment, StructuredPath};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpliceError {
    #[error("cannot locate '{path}' in the source text: {reason}")]
    Unlocated { path: String, reason: &'static str },

    #[error("'{path}' is a collection in the source text")]
    NotAScalar { path: String },

    #[error("value for '{path}' cannot be written in place")]
    UnsupportedValue { path: String },

    #[error("edits of '{path}' overlap another edit")]
    Overlapping { path: String },
}

/// Replace the scalar at each path with its new value, leaving every other
/// byte of `text` unchanged. Later edits of the same path win.
pub fn splice(
    text: &str,
    format: DocumentFormat,
    edits: &[(&StructuredPath, &Node)],
) -> Result<String, SpliceError> {
    let mut replacements: Vec<(usize, usize, String)> = Vec::with_capacity(edits.len());
    for (path, value) in edits {
        let raw = || path.as_str().to_string();
        let unlocated = |reason| SpliceError::Unlocated { path: raw(), reason };
        let (start, end, rendered) = match format {
            DocumentFormat::Json => {
                let (start, end) = json_locate(text, path.segments()).map_err(unlocated)?;
                let rendered = serde_json::to_string(value)
                    .map_err(|_| SpliceError::UnsupportedValue { path: raw() })?;
                (start, end, rendered)
            }
            DocumentFormat::Yaml => {
                let located = YamlSource::new(text)
                    .locate(path.segments())
                    .map_err(unlocated)?;
                let NodeStart::Scalar(span) = located else {
                    return Err(SpliceError::NotAScalar { path: raw() });
                };
                let rendered = render_yaml_scalar(value, &span)
                    .ok_or_else(|| SpliceError::UnsupportedValue { path: raw() })?;
                (span.start, span.end, rendered)
            }
        };

        replacements.retain(|(s, e, _)| !(*s == start && *e == end));
        if replacements.iter().any(|(s, e, _)| start < *e && *s < end) {
            return Err(SpliceError::Overlapping { path: raw() });
        }
        replacements.push((start, end, rendered));
    }

    replacements.sort_by_key(|(start, _, _)| std::cmp::Reverse(*start));
    let mut out = text.to_string();
    for (start, end, rendered) in replacements {
        out.replace_range(start..end, &rendered);
    }
    Ok(out)
}

// ── JSON ────────────────────────────────────────────────────────────────────

fn json_locate(text: &str, segments: &[PathSegment]) -> Result<(usize, usize), &'static str> {
    let bytes = text.as_bytes();
    let mut pos = json_skip_ws(bytes, 0);
    for segment in segments {
        pos = match segment {
            PathSegment::Key(key) => json_member(text, pos, key)?,
            PathSegment::Index(index) => json_element(bytes, pos, *index)?,
        };
    }
    let end = json_value_end(bytes, pos)?;
    Ok((pos, end))
}

fn json_skip_ws(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && matches!(bytes[pos], b' ' | b'\t' | b'\n' | b'\r') {
        pos += 1;
    }
    pos
}

/// End of a double-quoted string starting at `start`; shared with YAML.
fn double_quoted_end(bytes: &[u8], start: usize) -> Result<usize, &'static str> {
    let mut pos = start + 1;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => pos += 2,
            b'"' => return Ok(pos + 1),
            _ => pos += 1,
        }
    }
    Err("unterminated string")
}

fn json_value_end(bytes: &[u8], pos: usize) -> Result<usize, &'static str> {
    match bytes.get(pos) {
        Some(b'"') => double_quoted_end(bytes, pos),
        Some(b'{' | b'[') => {
            let mut depth = 0usize;
            let mut p = pos;
            while p < bytes.len() {
                match bytes[p] {
                    b'"' => {
                        p = double_quoted_end(bytes, p)?;
                        continue;
                    }
                    b'{' | b'[' => depth += 1,
                    b'}' | b']' => {
                        depth = depth.saturating_sub(1);
                        if depth == 0 {
                            return Ok(p + 1);
                        }
                    }
                    _ => {}
                }
                p += 1;
            }
            Err("unterminated collection")
        }
        Some(_) => {
            let mut p = pos;
            while p < bytes.len()
                && !matches!(bytes[p], b',' | b'}' | b']' | b' ' | b'\t' | b'\n' | b'\r')
            {
                p += 1;
            }
            if p == pos { Err("expected a value") } else { Ok(p) }
        }
        None => Err("unexpected end of document"),
    }
}

fn json_member(text: &str, pos: usize, key: &str) -> Result<usize, &'static str> {
    let bytes = text.as_bytes();
    if bytes.get(pos) != Some(&b'{') {
        return Err("expected an object");
    }
    let mut p = json_skip_ws(bytes, pos + 1);
    if bytes.get(p) == Some(&b'}') {
        return Err("key not found");
    }
    let mut found = None;
    loop {
        if bytes.get(p) != Some(&b'"') {
            return Err("expected an object key");
        }
        let key_end = double_quoted_end(bytes, p)?;
        let name: String =
            serde_json::from_str(&text[p..key_end]).map_err(|_| "invalid object key")?;
        p = json_skip_ws(bytes, key_end);
        if bytes.get(p) != Some(&b':') {
            return Err("expected ':'");
        }
        let value = json_skip_ws(bytes, p + 1);
        if name == key {
            found = Some(value);
        }
        p = json_skip_ws(bytes, json_value_end(bytes, value)?);
        match bytes.get(p) {
            Some(b',') => p = json_skip_ws(bytes, p + 1),
            Some(b'}') => break,
            _ => return Err("expected ',' or '}'"),
        }
    }
    found.ok_or("key not found")
}

fn json_element(bytes: &[u8], pos: usize, index: usize) -> Result<usize, &'static str> {
    if bytes.get(pos) != Some(&b'[') {
        return Err("expected an array");
    }
    let mut p = json_skip_ws(bytes, pos + 1);
    if bytes.get(p) == Some(&b']') {
        return Err("index out of range");
    }
    let mut current = 0;
    loop {
        if current == index {
            return Ok(p);
        }
        p = json_skip_ws(bytes, json_value_end(bytes, p)?);
        match bytes.get(p) {
            Some(b',') => p = json_skip_ws(bytes, p + 1),
            Some(b']') => return Err("index out of range"),
            _ => return Err("expected ',' or ']'"),
        }
        current += 1;
    }
}

// ── YAML ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Plain,
    SingleQuoted,
    DoubleQuoted,
    /// `key:` with nothing after it; the value is inserted.
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Block,
    Flow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScalarSpan {
    start: usize,
    end: usize,
    style: Style,
    context: Context,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeStart {
    Scalar(ScalarSpan),
    /// `first` is the byte offset of the first key.
    BlockMapping { indent: usize, first: usize },
    /// `first` is the byte offset of the first `-`.
    BlockSequence { indent: usize, first: usize },
    /// Offset of the opening `{` or `[`.
    Flow(usize),
}

fn is_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t')
}

fn is_break_or_end(bytes: &[u8], pos: usize) -> bool {
    pos >= bytes.len() || matches!(bytes[pos], b'\n' | b'\r')
}

struct YamlSource<'t> {
    text: &'t str,
    bytes: &'t [u8],
}

impl<'t> YamlSource<'t> {
    fn new(text: &'t str) -> Self {
        Self {
            text,
            bytes: text.as_bytes(),
        }
    }

    fn locate(&self, segments: &[PathSegment]) -> Result<NodeStart, &'static str> {
        let mut node = self.root()?;
        for segment in segments {
            node = match (node, segment) {
                (NodeStart::BlockMapping { indent, first }, PathSegment::Key(key)) => {
                    self.block_member(indent, first, key)?
                }
                (NodeStart::BlockSequence { indent, first }, PathSegment::Index(index)) => {
                    self.block_element(indent, first, *index)?
                }
                (NodeStart::Flow(p), PathSegment::Key(key)) if self.bytes[p] == b'{' => {
                    self.flow_member(p, key)?
                }
                (NodeStart::Flow(p), PathSegment::Index(index)) if self.bytes[p] == b'[' => {
                    self.flow_element(p, *index)?
                }
                _ => return Err("path does not match the document layout"),
            };
        }
        Ok(node)
    }

    // Lines

    fn line_start(&self, pos: usize) -> usize {
        self.text[..pos].rfind('\n').map_or(0, |i| i + 1)
    }

    fn line_end(&self, pos: usize) -> usize {
        self.text[pos..].find('\n').map_or(self.text.len(), |i| pos + i)
    }

    fn next_line(&self, pos: usize) -> usize {
        self.text[pos..]
            .find('\n')
            .map_or(self.text.len(), |i| pos + i + 1)
    }

    fn indent_of(&self, line_start: usize) -> usize {
        self.bytes[line_start..]
            .iter()
            .take_while(|&&b| b == b' ')
            .count()
    }

    fn column(&self, pos: usize) -> usize {
        pos - self.line_start(pos)
    }

    fn is_blank_or_comment(&self, line_start: usize) -> bool {
        let line = self.text[line_start..self.line_end(line_start)].trim();
        line.is_empty() || line.starts_with('#')
    }

    fn is_document_marker(&self, line_start: usize) -> bool {
        let line = &self.text[line_start..self.line_end(line_start)];
        (line.starts_with("---") || line.starts_with("..."))
            && line[3..].chars().next().is_none_or(char::is_whitespace)
    }

    fn next_content_line(&self, mut line_start: usize) -> Option<usize> {
        while line_start < self.text.len() {
            if self.is_document_marker(line_start) {
                return None;
            }
            if !self.is_blank_or_comment(line_start) {
                return Some(line_start);
            }
            line_start = self.next_line(line_start);
        }
        None
    }

    // Tokens

    fn skip_space(&self, mut pos: usize) -> usize {
        while pos < self.bytes.len() && is_space(self.bytes[pos]) {
            pos += 1;
        }
        pos
    }

    /// Skip anchors (`&a`) and tags (`!t`) in front of a node.
    fn skip_properties(&self, pos: usize) -> usize {
        let mut p = self.skip_space(pos);
        while p < self.bytes.len() && matches!(self.bytes[p], b'&' | b'!') {
            while p < self.bytes.len() && !matches!(self.bytes[p], b' ' | b'\t' | b'\n' | b'\r')
            {
                p += 1;
            }
            p = self.skip_space(p);
        }
        p
    }

    fn rest_is_empty(&self, pos: usize) -> bool {
        let p = self.skip_space(pos);
        is_break_or_end(self.bytes, p) || self.bytes[p] == b'#'
    }

    fn is_dash_entry(&self, pos: usize) -> bool {
        self.bytes.get(pos) == Some(&b'-')
            && (is_break_or_end(self.bytes, pos + 1) || is_space(self.bytes[pos + 1]))
    }

    fn single_quoted_end(&self, start: usize) -> Result<usize, &'static str> {
        let mut pos = start + 1;
        while pos < self.bytes.len() {
            if self.bytes[pos] == b'\'' {
                if self.bytes.get(pos + 1) == Some(&b'\'') {
                    pos += 2;
                    continue;
                }
                return Ok(pos + 1);
            }
            pos += 1;
        }
        Err("unterminated string")
    }

    fn decode_quoted(&self, start: usize, end: usize) -> Result<String, &'static str> {
        let raw = &self.text[start..end];
        if self.bytes[start] == b'"' {
            serde_yaml_ng::from_str::<String>(raw).map_err(|_| "invalid quoted key")
        } else {
            Ok(raw[1..raw.len() - 1].replace("''", "'"))
        }
    }

    /// End of a plain scalar in block context: end of line or a ` #` comment.
    fn plain_end(&self, pos: usize) -> usize {
        let end = self.line_end(pos);
        let mut q = pos;
        while q < end {
            if self.bytes[q] == b'#' && q > pos && is_space(self.bytes[q - 1]) {
                break;
            }
            q += 1;
        }
        pos + self.text[pos..q].trim_end().len()
    }

    /// A `key:` at `pos`; returns the key and the offset just past the colon.
    fn key_at(&self, pos: usize) -> Result<Option<(String, usize)>, &'static str> {
        let (name, after_key) = match self.bytes.get(pos) {
            None => return Ok(None),
            Some(b'"') => {
                let end = double_quoted_end(self.bytes, pos)?;
                (self.decode_quoted(pos, end)?, end)
            }
            Some(b'\'') => {
                let end = self.single_quoted_end(pos)?;
                (self.decode_quoted(pos, end)?, end)
            }
            Some(b'{' | b'[' | b'#' | b'|' | b'>') => return Ok(None),
            Some(b'?') if !is_break_or_end(self.bytes, pos + 1) && !is_space(self.bytes[pos + 1]) => {
                return self.plain_key(pos);
            }
            Some(b'?') => return Err("complex mapping keys are not supported"),
            Some(_) if self.is_dash_entry(pos) => return Ok(None),
            Some(_) => return self.plain_key(pos),
        };
        let colon = self.skip_space(after_key);
        if self.bytes.get(colon) == Some(&b':')
            && (is_break_or_end(self.bytes, colon + 1) || is_space(self.bytes[colon + 1]))
        {
            Ok(Some((name, colon + 1)))
        } else {
            Ok(None)
        }
    }

    fn plain_key(&self, pos: usize) -> Result<Option<(String, usize)>, &'static str> {
        let end = self.line_end(pos);
        let mut q = pos;
        while q < end {
            match self.bytes[q] {
                b':' if q + 1 >= end || is_space(self.bytes[q + 1]) || self.bytes[q + 1] == b'\r' => {
                    let name = self.text[pos..q].trim_end();
                    if name == "<<" {
                        return Err("merge keys are not supported");
                    }
                    return Ok(Some((name.to_string(), q + 1)));
                }
                b'#' if q > pos && is_space(self.bytes[q - 1]) => return Ok(None),
                _ => q += 1,
            }
        }
        Ok(None)
    }

    // Block structure

    fn root(&self) -> Result<NodeStart, &'static str> {
        let mut line = 0;
        while line < self.text.len() {
            let content = self.text[line..self.line_end(line)].trim();
            if content.is_empty() || content.starts_with('#') || content.starts_with('%') {
                line = self.next_line(line);
                continue;
            }
            if self.is_document_marker(line) {
                let after = line + 3;
                if self.rest_is_empty(after) {
                    line = self.next_line(line);
                    continue;
                }
                return self.inline_node(self.skip_properties(after));
            }
            return self.inline_node(self.skip_properties(line + self.indent_of(line)));
        }
        Err("empty document")
    }

    /// The node whose first token is at `pos` on the current line.
    fn inline_node(&self, pos: usize) -> Result<NodeStart, &'static str> {
        let scalar = |end, style| {
            Ok(NodeStart::Scalar(ScalarSpan {
                start: pos,
                end,
                style,
                context: Context::Block,
            }))
        };
        match self.bytes.get(pos) {
            None => Err("unexpected end of document"),
            Some(b'{' | b'[') => Ok(NodeStart::Flow(pos)),
            Some(b'"') => scalar(double_quoted_end(self.bytes, pos)?, Style::DoubleQuoted),
            Some(b'\'') => scalar(self.single_quoted_end(pos)?, Style::SingleQuoted),
            Some(b'|' | b'>') => Err("block scalars are not supported"),
            Some(_) if self.is_dash_entry(pos) => Ok(NodeStart::BlockSequence {
                indent: self.column(pos),
                first: pos,
            }),
            Some(_) => {
                if self.key_at(pos)?.is_some() {
                    Ok(NodeStart::BlockMapping {
                        indent: self.column(pos),
                        first: pos,
                    })
                } else {
                    scalar(self.plain_end(pos), Style::Plain)
                }
            }
        }
    }

    /// The value following a `key:` or `-` that ends at `pos`.
    fn block_value(
        &self,
        pos: usize,
        parent_indent: usize,
        compact_sequence: bool,
    ) -> Result<NodeStart, &'static str> {
        let p = self.skip_properties(pos);
        if !self.rest_is_empty(p) {
            return self.inline_node(p);
        }
        if let Some(line) = self.next_content_line(self.next_line(p)) {
            let indent = self.indent_of(line);
            let content = line + indent;
            if indent > parent_indent
                || (compact_sequence && indent == parent_indent && self.is_dash_entry(content))
            {
                return self.inline_node(self.skip_properties(content));
            }
        }
        let insert = pos + self.text[pos..p].trim_end().len();
        Ok(NodeStart::Scalar(ScalarSpan {
            start: insert,
            end: insert,
            style: Style::Empty,
            context: Context::Block,
        }))
    }

    /// Next entry at exactly `indent` after the entry at `pos`.
    fn next_entry(&self, pos: usize, indent: usize, sequence: bool) -> Option<usize> {
        let mut line = self.next_line(pos);
        while let Some(start) = self.next_content_line(line) {
            let line_indent = self.indent_of(start);
            let content = start + line_indent;
            if line_indent < indent {
                return None;
            }
            if line_indent == indent {
                let dash = self.is_dash_entry(content);
                if sequence {
                    return dash.then_some(content);
                }
                // A dash at the key's own indent belongs to the previous key.
                if !dash {
                    return Some(content);
                }
            }
            line = self.next_line(start);
        }
        None
    }

    fn block_member(
        &self,
        indent: usize,
        first: usize,
        key: &str,
    ) -> Result<NodeStart, &'static str> {
        let mut entry = Some(first);
        while let Some(pos) = entry {
            let (name, after) = self
                .key_at(pos)?
                .ok_or("unexpected content in block mapping")?;
            if name == key {
                return self.block_value(after, indent, true);
            }
            entry = self.next_entry(pos, indent, false);
        }
        Err("key not found")
    }

    fn block_element(
        &self,
        indent: usize,
        first: usize,
        index: usize,
    ) -> Result<NodeStart, &'static str> {
        let mut entry = Some(first);
        let mut current = 0;
        while let Some(pos) = entry {
            if current == index {
                return self.block_value(pos + 1, indent, false);
            }
            current += 1;
            entry = self.next_entry(pos, indent, true);
        }
        Err("index out of range")
    }

    // Flow collections

    fn flow_skip(&self, mut pos: usize) -> usize {
        loop {
            while pos < self.bytes.len() && matches!(self.bytes[pos], b' ' | b'\t' | b'\n' | b'\r')
            {
                pos += 1;
            }
            if self.bytes.get(pos) == Some(&b'#') {
                pos = self.line_end(pos);
            } else {
                return pos;
            }
        }
    }

    fn flow_plain_end(&self, pos: usize) -> usize {
        let mut q = pos;
        while q < self.bytes.len() {
            match self.bytes[q] {
                b',' | b'[' | b']' | b'{' | b'}' | b'\n' | b'\r' => break,
                b':' if self
                    .bytes
                    .get(q + 1)
                    .is_none_or(|&b| matches!(b, b' ' | b'\t' | b',' | b'}' | b']' | b'\n' | b'\r')) =>
                {
                    break;
                }
                b'#' if q > pos && is_space(self.bytes[q - 1]) => break,
                _ => q += 1,
            }
        }
        pos + self.text[pos..q].trim_end().len()
    }

    fn flow_node(&self, pos: usize) -> Result<NodeStart, &'static str> {
        let p = self.skip_properties(pos);
        let scalar = |end, style| {
            Ok(NodeStart::Scalar(ScalarSpan {
                start: p,
                end,
                style,
                context: Context::Flow,
            }))
        };
        match self.bytes.get(p) {
            None => Err("unexpected end of document"),
            Some(b'{' | b'[') => Ok(NodeStart::Flow(p)),
            Some(b'"') => scalar(double_quoted_end(self.bytes, p)?, Style::DoubleQuoted),
            Some(b'\'') => scalar(self.single_quoted_end(p)?, Style::SingleQuoted),
            Some(_) => scalar(self.flow_plain_end(p), Style::Plain),
        }
    }

    fn flow_node_end(&self, node: NodeStart) -> Result<usize, &'static str> {
        match node {
            NodeStart::Scalar(span) => Ok(span.end),
            NodeStart::Flow(open) => {
                let mut depth = 0usize;
                let mut p = open;
                while p < self.bytes.len() {
                    match self.bytes[p] {
                        b'"' => {
                            p = double_quoted_end(self.bytes, p)?;
                            continue;
                        }
                        b'\'' => {
                            p = self.single_quoted_end(p)?;
                            continue;
                        }
                        b'{' | b'[' => depth += 1,
                        b'}' | b']' => {
                            depth = depth.saturating_sub(1);
                            if depth == 0 {
                                return Ok(p + 1);
                            }
                        }
                        _ => {}
                    }
                    p += 1;
                }
                Err("unterminated flow collection")
            }
            NodeStart::BlockMapping { .. } | NodeStart::BlockSequence { .. } => {
                Err("block node inside a flow collection")
            }
        }
    }

    fn flow_member(&self, open: usize, key: &str) -> Result<NodeStart, &'static str> {
        let mut p = self.flow_skip(open + 1);
        loop {
            match self.bytes.get(p) {
                None => return Err("unterminated flow mapping"),
                Some(b'}') => return Err("key not found"),
                _ => {}
            }
            let (name, key_end) = match self.bytes[p] {
                b'"' => {
                    let end = double_quoted_end(self.bytes, p)?;
                    (self.decode_quoted(p, end)?, end)
                }
                b'\'' => {
                    let end = self.single_quoted_end(p)?;
                    (self.decode_quoted(p, end)?, end)
                }
                _ => {
                    let end = self.flow_plain_end(p);
                    (self.text[p..end].to_string(), end)
                }
            };
            let colon = self.flow_skip(key_end);
            let value = if self.bytes.get(colon) == Some(&b':') {
                let start = self.flow_skip(colon + 1);
                if matches!(self.bytes.get(start), Some(b',' | b'}')) {
                    NodeStart::Scalar(ScalarSpan {
                        start: colon + 1,
                        end: colon + 1,
                        style: Style::Empty,
                        context: Context::Flow,
                    })
                } else {
                    self.flow_node(start)?
                }
            } else {
                return Err("flow mapping entry without a value");
            };
            if name == key {
                return Ok(value);
            }
            p = self.flow_skip(self.flow_node_end(value)?);
            match self.bytes.get(p) {
                Some(b',') => p = self.flow_skip(p + 1),
                Some(b'}') => return Err("key not found"),
                _ => return Err("expected ',' or '}'"),
            }
        }
    }

    fn flow_element(&self, open: usize, index: usize) -> Result<NodeStart, &'static str> {
        let mut p = self.flow_skip(open + 1);
        let mut current = 0;
        loop {
            if matches!(self.bytes.get(p), None | Some(b']')) {
                return Err("index out of range");
            }
            let node = self.flow_node(p)?;
            if current == index {
                return Ok(node);
            }
            p = self.flow_skip(self.flow_node_end(node)?);
            match self.bytes.get(p) {
                Some(b',') => p = self.flow_skip(p + 1),
                Some(b']') => return Err("index out of range"),
                _ => return Err("expected ',' or ']'"),
            }
            current += 1;
        }
    }
}

/// Whether `value` reads back as the same string when written unquoted.
fn is_plain_safe(value: &str, context: Context) -> bool {
    let Some(&first) = value.as_bytes().first() else {
        return false;
    };
    if value != value.trim() || value.contains('\n') {
        return false;
    }
    if b",[]{}#&*!|>'\"%@`".contains(&first) {
        return false;
    }
    let second = value.as_bytes().get(1).copied();
    if b"-?:".contains(&first) && second.is_none_or(is_space) {
        return false;
    }
    if value.contains(": ") || value.contains(" #") || value.ends_with(':') {
        return false;
    }
    if context == Context::Flow && value.contains([',', '[', ']', '{', '}']) {
        return false;
    }
    matches!(
        serde_yaml_ng::from_str::<Node>(value),
        Ok(Node::Scalar(Scalar::String(ref back))) if back == value
    )
}

/// Render `value` for the span, keeping the original quote style.
fn render_yaml_scalar(value: &Node, span: &ScalarSpan) -> Option<String> {
    let Node::Scalar(scalar) = value else {
        return None;
    };
    let body = match scalar {
        Scalar::String(text) => match span.style {
            Style::DoubleQuoted => serde_json::to_string(text).ok()?,
            Style::SingleQuoted if !text.contains('\n') => {
                format!("'{}'", text.replace('\'', "''"))
            }
            _ if is_plain_safe(text, span.context) => text.clone(),
            _ => serde_json::to_string(text).ok()?,
        },
        other => {
            let rendered = serde_yaml_ng::to_string(&Node::Scalar(other.clone())).ok()?;
            let rendered = rendered.trim_end();
            if rendered.contains('\n') {
                return None;
            }
            rendered.to_string()
        }
    };
    Some(if span.style == Style::Empty {
        format!(" {body}")
    } else {
        body
    })
}
