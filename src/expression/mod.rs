//! Templated expression handling: detection and reference extraction.
//!
//! A parameter value holds a deferred computation when it is a string that
//! starts with `=`. References are found in its `{{ … }}` segments by
//! tokenizing each one, parsing access chains, then stripping method calls.

pub mod lexer;
pub mod path;
pub mod reference;

pub use path::NodeOutput;
pub use reference::{Reference, ReferenceKind, Segment, SegmentKey};

use serde_json::Value;

pub fn is_expression(value: &Value) -> bool {
    value.as_str().is_some_and(is_expression_str)
}

pub fn is_expression_str(text: &str) -> bool {
    text.starts_with('=')
}

/// Whether the text has any `{{` segment to scan for references.
pub fn has_segments(text: &str) -> bool {
    text.contains("{{")
}

/// Code between `{{` and `}}`. An unterminated segment runs to the end.
pub fn segments(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut remaining = text;

    while let Some(start) = remaining.find("{{") {
        let after_open = &remaining[start + 2..];
        match after_open.find("}}") {
            Some(end) => {
                out.push(&after_open[..end]);
                remaining = &after_open[end + 2..];
            }
            None => {
                out.push(after_open);
                break;
            }
        }
    }

    out
}

/// All data references of an expression string, method calls stripped and
/// empty paths dropped. Duplicates are kept once, in first-seen order.
pub fn extract_references(text: &str) -> Vec<Reference> {
    let mut out: Vec<Reference> = Vec::new();
    for code in segments(text) {
        let tokens = lexer::tokenize(code);
        for found in reference::parse(&tokens) {
            let found = reference::strip_method_calls(found);
            if !found.segments.is_empty() && !out.contains(&found) {
                out.push(found);
            }
        }
    }
    out
}
