//! Expression data-flow: field-path references checked against the known
//! output of the nodes they read.

use std::collections::HashSet;

use serde_json::Value;

use crate::expression::{self, NodeOutput, Reference, ReferenceKind};
use crate::schema::shape::join;
use crate::workflow::NodeInstance;

use super::Context;
use super::capability::{self, Attachment};
use super::issue::{IssueCode, ValidationIssue};

/// Check every expression in the node's parameters and in the parameters of
/// its attachments at any depth. Attachments read the node's input.
pub fn check_node(
    ctx: &Context<'_>,
    node: &NodeInstance,
    attachments: &[Attachment],
    warnings: &mut Vec<ValidationIssue>,
) {
    let mut sites = Vec::new();
    for (key, value) in &node.parameters {
        collect_strings(value, join("parameters", key), &mut sites);
    }
    for att in capability::flatten(attachments) {
        let base = format!("{}.parameters", att.path());
        for (key, value) in &att.parameters {
            collect_strings(value, join(&base, key), &mut sites);
        }
    }

    let mut seen = HashSet::new();
    for (path, text) in sites {
        if !expression::has_segments(text) {
            continue;
        }
        for reference in expression::extract_references(text) {
            if !seen.insert((path.clone(), reference.clone())) {
                continue;
            }
            let issue = match &reference.kind {
                ReferenceKind::Upstream | ReferenceKind::Binary => {
                    check_upstream(ctx, node, &reference)
                }
                ReferenceKind::Named(name) => check_named(ctx, node, name, &reference),
            };
            if let Some(issue) = issue {
                warnings.push(issue.at(path.clone()));
            }
        }
    }
}

fn collect_strings<'a>(value: &'a Value, path: String, out: &mut Vec<(String, &'a str)>) {
    match value {
        Value::String(s) => out.push((path, s)),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                collect_strings(item, format!("{path}[{i}]"), out);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                collect_strings(item, join(&path, key), out);
            }
        }
        _ => {}
    }
}

/// Sample output wins over recorded output.
fn known_output(ctx: &Context<'_>, name: &str) -> Option<NodeOutput> {
    let node = ctx.workflow.node(name)?;
    node.sample_output
        .as_ref()
        .or_else(|| ctx.workflow.pin_data.get(name))
        .map(NodeOutput::from_sample)
}

/// All predecessors with known output must have the path; some having it
/// is a partial path, none having it is an invalid path.
fn check_upstream(
    ctx: &Context<'_>,
    node: &NodeInstance,
    reference: &Reference,
) -> Option<ValidationIssue> {
    let binary = reference.kind == ReferenceKind::Binary;
    let mut present = Vec::new();
    let mut missing = Vec::new();

    for pred in ctx.graph.predecessors(&node.name) {
        let Some(output) = known_output(ctx, pred) else {
            continue;
        };
        let found = if binary {
            output.has_binary(&reference.segments)
        } else {
            Some(output.has_json(&reference.segments))
        };
        match found {
            Some(true) => present.push(pred),
            Some(false) => missing.push(pred),
            None => {}
        }
    }

    if missing.is_empty() {
        return None;
    }
    let what = if binary { "binary data" } else { "output" };
    if present.is_empty() {
        return Some(ValidationIssue::node(
            IssueCode::InvalidExpressionPath,
            &node.name,
            format!(
                "'{reference}' does not exist in the {what} of {}",
                quote_all(&missing)
            ),
        ));
    }
    Some(ValidationIssue::node(
        IssueCode::PartialExpressionPath,
        &node.name,
        format!(
            "'{reference}' exists in the {what} of {} but not of {}; it is undefined when those branches run",
            quote_all(&present),
            quote_all(&missing)
        ),
    ))
}

fn check_named(
    ctx: &Context<'_>,
    node: &NodeInstance,
    name: &str,
    reference: &Reference,
) -> Option<ValidationIssue> {
    if ctx.workflow.node(name).is_none() {
        return Some(ValidationIssue::node(
            IssueCode::UnknownNodeReference,
            &node.name,
            format!("'{reference}' references node '{name}', which does not exist"),
        ));
    }
    let output = known_output(ctx, name)?;
    if output.has_json(&reference.segments) {
        return None;
    }
    Some(ValidationIssue::node(
        IssueCode::InvalidExpressionPath,
        &node.name,
        format!("'{reference}' does not exist in the output of '{name}'"),
    ))
}

fn quote_all(names: &[&str]) -> String {
    names
        .iter()
        .map(|n| format!("'{n}'"))
        .collect::<Vec<_>>()
        .join(", ")
}
