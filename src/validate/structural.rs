//! Graph-level structural checks and per-node schema conformance.

use serde_json::Value;

use crate::schema::NodeConfig;
use crate::workflow::NodeInstance;

use super::Context;
use super::capability::{self, Attachment};
use super::issue::{IssueCode, ValidationIssue};

/// Run the graph-wide checks the options enable.
pub fn validate_structural(ctx: &Context<'_>, warnings: &mut Vec<ValidationIssue>) {
    dangling_connections(ctx, warnings);
    if !ctx.options.allow_no_trigger {
        trigger_present(ctx, warnings);
    }
    if !ctx.options.allow_disconnected_nodes {
        disconnected_nodes(ctx, warnings);
    }
    if ctx.node_types.is_some() {
        input_indexes(ctx, warnings);
    }
}

fn dangling_connections(ctx: &Context<'_>, warnings: &mut Vec<ValidationIssue>) {
    for conn in &ctx.graph.dangling {
        let missing = if conn.source_known {
            &conn.target
        } else {
            &conn.source
        };
        let message = format!(
            "Connection '{}' -> '{}' ({}) references unknown node '{}'",
            conn.source, conn.target, conn.kind, missing
        );
        warnings.push(if conn.source_known {
            ValidationIssue::node(IssueCode::InvalidConnection, &conn.source, message)
        } else {
            ValidationIssue::graph(IssueCode::InvalidConnection, message)
        });
    }
}

fn trigger_present(ctx: &Context<'_>, warnings: &mut Vec<ValidationIssue>) {
    if !ctx.workflow.nodes.iter().any(NodeInstance::is_trigger) {
        warnings.push(ValidationIssue::graph(
            IssueCode::NoTrigger,
            "Workflow has no trigger node; it can only be started manually",
        ));
    }
}

/// Triggers, annotations and capability suppliers legitimately have no
/// incoming data-flow edge.
fn disconnected_nodes(ctx: &Context<'_>, warnings: &mut Vec<ValidationIssue>) {
    for node in &ctx.workflow.nodes {
        if node.is_trigger() || node.is_annotation() {
            continue;
        }
        if ctx.graph.touches_capability_edge(&node.name) {
            continue;
        }
        if ctx.graph.incoming_count(&node.name) == 0 {
            warnings.push(ValidationIssue::node(
                IssueCode::DisconnectedNode,
                &node.name,
                format!("Node '{}' has no incoming connections", node.name),
            ));
        }
    }
}

fn input_indexes(ctx: &Context<'_>, warnings: &mut Vec<ValidationIssue>) {
    let Some(types) = ctx.node_types else {
        return;
    };
    for edge in ctx.graph.edges().filter(|e| e.label.is_main()) {
        let Some(target) = ctx.workflow.node(edge.target) else {
            continue;
        };
        let Some(version) = ctx.version_of(target) else {
            continue;
        };
        let Some(count) = types
            .node_type(&target.node_type, version)
            .and_then(|spec| spec.inputs.fixed_main())
        else {
            continue;
        };
        if edge.label.input_index >= count {
            warnings.push(ValidationIssue::node(
                IssueCode::InvalidInputIndex,
                &target.name,
                format!(
                    "Connection from '{}' targets input {}, but '{}' has {} input(s)",
                    edge.source, edge.label.input_index, target.node_type, count
                ),
            ));
        }
    }
}

/// Resolve the node's own configuration, then each attachment's.
pub fn node_schema(
    ctx: &Context<'_>,
    node: &NodeInstance,
    subnodes: Option<&Value>,
    attachments: &[Attachment],
    warnings: &mut Vec<ValidationIssue>,
) {
    if let Some(version) = ctx.version_of(node) {
        let resolution = ctx.registry.resolve(
            &node.node_type,
            version,
            NodeConfig {
                parameters: &node.parameters,
                subnodes,
            },
            ctx.options.strict_mode,
        );
        for error in resolution.errors {
            warnings.push(
                ValidationIssue::node(IssueCode::InvalidParameter, &node.name, error.message)
                    .at(error.path),
            );
        }
    }
    capability::check_attachment_parameters(ctx, node, attachments, warnings);
}
