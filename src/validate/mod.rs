//! Workflow validation: structural checks, schema conformance, capability
//! reconciliation and expression data-flow, aggregated into one result.
//!
//! Everything found is reported as a warning. Validation always completes
//! once the workflow document has been parsed.

pub mod capability;
pub mod dataflow;
pub mod issue;
pub mod structural;

pub use issue::{IssueCode, ValidationIssue, ValidationResult, ViolationLevel};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::NodeTypeProvider;
use crate::error::WorkflowError;
use crate::schema::SchemaRegistry;
use crate::workflow::{self, NodeInstance, Workflow, WorkflowGraph};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationOptions {
    /// Report top-level parameters the node type does not declare.
    pub strict_mode: bool,
    pub allow_disconnected_nodes: bool,
    pub allow_no_trigger: bool,
    pub validate_schema: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        ValidationOptions {
            strict_mode: false,
            allow_disconnected_nodes: false,
            allow_no_trigger: false,
            validate_schema: true,
        }
    }
}

/// Everything the individual checks read.
pub struct Context<'a> {
    pub workflow: &'a Workflow,
    pub graph: &'a WorkflowGraph,
    pub registry: &'a SchemaRegistry,
    pub node_types: Option<&'a dyn NodeTypeProvider>,
    pub options: &'a ValidationOptions,
}

impl Context<'_> {
    /// Declared version, else the registry's default, else the provider's.
    pub fn version_of(&self, node: &NodeInstance) -> Option<f64> {
        node.type_version
            .or_else(|| self.registry.default_version(&node.node_type))
            .or_else(|| {
                self.node_types
                    .and_then(|types| types.default_version(&node.node_type))
            })
    }
}

/// Validate a parsed workflow. Without `node_types`, input-slot and
/// capability-mismatch checks are skipped.
pub fn validate_workflow(
    workflow: &Workflow,
    registry: &SchemaRegistry,
    node_types: Option<&dyn NodeTypeProvider>,
    options: &ValidationOptions,
) -> ValidationResult {
    let graph = WorkflowGraph::build(workflow);
    let ctx = Context {
        workflow,
        graph: &graph,
        registry,
        node_types,
        options,
    };

    let mut warnings = Vec::new();
    structural::validate_structural(&ctx, &mut warnings);

    for node in &workflow.nodes {
        // Suppliers are judged through the node they are attached to, at
        // whatever depth.
        if graph.is_capability_supplier(&node.name) {
            continue;
        }
        let subnodes = capability::effective_subnodes(&ctx, node, &mut warnings);
        let attachments = subnodes
            .as_ref()
            .map(capability::attachments)
            .unwrap_or_default();

        if options.validate_schema {
            structural::node_schema(&ctx, node, subnodes.as_ref(), &attachments, &mut warnings);
        }
        if let Some(types) = node_types {
            if let Some(version) = ctx.version_of(node) {
                capability::check_consumer_side(types, node, version, &attachments, &mut warnings);
            }
            capability::check_supplier_side(types, node, &attachments, &mut warnings);
        }
        dataflow::check_node(&ctx, node, &attachments, &mut warnings);
    }

    debug!(
        nodes = workflow.nodes.len(),
        warnings = warnings.len(),
        "validated workflow"
    );
    ValidationResult::new(Vec::new(), warnings)
}

/// Parse a workflow document and validate it.
pub fn validate_json(
    json: &str,
    registry: &SchemaRegistry,
    node_types: Option<&dyn NodeTypeProvider>,
    options: &ValidationOptions,
) -> Result<ValidationResult, WorkflowError> {
    let workflow = workflow::parse_workflow(json)?;
    Ok(validate_workflow(&workflow, registry, node_types, options))
}
