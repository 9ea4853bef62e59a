//! Workflow documents: JSON types and the connection graph.

pub mod graph;
pub mod types;

pub use graph::{Edge, EdgeLabel, WorkflowGraph};
pub use types::*;

use crate::error::WorkflowError;

/// Deserialize a workflow JSON string. Only documents that cannot be
/// interpreted at all (bad JSON, no `nodes`) fail.
pub fn parse_workflow(json: &str) -> Result<Workflow, WorkflowError> {
    serde_json::from_str::<Workflow>(json).map_err(WorkflowError::Parse)
}

/// Parse JSON and build the graph in one step.
pub fn parse_and_build(json: &str) -> Result<(Workflow, WorkflowGraph), WorkflowError> {
    let workflow = parse_workflow(json)?;
    let graph = WorkflowGraph::build(&workflow);
    Ok((workflow, graph))
}
