//! petgraph-based directed graph over a workflow's connections.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;

use super::types::{MAIN_KIND, Workflow};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeLabel {
    pub kind: String,
    pub output_index: usize,
    pub input_index: usize,
}

impl EdgeLabel {
    pub fn is_main(&self) -> bool {
        self.kind == MAIN_KIND
    }
}

/// A connection whose source or target names no node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingConnection {
    pub source: String,
    pub target: String,
    pub kind: String,
    pub source_known: bool,
}

/// An edge in insertion order, with both endpoints by name.
#[derive(Debug, Clone, Copy)]
pub struct Edge<'a> {
    pub source: &'a str,
    pub target: &'a str,
    pub label: &'a EdgeLabel,
}

pub struct WorkflowGraph {
    pub graph: DiGraph<String, EdgeLabel>,
    pub node_indices: HashMap<String, NodeIndex>,
    pub dangling: Vec<DanglingConnection>,
}

impl WorkflowGraph {
    /// Connections to unknown nodes are set aside in `dangling` rather than
    /// failing the build.
    pub fn build(workflow: &Workflow) -> Self {
        let mut graph = DiGraph::new();
        let mut node_indices = HashMap::new();
        let mut dangling = Vec::new();

        for node in &workflow.nodes {
            let idx = graph.add_node(node.name.clone());
            node_indices.insert(node.name.clone(), idx);
        }

        for (source, by_kind) in &workflow.connections {
            for (kind, outputs) in by_kind {
                for (output_index, targets) in outputs.iter().enumerate() {
                    for target in targets.iter().flatten() {
                        match (node_indices.get(source), node_indices.get(&target.node)) {
                            (Some(&s), Some(&t)) => {
                                graph.add_edge(
                                    s,
                                    t,
                                    EdgeLabel {
                                        kind: kind.clone(),
                                        output_index,
                                        input_index: target.index,
                                    },
                                );
                            }
                            (s, _) => dangling.push(DanglingConnection {
                                source: source.clone(),
                                target: target.node.clone(),
                                kind: kind.clone(),
                                source_known: s.is_some(),
                            }),
                        }
                    }
                }
            }
        }

        WorkflowGraph {
            graph,
            node_indices,
            dangling,
        }
    }

    fn edges_at(&self, node: &str, direction: Direction) -> Vec<Edge<'_>> {
        let Some(&idx) = self.node_indices.get(node) else {
            return vec![];
        };
        let mut edges: Vec<(EdgeIndex, Edge<'_>)> = self
            .graph
            .edges_directed(idx, direction)
            .map(|e| {
                (
                    e.id(),
                    Edge {
                        source: self.graph[e.source()].as_str(),
                        target: self.graph[e.target()].as_str(),
                        label: e.weight(),
                    },
                )
            })
            .collect();
        edges.sort_by_key(|(id, _)| *id);
        edges.into_iter().map(|(_, e)| e).collect()
    }

    pub fn incoming(&self, node: &str) -> Vec<Edge<'_>> {
        self.edges_at(node, Direction::Incoming)
    }

    pub fn outgoing(&self, node: &str) -> Vec<Edge<'_>> {
        self.edges_at(node, Direction::Outgoing)
    }

    /// Every edge in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = Edge<'_>> {
        self.graph.edge_references().map(|e| Edge {
            source: self.graph[e.source()].as_str(),
            target: self.graph[e.target()].as_str(),
            label: e.weight(),
        })
    }

    /// Direct data-flow predecessors, deduplicated, in connection order.
    pub fn predecessors(&self, node: &str) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for edge in self.incoming(node) {
            if edge.label.is_main() && !out.contains(&edge.source) {
                out.push(edge.source);
            }
        }
        out
    }

    pub fn incoming_count(&self, node: &str) -> usize {
        self.incoming(node).iter().filter(|e| e.label.is_main()).count()
    }

    /// Capability edges supplying `node`, in connection order.
    pub fn capability_inputs(&self, node: &str) -> Vec<Edge<'_>> {
        self.incoming(node)
            .into_iter()
            .filter(|e| !e.label.is_main())
            .collect()
    }

    /// Source of at least one capability edge.
    pub fn is_capability_supplier(&self, node: &str) -> bool {
        self.outgoing(node).iter().any(|e| !e.label.is_main())
    }

    pub fn touches_capability_edge(&self, node: &str) -> bool {
        self.is_capability_supplier(node) || !self.capability_inputs(node).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::parse_workflow;

    #[test]
    fn predecessors_keep_connection_order() {
        let wf = parse_workflow(
            r#"{
                "nodes": [
                    { "name": "A", "type": "x.a" }, { "name": "B", "type": "x.b" },
                    { "name": "C", "type": "x.c" }, { "name": "M", "type": "x.model" }
                ],
                "connections": {
                    "B": { "main": [[{ "node": "C", "type": "main", "index": 0 }]] },
                    "A": { "main": [[{ "node": "C", "type": "main", "index": 1 }]] },
                    "M": { "ai_languageModel": [[{ "node": "C", "type": "ai_languageModel", "index": 0 }]] }
                }
            }"#,
        )
        .unwrap();
        let graph = WorkflowGraph::build(&wf);
        assert_eq!(graph.predecessors("C"), vec!["B", "A"]);
        assert_eq!(graph.incoming_count("C"), 2);
        assert_eq!(graph.capability_inputs("C").len(), 1);
        assert!(graph.is_capability_supplier("M"));
        assert!(!graph.is_capability_supplier("A"));
    }

    #[test]
    fn unknown_endpoints_are_dangling() {
        let wf = parse_workflow(
            r#"{
                "nodes": [{ "name": "A", "type": "x.a" }],
                "connections": { "A": { "main": [[{ "node": "Ghost", "type": "main", "index": 0 }]] } }
            }"#,
        )
        .unwrap();
        let graph = WorkflowGraph::build(&wf);
        assert_eq!(graph.graph.edge_count(), 0);
        assert_eq!(graph.dangling.len(), 1);
        assert!(graph.dangling[0].source_known);
    }
}
