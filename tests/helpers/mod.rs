#![allow(dead_code)]

use std::sync::Arc;

use nodeflow_schema::catalog::Catalog;
use nodeflow_schema::schema::{NodeConfig, Resolution, SchemaRegistry};
use nodeflow_schema::validate::{
    IssueCode, ValidationIssue, ValidationOptions, ValidationResult, validate_workflow,
};
use nodeflow_schema::workflow::Workflow;
use serde_json::{Map, Value, json};

pub const CATALOG_JSON: &str = include_str!("../fixtures/catalog.json");

// =============================================================================
// Catalog and registry
// =============================================================================

pub fn catalog() -> Arc<Catalog> {
    Arc::new(Catalog::from_json(CATALOG_JSON, None).expect("fixture catalog parses"))
}

pub fn registry() -> SchemaRegistry {
    SchemaRegistry::from_catalog(catalog())
}

/// Resolve a parameter object with no sub-nodes.
pub fn resolve(registry: &SchemaRegistry, node_type: &str, version: f64, params: Value) -> Resolution {
    let params = object(params);
    registry.resolve(
        node_type,
        version,
        NodeConfig {
            parameters: &params,
            subnodes: None,
        },
        false,
    )
}

pub fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().expect("expected a JSON object")
}

// =============================================================================
// Workflow builders
// =============================================================================

/// A node instance at the type's default version.
pub fn node(name: &str, node_type: &str, parameters: Value) -> Value {
    json!({
        "id": name.to_lowercase().replace(' ', "-"),
        "name": name,
        "type": node_type,
        "parameters": parameters,
    })
}

/// Attach a known output sample to a node built with [`node`].
pub fn with_sample(mut node: Value, sample: Value) -> Value {
    node["sampleOutput"] = sample;
    node
}

pub fn trigger() -> Value {
    node("Start", "acme.manualTrigger", json!({}))
}

/// `connections` from `(source, target)` main edges, each on output 0 and
/// input 0.
pub fn main_edges(edges: &[(&str, &str)]) -> Value {
    let mut connections = Map::new();
    for (source, target) in edges {
        let outputs = connections
            .entry(source.to_string())
            .or_insert_with(|| json!({ "main": [[]] }));
        outputs["main"][0]
            .as_array_mut()
            .expect("main output list")
            .push(json!({ "node": target, "type": "main", "index": 0 }));
    }
    Value::Object(connections)
}

/// Add one capability edge `supplier -(kind)-> consumer`.
pub fn add_capability_edge(connections: &mut Value, supplier: &str, kind: &str, consumer: &str) {
    let outputs = connections
        .as_object_mut()
        .expect("connections object")
        .entry(supplier.to_string())
        .or_insert_with(|| json!({}));
    let slot = outputs
        .as_object_mut()
        .expect("outputs object")
        .entry(kind.to_string())
        .or_insert_with(|| json!([[]]));
    slot[0]
        .as_array_mut()
        .expect("capability output list")
        .push(json!({ "node": consumer, "type": kind, "index": 0 }));
}

pub fn workflow(nodes: Vec<Value>, connections: Value) -> Workflow {
    serde_json::from_value(json!({
        "name": "Test Workflow",
        "nodes": nodes,
        "connections": connections,
    }))
    .expect("workflow parses")
}

// =============================================================================
// Validation
// =============================================================================

pub fn validate(workflow: &Workflow) -> ValidationResult {
    validate_with(workflow, &ValidationOptions::default())
}

pub fn validate_with(workflow: &Workflow, options: &ValidationOptions) -> ValidationResult {
    let catalog = catalog();
    let registry = SchemaRegistry::from_catalog(catalog.clone());
    validate_workflow(workflow, &registry, Some(catalog.as_ref()), options)
}

pub fn codes(result: &ValidationResult) -> Vec<IssueCode> {
    result.warnings.iter().map(|w| w.code).collect()
}

pub fn with_code(result: &ValidationResult, code: IssueCode) -> Vec<&ValidationIssue> {
    result.warnings_with(code).collect()
}
