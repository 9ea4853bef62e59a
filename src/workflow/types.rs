//! Serde types for workflow documents.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// TOP-LEVEL WORKFLOW
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    #[serde(default)]
    pub name: Option<String>,
    pub nodes: Vec<NodeInstance>,
    #[serde(default)]
    pub connections: Connections,
    /// Recorded output per node name.
    #[serde(default)]
    pub pin_data: IndexMap<String, Value>,
}

impl Workflow {
    pub fn node(&self, name: &str) -> Option<&NodeInstance> {
        self.nodes.iter().find(|n| n.name == name)
    }
}

/// `source name -> edge kind -> output index -> targets`. An output with no
/// targets may be `null`.
pub type Connections = IndexMap<String, IndexMap<String, Vec<Option<Vec<ConnectionTarget>>>>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionTarget {
    pub node: String,
    #[serde(rename = "type", default = "main_kind")]
    pub kind: String,
    #[serde(default)]
    pub index: usize,
}

fn main_kind() -> String {
    MAIN_KIND.to_string()
}

/// Edge kind of ordinary data flow.
pub const MAIN_KIND: &str = "main";

// =============================================================================
// NODES
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInstance {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub type_version: Option<f64>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// Inline sub-configuration, keyed by capability kind.
    #[serde(default)]
    pub subnodes: Option<Value>,
    #[serde(default)]
    pub sample_output: Option<Value>,
}

impl NodeInstance {
    pub fn is_trigger(&self) -> bool {
        is_trigger_type(&self.node_type)
    }

    pub fn is_annotation(&self) -> bool {
        local_name(&self.node_type).eq_ignore_ascii_case("stickyNote")
    }

    pub fn has_inline_subnodes(&self) -> bool {
        match &self.subnodes {
            Some(Value::Object(map)) => !map.is_empty(),
            Some(Value::Null) | None => false,
            Some(_) => true,
        }
    }
}

/// Trigger-family naming: `*Trigger`, `webhook`, `start`.
pub fn is_trigger_type(node_type: &str) -> bool {
    let local = local_name(node_type).to_ascii_lowercase();
    local.ends_with("trigger") || local == "webhook" || local == "start"
}

fn local_name(node_type: &str) -> &str {
    node_type.rsplit('.').next().unwrap_or(node_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_naming() {
        assert!(is_trigger_type("acme.scheduleTrigger"));
        assert!(is_trigger_type("acme.webhook"));
        assert!(is_trigger_type("start"));
        assert!(!is_trigger_type("acme.httpRequest"));
        assert!(!is_trigger_type("acme.triggerHandler"));
    }

    #[test]
    fn null_outputs_and_default_kind() {
        let conns: Connections = serde_json::from_str(
            r#"{ "A": { "main": [null, [{ "node": "B", "index": 0 }]] } }"#,
        )
        .unwrap();
        let outputs = &conns["A"]["main"];
        assert!(outputs[0].is_none());
        assert_eq!(outputs[1].as_ref().unwrap()[0].kind, "main");
    }
}
