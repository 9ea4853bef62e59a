//! Compiled schemas: the output of synthesis and the input of resolution.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::catalog::{Cardinality, DisplayRule};
use crate::discriminator::{Combination, DiscriminatorTree, SelectorMatch};
use crate::display::{self, DisplayContext, Scope};

use super::shape::{ObjectShape, SchemaError, SchemaErrorCode, join, type_name};

/// Either a fixed validator, or one that must be materialised against the
/// live parameters because some visibility depends on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "camelCase")]
pub enum CompiledSchema {
    Static { shape: ObjectShape },
    Conditional { factory: ShapeFactory },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeFactory {
    blueprint: ObjectShape,
}

impl ShapeFactory {
    pub fn new(blueprint: ObjectShape) -> Self {
        ShapeFactory { blueprint }
    }

    pub fn build(&self, ctx: &DisplayContext<'_>) -> ObjectShape {
        self.blueprint.materialize(ctx)
    }
}

impl CompiledSchema {
    pub fn from_shape(shape: ObjectShape) -> Self {
        if shape.is_conditional() {
            CompiledSchema::Conditional {
                factory: ShapeFactory::new(shape),
            }
        } else {
            CompiledSchema::Static { shape }
        }
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self, CompiledSchema::Conditional { .. })
    }

    /// The full rule set, before any live visibility is decided.
    pub fn blueprint(&self) -> &ObjectShape {
        match self {
            CompiledSchema::Static { shape } => shape,
            CompiledSchema::Conditional { factory } => &factory.blueprint,
        }
    }

    /// The validator that applies to the given values.
    pub fn validator(&self, ctx: &DisplayContext<'_>) -> Cow<'_, ObjectShape> {
        match self {
            CompiledSchema::Static { shape } => Cow::Borrowed(shape),
            CompiledSchema::Conditional { factory } => Cow::Owned(factory.build(ctx)),
        }
    }
}

/// One capability-input slot relevant to a variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnodeSlot {
    pub kind: String,
    pub cardinality: Cardinality,
    pub required: bool,
    /// Acceptance that still depends on live values. A required slot is only
    /// required while this holds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_when: Option<DisplayRule>,
}

impl SubnodeSlot {
    fn is_required(&self, ctx: &DisplayContext<'_>) -> bool {
        self.required
            && self
                .accepted_when
                .as_ref()
                .is_none_or(|rule| display::is_visible(rule, ctx))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnodeSchema {
    pub slots: Vec<SubnodeSlot>,
    /// Every kind the node type declares, including kinds ruled out for
    /// this variant.
    pub declared_kinds: Vec<String>,
    /// At least one slot is unconditionally required.
    pub required: bool,
}

impl SubnodeSchema {
    pub fn slot(&self, kind: &str) -> Option<&SubnodeSlot> {
        self.slots.iter().find(|s| s.kind == kind)
    }

    pub fn check(&self, value: Option<&Value>, ctx: &DisplayContext<'_>, errors: &mut Vec<SchemaError>) {
        let missing: Vec<&SubnodeSlot> = self
            .slots
            .iter()
            .filter(|s| s.is_required(ctx))
            .filter(|s| value.and_then(|v| v.get(&s.kind)).is_none_or(is_empty_ref))
            .collect();

        let map = match value {
            None | Some(Value::Null) => {
                if !missing.is_empty() {
                    let kinds: Vec<&str> = missing.iter().map(|s| s.kind.as_str()).collect();
                    errors.push(SchemaError::new(
                        SchemaErrorCode::Required,
                        "subnodes",
                        format!("Required sub-nodes are missing: {}", kinds.join(", ")),
                    ));
                }
                return;
            }
            Some(Value::Object(map)) => map,
            Some(other) => {
                errors.push(SchemaError::new(
                    SchemaErrorCode::TypeMismatch,
                    "subnodes",
                    format!("Expected object, got {}", type_name(other)),
                ));
                return;
            }
        };

        for slot in missing {
            errors.push(SchemaError::new(
                SchemaErrorCode::Required,
                join("subnodes", &slot.kind),
                format!("Required sub-node '{}' is missing", slot.kind),
            ));
        }

        for (kind, entry) in map {
            let path = join("subnodes", kind);
            if !self.declared_kinds.iter().any(|k| k == kind) {
                errors.push(SchemaError::new(
                    SchemaErrorCode::UnknownKey,
                    path,
                    format!("Unknown sub-node kind '{kind}'"),
                ));
                continue;
            }
            let cardinality = self
                .slot(kind)
                .map(|s| s.cardinality)
                .unwrap_or(Cardinality::Either);
            check_slot_entry(kind, cardinality, entry, &path, errors);
        }
    }
}

fn is_empty_ref(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn check_slot_entry(
    kind: &str,
    cardinality: Cardinality,
    entry: &Value,
    path: &str,
    errors: &mut Vec<SchemaError>,
) {
    match (entry, cardinality) {
        (Value::Null, _) => {}
        (Value::Array(items), c) if c.accepts_list() => {
            for (i, item) in items.iter().enumerate() {
                check_node_ref(item, &format!("{path}[{i}]"), errors);
            }
        }
        (Value::Array(_), _) => errors.push(SchemaError::new(
            SchemaErrorCode::TypeMismatch,
            path,
            format!("Sub-node '{kind}' accepts a single node, got a list"),
        )),
        (_, Cardinality::List) => errors.push(SchemaError::new(
            SchemaErrorCode::TypeMismatch,
            path,
            format!("Sub-node '{kind}' expects a list of nodes"),
        )),
        (item, _) => check_node_ref(item, path, errors),
    }
}

/// `{type, typeVersion?, parameters?}`
fn check_node_ref(value: &Value, path: &str, errors: &mut Vec<SchemaError>) {
    let Some(map) = value.as_object() else {
        errors.push(SchemaError::new(
            SchemaErrorCode::TypeMismatch,
            path,
            format!("Expected node reference object, got {}", type_name(value)),
        ));
        return;
    };
    match map.get("type") {
        Some(Value::String(_)) => {}
        Some(other) => errors.push(SchemaError::new(
            SchemaErrorCode::TypeMismatch,
            join(path, "type"),
            format!("Expected string, got {}", type_name(other)),
        )),
        None => errors.push(SchemaError::new(
            SchemaErrorCode::Required,
            join(path, "type"),
            "Sub-node reference is missing its 'type'",
        )),
    }
    if let Some(v) = map.get("typeVersion").filter(|v| !v.is_number()) {
        errors.push(SchemaError::new(
            SchemaErrorCode::TypeMismatch,
            join(path, "typeVersion"),
            format!("Expected number, got {}", type_name(v)),
        ));
    }
    if let Some(v) = map.get("parameters").filter(|v| !v.is_object()) {
        errors.push(SchemaError::new(
            SchemaErrorCode::TypeMismatch,
            join(path, "parameters"),
            format!("Expected object, got {}", type_name(v)),
        ));
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantSchema {
    pub combination: Combination,
    pub parameters: CompiledSchema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnodes: Option<SubnodeSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedCapability {
    pub kind: String,
    pub cardinality: Cardinality,
}

/// Every variant of one node type at one version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeSchema {
    pub node_type: String,
    pub version: f64,
    pub discriminators: DiscriminatorTree,
    pub variants: Vec<VariantSchema>,
    /// Top-level parameter names declared at this version.
    pub known_parameters: Vec<String>,
    pub accepted_capabilities: Vec<AcceptedCapability>,
}

/// The parts of a node instance a schema judges.
#[derive(Debug, Clone, Copy)]
pub struct NodeConfig<'a> {
    pub parameters: &'a Map<String, Value>,
    pub subnodes: Option<&'a Value>,
}

impl TypeSchema {
    pub fn variant(&self, combination: &Combination) -> Option<&VariantSchema> {
        self.variants.iter().find(|v| &v.combination == combination)
    }

    pub fn capability(&self, kind: &str) -> Option<&AcceptedCapability> {
        self.accepted_capabilities.iter().find(|c| c.kind == kind)
    }

    /// Check a configuration against the variant its selectors pick.
    /// Selectors that defer to runtime leave nothing to check.
    pub fn validate(&self, config: NodeConfig<'_>, strict: bool) -> Vec<SchemaError> {
        let params = config.parameters;
        let mut errors = Vec::new();

        let combination = match self.discriminators.resolve(params) {
            SelectorMatch::Matched(combination) => combination,
            SelectorMatch::NoOpinion => {
                debug!(node_type = %self.node_type, "selectors decided at runtime, skipping");
                return errors;
            }
            SelectorMatch::Missing { field } => {
                errors.push(SchemaError::new(
                    SchemaErrorCode::Required,
                    join("parameters", &field),
                    format!("Required field '{field}' is missing"),
                ));
                return errors;
            }
            SelectorMatch::Invalid {
                field,
                value,
                allowed,
            } => {
                errors.push(SchemaError::new(
                    SchemaErrorCode::InvalidValue,
                    join("parameters", &field),
                    format!(
                        "Invalid value \"{value}\" for '{field}'; expected one of: {}",
                        allowed.join(", ")
                    ),
                ));
                return errors;
            }
        };
        let Some(variant) = self.variant(&combination) else {
            return errors;
        };

        let defaults = variant.parameters.blueprint().defaults();
        let ctx = DisplayContext::root(Scope::new(params, &defaults), Some(self.version));
        variant
            .parameters
            .validator(&ctx)
            .check(params, &ctx, "parameters", &mut errors);

        if strict {
            for key in params.keys() {
                if !self.known_parameters.iter().any(|k| k == key) {
                    errors.push(SchemaError::new(
                        SchemaErrorCode::UnknownKey,
                        join("parameters", key),
                        format!("Unknown parameter '{key}'"),
                    ));
                }
            }
        }

        match &variant.subnodes {
            Some(schema) => schema.check(config.subnodes, &ctx, &mut errors),
            None => {
                if let Some(map) = config.subnodes.and_then(Value::as_object) {
                    for kind in map.keys() {
                        errors.push(SchemaError::new(
                            SchemaErrorCode::UnknownKey,
                            join("subnodes", kind),
                            format!("Unknown sub-node kind '{kind}'"),
                        ));
                    }
                }
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn slots(required: bool, cardinality: Cardinality) -> SubnodeSchema {
        SubnodeSchema {
            slots: vec![SubnodeSlot {
                kind: "ai_languageModel".into(),
                cardinality,
                required,
                accepted_when: None,
            }],
            declared_kinds: vec!["ai_languageModel".into(), "ai_memory".into()],
            required,
        }
    }

    fn check(schema: &SubnodeSchema, value: Option<Value>) -> Vec<SchemaError> {
        let params = Map::new();
        let defaults = Default::default();
        let ctx = DisplayContext::root(Scope::new(&params, &defaults), None);
        let mut errors = Vec::new();
        schema.check(value.as_ref(), &ctx, &mut errors);
        errors
    }

    #[test]
    fn absent_composition_with_required_slot() {
        let errors = check(&slots(true, Cardinality::Single), None);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "subnodes");
        assert!(check(&slots(false, Cardinality::Single), None).is_empty());
    }

    #[test]
    fn cardinality_is_enforced() {
        let list = json!({ "ai_languageModel": [{ "type": "x.chat" }] });
        let errors = check(&slots(true, Cardinality::Single), Some(list.clone()));
        assert_eq!(errors[0].path, "subnodes.ai_languageModel");
        assert!(check(&slots(true, Cardinality::Either), Some(list)).is_empty());

        let single = json!({ "ai_languageModel": { "type": "x.chat" } });
        assert_eq!(check(&slots(true, Cardinality::List), Some(single)).len(), 1);
    }

    #[test]
    fn declared_but_irrelevant_kind_is_not_unknown() {
        let value = json!({ "ai_languageModel": { "type": "x.chat" }, "ai_memory": { "type": "x.buffer" } });
        assert!(check(&slots(true, Cardinality::Single), Some(value)).is_empty());

        let value = json!({ "ai_languageModel": { "type": "x.chat" }, "ai_tool": [] });
        let errors = check(&slots(true, Cardinality::Single), Some(value));
        assert_eq!(errors[0].code, SchemaErrorCode::UnknownKey);
    }

    #[test]
    fn node_reference_needs_a_type() {
        let value = json!({ "ai_languageModel": { "parameters": {} } });
        let errors = check(&slots(false, Cardinality::Single), Some(value));
        assert_eq!(errors[0].path, "subnodes.ai_languageModel.type");
    }
}
