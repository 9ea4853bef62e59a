//! Schema synthesis: one compiled validator per (type, version, combination).
//!
//! Rules are evaluated statically wherever they only read discriminator
//! fields; everything else is left on the rule as residual visibility and
//! makes the variant conditional.

use serde_json::Value;
use tracing::debug;

use crate::catalog::version::prune_for_version;
use crate::catalog::{ConditionValue, DisplayRule, FieldKind, FieldSpec, NodeTypeSpec};
use crate::discriminator::{self, Combination, selector_key};
use crate::display;

use super::compiled::{
    AcceptedCapability, CompiledSchema, SubnodeSchema, SubnodeSlot, TypeSchema, VariantSchema,
};
use super::shape::{Check, FieldRule, ObjectShape};

/// Result of evaluating a rule as far as a combination allows.
#[derive(Debug, Clone, PartialEq)]
enum Partial {
    Visible,
    Hidden,
    Residual(DisplayRule),
}

/// Compile every variant of `spec` at `version`.
pub fn compile_type(spec: &NodeTypeSpec, version: f64) -> TypeSchema {
    let fields = prune_for_version(&spec.properties, version);
    let discriminators = discriminator::extract(&fields);
    let selectors: Vec<String> = discriminators.fields().iter().map(|f| f.to_string()).collect();

    let variants: Vec<VariantSchema> = discriminators
        .combinations()
        .into_iter()
        .map(|combination| {
            let shape = compile_shape(&fields, &combination, &selectors, true);
            VariantSchema {
                parameters: CompiledSchema::from_shape(shape),
                subnodes: compile_subnodes(spec, &combination),
                combination,
            }
        })
        .collect();

    let mut known_parameters: Vec<String> = Vec::new();
    for field in &fields {
        if !known_parameters.contains(&field.name) {
            known_parameters.push(field.name.clone());
        }
    }

    debug!(
        node_type = %spec.name,
        version,
        variants = variants.len(),
        "compiled node type"
    );

    TypeSchema {
        node_type: spec.name.clone(),
        version,
        discriminators,
        variants,
        known_parameters,
        accepted_capabilities: spec
            .inputs
            .capabilities
            .iter()
            .map(|c| AcceptedCapability {
                kind: c.kind.clone(),
                cardinality: c.cardinality,
            })
            .collect(),
    }
}

fn compile_shape(
    fields: &[FieldSpec],
    combination: &Combination,
    selectors: &[String],
    top_level: bool,
) -> ObjectShape {
    let fields = fields
        .iter()
        .filter_map(|field| {
            let visible_when = match partial_eval(field.display_options.as_ref(), combination, top_level) {
                Partial::Hidden => return None,
                Partial::Visible => None,
                Partial::Residual(rule) => Some(rule),
            };
            let pinned = top_level && selectors.contains(&field.name);
            let check = match combination.get(&field.name) {
                Some(selected) if pinned => pin(field, selected),
                _ => compile_check(&field.kind, combination, selectors),
            };
            Some(FieldRule {
                name: field.name.clone(),
                check,
                optional: field.is_optional(),
                default: field.default.clone(),
                visible_when,
                allow_expression: !field.no_data_expression,
            })
        })
        .collect();
    ObjectShape { fields }
}

fn compile_check(kind: &FieldKind, combination: &Combination, selectors: &[String]) -> Check {
    match kind {
        FieldKind::String => Check::String,
        FieldKind::Number => Check::Number,
        FieldKind::Boolean => Check::Boolean,
        FieldKind::Options { options } => Check::Choice {
            allowed: options.iter().map(|o| o.value.clone()).collect(),
        },
        FieldKind::MultiOptions { options } => Check::MultiChoice {
            allowed: options.iter().map(|o| o.value.clone()).collect(),
        },
        FieldKind::Collection { fields } => Check::Object {
            shape: compile_shape(fields, combination, selectors, false),
        },
        FieldKind::CollectionList { fields } => Check::ObjectList {
            shape: compile_shape(fields, combination, selectors, false),
        },
        FieldKind::Locator { modes } => Check::Locator {
            modes: modes.clone(),
        },
        FieldKind::Mapping => Check::Mapping,
    }
}

/// A selector field only accepts the value its variant was built for.
fn pin(field: &FieldSpec, selected: &str) -> Check {
    let value = field
        .kind
        .choices()
        .unwrap_or_default()
        .iter()
        .find(|o| selector_key(&o.value).as_deref() == Some(selected))
        .map(|o| o.value.clone())
        .unwrap_or_else(|| Value::String(selected.to_string()));
    Check::Choice {
        allowed: vec![value],
    }
}

/// Decide the entries of `rule` that only read combination fields. Nested
/// scopes can reach them through `/`-prefixed keys only.
fn partial_eval(rule: Option<&DisplayRule>, combination: &Combination, top_level: bool) -> Partial {
    let Some(rule) = rule else {
        return Partial::Visible;
    };
    let mut residual = DisplayRule::default();

    for (key, accepted) in &rule.show {
        match selected(key, combination, top_level) {
            Some(value) if !combination_matches(accepted, value) => return Partial::Hidden,
            Some(_) => {}
            None => {
                residual.show.insert(key.clone(), accepted.clone());
            }
        }
    }
    for (key, rejected) in &rule.hide {
        match selected(key, combination, top_level) {
            Some(value) if combination_matches(rejected, value) => return Partial::Hidden,
            Some(_) => {}
            None => {
                residual.hide.insert(key.clone(), rejected.clone());
            }
        }
    }

    if residual.is_empty() {
        Partial::Visible
    } else {
        Partial::Residual(residual)
    }
}

fn selected<'a>(key: &str, combination: &'a Combination, top_level: bool) -> Option<&'a str> {
    let name = match key.strip_prefix('/') {
        Some(root_key) => root_key,
        None if top_level => key,
        None => return None,
    };
    combination.get(name).map(String::as_str)
}

fn combination_matches(accepted: &[ConditionValue], value: &str) -> bool {
    display::any_matches(accepted, Some(&Value::String(value.to_string())))
        || accepted.iter().any(|c| match c {
            ConditionValue::Literal(v) => selector_key(v).as_deref() == Some(value),
            ConditionValue::Operator { .. } => false,
        })
}

fn compile_subnodes(spec: &NodeTypeSpec, combination: &Combination) -> Option<SubnodeSchema> {
    let capabilities = &spec.inputs.capabilities;
    if capabilities.is_empty() {
        return None;
    }

    let slots: Vec<SubnodeSlot> = capabilities
        .iter()
        .filter_map(|cap| {
            let accepted_when = match partial_eval(cap.display_options.as_ref(), combination, true) {
                Partial::Hidden => return None,
                Partial::Visible => None,
                Partial::Residual(rule) => Some(rule),
            };
            Some(SubnodeSlot {
                kind: cap.kind.clone(),
                cardinality: cap.cardinality,
                required: cap.required,
                accepted_when,
            })
        })
        .collect();

    Some(SubnodeSchema {
        required: slots.iter().any(|s| s.required && s.accepted_when.is_none()),
        declared_kinds: capabilities.iter().map(|c| c.kind.clone()).collect(),
        slots,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(value: Value) -> NodeTypeSpec {
        serde_json::from_value(value).unwrap()
    }

    fn ticketing() -> NodeTypeSpec {
        spec(json!({
            "name": "acme.helpdesk",
            "version": [1, 2],
            "properties": [
                { "name": "resource", "type": "options", "default": "ticket",
                  "options": [{ "value": "ticket" }, { "value": "user" }] },
                { "name": "operation", "type": "options", "default": "create",
                  "displayOptions": { "show": { "resource": ["ticket"] } },
                  "options": [{ "value": "create" }, { "value": "delete" }] },
                { "name": "operation", "type": "options", "default": "get",
                  "displayOptions": { "show": { "resource": ["user"] } },
                  "options": [{ "value": "get" }] },
                { "name": "title", "type": "string", "required": true,
                  "displayOptions": { "show": { "resource": ["ticket"], "operation": ["create"] } } },
                { "name": "priority", "type": "number",
                  "displayOptions": { "show": { "resource": ["ticket"], "@version": [2] } } },
                { "name": "notify", "type": "boolean", "default": false },
                { "name": "email", "type": "string", "required": true,
                  "displayOptions": { "show": { "notify": [true] } } }
            ]
        }))
    }

    fn combo(pairs: &[(&str, &str)]) -> Combination {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn one_variant_per_combination() {
        let schema = compile_type(&ticketing(), 1.0);
        assert_eq!(schema.variants.len(), 3);
        assert_eq!(schema.known_parameters, vec!["resource", "operation", "title", "notify", "email"]);
    }

    #[test]
    fn static_entries_are_decided_at_compile_time() {
        let schema = compile_type(&ticketing(), 2.0);
        let create = schema
            .variant(&combo(&[("resource", "ticket"), ("operation", "create")]))
            .unwrap();
        let shape = create.parameters.blueprint();
        assert!(shape.field("title").unwrap().visible_when.is_none());
        assert!(shape.field("priority").is_some());
        assert_eq!(
            shape.field("operation").unwrap().check,
            Check::Choice {
                allowed: vec![json!("create")]
            }
        );

        let delete = schema
            .variant(&combo(&[("resource", "ticket"), ("operation", "delete")]))
            .unwrap();
        assert!(delete.parameters.blueprint().field("title").is_none());
    }

    #[test]
    fn live_dependencies_make_the_variant_conditional() {
        let schema = compile_type(&ticketing(), 1.0);
        let variant = schema
            .variant(&combo(&[("resource", "user"), ("operation", "get")]))
            .unwrap();
        assert!(variant.parameters.is_conditional());
        let email = variant.parameters.blueprint().field("email").unwrap();
        assert!(email.visible_when.as_ref().unwrap().show.contains_key("notify"));
    }

    #[test]
    fn defaults_make_fields_optional() {
        let schema = compile_type(&ticketing(), 1.0);
        let shape = schema.variants[0].parameters.blueprint();
        assert!(shape.field("notify").unwrap().optional);
        assert!(!shape.field("title").unwrap().optional);
    }

    #[test]
    fn capability_slots_follow_the_combination() {
        let agent = spec(json!({
            "name": "acme.agent",
            "version": 1,
            "properties": [
                { "name": "mode", "type": "options", "default": "chat",
                  "options": [{ "value": "chat" }, { "value": "tools" }] },
                { "name": "prompt", "type": "string",
                  "displayOptions": { "show": { "mode": ["chat", "tools"] } } }
            ],
            "inputs": { "capabilities": [
                { "kind": "ai_languageModel", "required": true },
                { "kind": "ai_tool", "cardinality": "list", "required": true,
                  "displayOptions": { "show": { "mode": ["tools"] } } }
            ] }
        }));
        let schema = compile_type(&agent, 1.0);

        let chat = schema.variant(&combo(&[("mode", "chat")])).unwrap();
        let subnodes = chat.subnodes.as_ref().unwrap();
        assert_eq!(subnodes.slots.len(), 1);
        assert_eq!(subnodes.declared_kinds.len(), 2);
        assert!(subnodes.required);

        let tools = schema.variant(&combo(&[("mode", "tools")])).unwrap();
        assert!(tools.subnodes.as_ref().unwrap().slot("ai_tool").is_some());
    }
}
