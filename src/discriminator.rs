//! Discriminator extraction: finds the selector fields of a node type and
//! enumerates every valid combination of their values.
//!
//! A selector is a single-choice field whose value other fields' display
//! rules read. When one selector's definitions are themselves gated on
//! another selector (`operation` per `resource`), the pair forms a two-level
//! tree; otherwise the first selector is used on its own.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::{CUSTOM_SELECTOR_VALUE, FieldKind, FieldSpec};
use crate::display;
use crate::expression;

/// One value per discriminator field, e.g. `{resource: ticket, operation: create}`.
pub type Combination = IndexMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DiscriminatorTree {
    None,
    #[serde(rename_all = "camelCase")]
    Single {
        field: String,
        values: Vec<String>,
        default: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    TwoLevel {
        primary: String,
        primary_default: Option<String>,
        secondary: String,
        branches: IndexMap<String, SelectorBranch>,
    },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SelectorBranch {
    pub values: Vec<String>,
    pub default: Option<String>,
}

/// Outcome of matching live parameters against a tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectorMatch {
    Matched(Combination),
    /// Custom or expression-valued selector: no fixed schema applies.
    NoOpinion,
    Missing {
        field: String,
    },
    Invalid {
        field: String,
        value: String,
        allowed: Vec<String>,
    },
}

impl DiscriminatorTree {
    /// Every combination the tree admits. A tree without selectors yields a
    /// single empty combination.
    pub fn combinations(&self) -> Vec<Combination> {
        match self {
            DiscriminatorTree::None => vec![Combination::new()],
            DiscriminatorTree::Single { field, values, .. } => values
                .iter()
                .map(|v| Combination::from([(field.clone(), v.clone())]))
                .collect(),
            DiscriminatorTree::TwoLevel {
                primary,
                secondary,
                branches,
                ..
            } => {
                let mut out = Vec::new();
                for (p, branch) in branches {
                    if branch.values.is_empty() {
                        out.push(Combination::from([(primary.clone(), p.clone())]));
                    }
                    for s in &branch.values {
                        out.push(Combination::from([
                            (primary.clone(), p.clone()),
                            (secondary.clone(), s.clone()),
                        ]));
                    }
                }
                out
            }
        }
    }

    /// Selector field names, primary first.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            DiscriminatorTree::None => vec![],
            DiscriminatorTree::Single { field, .. } => vec![field.as_str()],
            DiscriminatorTree::TwoLevel {
                primary, secondary, ..
            } => vec![primary.as_str(), secondary.as_str()],
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, DiscriminatorTree::None)
    }

    /// Pick the combination the live parameters select, falling back to the
    /// declared default when a selector is absent.
    pub fn resolve(&self, params: &Map<String, Value>) -> SelectorMatch {
        match self {
            DiscriminatorTree::None => SelectorMatch::Matched(Combination::new()),
            DiscriminatorTree::Single {
                field,
                values,
                default,
            } => match pick(params, field, values, default.as_deref()) {
                Ok(v) => SelectorMatch::Matched(Combination::from([(field.clone(), v)])),
                Err(m) => m,
            },
            DiscriminatorTree::TwoLevel {
                primary,
                primary_default,
                secondary,
                branches,
            } => {
                let primary_values: Vec<String> = branches.keys().cloned().collect();
                let p = match pick(params, primary, &primary_values, primary_default.as_deref()) {
                    Ok(p) => p,
                    Err(m) => return m,
                };
                let Some(branch) = branches.get(&p) else {
                    return SelectorMatch::NoOpinion;
                };
                if branch.values.is_empty() {
                    return SelectorMatch::Matched(Combination::from([(primary.clone(), p)]));
                }
                match pick(params, secondary, &branch.values, branch.default.as_deref()) {
                    Ok(s) => SelectorMatch::Matched(Combination::from([
                        (primary.clone(), p),
                        (secondary.clone(), s),
                    ])),
                    Err(m) => m,
                }
            }
        }
    }
}

fn pick(
    params: &Map<String, Value>,
    field: &str,
    allowed: &[String],
    default: Option<&str>,
) -> Result<String, SelectorMatch> {
    let value = match params.get(field) {
        Some(v) if expression::is_expression(v) => return Err(SelectorMatch::NoOpinion),
        Some(v) => selector_key(v),
        None => default.map(str::to_string),
    };
    let Some(value) = value else {
        return Err(SelectorMatch::Missing {
            field: field.to_string(),
        });
    };
    if value == CUSTOM_SELECTOR_VALUE {
        return Err(SelectorMatch::NoOpinion);
    }
    if allowed.iter().any(|a| *a == value) {
        Ok(value)
    } else {
        Err(SelectorMatch::Invalid {
            field: field.to_string(),
            value,
            allowed: allowed.to_vec(),
        })
    }
}

/// String form of a selector value; `None` for values that cannot select.
pub fn selector_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Build the discriminator tree of a (version-pruned) field list.
pub fn extract(fields: &[FieldSpec]) -> DiscriminatorTree {
    let candidates = selector_candidates(fields);
    if candidates.is_empty() {
        return DiscriminatorTree::None;
    }

    for secondary in &candidates {
        for primary in &candidates {
            if primary == secondary || !is_gated_on(fields, secondary, primary) {
                continue;
            }
            if is_gated_on(fields, primary, secondary) {
                continue;
            }
            return two_level(fields, primary, secondary);
        }
    }

    let field = candidates[0].clone();
    let defs = definitions(fields, &field);
    DiscriminatorTree::Single {
        values: choice_values(defs.iter().copied()),
        default: first_default(defs.iter().copied()),
        field,
    }
}

/// Single-choice fields that some display rule reads, in declaration order.
fn selector_candidates(fields: &[FieldSpec]) -> Vec<String> {
    let mut referenced = HashSet::new();
    collect_references(fields, true, &mut referenced);

    let mut seen = HashSet::new();
    fields
        .iter()
        .filter(|f| matches!(f.kind, FieldKind::Options { .. }))
        .filter(|f| referenced.contains(f.name.as_str()))
        .filter(|f| seen.insert(f.name.clone()))
        .map(|f| f.name.clone())
        .collect()
}

fn collect_references(fields: &[FieldSpec], top_level: bool, out: &mut HashSet<String>) {
    for field in fields {
        if let Some(rule) = &field.display_options {
            for key in rule.referenced_fields() {
                match key.strip_prefix('/') {
                    Some(root_key) => {
                        out.insert(root_key.to_string());
                    }
                    None if top_level => {
                        out.insert(key.to_string());
                    }
                    None => {}
                }
            }
        }
        if let Some(children) = field.kind.children() {
            collect_references(children, false, out);
        }
    }
}

fn definitions<'a>(fields: &'a [FieldSpec], name: &str) -> Vec<&'a FieldSpec> {
    fields.iter().filter(|f| f.name == name).collect()
}

/// Every definition of `field` carries a `show` entry on `selector`.
fn is_gated_on(fields: &[FieldSpec], field: &str, selector: &str) -> bool {
    let defs = definitions(fields, field);
    !defs.is_empty()
        && defs.iter().all(|f| {
            f.display_options
                .as_ref()
                .is_some_and(|r| r.show.contains_key(selector))
        })
}

fn two_level(fields: &[FieldSpec], primary: &str, secondary: &str) -> DiscriminatorTree {
    let primary_defs = definitions(fields, primary);
    let secondary_defs = definitions(fields, secondary);

    let mut branches = IndexMap::new();
    for p in choice_values(primary_defs.iter().copied()) {
        let current = Value::String(p.clone());
        let gated: Vec<&FieldSpec> = secondary_defs
            .iter()
            .copied()
            .filter(|f| {
                f.display_options
                    .as_ref()
                    .and_then(|r| r.show.get(primary))
                    .is_some_and(|accepted| display::any_matches(accepted, Some(&current)))
            })
            .collect();
        branches.insert(
            p,
            SelectorBranch {
                values: choice_values(gated.iter().copied()),
                default: first_default(gated.iter().copied()),
            },
        );
    }

    DiscriminatorTree::TwoLevel {
        primary: primary.to_string(),
        primary_default: first_default(primary_defs.iter().copied()),
        secondary: secondary.to_string(),
        branches,
    }
}

/// Union of declared choice values, minus the reserved custom value.
fn choice_values<'a>(defs: impl Iterator<Item = &'a FieldSpec>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for def in defs {
        for option in def.kind.choices().unwrap_or_default() {
            let Some(key) = selector_key(&option.value) else {
                continue;
            };
            if key != CUSTOM_SELECTOR_VALUE && !out.contains(&key) {
                out.push(key);
            }
        }
    }
    out
}

fn first_default<'a>(mut defs: impl Iterator<Item = &'a FieldSpec>) -> Option<String> {
    defs.find_map(|f| f.default.as_ref().and_then(selector_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Vec<FieldSpec> {
        serde_json::from_value(value).unwrap()
    }

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn ticketing() -> Vec<FieldSpec> {
        fields(json!([
            { "name": "resource", "type": "options", "default": "ticket", "options": [
                { "value": "ticket" }, { "value": "user" }, { "value": "__CUSTOM_API_CALL__" }
            ] },
            { "name": "operation", "type": "options", "default": "create",
              "displayOptions": { "show": { "resource": ["ticket"] } },
              "options": [{ "value": "create" }, { "value": "delete" }] },
            { "name": "operation", "type": "options", "default": "get",
              "displayOptions": { "show": { "resource": ["user"] } },
              "options": [{ "value": "get" }] },
            { "name": "title", "type": "string", "required": true,
              "displayOptions": { "show": { "resource": ["ticket"], "operation": ["create"] } } }
        ]))
    }

    #[test]
    fn no_selectors_yields_none() {
        let tree = extract(&fields(json!([{ "name": "url", "type": "string" }])));
        assert_eq!(tree, DiscriminatorTree::None);
        assert_eq!(tree.combinations(), vec![Combination::new()]);
    }

    #[test]
    fn detects_two_level_chain() {
        let tree = extract(&ticketing());
        let DiscriminatorTree::TwoLevel {
            primary,
            secondary,
            branches,
            ..
        } = &tree
        else {
            panic!("expected two-level tree, got {tree:?}");
        };
        assert_eq!(primary, "resource");
        assert_eq!(secondary, "operation");
        assert_eq!(branches.len(), 2, "custom value must be excluded");
        assert_eq!(branches["ticket"].values, vec!["create", "delete"]);
        assert_eq!(branches["user"].default.as_deref(), Some("get"));
        assert_eq!(tree.combinations().len(), 3);
    }

    #[test]
    fn single_selector_mode() {
        let tree = extract(&fields(json!([
            { "name": "mode", "type": "options", "default": "load",
              "options": [{ "value": "load" }, { "value": "insert" }] },
            { "name": "documents", "type": "string",
              "displayOptions": { "show": { "mode": ["insert"] } } }
        ])));
        assert_eq!(
            tree,
            DiscriminatorTree::Single {
                field: "mode".into(),
                values: vec!["load".into(), "insert".into()],
                default: Some("load".into()),
            }
        );
    }

    #[test]
    fn resolve_falls_back_to_defaults() {
        let tree = extract(&ticketing());
        let SelectorMatch::Matched(combo) = tree.resolve(&params(json!({}))) else {
            panic!("expected match");
        };
        assert_eq!(combo["resource"], "ticket");
        assert_eq!(combo["operation"], "create");

        let SelectorMatch::Matched(combo) = tree.resolve(&params(json!({ "resource": "user" })))
        else {
            panic!("expected match");
        };
        assert_eq!(combo["operation"], "get");
    }

    #[test]
    fn custom_and_expression_values_have_no_opinion() {
        let tree = extract(&ticketing());
        assert_eq!(
            tree.resolve(&params(json!({ "resource": "__CUSTOM_API_CALL__" }))),
            SelectorMatch::NoOpinion
        );
        assert_eq!(
            tree.resolve(&params(json!({ "resource": "={{ $json.kind }}" }))),
            SelectorMatch::NoOpinion
        );
    }

    #[test]
    fn unknown_value_is_invalid() {
        let tree = extract(&ticketing());
        let m = tree.resolve(&params(json!({ "resource": "ticket", "operation": "archive" })));
        assert_eq!(
            m,
            SelectorMatch::Invalid {
                field: "operation".into(),
                value: "archive".into(),
                allowed: vec!["create".into(), "delete".into()],
            }
        );
    }
}
