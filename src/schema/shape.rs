//! Validator tree of a compiled schema and its evaluation against values.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::DisplayRule;
use crate::display::{self, Defaults, DisplayContext, Scope};
use crate::expression;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SchemaErrorCode {
    Required,
    TypeMismatch,
    InvalidValue,
    UnknownKey,
    ExpressionNotAllowed,
}

/// A conformance failure at a dotted field path (`parameters.options.limit`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaError {
    pub code: SchemaErrorCode,
    pub path: String,
    pub message: String,
}

impl SchemaError {
    pub fn new(code: SchemaErrorCode, path: impl Into<String>, message: impl Into<String>) -> Self {
        SchemaError {
            code,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "camelCase")]
pub enum Check {
    Any,
    String,
    Number,
    Boolean,
    Choice { allowed: Vec<Value> },
    MultiChoice { allowed: Vec<Value> },
    Object { shape: ObjectShape },
    ObjectList { shape: ObjectShape },
    Locator { modes: Vec<String> },
    Mapping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRule {
    pub name: String,
    #[serde(flatten)]
    pub check: Check,
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Visibility that still depends on live values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_when: Option<DisplayRule>,
    #[serde(default = "yes", skip_serializing_if = "is_true")]
    pub allow_expression: bool,
}

fn yes() -> bool {
    true
}

fn is_true(b: &bool) -> bool {
    *b
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectShape {
    pub fields: Vec<FieldRule>,
}

impl ObjectShape {
    pub fn defaults(&self) -> Defaults {
        let mut defaults = Defaults::new();
        for field in &self.fields {
            if let Some(default) = &field.default {
                defaults
                    .entry(field.name.clone())
                    .or_insert_with(|| default.clone());
            }
        }
        defaults
    }

    /// Whether any rule, at any depth, has visibility left to decide.
    pub fn is_conditional(&self) -> bool {
        self.fields.iter().any(|f| {
            f.visible_when.is_some()
                || match &f.check {
                    Check::Object { shape } | Check::ObjectList { shape } => shape.is_conditional(),
                    _ => false,
                }
        })
    }

    pub fn field(&self, name: &str) -> Option<&FieldRule> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Decide top-level visibility against live values: hidden rules are
    /// dropped, the first visible definition of each name is kept.
    pub fn materialize(&self, ctx: &DisplayContext<'_>) -> ObjectShape {
        let mut seen = HashSet::new();
        let fields = self
            .fields
            .iter()
            .filter(|f| is_rule_visible(f, ctx))
            .filter(|f| seen.insert(f.name.clone()))
            .map(|f| FieldRule {
                visible_when: None,
                ..f.clone()
            })
            .collect();
        ObjectShape { fields }
    }

    /// Check an object's values, honouring any visibility left on the rules.
    pub fn check(
        &self,
        values: &Map<String, Value>,
        ctx: &DisplayContext<'_>,
        path: &str,
        errors: &mut Vec<SchemaError>,
    ) {
        let mut seen = HashSet::new();
        for rule in &self.fields {
            if !is_rule_visible(rule, ctx) || !seen.insert(rule.name.as_str()) {
                continue;
            }
            let field_path = join(path, &rule.name);
            match values.get(&rule.name) {
                None | Some(Value::Null) => {
                    if !rule.optional {
                        errors.push(SchemaError::new(
                            SchemaErrorCode::Required,
                            field_path,
                            format!("Required field '{}' is missing", rule.name),
                        ));
                    }
                }
                Some(value) => check_value(rule, value, ctx, &field_path, errors),
            }
        }
    }
}

fn is_rule_visible(rule: &FieldRule, ctx: &DisplayContext<'_>) -> bool {
    rule.visible_when
        .as_ref()
        .is_none_or(|r| display::is_visible(r, ctx))
}

fn check_value(
    rule: &FieldRule,
    value: &Value,
    ctx: &DisplayContext<'_>,
    path: &str,
    errors: &mut Vec<SchemaError>,
) {
    if expression::is_expression(value) {
        if !rule.allow_expression {
            errors.push(SchemaError::new(
                SchemaErrorCode::ExpressionNotAllowed,
                path,
                format!("Field '{}' does not accept expressions", rule.name),
            ));
        }
        return;
    }
    check_against(&rule.check, value, ctx, path, errors);
}

fn check_against(
    check: &Check,
    value: &Value,
    ctx: &DisplayContext<'_>,
    path: &str,
    errors: &mut Vec<SchemaError>,
) {
    match check {
        Check::Any => {}
        Check::String => expect(value.is_string(), "string", value, path, errors),
        Check::Number => expect(value.is_number(), "number", value, path, errors),
        Check::Boolean => expect(value.is_boolean(), "boolean", value, path, errors),
        Check::Choice { allowed } => check_choice(allowed, value, path, errors),
        Check::MultiChoice { allowed } => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    if !expression::is_expression(item) {
                        check_choice(allowed, item, &format!("{path}[{i}]"), errors);
                    }
                }
            }
            None => mismatch("array", value, path, errors),
        },
        Check::Object { shape } => match value.as_object() {
            Some(map) => check_nested(shape, map, ctx, path, errors),
            None => mismatch("object", value, path, errors),
        },
        Check::ObjectList { shape } => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    let item_path = format!("{path}[{i}]");
                    match item.as_object() {
                        Some(map) => check_nested(shape, map, ctx, &item_path, errors),
                        None if expression::is_expression(item) => {}
                        None => mismatch("object", item, &item_path, errors),
                    }
                }
            }
            None => mismatch("array", value, path, errors),
        },
        Check::Locator { modes } => check_locator(modes, value, path, errors),
        Check::Mapping => expect(value.is_object(), "object", value, path, errors),
    }
}

fn check_nested(
    shape: &ObjectShape,
    map: &Map<String, Value>,
    ctx: &DisplayContext<'_>,
    path: &str,
    errors: &mut Vec<SchemaError>,
) {
    let defaults = shape.defaults();
    let nested = ctx.nested(Scope::new(map, &defaults));
    shape.check(map, &nested, path, errors);
}

fn check_choice(allowed: &[Value], value: &Value, path: &str, errors: &mut Vec<SchemaError>) {
    if allowed.iter().any(|a| display::values_eq(a, value)) {
        return;
    }
    let listed: Vec<String> = allowed.iter().map(Value::to_string).collect();
    errors.push(SchemaError::new(
        SchemaErrorCode::InvalidValue,
        path,
        format!("Invalid value {value}; expected one of: {}", listed.join(", ")),
    ));
}

/// A locator is a plain string or `{mode, value}` with a declared mode.
fn check_locator(modes: &[String], value: &Value, path: &str, errors: &mut Vec<SchemaError>) {
    let map = match value {
        Value::String(_) => return,
        Value::Object(map) => map,
        other => return mismatch("locator", other, path, errors),
    };
    if let Some(mode) = map.get("mode").and_then(Value::as_str) {
        if !modes.is_empty() && !modes.iter().any(|m| m == mode) {
            errors.push(SchemaError::new(
                SchemaErrorCode::InvalidValue,
                join(path, "mode"),
                format!(
                    "Invalid locator mode \"{mode}\"; expected one of: {}",
                    modes.join(", ")
                ),
            ));
        }
    }
    match map.get("value") {
        Some(Value::String(_) | Value::Number(_)) => {}
        Some(other) => mismatch("string", other, &join(path, "value"), errors),
        None => errors.push(SchemaError::new(
            SchemaErrorCode::Required,
            join(path, "value"),
            "Locator is missing its 'value'",
        )),
    }
}

fn expect(ok: bool, expected: &str, value: &Value, path: &str, errors: &mut Vec<SchemaError>) {
    if !ok {
        mismatch(expected, value, path, errors);
    }
}

fn mismatch(expected: &str, value: &Value, path: &str, errors: &mut Vec<SchemaError>) {
    errors.push(SchemaError::new(
        SchemaErrorCode::TypeMismatch,
        path,
        format!("Expected {expected}, got {}", type_name(value)),
    ));
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn join(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{base}.{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(name: &str, check: Check, optional: bool) -> FieldRule {
        FieldRule {
            name: name.into(),
            check,
            optional,
            default: None,
            visible_when: None,
            allow_expression: true,
        }
    }

    fn run(shape: &ObjectShape, values: Value) -> Vec<SchemaError> {
        let values = values.as_object().cloned().unwrap();
        let defaults = shape.defaults();
        let ctx = DisplayContext::root(Scope::new(&values, &defaults), None);
        let mut errors = Vec::new();
        shape.check(&values, &ctx, "parameters", &mut errors);
        errors
    }

    #[test]
    fn primitives_accept_expressions() {
        let shape = ObjectShape {
            fields: vec![rule("limit", Check::Number, false)],
        };
        assert!(run(&shape, json!({ "limit": "={{ $json.n }}" })).is_empty());
        let errors = run(&shape, json!({ "limit": "ten" }));
        assert_eq!(errors[0].code, SchemaErrorCode::TypeMismatch);
        assert_eq!(errors[0].path, "parameters.limit");
    }

    #[test]
    fn braces_without_equals_are_literal_text() {
        let shape = ObjectShape {
            fields: vec![rule("limit", Check::Number, false)],
        };
        let errors = run(&shape, json!({ "limit": "abc {{" }));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, SchemaErrorCode::TypeMismatch);
    }

    #[test]
    fn selector_only_fields_reject_expressions() {
        let mut r = rule("mode", Check::Choice { allowed: vec![json!("a")] }, true);
        r.allow_expression = false;
        let shape = ObjectShape { fields: vec![r] };
        let errors = run(&shape, json!({ "mode": "={{ 'a' }}" }));
        assert_eq!(errors[0].code, SchemaErrorCode::ExpressionNotAllowed);
    }

    #[test]
    fn nested_list_paths_are_indexed() {
        let inner = ObjectShape {
            fields: vec![rule("name", Check::String, false)],
        };
        let shape = ObjectShape {
            fields: vec![rule("headers", Check::ObjectList { shape: inner }, true)],
        };
        let errors = run(&shape, json!({ "headers": [{ "name": "a" }, {}] }));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "parameters.headers[1].name");
    }

    #[test]
    fn locator_modes() {
        let shape = ObjectShape {
            fields: vec![rule(
                "channel",
                Check::Locator {
                    modes: vec!["id".into(), "url".into()],
                },
                false,
            )],
        };
        assert!(run(&shape, json!({ "channel": "C123" })).is_empty());
        assert!(run(&shape, json!({ "channel": { "mode": "id", "value": "C1" } })).is_empty());
        let errors = run(&shape, json!({ "channel": { "mode": "name", "value": "x" } }));
        assert_eq!(errors[0].path, "parameters.channel.mode");
    }

    #[test]
    fn hidden_rules_are_skipped_and_materialize_dedupes() {
        let hidden_when_load: DisplayRule =
            serde_json::from_value(json!({ "hide": { "mode": ["load"] } })).unwrap();
        let mut strict_text = rule("text", Check::String, false);
        strict_text.visible_when = Some(hidden_when_load);
        let shape = ObjectShape {
            fields: vec![
                rule("mode", Check::String, true),
                strict_text,
                rule("text", Check::Any, true),
            ],
        };
        assert!(run(&shape, json!({ "mode": "load", "text": 5 })).is_empty());
        assert_eq!(run(&shape, json!({ "mode": "insert", "text": 5 })).len(), 1);

        let values = json!({ "mode": "load" }).as_object().cloned().unwrap();
        let defaults = Defaults::new();
        let ctx = DisplayContext::root(Scope::new(&values, &defaults), None);
        let materialized = shape.materialize(&ctx);
        assert_eq!(materialized.fields.len(), 2);
        assert_eq!(materialized.field("text").unwrap().check, Check::Any);
        assert!(!materialized.is_conditional());
    }
}
