//! Display-condition evaluation: decides whether a field is visible given the
//! current parameter values.
//!
//! A field is visible iff every `show` entry matches and no `hide` entry
//! matches. A referenced field with no current value falls back to its
//! declared default. Keys prefixed with `/` read the root scope, `@version`
//! reads the node type version.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::catalog::{ConditionValue, DisplayRule, FieldSpec, Operator, VERSION_KEY};

/// Declared defaults of one scope, keyed by field name.
pub type Defaults = IndexMap<String, Value>;

/// Values and defaults of one parameter scope.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub values: &'a Map<String, Value>,
    pub defaults: &'a Defaults,
}

impl<'a> Scope<'a> {
    pub fn new(values: &'a Map<String, Value>, defaults: &'a Defaults) -> Self {
        Scope { values, defaults }
    }

    fn get(&self, name: &str) -> Option<&'a Value> {
        self.values.get(name).or_else(|| self.defaults.get(name))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DisplayContext<'a> {
    pub local: Scope<'a>,
    pub root: Scope<'a>,
    pub version: Option<f64>,
}

impl<'a> DisplayContext<'a> {
    /// Context for the top-level scope, where local and root coincide.
    pub fn root(scope: Scope<'a>, version: Option<f64>) -> Self {
        DisplayContext {
            local: scope,
            root: scope,
            version,
        }
    }

    /// Context for a nested scope below the same root.
    pub fn nested(&self, local: Scope<'a>) -> Self {
        DisplayContext {
            local,
            root: self.root,
            version: self.version,
        }
    }

    fn lookup(&self, key: &str) -> Option<Value> {
        if key == VERSION_KEY {
            return self.version.map(Value::from);
        }
        match key.strip_prefix('/') {
            Some(root_key) => self.root.get(root_key).cloned(),
            None => self.local.get(key).cloned(),
        }
    }
}

/// A rule entry that keeps a field hidden.
#[derive(Debug, Clone, PartialEq)]
pub struct UnmetCondition {
    pub field: String,
    pub expected: Vec<ConditionValue>,
    pub actual: Option<Value>,
    /// `true` when a `hide` entry matched, `false` when a `show` entry did not.
    pub hidden_by: bool,
}

pub fn is_visible(rule: &DisplayRule, ctx: &DisplayContext<'_>) -> bool {
    first_unmet(rule, ctx).is_none()
}

/// The first entry that makes `rule` reject the current values, if any.
pub fn first_unmet(rule: &DisplayRule, ctx: &DisplayContext<'_>) -> Option<UnmetCondition> {
    for (key, accepted) in &rule.show {
        let actual = ctx.lookup(key);
        if !any_matches(accepted, actual.as_ref()) {
            return Some(UnmetCondition {
                field: key.clone(),
                expected: accepted.clone(),
                actual,
                hidden_by: false,
            });
        }
    }
    for (key, rejected) in &rule.hide {
        let actual = ctx.lookup(key);
        if any_matches(rejected, actual.as_ref()) {
            return Some(UnmetCondition {
                field: key.clone(),
                expected: rejected.clone(),
                actual,
                hidden_by: true,
            });
        }
    }
    None
}

/// Whether `actual` satisfies at least one of `accepted`.
pub fn any_matches(accepted: &[ConditionValue], actual: Option<&Value>) -> bool {
    accepted.iter().any(|cond| condition_matches(cond, actual))
}

fn condition_matches(cond: &ConditionValue, actual: Option<&Value>) -> bool {
    match cond {
        ConditionValue::Literal(expected) => actual.is_some_and(|a| literal_matches(expected, a)),
        ConditionValue::Operator { cnd } => operator_matches(cnd, actual),
    }
}

fn literal_matches(expected: &Value, actual: &Value) -> bool {
    match actual {
        Value::Array(items) => items.iter().any(|item| values_eq(expected, item)),
        other => values_eq(expected, other),
    }
}

fn operator_matches(op: &Operator, actual: Option<&Value>) -> bool {
    let actual = actual.filter(|v| !v.is_null());
    match op {
        Operator::Exists(expected) => actual.is_some() == *expected,
        Operator::Eq(v) => actual.is_some_and(|a| values_eq(v, a)),
        Operator::Not(v) => !actual.is_some_and(|a| values_eq(v, a)),
        Operator::Gte(n) => number(actual).is_some_and(|a| a >= *n),
        Operator::Gt(n) => number(actual).is_some_and(|a| a > *n),
        Operator::Lte(n) => number(actual).is_some_and(|a| a <= *n),
        Operator::Lt(n) => number(actual).is_some_and(|a| a < *n),
        Operator::Between { from, to } => number(actual).is_some_and(|a| a >= *from && a <= *to),
        Operator::StartsWith(s) => text(actual).is_some_and(|a| a.starts_with(s.as_str())),
        Operator::EndsWith(s) => text(actual).is_some_and(|a| a.ends_with(s.as_str())),
        Operator::Includes(s) => text(actual).is_some_and(|a| a.contains(s.as_str())),
        Operator::Regex(pattern) => text(actual).is_some_and(|a| pattern.is_match(a)),
    }
}

/// JSON equality that compares numbers by value (`1` equals `1.0`).
pub fn values_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn number(v: Option<&Value>) -> Option<f64> {
    v.and_then(Value::as_f64)
}

fn text(v: Option<&Value>) -> Option<&str> {
    v.and_then(Value::as_str)
}

/// Declared defaults of a field list. The first definition of a name wins.
pub fn defaults_of(fields: &[FieldSpec]) -> Defaults {
    let mut defaults = Defaults::new();
    for field in fields {
        if let Some(default) = &field.default {
            defaults
                .entry(field.name.clone())
                .or_insert_with(|| default.clone());
        }
    }
    defaults
}

/// Render a condition list for messages: `"insert"`, `"a" or "b"`, `>= 2`.
pub fn describe_expected(expected: &[ConditionValue]) -> String {
    expected
        .iter()
        .map(|c| match c {
            ConditionValue::Literal(v) => v.to_string(),
            ConditionValue::Operator { cnd } => describe_operator(cnd),
        })
        .collect::<Vec<_>>()
        .join(" or ")
}

fn describe_operator(op: &Operator) -> String {
    match op {
        Operator::Eq(v) => v.to_string(),
        Operator::Not(v) => format!("not {v}"),
        Operator::Gte(n) => format!(">= {n}"),
        Operator::Gt(n) => format!("> {n}"),
        Operator::Lte(n) => format!("<= {n}"),
        Operator::Lt(n) => format!("< {n}"),
        Operator::Between { from, to } => format!("between {from} and {to}"),
        Operator::StartsWith(s) => format!("starting with \"{s}\""),
        Operator::EndsWith(s) => format!("ending with \"{s}\""),
        Operator::Includes(s) => format!("containing \"{s}\""),
        Operator::Regex(p) => format!("matching /{}/", p.as_str()),
        Operator::Exists(true) => "any value".to_string(),
        Operator::Exists(false) => "no value".to_string(),
    }
}
