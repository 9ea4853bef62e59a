//! Serde model of node-type catalog records.
//!
//! A catalog record describes one node type: its configuration fields, the
//! versions it covers and the capability slots it exposes on either side.

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Selector value reserved for free-form API calls. No fixed schema can
/// describe it, so generation skips it and resolution treats it as valid.
pub const CUSTOM_SELECTOR_VALUE: &str = "__CUSTOM_API_CALL__";

/// Display-rule key that refers to the node type version instead of a field.
pub const VERSION_KEY: &str = "@version";

// =============================================================================
// NODE TYPE
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTypeSpec {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub version: VersionSpec,
    #[serde(default)]
    pub default_version: Option<f64>,
    #[serde(default)]
    pub properties: Vec<FieldSpec>,
    #[serde(default)]
    pub inputs: InputSpec,
    #[serde(default)]
    pub outputs: OutputSpec,
}

impl NodeTypeSpec {
    /// All versions this record describes.
    pub fn versions(&self) -> Vec<f64> {
        match &self.version {
            VersionSpec::One(v) => vec![*v],
            VersionSpec::Many(vs) => vs.clone(),
        }
    }

    pub fn covers_version(&self, version: f64) -> bool {
        self.versions().iter().any(|v| *v == version)
    }

    /// The version used when a node instance does not state one.
    pub fn latest_version(&self) -> f64 {
        self.default_version.unwrap_or_else(|| {
            self.versions()
                .into_iter()
                .fold(f64::MIN, f64::max)
        })
    }

    pub fn capability_input(&self, kind: &str) -> Option<&CapabilityInput> {
        self.inputs.capabilities.iter().find(|c| c.kind == kind)
    }

    pub fn capability_output(&self, kind: &str) -> Option<&CapabilityOutput> {
        self.outputs.capabilities.iter().find(|c| c.kind == kind)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VersionSpec {
    One(f64),
    Many(Vec<f64>),
}

/// Canonical cache/file key for a version number (`2`, `1.1`).
pub fn version_key(version: f64) -> String {
    format!("{version}")
}

// =============================================================================
// SLOTS
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSpec {
    /// `None` when the record does not say; slot bounds are then unchecked.
    #[serde(default)]
    pub main: Option<SlotCount>,
    #[serde(default)]
    pub capabilities: Vec<CapabilityInput>,
}

impl InputSpec {
    /// The declared number of ordinary inputs, when it is known and fixed.
    pub fn fixed_main(&self) -> Option<usize> {
        self.main.and_then(|count| count.fixed())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSpec {
    #[serde(default)]
    pub main: Option<usize>,
    #[serde(default)]
    pub capabilities: Vec<CapabilityOutput>,
}

/// Number of ordinary input slots: a fixed count or `"dynamic"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlotCount {
    Fixed(usize),
    Dynamic(DynamicSlots),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DynamicSlots {
    Dynamic,
}

impl SlotCount {
    /// `None` when the count is only known at runtime.
    pub fn fixed(&self) -> Option<usize> {
        match self {
            SlotCount::Fixed(n) => Some(*n),
            SlotCount::Dynamic(_) => None,
        }
    }
}

/// A capability the node accepts from a sub-node (model, tool, memory, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityInput {
    pub kind: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub cardinality: Cardinality,
    /// Evaluated against the consuming node's own parameters.
    #[serde(default)]
    pub display_options: Option<DisplayRule>,
}

/// A capability role the node can play for another node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityOutput {
    pub kind: String,
    /// Evaluated against the supplying node's own parameters.
    #[serde(default)]
    pub display_options: Option<DisplayRule>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Cardinality {
    #[default]
    Single,
    List,
    Either,
}

impl Cardinality {
    pub fn accepts_list(self) -> bool {
        matches!(self, Cardinality::List | Cardinality::Either)
    }
}

// =============================================================================
// FIELDS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub display_options: Option<DisplayRule>,
    /// Selector-only field: its value cannot be a templated expression.
    #[serde(default)]
    pub no_data_expression: bool,
}

impl FieldSpec {
    /// A declared default supplies the value at execution time, so it makes
    /// the field optional whatever `required` says.
    pub fn is_optional(&self) -> bool {
        !self.required || self.default.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Options {
        #[serde(default)]
        options: Vec<ChoiceOption>,
    },
    MultiOptions {
        #[serde(default)]
        options: Vec<ChoiceOption>,
    },
    Collection {
        #[serde(default)]
        fields: Vec<FieldSpec>,
    },
    CollectionList {
        #[serde(default)]
        fields: Vec<FieldSpec>,
    },
    Locator {
        #[serde(default)]
        modes: Vec<String>,
    },
    Mapping,
}

impl FieldKind {
    pub fn choices(&self) -> Option<&[ChoiceOption]> {
        match self {
            FieldKind::Options { options } | FieldKind::MultiOptions { options } => Some(options),
            _ => None,
        }
    }

    pub fn children(&self) -> Option<&[FieldSpec]> {
        match self {
            FieldKind::Collection { fields } | FieldKind::CollectionList { fields } => Some(fields),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceOption {
    #[serde(default)]
    pub name: Option<String>,
    pub value: Value,
}

// =============================================================================
// DISPLAY RULES
// =============================================================================

/// `show`/`hide` maps from a referenced field to the values that trigger them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayRule {
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub show: IndexMap<String, Vec<ConditionValue>>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub hide: IndexMap<String, Vec<ConditionValue>>,
}

impl DisplayRule {
    pub fn is_empty(&self) -> bool {
        self.show.is_empty() && self.hide.is_empty()
    }

    /// Field names the rule reads (excluding `@version`).
    pub fn referenced_fields(&self) -> impl Iterator<Item = &str> {
        self.show
            .keys()
            .chain(self.hide.keys())
            .map(String::as_str)
            .filter(|k| *k != VERSION_KEY)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Operator {
        #[serde(rename = "_cnd")]
        cnd: Operator,
    },
    Literal(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Eq(Value),
    Not(Value),
    Gte(f64),
    Gt(f64),
    Lte(f64),
    Lt(f64),
    Between { from: f64, to: f64 },
    StartsWith(String),
    EndsWith(String),
    Includes(String),
    Regex(Pattern),
    Exists(bool),
}

/// Operand of the `regex` operator, compiled when the rule is read. A
/// pattern that does not compile never matches.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    compiled: Option<Regex>,
}

impl Pattern {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let compiled = Regex::new(&source).ok();
        Pattern { source, compiled }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.compiled.as_ref().is_some_and(|re| re.is_match(text))
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Pattern::new)
    }
}
