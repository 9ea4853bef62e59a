//! Capability connections: reconciling edge-attached sub-nodes with the
//! inline `subnodes` form, and the two mismatch checks that read both ends.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::catalog::version::prune_for_version;
use crate::catalog::NodeTypeProvider;
use crate::display::{self, DisplayContext, Scope, UnmetCondition};
use crate::schema::NodeConfig;
use crate::workflow::NodeInstance;

use super::Context;
use super::issue::{IssueCode, ValidationIssue};

/// One sub-node attached to a consumer, whichever form it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub kind: String,
    /// Position in a list-valued entry.
    pub position: Option<usize>,
    pub node_type: String,
    pub version: Option<f64>,
    pub parameters: Map<String, Value>,
    /// The attachment's own sub-configuration.
    pub subnodes: Option<Value>,
    /// Attachments of this attachment, in entry order.
    pub children: Vec<Attachment>,
    path: String,
}

impl Attachment {
    /// `subnodes.ai_tool[1]`, or `subnodes.ai_tool[0].subnodes.ai_languageModel`
    /// below another attachment.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn from_ref(kind: &str, position: Option<usize>, value: &Value, parent: Option<&str>) -> Option<Self> {
        let map = value.as_object()?;
        let node_type = map.get("type")?.as_str()?.to_string();
        let slot = match parent {
            Some(parent) => format!("{parent}.subnodes.{kind}"),
            None => format!("subnodes.{kind}"),
        };
        let path = match position {
            Some(i) => format!("{slot}[{i}]"),
            None => slot,
        };
        let subnodes = map.get("subnodes").filter(|v| !v.is_null()).cloned();
        let children = subnodes
            .as_ref()
            .map(|nested| collect(nested, Some(&path)))
            .unwrap_or_default();
        Some(Attachment {
            kind: kind.to_string(),
            position,
            node_type,
            version: map.get("typeVersion").and_then(Value::as_f64),
            parameters: map
                .get("parameters")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            subnodes,
            children,
            path,
        })
    }
}

/// The node's sub-configuration: inline if present, otherwise rebuilt from
/// the capability edges that supply it. Suppliers with suppliers of their
/// own carry a nested `subnodes` entry built the same way.
pub fn effective_subnodes(
    ctx: &Context<'_>,
    node: &NodeInstance,
    warnings: &mut Vec<ValidationIssue>,
) -> Option<Value> {
    let mut rebuild = Rebuild {
        ctx,
        reported_on: &node.name,
        visiting: vec![node.name.clone()],
        warnings,
    };
    rebuild.subnodes_of(node, "subnodes")
}

/// State of one reconstruction below a top-level node.
struct Rebuild<'c, 'a> {
    ctx: &'c Context<'a>,
    reported_on: &'c str,
    /// Names on the current supplier chain; a cycle stops at the repeat.
    visiting: Vec<String>,
    warnings: &'c mut Vec<ValidationIssue>,
}

impl Rebuild<'_, '_> {
    fn subnodes_of(&mut self, node: &NodeInstance, base: &str) -> Option<Value> {
        if node.has_inline_subnodes() {
            return node.subnodes.clone();
        }
        self.reconstruct(node, base)
    }

    fn reconstruct(&mut self, node: &NodeInstance, base: &str) -> Option<Value> {
        let ctx = self.ctx;
        let mut by_kind: IndexMap<&str, Vec<&NodeInstance>> = IndexMap::new();
        for edge in ctx.graph.capability_inputs(&node.name) {
            if let Some(supplier) = ctx.workflow.node(edge.source) {
                by_kind.entry(edge.label.kind.as_str()).or_default().push(supplier);
            }
        }
        if by_kind.is_empty() {
            return None;
        }

        let mut subnodes = Map::new();
        for (kind, suppliers) in by_kind {
            let slot = format!("{base}.{kind}");
            let entry = if accepts_list(ctx, node, kind, suppliers.len()) {
                let mut items = Vec::with_capacity(suppliers.len());
                for (i, supplier) in suppliers.iter().enumerate() {
                    items.push(self.node_ref(supplier, &format!("{slot}[{i}]")));
                }
                Value::Array(items)
            } else {
                if suppliers.len() > 1 {
                    self.ignored_suppliers(node, kind, &suppliers[1..], &slot);
                }
                self.node_ref(suppliers[0], &slot)
            };
            subnodes.insert(kind.to_string(), entry);
        }
        Some(Value::Object(subnodes))
    }

    fn node_ref(&mut self, supplier: &NodeInstance, path: &str) -> Value {
        let mut map = Map::new();
        map.insert("type".into(), Value::String(supplier.node_type.clone()));
        if let Some(version) = supplier.type_version {
            map.insert("typeVersion".into(), Value::from(version));
        }
        map.insert("parameters".into(), Value::Object(supplier.parameters.clone()));
        if !self.visiting.contains(&supplier.name) {
            self.visiting.push(supplier.name.clone());
            if let Some(nested) = self.subnodes_of(supplier, &format!("{path}.subnodes")) {
                map.insert("subnodes".into(), nested);
            }
            self.visiting.pop();
        }
        Value::Object(map)
    }

    fn ignored_suppliers(&mut self, node: &NodeInstance, kind: &str, extra: &[&NodeInstance], slot: &str) {
        let names: Vec<String> = extra.iter().map(|s| format!("'{}'", s.name)).collect();
        let message = format!(
            "'{}' takes a single {kind}; the connection{} from {} will be ignored",
            node.name,
            if names.len() == 1 { "" } else { "s" },
            names.join(", "),
        );
        self.warnings.push(
            ValidationIssue::node(IssueCode::InvalidConnection, self.reported_on, message)
                .at(slot.to_string()),
        );
    }
}

/// Declared cardinality when any source knows it, else the edge count decides.
fn accepts_list(ctx: &Context<'_>, node: &NodeInstance, kind: &str, count: usize) -> bool {
    let Some(version) = ctx.version_of(node) else {
        return count > 1;
    };
    if let Some(cap) = ctx
        .registry
        .schema(&node.node_type, version)
        .and_then(|s| s.capability(kind).cloned())
    {
        return cap.cardinality.accepts_list();
    }
    ctx.node_types
        .and_then(|types| types.node_type(&node.node_type, version))
        .and_then(|spec| spec.capability_input(kind).map(|c| c.cardinality.accepts_list()))
        .unwrap_or(count > 1)
}

/// Well-formed node references of a sub-configuration, in entry order.
/// Malformed entries are left for the schema check to report.
pub fn attachments(subnodes: &Value) -> Vec<Attachment> {
    collect(subnodes, None)
}

fn collect(subnodes: &Value, parent: Option<&str>) -> Vec<Attachment> {
    let Some(map) = subnodes.as_object() else {
        return vec![];
    };
    let mut out = Vec::new();
    for (kind, entry) in map {
        match entry {
            Value::Array(items) => out.extend(
                items
                    .iter()
                    .enumerate()
                    .filter_map(|(i, item)| Attachment::from_ref(kind, Some(i), item, parent)),
            ),
            other => out.extend(Attachment::from_ref(kind, None, other, parent)),
        }
    }
    out
}

/// Every attachment at any depth, each before its own attachments.
pub fn flatten(attachments: &[Attachment]) -> Vec<&Attachment> {
    let mut out = Vec::new();
    for att in attachments {
        out.push(att);
        out.extend(flatten(&att.children));
    }
    out
}

/// Validate each attachment's parameters and sub-configuration against its
/// own type's schema, at any depth, reported on the consuming node.
pub fn check_attachment_parameters(
    ctx: &Context<'_>,
    node: &NodeInstance,
    attachments: &[Attachment],
    warnings: &mut Vec<ValidationIssue>,
) {
    for att in attachments {
        if let Some(version) = att
            .version
            .or_else(|| ctx.registry.default_version(&att.node_type))
        {
            let resolution = ctx.registry.resolve(
                &att.node_type,
                version,
                NodeConfig {
                    parameters: &att.parameters,
                    subnodes: att.subnodes.as_ref(),
                },
                ctx.options.strict_mode,
            );
            for error in resolution.errors {
                warnings.push(
                    ValidationIssue::node(IssueCode::InvalidParameter, &node.name, error.message)
                        .at(format!("{}.{}", att.path(), error.path)),
                );
            }
        }
        check_attachment_parameters(ctx, node, &att.children, warnings);
    }
}

/// Whose acceptance rules apply: the node itself, or an attachment that has
/// attachments of its own. Nested consumers are named by type, as inline
/// entries have no name.
struct Consumer<'a> {
    node_type: &'a str,
    version: f64,
    parameters: &'a Map<String, Value>,
    label: &'a str,
}

/// The consumer's own acceptance rule for each attached kind, at any depth.
pub fn check_consumer_side(
    types: &dyn NodeTypeProvider,
    node: &NodeInstance,
    version: f64,
    attachments: &[Attachment],
    warnings: &mut Vec<ValidationIssue>,
) {
    let consumer = Consumer {
        node_type: &node.node_type,
        version,
        parameters: &node.parameters,
        label: &node.name,
    };
    consumer_side(types, &node.name, &consumer, attachments, warnings);
}

fn consumer_side(
    types: &dyn NodeTypeProvider,
    reported_on: &str,
    consumer: &Consumer<'_>,
    attachments: &[Attachment],
    warnings: &mut Vec<ValidationIssue>,
) {
    if let Some(spec) = types.node_type(consumer.node_type, consumer.version) {
        let fields = prune_for_version(&spec.properties, consumer.version);
        let defaults = display::defaults_of(&fields);
        let ctx = DisplayContext::root(
            Scope::new(consumer.parameters, &defaults),
            Some(consumer.version),
        );

        for att in attachments {
            let Some(rule) = spec
                .capability_input(&att.kind)
                .and_then(|slot| slot.display_options.as_ref())
            else {
                continue;
            };
            let Some(unmet) = display::first_unmet(rule, &ctx) else {
                continue;
            };
            let message = format!(
                "'{}' is attached as {}, but '{}' {}; the attachment will be ignored",
                att.node_type,
                att.kind,
                consumer.label,
                acceptance_clause(&att.kind, &unmet),
            );
            warnings.push(
                ValidationIssue::node(IssueCode::UnsupportedCapabilityInput, reported_on, message)
                    .at(att.path().to_string()),
            );
        }
    }

    for att in attachments.iter().filter(|a| !a.children.is_empty()) {
        let Some(version) = att.version.or_else(|| types.default_version(&att.node_type)) else {
            continue;
        };
        let nested = Consumer {
            node_type: &att.node_type,
            version,
            parameters: &att.parameters,
            label: &att.node_type,
        };
        consumer_side(types, reported_on, &nested, &att.children, warnings);
    }
}

/// The supplier's own rule for playing the role it is attached in, at any
/// depth.
pub fn check_supplier_side(
    types: &dyn NodeTypeProvider,
    node: &NodeInstance,
    attachments: &[Attachment],
    warnings: &mut Vec<ValidationIssue>,
) {
    for att in flatten(attachments) {
        let Some(version) = att
            .version
            .or_else(|| types.default_version(&att.node_type))
        else {
            continue;
        };
        let Some(spec) = types.node_type(&att.node_type, version) else {
            continue;
        };
        let Some(rule) = spec
            .capability_output(&att.kind)
            .and_then(|out| out.display_options.as_ref())
        else {
            continue;
        };
        let fields = prune_for_version(&spec.properties, version);
        let defaults = display::defaults_of(&fields);
        let ctx = DisplayContext::root(Scope::new(&att.parameters, &defaults), Some(version));
        let Some(unmet) = display::first_unmet(rule, &ctx) else {
            continue;
        };
        let message = format!(
            "'{}' can only be used as {} when '{}' {} {}, but it is {}",
            att.node_type,
            att.kind,
            unmet.field,
            if unmet.hidden_by { "is not" } else { "is" },
            display::describe_expected(&unmet.expected),
            describe_actual(&unmet),
        );
        warnings.push(
            ValidationIssue::node(IssueCode::CapabilitySourceMismatch, &node.name, message)
                .at(format!("{}.parameters.{}", att.path(), unmet.field)),
        );
    }
}

fn acceptance_clause(kind: &str, unmet: &UnmetCondition) -> String {
    if unmet.hidden_by {
        format!(
            "does not accept {kind} while '{}' is {}",
            unmet.field,
            display::describe_expected(&unmet.expected)
        )
    } else {
        format!(
            "only accepts {kind} when '{}' is {} (currently {})",
            unmet.field,
            display::describe_expected(&unmet.expected),
            describe_actual(unmet)
        )
    }
}

fn describe_actual(unmet: &UnmetCondition) -> String {
    unmet
        .actual
        .as_ref()
        .map(Value::to_string)
        .unwrap_or_else(|| "unset".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attachments_from_both_shapes() {
        let subnodes = json!({
            "ai_languageModel": { "type": "acme.chatModel", "typeVersion": 1, "parameters": { "model": "m" } },
            "ai_tool": [{ "type": "acme.search" }, { "broken": true }, { "type": "acme.calc" }]
        });
        let found = attachments(&subnodes);
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].path(), "subnodes.ai_languageModel");
        assert_eq!(found[0].version, Some(1.0));
        assert_eq!(found[2].path(), "subnodes.ai_tool[2]");
        assert!(found[1].parameters.is_empty());
    }

    #[test]
    fn nested_attachments_extend_the_parent_path() {
        let subnodes = json!({
            "ai_tool": [{
                "type": "acme.agent",
                "subnodes": {
                    "ai_languageModel": { "type": "acme.chatModel" },
                    "ai_tool": [{ "type": "acme.search" }]
                }
            }]
        });
        let found = attachments(&subnodes);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].children.len(), 2);

        let paths: Vec<&str> = flatten(&found).into_iter().map(Attachment::path).collect();
        assert_eq!(
            paths,
            vec![
                "subnodes.ai_tool[0]",
                "subnodes.ai_tool[0].subnodes.ai_languageModel",
                "subnodes.ai_tool[0].subnodes.ai_tool[0]",
            ]
        );
    }
}
