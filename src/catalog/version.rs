//! Version pruning: drop fields that only apply to other type versions.

use super::types::{DisplayRule, FieldKind, FieldSpec, VERSION_KEY};
use crate::display;

/// Return `fields` as seen by `version`: fields whose `@version` rule rejects
/// the version are removed (recursively), and the `@version` entries are
/// stripped from the surviving rules.
pub fn prune_for_version(fields: &[FieldSpec], version: f64) -> Vec<FieldSpec> {
    fields
        .iter()
        .filter(|f| applies_to_version(f.display_options.as_ref(), version))
        .map(|f| {
            let mut field = f.clone();
            field.display_options = field
                .display_options
                .take()
                .map(strip_version)
                .filter(|rule| !rule.is_empty());
            match &mut field.kind {
                FieldKind::Collection { fields } | FieldKind::CollectionList { fields } => {
                    *fields = prune_for_version(fields, version);
                }
                _ => {}
            }
            field
        })
        .collect()
}

/// Whether the `@version` part of a rule admits `version`.
pub fn applies_to_version(rule: Option<&DisplayRule>, version: f64) -> bool {
    let Some(rule) = rule else { return true };
    let current = serde_json::Value::from(version);
    if let Some(accepted) = rule.show.get(VERSION_KEY) {
        if !display::any_matches(accepted, Some(&current)) {
            return false;
        }
    }
    if let Some(rejected) = rule.hide.get(VERSION_KEY) {
        if display::any_matches(rejected, Some(&current)) {
            return false;
        }
    }
    true
}

fn strip_version(mut rule: DisplayRule) -> DisplayRule {
    rule.show.shift_remove(VERSION_KEY);
    rule.hide.shift_remove(VERSION_KEY);
    rule
}
