//! Field-path lookup against recorded or declared node output.

use serde_json::Value;

use super::reference::{Segment, SegmentKey};

/// Known output of one node, split into JSON items and binary sections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeOutput {
    pub items: Vec<Value>,
    pub binary: Vec<Value>,
}

impl NodeOutput {
    /// Normalise a sample: a single object, a list of objects, or a list of
    /// `{json, binary}` items.
    pub fn from_sample(sample: &Value) -> Self {
        let mut out = NodeOutput::default();
        match sample {
            Value::Array(items) => {
                for item in items {
                    out.push(item);
                }
            }
            other => out.push(other),
        }
        out
    }

    fn push(&mut self, item: &Value) {
        match item.as_object() {
            Some(obj) if is_wrapped_item(obj) => {
                if let Some(json) = obj.get("json") {
                    self.items.push(json.clone());
                }
                if let Some(binary) = obj.get("binary") {
                    self.binary.push(binary.clone());
                }
            }
            _ => self.items.push(item.clone()),
        }
    }

    pub fn has_json(&self, segments: &[Segment]) -> bool {
        self.items.iter().any(|item| path_exists(item, segments))
    }

    /// `None` when no binary data was recorded for this node.
    pub fn has_binary(&self, segments: &[Segment]) -> Option<bool> {
        if self.binary.is_empty() {
            return None;
        }
        Some(self.binary.iter().any(|b| path_exists(b, segments)))
    }
}

fn is_wrapped_item(obj: &serde_json::Map<String, Value>) -> bool {
    obj.get("json").is_some_and(Value::is_object)
        && obj
            .keys()
            .all(|k| matches!(k.as_str(), "json" | "binary" | "pairedItem"))
}

/// Whether `segments` can be followed from `value`. `null` stands for an
/// unknown shape and accepts any remaining path.
pub fn path_exists(value: &Value, segments: &[Segment]) -> bool {
    let Some((head, rest)) = segments.split_first() else {
        return true;
    };

    match (&head.key, value) {
        (_, Value::Null) => true,
        (SegmentKey::Field(name), Value::Object(map)) => {
            map.get(name).is_some_and(|v| path_exists(v, rest))
        }
        (SegmentKey::Field(name), Value::Array(items)) => {
            if name == "length" {
                return rest.is_empty();
            }
            items.iter().any(|item| path_exists(item, segments))
        }
        (SegmentKey::Field(name), Value::String(_)) => name == "length" && rest.is_empty(),
        (SegmentKey::Index(i), Value::Array(items)) => items
            .get(*i)
            .or_else(|| items.first())
            .is_some_and(|v| path_exists(v, rest)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seg(name: &str) -> Segment {
        Segment {
            key: SegmentKey::Field(name.into()),
            called: false,
        }
    }

    #[test]
    fn plain_object_sample() {
        let out = NodeOutput::from_sample(&json!({ "amount": 3, "customer": { "email": "a@b" } }));
        assert!(out.has_json(&[seg("amount")]));
        assert!(out.has_json(&[seg("customer"), seg("email")]));
        assert!(!out.has_json(&[seg("customer"), seg("phone")]));
    }

    #[test]
    fn wrapped_items_split_binary() {
        let out = NodeOutput::from_sample(&json!([
            { "json": { "id": 1 }, "binary": { "data": { "fileName": "a.pdf" } } }
        ]));
        assert!(out.has_json(&[seg("id")]));
        assert_eq!(out.has_binary(&[seg("data"), seg("fileName")]), Some(true));
        assert_eq!(out.has_binary(&[seg("image")]), Some(false));
    }

    #[test]
    fn no_binary_recorded_means_unknown() {
        let out = NodeOutput::from_sample(&json!({ "id": 1 }));
        assert_eq!(out.has_binary(&[seg("data")]), None);
    }

    #[test]
    fn arrays_and_nulls() {
        let value = json!({ "rows": [{ "id": 1 }], "meta": null, "name": "x" });
        assert!(path_exists(&value, &[seg("rows"), seg("id")]));
        assert!(path_exists(
            &value,
            &[
                seg("rows"),
                Segment {
                    key: SegmentKey::Index(4),
                    called: false
                },
                seg("id")
            ]
        ));
        assert!(path_exists(&value, &[seg("rows"), seg("length")]));
        assert!(path_exists(&value, &[seg("meta"), seg("anything")]));
        assert!(path_exists(&value, &[seg("name"), seg("length")]));
        assert!(!path_exists(&value, &[seg("name"), seg("first")]));
    }
}
