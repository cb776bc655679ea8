//! Structural conversion between tree-document snapshots and the replicated
//! shape.
//!
//! Both directions are pure value transforms. The only substitution is the
//! text rule: an object bearing a string `text` field has that field split
//! into a run of single-character atoms on the way in and joined back on the
//! way out. `from_replicated(&to_replicated(v)) == v` for every well-formed
//! document snapshot.

use serde_json::{Map, Value};

use crate::document::DocModel;
use crate::replicated::{Container, ObjId, RepValue, SeqItem, Sequence, TextRun};

/// Maps a serialized tree-document snapshot to replicated form. All
/// identities are left unassigned; the CRDT engine assigns them when the
/// value is first recorded in a scoped mutation.
pub fn to_replicated(src: &Value) -> RepValue {
    match src {
        Value::Array(items) => {
            let mut seq = Sequence::default();
            seq.items = items
                .iter()
                .map(|item| SeqItem {
                    id: ObjId::NONE,
                    value: to_replicated(item),
                })
                .collect();
            RepValue::Seq(seq)
        }
        Value::Object(map) => {
            let mut node = Container::default();
            for (key, value) in map {
                let converted = match (key.as_str(), value) {
                    ("text", Value::String(text)) => RepValue::Text(TextRun::from_str(text)),
                    _ => to_replicated(value),
                };
                node.fields.insert(key.clone(), converted);
            }
            RepValue::Node(node)
        }
        scalar => RepValue::Scalar(scalar.clone()),
    }
}

/// Inverse of [`to_replicated`]: text runs join back into strings.
pub fn from_replicated(value: &RepValue) -> Value {
    match value {
        RepValue::Scalar(scalar) => scalar.clone(),
        RepValue::Text(run) => Value::String(run.text()),
        RepValue::Seq(seq) => Value::Array(seq.items.iter().map(|item| from_replicated(&item.value)).collect()),
        RepValue::Node(node) => {
            let mut map = Map::new();
            for (key, field) in &node.fields {
                map.insert(key.clone(), from_replicated(field));
            }
            Value::Object(map)
        }
    }
}

/// Rebuilds a tree document from a replicated snapshot through the document
/// model's own deserializer.
pub fn to_tree_document<D: DocModel>(schema: &D::Schema, snapshot: &RepValue) -> Option<D> {
    D::deserialize(schema, &from_replicated(snapshot))
}
