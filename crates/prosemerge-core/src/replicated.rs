//! Replicated nested value model.
//!
//! The replicated structure mirrors the tree document's serialized shape with
//! one substitution rule: a node carrying a `text` payload stores it as an
//! ordered run of single-character atoms so that character-level edits are
//! independently addressable and mergeable. Containers, sequence elements,
//! and text atoms carry an opaque identity assigned by the CRDT engine; this
//! crate never mints identities itself, it only reads them back from change
//! records.

use indexmap::IndexMap;
use serde_json::Value;

/// Opaque identity of a container or element inside the replicated
/// structure. Assigned exclusively by the CRDT engine; `ObjId::NONE` marks a
/// value that has not been recorded yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjId {
    pub sid: u64,
    pub ctr: u64,
}

impl ObjId {
    pub const NONE: ObjId = ObjId { sid: 0, ctr: 0 };

    pub fn is_assigned(&self) -> bool {
        *self != ObjId::NONE
    }
}

/// One replicated value.
#[derive(Debug, Clone, PartialEq)]
pub enum RepValue {
    /// A JSON scalar (node type, attribute value, loose character).
    Scalar(Value),
    /// A run of single-character atoms (the `text` payload substitution).
    Text(TextRun),
    /// An ordered sequence of child values (`content` arrays).
    Seq(Sequence),
    /// A string-keyed container (one document node), insertion-ordered.
    Node(Container),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextRun {
    pub id: ObjId,
    pub atoms: Vec<TextAtom>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextAtom {
    pub id: ObjId,
    pub ch: char,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sequence {
    pub id: ObjId,
    pub items: Vec<SeqItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeqItem {
    pub id: ObjId,
    pub value: RepValue,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Container {
    pub id: ObjId,
    pub fields: IndexMap<String, RepValue>,
}

impl Default for ObjId {
    fn default() -> Self {
        ObjId::NONE
    }
}

impl TextRun {
    pub fn from_str(text: &str) -> Self {
        TextRun {
            id: ObjId::NONE,
            atoms: text
                .chars()
                .map(|ch| TextAtom {
                    id: ObjId::NONE,
                    ch,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Joins the atoms back into a string.
    pub fn text(&self) -> String {
        self.atoms.iter().map(|a| a.ch).collect()
    }

    /// Inserts unassigned character atoms at `at` (clamped to the run end).
    pub fn insert_str(&mut self, at: usize, text: &str) {
        let at = at.min(self.atoms.len());
        let atoms = text.chars().map(|ch| TextAtom {
            id: ObjId::NONE,
            ch,
        });
        self.atoms.splice(at..at, atoms);
    }

    /// Removes the atoms in `[from, to)`, both bounds clamped to the run end.
    pub fn remove_range(&mut self, from: usize, to: usize) {
        let from = from.min(self.atoms.len());
        let to = to.clamp(from, self.atoms.len());
        self.atoms.drain(from..to);
    }
}

impl Sequence {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&RepValue> {
        self.items.get(index).map(|item| &item.value)
    }

    /// Inserts unassigned items at `at` (clamped to the sequence end).
    pub fn insert_values(&mut self, at: usize, values: impl IntoIterator<Item = RepValue>) {
        let at = at.min(self.items.len());
        let items = values.into_iter().map(|value| SeqItem {
            id: ObjId::NONE,
            value,
        });
        self.items.splice(at..at, items);
    }

    /// Removes the items in `[from, to)`, both bounds clamped.
    pub fn remove_range(&mut self, from: usize, to: usize) {
        let from = from.min(self.items.len());
        let to = to.clamp(from, self.items.len());
        self.items.drain(from..to);
    }
}

impl Container {
    pub fn get(&self, key: &str) -> Option<&RepValue> {
        self.fields.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut RepValue> {
        self.fields.get_mut(key)
    }

    /// The node's child sequence, when it has one.
    pub fn content(&self) -> Option<&Sequence> {
        match self.fields.get("content") {
            Some(RepValue::Seq(seq)) => Some(seq),
            _ => None,
        }
    }

    pub fn content_mut(&mut self) -> Option<&mut Sequence> {
        match self.fields.get_mut("content") {
            Some(RepValue::Seq(seq)) => Some(seq),
            _ => None,
        }
    }

    /// The node's text run, when it carries an inline payload.
    pub fn text(&self) -> Option<&TextRun> {
        match self.fields.get("text") {
            Some(RepValue::Text(run)) => Some(run),
            _ => None,
        }
    }

    pub fn text_mut(&mut self) -> Option<&mut TextRun> {
        match self.fields.get_mut("text") {
            Some(RepValue::Text(run)) => Some(run),
            _ => None,
        }
    }
}

impl RepValue {
    pub fn as_node(&self) -> Option<&Container> {
        match self {
            RepValue::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_node_mut(&mut self) -> Option<&mut Container> {
        match self {
            RepValue::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&Sequence> {
        match self {
            RepValue::Seq(seq) => Some(seq),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextRun> {
        match self {
            RepValue::Text(run) => Some(run),
            _ => None,
        }
    }

    /// Identity of the value, when the variant carries one. Scalars have no
    /// identity of their own; their enclosing sequence element does.
    pub fn id(&self) -> ObjId {
        match self {
            RepValue::Scalar(_) => ObjId::NONE,
            RepValue::Text(run) => run.id,
            RepValue::Seq(seq) => seq.id,
            RepValue::Node(node) => node.id,
        }
    }

    /// Width of the value in tree-document position units. Text payloads are
    /// boundary-less and count one position per character; other nodes count
    /// an opening and a closing boundary around their content; leaves count
    /// one position.
    pub fn width(&self) -> usize {
        match self {
            RepValue::Scalar(Value::String(s)) => s.chars().count(),
            RepValue::Scalar(_) => 1,
            RepValue::Text(run) => run.len(),
            RepValue::Seq(seq) => seq.items.iter().map(|item| item.value.width()).sum(),
            RepValue::Node(node) => {
                if let Some(run) = node.text() {
                    run.len()
                } else if let Some(content) = node.content() {
                    2 + content.items.iter().map(|item| item.value.width()).sum::<usize>()
                } else {
                    1
                }
            }
        }
    }

    /// Structural sanity check: `text` fields must hold text runs, `content`
    /// fields must hold sequences, recursively.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            RepValue::Scalar(_) => Ok(()),
            RepValue::Text(_) => Ok(()),
            RepValue::Seq(seq) => {
                for item in &seq.items {
                    item.value.validate()?;
                }
                Ok(())
            }
            RepValue::Node(node) => {
                for (key, value) in &node.fields {
                    match (key.as_str(), value) {
                        ("text", RepValue::Text(_)) => {}
                        ("text", other) => {
                            return Err(format!(
                                "text field holds {} instead of a text run",
                                variant_name(other)
                            ));
                        }
                        ("content", RepValue::Seq(_)) => value.validate()?,
                        ("content", other) => {
                            return Err(format!(
                                "content field holds {} instead of a sequence",
                                variant_name(other)
                            ));
                        }
                        (_, value) => value.validate()?,
                    }
                }
                Ok(())
            }
        }
    }
}

fn variant_name(value: &RepValue) -> &'static str {
    match value {
        RepValue::Scalar(_) => "a scalar",
        RepValue::Text(_) => "a text run",
        RepValue::Seq(_) => "a sequence",
        RepValue::Node(_) => "a container",
    }
}
