//! Consumed tree-document interfaces.
//!
//! The tree document is owned by an external collaborator; this crate never
//! mutates one directly. It reads path resolutions and node spans through
//! [`DocModel`], and hands back edit operations for the host to apply.
//!
//! Offset convention: dense, monotonic positions under pre-order traversal.
//! Node boundaries are width-1 positions, text characters are width-1 each,
//! and the root's own boundaries are not counted.

use serde_json::Value;

use crate::replicated::RepValue;

/// Result of resolving a linear offset against a tree document: the child
/// index taken at each ancestor level down to the node that directly
/// contains the position, and the offset within that node's content (in
/// position units, counting earlier siblings).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub indices: Vec<usize>,
    pub depth: usize,
    pub parent_offset: usize,
}

/// Span of the node starting at a resolved offset; used to size node-level
/// deletions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSpan {
    pub size: usize,
}

/// The read surface this crate needs from the tree-document collaborator.
pub trait DocModel: Sized + Clone {
    type Schema;

    /// Builds a document from a plain serialized value, or `None` when the
    /// value does not describe a well-formed document for `schema`.
    fn deserialize(schema: &Self::Schema, value: &Value) -> Option<Self>;

    /// Serializes the document to the plain value shape [`crate::convert`]
    /// understands.
    fn serialize(&self) -> Value;

    /// Resolves a linear offset to its ancestor path, or `None` when the
    /// offset is outside `[0, len]`.
    fn resolve_path(&self, offset: usize) -> Option<ResolvedPath>;

    /// The node starting at `offset`, or `None` when no node starts there.
    fn node_at(&self, offset: usize) -> Option<NodeSpan>;
}

/// A local edit operation in tree-document coordinates, valid at the moment
/// it is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOp {
    InsertText { at: usize, text: String },
    DeleteRange { from: usize, to: usize },
}

/// An ordered batch of synthesized edits. `merged` carries the replicated
/// snapshot the batch corresponds to; the host routes it back through
/// [`Transaction::merged_tag`] so these edits are never re-translated into
/// replicated mutations.
#[derive(Debug, Clone, PartialEq)]
pub struct EditBatch {
    pub edits: Vec<EditOp>,
    pub merged: Option<RepValue>,
}

impl EditBatch {
    pub fn empty() -> Self {
        EditBatch {
            edits: Vec::new(),
            merged: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}

/// The inserted content of one replacement step: serialized nodes plus the
/// total size of the slice in position units.
#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    pub content: Vec<Value>,
    pub size: usize,
}

impl Slice {
    pub fn empty() -> Self {
        Slice {
            content: Vec::new(),
            size: 0,
        }
    }

    /// A slice holding a single text node.
    pub fn text(text: &str) -> Self {
        Slice {
            content: vec![serde_json::json!({"type": "text", "text": text})],
            size: text.chars().count(),
        }
    }
}

/// One replacement step. `doc` is the exact document snapshot the step's
/// offsets were computed against; documents shift between steps within one
/// transaction.
#[derive(Debug, Clone)]
pub struct TxStep<D> {
    pub from: usize,
    pub to: usize,
    pub slice: Slice,
    pub doc: D,
}

/// An ordered batch of local replacement steps.
///
/// `merged_tag` marks a transaction whose steps were synthesized from a
/// merge: the tagged snapshot is adopted directly instead of re-deriving
/// replicated mutations from the steps, which would loop the translation.
#[derive(Debug, Clone)]
pub struct Transaction<D> {
    pub steps: Vec<TxStep<D>>,
    pub doc_changed: bool,
    pub merged_tag: Option<RepValue>,
}

impl<D> Transaction<D> {
    pub fn new(steps: Vec<TxStep<D>>) -> Self {
        let doc_changed = !steps.is_empty();
        Transaction {
            steps,
            doc_changed,
            merged_tag: None,
        }
    }

    /// A stepless transaction carrying only a merged-snapshot tag.
    pub fn tagged(snapshot: RepValue) -> Self {
        Transaction {
            steps: Vec::new(),
            doc_changed: true,
            merged_tag: Some(snapshot),
        }
    }
}
