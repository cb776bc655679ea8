//! Applying local transactions to the replicated structure.
//!
//! [`apply_transaction`] translates a transaction's replacement steps into
//! in-place mutations of the replicated structure. The returned closure is
//! meant to run inside [`crate::engine::Engine::mutate`] so the whole batch
//! is recorded as a single change, and an abort discards every step.
//!
//! Replay is not supported: each transaction must be applied exactly once.

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::convert::to_replicated;
use crate::document::{DocModel, Slice, Transaction, TxStep};
use crate::pointer::{content_seq_mut, resolve_pointer, text_run_mut, Pointer, PointerTarget};
use crate::replicated::RepValue;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// One of the step's endpoints had no counterpart in the replicated
    /// structure: the document and the structure are out of sync.
    #[error("could not find replicated positions for from:{from},to:{to}")]
    Unresolved { from: usize, to: usize },
    /// The mutation root is not a container.
    #[error("replicated root is not a container")]
    RootNotContainer,
    /// The serialized document snapshot is not an object.
    #[error("serialized document is not an object")]
    DocumentNotObject,
}

/// Mutator seeding an engine-empty root from a document snapshot. Used once,
/// to initialize the replicated counterpart of an existing document.
pub fn to_replicated_doc<D: DocModel>(
    doc: &D,
) -> impl FnMut(&mut RepValue) -> Result<(), ApplyError> {
    let seed = match to_replicated(&doc.serialize()) {
        RepValue::Node(node) => Some(node),
        _ => None,
    };
    move |root| {
        let seed = seed.as_ref().ok_or(ApplyError::DocumentNotObject)?;
        let container = root.as_node_mut().ok_or(ApplyError::RootNotContainer)?;
        for (key, value) in &seed.fields {
            container.fields.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}

/// Mutator applying every step of `tr` to the replicated structure. Each
/// step's endpoints are resolved against the document snapshot that step was
/// computed against, since documents shift between steps.
pub fn apply_transaction<'a, D: DocModel>(
    tr: &'a Transaction<D>,
) -> impl FnMut(&mut RepValue) -> Result<(), ApplyError> + 'a {
    move |root| {
        for step in &tr.steps {
            apply_step(root, step)?;
        }
        Ok(())
    }
}

fn apply_step<D: DocModel>(root: &mut RepValue, step: &TxStep<D>) -> Result<(), ApplyError> {
    let unresolved = ApplyError::Unresolved {
        from: step.from,
        to: step.to,
    };
    let from = resolve_pointer(root, &step.doc, step.from).map_err(|_| unresolved.clone())?;
    let to = resolve_pointer(root, &step.doc, step.to).map_err(|_| unresolved.clone())?;

    let applied = if step.slice.size == 0 {
        delete_range(root, &from, &to)
    } else {
        insert_slice(root, &from, &step.slice)
    };
    applied.ok_or(unresolved)
}

fn delete_range(root: &mut RepValue, from: &Pointer, to: &Pointer) -> Option<()> {
    let same_container = from.path == to.path && from.target == to.target;
    if same_container {
        return match from.target {
            PointerTarget::TextOf(_) => {
                let run = text_run_mut(root, from)?;
                run.remove_range(from.offset, to.offset);
                Some(())
            }
            PointerTarget::Content => {
                let seq = content_seq_mut(root, from)?;
                seq.remove_range(from.offset, to.offset);
                Some(())
            }
        };
    }

    // The endpoints live in different containers. Truncating the `from`
    // container to its end is all the positional information supports here;
    // cross-container ranges lose the tail precision.
    warn!(
        from_offset = from.offset,
        "cross-container delete truncates the from container"
    );
    match from.target {
        PointerTarget::TextOf(_) => {
            let run = text_run_mut(root, from)?;
            let len = run.len();
            run.remove_range(from.offset, len);
        }
        PointerTarget::Content => {
            let seq = content_seq_mut(root, from)?;
            let len = seq.len();
            seq.remove_range(from.offset, len);
        }
    }
    Some(())
}

fn insert_slice(root: &mut RepValue, from: &Pointer, slice: &Slice) -> Option<()> {
    let text = flatten_slice_text(slice);
    if text.is_empty() {
        return Some(());
    }
    match from.target {
        PointerTarget::TextOf(_) => {
            let run = text_run_mut(root, from)?;
            run.insert_str(from.offset, &text);
        }
        PointerTarget::Content => {
            // Node-boundary insert: the characters land as loose scalars in
            // the content sequence, one element per character.
            let seq = content_seq_mut(root, from)?;
            seq.insert_values(
                from.offset,
                text.chars().map(|ch| RepValue::Scalar(Value::String(ch.to_string()))),
            );
        }
    }
    Some(())
}

/// Flattens a slice's text nodes into one string of characters. Non-text
/// nodes cannot be expressed as replicated mutations (node-level insertion
/// is out of scope) and are skipped.
fn flatten_slice_text(slice: &Slice) -> String {
    let mut text = String::new();
    for node in &slice.content {
        match node.get("text").and_then(Value::as_str) {
            Some(payload) => text.push_str(payload),
            None => {
                warn!(node = %node, "skipping non-text slice node");
            }
        }
    }
    text
}
