//! Reverse position mapping: change record → linear document offset.
//!
//! Searches the pre-change replicated structure for the container a change
//! record names and accumulates the tree-document position on the way. The
//! accounting mirrors the document's own pre-order widths: the root's
//! boundaries are not counted, entering a nested container costs one
//! position, a text payload costs one position per character.
//!
//! Sibling accounting inside a found sequence is knowingly lossy: a
//! container sibling contributes one position plus its content, without a
//! closing boundary. Callers of [`map_change_offset`] also get a best-effort
//! total when the container is absent from the structure; both behaviors are
//! pinned by tests rather than hidden.

use tracing::debug;

use crate::replicated::{ObjId, RepValue, Sequence};

enum Search {
    Found(usize),
    NotFound(usize),
}

/// Maps an insert/remove at `(container, index)` to an absolute offset in
/// the tree document mirrored by `root`. Best-effort: when `container` is
/// not present the accumulated position is returned unchanged.
pub fn map_change_offset(root: &RepValue, container: ObjId, index: usize) -> usize {
    match search(root, container, index, 0, true) {
        Search::Found(pos) => pos,
        Search::NotFound(pos) => {
            debug!(?container, pos, "container not found, returning best-effort position");
            pos
        }
    }
}

/// The container a change record names, when it exists in `root`.
pub fn find_container(root: &RepValue, container: ObjId) -> Option<&RepValue> {
    if container.is_assigned() && root.id() == container {
        return Some(root);
    }
    match root {
        RepValue::Scalar(_) | RepValue::Text(_) => None,
        RepValue::Seq(seq) => seq
            .items
            .iter()
            .find_map(|item| find_container(&item.value, container)),
        RepValue::Node(node) => node
            .fields
            .values()
            .find_map(|value| find_container(value, container)),
    }
}

fn search(value: &RepValue, target: ObjId, index: usize, pos: usize, is_root: bool) -> Search {
    match value {
        RepValue::Scalar(_) => Search::NotFound(pos + value.width()),
        RepValue::Text(run) => {
            if target.is_assigned() && run.id == target {
                return Search::Found(pos + index);
            }
            Search::NotFound(pos + run.len())
        }
        RepValue::Seq(seq) => {
            if target.is_assigned() && seq.id == target {
                return Search::Found(pos + preceding_contribution(seq, index));
            }
            let mut acc = pos;
            for item in &seq.items {
                match search(&item.value, target, index, acc, false) {
                    Search::Found(found) => return Search::Found(found),
                    Search::NotFound(next) => acc = next,
                }
            }
            Search::NotFound(acc)
        }
        RepValue::Node(node) => {
            if target.is_assigned() && node.id == target {
                return Search::Found(pos);
            }
            if let Some(content) = node.get("content") {
                let base = if is_root { pos } else { pos + 1 };
                return search(content, target, index, base, false);
            }
            if let Some(text) = node.get("text") {
                // Text payloads are boundary-less; no entry cost.
                return search(text, target, index, pos, false);
            }
            Search::NotFound(pos + 1)
        }
    }
}

/// Summed contribution of the elements preceding `index` in a found
/// sequence: a counted leaf is one position, a container is one position
/// plus its content, a text child is its character length.
fn preceding_contribution(seq: &Sequence, index: usize) -> usize {
    seq.items
        .iter()
        .take(index)
        .map(|item| contribution(&item.value))
        .sum()
}

fn contribution(value: &RepValue) -> usize {
    match value {
        RepValue::Scalar(_) => 1,
        RepValue::Text(run) => run.len(),
        RepValue::Seq(seq) => seq.items.iter().map(|item| contribution(&item.value)).sum(),
        RepValue::Node(node) => {
            if let Some(run) = node.text() {
                run.len()
            } else if let Some(content) = node.content() {
                1 + content.items.iter().map(|item| contribution(&item.value)).sum::<usize>()
            } else {
                1
            }
        }
    }
}
