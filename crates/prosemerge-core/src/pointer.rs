//! Pointer resolution: linear document offset → location inside the
//! replicated structure.
//!
//! The offset is first resolved through the document's own path facility,
//! then the same ancestor path is walked down the replicated mirror. The
//! deepest matched ancestor's content is scanned by width to place the
//! offset: positions touching a text-bearing child address that child's text
//! run at the true intra-run offset; positions between other children
//! address the content sequence at a child index.
//!
//! Any missing path segment means the document and the replicated structure
//! are out of sync — a fatal precondition violation for the enclosing batch,
//! never something to paper over.

use thiserror::Error;
use tracing::debug;

use crate::document::DocModel;
use crate::replicated::{Container, RepValue, Sequence, TextRun};

/// What a resolved pointer addresses within the deepest matched ancestor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerTarget {
    /// The ancestor's content sequence; `offset` is a child index.
    Content,
    /// The text run of the child at this content index; `offset` is a
    /// character offset within the run.
    TextOf(usize),
}

/// Transient result of one resolution. Scoped to a single applier or mapper
/// invocation; never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pointer {
    /// Child index taken at each ancestor level from the root.
    pub path: Vec<usize>,
    pub target: PointerTarget,
    pub offset: usize,
    pub is_text: bool,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("offset {0} is not resolvable in the document")]
    Unresolvable(usize),
    #[error("replicated structure is missing path segment {segment} for offset {offset}")]
    MissingSegment { offset: usize, segment: usize },
    #[error("offset {offset} lands inside an unexpected child at depth {depth}")]
    Desync { offset: usize, depth: usize },
}

/// Resolves `offset` against `doc` and locates the corresponding position in
/// `root`.
pub fn resolve_pointer<D: DocModel>(
    root: &RepValue,
    doc: &D,
    offset: usize,
) -> Result<Pointer, ResolveError> {
    let path = doc
        .resolve_path(offset)
        .ok_or(ResolveError::Unresolvable(offset))?;
    debug!(offset, depth = path.depth, "resolving pointer");

    let mut node = root.as_node().ok_or(ResolveError::MissingSegment {
        offset,
        segment: 0,
    })?;
    for (level, &index) in path.indices.iter().enumerate() {
        let child = node
            .content()
            .and_then(|content| content.get(index))
            .ok_or(ResolveError::MissingSegment {
                offset,
                segment: level,
            })?;
        node = child.as_node().ok_or(ResolveError::Desync {
            offset,
            depth: level,
        })?;
    }

    place_in_content(node, &path.indices, path.parent_offset, offset)
}

fn place_in_content(
    node: &Container,
    indices: &[usize],
    parent_offset: usize,
    offset: usize,
) -> Result<Pointer, ResolveError> {
    let content = node.content().ok_or(ResolveError::MissingSegment {
        offset,
        segment: indices.len(),
    })?;

    let mut acc = 0usize;
    for (index, item) in content.items.iter().enumerate() {
        let width = item.value.width();
        let text_bearing = item
            .value
            .as_node()
            .map(|child| child.text().is_some())
            .unwrap_or(false);
        if text_bearing {
            if parent_offset >= acc && parent_offset <= acc + width {
                return Ok(Pointer {
                    path: indices.to_vec(),
                    target: PointerTarget::TextOf(index),
                    offset: parent_offset - acc,
                    is_text: true,
                });
            }
        } else {
            if parent_offset <= acc {
                return Ok(Pointer {
                    path: indices.to_vec(),
                    target: PointerTarget::Content,
                    offset: index,
                    is_text: false,
                });
            }
            if parent_offset < acc + width {
                return Err(ResolveError::Desync {
                    offset,
                    depth: indices.len(),
                });
            }
        }
        acc += width;
    }

    Ok(Pointer {
        path: indices.to_vec(),
        target: PointerTarget::Content,
        offset: content.items.len(),
        is_text: false,
    })
}

fn walk<'a>(root: &'a mut RepValue, path: &[usize]) -> Option<&'a mut Container> {
    let mut node = root.as_node_mut()?;
    for &index in path {
        let item = match node.fields.get_mut("content") {
            Some(RepValue::Seq(seq)) => seq.items.get_mut(index)?,
            _ => return None,
        };
        node = item.value.as_node_mut()?;
    }
    Some(node)
}

/// Dereferences a content-sequence pointer against a mutable root.
pub fn content_seq_mut<'a>(root: &'a mut RepValue, pointer: &Pointer) -> Option<&'a mut Sequence> {
    walk(root, &pointer.path)?.content_mut()
}

/// Dereferences a text-run pointer against a mutable root.
pub fn text_run_mut<'a>(root: &'a mut RepValue, pointer: &Pointer) -> Option<&'a mut TextRun> {
    let PointerTarget::TextOf(index) = pointer.target else {
        return None;
    };
    let node = walk(root, &pointer.path)?;
    let item = node.content_mut()?.items.get_mut(index)?;
    item.value.as_node_mut()?.text_mut()
}
