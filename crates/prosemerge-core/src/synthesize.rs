//! Synthesizing local edits from replicated-structure diffs.
//!
//! After a merge produced a new replicated snapshot, the diff between the
//! last-known snapshot and the merged one is translated, record by record,
//! into edit operations against the current editor document. The resulting
//! batch is tagged with the merged snapshot so the consumer adopts it
//! directly instead of re-deriving replicated mutations from the synthesized
//! edits, which would loop the translation.
//!
//! Granularity is asymmetric on purpose: inserts are character-level, while
//! a removal from a content sequence deletes the whole node at the mapped
//! offset. A removal from a text run is one character wide.

use thiserror::Error;
use tracing::{debug, warn};

use crate::document::{DocModel, EditBatch, EditOp};
use crate::engine::{ChangeRecord, Engine, EngineError};
use crate::position::{find_container, map_change_offset};
use crate::replicated::RepValue;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// A remote removal mapped to an offset where the current document has
    /// no node to size the deletion with.
    #[error("no node at offset {0} for remote removal")]
    RemoveTargetMissing(usize),
    /// The binding has no replicated snapshot yet.
    #[error("no replicated snapshot has been initialized")]
    Uninitialized,
}

/// Merges `old` with `incoming`, diffs old against the merged snapshot, and
/// translates the diff into one batch of edits against `current`. Returns an
/// empty, untagged batch when the diff is empty.
pub fn synthesize_edits<E: Engine, D: DocModel>(
    engine: &E,
    current: &D,
    old: &RepValue,
    incoming: &RepValue,
) -> Result<EditBatch, SyncError> {
    let merged = engine.merge(old, incoming)?;
    let changes = engine.diff(old, &merged)?;
    debug!(count = changes.len(), "translating merge diff");
    if changes.is_empty() {
        return Ok(EditBatch::empty());
    }

    let mut edits = Vec::new();
    for change in &changes {
        match change {
            ChangeRecord::Insert {
                container,
                index,
                value,
            } => {
                let Some(text) = value.as_str() else {
                    // Node-structural inserts are out of scope.
                    warn!(?container, "skipping structural insert");
                    continue;
                };
                let at = map_change_offset(old, *container, *index);
                edits.push(EditOp::InsertText {
                    at,
                    text: text.to_string(),
                });
            }
            ChangeRecord::Remove { container, index } => {
                let from = map_change_offset(old, *container, *index);
                let to = match find_container(old, *container) {
                    Some(RepValue::Text(_)) => from + 1,
                    _ => {
                        let span = current
                            .node_at(from)
                            .ok_or(SyncError::RemoveTargetMissing(from))?;
                        from + span.size
                    }
                };
                edits.push(EditOp::DeleteRange { from, to });
            }
            ChangeRecord::Assign { .. } | ChangeRecord::Create { .. } => {}
        }
    }

    Ok(EditBatch {
        edits,
        merged: Some(merged),
    })
}
