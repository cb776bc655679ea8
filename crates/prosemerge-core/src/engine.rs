//! Consumed CRDT engine interface.
//!
//! The engine is an opaque collaborator: it owns identity assignment, merge
//! conflict rules, and causal history. This crate only requires
//! change-tracking mutation, diffing between two snapshots, and merge.

use serde_json::Value;
use thiserror::Error;

use crate::apply::ApplyError;
use crate::replicated::{ObjId, RepValue};

/// One entry of an engine diff. Only `Insert` and `Remove` are translated
/// into local edits; the remaining kinds are ignored by this core.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeRecord {
    /// `value` was inserted at `index` of the sequence or text run
    /// identified by `container`.
    Insert {
        container: ObjId,
        index: usize,
        value: Value,
    },
    /// The element at `index` of `container` was removed.
    Remove { container: ObjId, index: usize },
    /// A container field was set or replaced.
    Assign {
        container: ObjId,
        key: String,
        value: Value,
    },
    /// A new container came into existence.
    Create { container: ObjId },
}

/// Indices in a diff are edit-script positions: each record is expressed
/// against the sequence with all earlier records already applied.
pub type ChangeSet = Vec<ChangeRecord>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The mutator aborted; the scoped mutation recorded nothing.
    #[error("scoped mutation aborted: {0}")]
    Aborted(#[from] ApplyError),
    /// The engine itself failed. Fatal and non-recoverable here.
    #[error("engine failure: {0}")]
    Backend(String),
}

/// A mutation callback run inside one scoped change.
pub type Mutator<'a> = dyn FnMut(&mut RepValue) -> Result<(), ApplyError> + 'a;

pub trait Engine {
    /// Runs `mutator` against a copy of `base` inside one scoped mutation,
    /// assigns identities to everything the mutator created, and returns the
    /// new snapshot. An aborting mutator discards all partial work.
    fn mutate(&mut self, base: &RepValue, mutator: &mut Mutator<'_>) -> Result<RepValue, EngineError>;

    /// Change records transforming `old` into `new`, in emission order.
    fn diff(&self, old: &RepValue, new: &RepValue) -> Result<ChangeSet, EngineError>;

    /// Three-way/CRDT merge of two snapshots descending from a common
    /// origin. Conflict resolution rules are owned by the engine.
    fn merge(&self, ours: &RepValue, theirs: &RepValue) -> Result<RepValue, EngineError>;
}
