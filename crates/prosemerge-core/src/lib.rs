//! Core primitives for prosemerge.
//!
//! Bridges a tree-structured rich-text document model with a replicated
//! nested structure so that independently edited copies of a document can be
//! merged without a central authority. The crate owns the two translation
//! directions — applying local structured edits to the replicated structure,
//! and synthesizing local edit operations from replicated-structure diffs
//! after a merge — while treating the document model and the CRDT engine as
//! external collaborators behind traits.

pub mod replicated;
pub mod convert;
pub mod document;
pub mod engine;
pub mod pointer;
pub mod apply;
pub mod position;
pub mod synthesize;
pub mod binding;

use rand::Rng;

/// Minimum valid actor id for replica identity assignment.
pub const MIN_ACTOR_ID: u64 = 65_536;

/// Returns `true` when the provided actor id is valid.
pub fn is_valid_actor_id(sid: u64) -> bool {
    sid >= MIN_ACTOR_ID
}

/// Generates a random actor id for engine implementors.
pub fn generate_actor_id() -> u64 {
    let mut rng = rand::thread_rng();
    rng.gen_range(MIN_ACTOR_ID..=i64::MAX as u64)
}

/// Returns the crate version at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
