//! Host integration handle.
//!
//! [`EditorBinding`] owns the replicated snapshot on behalf of one editor
//! and carries the capability surface the host composes into its extension
//! list: seed the snapshot from the document, fold local transactions into
//! it, and notify listeners when the snapshot diverged from the last
//! notified state. The handle is passed explicitly to every call that needs
//! replicated-document state; there is no process-wide registration.

use std::collections::BTreeMap;

use crate::apply::{apply_transaction, to_replicated_doc};
use crate::document::{DocModel, EditBatch, Transaction};
use crate::engine::Engine;
use crate::replicated::{Container, RepValue};
use crate::synthesize::{synthesize_edits, SyncError};

/// Capability surface for composition into the host editor's extension
/// list.
pub trait SyncCapability<D: DocModel> {
    fn init(&mut self, doc: &D) -> Result<(), SyncError>;
    fn apply(&mut self, tr: &Transaction<D>) -> Result<(), SyncError>;
    fn on_view_update(&mut self) -> Result<(), SyncError>;
}

type ChangeListener = Box<dyn FnMut(&RepValue) + Send>;

pub struct EditorBinding<E: Engine> {
    engine: E,
    snapshot: Option<RepValue>,
    last_notified: Option<RepValue>,
    next_listener_id: u64,
    listeners: BTreeMap<u64, ChangeListener>,
}

impl<E: Engine> EditorBinding<E> {
    pub fn new(engine: E) -> Self {
        EditorBinding {
            engine,
            snapshot: None,
            last_notified: None,
            next_listener_id: 1,
            listeners: BTreeMap::new(),
        }
    }

    /// The current replicated snapshot, once initialized.
    pub fn snapshot(&self) -> Option<&RepValue> {
        self.snapshot.as_ref()
    }

    /// Registers a listener invoked with the new snapshot whenever
    /// [`SyncCapability::on_view_update`] observes a divergence.
    pub fn on_change<F>(&mut self, listener: F) -> u64
    where
        F: FnMut(&RepValue) + Send + 'static,
    {
        let id = self.next_listener_id;
        self.next_listener_id = self.next_listener_id.saturating_add(1);
        self.listeners.insert(id, Box::new(listener));
        id
    }

    pub fn off_change(&mut self, listener_id: u64) -> bool {
        self.listeners.remove(&listener_id).is_some()
    }

    /// Runs the change synthesizer against the binding's snapshot. The
    /// returned batch's tag must be routed back through a tagged
    /// transaction; the snapshot is not adopted here.
    pub fn receive<D: DocModel>(
        &self,
        current: &D,
        incoming: &RepValue,
    ) -> Result<EditBatch, SyncError> {
        let old = self.snapshot.as_ref().ok_or(SyncError::Uninitialized)?;
        synthesize_edits(&self.engine, current, old, incoming)
    }
}

impl<E: Engine, D: DocModel> SyncCapability<D> for EditorBinding<E> {
    /// Seeds the replicated snapshot from the document through one scoped
    /// mutation of an engine-empty root.
    fn init(&mut self, doc: &D) -> Result<(), SyncError> {
        let empty = RepValue::Node(Container::default());
        let seeded = self.engine.mutate(&empty, &mut to_replicated_doc(doc))?;
        self.last_notified = Some(seeded.clone());
        self.snapshot = Some(seeded);
        Ok(())
    }

    /// Folds one transaction into the snapshot. A merged-snapshot tag is
    /// adopted directly; a transaction that did not change the document is
    /// a no-op; everything else runs the edit applier inside one scoped
    /// mutation.
    fn apply(&mut self, tr: &Transaction<D>) -> Result<(), SyncError> {
        if let Some(tag) = &tr.merged_tag {
            self.snapshot = Some(tag.clone());
            return Ok(());
        }
        if !tr.doc_changed {
            return Ok(());
        }
        let base = self.snapshot.as_ref().ok_or(SyncError::Uninitialized)?;
        let next = self.engine.mutate(base, &mut apply_transaction(tr))?;
        self.snapshot = Some(next);
        Ok(())
    }

    /// Notifies listeners when the snapshot diverged from the last notified
    /// state.
    fn on_view_update(&mut self) -> Result<(), SyncError> {
        let (Some(prev), Some(current)) = (&self.last_notified, &self.snapshot) else {
            return Ok(());
        };
        if self.engine.diff(prev, current)?.is_empty() {
            return Ok(());
        }
        for listener in self.listeners.values_mut() {
            listener(current);
        }
        self.last_notified = self.snapshot.clone();
        Ok(())
    }
}
