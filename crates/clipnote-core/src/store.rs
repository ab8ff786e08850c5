//! Annotation list, selection, tool and undo/redo history.
//!
//! The store is the single source of truth the editor and renderer read
//! from. Every user-visible mutation snapshots the full list onto the
//! undo stack; reconciliation verbs used by the sync layer bypass
//! history so that server confirmations never pollute undo.

use crate::annotation::{Annotation, AnnotationId, AnnotationPatch, InvalidAnnotation};
use kurbo::Point;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Maximum number of undo snapshots retained.
pub const MAX_UNDO_HISTORY: usize = 50;

/// The active canvas tool. Shape tools draw, `Select` picks and drags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    #[default]
    Select,
    Rectangle,
    Circle,
    Line,
    Text,
}

impl Tool {
    /// Keyboard shortcut handling, `None` for unmapped keys.
    pub fn from_shortcut(key: &str) -> Option<Self> {
        match key {
            "s" => Some(Tool::Select),
            "r" => Some(Tool::Rectangle),
            "c" => Some(Tool::Circle),
            "l" => Some(Tool::Line),
            "t" => Some(Tool::Text),
            _ => None,
        }
    }

    pub fn shortcut(self) -> char {
        match self {
            Tool::Select => 's',
            Tool::Rectangle => 'r',
            Tool::Circle => 'c',
            Tool::Line => 'l',
            Tool::Text => 't',
        }
    }
}

/// Store mutations that can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error(transparent)]
    InvalidGeometry(#[from] InvalidAnnotation),
    #[error("no annotation with id {0}")]
    NotFound(AnnotationId),
    #[error("annotation id {0} already exists")]
    DuplicateId(AnnotationId),
    #[error("annotation {0} cannot change kind")]
    KindChange(AnnotationId),
}

/// Per-record bookkeeping for optimistic sync. Sequence numbers order
/// local writes so stale server confirmations can be discarded;
/// unconfirmed/tombstone sets track creates still in flight.
#[derive(Debug, Default)]
struct SyncLedger {
    seqs: HashMap<AnnotationId, u64>,
    unconfirmed: HashSet<AnnotationId>,
    tombstones: HashSet<AnnotationId>,
    next_seq: u64,
}

impl SyncLedger {
    fn bump(&mut self, id: &str) -> u64 {
        self.next_seq += 1;
        self.seqs.insert(id.to_string(), self.next_seq);
        self.next_seq
    }

    fn forget(&mut self, id: &str) {
        self.seqs.remove(id);
        self.unconfirmed.remove(id);
        self.tombstones.remove(id);
    }

    fn rekey(&mut self, old: &str, new: &str) {
        if let Some(seq) = self.seqs.remove(old) {
            self.seqs.insert(new.to_string(), seq);
        }
        // Rekeying happens when the create confirms, which settles the
        // unconfirmed flag.
        self.unconfirmed.remove(old);
    }

    fn reset(&mut self) {
        self.seqs.clear();
        self.unconfirmed.clear();
        self.tombstones.clear();
    }
}

/// Ordered annotation list plus selection, tool and history.
///
/// List order is creation order and doubles as hit precedence: later
/// annotations sit on top and are picked first.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationStore {
    annotations: Vec<Annotation>,
    selected_id: Option<AnnotationId>,
    tool: Tool,
    #[serde(skip)]
    past: Vec<Vec<Annotation>>,
    #[serde(skip)]
    future: Vec<Vec<Annotation>>,
    #[serde(skip)]
    ledger: SyncLedger,
    #[serde(skip)]
    revision: u64,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.annotations.iter().position(|a| a.id == id)
    }

    pub fn selected_id(&self) -> Option<&AnnotationId> {
        self.selected_id.as_ref()
    }

    pub fn selected(&self) -> Option<&Annotation> {
        self.selected_id.as_deref().and_then(|id| self.get(id))
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// Monotonic counter bumped on every state change, for hosts that
    /// cache derived scenes.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    fn push_history(&mut self) {
        self.past.push(self.annotations.clone());
        if self.past.len() > MAX_UNDO_HISTORY {
            self.past.remove(0);
        }
        self.future.clear();
    }

    /// Append a validated annotation. One undo step.
    pub fn add(&mut self, annotation: Annotation) -> Result<(), EditError> {
        annotation.validate()?;
        if self.get(&annotation.id).is_some() {
            return Err(EditError::DuplicateId(annotation.id));
        }
        self.push_history();
        self.ledger.bump(&annotation.id);
        self.annotations.push(annotation);
        self.revision += 1;
        Ok(())
    }

    /// Replace an existing annotation wholesale, returning the previous
    /// record. The kind is immutable. One undo step.
    pub fn update(&mut self, annotation: Annotation) -> Result<Annotation, EditError> {
        let index = self
            .index_of(&annotation.id)
            .ok_or_else(|| EditError::NotFound(annotation.id.clone()))?;
        if self.annotations[index].kind != annotation.kind {
            return Err(EditError::KindChange(annotation.id));
        }
        annotation.validate()?;
        self.push_history();
        self.ledger.bump(&annotation.id);
        let previous = std::mem::replace(&mut self.annotations[index], annotation);
        self.revision += 1;
        Ok(previous)
    }

    /// Apply a partial edit, returning the pre-edit record. A patch
    /// that changes nothing is a no-op and does not touch history.
    pub fn apply_patch(
        &mut self,
        id: &str,
        patch: &AnnotationPatch,
    ) -> Result<Annotation, EditError> {
        let current = self
            .get(id)
            .cloned()
            .ok_or_else(|| EditError::NotFound(id.to_string()))?;
        let mut updated = current.clone();
        patch.apply_to(&mut updated);
        if updated == current {
            return Ok(current);
        }
        self.update(updated)
    }

    /// Remove an annotation, returning it together with its list index
    /// so a failed remote delete can restore it in place. One undo step.
    pub fn delete(&mut self, id: &str) -> Result<(Annotation, usize), EditError> {
        let index = self
            .index_of(id)
            .ok_or_else(|| EditError::NotFound(id.to_string()))?;
        self.push_history();
        let removed = self.annotations.remove(index);
        if self.selected_id.as_deref() == Some(id) {
            self.selected_id = None;
        }
        // Deleting a record whose create is still in flight: remember
        // the id so the eventual confirmation can be compensated.
        if self.ledger.unconfirmed.remove(id) {
            self.ledger.tombstones.insert(id.to_string());
        }
        self.ledger.bump(id);
        self.revision += 1;
        Ok((removed, index))
    }

    /// Remove every annotation. One undo step; a no-op when empty.
    pub fn clear(&mut self) {
        if self.annotations.is_empty() {
            return;
        }
        self.push_history();
        for a in &self.annotations {
            if self.ledger.unconfirmed.remove(&a.id) {
                self.ledger.tombstones.insert(a.id.clone());
            }
        }
        let ids: Vec<AnnotationId> = self.annotations.iter().map(|a| a.id.clone()).collect();
        for id in &ids {
            self.ledger.bump(id);
        }
        self.annotations.clear();
        self.selected_id = None;
        self.revision += 1;
    }

    /// Change the selection. Not undoable.
    pub fn set_selected(&mut self, id: Option<AnnotationId>) -> Result<(), EditError> {
        if let Some(ref id) = id {
            if self.get(id).is_none() {
                return Err(EditError::NotFound(id.clone()));
            }
        }
        self.selected_id = id;
        self.revision += 1;
        Ok(())
    }

    /// Switch tools, dropping any selection. Not undoable.
    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
        self.selected_id = None;
        self.revision += 1;
    }

    /// Move an annotation without recording history, for per-frame drag
    /// feedback. The drag commit goes through `update`.
    pub fn set_position(&mut self, id: &str, origin: Point) -> Result<(), EditError> {
        if !origin.x.is_finite() || !origin.y.is_finite() {
            return Err(EditError::InvalidGeometry(
                InvalidAnnotation::NonFiniteGeometry,
            ));
        }
        let index = self
            .index_of(id)
            .ok_or_else(|| EditError::NotFound(id.to_string()))?;
        self.annotations[index].set_origin(origin);
        self.ledger.bump(id);
        self.revision += 1;
        Ok(())
    }

    /// Step back one snapshot. Returns false when there is nothing to
    /// undo. Never issues remote calls; changed records get fresh
    /// sequence numbers so in-flight confirmations go stale.
    pub fn undo(&mut self) -> bool {
        let Some(previous) = self.past.pop() else {
            return false;
        };
        self.future.push(std::mem::replace(&mut self.annotations, previous));
        self.after_history_swap();
        true
    }

    /// Step forward one snapshot. Returns false when there is nothing
    /// to redo.
    pub fn redo(&mut self) -> bool {
        let Some(next) = self.future.pop() else {
            return false;
        };
        self.past.push(std::mem::replace(&mut self.annotations, next));
        self.after_history_swap();
        true
    }

    fn after_history_swap(&mut self) {
        if let Some(id) = self.selected_id.clone() {
            if self.get(&id).is_none() {
                self.selected_id = None;
            }
        }
        // Restored records get fresh sequence numbers so confirmations
        // of writes issued before the undo/redo are discarded as stale.
        let ids: Vec<AnnotationId> = self.annotations.iter().map(|a| a.id.clone()).collect();
        for id in &ids {
            self.ledger.bump(id);
        }
        self.revision += 1;
    }

    /// Export the persistent part of the store as JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    // ---- reconciliation verbs used by the sync layer ----
    //
    // None of these touch undo history: they reflect what the server
    // already knows, not new user intent.

    /// Replace a record in place without history, used to roll local
    /// state back to a pre-failure image.
    pub fn overwrite(&mut self, annotation: Annotation) -> Result<(), EditError> {
        let index = self
            .index_of(&annotation.id)
            .ok_or_else(|| EditError::NotFound(annotation.id.clone()))?;
        annotation.validate()?;
        self.annotations[index] = annotation;
        self.revision += 1;
        Ok(())
    }

    /// Re-insert a record removed by an optimistic delete that failed.
    pub fn restore_at(&mut self, index: usize, annotation: Annotation) -> Result<(), EditError> {
        annotation.validate()?;
        if self.get(&annotation.id).is_some() {
            return Err(EditError::DuplicateId(annotation.id));
        }
        let index = index.min(self.annotations.len());
        self.ledger.bump(&annotation.id);
        self.annotations.insert(index, annotation);
        self.revision += 1;
        Ok(())
    }

    /// Drop a record whose create was rejected, erasing it from history
    /// snapshots as well so undo cannot resurrect it.
    pub fn rollback_create(&mut self, id: &str) -> bool {
        let Some(index) = self.index_of(id) else {
            return false;
        };
        self.annotations.remove(index);
        if self.selected_id.as_deref() == Some(id) {
            self.selected_id = None;
        }
        for snapshot in self.past.iter_mut().chain(self.future.iter_mut()) {
            snapshot.retain(|a| a.id != id);
        }
        self.ledger.forget(id);
        self.revision += 1;
        true
    }

    /// Swap a temporary client id for the server-issued one, in the
    /// live list, the selection and every history snapshot. Server
    /// field values are applied only when `seq` is still the latest
    /// local write, otherwise the local record wins.
    pub fn adopt_remote_id(&mut self, temp_id: &str, server: &Annotation, seq: u64) -> bool {
        let Some(index) = self.index_of(temp_id) else {
            return false;
        };
        let current = self.ledger.seqs.get(temp_id).copied();
        if current == Some(seq) {
            match server.validate() {
                Ok(()) => self.annotations[index] = server.clone(),
                Err(err) => {
                    warn!("rejecting invalid create confirmation for {}: {}", temp_id, err);
                    self.annotations[index].id = server.id.clone();
                }
            }
        } else {
            debug!(
                "create confirmation for {} is stale (seq {} != {:?}), keeping local fields",
                temp_id, seq, current
            );
            self.annotations[index].id = server.id.clone();
        }
        for snapshot in self.past.iter_mut().chain(self.future.iter_mut()) {
            for a in snapshot.iter_mut().filter(|a| a.id == temp_id) {
                a.id = server.id.clone();
            }
        }
        if self.selected_id.as_deref() == Some(temp_id) {
            self.selected_id = Some(server.id.clone());
        }
        self.ledger.rekey(temp_id, &server.id);
        self.revision += 1;
        true
    }

    /// Apply an update confirmation if it is still current. Stale or
    /// unknown confirmations are discarded.
    pub fn reconcile_update(&mut self, id: &str, server: &Annotation, seq: u64) -> bool {
        let Some(index) = self.index_of(id) else {
            debug!("update confirmation for unknown annotation {}", id);
            return false;
        };
        if self.ledger.seqs.get(id).copied() != Some(seq) {
            debug!("discarding stale update confirmation for {}", id);
            return false;
        }
        if let Err(err) = server.validate() {
            warn!("rejecting invalid update confirmation for {}: {}", id, err);
            return false;
        }
        let mut record = server.clone();
        record.id = id.to_string();
        self.annotations[index] = record;
        self.revision += 1;
        true
    }

    /// Swap in a full server snapshot, resetting selection, history and
    /// sync bookkeeping.
    pub fn replace_all(&mut self, records: Vec<Annotation>) -> Result<(), EditError> {
        let mut seen = HashSet::new();
        for record in &records {
            record.validate()?;
            if !seen.insert(record.id.clone()) {
                return Err(EditError::DuplicateId(record.id.clone()));
            }
        }
        self.annotations = records;
        self.selected_id = None;
        self.past.clear();
        self.future.clear();
        self.ledger.reset();
        self.revision += 1;
        Ok(())
    }

    /// Record that a create for `id` is in flight.
    pub fn mark_unconfirmed(&mut self, id: &str) {
        self.ledger.unconfirmed.insert(id.to_string());
    }

    pub fn is_unconfirmed(&self, id: &str) -> bool {
        self.ledger.unconfirmed.contains(id)
    }

    /// Whether `id` was deleted while its create was still in flight.
    pub fn is_tombstoned(&self, id: &str) -> bool {
        self.ledger.tombstones.contains(id)
    }

    /// Consume the tombstone for a deleted-before-confirmed create.
    pub fn take_tombstone(&mut self, id: &str) -> bool {
        self.ledger.tombstones.remove(id)
    }

    /// Latest local write sequence for `id`.
    pub fn seq_of(&self, id: &str) -> Option<u64> {
        self.ledger.seqs.get(id).copied()
    }
}
