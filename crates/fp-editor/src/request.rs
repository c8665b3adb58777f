//! The request contract and its two building blocks.
//!
//! A request is one reversible unit of entity mutation. The transaction
//! manager calls `on_commit` exactly once, then replays the *same instance*
//! with `on_undo` / `on_redo` as the user walks the history.
//!
//! - [`StateRequest`] transacts entity fields. In field mode it records
//!   per-field before/after values and can be merged with a neighbour; in
//!   dump mode it snapshots whole entities and never merges.
//! - [`FnRequest`] wraps closures for requests whose undo is a distinct code
//!   path, or a single self-inverse operation used for all three hooks.
//!
//! Missing target entities are skipped silently: no error, no hook.

use fp_core::{Document, EntityId, Field, FieldValue, LogGroupType, TxnError, TxnResult};
use smallvec::SmallVec;
use std::fmt;

/// One undoable unit of entity mutation.
pub trait Request: fmt::Debug {
    /// Apply the forward mutation, then invalidate.
    fn on_commit(&mut self, doc: &mut Document) -> TxnResult<()>;

    /// Revert what `on_commit` did and re-run the same invalidation hooks.
    fn on_undo(&mut self, doc: &mut Document) -> TxnResult<()>;

    /// Re-apply the forward mutation.
    fn on_redo(&mut self, doc: &mut Document) -> TxnResult<()>;

    /// Whether this request's field writes may be merged with a neighbour's.
    fn can_transact_field(&self) -> bool {
        false
    }

    fn description(&self) -> &str;

    fn category(&self) -> LogGroupType;

    /// Recorded field changes, for requests that track them.
    fn field_changes(&self) -> Option<&[FieldChange]> {
        None
    }

    /// Absorb `next` (already committed) into `self`. Returns false when the
    /// two cannot be merged; `self` is then left untouched.
    fn compose(&mut self, _next: &dyn Request) -> bool {
        false
    }
}

/// A recorded field transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldChange {
    pub entity: EntityId,
    pub field: Field,
    pub before: FieldValue,
    pub after: FieldValue,
}

// ─── StateRequest ────────────────────────────────────────────────────────

/// How a `StateRequest` captures state for undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Per-field before/after values. Mergeable.
    Field,
    /// Whole-entity snapshots. Never merged.
    Dump,
}

#[derive(Debug, Clone, Copy)]
struct Write {
    entity: EntityId,
    field: Field,
    value: FieldValue,
}

#[derive(Debug, Clone)]
struct EntityDump {
    entity: EntityId,
    fields: SmallVec<[Field; 2]>,
    before: Vec<u8>,
    after: Vec<u8>,
}

/// Generic field transaction.
#[derive(Debug, Clone)]
pub struct StateRequest {
    description: String,
    category: LogGroupType,
    mode: CaptureMode,
    writes: SmallVec<[Write; 2]>,
    changes: Vec<FieldChange>,
    dumps: Vec<EntityDump>,
}

impl StateRequest {
    /// A dump-mode request: whole entities are snapshotted.
    pub fn new(description: impl Into<String>, category: LogGroupType) -> Self {
        Self::with_mode(description, category, CaptureMode::Dump)
    }

    /// A field-mode request: only the written fields are recorded.
    pub fn field_mode(description: impl Into<String>, category: LogGroupType) -> Self {
        Self::with_mode(description, category, CaptureMode::Field)
    }

    fn with_mode(description: impl Into<String>, category: LogGroupType, mode: CaptureMode) -> Self {
        Self {
            description: description.into(),
            category,
            mode,
            writes: SmallVec::new(),
            changes: Vec::new(),
            dumps: Vec::new(),
        }
    }

    /// Queue a field write applied on commit.
    pub fn transact(mut self, entity: EntityId, field: Field, value: FieldValue) -> Self {
        self.writes.push(Write {
            entity,
            field,
            value,
        });
        self
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn changes(&self) -> &[FieldChange] {
        &self.changes
    }

    fn apply_write(&mut self, doc: &mut Document, write: Write) -> TxnResult<()> {
        let Some(entity) = doc.get_mut(write.entity) else {
            log::trace!("{}: {} is gone, skipping {:?}", self.description, write.entity, write.field);
            return Ok(());
        };
        match self.mode {
            CaptureMode::Field => {
                let before = entity.field(write.field).ok_or(TxnError::UnknownField {
                    id: write.entity,
                    field: write.field,
                })?;
                entity.set_field(write.field, write.value)?;
                entity.dirty_for(write.field);
                self.changes.push(FieldChange {
                    entity: write.entity,
                    field: write.field,
                    before,
                    after: write.value,
                });
            }
            CaptureMode::Dump => {
                let index = match self.dumps.iter().position(|d| d.entity == write.entity) {
                    Some(i) => i,
                    None => {
                        self.dumps.push(EntityDump {
                            entity: write.entity,
                            fields: SmallVec::new(),
                            before: entity.snapshot()?,
                            after: Vec::new(),
                        });
                        self.dumps.len() - 1
                    }
                };
                entity.set_field(write.field, write.value)?;
                entity.dirty_for(write.field);
                self.dumps[index].fields.push(write.field);
            }
        }
        Ok(())
    }

    fn restore(&mut self, doc: &mut Document, forward: bool) -> TxnResult<()> {
        match self.mode {
            CaptureMode::Field => {
                let ordered: Box<dyn Iterator<Item = &FieldChange>> = if forward {
                    Box::new(self.changes.iter())
                } else {
                    Box::new(self.changes.iter().rev())
                };
                for change in ordered {
                    let Some(entity) = doc.get_mut(change.entity) else {
                        continue;
                    };
                    let value = if forward { change.after } else { change.before };
                    entity.set_field(change.field, value)?;
                    entity.dirty_for(change.field);
                }
            }
            CaptureMode::Dump => {
                for dump in &self.dumps {
                    let bytes = if forward { &dump.after } else { &dump.before };
                    if doc.restore_snapshot(dump.entity, bytes)? {
                        if let Some(entity) = doc.get_mut(dump.entity) {
                            for field in &dump.fields {
                                entity.dirty_for(*field);
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl Request for StateRequest {
    fn on_commit(&mut self, doc: &mut Document) -> TxnResult<()> {
        self.changes.clear();
        self.dumps.clear();
        let writes = self.writes.clone();
        for write in writes {
            if let Err(err) = self.apply_write(doc, write) {
                // Leave the document as it was before this request.
                self.restore(doc, false)?;
                self.changes.clear();
                self.dumps.clear();
                return Err(err);
            }
        }
        for dump in &mut self.dumps {
            if let Some(entity) = doc.get(dump.entity) {
                dump.after = entity.snapshot()?;
            }
        }
        Ok(())
    }

    fn on_undo(&mut self, doc: &mut Document) -> TxnResult<()> {
        self.restore(doc, false)
    }

    fn on_redo(&mut self, doc: &mut Document) -> TxnResult<()> {
        self.restore(doc, true)
    }

    fn can_transact_field(&self) -> bool {
        self.mode == CaptureMode::Field
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn category(&self) -> LogGroupType {
        self.category
    }

    fn field_changes(&self) -> Option<&[FieldChange]> {
        match self.mode {
            CaptureMode::Field => Some(&self.changes),
            CaptureMode::Dump => None,
        }
    }

    /// Keep the earliest `before` and the latest `after` per (entity, field).
    fn compose(&mut self, next: &dyn Request) -> bool {
        if !self.can_transact_field() || !next.can_transact_field() {
            return false;
        }
        let Some(incoming) = next.field_changes() else {
            return false;
        };
        for change in incoming {
            // Redo replays in order, so the latest write to a field must win.
            match self
                .changes
                .iter_mut()
                .rev()
                .find(|c| c.entity == change.entity && c.field == change.field)
            {
                Some(existing) => existing.after = change.after,
                None => self.changes.push(*change),
            }
        }
        true
    }
}

// ─── FnRequest ───────────────────────────────────────────────────────────

type Hook = Box<dyn FnMut(&mut Document, EntityId) -> TxnResult<()>>;

/// A request assembled from closures over one target entity.
pub struct FnRequest {
    target: Option<EntityId>,
    description: String,
    category: LogGroupType,
    commit: Hook,
    undo: Option<Hook>,
    redo: Option<Hook>,
}

impl FnRequest {
    /// `redo` defaults to `commit`.
    pub fn new(
        target: Option<EntityId>,
        description: impl Into<String>,
        category: LogGroupType,
        commit: impl FnMut(&mut Document, EntityId) -> TxnResult<()> + 'static,
        undo: impl FnMut(&mut Document, EntityId) -> TxnResult<()> + 'static,
    ) -> Self {
        Self {
            target,
            description: description.into(),
            category,
            commit: Box::new(commit),
            undo: Some(Box::new(undo)),
            redo: None,
        }
    }

    /// One operation serves commit, undo and redo alike (e.g. a toggle).
    pub fn self_inverse(
        target: Option<EntityId>,
        description: impl Into<String>,
        category: LogGroupType,
        op: impl FnMut(&mut Document, EntityId) -> TxnResult<()> + 'static,
    ) -> Self {
        Self {
            target,
            description: description.into(),
            category,
            commit: Box::new(op),
            undo: None,
            redo: None,
        }
    }

    pub fn with_redo(
        mut self,
        redo: impl FnMut(&mut Document, EntityId) -> TxnResult<()> + 'static,
    ) -> Self {
        self.redo = Some(Box::new(redo));
        self
    }

    fn live_target(&self, doc: &Document) -> Option<EntityId> {
        let id = self.target?;
        if doc.contains(id) {
            Some(id)
        } else {
            log::trace!("{}: target {id} is gone", self.description);
            None
        }
    }
}

impl fmt::Debug for FnRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnRequest")
            .field("target", &self.target)
            .field("description", &self.description)
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

impl Request for FnRequest {
    fn on_commit(&mut self, doc: &mut Document) -> TxnResult<()> {
        match self.live_target(doc) {
            Some(id) => (self.commit)(doc, id),
            None => Ok(()),
        }
    }

    fn on_undo(&mut self, doc: &mut Document) -> TxnResult<()> {
        let Some(id) = self.live_target(doc) else {
            return Ok(());
        };
        match &mut self.undo {
            Some(undo) => undo(doc, id),
            None => (self.commit)(doc, id),
        }
    }

    fn on_redo(&mut self, doc: &mut Document) -> TxnResult<()> {
        let Some(id) = self.live_target(doc) else {
            return Ok(());
        };
        match &mut self.redo {
            Some(redo) => redo(doc, id),
            None => (self.commit)(doc, id),
        }
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn category(&self) -> LogGroupType {
        self.category
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fp_core::{Content, Entity, EntityKind};
    use std::cell::Cell;
    use std::rc::Rc;

    fn content_doc(id: &str) -> (Document, EntityId) {
        let id = EntityId::intern(id);
        let doc = Document::from_entities([Entity::new(
            id,
            EntityKind::Content(Content {
                x: 1.0,
                y: 2.0,
                flipped: false,
            }),
        )]);
        (doc, id)
    }

    fn x_of(doc: &Document, id: EntityId) -> f64 {
        doc.get(id)
            .and_then(|e| e.field(Field::X))
            .and_then(FieldValue::as_number)
            .unwrap()
    }

    #[test]
    fn field_mode_records_before_and_after() {
        let (mut doc, id) = content_doc("req_field");
        let mut req = StateRequest::field_mode("move", LogGroupType::ContentOperation)
            .transact(id, Field::X, FieldValue::Number(5.0));

        req.on_commit(&mut doc).unwrap();
        assert_eq!(
            req.changes(),
            &[FieldChange {
                entity: id,
                field: Field::X,
                before: FieldValue::Number(1.0),
                after: FieldValue::Number(5.0),
            }]
        );
        req.on_undo(&mut doc).unwrap();
        assert_eq!(x_of(&doc, id), 1.0);
        req.on_redo(&mut doc).unwrap();
        assert_eq!(x_of(&doc, id), 5.0);
    }

    #[test]
    fn dump_mode_restores_whole_entity() {
        let (mut doc, id) = content_doc("req_dump");
        let mut req = StateRequest::new("move", LogGroupType::ContentOperation)
            .transact(id, Field::X, FieldValue::Number(7.0))
            .transact(id, Field::Y, FieldValue::Number(8.0));
        assert!(!req.can_transact_field());
        assert!(req.field_changes().is_none());

        req.on_commit(&mut doc).unwrap();
        req.on_undo(&mut doc).unwrap();
        let e = doc.get(id).unwrap();
        assert_eq!(e.field(Field::X), Some(FieldValue::Number(1.0)));
        assert_eq!(e.field(Field::Y), Some(FieldValue::Number(2.0)));

        req.on_redo(&mut doc).unwrap();
        let e = doc.get(id).unwrap();
        assert_eq!(e.field(Field::X), Some(FieldValue::Number(7.0)));
        assert_eq!(e.field(Field::Y), Some(FieldValue::Number(8.0)));
    }

    #[test]
    fn failed_write_rolls_back_earlier_writes() {
        let (mut doc, id) = content_doc("req_rollback");
        let mut req = StateRequest::field_mode("bad", LogGroupType::ContentOperation)
            .transact(id, Field::X, FieldValue::Number(9.0))
            .transact(id, Field::AutoFit, FieldValue::Bool(true));

        assert!(req.on_commit(&mut doc).is_err());
        assert_eq!(x_of(&doc, id), 1.0);
        assert!(req.changes().is_empty());
    }

    #[test]
    fn compose_keeps_first_before_and_last_after() {
        let (mut doc, id) = content_doc("req_compose");
        let mut first = StateRequest::field_mode("drag", LogGroupType::ContentOperation)
            .transact(id, Field::X, FieldValue::Number(2.0));
        let mut second = StateRequest::field_mode("drag", LogGroupType::ContentOperation)
            .transact(id, Field::X, FieldValue::Number(3.0))
            .transact(id, Field::Y, FieldValue::Number(4.0));
        first.on_commit(&mut doc).unwrap();
        second.on_commit(&mut doc).unwrap();

        assert!(first.compose(&second));
        assert_eq!(first.changes().len(), 2);
        assert_eq!(first.changes()[0].before, FieldValue::Number(1.0));
        assert_eq!(first.changes()[0].after, FieldValue::Number(3.0));

        first.on_undo(&mut doc).unwrap();
        assert_eq!(x_of(&doc, id), 1.0);
    }

    #[test]
    fn compose_updates_the_latest_write_to_a_field() {
        let (mut doc, id) = content_doc("req_compose_twice");
        let mut first = StateRequest::field_mode("drag", LogGroupType::ContentOperation)
            .transact(id, Field::X, FieldValue::Number(2.0))
            .transact(id, Field::X, FieldValue::Number(3.0));
        let mut second = StateRequest::field_mode("drag", LogGroupType::ContentOperation)
            .transact(id, Field::X, FieldValue::Number(5.0));
        first.on_commit(&mut doc).unwrap();
        second.on_commit(&mut doc).unwrap();

        assert!(first.compose(&second));
        first.on_undo(&mut doc).unwrap();
        assert_eq!(x_of(&doc, id), 1.0);
        first.on_redo(&mut doc).unwrap();
        assert_eq!(x_of(&doc, id), 5.0);
    }

    #[test]
    fn dump_mode_never_composes() {
        let (mut doc, id) = content_doc("req_nocompose");
        let mut first = StateRequest::new("drag", LogGroupType::ContentOperation)
            .transact(id, Field::X, FieldValue::Number(2.0));
        let mut second = StateRequest::field_mode("drag", LogGroupType::ContentOperation)
            .transact(id, Field::X, FieldValue::Number(3.0));
        first.on_commit(&mut doc).unwrap();
        second.on_commit(&mut doc).unwrap();
        assert!(!first.compose(&second));
        assert!(!second.compose(&first));
    }

    #[test]
    fn fn_request_skips_missing_target() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let mut req = FnRequest::self_inverse(
            Some(EntityId::intern("req_ghost")),
            "toggle",
            LogGroupType::ContentOperation,
            move |_, _| {
                counter.set(counter.get() + 1);
                Ok(())
            },
        );
        let mut doc = Document::new();
        req.on_commit(&mut doc).unwrap();
        req.on_undo(&mut doc).unwrap();
        assert_eq!(calls.get(), 0);

        let mut none = FnRequest::self_inverse(None, "toggle", LogGroupType::ContentOperation, |_, _| {
            panic!("must not run")
        });
        none.on_commit(&mut doc).unwrap();
    }

    #[test]
    fn fn_request_uses_distinct_undo_and_redo() {
        let (mut doc, id) = content_doc("req_fn");
        let set = |value: f64| {
            move |doc: &mut Document, id: EntityId| -> TxnResult<()> {
                if let Some(e) = doc.get_mut(id) {
                    e.set_field(Field::X, FieldValue::Number(value))?;
                }
                Ok(())
            }
        };
        let mut req = FnRequest::new(Some(id), "nudge", LogGroupType::ContentOperation, set(3.0), set(1.0))
            .with_redo(set(4.0));

        req.on_commit(&mut doc).unwrap();
        assert_eq!(x_of(&doc, id), 3.0);
        req.on_undo(&mut doc).unwrap();
        assert_eq!(x_of(&doc, id), 1.0);
        req.on_redo(&mut doc).unwrap();
        assert_eq!(x_of(&doc, id), 4.0);
    }
}
