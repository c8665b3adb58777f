//! Concrete domain requests.

use crate::request::{FieldChange, FnRequest, Request, StateRequest};
use fp_core::{
    Document, EntityFlag, EntityId, Field, FieldValue, FlipMemo, LogGroupType, TxnResult,
};

/// A molding offset at or below this magnitude is treated as flush: it never
/// cut a hole in its face, so deleting it must not touch the face's holes.
pub const MOLDING_OFFSET_TOLERANCE: f64 = 1e-6;

// ─── ChangeMoldingAutofitRequest ─────────────────────────────────────────

/// Toggle a molding's `auto_fit` flag.
///
/// Field-mode transaction: consecutive toggles on the same molding can merge
/// into one undo step. The field's invalidation covers both the molding's
/// geometry and the neighbouring moldings on the same face type.
#[derive(Debug, Clone)]
pub struct ChangeMoldingAutofitRequest {
    molding: Option<EntityId>,
    state: StateRequest,
}

impl ChangeMoldingAutofitRequest {
    pub fn new(molding: Option<EntityId>, auto_fit: bool) -> Self {
        let mut state =
            StateRequest::field_mode("Change molding auto-fit", LogGroupType::FaceOperation);
        if let Some(id) = molding {
            state = state.transact(id, Field::AutoFit, FieldValue::Bool(auto_fit));
        }
        Self { molding, state }
    }
}

impl Request for ChangeMoldingAutofitRequest {
    fn on_commit(&mut self, doc: &mut Document) -> TxnResult<()> {
        if let Some(entity) = self.molding.and_then(|id| doc.get(id)) {
            entity.as_molding()?;
        }
        self.state.on_commit(doc)
    }

    fn on_undo(&mut self, doc: &mut Document) -> TxnResult<()> {
        self.state.on_undo(doc)
    }

    fn on_redo(&mut self, doc: &mut Document) -> TxnResult<()> {
        self.state.on_redo(doc)
    }

    fn can_transact_field(&self) -> bool {
        true
    }

    fn description(&self) -> &str {
        self.state.description()
    }

    fn category(&self) -> LogGroupType {
        self.state.category()
    }

    fn field_changes(&self) -> Option<&[FieldChange]> {
        self.state.field_changes()
    }

    fn compose(&mut self, next: &dyn Request) -> bool {
        self.state.compose(next)
    }
}

// ─── LightSlotStateRequest ───────────────────────────────────────────────

/// Check or uncheck a customized model's light slot.
///
/// Checking generates the self-hosted light band, unchecking deletes it. The
/// model's geometry is only dirtied when the band operation reports a change.
#[derive(Debug, Clone)]
pub struct LightSlotStateRequest {
    model: Option<EntityId>,
    checked: bool,
    applied: bool,
    /// `checked` as it was before the last commit or redo.
    prior_checked: Option<bool>,
}

impl LightSlotStateRequest {
    pub fn new(model: Option<EntityId>, checked: bool) -> Self {
        Self {
            model,
            checked,
            applied: false,
            prior_checked: None,
        }
    }

    fn capture(&mut self, doc: &Document) {
        self.prior_checked = self
            .model
            .and_then(|id| doc.get(id))
            .and_then(|e| e.field(Field::Checked))
            .and_then(|v| v.as_bool());
    }

    /// Run the band operation. Returns whether it changed anything.
    fn run(&self, doc: &mut Document, generate: bool) -> TxnResult<bool> {
        let Some(entity) = self.model.and_then(|id| doc.get_mut(id)) else {
            return Ok(false);
        };
        let changed = if generate {
            entity.generate_self_host_light_band()?
        } else {
            entity.delete_self_host_light_band()?
        };
        if changed {
            entity.dirty_geometry();
        }
        Ok(changed)
    }
}

impl Request for LightSlotStateRequest {
    fn on_commit(&mut self, doc: &mut Document) -> TxnResult<()> {
        self.capture(doc);
        self.applied = self.run(doc, self.checked)?;
        Ok(())
    }

    /// Only a band operation that actually happened is reverted; `checked`
    /// always returns to its prior value.
    fn on_undo(&mut self, doc: &mut Document) -> TxnResult<()> {
        if self.applied {
            self.run(doc, !self.checked)?;
        }
        if let (Some(prior), Some(entity)) =
            (self.prior_checked, self.model.and_then(|id| doc.get_mut(id)))
        {
            entity.set_field(Field::Checked, FieldValue::Bool(prior))?;
        }
        Ok(())
    }

    fn on_redo(&mut self, doc: &mut Document) -> TxnResult<()> {
        self.on_commit(doc)
    }

    fn description(&self) -> &str {
        if self.checked {
            "Enable light slot"
        } else {
            "Disable light slot"
        }
    }

    fn category(&self) -> LogGroupType {
        LogGroupType::ContentOperation
    }
}

// ─── DeleteFaceMoldingRequest ────────────────────────────────────────────

/// Detach a molding from its face and mark it removed.
///
/// A molding whose offset exceeds [`MOLDING_OFFSET_TOLERANCE`] cut a hole in
/// the face; that hole is removed first, while the molding is still attached.
#[derive(Debug, Clone)]
pub struct DeleteFaceMoldingRequest {
    face: Option<EntityId>,
    molding: Option<EntityId>,
    /// Positions on the face before deletion.
    molding_index: Option<usize>,
    hole_index: Option<usize>,
}

impl DeleteFaceMoldingRequest {
    pub fn new(face: Option<EntityId>, molding: Option<EntityId>) -> Self {
        Self {
            face,
            molding,
            molding_index: None,
            hole_index: None,
        }
    }

    fn targets(&self, doc: &Document) -> Option<(EntityId, EntityId)> {
        let (face, molding) = (self.face?, self.molding?);
        (doc.contains(face) && doc.contains(molding)).then_some((face, molding))
    }

    fn delete(&mut self, doc: &mut Document) -> TxnResult<()> {
        let Some((face_id, molding_id)) = self.targets(doc) else {
            return Ok(());
        };
        let offset = match doc.get(molding_id) {
            Some(entity) => entity.as_molding()?.offset,
            None => return Ok(()),
        };

        if let Some(face) = doc.get_mut(face_id) {
            self.hole_index = if offset.abs() > MOLDING_OFFSET_TOLERANCE {
                face.remove_hole(molding_id)?
            } else {
                None
            };
            match face.remove_molding(molding_id) {
                Ok(index) => self.molding_index = Some(index),
                Err(err) => {
                    if let Some(index) = self.hole_index.take() {
                        face.insert_hole(index, molding_id)?;
                    }
                    return Err(err);
                }
            }
            face.dirty_geometry();
        }

        if let Some(molding) = doc.get_mut(molding_id) {
            molding.set_flag_on(EntityFlag::Removed);
            molding.dirty_neighbor_moldings_by_facetype();
        }
        Ok(())
    }
}

impl Request for DeleteFaceMoldingRequest {
    fn on_commit(&mut self, doc: &mut Document) -> TxnResult<()> {
        self.delete(doc)
    }

    fn on_undo(&mut self, doc: &mut Document) -> TxnResult<()> {
        let Some((face_id, molding_id)) = self.targets(doc) else {
            return Ok(());
        };
        if let Some(face) = doc.get_mut(face_id) {
            face.insert_molding(self.molding_index.unwrap_or(usize::MAX), molding_id)?;
            if let Some(index) = self.hole_index {
                face.insert_hole(index, molding_id)?;
            }
            face.dirty_geometry();
        }
        if let Some(molding) = doc.get_mut(molding_id) {
            molding.set_flag_off(EntityFlag::Removed);
            molding.dirty_neighbor_moldings_by_facetype();
        }
        Ok(())
    }

    fn on_redo(&mut self, doc: &mut Document) -> TxnResult<()> {
        self.delete(doc)
    }

    fn description(&self) -> &str {
        "Delete face molding"
    }

    fn category(&self) -> LogGroupType {
        LogGroupType::FaceOperation
    }
}

// ─── GroupFlipTransactionRequest ─────────────────────────────────────────

/// Flip every member of a group. The flip is its own inverse, so commit,
/// undo and redo all run the same operation once. The operation keeps a
/// [`FlipMemo`] so each flip back lands on the exact prior positions.
#[derive(Debug)]
pub struct GroupFlipTransactionRequest {
    inner: FnRequest,
}

impl GroupFlipTransactionRequest {
    pub fn new(group: Option<EntityId>) -> Self {
        let mut memo = FlipMemo::default();
        let inner = FnRequest::self_inverse(
            group,
            "Flip group",
            LogGroupType::ContentOperation,
            move |doc, id| {
                if doc.flip_group_with(id, &mut memo)? {
                    if let Some(group) = doc.get_mut(id) {
                        group.dirty_geometry();
                    }
                }
                Ok(())
            },
        );
        Self { inner }
    }
}

impl Request for GroupFlipTransactionRequest {
    fn on_commit(&mut self, doc: &mut Document) -> TxnResult<()> {
        self.inner.on_commit(doc)
    }

    fn on_undo(&mut self, doc: &mut Document) -> TxnResult<()> {
        self.inner.on_undo(doc)
    }

    fn on_redo(&mut self, doc: &mut Document) -> TxnResult<()> {
        self.inner.on_redo(doc)
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn category(&self) -> LogGroupType {
        self.inner.category()
    }
}

// ─── AutoFitOpeningRequest ───────────────────────────────────────────────

/// Match an opening's depth to the thickness of its host wall.
#[derive(Debug, Clone)]
pub struct AutoFitOpeningRequest {
    opening: Option<EntityId>,
    host: Option<EntityId>,
    depths: Option<(f64, f64)>,
}

impl AutoFitOpeningRequest {
    pub fn new(opening: Option<EntityId>, host: Option<EntityId>) -> Self {
        Self {
            opening,
            host,
            depths: None,
        }
    }

    fn set_depth(&self, doc: &mut Document, depth: f64) -> TxnResult<()> {
        if let Some(entity) = self.opening.and_then(|id| doc.get_mut(id)) {
            entity.as_opening_mut()?.depth = depth;
            entity.dirty_geometry();
        }
        Ok(())
    }
}

impl Request for AutoFitOpeningRequest {
    fn on_commit(&mut self, doc: &mut Document) -> TxnResult<()> {
        let (Some(opening), Some(host)) = (self.opening, self.host) else {
            return Ok(());
        };
        let thickness = match doc.get(host) {
            Some(wall) => wall.as_wall()?.thickness,
            None => return Ok(()),
        };
        let Some(entity) = doc.get_mut(opening) else {
            return Ok(());
        };
        let target = entity.as_opening_mut()?;
        self.depths = Some((target.depth, thickness));
        target.depth = thickness;
        entity.dirty_geometry();
        Ok(())
    }

    fn on_undo(&mut self, doc: &mut Document) -> TxnResult<()> {
        match self.depths {
            Some((before, _)) => self.set_depth(doc, before),
            None => Ok(()),
        }
    }

    fn on_redo(&mut self, doc: &mut Document) -> TxnResult<()> {
        match self.depths {
            Some((_, after)) => self.set_depth(doc, after),
            None => Ok(()),
        }
    }

    fn description(&self) -> &str {
        "Auto-fit opening to wall"
    }

    fn category(&self) -> LogGroupType {
        LogGroupType::WallOperation
    }
}
