//! Entity model for floorplan documents.
//!
//! A `Document` owns every entity by `EntityId`. Requests never create or
//! destroy entities: they look them up, write fields, call domain mutators,
//! and then call the entity's invalidation hooks. Hooks only mark derived
//! state (meshes, neighbouring moldings) as stale; recomputation happens
//! later, outside the transaction core, and is acknowledged with `clean()`.

use crate::error::{TxnError, TxnResult};
use crate::id::EntityId;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;

// ─── Domain kinds ────────────────────────────────────────────────────────

/// Which side of a host a face (and the moldings on it) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceType {
    Left,
    Right,
    Top,
    Bottom,
    Front,
    Back,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wall {
    pub length: f64,
    pub thickness: f64,
    pub height: f64,
    #[serde(default)]
    pub openings: SmallVec<[EntityId; 4]>,
}

/// A door or window hosted by a wall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opening {
    #[serde(default)]
    pub host: Option<EntityId>,
    pub width: f64,
    pub height: f64,
    pub depth: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub face_type: FaceType,
    #[serde(default)]
    pub host: Option<EntityId>,
    #[serde(default)]
    pub moldings: SmallVec<[EntityId; 2]>,
    /// Holes cut into the face, keyed by the molding that required them.
    #[serde(default)]
    pub holes: SmallVec<[EntityId; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Molding {
    pub face_type: FaceType,
    /// Distance from the face edge. A non-zero offset cuts a hole in the face.
    #[serde(default)]
    pub offset: f64,
    #[serde(default)]
    pub auto_fit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightSlot {
    /// Whether the slot's sweep path is closed. Open paths cannot host a band.
    pub path_closed: bool,
    #[serde(default)]
    pub checked: bool,
    #[serde(default)]
    pub light_band: Option<EntityId>,
}

/// A customized (parametric) model carrying a light slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomizedModel {
    pub light_slot: LightSlot,
}

/// A placed catalog item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub flipped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub members: SmallVec<[EntityId; 4]>,
    #[serde(default)]
    pub flipped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Wall(Wall),
    Opening(Opening),
    Face(Face),
    Molding(Molding),
    CustomizedModel(CustomizedModel),
    Content(Content),
    Group(Group),
}

impl EntityKind {
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Wall(_) => "wall",
            EntityKind::Opening(_) => "opening",
            EntityKind::Face(_) => "face",
            EntityKind::Molding(_) => "molding",
            EntityKind::CustomizedModel(_) => "customized model",
            EntityKind::Content(_) => "content",
            EntityKind::Group(_) => "group",
        }
    }
}

// ─── Flags & dirty state ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityFlag {
    /// Logically removed (kept for undo).
    Removed,
    Hidden,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFlags {
    #[serde(default)]
    pub removed: bool,
    #[serde(default)]
    pub hidden: bool,
}

/// Stale derived state awaiting recomputation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirtyState {
    pub geometry: bool,
    pub material: bool,
    /// Face types whose neighbouring moldings must be refreshed.
    pub neighbor_moldings: SmallVec<[FaceType; 2]>,
    /// Number of hook calls since creation. Never reset by `clean()`.
    pub invalidations: u32,
}

// ─── Field access ────────────────────────────────────────────────────────

/// Fields that can be transacted individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    AutoFit,
    Visible,
    Depth,
    Thickness,
    Offset,
    X,
    Y,
    Checked,
    Flipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
}

impl FieldValue {
    pub fn as_bool(self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(b),
            FieldValue::Number(_) => None,
        }
    }

    pub fn as_number(self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(n),
            FieldValue::Bool(_) => None,
        }
    }
}

// ─── Entity ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    #[serde(default)]
    pub flags: EntityFlags,
    #[serde(skip)]
    pub dirty: DirtyState,
}

impl Entity {
    pub fn new(id: EntityId, kind: EntityKind) -> Self {
        Self {
            id,
            kind,
            flags: EntityFlags::default(),
            dirty: DirtyState::default(),
        }
    }

    // ── Invalidation hooks ──

    pub fn dirty_geometry(&mut self) {
        self.dirty.geometry = true;
        self.dirty.invalidations += 1;
    }

    pub fn dirty_material(&mut self) {
        self.dirty.material = true;
        self.dirty.invalidations += 1;
    }

    /// Mark the moldings sharing this molding's face type as stale.
    /// No-op for anything but moldings.
    pub fn dirty_neighbor_moldings_by_facetype(&mut self) {
        if let EntityKind::Molding(m) = &self.kind {
            let face_type = m.face_type;
            if !self.dirty.neighbor_moldings.contains(&face_type) {
                self.dirty.neighbor_moldings.push(face_type);
            }
            self.dirty.invalidations += 1;
        }
    }

    /// Invalidate whatever depends on `field`.
    pub fn dirty_for(&mut self, field: Field) {
        match field {
            Field::Visible => self.dirty_material(),
            Field::AutoFit | Field::Offset => {
                self.dirty_geometry();
                self.dirty_neighbor_moldings_by_facetype();
            }
            Field::Depth
            | Field::Thickness
            | Field::X
            | Field::Y
            | Field::Checked
            | Field::Flipped => self.dirty_geometry(),
        }
    }

    /// Acknowledge that derived state was recomputed.
    pub fn clean(&mut self) {
        self.dirty.geometry = false;
        self.dirty.material = false;
        self.dirty.neighbor_moldings.clear();
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.geometry || self.dirty.material || !self.dirty.neighbor_moldings.is_empty()
    }

    // ── Flags ──

    pub fn set_flag_on(&mut self, flag: EntityFlag) {
        *self.flag_mut(flag) = true;
    }

    pub fn set_flag_off(&mut self, flag: EntityFlag) {
        *self.flag_mut(flag) = false;
    }

    pub fn is_flag_on(&self, flag: EntityFlag) -> bool {
        match flag {
            EntityFlag::Removed => self.flags.removed,
            EntityFlag::Hidden => self.flags.hidden,
        }
    }

    fn flag_mut(&mut self, flag: EntityFlag) -> &mut bool {
        match flag {
            EntityFlag::Removed => &mut self.flags.removed,
            EntityFlag::Hidden => &mut self.flags.hidden,
        }
    }

    // ── Fields ──

    pub fn field(&self, field: Field) -> Option<FieldValue> {
        use FieldValue::{Bool, Number};
        match (field, &self.kind) {
            (Field::Visible, _) => Some(Bool(!self.flags.hidden)),
            (Field::AutoFit, EntityKind::Molding(m)) => Some(Bool(m.auto_fit)),
            (Field::Offset, EntityKind::Molding(m)) => Some(Number(m.offset)),
            (Field::Depth, EntityKind::Opening(o)) => Some(Number(o.depth)),
            (Field::Thickness, EntityKind::Wall(w)) => Some(Number(w.thickness)),
            (Field::X, EntityKind::Content(c)) => Some(Number(c.x)),
            (Field::Y, EntityKind::Content(c)) => Some(Number(c.y)),
            (Field::Flipped, EntityKind::Content(c)) => Some(Bool(c.flipped)),
            (Field::Flipped, EntityKind::Group(g)) => Some(Bool(g.flipped)),
            (Field::Checked, EntityKind::CustomizedModel(m)) => Some(Bool(m.light_slot.checked)),
            _ => None,
        }
    }

    /// Write one field. Does not invalidate; callers pair this with `dirty_for`.
    pub fn set_field(&mut self, field: Field, value: FieldValue) -> TxnResult<()> {
        let id = self.id;
        let type_err = || TxnError::FieldType { id, field, value };
        let slot: FieldSlot<'_> = match (field, &mut self.kind) {
            (Field::Visible, _) => {
                let visible = value.as_bool().ok_or_else(type_err)?;
                self.flags.hidden = !visible;
                return Ok(());
            }
            (Field::AutoFit, EntityKind::Molding(m)) => FieldSlot::Bool(&mut m.auto_fit),
            (Field::Offset, EntityKind::Molding(m)) => FieldSlot::Number(&mut m.offset),
            (Field::Depth, EntityKind::Opening(o)) => FieldSlot::Number(&mut o.depth),
            (Field::Thickness, EntityKind::Wall(w)) => FieldSlot::Number(&mut w.thickness),
            (Field::X, EntityKind::Content(c)) => FieldSlot::Number(&mut c.x),
            (Field::Y, EntityKind::Content(c)) => FieldSlot::Number(&mut c.y),
            (Field::Flipped, EntityKind::Content(c)) => FieldSlot::Bool(&mut c.flipped),
            (Field::Flipped, EntityKind::Group(g)) => FieldSlot::Bool(&mut g.flipped),
            (Field::Checked, EntityKind::CustomizedModel(m)) => {
                FieldSlot::Bool(&mut m.light_slot.checked)
            }
            _ => return Err(TxnError::UnknownField { id, field }),
        };
        match slot {
            FieldSlot::Bool(b) => *b = value.as_bool().ok_or_else(type_err)?,
            FieldSlot::Number(n) => *n = value.as_number().ok_or_else(type_err)?,
        }
        Ok(())
    }

    // ── Typed views ──

    pub fn as_wall(&self) -> TxnResult<&Wall> {
        match &self.kind {
            EntityKind::Wall(w) => Ok(w),
            _ => Err(TxnError::wrong_kind(self.id, "wall")),
        }
    }

    pub fn as_molding(&self) -> TxnResult<&Molding> {
        match &self.kind {
            EntityKind::Molding(m) => Ok(m),
            _ => Err(TxnError::wrong_kind(self.id, "molding")),
        }
    }

    pub fn as_opening_mut(&mut self) -> TxnResult<&mut Opening> {
        match &mut self.kind {
            EntityKind::Opening(o) => Ok(o),
            _ => Err(TxnError::wrong_kind(self.id, "opening")),
        }
    }

    fn as_face_mut(&mut self) -> TxnResult<&mut Face> {
        match &mut self.kind {
            EntityKind::Face(f) => Ok(f),
            _ => Err(TxnError::wrong_kind(self.id, "face")),
        }
    }

    fn as_light_slot_mut(&mut self) -> TxnResult<&mut LightSlot> {
        match &mut self.kind {
            EntityKind::CustomizedModel(m) => Ok(&mut m.light_slot),
            _ => Err(TxnError::wrong_kind(self.id, "customized model")),
        }
    }

    // ── Face mutators ──

    pub fn add_molding(&mut self, molding: EntityId) -> TxnResult<()> {
        self.insert_molding(usize::MAX, molding)
    }

    /// Attach `molding` at `index` (clamped to the end).
    pub fn insert_molding(&mut self, index: usize, molding: EntityId) -> TxnResult<()> {
        let face_id = self.id;
        let face = self.as_face_mut()?;
        if face.moldings.contains(&molding) {
            return Err(TxnError::MoldingAlreadyAttached {
                face: face_id,
                molding,
            });
        }
        face.moldings.insert(index.min(face.moldings.len()), molding);
        Ok(())
    }

    /// Detach `molding`. Returns the index it occupied.
    pub fn remove_molding(&mut self, molding: EntityId) -> TxnResult<usize> {
        let face_id = self.id;
        let face = self.as_face_mut()?;
        let pos = face
            .moldings
            .iter()
            .position(|m| *m == molding)
            .ok_or(TxnError::MoldingNotAttached {
                face: face_id,
                molding,
            })?;
        face.moldings.remove(pos);
        Ok(pos)
    }

    pub fn has_molding(&self, molding: EntityId) -> bool {
        matches!(&self.kind, EntityKind::Face(f) if f.moldings.contains(&molding))
    }

    pub fn add_hole(&mut self, molding: EntityId) -> TxnResult<()> {
        self.insert_hole(usize::MAX, molding)
    }

    pub fn insert_hole(&mut self, index: usize, molding: EntityId) -> TxnResult<()> {
        let face = self.as_face_mut()?;
        if !face.holes.contains(&molding) {
            face.holes.insert(index.min(face.holes.len()), molding);
        }
        Ok(())
    }

    /// Remove the hole cut for `molding`. Only legal while the molding is
    /// still attached. Returns the index the hole occupied, if any.
    pub fn remove_hole(&mut self, molding: EntityId) -> TxnResult<Option<usize>> {
        let face_id = self.id;
        let face = self.as_face_mut()?;
        if !face.moldings.contains(&molding) {
            return Err(TxnError::MoldingNotAttached {
                face: face_id,
                molding,
            });
        }
        let pos = face.holes.iter().position(|h| *h == molding);
        if let Some(pos) = pos {
            face.holes.remove(pos);
        }
        Ok(pos)
    }

    pub fn has_hole(&self, molding: EntityId) -> bool {
        matches!(&self.kind, EntityKind::Face(f) if f.holes.contains(&molding))
    }

    // ── Light slot mutators ──

    /// Create the band hosted by this model's light slot. The band id is
    /// derived from the model id, so regenerating yields the same band.
    /// Returns false when the path is open or a band already exists.
    pub fn generate_self_host_light_band(&mut self) -> TxnResult<bool> {
        let id = self.id;
        let slot = self.as_light_slot_mut()?;
        if !slot.path_closed || slot.light_band.is_some() {
            return Ok(false);
        }
        slot.light_band = Some(id.derived("lightband"));
        slot.checked = true;
        Ok(true)
    }

    /// Delete the self-hosted band. Returns false, leaving the slot as it
    /// was, when there is none.
    pub fn delete_self_host_light_band(&mut self) -> TxnResult<bool> {
        let slot = self.as_light_slot_mut()?;
        if slot.light_band.take().is_none() {
            return Ok(false);
        }
        slot.checked = false;
        Ok(true)
    }

    pub fn self_host_light_band(&self) -> Option<EntityId> {
        match &self.kind {
            EntityKind::CustomizedModel(m) => m.light_slot.light_band,
            _ => None,
        }
    }

    // ── Snapshots ──

    /// Compact binary dump of the persistent state (dirty state excluded).
    pub fn snapshot(&self) -> TxnResult<Vec<u8>> {
        rmp_serde::to_vec_named(self).map_err(|e| TxnError::Snapshot {
            id: self.id,
            reason: e.to_string(),
        })
    }

    fn from_snapshot(id: EntityId, bytes: &[u8]) -> TxnResult<Self> {
        rmp_serde::from_slice(bytes).map_err(|e| TxnError::Snapshot {
            id,
            reason: e.to_string(),
        })
    }
}

enum FieldSlot<'a> {
    Bool(&'a mut bool),
    Number(&'a mut f64),
}

// ─── Document ────────────────────────────────────────────────────────────

/// Owner of all entities, iterated in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Document {
    entities: HashMap<EntityId, Entity>,
    order: Vec<EntityId>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        let mut doc = Self::new();
        for entity in entities {
            doc.insert(entity);
        }
        doc
    }

    /// Load a JSON array of entities.
    pub fn from_json(text: &str) -> TxnResult<Self> {
        let entities: Vec<Entity> =
            serde_json::from_str(text).map_err(|e| TxnError::Parse(e.to_string()))?;
        Ok(Self::from_entities(entities))
    }

    pub fn to_json(&self) -> TxnResult<String> {
        let entities: Vec<&Entity> = self.iter().collect();
        serde_json::to_string_pretty(&entities).map_err(|e| TxnError::Parse(e.to_string()))
    }

    /// Insert or replace an entity. Returns the replaced one.
    pub fn insert(&mut self, entity: Entity) -> Option<Entity> {
        let id = entity.id;
        let previous = self.entities.insert(id, entity);
        if previous.is_none() {
            self.order.push(id);
        }
        previous
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.order.iter().filter_map(|id| self.entities.get(id))
    }

    /// Replace an entity's persistent state from a snapshot, keeping its dirty
    /// bookkeeping. Does not invalidate. Returns false when the entity no
    /// longer exists.
    pub fn restore_snapshot(&mut self, id: EntityId, bytes: &[u8]) -> TxnResult<bool> {
        let Some(current) = self.entities.get_mut(&id) else {
            return Ok(false);
        };
        let mut restored = Entity::from_snapshot(id, bytes)?;
        restored.dirty = std::mem::take(&mut current.dirty);
        *current = restored;
        Ok(true)
    }

    /// Mirror every member content of a group about the group's horizontal
    /// centre and toggle the `flipped` state of group and members.
    ///
    /// Applying it twice restores the original layout up to rounding; use
    /// [`Document::flip_group_with`] when the round trip must be exact.
    /// Returns false when the group does not exist.
    pub fn flip_group(&mut self, group_id: EntityId) -> TxnResult<bool> {
        self.flip_group_with(group_id, &mut FlipMemo::default())
    }

    /// [`Document::flip_group`] that remembers the positions it wrote. A member
    /// still sitting where the previous flip put it goes back to exactly where
    /// it came from; anything moved since is mirrored afresh.
    pub fn flip_group_with(
        &mut self,
        group_id: EntityId,
        memo: &mut FlipMemo,
    ) -> TxnResult<bool> {
        let Some(group_entity) = self.entities.get(&group_id) else {
            return Ok(false);
        };
        let members = match &group_entity.kind {
            EntityKind::Group(g) => g.members.clone(),
            _ => return Err(TxnError::wrong_kind(group_id, "group")),
        };

        let xs: SmallVec<[f64; 4]> = members
            .iter()
            .filter_map(|id| match self.entities.get(id).map(|e| &e.kind) {
                Some(EntityKind::Content(c)) => Some(c.x),
                _ => None,
            })
            .collect();
        let center = if xs.is_empty() {
            0.0
        } else {
            let min = xs.iter().copied().fold(f64::INFINITY, f64::min);
            let max = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            (min + max) / 2.0
        };

        let mut moves = SmallVec::new();
        for member in &members {
            match self.entities.get_mut(member).map(|e| &mut e.kind) {
                Some(EntityKind::Content(c)) => {
                    let to = memo.origin_of(*member, c.x).unwrap_or(2.0 * center - c.x);
                    moves.push((*member, c.x, to));
                    c.x = to;
                    c.flipped = !c.flipped;
                }
                Some(_) => log::trace!("flip {group_id}: skipping non-content member {member}"),
                None => log::trace!("flip {group_id}: member {member} is gone"),
            }
        }

        memo.moves = moves;

        if let Some(EntityKind::Group(g)) = self.entities.get_mut(&group_id).map(|e| &mut e.kind) {
            g.flipped = !g.flipped;
        }
        Ok(true)
    }
}

/// Positions written by the last [`Document::flip_group_with`], as
/// `(member, from, to)`.
#[derive(Debug, Clone, Default)]
pub struct FlipMemo {
    moves: SmallVec<[(EntityId, f64, f64); 4]>,
}

impl FlipMemo {
    fn origin_of(&self, member: EntityId, x: f64) -> Option<f64> {
        self.moves
            .iter()
            .find(|(id, _, to)| *id == member && *to == x)
            .map(|(_, from, _)| *from)
    }
}
