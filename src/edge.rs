//! Typed edges between entities.
//!
//! An [`EntityEdge`] is a value object: two edges with the same
//! `(source_ecs_id, target_ecs_id, kind, slot)` are equal regardless of
//! identity. Edges never carry owning references; trees own entities by
//! `ecs_id` lookup through [`crate::tree::EntityTree::nodes`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The shape of container a child was reached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    Direct,
    List,
    Set,
    Tuple,
    Dict,
}

/// The slot within a container a child occupies. `None` for `Direct` edges.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    None,
    Index(usize),
    Key(String),
}

/// A typed directed relation from parent to child.
///
/// Identity of an edge (for set-comparison in the differ) is
/// `(source_ecs_id, target_ecs_id, kind, slot)` — `field_name` is metadata,
/// not part of edge identity. A `SET`/`DICT` element's identity lives in its
/// `slot` (child id for `SET`, key for `DICT`), not in which field happened
/// to reference it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEdge {
    pub source_ecs_id: Uuid,
    pub target_ecs_id: Uuid,
    pub kind: EdgeKind,
    pub slot: Slot,
    pub field_name: Option<String>,
}

impl EntityEdge {
    pub fn new(
        source_ecs_id: Uuid,
        target_ecs_id: Uuid,
        kind: EdgeKind,
        slot: Slot,
        field_name: Option<String>,
    ) -> Self {
        Self { source_ecs_id, target_ecs_id, kind, slot, field_name }
    }

    /// The identity tuple used for set-comparison in the differ (C4 phase 2).
    pub fn identity(&self) -> (Uuid, Uuid, EdgeKind, Slot) {
        (self.source_ecs_id, self.target_ecs_id, self.kind, self.slot.clone())
    }
}

impl PartialEq for EntityEdge {
    fn eq(&self, other: &Self) -> bool {
        self.source_ecs_id == other.source_ecs_id
            && self.target_ecs_id == other.target_ecs_id
            && self.kind == other.kind
            && self.slot == other.slot
    }
}
impl Eq for EntityEdge {}

impl std::hash::Hash for EntityEdge {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.source_ecs_id.hash(state);
        self.target_ecs_id.hash(state);
        self.kind.hash(state);
        self.slot.hash(state);
    }
}

/// Key used for the tree's `edges` map: `(source_ecs_id, target_ecs_id, kind,
/// index_or_key)` rather than just the node pair — since a parent can reach
/// the same child through more than one field/slot (e.g. the same entity
/// appearing twice in a list), the map is keyed by the full identity tuple so
/// parallel edges between the same pair of nodes don't collide.
pub type EdgeKey = (Uuid, Uuid, EdgeKind, Slot);
