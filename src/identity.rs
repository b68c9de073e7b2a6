//! Identity & entity base (component C1).
//!
//! Every entity that participates in the store embeds an [`EntityCore`],
//! which carries the multi-UUID identity quartet (`ecs_id`, `lineage_id`,
//! `live_id`), ownership pointers (`root_ecs_id`/`root_live_id`), history
//! (`previous_ecs_id`, `old_ecs_id`, `old_ids`), timestamps, the
//! `from_storage` guard, and the `attribute_source` provenance map.
//!
//! Concrete entity types (application structs) embed `EntityCore` and
//! implement [`crate::entity::EntityObject`] over it; this module only
//! concerns itself with the identity primitives, which are type-agnostic.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EcsError, EcsResult};

/// Where a single scalar attribute's value came from: `None` means it was
/// authored locally on the entity that holds it.
pub type ScalarSource = Option<Uuid>;

/// Provenance for one field. List/map fields track provenance per element;
/// scalar fields track a single token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldSource {
    Scalar(ScalarSource),
    List(Vec<ScalarSource>),
    Map(HashMap<String, ScalarSource>),
}

impl FieldSource {
    pub fn scalar(source: ScalarSource) -> Self {
        FieldSource::Scalar(source)
    }
}

/// `attribute_source`: map from field name to a provenance token.
pub type AttributeSource = HashMap<String, FieldSource>;

/// The identity and lifecycle bookkeeping shared by every entity.
///
/// `live_id` is never persisted (see `#[serde(skip)]` below); it is
/// regenerated every time an entity is materialized as a live object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityCore {
    pub ecs_id: Uuid,
    pub lineage_id: Uuid,

    #[serde(skip, default = "Uuid::new_v4")]
    pub live_id: Uuid,

    pub root_ecs_id: Option<Uuid>,
    #[serde(skip)]
    pub root_live_id: Option<Uuid>,

    pub previous_ecs_id: Option<Uuid>,
    pub old_ecs_id: Option<Uuid>,
    pub old_ids: Vec<Uuid>,

    pub created_at: DateTime<Utc>,
    pub forked_at: DateTime<Utc>,

    #[serde(skip)]
    pub from_storage: bool,

    pub attribute_source: AttributeSource,
}

impl EntityCore {
    /// A brand-new, free-floating entity: fresh `ecs_id`, fresh `lineage_id`,
    /// no root, no history.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            ecs_id: Uuid::new_v4(),
            lineage_id: Uuid::new_v4(),
            live_id: Uuid::new_v4(),
            root_ecs_id: None,
            root_live_id: None,
            previous_ecs_id: None,
            old_ecs_id: None,
            old_ids: Vec::new(),
            created_at: now,
            forked_at: now,
            from_storage: false,
            attribute_source: AttributeSource::new(),
        }
    }

    /// Produce a deep-copy-ready core for a stored entity being materialized
    /// as a live isolated execution copy: fresh `live_id`, `from_storage =
    /// true`, no root live id (the copy is not part of any live tree yet).
    pub fn as_storage_copy(&self) -> Self {
        let mut core = self.clone();
        core.live_id = Uuid::new_v4();
        core.root_live_id = None;
        core.from_storage = true;
        core
    }

    /// `update_identity`: mint a fresh `ecs_id`, push the current one onto
    /// `old_ids`, set `previous_ecs_id`, rewire root pointers, and stamp
    /// `forked_at`. `lineage_id` is never touched.
    ///
    /// Fails with [`EcsError::FrozenEntity`] if this core is a storage copy
    /// whose `live_id` has not been re-issued via [`EntityCore::as_storage_copy`]
    /// followed by a fresh live identity (i.e. `from_storage` is still true).
    pub fn update_identity(
        &mut self,
        new_root_ecs_id: Uuid,
        new_root_live_id: Uuid,
    ) -> EcsResult<()> {
        self.fork(Uuid::new_v4(), new_root_ecs_id, new_root_live_id)
    }

    /// Like [`EntityCore::update_identity`], but the caller supplies the
    /// minted `ecs_id` instead of letting this method generate one.
    /// `version_entity` needs this for the root of a fork batch: the root's
    /// new `ecs_id` must be decided up front so every other forked entity in
    /// the same batch can be told the final `new_root_ecs_id` before the
    /// root itself has actually been rewritten.
    pub fn fork(
        &mut self,
        new_ecs_id: Uuid,
        new_root_ecs_id: Uuid,
        new_root_live_id: Uuid,
    ) -> EcsResult<()> {
        if self.from_storage {
            return Err(EcsError::FrozenEntity {
                ecs_id: self.ecs_id,
                lineage_id: self.lineage_id,
            });
        }
        let old_id = self.ecs_id;
        self.old_ids.push(old_id);
        self.previous_ecs_id = Some(old_id);
        self.ecs_id = new_ecs_id;
        self.root_ecs_id = Some(new_root_ecs_id);
        self.root_live_id = Some(new_root_live_id);
        self.forked_at = Utc::now();
        Ok(())
    }

    /// Lifecycle hook for `detach` (C6): mint a fresh `ecs_id` (recording the
    /// pre-detach one in `old_ids`/`old_ecs_id`/`previous_ecs_id`, same
    /// bookkeeping as [`EntityCore::fork`]) and clear both root pointers —
    /// the entity is now free-floating until `promote_to_root` gives it a
    /// root of its own again.
    pub fn detach(&mut self) -> EcsResult<()> {
        if self.from_storage {
            return Err(EcsError::FrozenEntity {
                ecs_id: self.ecs_id,
                lineage_id: self.lineage_id,
            });
        }
        let old_id = self.ecs_id;
        self.old_ids.push(old_id);
        self.old_ecs_id = Some(old_id);
        self.previous_ecs_id = Some(old_id);
        self.ecs_id = Uuid::new_v4();
        self.root_ecs_id = None;
        self.root_live_id = None;
        self.forked_at = Utc::now();
        Ok(())
    }

    /// Re-point an entity at a (possibly new) tree root without minting a
    /// new `ecs_id` or touching history — used for the nodes in a snapshot
    /// that were *not* structurally modified by a versioning pass but still
    /// belong to a tree whose root identity just changed (`EntityTree::
    /// check_invariants` requires every node to agree with the tree's root,
    /// not just the changed ones).
    pub fn rebind_root(&mut self, new_root_ecs_id: Uuid, new_root_live_id: Uuid) {
        self.root_ecs_id = Some(new_root_ecs_id);
        self.root_live_id = Some(new_root_live_id);
    }

    /// `record_source`: set the provenance token for a scalar field after a
    /// copy/borrow.
    pub fn record_source(&mut self, field: &str, source: ScalarSource) {
        self.attribute_source
            .insert(field.to_string(), FieldSource::Scalar(source));
    }

    /// `record_source` for a list field, element-wise.
    pub fn record_list_source(&mut self, field: &str, sources: Vec<ScalarSource>) {
        self.attribute_source
            .insert(field.to_string(), FieldSource::List(sources));
    }

    /// `record_source` for a map field, per key.
    pub fn record_map_source(&mut self, field: &str, sources: HashMap<String, ScalarSource>) {
        self.attribute_source
            .insert(field.to_string(), FieldSource::Map(sources));
    }
}

impl Default for EntityCore {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for EntityCore {
    fn eq(&self, other: &Self) -> bool {
        self.ecs_id == other.ecs_id
    }
}
impl Eq for EntityCore {}

/// A small helper for `hash_non_entity_attributes`: a stable digest over an
/// ordered sequence of primitive field values. Entity authors feed their
/// schema fields (in schema order) into this in `non_entity_digest`
/// implementations; `None`/NaN are normalized to fixed sentinel writes so
/// that the digest is stable across platforms and across `Option`
/// representations.
#[derive(Default)]
pub struct DigestBuilder {
    hasher: std::collections::hash_map::DefaultHasher,
}

impl DigestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_str(&mut self, s: &str) -> &mut Self {
        s.hash(&mut self.hasher);
        self
    }

    pub fn write_i64(&mut self, v: i64) -> &mut Self {
        v.hash(&mut self.hasher);
        self
    }

    pub fn write_u64(&mut self, v: u64) -> &mut Self {
        v.hash(&mut self.hasher);
        self
    }

    pub fn write_bool(&mut self, v: bool) -> &mut Self {
        v.hash(&mut self.hasher);
        self
    }

    /// Normalizes NaN to a fixed bit pattern so that `f64::NAN != f64::NAN`
    /// does not leak into the digest as nondeterminism.
    pub fn write_f64(&mut self, v: f64) -> &mut Self {
        let bits = if v.is_nan() { 0x7ff8_0000_0000_0000u64 } else { v.to_bits() };
        bits.hash(&mut self.hasher);
        self
    }

    pub fn write_none(&mut self) -> &mut Self {
        0xA5u8.hash(&mut self.hasher);
        self
    }

    pub fn finish(&self) -> u64 {
        self.hasher.finish()
    }
}
