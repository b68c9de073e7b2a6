//! The generic [`Entity`] representation and the live arena that backs it.
//!
//! Application state is modeled as entities whose schema-defined fields are
//! held in an ordered attribute map rather than as distinct Rust structs per
//! entity type — mirroring the property-bag entities used throughout this
//! corpus's graph-store code (`Entity(HashMap<BaseUri, serde_json::Value>)`
//! style). An [`AttrValue`] variant self-describes its [`FieldCategory`];
//! entity-reference variants hold the referenced entity's `live_id` rather
//! than an owning pointer, so that cross-entity links never fight the
//! borrow checker — the live graph is an arena of `Arc<Mutex<Entity>>`
//! indexed by `live_id`, exactly the "arena-and-index pattern" called for
//! in the design notes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::edge::{EdgeKind, Slot};
use crate::identity::{DigestBuilder, EntityCore};
use crate::schema::FieldCategory;

/// A schema-typed field value. Primitive payloads are carried as JSON so
/// that arbitrary application data can be stored without a proc-macro
/// derive; entity-bearing variants carry `live_id`s resolved against a
/// [`LiveArena`] by the tree builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AttrValue {
    Primitive(Json),
    Entity(Option<Uuid>),
    OrderedSeq(Vec<Option<Uuid>>),
    UnorderedSet(Vec<Uuid>),
    FixedTuple(Vec<Option<Uuid>>),
    Map(Vec<(String, Option<Uuid>)>),
    /// Opaque payload; treated as primitive for digest purposes. This crate
    /// does not attempt to walk entity references buried inside arbitrary
    /// JSON, so nested entity ids here are invisible to the tree builder;
    /// both places that touch a `MixedOpaque` field (`Entity::child_live_refs`,
    /// `Entity::hash_non_entity_attributes`) log a `tracing::warn!` so the gap
    /// is visible rather than silent.
    MixedOpaque(Json),
}

impl AttrValue {
    pub fn category(&self) -> FieldCategory {
        match self {
            AttrValue::Primitive(_) => FieldCategory::Primitive,
            AttrValue::Entity(_) => FieldCategory::Entity,
            AttrValue::OrderedSeq(_) => FieldCategory::OrderedSeqEntity,
            AttrValue::UnorderedSet(_) => FieldCategory::UnorderedSetEntity,
            AttrValue::FixedTuple(_) => FieldCategory::FixedTupleEntity,
            AttrValue::Map(_) => FieldCategory::MapEntity,
            AttrValue::MixedOpaque(_) => FieldCategory::MixedOpaque,
        }
    }

    /// Feed this value's non-entity content into a digest, in the manner
    /// described for `hash_non_entity_attributes`. Entity-bearing variants
    /// contribute nothing (they are walked structurally instead).
    pub fn feed_digest(&self, name: &str, d: &mut DigestBuilder) {
        d.write_str(name);
        match self {
            AttrValue::Primitive(v) | AttrValue::MixedOpaque(v) => match v {
                Json::Null => {
                    d.write_none();
                }
                Json::Bool(b) => {
                    d.write_bool(*b);
                }
                Json::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        d.write_i64(i);
                    } else {
                        d.write_f64(n.as_f64().unwrap_or(f64::NAN));
                    }
                }
                Json::String(s) => {
                    d.write_str(s);
                }
                other => {
                    d.write_str(&other.to_string());
                }
            },
            AttrValue::Entity(_)
            | AttrValue::OrderedSeq(_)
            | AttrValue::UnorderedSet(_)
            | AttrValue::FixedTuple(_)
            | AttrValue::Map(_) => {}
        }
    }
}

/// A generic entity: identity/provenance (`core`) plus an ordered,
/// schema-typed attribute map. Field order is declaration order and is
/// significant for digesting and for `LIST`/`TUPLE` edge ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub core: EntityCore,
    pub type_name: &'static str,
    fields: Vec<(String, AttrValue)>,
}

impl Entity {
    pub fn new(type_name: &'static str) -> Self {
        Self { core: EntityCore::new(), type_name, fields: Vec::new() }
    }

    pub fn with_field(mut self, name: &str, value: AttrValue) -> Self {
        self.set_field(name, value);
        self
    }

    /// A direct, locally-authored write. Clears any provenance token this
    /// field carried — a value set this way was not borrowed from anywhere,
    /// and the absence of a provenance entry means authored locally. Use
    /// [`crate::lifecycle::borrow_attribute_from`] when the value should
    /// carry provenance instead.
    pub fn set_field(&mut self, name: &str, value: AttrValue) {
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| n == name) {
            slot.1 = value;
        } else {
            self.fields.push((name.to_string(), value));
        }
        self.core.attribute_source.remove(name);
    }

    pub fn field(&self, name: &str) -> Option<&AttrValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut AttrValue> {
        self.fields.iter_mut().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Fields in declaration order, as the differ and digest both require.
    pub fn fields_in_order(&self) -> impl Iterator<Item = &(String, AttrValue)> {
        self.fields.iter()
    }

    /// `hash_non_entity_attributes`: a stable digest over every field whose
    /// declared value is not entity-bearing, in declaration order.
    pub fn hash_non_entity_attributes(&self) -> u64 {
        let mut d = DigestBuilder::new();
        d.write_str(self.type_name);
        for (name, value) in &self.fields {
            match value.category() {
                FieldCategory::Primitive => value.feed_digest(name, &mut d),
                FieldCategory::MixedOpaque => {
                    tracing::warn!(
                        type_name = self.type_name,
                        field = name.as_str(),
                        "digesting mixed-opaque field without walking any entity references it may contain"
                    );
                    value.feed_digest(name, &mut d);
                }
                _ => {}
            }
        }
        d.finish()
    }

    /// Every `(field_name, kind, slot, child_live_id)` tuple this entity's
    /// fields resolve to, in declaration order. `None`-valued slots
    /// (absent container elements / unset single references) are skipped —
    /// they contribute no edge, matching the tree-builder's edge-case
    /// policy for absent container elements.
    pub fn child_live_refs(&self) -> Vec<(String, EdgeKind, Slot, Uuid)> {
        let mut out = Vec::new();
        for (name, value) in &self.fields {
            match value {
                AttrValue::Entity(Some(live_id)) => {
                    out.push((name.clone(), EdgeKind::Direct, Slot::None, *live_id));
                }
                AttrValue::OrderedSeq(items) => {
                    for (i, item) in items.iter().enumerate() {
                        if let Some(live_id) = item {
                            out.push((name.clone(), EdgeKind::List, Slot::Index(i), *live_id));
                        }
                    }
                }
                AttrValue::UnorderedSet(items) => {
                    for live_id in items {
                        out.push((name.clone(), EdgeKind::Set, Slot::None, *live_id));
                    }
                }
                AttrValue::FixedTuple(items) => {
                    for (i, item) in items.iter().enumerate() {
                        if let Some(live_id) = item {
                            out.push((name.clone(), EdgeKind::Tuple, Slot::Index(i), *live_id));
                        }
                    }
                }
                AttrValue::Map(entries) => {
                    for (key, item) in entries {
                        if let Some(live_id) = item {
                            out.push((
                                name.clone(),
                                EdgeKind::Dict,
                                Slot::Key(key.clone()),
                                *live_id,
                            ));
                        }
                    }
                }
                AttrValue::MixedOpaque(_) => {
                    tracing::warn!(
                        field = name.as_str(),
                        "mixed-opaque field may contain entity references that are not walked"
                    );
                }
                AttrValue::Entity(None) | AttrValue::Primitive(_) => {}
            }
        }
        out
    }
}

/// A handle to a live, mutable entity shared between the application and
/// the store's per-process heap. Cloning a handle clones the `Arc`, not the
/// entity.
pub type LiveHandle = Arc<Mutex<Entity>>;

/// The process-wide heap of live entity objects, indexed by `live_id`.
/// Tree construction resolves entity-reference fields through this arena;
/// it holds no opinion about rootedness.
#[derive(Default)]
pub struct LiveArena {
    by_live_id: HashMap<Uuid, LiveHandle>,
}

impl LiveArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, handle: LiveHandle) {
        let live_id = handle.lock().core.live_id;
        self.by_live_id.insert(live_id, handle);
    }

    pub fn get(&self, live_id: Uuid) -> Option<LiveHandle> {
        self.by_live_id.get(&live_id).cloned()
    }

    pub fn untrack(&mut self, live_id: Uuid) {
        self.by_live_id.remove(&live_id);
    }
}
