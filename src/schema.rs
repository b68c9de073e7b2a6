//! Field introspection (component C2).
//!
//! A schema classifies each field of an entity type into exactly one
//! [`FieldCategory`]. The classifier is purely schema-driven: an entity
//! type registers its schema once (normally via [`crate::entity::EntityObject::schema`])
//! and the result is cached per `TypeId` in [`SCHEMA_CACHE`] so that
//! classification is computed once, at type-registration time, rather than
//! recomputed on every instance.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;

use crate::entity::Entity;
use crate::error::{EcsError, EcsResult};

/// How a field's declared type classifies for tree-building purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldCategory {
    /// Ignored by the tree builder; included in the non-entity digest.
    Primitive,
    /// Produces a `DIRECT` edge.
    Entity,
    /// Produces `LIST` edges with `index = 0..n-1`.
    OrderedSeqEntity,
    /// Produces `SET` edges keyed by child `ecs_id`.
    UnorderedSetEntity,
    /// Produces `TUPLE` edges with positional index.
    FixedTupleEntity,
    /// Produces `DICT` edges keyed by the stringified map key.
    MapEntity,
    /// Treated as primitive for digest purposes, but any discovered entity
    /// references inside it are still walked as `DIRECT` edges.
    MixedOpaque,
}

/// One entry of an entity type's schema: a field name paired with its
/// classification and (if it references entities) the referenced type's
/// name, for diagnostics only.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    pub name: &'static str,
    pub category: FieldCategory,
    pub referenced_type: Option<&'static str>,
}

impl FieldSchema {
    pub const fn primitive(name: &'static str) -> Self {
        Self { name, category: FieldCategory::Primitive, referenced_type: None }
    }
    pub const fn entity(name: &'static str, referenced_type: &'static str) -> Self {
        Self { name, category: FieldCategory::Entity, referenced_type: Some(referenced_type) }
    }
    pub const fn ordered_seq(name: &'static str, referenced_type: &'static str) -> Self {
        Self {
            name,
            category: FieldCategory::OrderedSeqEntity,
            referenced_type: Some(referenced_type),
        }
    }
    pub const fn unordered_set(name: &'static str, referenced_type: &'static str) -> Self {
        Self {
            name,
            category: FieldCategory::UnorderedSetEntity,
            referenced_type: Some(referenced_type),
        }
    }
    pub const fn fixed_tuple(name: &'static str, referenced_type: &'static str) -> Self {
        Self {
            name,
            category: FieldCategory::FixedTupleEntity,
            referenced_type: Some(referenced_type),
        }
    }
    pub const fn map_entity(name: &'static str, referenced_type: &'static str) -> Self {
        Self { name, category: FieldCategory::MapEntity, referenced_type: Some(referenced_type) }
    }
    pub const fn mixed(name: &'static str) -> Self {
        Self { name, category: FieldCategory::MixedOpaque, referenced_type: None }
    }
}

/// Process-wide cache of entity-type schemas, keyed by `TypeId`.
static SCHEMA_CACHE: Lazy<RwLock<HashMap<TypeId, &'static [FieldSchema]>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Fetch the cached schema for `T`, computing and installing it on first
/// use via `build`. `build` must return a value with `'static` lifetime
/// (typically produced once via `Box::leak` or a `const` slice), matching
/// the "compute once per type" contract.
pub fn cached_schema<T: 'static>(build: impl FnOnce() -> &'static [FieldSchema]) -> &'static [FieldSchema] {
    let type_id = TypeId::of::<T>();
    if let Some(schema) = SCHEMA_CACHE.read().unwrap().get(&type_id) {
        return schema;
    }
    let mut cache = SCHEMA_CACHE.write().unwrap();
    *cache.entry(type_id).or_insert_with(build)
}

/// Check every field `entity` actually carries against its declared
/// `schema`. A field present on the entity but classified differently than
/// its schema entry says is a mismatch; under
/// [`crate::config::RegistryConfig::fatal_schema_mismatch`] that is either a
/// hard [`EcsError::SchemaMismatch`] or, with the flag off, a `tracing::warn!`
/// and otherwise-ignored discrepancy — a degraded "log and continue" path
/// for schema drift rather than refusing the operation outright.
pub fn check_entity_schema(entity: &Entity, schema: &[FieldSchema], fatal_on_mismatch: bool) -> EcsResult<()> {
    for declared in schema {
        let Some(value) = entity.field(declared.name) else { continue };
        if value.category() == declared.category {
            continue;
        }
        let detail = format!(
            "field `{}` declared as {:?} but stored as {:?}",
            declared.name,
            declared.category,
            value.category()
        );
        if fatal_on_mismatch {
            return Err(EcsError::SchemaMismatch {
                ecs_id: entity.core.ecs_id,
                type_name: entity.type_name,
                detail,
            });
        }
        tracing::warn!(ecs_id = %entity.core.ecs_id, type_name = entity.type_name, %detail, "schema mismatch tolerated");
    }
    Ok(())
}
