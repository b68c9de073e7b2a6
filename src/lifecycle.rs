//! Lifecycle operations (component C6): `promote_to_root`, `attach`,
//! `detach`, and `borrow_attribute_from`.
//!
//! These are the operations an application calls between mutating live
//! entities and calling `version_entity` — they change an entity's place in
//! the root/lineage structure, not its content. Each one is a thin,
//! directly-testable wrapper around the identity bookkeeping in
//! [`crate::identity::EntityCore`] and the registry's indices.

use uuid::Uuid;

use crate::entity::{AttrValue, LiveArena, LiveHandle};
use crate::error::{EcsError, EcsResult};
use crate::registry::Registry;

/// `promote_to_root(e)`: requires `e.root_ecs_id` is null or equal to
/// `e.ecs_id`. Idempotent if `e` is already a root. Builds and installs an
/// initial tree via [`Registry::version_entity`]'s first-registration path.
pub fn promote_to_root(registry: &Registry, arena: &LiveArena, e: LiveHandle) -> EcsResult<()> {
    let (ecs_id, live_id, root_ecs_id, lineage_id) = {
        let guard = e.lock();
        (guard.core.ecs_id, guard.core.live_id, guard.core.root_ecs_id, guard.core.lineage_id)
    };

    if let Some(root) = root_ecs_id {
        if root == ecs_id {
            return Ok(());
        }
        return Err(EcsError::InvariantViolation {
            root_ecs_id: Some(root),
            lineage_id: Some(lineage_id),
            detail: "promote_to_root requires root_ecs_id to be null or equal to ecs_id".into(),
        });
    }

    {
        let mut guard = e.lock();
        guard.core.root_ecs_id = Some(ecs_id);
        guard.core.root_live_id = Some(live_id);
    }
    registry.version_entity(e.clone(), arena, false)?;
    tracing::debug!(%ecs_id, %lineage_id, "promote_to_root");
    registry.notify_promoted(ecs_id, lineage_id);
    Ok(())
}

/// `attach(e, new_parent_root)`: requires `new_parent_root` is itself a
/// root. Points `e` at the new root. If `e` was previously a root in its
/// own right, its old root snapshot is retained (still installed under its
/// old id) but superseded: `e` mints a fresh `ecs_id`, recording the old one
/// in `old_ids`. The caller is expected to have already set the field
/// reference on the new parent before calling `version_entity` on it —
/// `attach` only updates `e`'s own bookkeeping.
pub fn attach(registry: &Registry, e: &LiveHandle, new_parent_root: &LiveHandle) -> EcsResult<()> {
    let (parent_root_ecs_id, parent_root_live_id, parent_is_root) = {
        let guard = new_parent_root.lock();
        (
            guard.core.root_ecs_id,
            guard.core.root_live_id,
            guard.core.root_ecs_id == Some(guard.core.ecs_id),
        )
    };
    if !parent_is_root {
        let ecs_id = new_parent_root.lock().core.ecs_id;
        return Err(EcsError::InvariantViolation {
            root_ecs_id: parent_root_ecs_id,
            lineage_id: None,
            detail: format!("attach requires new_parent_root to be a root, got {ecs_id}"),
        });
    }
    let parent_root_ecs_id = parent_root_ecs_id.expect("checked above");
    let parent_root_live_id = parent_root_live_id.expect("checked above");

    let mut guard = e.lock();
    let was_root = guard.core.root_ecs_id == Some(guard.core.ecs_id);
    if was_root {
        let old_id = guard.core.ecs_id;
        guard.core.old_ids.push(old_id);
        guard.core.previous_ecs_id = Some(old_id);
        guard.core.ecs_id = Uuid::new_v4();
    }
    guard.core.root_ecs_id = Some(parent_root_ecs_id);
    guard.core.root_live_id = Some(parent_root_live_id);
    let ecs_id = guard.core.ecs_id;
    drop(guard);

    tracing::debug!(%ecs_id, root_ecs_id = %parent_root_ecs_id, "attach");
    registry.notify_attached(ecs_id, parent_root_ecs_id);
    Ok(())
}

/// `detach(e)`: requires `e` is non-root. Mints a fresh `ecs_id` (the
/// pre-detach one is appended to `old_ids`/`old_ecs_id`) and clears both
/// root pointers. The caller is expected to have already nulled the field
/// reference on the former parent; the next `version_entity` of that parent
/// picks up the removal. `e` itself is left free-floating until a
/// subsequent `promote_to_root` or `attach`.
pub fn detach(registry: &Registry, e: &LiveHandle) -> EcsResult<()> {
    let mut guard = e.lock();
    let is_root = guard.core.root_ecs_id == Some(guard.core.ecs_id);
    if is_root {
        return Err(EcsError::InvariantViolation {
            root_ecs_id: guard.core.root_ecs_id,
            lineage_id: Some(guard.core.lineage_id),
            detail: "detach requires a non-root entity".into(),
        });
    }
    let former_root_ecs_id = guard.core.root_ecs_id;
    guard.core.detach()?;
    let ecs_id = guard.core.ecs_id;
    drop(guard);

    if let Some(former_root_ecs_id) = former_root_ecs_id {
        tracing::debug!(%ecs_id, root_ecs_id = %former_root_ecs_id, "detach");
        registry.notify_detached(ecs_id, former_root_ecs_id);
    }
    Ok(())
}

/// `borrow_attribute_from(target, source, source_field, target_field)`:
/// copies `source.source_field`'s value into `target.target_field` and
/// records provenance (per spec, element-wise for `LIST`/`MAP` fields,
/// scalar otherwise) as the source's `ecs_id`. Copying is deep for value
/// types (the cloned `AttrValue` owns its own JSON payload) and
/// reference-preserving for entity-bearing fields (only the `live_id` is
/// copied, so the structural change this creates is picked up by the
/// differ on the next `version_entity`, not by this function).
pub fn borrow_attribute_from(
    target: &LiveHandle,
    source: &LiveHandle,
    source_field: &str,
    target_field: &str,
) -> EcsResult<()> {
    let (value, source_ecs_id, source_type_name) = {
        let guard = source.lock();
        let value = guard.field(source_field).cloned().ok_or_else(|| EcsError::SchemaMismatch {
            ecs_id: guard.core.ecs_id,
            type_name: guard.type_name,
            detail: format!("no such field `{source_field}`"),
        })?;
        (value, guard.core.ecs_id, guard.type_name)
    };
    let _ = source_type_name;

    let mut guard = target.lock();
    match &value {
        AttrValue::OrderedSeq(items) | AttrValue::FixedTuple(items) => {
            let sources = items.iter().map(|_| Some(source_ecs_id)).collect();
            guard.core.record_list_source(target_field, sources);
        }
        AttrValue::Map(entries) => {
            let sources = entries.iter().map(|(k, _)| (k.clone(), Some(source_ecs_id))).collect();
            guard.core.record_map_source(target_field, sources);
        }
        AttrValue::UnorderedSet(items) => {
            let sources = items.iter().map(|_| Some(source_ecs_id)).collect();
            guard.core.record_list_source(target_field, sources);
        }
        AttrValue::Entity(_) | AttrValue::Primitive(_) | AttrValue::MixedOpaque(_) => {
            guard.core.record_source(target_field, Some(source_ecs_id));
        }
    }
    guard.set_field(target_field, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::identity::FieldSource;
    use parking_lot::Mutex;
    use serde_json::Value as Json;
    use std::sync::Arc;

    fn make(type_name: &'static str) -> LiveHandle {
        Arc::new(Mutex::new(Entity::new(type_name)))
    }

    #[test]
    fn promote_to_root_is_idempotent() {
        let registry = Registry::new();
        let mut arena = LiveArena::new();
        let a = make("A");
        arena.track(a.clone());

        promote_to_root(&registry, &arena, a.clone()).unwrap();
        let ecs_after_first = a.lock().core.ecs_id;
        promote_to_root(&registry, &arena, a.clone()).unwrap();
        assert_eq!(a.lock().core.ecs_id, ecs_after_first);
    }

    #[test]
    fn attach_requires_a_root_parent_and_reissues_a_formerly_root_child() {
        let registry = Registry::new();
        let mut arena = LiveArena::new();

        let parent = make("Parent");
        arena.track(parent.clone());
        promote_to_root(&registry, &arena, parent.clone()).unwrap();

        let child = make("Child");
        arena.track(child.clone());
        promote_to_root(&registry, &arena, child.clone()).unwrap();
        let child_ecs_before = child.lock().core.ecs_id;

        attach(&registry, &child, &parent).unwrap();
        assert_ne!(child.lock().core.ecs_id, child_ecs_before);
        assert!(child.lock().core.old_ids.contains(&child_ecs_before));
        assert_eq!(child.lock().core.root_ecs_id, Some(parent.lock().core.ecs_id));

        let not_a_root = make("NotARoot");
        arena.track(not_a_root.clone());
        let err = attach(&registry, &child, &not_a_root).unwrap_err();
        assert!(matches!(err, EcsError::InvariantViolation { .. }));
    }

    #[test]
    fn detach_requires_non_root() {
        let registry = Registry::new();
        let a = make("A");
        let self_id = a.lock().core.ecs_id;
        a.lock().core.root_ecs_id = Some(self_id);
        let err = detach(&registry, &a).unwrap_err();
        assert!(matches!(err, EcsError::InvariantViolation { .. }));
    }

    #[test]
    fn borrow_attribute_from_records_scalar_provenance() {
        let source = make("Source");
        source.lock().set_field("gpa", AttrValue::Primitive(Json::from(3.9)));
        let target = make("Target");

        borrow_attribute_from(&target, &source, "gpa", "gpa").unwrap();

        let t = target.lock();
        assert!(matches!(t.field("gpa"), Some(AttrValue::Primitive(_))));
        let source_ecs = source.lock().core.ecs_id;
        match t.core.attribute_source.get("gpa") {
            Some(FieldSource::Scalar(Some(id))) => assert_eq!(*id, source_ecs),
            other => panic!("expected scalar provenance, got {other:?}"),
        }
    }

    #[test]
    fn borrow_attribute_from_records_per_element_provenance_for_lists() {
        let source = make("Source");
        let x = Uuid::new_v4();
        let y = Uuid::new_v4();
        source.lock().set_field("items", AttrValue::OrderedSeq(vec![Some(x), Some(y)]));
        let target = make("Target");

        borrow_attribute_from(&target, &source, "items", "items").unwrap();

        let t = target.lock();
        let source_ecs = source.lock().core.ecs_id;
        match t.core.attribute_source.get("items") {
            Some(FieldSource::List(sources)) => {
                assert_eq!(sources.len(), 2);
                assert!(sources.iter().all(|s| *s == Some(source_ecs)));
            }
            other => panic!("expected list provenance, got {other:?}"),
        }
    }
}
