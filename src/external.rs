//! External-interface adapters (component C7).
//!
//! This crate embeds as a library with no wire format, CLI, or environment
//! variables of its own. The contracts below are the thin seam it presents
//! to collaborators that live outside its scope: a callable-registry
//! execution layer, an address resolver, and an observability sink. None of
//! these types do any work on their own — they exist so a host application
//! can plug something in without the core depending on what that something
//! is.

use std::collections::HashMap;

use uuid::Uuid;

use crate::entity::Entity;

/// The semantic classification of an execution result, as handed to the
/// callable-registry adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Creation,
    Mutation,
    Detachment,
}

/// Classify an execution's output relative to the inputs it was given.
///
/// `input_live_ids` is every `live_id` visible to the execution copy before
/// it ran (the input tree, rooted at an execution copy of some entity).
/// `input_root_live_id` is that copy's own `live_id`. Per spec: mutation iff
/// the output is the same live object as an input copy; detachment iff it
/// was reachable from the input tree but wasn't the root; creation
/// otherwise.
pub fn classify_operation(
    output_live_id: Uuid,
    input_root_live_id: Uuid,
    input_live_ids: &[Uuid],
) -> OperationKind {
    if output_live_id == input_root_live_id {
        return OperationKind::Mutation;
    }
    if input_live_ids.contains(&output_live_id) {
        return OperationKind::Detachment;
    }
    OperationKind::Creation
}

/// A resolved attribute lookup: the value at the end of a dotted path, and
/// the `ecs_id` that is its provenance (the entity whose field actually
/// holds the authored value, which may differ from the entity the path
/// started at if the field was borrowed).
#[derive(Debug, Clone)]
pub struct ResolvedAttribute {
    pub value: serde_json::Value,
    pub source_ecs_id: Uuid,
}

/// The address-resolver contract. The dotted-path grammar itself (what
/// `"child.items.0.name"` means) is a resolver concern, out of scope here;
/// this crate only commits to returning a value plus its provenance token
/// once the resolver has walked the path down to a scalar field.
pub trait AddressResolver {
    fn resolve(&self, root_ecs_id: Uuid, path: &str) -> Option<ResolvedAttribute>;
}

/// Lifecycle signals the registry emits at well-defined points. Fire-and-
/// forget: a sink that panics or blocks is a bug in the sink, not something
/// the core guards against — the registry's own correctness never depends
/// on what an observer does with these calls.
pub trait ObservabilitySink: Send + Sync {
    fn entity_registered(&self, root_ecs_id: Uuid, lineage_id: Uuid) {
        let _ = (root_ecs_id, lineage_id);
    }
    fn entity_versioned(&self, lineage_id: Uuid, old_root_ecs_id: Uuid, new_root_ecs_id: Uuid) {
        let _ = (lineage_id, old_root_ecs_id, new_root_ecs_id);
    }
    fn entity_promoted(&self, ecs_id: Uuid, lineage_id: Uuid) {
        let _ = (ecs_id, lineage_id);
    }
    fn entity_detached(&self, ecs_id: Uuid, former_root_ecs_id: Uuid) {
        let _ = (ecs_id, former_root_ecs_id);
    }
    fn entity_attached(&self, ecs_id: Uuid, new_root_ecs_id: Uuid) {
        let _ = (ecs_id, new_root_ecs_id);
    }
}

/// The default sink: every signal becomes a `tracing` event at `debug`
/// level. Always installed; a richer sink can be layered alongside it, it
/// does not replace `tracing`'s own subscriber mechanism.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn entity_registered(&self, root_ecs_id: Uuid, lineage_id: Uuid) {
        tracing::debug!(%root_ecs_id, %lineage_id, "entity registered");
    }
    fn entity_versioned(&self, lineage_id: Uuid, old_root_ecs_id: Uuid, new_root_ecs_id: Uuid) {
        tracing::debug!(%lineage_id, %old_root_ecs_id, %new_root_ecs_id, "entity versioned");
    }
    fn entity_promoted(&self, ecs_id: Uuid, lineage_id: Uuid) {
        tracing::debug!(%ecs_id, %lineage_id, "entity promoted to root");
    }
    fn entity_detached(&self, ecs_id: Uuid, former_root_ecs_id: Uuid) {
        tracing::debug!(%ecs_id, %former_root_ecs_id, "entity detached");
    }
    fn entity_attached(&self, ecs_id: Uuid, new_root_ecs_id: Uuid) {
        tracing::debug!(%ecs_id, %new_root_ecs_id, "entity attached");
    }
}

/// Deep-copy fabrication for the callable-registry adapter: produce an
/// isolated execution copy of a stored entity, field-for-field identical
/// but carrying a fresh `live_id` and `from_storage = true`. This is the
/// same transformation `Registry::get_stored_entity` performs; exposed
/// separately here so an adapter holding only an `&Entity` (already fetched)
/// can fabricate further copies without going back through the registry.
pub fn fabricate_execution_copy(stored: &Entity) -> Entity {
    let mut copy = stored.clone();
    copy.core = copy.core.as_storage_copy();
    copy
}

/// Bookkeeping an adapter can use to build the `input_live_ids` slice for
/// [`classify_operation`]: every live id reachable from an execution copy's
/// tree, keyed by the `ecs_id` it mapped from when the copy was fabricated.
#[derive(Debug, Default, Clone)]
pub struct ExecutionLiveIdMap {
    pub by_ecs_id: HashMap<Uuid, Uuid>,
}

impl ExecutionLiveIdMap {
    pub fn live_ids(&self) -> Vec<Uuid> {
        self.by_ecs_id.values().copied().collect()
    }
}
