//! Registry & versioning conductor (component C5).
//!
//! The registry is the durable store: a map from `root_ecs_id` to installed
//! [`EntityTree`] snapshots, plus the secondary indices (`lineage_registry`,
//! `ecs_id_to_root_id`, `type_registry`) that let a caller find a historical
//! version from any of its ids. `version_entity` is the one operation that
//! actually advances a lineage; everything else is either a pure read or a
//! one-time registration.
//!
//! Grounded in the same per-key-locked map-of-maps shape this corpus uses
//! for its storage layer (`parking_lot::RwLock`-guarded indices, one
//! `parking_lot::Mutex` per logical key for serialized writers) rather than
//! a single global lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::config::RegistryConfig;
use crate::entity::{Entity, LiveArena, LiveHandle};
use crate::error::{EcsError, EcsResult};
use crate::external::{ObservabilitySink, TracingSink};
use crate::tree::{build_tree_with_config, EntityTree};

/// The in-memory snapshot store plus its versioning conductor.
pub struct Registry {
    tree_registry: RwLock<HashMap<Uuid, Arc<EntityTree>>>,
    lineage_registry: RwLock<HashMap<Uuid, Vec<Uuid>>>,
    ecs_id_to_root_id: RwLock<HashMap<Uuid, Uuid>>,
    type_registry: RwLock<HashMap<&'static str, HashSet<Uuid>>>,
    lineage_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    sink: Arc<dyn ObservabilitySink>,
    config: RegistryConfig,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_sink(Arc::new(TracingSink))
    }

    pub fn with_sink(sink: Arc<dyn ObservabilitySink>) -> Self {
        Self::with_config_and_sink(RegistryConfig::default(), sink)
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self::with_config_and_sink(config, Arc::new(TracingSink))
    }

    pub fn with_config_and_sink(config: RegistryConfig, sink: Arc<dyn ObservabilitySink>) -> Self {
        Self {
            tree_registry: RwLock::new(HashMap::new()),
            lineage_registry: RwLock::new(HashMap::new()),
            ecs_id_to_root_id: RwLock::new(HashMap::new()),
            type_registry: RwLock::new(HashMap::new()),
            lineage_locks: Mutex::new(HashMap::new()),
            sink,
            config,
        }
    }

    fn lineage_lock(&self, lineage_id: Uuid) -> Arc<Mutex<()>> {
        self.lineage_locks
            .lock()
            .entry(lineage_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Install `tree` under its root id. Fails with [`EcsError::DuplicateRoot`]
    /// if that root is already installed.
    pub fn register_tree(&self, tree: EntityTree) -> EcsResult<()> {
        let root_ecs_id = tree.root_ecs_id;
        {
            let registry = self.tree_registry.read();
            if registry.contains_key(&root_ecs_id) {
                return Err(EcsError::DuplicateRoot { root_ecs_id });
            }
        }

        let lineage_id = tree
            .nodes
            .get(&root_ecs_id)
            .map(|e| e.core.lineage_id)
            .ok_or(EcsError::NotFound { what: "root entity", id: root_ecs_id })?;

        for (ecs_id, entity) in &tree.nodes {
            self.ecs_id_to_root_id.write().insert(*ecs_id, root_ecs_id);
            for old_id in &entity.core.old_ids {
                self.ecs_id_to_root_id.write().insert(*old_id, root_ecs_id);
            }
        }
        for &type_name in tree.type_index.keys() {
            self.type_registry.write().entry(type_name).or_default().insert(lineage_id);
        }
        self.tree_registry.write().insert(root_ecs_id, Arc::new(tree));
        tracing::debug!(%root_ecs_id, %lineage_id, "tree registered");
        self.sink.entity_registered(root_ecs_id, lineage_id);
        Ok(())
    }

    /// A deep copy of a stored entity, with a fresh `live_id`, `from_storage
    /// = true`, and `root_live_id = None` — an isolated execution copy.
    pub fn get_stored_entity(&self, root_ecs_id: Uuid, ecs_id: Uuid) -> EcsResult<Entity> {
        let registry = self.tree_registry.read();
        let tree = registry
            .get(&root_ecs_id)
            .ok_or(EcsError::NotFound { what: "root", id: root_ecs_id })?;
        let stored = tree
            .nodes
            .get(&ecs_id)
            .ok_or(EcsError::NotFound { what: "entity", id: ecs_id })?;
        let mut copy = stored.clone();
        copy.core = copy.core.as_storage_copy();
        Ok(copy)
    }

    /// An immutable handle to an installed tree. Cloning the `Arc` is cheap;
    /// the tree itself is never mutated in place.
    pub fn get_stored_tree(&self, root_ecs_id: Uuid) -> EcsResult<Arc<EntityTree>> {
        self.tree_registry
            .read()
            .get(&root_ecs_id)
            .cloned()
            .ok_or(EcsError::NotFound { what: "root", id: root_ecs_id })
    }

    /// The most recently installed root for any historical `ecs_id` that
    /// ever belonged to a lineage — `ecs_id_to_root_id` is always overwritten
    /// on each `register_tree`, so it tracks the latest installed root.
    pub fn current_root_for(&self, ecs_id: Uuid) -> Option<Uuid> {
        self.ecs_id_to_root_id.read().get(&ecs_id).copied()
    }

    pub fn lineage_history(&self, lineage_id: Uuid) -> Vec<Uuid> {
        self.lineage_registry.read().get(&lineage_id).cloned().unwrap_or_default()
    }

    /// Surface a lifecycle signal that originates in [`crate::lifecycle`]
    /// rather than inside `version_entity`/`register_tree` themselves.
    pub fn notify_promoted(&self, ecs_id: Uuid, lineage_id: Uuid) {
        tracing::info!(%ecs_id, %lineage_id, "entity promoted to root");
        self.sink.entity_promoted(ecs_id, lineage_id);
    }
    pub fn notify_detached(&self, ecs_id: Uuid, former_root_ecs_id: Uuid) {
        tracing::info!(%ecs_id, root_ecs_id = %former_root_ecs_id, "entity detached");
        self.sink.entity_detached(ecs_id, former_root_ecs_id);
    }
    pub fn notify_attached(&self, ecs_id: Uuid, new_root_ecs_id: Uuid) {
        tracing::info!(%ecs_id, root_ecs_id = %new_root_ecs_id, "entity attached");
        self.sink.entity_attached(ecs_id, new_root_ecs_id);
    }

    /// The central versioning orchestration. Builds a fresh
    /// tree from `live_root`'s current in-memory state, diffs it against
    /// whatever is currently installed for this lineage, forks exactly the
    /// ids the differ names, rewrites the tree's index maps to match, and
    /// installs the result as a new version. Returns `false` (no-op, no
    /// registry change) if nothing differs and `force` is not set.
    pub fn version_entity(&self, live_root: LiveHandle, arena: &LiveArena, force: bool) -> EcsResult<bool> {
        let (current_ecs_id, lineage_id) = {
            let guard = live_root.lock();
            (guard.core.ecs_id, guard.core.lineage_id)
        };
        let lock = self.lineage_lock(lineage_id);
        let _serialize = lock.lock();

        let old_root_id = self.locate_old_root(current_ecs_id, lineage_id);

        let new_tree = build_tree_with_config(live_root.clone(), arena, &self.config)?;

        let Some(old_root_id) = old_root_id else {
            // First registration for this lineage: nothing to diff against.
            self.register_tree(new_tree)?;
            self.lineage_registry.write().entry(lineage_id).or_default().push(current_ecs_id);
            return Ok(true);
        };

        let old_tree = self.get_stored_tree(old_root_id)?;
        let modified = crate::differ::diff(&old_tree, &new_tree);
        if modified.is_empty() && !force {
            return Ok(false);
        }

        let new_root_ecs_id = Uuid::new_v4();
        let new_root_live_id = new_tree.root_live_id;

        let fork_set: HashSet<Uuid> = if modified.is_empty() {
            // `force` with no structural change: bump the root's version
            // marker without touching any other node.
            std::iter::once(new_tree.root_ecs_id).collect()
        } else {
            modified
        };

        let mut id_mapping: HashMap<Uuid, Uuid> = HashMap::new();
        id_mapping.insert(new_tree.root_ecs_id, new_root_ecs_id);
        for &old_id in &fork_set {
            id_mapping.entry(old_id).or_insert_with(Uuid::new_v4);
        }

        let rewritten = rewrite_tree(&new_tree, &id_mapping, &fork_set, new_root_ecs_id, new_root_live_id);

        rewritten.check_invariants().map_err(|detail| EcsError::InvariantViolation {
            root_ecs_id: Some(new_root_ecs_id),
            lineage_id: Some(lineage_id),
            detail,
        })?;

        // Commit: the rewritten tree has already been validated above, so
        // only now do we touch the live objects — copy-then-swap, never
        // leaving live state forked without a corresponding installed tree.
        for (&live_id, &old_id) in &new_tree.live_id_index {
            let Some(handle) = arena.get(live_id) else { continue };
            let mut guard = handle.lock();
            if let Some(&new_id) = id_mapping.get(&old_id) {
                guard.core.fork(new_id, new_root_ecs_id, new_root_live_id)?;
            } else {
                guard.core.rebind_root(new_root_ecs_id, new_root_live_id);
            }
        }

        self.register_tree(rewritten)?;
        self.lineage_registry.write().entry(lineage_id).or_default().push(new_root_ecs_id);
        tracing::info!(%lineage_id, old_root_ecs_id = %old_root_id, new_root_ecs_id = %new_root_ecs_id, "entity versioned");
        self.sink.entity_versioned(lineage_id, old_root_id, new_root_ecs_id);
        Ok(true)
    }

    /// Find the root a live entity's current or historical `ecs_id` belongs
    /// to. Falls back to the lineage's most recent installed root (the
    /// re-promotion case: the live object's `ecs_id` may be fresh and
    /// unknown to the registry, but its `lineage_id` is not).
    fn locate_old_root(&self, current_ecs_id: Uuid, lineage_id: Uuid) -> Option<Uuid> {
        if let Some(root) = self.current_root_for(current_ecs_id) {
            return Some(root);
        }
        self.lineage_registry.read().get(&lineage_id).and_then(|v| v.last().copied())
    }
}

/// Produce the rewritten tree: every occurrence of an old id named in
/// `id_mapping` is replaced by its new id across `nodes` (keys), `edges`
/// (keys and endpoints), `ancestry_paths` (keys and every path element),
/// `live_id_index`, and `type_index`; `root_ecs_id` is updated to match.
/// Nodes not in `id_mapping` keep their `ecs_id` but still have their
/// `root_ecs_id`/`root_live_id` rebound, since every node in the tree must
/// agree with it on the root, not only the ones that were forked.
fn rewrite_tree(
    tree: &EntityTree,
    id_mapping: &HashMap<Uuid, Uuid>,
    forked: &HashSet<Uuid>,
    new_root_ecs_id: Uuid,
    new_root_live_id: Uuid,
) -> EntityTree {
    let remap = |id: Uuid| *id_mapping.get(&id).unwrap_or(&id);

    let mut nodes = HashMap::with_capacity(tree.nodes.len());
    for (&old_id, entity) in &tree.nodes {
        let mut entity = entity.clone();
        let new_id = remap(old_id);
        if forked.contains(&old_id) {
            entity.core.old_ids.push(old_id);
            entity.core.previous_ecs_id = Some(old_id);
            entity.core.ecs_id = new_id;
        }
        entity.core.root_ecs_id = Some(new_root_ecs_id);
        entity.core.root_live_id = Some(new_root_live_id);
        nodes.insert(new_id, entity);
    }

    let mut edges = HashMap::with_capacity(tree.edges.len());
    for edge in tree.edges.values() {
        let mut edge = edge.clone();
        edge.source_ecs_id = remap(edge.source_ecs_id);
        edge.target_ecs_id = remap(edge.target_ecs_id);
        let key = (edge.source_ecs_id, edge.target_ecs_id, edge.kind, edge.slot.clone());
        edges.insert(key, edge);
    }

    let mut ancestry_paths = HashMap::with_capacity(tree.ancestry_paths.len());
    for (&old_id, path) in &tree.ancestry_paths {
        let new_path: Vec<Uuid> = path.iter().map(|&id| remap(id)).collect();
        ancestry_paths.insert(remap(old_id), new_path);
    }

    let mut live_id_index = HashMap::with_capacity(tree.live_id_index.len());
    for (&live_id, &old_ecs_id) in &tree.live_id_index {
        live_id_index.insert(live_id, remap(old_ecs_id));
    }

    let mut type_index: HashMap<&'static str, HashSet<Uuid>> = HashMap::with_capacity(tree.type_index.len());
    for (&type_name, ids) in &tree.type_index {
        type_index.insert(type_name, ids.iter().map(|&id| remap(id)).collect());
    }

    EntityTree {
        root_ecs_id: new_root_ecs_id,
        root_live_id: new_root_live_id,
        nodes,
        edges,
        ancestry_paths,
        live_id_index,
        type_index,
    }
}
