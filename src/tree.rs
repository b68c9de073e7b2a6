//! Tree builder (component C3).
//!
//! `build_tree` does a single BFS from a root entity, producing an
//! [`EntityTree`]: a node table, a typed edge table, per-node ancestry
//! paths, and the `live_id`/type indexes. Grounded in the same structural
//! shape as this crate's earlier `AdaptiveRadixTree` build — walk outward
//! from a root, populate parallel index maps as you go — generalized here
//! from byte-keyed trie descent to entity-graph BFS.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::RegistryConfig;
use crate::edge::{EdgeKey, EntityEdge};
use crate::entity::{Entity, LiveArena, LiveHandle};
use crate::error::{EcsError, EcsResult};

/// An immutable, rooted snapshot of a subgraph of entities.
///
/// Once built, a tree is never mutated in place — `version_entity` builds a
/// fresh tree and installs it as a new snapshot (see [`crate::registry`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityTree {
    pub root_ecs_id: Uuid,
    pub root_live_id: Uuid,
    pub nodes: HashMap<Uuid, Entity>,
    pub edges: HashMap<EdgeKey, EntityEdge>,
    pub ancestry_paths: HashMap<Uuid, Vec<Uuid>>,
    pub live_id_index: HashMap<Uuid, Uuid>,
    pub type_index: HashMap<&'static str, HashSet<Uuid>>,
}

impl EntityTree {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn max_depth(&self) -> usize {
        self.ancestry_paths.values().map(|p| p.len()).max().unwrap_or(0)
    }

    /// True if any edge (of any kind/slot) runs directly from `parent` to
    /// `child`. Used by ancestry-consistency checks, which care only about
    /// the unkeyed `(parent, child)` relation, not which kind/slot carries it.
    pub fn has_edge_between(&self, parent: Uuid, child: Uuid) -> bool {
        self.edges.keys().any(|(s, t, _, _)| *s == parent && *t == child)
    }

    /// Verify structural consistency: the root is present, every edge's
    /// endpoints resolve to real nodes, every ancestry path starts at the
    /// root and ends at its own id with each step backed by a real edge, and
    /// every node agrees with the tree on its root pointers. Returns the
    /// first violation found, if any, as a descriptive string (used by
    /// `version_entity`'s post-rewrite assertion pass).
    pub fn check_invariants(&self) -> Result<(), String> {
        if !self.nodes.contains_key(&self.root_ecs_id) {
            return Err(format!("root {} missing from nodes", self.root_ecs_id));
        }
        for (s, t, _, _) in self.edges.keys() {
            if !self.nodes.contains_key(s) {
                return Err(format!("edge source {s} missing from nodes"));
            }
            if !self.nodes.contains_key(t) {
                return Err(format!("edge target {t} missing from nodes"));
            }
        }
        for (ecs_id, path) in &self.ancestry_paths {
            if !self.nodes.contains_key(ecs_id) {
                return Err(format!("ancestry path entry {ecs_id} missing from nodes"));
            }
            if path.first() != Some(&self.root_ecs_id) {
                return Err(format!("ancestry path for {ecs_id} does not start at root"));
            }
            if path.last() != Some(ecs_id) {
                return Err(format!("ancestry path for {ecs_id} does not end at itself"));
            }
            for w in path.windows(2) {
                if !self.has_edge_between(w[0], w[1]) {
                    return Err(format!("no edge for ancestry step {} -> {}", w[0], w[1]));
                }
            }
        }
        match self.ancestry_paths.get(&self.root_ecs_id) {
            Some(p) if p.as_slice() == [self.root_ecs_id] => {}
            other => return Err(format!("root ancestry path malformed: {other:?}")),
        }
        for (live_id, ecs_id) in &self.live_id_index {
            if !self.nodes.contains_key(ecs_id) {
                return Err(format!("live_id_index entry {live_id} -> {ecs_id} missing from nodes"));
            }
        }
        for (ecs_id, node) in &self.nodes {
            if node.core.root_ecs_id != Some(self.root_ecs_id) {
                return Err(format!("node {ecs_id} has wrong root_ecs_id"));
            }
            if node.core.root_live_id != Some(self.root_live_id) {
                return Err(format!("node {ecs_id} has wrong root_live_id"));
            }
        }
        Ok(())
    }
}

/// BFS from `root`, resolving entity-reference fields through `arena`,
/// under the default (strict-sharing) [`RegistryConfig`].
///
/// `root`'s core must already satisfy `root_ecs_id == ecs_id` (the caller
/// promotes before building); this function does not promote.
pub fn build_tree(root: LiveHandle, arena: &LiveArena) -> EcsResult<EntityTree> {
    build_tree_with_config(root, arena, &RegistryConfig::default())
}

/// Like [`build_tree`], but `config.strict_sharing` decides whether an
/// entity reachable from two distinct parents is a fatal
/// [`EcsError::SharingDetected`] or just an additional edge into the same
/// node.
pub fn build_tree_with_config(
    root: LiveHandle,
    arena: &LiveArena,
    config: &RegistryConfig,
) -> EcsResult<EntityTree> {
    let (root_ecs_id, root_live_id) = {
        let guard = root.lock();
        (guard.core.ecs_id, guard.core.live_id)
    };

    let mut nodes = HashMap::new();
    let mut edges: HashMap<EdgeKey, EntityEdge> = HashMap::new();
    let mut ancestry_paths = HashMap::new();
    let mut live_id_index = HashMap::new();
    let mut type_index: HashMap<&'static str, HashSet<Uuid>> = HashMap::new();

    let mut visited_live_ids = HashSet::new();
    let mut first_parent_of: HashMap<Uuid, Uuid> = HashMap::new();

    visited_live_ids.insert(root_live_id);
    {
        let guard = root.lock();
        nodes.insert(root_ecs_id, guard.clone());
        live_id_index.insert(root_live_id, root_ecs_id);
        type_index.entry(guard.type_name).or_default().insert(root_ecs_id);
    }
    ancestry_paths.insert(root_ecs_id, vec![root_ecs_id]);

    let mut queue: VecDeque<LiveHandle> = VecDeque::new();
    queue.push_back(root);

    while let Some(parent_handle) = queue.pop_front() {
        let (parent_ecs_id, child_refs) = {
            let guard = parent_handle.lock();
            (guard.core.ecs_id, guard.child_live_refs())
        };
        let parent_path = ancestry_paths
            .get(&parent_ecs_id)
            .expect("every enqueued node has an ancestry path")
            .clone();

        for (field_name, kind, slot, child_live_id) in child_refs {
            let child_handle = arena.get(child_live_id).ok_or(EcsError::NotFound {
                what: "live entity",
                id: child_live_id,
            })?;
            let child_ecs_id = child_handle.lock().core.ecs_id;

            if visited_live_ids.contains(&child_live_id) {
                if parent_path.contains(&child_ecs_id) {
                    return Err(EcsError::CycleDetected {
                        live_id: child_live_id,
                        root_ecs_id: Some(root_ecs_id),
                    });
                }
                if let Some(&existing_parent) = first_parent_of.get(&child_ecs_id) {
                    if existing_parent != parent_ecs_id && config.strict_sharing {
                        return Err(EcsError::SharingDetected { ecs_id: child_ecs_id });
                    }
                }
                edges.insert(
                    (parent_ecs_id, child_ecs_id, kind, slot.clone()),
                    EntityEdge::new(parent_ecs_id, child_ecs_id, kind, slot, Some(field_name)),
                );
                continue;
            }

            visited_live_ids.insert(child_live_id);
            first_parent_of.insert(child_ecs_id, parent_ecs_id);

            {
                let guard = child_handle.lock();
                nodes.insert(child_ecs_id, guard.clone());
                live_id_index.insert(child_live_id, child_ecs_id);
                type_index.entry(guard.type_name).or_default().insert(child_ecs_id);
            }
            let mut child_path = parent_path.clone();
            child_path.push(child_ecs_id);
            ancestry_paths.insert(child_ecs_id, child_path);

            edges.insert(
                (parent_ecs_id, child_ecs_id, kind, slot.clone()),
                EntityEdge::new(parent_ecs_id, child_ecs_id, kind, slot, Some(field_name)),
            );

            queue.push_back(child_handle);
        }
    }

    Ok(EntityTree {
        root_ecs_id,
        root_live_id,
        nodes,
        edges,
        ancestry_paths,
        live_id_index,
        type_index,
    })
}
