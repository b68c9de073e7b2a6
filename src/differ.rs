//! Differ (component C4).
//!
//! Given an `old_tree` and a `new_tree` built from the same lineage's live
//! root (built *before* any forking has happened, so every entity that
//! hasn't structurally changed still shares its `ecs_id` across both
//! trees), `diff` computes the smallest set of `ecs_id`s that must be
//! re-issued for the new snapshot to be installed without leaving any node
//! carrying stale data.
//!
//! All three marking phases below funnel through [`mark_ancestry`], which
//! walks a node's full ancestry path in `new_tree` but only actually marks
//! the steps that also exist in `old_tree` — a pure addition already carries
//! a fresh `ecs_id` of its own, so marking it would be redundant; what
//! actually needs re-issuing is its ancestors, since they now point at a
//! child they didn't have before.

use std::cmp::Reverse;
use std::collections::HashSet;

use uuid::Uuid;

use crate::tree::EntityTree;

/// Counts surfaced for observability; not part of the differ's contract.
#[derive(Debug, Default, Clone, Copy)]
pub struct DifferStats {
    pub additions: usize,
    pub removals: usize,
    pub changed_edges: usize,
    pub attribute_changes_checked: usize,
    pub attribute_changes_found: usize,
}

fn mark_ancestry(new_tree: &EntityTree, old_ids: &HashSet<Uuid>, id: Uuid, marked: &mut HashSet<Uuid>) {
    if let Some(path) = new_tree.ancestry_paths.get(&id) {
        for &p in path {
            if old_ids.contains(&p) {
                marked.insert(p);
            }
        }
    }
}

/// The four-phase diff: structural additions, edge changes, and leaves-first
/// attribute comparison, each phase marking the ancestors of whatever it
/// finds changed. Returns the set of `ecs_id`s (valid in `new_tree`, since
/// they are still unforked at this point) that `version_entity` must
/// re-issue.
pub fn diff(old_tree: &EntityTree, new_tree: &EntityTree) -> HashSet<Uuid> {
    diff_with_stats(old_tree, new_tree).0
}

pub fn diff_with_stats(old_tree: &EntityTree, new_tree: &EntityTree) -> (HashSet<Uuid>, DifferStats) {
    let old_ids: HashSet<Uuid> = old_tree.nodes.keys().copied().collect();
    let new_ids: HashSet<Uuid> = new_tree.nodes.keys().copied().collect();
    let mut marked = HashSet::new();
    let mut stats = DifferStats::default();

    // Phase 1: structural delta (fast path) — additions' ancestors.
    for id in new_ids.difference(&old_ids) {
        stats.additions += 1;
        mark_ancestry(new_tree, &old_ids, *id, &mut marked);
    }
    stats.removals = old_ids.difference(&new_ids).count();

    // Phase 2: edge delta.
    let old_edge_keys: HashSet<_> = old_tree.edges.keys().cloned().collect();
    let new_edge_keys: HashSet<_> = new_tree.edges.keys().cloned().collect();
    for (s, t, _, _) in old_edge_keys.symmetric_difference(&new_edge_keys) {
        stats.changed_edges += 1;
        mark_ancestry(new_tree, &old_ids, *s, &mut marked);
        mark_ancestry(new_tree, &old_ids, *t, &mut marked);
    }

    // Phase 3: attribute delta, leaves-first with ancestor pruning.
    let mut common: Vec<Uuid> = new_ids.intersection(&old_ids).copied().collect();
    common.sort_by_key(|id| Reverse(new_tree.ancestry_paths.get(id).map(|p| p.len()).unwrap_or(0)));
    for id in common {
        let path = match new_tree.ancestry_paths.get(&id) {
            Some(p) => p,
            None => continue,
        };
        let ancestors = &path[..path.len().saturating_sub(1)];
        if ancestors.iter().any(|a| marked.contains(a)) {
            continue;
        }
        stats.attribute_changes_checked += 1;
        let old_node = &old_tree.nodes[&id];
        let new_node = &new_tree.nodes[&id];
        // A different lineage_id at the same node position is always a real
        // difference even if the non-entity digest happens to collide.
        let differs = old_node.core.lineage_id != new_node.core.lineage_id
            || old_node.hash_non_entity_attributes() != new_node.hash_non_entity_attributes();
        if differs {
            stats.attribute_changes_found += 1;
            mark_ancestry(new_tree, &old_ids, id, &mut marked);
        }
    }

    (marked, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{AttrValue, Entity, LiveArena, LiveHandle};
    use crate::tree::build_tree;
    use parking_lot::Mutex;
    use serde_json::Value as Json;
    use std::sync::Arc;

    fn make(type_name: &'static str) -> LiveHandle {
        Arc::new(Mutex::new(Entity::new(type_name)))
    }

    fn promote(root: &LiveHandle) {
        let (ecs, live) = {
            let g = root.lock();
            (g.core.ecs_id, g.core.live_id)
        };
        let mut g = root.lock();
        g.core.root_ecs_id = Some(ecs);
        g.core.root_live_id = Some(live);
    }

    /// S1 — single attribute change: root A, child B(x=1) -> B(x=2).
    #[test]
    fn s1_single_attribute_change_marks_root_and_child() {
        let mut arena = LiveArena::new();
        let b = make("B");
        b.lock().set_field("x", AttrValue::Primitive(Json::from(1)));
        let b_live = b.lock().core.live_id;
        arena.track(b.clone());

        let a = make("A");
        promote(&a);
        a.lock().set_field("child", AttrValue::Entity(Some(b_live)));
        arena.track(a.clone());

        let old_tree = build_tree(a.clone(), &arena).unwrap();

        b.lock().set_field("x", AttrValue::Primitive(Json::from(2)));
        let new_tree = build_tree(a.clone(), &arena).unwrap();

        let modified = diff(&old_tree, &new_tree);
        let b_ecs = old_tree.nodes.keys().find(|id| **id != old_tree.root_ecs_id).copied().unwrap();
        assert!(modified.contains(&old_tree.root_ecs_id));
        assert!(modified.contains(&b_ecs));
        assert_eq!(modified.len(), 2);
    }

    /// S2 — add leaf: A.items = [B] -> [B, C].
    #[test]
    fn s2_add_leaf_marks_only_parent() {
        let mut arena = LiveArena::new();
        let b = make("B");
        let b_live = b.lock().core.live_id;
        arena.track(b.clone());

        let a = make("A");
        promote(&a);
        a.lock().set_field("items", AttrValue::OrderedSeq(vec![Some(b_live)]));
        arena.track(a.clone());

        let old_tree = build_tree(a.clone(), &arena).unwrap();

        let c = make("C");
        let c_live = c.lock().core.live_id;
        arena.track(c.clone());
        a.lock().set_field("items", AttrValue::OrderedSeq(vec![Some(b_live), Some(c_live)]));

        let new_tree = build_tree(a.clone(), &arena).unwrap();
        let modified = diff(&old_tree, &new_tree);

        assert_eq!(modified.len(), 1);
        assert!(modified.contains(&old_tree.root_ecs_id));
    }

    /// S3 — reorder list: [B, C] -> [C, B] marks A, B, and C.
    #[test]
    fn s3_reorder_marks_all_three() {
        let mut arena = LiveArena::new();
        let b = make("B");
        let b_live = b.lock().core.live_id;
        arena.track(b.clone());
        let c = make("C");
        let c_live = c.lock().core.live_id;
        arena.track(c.clone());

        let a = make("A");
        promote(&a);
        a.lock().set_field("items", AttrValue::OrderedSeq(vec![Some(b_live), Some(c_live)]));
        arena.track(a.clone());

        let old_tree = build_tree(a.clone(), &arena).unwrap();

        a.lock().set_field("items", AttrValue::OrderedSeq(vec![Some(c_live), Some(b_live)]));
        let new_tree = build_tree(a.clone(), &arena).unwrap();

        let modified = diff(&old_tree, &new_tree);
        assert_eq!(modified.len(), 3);
    }

    #[test]
    fn no_op_versioning_marks_nothing() {
        let mut arena = LiveArena::new();
        let a = make("A");
        promote(&a);
        a.lock().set_field("name", AttrValue::Primitive(Json::String("x".into())));
        arena.track(a.clone());

        let t1 = build_tree(a.clone(), &arena).unwrap();
        let t2 = build_tree(a.clone(), &arena).unwrap();
        assert!(diff(&t1, &t2).is_empty());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::entity::{AttrValue, Entity, LiveArena, LiveHandle};
    use crate::tree::build_tree;
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use serde_json::Value as Json;
    use std::sync::Arc;

    fn root_with_child_value(value: i64) -> (LiveHandle, LiveHandle, LiveArena) {
        let mut arena = LiveArena::new();
        let child = Arc::new(Mutex::new(Entity::new("Child")));
        child.lock().set_field("x", AttrValue::Primitive(Json::from(value)));
        let child_live = child.lock().core.live_id;
        arena.track(child.clone());

        let root = Arc::new(Mutex::new(Entity::new("Root")));
        let (ecs, live) = {
            let g = root.lock();
            (g.core.ecs_id, g.core.live_id)
        };
        {
            let mut g = root.lock();
            g.core.root_ecs_id = Some(ecs);
            g.core.root_live_id = Some(live);
            g.set_field("child", AttrValue::Entity(Some(child_live)));
        }
        arena.track(root.clone());
        (root, child, arena)
    }

    proptest! {
        /// Identity conservation + minimality: a scalar leaf change always
        /// marks exactly {root, child} for re-issue, and an unchanged value
        /// always marks nothing, regardless of the concrete values chosen.
        #[test]
        fn scalar_leaf_change_marks_exactly_root_and_child(a in any::<i64>(), b in any::<i64>()) {
            let (root, _child, arena) = root_with_child_value(a);
            let old_tree = build_tree(root.clone(), &arena).unwrap();

            let child_live_id = *old_tree
                .live_id_index
                .iter()
                .find(|(_, ecs)| **ecs != old_tree.root_ecs_id)
                .map(|(live, _)| live)
                .unwrap();
            let child_handle = arena.get(child_live_id).unwrap();
            child_handle.lock().set_field("x", AttrValue::Primitive(Json::from(b)));

            let new_tree = build_tree(root.clone(), &arena).unwrap();
            let modified = diff(&old_tree, &new_tree);

            if a == b {
                prop_assert!(modified.is_empty());
            } else {
                prop_assert_eq!(modified.len(), 2);
                prop_assert!(modified.contains(&old_tree.root_ecs_id));
            }
        }
    }
}
