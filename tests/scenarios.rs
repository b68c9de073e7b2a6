//! End-to-end scenario tests covering multi-step versioning, detach/
//! re-promote, and borrow-then-version provenance survival. Simpler
//! single-step scenarios are covered as unit tests closer to the code they
//! exercise, in `differ.rs` and `registry.rs`.

use std::sync::Arc;

use entity_store::entity::{AttrValue, Entity, LiveArena, LiveHandle};
use entity_store::identity::FieldSource;
use entity_store::lifecycle::{borrow_attribute_from, detach, promote_to_root};
use entity_store::registry::Registry;
use parking_lot::Mutex;
use serde_json::Value as Json;

fn make(type_name: &'static str) -> LiveHandle {
    Arc::new(Mutex::new(Entity::new(type_name)))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().with_env_filter("debug").try_init();
}

/// S4 — multi-step versioning: an attribute change on one subtree followed
/// by an independent attribute change on another. Every invariant holds
/// after each call, and every ancestry-path id exists in `nodes`.
#[test]
fn s4_multi_step_versioning_preserves_invariants() {
    init_tracing();
    let registry = Registry::new();
    let mut arena = LiveArena::new();

    let b = make("B");
    b.lock().set_field("x", AttrValue::Primitive(Json::from(1)));
    let b_live = b.lock().core.live_id;
    arena.track(b.clone());

    let a = make("A");
    a.lock().set_field("child", AttrValue::Entity(Some(b_live)));
    a.lock().set_field("meta", AttrValue::Primitive(Json::String("x".into())));
    arena.track(a.clone());

    promote_to_root(&registry, &arena, a.clone()).unwrap();
    let root_after_first = a.lock().core.ecs_id;
    let tree1 = registry.get_stored_tree(root_after_first).unwrap();
    tree1.check_invariants().unwrap();
    for (ecs_id, path) in &tree1.ancestry_paths {
        assert!(tree1.nodes.contains_key(ecs_id));
        for step in path {
            assert!(tree1.nodes.contains_key(step));
        }
    }

    // S1-shaped mutation.
    b.lock().set_field("x", AttrValue::Primitive(Json::from(2)));
    assert!(registry.version_entity(a.clone(), &arena, false).unwrap());
    let root_after_second = a.lock().core.ecs_id;
    assert_ne!(root_after_second, root_after_first);
    let tree2 = registry.get_stored_tree(root_after_second).unwrap();
    tree2.check_invariants().unwrap();

    // An independent mutation to a different field entirely.
    a.lock().set_field("meta", AttrValue::Primitive(Json::String("y".into())));
    assert!(registry.version_entity(a.clone(), &arena, false).unwrap());
    let root_after_third = a.lock().core.ecs_id;
    assert_ne!(root_after_third, root_after_second);
    let tree3 = registry.get_stored_tree(root_after_third).unwrap();
    tree3.check_invariants().unwrap();
    for (ecs_id, path) in &tree3.ancestry_paths {
        assert!(tree3.nodes.contains_key(ecs_id));
        for step in path {
            assert!(tree3.nodes.contains_key(step));
        }
    }

    let lineage_id = a.lock().core.lineage_id;
    assert_eq!(registry.lineage_history(lineage_id).len(), 3);
}

/// S5 — detachment then re-promotion. `A -> B`; null `A.child`; version `A`;
/// then `B.promote_to_root()`; version `B`.
#[test]
fn s5_detach_then_repromote() {
    init_tracing();
    let registry = Registry::new();
    let mut arena = LiveArena::new();

    let b = make("B");
    let b_live = b.lock().core.live_id;
    arena.track(b.clone());

    let a = make("A");
    a.lock().set_field("child", AttrValue::Entity(Some(b_live)));
    arena.track(a.clone());

    promote_to_root(&registry, &arena, a.clone()).unwrap();
    let a_root_before = a.lock().core.ecs_id;
    let b_ecs_before_detach = b.lock().core.ecs_id;

    // Caller nulls the field reference, then calls detach() and versions A.
    a.lock().set_field("child", AttrValue::Entity(None));
    detach(&registry, &b).unwrap();
    assert!(registry.version_entity(a.clone(), &arena, false).unwrap());

    let a_root_after = a.lock().core.ecs_id;
    assert_ne!(a_root_after, a_root_before);
    let a_tree = registry.get_stored_tree(a_root_after).unwrap();
    assert_eq!(a_tree.node_count(), 1);
    assert!(!a_tree.nodes.contains_key(&b_ecs_before_detach));

    assert!(b.lock().core.old_ids.contains(&b_ecs_before_detach));
    assert_ne!(b.lock().core.ecs_id, b_ecs_before_detach);

    // B re-promotes itself as a fresh root and versions.
    promote_to_root(&registry, &arena, b.clone()).unwrap();
    let b_root_after = b.lock().core.ecs_id;
    let b_tree = registry.get_stored_tree(b_root_after).unwrap();
    assert_eq!(b_tree.root_ecs_id, b_root_after);

    // The old A snapshot (still headed by a_root_before) remains retrievable.
    let old_a_tree = registry.get_stored_tree(a_root_before).unwrap();
    assert!(old_a_tree.nodes.contains_key(&b_ecs_before_detach));
}

/// S6 — borrowing preserves provenance across versioning, and a later
/// direct write clears it.
#[test]
fn s6_borrow_preserves_provenance() {
    init_tracing();
    let registry = Registry::new();
    let mut arena = LiveArena::new();

    let s = make("S");
    s.lock().set_field("gpa", AttrValue::Primitive(Json::from(3.9)));
    arena.track(s.clone());

    let t = make("T");
    arena.track(t.clone());

    borrow_attribute_from(&t, &s, "gpa", "gpa").unwrap();
    assert_eq!(t.lock().field("gpa").map(|v| format!("{v:?}")), s.lock().field("gpa").map(|v| format!("{v:?}")));
    let s_ecs = s.lock().core.ecs_id;
    match t.lock().core.attribute_source.get("gpa") {
        Some(FieldSource::Scalar(Some(id))) => assert_eq!(*id, s_ecs),
        other => panic!("expected scalar provenance, got {other:?}"),
    }

    promote_to_root(&registry, &arena, t.clone()).unwrap();

    // A later, unrelated mutation forces an actual re-fork of T; the
    // provenance token on the untouched "gpa" field must survive it.
    t.lock().set_field("name", AttrValue::Primitive(Json::String("Grace".into())));
    assert!(registry.version_entity(t.clone(), &arena, false).unwrap());
    match t.lock().core.attribute_source.get("gpa") {
        Some(FieldSource::Scalar(Some(id))) => assert_eq!(*id, s_ecs),
        other => panic!("provenance should survive forking, got {other:?}"),
    }

    t.lock().set_field("gpa", AttrValue::Primitive(Json::from(4.0)));
    assert!(t.lock().core.attribute_source.get("gpa").is_none());
}
