//! # entity-store
//!
//! An in-process, typed, versioned entity component store: application
//! state is held as a live graph of [`entity::Entity`] objects, and a call
//! to [`registry::Registry::version_entity`] turns whatever that graph
//! currently looks like into an immutable, content-addressed
//! [`tree::EntityTree`] snapshot. Every entity carries a three-part
//! identity — `ecs_id` (this version), `lineage_id` (this logical entity
//! across every version it has ever had), `live_id` (this in-process heap
//! object, never persisted) — so that a snapshot and the mutable objects
//! that produced it can be told apart without either one lying about what
//! it is.
//!
//! ## Quick start
//!
//! ```rust
//! use entity_store::entity::{AttrValue, Entity, LiveArena};
//! use entity_store::lifecycle::promote_to_root;
//! use entity_store::registry::Registry;
//! use parking_lot::Mutex;
//! use serde_json::Value as Json;
//! use std::sync::Arc;
//!
//! let registry = Registry::new();
//! let mut arena = LiveArena::new();
//!
//! let root = Arc::new(Mutex::new(Entity::new("Student")));
//! root.lock().set_field("name", AttrValue::Primitive(Json::String("Ada".into())));
//! arena.track(root.clone());
//!
//! promote_to_root(&registry, &arena, root.clone()).unwrap();
//!
//! root.lock().set_field("name", AttrValue::Primitive(Json::String("Ada Lovelace".into())));
//! let changed = registry.version_entity(root.clone(), &arena, false).unwrap();
//! assert!(changed);
//! ```
//!
//! ## Module map
//!
//! - [`error`] — the single [`error::EcsError`] type every fallible
//!   operation returns.
//! - [`identity`] — the identity quartet, provenance bookkeeping, and the
//!   stable non-entity-attribute digest (C1).
//! - [`config`] — [`config::RegistryConfig`], the construction-time knobs for
//!   strict sharing and schema-mismatch fatality.
//! - [`schema`] — per-type field classification, cached once per `TypeId`
//!   (C2).
//! - [`edge`] — typed parent/child relations and their identity tuple.
//! - [`entity`] — the generic [`entity::Entity`] attribute bag and the
//!   [`entity::LiveArena`] that backs the live heap.
//! - [`tree`] — [`tree::build_tree`], the BFS that turns a live root into an
//!   immutable [`tree::EntityTree`] (C3).
//! - [`differ`] — [`differ::diff`], the four-phase comparison that decides
//!   which `ecs_id`s a versioning pass must re-issue (C4).
//! - [`registry`] — the snapshot store and [`registry::Registry::version_entity`]
//!   orchestration (C5).
//! - [`lifecycle`] — `promote_to_root`, `attach`, `detach`,
//!   `borrow_attribute_from` (C6).
//! - [`external`] — thin contracts for a callable-registry execution layer,
//!   an address resolver, and observability signals (C7).

pub mod config;
pub mod differ;
pub mod edge;
pub mod entity;
pub mod error;
pub mod external;
pub mod identity;
pub mod lifecycle;
pub mod registry;
pub mod schema;
pub mod tree;

pub use config::RegistryConfig;
pub use edge::{EdgeKind, EntityEdge, Slot};
pub use entity::{AttrValue, Entity, LiveArena, LiveHandle};
pub use error::{EcsError, EcsResult};
pub use identity::EntityCore;
pub use registry::Registry;
pub use tree::EntityTree;
