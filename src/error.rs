//! Error types for the entity store.
//!
//! Every fallible operation in this crate returns [`EcsError`] rather than
//! panicking. Fatal errors (everything except [`EcsError::NotFound`]) carry
//! whichever of `ecs_id`, `lineage_id`, `root_ecs_id` are known at the point
//! of failure, so that a caller can log enough to find the offending
//! snapshot after the fact.

use uuid::Uuid;

/// Errors produced by tree construction, diffing, and registry operations.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The tree builder encountered a `live_id` it had already visited while
    /// walking the same build. No state is installed.
    #[error("cycle detected while building tree: live_id {live_id} revisited under root {root_ecs_id:?}")]
    CycleDetected {
        live_id: Uuid,
        root_ecs_id: Option<Uuid>,
    },

    /// An entity was reachable from two distinct parents while the registry
    /// was running in strict (non-sharing) mode.
    #[error("entity {ecs_id} is reachable from more than one parent (sharing is disabled)")]
    SharingDetected { ecs_id: Uuid },

    /// Attempted to mutate or re-identify a `from_storage = true` entity
    /// without first re-promoting it.
    #[error("entity {ecs_id} (lineage {lineage_id}) is frozen: call promote_to_root before versioning a storage copy")]
    FrozenEntity { ecs_id: Uuid, lineage_id: Uuid },

    /// A root with this `ecs_id` already exists in the registry.
    #[error("root {root_ecs_id} is already registered")]
    DuplicateRoot { root_ecs_id: Uuid },

    /// A post-rewrite consistency check failed; the operation is rolled
    /// back and no registry state changes.
    #[error("invariant violated after tree rewrite for root {root_ecs_id:?}: {detail}")]
    InvariantViolation {
        root_ecs_id: Option<Uuid>,
        lineage_id: Option<Uuid>,
        detail: String,
    },

    /// Lookup by `ecs_id` / `root_ecs_id` / `lineage_id` found nothing.
    /// Recoverable: callers are expected to handle this as plain absence.
    #[error("not found: {what} {id}")]
    NotFound { what: &'static str, id: Uuid },

    /// Field introspection or attribute hashing hit a type it does not
    /// know how to classify.
    #[error("schema mismatch for entity {ecs_id} (type {type_name}): {detail}")]
    SchemaMismatch {
        ecs_id: Uuid,
        type_name: &'static str,
        detail: String,
    },
}

pub type EcsResult<T> = Result<T, EcsError>;
