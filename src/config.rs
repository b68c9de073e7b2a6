//! Registry configuration.
//!
//! An embedded library has no on-disk config file; the knobs this crate
//! exposes are a small struct passed in at construction rather than pulling
//! in a config-file crate for two booleans.

/// Governs the registry's two configurable behaviors: how it treats a
/// shared entity during a tree build, and how strictly it enforces schema.
#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    /// If true (the default — sharing is forbidden unless explicitly
    /// relaxed), an entity reachable from two distinct parents during a tree
    /// build is rejected with [`crate::error::EcsError::SharingDetected`]. If
    /// false, sharing is tolerated and the second reference is recorded as
    /// an additional edge into the same node.
    pub strict_sharing: bool,

    /// If true (the default), a field whose declared schema category does
    /// not match the value actually stored for it is fatal
    /// ([`crate::error::EcsError::SchemaMismatch`]). If false, the mismatch
    /// is logged at `warn` level via `tracing` and otherwise ignored.
    pub fatal_schema_mismatch: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { strict_sharing: true, fatal_schema_mismatch: true }
    }
}
