//! Layer tree: design model, ordering engine and repository.

/// Design, layer and property types.
pub mod model;
/// In-process design repository with per-design write serialization.
pub mod store;
/// Z-order and parentage maintenance.
pub mod tree;
