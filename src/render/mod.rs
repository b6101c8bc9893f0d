//! Document rendering: layer tree to format-agnostic primitives, and primitives to SVG.

/// Drawing document and primitive types.
pub mod document;
/// Layer tree to document.
pub mod renderer;
/// Deterministic SVG serialization.
pub mod svg;
