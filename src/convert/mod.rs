//! Format conversion: document to delivery artifact.

/// Subprocess-backed converter (rasterizer + transcoder).
pub mod external;
/// Formats, options and the [`format::Converter`] trait.
pub mod format;
/// Recording converter for tests.
pub mod memory;
/// In-process svg/png/jpg converter.
pub mod raster;
