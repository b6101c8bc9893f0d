//! Stratum renders layered designs into vector documents and exports them as images, PDFs and
//! videos.
//!
//! The pipeline has four stages:
//!
//! - Edit a [`Design`]: a canvas plus an arena of layers with parentage and contiguous z-order
//! - Render it into a deterministic [`Document`] and serialize that with [`to_svg`]
//! - Convert the document with a [`Converter`] (external programs, the built-in rasterizer, or
//!   an in-memory recorder for tests)
//! - Drive conversions as export jobs through an [`ExportController`] and a [`WorkerPool`]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Runtime configuration.
pub mod config;
/// Document to artifact conversion.
pub mod convert;
/// Design model and layer tree.
pub mod design;
/// Export job pipeline.
pub mod export;
/// Design to document rendering.
pub mod render;
/// Artifact storage.
pub mod storage;

pub use crate::foundation::core::{
    Affine, Canvas, DesignId, JobId, LayerId, Point, Rect, Size, Vec2, is_valid_color,
};
pub use crate::foundation::error::{StratumError, StratumResult};

pub use crate::config::{ConfigOverrides, Engine, StratumConfig};
pub use crate::convert::external::ExternalConverter;
pub use crate::convert::format::{
    ArtifactHandle, ConvertOptions, ConvertRequest, Converter, ExportFormat, QualityTier,
};
pub use crate::convert::memory::{InMemoryConverter, ScriptedFailure};
pub use crate::convert::raster::RasterConverter;
pub use crate::design::model::{
    Animation, AnimationKind, AnimationSettings, Background, Design, Easing, ImageFit, Layer,
    LayerKind, LayerProps, Mask, MaskShape, ShapeType,
};
pub use crate::design::store::{DesignRepository, InMemoryDesignStore};
pub use crate::design::tree::TransformPatch;
pub use crate::export::controller::{ControllerSettings, ExportController};
pub use crate::export::job::{
    ArtifactMeta, ExportJob, ExportRequest, JobError, JobStatus, JobStatusView, PublicError,
};
pub use crate::export::queue::{InProcessQueue, JobQueue};
pub use crate::export::store::JobStore;
pub use crate::export::worker::WorkerPool;
pub use crate::render::document::{Document, Primitive, PrimitiveContent};
pub use crate::render::renderer::{RenderOptions, render, render_with};
pub use crate::render::svg::to_svg;
pub use crate::storage::ArtifactStorage;
