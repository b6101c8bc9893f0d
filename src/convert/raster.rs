use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;

use crate::convert::format::{
    ArtifactHandle, ConvertRequest, Converter, ExportFormat, artifact_handle, ensure_parent_dir,
};
use crate::foundation::error::{StratumError, StratumResult};
use crate::render::document::Document;
use crate::render::svg::to_svg;

/// In-process converter built on `usvg` + `resvg` + `image`.
///
/// Handles svg, png and jpg without any external program. Other formats are rejected with a
/// conversion error.
pub struct RasterConverter {
    fontdb: Arc<usvg::fontdb::Database>,
    resources_dir: Option<PathBuf>,
}

impl std::fmt::Debug for RasterConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterConverter")
            .field("font_faces", &self.fontdb.len())
            .field("resources_dir", &self.resources_dir)
            .finish()
    }
}

impl Default for RasterConverter {
    fn default() -> Self {
        Self::new(None)
    }
}

impl RasterConverter {
    /// Create a converter with system fonts loaded.
    ///
    /// `resources_dir` is where relative image references inside the SVG are resolved.
    pub fn new(resources_dir: Option<PathBuf>) -> Self {
        let mut db = usvg::fontdb::Database::new();
        db.load_system_fonts();
        Self {
            fontdb: Arc::new(db),
            resources_dir,
        }
    }

    /// Whether this converter can produce `format`.
    pub fn supports(format: ExportFormat) -> bool {
        matches!(
            format,
            ExportFormat::Svg | ExportFormat::Png | ExportFormat::Jpg
        )
    }

    fn rasterize(&self, svg: &str, width: u32, height: u32) -> StratumResult<Vec<u8>> {
        let opts = usvg::Options {
            resources_dir: self.resources_dir.clone(),
            fontdb: Arc::clone(&self.fontdb),
            ..Default::default()
        };
        let tree = usvg::Tree::from_str(svg, &opts).context("parse intermediate svg")?;

        let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
            .ok_or_else(|| StratumError::conversion("failed to allocate raster surface", ""))?;
        let sx = width as f32 / tree.size().width();
        let sy = height as f32 / tree.size().height();
        resvg::render(
            &tree,
            resvg::tiny_skia::Transform::from_scale(sx, sy),
            &mut pixmap.as_mut(),
        );
        Ok(demultiply(pixmap.data()))
    }
}

impl Converter for RasterConverter {
    fn name(&self) -> &'static str {
        "builtin"
    }

    #[tracing::instrument(
        name = "convert",
        level = "debug",
        skip_all,
        fields(converter = "builtin", format = %request.format)
    )]
    fn convert(&self, doc: &Document, request: &ConvertRequest) -> StratumResult<ArtifactHandle> {
        let format = request.format;
        if !Self::supports(format) {
            return Err(StratumError::conversion(
                format!("the builtin converter cannot produce {format}"),
                "use the external converter for pdf, gif, mp4 and webm",
            ));
        }
        ensure_parent_dir(&request.output_path)?;
        let out = request.output_path.as_path();

        let doc = request.options.apply_background(doc, format);
        let svg = to_svg(&doc);
        if format == ExportFormat::Svg {
            std::fs::write(out, svg.as_bytes())
                .with_context(|| format!("write svg to '{}'", out.display()))?;
            return artifact_handle(out, format);
        }

        let (w, h) = request.options.output_size(doc.width, doc.height);
        let rgba = self.rasterize(&svg, w, h)?;
        let image = image::RgbaImage::from_raw(w, h, rgba)
            .ok_or_else(|| StratumError::conversion("raster buffer size mismatch", ""))?;

        match format {
            ExportFormat::Jpg => {
                let rgb = image::DynamicImage::ImageRgba8(image).to_rgb8();
                let file = std::fs::File::create(out)
                    .with_context(|| format!("create '{}'", out.display()))?;
                let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                    BufWriter::new(file),
                    request.options.quality.value(),
                );
                encoder
                    .encode_image(&rgb)
                    .map_err(|e| StratumError::conversion("jpeg encoding failed", e.to_string()))?;
            }
            _ => {
                image
                    .save_with_format(out, image::ImageFormat::Png)
                    .map_err(|e| StratumError::conversion("png encoding failed", e.to_string()))?;
            }
        }
        artifact_handle(out, format)
    }
}

/// Convert premultiplied RGBA8 to straight alpha.
fn demultiply(premul: &[u8]) -> Vec<u8> {
    let mut out = premul.to_vec();
    for px in out.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        if a == 0 || a == 255 {
            continue;
        }
        for c in &mut px[..3] {
            *c = ((u16::from(*c) * 255 + a / 2) / a).min(255) as u8;
        }
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/convert/raster.rs"]
mod tests;
