use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::design::model::Background;
use crate::foundation::core::is_valid_color;
use crate::foundation::error::{StratumError, StratumResult};
use crate::render::document::Document;

/// Largest accepted output dimension in pixels.
pub const MAX_OUTPUT_DIM: u32 = 16_384;
/// Largest accepted scale factor.
pub const MAX_SCALE: f64 = 10.0;

/// Delivery formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ExportFormat {
    /// Portable Network Graphics.
    Png,
    /// JPEG (`jpeg` is accepted as an alias).
    Jpg,
    /// The intermediate SVG itself.
    Svg,
    /// Single-page PDF.
    Pdf,
    /// GIF image.
    Gif,
    /// H.264 video.
    Mp4,
    /// VP9 video.
    Webm,
}

impl ExportFormat {
    /// Every supported format.
    pub const ALL: [Self; 7] = [
        Self::Png,
        Self::Jpg,
        Self::Svg,
        Self::Pdf,
        Self::Gif,
        Self::Mp4,
        Self::Webm,
    ];

    /// Parse a user-supplied format name (case-insensitive).
    pub fn parse(s: &str) -> StratumResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpg),
            "svg" => Ok(Self::Svg),
            "pdf" => Ok(Self::Pdf),
            "gif" => Ok(Self::Gif),
            "mp4" => Ok(Self::Mp4),
            "webm" => Ok(Self::Webm),
            other => Err(StratumError::validation(format!(
                "unsupported export format '{other}' (expected png, jpg, svg, pdf, gif, mp4 or webm)"
            ))),
        }
    }

    /// Canonical file extension.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpg => "jpg",
            Self::Svg => "svg",
            Self::Pdf => "pdf",
            Self::Gif => "gif",
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
        }
    }

    /// MIME type of the produced artifact.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpg => "image/jpeg",
            Self::Svg => "image/svg+xml",
            Self::Pdf => "application/pdf",
            Self::Gif => "image/gif",
            Self::Mp4 => "video/mp4",
            Self::Webm => "video/webm",
        }
    }

    /// Whether the format can carry transparency.
    pub fn supports_alpha(self) -> bool {
        matches!(self, Self::Png | Self::Gif | Self::Svg)
    }

    /// Whether the format is a video container.
    pub fn is_video(self) -> bool {
        matches!(self, Self::Mp4 | Self::Webm)
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = StratumError;

    fn from_str(s: &str) -> StratumResult<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ExportFormat {
    type Error = StratumError;

    fn try_from(s: String) -> StratumResult<Self> {
        Self::parse(&s)
    }
}

impl From<ExportFormat> for String {
    fn from(f: ExportFormat) -> Self {
        f.extension().to_string()
    }
}

/// Named quality presets.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    /// Smallest files.
    Low,
    /// Balanced.
    Medium,
    /// Default.
    #[default]
    High,
    /// Best quality.
    Ultra,
}

impl QualityTier {
    /// Image quality value (0-100) passed to the rasterizer.
    pub fn value(self) -> u8 {
        match self {
            Self::Low => 60,
            Self::Medium => 80,
            Self::High => 92,
            Self::Ultra => 100,
        }
    }

    /// Constant rate factor for video encoders (lower is better).
    pub fn crf(self) -> u8 {
        match self {
            Self::Low => 32,
            Self::Medium => 28,
            Self::High => 23,
            Self::Ultra => 18,
        }
    }

    /// Parse a tier name (case-insensitive).
    pub fn parse(s: &str) -> StratumResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "ultra" => Ok(Self::Ultra),
            other => Err(StratumError::validation(format!(
                "unknown quality '{other}' (expected low, medium, high or ultra)"
            ))),
        }
    }
}

impl FromStr for QualityTier {
    type Err = StratumError;

    fn from_str(s: &str) -> StratumResult<Self> {
        Self::parse(s)
    }
}

/// Output options shared by every converter.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConvertOptions {
    /// Quality preset.
    pub quality: QualityTier,
    /// Target width in pixels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Target height in pixels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Uniform scale factor, used when neither width nor height is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    /// Keep transparency where the format supports it.
    pub transparent: bool,
    /// Replaces the document background color.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
}

impl ConvertOptions {
    /// Reject out-of-range numeric options and malformed colors.
    pub fn validate(&self) -> StratumResult<()> {
        for (name, v) in [("width", self.width), ("height", self.height)] {
            if let Some(v) = v
                && (v == 0 || v > MAX_OUTPUT_DIM)
            {
                return Err(StratumError::validation(format!(
                    "{name} must be in 1..={MAX_OUTPUT_DIM}, got {v}"
                )));
            }
        }
        if let Some(s) = self.scale
            && (!s.is_finite() || s <= 0.0 || s > MAX_SCALE)
        {
            return Err(StratumError::validation(format!(
                "scale must be in (0, {MAX_SCALE}], got {s}"
            )));
        }
        if let Some(c) = &self.background_color
            && !is_valid_color(c)
        {
            return Err(StratumError::validation(format!(
                "invalid background color '{c}'"
            )));
        }
        Ok(())
    }

    /// Rasterizer resize geometry: `WxH`, `Wx`, `xH` or `P%`.
    pub fn resize_geometry(&self) -> Option<String> {
        match (self.width, self.height, self.scale) {
            (Some(w), Some(h), _) => Some(format!("{w}x{h}")),
            (Some(w), None, _) => Some(format!("{w}x")),
            (None, Some(h), _) => Some(format!("x{h}")),
            (None, None, Some(s)) if s != 1.0 => {
                Some(format!("{}%", crate::render::svg::num(s * 100.0)))
            }
            _ => None,
        }
    }

    /// Output pixel size for a `width`x`height` document.
    ///
    /// A single dimension keeps the aspect ratio; both dimensions fit inside the box.
    pub fn output_size(&self, width: u32, height: u32) -> (u32, u32) {
        let (w, h) = (f64::from(width.max(1)), f64::from(height.max(1)));
        let factor = match (self.width, self.height, self.scale) {
            (Some(tw), Some(th), _) => (f64::from(tw) / w).min(f64::from(th) / h),
            (Some(tw), None, _) => f64::from(tw) / w,
            (None, Some(th), _) => f64::from(th) / h,
            (None, None, Some(s)) => s,
            _ => 1.0,
        };
        let px = |v: f64| ((v * factor).round() as u32).clamp(1, MAX_OUTPUT_DIM);
        (px(w), px(h))
    }

    /// Document with the background adjusted for `format`.
    ///
    /// Transparent output drops the background when the format has alpha; otherwise an override
    /// color replaces it, and a transparent background is filled white.
    pub fn apply_background<'a>(&self, doc: &'a Document, format: ExportFormat) -> Cow<'a, Document> {
        let keep_alpha = self.transparent && format.supports_alpha();
        let background = if keep_alpha {
            Some(Background::Transparent)
        } else if let Some(color) = &self.background_color {
            Some(Background::Color {
                color: color.trim().to_string(),
            })
        } else if doc.background == Background::Transparent && !format.supports_alpha() {
            Some(Background::Color {
                color: "white".to_string(),
            })
        } else {
            None
        };
        match background {
            Some(bg) if bg != doc.background => {
                let mut owned = doc.clone();
                owned.background = bg;
                Cow::Owned(owned)
            }
            _ => Cow::Borrowed(doc),
        }
    }

    /// Rasterizer `-background` value for `format`.
    pub fn matte(&self, format: ExportFormat) -> &str {
        if self.transparent && format.supports_alpha() {
            "none"
        } else {
            self.background_color
                .as_deref()
                .map(str::trim)
                .unwrap_or("white")
        }
    }
}

/// One conversion request.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvertRequest {
    /// Target format.
    pub format: ExportFormat,
    /// Output options.
    pub options: ConvertOptions,
    /// Where the artifact must be written.
    pub output_path: PathBuf,
}

/// Reference to a produced artifact.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactHandle {
    /// Absolute or storage-relative path of the artifact.
    pub path: PathBuf,
    /// File size in bytes.
    pub size_bytes: u64,
    /// MIME type.
    pub mime_type: String,
}

/// Turns a document into a file in a delivery format.
pub trait Converter: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Produce the artifact at `request.output_path`.
    fn convert(&self, doc: &Document, request: &ConvertRequest) -> StratumResult<ArtifactHandle>;
}

impl<C: Converter + ?Sized> Converter for std::sync::Arc<C> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn convert(&self, doc: &Document, request: &ConvertRequest) -> StratumResult<ArtifactHandle> {
        (**self).convert(doc, request)
    }
}

/// Build a handle for a finished output file; a missing or empty file is a conversion error.
pub(crate) fn artifact_handle(path: &Path, format: ExportFormat) -> StratumResult<ArtifactHandle> {
    let meta = std::fs::metadata(path).map_err(|e| {
        StratumError::conversion(
            format!("converter produced no {format} output"),
            format!("{}: {e}", path.display()),
        )
    })?;
    if meta.len() == 0 {
        return Err(StratumError::conversion(
            format!("converter produced an empty {format} file"),
            path.display().to_string(),
        ));
    }
    Ok(ArtifactHandle {
        path: path.to_path_buf(),
        size_bytes: meta.len(),
        mime_type: format.mime_type().to_string(),
    })
}

/// Ensure the parent directory of `path` exists.
pub(crate) fn ensure_parent_dir(path: &Path) -> StratumResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            StratumError::storage(format!(
                "failed to create output directory '{}': {e}",
                parent.display()
            ))
        })?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/convert/format.rs"]
mod tests;
