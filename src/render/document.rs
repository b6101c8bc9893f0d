use crate::design::model::{Animation, AnimationSettings, Background, ImageFit, MaskShape};
use crate::foundation::core::{Affine, LayerId, Size, Vec2};

/// Format-agnostic drawing document produced by the renderer.
///
/// Primitives are in painter's order: the first entry is the bottommost.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
    /// Document background.
    pub background: Background,
    /// Playback settings for animated formats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation: Option<AnimationSettings>,
    /// Drawable primitives, bottommost first.
    pub primitives: Vec<Primitive>,
}

impl Document {
    /// Number of primitives.
    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    /// Return `true` when nothing but the background is drawn.
    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }
}

/// One drawable element derived from one layer.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Primitive {
    /// Source layer.
    pub layer: LayerId,
    /// Placement of the local coordinate space on the canvas.
    pub transform: PrimitiveTransform,
    /// Size of the layer box in local coordinates.
    pub size: Size,
    /// Opacity in `[0, 1]`.
    pub opacity: f64,
    /// Optional clip region in local coordinates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip: Option<Clip>,
    /// Animations copied from the layer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub animations: Vec<Animation>,
    /// Kind-specific payload.
    pub content: PrimitiveContent,
}

/// Translate, then rotate about the local origin, then scale.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimitiveTransform {
    /// Canvas-space translation.
    pub translate: Vec2,
    /// Clockwise rotation in degrees.
    pub rotate_deg: f64,
    /// Non-uniform scale.
    pub scale: Vec2,
}

impl Default for PrimitiveTransform {
    fn default() -> Self {
        Self {
            translate: Vec2::ZERO,
            rotate_deg: 0.0,
            scale: Vec2::new(1.0, 1.0),
        }
    }
}

impl PrimitiveTransform {
    /// Return `true` when the transform leaves local coordinates unchanged.
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    /// Local-to-canvas matrix.
    pub fn to_affine(self) -> Affine {
        // Canonical order: T(translate) * R(rotation) * S(scale)
        Affine::translate(self.translate)
            * Affine::rotate(self.rotate_deg.to_radians())
            * Affine::scale_non_uniform(self.scale.x, self.scale.y)
    }
}

/// Clip region in local coordinates.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    /// Outline.
    pub shape: MaskShape,
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
}

/// Kind-specific primitive payload.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PrimitiveContent {
    /// Text run.
    Text(TextRun),
    /// Positioned image.
    Image(PlacedImage),
    /// Filled/stroked geometry.
    Shape(ShapePrimitive),
}

/// Text run laid out as one line per `\n`-separated segment.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRun {
    /// Lines of text.
    pub lines: Vec<String>,
    /// Font family.
    pub font_family: String,
    /// Font size in pixels.
    pub font_size: f64,
    /// CSS font weight.
    pub font_weight: String,
    /// Fill color.
    pub color: String,
    /// Horizontal anchor.
    pub anchor: TextAnchor,
    /// Anchor x in local coordinates.
    pub x: f64,
    /// Baseline of the first line in local coordinates.
    pub baseline: f64,
    /// Distance between baselines.
    pub line_height: f64,
}

/// Horizontal text anchor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAnchor {
    /// Text starts at the anchor.
    Start,
    /// Text is centered on the anchor.
    Middle,
    /// Text ends at the anchor.
    End,
}

impl TextAnchor {
    /// SVG `text-anchor` value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Middle => "middle",
            Self::End => "end",
        }
    }
}

/// Image placed in a local box.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedImage {
    /// Resolved source reference.
    pub href: String,
    /// Box width.
    pub width: f64,
    /// Box height.
    pub height: f64,
    /// Fitting mode.
    pub fit: ImageFit,
}

/// Filled and optionally stroked geometry.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapePrimitive {
    /// Outline in local coordinates.
    pub geometry: ShapeGeometry,
    /// Fill color, or `none`.
    pub fill: String,
    /// Optional stroke.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<Stroke>,
}

/// Stroke paint.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stroke {
    /// Stroke color.
    pub color: String,
    /// Stroke width in pixels.
    pub width: f64,
}

/// Supported outlines.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ShapeGeometry {
    /// Rectangle at the local origin.
    Rect {
        /// Width.
        width: f64,
        /// Height.
        height: f64,
        /// Corner radius.
        corner_radius: f64,
    },
    /// Circle.
    Circle {
        /// Center x.
        cx: f64,
        /// Center y.
        cy: f64,
        /// Radius.
        r: f64,
    },
    /// Ellipse.
    Ellipse {
        /// Center x.
        cx: f64,
        /// Center y.
        cy: f64,
        /// Horizontal radius.
        rx: f64,
        /// Vertical radius.
        ry: f64,
    },
    /// Straight segment.
    Line {
        /// Start x.
        x1: f64,
        /// Start y.
        y1: f64,
        /// End x.
        x2: f64,
        /// End y.
        y2: f64,
    },
    /// Closed polygon.
    Polygon {
        /// Vertices in order.
        points: Vec<[f64; 2]>,
    },
}
