use std::collections::{BTreeMap, HashSet};

use crate::foundation::core::{Canvas, DesignId, LayerId, Rect};
use crate::foundation::error::{StratumError, StratumResult};

/// A design: canvas, background and an arena of layers ordered by z-index.
///
/// Layers are owned by the design. Parent links are stored as [`LayerId`]s, never as references,
/// so cycle checks and cascades walk ids through the arena.
///
/// Serialized form (camelCase JSON) lists layers as an array; on load the z-order is taken from
/// `zIndex` with ties broken by array position, then compacted to `0..N-1`.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "DesignFile", into = "DesignFile")]
pub struct Design {
    /// Stable design identity.
    pub id: DesignId,
    /// Display name.
    pub name: String,
    /// Canvas size in pixels.
    pub canvas: Canvas,
    /// Document background.
    pub background: Background,
    /// Document-level animation timing, used by animated export formats.
    pub animation: Option<AnimationSettings>,
    pub(crate) layers: BTreeMap<LayerId, Layer>,
    pub(crate) next_layer_id: u64,
}

/// Background descriptor of a design.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Background {
    /// No background is painted.
    Transparent,
    /// Solid fill.
    Color {
        /// CSS color.
        color: String,
    },
    /// Image stretched over the canvas.
    Image {
        /// Blob store path or URL.
        src: String,
    },
}

impl Default for Background {
    fn default() -> Self {
        Self::Color {
            color: "#ffffff".to_string(),
        }
    }
}

/// Playback settings for animated exports (gif, mp4, webm).
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnimationSettings {
    /// Total playback duration in milliseconds.
    pub duration_ms: u64,
    /// Frames per second for video output.
    pub fps: u32,
    /// Whether playback loops.
    #[serde(rename = "loop")]
    pub loop_playback: bool,
}

impl Default for AnimationSettings {
    fn default() -> Self {
        Self {
            duration_ms: 3_000,
            fps: 30,
            loop_playback: true,
        }
    }
}

impl AnimationSettings {
    /// Reject zero durations and frame rates.
    pub fn validate(&self) -> StratumResult<()> {
        if self.duration_ms == 0 {
            return Err(StratumError::validation("animation durationMs must be > 0"));
        }
        if self.fps == 0 || self.fps > 120 {
            return Err(StratumError::validation("animation fps must be in 1..=120"));
        }
        Ok(())
    }
}

/// One node of the layer tree.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    /// Arena id, unique within the design.
    pub id: LayerId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Kind-specific payload.
    #[serde(flatten)]
    pub kind: LayerKind,
    /// Geometry and flags shared by every kind.
    #[serde(flatten)]
    pub props: LayerProps,
    /// Paint order; 0 is painted first.
    #[serde(default)]
    pub z_index: u32,
    /// Weak back-reference to the parent layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<LayerId>,
    /// Entrance/exit animations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub animations: Vec<Animation>,
    /// Optional clip mask in layer-local coordinates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<Mask>,
}

impl Layer {
    /// Axis-aligned box of this layer alone, ignoring rotation and scale.
    pub fn rect(&self) -> Rect {
        let p = &self.props;
        Rect::new(p.x, p.y, p.x + p.width.max(0.0), p.y + p.height.max(0.0))
    }
}

/// Layer kind with kind-specific properties.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", content = "properties", rename_all = "lowercase")]
pub enum LayerKind {
    /// Text run.
    Text(TextProps),
    /// Positioned image.
    Image(ImageProps),
    /// Geometric shape.
    Shape(ShapeProps),
    /// Container with no drawable content of its own.
    Group,
}

impl LayerKind {
    /// Stable lowercase tag.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Image(_) => "image",
            Self::Shape(_) => "shape",
            Self::Group => "group",
        }
    }

    /// Build a kind from its tag and a JSON property bag.
    ///
    /// Unknown tags and properties of the wrong type are validation errors; unknown keys are
    /// ignored so common attributes can share the same bag.
    pub fn from_parts(kind: &str, properties: &serde_json::Value) -> StratumResult<Self> {
        fn parse<T: serde::de::DeserializeOwned>(
            kind: &str,
            properties: &serde_json::Value,
        ) -> StratumResult<T> {
            serde_json::from_value(properties.clone()).map_err(|e| {
                StratumError::validation(format!("invalid {kind} layer properties: {e}"))
            })
        }

        match kind.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text(parse("text", properties)?)),
            "image" => Ok(Self::Image(parse("image", properties)?)),
            "shape" => Ok(Self::Shape(parse("shape", properties)?)),
            "group" => Ok(Self::Group),
            other => Err(StratumError::validation(format!(
                "unknown layer kind '{other}' (expected text, image, shape or group)"
            ))),
        }
    }
}

/// Geometry and flags shared by every layer kind.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayerProps {
    /// Left edge in canvas pixels.
    pub x: f64,
    /// Top edge in canvas pixels.
    pub y: f64,
    /// Width in pixels.
    pub width: f64,
    /// Height in pixels.
    pub height: f64,
    /// Clockwise rotation in degrees about the layer origin.
    pub rotation: f64,
    /// Horizontal scale factor.
    pub scale_x: f64,
    /// Vertical scale factor.
    pub scale_y: f64,
    /// Opacity in `[0, 1]`.
    pub opacity: f64,
    /// Hidden layers (and their descendants) are not rendered.
    pub visible: bool,
    /// Editor lock flag; carried through but not enforced by the pipeline.
    pub locked: bool,
}

impl Default for LayerProps {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 100.0,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            opacity: 1.0,
            visible: true,
            locked: false,
        }
    }
}

impl LayerProps {
    /// Reject non-finite numbers and negative sizes; clamp opacity into `[0, 1]`.
    pub fn normalized(mut self) -> StratumResult<Self> {
        let fields = [
            ("x", self.x),
            ("y", self.y),
            ("width", self.width),
            ("height", self.height),
            ("rotation", self.rotation),
            ("scaleX", self.scale_x),
            ("scaleY", self.scale_y),
            ("opacity", self.opacity),
        ];
        for (name, v) in fields {
            if !v.is_finite() {
                return Err(StratumError::validation(format!(
                    "layer {name} must be a finite number"
                )));
            }
        }
        if self.width < 0.0 || self.height < 0.0 {
            return Err(StratumError::validation("layer width/height must be >= 0"));
        }
        self.opacity = self.opacity.clamp(0.0, 1.0);
        Ok(self)
    }
}

/// Text layer properties. Missing values fall back to renderer defaults.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextProps {
    /// Text content.
    pub content: String,
    /// Font family name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    /// Font size in pixels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    /// CSS font weight (`normal`, `bold`, `100`..`900`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_weight: Option<String>,
    /// Text color.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Horizontal alignment inside the layer box.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_align: Option<TextAlign>,
}

/// Horizontal text alignment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    /// Anchor at the left edge.
    #[default]
    Left,
    /// Anchor at the horizontal center.
    Center,
    /// Anchor at the right edge.
    Right,
}

/// Image layer properties.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageProps {
    /// Blob store path or URL of the image source.
    pub src: String,
    /// How the image fills the layer box.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fit: Option<ImageFit>,
}

/// Image fitting mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFit {
    /// Stretch to the box.
    #[default]
    Fill,
    /// Fit inside the box preserving aspect ratio.
    Contain,
    /// Cover the box preserving aspect ratio.
    Cover,
}

/// Shape layer properties. Missing paint values fall back to renderer defaults.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShapeProps {
    /// Geometric sub-kind.
    pub shape_type: ShapeType,
    /// Fill color.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    /// Stroke color.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    /// Stroke width in pixels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    /// Corner radius for rectangles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corner_radius: Option<f64>,
    /// Number of sides for polygons.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sides: Option<u32>,
}

/// Shape sub-kind. Unrecognized names are preserved and render as nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ShapeType {
    /// Axis-aligned rectangle (optionally rounded).
    #[default]
    Rectangle,
    /// Circle inscribed in the layer box.
    Circle,
    /// Ellipse filling the layer box.
    Ellipse,
    /// Line from the top-left to the bottom-right corner.
    Line,
    /// Isosceles triangle pointing up.
    Triangle,
    /// Regular polygon inscribed in the layer box.
    Polygon,
    /// Anything else.
    Unsupported(String),
}

impl From<String> for ShapeType {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "rectangle" | "rect" => Self::Rectangle,
            "circle" => Self::Circle,
            "ellipse" => Self::Ellipse,
            "line" => Self::Line,
            "triangle" => Self::Triangle,
            "polygon" => Self::Polygon,
            _ => Self::Unsupported(s),
        }
    }
}

impl From<ShapeType> for String {
    fn from(t: ShapeType) -> Self {
        match t {
            ShapeType::Rectangle => "rectangle".to_string(),
            ShapeType::Circle => "circle".to_string(),
            ShapeType::Ellipse => "ellipse".to_string(),
            ShapeType::Line => "line".to_string(),
            ShapeType::Triangle => "triangle".to_string(),
            ShapeType::Polygon => "polygon".to_string(),
            ShapeType::Unsupported(name) => name,
        }
    }
}

/// Entrance/exit animation attached to a layer.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Animation {
    /// Animation preset.
    pub kind: AnimationKind,
    /// Duration in milliseconds.
    #[serde(default = "default_animation_duration_ms")]
    pub duration_ms: u64,
    /// Start delay in milliseconds.
    #[serde(default)]
    pub delay_ms: u64,
    /// Timing curve.
    #[serde(default)]
    pub easing: Easing,
}

fn default_animation_duration_ms() -> u64 {
    500
}

/// Animation presets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnimationKind {
    /// Opacity 0 to 1.
    FadeIn,
    /// Opacity 1 to 0.
    FadeOut,
    /// Slide in from the left edge of the canvas.
    SlideIn,
    /// Scale from 0 to 1.
    ScaleIn,
    /// One full turn.
    Rotate,
}

/// Timing curves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Easing {
    /// Constant speed.
    #[default]
    Linear,
    /// Accelerate.
    EaseIn,
    /// Decelerate.
    EaseOut,
    /// Accelerate then decelerate.
    EaseInOut,
}

/// Clip mask in layer-local coordinates.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mask {
    /// Mask outline.
    pub shape: MaskShape,
    /// Left edge relative to the layer origin.
    #[serde(default)]
    pub x: f64,
    /// Top edge relative to the layer origin.
    #[serde(default)]
    pub y: f64,
    /// Mask width.
    pub width: f64,
    /// Mask height.
    pub height: f64,
}

/// Mask outlines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskShape {
    /// Rectangular clip.
    Rect,
    /// Ellipse inscribed in the mask box.
    Circle,
}

impl Design {
    /// Create an empty design.
    pub fn new(name: impl Into<String>, canvas: Canvas) -> StratumResult<Self> {
        canvas.validate()?;
        Ok(Self {
            id: DesignId::new(),
            name: name.into(),
            canvas,
            background: Background::default(),
            animation: None,
            layers: BTreeMap::new(),
            next_layer_id: 1,
        })
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Return `true` when the design has no layers.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Borrow a layer by id.
    pub fn layer(&self, id: LayerId) -> StratumResult<&Layer> {
        self.layers
            .get(&id)
            .ok_or_else(|| StratumError::not_found(format!("{id} does not exist in design")))
    }

    pub(crate) fn layer_mut(&mut self, id: LayerId) -> StratumResult<&mut Layer> {
        self.layers
            .get_mut(&id)
            .ok_or_else(|| StratumError::not_found(format!("{id} does not exist in design")))
    }

    /// Return `true` when `id` is part of this design.
    pub fn contains(&self, id: LayerId) -> bool {
        self.layers.contains_key(&id)
    }

    /// All layers in ascending z-order (bottommost first).
    pub fn layers_by_z(&self) -> Vec<&Layer> {
        let mut out: Vec<&Layer> = self.layers.values().collect();
        out.sort_by_key(|l| (l.z_index, l.id));
        out
    }

    /// Largest z-index in use, or `None` for an empty design.
    pub fn max_z(&self) -> Option<u32> {
        self.layers.values().map(|l| l.z_index).max()
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct DesignFile {
    #[serde(default)]
    id: DesignId,
    #[serde(default)]
    name: String,
    width: u32,
    height: u32,
    #[serde(default)]
    background: Background,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    animation: Option<AnimationSettings>,
    #[serde(default)]
    layers: Vec<Layer>,
}

impl From<Design> for DesignFile {
    fn from(d: Design) -> Self {
        let mut layers: Vec<Layer> = d.layers.into_values().collect();
        layers.sort_by_key(|l| (l.z_index, l.id));
        Self {
            id: d.id,
            name: d.name,
            width: d.canvas.width,
            height: d.canvas.height,
            background: d.background,
            animation: d.animation,
            layers,
        }
    }
}

impl TryFrom<DesignFile> for Design {
    type Error = StratumError;

    fn try_from(file: DesignFile) -> StratumResult<Self> {
        let canvas = Canvas::new(file.width, file.height)?;
        if let Some(anim) = &file.animation {
            anim.validate()?;
        }

        let mut seen = HashSet::new();
        let mut ordered: Vec<(u32, usize, Layer)> = Vec::with_capacity(file.layers.len());
        for (pos, mut layer) in file.layers.into_iter().enumerate() {
            if !seen.insert(layer.id) {
                return Err(StratumError::validation(format!(
                    "duplicate layer id {}",
                    layer.id.0
                )));
            }
            layer.props = layer.props.normalized()?;
            ordered.push((layer.z_index, pos, layer));
        }
        ordered.sort_by_key(|(z, pos, _)| (*z, *pos));

        let mut layers = BTreeMap::new();
        let mut next_layer_id = 1;
        for (z, (_, _, mut layer)) in ordered.into_iter().enumerate() {
            layer.z_index = z as u32;
            next_layer_id = next_layer_id.max(layer.id.0 + 1);
            layers.insert(layer.id, layer);
        }

        let design = Self {
            id: file.id,
            name: file.name,
            canvas,
            background: file.background,
            animation: file.animation,
            layers,
            next_layer_id,
        };
        design
            .check_integrity()
            .map_err(|e| StratumError::validation(e.to_string()))?;
        Ok(design)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/design/model.rs"]
mod tests;
