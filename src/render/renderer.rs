use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::design::model::{
    AnimationSettings, Background, Design, ImageProps, Layer, LayerKind, ShapeProps, ShapeType,
    TextAlign, TextProps,
};
use crate::foundation::core::{LayerId, Size, Vec2, is_valid_color};
use crate::foundation::error::{StratumError, StratumResult};
use crate::render::document::{
    Clip, Document, PlacedImage, Primitive, PrimitiveContent, PrimitiveTransform, ShapeGeometry,
    ShapePrimitive, Stroke, TextAnchor, TextRun,
};

/// Fill used when a shape has no (valid) fill color.
pub const DEFAULT_FILL: &str = "#CCCCCC";
/// Text color used when a text layer has no (valid) color.
pub const DEFAULT_TEXT_COLOR: &str = "#000000";
/// Font family used when a text layer names none.
pub const DEFAULT_FONT_FAMILY: &str = "Arial";
/// Font size used when a text layer names none.
pub const DEFAULT_FONT_SIZE: f64 = 16.0;
/// Font weight used when a text layer names none.
pub const DEFAULT_FONT_WEIGHT: &str = "normal";
/// Side count used for polygons without `sides`.
pub const DEFAULT_POLYGON_SIDES: u32 = 6;

const LINE_HEIGHT_FACTOR: f64 = 1.2;

/// Per-render overrides.
#[derive(Clone, Debug, Default)]
pub struct RenderOptions {
    /// Replaces the design's document-level animation settings.
    pub animation: Option<AnimationSettings>,
    /// Directory that relative image sources are resolved against.
    pub asset_root: Option<PathBuf>,
}

/// Render a design snapshot with default options.
pub fn render(design: &Design) -> StratumResult<Document> {
    render_with(design, &RenderOptions::default())
}

/// Render a design snapshot into a drawing document.
///
/// Layers are visited bottom-up by z-index. Hidden layers, and layers below a hidden ancestor,
/// produce nothing; groups produce nothing of their own.
#[tracing::instrument(
    name = "render",
    level = "debug",
    skip_all,
    fields(design = %design.id, layers = design.len())
)]
pub fn render_with(design: &Design, opts: &RenderOptions) -> StratumResult<Document> {
    design.check_integrity().map_err(|e| match e {
        StratumError::Render(msg) => StratumError::render(format!("design {}: {msg}", design.id)),
        other => other,
    })?;

    let mut hidden: HashMap<LayerId, bool> = HashMap::with_capacity(design.len());
    let mut primitives = Vec::with_capacity(design.len());
    for layer in design.layers_by_z() {
        if is_hidden(design, layer.id, &mut hidden)? {
            continue;
        }
        if let Some(content) = layer_content(layer, opts.asset_root.as_deref()) {
            primitives.push(Primitive {
                layer: layer.id,
                transform: transform_of(layer),
                size: Size::new(layer.props.width, layer.props.height),
                opacity: layer.props.opacity.clamp(0.0, 1.0),
                clip: layer.mask.as_ref().map(|m| Clip {
                    shape: m.shape,
                    x: m.x,
                    y: m.y,
                    width: m.width,
                    height: m.height,
                }),
                animations: layer.animations.clone(),
                content,
            });
        }
    }

    let background = match &design.background {
        Background::Image { src } => Background::Image {
            src: resolve_href(src, opts.asset_root.as_deref()),
        },
        other => other.clone(),
    };

    tracing::debug!(primitives = primitives.len(), "document built");
    Ok(Document {
        width: design.canvas.width,
        height: design.canvas.height,
        background,
        animation: opts.animation.or(design.animation),
        primitives,
    })
}

fn is_hidden(
    design: &Design,
    id: LayerId,
    memo: &mut HashMap<LayerId, bool>,
) -> StratumResult<bool> {
    if let Some(h) = memo.get(&id) {
        return Ok(*h);
    }
    let layer = design.layer(id)?;
    let h = if !layer.props.visible {
        true
    } else {
        match layer.parent {
            // Integrity was checked, so the chain terminates.
            Some(parent) => is_hidden(design, parent, memo)?,
            None => false,
        }
    };
    memo.insert(id, h);
    Ok(h)
}

fn transform_of(layer: &Layer) -> PrimitiveTransform {
    let p = &layer.props;
    PrimitiveTransform {
        translate: Vec2::new(p.x, p.y),
        rotate_deg: p.rotation,
        scale: Vec2::new(p.scale_x, p.scale_y),
    }
}

fn layer_content(layer: &Layer, asset_root: Option<&Path>) -> Option<PrimitiveContent> {
    let (w, h) = (layer.props.width, layer.props.height);
    match &layer.kind {
        LayerKind::Text(text) => Some(PrimitiveContent::Text(text_run(text, w))),
        LayerKind::Image(image) => Some(PrimitiveContent::Image(placed_image(
            image, w, h, asset_root,
        ))),
        LayerKind::Shape(shape) => shape_primitive(layer.id, shape, w, h).map(PrimitiveContent::Shape),
        LayerKind::Group => None,
    }
}

fn text_run(text: &TextProps, width: f64) -> TextRun {
    let font_size = text
        .font_size
        .filter(|s| s.is_finite() && *s > 0.0)
        .unwrap_or(DEFAULT_FONT_SIZE);
    let (anchor, x) = match text.text_align.unwrap_or_default() {
        TextAlign::Left => (TextAnchor::Start, 0.0),
        TextAlign::Center => (TextAnchor::Middle, width / 2.0),
        TextAlign::Right => (TextAnchor::End, width),
    };
    TextRun {
        lines: text.content.split('\n').map(str::to_string).collect(),
        font_family: text
            .font_family
            .clone()
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FONT_FAMILY.to_string()),
        font_size,
        font_weight: text
            .font_weight
            .clone()
            .filter(|w| !w.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FONT_WEIGHT.to_string()),
        color: paint(text.color.as_deref(), DEFAULT_TEXT_COLOR),
        anchor,
        x,
        baseline: font_size,
        line_height: font_size * LINE_HEIGHT_FACTOR,
    }
}

fn placed_image(image: &ImageProps, width: f64, height: f64, root: Option<&Path>) -> PlacedImage {
    PlacedImage {
        href: resolve_href(&image.src, root),
        width,
        height,
        fit: image.fit.unwrap_or_default(),
    }
}

fn shape_primitive(id: LayerId, shape: &ShapeProps, w: f64, h: f64) -> Option<ShapePrimitive> {
    let fill = paint(shape.fill.as_deref(), DEFAULT_FILL);
    let stroke_width = shape
        .stroke_width
        .filter(|v| v.is_finite() && *v >= 0.0);
    let stroke = shape.stroke.as_deref().filter(|c| is_valid_color(c)).map(|c| Stroke {
        color: c.trim().to_string(),
        width: stroke_width.unwrap_or(1.0),
    });

    let geometry = match &shape.shape_type {
        ShapeType::Rectangle => ShapeGeometry::Rect {
            width: w,
            height: h,
            corner_radius: shape
                .corner_radius
                .filter(|r| r.is_finite() && *r > 0.0)
                .map_or(0.0, |r| r.min(w.min(h) / 2.0)),
        },
        ShapeType::Circle => ShapeGeometry::Circle {
            cx: w / 2.0,
            cy: h / 2.0,
            r: w.min(h) / 2.0,
        },
        ShapeType::Ellipse => ShapeGeometry::Ellipse {
            cx: w / 2.0,
            cy: h / 2.0,
            rx: w / 2.0,
            ry: h / 2.0,
        },
        ShapeType::Line => {
            // Lines are stroked with the fill color unless a stroke is set.
            let stroke = stroke.unwrap_or(Stroke {
                color: fill,
                width: stroke_width.unwrap_or(1.0).max(1.0),
            });
            return Some(ShapePrimitive {
                geometry: ShapeGeometry::Line {
                    x1: 0.0,
                    y1: 0.0,
                    x2: w,
                    y2: h,
                },
                fill: "none".to_string(),
                stroke: Some(stroke),
            });
        }
        ShapeType::Triangle => ShapeGeometry::Polygon {
            points: vec![[w / 2.0, 0.0], [w, h], [0.0, h]],
        },
        ShapeType::Polygon => ShapeGeometry::Polygon {
            points: regular_polygon(shape.sides.unwrap_or(DEFAULT_POLYGON_SIDES), w, h),
        },
        ShapeType::Unsupported(name) => {
            tracing::warn!(layer = %id, shape_type = %name, "unsupported shape type; skipped");
            return None;
        }
    };
    Some(ShapePrimitive {
        geometry,
        fill,
        stroke,
    })
}

/// Vertices of a regular polygon inscribed in a `w`x`h` box, first vertex at the top.
fn regular_polygon(sides: u32, w: f64, h: f64) -> Vec<[f64; 2]> {
    let n = sides.clamp(3, 64);
    let (cx, cy, rx, ry) = (w / 2.0, h / 2.0, w / 2.0, h / 2.0);
    (0..n)
        .map(|i| {
            let theta = -std::f64::consts::FRAC_PI_2
                + f64::from(i) * std::f64::consts::TAU / f64::from(n);
            [cx + rx * theta.cos(), cy + ry * theta.sin()]
        })
        .collect()
}

fn paint(color: Option<&str>, default: &str) -> String {
    match color {
        Some(c) if is_valid_color(c) => c.trim().to_string(),
        Some(c) => {
            tracing::warn!(color = %c, fallback = default, "invalid color; using default");
            default.to_string()
        }
        None => default.to_string(),
    }
}

/// Resolve a relative, non-URL source against the asset root.
fn resolve_href(src: &str, root: Option<&Path>) -> String {
    let is_url = src.starts_with("data:") || src.contains("://");
    match root {
        Some(root) if !is_url && Path::new(src).is_relative() => {
            root.join(src).to_string_lossy().into_owned()
        }
        _ => src.to_string(),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/renderer.rs"]
mod tests;
