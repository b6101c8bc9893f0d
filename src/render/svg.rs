//! Deterministic SVG serialization of a [`Document`].
//!
//! The same document always yields the same bytes: numbers are rounded to three decimals with
//! trailing zeros trimmed, ids derive from layer ids, and nothing time-dependent is emitted.

use crate::design::model::{Animation, AnimationKind, Background, Easing, ImageFit, MaskShape};
use crate::render::document::{
    Clip, Document, Primitive, PrimitiveContent, PrimitiveTransform, ShapeGeometry,
    ShapePrimitive, TextRun,
};

/// Serialize a document as a standalone SVG file.
pub fn to_svg(doc: &Document) -> String {
    let mut out = String::with_capacity(256 + doc.len() * 160);
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" xmlns:xlink=\"http://www.w3.org/1999/xlink\" \
         width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\n",
        w = doc.width,
        h = doc.height
    ));

    let clipped: Vec<(&Primitive, &Clip)> = doc
        .primitives
        .iter()
        .filter_map(|p| p.clip.as_ref().map(|c| (p, c)))
        .collect();
    if !clipped.is_empty() {
        out.push_str("<defs>\n");
        for (p, clip) in clipped {
            out.push_str(&format!("<clipPath id=\"{}\">", clip_id(p)));
            out.push_str(&clip_shape(clip));
            out.push_str("</clipPath>\n");
        }
        out.push_str("</defs>\n");
    }

    match &doc.background {
        Background::Transparent => {}
        Background::Color { color } => out.push_str(&format!(
            "<rect width=\"{}\" height=\"{}\" fill=\"{}\"/>\n",
            doc.width,
            doc.height,
            escape(color)
        )),
        Background::Image { src } => out.push_str(&format!(
            "<image {} width=\"{}\" height=\"{}\" preserveAspectRatio=\"none\"/>\n",
            href_attrs(src),
            doc.width,
            doc.height
        )),
    }

    for p in &doc.primitives {
        write_primitive(&mut out, p);
    }

    out.push_str("</svg>\n");
    out
}

fn write_primitive(out: &mut String, p: &Primitive) {
    out.push_str(&format!("<g id=\"layer-{}\"", p.layer.0));
    let transform = transform_attr(&p.transform);
    if !transform.is_empty() {
        out.push_str(&format!(" transform=\"{transform}\""));
    }
    if p.opacity < 1.0 {
        out.push_str(&format!(" opacity=\"{}\"", num(p.opacity)));
    }
    if p.clip.is_some() {
        out.push_str(&format!(" clip-path=\"url(#{})\"", clip_id(p)));
    }
    out.push('>');

    match &p.content {
        PrimitiveContent::Text(run) => write_text(out, run),
        PrimitiveContent::Image(img) => out.push_str(&format!(
            "<image {} width=\"{}\" height=\"{}\" preserveAspectRatio=\"{}\"/>",
            href_attrs(&img.href),
            num(img.width),
            num(img.height),
            aspect_ratio(img.fit)
        )),
        PrimitiveContent::Shape(shape) => write_shape(out, shape),
    }

    for anim in &p.animations {
        write_animation(out, p, anim);
    }
    out.push_str("</g>\n");
}

fn write_text(out: &mut String, run: &TextRun) {
    out.push_str(&format!(
        "<text x=\"{}\" y=\"{}\" font-family=\"{}\" font-size=\"{}\" font-weight=\"{}\" \
         fill=\"{}\" text-anchor=\"{}\" xml:space=\"preserve\">",
        num(run.x),
        num(run.baseline),
        escape(&run.font_family),
        num(run.font_size),
        escape(&run.font_weight),
        escape(&run.color),
        run.anchor.as_str()
    ));
    if let [line] = run.lines.as_slice() {
        out.push_str(&escape(line));
    } else {
        for (i, line) in run.lines.iter().enumerate() {
            let dy = if i == 0 { 0.0 } else { run.line_height };
            out.push_str(&format!(
                "<tspan x=\"{}\" dy=\"{}\">{}</tspan>",
                num(run.x),
                num(dy),
                escape(line)
            ));
        }
    }
    out.push_str("</text>");
}

fn write_shape(out: &mut String, shape: &ShapePrimitive) {
    let mut paint = format!(" fill=\"{}\"", escape(&shape.fill));
    if let Some(stroke) = &shape.stroke {
        paint.push_str(&format!(
            " stroke=\"{}\" stroke-width=\"{}\"",
            escape(&stroke.color),
            num(stroke.width)
        ));
    }
    let element = match &shape.geometry {
        ShapeGeometry::Rect {
            width,
            height,
            corner_radius,
        } => {
            let rounded = if *corner_radius > 0.0 {
                format!(" rx=\"{r}\" ry=\"{r}\"", r = num(*corner_radius))
            } else {
                String::new()
            };
            format!(
                "<rect width=\"{}\" height=\"{}\"{rounded}{paint}/>",
                num(*width),
                num(*height)
            )
        }
        ShapeGeometry::Circle { cx, cy, r } => format!(
            "<circle cx=\"{}\" cy=\"{}\" r=\"{}\"{paint}/>",
            num(*cx),
            num(*cy),
            num(*r)
        ),
        ShapeGeometry::Ellipse { cx, cy, rx, ry } => format!(
            "<ellipse cx=\"{}\" cy=\"{}\" rx=\"{}\" ry=\"{}\"{paint}/>",
            num(*cx),
            num(*cy),
            num(*rx),
            num(*ry)
        ),
        ShapeGeometry::Line { x1, y1, x2, y2 } => format!(
            "<line x1=\"{}\" y1=\"{}\" x2=\"{}\" y2=\"{}\"{paint}/>",
            num(*x1),
            num(*y1),
            num(*x2),
            num(*y2)
        ),
        ShapeGeometry::Polygon { points } => {
            let pts: Vec<String> = points
                .iter()
                .map(|[x, y]| format!("{},{}", num(*x), num(*y)))
                .collect();
            format!("<polygon points=\"{}\"{paint}/>", pts.join(" "))
        }
    };
    out.push_str(&element);
}

fn write_animation(out: &mut String, p: &Primitive, anim: &Animation) {
    let timing = format!(
        "begin=\"{}ms\" dur=\"{}ms\" fill=\"freeze\"{}",
        anim.delay_ms,
        anim.duration_ms.max(1),
        easing_attrs(anim.easing)
    );
    let element = match anim.kind {
        AnimationKind::FadeIn => format!(
            "<animate attributeName=\"opacity\" from=\"0\" to=\"{}\" {timing}/>",
            num(p.opacity)
        ),
        AnimationKind::FadeOut => format!(
            "<animate attributeName=\"opacity\" from=\"{}\" to=\"0\" {timing}/>",
            num(p.opacity)
        ),
        AnimationKind::SlideIn => format!(
            "<animateTransform attributeName=\"transform\" type=\"translate\" additive=\"sum\" \
             from=\"{} 0\" to=\"0 0\" {timing}/>",
            num(-(p.transform.translate.x + p.size.width))
        ),
        AnimationKind::ScaleIn => format!(
            "<animateTransform attributeName=\"transform\" type=\"scale\" additive=\"sum\" \
             from=\"0\" to=\"1\" {timing}/>"
        ),
        AnimationKind::Rotate => {
            let (cx, cy) = (num(p.size.width / 2.0), num(p.size.height / 2.0));
            format!(
                "<animateTransform attributeName=\"transform\" type=\"rotate\" additive=\"sum\" \
                 from=\"0 {cx} {cy}\" to=\"360 {cx} {cy}\" {timing}/>"
            )
        }
    };
    out.push_str(&element);
}

fn easing_attrs(easing: Easing) -> &'static str {
    match easing {
        Easing::Linear => "",
        Easing::EaseIn => " calcMode=\"spline\" keyTimes=\"0;1\" keySplines=\"0.42 0 1 1\"",
        Easing::EaseOut => " calcMode=\"spline\" keyTimes=\"0;1\" keySplines=\"0 0 0.58 1\"",
        Easing::EaseInOut => " calcMode=\"spline\" keyTimes=\"0;1\" keySplines=\"0.42 0 0.58 1\"",
    }
}

fn transform_attr(t: &PrimitiveTransform) -> String {
    let mut parts = Vec::with_capacity(3);
    if t.translate.x != 0.0 || t.translate.y != 0.0 {
        parts.push(format!(
            "translate({} {})",
            num(t.translate.x),
            num(t.translate.y)
        ));
    }
    if t.rotate_deg != 0.0 {
        parts.push(format!("rotate({})", num(t.rotate_deg)));
    }
    if t.scale.x != 1.0 || t.scale.y != 1.0 {
        parts.push(format!("scale({} {})", num(t.scale.x), num(t.scale.y)));
    }
    parts.join(" ")
}

fn clip_id(p: &Primitive) -> String {
    format!("clip-{}", p.layer.0)
}

fn clip_shape(clip: &Clip) -> String {
    match clip.shape {
        MaskShape::Rect => format!(
            "<rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\"/>",
            num(clip.x),
            num(clip.y),
            num(clip.width),
            num(clip.height)
        ),
        MaskShape::Circle => format!(
            "<ellipse cx=\"{}\" cy=\"{}\" rx=\"{}\" ry=\"{}\"/>",
            num(clip.x + clip.width / 2.0),
            num(clip.y + clip.height / 2.0),
            num(clip.width / 2.0),
            num(clip.height / 2.0)
        ),
    }
}

fn aspect_ratio(fit: ImageFit) -> &'static str {
    match fit {
        ImageFit::Fill => "none",
        ImageFit::Contain => "xMidYMid meet",
        ImageFit::Cover => "xMidYMid slice",
    }
}

fn href_attrs(href: &str) -> String {
    let h = escape(href);
    format!("href=\"{h}\" xlink:href=\"{h}\"")
}

/// Format a number with at most three decimals and no trailing zeros.
pub(crate) fn num(v: f64) -> String {
    if !v.is_finite() {
        return "0".to_string();
    }
    let r = (v * 1000.0).round() / 1000.0;
    if r == 0.0 {
        return "0".to_string();
    }
    let s = format!("{r:.3}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Escape text for use in XML content and attribute values.
pub(crate) fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // Control characters other than tab/newline/CR are not allowed in XML 1.0.
            c if (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r') => {}
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/render/svg.rs"]
mod tests;
