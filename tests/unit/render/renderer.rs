use super::*;
use crate::design::model::{ImageFit, MaskShape};
use crate::foundation::core::Canvas;

fn design() -> Design {
    Design::new("r", Canvas::new(400, 300).unwrap()).unwrap()
}

#[test]
fn no_visible_layers_yields_background_only() {
    let mut d = design();
    let g = d.add_layer("group", serde_json::Value::Null, None).unwrap();
    d.add_layer("shape", serde_json::json!({ "visible": false }), None)
        .unwrap();
    d.add_layer("text", serde_json::json!({ "content": "x" }), Some(g))
        .unwrap();
    d.set_visibility(g, false).unwrap();

    let doc = render(&d).unwrap();
    assert!(doc.is_empty());
    assert_eq!((doc.width, doc.height), (400, 300));
    assert_eq!(doc.background, Background::default());
}

#[test]
fn primitives_follow_z_order() {
    let mut d = design();
    let rect = d
        .add_layer(
            "shape",
            serde_json::json!({ "shapeType": "rectangle", "fill": "red" }),
            None,
        )
        .unwrap();
    let text = d
        .add_layer("text", serde_json::json!({ "content": "Hi" }), None)
        .unwrap();
    let doc = render(&d).unwrap();
    let order: Vec<LayerId> = doc.primitives.iter().map(|p| p.layer).collect();
    assert_eq!(order, vec![rect, text]);

    d.move_to_bottom(text).unwrap();
    let doc = render(&d).unwrap();
    let order: Vec<LayerId> = doc.primitives.iter().map(|p| p.layer).collect();
    assert_eq!(order, vec![text, rect]);
}

#[test]
fn text_defaults_apply() {
    let mut d = design();
    d.add_layer(
        "text",
        serde_json::json!({ "content": "a\nb", "color": "not a color!", "textAlign": "center", "width": 80 }),
        None,
    )
    .unwrap();
    let doc = render(&d).unwrap();
    let PrimitiveContent::Text(run) = &doc.primitives[0].content else {
        panic!("expected text");
    };
    assert_eq!(run.lines, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(run.font_family, DEFAULT_FONT_FAMILY);
    assert_eq!(run.font_size, DEFAULT_FONT_SIZE);
    assert_eq!(run.font_weight, DEFAULT_FONT_WEIGHT);
    assert_eq!(run.color, DEFAULT_TEXT_COLOR);
    assert_eq!(run.anchor, TextAnchor::Middle);
    assert_eq!(run.x, 40.0);
}

#[test]
fn shape_geometry_per_type() {
    let mut d = design();
    for ty in ["circle", "ellipse", "line", "triangle", "polygon"] {
        d.add_layer(
            "shape",
            serde_json::json!({ "shapeType": ty, "width": 40, "height": 20, "sides": 5 }),
            None,
        )
        .unwrap();
    }
    let doc = render(&d).unwrap();
    let shapes: Vec<&ShapePrimitive> = doc
        .primitives
        .iter()
        .map(|p| match &p.content {
            PrimitiveContent::Shape(s) => s,
            other => panic!("unexpected {other:?}"),
        })
        .collect();

    assert_eq!(
        shapes[0].geometry,
        ShapeGeometry::Circle {
            cx: 20.0,
            cy: 10.0,
            r: 10.0
        }
    );
    assert_eq!(shapes[0].fill, DEFAULT_FILL);
    assert!(matches!(shapes[1].geometry, ShapeGeometry::Ellipse { rx, ry, .. } if rx == 20.0 && ry == 10.0));
    assert_eq!(shapes[2].fill, "none");
    assert_eq!(shapes[2].stroke.as_ref().unwrap().color, DEFAULT_FILL);
    let ShapeGeometry::Polygon { points } = &shapes[3].geometry else {
        panic!("triangle is a polygon");
    };
    assert_eq!(points.len(), 3);
    let ShapeGeometry::Polygon { points } = &shapes[4].geometry else {
        panic!("expected polygon");
    };
    assert_eq!(points.len(), 5);
    assert!((points[0][0] - 20.0).abs() < 1e-9);
    assert!(points[0][1].abs() < 1e-9);
}

#[test]
fn unsupported_shape_emits_nothing() {
    let mut d = design();
    d.add_layer("shape", serde_json::json!({ "shapeType": "star" }), None)
        .unwrap();
    let doc = render(&d).unwrap();
    assert!(doc.is_empty());
}

#[test]
fn corner_radius_is_clamped() {
    let mut d = design();
    d.add_layer(
        "shape",
        serde_json::json!({ "width": 10, "height": 30, "cornerRadius": 50 }),
        None,
    )
    .unwrap();
    let doc = render(&d).unwrap();
    let PrimitiveContent::Shape(s) = &doc.primitives[0].content else {
        panic!("expected shape");
    };
    assert!(
        matches!(s.geometry, ShapeGeometry::Rect { corner_radius, .. } if corner_radius == 5.0)
    );
}

#[test]
fn transform_mask_and_animations_carry_over() {
    let mut d = design();
    d.add_layer(
        "image",
        serde_json::json!({
            "src": "assets/logo.png",
            "fit": "cover",
            "x": 10, "y": 20, "rotation": 30, "scaleX": 2, "opacity": 0.25,
            "mask": { "shape": "circle", "width": 50, "height": 50 },
            "animations": [{ "kind": "scaleIn" }]
        }),
        None,
    )
    .unwrap();
    let opts = RenderOptions {
        animation: Some(AnimationSettings {
            duration_ms: 1_000,
            fps: 10,
            loop_playback: false,
        }),
        asset_root: Some(PathBuf::from("/srv/blobs")),
    };
    let doc = render_with(&d, &opts).unwrap();
    let p = &doc.primitives[0];
    assert_eq!(p.transform.translate, Vec2::new(10.0, 20.0));
    assert_eq!(p.transform.rotate_deg, 30.0);
    assert_eq!(p.transform.scale, Vec2::new(2.0, 1.0));
    assert_eq!(p.opacity, 0.25);
    assert_eq!(p.clip.unwrap().shape, MaskShape::Circle);
    assert_eq!(p.animations.len(), 1);
    assert_eq!(doc.animation.unwrap().fps, 10);

    let PrimitiveContent::Image(img) = &p.content else {
        panic!("expected image");
    };
    assert_eq!(
        PathBuf::from(&img.href),
        PathBuf::from("/srv/blobs").join("assets/logo.png")
    );
    assert_eq!(img.fit, ImageFit::Cover);
}

#[test]
fn urls_are_not_resolved() {
    assert_eq!(
        resolve_href("https://cdn/x.png", Some(Path::new("/root"))),
        "https://cdn/x.png"
    );
    assert_eq!(resolve_href("rel.png", None), "rel.png");
}

#[test]
fn broken_tree_is_a_render_error() {
    let mut d = design();
    let a = d.add_layer("group", serde_json::Value::Null, None).unwrap();
    d.layers.get_mut(&a).unwrap().parent = Some(a);
    assert!(matches!(render(&d), Err(StratumError::Render(_))));
}

#[test]
fn document_is_plain_json() {
    let mut d = design();
    d.add_layer("shape", serde_json::json!({ "fill": "#123456" }), None)
        .unwrap();
    let doc = render(&d).unwrap();
    let json = serde_json::to_value(&doc).unwrap();
    assert_eq!(json["primitives"][0]["content"]["kind"], "shape");
    assert_eq!(json["primitives"][0]["content"]["geometry"]["type"], "rect");
    let back: Document = serde_json::from_value(json).unwrap();
    assert_eq!(back, doc);
}
