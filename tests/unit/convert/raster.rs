use super::*;
use crate::convert::format::ConvertOptions;
use crate::design::model::{Background, Design};
use crate::foundation::core::Canvas;
use crate::render::renderer::render;

fn red_square() -> Document {
    let mut d = Design::new("raster", Canvas::new(40, 20).unwrap()).unwrap();
    d.background = Background::Transparent;
    d.add_layer(
        "shape",
        serde_json::json!({ "fill": "#ff0000", "width": 20, "height": 20 }),
        None,
    )
    .unwrap();
    render(&d).unwrap()
}

fn request(dir: &std::path::Path, format: ExportFormat, options: ConvertOptions) -> ConvertRequest {
    ConvertRequest {
        format,
        options,
        output_path: dir.join(format!("out.{}", format.extension())),
    }
}

#[test]
fn png_pixels_match_document() {
    let dir = tempfile::tempdir().unwrap();
    let conv = RasterConverter::default();
    let handle = conv
        .convert(
            &red_square(),
            &request(
                dir.path(),
                ExportFormat::Png,
                ConvertOptions {
                    transparent: true,
                    ..ConvertOptions::default()
                },
            ),
        )
        .unwrap();
    assert_eq!(handle.mime_type, "image/png");

    let img = image::open(&handle.path).unwrap().to_rgba8();
    assert_eq!(img.dimensions(), (40, 20));
    assert_eq!(img.get_pixel(5, 5).0, [255, 0, 0, 255]);
    assert_eq!(img.get_pixel(35, 5).0[3], 0);
}

#[test]
fn width_option_scales_output() {
    let dir = tempfile::tempdir().unwrap();
    let handle = RasterConverter::default()
        .convert(
            &red_square(),
            &request(
                dir.path(),
                ExportFormat::Jpg,
                ConvertOptions {
                    width: Some(80),
                    ..ConvertOptions::default()
                },
            ),
        )
        .unwrap();
    let img = image::open(&handle.path).unwrap().to_rgb8();
    assert_eq!(img.dimensions(), (80, 40));
    // transparent background is filled white for jpg
    let px = img.get_pixel(75, 35).0;
    assert!(px.iter().all(|c| *c > 240), "{px:?}");
}

#[test]
fn unsupported_formats_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let err = RasterConverter::default()
        .convert(
            &red_square(),
            &request(dir.path(), ExportFormat::Mp4, ConvertOptions::default()),
        )
        .unwrap_err();
    assert_eq!(err.code(), "conversion");
    assert!(!RasterConverter::supports(ExportFormat::Pdf));
    assert!(RasterConverter::supports(ExportFormat::Svg));
}

#[test]
fn demultiply_restores_straight_alpha() {
    assert_eq!(demultiply(&[64, 0, 0, 128]), vec![128, 0, 0, 128]);
    assert_eq!(demultiply(&[0, 0, 0, 0]), vec![0, 0, 0, 0]);
    assert_eq!(demultiply(&[1, 2, 3, 255]), vec![1, 2, 3, 255]);
}
