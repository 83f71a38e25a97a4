use inkline::model::{LayerBase, StrokeLayer};
use inkline::{
    Background, BrushStyle, Document, ExportSettings, FsImageStore, ImageLayer, Layer, NoImages,
    Point, Stroke, export_jpg, export_png, export_svg,
};

fn stroke(id: &str, style: BrushStyle, points: &[(f64, f64)]) -> Stroke {
    Stroke {
        id: id.to_string(),
        points: points.iter().map(|&(x, y)| Point::new(x, y, 0.9)).collect(),
        color: "#203040".to_string(),
        size: 8.0,
        opacity: 1.0,
        brush_style: style,
        timestamp_ms: 0,
        thinning: 0.0,
        smoothing: 0.0,
        streamline: 0.0,
        taper_start: 0.0,
        taper_end: 0.0,
    }
}

fn layers_with(strokes: Vec<Stroke>) -> Vec<Layer> {
    vec![Layer::Strokes(StrokeLayer {
        base: LayerBase {
            id: "l0".to_string(),
            name: "layer".to_string(),
            visible: true,
            locked: false,
            opacity: 1.0,
        },
        strokes,
    })]
}

fn decode_png(url: &str) -> image::RgbaImage {
    let (mime, bytes) = inkline::export::decode_data_url(url).unwrap();
    assert_eq!(mime, "image/png");
    image::load_from_memory(&bytes).unwrap().to_rgba8()
}

#[test]
fn png_export_fits_content_with_padding() {
    let layers = layers_with(vec![stroke(
        "s",
        BrushStyle::Ink,
        &[(0.0, 0.0), (100.0, 100.0)],
    )]);
    let url = export_png(
        &layers,
        Background::White,
        300,
        200,
        &ExportSettings::default(),
        &NoImages,
    )
    .unwrap();
    let img = decode_png(&url);
    assert_eq!(img.dimensions(), (300, 200));

    let mut inked = 0usize;
    for (x, y, p) in img.enumerate_pixels() {
        if p.0 != [255, 255, 255, 255] {
            inked += 1;
            assert!(x > 0 && y > 0 && x < 299 && y < 199, "content at edge ({x},{y})");
        }
    }
    assert!(inked > 100);
}

#[test]
fn eraser_strokes_cut_holes_in_raster_export() {
    let ink = stroke("ink", BrushStyle::Ink, &[(0.0, 50.0), (100.0, 50.0)]);
    let mut eraser = stroke("e", BrushStyle::Eraser, &[(50.0, 0.0), (50.0, 100.0)]);
    eraser.size = 20.0;

    let solid = export_png(
        &layers_with(vec![ink.clone()]),
        Background::White,
        200,
        200,
        &ExportSettings {
            transparent_background: true,
            ..ExportSettings::default()
        },
        &NoImages,
    )
    .unwrap();
    let erased = export_png(
        &layers_with(vec![ink, eraser]),
        Background::White,
        200,
        200,
        &ExportSettings {
            transparent_background: true,
            ..ExportSettings::default()
        },
        &NoImages,
    )
    .unwrap();

    let solid_alpha: u64 = decode_png(&solid).pixels().map(|p| u64::from(p.0[3])).sum();
    let erased_alpha: u64 = decode_png(&erased).pixels().map(|p| u64::from(p.0[3])).sum();
    assert!(erased_alpha < solid_alpha);
}

#[test]
fn grid_background_appears_in_raster_export() {
    let layers = layers_with(vec![stroke(
        "s",
        BrushStyle::Ink,
        &[(0.0, 0.0), (200.0, 200.0)],
    )]);
    let url = export_png(
        &layers,
        Background::Grid,
        256,
        256,
        &ExportSettings::default(),
        &NoImages,
    )
    .unwrap();
    let img = decode_png(&url);
    // Grid grays are light and slightly blue-leaning, distinct from both
    // the white background and the dark ink.
    let grid_px = img
        .pixels()
        .filter(|p| p.0[0] >= 180 && p.0[0] < 255 && p.0[2] >= p.0[0] && p.0[3] == 255)
        .count();
    assert!(grid_px > 0);
}

#[test]
fn jpeg_export_is_always_opaque() {
    let layers = layers_with(vec![stroke("s", BrushStyle::Ink, &[(0.0, 0.0), (50.0, 50.0)])]);
    let url = export_jpg(
        &layers,
        Background::White,
        100,
        100,
        &ExportSettings {
            transparent_background: true,
            quality: 70,
            ..ExportSettings::default()
        },
        &NoImages,
    )
    .unwrap();
    let (mime, bytes) = inkline::export::decode_data_url(&url).unwrap();
    assert_eq!(mime, "image/jpeg");
    let img = image::load_from_memory(&bytes).unwrap().to_rgba8();
    assert!(img.pixels().all(|p| p.0[3] == 255));
}

#[test]
fn svg_export_mirrors_raster_framing_decisions() {
    let mut layers = layers_with(vec![stroke(
        "ink",
        BrushStyle::Ink,
        &[(0.0, 0.0), (100.0, 100.0)],
    )]);
    if let Layer::Strokes(sl) = &mut layers[0] {
        let mut eraser = stroke("e", BrushStyle::Eraser, &[(10.0, 10.0), (90.0, 90.0)]);
        eraser.brush_style = BrushStyle::Eraser;
        sl.strokes.push(eraser);
    }
    let url = export_svg(
        &layers,
        Background::Grid,
        300,
        200,
        &ExportSettings::default(),
        &NoImages,
    )
    .unwrap();
    let (mime, bytes) = inkline::export::decode_data_url(&url).unwrap();
    assert_eq!(mime, "image/svg+xml");
    let svg = String::from_utf8(bytes).unwrap();

    assert!(svg.starts_with("<svg"));
    assert!(svg.contains(r#"width="300""#));
    assert!(svg.contains(r#"height="200""#));
    // One path for the ink stroke, none for the eraser.
    assert_eq!(svg.matches("<path").count(), 1);
    assert!(svg.contains("#203040"));
    assert!(svg.contains("<line"));
    assert!(svg.contains("translate("));
}

#[test]
fn image_layer_renders_from_filesystem_store() {
    let dir = std::env::temp_dir().join("inkline-export-it");
    std::fs::create_dir_all(&dir).unwrap();
    let blob = "solid.png";
    let img = image::RgbaImage::from_pixel(4, 4, image::Rgba([0, 200, 0, 255]));
    img.save(dir.join(blob)).unwrap();

    let layers = vec![Layer::Image(ImageLayer {
        base: LayerBase {
            id: "img".to_string(),
            name: "image".to_string(),
            visible: true,
            locked: false,
            opacity: 1.0,
        },
        blob_ref: blob.to_string(),
        natural_width: 4.0,
        natural_height: 4.0,
        x: 0.0,
        y: 0.0,
        width: 80.0,
        height: 80.0,
        rotation_deg: 0.0,
        aspect_locked: true,
    })];

    let url = export_png(
        &layers,
        Background::White,
        128,
        128,
        &ExportSettings::default(),
        &FsImageStore::new(&dir),
    )
    .unwrap();
    let out = decode_png(&url);
    let green = out.pixels().filter(|p| p.0[1] > 150 && p.0[0] < 100).count();
    assert!(green > 100);
}

#[test]
fn document_json_roundtrips_through_export() {
    let doc = Document {
        layers: layers_with(vec![stroke("s", BrushStyle::Ink, &[(0.0, 0.0), (40.0, 10.0)])]),
        background: Background::White,
    };
    doc.validate().unwrap();
    let json = serde_json::to_string(&doc).unwrap();
    let parsed: Document = serde_json::from_str(&json).unwrap();
    let url = export_png(
        &parsed.layers,
        parsed.background,
        100,
        100,
        &ExportSettings::default(),
        &NoImages,
    )
    .unwrap();
    assert!(url.starts_with("data:image/png;base64,"));
}
