use std::fmt::Write as _;
use std::io::Cursor;
use std::path::Path;

use anyhow::Context;
use base64::Engine as _;
use image::ImageEncoder as _;
use kurbo::{Affine, Point as GeomPoint, Rect};

use crate::{
    brush::outline_options_for,
    composite,
    core::Viewport,
    error::{InklineError, InklineResult},
    images::{ImageCache, ImageStore},
    model::{Background, BrushStyle, Layer},
    outline::build_outline,
    raster::{GRID_MAJOR_EVERY, GRID_STEP, Rasterizer},
    surface::Surface,
};

/// Fraction of the larger content span added as padding on every side.
const BOUNDS_PAD_FRACTION: f64 = 0.05;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExportSettings {
    /// Output resolution multiplier on top of the requested dimensions.
    pub scale: f64,
    /// JPEG quality, 1..=100.
    pub quality: u8,
    /// Omit the background entirely (PNG/SVG; JPEG has no alpha and always
    /// gets a white background).
    pub transparent_background: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            scale: 1.0,
            quality: 85,
            transparent_background: false,
        }
    }
}

impl ExportSettings {
    fn validate(&self, width: u32, height: u32) -> InklineResult<()> {
        if width == 0 || height == 0 {
            return Err(InklineError::validation(
                "export dimensions must be positive",
            ));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(InklineError::validation("export scale must be > 0"));
        }
        if !(1..=100).contains(&self.quality) {
            return Err(InklineError::validation("jpeg quality must be in 1..=100"));
        }
        Ok(())
    }
}

/// World-to-output mapping shared by the raster and SVG paths, so both
/// produce the same framing by construction.
struct Framing {
    px_w: u32,
    px_h: u32,
    fit: f64,
    tx: f64,
    ty: f64,
}

impl Framing {
    fn view(&self) -> Affine {
        Affine::translate((self.tx, self.ty)) * Affine::scale(self.fit)
    }

    fn viewport(&self) -> Viewport {
        Viewport::new(self.tx, self.ty, self.fit)
    }
}

fn compute_framing(
    layers: &[Layer],
    width: u32,
    height: u32,
    settings: &ExportSettings,
) -> InklineResult<Framing> {
    settings.validate(width, height)?;
    let px_w = ((f64::from(width) * settings.scale).round() as u32).max(1);
    let px_h = ((f64::from(height) * settings.scale).round() as u32).max(1);

    let bounds = content_bounds(layers)
        .unwrap_or_else(|| Rect::new(0.0, 0.0, f64::from(width), f64::from(height)));
    let pad = BOUNDS_PAD_FRACTION * bounds.width().max(bounds.height()).max(1.0);
    let padded = bounds.inflate(pad, pad);

    let fit = (f64::from(px_w) / padded.width()).min(f64::from(px_h) / padded.height());
    let tx = (f64::from(px_w) - padded.width() * fit) / 2.0 - padded.x0 * fit;
    let ty = (f64::from(px_h) - padded.height() * fit) / 2.0 - padded.y0 * fit;
    Ok(Framing {
        px_w,
        px_h,
        fit,
        tx,
        ty,
    })
}

/// Union of all visible content: stroke outlines grown by half their size,
/// image placements with rotation applied. `None` when nothing is visible.
fn content_bounds(layers: &[Layer]) -> Option<Rect> {
    let mut acc: Option<Rect> = None;
    let mut add = |r: Rect| {
        acc = Some(match acc {
            Some(a) => a.union(r),
            None => r,
        });
    };

    for layer in layers {
        if !layer.is_visible() {
            continue;
        }
        match layer {
            Layer::Strokes(sl) => {
                for stroke in &sl.strokes {
                    if !stroke.is_renderable() {
                        continue;
                    }
                    let half = stroke.size / 2.0;
                    for p in stroke.points.iter().filter(|p| p.is_finite()) {
                        add(Rect::new(p.x - half, p.y - half, p.x + half, p.y + half));
                    }
                }
            }
            Layer::Image(il) => {
                let center =
                    GeomPoint::new(il.x + il.width / 2.0, il.y + il.height / 2.0);
                let rot = Affine::rotate_about(il.rotation_deg.to_radians(), center);
                for (cx, cy) in [
                    (il.x, il.y),
                    (il.x + il.width, il.y),
                    (il.x + il.width, il.y + il.height),
                    (il.x, il.y + il.height),
                ] {
                    let p = rot * GeomPoint::new(cx, cy);
                    add(Rect::new(p.x, p.y, p.x, p.y));
                }
            }
        }
    }
    acc
}

/// Resolve every visible image blob before any pixel is painted. A failed
/// load is logged and its layer skipped at paint time.
fn preload_images(layers: &[Layer], cache: &mut ImageCache, store: &dyn ImageStore) {
    for layer in layers {
        if let Layer::Image(il) = layer
            && il.base.visible
            && !cache.contains(&il.blob_ref)
            && let Err(err) = cache.resolve(&il.blob_ref, store)
        {
            tracing::warn!(layer = %il.base.id, %err, "export image unavailable, layer skipped");
        }
    }
}

/// The raster paint pass, identical to the live engine's frame pass.
fn render_raster(
    layers: &[Layer],
    background: Background,
    framing: &Framing,
    transparent: bool,
    store: &dyn ImageStore,
) -> InklineResult<Surface> {
    let mut raster = Rasterizer::new(framing.px_w, framing.px_h)?;
    let mut content = Surface::new(framing.px_w, framing.px_h)?;
    let mut cache = ImageCache::new();
    preload_images(layers, &mut cache, store);

    let view = framing.view();
    for layer in layers {
        if !layer.is_visible() {
            continue;
        }
        match layer {
            Layer::Strokes(sl) => {
                for stroke in &sl.strokes {
                    let opacity = (stroke.opacity * sl.base.opacity) as f32;
                    raster.paint_stroke_onto(&mut content, stroke, view, opacity)?;
                }
            }
            Layer::Image(il) => {
                let Some(paint) = cache.get(&il.blob_ref) else {
                    continue;
                };
                raster.paint_image_onto(&mut content, il, paint, view, il.base.opacity as f32)?;
            }
        }
    }

    if !transparent {
        let mut bg = Surface::new(framing.px_w, framing.px_h)?;
        raster.paint_background(&mut bg, background, framing.viewport())?;
        composite::under_in_place(content.data_mut(), bg.data(), 1.0)?;
    }
    Ok(content)
}

pub fn export_png(
    layers: &[Layer],
    background: Background,
    width: u32,
    height: u32,
    settings: &ExportSettings,
    store: &dyn ImageStore,
) -> InklineResult<String> {
    let framing = compute_framing(layers, width, height, settings)?;
    let surface = render_raster(
        layers,
        background,
        &framing,
        settings.transparent_background,
        store,
    )?;
    let rgba = image::RgbaImage::from_raw(framing.px_w, framing.px_h, surface.to_unpremul_rgba8())
        .ok_or_else(|| InklineError::export("png buffer size mismatch"))?;
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(rgba)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .context("encode png")?;
    Ok(data_url("image/png", &buf))
}

pub fn export_jpg(
    layers: &[Layer],
    background: Background,
    width: u32,
    height: u32,
    settings: &ExportSettings,
    store: &dyn ImageStore,
) -> InklineResult<String> {
    let framing = compute_framing(layers, width, height, settings)?;
    // JPEG carries no alpha, so the background is always composited in.
    let surface = render_raster(layers, background, &framing, false, store)?;
    let rgba = image::RgbaImage::from_raw(framing.px_w, framing.px_h, surface.to_unpremul_rgba8())
        .ok_or_else(|| InklineError::export("jpeg buffer size mismatch"))?;
    let rgb = image::DynamicImage::ImageRgba8(rgba).to_rgb8();
    let mut buf = Vec::new();
    let encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(Cursor::new(&mut buf), settings.quality);
    encoder
        .write_image(
            rgb.as_raw(),
            framing.px_w,
            framing.px_h,
            image::ExtendedColorType::Rgb8,
        )
        .context("encode jpeg")?;
    Ok(data_url("image/jpeg", &buf))
}

/// Vector export. Each non-eraser stroke becomes one filled `<path>` from
/// the same outline polygon the raster path fills; eraser strokes and image
/// layers are omitted from SVG output.
pub fn export_svg(
    layers: &[Layer],
    background: Background,
    width: u32,
    height: u32,
    settings: &ExportSettings,
    _store: &dyn ImageStore,
) -> InklineResult<String> {
    let framing = compute_framing(layers, width, height, settings)?;
    let (w, h) = (framing.px_w, framing.px_h);

    let mut svg = String::new();
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#
    );

    if !settings.transparent_background {
        svg.push_str(r##"<rect width="100%" height="100%" fill="#ffffff"/>"##);
        if background == Background::Grid {
            write_svg_grid(&mut svg, &framing);
        }
    }

    let _ = write!(
        svg,
        r#"<g transform="translate({:.3} {:.3}) scale({:.6})">"#,
        framing.tx, framing.ty, framing.fit
    );
    for layer in layers {
        let Layer::Strokes(sl) = layer else { continue };
        if !sl.base.visible {
            continue;
        }
        for stroke in &sl.strokes {
            if stroke.brush_style == BrushStyle::Eraser || !stroke.is_renderable() {
                continue;
            }
            let poly = build_outline(&stroke.points, &outline_options_for(stroke));
            let Some(d) = polygon_to_svg_path(&poly) else {
                continue;
            };
            let opacity = (stroke.opacity * sl.base.opacity).clamp(0.0, 1.0);
            let _ = write!(
                svg,
                r#"<path d="{d}" fill="{}" fill-opacity="{opacity:.3}"/>"#,
                stroke.color
            );
        }
    }
    svg.push_str("</g></svg>");

    Ok(data_url("image/svg+xml", svg.as_bytes()))
}

fn write_svg_grid(svg: &mut String, framing: &Framing) {
    let step = GRID_STEP * framing.fit;
    if !(step.is_finite() && step > 2.0) {
        return;
    }
    let (w, h) = (f64::from(framing.px_w), f64::from(framing.px_h));
    // Lines are indexed in world grid steps so the raster's major/minor
    // alternation survives into the markup.
    let x0 = (-framing.tx / step).ceil() as i64;
    let x1 = ((w - framing.tx) / step).floor() as i64;
    for k in x0..=x1 {
        let x = framing.tx + k as f64 * step;
        let _ = write!(
            svg,
            r#"<line x1="{x:.2}" y1="0" x2="{x:.2}" y2="{h:.2}" stroke="{}" stroke-width="1"/>"#,
            svg_grid_color(k)
        );
    }
    let y0 = (-framing.ty / step).ceil() as i64;
    let y1 = ((h - framing.ty) / step).floor() as i64;
    for k in y0..=y1 {
        let y = framing.ty + k as f64 * step;
        let _ = write!(
            svg,
            r#"<line x1="0" y1="{y:.2}" x2="{w:.2}" y2="{y:.2}" stroke="{}" stroke-width="1"/>"#,
            svg_grid_color(k)
        );
    }
}

fn svg_grid_color(k: i64) -> &'static str {
    if k.rem_euclid(GRID_MAJOR_EVERY) == 0 {
        "#d1d5db"
    } else {
        "#e5e7eb"
    }
}

fn polygon_to_svg_path(poly: &[GeomPoint]) -> Option<String> {
    let (first, rest) = poly.split_first()?;
    let mut d = String::with_capacity(poly.len() * 12);
    let _ = write!(d, "M{:.2} {:.2}", first.x, first.y);
    for p in rest {
        let _ = write!(d, "L{:.2} {:.2}", p.x, p.y);
    }
    d.push('Z');
    Some(d)
}

fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{mime};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Decode a data URL produced by the exporters and write its payload to
/// disk. The file-download counterpart for non-browser hosts.
pub fn write_data_url(url: &str, path: &Path) -> InklineResult<()> {
    let payload = url
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(";base64,"))
        .map(|(_, b64)| b64)
        .ok_or_else(|| InklineError::export("not a base64 data url"))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .context("decode data url payload")?;
    std::fs::write(path, bytes).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Split a data URL into its mime type and decoded payload.
pub fn decode_data_url(url: &str) -> InklineResult<(String, Vec<u8>)> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| InklineError::export("not a data url"))?;
    let (mime, b64) = rest
        .split_once(";base64,")
        .ok_or_else(|| InklineError::export("not a base64 data url"))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(b64)
        .context("decode data url payload")?;
    Ok((mime.to_string(), bytes))
}
