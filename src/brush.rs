use kurbo::Affine;
use vello_cpu::kurbo::Shape;

use crate::{
    core::parse_hex_color,
    model::{BrushStyle, Stroke},
    outline::{OutlineOptions, TaperEase, build_outline},
};

/// How a painted stroke combines with the content underneath it. Chosen by
/// the compositor from the brush style; no brush ever picks its own mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompositeMode {
    Over,
    Erase,
}

pub fn composite_mode_for(style: BrushStyle) -> CompositeMode {
    match style {
        BrushStyle::Eraser => CompositeMode::Erase,
        BrushStyle::Ink | BrushStyle::Spray | BrushStyle::Texture => CompositeMode::Over,
    }
}

/// Resolved per-style outline defaults, handed to the host for preview
/// strokes. Committed strokes carry their own copies of these fields.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BrushOptions {
    pub thinning: f64,
    pub smoothing: f64,
    pub streamline: f64,
    pub taper_start: f64,
    pub taper_end: f64,
    pub ease: TaperEase,
}

impl Default for BrushOptions {
    fn default() -> Self {
        Self {
            thinning: 0.5,
            smoothing: 0.5,
            streamline: 0.5,
            taper_start: 0.0,
            taper_end: 0.0,
            ease: TaperEase::Linear,
        }
    }
}

impl BrushOptions {
    pub fn for_style(style: BrushStyle) -> Self {
        match style {
            // Erasers track the pointer tightly and keep constant width.
            BrushStyle::Eraser => Self {
                thinning: 0.0,
                streamline: 0.2,
                ..Self::default()
            },
            _ => Self::default(),
        }
    }

    /// Stamp these options onto a stroke's geometry fields. The engine does
    /// this to the preview stroke each repaint, so a changed brush setting
    /// shows on the very next redraw. Committed strokes are never touched.
    pub fn apply_to(&self, stroke: &mut Stroke) {
        stroke.thinning = self.thinning;
        stroke.smoothing = self.smoothing;
        stroke.streamline = self.streamline;
        stroke.taper_start = self.taper_start;
        stroke.taper_end = self.taper_end;
    }
}

pub fn outline_options_for(stroke: &Stroke) -> OutlineOptions {
    OutlineOptions {
        size: stroke.size,
        thinning: stroke.thinning,
        smoothing: stroke.smoothing,
        streamline: stroke.streamline,
        taper_start: stroke.taper_start,
        taper_end: stroke.taper_end,
        ease: TaperEase::Linear,
    }
}

/// Paint one stroke's geometry into a render context.
///
/// The context is expected to target a cleared scratch surface; the caller
/// byte-composites the result with the mode from [`composite_mode_for`].
/// Eraser strokes take the exact ink path here. Malformed strokes are
/// skipped with a warning, never an error.
pub fn paint_stroke(ctx: &mut vello_cpu::RenderContext, stroke: &Stroke, transform: Affine) {
    if !stroke.is_renderable() {
        tracing::warn!(stroke = %stroke.id, "skipping non-renderable stroke");
        return;
    }

    let rgba = parse_hex_color(&stroke.color).unwrap_or([0, 0, 0, 255]);
    ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
    ctx.set_transform(affine_to_cpu(transform));
    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
        rgba[0], rgba[1], rgba[2], rgba[3],
    ));

    match stroke.brush_style {
        BrushStyle::Ink | BrushStyle::Eraser => {
            let poly = build_outline(&stroke.points, &outline_options_for(stroke));
            if let Some(path) = polygon_to_cpu(&poly) {
                ctx.fill_path(&path);
            }
        }
        BrushStyle::Spray => paint_spray(ctx, stroke),
        BrushStyle::Texture => paint_texture(ctx, stroke),
    }
}

/// Scatter dots around each input point. Placement is a pure function of
/// (point coordinates, point index, dot index), so repeated renders of the
/// same stroke are byte-identical and the stroke never vibrates.
fn paint_spray(ctx: &mut vello_cpu::RenderContext, stroke: &Stroke) {
    for (point_idx, p) in stroke.points.iter().enumerate() {
        if !p.is_finite() {
            continue;
        }
        let current_size = stroke.size * p.effective_pressure();
        if current_size <= 0.0 {
            continue;
        }
        let n = ((current_size * 0.3) as usize).max(3);
        let spread = current_size * 0.8;
        let dot_r = (current_size * 0.1).max(0.5);
        for dot_idx in 0..n {
            let (u, v) = scatter_unit(p.x, p.y, point_idx as u64, dot_idx as u64);
            let angle = u * std::f64::consts::PI;
            let radius = spread * v.abs().sqrt();
            let cx = p.x + angle.cos() * radius;
            let cy = p.y + angle.sin() * radius;
            ctx.fill_path(&circle_to_cpu(cx, cy, dot_r));
        }
    }
}

/// Three offset outline copies with decreasing opacity and slightly varied
/// width. Jitter uses the same deterministic hash as spray.
fn paint_texture(ctx: &mut vello_cpu::RenderContext, stroke: &Stroke) {
    let Some(anchor) = stroke.points.iter().find(|p| p.is_finite()) else {
        return;
    };
    for copy in 0..3u64 {
        let opts = OutlineOptions {
            size: stroke.size * (0.8 + copy as f64 * 0.1),
            ..outline_options_for(stroke)
        };
        let poly = build_outline(&stroke.points, &opts);
        let Some(mut path) = polygon_to_cpu(&poly) else {
            continue;
        };
        let (jx, jy) = scatter_unit(anchor.x, anchor.y, copy, 1);
        path.apply_affine(vello_cpu::kurbo::Affine::translate((
            jx * stroke.size * 0.1,
            jy * stroke.size * 0.1,
        )));
        ctx.push_opacity_layer(0.3 - copy as f32 * 0.1);
        ctx.fill_path(&path);
        ctx.pop_layer();
    }
}

/// splitmix64 finalizer. Good avalanche, no state.
pub(crate) fn mix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Deterministic jitter in `[-1, 1)^2` keyed by quantized coordinates and
/// indices. Coordinates are quantized to centipixels so equal stroke data
/// always hashes equally.
pub(crate) fn scatter_unit(x: f64, y: f64, point_idx: u64, dot_idx: u64) -> (f64, f64) {
    let qx = (x * 100.0).round() as i64 as u64;
    let qy = (y * 100.0).round() as i64 as u64;
    let h = mix64(qx ^ mix64(qy ^ mix64(point_idx ^ mix64(dot_idx))));
    let lo = (h & 0xFFFF_FFFF) as f64 / 4_294_967_296.0;
    let hi = (h >> 32) as f64 / 4_294_967_296.0;
    (lo * 2.0 - 1.0, hi * 2.0 - 1.0)
}

pub(crate) fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

pub(crate) fn polygon_to_cpu(poly: &[kurbo::Point]) -> Option<vello_cpu::kurbo::BezPath> {
    let (first, rest) = poly.split_first()?;
    let mut path = vello_cpu::kurbo::BezPath::new();
    path.move_to((first.x, first.y));
    for p in rest {
        path.line_to((p.x, p.y));
    }
    path.close_path();
    Some(path)
}

pub(crate) fn circle_to_cpu(cx: f64, cy: f64, r: f64) -> vello_cpu::kurbo::BezPath {
    vello_cpu::kurbo::Circle::new((cx, cy), r).to_path(0.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Point;

    fn stroke(style: BrushStyle) -> Stroke {
        Stroke {
            id: "s".to_string(),
            points: vec![Point::new(0.0, 0.0, 0.5), Point::new(20.0, 5.0, 0.7)],
            color: "#336699".to_string(),
            size: 6.0,
            opacity: 1.0,
            brush_style: style,
            timestamp_ms: 0,
            thinning: 0.5,
            smoothing: 0.5,
            streamline: 0.5,
            taper_start: 0.0,
            taper_end: 0.0,
        }
    }

    #[test]
    fn eraser_maps_to_erase_everything_else_to_over() {
        assert_eq!(composite_mode_for(BrushStyle::Eraser), CompositeMode::Erase);
        for style in [BrushStyle::Ink, BrushStyle::Spray, BrushStyle::Texture] {
            assert_eq!(composite_mode_for(style), CompositeMode::Over);
        }
    }

    #[test]
    fn eraser_and_ink_share_outline_geometry() {
        let ink = stroke(BrushStyle::Ink);
        let mut eraser = ink.clone();
        eraser.brush_style = BrushStyle::Eraser;
        let a = build_outline(&ink.points, &outline_options_for(&ink));
        let b = build_outline(&eraser.points, &outline_options_for(&eraser));
        assert_eq!(a, b);
    }

    #[test]
    fn scatter_is_deterministic_and_bounded() {
        for i in 0..64u64 {
            let a = scatter_unit(12.34, -56.78, 3, i);
            let b = scatter_unit(12.34, -56.78, 3, i);
            assert_eq!(a, b);
            assert!((-1.0..1.0).contains(&a.0));
            assert!((-1.0..1.0).contains(&a.1));
        }
    }

    #[test]
    fn scatter_varies_across_dot_indices() {
        let a = scatter_unit(1.0, 1.0, 0, 0);
        let b = scatter_unit(1.0, 1.0, 0, 1);
        assert_ne!(a, b);
    }

    #[test]
    fn mix64_is_not_identity_like() {
        assert_ne!(mix64(0), 0);
        assert_ne!(mix64(1), mix64(2));
    }

    #[test]
    fn polygon_to_cpu_rejects_empty() {
        assert!(polygon_to_cpu(&[]).is_none());
    }
}
