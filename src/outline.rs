use std::f64::consts::PI;

use kurbo::{Point as GeomPoint, Vec2};

use crate::core::Point;

/// Easing applied over a taper's length.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaperEase {
    #[default]
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
}

impl TaperEase {
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::EaseIn => t * t,
            Self::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            Self::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - ((-2.0 * t + 2.0).powi(2) / 2.0)
                }
            }
        }
    }
}

/// Geometry parameters for the variable-width outline.
///
/// The same builder serves ink, eraser and the texture base pass; the
/// brush-specific look comes from how callers use the polygon.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OutlineOptions {
    /// Full stroke diameter at pressure 1 with no thinning.
    pub size: f64,
    /// Pressure-to-width curve strength in `[0, 1]`.
    pub thinning: f64,
    /// Corner rounding of the outline rails in `[0, 1]`.
    pub smoothing: f64,
    /// Input-jitter damping in `[0, 1]`; the endpoint is always reached.
    pub streamline: f64,
    /// Taper length from the start, in world units. `<= 0` means no taper.
    pub taper_start: f64,
    /// Taper length from the end, in world units. `<= 0` means no taper.
    pub taper_end: f64,
    pub ease: TaperEase,
}

impl Default for OutlineOptions {
    fn default() -> Self {
        Self {
            size: 8.0,
            thinning: 0.5,
            smoothing: 0.5,
            streamline: 0.5,
            taper_start: 0.0,
            taper_end: 0.0,
            ease: TaperEase::Linear,
        }
    }
}

/// Consecutive samples closer than this collapse into one path point.
const MIN_DIST: f64 = 1e-3;
/// Segments per semicircular end cap.
const CAP_SEGMENTS: usize = 8;

/// Build a closed outline polygon approximating a variable-width stroke.
///
/// Degenerate input (fewer than two usable points, zero-length path) yields
/// an empty polygon; this is a no-op for callers, never an error.
pub fn build_outline(points: &[Point], opts: &OutlineOptions) -> Vec<GeomPoint> {
    if !(opts.size.is_finite() && opts.size > 0.0) {
        return Vec::new();
    }
    let raw: Vec<Point> = points.iter().copied().filter(Point::is_finite).collect();
    if raw.len() < 2 {
        return Vec::new();
    }

    // Streamline: each sample follows the previous smoothed position part of
    // the way toward the raw input. The final sample is pinned so the stroke
    // always reaches the lift-off point.
    let follow = 1.0 - 0.75 * opts.streamline.clamp(0.0, 1.0);
    let mut pts: Vec<(GeomPoint, f64)> = Vec::with_capacity(raw.len());
    pts.push((
        GeomPoint::new(raw[0].x, raw[0].y),
        raw[0].effective_pressure(),
    ));
    for p in &raw[1..] {
        let last = pts[pts.len() - 1];
        pts.push((
            GeomPoint::new(
                last.0.x + (p.x - last.0.x) * follow,
                last.0.y + (p.y - last.0.y) * follow,
            ),
            last.1 + (p.effective_pressure() - last.1) * follow,
        ));
    }
    let tail = raw[raw.len() - 1];
    let last_i = pts.len() - 1;
    pts[last_i].0 = GeomPoint::new(tail.x, tail.y);

    let mut path: Vec<(GeomPoint, f64)> = Vec::with_capacity(pts.len());
    for p in pts {
        if path.is_empty() || (p.0 - path[path.len() - 1].0).hypot() > MIN_DIST {
            path.push(p);
        }
    }
    let n = path.len();
    if n < 2 {
        return Vec::new();
    }

    let mut dist = vec![0.0f64; n];
    for i in 1..n {
        dist[i] = dist[i - 1] + (path[i].0 - path[i - 1].0).hypot();
    }
    let total = dist[n - 1];
    if total <= MIN_DIST {
        return Vec::new();
    }

    // Pressure-to-radius with independent start/end tapers multiplied in.
    let base = opts.size * 0.5;
    let thinning = opts.thinning.clamp(0.0, 1.0);
    let mut radii = Vec::with_capacity(n);
    for i in 0..n {
        let pressure = path[i].1;
        let mut r = base * (1.0 - thinning * (1.0 - pressure));
        if opts.taper_start > 0.0 && dist[i] < opts.taper_start {
            r *= opts.ease.apply(dist[i] / opts.taper_start);
        }
        if opts.taper_end > 0.0 {
            let from_end = total - dist[i];
            if from_end < opts.taper_end {
                r *= opts.ease.apply(from_end / opts.taper_end);
            }
        }
        radii.push(r.max(0.01));
    }

    // Per-point normals averaged from the adjacent segments; hairpins fall
    // back to the ahead segment so the rails never cross through the point.
    let mut normals = Vec::with_capacity(n);
    for i in 0..n {
        let ahead = if i + 1 < n {
            path[i + 1].0 - path[i].0
        } else {
            path[i].0 - path[i - 1].0
        };
        let behind = if i > 0 { path[i].0 - path[i - 1].0 } else { ahead };
        let ahead_u = unit(ahead).unwrap_or(Vec2::new(1.0, 0.0));
        let behind_u = unit(behind).unwrap_or(ahead_u);
        let dir = unit((ahead_u + behind_u) * 0.5).unwrap_or(ahead_u);
        normals.push(Vec2::new(-dir.y, dir.x));
    }

    let mut left: Vec<GeomPoint> = (0..n).map(|i| path[i].0 + normals[i] * radii[i]).collect();
    let mut right: Vec<GeomPoint> = (0..n).map(|i| path[i].0 - normals[i] * radii[i]).collect();

    // Smoothing: one neighbor-averaging pass over each rail, endpoints fixed.
    let s = opts.smoothing.clamp(0.0, 1.0) * 0.5;
    if s > 0.0 && n > 2 {
        for rail in [&mut left, &mut right] {
            let orig = rail.clone();
            for i in 1..n - 1 {
                let mid = ((orig[i - 1].to_vec2() + orig[i + 1].to_vec2()) * 0.5).to_point();
                rail[i] = orig[i].lerp(mid, s);
            }
        }
    }

    let start_dir = unit(path[1].0 - path[0].0).unwrap_or(Vec2::new(1.0, 0.0));
    let end_dir = unit(path[n - 1].0 - path[n - 2].0).unwrap_or(start_dir);

    let end_cap = if opts.taper_end > 0.0 {
        Vec::new()
    } else {
        cap_arc(path[n - 1].0, left[n - 1], end_dir)
    };
    let start_cap = if opts.taper_start > 0.0 {
        Vec::new()
    } else {
        cap_arc(path[0].0, right[0], -start_dir)
    };

    let mut poly = left;
    poly.extend(end_cap);
    poly.extend(right.into_iter().rev());
    poly.extend(start_cap);
    poly
}

fn unit(v: Vec2) -> Option<Vec2> {
    let len = v.hypot();
    if len > 1e-12 { Some(v / len) } else { None }
}

/// Semicircular cap around `center`, starting after `from` and bulging toward
/// `outward`, excluding both rail endpoints.
fn cap_arc(center: GeomPoint, from: GeomPoint, outward: Vec2) -> Vec<GeomPoint> {
    let v = from - center;
    let r = v.hypot();
    if r <= 1e-12 {
        return Vec::new();
    }
    let a0 = v.atan2();
    let plus_mid = Vec2::from_angle(a0 + PI / 2.0);
    let minus_mid = Vec2::from_angle(a0 - PI / 2.0);
    let sign = if plus_mid.dot(outward) >= minus_mid.dot(outward) {
        1.0
    } else {
        -1.0
    };
    (1..CAP_SEGMENTS)
        .map(|i| {
            let a = a0 + sign * PI * (i as f64 / CAP_SEGMENTS as f64);
            center + Vec2::from_angle(a) * r
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Rect;

    fn pts(coords: &[(f64, f64)]) -> Vec<Point> {
        coords.iter().map(|&(x, y)| Point::new(x, y, 0.5)).collect()
    }

    fn bbox(poly: &[GeomPoint]) -> Rect {
        let mut r = Rect::new(poly[0].x, poly[0].y, poly[0].x, poly[0].y);
        for p in poly {
            r = r.union_pt(*p);
        }
        r
    }

    #[test]
    fn empty_and_single_point_yield_empty_polygon() {
        let opts = OutlineOptions::default();
        assert!(build_outline(&[], &opts).is_empty());
        assert!(build_outline(&pts(&[(3.0, 3.0)]), &opts).is_empty());
    }

    #[test]
    fn coincident_points_yield_empty_polygon() {
        let opts = OutlineOptions::default();
        assert!(build_outline(&pts(&[(5.0, 5.0), (5.0, 5.0)]), &opts).is_empty());
    }

    #[test]
    fn zero_size_yields_empty_polygon() {
        let opts = OutlineOptions {
            size: 0.0,
            ..OutlineOptions::default()
        };
        assert!(build_outline(&pts(&[(0.0, 0.0), (10.0, 0.0)]), &opts).is_empty());
    }

    #[test]
    fn basic_ink_stroke_covers_its_path() {
        let opts = OutlineOptions {
            size: 4.0,
            thinning: 0.0,
            smoothing: 0.0,
            streamline: 0.0,
            ..OutlineOptions::default()
        };
        let poly = build_outline(&pts(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]), &opts);
        assert!(!poly.is_empty());
        let bb = bbox(&poly);
        // Expanded by roughly half the stroke size on every side.
        assert!(bb.x0 <= -1.0 && bb.y0 <= -1.0);
        assert!(bb.x1 >= 11.0 && bb.y1 >= 11.0);
        assert!(bb.x0 >= -3.0 && bb.y1 <= 13.0);
    }

    #[test]
    fn thinning_narrows_low_pressure_points() {
        let light = vec![Point::new(0.0, 0.0, 0.1), Point::new(10.0, 0.0, 0.1)];
        let heavy = vec![Point::new(0.0, 0.0, 1.0), Point::new(10.0, 0.0, 1.0)];
        let opts = OutlineOptions {
            size: 8.0,
            thinning: 1.0,
            smoothing: 0.0,
            streamline: 0.0,
            ..OutlineOptions::default()
        };
        let h_light = bbox(&build_outline(&light, &opts)).height();
        let h_heavy = bbox(&build_outline(&heavy, &opts)).height();
        assert!(h_light < h_heavy);
    }

    #[test]
    fn taper_removes_the_end_cap_and_narrows_the_tip() {
        let opts_none = OutlineOptions {
            size: 8.0,
            thinning: 0.0,
            smoothing: 0.0,
            streamline: 0.0,
            ..OutlineOptions::default()
        };
        let opts_taper = OutlineOptions {
            taper_end: 10.0,
            ..opts_none
        };
        let line = pts(&[(0.0, 0.0), (20.0, 0.0)]);
        let plain = bbox(&build_outline(&line, &opts_none));
        let tapered = bbox(&build_outline(&line, &opts_taper));
        // Without the end cap the tapered outline stops at the endpoint.
        assert!(tapered.x1 < plain.x1);
    }

    #[test]
    fn streamline_still_reaches_the_endpoint() {
        let opts = OutlineOptions {
            size: 2.0,
            streamline: 1.0,
            smoothing: 0.0,
            thinning: 0.0,
            ..OutlineOptions::default()
        };
        let poly = build_outline(&pts(&[(0.0, 0.0), (5.0, 0.0), (10.0, 0.0)]), &opts);
        let bb = bbox(&poly);
        assert!(bb.x1 >= 10.0);
    }

    #[test]
    fn outline_is_deterministic() {
        let input = pts(&[(0.0, 0.0), (4.0, 2.0), (9.0, 1.0), (15.0, 6.0)]);
        let opts = OutlineOptions::default();
        assert_eq!(build_outline(&input, &opts), build_outline(&input, &opts));
    }

    #[test]
    fn ease_endpoints_are_stable() {
        for ease in [
            TaperEase::Linear,
            TaperEase::EaseIn,
            TaperEase::EaseOut,
            TaperEase::EaseInOut,
        ] {
            assert_eq!(ease.apply(0.0), 0.0);
            assert_eq!(ease.apply(1.0), 1.0);
        }
    }
}
