pub use kurbo::{Affine, BezPath, Point as GeomPoint, Rect, Vec2};

/// A single captured input sample in world space.
///
/// Immutable once recorded; renderers read it, nothing mutates it.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    /// Stylus pressure in `[0, 1]`. Zero or non-finite values are treated as
    /// 0.5 by renderers so strokes never vanish on devices without pressure.
    pub pressure: f64,
}

impl Point {
    pub fn new(x: f64, y: f64, pressure: f64) -> Self {
        Self { x, y, pressure }
    }

    /// Pressure with the renderer-side default applied.
    pub fn effective_pressure(&self) -> f64 {
        if self.pressure.is_finite() && self.pressure > 0.0 {
            self.pressure.min(1.0)
        } else {
            0.5
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Pan/zoom state defining the affine map `screen = world * zoom + pan`.
///
/// Zoom is clamped to a sane range by the document store; the renderer only
/// requires it to be positive and finite.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Viewport {
    pub pan_x: f64,
    pub pan_y: f64,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            pan_x: 0.0,
            pan_y: 0.0,
            zoom: 1.0,
        }
    }
}

impl Viewport {
    pub fn new(pan_x: f64, pan_y: f64, zoom: f64) -> Self {
        Self { pan_x, pan_y, zoom }
    }

    /// World → screen affine, applied once per frame by the compositor.
    pub fn to_affine(&self) -> Affine {
        Affine::translate((self.pan_x, self.pan_y)) * Affine::scale(self.zoom)
    }

    pub fn world_to_screen(&self, p: GeomPoint) -> GeomPoint {
        GeomPoint::new(p.x * self.zoom + self.pan_x, p.y * self.zoom + self.pan_y)
    }

    pub fn screen_to_world(&self, p: GeomPoint) -> GeomPoint {
        GeomPoint::new((p.x - self.pan_x) / self.zoom, (p.y - self.pan_y) / self.zoom)
    }
}

/// Presentational cursor overlay state in screen space. Not part of the
/// document model and excluded from export.
#[derive(Clone, Copy, Debug, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct CursorState {
    pub visible: bool,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
}

/// Parse `#rgb` / `#rrggbb` / `#rrggbbaa` into straight-alpha RGBA8.
///
/// Returns `None` for anything else; callers fall back to opaque black, the
/// same recover-don't-fail rule as malformed stroke data.
pub fn parse_hex_color(s: &str) -> Option<[u8; 4]> {
    let hex = s.trim().strip_prefix('#')?;
    let nibble = |c: u8| -> Option<u8> {
        match c {
            b'0'..=b'9' => Some(c - b'0'),
            b'a'..=b'f' => Some(c - b'a' + 10),
            b'A'..=b'F' => Some(c - b'A' + 10),
            _ => None,
        }
    };
    let byte = |hi: u8, lo: u8| -> Option<u8> { Some(nibble(hi)? << 4 | nibble(lo)?) };

    let b = hex.as_bytes();
    match b.len() {
        3 => {
            let r = nibble(b[0])?;
            let g = nibble(b[1])?;
            let bl = nibble(b[2])?;
            Some([r << 4 | r, g << 4 | g, bl << 4 | bl, 255])
        }
        6 => Some([byte(b[0], b[1])?, byte(b[2], b[3])?, byte(b[4], b[5])?, 255]),
        8 => Some([
            byte(b[0], b[1])?,
            byte(b[2], b[3])?,
            byte(b[4], b[5])?,
            byte(b[6], b[7])?,
        ]),
        _ => None,
    }
}
