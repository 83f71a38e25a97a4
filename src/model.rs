use crate::{
    core::Point,
    error::{InklineError, InklineResult},
};

/// Brush strategy selector. Eraser strokes are structurally identical to ink
/// strokes; this tag is the only behavioral discriminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrushStyle {
    Ink,
    Eraser,
    Spray,
    Texture,
}

/// A committed freehand stroke. Append-only within its layer; edits replace
/// the layer's stroke array wholesale, never a stroke in place.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Stroke {
    pub id: String,
    pub points: Vec<Point>,
    /// Hex color string (`#rrggbb` / `#rrggbbaa`).
    pub color: String,
    pub size: f64,
    pub opacity: f64,
    pub brush_style: BrushStyle,
    pub timestamp_ms: u64,
    pub thinning: f64,
    pub smoothing: f64,
    pub streamline: f64,
    pub taper_start: f64,
    pub taper_end: f64,
}

impl Stroke {
    /// A stroke with fewer than two finite points, or a non-positive size,
    /// is a no-op, not an error.
    pub fn is_renderable(&self) -> bool {
        self.size.is_finite()
            && self.size > 0.0
            && self.opacity.is_finite()
            && self.points.iter().filter(|p| p.is_finite()).count() >= 2
    }

    pub fn validate(&self) -> InklineResult<()> {
        if self.id.trim().is_empty() {
            return Err(InklineError::validation("stroke id must be non-empty"));
        }
        if !self.size.is_finite() || self.size <= 0.0 {
            return Err(InklineError::validation(format!(
                "stroke '{}' size must be > 0",
                self.id
            )));
        }
        if !self.opacity.is_finite() || !(0.0..=1.0).contains(&self.opacity) {
            return Err(InklineError::validation(format!(
                "stroke '{}' opacity must be in [0, 1]",
                self.id
            )));
        }
        for (name, v) in [
            ("thinning", self.thinning),
            ("smoothing", self.smoothing),
            ("streamline", self.streamline),
        ] {
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                return Err(InklineError::validation(format!(
                    "stroke '{}' {name} must be in [0, 1]",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

/// Fields shared by every layer variant.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct LayerBase {
    pub id: String,
    pub name: String,
    pub visible: bool,
    /// Enforced by the document model; the renderer only reads it.
    pub locked: bool,
    pub opacity: f64,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct StrokeLayer {
    #[serde(flatten)]
    pub base: LayerBase,
    /// Rendering order = array order = z-order within the layer.
    pub strokes: Vec<Stroke>,
}

/// Placement of a raster image layer, in world units.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ImageLayer {
    #[serde(flatten)]
    pub base: LayerBase,
    /// Key into the external blob store.
    pub blob_ref: String,
    pub natural_width: f64,
    pub natural_height: f64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub rotation_deg: f64,
    pub aspect_locked: bool,
}

/// Document layer. Array index across the document is z-order, last on top.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Layer {
    Strokes(StrokeLayer),
    Image(ImageLayer),
}

impl Layer {
    pub fn base(&self) -> &LayerBase {
        match self {
            Layer::Strokes(l) => &l.base,
            Layer::Image(l) => &l.base,
        }
    }

    pub fn id(&self) -> &str {
        &self.base().id
    }

    pub fn is_visible(&self) -> bool {
        self.base().visible
    }
}

/// Background of the drawing surface. Painted in its own pass, under content;
/// structurally unreachable by any stroke, eraser included.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Background {
    #[default]
    White,
    Grid,
}

/// The serializable document consumed by the CLI and by tests. The live
/// engine never owns one of these; it pulls snapshots through accessors.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Document {
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub background: Background,
}

impl Document {
    pub fn validate(&self) -> InklineResult<()> {
        let mut seen = std::collections::BTreeSet::new();
        for layer in &self.layers {
            let base = layer.base();
            if base.id.trim().is_empty() {
                return Err(InklineError::validation("layer id must be non-empty"));
            }
            if !seen.insert(base.id.clone()) {
                return Err(InklineError::validation(format!(
                    "duplicate layer id '{}'",
                    base.id
                )));
            }
            if !base.opacity.is_finite() || !(0.0..=1.0).contains(&base.opacity) {
                return Err(InklineError::validation(format!(
                    "layer '{}' opacity must be in [0, 1]",
                    base.id
                )));
            }
            match layer {
                Layer::Strokes(l) => {
                    for stroke in &l.strokes {
                        stroke.validate()?;
                    }
                }
                Layer::Image(l) => {
                    if l.blob_ref.trim().is_empty() {
                        return Err(InklineError::validation(format!(
                            "image layer '{}' references an empty blob",
                            base.id
                        )));
                    }
                    if !(l.width.is_finite() && l.height.is_finite())
                        || l.width <= 0.0
                        || l.height <= 0.0
                    {
                        return Err(InklineError::validation(format!(
                            "image layer '{}' must have positive width/height",
                            base.id
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic_stroke(id: &str, style: BrushStyle) -> Stroke {
        Stroke {
            id: id.to_string(),
            points: vec![
                Point::new(0.0, 0.0, 0.5),
                Point::new(10.0, 0.0, 0.5),
                Point::new(10.0, 10.0, 0.5),
            ],
            color: "#000000".to_string(),
            size: 4.0,
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

    fn basic_doc() -> Document {
        Document {
            layers: vec![Layer::Strokes(StrokeLayer {
                base: LayerBase {
                    id: "l0".to_string(),
                    name: "layer 1".to_string(),
                    visible: true,
                    locked: false,
                    opacity: 1.0,
                },
                strokes: vec![basic_stroke("s0", BrushStyle::Ink)],
            })],
            background: Background::Grid,
        }
    }

    #[test]
    fn json_roundtrip_preserves_layer_tag() {
        let doc = basic_doc();
        let s = serde_json::to_string_pretty(&doc).unwrap();
        assert!(s.contains("\"type\": \"strokes\""));
        let de: Document = serde_json::from_str(&s).unwrap();
        assert_eq!(de.layers.len(), 1);
        assert_eq!(de.background, Background::Grid);
    }

    #[test]
    fn eraser_serializes_exactly_like_ink() {
        // The symmetry is load-bearing: eraser strokes must undo/redo and
        // persist through the same code paths as ink strokes.
        let mut ink = serde_json::to_value(basic_stroke("s", BrushStyle::Ink)).unwrap();
        let eraser = serde_json::to_value(basic_stroke("s", BrushStyle::Eraser)).unwrap();
        ink["brush_style"] = serde_json::Value::String("eraser".to_string());
        assert_eq!(ink, eraser);
    }

    #[test]
    fn validate_rejects_duplicate_layer_ids() {
        let mut doc = basic_doc();
        doc.layers.push(doc.layers[0].clone());
        assert!(doc.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_stroke_size() {
        let mut doc = basic_doc();
        if let Layer::Strokes(l) = &mut doc.layers[0] {
            l.strokes[0].size = 0.0;
        }
        assert!(doc.validate().is_err());
    }

    #[test]
    fn single_point_stroke_is_not_renderable() {
        let mut s = basic_stroke("s", BrushStyle::Ink);
        s.points.truncate(1);
        assert!(!s.is_renderable());
    }

    #[test]
    fn nan_points_do_not_count_toward_renderability() {
        let mut s = basic_stroke("s", BrushStyle::Ink);
        s.points = vec![
            Point::new(f64::NAN, 0.0, 0.5),
            Point::new(f64::NAN, 1.0, 0.5),
            Point::new(2.0, 2.0, 0.5),
        ];
        assert!(!s.is_renderable());
    }
}
