use kurbo::Point as GeomPoint;

use crate::{
    brush::BrushOptions,
    core::{CursorState, Viewport},
    error::InklineResult,
    images::{ImageCache, ImageStore},
    model::{Background, BrushStyle, Layer, Stroke},
    raster::Rasterizer,
    surface::Surface,
    transform,
};

/// Read-only view of the host's document. The engine owns no document data;
/// every frame pulls a fresh snapshot through these accessors, so host-side
/// edits can never race a repaint.
pub trait DocumentSource {
    /// All layers, ascending z-order.
    fn layers(&self) -> Vec<Layer>;

    fn active_layer_id(&self) -> Option<String> {
        None
    }

    /// Layer whose transform handles the overlay shows, if any.
    fn selected_layer_id(&self) -> Option<String> {
        None
    }

    /// Committed strokes of the active layer.
    fn strokes(&self) -> Vec<Stroke> {
        let Some(id) = self.active_layer_id() else {
            return Vec::new();
        };
        self.layers()
            .into_iter()
            .find_map(|l| match l {
                Layer::Strokes(sl) if sl.base.id == id => Some(sl.strokes),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Resolved outline defaults for an in-progress preview stroke.
    fn brush_options(&self, style: BrushStyle, _size: f64) -> BrushOptions {
        BrushOptions::for_style(style)
    }
}

const CURSOR_RING_RGBA: [u8; 4] = [0x37, 0x41, 0x51, 0xB4];
const CURSOR_RING_THICKNESS: f64 = 1.5;
const HANDLE_FILL_RGBA: [u8; 4] = [0x3B, 0x82, 0xF6, 0xFF];
const HANDLE_DRAW_PX: f64 = 5.0;

/// The layer compositor and frame loop.
///
/// Holds three device-sized surfaces. Content carries every painted layer
/// and is the only surface strokes can composite into; the background is
/// slid underneath afterwards, so no eraser can reach it. The overlay is
/// screen-space chrome and never appears in exports.
pub struct CanvasEngine {
    raster: Rasterizer,
    background_surface: Surface,
    content: Surface,
    overlay: Surface,
    frame: Surface,
    viewport: Viewport,
    background: Background,
    background_dirty: bool,
    preview: Option<Stroke>,
    cursor: CursorState,
    images: ImageCache,
    request_frame: Option<Box<dyn FnMut()>>,
    pending: bool,
    destroyed: bool,
}

impl CanvasEngine {
    pub fn new(width: u32, height: u32) -> InklineResult<Self> {
        Ok(Self {
            raster: Rasterizer::new(width, height)?,
            background_surface: Surface::new(width, height)?,
            content: Surface::new(width, height)?,
            overlay: Surface::new(width, height)?,
            frame: Surface::new(width, height)?,
            viewport: Viewport::default(),
            background: Background::default(),
            background_dirty: true,
            preview: None,
            cursor: CursorState::default(),
            images: ImageCache::new(),
            request_frame: None,
            pending: false,
            destroyed: false,
        })
    }

    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Host callback fired when a repaint becomes pending. At most one call
    /// per pending window, no matter how many invalidations arrive.
    pub fn set_request_frame(&mut self, cb: impl FnMut() + 'static) {
        self.request_frame = Some(Box::new(cb));
    }

    pub fn resize(&mut self, width: u32, height: u32) -> InklineResult<()> {
        if self.destroyed {
            return Ok(());
        }
        self.raster.resize(width, height)?;
        self.background_surface.ensure_size(width, height)?;
        self.content.ensure_size(width, height)?;
        self.overlay.ensure_size(width, height)?;
        self.frame.ensure_size(width, height)?;
        self.background_dirty = true;
        self.invalidate();
        Ok(())
    }

    pub fn set_pan_zoom(&mut self, pan_x: f64, pan_y: f64, zoom: f64) {
        if self.destroyed {
            return;
        }
        self.viewport = Viewport::new(pan_x, pan_y, zoom);
        self.background_dirty = true;
        self.invalidate();
    }

    pub fn set_background(&mut self, background: Background) {
        if self.destroyed {
            return;
        }
        if self.background != background {
            self.background = background;
            self.background_dirty = true;
        }
        self.invalidate();
    }

    /// In-progress stroke rendered topmost, above every committed layer.
    pub fn set_preview_stroke(&mut self, stroke: Option<Stroke>) {
        if self.destroyed {
            return;
        }
        self.preview = stroke;
        self.invalidate();
    }

    pub fn set_cursor(&mut self, cursor: CursorState) {
        if self.destroyed {
            return;
        }
        self.cursor = cursor;
        self.invalidate();
    }

    /// Mark the frame stale. Repeated calls before the next `render_frame`
    /// coalesce into one pending redraw and one `request_frame` emission.
    pub fn invalidate(&mut self) {
        if self.destroyed || self.pending {
            return;
        }
        self.pending = true;
        if let Some(cb) = &mut self.request_frame {
            cb();
        }
    }

    /// Host's next-frame entry point. Repaints only when pending; returns
    /// whether a repaint happened. A failed repaint leaves the frame pending,
    /// so the host's next call retries instead of serving a stale frame.
    pub fn render_frame(
        &mut self,
        source: &dyn DocumentSource,
        store: &dyn ImageStore,
    ) -> InklineResult<bool> {
        if self.destroyed || !self.pending {
            return Ok(false);
        }
        self.repaint(source, store)?;
        self.pending = false;
        Ok(true)
    }

    /// The last composed frame, premultiplied RGBA8.
    pub fn frame(&self) -> &Surface {
        &self.frame
    }

    /// Drop pending work and make every later call a no-op. Safe against
    /// callbacks still in flight; `render_frame` after destroy does nothing.
    pub fn destroy(&mut self) {
        self.destroyed = true;
        self.pending = false;
        self.preview = None;
        self.request_frame = None;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    fn repaint(&mut self, source: &dyn DocumentSource, store: &dyn ImageStore) -> InklineResult<()> {
        if self.background_dirty {
            self.raster.paint_background(
                &mut self.background_surface,
                self.background,
                self.viewport,
            )?;
            self.background_dirty = false;
        }

        let view = self.viewport.to_affine();
        self.content.clear();

        let layers = source.layers();
        tracing::debug!(layers = layers.len(), zoom = self.viewport.zoom, "repaint");
        for layer in &layers {
            if !layer.is_visible() {
                continue;
            }
            match layer {
                Layer::Strokes(sl) => {
                    for stroke in &sl.strokes {
                        let opacity = (stroke.opacity * sl.base.opacity) as f32;
                        self.raster
                            .paint_stroke_onto(&mut self.content, stroke, view, opacity)?;
                    }
                }
                Layer::Image(il) => {
                    let paint = match self.images.resolve(&il.blob_ref, store) {
                        Ok(paint) => paint,
                        Err(err) => {
                            tracing::warn!(layer = %il.base.id, %err, "skipping image layer");
                            continue;
                        }
                    };
                    self.raster.paint_image_onto(
                        &mut self.content,
                        il,
                        paint,
                        view,
                        il.base.opacity as f32,
                    )?;
                }
            }
        }

        if let Some(mut preview) = self.preview.clone() {
            // The preview always renders with the host's current brush
            // settings, not whatever the stroke carried when it was set.
            source
                .brush_options(preview.brush_style, preview.size)
                .apply_to(&mut preview);
            self.raster.paint_stroke_onto(
                &mut self.content,
                &preview,
                view,
                preview.opacity as f32,
            )?;
        }

        self.paint_overlay(source, &layers)?;

        // Final composition: content first, background underneath, overlay on
        // top. Erased content pixels show background, never a hole.
        self.frame.data_mut().copy_from_slice(self.content.data());
        crate::composite::under_in_place(
            self.frame.data_mut(),
            self.background_surface.data(),
            1.0,
        )?;
        crate::composite::over_in_place(self.frame.data_mut(), self.overlay.data(), 1.0)?;
        Ok(())
    }

    fn paint_overlay(&mut self, source: &dyn DocumentSource, layers: &[Layer]) -> InklineResult<()> {
        self.overlay.clear();

        let selected = source.selected_layer_id();
        let selected_image = selected.as_deref().and_then(|id| {
            layers.iter().find_map(|l| match l {
                Layer::Image(il) if il.base.id == id && il.base.visible => Some(il),
                _ => None,
            })
        });

        let cursor = self.cursor;
        let viewport = self.viewport;
        if cursor.visible || selected_image.is_some() {
            let handles = selected_image.map(|il| transform::handle_points(il, viewport));
            self.raster.scene_over_onto(&mut self.overlay, 1.0, |ctx| {
                ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
                ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
                if cursor.visible && cursor.radius > 0.0 {
                    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                        CURSOR_RING_RGBA[0],
                        CURSOR_RING_RGBA[1],
                        CURSOR_RING_RGBA[2],
                        CURSOR_RING_RGBA[3],
                    ));
                    ctx.fill_path(&crate::brush::circle_to_cpu(
                        cursor.x,
                        cursor.y,
                        cursor.radius,
                    ));
                }
                if let Some(hp) = &handles {
                    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                        HANDLE_FILL_RGBA[0],
                        HANDLE_FILL_RGBA[1],
                        HANDLE_FILL_RGBA[2],
                        HANDLE_FILL_RGBA[3],
                    ));
                    for corner in hp.corners {
                        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                            corner.x - HANDLE_DRAW_PX,
                            corner.y - HANDLE_DRAW_PX,
                            corner.x + HANDLE_DRAW_PX,
                            corner.y + HANDLE_DRAW_PX,
                        ));
                    }
                    ctx.fill_path(&crate::brush::circle_to_cpu(
                        hp.rotate.x,
                        hp.rotate.y,
                        HANDLE_DRAW_PX,
                    ));
                }
            })?;
        }

        // Punch out the ring interior so the cursor reads as an outline.
        if cursor.visible && cursor.radius > CURSOR_RING_THICKNESS {
            self.raster.scene_erase_onto(&mut self.overlay, |ctx| {
                ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
                ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
                ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(255, 255, 255, 255));
                ctx.fill_path(&crate::brush::circle_to_cpu(
                    cursor.x,
                    cursor.y,
                    cursor.radius - CURSOR_RING_THICKNESS,
                ));
            })?;
        }
        Ok(())
    }

    /// Convenience for hosts wiring pointer events straight through.
    pub fn screen_to_world(&self, x: f64, y: f64) -> GeomPoint {
        self.viewport.screen_to_world(GeomPoint::new(x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{core::Point, images::NoImages, model::*};
    use std::{cell::Cell, rc::Rc};

    struct Fixed {
        layers: Vec<Layer>,
    }

    impl DocumentSource for Fixed {
        fn layers(&self) -> Vec<Layer> {
            self.layers.clone()
        }
    }

    fn stroke_layer(strokes: Vec<Stroke>) -> Layer {
        Layer::Strokes(StrokeLayer {
            base: LayerBase {
                id: "l0".to_string(),
                name: "layer".to_string(),
                visible: true,
                locked: false,
                opacity: 1.0,
            },
            strokes,
        })
    }

    fn line(style: BrushStyle, size: f64) -> Stroke {
        Stroke {
            id: "s".to_string(),
            points: vec![Point::new(8.0, 16.0, 0.8), Point::new(56.0, 16.0, 0.8)],
            color: "#102030".to_string(),
            size,
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

    #[test]
    fn invalidations_coalesce_to_one_callback_and_one_repaint() {
        let mut engine = CanvasEngine::new(32, 32).unwrap();
        let calls = Rc::new(Cell::new(0u32));
        let calls2 = calls.clone();
        engine.set_request_frame(move || calls2.set(calls2.get() + 1));

        engine.invalidate();
        engine.invalidate();
        engine.invalidate();
        assert_eq!(calls.get(), 1);

        let source = Fixed { layers: vec![] };
        assert!(engine.render_frame(&source, &NoImages).unwrap());
        assert!(!engine.render_frame(&source, &NoImages).unwrap());

        engine.invalidate();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn zero_layers_renders_background_only() {
        let mut engine = CanvasEngine::new(16, 16).unwrap();
        let source = Fixed { layers: vec![] };
        engine.invalidate();
        engine.render_frame(&source, &NoImages).unwrap();
        assert!(
            engine
                .frame()
                .data()
                .chunks_exact(4)
                .all(|px| px == [255, 255, 255, 255])
        );
    }

    #[test]
    fn erasing_everything_leaves_the_background_intact() {
        let mut engine = CanvasEngine::new(64, 32).unwrap();
        let mut eraser = line(BrushStyle::Eraser, 64.0);
        eraser.id = "e".to_string();
        let source = Fixed {
            layers: vec![stroke_layer(vec![line(BrushStyle::Ink, 8.0), eraser])],
        };
        engine.invalidate();
        engine.render_frame(&source, &NoImages).unwrap();
        // Fully erased content shows pure background white.
        assert!(
            engine
                .frame()
                .data()
                .chunks_exact(4)
                .all(|px| px == [255, 255, 255, 255])
        );
    }

    #[test]
    fn preview_stroke_draws_without_touching_the_document() {
        let mut engine = CanvasEngine::new(64, 32).unwrap();
        let source = Fixed { layers: vec![] };
        engine.set_preview_stroke(Some(line(BrushStyle::Ink, 8.0)));
        engine.render_frame(&source, &NoImages).unwrap();
        let inked = engine
            .frame()
            .data()
            .chunks_exact(4)
            .filter(|px| px[0] != 255)
            .count();
        assert!(inked > 0);

        engine.set_preview_stroke(None);
        engine.render_frame(&source, &NoImages).unwrap();
        assert!(
            engine
                .frame()
                .data()
                .chunks_exact(4)
                .all(|px| px == [255, 255, 255, 255])
        );
    }

    #[test]
    fn destroy_makes_later_calls_noops() {
        let mut engine = CanvasEngine::new(16, 16).unwrap();
        let source = Fixed { layers: vec![] };
        engine.destroy();
        engine.invalidate();
        engine.set_pan_zoom(5.0, 5.0, 2.0);
        assert!(!engine.render_frame(&source, &NoImages).unwrap());
        engine.destroy();
        assert!(engine.is_destroyed());
    }

    #[test]
    fn missing_image_layer_is_skipped_not_fatal() {
        let mut engine = CanvasEngine::new(16, 16).unwrap();
        let source = Fixed {
            layers: vec![Layer::Image(ImageLayer {
                base: LayerBase {
                    id: "img".to_string(),
                    name: "image".to_string(),
                    visible: true,
                    locked: false,
                    opacity: 1.0,
                },
                blob_ref: "missing".to_string(),
                natural_width: 4.0,
                natural_height: 4.0,
                x: 0.0,
                y: 0.0,
                width: 4.0,
                height: 4.0,
                rotation_deg: 0.0,
                aspect_locked: false,
            })],
        };
        engine.invalidate();
        assert!(engine.render_frame(&source, &NoImages).unwrap());
    }

    #[test]
    fn preview_renders_with_source_resolved_brush_options() {
        struct Resolving {
            calls: Rc<Cell<u32>>,
            taper: f64,
        }
        impl DocumentSource for Resolving {
            fn layers(&self) -> Vec<Layer> {
                Vec::new()
            }
            fn brush_options(&self, style: BrushStyle, _size: f64) -> BrushOptions {
                self.calls.set(self.calls.get() + 1);
                BrushOptions {
                    taper_start: self.taper,
                    taper_end: self.taper,
                    ..BrushOptions::for_style(style)
                }
            }
        }

        let calls = Rc::new(Cell::new(0u32));
        let mut engine = CanvasEngine::new(64, 32).unwrap();
        engine.set_preview_stroke(Some(line(BrushStyle::Ink, 8.0)));

        let plain = Resolving {
            calls: calls.clone(),
            taper: 0.0,
        };
        engine.render_frame(&plain, &NoImages).unwrap();
        assert_eq!(calls.get(), 1);
        let untapered = engine.frame().data().to_vec();

        // A changed resolver alters the very next frame of the same preview.
        let tapered = Resolving {
            calls: calls.clone(),
            taper: 40.0,
        };
        engine.invalidate();
        engine.render_frame(&tapered, &NoImages).unwrap();
        assert_eq!(calls.get(), 2);
        assert_ne!(engine.frame().data(), untapered.as_slice());
    }

    #[test]
    fn default_strokes_accessor_follows_the_active_layer() {
        struct Active {
            layers: Vec<Layer>,
        }
        impl DocumentSource for Active {
            fn layers(&self) -> Vec<Layer> {
                self.layers.clone()
            }
            fn active_layer_id(&self) -> Option<String> {
                Some("l0".to_string())
            }
        }

        let source = Active {
            layers: vec![stroke_layer(vec![line(BrushStyle::Ink, 8.0)])],
        };
        assert_eq!(source.strokes().len(), 1);
        // Without an active layer there are no strokes to report.
        let inactive = Fixed {
            layers: source.layers(),
        };
        assert!(inactive.strokes().is_empty());
    }

    #[test]
    fn failed_repaint_keeps_the_frame_pending() {
        let mut engine = CanvasEngine::new(16, 16).unwrap();
        let source = Fixed { layers: vec![] };
        // A mis-sized overlay makes the final composition fail.
        engine.overlay = Surface::new(8, 8).unwrap();
        engine.invalidate();
        assert!(engine.render_frame(&source, &NoImages).is_err());
        assert!(engine.pending);

        engine.overlay = Surface::new(16, 16).unwrap();
        assert!(engine.render_frame(&source, &NoImages).unwrap());
        assert!(!engine.pending);
    }

    #[test]
    fn cursor_ring_is_overlay_only() {
        let mut engine = CanvasEngine::new(32, 32).unwrap();
        let source = Fixed { layers: vec![] };
        engine.set_cursor(CursorState {
            visible: true,
            x: 16.0,
            y: 16.0,
            radius: 8.0,
        });
        engine.render_frame(&source, &NoImages).unwrap();
        let ring_px = engine
            .frame()
            .data()
            .chunks_exact(4)
            .filter(|px| px[0] != 255)
            .count();
        assert!(ring_px > 0);
        // The ring interior was punched out, so the center stays background.
        let center = 16 * 32 + 16;
        let px = &engine.frame().data()[center * 4..center * 4 + 4];
        assert_eq!(px, [255, 255, 255, 255]);
    }
}
