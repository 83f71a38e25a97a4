use kurbo::Affine;

use crate::{
    brush::{self, CompositeMode},
    composite,
    core::Viewport,
    error::InklineResult,
    model::{Background, ImageLayer, Stroke},
    surface::Surface,
};

/// World units between minor grid lines.
pub const GRID_STEP: f64 = 40.0;
/// Every n-th grid line is drawn heavier.
pub const GRID_MAJOR_EVERY: i64 = 5;
const GRID_MINOR_RGBA: [u8; 4] = [0xE5, 0xE7, 0xEB, 0xFF];
const GRID_MAJOR_RGBA: [u8; 4] = [0xD1, 0xD5, 0xDB, 0xFF];
/// Grid drawing stops past this many lines per axis, far below any zoom a
/// host would present.
const GRID_MAX_LINES: i64 = 4096;

/// The shared paint pass. Owns the scratch surface every stroke and image
/// layer renders into before being byte-composited onto its destination;
/// composite-mode scoping is structural because no brush ever touches the
/// destination pixels directly.
pub struct Rasterizer {
    scratch: Surface,
}

impl Rasterizer {
    pub fn new(width: u32, height: u32) -> InklineResult<Self> {
        Ok(Self {
            scratch: Surface::new(width, height)?,
        })
    }

    pub fn width(&self) -> u32 {
        u32::from(self.scratch.width())
    }

    pub fn height(&self) -> u32 {
        u32::from(self.scratch.height())
    }

    pub fn resize(&mut self, width: u32, height: u32) -> InklineResult<()> {
        self.scratch.ensure_size(width, height)?;
        Ok(())
    }

    /// Render a scene directly into `dst`, replacing its previous contents.
    /// Used for passes that own their surface outright (background, overlay).
    pub fn scene_into(
        &self,
        dst: &mut Surface,
        f: impl FnOnce(&mut vello_cpu::RenderContext),
    ) -> InklineResult<()> {
        dst.clear();
        let mut ctx = vello_cpu::RenderContext::new(dst.width(), dst.height());
        f(&mut ctx);
        ctx.flush();
        ctx.render_to_pixmap(dst.pixmap_mut());
        Ok(())
    }

    fn scene_into_scratch(
        &mut self,
        f: impl FnOnce(&mut vello_cpu::RenderContext),
    ) -> InklineResult<()> {
        self.scratch.clear();
        let mut ctx = vello_cpu::RenderContext::new(self.scratch.width(), self.scratch.height());
        f(&mut ctx);
        ctx.flush();
        ctx.render_to_pixmap(self.scratch.pixmap_mut());
        Ok(())
    }

    /// Render a scene to scratch and composite it over `dst`.
    pub fn scene_over_onto(
        &mut self,
        dst: &mut Surface,
        opacity: f32,
        f: impl FnOnce(&mut vello_cpu::RenderContext),
    ) -> InklineResult<()> {
        self.scene_into_scratch(f)?;
        composite::over_in_place(dst.data_mut(), self.scratch.data(), opacity)
    }

    /// Render a scene to scratch and erase its coverage out of `dst`.
    pub fn scene_erase_onto(
        &mut self,
        dst: &mut Surface,
        f: impl FnOnce(&mut vello_cpu::RenderContext),
    ) -> InklineResult<()> {
        self.scene_into_scratch(f)?;
        composite::erase_in_place(dst.data_mut(), self.scratch.data(), 1.0)
    }

    /// Rasterize one stroke and composite it onto `dst` with the mode its
    /// brush style dictates. `opacity` is the stroke opacity already folded
    /// with its layer's opacity by the caller.
    pub fn paint_stroke_onto(
        &mut self,
        dst: &mut Surface,
        stroke: &Stroke,
        transform: Affine,
        opacity: f32,
    ) -> InklineResult<()> {
        if !stroke.is_renderable() {
            tracing::warn!(stroke = %stroke.id, "skipping non-renderable stroke");
            return Ok(());
        }
        self.scene_into_scratch(|ctx| brush::paint_stroke(ctx, stroke, transform))?;
        match brush::composite_mode_for(stroke.brush_style) {
            CompositeMode::Over => {
                composite::over_in_place(dst.data_mut(), self.scratch.data(), opacity)
            }
            CompositeMode::Erase => {
                composite::erase_in_place(dst.data_mut(), self.scratch.data(), opacity)
            }
        }
    }

    /// Draw an image layer at its placement and composite it over `dst`.
    pub fn paint_image_onto(
        &mut self,
        dst: &mut Surface,
        layer: &ImageLayer,
        paint: vello_cpu::Image,
        view: Affine,
        opacity: f32,
    ) -> InklineResult<()> {
        let natural_w = layer.natural_width.max(1.0);
        let natural_h = layer.natural_height.max(1.0);
        let transform = view
            * Affine::translate((layer.x, layer.y))
            * Affine::rotate_about(
                layer.rotation_deg.to_radians(),
                kurbo::Point::new(layer.width / 2.0, layer.height / 2.0),
            )
            * Affine::scale_non_uniform(layer.width / natural_w, layer.height / natural_h);
        self.scene_into_scratch(|ctx| {
            ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
            ctx.set_transform(brush::affine_to_cpu(transform));
            ctx.set_paint(paint);
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, natural_w, natural_h));
        })?;
        composite::over_in_place(dst.data_mut(), self.scratch.data(), opacity)
    }

    /// Paint the background surface: plain white, or white plus a world-space
    /// grid that pans and zooms with the viewport.
    pub fn paint_background(
        &self,
        dst: &mut Surface,
        background: Background,
        viewport: Viewport,
    ) -> InklineResult<()> {
        match background {
            Background::White => {
                dst.fill([255, 255, 255, 255]);
                Ok(())
            }
            Background::Grid => {
                let (w, h) = (f64::from(dst.width()), f64::from(dst.height()));
                self.scene_into(dst, |ctx| paint_grid(ctx, viewport, w, h))
            }
        }
    }
}

fn paint_grid(ctx: &mut vello_cpu::RenderContext, viewport: Viewport, w: f64, h: f64) {
    ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
    ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(255, 255, 255, 255));
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, w, h));

    let zoom = if viewport.zoom.is_finite() && viewport.zoom > 0.0 {
        viewport.zoom
    } else {
        return;
    };

    // Visible world range, grown to whole grid steps.
    let x0 = (-viewport.pan_x / zoom / GRID_STEP).floor() as i64;
    let x1 = ((w - viewport.pan_x) / zoom / GRID_STEP).ceil() as i64;
    let y0 = (-viewport.pan_y / zoom / GRID_STEP).floor() as i64;
    let y1 = ((h - viewport.pan_y) / zoom / GRID_STEP).ceil() as i64;
    if x1 - x0 > GRID_MAX_LINES || y1 - y0 > GRID_MAX_LINES {
        return;
    }

    // One device pixel regardless of zoom.
    let half = 0.5 / zoom;
    ctx.set_transform(brush::affine_to_cpu(viewport.to_affine()));
    let wy0 = y0 as f64 * GRID_STEP;
    let wy1 = y1 as f64 * GRID_STEP;
    let wx0 = x0 as f64 * GRID_STEP;
    let wx1 = x1 as f64 * GRID_STEP;

    for pass in [false, true] {
        let rgba = if pass { GRID_MAJOR_RGBA } else { GRID_MINOR_RGBA };
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
            rgba[0], rgba[1], rgba[2], rgba[3],
        ));
        for k in x0..=x1 {
            if (k.rem_euclid(GRID_MAJOR_EVERY) == 0) != pass {
                continue;
            }
            let x = k as f64 * GRID_STEP;
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(x - half, wy0, x + half, wy1));
        }
        for k in y0..=y1 {
            if (k.rem_euclid(GRID_MAJOR_EVERY) == 0) != pass {
                continue;
            }
            let y = k as f64 * GRID_STEP;
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(wx0, y - half, wx1, y + half));
        }
    }
}
