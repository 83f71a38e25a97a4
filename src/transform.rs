use kurbo::{Point as GeomPoint, Vec2};

use crate::{core::Viewport, model::ImageLayer};

/// Screen-space half-extent of a corner handle's hit region, in pixels.
pub const HANDLE_HIT_PX: f64 = 8.0;
/// Screen-space distance of the rotate handle above the top edge midpoint.
pub const ROTATE_OFFSET_PX: f64 = 20.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handle {
    Move,
    Rotate,
    Nw,
    Ne,
    Se,
    Sw,
}

/// Image placement produced by every transform operation. Callers copy the
/// fields back onto the layer; nothing here mutates document state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub rotation_deg: f64,
}

impl Placement {
    pub fn of(layer: &ImageLayer) -> Self {
        Self {
            x: layer.x,
            y: layer.y,
            width: layer.width,
            height: layer.height,
            rotation_deg: layer.rotation_deg,
        }
    }
}

/// State captured on pointer-down; drags are computed against this, never
/// against the live layer, so a drag is stable under repaints.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StartState {
    pub placement: Placement,
    pub pointer_world: GeomPoint,
}

pub fn capture_start_state(layer: &ImageLayer, viewport: Viewport, screen: GeomPoint) -> StartState {
    StartState {
        placement: Placement::of(layer),
        pointer_world: viewport.screen_to_world(screen),
    }
}

/// Corner and rotate handle positions in screen space, honoring rotation.
pub struct HandlePoints {
    /// Order: NW, NE, SE, SW.
    pub corners: [GeomPoint; 4],
    pub rotate: GeomPoint,
}

pub fn handle_points(layer: &ImageLayer, viewport: Viewport) -> HandlePoints {
    let center = GeomPoint::new(layer.x + layer.width / 2.0, layer.y + layer.height / 2.0);
    let rot = layer.rotation_deg.to_radians();
    let place = |local: GeomPoint| -> GeomPoint {
        let v = local - center;
        let rotated = GeomPoint::new(
            center.x + v.x * rot.cos() - v.y * rot.sin(),
            center.y + v.x * rot.sin() + v.y * rot.cos(),
        );
        viewport.world_to_screen(rotated)
    };
    let corners = [
        place(GeomPoint::new(layer.x, layer.y)),
        place(GeomPoint::new(layer.x + layer.width, layer.y)),
        place(GeomPoint::new(layer.x + layer.width, layer.y + layer.height)),
        place(GeomPoint::new(layer.x, layer.y + layer.height)),
    ];
    let top_mid = place(GeomPoint::new(layer.x + layer.width / 2.0, layer.y));
    let center_screen = viewport.world_to_screen(center);
    let up = top_mid - center_screen;
    let up_unit = if up.hypot() > 1e-9 {
        up / up.hypot()
    } else {
        Vec2::new(0.0, -1.0)
    };
    HandlePoints {
        corners,
        rotate: top_mid + up_unit * ROTATE_OFFSET_PX,
    }
}

/// Handles win over the body, rotate wins over corners. `None` means the
/// pointer missed the layer entirely.
pub fn hit_test(layer: &ImageLayer, viewport: Viewport, screen: GeomPoint) -> Option<Handle> {
    let hp = handle_points(layer, viewport);
    if (screen - hp.rotate).hypot() <= HANDLE_HIT_PX {
        return Some(Handle::Rotate);
    }
    for (corner, handle) in hp
        .corners
        .iter()
        .zip([Handle::Nw, Handle::Ne, Handle::Se, Handle::Sw])
    {
        if (screen.x - corner.x).abs() <= HANDLE_HIT_PX && (screen.y - corner.y).abs() <= HANDLE_HIT_PX
        {
            return Some(handle);
        }
    }

    // Body test in the layer's unrotated local frame.
    let world = viewport.screen_to_world(screen);
    let center = GeomPoint::new(layer.x + layer.width / 2.0, layer.y + layer.height / 2.0);
    let rot = -layer.rotation_deg.to_radians();
    let v = world - center;
    let local = GeomPoint::new(
        center.x + v.x * rot.cos() - v.y * rot.sin(),
        center.y + v.x * rot.sin() + v.y * rot.cos(),
    );
    if local.x >= layer.x
        && local.x <= layer.x + layer.width
        && local.y >= layer.y
        && local.y <= layer.y + layer.height
    {
        return Some(Handle::Move);
    }
    None
}

pub fn apply_move(start: &StartState, viewport: Viewport, screen: GeomPoint) -> Placement {
    let world = viewport.screen_to_world(screen);
    let delta = world - start.pointer_world;
    Placement {
        x: start.placement.x + delta.x,
        y: start.placement.y + delta.y,
        ..start.placement
    }
}

/// Absolute rotation in degrees, normalized to `[0, 360)`.
pub fn apply_rotation(start: &StartState, degrees: f64) -> Placement {
    Placement {
        rotation_deg: degrees.rem_euclid(360.0),
        ..start.placement
    }
}

/// Corner resize anchored at the opposite corner. With `maintain_aspect` the
/// height follows the width at the start state's aspect ratio.
pub fn apply_resize(
    corner: Handle,
    screen: GeomPoint,
    start: &StartState,
    viewport: Viewport,
    maintain_aspect: bool,
) -> Placement {
    let p = start.placement;
    let world = viewport.screen_to_world(screen);
    let (anchor_x, anchor_y, sx, sy) = match corner {
        Handle::Nw => (p.x + p.width, p.y + p.height, -1.0, -1.0),
        Handle::Ne => (p.x, p.y + p.height, 1.0, -1.0),
        Handle::Se => (p.x, p.y, 1.0, 1.0),
        Handle::Sw => (p.x + p.width, p.y, -1.0, 1.0),
        Handle::Move | Handle::Rotate => return p,
    };

    const MIN_SIZE: f64 = 1.0;
    let mut width = ((world.x - anchor_x) * sx).max(MIN_SIZE);
    let mut height = ((world.y - anchor_y) * sy).max(MIN_SIZE);
    if maintain_aspect && p.height > 0.0 {
        let aspect = p.width / p.height;
        height = (width / aspect).max(MIN_SIZE);
        width = height * aspect;
    }

    Placement {
        x: if sx < 0.0 { anchor_x - width } else { anchor_x },
        y: if sy < 0.0 { anchor_y - height } else { anchor_y },
        width,
        height,
        rotation_deg: p.rotation_deg,
    }
}
