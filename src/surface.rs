use crate::error::{InklineError, InklineResult};

/// An owned premultiplied-RGBA8 raster target.
///
/// Wraps the pixmap the CPU renderer writes into. Surfaces are sized in
/// device pixels and reallocated only when the size actually changes.
pub struct Surface {
    width: u16,
    height: u16,
    pixmap: vello_cpu::Pixmap,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> InklineResult<Self> {
        let width_u16: u16 = width
            .try_into()
            .map_err(|_| InklineError::render("surface width exceeds u16"))?;
        let height_u16: u16 = height
            .try_into()
            .map_err(|_| InklineError::render("surface height exceeds u16"))?;
        if width == 0 || height == 0 {
            return Err(InklineError::render("surface dimensions must be non-zero"));
        }
        Ok(Self {
            width: width_u16,
            height: height_u16,
            pixmap: vello_cpu::Pixmap::new(width_u16, height_u16),
        })
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// Reallocate if the requested size differs. Contents after a resize are
    /// transparent black.
    pub fn ensure_size(&mut self, width: u32, height: u32) -> InklineResult<bool> {
        if u32::from(self.width) == width && u32::from(self.height) == height {
            return Ok(false);
        }
        *self = Self::new(width, height)?;
        Ok(true)
    }

    pub fn clear(&mut self) {
        self.pixmap.data_as_u8_slice_mut().fill(0);
    }

    pub fn fill(&mut self, premul: [u8; 4]) {
        for px in self.pixmap.data_as_u8_slice_mut().chunks_exact_mut(4) {
            px.copy_from_slice(&premul);
        }
    }

    pub fn data(&self) -> &[u8] {
        self.pixmap.data_as_u8_slice()
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.pixmap.data_as_u8_slice_mut()
    }

    pub fn pixmap_mut(&mut self) -> &mut vello_cpu::Pixmap {
        &mut self.pixmap
    }

    /// Copy out straight-alpha RGBA8, the layout image encoders expect.
    pub fn to_unpremul_rgba8(&self) -> Vec<u8> {
        let mut out = self.data().to_vec();
        for px in out.chunks_exact_mut(4) {
            let a = px[3];
            if a != 0 && a != 255 {
                for c in px.iter_mut().take(3) {
                    *c = ((u32::from(*c) * 255 + u32::from(a) / 2) / u32::from(a)).min(255) as u8;
                }
            }
        }
        out
    }
}
