use std::{collections::HashMap, path::PathBuf, sync::Arc};

use anyhow::Context;

use crate::error::{InklineError, InklineResult};

/// A decoded raster image, premultiplied RGBA8.
#[derive(Clone, Debug)]
pub struct PreparedImage {
    pub width: u32,
    pub height: u32,
    pub rgba8_premul: Arc<Vec<u8>>,
}

/// Resolver for image-layer blob references. The engine and the export
/// renderer never read storage themselves; they pull bytes through this.
pub trait ImageStore {
    fn load(&self, blob_ref: &str) -> InklineResult<PreparedImage>;
}

/// Store with no images. Every lookup fails; callers skip the layer.
pub struct NoImages;

impl ImageStore for NoImages {
    fn load(&self, blob_ref: &str) -> InklineResult<PreparedImage> {
        Err(InklineError::render(format!(
            "no image store configured, cannot resolve blob '{blob_ref}'"
        )))
    }
}

/// Filesystem-backed store: `blob_ref` is a path relative to `root`.
pub struct FsImageStore {
    root: PathBuf,
}

impl FsImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ImageStore for FsImageStore {
    fn load(&self, blob_ref: &str) -> InklineResult<PreparedImage> {
        let path = self.root.join(blob_ref);
        let bytes = std::fs::read(&path)
            .with_context(|| format!("read image blob {}", path.display()))?;
        decode_image(&bytes)
    }
}

pub fn decode_image(bytes: &[u8]) -> InklineResult<PreparedImage> {
    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgba8_premul = rgba.into_raw();
    premultiply_rgba8_in_place(&mut rgba8_premul);

    Ok(PreparedImage {
        width,
        height,
        rgba8_premul: Arc::new(rgba8_premul),
    })
}

fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

/// Per-blob cache of render-ready image paints, keyed by blob ref. Lives for
/// an engine or export session; a blob decodes at most once per session.
#[derive(Default)]
pub struct ImageCache {
    paints: HashMap<String, vello_cpu::Image>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, blob_ref: &str) -> bool {
        self.paints.contains_key(blob_ref)
    }

    pub fn get(&self, blob_ref: &str) -> Option<vello_cpu::Image> {
        self.paints.get(blob_ref).cloned()
    }

    pub fn insert_prepared(
        &mut self,
        blob_ref: &str,
        prepared: &PreparedImage,
    ) -> InklineResult<vello_cpu::Image> {
        let pixmap = premul_bytes_to_pixmap(
            prepared.rgba8_premul.as_slice(),
            prepared.width,
            prepared.height,
        )?;
        let paint = vello_cpu::Image {
            image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
            sampler: vello_cpu::peniko::ImageSampler::default(),
        };
        self.paints.insert(blob_ref.to_string(), paint.clone());
        Ok(paint)
    }

    /// Resolve through the store on miss. A failed load is reported to the
    /// caller, who skips the layer; the cache stays unchanged.
    pub fn resolve(
        &mut self,
        blob_ref: &str,
        store: &dyn ImageStore,
    ) -> InklineResult<vello_cpu::Image> {
        if let Some(paint) = self.get(blob_ref) {
            return Ok(paint);
        }
        let prepared = store.load(blob_ref)?;
        self.insert_prepared(blob_ref, &prepared)
    }
}

fn premul_bytes_to_pixmap(
    rgba8_premul: &[u8],
    width: u32,
    height: u32,
) -> InklineResult<vello_cpu::Pixmap> {
    let w: u16 = width
        .try_into()
        .map_err(|_| InklineError::render("image width exceeds u16"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| InklineError::render("image height exceeds u16"))?;
    if rgba8_premul.len() != width as usize * height as usize * 4 {
        return Err(InklineError::render("prepared image byte length mismatch"));
    }

    let mut may_have_opacities = false;
    let mut pixels = Vec::with_capacity(width as usize * height as usize);
    for px in rgba8_premul.chunks_exact(4) {
        let a = px[3];
        may_have_opacities |= a != 255;
        pixels.push(vello_cpu::peniko::color::PremulRgba8 {
            r: px[0],
            g: px[1],
            b: px[2],
            a,
        });
    }

    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels,
        w,
        h,
        may_have_opacities,
    ))
}
