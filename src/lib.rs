#![forbid(unsafe_code)]

pub mod brush;
pub mod composite;
pub mod core;
pub mod engine;
pub mod error;
pub mod export;
pub mod images;
pub mod model;
pub mod outline;
pub mod playback;
pub mod raster;
pub mod surface;
pub mod transform;

pub use brush::{BrushOptions, CompositeMode};
pub use crate::core::{CursorState, Point, Viewport};
pub use engine::{CanvasEngine, DocumentSource};
pub use error::{InklineError, InklineResult};
pub use export::{ExportSettings, export_jpg, export_png, export_svg, write_data_url};
pub use images::{FsImageStore, ImageStore, NoImages, PreparedImage};
pub use model::{Background, BrushStyle, Document, ImageLayer, Layer, LayerBase, Stroke, StrokeLayer};
pub use outline::{OutlineOptions, TaperEase, build_outline};
pub use playback::{PlaybackEngine, PlaybackState, TimedStroke};
pub use surface::Surface;
pub use transform::{Handle, Placement};
