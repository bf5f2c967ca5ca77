//! PDF Annotator Render Library
//!
//! Overlay compositing for annotations and the cancellable base-page render pipeline.

pub mod compositor;
pub mod controller;
pub mod page;
pub mod surface;

pub use compositor::{Compositor, RenderStyle};
pub use controller::{PageRenderController, RenderOutcome, RenderTicket, RENDER_FAILED_MESSAGE};
pub use page::{HeadlessRasterizer, LopdfRasterizer, PageRasterizer, RenderError, RgbaImage, Viewport};
pub use surface::{DrawCommand, Fill, Rect, RecordingSurface, Stroke, Surface};
