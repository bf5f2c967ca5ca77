//! Page rasterization
//!
//! [`PageRasterizer`] is the seam to whatever turns a PDF page into pixels. The crate
//! ships a lopdf-backed implementation that reads real page geometry and produces a
//! blank page canvas, and a headless one for tests and tooling.

use image::{ImageBuffer, Rgba};
use lopdf::{Dictionary, Document, Object, ObjectId};
use pdf_annotator_core::PageSize;
use pdf_annotator_scheduler::CancellationToken;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// US Letter, used when a page carries no usable MediaBox
const FALLBACK_PAGE_SIZE: PageSize = PageSize { width: 612.0, height: 792.0 };

/// Guards against cyclic `Parent` links in malformed page trees
const MAX_PAGE_TREE_DEPTH: usize = 32;

const ROWS_PER_CANCEL_CHECK: u32 = 64;

const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);
const EDGE: Rgba<u8> = Rgba([220, 220, 220, 255]);

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Superseded or shut down; never shown to the user
    #[error("render cancelled")]
    Cancelled,

    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),

    #[error("encrypted PDFs are not supported")]
    Encrypted,

    #[error("document has no pages")]
    NoPages,

    #[error("render failed: {0}")]
    Failed(String),
}

/// Target size of a page render in screen pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    pub scale: f32,
}

impl Viewport {
    pub fn for_page(size: PageSize, scale: f32) -> Self {
        Self { width: size.width * scale, height: size.height * scale, scale }
    }

    /// Whole-pixel dimensions, at least 1x1
    pub fn pixel_size(&self) -> (u32, u32) {
        (self.width.round().max(1.0) as u32, self.height.round().max(1.0) as u32)
    }
}

/// The PDF rendering collaborator
pub trait PageRasterizer {
    type Raster;

    fn page_count(&self) -> u32;

    /// Unscaled page size in document units
    fn page_size(&self, page_index: u32) -> Result<PageSize, RenderError>;

    /// Render a page into a new base surface.
    ///
    /// Implementations check `token` as they go and return
    /// [`RenderError::Cancelled`] once it is set.
    fn rasterize(
        &self,
        page_index: u32,
        viewport: Viewport,
        token: &CancellationToken,
    ) -> Result<Self::Raster, RenderError>;
}

fn page_out_of_range(page: u32, page_count: usize) -> RenderError {
    RenderError::PageOutOfRange { page, page_count: page_count as u32 }
}

/// Page geometry read with lopdf; pages render as blank bordered sheets
#[derive(Debug, Clone)]
pub struct LopdfRasterizer {
    page_sizes: Vec<PageSize>,
}

impl LopdfRasterizer {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RenderError> {
        let doc = Document::load_mem(bytes)?;
        if doc.is_encrypted() {
            return Err(RenderError::Encrypted);
        }

        let page_sizes = doc
            .get_pages()
            .into_values()
            .map(|page_id| page_geometry(&doc, page_id))
            .collect::<Result<Vec<_>, _>>()?;
        if page_sizes.is_empty() {
            return Err(RenderError::NoPages);
        }

        Ok(Self { page_sizes })
    }

    pub fn open(path: &Path) -> Result<Self, RenderError> {
        Self::from_bytes(&fs::read(path)?)
    }
}

/// Displayed page size: the MediaBox, inherited through the page tree when the page
/// has none, with width and height swapped for quarter-turn rotations
fn page_geometry(doc: &Document, page_id: ObjectId) -> Result<PageSize, RenderError> {
    let page = doc.get_dictionary(page_id)?;

    let size = inherited(doc, page, b"MediaBox")
        .and_then(|object| doc.dereference(object).ok())
        .and_then(|(_, object)| object.as_array().ok())
        .and_then(|bounds| box_size(bounds))
        .unwrap_or(FALLBACK_PAGE_SIZE);

    let rotation = inherited(doc, page, b"Rotate").and_then(|object| object.as_i64().ok());
    match rotation {
        Some(degrees) if degrees.rem_euclid(180) == 90 => Ok(PageSize::new(size.height, size.width)),
        _ => Ok(size),
    }
}

/// Look up an inheritable page attribute on the page or its nearest ancestor
fn inherited<'a>(doc: &'a Document, page: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut node = page;
    for _ in 0..MAX_PAGE_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn box_size(bounds: &[Object]) -> Option<PageSize> {
    let [x0, y0, x1, y1] = bounds else {
        return None;
    };
    let coord = |object: &Object| object.as_float().ok().filter(|value| value.is_finite());

    let width = (coord(x1)? - coord(x0)?).abs();
    let height = (coord(y1)? - coord(y0)?).abs();
    (width > 0.0 && height > 0.0).then(|| PageSize::new(width, height))
}

/// White sheet with a thin grey edge, checking `token` every few rows
fn blank_sheet(width: u32, height: u32, token: &CancellationToken) -> Result<RgbaImage, RenderError> {
    let mut image = RgbaImage::from_pixel(width, height, PAPER);
    if width < 4 || height < 4 {
        return Ok(image);
    }

    for (y, row) in image.enumerate_rows_mut() {
        if y % ROWS_PER_CANCEL_CHECK == 0 && token.is_cancelled() {
            return Err(RenderError::Cancelled);
        }
        let edge_row = y == 0 || y == height - 1;
        for (x, _, pixel) in row {
            if edge_row || x == 0 || x == width - 1 {
                *pixel = EDGE;
            }
        }
    }

    Ok(image)
}

impl PageRasterizer for LopdfRasterizer {
    type Raster = RgbaImage;

    fn page_count(&self) -> u32 {
        self.page_sizes.len() as u32
    }

    fn page_size(&self, page_index: u32) -> Result<PageSize, RenderError> {
        self.page_sizes
            .get(page_index as usize)
            .copied()
            .ok_or_else(|| page_out_of_range(page_index, self.page_sizes.len()))
    }

    fn rasterize(
        &self,
        page_index: u32,
        viewport: Viewport,
        token: &CancellationToken,
    ) -> Result<RgbaImage, RenderError> {
        self.page_size(page_index)?;
        if token.is_cancelled() {
            return Err(RenderError::Cancelled);
        }

        let (width, height) = viewport.pixel_size();
        blank_sheet(width, height, token)
    }
}

/// Rasterizer over fixed page sizes whose "raster" is the viewport it was asked for
#[derive(Debug, Clone, Default)]
pub struct HeadlessRasterizer {
    page_sizes: Vec<PageSize>,
    failing: HashSet<u32>,
}

impl HeadlessRasterizer {
    pub fn new(page_sizes: Vec<PageSize>) -> Self {
        Self { page_sizes, failing: HashSet::new() }
    }

    /// `count` pages of the same size
    pub fn uniform(count: u32, size: PageSize) -> Self {
        Self::new(vec![size; count as usize])
    }

    /// Make renders of `page_index` fail
    pub fn with_failing_page(mut self, page_index: u32) -> Self {
        self.failing.insert(page_index);
        self
    }
}

impl PageRasterizer for HeadlessRasterizer {
    type Raster = Viewport;

    fn page_count(&self) -> u32 {
        self.page_sizes.len() as u32
    }

    fn page_size(&self, page_index: u32) -> Result<PageSize, RenderError> {
        self.page_sizes
            .get(page_index as usize)
            .copied()
            .ok_or_else(|| page_out_of_range(page_index, self.page_sizes.len()))
    }

    fn rasterize(
        &self,
        page_index: u32,
        viewport: Viewport,
        token: &CancellationToken,
    ) -> Result<Viewport, RenderError> {
        self.page_size(page_index)?;
        if token.is_cancelled() {
            return Err(RenderError::Cancelled);
        }
        if self.failing.contains(&page_index) {
            return Err(RenderError::Failed(format!("page {page_index} could not be drawn")));
        }
        Ok(viewport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn sample_pdf(media_boxes: &[[i64; 4]]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let kids: Vec<Object> = media_boxes
            .iter()
            .map(|media_box| {
                let page_id = doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "MediaBox" => media_box.iter().map(|v| Object::Integer(*v)).collect::<Vec<_>>(),
                });
                page_id.into()
            })
            .collect();

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! { "Type" => "Pages", "Kids" => kids, "Count" => count }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("sample PDF should serialize");
        bytes
    }

    #[test]
    fn test_reads_page_geometry() {
        let rasterizer = LopdfRasterizer::from_bytes(&sample_pdf(&[[0, 0, 300, 400], [0, 0, 612, 792]]))
            .expect("open should succeed");

        assert_eq!(rasterizer.page_count(), 2);
        assert_eq!(rasterizer.page_size(0).unwrap(), PageSize::new(300.0, 400.0));
        assert!(matches!(
            rasterizer.page_size(2),
            Err(RenderError::PageOutOfRange { page: 2, page_count: 2 })
        ));
    }

    #[test]
    fn test_rasterize_matches_viewport() {
        let rasterizer = LopdfRasterizer::from_bytes(&sample_pdf(&[[0, 0, 100, 50]])).unwrap();
        let viewport = Viewport::for_page(rasterizer.page_size(0).unwrap(), 2.0);
        let image = rasterizer.rasterize(0, viewport, &CancellationToken::new()).unwrap();

        assert_eq!((image.width(), image.height()), (200, 100));
        assert_eq!(image.get_pixel(100, 50), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_cancelled_token_aborts() {
        let rasterizer = LopdfRasterizer::from_bytes(&sample_pdf(&[[0, 0, 100, 50]])).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let result = rasterizer.rasterize(0, Viewport::for_page(PageSize::new(100.0, 50.0), 1.0), &token);
        assert!(matches!(result, Err(RenderError::Cancelled)));
    }

    #[test]
    fn test_media_box_is_inherited_and_rotation_applied() {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let plain = doc.add_object(dictionary! { "Type" => "Page", "Parent" => pages_id });
        let turned = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Rotate" => 90,
        });
        let own_box = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![10.into(), 10.into(), 110.into(), 60.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![plain.into(), turned.into(), own_box.into()],
                "Count" => 3,
                "MediaBox" => vec![0.into(), 0.into(), 200.into(), 300.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("sample PDF should serialize");

        let rasterizer = LopdfRasterizer::from_bytes(&bytes).expect("open should succeed");
        assert_eq!(rasterizer.page_size(0).unwrap(), PageSize::new(200.0, 300.0));
        assert_eq!(rasterizer.page_size(1).unwrap(), PageSize::new(300.0, 200.0));
        assert_eq!(rasterizer.page_size(2).unwrap(), PageSize::new(100.0, 50.0));
    }

    #[test]
    fn test_empty_media_box_falls_back_to_letter() {
        let rasterizer = LopdfRasterizer::from_bytes(&sample_pdf(&[[0, 0, 0, 0]])).unwrap();
        assert_eq!(rasterizer.page_size(0).unwrap(), FALLBACK_PAGE_SIZE);
    }

    #[test]
    fn test_document_without_pages_is_rejected() {
        assert!(matches!(LopdfRasterizer::from_bytes(&sample_pdf(&[])), Err(RenderError::NoPages)));
    }

    #[test]
    fn test_sheet_has_grey_edge() {
        let image = blank_sheet(10, 8, &CancellationToken::new()).unwrap();
        assert_eq!(image.get_pixel(0, 4), &EDGE);
        assert_eq!(image.get_pixel(9, 7), &EDGE);
        assert_eq!(image.get_pixel(5, 0), &EDGE);
        assert_eq!(image.get_pixel(5, 4), &PAPER);

        let tiny = blank_sheet(3, 3, &CancellationToken::new()).unwrap();
        assert!(tiny.pixels().all(|pixel| *pixel == PAPER));
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        assert!(LopdfRasterizer::from_bytes(b"not a pdf").is_err());
    }

    #[test]
    fn test_headless_failing_page() {
        let rasterizer = HeadlessRasterizer::uniform(2, PageSize::new(10.0, 10.0)).with_failing_page(1);
        let token = CancellationToken::new();
        let viewport = Viewport::for_page(PageSize::new(10.0, 10.0), 1.0);

        assert!(rasterizer.rasterize(0, viewport, &token).is_ok());
        assert!(matches!(rasterizer.rasterize(1, viewport, &token), Err(RenderError::Failed(_))));
    }
}
