//! Annotation overlay compositing
//!
//! Paints one page's annotations onto an overlay [`Surface`] in z-order, scaling every
//! stored document-space coordinate by the current zoom, then decorates the selected
//! annotation.

use crate::surface::{Fill, Rect, Stroke, Surface};
use log::trace;
use pdf_annotator_core::{
    annotation_bounds, areas_on_page, Annotation, AnnotationId, AnnotationKind, Bounds, PageSize,
    ScreenPoint, ShapeKind,
};
use serde::{Deserialize, Serialize};

/// Paint constants for the overlay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderStyle {
    /// Outline width of shapes and stamps, in screen pixels
    pub stroke_width: f32,

    /// Marker width in document units; scales with zoom
    pub marker_width: f32,

    pub marker_alpha: f32,

    pub highlight_alpha: f32,

    pub selection_color: String,

    pub selection_dash: Vec<f32>,

    /// Gap between an annotation and its selection outline, in screen pixels
    pub selection_padding: f32,

    /// Side of the square corner handles, in screen pixels
    pub handle_size: f32,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            stroke_width: 2.0,
            marker_width: 8.0,
            marker_alpha: 0.4,
            highlight_alpha: 0.4,
            selection_color: "#2563eb".to_owned(),
            selection_dash: vec![6.0, 4.0],
            selection_padding: 4.0,
            handle_size: 8.0,
        }
    }
}

fn point(x: f32, y: f32) -> ScreenPoint {
    ScreenPoint::new(x, y)
}

/// Paints annotation overlays
#[derive(Debug, Clone, Default)]
pub struct Compositor {
    style: RenderStyle,
}

impl Compositor {
    pub fn new(style: RenderStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &RenderStyle {
        &self.style
    }

    /// Repaint the overlay of `page_index` from scratch
    pub fn paint_page<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        annotations: &[Annotation],
        page_index: u32,
        zoom: f32,
        selected: Option<&AnnotationId>,
        page_size: Option<PageSize>,
    ) {
        surface.clear();

        let on_page = || annotations.iter().filter(move |a| a.is_on_page(page_index));
        for annotation in on_page() {
            self.paint_annotation(surface, annotation, page_index, zoom, page_size);
        }

        if let Some(annotation) = selected.and_then(|id| on_page().find(|a| a.id() == id)) {
            self.paint_selection(surface, annotation, page_index, zoom, page_size);
        }
    }

    /// Paint the part of `annotation` that lies on `page_index`
    pub fn paint_annotation<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        annotation: &Annotation,
        page_index: u32,
        zoom: f32,
        page_size: Option<PageSize>,
    ) {
        let color = annotation.color();

        match annotation.kind() {
            AnnotationKind::Shape { shape, x, y, width, height } => {
                let bounds = Bounds::from_signed(*x, *y, *width, *height).scaled(zoom);
                let stroke = Stroke::solid(color, self.style.stroke_width);
                paint_shape(surface, *shape, &bounds, &stroke);
            }
            AnnotationKind::Freehand { path } => {
                let points: Vec<ScreenPoint> = path.iter().map(|p| p.to_screen(zoom)).collect();
                let stroke = Stroke::solid(color, self.style.marker_width * zoom)
                    .with_alpha(self.style.marker_alpha);
                surface.stroke_polyline(&points, false, &stroke);
            }
            AnnotationKind::Text { x, y, text, font_size } => {
                surface.fill_text(text, point(x * zoom, y * zoom), font_size * zoom, &Fill::solid(color));
            }
            AnnotationKind::Highlight { areas, .. } => {
                let Some(page_size) = page_size else {
                    trace!("skipping highlight {}: page size unknown", annotation.id());
                    return;
                };
                let fill = Fill::solid(color).with_alpha(self.style.highlight_alpha);
                for area in areas_on_page(areas, page_index) {
                    let bounds = page_size.area_bounds(area).scaled(zoom);
                    surface.fill_rect(Rect::from_bounds(&bounds), &fill);
                }
            }
        }
    }

    /// Dashed outline around the bounding box plus a handle on each corner
    fn paint_selection<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        annotation: &Annotation,
        page_index: u32,
        zoom: f32,
        page_size: Option<PageSize>,
    ) {
        let Some(bounds) = annotation_bounds(annotation, page_index, page_size) else {
            return;
        };
        let outline = Rect::from_bounds(&bounds.scaled(zoom)).inflated(self.style.selection_padding);

        let stroke = Stroke::solid(&self.style.selection_color, 1.0).dashed(&self.style.selection_dash);
        surface.stroke_rect(outline, &stroke);

        let handle_fill = Fill::solid(&self.style.selection_color);
        let corners = [
            point(outline.x, outline.y),
            point(outline.x + outline.width, outline.y),
            point(outline.x + outline.width, outline.y + outline.height),
            point(outline.x, outline.y + outline.height),
        ];
        for corner in corners {
            surface.fill_rect(Rect::centered(corner, self.style.handle_size), &handle_fill);
        }
    }
}

fn paint_shape<S: Surface + ?Sized>(surface: &mut S, shape: ShapeKind, bounds: &Bounds, stroke: &Stroke) {
    let (left, top, right, bottom) = (bounds.min_x, bounds.min_y, bounds.max_x, bounds.max_y);

    match shape {
        ShapeKind::Square => surface.stroke_rect(Rect::from_bounds(bounds), stroke),
        ShapeKind::Circle => surface.stroke_ellipse(Rect::from_bounds(bounds), stroke),
        ShapeKind::Triangle => {
            let apex = point(left + bounds.width() / 2.0, top);
            surface.stroke_polyline(&[apex, point(right, bottom), point(left, bottom)], true, stroke);
        }
        ShapeKind::Check => {
            let points = [
                point(left, top + bounds.height() * 0.55),
                point(left + bounds.width() * 0.4, bottom),
                point(right, top),
            ];
            surface.stroke_polyline(&points, false, stroke);
        }
        ShapeKind::Cross => {
            surface.stroke_polyline(&[point(left, top), point(right, bottom)], false, stroke);
            surface.stroke_polyline(&[point(right, top), point(left, bottom)], false, stroke);
        }
    }
}
