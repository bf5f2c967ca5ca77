//! Bounding boxes and hit testing
//!
//! All inputs are in document space. The margin widens every target so that thin
//! strokes and small stamps stay clickable; points exactly on a boundary count as hits.

use crate::annotation::{Annotation, AnnotationKind, DocPoint, HighlightArea};

/// Average glyph advance relative to the font size, used to estimate text extents
const TEXT_ADVANCE_RATIO: f32 = 0.6;

/// Unscaled page size in document units, as reported by the rendering collaborator
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Convert a percentage-based highlight area to document units
    pub fn area_bounds(&self, area: &HighlightArea) -> Bounds {
        let x = area.left / 100.0 * self.width;
        let y = area.top / 100.0 * self.height;
        Bounds::from_signed(x, y, area.width / 100.0 * self.width, area.height / 100.0 * self.height)
    }
}

/// Axis-aligned bounding box with `min <= max` on both axes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Bounds {
    /// Normalize an anchor plus signed extent (drag direction) into a box
    pub fn from_signed(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            min_x: x.min(x + width),
            min_y: y.min(y + height),
            max_x: x.max(x + width),
            max_y: y.max(y + height),
        }
    }

    /// Smallest box containing every point; `None` for an empty set
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a DocPoint>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bounds = Self { min_x: first.x, min_y: first.y, max_x: first.x, max_y: first.y };
        for point in iter {
            bounds.min_x = bounds.min_x.min(point.x);
            bounds.min_y = bounds.min_y.min(point.y);
            bounds.max_x = bounds.max_x.max(point.x);
            bounds.max_y = bounds.max_y.max(point.y);
        }
        Some(bounds)
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Inclusive containment test with the box grown by `margin` on every side
    pub fn contains(&self, point: &DocPoint, margin: f32) -> bool {
        point.x >= self.min_x - margin
            && point.x <= self.max_x + margin
            && point.y >= self.min_y - margin
            && point.y <= self.max_y + margin
    }

    /// Corners in top-left, top-right, bottom-right, bottom-left order
    pub fn corners(&self) -> [DocPoint; 4] {
        [
            DocPoint::new(self.min_x, self.min_y),
            DocPoint::new(self.max_x, self.min_y),
            DocPoint::new(self.max_x, self.max_y),
            DocPoint::new(self.min_x, self.max_y),
        ]
    }

    pub fn scaled(&self, zoom: f32) -> Bounds {
        Bounds {
            min_x: self.min_x * zoom,
            min_y: self.min_y * zoom,
            max_x: self.max_x * zoom,
            max_y: self.max_y * zoom,
        }
    }
}

/// Distance from `point` to the segment `start..end`
pub fn distance_to_segment(point: &DocPoint, start: &DocPoint, end: &DocPoint) -> f32 {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let length_sq = dx * dx + dy * dy;

    if length_sq < 1e-6 {
        return point.distance_to(start);
    }

    // Project onto the segment and clamp to its ends
    let t = ((point.x - start.x) * dx + (point.y - start.y) * dy) / length_sq;
    let t = t.clamp(0.0, 1.0);

    let closest = DocPoint::new(start.x + t * dx, start.y + t * dy);
    point.distance_to(&closest)
}

/// Whether `point` lies within `margin` of the polyline `path`.
///
/// A single-point path degenerates to a distance check against that vertex.
pub fn point_near_path(point: &DocPoint, path: &[DocPoint], margin: f32) -> bool {
    match path {
        [] => false,
        [only] => point.distance_to(only) <= margin,
        _ => path
            .windows(2)
            .any(|segment| distance_to_segment(point, &segment[0], &segment[1]) <= margin),
    }
}

/// Document-space bounding box of the part of an annotation drawn on `page_index`.
///
/// Highlights need the page size to resolve their percentage areas and yield `None`
/// without it. Only the areas lying on `page_index` contribute.
pub fn annotation_bounds(
    annotation: &Annotation,
    page_index: u32,
    page_size: Option<PageSize>,
) -> Option<Bounds> {
    if !annotation.is_on_page(page_index) {
        return None;
    }
    match annotation.kind() {
        AnnotationKind::Shape { x, y, width, height, .. } => {
            Some(Bounds::from_signed(*x, *y, *width, *height))
        }
        AnnotationKind::Freehand { path } => Bounds::from_points(path),
        AnnotationKind::Text { x, y, text, font_size } => {
            let advance = TEXT_ADVANCE_RATIO * font_size * text.chars().count() as f32;
            Some(Bounds::from_signed(*x, *y - font_size, advance, *font_size))
        }
        AnnotationKind::Highlight { areas, .. } => {
            let page_size = page_size?;
            areas_on_page(areas, page_index)
                .map(|area| page_size.area_bounds(area))
                .reduce(|acc, bounds| acc.union(&bounds))
        }
    }
}

/// Highlight areas that lie on `page_index`
pub fn areas_on_page(
    areas: &[HighlightArea],
    page_index: u32,
) -> impl Iterator<Item = &HighlightArea> + '_ {
    areas.iter().filter(move |area| area.page_index == page_index)
}

/// Whether `point` on `page_index` selects `annotation`
pub fn hit_test(
    annotation: &Annotation,
    page_index: u32,
    point: &DocPoint,
    margin: f32,
    page_size: Option<PageSize>,
) -> bool {
    if !annotation.is_on_page(page_index) {
        return false;
    }
    match annotation.kind() {
        AnnotationKind::Freehand { path } => point_near_path(point, path, margin),
        AnnotationKind::Highlight { areas, .. } => match page_size {
            Some(page_size) => areas_on_page(areas, page_index)
                .any(|area| page_size.area_bounds(area).contains(point, margin)),
            None => false,
        },
        AnnotationKind::Shape { .. } | AnnotationKind::Text { .. } => {
            annotation_bounds(annotation, page_index, page_size)
                .is_some_and(|bounds| bounds.contains(point, margin))
        }
    }
}

/// Topmost annotation on `page_index` under `point`.
///
/// Later annotations are drawn above earlier ones, so the scan runs in reverse
/// insertion order and the last-drawn hit wins.
pub fn topmost_hit<'a>(
    annotations: &'a [Annotation],
    page_index: u32,
    point: &DocPoint,
    margin: f32,
    page_size: Option<PageSize>,
) -> Option<&'a Annotation> {
    annotations
        .iter()
        .rev()
        .find(|annotation| hit_test(annotation, page_index, point, margin, page_size))
}
