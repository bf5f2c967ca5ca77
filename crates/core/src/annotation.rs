//! Annotation data model
//!
//! Annotations are stored in document space, i.e. the coordinate system of the page at
//! zoom 1.0. Screen-space values only exist at interaction and render time and are
//! converted with [`ScreenPoint::to_document`] and [`DocPoint::to_screen`].
//!
//! The persisted JSON shape is a flat, `type`-tagged object (camelCase field names).
//! Decoding goes through a flat wire struct so that malformed or legacy records surface
//! as an [`AnnotationError`] per annotation instead of failing a whole document.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Color used when a persisted annotation carries none.
pub const DEFAULT_COLOR: &str = "#ff0000";

/// Color of text-selection highlights.
pub const DEFAULT_HIGHLIGHT_COLOR: &str = "#ffff00";

/// Stable identifier of an annotation within a document.
///
/// Legacy records use short numeric strings, new annotations get a UUID v4.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationId(String);

impl AnnotationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh unique identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AnnotationId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for AnnotationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Point in document space (unscaled page units)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DocPoint {
    pub x: f32,
    pub y: f32,
}

impl DocPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance_to(&self, other: &DocPoint) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        Self { x: self.x + dx, y: self.y + dy }
    }

    /// Project into screen space at the given zoom
    pub fn to_screen(&self, zoom: f32) -> ScreenPoint {
        ScreenPoint { x: self.x * zoom, y: self.y * zoom }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Point in screen space, relative to the top-left corner of a rendered page
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f32,
    pub y: f32,
}

impl ScreenPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Normalize into document space by dividing out the zoom
    pub fn to_document(&self, zoom: f32) -> DocPoint {
        DocPoint { x: self.x / zoom, y: self.y / zoom }
    }
}

/// Geometric shape drawn with one of the shape tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Square,
    Circle,
    Triangle,
    Check,
    Cross,
}

impl ShapeKind {
    /// Stamps are placed at a fixed size on click instead of being dragged out
    pub fn is_stamp(self) -> bool {
        matches!(self, ShapeKind::Check | ShapeKind::Cross)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ShapeKind::Square => "square",
            ShapeKind::Circle => "circle",
            ShapeKind::Triangle => "triangle",
            ShapeKind::Check => "check",
            ShapeKind::Cross => "cross",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "square" => Some(ShapeKind::Square),
            "circle" => Some(ShapeKind::Circle),
            "triangle" => Some(ShapeKind::Triangle),
            "check" => Some(ShapeKind::Check),
            "cross" => Some(ShapeKind::Cross),
            _ => None,
        }
    }
}

/// Page-relative rectangle reported by the text-selection capability.
///
/// All four numbers are percentages of the page's width or height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightArea {
    #[serde(default)]
    pub page_index: u32,
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// The selected text underneath a highlight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightContent {
    pub text: String,
}

/// Per-kind payload of an annotation
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationKind {
    /// Shape anchored at `(x, y)`; `width`/`height` are signed while dragging
    Shape {
        shape: ShapeKind,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },

    /// Marker stroke
    Freehand { path: Vec<DocPoint> },

    /// Text whose baseline starts at `(x, y)`
    Text {
        x: f32,
        y: f32,
        text: String,
        font_size: f32,
    },

    /// Text-selection highlight with an editable comment
    Highlight {
        areas: Vec<HighlightArea>,
        comment: String,
        content: Option<HighlightContent>,
    },
}

impl AnnotationKind {
    /// Name used as the persisted `type` discriminator
    pub fn type_name(&self) -> &'static str {
        match self {
            AnnotationKind::Shape { shape, .. } => shape.as_str(),
            AnnotationKind::Freehand { .. } => "freehand",
            AnnotationKind::Text { .. } => "text",
            AnnotationKind::Highlight { .. } => "highlight",
        }
    }
}

/// A single annotation on one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireAnnotation", into = "WireAnnotation")]
pub struct Annotation {
    id: AnnotationId,
    page_index: u32,
    color: String,
    kind: AnnotationKind,
}

impl Annotation {
    pub fn new(
        id: AnnotationId,
        page_index: u32,
        color: impl Into<String>,
        kind: AnnotationKind,
    ) -> Self {
        Self { id, page_index, color: color.into(), kind }
    }

    pub fn id(&self) -> &AnnotationId {
        &self.id
    }

    pub fn page_index(&self) -> u32 {
        self.page_index
    }

    /// Pages this annotation is drawn on. A highlight lives on the pages of its areas,
    /// which differ from `page_index` when a text selection crosses a page break.
    pub fn pages(&self) -> BTreeSet<u32> {
        match &self.kind {
            AnnotationKind::Highlight { areas, .. } if !areas.is_empty() => {
                areas.iter().map(|area| area.page_index).collect()
            }
            _ => BTreeSet::from([self.page_index]),
        }
    }

    pub fn is_on_page(&self, page_index: u32) -> bool {
        match &self.kind {
            AnnotationKind::Highlight { areas, .. } if !areas.is_empty() => {
                areas.iter().any(|area| area.page_index == page_index)
            }
            _ => self.page_index == page_index,
        }
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn kind(&self) -> &AnnotationKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut AnnotationKind {
        &mut self.kind
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// Copy of this annotation moved by `(dx, dy)` document units.
    ///
    /// Highlights are bound to the text they cover and never move.
    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        let mut moved = self.clone();
        match &mut moved.kind {
            AnnotationKind::Shape { x, y, .. } | AnnotationKind::Text { x, y, .. } => {
                *x += dx;
                *y += dy;
            }
            AnnotationKind::Freehand { path } => {
                for point in path.iter_mut() {
                    *point = point.translated(dx, dy);
                }
            }
            AnnotationKind::Highlight { .. } => {}
        }
        moved
    }

    /// Copy with a new comment; `None` when this is not a highlight
    pub fn with_comment(&self, comment: impl Into<String>) -> Option<Self> {
        let mut updated = self.clone();
        match &mut updated.kind {
            AnnotationKind::Highlight { comment: current, .. } => {
                *current = comment.into();
                Some(updated)
            }
            _ => None,
        }
    }

    /// Selected text underneath a highlight, if any
    pub fn content_text(&self) -> Option<&str> {
        match &self.kind {
            AnnotationKind::Highlight { content: Some(content), .. }
                if !content.text.is_empty() =>
            {
                Some(&content.text)
            }
            _ => None,
        }
    }

    pub fn comment(&self) -> Option<&str> {
        match &self.kind {
            AnnotationKind::Highlight { comment, .. } => Some(comment),
            _ => None,
        }
    }

    /// Whether a just-drawn annotation has no visible extent
    pub fn is_degenerate(&self) -> bool {
        match &self.kind {
            AnnotationKind::Shape { width, height, .. } => *width == 0.0 || *height == 0.0,
            AnnotationKind::Freehand { path } => path.len() < 2,
            AnnotationKind::Text { text, .. } => text.trim().is_empty(),
            AnnotationKind::Highlight { areas, .. } => areas.is_empty(),
        }
    }
}

/// Reasons a persisted annotation is rejected on load
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnnotationError {
    #[error("unknown annotation type `{0}`")]
    UnknownType(String),
    #[error("`{kind}` annotation is missing `{field}`")]
    MissingField { kind: String, field: &'static str },
    #[error("`{field}` is not a finite number")]
    NonFinite { field: &'static str },
    #[error("freehand annotation has an empty path")]
    EmptyPath,
    #[error("highlight annotation has no areas")]
    NoHighlightAreas,
}

/// Flat persisted representation; every field is optional so that decoding can
/// report exactly which piece of geometry is missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAnnotation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    page_index: Option<u32>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    y: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    height: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<Vec<DocPoint>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    font_size: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    highlight_areas: Option<Vec<HighlightArea>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<HighlightContent>,
    // UI-only flag written by older clients; read and discarded.
    #[serde(default, skip_serializing)]
    #[allow(dead_code)]
    is_selected: Option<bool>,
}

impl WireAnnotation {
    fn require(&self, value: Option<f32>, field: &'static str) -> Result<f32, AnnotationError> {
        let value = value
            .ok_or_else(|| AnnotationError::MissingField { kind: self.kind.clone(), field })?;
        if !value.is_finite() {
            return Err(AnnotationError::NonFinite { field });
        }
        Ok(value)
    }
}

impl TryFrom<WireAnnotation> for Annotation {
    type Error = AnnotationError;

    fn try_from(wire: WireAnnotation) -> Result<Self, Self::Error> {
        let kind = match wire.kind.as_str() {
            "freehand" | "marker" => {
                let path = wire.path.clone().unwrap_or_default();
                if path.is_empty() {
                    return Err(AnnotationError::EmptyPath);
                }
                if !path.iter().all(DocPoint::is_finite) {
                    return Err(AnnotationError::NonFinite { field: "path" });
                }
                AnnotationKind::Freehand { path }
            }
            "text" => AnnotationKind::Text {
                x: wire.require(wire.x, "x")?,
                y: wire.require(wire.y, "y")?,
                text: wire.text.clone().ok_or_else(|| AnnotationError::MissingField {
                    kind: wire.kind.clone(),
                    field: "text",
                })?,
                font_size: wire.require(wire.font_size, "fontSize")?,
            },
            "highlight" => {
                let areas = wire.highlight_areas.clone().unwrap_or_default();
                if areas.is_empty() {
                    return Err(AnnotationError::NoHighlightAreas);
                }
                AnnotationKind::Highlight {
                    areas,
                    comment: wire.comment.clone().unwrap_or_default(),
                    content: wire.content.clone(),
                }
            }
            other => match ShapeKind::parse(other) {
                Some(shape) => AnnotationKind::Shape {
                    shape,
                    x: wire.require(wire.x, "x")?,
                    y: wire.require(wire.y, "y")?,
                    width: wire.require(wire.width, "width")?,
                    height: wire.require(wire.height, "height")?,
                },
                None => return Err(AnnotationError::UnknownType(other.to_owned())),
            },
        };

        // Highlights from the text-selection layer only carry the page on their areas.
        let page_index = match (&kind, wire.page_index) {
            (_, Some(page_index)) => page_index,
            (AnnotationKind::Highlight { areas, .. }, None) => areas[0].page_index,
            (_, None) => {
                return Err(AnnotationError::MissingField {
                    kind: wire.kind.clone(),
                    field: "pageIndex",
                })
            }
        };

        let fallback_color = match kind {
            AnnotationKind::Highlight { .. } => DEFAULT_HIGHLIGHT_COLOR,
            _ => DEFAULT_COLOR,
        };
        let color = wire.color.unwrap_or_else(|| fallback_color.to_owned());

        let id = wire.id.map(AnnotationId::new).unwrap_or_else(AnnotationId::generate);

        Ok(Annotation { id, page_index, color, kind })
    }
}

impl From<Annotation> for WireAnnotation {
    fn from(annotation: Annotation) -> Self {
        let mut wire = WireAnnotation {
            id: Some(annotation.id.0),
            page_index: Some(annotation.page_index),
            kind: annotation.kind.type_name().to_owned(),
            color: Some(annotation.color),
            ..WireAnnotation::default()
        };

        match annotation.kind {
            AnnotationKind::Shape { x, y, width, height, .. } => {
                wire.x = Some(x);
                wire.y = Some(y);
                wire.width = Some(width);
                wire.height = Some(height);
            }
            AnnotationKind::Freehand { path } => wire.path = Some(path),
            AnnotationKind::Text { x, y, text, font_size } => {
                wire.x = Some(x);
                wire.y = Some(y);
                wire.text = Some(text);
                wire.font_size = Some(font_size);
            }
            AnnotationKind::Highlight { areas, comment, content } => {
                wire.highlight_areas = Some(areas);
                wire.comment = Some(comment);
                wire.content = content;
            }
        }

        wire
    }
}
