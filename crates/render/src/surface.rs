//! Drawing surfaces for the annotation overlay
//!
//! Coordinates handed to a [`Surface`] are already in screen space (document space
//! multiplied by zoom).

use pdf_annotator_core::{Bounds, ScreenPoint};
use serde::Serialize;

/// Screen-space rectangle with non-negative size
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_bounds(bounds: &Bounds) -> Self {
        Self { x: bounds.min_x, y: bounds.min_y, width: bounds.width(), height: bounds.height() }
    }

    /// Square of side `size` centered on `center`
    pub fn centered(center: ScreenPoint, size: f32) -> Self {
        let half = size / 2.0;
        Self { x: center.x - half, y: center.y - half, width: size, height: size }
    }

    pub fn inflated(&self, amount: f32) -> Self {
        Self {
            x: self.x - amount,
            y: self.y - amount,
            width: self.width + 2.0 * amount,
            height: self.height + 2.0 * amount,
        }
    }
}

/// Line paint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stroke {
    pub color: String,
    pub alpha: f32,
    pub width: f32,

    /// Alternating dash and gap lengths; empty for a solid line
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dash: Vec<f32>,
}

impl Stroke {
    pub fn solid(color: impl Into<String>, width: f32) -> Self {
        Self { color: color.into(), alpha: 1.0, width, dash: Vec::new() }
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn dashed(mut self, pattern: &[f32]) -> Self {
        self.dash = pattern.to_vec();
        self
    }
}

/// Area paint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fill {
    pub color: String,
    pub alpha: f32,
}

impl Fill {
    pub fn solid(color: impl Into<String>) -> Self {
        Self { color: color.into(), alpha: 1.0 }
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }
}

/// Transparent 2D surface stacked on top of a rendered page
pub trait Surface {
    /// Erase everything previously drawn
    fn clear(&mut self);

    fn stroke_rect(&mut self, rect: Rect, stroke: &Stroke);

    /// Ellipse inscribed in `bounds`
    fn stroke_ellipse(&mut self, bounds: Rect, stroke: &Stroke);

    fn stroke_polyline(&mut self, points: &[ScreenPoint], closed: bool, stroke: &Stroke);

    fn fill_rect(&mut self, rect: Rect, fill: &Fill);

    /// Text whose baseline starts at `at`
    fn fill_text(&mut self, text: &str, at: ScreenPoint, font_size: f32, fill: &Fill);
}

/// One recorded surface call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum DrawCommand {
    Clear,
    StrokeRect { rect: Rect, stroke: Stroke },
    StrokeEllipse { bounds: Rect, stroke: Stroke },
    StrokePolyline { points: Vec<ScreenPoint>, closed: bool, stroke: Stroke },
    FillRect { rect: Rect, fill: Fill },
    FillText { text: String, at: ScreenPoint, font_size: f32, fill: Fill },
}

/// Surface that keeps the calls made since the last clear
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordingSurface {
    commands: Vec<DrawCommand>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<DrawCommand> {
        self.commands
    }
}

impl Surface for RecordingSurface {
    fn clear(&mut self) {
        self.commands.clear();
        self.commands.push(DrawCommand::Clear);
    }

    fn stroke_rect(&mut self, rect: Rect, stroke: &Stroke) {
        self.commands.push(DrawCommand::StrokeRect { rect, stroke: stroke.clone() });
    }

    fn stroke_ellipse(&mut self, bounds: Rect, stroke: &Stroke) {
        self.commands.push(DrawCommand::StrokeEllipse { bounds, stroke: stroke.clone() });
    }

    fn stroke_polyline(&mut self, points: &[ScreenPoint], closed: bool, stroke: &Stroke) {
        self.commands.push(DrawCommand::StrokePolyline {
            points: points.to_vec(),
            closed,
            stroke: stroke.clone(),
        });
    }

    fn fill_rect(&mut self, rect: Rect, fill: &Fill) {
        self.commands.push(DrawCommand::FillRect { rect, fill: fill.clone() });
    }

    fn fill_text(&mut self, text: &str, at: ScreenPoint, font_size: f32, fill: &Fill) {
        self.commands.push(DrawCommand::FillText {
            text: text.to_owned(),
            at,
            font_size,
            fill: fill.clone(),
        });
    }
}
