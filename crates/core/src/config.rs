//! Drawing engine configuration

use crate::annotation::DEFAULT_COLOR;
use serde::{Deserialize, Serialize};

/// Tunables for the drawing engine.
///
/// All lengths are in document units (zoom 1.0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Slack around shapes and strokes when hit testing
    pub hit_margin: f32,

    /// Side length of check and cross stamps
    pub stamp_size: f32,

    /// Color given to new annotations until the user picks another
    pub default_color: String,

    /// Font size of new text annotations
    pub default_font_size: f32,

    /// Marker stroke width, scaled by zoom when rendered
    pub marker_width: f32,

    /// Marker ink opacity (0.0 - 1.0)
    pub marker_alpha: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hit_margin: 5.0,
            stamp_size: 20.0,
            default_color: DEFAULT_COLOR.to_owned(),
            default_font_size: 16.0,
            marker_width: 8.0,
            marker_alpha: 0.4,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hit_margin(mut self, margin: f32) -> Self {
        self.hit_margin = margin.max(0.0);
        self
    }

    pub fn with_stamp_size(mut self, size: f32) -> Self {
        self.stamp_size = size;
        self
    }

    pub fn with_default_color(mut self, color: impl Into<String>) -> Self {
        self.default_color = color.into();
        self
    }

    pub fn with_default_font_size(mut self, font_size: f32) -> Self {
        self.default_font_size = font_size;
        self
    }

    pub fn with_marker(mut self, width: f32, alpha: f32) -> Self {
        self.marker_width = width;
        self.marker_alpha = alpha.clamp(0.0, 1.0);
        self
    }

    /// Name of the first setting outside its valid range, if any.
    ///
    /// The hit margin may be zero; sizes must be positive and the alpha lie in `0.0..=1.0`.
    pub fn invalid_setting(&self) -> Option<&'static str> {
        let positive = |value: f32| value.is_finite() && value > 0.0;

        if !(self.hit_margin.is_finite() && self.hit_margin >= 0.0) {
            Some("hit_margin")
        } else if !positive(self.stamp_size) {
            Some("stamp_size")
        } else if !positive(self.default_font_size) {
            Some("default_font_size")
        } else if !positive(self.marker_width) {
            Some("marker_width")
        } else if !(0.0..=1.0).contains(&self.marker_alpha) {
            Some("marker_alpha")
        } else {
            None
        }
    }
}
