//! Viewer configuration
//!
//! Built once by the composition root and handed to [`Viewer::open`](crate::Viewer::open).
//! Values come from defaults, a JSON file, or `PDF_ANNOTATOR_*` environment variables.

use pdf_annotator_core::EngineConfig;
use pdf_annotator_render::RenderStyle;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

pub const ENV_WORKER_URL: &str = "PDF_ANNOTATOR_WORKER_URL";
pub const ENV_ZOOM: &str = "PDF_ANNOTATOR_ZOOM";
pub const ENV_AUTOSAVE: &str = "PDF_ANNOTATOR_AUTOSAVE";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Malformed value for the named setting
    #[error("invalid value for {0}")]
    InvalidValue(String),

    #[error("zoom range {min}..={max} does not contain {initial}")]
    ZoomRange { min: f32, max: f32, initial: f32 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Location of the rendering worker script, for rasterizers that run one
    pub worker_url: Option<String>,

    pub initial_zoom: f32,
    pub min_zoom: f32,
    pub max_zoom: f32,

    /// Increment used by zoom in / zoom out
    pub zoom_step: f32,

    /// Save after every committed edit
    pub autosave: bool,

    pub engine: EngineConfig,

    pub style: RenderStyle,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            worker_url: None,
            initial_zoom: 1.0,
            min_zoom: 0.25,
            max_zoom: 4.0,
            zoom_step: 0.25,
            autosave: true,
            engine: EngineConfig::default(),
            style: RenderStyle::default(),
        }
    }
}

impl ViewerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `PDF_ANNOTATOR_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup, using the environment variable names as keys
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup(ENV_WORKER_URL) {
            self.worker_url = Some(val).filter(|url| !url.trim().is_empty());
        }

        if let Some(val) = lookup(ENV_ZOOM) {
            self.initial_zoom = val
                .trim()
                .parse::<f32>()
                .ok()
                .filter(|zoom| zoom.is_finite() && *zoom > 0.0)
                .ok_or_else(|| ConfigError::InvalidValue(ENV_ZOOM.to_string()))?;
        }

        if let Some(val) = lookup(ENV_AUTOSAVE) {
            self.autosave = match val.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(ConfigError::InvalidValue(ENV_AUTOSAVE.to_string())),
            };
        }

        self.validate()?;
        Ok(self)
    }

    /// Load from a JSON file; missing fields keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ordered = self.min_zoom > 0.0
            && self.min_zoom <= self.initial_zoom
            && self.initial_zoom <= self.max_zoom;
        if !ordered {
            return Err(ConfigError::ZoomRange {
                min: self.min_zoom,
                max: self.max_zoom,
                initial: self.initial_zoom,
            });
        }
        if !(self.zoom_step.is_finite() && self.zoom_step > 0.0) {
            return Err(ConfigError::InvalidValue("zoom_step".to_string()));
        }
        if let Some(setting) = self.engine.invalid_setting() {
            return Err(ConfigError::InvalidValue(format!("engine.{setting}")));
        }
        Ok(())
    }

    /// Clamp a requested zoom into the configured range
    pub fn clamp_zoom(&self, zoom: f32) -> f32 {
        zoom.clamp(self.min_zoom, self.max_zoom)
    }

    pub fn with_autosave(mut self, autosave: bool) -> Self {
        self.autosave = autosave;
        self
    }

    pub fn with_initial_zoom(mut self, zoom: f32) -> Self {
        self.initial_zoom = zoom;
        self
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }
}
