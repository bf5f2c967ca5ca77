//! PDF Annotator Viewer Library
//!
//! The composition root that owns one open document: configuration, the drawing
//! engine, overlay compositing, base-page renders and persistence, plus an optional
//! summarizer for highlighted text.

pub mod config;
pub mod summary;
pub mod viewer;

pub use config::{ConfigError, ViewerConfig};
pub use summary::{NoSummarizer, Summarizer, SummaryError};
pub use viewer::Viewer;
