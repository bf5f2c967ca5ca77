//! PDF Annotator Core Library
//!
//! Annotation model, hit testing, undo/redo history, the pointer-driven drawing engine
//! and persistence of annotation sets.

pub mod annotation;
pub mod config;
pub mod document;
pub mod drawing;
pub mod geometry;
pub mod history;
pub mod notify;
pub mod persistence;

pub use annotation::{
    Annotation, AnnotationError, AnnotationId, AnnotationKind, DocPoint, HighlightArea,
    HighlightContent, ScreenPoint, ShapeKind, DEFAULT_COLOR, DEFAULT_HIGHLIGHT_COLOR,
};
pub use config::EngineConfig;
pub use document::{annotations_from_value, DocumentPatch, DocumentRecord, DocumentScope};
pub use drawing::{DrawingEngine, EngineResponse, EngineState, NoTextPrompt, TextPrompt, Tool};
pub use geometry::{annotation_bounds, areas_on_page, hit_test, topmost_hit, Bounds, PageSize};
pub use history::{History, Snapshot};
pub use notify::{LogNotifier, Notification, NotificationLevel, NotificationLog, Notifier};
pub use persistence::{
    delete_document, payload_bytes, sanitize, upload_document, BlobStore, DocumentStore,
    MemoryBlobStore, MemoryDocumentStore, PersistenceAdapter, SaveMode, SaveStatus, StoreError,
    StoreResult, SAVED_MESSAGE, SAVE_FAILED_MESSAGE,
};
