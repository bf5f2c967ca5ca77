//! Persistence of a document's annotation set
//!
//! The document and blob stores are external collaborators reached through the
//! [`DocumentStore`] and [`BlobStore`] traits. [`PersistenceAdapter`] writes the whole
//! annotation list back to the open document's record and reports the outcome to the
//! user; it never touches the in-memory annotation set, so a failed save leaves
//! nothing to roll back.

use crate::annotation::Annotation;
use crate::document::{DocumentPatch, DocumentRecord, DocumentScope};
use crate::notify::{Notification, Notifier};
use log::{debug, error, warn};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const SAVED_MESSAGE: &str = "Annotations Saved!";
pub const SAVE_FAILED_MESSAGE: &str = "Error saving annotations.";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("blob not found: {0}")]
    BlobNotFound(String),

    #[error("invalid storage path: {0}")]
    InvalidPath(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Per-owner collection of document records
pub trait DocumentStore {
    /// Store a new record; an empty id is replaced by a generated one
    fn create(&self, scope: &DocumentScope, record: DocumentRecord) -> StoreResult<DocumentRecord>;

    /// All of the owner's records, newest first
    fn list(&self, scope: &DocumentScope) -> StoreResult<Vec<DocumentRecord>>;

    fn get(&self, scope: &DocumentScope, id: &str) -> StoreResult<DocumentRecord>;

    fn update(&self, scope: &DocumentScope, id: &str, patch: &DocumentPatch) -> StoreResult<()>;

    fn delete(&self, scope: &DocumentScope, id: &str) -> StoreResult<()>;
}

/// Byte storage for the original PDF files
pub trait BlobStore {
    /// Store `bytes` at `path`, returning a URL the renderer can load
    fn upload(&self, path: &str, bytes: &[u8]) -> StoreResult<String>;

    fn download(&self, path: &str) -> StoreResult<Vec<u8>>;

    fn remove(&self, path: &str) -> StoreResult<()>;
}

impl<S: DocumentStore + ?Sized> DocumentStore for &S {
    fn create(&self, scope: &DocumentScope, record: DocumentRecord) -> StoreResult<DocumentRecord> {
        (**self).create(scope, record)
    }

    fn list(&self, scope: &DocumentScope) -> StoreResult<Vec<DocumentRecord>> {
        (**self).list(scope)
    }

    fn get(&self, scope: &DocumentScope, id: &str) -> StoreResult<DocumentRecord> {
        (**self).get(scope, id)
    }

    fn update(&self, scope: &DocumentScope, id: &str, patch: &DocumentPatch) -> StoreResult<()> {
        (**self).update(scope, id, patch)
    }

    fn delete(&self, scope: &DocumentScope, id: &str) -> StoreResult<()> {
        (**self).delete(scope, id)
    }
}

/// Canonical persisted form of an annotation list.
///
/// Runtime-only state such as selection is not part of [`Annotation`], and optional
/// fields are omitted rather than written as `null`.
pub fn sanitize(annotations: &[Annotation]) -> StoreResult<Value> {
    Ok(serde_json::to_value(annotations)?)
}

/// Canonical JSON bytes of an annotation list
pub fn payload_bytes(annotations: &[Annotation]) -> StoreResult<Vec<u8>> {
    Ok(serde_json::to_vec(&sanitize(annotations)?)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Triggered by a committed edit; succeeds silently
    Auto,

    /// Requested by the user; success is announced
    Explicit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    Saved,
    Failed,
}

/// Writes annotation sets back to the open document's record
pub struct PersistenceAdapter<S, N> {
    scope: DocumentScope,
    document: DocumentRecord,
    store: S,
    notifier: N,
}

impl<S: DocumentStore, N: Notifier> PersistenceAdapter<S, N> {
    pub fn new(scope: DocumentScope, document: DocumentRecord, store: S, notifier: N) -> Self {
        Self { scope, document, store, notifier }
    }

    /// The record as last loaded or successfully saved
    pub fn document(&self) -> &DocumentRecord {
        &self.document
    }

    pub fn scope(&self) -> &DocumentScope {
        &self.scope
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Persist `annotations` as the document's full annotation set
    pub fn save(&mut self, annotations: &[Annotation], mode: SaveMode) -> SaveStatus {
        match self.write(annotations) {
            Ok(()) => {
                debug!("saved {} annotations to {}", annotations.len(), self.document.id);
                if mode == SaveMode::Explicit {
                    self.notifier.notify(Notification::info(SAVED_MESSAGE));
                }
                SaveStatus::Saved
            }
            Err(err) => {
                error!("saving annotations to {} failed: {err}", self.document.id);
                self.notifier.notify(Notification::error(SAVE_FAILED_MESSAGE));
                SaveStatus::Failed
            }
        }
    }

    fn write(&mut self, annotations: &[Annotation]) -> StoreResult<()> {
        let payload = sanitize(annotations)?;
        self.store.update(
            &self.scope,
            &self.document.id,
            &DocumentPatch::annotations(payload.clone()),
        )?;
        self.document.annotations = payload;
        Ok(())
    }
}

/// Store an uploaded PDF and create its record
pub fn upload_document<D: DocumentStore, B: BlobStore>(
    docs: &D,
    blobs: &B,
    scope: &DocumentScope,
    file_name: &str,
    bytes: &[u8],
    uploaded_at: i64,
) -> StoreResult<DocumentRecord> {
    let storage_path = scope.blob_path(uploaded_at, file_name);
    let url = blobs.upload(&storage_path, bytes)?;
    docs.create(scope, DocumentRecord::new("", file_name, url, storage_path, uploaded_at))
}

/// Delete a document's bytes and record.
///
/// A blob that cannot be removed is logged and the record is deleted anyway.
pub fn delete_document<D: DocumentStore, B: BlobStore>(
    docs: &D,
    blobs: &B,
    scope: &DocumentScope,
    record: &DocumentRecord,
) -> StoreResult<()> {
    if let Err(err) = blobs.remove(&record.storage_path) {
        warn!("could not remove blob {}: {err}", record.storage_path);
    }
    docs.delete(scope, &record.id)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory document store; clones share the same records
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    /// Keyed by full document path
    records: Arc<Mutex<BTreeMap<String, DocumentRecord>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail, to exercise failure handling
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        Ok(())
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn create(&self, scope: &DocumentScope, mut record: DocumentRecord) -> StoreResult<DocumentRecord> {
        self.check_available()?;
        if record.id.is_empty() {
            record.id = uuid::Uuid::new_v4().to_string();
        }
        lock(&self.records).insert(scope.document_path(&record.id), record.clone());
        Ok(record)
    }

    fn list(&self, scope: &DocumentScope) -> StoreResult<Vec<DocumentRecord>> {
        self.check_available()?;
        let prefix = format!("{}/", scope.collection_path());
        let mut records: Vec<DocumentRecord> = lock(&self.records)
            .iter()
            .filter(|(path, _)| path.starts_with(&prefix))
            .map(|(_, record)| record.clone())
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    fn get(&self, scope: &DocumentScope, id: &str) -> StoreResult<DocumentRecord> {
        self.check_available()?;
        lock(&self.records)
            .get(&scope.document_path(id))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))
    }

    fn update(&self, scope: &DocumentScope, id: &str, patch: &DocumentPatch) -> StoreResult<()> {
        self.check_available()?;
        let mut records = lock(&self.records);
        let record = records
            .get_mut(&scope.document_path(id))
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;
        record.apply(patch);
        Ok(())
    }

    fn delete(&self, scope: &DocumentScope, id: &str) -> StoreResult<()> {
        self.check_available()?;
        lock(&self.records)
            .remove(&scope.document_path(id))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))
    }
}

/// In-memory blob store; clones share the same bytes
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &str) -> bool {
        lock(&self.blobs).contains_key(path)
    }
}

impl BlobStore for MemoryBlobStore {
    fn upload(&self, path: &str, bytes: &[u8]) -> StoreResult<String> {
        lock(&self.blobs).insert(path.to_owned(), bytes.to_vec());
        Ok(format!("memory://{path}"))
    }

    fn download(&self, path: &str) -> StoreResult<Vec<u8>> {
        lock(&self.blobs)
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::BlobNotFound(path.to_owned()))
    }

    fn remove(&self, path: &str) -> StoreResult<()> {
        lock(&self.blobs)
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StoreError::BlobNotFound(path.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationId, AnnotationKind, DocPoint, ShapeKind};
    use crate::document::annotations_from_value;
    use crate::notify::{NotificationLevel, NotificationLog};
    use proptest::prelude::*;
    use serde_json::json;

    fn scope() -> DocumentScope {
        DocumentScope::new("app", "alice")
    }

    fn square(id: &str) -> Annotation {
        Annotation::new(
            AnnotationId::new(id),
            0,
            "#ff0000",
            AnnotationKind::Shape { shape: ShapeKind::Square, x: 1.0, y: 2.0, width: 3.0, height: 4.0 },
        )
    }

    fn adapter(
        store: &MemoryDocumentStore,
        log: &NotificationLog,
    ) -> PersistenceAdapter<MemoryDocumentStore, NotificationLog> {
        let record = store
            .create(&scope(), DocumentRecord::new("doc", "paper.pdf", "url", "path", 10))
            .unwrap();
        PersistenceAdapter::new(scope(), record, store.clone(), log.clone())
    }

    #[test]
    fn test_explicit_save_announces_success() {
        let store = MemoryDocumentStore::new();
        let log = NotificationLog::new();
        let mut adapter = adapter(&store, &log);

        assert_eq!(adapter.save(&[square("a")], SaveMode::Explicit), SaveStatus::Saved);
        assert_eq!(log.entries(), vec![Notification::info(SAVED_MESSAGE)]);

        let stored = store.get(&scope(), "doc").unwrap();
        assert_eq!(stored.load_annotations(), vec![square("a")]);
        assert_eq!(adapter.document().annotations, stored.annotations);
    }

    #[test]
    fn test_autosave_is_silent() {
        let store = MemoryDocumentStore::new();
        let log = NotificationLog::new();
        let mut adapter = adapter(&store, &log);

        assert_eq!(adapter.save(&[square("a")], SaveMode::Auto), SaveStatus::Saved);
        assert!(log.is_empty());
    }

    #[test]
    fn test_failed_save_keeps_last_document() {
        let store = MemoryDocumentStore::new();
        let log = NotificationLog::new();
        let mut adapter = adapter(&store, &log);
        adapter.save(&[square("a")], SaveMode::Auto);

        store.set_unavailable(true);
        assert_eq!(adapter.save(&[square("a"), square("b")], SaveMode::Auto), SaveStatus::Failed);

        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, NotificationLevel::Error);
        assert_eq!(entries[0].message, SAVE_FAILED_MESSAGE);
        assert_eq!(annotations_from_value(&adapter.document().annotations), vec![square("a")]);
    }

    #[test]
    fn test_sanitize_omits_runtime_fields() {
        let value = sanitize(&[square("a")]).unwrap();
        assert_eq!(
            value,
            json!([{"id": "a", "pageIndex": 0, "type": "square", "color": "#ff0000", "x": 1.0, "y": 2.0, "width": 3.0, "height": 4.0}])
        );
        assert_eq!(payload_bytes(&[]).unwrap(), b"[]".to_vec());
    }

    #[test]
    fn test_list_is_newest_first_and_scoped() {
        let store = MemoryDocumentStore::new();
        store.create(&scope(), DocumentRecord::new("old", "a", "u", "p", 1)).unwrap();
        store.create(&scope(), DocumentRecord::new("new", "b", "u", "p", 5)).unwrap();
        store
            .create(&DocumentScope::new("app", "bob"), DocumentRecord::new("other", "c", "u", "p", 9))
            .unwrap();

        let ids: Vec<String> = store.list(&scope()).unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[test]
    fn test_upload_then_delete_document() {
        let docs = MemoryDocumentStore::new();
        let blobs = MemoryBlobStore::new();
        let record = upload_document(&docs, &blobs, &scope(), "paper.pdf", b"%PDF-1.7", 77).unwrap();

        assert!(!record.id.is_empty());
        assert_eq!(record.url, "memory://users/alice/pdfs/77_paper.pdf");
        assert!(blobs.contains(&record.storage_path));

        delete_document(&docs, &blobs, &scope(), &record).unwrap();
        assert!(!blobs.contains(&record.storage_path));
        assert!(matches!(docs.get(&scope(), &record.id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_delete_proceeds_when_blob_is_missing() {
        let docs = MemoryDocumentStore::new();
        let blobs = MemoryBlobStore::new();
        let record = docs
            .create(&scope(), DocumentRecord::new("doc", "a", "u", "gone.pdf", 1))
            .unwrap();

        delete_document(&docs, &blobs, &scope(), &record).unwrap();
        assert!(docs.list(&scope()).unwrap().is_empty());
    }

    fn arb_annotation() -> impl Strategy<Value = Annotation> {
        let shape = (0u32..4, -500.0f32..500.0, -500.0f32..500.0, 1.0f32..100.0, 1.0f32..100.0)
            .prop_map(|(page, x, y, w, h)| {
                Annotation::new(
                    AnnotationId::generate(),
                    page,
                    "#00ff00",
                    AnnotationKind::Shape { shape: ShapeKind::Circle, x, y, width: w, height: h },
                )
            });
        let stroke = (0u32..4, prop::collection::vec((0.0f32..800.0, 0.0f32..800.0), 2..10))
            .prop_map(|(page, points)| {
                Annotation::new(
                    AnnotationId::generate(),
                    page,
                    "#0000ff",
                    AnnotationKind::Freehand {
                        path: points.into_iter().map(|(x, y)| DocPoint::new(x, y)).collect(),
                    },
                )
            });
        prop_oneof![shape, stroke]
    }

    proptest! {
        #[test]
        fn prop_sanitize_is_idempotent(annotations in prop::collection::vec(arb_annotation(), 0..12)) {
            let once = sanitize(&annotations).unwrap();
            let reloaded = annotations_from_value(&once);
            prop_assert_eq!(&reloaded, &annotations);
            prop_assert_eq!(sanitize(&reloaded).unwrap(), once);
        }
    }
}
