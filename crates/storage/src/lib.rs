use directories::ProjectDirs;
use log::{info, warn};
use pdf_annotator_core::{
    BlobStore, DocumentPatch, DocumentRecord, DocumentScope, DocumentStore, StoreError,
    StoreResult,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const RECORD_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Local data directory holding the document and blob stores
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn from_default_project() -> Result<Self, StorageError> {
        let dirs = ProjectDirs::from("dev", "PdfAnnotator", "PdfAnnotator")
            .ok_or(StorageError::NoDataDirectory)?;

        Ok(Self { root: dirs.data_local_dir().to_path_buf() })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory if it does not exist yet
    pub fn ensure_root(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    pub fn documents(&self) -> FileDocumentStore {
        FileDocumentStore::with_root(&self.root)
    }

    pub fn blobs(&self) -> FileBlobStore {
        FileBlobStore::with_root(self.root.join("blobs"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordEnvelope {
    version: u32,
    record: DocumentRecord,
}

/// Write through a sibling temp file so readers never see a partial file
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    fs::write(&temp, bytes)?;
    fs::rename(&temp, path)
}

/// Reject components that would escape the store root
fn check_component(component: &str) -> StoreResult<()> {
    let invalid = component.is_empty()
        || component == "."
        || component == ".."
        || component.contains(['/', '\\']);
    if invalid {
        return Err(StoreError::InvalidPath(component.to_owned()));
    }
    Ok(())
}

/// One JSON file per record under `<root>/artifacts/<app>/users/<user>/pdfs/<id>.json`
#[derive(Debug, Clone)]
pub struct FileDocumentStore {
    root: PathBuf,
}

impl FileDocumentStore {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn collection_dir(&self, scope: &DocumentScope) -> StoreResult<PathBuf> {
        check_component(&scope.app_id)?;
        check_component(&scope.user_id)?;
        Ok(self.root.join(scope.collection_path()))
    }

    fn record_path(&self, scope: &DocumentScope, id: &str) -> StoreResult<PathBuf> {
        check_component(id)?;
        Ok(self.collection_dir(scope)?.join(format!("{id}.json")))
    }

    fn read(&self, path: &Path, id: &str) -> StoreResult<DocumentRecord> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_owned()))
            }
            Err(err) => return Err(err.into()),
        };
        let envelope: RecordEnvelope = serde_json::from_slice(&bytes)?;
        Ok(envelope.record)
    }

    fn write(&self, path: &Path, record: &DocumentRecord) -> StoreResult<()> {
        let envelope = RecordEnvelope { version: RECORD_SCHEMA_VERSION, record: record.clone() };
        write_atomic(path, &serde_json::to_vec_pretty(&envelope)?)?;
        Ok(())
    }
}

impl DocumentStore for FileDocumentStore {
    fn create(&self, scope: &DocumentScope, mut record: DocumentRecord) -> StoreResult<DocumentRecord> {
        if record.id.is_empty() {
            record.id = uuid::Uuid::new_v4().to_string();
        }
        let path = self.record_path(scope, &record.id)?;
        self.write(&path, &record)?;
        info!("created document {} for {scope}", record.id);
        Ok(record)
    }

    fn list(&self, scope: &DocumentScope) -> StoreResult<Vec<DocumentRecord>> {
        let dir = self.collection_dir(scope)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut records = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let id = path.file_stem().and_then(|stem| stem.to_str()).unwrap_or_default().to_owned();
            match self.read(&path, &id) {
                Ok(record) => records.push(record),
                Err(err) => warn!("skipping unreadable record {}: {err}", path.display()),
            }
        }

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    fn get(&self, scope: &DocumentScope, id: &str) -> StoreResult<DocumentRecord> {
        let path = self.record_path(scope, id)?;
        self.read(&path, id)
    }

    fn update(&self, scope: &DocumentScope, id: &str, patch: &DocumentPatch) -> StoreResult<()> {
        let path = self.record_path(scope, id)?;
        let mut record = self.read(&path, id)?;
        record.apply(patch);
        self.write(&path, &record)
    }

    fn delete(&self, scope: &DocumentScope, id: &str) -> StoreResult<()> {
        let path = self.record_path(scope, id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("deleted document {id} for {scope}");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound(id.to_owned())),
            Err(err) => Err(err.into()),
        }
    }
}

/// PDF bytes stored as plain files under a root directory
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a `/`-separated blob path below the root
    pub fn resolve(&self, path: &str) -> StoreResult<PathBuf> {
        if path.starts_with('/') {
            return Err(StoreError::InvalidPath(path.to_owned()));
        }
        let mut resolved = self.root.clone();
        for component in path.split('/') {
            check_component(component).map_err(|_| StoreError::InvalidPath(path.to_owned()))?;
            resolved.push(component);
        }
        Ok(resolved)
    }
}

impl BlobStore for FileBlobStore {
    fn upload(&self, path: &str, bytes: &[u8]) -> StoreResult<String> {
        let resolved = self.resolve(path)?;
        write_atomic(&resolved, bytes)?;
        Ok(format!("file://{}", resolved.display()))
    }

    fn download(&self, path: &str) -> StoreResult<Vec<u8>> {
        let resolved = self.resolve(path)?;
        fs::read(&resolved).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => StoreError::BlobNotFound(path.to_owned()),
            _ => err.into(),
        })
    }

    fn remove(&self, path: &str) -> StoreResult<()> {
        let resolved = self.resolve(path)?;
        fs::remove_file(&resolved).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => StoreError::BlobNotFound(path.to_owned()),
            _ => err.into(),
        })
    }
}
