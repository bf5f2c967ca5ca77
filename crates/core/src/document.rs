//! Stored document records and defensive loading of their annotation payload

use crate::annotation::{Annotation, AnnotationId};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

/// A user's uploaded PDF as kept by the document store.
///
/// `annotations` is held as raw JSON: it is read once when the document is opened and
/// written back wholesale on save, and older records may hold malformed entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: String,

    pub name: String,

    /// Where the renderer fetches the PDF bytes from
    pub url: String,

    /// Blob store path of the PDF bytes
    pub storage_path: String,

    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub created_at: i64,

    #[serde(default = "empty_annotations")]
    pub annotations: Value,
}

fn empty_annotations() -> Value {
    Value::Array(Vec::new())
}

impl DocumentRecord {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
        storage_path: impl Into<String>,
        created_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
            storage_path: storage_path.into(),
            created_at,
            annotations: empty_annotations(),
        }
    }

    /// Decode the stored annotations, dropping anything unusable
    pub fn load_annotations(&self) -> Vec<Annotation> {
        annotations_from_value(&self.annotations)
    }

    /// Apply a partial update in place
    pub fn apply(&mut self, patch: &DocumentPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(annotations) = &patch.annotations {
            self.annotations = annotations.clone();
        }
    }
}

/// Fields of a record to overwrite; `None` leaves the stored value alone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Value>,
}

impl DocumentPatch {
    pub fn annotations(annotations: Value) -> Self {
        Self { annotations: Some(annotations), ..Self::default() }
    }

    pub fn rename(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), ..Self::default() }
    }
}

/// Owner of a set of documents: one user within one application
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentScope {
    pub app_id: String,
    pub user_id: String,
}

impl DocumentScope {
    pub fn new(app_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self { app_id: app_id.into(), user_id: user_id.into() }
    }

    /// Collection path holding this owner's document records
    pub fn collection_path(&self) -> String {
        format!("artifacts/{}/users/{}/pdfs", self.app_id, self.user_id)
    }

    pub fn document_path(&self, document_id: &str) -> String {
        format!("{}/{}", self.collection_path(), document_id)
    }

    /// Blob path for an uploaded file, prefixed by upload time to keep names unique
    pub fn blob_path(&self, uploaded_at: i64, file_name: &str) -> String {
        format!("users/{}/pdfs/{}_{}", self.user_id, uploaded_at, file_name)
    }
}

impl fmt::Display for DocumentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app_id, self.user_id)
    }
}

/// Decode a stored annotation payload.
///
/// Accepts an array or, for legacy records, an object whose values are annotations.
/// Object values are taken in JavaScript enumeration order: array-index keys (`"1"`,
/// `"2"`, ... `"10"`) ascending by number, then the remaining keys.
/// Entries that fail to decode are dropped with a warning. Entries reusing an id seen
/// earlier are dropped so ids stay unique.
pub fn annotations_from_value(value: &Value) -> Vec<Annotation> {
    let entries: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => legacy_map_values(map),
        Value::Null => Vec::new(),
        other => {
            warn!("ignoring annotation payload of unexpected shape: {}", kind_of(other));
            return Vec::new();
        }
    };

    let mut seen: HashSet<AnnotationId> = HashSet::with_capacity(entries.len());
    let mut annotations = Vec::with_capacity(entries.len());

    for (position, entry) in entries.into_iter().enumerate() {
        match Annotation::deserialize(entry) {
            Ok(annotation) => {
                if seen.insert(annotation.id().clone()) {
                    annotations.push(annotation);
                } else {
                    warn!("dropping annotation #{position}: duplicate id {}", annotation.id());
                }
            }
            Err(err) => warn!("dropping annotation #{position}: {err}"),
        }
    }

    annotations
}

fn legacy_map_values(map: &Map<String, Value>) -> Vec<&Value> {
    let (mut indexed, named): (Vec<_>, Vec<_>) =
        map.iter().partition(|(key, _)| array_index(key).is_some());
    indexed.sort_by_key(|(key, _)| array_index(key));
    indexed.into_iter().chain(named).map(|(_, value)| value).collect()
}

/// Canonical decimal array index; `"01"`, `"+1"` and `"-1"` are plain keys
fn array_index(key: &str) -> Option<u32> {
    let index: u32 = key.parse().ok()?;
    (index != u32::MAX && index.to_string() == key).then_some(index)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::AnnotationKind;
    use serde_json::json;

    #[test]
    fn test_loads_array_and_drops_bad_entries() {
        let value = json!([
            {"id": "1", "pageIndex": 0, "type": "square", "color": "red", "x": 1, "y": 2, "width": 3, "height": 4},
            {"id": "2", "pageIndex": 0, "type": "hexagon", "color": "red"},
            {"id": "3", "pageIndex": 0, "type": "circle", "color": "red", "x": 1, "y": 2},
            {"id": "4", "pageIndex": 1, "type": "freehand", "color": "blue", "path": [{"x": 0, "y": 0}, {"x": 5, "y": 5}]},
            "garbage"
        ]);

        let loaded = annotations_from_value(&value);
        let ids: Vec<&str> = loaded.iter().map(|a| a.id().as_str()).collect();
        assert_eq!(ids, vec!["1", "4"]);
    }

    #[test]
    fn test_loads_legacy_object_map() {
        let value = json!({
            "a": {"id": "a", "pageIndex": 2, "type": "check", "color": "green", "x": 0, "y": 0, "width": 20, "height": 20},
            "b": {"id": "b", "pageIndex": 2, "type": "text", "color": "black", "x": 5, "y": 30, "text": "hi", "fontSize": 12}
        });

        let loaded = annotations_from_value(&value);
        assert_eq!(loaded.len(), 2);
        assert!(matches!(loaded[1].kind(), AnnotationKind::Text { .. }));
    }

    #[test]
    fn test_legacy_map_keeps_numeric_drawing_order() {
        let mut map = Map::new();
        for id in (1..=12).rev() {
            let key = id.to_string();
            map.insert(
                key.clone(),
                json!({"id": key, "pageIndex": 0, "type": "square", "x": 0, "y": 0, "width": 10, "height": 10}),
            );
        }
        map.insert(
            "note".into(),
            json!({"id": "note", "pageIndex": 0, "type": "text", "x": 0, "y": 20, "text": "x", "fontSize": 12}),
        );
        map.insert(
            "07".into(),
            json!({"id": "07", "pageIndex": 0, "type": "circle", "x": 0, "y": 0, "width": 5, "height": 5}),
        );

        let loaded = annotations_from_value(&Value::Object(map));
        let ids: Vec<&str> = loaded.iter().map(|a| a.id().as_str()).collect();
        assert_eq!(
            ids,
            vec!["1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12", "07", "note"]
        );
    }

    #[test]
    fn test_array_index_keys() {
        assert_eq!(array_index("0"), Some(0));
        assert_eq!(array_index("42"), Some(42));
        assert_eq!(array_index("042"), None);
        assert_eq!(array_index("+4"), None);
        assert_eq!(array_index("-1"), None);
        assert_eq!(array_index("4294967295"), None);
        assert_eq!(array_index("abc"), None);
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let value = json!([
            {"id": "x", "pageIndex": 0, "type": "square", "color": "red", "x": 0, "y": 0, "width": 1, "height": 1},
            {"id": "x", "pageIndex": 0, "type": "circle", "color": "red", "x": 0, "y": 0, "width": 1, "height": 1}
        ]);

        let loaded = annotations_from_value(&value);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].type_name(), "square");
    }

    #[test]
    fn test_unexpected_payloads_load_empty() {
        assert!(annotations_from_value(&Value::Null).is_empty());
        assert!(annotations_from_value(&json!("nope")).is_empty());
        assert!(annotations_from_value(&json!(42)).is_empty());
    }

    #[test]
    fn test_record_without_annotations_field() {
        let record: DocumentRecord = serde_json::from_value(json!({
            "id": "doc",
            "name": "paper.pdf",
            "url": "https://example.test/paper.pdf",
            "storagePath": "users/u/pdfs/1_paper.pdf",
            "createdAt": 1700000000000i64
        }))
        .unwrap();

        assert_eq!(record.annotations, json!([]));
        assert!(record.load_annotations().is_empty());
    }

    #[test]
    fn test_patch_leaves_unset_fields() {
        let mut record = DocumentRecord::new("doc", "a.pdf", "u", "p", 1);
        record.apply(&DocumentPatch::annotations(json!([{"id": "1"}])));
        assert_eq!(record.name, "a.pdf");
        assert_eq!(record.annotations, json!([{"id": "1"}]));

        record.apply(&DocumentPatch::rename("b.pdf"));
        assert_eq!(record.name, "b.pdf");
        assert_eq!(record.annotations, json!([{"id": "1"}]));
    }

    #[test]
    fn test_scope_paths() {
        let scope = DocumentScope::new("app", "alice");
        assert_eq!(scope.document_path("d1"), "artifacts/app/users/alice/pdfs/d1");
        assert_eq!(scope.blob_path(42, "paper.pdf"), "users/alice/pdfs/42_paper.pdf");
    }
}
