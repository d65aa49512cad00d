//! Remote document store used for cross-device progress.
//!
//! Documents are JSON objects grouped in collections and addressed by id. Every
//! write bumps the document's `version`, which callers can use for
//! compare-and-set updates.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

mod http;
mod memory;

pub use http::{HttpDocumentStore, HttpStoreConfig};
pub use memory::InMemoryDocumentStore;

/// Collection names shared with other clients of the store.
pub mod collections {
    pub const CHILD_PROGRESS: &str = "child_progress";
    pub const CHILD_ANALYTICS: &str = "child_analytics";
    pub const CHILD_PROFILES: &str = "child_profiles";
}

/// Errors surfaced by remote document stores.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RemoteError {
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    #[error("document not found")]
    NotFound,

    #[error("version conflict: expected {expected:?}, found {actual}")]
    VersionConflict { expected: Option<u64>, actual: u64 },

    #[error("remote store returned status {0}")]
    Status(u16),

    #[error("invalid document: {0}")]
    Decode(String),
}

/// A stored document and its version.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub id: String,
    pub version: u64,
    pub fields: Map<String, Value>,
}

impl Document {
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    /// Integer field; floats are truncated since other clients write either.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn get_i64(&self, field: &str) -> Option<i64> {
        let value = self.get(field)?;
        value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
    }

    #[must_use]
    pub fn get_u64(&self, field: &str) -> Option<u64> {
        self.get_i64(field).map(|v| u64::try_from(v).unwrap_or(0))
    }

    #[must_use]
    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(Value::as_bool)
    }
}

/// One field operation inside a write.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Set(Value),
    /// Adds to the stored number; a missing or non-numeric field counts as 0.
    Increment(i64),
}

/// Ordered set of field operations applied atomically to one document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DocumentWrite {
    ops: Vec<(String, FieldOp)>,
}

impl DocumentWrite {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push((field.into(), FieldOp::Set(value.into())));
        self
    }

    #[must_use]
    pub fn increment(mut self, field: impl Into<String>, by: i64) -> Self {
        self.ops.push((field.into(), FieldOp::Increment(by)));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> impl Iterator<Item = (&str, &FieldOp)> {
        self.ops.iter().map(|(k, op)| (k.as_str(), op))
    }

    /// Applies the operations to `fields`, clearing them first for [`WriteMode::Replace`].
    pub fn apply_to(&self, fields: &mut Map<String, Value>, mode: WriteMode) {
        if mode == WriteMode::Replace {
            fields.clear();
        }
        for (field, op) in &self.ops {
            match op {
                FieldOp::Set(value) => {
                    fields.insert(field.clone(), value.clone());
                }
                FieldOp::Increment(by) => {
                    let current = fields.get(field).and_then(Value::as_i64).unwrap_or(0);
                    fields.insert(field.clone(), Value::from(current.saturating_add(*by)));
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fields absent from the write keep their stored values.
    Merge,
    Replace,
}

impl WriteMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            WriteMode::Merge => "merge",
            WriteMode::Replace => "replace",
        }
    }
}

/// Equality filter for [`DocumentStore::query`].
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    #[must_use]
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        doc.get(&self.field) == Some(&self.value)
    }
}

/// Contract for remote document stores.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create or overwrite a document. Returns the new version.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` if the store cannot be reached or rejects the write.
    async fn set(
        &self,
        collection: &str,
        id: &str,
        write: &DocumentWrite,
        mode: WriteMode,
    ) -> Result<u64, RemoteError>;

    /// Merge into an existing document. Returns the new version.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::NotFound` if the document does not exist.
    async fn update(&self, collection: &str, id: &str, write: &DocumentWrite)
    -> Result<u64, RemoteError>;

    /// # Errors
    ///
    /// Returns `RemoteError` if the store cannot be reached.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, RemoteError>;

    /// Documents whose fields equal every filter. Order is by id.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` if the store cannot be reached.
    async fn query(&self, collection: &str, filters: &[Filter])
    -> Result<Vec<Document>, RemoteError>;

    /// Merge write that only succeeds when the stored version matches.
    ///
    /// `None` expects the document to be absent (or at version 0).
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::VersionConflict` when the stored version differs.
    async fn compare_and_set(
        &self,
        collection: &str,
        id: &str,
        expected_version: Option<u64>,
        write: &DocumentWrite,
    ) -> Result<u64, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_keeps_untouched_fields_and_increments() {
        let mut fields = Map::new();
        fields.insert("plays".into(), json!(2));
        fields.insert("note".into(), json!("keep"));

        DocumentWrite::new()
            .set("score", 80)
            .increment("plays", 1)
            .increment("totalTimeMs", 45_000)
            .apply_to(&mut fields, WriteMode::Merge);

        assert_eq!(fields["plays"], json!(3));
        assert_eq!(fields["totalTimeMs"], json!(45_000));
        assert_eq!(fields["note"], json!("keep"));
    }

    #[test]
    fn replace_drops_other_fields() {
        let mut fields = Map::new();
        fields.insert("stale".into(), json!(true));
        DocumentWrite::new()
            .set("sessionCount", 1)
            .apply_to(&mut fields, WriteMode::Replace);
        assert!(!fields.contains_key("stale"));
    }

    #[test]
    fn integer_getters_accept_floats() {
        let mut doc = Document::default();
        doc.fields.insert("score".into(), json!(72.0));
        assert_eq!(doc.get_i64("score"), Some(72));
        assert_eq!(doc.get_u64("missing"), None);
    }
}
