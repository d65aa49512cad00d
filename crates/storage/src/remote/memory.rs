use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{Document, DocumentStore, DocumentWrite, Filter, RemoteError, WriteMode};

type Collections = HashMap<String, BTreeMap<String, Document>>;

/// Thread-safe in-process document store.
///
/// `set_offline(true)` makes every call fail with [`RemoteError::Unavailable`].
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<Mutex<Collections>>,
    offline: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
}

impl InMemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Number of successful writes so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of documents in a collection.
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .map(|c| c.get(collection).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn open(&self) -> Result<MutexGuard<'_, Collections>, RemoteError> {
        if self.is_offline() {
            return Err(RemoteError::Unavailable("store is offline".into()));
        }
        self.collections
            .lock()
            .map_err(|e| RemoteError::Unavailable(e.to_string()))
    }

    fn write_doc(
        &self,
        guard: &mut Collections,
        collection: &str,
        id: &str,
        write: &DocumentWrite,
        mode: WriteMode,
    ) -> u64 {
        let doc = guard
            .entry(collection.to_owned())
            .or_default()
            .entry(id.to_owned())
            .or_insert_with(|| Document {
                id: id.to_owned(),
                ..Document::default()
            });
        write.apply_to(&mut doc.fields, mode);
        doc.version += 1;
        self.writes.fetch_add(1, Ordering::SeqCst);
        doc.version
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn set(
        &self,
        collection: &str,
        id: &str,
        write: &DocumentWrite,
        mode: WriteMode,
    ) -> Result<u64, RemoteError> {
        let mut guard = self.open()?;
        Ok(self.write_doc(&mut guard, collection, id, write, mode))
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        write: &DocumentWrite,
    ) -> Result<u64, RemoteError> {
        let mut guard = self.open()?;
        let exists = guard
            .get(collection)
            .is_some_and(|docs| docs.contains_key(id));
        if !exists {
            return Err(RemoteError::NotFound);
        }
        Ok(self.write_doc(&mut guard, collection, id, write, WriteMode::Merge))
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, RemoteError> {
        let guard = self.open()?;
        Ok(guard.get(collection).and_then(|docs| docs.get(id)).cloned())
    }

    async fn query(
        &self,
        collection: &str,
        filters: &[Filter],
    ) -> Result<Vec<Document>, RemoteError> {
        let guard = self.open()?;
        Ok(guard
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| filters.iter().all(|f| f.matches(doc)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn compare_and_set(
        &self,
        collection: &str,
        id: &str,
        expected_version: Option<u64>,
        write: &DocumentWrite,
    ) -> Result<u64, RemoteError> {
        let mut guard = self.open()?;
        let actual = guard
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map_or(0, |doc| doc.version);
        if actual != expected_version.unwrap_or(0) {
            return Err(RemoteError::VersionConflict {
                expected: expected_version,
                actual,
            });
        }
        Ok(self.write_doc(&mut guard, collection, id, write, WriteMode::Merge))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn repeated_merges_converge_on_one_document() {
        let store = InMemoryDocumentStore::new();
        let write = DocumentWrite::new().set("score", 60).increment("plays", 1);
        store.set("child_progress", "kid_feed_monster", &write, WriteMode::Merge).await.unwrap();
        store.set("child_progress", "kid_feed_monster", &write, WriteMode::Merge).await.unwrap();

        assert_eq!(store.len("child_progress"), 1);
        let doc = store.get("child_progress", "kid_feed_monster").await.unwrap().unwrap();
        assert_eq!(doc.version, 2);
        assert_eq!(doc.fields["plays"], json!(2));
    }

    #[tokio::test]
    async fn update_requires_existing_document() {
        let store = InMemoryDocumentStore::new();
        let err = store
            .update("child_profiles", "kid", &DocumentWrite::new().set("stars", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::NotFound));
    }

    #[tokio::test]
    async fn compare_and_set_rejects_stale_version() {
        let store = InMemoryDocumentStore::new();
        let write = DocumentWrite::new().set("progress", 29);
        let v1 = store.compare_and_set("child_profiles", "kid", None, &write).await.unwrap();
        assert_eq!(v1, 1);

        let err = store
            .compare_and_set("child_profiles", "kid", None, &write)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RemoteError::VersionConflict { expected: None, actual: 1 }
        ));
        assert_eq!(
            store.compare_and_set("child_profiles", "kid", Some(1), &write).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn offline_store_rejects_everything() {
        let store = InMemoryDocumentStore::new();
        store.set_offline(true);
        let err = store.get("child_progress", "x").await.unwrap_err();
        assert!(matches!(err, RemoteError::Unavailable(_)));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn query_filters_by_equality() {
        let store = InMemoryDocumentStore::new();
        for (id, child) in [("a_m", "a"), ("b_m", "b"), ("a_n", "a")] {
            let write = DocumentWrite::new().set("childId", child);
            store.set("child_progress", id, &write, WriteMode::Merge).await.unwrap();
        }
        let docs = store
            .query("child_progress", &[Filter::eq("childId", "a")])
            .await
            .unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a_m", "a_n"]);
    }
}
