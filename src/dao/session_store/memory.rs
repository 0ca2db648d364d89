use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use futures::{StreamExt, future::BoxFuture};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

use crate::dao::{
    epoch_millis,
    session_store::{
        DocumentQuery, DocumentStream, DocumentUpdate, SessionStore, StoredDocument,
        generate_document_id,
    },
    storage::{StorageError, StorageResult},
};

/// Process-local [`SessionStore`] keeping every document in memory.
///
/// Each document owns a `watch` channel so subscribers always converge on the
/// latest version. Updates run under the map shard lock, which makes every
/// [`DocumentUpdate`] atomic with respect to concurrent writers.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    documents: Arc<DashMap<DocumentKey, DocumentSlot>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DocumentKey {
    collection: String,
    id: String,
}

impl DocumentKey {
    fn new(collection: &str, id: &str) -> Self {
        Self {
            collection: collection.to_owned(),
            id: id.to_owned(),
        }
    }
}

struct DocumentSlot {
    data: Value,
    tx: watch::Sender<Option<Value>>,
}

impl DocumentSlot {
    fn new(data: Value) -> Self {
        let (tx, _rx) = watch::channel(Some(data.clone()));
        Self { data, tx }
    }
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn create(&self, collection: &str, data: Value) -> String {
        loop {
            let id = generate_document_id();
            if let Entry::Vacant(vacant) = self.documents.entry(DocumentKey::new(collection, &id)) {
                vacant.insert(DocumentSlot::new(data));
                debug!(collection, id = %id, "document created");
                return id;
            }
        }
    }

    fn get(&self, collection: &str, id: &str) -> Option<Value> {
        self.documents
            .get(&DocumentKey::new(collection, id))
            .map(|slot| slot.data.clone())
    }

    fn subscribe(&self, collection: &str, id: &str) -> DocumentStream {
        let receiver = match self.documents.get(&DocumentKey::new(collection, id)) {
            Some(slot) => slot.tx.subscribe(),
            None => {
                // Absent documents yield a single `None` and then end.
                let (_tx, rx) = watch::channel(None);
                rx
            }
        };
        WatchStream::new(receiver).map(Ok).boxed()
    }

    fn update(&self, collection: &str, id: &str, update: &DocumentUpdate) -> StorageResult<()> {
        let now = epoch_millis();
        match self.documents.entry(DocumentKey::new(collection, id)) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                if !update.guards_hold(&slot.data) {
                    return Err(StorageError::precondition_failed(collection, id));
                }
                let mut next = slot.data.clone();
                update.apply_to(&mut next, now)?;
                slot.data = next.clone();
                slot.tx.send_replace(Some(next));
                Ok(())
            }
            Entry::Vacant(vacant) if update.is_upsert() => {
                let mut data = Value::Object(Map::new());
                if !update.guards_hold(&data) {
                    return Err(StorageError::precondition_failed(collection, id));
                }
                update.apply_to(&mut data, now)?;
                vacant.insert(DocumentSlot::new(data));
                Ok(())
            }
            Entry::Vacant(_) => Err(StorageError::not_found(collection, id)),
        }
    }

    fn query(&self, collection: &str, query: &DocumentQuery) -> Vec<StoredDocument> {
        let mut documents: Vec<StoredDocument> = self
            .documents
            .iter()
            .filter(|entry| entry.key().collection == collection && query.matches(&entry.data))
            .map(|entry| StoredDocument {
                id: entry.key().id.clone(),
                data: entry.data.clone(),
            })
            .collect();
        query.finish(&mut documents);
        documents
    }

    fn delete(&self, collection: &str, id: &str) -> bool {
        match self.documents.remove(&DocumentKey::new(collection, id)) {
            Some((_, slot)) => {
                slot.tx.send_replace(None);
                debug!(collection, id, "document deleted");
                true
            }
            None => false,
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn create_document(
        &self,
        collection: &str,
        data: Value,
    ) -> BoxFuture<'static, StorageResult<String>> {
        let id = self.create(collection, data);
        Box::pin(async move { Ok(id) })
    }

    fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let document = self.get(collection, id);
        Box::pin(async move { Ok(document) })
    }

    fn subscribe_document(
        &self,
        collection: &str,
        id: &str,
    ) -> BoxFuture<'static, StorageResult<DocumentStream>> {
        let stream = self.subscribe(collection, id);
        Box::pin(async move { Ok(stream) })
    }

    fn update_document(
        &self,
        collection: &str,
        id: &str,
        update: DocumentUpdate,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.update(collection, id, &update);
        Box::pin(async move { result })
    }

    fn query_documents(
        &self,
        collection: &str,
        query: DocumentQuery,
    ) -> BoxFuture<'static, StorageResult<Vec<StoredDocument>>> {
        let documents = self.query(collection, &query);
        Box::pin(async move { Ok(documents) })
    }

    fn delete_document(
        &self,
        collection: &str,
        id: &str,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let deleted = self.delete(collection, id);
        Box::pin(async move { Ok(deleted) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use serde_json::json;

    use super::*;
    use crate::dao::session_store::SortDirection;

    #[tokio::test]
    async fn subscription_sees_updates_then_deletion() {
        let store = MemorySessionStore::new();
        let id = store
            .create_document("lobbies", json!({"currentTrackIndex": 0}))
            .await
            .unwrap();

        let mut stream = store.subscribe_document("lobbies", &id).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, Some(json!({"currentTrackIndex": 0})));

        store
            .update_document(
                "lobbies",
                &id,
                DocumentUpdate::new().increment("currentTrackIndex", 1),
            )
            .await
            .unwrap();
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second, Some(json!({"currentTrackIndex": 1})));

        assert!(store.delete_document("lobbies", &id).await.unwrap());
        assert_eq!(stream.next().await.unwrap().unwrap(), None);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn subscribing_to_missing_document_yields_absent_once() {
        let store = MemorySessionStore::new();
        let mut stream = store.subscribe_document("lobbies", "NOPE").await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), None);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn failed_guard_writes_nothing() {
        let store = MemorySessionStore::new();
        let id = store
            .create_document("lobbies", json!({"currentTrackIndex": 2}))
            .await
            .unwrap();

        let err = store
            .update_document(
                "lobbies",
                &id,
                DocumentUpdate::new()
                    .guard_equals("currentTrackIndex", 1)
                    .increment("currentTrackIndex", 1),
            )
            .await
            .unwrap_err();

        assert!(err.is_precondition_failure());
        assert_eq!(
            store.get_document("lobbies", &id).await.unwrap(),
            Some(json!({"currentTrackIndex": 2}))
        );
    }

    #[tokio::test]
    async fn update_without_upsert_requires_existing_document() {
        let store = MemorySessionStore::new();
        let err = store
            .update_document("profiles", "u1", DocumentUpdate::new().increment("totalScore", 5))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));

        store
            .update_document(
                "profiles",
                "u1",
                DocumentUpdate::new().increment("totalScore", 5).upsert(),
            )
            .await
            .unwrap();
        assert_eq!(
            store.get_document("profiles", "u1").await.unwrap(),
            Some(json!({"totalScore": 5}))
        );
    }

    #[tokio::test]
    async fn query_is_scoped_to_collection() {
        let store = MemorySessionStore::new();
        store
            .create_document("lobbies", json!({"status": "waiting", "createdAt": 1}))
            .await
            .unwrap();
        store
            .create_document("history", json!({"status": "waiting", "createdAt": 2}))
            .await
            .unwrap();

        let found = store
            .query_documents(
                "lobbies",
                DocumentQuery::all()
                    .where_eq("status", "waiting")
                    .order_by("createdAt", SortDirection::Descending),
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].data["createdAt"], json!(1));
    }
}
