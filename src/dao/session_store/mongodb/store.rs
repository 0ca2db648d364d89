use std::sync::Arc;

use async_stream::stream;
use futures::{StreamExt, TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{Document, doc},
    change_stream::event::OperationType,
    error::{ErrorKind, WriteFailure},
    options::{FullDocumentType, IndexOptions},
};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{
    config::MongoConfig,
    connection::establish_connection,
    convert::{
        self, ID_FIELD, from_document, query_filter, query_sort, translate_update, update_filter,
    },
    error::{MongoDaoError, MongoResult},
};
use crate::dao::{
    session_store::{
        DocumentQuery, DocumentStream, DocumentUpdate, HISTORY_COLLECTION, LOBBY_COLLECTION,
        PROFILE_COLLECTION, SessionStore, StoredDocument, generate_document_id,
    },
    storage::{StorageError, StorageResult},
};

const DUPLICATE_KEY: i32 = 11000;
const MAX_CREATE_ATTEMPTS: usize = 5;

/// [`SessionStore`] backed by MongoDB; subscriptions use change streams, which
/// need a replica set or sharded cluster.
#[derive(Clone)]
pub struct MongoSessionStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.database().await;
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.state.read().await;
        guard.database.clone()
    }

    async fn collection(&self, name: &str) -> Collection<Document> {
        self.database().await.collection::<Document>(name)
    }

    async fn create(&self, collection: &str, data: Value) -> MongoResult<String> {
        let Value::Object(fields) = data else {
            return Err(MongoDaoError::InvalidUpdate {
                path: collection.to_owned(),
                reason: "documents must be JSON objects".into(),
            });
        };
        let handle = self.collection(collection).await;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let id = generate_document_id();
            let mut document = convert::to_document(&fields);
            document.insert(ID_FIELD, id.clone());

            match handle.insert_one(document).await {
                Ok(_) => {
                    debug!(collection, id = %id, "document created");
                    return Ok(id);
                }
                Err(err) if is_duplicate_key(&err) && attempt < MAX_CREATE_ATTEMPTS => {
                    debug!(collection, id = %id, "generated id already taken; retrying");
                }
                Err(source) => {
                    return Err(MongoDaoError::Insert {
                        collection: collection.to_owned(),
                        source,
                    });
                }
            }
        }
    }

    async fn get(&self, collection: &str, id: &str) -> MongoResult<Option<Value>> {
        let document = self
            .collection(collection)
            .await
            .find_one(doc! { "_id": id })
            .await
            .map_err(|source| MongoDaoError::Load {
                collection: collection.to_owned(),
                id: id.to_owned(),
                source,
            })?;
        Ok(document.map(|document| from_document(document).1))
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        update: DocumentUpdate,
    ) -> StorageResult<()> {
        let filter = update_filter(id, &update)?;
        let translated = translate_update(&update)?;
        if translated.operators.is_empty() {
            return Ok(());
        }
        let handle = self.collection(collection).await;
        let load_error = |source| MongoDaoError::Update {
            collection: collection.to_owned(),
            id: id.to_owned(),
            source,
        };

        let mut action = handle
            .update_one(filter, translated.operators)
            .upsert(update.is_upsert());
        if !translated.array_filters.is_empty() {
            action = action.array_filters(translated.array_filters);
        }
        let result = action.await.map_err(load_error)?;

        if result.matched_count > 0 || result.upserted_id.is_some() {
            return Ok(());
        }
        let exists = handle
            .count_documents(doc! { "_id": id })
            .await
            .map_err(load_error)?;
        if exists == 0 {
            Err(StorageError::not_found(collection, id))
        } else {
            Err(StorageError::precondition_failed(collection, id))
        }
    }

    async fn query(
        &self,
        collection: &str,
        query: DocumentQuery,
    ) -> MongoResult<Vec<StoredDocument>> {
        let query_error = |source| MongoDaoError::Query {
            collection: collection.to_owned(),
            source,
        };
        let handle = self.collection(collection).await;
        let mut action = handle.find(query_filter(&query));
        if let Some(sort) = query_sort(&query) {
            action = action.sort(sort);
        }
        if let Some(limit) = query.limit {
            action = action.limit(limit as i64);
        }

        let documents: Vec<Document> = action
            .await
            .map_err(query_error)?
            .try_collect()
            .await
            .map_err(query_error)?;

        Ok(documents
            .into_iter()
            .filter_map(|document| match from_document(document) {
                (Some(id), data) => Some(StoredDocument { id, data }),
                (None, _) => None,
            })
            .collect())
    }

    async fn delete(&self, collection: &str, id: &str) -> MongoResult<bool> {
        let result = self
            .collection(collection)
            .await
            .delete_one(doc! { "_id": id })
            .await
            .map_err(|source| MongoDaoError::Delete {
                collection: collection.to_owned(),
                id: id.to_owned(),
                source,
            })?;
        Ok(result.deleted_count > 0)
    }

    /// Open the change stream before reading the current state so no write
    /// between the two is missed.
    async fn subscribe(self: Arc<Self>, collection: &str, id: &str) -> MongoResult<DocumentStream> {
        let watch_error = |source| MongoDaoError::Watch {
            collection: collection.to_owned(),
            id: id.to_owned(),
            source,
        };
        let mut changes = self
            .collection(collection)
            .await
            .watch()
            .pipeline(vec![doc! { "$match": { "documentKey._id": id } }])
            .full_document(FullDocumentType::UpdateLookup)
            .await
            .map_err(watch_error)?;
        let initial = self.get(collection, id).await?;

        let collection = collection.to_owned();
        let id = id.to_owned();
        let stream = stream! {
            yield Ok(initial);
            while let Some(event) = changes.next().await {
                match event {
                    Ok(event) => match event.operation_type {
                        OperationType::Delete => {
                            yield Ok(None);
                        }
                        OperationType::Insert | OperationType::Update | OperationType::Replace => {
                            yield Ok(event.full_document.map(|document| from_document(document).1));
                        }
                        OperationType::Invalidate | OperationType::Drop => {
                            yield Ok(None);
                            break;
                        }
                        _ => {}
                    },
                    Err(source) => {
                        warn!(collection = %collection, id = %id, error = %source, "change stream failed");
                        yield Err(StorageError::from(MongoDaoError::Watch {
                            collection: collection.clone(),
                            id: id.clone(),
                            source,
                        }));
                        break;
                    }
                }
            }
        };
        Ok(stream.boxed())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY
    )
}

impl MongoSessionStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let indexes = [
            (
                LOBBY_COLLECTION,
                "lobby_status_created_idx",
                doc! { "status": 1, "createdAt": -1 },
            ),
            (
                PROFILE_COLLECTION,
                "profile_total_score_idx",
                doc! { "totalScore": -1 },
            ),
            (
                HISTORY_COLLECTION,
                "history_uid_played_idx",
                doc! { "uid": 1, "playedAt": -1 },
            ),
        ];

        for (collection, name, keys) in indexes {
            let index = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().name(Some(name.to_owned())).build())
                .build();
            self.inner
                .collection(collection)
                .await
                .create_index(index)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index: name,
                    source,
                })?;
        }
        Ok(())
    }
}

impl SessionStore for MongoSessionStore {
    fn create_document(
        &self,
        collection: &str,
        data: Value,
    ) -> BoxFuture<'static, StorageResult<String>> {
        let inner = self.inner.clone();
        let collection = collection.to_owned();
        Box::pin(async move { Ok(inner.create(&collection, data).await?) })
    }

    fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let inner = self.inner.clone();
        let collection = collection.to_owned();
        let id = id.to_owned();
        Box::pin(async move { Ok(inner.get(&collection, &id).await?) })
    }

    fn subscribe_document(
        &self,
        collection: &str,
        id: &str,
    ) -> BoxFuture<'static, StorageResult<DocumentStream>> {
        let inner = self.inner.clone();
        let collection = collection.to_owned();
        let id = id.to_owned();
        Box::pin(async move { Ok(inner.subscribe(&collection, &id).await?) })
    }

    fn update_document(
        &self,
        collection: &str,
        id: &str,
        update: DocumentUpdate,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        let collection = collection.to_owned();
        let id = id.to_owned();
        Box::pin(async move { inner.update(&collection, &id, update).await })
    }

    fn query_documents(
        &self,
        collection: &str,
        query: DocumentQuery,
    ) -> BoxFuture<'static, StorageResult<Vec<StoredDocument>>> {
        let inner = self.inner.clone();
        let collection = collection.to_owned();
        Box::pin(async move { Ok(inner.query(&collection, query).await?) })
    }

    fn delete_document(
        &self,
        collection: &str,
        id: &str,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        let collection = collection.to_owned();
        let id = id.to_owned();
        Box::pin(async move { Ok(inner.delete(&collection, &id).await?) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.ping().await?) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.reconnect().await?) })
    }
}
