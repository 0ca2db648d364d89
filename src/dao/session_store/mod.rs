pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;
pub mod query;
pub mod update;

use futures::{future::BoxFuture, stream::BoxStream};
use serde_json::Value;
use uuid::Uuid;

use crate::dao::storage::StorageResult;

pub use self::memory::MemorySessionStore;
pub use self::query::{DocumentQuery, SortDirection, SortOrder, StoredDocument};
pub use self::update::{DocumentUpdate, FieldPath, FieldUpdate, PathSegment, UpdateGuard};

/// Collection holding one document per multiplayer lobby.
pub const LOBBY_COLLECTION: &str = "lobbies";
/// Append-only collection of per-player game results.
pub const HISTORY_COLLECTION: &str = "history";
/// Long-lived per-player aggregates keyed by uid.
pub const PROFILE_COLLECTION: &str = "profiles";

/// Length of generated document ids; short enough to read out as a join code.
const GENERATED_ID_LEN: usize = 8;

/// Fresh uppercase document id, doubling as a lobby join code.
pub(crate) fn generate_document_id() -> String {
    Uuid::new_v4().simple().to_string()[..GENERATED_ID_LEN].to_uppercase()
}

/// Stream of document states pushed by a subscription. `None` means the document is absent.
///
/// The first item is the state at subscription time; dropping the stream unsubscribes.
pub type DocumentStream = BoxStream<'static, StorageResult<Option<Value>>>;

/// Real-time document database the lobby controller synchronises through.
///
/// Writes are last-write-wins unless an update carries guards; the store never
/// enforces lobby business rules.
pub trait SessionStore: Send + Sync {
    /// Insert `data` under a store-generated id and return that id.
    fn create_document(&self, collection: &str, data: Value)
    -> BoxFuture<'static, StorageResult<String>>;
    /// One-shot read; `None` when the document does not exist.
    fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<Value>>>;
    /// Current state of the document followed by every later version.
    fn subscribe_document(
        &self,
        collection: &str,
        id: &str,
    ) -> BoxFuture<'static, StorageResult<DocumentStream>>;
    /// Apply `update` atomically, honouring its guards and upsert flag.
    fn update_document(
        &self,
        collection: &str,
        id: &str,
        update: DocumentUpdate,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Filtered, ordered and limited scan of `collection`.
    fn query_documents(
        &self,
        collection: &str,
        query: DocumentQuery,
    ) -> BoxFuture<'static, StorageResult<Vec<StoredDocument>>>;
    /// Remove a document; `false` when it did not exist.
    fn delete_document(&self, collection: &str, id: &str)
    -> BoxFuture<'static, StorageResult<bool>>;
    /// Cheap round trip proving the backend is reachable.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Rebuild the backend connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
