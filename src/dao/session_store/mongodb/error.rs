use mongodb::error::Error as MongoError;
use thiserror::Error;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures of the MongoDB session store.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to insert into `{collection}`")]
    Insert {
        collection: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to read `{collection}/{id}`")]
    Load {
        collection: String,
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to update `{collection}/{id}`")]
    Update {
        collection: String,
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to delete `{collection}/{id}`")]
    Delete {
        collection: String,
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to query `{collection}`")]
    Query {
        collection: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to watch `{collection}/{id}`")]
    Watch {
        collection: String,
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("cannot translate update of `{path}`: {reason}")]
    InvalidUpdate { path: String, reason: String },
}
