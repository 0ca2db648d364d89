mod config;
mod connection;
mod convert;
mod error;
pub mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoSessionStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::InvalidUpdate { path, reason } => {
                StorageError::InvalidPath { path, reason }
            }
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
