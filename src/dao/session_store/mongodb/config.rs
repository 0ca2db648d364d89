use std::time::Duration;

use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

const DEFAULT_DB: &str = "tune_lobby";
const APP_NAME: &str = "tune-lobby";
/// Fail fast so the storage supervisor can switch to degraded mode.
const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Client options and database name of the MongoDB session store.
#[derive(Clone)]
pub struct MongoConfig {
    /// Parsed connection string with the daemon's defaults applied.
    pub options: ClientOptions,
    /// Database holding the lobby, history and profile collections.
    pub database_name: String,
}

impl MongoConfig {
    /// Parse `uri`; the database defaults to the one named in the URI, then to `tune_lobby`.
    pub async fn from_uri(uri: &str, db_name: Option<&str>) -> MongoResult<Self> {
        let mut options =
            ClientOptions::parse(uri)
                .await
                .map_err(|source| MongoDaoError::InvalidUri {
                    uri: uri.to_owned(),
                    source,
                })?;
        options.app_name.get_or_insert_with(|| APP_NAME.to_owned());
        options
            .server_selection_timeout
            .get_or_insert(SERVER_SELECTION_TIMEOUT);

        let database_name = db_name
            .map(str::to_owned)
            .or_else(|| options.default_database.clone())
            .unwrap_or_else(|| DEFAULT_DB.to_owned());

        Ok(Self {
            options,
            database_name,
        })
    }
}
