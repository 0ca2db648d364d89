use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError,
    services::{catalog::CatalogError, playback::PlaybackError},
    state::{lobby::SchemaError, lobby_machine::TransitionError},
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The playlist link cannot be resolved.
    #[error("invalid playlist: {0}")]
    InvalidPlaylist(String),
    /// The playlist has too few tracks playable in the chosen mode.
    #[error("only {available} playable track(s), at least {required} needed")]
    InsufficientTracks {
        /// Playable tracks found.
        available: usize,
        /// Minimum required.
        required: usize,
    },
    /// The lobby document does not exist.
    #[error("lobby `{0}` not found")]
    LobbyNotFound(String),
    /// The client is not in a lobby.
    #[error("not in a lobby")]
    NoActiveLobby,
    /// The client is already in another lobby.
    #[error("already in lobby `{0}`; leave it first")]
    AlreadyInLobby(String),
    /// The lobby rules refuse the intent.
    #[error(transparent)]
    Rejected(#[from] TransitionError),
    /// The document changed between the local check and the write.
    #[error("lobby changed concurrently: {0}")]
    Stale(String),
    /// The answer arrived after the local countdown expired.
    #[error("the answer window is closed")]
    AnswerWindowClosed,
    /// An answer for the current question is still being written.
    #[error("an answer is already being submitted")]
    AnswerInFlight,
    /// No question is being answered locally.
    #[error("no question is open")]
    NoOpenQuestion,
    /// A received lobby document cannot be used.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// The music catalog failed.
    #[error(transparent)]
    Catalog(CatalogError),
    /// The playback collaborator failed.
    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::PreconditionFailed { id, .. } => ServiceError::Stale(id),
            StorageError::NotFound { id, .. } => ServiceError::LobbyNotFound(id),
            other => ServiceError::Unavailable(other),
        }
    }
}

impl From<CatalogError> for ServiceError {
    fn from(err: CatalogError) -> Self {
        if err.is_bad_playlist() {
            ServiceError::InvalidPlaylist(err.to_string())
        } else {
            ServiceError::Catalog(err)
        }
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::InvalidInput(format!("validation failed: {err}"))
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// The caller is not allowed to do this.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// An upstream collaborator answered with something unusable.
    #[error("bad gateway: {0}")]
    BadGateway(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::Unavailable(_) | ServiceError::Degraded | ServiceError::Playback(_) => {
                AppError::ServiceUnavailable(message)
            }
            ServiceError::Catalog(_) => AppError::ServiceUnavailable(message),
            ServiceError::InvalidInput(_)
            | ServiceError::InvalidPlaylist(_)
            | ServiceError::InsufficientTracks { .. }
            | ServiceError::AnswerWindowClosed => AppError::BadRequest(message),
            ServiceError::LobbyNotFound(_) => AppError::NotFound(message),
            ServiceError::Rejected(TransitionError::NotHost | TransitionError::NotMember) => {
                AppError::Forbidden(message)
            }
            ServiceError::Rejected(_)
            | ServiceError::NoActiveLobby
            | ServiceError::AlreadyInLobby(_)
            | ServiceError::NoOpenQuestion
            | ServiceError::AnswerInFlight
            | ServiceError::Stale(_) => AppError::Conflict(message),
            ServiceError::Schema(_) => AppError::BadGateway(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_guards_surface_as_stale_conflicts() {
        let err = ServiceError::from(StorageError::PreconditionFailed {
            collection: "lobbies".into(),
            id: "ABC".into(),
        });
        assert!(matches!(err, ServiceError::Stale(_)));
        assert!(matches!(AppError::from(err), AppError::Conflict(_)));
    }

    #[test]
    fn rule_violations_map_to_http_statuses() {
        let forbidden = AppError::from(ServiceError::Rejected(TransitionError::NotHost));
        assert_eq!(forbidden.into_response().status(), StatusCode::FORBIDDEN);

        let conflict = AppError::from(ServiceError::Rejected(TransitionError::AlreadyStarted));
        assert_eq!(conflict.into_response().status(), StatusCode::CONFLICT);

        let bad_request = AppError::from(ServiceError::InsufficientTracks {
            available: 2,
            required: 4,
        });
        assert_eq!(bad_request.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unknown_playlists_are_user_errors() {
        let err = ServiceError::from(CatalogError::PlaylistNotFound("x".into()));
        assert!(matches!(err, ServiceError::InvalidPlaylist(_)));
    }
}
