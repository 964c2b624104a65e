use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use tradedocs_queue::QueueError;
use tradedocs_shared::TransitionError;
use tradedocs_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Document not found")]
    DocumentNotFound,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("New holder address is required")]
    MissingHolderAddress,

    #[error("Invalid queue name")]
    InvalidQueue,

    #[error("Unknown or missing user identity")]
    Unauthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Job error: {0}")]
    Queue(#[from] QueueError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Stable machine-readable error code, mirrored by the frontend.
    fn code(&self) -> &'static str {
        match self {
            Self::DocumentNotFound => "DOCUMENT_NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::MissingHolderAddress => "MISSING_HOLDER_ADDRESS",
            Self::InvalidQueue => "INVALID_QUEUE",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Forbidden(_) => "UNAUTHORIZED_ACCESS",
            Self::Transition(TransitionError::AlreadyVerified) => "ALREADY_VERIFIED",
            Self::Transition(TransitionError::NotTransferable) => "NON_TRANSFERABLE_DOCUMENT",
            Self::Transition(TransitionError::Unauthorized) => "UNAUTHORIZED_TRANSFER",
            Self::Transition(TransitionError::InvalidTransition(_)) => "INVALID_TRANSITION",
            Self::Queue(QueueError::JobNotFound(_)) => "JOB_NOT_FOUND",
            Self::Queue(_) => "SERVER_ERROR",
            Self::Store(StoreError::NotFound) => "DOCUMENT_NOT_FOUND",
            Self::Store(_) => "SERVER_ERROR",
            Self::Internal(_) => "SERVER_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::DocumentNotFound => StatusCode::NOT_FOUND,
            Self::BadRequest(_) | Self::MissingHolderAddress | Self::InvalidQueue => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Transition(TransitionError::Unauthorized) => StatusCode::FORBIDDEN,
            Self::Transition(TransitionError::InvalidTransition(_)) => StatusCode::CONFLICT,
            Self::Transition(_) => StatusCode::BAD_REQUEST,
            Self::Queue(QueueError::JobNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
            Self::Queue(_) | Self::Store(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal details stay in the logs, not the response body.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = serde_json::json!({
            "error": message,
            "code": self.code(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradedocs_shared::DocumentStatus;

    #[test]
    fn transition_errors_map_to_contract_codes() {
        assert_eq!(
            ServerError::Transition(TransitionError::AlreadyVerified).code(),
            "ALREADY_VERIFIED"
        );
        assert_eq!(
            ServerError::Transition(TransitionError::NotTransferable).code(),
            "NON_TRANSFERABLE_DOCUMENT"
        );
        assert_eq!(
            ServerError::Transition(TransitionError::Unauthorized).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ServerError::Transition(TransitionError::InvalidTransition(
                DocumentStatus::PendingTransfer
            ))
            .status(),
            StatusCode::CONFLICT
        );
    }
}
