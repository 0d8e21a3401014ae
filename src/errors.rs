use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

// --- Backend errors, one enum per collaborator ---

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("Stored item could not be parsed: {0}")]
    DataCorruption(String),

    #[error("Document store error: {0}")]
    BackendError(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Image upload failed: {0}")]
    UploadFailed(String),

    #[error("No stored object at {0}")]
    NotFound(String),

    #[error("Object storage error: {0}")]
    BackendError(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("Translation backend error: {0}")]
    BackendError(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding response was malformed: {0}")]
    InvalidResponse(String),

    #[error("Embedding backend error: {0}")]
    BackendError(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Vector index backend error: {0}")]
    BackendError(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials: {0}")]
    InvalidToken(String),

    #[error("OAuth flow failed: {0}")]
    OAuth(String),

    #[error("Identity provider error: {0}")]
    BackendError(#[from] anyhow::Error),
}

// --- Web front end ---

/// Error returned by the web pages and by resource creation. Backend detail is logged
/// and replaced by a fixed message in the response body.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Error processing multipart form data: {0}")]
    MultipartError(#[from] axum::extract::multipart::MultipartError),

    #[error("Photo not found with ID: {0}")]
    PhotoNotFound(String),
    #[error("Photo {0} belongs to another user")]
    Forbidden(String),

    #[error("Could not access photo data")]
    RepositoryError(#[from] RepoError),
    #[error("Could not perform file storage operation")]
    StorageError(#[from] StorageError),
    #[error("Could not translate text")]
    TranslateError(#[from] TranslateError),
    #[error("Login failed")]
    AuthError(#[from] AuthError),
    #[error("Session error: {0}")]
    SessionError(#[from] tower_sessions::session::Error),
    #[error("Template error: {0}")]
    TemplateError(#[from] tera::Error),

    #[error("Initialization error: {0}")]
    InitError(String),
}

impl AppError {
    fn status_and_message(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::InvalidInput(_) | AppError::MultipartError(_) => (StatusCode::BAD_REQUEST, "Invalid request"),
            AppError::PhotoNotFound(_) => (StatusCode::NOT_FOUND, "Photo not found"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "Only the uploader may change this photo"),
            AppError::RepositoryError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database operation failed"),
            AppError::StorageError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "File storage operation failed"),
            AppError::TranslateError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Translation failed"),
            AppError::AuthError(_) => (StatusCode::BAD_GATEWAY, "Login with the identity provider failed"),
            AppError::SessionError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Session error"),
            AppError::TemplateError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Page rendering failed"),
            AppError::InitError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Server initialization error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, summary) = self.status_and_message();

        // Client errors carry their own explanation; server errors only a summary.
        let error_message = if status.is_client_error() {
            match &self {
                AppError::InvalidInput(msg) => msg.clone(),
                AppError::MultipartError(e) => format!("Invalid multipart form data: {}", e),
                AppError::PhotoNotFound(id) => format!("Photo not found with ID: {}", id),
                _ => summary.to_string(),
            }
        } else {
            summary.to_string()
        };

        if status.is_server_error() {
            tracing::error!(error.detail = ?self, %status, "Responding with server error");
        } else {
            tracing::warn!(error.detail = %self, %status, "Responding with client error");
        }

        let body = Json(serde_json::json!({ "error": error_message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_detail_stays_out_of_the_status_mapping() {
        let err = AppError::from(RepoError::BackendError(anyhow::anyhow!("table photos is gone")));
        assert_eq!(
            err.status_and_message(),
            (StatusCode::INTERNAL_SERVER_ERROR, "Database operation failed")
        );
    }

    #[test]
    fn client_errors_map_to_4xx() {
        assert_eq!(AppError::PhotoNotFound("p1".into()).status_and_message().0, StatusCode::NOT_FOUND);
        assert_eq!(AppError::Forbidden("p1".into()).status_and_message().0, StatusCode::FORBIDDEN);
        assert_eq!(AppError::InvalidInput("x".into()).status_and_message().0, StatusCode::BAD_REQUEST);
    }
}
