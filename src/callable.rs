//! RPC-style callable functions for the client-side app.
//!
//! Wire format: `POST /fn/<name>` with `{"data": ...}` and an optional
//! `Authorization: Bearer <ID token>`. Successes return `{"result": ...}`,
//! failures `{"error": {"status": "<CODE>", "message": "..."}}`.

use crate::{
    auth::{bearer_token, CallerIdentity},
    gallery, matching,
    models::{PhotoFields, PhotoPatch},
    AppState,
};
use axum::{
    body::Bytes,
    extract::{FromRequest, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::{fmt, sync::Arc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallableCode {
    Unauthenticated,
    InvalidArgument,
    NotFound,
    PermissionDenied,
    Internal,
}

impl CallableCode {
    pub fn as_str(self) -> &'static str {
        match self {
            CallableCode::Unauthenticated => "UNAUTHENTICATED",
            CallableCode::InvalidArgument => "INVALID_ARGUMENT",
            CallableCode::NotFound => "NOT_FOUND",
            CallableCode::PermissionDenied => "PERMISSION_DENIED",
            CallableCode::Internal => "INTERNAL",
        }
    }

    fn status(self) -> StatusCode {
        match self {
            CallableCode::Unauthenticated => StatusCode::UNAUTHORIZED,
            CallableCode::InvalidArgument => StatusCode::BAD_REQUEST,
            CallableCode::NotFound => StatusCode::NOT_FOUND,
            CallableCode::PermissionDenied => StatusCode::FORBIDDEN,
            CallableCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(thiserror::Error, Debug)]
#[error("{}: {}", .code.as_str(), .message)]
pub struct CallableError {
    pub code: CallableCode,
    pub message: String,
}

impl CallableError {
    fn new(code: CallableCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn unauthenticated() -> Self {
        Self::new(CallableCode::Unauthenticated, "Authentication required.")
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(CallableCode::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(CallableCode::NotFound, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(CallableCode::PermissionDenied, message)
    }

    /// Logs `err` and returns the generic internal error; the detail never
    /// reaches the caller.
    pub fn internal(message: &str, err: impl fmt::Debug) -> Self {
        tracing::error!(error = ?err, "{}", message);
        Self::new(CallableCode::Internal, message)
    }
}

impl IntoResponse for CallableError {
    fn into_response(self) -> Response {
        let body = json!({ "error": { "status": self.code.as_str(), "message": self.message } });
        (self.code.status(), Json(body)).into_response()
    }
}

/// A decoded callable request: the caller (if a bearer token was sent) and
/// the `data` payload.
#[derive(Debug)]
pub struct CallableRequest {
    pub caller: Option<CallerIdentity>,
    pub data: Value,
}

impl CallableRequest {
    fn caller(&self) -> Result<&CallerIdentity, CallableError> {
        self.caller.as_ref().ok_or_else(CallableError::unauthenticated)
    }

    fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name).filter(|v| !v.is_null())
    }

    fn required_str(&self, name: &str) -> Result<&str, CallableError> {
        self.field(name)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| CallableError::invalid_argument(format!("The function must be called with a '{}' argument.", name)))
    }

    fn payload<T: DeserializeOwned>(value: Value) -> Result<T, CallableError> {
        serde_json::from_value(value).map_err(|e| CallableError::invalid_argument(format!("Malformed arguments: {}", e)))
    }
}

impl FromRequest<Arc<AppState>> for CallableRequest {
    type Rejection = CallableError;

    async fn from_request(req: Request, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = bearer_token(req.headers()).map(str::to_string);

        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| CallableError::invalid_argument(format!("Unreadable request body: {}", e)))?;
        let data = if body.is_empty() {
            Value::Null
        } else {
            let envelope: Value = serde_json::from_slice(&body)
                .map_err(|_| CallableError::invalid_argument("Request body is not valid JSON."))?;
            match envelope {
                Value::Object(mut map) => map.remove("data").unwrap_or(Value::Null),
                _ => return Err(CallableError::invalid_argument("Request body must be a JSON object.")),
            }
        };

        // An invalid token is rejected outright rather than treated as anonymous.
        let caller = match token {
            Some(token) => match state.identity_verifier.verify(&token).await {
                Ok(identity) => Some(identity),
                Err(e) => {
                    tracing::warn!(error = %e, "Callable: Rejecting invalid ID token");
                    return Err(CallableError::unauthenticated());
                }
            },
            None => None,
        };

        Ok(Self { caller, data })
    }
}

/// Routes for the callable tier, to be nested under `/fn`.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/getphotos", post(get_photos))
        .route("/addphoto", post(add_photo))
        .route("/getphotodetails", post(get_photo_details))
        .route("/editphoto", post(edit_photo))
        .route("/deletephoto", post(delete_photo))
        .route("/findphotobymatch", post(find_photo_by_match))
        .fallback(unknown_function)
}

type CallableResult = Result<Json<Value>, CallableError>;

fn ok(result: Value) -> CallableResult {
    Ok(Json(json!({ "result": result })))
}

async fn unknown_function() -> CallableError {
    CallableError::not_found("No such function.")
}

/// Fetches all photos ordered by description.
pub async fn get_photos(State(state): State<Arc<AppState>>, req: CallableRequest) -> CallableResult {
    req.caller()?;

    let photos = state
        .photo_repo
        .list_by_description()
        .await
        .map_err(|e| CallableError::internal("An error occurred while fetching photos.", e))?;

    tracing::info!("Returning {} photos.", photos.len());
    ok(json!(photos))
}

pub async fn add_photo(State(state): State<Arc<AppState>>, req: CallableRequest) -> CallableResult {
    let caller = req.caller()?.uid.clone();
    req.required_str("imageUrl")?;

    let fields: PhotoFields = CallableRequest::payload(req.data)?;
    let photo = gallery::create_photo(state.photo_repo.as_ref(), fields, &caller)
        .await
        .map_err(|e| CallableError::internal("An error occurred while adding the photo.", e))?;

    ok(json!({ "photoId": photo.id }))
}

pub async fn get_photo_details(State(state): State<Arc<AppState>>, req: CallableRequest) -> CallableResult {
    req.caller()?;
    let photo_id = req.required_str("photoId")?;

    let photo = state
        .photo_repo
        .get_by_id(photo_id)
        .await
        .map_err(|e| CallableError::internal("An error occurred while fetching the photo.", e))?
        .ok_or_else(|| CallableError::not_found("Photo not found."))?;

    ok(json!(photo))
}

/// Merges `updatedData` into the stored photo. Only the uploader may edit.
pub async fn edit_photo(State(state): State<Arc<AppState>>, req: CallableRequest) -> CallableResult {
    let caller = req.caller()?;
    let photo_id = req.required_str("photoId")?;
    let updated = match req.field("updatedData") {
        Some(Value::Object(map)) => Value::Object(map.clone()),
        _ => {
            return Err(CallableError::invalid_argument(
                "The function must be called with an 'updatedData' object.",
            ))
        }
    };
    let patch: PhotoPatch = CallableRequest::payload(updated)?;

    let photo = state
        .photo_repo
        .get_by_id(photo_id)
        .await
        .map_err(|e| CallableError::internal("An error occurred while updating the photo.", e))?
        .ok_or_else(|| CallableError::not_found("Photo not found."))?;
    if !photo.is_owned_by(&caller.uid) {
        return Err(CallableError::permission_denied("You can only edit your own photos."));
    }

    state
        .photo_repo
        .update(photo_id, &patch)
        .await
        .map_err(|e| CallableError::internal("An error occurred while updating the photo.", e))?;

    tracing::info!(%photo_id, uploader = %caller.uid, "Callable: Photo updated");
    ok(json!({ "photoId": photo_id, "success": true }))
}

/// Deletes the photo document and its stored image. Only the uploader may delete.
pub async fn delete_photo(State(state): State<Arc<AppState>>, req: CallableRequest) -> CallableResult {
    let caller = req.caller()?;
    let photo_id = req.required_str("photoId")?;

    let photo = state
        .photo_repo
        .get_by_id(photo_id)
        .await
        .map_err(|e| CallableError::internal("An error occurred while deleting the photo.", e))?
        .ok_or_else(|| CallableError::not_found("Photo not found."))?;
    if !photo.is_owned_by(&caller.uid) {
        return Err(CallableError::permission_denied("You can only delete your own photos."));
    }

    gallery::delete_photo(state.photo_repo.as_ref(), state.file_storage.as_ref(), &photo)
        .await
        .map_err(|e| CallableError::internal("An error occurred while deleting the photo.", e))?;

    ok(json!({ "photoId": photo_id, "success": true }))
}

/// Finds the stored photo that looks most like the submitted image.
pub async fn find_photo_by_match(State(state): State<Arc<AppState>>, req: CallableRequest) -> CallableResult {
    req.caller()?;
    let image = decode_image(req.required_str("image")?)?;

    let photo_id = matching::find_photo_by_match(
        state.embedder.as_ref(),
        state.vector_index.as_ref(),
        state.photo_repo.as_ref(),
        &image,
    )
    .await
    .map_err(|e| CallableError::internal("An error occurred while searching for a match.", e))?;

    let mut result = Map::new();
    result.insert("photoId".to_string(), photo_id.map(Value::String).unwrap_or(Value::Null));
    ok(Value::Object(result))
}

/// Accepts plain base64 or a `data:<mime>;base64,` URL.
fn decode_image(encoded: &str) -> Result<Vec<u8>, CallableError> {
    let payload = match encoded.split_once(',') {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => encoded,
    };
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|_| CallableError::invalid_argument("'image' must be base64-encoded image data."))?;
    if bytes.is_empty() {
        return Err(CallableError::invalid_argument("'image' must not be empty."));
    }
    Ok(bytes)
}
