use crate::{
    callable, // Callable functions live under /fn
    handlers,
    AppState,
};
use axum::{
    extract::DefaultBodyLimit,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tower_sessions::cookie::time::Duration;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

/// Uploads and callable payloads carry whole images.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

fn session_layer() -> SessionManagerLayer<MemoryStore> {
    SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false) // Set to true when served over HTTPS only
        .with_expiry(Expiry::OnInactivity(Duration::days(7)))
}

/// Creates the Axum router and associates routes with handlers.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::list_photos))
        .route("/login", get(handlers::login))
        .route("/oauth2callback", get(handlers::oauth2callback))
        .route("/logout", get(handlers::logout))
        .route("/error", get(handlers::error))
        .route("/profile", get(handlers::profile_form).post(handlers::update_profile))
        .route("/photos/add", get(handlers::add_photo_form).post(handlers::add_photo))
        .route("/photos/{id}", get(handlers::view_photo))
        .route("/photos/{id}/edit", get(handlers::edit_photo_form).post(handlers::edit_photo))
        .route("/photos/{id}/delete", get(handlers::delete_photo))
        .nest("/fn", callable::router())
        // Middleware Layers
        .layer(session_layer())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state) // Pass the application state
}
