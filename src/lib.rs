use std::sync::Arc;

pub mod auth;
pub mod aws_clients;
pub mod callable;
pub mod config;
pub mod domain;
pub mod embedding;
pub mod errors;
pub mod gallery;
pub mod handlers;
pub mod indexer;
pub mod matching;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod startup;
pub mod storage;
pub mod storage_uri;
pub mod translate;
pub mod vector_index;

use crate::auth::{IdentityVerifier, LoginProvider};
use crate::domain::{Embedder, FileStorage, PhotoRepository, ProfileRepository, Translator, VectorIndex};
use crate::translate::DisplayLanguages;

/// AppState holds shared resources for the web server.
/// Every collaborator sits behind a trait object so tests can swap in fakes.
pub struct AppState {
    pub photo_repo: Arc<dyn PhotoRepository>,
    pub profile_repo: Arc<dyn ProfileRepository>,
    pub file_storage: Arc<dyn FileStorage>,
    pub translator: Arc<dyn Translator>,
    pub embedder: Arc<dyn Embedder>,
    pub vector_index: Arc<dyn VectorIndex>,
    pub login_provider: Arc<dyn LoginProvider>,
    pub identity_verifier: Arc<dyn IdentityVerifier>,
    pub languages: DisplayLanguages,
    pub tera: Arc<tera::Tera>,
    pub external_host_url: Option<String>,
}
