#![allow(dead_code)]

use async_trait::async_trait;
use axum::{body::Body, http::Response, Router};
use http_body_util::BodyExt;
use photo_gallery::{
    auth::{CallerIdentity, IdentityVerifier, LoginProvider, LoginResult, UserInfo},
    domain::{
        Embedder, FileStorage, IndexedVector, Language, Neighbor, PhotoRepository, ProfileRepository,
        StoredObject, Translation, Translator, VectorIndex,
    },
    errors::{AuthError, EmbeddingError, IndexError, RepoError, StorageError, TranslateError},
    models::{Photo, PhotoPatch, Profile},
    routes::create_router,
    storage_uri::StorageUri,
    translate::DisplayLanguages,
    AppState,
};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
};

pub const BUCKET: &str = "gallery-bucket";
pub const REGION: &str = "us-east-1";

#[derive(Default)]
pub struct InMemoryPhotos {
    pub photos: Mutex<BTreeMap<String, Photo>>,
}

impl InMemoryPhotos {
    pub fn insert(&self, photo: Photo) {
        self.photos.lock().unwrap().insert(photo.id.clone(), photo);
    }

    pub fn get(&self, id: &str) -> Option<Photo> {
        self.photos.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl PhotoRepository for InMemoryPhotos {
    async fn put(&self, photo: &Photo) -> Result<(), RepoError> {
        self.insert(photo.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Photo>, RepoError> {
        Ok(self.get(id))
    }

    async fn update(&self, id: &str, patch: &PhotoPatch) -> Result<(), RepoError> {
        let mut photos = self.photos.lock().unwrap();
        let photo = photos.entry(id.to_string()).or_insert_with(|| Photo { id: id.to_string(), ..Default::default() });
        if let Some(v) = &patch.image_url {
            photo.image_url = Some(v.clone());
        }
        if let Some(v) = &patch.name {
            photo.name = Some(v.clone());
        }
        if let Some(v) = &patch.description {
            photo.description = Some(v.clone());
        }
        if let Some(v) = &patch.date_taken {
            photo.date_taken = Some(v.clone());
        }
        if let Some(v) = &patch.people_in_photo {
            photo.people_in_photo = v.clone();
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), RepoError> {
        self.photos.lock().unwrap().remove(id);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Photo>, RepoError> {
        Ok(self.photos.lock().unwrap().values().cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryProfiles {
    pub profiles: Mutex<HashMap<String, Profile>>,
}

#[async_trait]
impl ProfileRepository for InMemoryProfiles {
    async fn get(&self, email: &str) -> Result<Option<Profile>, RepoError> {
        Ok(self.profiles.lock().unwrap().get(email).cloned())
    }

    async fn put(&self, profile: &Profile) -> Result<(), RepoError> {
        self.profiles.lock().unwrap().insert(profile.email.clone(), profile.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryStorage {
    pub objects: Mutex<HashMap<StorageUri, Vec<u8>>>,
    pub exists_calls: Mutex<usize>,
    pub delete_calls: Mutex<usize>,
}

impl InMemoryStorage {
    /// Stores an object and returns its public URL.
    pub fn seed(&self, key: &str, data: &[u8]) -> String {
        let object = StorageUri::new(BUCKET, key);
        self.objects.lock().unwrap().insert(object.clone(), data.to_vec());
        object.public_url(REGION, None)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(&StorageUri::new(BUCKET, key))
    }
}

#[async_trait]
impl FileStorage for InMemoryStorage {
    async fn upload(&self, key: &str, data: Vec<u8>, _content_type: Option<String>) -> Result<StorageUri, StorageError> {
        let object = StorageUri::new(BUCKET, key);
        self.objects.lock().unwrap().insert(object.clone(), data);
        Ok(object)
    }

    async fn download(&self, object: &StorageUri) -> Result<Vec<u8>, StorageError> {
        self.objects
            .lock()
            .unwrap()
            .get(object)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(object.to_string()))
    }

    async fn delete(&self, object: &StorageUri) -> Result<(), StorageError> {
        *self.delete_calls.lock().unwrap() += 1;
        self.objects.lock().unwrap().remove(object);
        Ok(())
    }

    async fn exists(&self, object: &StorageUri) -> Result<bool, StorageError> {
        *self.exists_calls.lock().unwrap() += 1;
        Ok(self.objects.lock().unwrap().contains_key(object))
    }

    async fn list(&self, bucket: &str, prefix: Option<&str>) -> Result<Vec<StoredObject>, StorageError> {
        let mut objects: Vec<StoredObject> = self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|o| o.bucket == bucket && o.key.starts_with(prefix.unwrap_or("")))
            .map(|o| StoredObject {
                uri: o.clone(),
                content_type: mime_guess::from_path(&o.key).first_raw().map(str::to_string),
            })
            .collect();
        objects.sort_by(|a, b| a.uri.key.cmp(&b.uri.key));
        Ok(objects)
    }

    fn bucket(&self) -> &str {
        BUCKET
    }

    fn public_url(&self, object: &StorageUri) -> String {
        object.public_url(REGION, None)
    }
}

/// Prefixes the text with the target code and reports French as the source.
pub struct FakeTranslator;

#[async_trait]
impl Translator for FakeTranslator {
    async fn translate(&self, text: &str, target_language_code: &str) -> Result<Translation, TranslateError> {
        Ok(Translation {
            translated_text: format!("[{}] {}", target_language_code, text),
            detected_language_code: "fr".to_string(),
        })
    }

    async fn languages(&self) -> Result<Vec<Language>, TranslateError> {
        Ok(languages())
    }
}

pub fn languages() -> Vec<Language> {
    vec![
        Language { code: "en".into(), display_name: "English".into() },
        Language { code: "fr".into(), display_name: "French".into() },
        Language { code: "de".into(), display_name: "German".into() },
    ]
}

/// Embeds an image as the sum of its bytes, so equal images get equal vectors.
#[derive(Default)]
pub struct FakeEmbedder {
    pub fail: bool,
    pub contexts: Mutex<Vec<Option<String>>>,
}

impl FakeEmbedder {
    pub fn vector_for(image: &[u8]) -> Vec<f32> {
        vec![image.iter().map(|b| *b as f32).sum(), 1.0]
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed_image(&self, image: &[u8], contextual_text: Option<&str>) -> Result<Vec<f32>, EmbeddingError> {
        if self.fail {
            return Err(EmbeddingError::InvalidResponse("embedding service unavailable".into()));
        }
        self.contexts.lock().unwrap().push(contextual_text.map(str::to_string));
        Ok(Self::vector_for(image))
    }
}

/// Exact nearest neighbour on the first component.
#[derive(Default)]
pub struct InMemoryIndex {
    pub fail: bool,
    pub vectors: Mutex<Vec<IndexedVector>>,
    pub upsert_calls: Mutex<usize>,
    pub upsert_times: Mutex<Vec<tokio::time::Instant>>,
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, vectors: Vec<IndexedVector>) -> Result<(), IndexError> {
        if self.fail {
            return Err(IndexError::BackendError(anyhow::anyhow!("index host unreachable")));
        }
        *self.upsert_calls.lock().unwrap() += 1;
        self.upsert_times.lock().unwrap().push(tokio::time::Instant::now());
        let mut stored = self.vectors.lock().unwrap();
        for vector in vectors {
            stored.retain(|v| v.id != vector.id);
            stored.push(vector);
        }
        Ok(())
    }

    async fn nearest(&self, vector: Vec<f32>, k: u64) -> Result<Vec<Neighbor>, IndexError> {
        if self.fail {
            return Err(IndexError::BackendError(anyhow::anyhow!("index host unreachable")));
        }
        let mut neighbors: Vec<Neighbor> = self
            .vectors
            .lock()
            .unwrap()
            .iter()
            .map(|v| Neighbor { id: v.id.clone(), score: -(v.values[0] - vector[0]).abs() })
            .collect();
        neighbors.sort_by(|a, b| b.score.total_cmp(&a.score));
        neighbors.truncate(k as usize);
        Ok(neighbors)
    }
}

pub const LOGIN_STATE: &str = "csrf-state-1";

/// Accepts the code `good-code` and logs in as alice.
pub struct FakeLoginProvider;

#[async_trait]
impl LoginProvider for FakeLoginProvider {
    fn authorize_url(&self, redirect_uri: &str) -> Result<(String, String), AuthError> {
        Ok((
            format!("https://idp.test/auth?state={}&redirect_uri={}", LOGIN_STATE, redirect_uri),
            LOGIN_STATE.to_string(),
        ))
    }

    async fn exchange_code(&self, code: &str, _redirect_uri: &str) -> Result<LoginResult, AuthError> {
        if code != "good-code" {
            return Err(AuthError::OAuth("bad code".into()));
        }
        Ok(LoginResult {
            access_token: "access-token".into(),
            user: UserInfo { sub: "alice".into(), email: "alice@example.com".into(), name: Some("Alice".into()) },
        })
    }
}

/// Tokens of the form `uid:<id>` verify as `<id>`.
pub struct FakeVerifier;

#[async_trait]
impl IdentityVerifier for FakeVerifier {
    async fn verify(&self, token: &str) -> Result<CallerIdentity, AuthError> {
        token
            .strip_prefix("uid:")
            .map(|uid| CallerIdentity { uid: uid.to_string(), email: None })
            .ok_or_else(|| AuthError::InvalidToken("not a test token".into()))
    }
}

pub struct TestApp {
    pub router: Router,
    pub photos: Arc<InMemoryPhotos>,
    pub profiles: Arc<InMemoryProfiles>,
    pub storage: Arc<InMemoryStorage>,
    pub embedder: Arc<FakeEmbedder>,
    pub index: Arc<InMemoryIndex>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_embedder(FakeEmbedder::default())
    }

    pub fn with_embedder(embedder: FakeEmbedder) -> Self {
        Self::with_backends(embedder, InMemoryIndex::default())
    }

    pub fn with_index(index: InMemoryIndex) -> Self {
        Self::with_backends(FakeEmbedder::default(), index)
    }

    fn with_backends(embedder: FakeEmbedder, index: InMemoryIndex) -> Self {
        let photos = Arc::new(InMemoryPhotos::default());
        let profiles = Arc::new(InMemoryProfiles::default());
        let storage = Arc::new(InMemoryStorage::default());
        let embedder = Arc::new(embedder);
        let index = Arc::new(index);

        let tera = tera::Tera::new(concat!(env!("CARGO_MANIFEST_DIR"), "/templates/**/*.html")).unwrap();
        let state = Arc::new(AppState {
            photo_repo: photos.clone(),
            profile_repo: profiles.clone(),
            file_storage: storage.clone(),
            translator: Arc::new(FakeTranslator),
            embedder: embedder.clone(),
            vector_index: index.clone(),
            login_provider: Arc::new(FakeLoginProvider),
            identity_verifier: Arc::new(FakeVerifier),
            languages: DisplayLanguages::new(languages()),
            tera: Arc::new(tera),
            external_host_url: None,
        });

        Self { router: create_router(state), photos, profiles, storage, embedder, index }
    }
}

pub fn photo(id: &str, uploader: &str) -> Photo {
    Photo {
        id: id.to_string(),
        name: Some(format!("Photo {}", id)),
        uploader_id: Some(uploader.to_string()),
        ..Default::default()
    }
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}
