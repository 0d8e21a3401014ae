//! Caller identity for both front ends: the authorization-code login used by
//! the web pages, and bearer ID-token verification used by the callable tier.

use crate::{
    config::{IdTokenConfig, OAuthConfig},
    errors::AuthError,
};
use anyhow::Context;
use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl,
    Scope, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::{
    sync::{Mutex, RwLock},
    time::Instant,
};

/// Minimum time between two JWKS refreshes triggered by unknown key ids.
const JWKS_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// The logged-in user as kept in the web session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserInfo {
    /// Stable subject identifier; recorded as a photo's uploader.
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoginResult {
    pub access_token: String,
    pub user: UserInfo,
}

#[async_trait]
pub trait LoginProvider: Send + Sync + 'static {
    /// Returns the provider URL to send the browser to and the CSRF state
    /// that must come back on the callback.
    fn authorize_url(&self, redirect_uri: &str) -> Result<(String, String), AuthError>;

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<LoginResult, AuthError>;
}

pub struct OAuthLoginProvider {
    config: OAuthConfig,
    http: reqwest::Client,
}

impl OAuthLoginProvider {
    pub fn new(config: OAuthConfig) -> Result<Self, AuthError> {
        // Token requests must not follow redirects.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("OAuth: Failed to build HTTP client")?;
        Ok(Self { config, http })
    }

    async fn fetch_user_info(&self, access_token: &str) -> Result<UserInfo, AuthError> {
        let response = self.http
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::OAuth(format!("Failed to fetch user info: {}", e)))?;

        if !response.status().is_success() {
            return Err(AuthError::OAuth(format!("User info endpoint returned {}", response.status())));
        }

        response
            .json::<UserInfo>()
            .await
            .map_err(|e| AuthError::OAuth(format!("Failed to parse user info: {}", e)))
    }
}

#[async_trait]
impl LoginProvider for OAuthLoginProvider {
    fn authorize_url(&self, redirect_uri: &str) -> Result<(String, String), AuthError> {
        let auth_url = AuthUrl::new(self.config.auth_url.clone())
            .map_err(|e| AuthError::OAuth(format!("Invalid auth URL: {}", e)))?;
        let redirect_url = RedirectUrl::new(redirect_uri.to_string())
            .map_err(|e| AuthError::OAuth(format!("Invalid redirect URL: {}", e)))?;

        let client = BasicClient::new(ClientId::new(self.config.client_id.clone()))
            .set_auth_uri(auth_url)
            .set_redirect_uri(redirect_url);

        let (url, state) = self
            .config
            .scopes
            .iter()
            .fold(client.authorize_url(CsrfToken::new_random), |request, scope| {
                request.add_scope(Scope::new(scope.clone()))
            })
            .url();

        Ok((url.to_string(), state.secret().clone()))
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<LoginResult, AuthError> {
        let token_url = TokenUrl::new(self.config.token_url.clone())
            .map_err(|e| AuthError::OAuth(format!("Invalid token URL: {}", e)))?;
        let redirect_url = RedirectUrl::new(redirect_uri.to_string())
            .map_err(|e| AuthError::OAuth(format!("Invalid redirect URL: {}", e)))?;

        let client = BasicClient::new(ClientId::new(self.config.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.config.client_secret.clone()))
            .set_token_uri(token_url)
            .set_redirect_uri(redirect_url);

        let token = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| AuthError::OAuth(format!("Failed to exchange code: {}", e)))?;

        let access_token = token.access_token().secret().clone();
        let user = self.fetch_user_info(&access_token).await?;
        tracing::info!(user.sub = %user.sub, "OAuth: Login completed");

        Ok(LoginResult { access_token, user })
    }
}

/// An authenticated caller of the callable tier.
#[derive(Debug, Clone, PartialEq)]
pub struct CallerIdentity {
    pub uid: String,
    pub email: Option<String>,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync + 'static {
    async fn verify(&self, token: &str) -> Result<CallerIdentity, AuthError>;
}

#[derive(Debug, Clone, Deserialize)]
struct IdTokenClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

/// Verifies RS256 ID tokens against the provider's published JWKS. The key
/// set is refetched when a token names a key id it does not contain, at most
/// once per [`JWKS_REFRESH_INTERVAL`].
pub struct JwksVerifier {
    http: reqwest::Client,
    jwks_url: String,
    keys: RwLock<JwkSet>,
    last_refresh: Mutex<Option<Instant>>,
    validation: Validation,
}

impl JwksVerifier {
    pub async fn fetch(config: &IdTokenConfig) -> Result<Self, AuthError> {
        let http = reqwest::Client::new();
        let keys = fetch_jwks(&http, &config.jwks_url).await?;
        tracing::info!(key_count = keys.keys.len(), jwks_url = %config.jwks_url, "Loaded ID token signing keys");

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[config.audience.as_str()]);
        validation.set_issuer(config.issuers.as_slice());

        Ok(Self {
            http,
            jwks_url: config.jwks_url.clone(),
            keys: RwLock::new(keys),
            last_refresh: Mutex::new(Some(Instant::now())),
            validation,
        })
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        if let Some(jwk) = self.keys.read().await.find(kid) {
            return DecodingKey::from_jwk(jwk).map_err(|e| AuthError::InvalidToken(e.to_string()));
        }

        let unknown_kid = || AuthError::InvalidToken(format!("unknown signing key id '{}'", kid));
        {
            let mut last_refresh = self.last_refresh.lock().await;
            if last_refresh.is_some_and(|at| at.elapsed() < JWKS_REFRESH_INTERVAL) {
                tracing::debug!(%kid, "Unknown signing key id, JWKS refreshed recently");
                return Err(unknown_kid());
            }
            *last_refresh = Some(Instant::now());
        }

        tracing::info!(%kid, "Unknown signing key id, refreshing JWKS");
        let refreshed = fetch_jwks(&self.http, &self.jwks_url).await?;
        let mut keys = self.keys.write().await;
        *keys = refreshed;
        let jwk = keys.find(kid).ok_or_else(unknown_kid)?;
        DecodingKey::from_jwk(jwk).map_err(|e| AuthError::InvalidToken(e.to_string()))
    }
}

#[async_trait]
impl IdentityVerifier for JwksVerifier {
    async fn verify(&self, token: &str) -> Result<CallerIdentity, AuthError> {
        let header = decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("token header has no key id".to_string()))?;
        let key = self.decoding_key(&kid).await?;

        let data = decode::<IdTokenClaims>(token, &key, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        Ok(CallerIdentity { uid: data.claims.sub, email: data.claims.email })
    }
}

async fn fetch_jwks(http: &reqwest::Client, url: &str) -> Result<JwkSet, AuthError> {
    let keys = http
        .get(url)
        .send()
        .await
        .context(format!("Failed to fetch JWKS from '{}'", url))?
        .error_for_status()
        .context(format!("JWKS endpoint '{}' returned an error", url))?
        .json::<JwkSet>()
        .await
        .context(format!("Failed to parse JWKS from '{}'", url))?;
    Ok(keys)
}

/// Token from an `Authorization: Bearer <token>` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
