use std::{env, net::SocketAddr, path::PathBuf, str::FromStr};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid environment variable format for {0}: {1}")]
    InvalidVar(String, String),
    #[error(transparent)]
    DotEnvError(#[from] dotenvy::Error),
}

#[derive(Clone, Debug)] // Clone needed if passed around, Debug for logging
pub struct Config {
    pub bind_address: SocketAddr,
    pub photo_bucket_name: String,
    pub photos_table: String,
    pub profiles_table: String,
    // Store region as string for simplicity here, aws_clients can convert
    pub aws_region: String,
    // Optional endpoint for LocalStack
    pub localstack_endpoint: Option<String>,
    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,
    pub vector_collection: String,
    pub embedding_model_id: String,
    pub embedding_dimension: u32,
    pub template_path: PathBuf,
    /// Scheme + host that replaces the request host in absolute URLs handed to
    /// third parties (the OAuth callback), e.g. when running behind a proxy.
    pub external_host_url: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        // A missing .env is fine; one that fails to parse is not
        check_dotenv(dotenvy::dotenv())?;

        let bind_address_str = env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = SocketAddr::from_str(&bind_address_str)
            .map_err(|e| ConfigError::InvalidVar("BIND_ADDRESS".into(), e.to_string()))?;

        let photo_bucket_name = required("PHOTO_BUCKET_NAME")?;
        let photos_table = env::var("PHOTOS_TABLE").unwrap_or_else(|_| "photos".to_string());
        let profiles_table = env::var("PROFILES_TABLE").unwrap_or_else(|_| "profiles".to_string());

        let aws_region = env::var("AWS_DEFAULT_REGION")
            .unwrap_or_else(|_| "us-east-1".to_string());

        // Allow overriding endpoint for localstack/testing
        let localstack_endpoint = env::var("AWS_ENDPOINT_URL").ok(); // Optional

        let qdrant_url = env::var("QDRANT_URL").unwrap_or_else(|_| "http://localhost:6334".to_string());
        let qdrant_api_key = env::var("QDRANT_API_KEY").ok();
        let vector_collection =
            env::var("VECTOR_COLLECTION").unwrap_or_else(|_| "photo-embeddings".to_string());

        let embedding_model_id = env::var("EMBEDDING_MODEL_ID")
            .unwrap_or_else(|_| "amazon.titan-embed-image-v1".to_string());
        let embedding_dimension = match env::var("EMBEDDING_DIMENSION") {
            Ok(raw) => parse_embedding_dimension(&raw)?,
            Err(_) => 1024,
        };

        let template_path = PathBuf::from(
            env::var("TEMPLATE_PATH").unwrap_or_else(|_| "./templates".to_string()),
        );

        let external_host_url = env::var("EXTERNAL_HOST_URL")
            .ok()
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());

        Ok(Config {
            bind_address,
            photo_bucket_name,
            photos_table,
            profiles_table,
            aws_region,
            localstack_endpoint,
            qdrant_url,
            qdrant_api_key,
            vector_collection,
            embedding_model_id,
            embedding_dimension,
            template_path,
            external_host_url,
        })
    }
}

/// Settings for the authorization-code login flow of the web front end.
#[derive(Clone, Debug)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub scopes: Vec<String>,
}

impl OAuthConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Ok(OAuthConfig {
            client_id: required("OAUTH_CLIENT_ID")?,
            client_secret: required("OAUTH_CLIENT_SECRET")?,
            auth_url: env::var("OAUTH_AUTH_URL")
                .unwrap_or_else(|_| "https://accounts.google.com/o/oauth2/v2/auth".to_string()),
            token_url: env::var("OAUTH_TOKEN_URL")
                .unwrap_or_else(|_| "https://oauth2.googleapis.com/token".to_string()),
            userinfo_url: env::var("OAUTH_USERINFO_URL")
                .unwrap_or_else(|_| "https://openidconnect.googleapis.com/v1/userinfo".to_string()),
            scopes: vec![
                "openid".to_string(),
                "https://www.googleapis.com/auth/userinfo.email".to_string(),
                "https://www.googleapis.com/auth/userinfo.profile".to_string(),
            ],
        })
    }
}

/// Settings for verifying the bearer ID tokens sent to the callable tier.
#[derive(Clone, Debug)]
pub struct IdTokenConfig {
    pub jwks_url: String,
    pub issuers: Vec<String>,
    pub audience: String,
}

impl IdTokenConfig {
    /// `default_audience` is used when `ID_TOKEN_AUDIENCE` is unset; usually the
    /// OAuth client id.
    pub fn load(default_audience: &str) -> Result<Self, ConfigError> {
        let issuers = env::var("ID_TOKEN_ISSUERS")
            .unwrap_or_else(|_| "https://accounts.google.com,accounts.google.com".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();
        if issuers.is_empty() {
            return Err(ConfigError::InvalidVar(
                "ID_TOKEN_ISSUERS".into(),
                "at least one issuer is required".into(),
            ));
        }

        Ok(IdTokenConfig {
            jwks_url: env::var("ID_TOKEN_JWKS_URL")
                .unwrap_or_else(|_| "https://www.googleapis.com/oauth2/v3/certs".to_string()),
            issuers,
            audience: env::var("ID_TOKEN_AUDIENCE").unwrap_or_else(|_| default_audience.to_string()),
        })
    }
}

fn required(name: &str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVar(name.into()))
}

// Titan multimodal embeddings only produce these lengths.
fn parse_embedding_dimension(raw: &str) -> Result<u32, ConfigError> {
    match raw.trim().parse::<u32>() {
        Ok(dim @ (256 | 384 | 1024)) => Ok(dim),
        Ok(other) => Err(ConfigError::InvalidVar(
            "EMBEDDING_DIMENSION".into(),
            format!("{} is not one of 256, 384, 1024", other),
        )),
        Err(e) => Err(ConfigError::InvalidVar("EMBEDDING_DIMENSION".into(), e.to_string())),
    }
}

/// Rewrites an absolute URL so it points at the externally visible host.
///
/// With an external host configured, the scheme and authority of `url` are
/// replaced by it. Without one, plain `http://` is upgraded to `https://`.
pub fn external_url(external_host_url: Option<&str>, url: &str) -> String {
    match external_host_url {
        None => match url.strip_prefix("http://") {
            Some(rest) => format!("https://{}", rest),
            None => url.to_string(),
        },
        Some(host) => {
            let after_scheme = url.find("://").map(|i| i + 3).unwrap_or(0);
            let path_start = url[after_scheme..]
                .find('/')
                .map(|i| after_scheme + i)
                .unwrap_or(url.len());
            format!("{}{}", host.trim_end_matches('/'), &url[path_start..])
        }
    }
}

fn check_dotenv(result: Result<PathBuf, dotenvy::Error>) -> Result<(), ConfigError> {
    match result {
        Ok(path) => {
            tracing::info!(path = %path.display(), "Loaded environment from .env file");
            Ok(())
        }
        Err(e) if e.not_found() => {
            tracing::debug!("No .env file found, using process environment only");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_dotenv_file_is_not_an_error() {
        let missing = dotenvy::Error::Io(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(check_dotenv(Err(missing)).is_ok());
        assert!(check_dotenv(Ok(PathBuf::from(".env"))).is_ok());
    }

    #[test]
    fn malformed_dotenv_file_is_reported() {
        let malformed = dotenvy::Error::LineParse("BIND_ADDRESS 'oops".into(), 13);
        assert!(matches!(check_dotenv(Err(malformed)), Err(ConfigError::DotEnvError(_))));
    }

    #[test]
    fn external_url_forces_https_without_override() {
        assert_eq!(
            external_url(None, "http://localhost:3000/oauth2callback"),
            "https://localhost:3000/oauth2callback"
        );
        assert_eq!(
            external_url(None, "https://gallery.example.com/oauth2callback"),
            "https://gallery.example.com/oauth2callback"
        );
    }

    #[test]
    fn external_url_replaces_scheme_and_host() {
        assert_eq!(
            external_url(
                Some("https://3000-cs-123.cloudshell.dev"),
                "http://localhost:3000/oauth2callback?x=1"
            ),
            "https://3000-cs-123.cloudshell.dev/oauth2callback?x=1"
        );
        assert_eq!(
            external_url(Some("https://gallery.example.com/"), "http://127.0.0.1:3000"),
            "https://gallery.example.com"
        );
    }

    #[test]
    fn embedding_dimension_must_be_supported() {
        assert_eq!(parse_embedding_dimension("384").unwrap(), 384);
        assert!(matches!(
            parse_embedding_dimension("512"),
            Err(ConfigError::InvalidVar(_, _))
        ));
        assert!(parse_embedding_dimension("abc").is_err());
    }
}
