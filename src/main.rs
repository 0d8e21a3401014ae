use anyhow::Context;
use clap::{Parser, Subcommand};
use photo_gallery::{
    auth::{JwksVerifier, OAuthLoginProvider},
    aws_clients::AwsClients,
    config::{Config, IdTokenConfig, OAuthConfig},
    domain::Translator,
    embedding::BedrockEmbedder,
    indexer::{self, BatchPolicy},
    repositories::{DynamoDbPhotoRepository, DynamoDbProfileRepository},
    routes::create_router,
    startup::{init_resources, Resources},
    storage::S3FileStorage,
    translate::{AwsTranslator, DisplayLanguages},
    vector_index::QdrantVectorIndex,
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Photo gallery web server and vector index maintenance jobs.
#[derive(Parser)]
#[command(name = "photo_gallery", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the web server (default).
    Serve,

    /// Embed every image object in a bucket and store the vectors.
    IndexBucket {
        /// The bucket to process.
        bucket: String,
        /// Only process keys under this prefix.
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Embed the image of every stored photo, using its name and description
    /// as contextual text.
    GenerateEmbeddings,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing (logging)
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "photo_gallery=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("Failed to load configuration")?;
    tracing::info!(region = %config.aws_region, endpoint = ?config.localstack_endpoint, "Configuration loaded");

    // --- AWS Client Initialization ---
    let clients = AwsClients::from_config(&config).await;

    let file_storage = Arc::new(S3FileStorage::new(
        clients.s3.clone(),
        config.photo_bucket_name.clone(),
        config.aws_region.clone(),
        config.localstack_endpoint.clone(),
    ));
    let photo_repo = Arc::new(DynamoDbPhotoRepository::new(clients.dynamodb.clone(), config.photos_table.clone()));
    let embedder = Arc::new(BedrockEmbedder::new(
        clients.bedrock.clone(),
        config.embedding_model_id.clone(),
        config.embedding_dimension,
    ));
    let vector_index = Arc::new(
        QdrantVectorIndex::connect(&config.qdrant_url, config.qdrant_api_key.clone(), config.vector_collection.clone())
            .context("Failed to create vector index client")?,
    );
    vector_index
        .ensure_collection(u64::from(config.embedding_dimension))
        .await
        .context("Failed to prepare vector collection")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::IndexBucket { bucket, prefix } => {
            let count = indexer::index_bucket(
                file_storage.as_ref(),
                embedder.as_ref(),
                vector_index.as_ref(),
                &bucket,
                prefix.as_deref(),
                BatchPolicy::default(),
            )
            .await
            .context("Bucket indexing failed")?;
            tracing::info!("Generated embeddings for {} images.", count);
            Ok(())
        }
        Commands::GenerateEmbeddings => {
            let count = indexer::generate_embeddings(
                photo_repo.as_ref(),
                file_storage.as_ref(),
                embedder.as_ref(),
                vector_index.as_ref(),
                BatchPolicy::default(),
            )
            .await
            .context("Embedding backfill failed")?;
            tracing::info!("Generated embeddings for {} photos.", count);
            Ok(())
        }
        Commands::Serve => {
            // --- Resource Creation ---
            init_resources(
                &clients.dynamodb,
                &clients.s3,
                &Resources {
                    photos_table: &config.photos_table,
                    profiles_table: &config.profiles_table,
                    bucket_name: &config.photo_bucket_name,
                    region: &config.aws_region,
                },
            )
            .await
            .context("Failed to create tables and bucket")?;

            let translator = Arc::new(AwsTranslator::new(clients.translate.clone()));
            let languages = DisplayLanguages::new(translator.languages().await.context("Failed to list translation languages")?);

            let oauth_config = OAuthConfig::load()?;
            let id_token_config = IdTokenConfig::load(&oauth_config.client_id)?;
            let identity_verifier =
                Arc::new(JwksVerifier::fetch(&id_token_config).await.context("Failed to load ID token signing keys")?);
            let login_provider = Arc::new(OAuthLoginProvider::new(oauth_config)?);

            let template_glob = config.template_path.join("**").join("*.html");
            let tera = tera::Tera::new(&template_glob.to_string_lossy()).context("Failed to load templates")?;
            tracing::info!(templates = tera.get_template_names().count(), "Templates loaded");

            // --- Application State ---
            let state = Arc::new(AppState {
                photo_repo,
                profile_repo: Arc::new(DynamoDbProfileRepository::new(clients.dynamodb.clone(), config.profiles_table.clone())),
                file_storage,
                translator,
                embedder,
                vector_index,
                login_provider,
                identity_verifier,
                languages,
                tera: Arc::new(tera),
                external_host_url: config.external_host_url.clone(),
            });

            let app = create_router(state);

            // --- Server Startup ---
            tracing::info!("Server listening on http://{}", config.bind_address);
            let listener = tokio::net::TcpListener::bind(config.bind_address)
                .await
                .with_context(|| format!("Failed to bind {}", config.bind_address))?;
            axum::serve(listener, app).await?;
            Ok(())
        }
    }
}
