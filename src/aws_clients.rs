use crate::config::Config;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;
use aws_sdk_bedrockruntime::Client as BedrockClient;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_translate::Client as TranslateClient;

/// Every AWS service client the gallery talks to, built from one shared
/// `SdkConfig`.
#[derive(Clone, Debug)]
pub struct AwsClients {
    pub dynamodb: DynamoDbClient,
    pub s3: S3Client,
    pub translate: TranslateClient,
    pub bedrock: BedrockClient,
}

impl AwsClients {
    pub async fn from_config(config: &Config) -> Self {
        let sdk_config = create_sdk_config(config).await;
        Self {
            dynamodb: DynamoDbClient::new(&sdk_config),
            s3: create_s3_client(&sdk_config),
            translate: TranslateClient::new(&sdk_config),
            bedrock: BedrockClient::new(&sdk_config),
        }
    }
}

// Region and optional endpoint URL come from `Config`. Credentials use the
// default provider chain, except against LocalStack without explicit keys.
async fn create_sdk_config(config: &Config) -> SdkConfig {
    let region = Region::new(config.aws_region.clone());
    tracing::info!(sdk_region = %config.aws_region, "Setting SDK region");

    let mut config_loader = aws_config::defaults(BehaviorVersion::latest()).region(region);

    match &config.localstack_endpoint {
        Some(endpoint_url) => {
            tracing::info!("Using localstack endpoint override: {}", endpoint_url);
            config_loader = config_loader.endpoint_url(endpoint_url);
            if std::env::var_os("AWS_ACCESS_KEY_ID").is_none() {
                // LocalStack accepts any key pair
                tracing::info!("No AWS_ACCESS_KEY_ID set, using static LocalStack credentials");
                config_loader = config_loader
                    .credentials_provider(Credentials::new("test", "test", None, None, "localstack"));
            }
        }
        None => tracing::info!("Using default AWS endpoints and credential resolution."),
    }

    config_loader.load().await
}

// Path-style addressing keeps LocalStack URLs in the `host/bucket/key` shape.
fn create_s3_client(sdk_config: &SdkConfig) -> S3Client {
    let s3_config = aws_sdk_s3::config::Builder::from(sdk_config)
        .force_path_style(true)
        .build();
    S3Client::from_conf(s3_config)
}
