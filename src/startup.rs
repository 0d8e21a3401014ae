use crate::errors::AppError;
use aws_sdk_dynamodb::{
    types::{AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType},
    Client as DynamoDbClient, error::SdkError as DynamoSdkError,
};
use aws_sdk_s3::{
    types::{BucketLocationConstraint, CreateBucketConfiguration},
    Client as S3Client, error::SdkError as S3SdkError,
};

/// Creates a DynamoDB table keyed by a single string attribute if it doesn't exist.
async fn create_table_if_not_exists(
    client: &DynamoDbClient,
    table_name: &str,
    key_attribute: &str,
) -> Result<(), AppError> {
    let result = client
        .create_table()
        .table_name(table_name)
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name(key_attribute)
                .attribute_type(ScalarAttributeType::S)
                .build()
                .map_err(|e| AppError::InitError(format!("Failed to build attribute definition: {}", e)))?,
        )
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name(key_attribute)
                .key_type(KeyType::Hash)
                .build()
                .map_err(|e| AppError::InitError(format!("Failed to build key schema: {}", e)))?,
        )
        .billing_mode(BillingMode::PayPerRequest)
        .send()
        .await;

    match result {
        Ok(_) => {
            tracing::info!("Startup: Table '{}' created successfully or setup initiated.", table_name);
            Ok(())
        }
        Err(DynamoSdkError::ServiceError(service_err)) if service_err.err().is_resource_in_use_exception() => {
            tracing::info!("Startup: Table '{}' already exists, no action needed.", table_name);
            Ok(())
        }
        Err(e) => {
            let context = format!("Startup: Failed to create DynamoDB table '{}'", table_name);
            tracing::error!("{}: {:?}", context, e);
            Err(AppError::InitError(format!("{}: {}", context, e)))
        }
    }
}

/// Ensures the S3 bucket exists, creating it with the correct location constraint if needed.
async fn ensure_s3_bucket_exists(client: &S3Client, bucket_name: &str, region_str: &str) -> Result<(), AppError> {
    let mut request = client.create_bucket().bucket(bucket_name);
    // us-east-1 rejects an explicit location constraint
    if region_str != "us-east-1" {
        request = request.create_bucket_configuration(
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region_str))
                .build(),
        );
    }

    match request.send().await {
        Ok(_) => {
            tracing::info!("Startup: S3 bucket '{}' created.", bucket_name);
            Ok(())
        }
        Err(sdk_err) => {
            if let S3SdkError::ServiceError(service_err) = &sdk_err {
                let code = service_err.err().meta().code();
                if code == Some("BucketAlreadyOwnedByYou") || code == Some("BucketAlreadyExists") {
                    tracing::info!("Startup: S3 bucket '{}' already exists.", bucket_name);
                    return Ok(());
                }
            }
            let context = format!("Startup: Failed to create S3 bucket '{}'", bucket_name);
            tracing::error!("{}: {:?}", context, sdk_err);
            Err(AppError::InitError(format!("{}: {}", context, sdk_err)))
        }
    }
}

/// Names of the resources the gallery keeps its data in.
pub struct Resources<'a> {
    pub photos_table: &'a str,
    pub profiles_table: &'a str,
    pub bucket_name: &'a str,
    pub region: &'a str,
}

/// Initializes required AWS resources (DynamoDB tables, S3 bucket).
pub async fn init_resources(
    db_client: &DynamoDbClient,
    s3_client: &S3Client,
    resources: &Resources<'_>,
) -> Result<(), AppError> {
    tracing::info!("Startup: Initializing AWS resources...");
    create_table_if_not_exists(db_client, resources.photos_table, "id").await?;
    create_table_if_not_exists(db_client, resources.profiles_table, "email").await?;
    ensure_s3_bucket_exists(s3_client, resources.bucket_name, resources.region).await?;
    tracing::info!("Startup: AWS resource initialization complete.");
    Ok(())
}
