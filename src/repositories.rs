use crate::{
    domain::{PhotoRepository, ProfileRepository},
    errors::RepoError,
    models::{Photo, PhotoPatch, Profile},
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_dynamodb::{types::AttributeValue, Client as DynamoDbClient};
use std::collections::HashMap;
use tracing::{self, info};

#[derive(Debug, Clone)]
pub struct DynamoDbPhotoRepository {
    client: DynamoDbClient,
    table_name: String, // Store the table name
}

impl DynamoDbPhotoRepository {
    /// Creates a new repository instance configured for a specific table.
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        info!(%table_name, "Initializing DynamoDbPhotoRepository");
        Self { client, table_name }
    }
}

#[async_trait]
impl PhotoRepository for DynamoDbPhotoRepository {
    /// Stores a `Photo` using PutItem, replacing any existing item.
    async fn put(&self, photo: &Photo) -> Result<(), RepoError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(photo_to_item(photo)))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to put photo (id: {})", self.table_name, photo.id))
            .map_err(RepoError::BackendError)?; // Map anyhow::Error -> RepoError
        tracing::debug!(photo_id = %photo.id, table_name = %self.table_name, "DynamoDB: Photo written");
        Ok(())
    }

    /// Retrieves a `Photo` using GetItem.
    async fn get_by_id(&self, id: &str) -> Result<Option<Photo>, RepoError> {
        let resp = self.client
            .get_item()
            .table_name(&self.table_name)
            .key("id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to get photo (id: {})", self.table_name, id))
            .map_err(RepoError::BackendError)?;

        match resp.item {
            Some(item) => match item_to_photo(&item) {
                Some(photo) => Ok(Some(photo)),
                None => {
                    tracing::error!(photo_id = %id, table_name = %self.table_name, "DynamoDB: Retrieved item but failed to parse into Photo");
                    Err(RepoError::DataCorruption(format!(
                        "Failed to parse photo data retrieved from DynamoDB table '{}' for id {}",
                        self.table_name, id
                    )))
                }
            },
            None => Ok(None), // Item not found is not an error
        }
    }

    /// Applies the supplied fields with UpdateItem, leaving other attributes untouched.
    async fn update(&self, id: &str, patch: &PhotoPatch) -> Result<(), RepoError> {
        let Some(update) = UpdateExpression::from_patch(patch) else {
            tracing::debug!(photo_id = %id, "DynamoDB: Empty patch, nothing to update");
            return Ok(());
        };

        self.client
            .update_item()
            .table_name(&self.table_name)
            .key("id", AttributeValue::S(id.to_string()))
            .update_expression(update.expression)
            .set_expression_attribute_names(Some(update.names))
            .set_expression_attribute_values(Some(update.values))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to update photo (id: {})", self.table_name, id))
            .map_err(RepoError::BackendError)?;

        tracing::debug!(photo_id = %id, table_name = %self.table_name, "DynamoDB: Photo updated");
        Ok(())
    }

    /// Deletes an item using DeleteItem.
    async fn delete(&self, id: &str) -> Result<(), RepoError> {
        tracing::debug!(photo_id = %id, table_name = %self.table_name, "DynamoDB: Deleting item");

        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key("id", AttributeValue::S(id.to_string()))
            // DeleteItem succeeds even if item not found
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to delete photo (id: {})", self.table_name, id))
            .map_err(RepoError::BackendError)?;

        Ok(())
    }

    /// Lists all photos using DynamoDB Scan. Handles pagination.
    async fn list_all(&self) -> Result<Vec<Photo>, RepoError> {
        tracing::debug!("DynamoDB: Scanning table '{}' for all photos", self.table_name);
        let mut photos: Vec<Photo> = Vec::new();
        let mut last_evaluated_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let mut request_builder = self.client.scan().table_name(&self.table_name);

            // Apply ExclusiveStartKey if paginating from previous response
            if let Some(lek) = last_evaluated_key {
                request_builder = request_builder.set_exclusive_start_key(Some(lek));
            }

            let resp = request_builder
                .send()
                .await
                .context(format!("DynamoDB: Failed to scan table '{}'", self.table_name))
                .map_err(RepoError::BackendError)?;

            for item in resp.items.unwrap_or_default() {
                match item_to_photo(&item) {
                    Some(photo) => photos.push(photo),
                    None => {
                        let item_id = item.get("id").and_then(|v| v.as_s().ok());
                        tracing::error!(item.id = ?item_id, table_name = %self.table_name, "DynamoDB: Failed to parse item from scan into Photo");
                        // Fail fast if data in the table is corrupt
                        return Err(RepoError::DataCorruption(format!(
                            "DynamoDB: Failed to parse item {:?} during scan of table '{}'",
                            item_id, self.table_name
                        )));
                    }
                }
            }

            // Check for next page
            last_evaluated_key = resp.last_evaluated_key;
            if last_evaluated_key.is_none() {
                break;
            }
            tracing::debug!("DynamoDB Scan (table: {}): Continuing with LastEvaluatedKey...", self.table_name);
        }

        tracing::info!("DynamoDB (table: {}): Successfully listed {} photos", self.table_name, photos.len());
        Ok(photos)
    }
}

#[derive(Debug, Clone)]
pub struct DynamoDbProfileRepository {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoDbProfileRepository {
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        info!(%table_name, "Initializing DynamoDbProfileRepository");
        Self { client, table_name }
    }
}

#[async_trait]
impl ProfileRepository for DynamoDbProfileRepository {
    async fn get(&self, email: &str) -> Result<Option<Profile>, RepoError> {
        let resp = self.client
            .get_item()
            .table_name(&self.table_name)
            .key("email", AttributeValue::S(email.to_string()))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to get profile", self.table_name))
            .map_err(RepoError::BackendError)?;

        Ok(resp.item.map(|item| Profile {
            email: email.to_string(),
            preferred_language: string_attr(&item, "preferredLanguage"),
        }))
    }

    async fn put(&self, profile: &Profile) -> Result<(), RepoError> {
        let mut request = self.client
            .put_item()
            .table_name(&self.table_name)
            .item("email", AttributeValue::S(profile.email.clone()));
        if let Some(language) = &profile.preferred_language {
            request = request.item("preferredLanguage", AttributeValue::S(language.clone()));
        }

        request
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to put profile", self.table_name))
            .map_err(RepoError::BackendError)?;
        Ok(())
    }
}

// Absent optional attributes are simply not written.
fn photo_to_item(photo: &Photo) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::new();
    item.insert("id".to_string(), AttributeValue::S(photo.id.clone()));

    let optional = [
        ("imageUrl", &photo.image_url),
        ("name", &photo.name),
        ("description", &photo.description),
        ("dateTaken", &photo.date_taken),
        ("uploaderId", &photo.uploader_id),
    ];
    for (attr, value) in optional {
        if let Some(value) = value {
            item.insert(attr.to_string(), AttributeValue::S(value.clone()));
        }
    }

    item.insert("peopleInPhoto".to_string(), people_attr(&photo.people_in_photo));
    item
}

// Helper function to convert DynamoDB item map to Photo struct.
// Only the key is mandatory; older items may lack any other attribute.
fn item_to_photo(item: &HashMap<String, AttributeValue>) -> Option<Photo> {
    let id = item.get("id")?.as_s().ok()?.to_string();

    let people_in_photo = match item.get("peopleInPhoto") {
        None | Some(AttributeValue::Null(_)) => Vec::new(),
        Some(AttributeValue::L(values)) => values
            .iter()
            .map(|v| v.as_s().ok().cloned())
            .collect::<Option<Vec<_>>>()?,
        Some(AttributeValue::Ss(values)) => values.clone(),
        Some(AttributeValue::S(text)) => crate::models::split_people(text),
        Some(_) => return None,
    };

    Some(Photo {
        id,
        image_url: string_attr(item, "imageUrl"),
        name: string_attr(item, "name"),
        description: string_attr(item, "description"),
        date_taken: string_attr(item, "dateTaken"),
        people_in_photo,
        uploader_id: string_attr(item, "uploaderId"),
    })
}

fn string_attr(item: &HashMap<String, AttributeValue>, attr: &str) -> Option<String> {
    item.get(attr).and_then(|v| v.as_s().ok()).cloned()
}

fn people_attr(people: &[String]) -> AttributeValue {
    AttributeValue::L(people.iter().cloned().map(AttributeValue::S).collect())
}

/// `SET` expression plus its placeholder maps for a partial update.
#[derive(Debug, PartialEq)]
struct UpdateExpression {
    expression: String,
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

impl UpdateExpression {
    // Attribute names go through placeholders: `name` is a DynamoDB reserved word.
    fn from_patch(patch: &PhotoPatch) -> Option<Self> {
        let mut assignments = Vec::new();
        let mut names = HashMap::new();
        let mut values = HashMap::new();

        let mut set = |attr: &str, value: AttributeValue| {
            assignments.push(format!("#{attr} = :{attr}"));
            names.insert(format!("#{attr}"), attr.to_string());
            values.insert(format!(":{attr}"), value);
        };

        let strings = [
            ("imageUrl", &patch.image_url),
            ("name", &patch.name),
            ("description", &patch.description),
            ("dateTaken", &patch.date_taken),
        ];
        for (attr, value) in strings {
            if let Some(value) = value {
                set(attr, AttributeValue::S(value.clone()));
            }
        }
        if let Some(people) = &patch.people_in_photo {
            set("peopleInPhoto", people_attr(people));
        }

        if assignments.is_empty() {
            return None;
        }
        Some(UpdateExpression {
            expression: format!("SET {}", assignments.join(", ")),
            names,
            values,
        })
    }
}
