use crate::{domain::Embedder, errors::EmbeddingError};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_bedrockruntime::Client as BedrockClient;
use aws_smithy_types::Blob;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// Multimodal image embeddings served by a Bedrock model
/// (Titan Multimodal Embeddings request/response format).
#[derive(Debug, Clone)]
pub struct BedrockEmbedder {
    client: BedrockClient,
    model_id: String,
    dimension: u32,
}

impl BedrockEmbedder {
    pub fn new(client: BedrockClient, model_id: String, dimension: u32) -> Self {
        tracing::info!(%model_id, dimension, "Initializing BedrockEmbedder");
        Self { client, model_id, dimension }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct EmbeddingRequest<'a> {
    input_image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_text: Option<&'a str>,
    embedding_config: EmbeddingConfig,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct EmbeddingConfig {
    output_embedding_length: u32,
}

#[derive(Deserialize, Debug)]
struct EmbeddingResponse {
    embedding: Option<Vec<f32>>,
    message: Option<String>,
}

#[async_trait]
impl Embedder for BedrockEmbedder {
    async fn embed_image(&self, image: &[u8], contextual_text: Option<&str>) -> Result<Vec<f32>, EmbeddingError> {
        let request = EmbeddingRequest {
            input_image: STANDARD.encode(image),
            input_text: contextual_text.filter(|t| !t.trim().is_empty()),
            embedding_config: EmbeddingConfig { output_embedding_length: self.dimension },
        };
        let body = serde_json::to_vec(&request).context("Bedrock: Failed to encode embedding request")?;

        let output = self.client
            .invoke_model()
            .model_id(&self.model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(body))
            .send()
            .await
            .context(format!("Bedrock: Failed to invoke model '{}'", self.model_id))?;

        let vector = parse_embedding(output.body().as_ref(), self.dimension)?;
        tracing::debug!(dimensions = vector.len(), "Bedrock: Image embedded");
        Ok(vector)
    }
}

fn parse_embedding(body: &[u8], expected_dimension: u32) -> Result<Vec<f32>, EmbeddingError> {
    let response: EmbeddingResponse = serde_json::from_slice(body)
        .map_err(|e| EmbeddingError::InvalidResponse(format!("undecodable body: {}", e)))?;

    let embedding = match response.embedding {
        Some(embedding) => embedding,
        None => {
            return Err(EmbeddingError::InvalidResponse(
                response.message.unwrap_or_else(|| "no embedding returned".to_string()),
            ))
        }
    };

    if embedding.len() != expected_dimension as usize {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected {} dimensions, got {}",
            expected_dimension,
            embedding.len()
        )));
    }
    Ok(embedding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_camel_case_and_skips_blank_text() {
        let request = EmbeddingRequest {
            input_image: "aGk=".into(),
            input_text: None,
            embedding_config: EmbeddingConfig { output_embedding_length: 256 },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "inputImage": "aGk=", "embeddingConfig": { "outputEmbeddingLength": 256 } })
        );
    }

    #[test]
    fn response_dimension_is_checked() {
        let body = br#"{"embedding":[0.1,0.2,0.3],"inputTextTokenCount":0}"#;
        assert_eq!(parse_embedding(body, 3).unwrap().len(), 3);
        assert!(matches!(parse_embedding(body, 4), Err(EmbeddingError::InvalidResponse(_))));
    }

    #[test]
    fn service_message_is_surfaced() {
        let body = br#"{"embedding":null,"message":"image too large"}"#;
        match parse_embedding(body, 3) {
            Err(EmbeddingError::InvalidResponse(msg)) => assert_eq!(msg, "image too large"),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
