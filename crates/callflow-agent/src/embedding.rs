//! Text embeddings via the Vertex AI `:predict` endpoint.

use async_trait::async_trait;
use callflow_core::config::EmbeddingConfig;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::EmbeddingError;
use crate::gcp_auth::GcpCredentials;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    /// Embed `text` into a fixed-length vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Wired in when `embedding.enabled` is false. Turns proceed without
/// embeddings and therefore without retrieved context.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Disabled)
    }
}

pub struct VertexEmbedder {
    client: reqwest::Client,
    url: String,
    dimension: usize,
    credentials: Option<GcpCredentials>,
}

impl VertexEmbedder {
    pub fn new(
        cfg: &EmbeddingConfig,
        credentials: Option<GcpCredentials>,
        client: reqwest::Client,
    ) -> Result<Self, EmbeddingError> {
        let project_id = cfg
            .project_id
            .clone()
            .or_else(|| credentials.as_ref().and_then(|c| c.project_id().map(String::from)))
            .ok_or_else(|| EmbeddingError::Unavailable("embedding.project_id not configured".into()))?;

        Ok(Self {
            client,
            url: format!(
                "https://{loc}-aiplatform.googleapis.com/v1/projects/{project_id}/locations/{loc}/publishers/google/models/{}:predict",
                cfg.model,
                loc = cfg.location,
            ),
            dimension: cfg.dimension,
            credentials,
        })
    }
}

#[async_trait]
impl Embedder for VertexEmbedder {
    fn name(&self) -> &str {
        "vertex"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let body = serde_json::json!({ "instances": [{ "content": text }] });

        let mut builder = self.client.post(&self.url).json(&body);
        if let Some(creds) = &self.credentials {
            builder = builder.bearer_auth(creds.token().await?);
        }
        let resp = builder.send().await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Vertex AI embedding error");
            return Err(EmbeddingError::Api {
                status,
                message: text,
            });
        }

        let api_resp: PredictResponse = resp
            .json()
            .await
            .map_err(|e| EmbeddingError::Parse(e.to_string()))?;

        let values = extract_embedding(api_resp, self.dimension)?;
        debug!(dimension = values.len(), "embedding generated");
        Ok(values)
    }
}

fn extract_embedding(resp: PredictResponse, expected: usize) -> Result<Vec<f32>, EmbeddingError> {
    let values = resp
        .predictions
        .into_iter()
        .next()
        .map(|p| p.embeddings.values)
        .ok_or_else(|| EmbeddingError::Parse("no predictions in response".into()))?;

    if values.len() != expected {
        return Err(EmbeddingError::Dimension {
            expected,
            actual: values.len(),
        });
    }
    Ok(values)
}

#[derive(Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
struct Prediction {
    embeddings: Embeddings,
}

#[derive(Deserialize)]
struct Embeddings {
    #[serde(default)]
    values: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(values: &[f32]) -> PredictResponse {
        serde_json::from_value(serde_json::json!({
            "predictions": [{ "embeddings": { "values": values, "statistics": { "token_count": 3 } } }]
        }))
        .unwrap()
    }

    #[test]
    fn vector_of_configured_dimension_is_accepted() {
        let v = extract_embedding(response(&[0.1, 0.2, 0.3]), 3).unwrap();
        assert_eq!(v, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn wrong_dimension_is_rejected() {
        let err = extract_embedding(response(&[0.1, 0.2]), 768).unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::Dimension {
                expected: 768,
                actual: 2
            }
        ));
    }

    #[test]
    fn empty_predictions_is_a_parse_error() {
        let resp: PredictResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(matches!(extract_embedding(resp, 3), Err(EmbeddingError::Parse(_))));
    }

    #[tokio::test]
    async fn disabled_embedder_always_fails() {
        assert!(matches!(
            DisabledEmbedder.embed("hola").await,
            Err(EmbeddingError::Disabled)
        ));
    }
}
