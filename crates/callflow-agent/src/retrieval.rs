//! Prior-conversation context from a Vertex AI Vector Search index.

use std::collections::BTreeMap;

use async_trait::async_trait;
use callflow_core::config::RetrievalConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::RetrievalError;
use crate::gcp_auth::GcpCredentials;

/// Restrict namespaces the index is partitioned by.
const TENANT_NAMESPACE: &str = "tenant_id";
const CALLER_NAMESPACE: &str = "from_number";

/// Nearest-neighbour query scoped to one caller of one tenant.
#[derive(Debug, Clone)]
pub struct ContextQuery<'a> {
    pub embedding: &'a [f32],
    pub tenant_id: &'a str,
    pub from_number: &'a str,
    pub max_results: usize,
}

/// One retrieved snippet of an earlier conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnippet {
    pub id: Option<String>,
    pub text: String,
    /// Distance reported by the index; ordering is the index's.
    pub score: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

#[async_trait]
pub trait ContextRetriever: Send + Sync {
    fn name(&self) -> &str;

    async fn retrieve(&self, query: &ContextQuery<'_>) -> Result<Vec<ContextSnippet>, RetrievalError>;
}

/// Wired in when retrieval is disabled: never finds anything.
pub struct NoopRetriever;

#[async_trait]
impl ContextRetriever for NoopRetriever {
    fn name(&self) -> &str {
        "noop"
    }

    async fn retrieve(&self, _query: &ContextQuery<'_>) -> Result<Vec<ContextSnippet>, RetrievalError> {
        Ok(Vec::new())
    }
}

pub struct VectorSearchRetriever {
    client: reqwest::Client,
    url: String,
    deployed_index_id: String,
    credentials: Option<GcpCredentials>,
}

impl VectorSearchRetriever {
    pub fn new(
        cfg: &RetrievalConfig,
        credentials: Option<GcpCredentials>,
        client: reqwest::Client,
    ) -> Result<Self, RetrievalError> {
        let missing = |key: &str| RetrievalError::Unavailable(format!("retrieval.{key} not configured"));

        let host = cfg.public_endpoint.clone().ok_or_else(|| missing("public_endpoint"))?;
        let project_id = cfg
            .project_id
            .clone()
            .or_else(|| credentials.as_ref().and_then(|c| c.project_id().map(String::from)))
            .ok_or_else(|| missing("project_id"))?;
        let endpoint = cfg.index_endpoint.clone().ok_or_else(|| missing("index_endpoint"))?;
        let deployed_index_id = cfg
            .deployed_index_id
            .clone()
            .ok_or_else(|| missing("deployed_index_id"))?;

        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host
        } else {
            format!("https://{host}")
        };

        Ok(Self {
            client,
            url: format!(
                "{}/v1/projects/{project_id}/locations/{}/indexEndpoints/{endpoint}:findNeighbors",
                host.trim_end_matches('/'),
                cfg.location
            ),
            deployed_index_id,
            credentials,
        })
    }

    fn build_body(&self, query: &ContextQuery<'_>) -> Value {
        serde_json::json!({
            "deployedIndexId": self.deployed_index_id,
            "queries": [{
                "datapoint": {
                    "datapointId": "query",
                    "featureVector": query.embedding,
                    "restricts": [
                        { "namespace": TENANT_NAMESPACE, "allowList": [query.tenant_id] },
                        { "namespace": CALLER_NAMESPACE, "allowList": [query.from_number] },
                    ],
                },
                "neighborCount": query.max_results,
            }],
            "returnFullDatapoint": true,
        })
    }
}

#[async_trait]
impl ContextRetriever for VectorSearchRetriever {
    fn name(&self) -> &str {
        "vector_search"
    }

    async fn retrieve(&self, query: &ContextQuery<'_>) -> Result<Vec<ContextSnippet>, RetrievalError> {
        if query.max_results == 0 {
            return Ok(Vec::new());
        }

        let mut builder = self.client.post(&self.url).json(&self.build_body(query));
        if let Some(creds) = &self.credentials {
            builder = builder.bearer_auth(creds.token().await?);
        }
        let resp = builder.send().await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Vector Search error");
            return Err(RetrievalError::Api {
                status,
                message: text,
            });
        }

        let api_resp: FindNeighborsResponse = resp
            .json()
            .await
            .map_err(|e| RetrievalError::Parse(e.to_string()))?;

        let snippets = parse_neighbors(api_resp, query.max_results);
        debug!(hits = snippets.len(), "context retrieved");
        Ok(snippets)
    }
}

/// Neighbours without a `text` metadata entry carry nothing to say and are
/// skipped.
fn parse_neighbors(resp: FindNeighborsResponse, max_results: usize) -> Vec<ContextSnippet> {
    resp.nearest_neighbors
        .into_iter()
        .next()
        .map(|n| n.neighbors)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|n| {
            let metadata = n.datapoint.embedding_metadata.unwrap_or_default();
            let text = metadata.get("text")?.as_str()?.to_string();
            Some(ContextSnippet {
                id: n.datapoint.datapoint_id,
                text,
                score: n.distance.unwrap_or_default(),
                metadata,
            })
        })
        .take(max_results)
        .collect()
}

// ── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FindNeighborsResponse {
    #[serde(default)]
    nearest_neighbors: Vec<NearestNeighbors>,
}

#[derive(Deserialize)]
struct NearestNeighbors {
    #[serde(default)]
    neighbors: Vec<Neighbor>,
}

#[derive(Deserialize)]
struct Neighbor {
    datapoint: Datapoint,
    distance: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Datapoint {
    datapoint_id: Option<String>,
    embedding_metadata: Option<BTreeMap<String, Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> RetrievalConfig {
        RetrievalConfig {
            enabled: true,
            public_endpoint: Some("123.us-central1-456.vdb.vertexai.goog".into()),
            project_id: Some("acme".into()),
            index_endpoint: Some("789".into()),
            deployed_index_id: Some("calls_v1".into()),
            ..RetrievalConfig::default()
        }
    }

    #[test]
    fn query_is_scoped_to_tenant_and_caller() {
        let r = VectorSearchRetriever::new(&cfg(), None, reqwest::Client::new()).unwrap();
        assert_eq!(
            r.url,
            "https://123.us-central1-456.vdb.vertexai.goog/v1/projects/acme/locations/us-central1/indexEndpoints/789:findNeighbors"
        );

        let embedding = [0.5_f32, 0.25];
        let body = r.build_body(&ContextQuery {
            embedding: &embedding,
            tenant_id: "default",
            from_number: "+56911111111",
            max_results: 5,
        });
        let restricts = &body["queries"][0]["datapoint"]["restricts"];
        assert_eq!(restricts[0]["namespace"], TENANT_NAMESPACE);
        assert_eq!(restricts[0]["allowList"][0], "default");
        assert_eq!(restricts[1]["allowList"][0], "+56911111111");
        assert_eq!(body["queries"][0]["neighborCount"], 5);
        assert_eq!(body["deployedIndexId"], "calls_v1");
    }

    #[test]
    fn neighbors_without_text_are_skipped() {
        let resp: FindNeighborsResponse = serde_json::from_value(serde_json::json!({
            "nearestNeighbors": [{
                "id": "query",
                "neighbors": [
                    { "datapoint": { "datapointId": "a", "embeddingMetadata": { "text": "preguntó por su boleta", "call_id": "CA0" } }, "distance": 0.91 },
                    { "datapoint": { "datapointId": "b" }, "distance": 0.80 },
                    { "datapoint": { "datapointId": "c", "embeddingMetadata": { "text": "pidió un técnico" } }, "distance": 0.75 }
                ]
            }]
        }))
        .unwrap();

        let snippets = parse_neighbors(resp, 5);
        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].text, "preguntó por su boleta");
        assert_eq!(snippets[0].score, 0.91);
        assert_eq!(snippets[0].metadata["call_id"], "CA0");
        assert_eq!(snippets[1].id.as_deref(), Some("c"));
    }

    #[test]
    fn incomplete_config_is_unavailable() {
        let cfg = RetrievalConfig {
            deployed_index_id: None,
            ..cfg()
        };
        assert!(matches!(
            VectorSearchRetriever::new(&cfg, None, reqwest::Client::new()),
            Err(RetrievalError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn noop_finds_nothing() {
        let q = ContextQuery {
            embedding: &[1.0],
            tenant_id: "t",
            from_number: "n",
            max_results: 3,
        };
        assert!(NoopRetriever.retrieve(&q).await.unwrap().is_empty());
    }
}
