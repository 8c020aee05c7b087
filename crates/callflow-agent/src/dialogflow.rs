//! Dialogflow CX `detectIntent` over REST.

use std::collections::BTreeMap;

use async_trait::async_trait;
use callflow_core::config::NluConfig;
use callflow_core::NluResult;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::NluError;
use crate::gcp_auth::GcpCredentials;
use crate::nlu::{NluClient, NluRequest};

/// Query parameter carrying the retrieved context block.
pub const CONTEXT_PARAMETER: &str = "additional_context";

pub struct DialogflowClient {
    client: reqwest::Client,
    base_url: String,
    project_id: String,
    location: String,
    agent_id: String,
    credentials: Option<GcpCredentials>,
}

impl DialogflowClient {
    pub fn new(
        cfg: &NluConfig,
        credentials: Option<GcpCredentials>,
        client: reqwest::Client,
    ) -> Result<Self, NluError> {
        let project_id = cfg
            .project_id
            .clone()
            .or_else(|| credentials.as_ref().and_then(|c| c.project_id().map(String::from)))
            .ok_or_else(|| NluError::Unavailable("nlu.project_id not configured".into()))?;
        let agent_id = cfg
            .agent_id
            .clone()
            .ok_or_else(|| NluError::Unavailable("nlu.agent_id not configured".into()))?;

        Ok(Self {
            client,
            base_url: cfg
                .base_url
                .clone()
                .unwrap_or_else(|| regional_host(&cfg.location)),
            project_id,
            location: cfg.location.clone(),
            agent_id,
            credentials,
        })
    }

    fn endpoint(&self, session_id: &str) -> String {
        format!(
            "{}/v3/projects/{}/locations/{}/agents/{}/sessions/{}:detectIntent",
            self.base_url.trim_end_matches('/'),
            self.project_id,
            self.location,
            self.agent_id,
            session_id
        )
    }
}

/// `global` agents live on the unprefixed host.
fn regional_host(location: &str) -> String {
    if location == "global" {
        "https://dialogflow.googleapis.com".to_string()
    } else {
        format!("https://{location}-dialogflow.googleapis.com")
    }
}

fn build_body(req: &NluRequest) -> Value {
    let mut body = serde_json::json!({
        "queryInput": {
            "text": { "text": req.text },
            "languageCode": req.language_code,
        }
    });
    if let Some(ctx) = req.context.as_deref().filter(|c| !c.is_empty()) {
        let mut parameters = serde_json::Map::new();
        parameters.insert(CONTEXT_PARAMETER.to_string(), Value::from(ctx));
        body["queryParams"] = serde_json::json!({ "parameters": parameters });
    }
    body
}

#[async_trait]
impl NluClient for DialogflowClient {
    fn name(&self) -> &str {
        "dialogflow"
    }

    async fn detect_intent(&self, req: &NluRequest) -> Result<NluResult, NluError> {
        let url = self.endpoint(&req.session_id);
        let body = build_body(req);

        debug!(session_id = %req.session_id, has_context = req.context.is_some(), "sending detectIntent");

        let mut builder = self.client.post(&url).json(&body);
        if let Some(creds) = &self.credentials {
            builder = builder.bearer_auth(creds.token().await?);
        }
        let resp = builder.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                NluError::Unavailable(e.to_string())
            } else {
                NluError::Http(e)
            }
        })?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Dialogflow error");
            return Err(match status {
                400 | 404 => NluError::InvalidSession {
                    session_id: req.session_id.clone(),
                    message: text,
                },
                _ => NluError::Api {
                    status,
                    message: text,
                },
            });
        }

        let api_resp: DetectIntentResponse = resp
            .json()
            .await
            .map_err(|e| NluError::Parse(e.to_string()))?;

        Ok(parse_detect_intent(&req.session_id, api_resp))
    }
}

/// Reduce a detectIntent response to an `NluResult`.
///
/// The first message carrying text is authoritative for `response_text`
/// (empty when none does); the first message carrying a payload supplies
/// `custom_payload`.
fn parse_detect_intent(session_id: &str, resp: DetectIntentResponse) -> NluResult {
    let qr = resp.query_result.unwrap_or_default();

    let response_text = qr
        .response_messages
        .iter()
        .filter_map(|m| m.text.as_ref())
        .find_map(|t| t.text.first().cloned())
        .unwrap_or_default();
    let custom_payload = qr
        .response_messages
        .iter()
        .find_map(|m| m.payload.clone());

    let (intent_name, intent_confidence) = match qr.matched {
        Some(m) => (m.intent.and_then(|i| i.display_name), m.confidence),
        None => (None, None),
    };

    NluResult {
        session_id: session_id.to_string(),
        intent_name,
        intent_confidence,
        parameters: qr.parameters,
        page_id: qr.current_page.and_then(|p| p.name),
        response_text,
        custom_payload,
    }
}

// ── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetectIntentResponse {
    query_result: Option<QueryResult>,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResult {
    #[serde(default)]
    response_messages: Vec<ResponseMessage>,
    current_page: Option<Page>,
    #[serde(rename = "match")]
    matched: Option<Match>,
    parameters: Option<BTreeMap<String, Value>>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    text: Option<TextMessage>,
    payload: Option<BTreeMap<String, Value>>,
}

#[derive(Deserialize)]
struct TextMessage {
    #[serde(default)]
    text: Vec<String>,
}

#[derive(Deserialize)]
struct Page {
    name: Option<String>,
}

#[derive(Deserialize)]
struct Match {
    intent: Option<Intent>,
    confidence: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Intent {
    display_name: Option<String>,
}
