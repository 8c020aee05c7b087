use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BIND: &str = "0.0.0.0";
/// Marker the NLU engine puts in `custom_payload.action` to request a human.
pub const HANDOFF_ACTION: &str = "LiveAgentHandoff";

/// Top-level config (callflow.toml + CALLFLOW_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallflowConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub tenant: TenantConfig,
    #[serde(default)]
    pub handoff: HandoffConfig,
    #[serde(default)]
    pub nlu: NluConfig,
    #[serde(default)]
    pub gcp: GcpConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Tenant assigned to every new call. The telephony webhook carries no
    /// tenant of its own.
    #[serde(default = "default_tenant_id")]
    pub default_id: String,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            default_id: default_tenant_id(),
        }
    }
}

/// Defaults for live-agent transfers. Every field can be overridden per call
/// by the NLU payload that requests the handoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffConfig {
    #[serde(default = "default_transfer_number")]
    pub transfer_number: String,
    #[serde(default = "default_handoff_reason")]
    pub reason: String,
    #[serde(default = "bool_true")]
    pub preserve_context: bool,
    /// Caller id presented to the human agent. `{{From}}` and `{{To}}` are
    /// replaced with the call's numbers when the script is rendered.
    #[serde(default = "default_caller_id_template")]
    pub caller_id_template: String,
    /// Country code prepended to bare national numbers in payload overrides.
    #[serde(default = "default_country_code")]
    pub default_country_code: String,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            transfer_number: default_transfer_number(),
            reason: default_handoff_reason(),
            preserve_context: true,
            caller_id_template: default_caller_id_template(),
            default_country_code: default_country_code(),
        }
    }
}

/// Dialogflow CX agent coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NluConfig {
    pub project_id: Option<String>,
    pub agent_id: Option<String>,
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default = "default_language")]
    pub language_code: String,
    #[serde(default = "default_nlu_timeout_ms")]
    pub timeout_ms: u64,
    /// Override the regional API host (tests, emulators).
    pub base_url: Option<String>,
}

impl Default for NluConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            agent_id: None,
            location: default_location(),
            language_code: default_language(),
            timeout_ms: default_nlu_timeout_ms(),
            base_url: None,
        }
    }
}

impl NluConfig {
    /// True when enough is configured to reach a real agent.
    pub fn is_configured(&self) -> bool {
        self.project_id.is_some() && self.agent_id.is_some()
    }
}

/// Google Cloud credentials shared by the NLU, embedding and retrieval clients.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GcpConfig {
    /// Path to a service account JSON key file.
    pub key_file: Option<String>,
    /// Static bearer token, used instead of `key_file` when set.
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub enabled: bool,
    pub project_id: Option<String>,
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
    #[serde(default = "default_embedding_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            project_id: None,
            location: default_location(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_ms: default_embedding_timeout_ms(),
        }
    }
}

/// Vertex AI Vector Search deployment holding prior conversation snippets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Public endpoint domain of the deployed index, e.g.
    /// `1234.us-central1-5678.vdb.vertexai.goog`.
    pub public_endpoint: Option<String>,
    pub project_id: Option<String>,
    #[serde(default = "default_location")]
    pub location: String,
    pub index_endpoint: Option<String>,
    pub deployed_index_id: Option<String>,
    #[serde(default = "default_neighbors")]
    pub neighbors: usize,
    #[serde(default = "default_retrieval_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            public_endpoint: None,
            project_id: None,
            location: default_location(),
            index_endpoint: None,
            deployed_index_id: None,
            neighbors: default_neighbors(),
            timeout_ms: default_retrieval_timeout_ms(),
        }
    }
}

/// Voice and recognition settings used when rendering scripts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default = "default_language")]
    pub stt_language: String,
    #[serde(default = "default_language")]
    pub tts_language: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_listen_timeout_secs")]
    pub listen_timeout_secs: u32,
    #[serde(default = "default_speech_timeout")]
    pub speech_timeout: String,
    /// Vocabulary hints passed to the recogniser. Empty means none.
    #[serde(default)]
    pub hints: Vec<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            stt_language: default_language(),
            tts_language: default_language(),
            voice: default_voice(),
            listen_timeout_secs: default_listen_timeout_secs(),
            speech_timeout: default_speech_timeout(),
            hints: Vec::new(),
        }
    }
}

/// Fixed phrases spoken by the agent outside of NLU responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsConfig {
    #[serde(default = "default_greeting")]
    pub greeting: String,
    #[serde(default = "default_greeting_reprompt")]
    pub greeting_reprompt: String,
    #[serde(default = "default_no_input")]
    pub no_input: String,
    #[serde(default = "default_error")]
    pub error: String,
    #[serde(default = "default_handoff_transition")]
    pub handoff_transition: String,
    /// Rendering of a keypad entry; `{digits}` is replaced by the keys pressed.
    #[serde(default = "default_keypress_template")]
    pub keypress_template: String,
    /// First line of the context block sent to the NLU engine.
    #[serde(default = "default_context_header")]
    pub context_header: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            greeting: default_greeting(),
            greeting_reprompt: default_greeting_reprompt(),
            no_input: default_no_input(),
            error: default_error(),
            handoff_transition: default_handoff_transition(),
            keypress_template: default_keypress_template(),
            context_header: default_context_header(),
        }
    }
}

/// Outbound transcript forwarding to the archive service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Base URL of the archive; forwarding is disabled when unset.
    pub url: Option<String>,
    #[serde(default = "default_history_workers")]
    pub workers: usize,
    #[serde(default = "default_history_queue")]
    pub queue_capacity: usize,
    #[serde(default = "default_history_timeout_ms")]
    pub timeout_ms: u64,
    /// HMAC-SHA256 key used to sign each payload.
    pub secret: Option<String>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            url: None,
            workers: default_history_workers(),
            queue_capacity: default_history_queue(),
            timeout_ms: default_history_timeout_ms(),
            secret: None,
        }
    }
}

/// Local archive ingestion endpoint (`POST /save-transcript`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default)]
    pub enabled: bool,
    /// When set, requests must carry a matching HMAC-SHA256 signature.
    pub secret: Option<String>,
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.callflow/callflow.db", home)
}
fn default_tenant_id() -> String {
    "default".to_string()
}
fn default_transfer_number() -> String {
    "+56912345678".to_string()
}
fn default_handoff_reason() -> String {
    "El cliente ha solicitado hablar con un agente humano".to_string()
}
fn default_caller_id_template() -> String {
    "{{From}}".to_string()
}
fn default_country_code() -> String {
    "56".to_string()
}
fn default_location() -> String {
    "us-central1".to_string()
}
fn default_language() -> String {
    "es-CL".to_string()
}
fn default_nlu_timeout_ms() -> u64 {
    8_000
}
fn default_embedding_model() -> String {
    "textembedding-gecko".to_string()
}
fn default_embedding_dimension() -> usize {
    768
}
fn default_embedding_timeout_ms() -> u64 {
    3_000
}
fn default_neighbors() -> usize {
    5
}
fn default_retrieval_timeout_ms() -> u64 {
    2_000
}
fn default_voice() -> String {
    "Polly.Lupe".to_string()
}
fn default_listen_timeout_secs() -> u32 {
    5
}
fn default_speech_timeout() -> String {
    "auto".to_string()
}
fn default_greeting() -> String {
    "Hola, soy su asistente virtual. ¿En qué puedo ayudarle hoy?".to_string()
}
fn default_greeting_reprompt() -> String {
    "Por favor, dígame en qué puedo ayudarle.".to_string()
}
fn default_no_input() -> String {
    "No se detectó ninguna entrada. Por favor, inténtelo de nuevo.".to_string()
}
fn default_error() -> String {
    "Lo siento, ha ocurrido un error. Por favor, inténtelo de nuevo más tarde.".to_string()
}
fn default_handoff_transition() -> String {
    "Le transferiré con un agente humano. Por favor, espere un momento.".to_string()
}
fn default_keypress_template() -> String {
    "Presionó {digits}".to_string()
}
fn default_context_header() -> String {
    "Contexto adicional de conversaciones anteriores:".to_string()
}
fn default_history_workers() -> usize {
    4
}
fn default_history_queue() -> usize {
    256
}
fn default_history_timeout_ms() -> u64 {
    5_000
}

impl CallflowConfig {
    /// Load config from a TOML file with CALLFLOW_* env var overrides.
    ///
    /// Nested keys use a double underscore:
    /// `CALLFLOW_NLU__LANGUAGE_CODE=es-MX`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::CallflowError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("CALLFLOW_").split("__"))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.callflow/callflow.toml", home)
}
