use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use callflow_agent::{
    ContextRetriever, DialogflowClient, DisabledEmbedder, Embedder, GcpCredentials, NluClient,
    NoopRetriever, NullNluClient, VectorSearchRetriever, VertexEmbedder,
};
use callflow_core::CallflowConfig;
use callflow_history::{HistoryForwarder, HttpHistorySink, TranscriptArchive};
use callflow_sessions::SqliteSessionStore;
use callflow_turn::TurnProcessor;
use clap::Parser;
use tracing::{info, warn};

mod app;
mod http;

/// Voice gateway: answers telephony webhooks with the next step of the
/// conversation.
#[derive(Debug, Parser)]
#[command(name = "callflow-gateway", version)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, env = "CALLFLOW_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "callflow_gateway=info,callflow_turn=info,callflow_history=info,tower_http=debug"
                    .into()
            }),
        )
        .init();

    let cli = Cli::parse();
    let config = CallflowConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        CallflowConfig::default()
    });
    let config = Arc::new(config);

    // single SQLite file; each subsystem opens its own connection
    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    callflow_sessions::db::init_db(&db)?;
    callflow_history::db::init_db(&db)?;
    info!("database migrations complete");

    let store = Arc::new(SqliteSessionStore::new(rusqlite::Connection::open(db_path)?));
    let archive = if config.archive.enabled {
        info!("transcript archive enabled");
        Some(TranscriptArchive::new(rusqlite::Connection::open(db_path)?))
    } else {
        None
    };

    let client = reqwest::Client::new();
    let credentials = match GcpCredentials::from_config(&config.gcp, client.clone()) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "GCP credentials unusable, calling Google APIs unauthenticated");
            None
        }
    };

    let nlu = build_nlu(&config, credentials.clone(), client.clone());
    let embedder = build_embedder(&config, credentials.clone(), client.clone());
    let retriever = build_retriever(&config, credentials, client.clone());
    let history = Arc::new(build_forwarder(&config, client));

    let processor = TurnProcessor::new(
        config.clone(),
        store,
        nlu,
        embedder,
        retriever,
        history.clone(),
    );

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let state = Arc::new(app::AppState::new(config, processor, archive));
    let router = app::build_router(state);

    info!(%addr, "callflow gateway listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    history.shutdown().await;
    info!("callflow gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

// ── Collaborator wiring ──────────────────────────────────────────────────────

fn build_nlu(
    config: &CallflowConfig,
    credentials: Option<GcpCredentials>,
    client: reqwest::Client,
) -> Arc<dyn NluClient> {
    if !config.nlu.is_configured() {
        warn!("NLU not configured, every turn will get the error prompt");
        return Arc::new(NullNluClient);
    }
    match DialogflowClient::new(&config.nlu, credentials, client) {
        Ok(c) => {
            info!(location = %config.nlu.location, "NLU: Dialogflow CX");
            Arc::new(c)
        }
        Err(e) => {
            warn!(error = %e, "Dialogflow client unavailable, using null NLU");
            Arc::new(NullNluClient)
        }
    }
}

fn build_embedder(
    config: &CallflowConfig,
    credentials: Option<GcpCredentials>,
    client: reqwest::Client,
) -> Arc<dyn Embedder> {
    if !config.embedding.enabled {
        return Arc::new(DisabledEmbedder);
    }
    match VertexEmbedder::new(&config.embedding, credentials, client) {
        Ok(e) => {
            info!(model = %config.embedding.model, "embeddings: Vertex AI");
            Arc::new(e)
        }
        Err(e) => {
            warn!(error = %e, "embedder unavailable, embeddings disabled");
            Arc::new(DisabledEmbedder)
        }
    }
}

fn build_retriever(
    config: &CallflowConfig,
    credentials: Option<GcpCredentials>,
    client: reqwest::Client,
) -> Arc<dyn ContextRetriever> {
    if !config.retrieval.enabled {
        return Arc::new(NoopRetriever);
    }
    match VectorSearchRetriever::new(&config.retrieval, credentials, client) {
        Ok(r) => {
            info!(neighbors = config.retrieval.neighbors, "context retrieval: Vector Search");
            Arc::new(r)
        }
        Err(e) => {
            warn!(error = %e, "retriever unavailable, context retrieval disabled");
            Arc::new(NoopRetriever)
        }
    }
}

fn build_forwarder(config: &CallflowConfig, client: reqwest::Client) -> HistoryForwarder {
    let history = &config.history;
    let Some(url) = history.url.as_deref().filter(|u| !u.trim().is_empty()) else {
        info!("history forwarding disabled");
        return HistoryForwarder::disabled();
    };
    let sink = HttpHistorySink::new(
        client,
        url,
        Duration::from_millis(history.timeout_ms),
        history.secret.clone(),
    );
    info!(url = sink.url(), "history forwarding enabled");
    HistoryForwarder::spawn(Arc::new(sink), history.workers, history.queue_capacity)
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
